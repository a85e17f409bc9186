//! HTTP relay server.
//!
//! Streams chat tokens as NDJSON and exposes search and tool listing for
//! browser front ends and other local clients.

use crate::cli::{BackendArgs, ModeArg, Output};
use crate::config::Settings;
use crate::error::ScoutError;
use crate::llm::{StreamEvent, TokenStream};
use crate::orchestrator::{Orchestrator, DEFAULT_SEPARATOR};
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Shared application state.
struct AppState {
    orchestrator: Orchestrator,
}

/// Run the HTTP relay server.
pub async fn run_serve(
    host: &str,
    port: u16,
    backend: &BackendArgs,
    mut settings: Settings,
) -> anyhow::Result<()> {
    backend.apply(&mut settings);
    let orchestrator = Orchestrator::new(settings)?;
    let app = router(Arc::new(AppState { orchestrator }));

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Scout Relay Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Chat (NDJSON)", "POST /api/chat");
    Output::kv("Search", "POST /api/search");
    Output::kv("Tools", "GET  /api/tools");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/search", post(search))
        .route("/api/tools", get(list_tools))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(alias = "message")]
    prompt: String,
}

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(alias = "prompt")]
    input: String,
    #[serde(default)]
    mode: ModeArg,
    #[serde(default = "default_separator")]
    separator: String,
    #[serde(default)]
    with_tool: bool,
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error,
        }),
    )
        .into_response()
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn chat(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Response {
    if req.prompt.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Empty input".to_string());
    }

    let lines = match state.orchestrator.chat_stream(&req.prompt).await {
        Ok(tokens) => ndjson_lines(tokens),
        Err(e) => {
            warn!("Could not open chat stream: {}", e);
            stream::once(async move { ndjson(json!({ "error": e.to_string() })) }).boxed()
        }
    };

    Response::builder()
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(lines.map(Ok::<_, Infallible>)))
        .unwrap_or_else(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn search(State(state): State<Arc<AppState>>, Json(req): Json<SearchRequest>) -> Response {
    let mode = req.mode.into_mode(&req.separator);
    let result = if req.with_tool {
        state.orchestrator.research_with_tool(&req.input, &mode).await
    } else {
        state.orchestrator.research(&req.input, &mode).await
    };
    match result {
        Ok(report) => Json(report).into_response(),
        Err(ScoutError::InvalidInput(msg)) | Err(ScoutError::NoQueries(msg)) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, msg)
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn list_tools(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let catalog = state.orchestrator.registry().catalog().await;
    Json(json!({ "tools": catalog.definitions() }))
}

/// Map model tokens to NDJSON lines, ending after the terminal line.
///
/// The client going away drops this stream and with it the upstream
/// connection.
fn ndjson_lines(tokens: TokenStream) -> BoxStream<'static, String> {
    tokens
        .scan(false, |finished, event| {
            let line = if *finished {
                None
            } else {
                Some(match event {
                    Ok(StreamEvent::Token(token)) => ndjson(json!({ "token": token })),
                    Ok(StreamEvent::Done) => {
                        *finished = true;
                        info!("Chat stream finished");
                        ndjson(json!({ "done": true }))
                    }
                    Err(e) => {
                        *finished = true;
                        warn!("Chat stream failed: {}", e);
                        ndjson(json!({ "error": e.to_string() }))
                    }
                })
            };
            futures::future::ready(line)
        })
        .boxed()
}

fn ndjson(value: serde_json::Value) -> String {
    format!("{}\n", value)
}

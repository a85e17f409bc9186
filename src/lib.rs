//! Scout - web search, external tools and LLM synthesis
//!
//! A local-first research assistant that turns a prompt into web searches or
//! tool runs and asks an OpenAI-compatible model for a cited answer.
//!
//! # Overview
//!
//! Scout allows you to:
//! - Search a SearxNG instance with one optimized query, a queue of queries,
//!   or queries the model extracts and refines over several rounds
//! - Synthesize answers that cite their sources as `[Source n]`
//! - Let the model pick an external tool script, run it and explain the output
//! - Stream chat replies to a terminal or over HTTP as NDJSON
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Settings, flattened orchestrator config and system prompts
//! - `llm` - Chat-completions client, messages and token streams
//! - `search` - Query formulation, the SearxNG client and the iterative coordinator
//! - `tools` - Tool scripts, the registry and the dispatcher
//! - `synthesis` - Evidence assembly and cited answer synthesis
//! - `orchestrator` - Session coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use scout::config::Settings;
//! use scout::orchestrator::{Orchestrator, SearchMode};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let report = orchestrator
//!         .research("current NVDA stock price", &SearchMode::Single)
//!         .await?;
//!     println!("{}", report.answer);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod orchestrator;
pub mod search;
pub mod synthesis;
pub mod tools;

#[cfg(test)]
mod testing;

pub use error::{Result, ScoutError};

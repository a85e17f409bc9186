//! Decoding of streamed chat-completion events.
//!
//! Framing is handled by `eventsource-stream`; this module only interprets
//! the `data` payload of each event.

use tracing::debug;

/// Meaning of one event of a streaming chat-completion response.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SseData {
    Token(String),
    Done,
    Skip,
}

/// Classify an event payload. Malformed fragments are skipped, never fatal.
pub(crate) fn parse_data(data: &str) -> SseData {
    let data = data.trim();
    if data == "[DONE]" {
        return SseData::Done;
    }

    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(fragment) => match fragment["choices"][0]["delta"]["content"].as_str() {
            Some(token) if !token.is_empty() => SseData::Token(token.to_string()),
            _ => SseData::Skip,
        },
        Err(e) => {
            debug!("Skipping malformed stream fragment: {}", e);
            SseData::Skip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_data(data), SseData::Token("Hel".to_string()));
    }

    #[test]
    fn test_parse_done_and_noise() {
        assert_eq!(parse_data("[DONE]"), SseData::Done);
        assert_eq!(parse_data("[DONE]\r"), SseData::Done);
        assert_eq!(parse_data(""), SseData::Skip);
        assert_eq!(parse_data("{not json"), SseData::Skip);
        assert_eq!(
            parse_data(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseData::Skip
        );
    }
}

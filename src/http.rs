//! Shared HTTP client construction.

use crate::error::{Result, ScoutError};
use std::time::Duration;

/// Default timeout for LLM requests (8 minutes). Local generation is slow.
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 480;

/// Create an HTTP client with the given request timeout.
///
/// Each component owns its client; reqwest pools connections per client and
/// keeps no response cache, so concurrent sessions never share buffers.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("scout/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ScoutError::Config(format!("Failed to create HTTP client: {e}")))
}

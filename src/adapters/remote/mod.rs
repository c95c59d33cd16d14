//! Outbound HTTP clients for the external content index and generation engine.

mod generation;
mod index;

pub use generation::{GenerationClientError, OllamaEngine, DEFAULT_MODEL};
pub use index::{ContentIndexError, HttpContentIndex};

use std::time::Duration;

/// Transport-level cap; the pipeline applies its own, usually tighter, timeouts.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

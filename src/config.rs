//! Configuration for the monolith deployment.

use crate::adapters::remote::DEFAULT_MODEL;
use crate::application::{PipelineSettings, RetrievalConfig};
use crate::domain::retry::RetryPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Redis connection URL; the in-memory store is used when unset
    pub redis_url: Option<String>,
    /// Base URL of the content index API
    pub content_index_url: String,
    pub content_index_api_key: Option<String>,
    /// Index new videos are submitted into
    pub content_index_id: Option<String>,
    /// Base URL of the Ollama-compatible generation engine
    pub generation_url: String,
    pub generation_model: String,
    pub heartbeat: Duration,
    /// Per-video event buffer before slow subscribers skip ahead
    pub event_capacity: usize,
    pub generation_max_attempts: u32,
    pub generation_attempt_timeout: Duration,
    pub generation_stage_budget: Duration,
    pub submit_max_attempts: u32,
    pub retrieval_timeout: Duration,
    pub merge_gap_secs: f64,
    pub snapshot_limit: usize,
}

impl ServiceConfig {
    /// Load configuration from `.env` and environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparseable values take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str, default: &str| {
            non_empty(lookup(key)).unwrap_or_else(|| default.to_string())
        };
        let secs = |key: &str, default: u64| Duration::from_secs(parsed(&lookup, key, default));

        Self {
            addr: text("ADDR", "127.0.0.1"),
            port: text("PORT", "3000"),
            redis_url: non_empty(lookup("REDIS_URL")),
            content_index_url: text("CONTENT_INDEX_URL", "http://127.0.0.1:8080"),
            content_index_api_key: non_empty(lookup("CONTENT_INDEX_API_KEY")),
            content_index_id: non_empty(lookup("CONTENT_INDEX_ID")),
            generation_url: text("GENERATION_URL", "http://localhost:11434"),
            generation_model: text("GENERATION_MODEL", DEFAULT_MODEL),
            heartbeat: secs("HEARTBEAT_SECS", 30),
            event_capacity: parsed(&lookup, "EVENT_CAPACITY", 64),
            generation_max_attempts: parsed(&lookup, "GENERATION_MAX_ATTEMPTS", 3),
            generation_attempt_timeout: secs("GENERATION_ATTEMPT_TIMEOUT_SECS", 60),
            generation_stage_budget: secs("GENERATION_STAGE_BUDGET_SECS", 180),
            submit_max_attempts: parsed(&lookup, "SUBMIT_MAX_ATTEMPTS", 2),
            retrieval_timeout: secs("RETRIEVAL_TIMEOUT_SECS", 20),
            merge_gap_secs: parsed(&lookup, "MERGE_GAP_SECS", 2.0),
            snapshot_limit: parsed(&lookup, "SNAPSHOT_LIMIT", 200),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }

    pub fn pipeline(&self) -> PipelineSettings {
        PipelineSettings {
            default_index_id: self.content_index_id.clone(),
            submit_policy: RetryPolicy::new(
                self.submit_max_attempts,
                self.retrieval_timeout,
                self.retrieval_timeout * self.submit_max_attempts.max(1),
            )
            .with_backoff(Duration::from_millis(250)),
            generation_policy: RetryPolicy::new(
                self.generation_max_attempts,
                self.generation_attempt_timeout,
                self.generation_stage_budget,
            )
            .with_backoff(Duration::from_millis(500)),
            retrieval: RetrievalConfig {
                gap_secs: self.merge_gap_secs,
                timeout: self.retrieval_timeout,
                snapshot_limit: self.snapshot_limit,
                ..RetrievalConfig::default()
            },
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match non_empty(lookup(key)) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Invalid value {:?} for {}, using default", raw, key);
            default
        }),
    }
}

//! Ollama-compatible generation engine (`POST {base}/api/generate`, non-streaming).

use super::{endpoint, http_client};
use crate::ports::generation::GenerationEngine;
use crate::ports::PortError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_MODEL: &str = "llama3.2:3b";

const SYSTEM_PROMPT: &str = "You write study material for university lectures. \
    Use only the lecture excerpts you are given and follow the requested output format exactly.";

#[derive(Debug, Error)]
pub enum GenerationClientError {
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("generation engine returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: i32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    eval_duration: Option<u64>,
}

pub struct OllamaEngine {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEngine {
    pub fn new(base_url: &str) -> Result<Self, GenerationClientError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    fn prompt(context: &str, instruction: &str) -> String {
        format!(
            "---\nLECTURE EXCERPTS:\n{}\n---\n\n{}",
            context, instruction
        )
    }
}

#[async_trait]
impl GenerationEngine for OllamaEngine {
    async fn generate(&self, context: &str, instruction: &str) -> Result<String, PortError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: Self::prompt(context, instruction),
            system: SYSTEM_PROMPT,
            stream: false,
            options: GenerateOptions {
                temperature: 0.3,
                num_predict: 2048,
            },
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "api/generate"))
            .json(&request)
            .send()
            .await
            .map_err(GenerationClientError::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::Status { status, body }.into());
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(GenerationClientError::from)?;
        debug!(
            "Generation with {}: {} chars, eval_duration={:?}ms",
            self.model,
            result.response.len(),
            result.eval_duration.map(|d| d / 1_000_000)
        );
        Ok(result.response)
    }
}

//! Content index client: `POST {base}/tasks` to ingest, `POST {base}/search` to query.

use super::{endpoint, http_client};
use crate::domain::segment::{EmbeddingScope, RawHit};
use crate::ports::index::ContentIndex;
use crate::ports::PortError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Error)]
pub enum ContentIndexError {
    #[error("content index request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("content index returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    storage_uri: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    index_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(alias = "id")]
    task_id: String,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    index_id: &'a str,
    query: &'a str,
    scopes: &'a [EmbeddingScope],
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default, alias = "data")]
    hits: Vec<RawHit>,
}

pub struct HttpContentIndex {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpContentIndex {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ContentIndexError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.to_string(),
            api_key,
        })
    }

    async fn post<Req: Serialize + ?Sized, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, ContentIndexError> {
        let mut request = self.client.post(endpoint(&self.base_url, path)).json(body);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ContentIndexError::Status { status, body });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ContentIndex for HttpContentIndex {
    async fn submit_indexing(
        &self,
        storage_uri: &str,
        index_id: Option<String>,
    ) -> Result<String, PortError> {
        let response: SubmitResponse = self
            .post(
                "tasks",
                &SubmitRequest {
                    storage_uri,
                    index_id,
                },
            )
            .await?;
        debug!("Content index accepted {} as task {}", storage_uri, response.task_id);
        Ok(response.task_id)
    }

    async fn search(
        &self,
        index_id: &str,
        query: &str,
        scopes: &[EmbeddingScope],
    ) -> Result<Vec<RawHit>, PortError> {
        let response: SearchResponse = self
            .post(
                "search",
                &SearchRequest {
                    index_id,
                    query,
                    scopes,
                },
            )
            .await?;
        Ok(response.hits)
    }
}

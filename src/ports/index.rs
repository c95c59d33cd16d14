use super::PortError;
use crate::domain::segment::{EmbeddingScope, RawHit};
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentIndex: Send + Sync {
    /// Ask the index to ingest a video; returns the external task handle.
    /// Completion is reported out-of-band as a `CompletionSignal`.
    async fn submit_indexing(
        &self,
        storage_uri: &str,
        index_id: Option<String>,
    ) -> Result<String, PortError>;

    /// Search an indexed video's content
    async fn search(
        &self,
        index_id: &str,
        query: &str,
        scopes: &[EmbeddingScope],
    ) -> Result<Vec<RawHit>, PortError>;
}

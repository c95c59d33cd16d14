use crate::domain::study::GenerationStage;
use crate::domain::video::{TransitionError, VideoStatus};
use std::time::Duration;
use thiserror::Error;

/// Errors from registering, submitting, and completing video indexing.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("video {0} not found")]
    VideoNotFound(String),

    #[error("video {video_id} already submitted (status {status})")]
    AlreadySubmitted {
        video_id: String,
        status: VideoStatus,
    },

    /// The content index refused or timed out; the record is unchanged.
    #[error("index submission failed for video {video_id}: {message}")]
    IndexSubmission { video_id: String, message: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("metadata store: {0}")]
    Store(String),
}

impl LifecycleError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LifecycleError::IndexSubmission { .. } | LifecycleError::Store(_)
        )
    }
}

/// Errors from looking up grounding segments.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("video {0} not found")]
    VideoNotFound(String),

    #[error("video {0} has no index or task to search")]
    NotIndexed(String),

    #[error("content index search failed: {0}")]
    Index(String),

    #[error("content index search timed out after {0:?}")]
    Timeout(Duration),

    #[error("metadata store: {0}")]
    Store(String),
}

/// Errors from `generate_all`. Each aborts the whole call; nothing is persisted.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("video {0} not found")]
    VideoNotFound(String),

    #[error("video {video_id} is not ready (status {status})")]
    VideoNotReady {
        video_id: String,
        status: VideoStatus,
    },

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("no grounding segments found for video {0}")]
    InsufficientGroundingData(String),

    #[error("generation incomplete at stage {stage}: {message}")]
    GenerationIncomplete {
        stage: GenerationStage,
        message: String,
    },

    #[error("metadata store: {0}")]
    Store(String),
}

impl GenerationError {
    /// Stage to report on the event stream for this failure.
    pub fn stage(&self) -> GenerationStage {
        match self {
            GenerationError::GenerationIncomplete { stage, .. } => *stage,
            GenerationError::Store(_) => GenerationStage::Bundle,
            _ => GenerationStage::Grounding,
        }
    }
}

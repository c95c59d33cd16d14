use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Indexing lifecycle of an uploaded video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Uploaded,
    Indexing,
    Ready,
    Failed,
}

impl VideoStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, VideoStatus::Ready | VideoStatus::Failed)
    }

    /// Whether a record in this state must carry an indexing task handle.
    pub fn has_task(self) -> bool {
        !matches!(self, VideoStatus::Uploaded)
    }

    pub fn can_transition_to(self, next: VideoStatus) -> bool {
        matches!(
            (self, next),
            (VideoStatus::Uploaded, VideoStatus::Indexing)
                | (VideoStatus::Indexing, VideoStatus::Ready)
                | (VideoStatus::Indexing, VideoStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VideoStatus::Uploaded => "uploaded",
            VideoStatus::Indexing => "indexing",
            VideoStatus::Ready => "ready",
            VideoStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub from: VideoStatus,
    pub to: VideoStatus,
}

/// Result reported by the content index once an indexing task settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IndexingOutcome {
    Ready {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index_id: Option<String>,
    },
    Failed {
        reason: String,
    },
}

/// Out-of-band completion message for an indexing task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSignal {
    pub task_id: String,
    #[serde(flatten)]
    pub outcome: IndexingOutcome,
}

impl CompletionSignal {
    pub fn ready(task_id: impl Into<String>, index_id: Option<String>) -> Self {
        Self {
            task_id: task_id.into(),
            outcome: IndexingOutcome::Ready { index_id },
        }
    }

    pub fn failed(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            outcome: IndexingOutcome::Failed {
                reason: reason.into(),
            },
        }
    }
}

/// Persistent state of one uploaded video.
///
/// Fields are private so that the `task_id` ⇔ `status` invariant can only be
/// changed through the transition methods below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    id: String,
    status: VideoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index_id: Option<String>,
    storage_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VideoRecord {
    pub fn new(storage_uri: impl Into<String>, index_id: Option<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), storage_uri, index_id)
    }

    pub fn with_id(
        id: impl Into<String>,
        storage_uri: impl Into<String>,
        index_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: VideoStatus::Uploaded,
            task_id: None,
            index_id,
            storage_uri: storage_uri.into(),
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> VideoStatus {
        self.status
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn index_id(&self) -> Option<&str> {
        self.index_id.as_deref()
    }

    pub fn storage_uri(&self) -> &str {
        &self.storage_uri
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Identifier to search the content index with once the video is ready.
    pub fn search_target(&self) -> Option<&str> {
        self.index_id().or(self.task_id())
    }

    /// uploaded -> indexing, recording the external task handle.
    pub(crate) fn begin_indexing(&mut self, task_id: String) -> Result<(), TransitionError> {
        self.check(VideoStatus::Indexing)?;
        self.task_id = Some(task_id);
        self.status = VideoStatus::Indexing;
        self.touch();
        Ok(())
    }

    /// indexing -> ready/failed according to the reported outcome.
    pub(crate) fn complete(
        &mut self,
        outcome: &IndexingOutcome,
    ) -> Result<VideoStatus, TransitionError> {
        match outcome {
            IndexingOutcome::Ready { index_id } => {
                self.check(VideoStatus::Ready)?;
                if let Some(index_id) = index_id {
                    self.index_id = Some(index_id.clone());
                }
                self.status = VideoStatus::Ready;
            }
            IndexingOutcome::Failed { reason } => {
                self.check(VideoStatus::Failed)?;
                self.failure_reason = Some(reason.clone());
                self.status = VideoStatus::Failed;
            }
        }
        self.touch();
        Ok(self.status)
    }

    /// Checks the `task_id` ⇔ non-uploaded invariant. The Redis store applies it
    /// to every record it loads.
    pub fn is_consistent(&self) -> bool {
        self.task_id.is_some() == self.status.has_task()
            && (self.failure_reason.is_some() == (self.status == VideoStatus::Failed))
    }

    fn check(&self, next: VideoStatus) -> Result<(), TransitionError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(TransitionError {
                from: self.status,
                to: next,
            })
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

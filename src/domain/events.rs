use super::study::GenerationStage;
use super::video::VideoStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Status,
    Heartbeat,
    GenerationProgress,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Status => "status",
            EventKind::Heartbeat => "heartbeat",
            EventKind::GenerationProgress => "generation-progress",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageOutcome {
    Started,
    Completed,
    Partial,
    Failed,
}

/// One message on a video's event stream, serialized as a single JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyEvent {
    pub event: EventKind,
    pub video_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VideoStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<GenerationStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StageOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StudyEvent {
    fn bare(event: EventKind, video_id: &str) -> Self {
        Self {
            event,
            video_id: video_id.to_string(),
            status: None,
            stage: None,
            outcome: None,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn status(video_id: &str, status: VideoStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::bare(EventKind::Status, video_id)
        }
    }

    pub fn heartbeat(video_id: &str) -> Self {
        Self::bare(EventKind::Heartbeat, video_id)
    }

    pub fn progress(video_id: &str, stage: GenerationStage, outcome: StageOutcome) -> Self {
        Self {
            stage: Some(stage),
            outcome: Some(outcome),
            ..Self::bare(EventKind::GenerationProgress, video_id)
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

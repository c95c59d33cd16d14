use super::PortError;
use crate::domain::segment::Segment;
use crate::domain::study::StudyBundle;
use crate::domain::video::VideoRecord;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert or overwrite a video record (also indexes it by task id, if any)
    async fn put_video(&self, record: &VideoRecord) -> Result<(), PortError>;

    /// Get a video record
    async fn get_video(&self, video_id: &str) -> Result<Option<VideoRecord>, PortError>;

    /// Find the video an indexing task belongs to
    async fn get_video_by_task(&self, task_id: &str) -> Result<Option<VideoRecord>, PortError>;

    /// Replace the full segment set of a video as one unit
    async fn put_segments(&self, video_id: &str, segments: &[Segment]) -> Result<(), PortError>;

    /// Get the stored segments of a video, ordered by start time
    async fn get_segments(&self, video_id: &str) -> Result<Vec<Segment>, PortError>;

    /// Replace the study bundle of a video
    async fn put_study_bundle(&self, bundle: &StudyBundle) -> Result<(), PortError>;

    /// Get the study bundle of a video
    async fn get_study_bundle(&self, video_id: &str) -> Result<Option<StudyBundle>, PortError>;
}

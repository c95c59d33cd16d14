//! In-process metadata store, used by tests and by the monolith when no
//! Redis URL is configured.

use crate::domain::segment::Segment;
use crate::domain::study::StudyBundle;
use crate::domain::video::VideoRecord;
use crate::ports::repository::MetadataStore;
use crate::ports::PortError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    videos: HashMap<String, VideoRecord>,
    tasks: HashMap<String, String>,
    segments: HashMap<String, Vec<Segment>>,
    bundles: HashMap<String, StudyBundle>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn video_count(&self) -> usize {
        self.tables.read().await.videos.len()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn put_video(&self, record: &VideoRecord) -> Result<(), PortError> {
        let mut tables = self.tables.write().await;
        if let Some(task_id) = record.task_id() {
            tables
                .tasks
                .insert(task_id.to_string(), record.id().to_string());
        }
        tables
            .videos
            .insert(record.id().to_string(), record.clone());
        Ok(())
    }

    async fn get_video(&self, video_id: &str) -> Result<Option<VideoRecord>, PortError> {
        Ok(self.tables.read().await.videos.get(video_id).cloned())
    }

    async fn get_video_by_task(&self, task_id: &str) -> Result<Option<VideoRecord>, PortError> {
        let tables = self.tables.read().await;
        Ok(tables
            .tasks
            .get(task_id)
            .and_then(|video_id| tables.videos.get(video_id))
            .cloned())
    }

    async fn put_segments(&self, video_id: &str, segments: &[Segment]) -> Result<(), PortError> {
        let mut ordered = segments.to_vec();
        ordered.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));
        self.tables
            .write()
            .await
            .segments
            .insert(video_id.to_string(), ordered);
        Ok(())
    }

    async fn get_segments(&self, video_id: &str) -> Result<Vec<Segment>, PortError> {
        Ok(self
            .tables
            .read()
            .await
            .segments
            .get(video_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn put_study_bundle(&self, bundle: &StudyBundle) -> Result<(), PortError> {
        self.tables
            .write()
            .await
            .bundles
            .insert(bundle.video_id.clone(), bundle.clone());
        Ok(())
    }

    async fn get_study_bundle(&self, video_id: &str) -> Result<Option<StudyBundle>, PortError> {
        Ok(self.tables.read().await.bundles.get(video_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::segment::{merge_hits, RawHit};

    #[tokio::test]
    async fn test_video_is_found_by_task_once_submitted() {
        let store = MemoryStore::new();
        let mut record = VideoRecord::with_id("v1", "s3://lectures/v1.mp4", None);
        store.put_video(&record).await.unwrap();
        assert!(store.get_video_by_task("t1").await.unwrap().is_none());

        record.begin_indexing("t1".to_string()).unwrap();
        store.put_video(&record).await.unwrap();

        let found = store.get_video_by_task("t1").await.unwrap().unwrap();
        assert_eq!(found.id(), "v1");
        assert_eq!(store.video_count().await, 1);
    }

    #[tokio::test]
    async fn test_segments_are_replaced_as_a_unit() {
        let store = MemoryStore::new();
        let first = merge_hits(
            "v1",
            vec![
                RawHit::new(30.0, 40.0, "second", 0.5),
                RawHit::new(0.0, 10.0, "first", 0.9),
            ],
            0.0,
        );
        store.put_segments("v1", &first).await.unwrap();
        let stored = store.get_segments("v1").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored[0].start_sec < stored[1].start_sec);

        let second = merge_hits("v1", vec![RawHit::new(50.0, 60.0, "only", 0.7)], 0.0);
        store.put_segments("v1", &second).await.unwrap();
        assert_eq!(store.get_segments("v1").await.unwrap(), second);
        assert!(store.get_segments("v2").await.unwrap().is_empty());
    }
}

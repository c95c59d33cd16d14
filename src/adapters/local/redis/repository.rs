//! Redis MetadataStore implementation.

use super::error::StoreError;
use super::pool::RedisPool;
use super::{key, BUNDLE_PREFIX, SEGMENTS_PREFIX, TASK_PREFIX, VIDEO_PREFIX};
use crate::domain::segment::Segment;
use crate::domain::study::StudyBundle;
use crate::domain::video::VideoRecord;
use crate::ports::repository::MetadataStore;
use crate::ports::PortError;
use async_trait::async_trait;
use deadpool_redis::redis::{pipe, AsyncCommands};
use serde::de::DeserializeOwned;
use tracing::warn;

impl RedisPool {
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let mut conn = self.conn().await?;
        let json: Option<String> = conn.get(key).await?;
        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }
}

/// Refuses records whose task id and status disagree, e.g. written by an
/// older or foreign process under the same keys.
fn checked(record: Option<VideoRecord>) -> Result<Option<VideoRecord>, StoreError> {
    match record {
        Some(record) if !record.is_consistent() => {
            warn!("Refusing inconsistent video record {}", record.id());
            Err(StoreError::Inconsistent(record.id().to_string()))
        }
        other => Ok(other),
    }
}

#[async_trait]
impl MetadataStore for RedisPool {
    async fn put_video(&self, record: &VideoRecord) -> Result<(), PortError> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(record).map_err(StoreError::from)?;

        // Record and task index land together or not at all.
        let mut tx = pipe();
        tx.atomic()
            .set(key(VIDEO_PREFIX, record.id()), json)
            .ignore();
        if let Some(task_id) = record.task_id() {
            tx.set(key(TASK_PREFIX, task_id), record.id()).ignore();
        }
        let _: () = tx.query_async(&mut conn).await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn get_video(&self, video_id: &str) -> Result<Option<VideoRecord>, PortError> {
        let record = self.get_json(&key(VIDEO_PREFIX, video_id)).await?;
        Ok(checked(record)?)
    }

    async fn get_video_by_task(&self, task_id: &str) -> Result<Option<VideoRecord>, PortError> {
        let mut conn = self.conn().await?;
        let video_id: Option<String> = conn
            .get(key(TASK_PREFIX, task_id))
            .await
            .map_err(StoreError::from)?;
        match video_id {
            Some(video_id) => self.get_video(&video_id).await,
            None => Ok(None),
        }
    }

    async fn put_segments(&self, video_id: &str, segments: &[Segment]) -> Result<(), PortError> {
        let mut ordered = segments.to_vec();
        ordered.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));
        let json = serde_json::to_string(&ordered).map_err(StoreError::from)?;

        // One SET replaces the whole set, so readers never see a mix.
        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(key(SEGMENTS_PREFIX, video_id), json)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn get_segments(&self, video_id: &str) -> Result<Vec<Segment>, PortError> {
        Ok(self
            .get_json(&key(SEGMENTS_PREFIX, video_id))
            .await?
            .unwrap_or_default())
    }

    async fn put_study_bundle(&self, bundle: &StudyBundle) -> Result<(), PortError> {
        let json = serde_json::to_string(bundle).map_err(StoreError::from)?;
        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(key(BUNDLE_PREFIX, &bundle.video_id), json)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn get_study_bundle(&self, video_id: &str) -> Result<Option<StudyBundle>, PortError> {
        Ok(self.get_json(&key(BUNDLE_PREFIX, video_id)).await?)
    }
}

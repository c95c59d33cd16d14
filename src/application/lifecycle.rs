use super::locks::KeyedLocks;
use crate::domain::events::StudyEvent;
use crate::domain::retry::RetryPolicy;
use crate::domain::video::{CompletionSignal, VideoRecord, VideoStatus};
use crate::error::LifecycleError;
use crate::ports::events::EventPublisher;
use crate::ports::index::ContentIndex;
use crate::ports::repository::MetadataStore;
use crate::ports::PortError;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to an inbound completion signal.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    Applied(VideoRecord),
    /// Unknown task, or the video already left `indexing`.
    Ignored,
}

/// Owns the uploaded -> indexing -> ready/failed state machine.
///
/// Transitions of one video are serialized; different videos proceed
/// independently. Every applied transition is persisted before its status
/// event is published.
pub struct VideoLifecycleController<S, I, P> {
    store: Arc<S>,
    index: Arc<I>,
    events: Arc<P>,
    submit_policy: RetryPolicy,
    default_index_id: Option<String>,
    locks: KeyedLocks,
}

impl<S, I, P> VideoLifecycleController<S, I, P>
where
    S: MetadataStore,
    I: ContentIndex,
    P: EventPublisher,
{
    pub fn new(store: Arc<S>, index: Arc<I>, events: Arc<P>) -> Self {
        Self {
            store,
            index,
            events,
            submit_policy: RetryPolicy::default(),
            default_index_id: None,
            locks: KeyedLocks::new(),
        }
    }

    pub fn with_submit_policy(mut self, policy: RetryPolicy) -> Self {
        self.submit_policy = policy;
        self
    }

    /// Index new videos are submitted into when none is given at registration.
    pub fn with_default_index(mut self, index_id: Option<String>) -> Self {
        self.default_index_id = index_id;
        self
    }

    pub async fn register(&self, storage_uri: &str) -> Result<VideoRecord, LifecycleError> {
        let record = VideoRecord::new(storage_uri, self.default_index_id.clone());
        self.store.put_video(&record).await.map_err(store_error)?;
        info!("Registered video {} ({})", record.id(), storage_uri);
        Ok(record)
    }

    pub async fn status(&self, video_id: &str) -> Result<VideoRecord, LifecycleError> {
        self.store
            .get_video(video_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| LifecycleError::VideoNotFound(video_id.to_string()))
    }

    /// Hands an `uploaded` video to the content index and moves it to `indexing`.
    ///
    /// If every attempt fails the record is left untouched, so the call can
    /// simply be repeated.
    pub async fn submit(&self, video_id: &str) -> Result<VideoRecord, LifecycleError> {
        let _guard = self.locks.lock(video_id).await;
        let mut record = self.status(video_id).await?;
        if record.status() != VideoStatus::Uploaded {
            return Err(LifecycleError::AlreadySubmitted {
                video_id: video_id.to_string(),
                status: record.status(),
            });
        }

        let task_id = self.request_indexing(&record).await?;
        record.begin_indexing(task_id)?;
        self.store.put_video(&record).await.map_err(store_error)?;

        info!(
            "Video {} submitted for indexing (task {})",
            video_id,
            record.task_id().unwrap_or_default()
        );
        self.publish_status(&record);
        Ok(record)
    }

    async fn request_indexing(&self, record: &VideoRecord) -> Result<String, LifecycleError> {
        let mut budget = self.submit_policy.start();
        let mut last_error = String::from("no attempt was made");

        while let Some(attempt) = budget.next_attempt().await {
            let timeout = budget.attempt_timeout();
            let call = self
                .index
                .submit_indexing(record.storage_uri(), record.index_id().map(str::to_string));

            match tokio::time::timeout(timeout, call).await {
                Ok(Ok(task_id)) if !task_id.trim().is_empty() => return Ok(task_id),
                Ok(Ok(_)) => last_error = "content index returned an empty task id".to_string(),
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("timed out after {:?}", timeout),
            }
            warn!(
                "Index submission attempt {} for video {} failed: {}",
                attempt + 1,
                record.id(),
                last_error
            );
        }

        Err(LifecycleError::IndexSubmission {
            video_id: record.id().to_string(),
            message: last_error,
        })
    }

    /// Applies an out-of-band indexing result.
    ///
    /// Signals for unknown tasks, superseded tasks, or videos that already
    /// settled are ignored, so duplicate delivery fires at most one
    /// transition and one event.
    pub async fn on_completion_signal(
        &self,
        signal: &CompletionSignal,
    ) -> Result<SignalOutcome, LifecycleError> {
        let Some(found) = self
            .store
            .get_video_by_task(&signal.task_id)
            .await
            .map_err(store_error)?
        else {
            warn!("Ignoring completion for unknown task {}", signal.task_id);
            return Ok(SignalOutcome::Ignored);
        };

        let _guard = self.locks.lock(found.id()).await;
        // Re-read under the lock; a concurrent delivery may have settled it.
        let Some(mut record) = self.store.get_video(found.id()).await.map_err(store_error)?
        else {
            return Ok(SignalOutcome::Ignored);
        };
        if record.status() != VideoStatus::Indexing
            || record.task_id() != Some(signal.task_id.as_str())
        {
            debug!(
                "Ignoring completion for task {}: video {} is {}",
                signal.task_id,
                record.id(),
                record.status()
            );
            return Ok(SignalOutcome::Ignored);
        }

        let status = record.complete(&signal.outcome)?;
        self.store.put_video(&record).await.map_err(store_error)?;

        match record.failure_reason() {
            Some(reason) => warn!("Video {} failed indexing: {}", record.id(), reason),
            None => info!("Video {} is {}", record.id(), status),
        }
        self.publish_status(&record);
        Ok(SignalOutcome::Applied(record))
    }

    fn publish_status(&self, record: &VideoRecord) {
        let mut event = StudyEvent::status(record.id(), record.status());
        if let Some(reason) = record.failure_reason() {
            event = event.with_detail(reason);
        }
        let reached = self.events.publish(record.id(), event);
        debug!(
            "Status {} of video {} reached {} subscribers",
            record.status(),
            record.id(),
            reached
        );
    }
}

fn store_error(e: PortError) -> LifecycleError {
    LifecycleError::Store(e.to_string())
}

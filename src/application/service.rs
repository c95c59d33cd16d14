use super::lifecycle::{SignalOutcome, VideoLifecycleController};
use super::retriever::{RetrievalConfig, SegmentRetriever};
use super::synthesizer::StudyMaterialSynthesizer;
use crate::adapters::local::events::{EventBroadcaster, SubscriberConnection};
use crate::domain::retry::RetryPolicy;
use crate::domain::segment::Segment;
use crate::domain::study::{GenerationOptions, StudyBundle};
use crate::domain::video::{CompletionSignal, VideoRecord, VideoStatus};
use crate::error::{GenerationError, LifecycleError, RetrievalError};
use crate::ports::events::EventPublisher;
use crate::ports::generation::GenerationEngine;
use crate::ports::index::ContentIndex;
use crate::ports::repository::MetadataStore;
use std::sync::Arc;
use tracing::warn;

/// Tunables of the pipeline, usually built from `ServiceConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub default_index_id: Option<String>,
    pub submit_policy: RetryPolicy,
    pub generation_policy: RetryPolicy,
    pub retrieval: RetrievalConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_index_id: None,
            submit_policy: RetryPolicy::default().with_backoff(std::time::Duration::ZERO),
            generation_policy: RetryPolicy::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

/// Entry point used by the HTTP layer: one instance per process.
pub struct StudyService<S, I, G, P> {
    lifecycle: VideoLifecycleController<S, I, P>,
    retriever: Arc<SegmentRetriever<S, I>>,
    synthesizer: StudyMaterialSynthesizer<S, I, G, P>,
    events: Arc<P>,
}

impl<S, I, G, P> StudyService<S, I, G, P>
where
    S: MetadataStore,
    I: ContentIndex,
    G: GenerationEngine,
    P: EventPublisher,
{
    pub fn new(
        store: Arc<S>,
        index: Arc<I>,
        engine: Arc<G>,
        events: Arc<P>,
        settings: PipelineSettings,
    ) -> Self {
        let lifecycle =
            VideoLifecycleController::new(Arc::clone(&store), Arc::clone(&index), Arc::clone(&events))
                .with_submit_policy(settings.submit_policy)
                .with_default_index(settings.default_index_id);
        let retriever = Arc::new(SegmentRetriever::new(
            Arc::clone(&store),
            index,
            settings.retrieval,
        ));
        let synthesizer = StudyMaterialSynthesizer::new(
            store,
            Arc::clone(&retriever),
            engine,
            Arc::clone(&events),
        )
        .with_policy(settings.generation_policy);

        Self {
            lifecycle,
            retriever,
            synthesizer,
            events,
        }
    }

    pub fn events(&self) -> &Arc<P> {
        &self.events
    }

    pub async fn register_video(&self, storage_uri: &str) -> Result<VideoRecord, LifecycleError> {
        self.lifecycle.register(storage_uri).await
    }

    pub async fn submit_video(&self, video_id: &str) -> Result<VideoRecord, LifecycleError> {
        self.lifecycle.submit(video_id).await
    }

    pub async fn video_status(&self, video_id: &str) -> Result<VideoRecord, LifecycleError> {
        self.lifecycle.status(video_id).await
    }

    /// Applies an indexing result; a video that became ready gets its segment
    /// snapshot stored. A failed snapshot does not undo the transition.
    pub async fn handle_completion(
        &self,
        signal: &CompletionSignal,
    ) -> Result<SignalOutcome, LifecycleError> {
        let outcome = self.lifecycle.on_completion_signal(signal).await?;
        if let SignalOutcome::Applied(record) = &outcome {
            if record.status() == VideoStatus::Ready {
                if let Err(e) = self.retriever.snapshot(record.id()).await {
                    warn!("Segment snapshot for video {} failed: {}", record.id(), e);
                }
            }
        }
        Ok(outcome)
    }

    pub async fn generate_study_bundle(
        &self,
        video_id: &str,
        options: &GenerationOptions,
    ) -> Result<StudyBundle, GenerationError> {
        self.synthesizer.generate_all(video_id, options).await
    }

    pub async fn study_bundle(&self, video_id: &str) -> Result<Option<StudyBundle>, GenerationError> {
        self.synthesizer.bundle(video_id).await
    }

    pub async fn segments(&self, video_id: &str) -> Result<Vec<Segment>, RetrievalError> {
        self.retriever.segments(video_id).await
    }
}

impl<S, I, G> StudyService<S, I, G, EventBroadcaster>
where
    S: MetadataStore,
    I: ContentIndex,
    G: GenerationEngine,
{
    /// Live events of an existing video.
    pub async fn subscribe_to_events(
        &self,
        video_id: &str,
    ) -> Result<SubscriberConnection, LifecycleError> {
        self.lifecycle.status(video_id).await?;
        Ok(self.events.subscribe(video_id))
    }
}

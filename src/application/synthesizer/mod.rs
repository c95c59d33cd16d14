//! Grounded study-material generation with a validation gate.

mod parse;
mod prompts;

use super::locks::KeyedLocks;
use super::retriever::{SegmentRetriever, BROAD_QUERY};
use crate::domain::events::{StageOutcome, StudyEvent};
use crate::domain::retry::{RetryBudget, RetryPolicy};
use crate::domain::segment::Segment;
use crate::domain::study::{
    Flashcard, GenerationOptions, GenerationStage, QuizItem, StudyBundle, TopicDeck,
};
use crate::domain::validation::{
    comparison_key, ContentKind, ContentValidator, RejectReason, Verdict,
};
use crate::domain::video::VideoStatus;
use crate::error::GenerationError;
use crate::ports::events::EventPublisher;
use crate::ports::generation::GenerationEngine;
use crate::ports::index::ContentIndex;
use crate::ports::repository::MetadataStore;
use crate::ports::PortError;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs the summary -> topics -> flashcards -> quiz pipeline for a ready video.
///
/// Every candidate the engine returns goes through [`ContentValidator`]
/// before it can enter the bundle. Runs for the same video are serialized.
pub struct StudyMaterialSynthesizer<S, I, G, P> {
    store: Arc<S>,
    retriever: Arc<SegmentRetriever<S, I>>,
    engine: Arc<G>,
    events: Arc<P>,
    validator: ContentValidator,
    policy: RetryPolicy,
    locks: KeyedLocks,
}

impl<S, I, G, P> StudyMaterialSynthesizer<S, I, G, P>
where
    S: MetadataStore,
    I: ContentIndex,
    G: GenerationEngine,
    P: EventPublisher,
{
    pub fn new(
        store: Arc<S>,
        retriever: Arc<SegmentRetriever<S, I>>,
        engine: Arc<G>,
        events: Arc<P>,
    ) -> Self {
        Self {
            store,
            retriever,
            engine,
            events,
            validator: ContentValidator::new(),
            policy: RetryPolicy::default(),
            locks: KeyedLocks::new(),
        }
    }

    /// Bounds attempts and elapsed time of every stage.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Generates, validates, persists, and returns a fresh bundle.
    ///
    /// On error nothing is persisted and a `failed` progress event naming the
    /// stage is published.
    pub async fn generate_all(
        &self,
        video_id: &str,
        options: &GenerationOptions,
    ) -> Result<StudyBundle, GenerationError> {
        let _guard = self.locks.lock(video_id).await;
        let result = self.run(video_id, options).await;
        if let Err(e) = &result {
            warn!("Study generation for video {} failed: {}", video_id, e);
            self.events.publish(
                video_id,
                StudyEvent::progress(video_id, e.stage(), StageOutcome::Failed)
                    .with_detail(e.to_string()),
            );
        }
        result
    }

    pub async fn bundle(&self, video_id: &str) -> Result<Option<StudyBundle>, GenerationError> {
        self.store
            .get_study_bundle(video_id)
            .await
            .map_err(store_error)
    }

    async fn run(
        &self,
        video_id: &str,
        options: &GenerationOptions,
    ) -> Result<StudyBundle, GenerationError> {
        let record = self
            .store
            .get_video(video_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| GenerationError::VideoNotFound(video_id.to_string()))?;
        if record.status() != VideoStatus::Ready {
            return Err(GenerationError::VideoNotReady {
                video_id: video_id.to_string(),
                status: record.status(),
            });
        }

        self.progress(video_id, GenerationStage::Grounding, StageOutcome::Started, None);
        let query = options.query.as_deref().unwrap_or(BROAD_QUERY);
        let segments = self
            .retriever
            .retrieve_for(&record, query, options.max_hits.max(1))
            .await?;
        if segments.is_empty() {
            return Err(GenerationError::InsufficientGroundingData(
                video_id.to_string(),
            ));
        }
        self.progress(
            video_id,
            GenerationStage::Grounding,
            StageOutcome::Completed,
            Some(format!("{} segments", segments.len())),
        );
        let context = prompts::context(&segments);

        let summary = self.summary(video_id, &context, options).await?;
        let topics = self.topics(video_id, &context, options.topics_count).await?;

        self.progress(video_id, GenerationStage::Flashcards, StageOutcome::Started, None);
        let mut flashcards_by_topic = BTreeMap::new();
        for topic in &topics {
            let context = prompts::context(&relevant_segments(topic, &segments));
            let deck = self
                .flashcards(topic, &context, options.flashcards_per_topic)
                .await;
            flashcards_by_topic.insert(topic.clone(), deck);
        }
        let partial = flashcards_by_topic.values().any(|deck| deck.is_partial);
        self.progress(video_id, GenerationStage::Flashcards, finished(partial), None);

        self.progress(video_id, GenerationStage::Quiz, StageOutcome::Started, None);
        let mut quiz_by_topic = BTreeMap::new();
        for topic in &topics {
            let context = prompts::context(&relevant_segments(topic, &segments));
            let deck = self.quiz(topic, &context, options.quiz_per_topic).await;
            quiz_by_topic.insert(topic.clone(), deck);
        }
        let partial = quiz_by_topic.values().any(|deck| deck.is_partial);
        self.progress(video_id, GenerationStage::Quiz, finished(partial), None);

        let bundle = StudyBundle {
            video_id: video_id.to_string(),
            query: options.query.clone(),
            summary,
            topics,
            flashcards_by_topic,
            quiz_by_topic,
            grounding_segments: segments,
            generated_at: Utc::now(),
        };

        let violations = self.validator.audit(&bundle);
        if let Some(first) = violations.first() {
            return Err(GenerationError::GenerationIncomplete {
                stage: GenerationStage::Bundle,
                message: format!(
                    "{} violations, first at {}: {}",
                    violations.len(),
                    first.location,
                    first.reason
                ),
            });
        }

        self.store
            .put_study_bundle(&bundle)
            .await
            .map_err(store_error)?;
        info!(
            "Study bundle for video {} ready: {} topics{}",
            video_id,
            bundle.topics.len(),
            if bundle.is_partial() { " (partial)" } else { "" }
        );
        self.progress(
            video_id,
            GenerationStage::Bundle,
            finished(bundle.is_partial()),
            None,
        );
        Ok(bundle)
    }

    async fn summary(
        &self,
        video_id: &str,
        context: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        self.progress(video_id, GenerationStage::Summary, StageOutcome::Started, None);
        let mut budget = self.policy.start();
        let mut rejected: Option<RejectReason> = None;
        let mut last_error = String::from("no attempt was made");

        while budget.next_attempt().await.is_some() {
            let instruction = prompts::summary(options, rejected.as_ref());
            let raw = match self.call(&budget, context, &instruction).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Summary call for video {} failed: {}", video_id, e);
                    last_error = e;
                    continue;
                }
            };

            let text = parse::prose(&raw);
            match self
                .validator
                .validate_against_prompt(&text, ContentKind::Summary, &instruction)
            {
                Verdict::Pass => {
                    self.progress(video_id, GenerationStage::Summary, StageOutcome::Completed, None);
                    return Ok(text);
                }
                Verdict::Reject(reason) => {
                    warn!("Rejected summary for video {}: {}", video_id, reason);
                    last_error = reason.to_string();
                    rejected = Some(reason);
                }
            }
        }

        Err(GenerationError::GenerationIncomplete {
            stage: GenerationStage::Summary,
            message: format!(
                "{} attempts exhausted, last: {}",
                budget.attempts_used(),
                last_error
            ),
        })
    }

    /// Collects up to `count` valid, case-insensitively distinct topic labels,
    /// accumulating across attempts.
    async fn topics(
        &self,
        video_id: &str,
        context: &str,
        count: usize,
    ) -> Result<Vec<String>, GenerationError> {
        self.progress(video_id, GenerationStage::Topics, StageOutcome::Started, None);
        let wanted = count.max(1);
        let mut budget = self.policy.start();
        let mut topics: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let mut rejected: Option<RejectReason> = None;
        let mut last_error = String::from("no attempt was made");

        while topics.len() < wanted {
            if budget.next_attempt().await.is_none() {
                break;
            }
            let instruction = prompts::topics(wanted - topics.len(), &topics, rejected.as_ref());
            let raw = match self.call(&budget, context, &instruction).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Topic call for video {} failed: {}", video_id, e);
                    last_error = e;
                    continue;
                }
            };
            let Some(candidates) = parse::topics(&raw) else {
                last_error = "response held no JSON list of topics".to_string();
                continue;
            };

            for label in candidates {
                if topics.len() >= wanted {
                    break;
                }
                match self.validator.validate(&label, ContentKind::Topic) {
                    Verdict::Pass if seen.insert(comparison_key(&label)) => topics.push(label),
                    Verdict::Pass => debug!("Dropped duplicate topic {:?}", label),
                    Verdict::Reject(reason) => {
                        warn!("Rejected topic {:?} for video {}: {}", label, video_id, reason);
                        last_error = reason.to_string();
                        rejected = Some(reason);
                    }
                }
            }
        }

        if topics.is_empty() {
            return Err(GenerationError::GenerationIncomplete {
                stage: GenerationStage::Topics,
                message: format!("no valid topics, last: {}", last_error),
            });
        }
        self.progress(
            video_id,
            GenerationStage::Topics,
            finished(topics.len() < wanted),
            Some(format!("{} of {} topics", topics.len(), wanted)),
        );
        Ok(topics)
    }

    async fn flashcards(
        &self,
        topic: &str,
        context: &str,
        requested: usize,
    ) -> TopicDeck<Flashcard> {
        self.deck(
            topic,
            context,
            requested,
            |missing, known, rejected| prompts::flashcards(topic, missing, known, rejected),
            parse::flashcards,
            |card| self.validator.validate_flashcard(card),
            |card| comparison_key(&card.front),
        )
        .await
    }

    async fn quiz(
        &self,
        topic: &str,
        context: &str,
        requested: usize,
    ) -> TopicDeck<QuizItem> {
        self.deck(
            topic,
            context,
            requested,
            |missing, known, rejected| prompts::quiz(topic, missing, known, rejected),
            parse::quiz,
            |item| self.validator.validate_quiz_item(item),
            |item| comparison_key(&item.question),
        )
        .await
    }

    /// Shared retry loop for per-topic items. Never fails: a shortfall after
    /// the bound yields a partial deck.
    #[allow(clippy::too_many_arguments)]
    async fn deck<T>(
        &self,
        topic: &str,
        context: &str,
        requested: usize,
        instruction_for: impl Fn(usize, usize, Option<&RejectReason>) -> String,
        parse_items: fn(&str) -> Option<Vec<T>>,
        validate: impl Fn(&T) -> Verdict,
        key: impl Fn(&T) -> String,
    ) -> TopicDeck<T> {
        let mut items: Vec<T> = Vec::new();
        let mut seen = HashSet::new();
        let mut rejected: Option<RejectReason> = None;
        let mut budget = self.policy.start();

        while items.len() < requested {
            if budget.next_attempt().await.is_none() {
                break;
            }
            let instruction = instruction_for(requested - items.len(), items.len(), rejected.as_ref());
            let raw = match self.call(&budget, context, &instruction).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Item call for topic {:?} failed: {}", topic, e);
                    continue;
                }
            };
            let Some(candidates) = parse_items(&raw) else {
                warn!("Item response for topic {:?} held no JSON list", topic);
                continue;
            };

            for candidate in candidates {
                if items.len() >= requested {
                    break;
                }
                match validate(&candidate) {
                    Verdict::Pass if seen.insert(key(&candidate)) => items.push(candidate),
                    Verdict::Pass => {}
                    Verdict::Reject(reason) => {
                        warn!("Rejected item for topic {:?}: {}", topic, reason);
                        rejected = Some(reason);
                    }
                }
            }
        }

        let deck = TopicDeck::new(items, requested);
        if deck.is_partial {
            warn!(
                "Topic {:?} is partial: {} of {} items after {} attempts",
                topic,
                deck.items.len(),
                requested,
                budget.attempts_used()
            );
        }
        deck
    }

    async fn call(
        &self,
        budget: &RetryBudget,
        context: &str,
        instruction: &str,
    ) -> Result<String, String> {
        let timeout = budget.attempt_timeout();
        match tokio::time::timeout(timeout, self.engine.generate(context, instruction)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("generation timed out after {:?}", timeout)),
        }
    }

    fn progress(
        &self,
        video_id: &str,
        stage: GenerationStage,
        outcome: StageOutcome,
        detail: Option<String>,
    ) {
        let mut event = StudyEvent::progress(video_id, stage, outcome);
        if let Some(detail) = detail {
            event = event.with_detail(detail);
        }
        if outcome != StageOutcome::Started {
            info!("Video {} {} {:?}", video_id, stage, outcome);
        }
        self.events.publish(video_id, event);
    }
}

fn finished(partial: bool) -> StageOutcome {
    if partial {
        StageOutcome::Partial
    } else {
        StageOutcome::Completed
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 3)
        .map(str::to_lowercase)
}

/// Segments sharing a significant word with `topic`; all of them when none do.
fn relevant_segments(topic: &str, segments: &[Segment]) -> Vec<Segment> {
    let topic_words: HashSet<String> = words(topic).collect();
    let matching: Vec<Segment> = segments
        .iter()
        .filter(|segment| words(&segment.text).any(|w| topic_words.contains(&w)))
        .cloned()
        .collect();
    if matching.is_empty() {
        segments.to_vec()
    } else {
        matching
    }
}

fn store_error(e: PortError) -> GenerationError {
    GenerationError::Store(e.to_string())
}

#[cfg(test)]
mod tests;

//! Scripted collaborators for tests that need more than call counting.

use crate::domain::segment::{EmbeddingScope, RawHit};
use crate::domain::study::GenerationStage;
use crate::ports::generation::GenerationEngine;
use crate::ports::index::ContentIndex;
use crate::ports::PortError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Content index returning the same hits for every search.
#[derive(Default)]
pub struct FakeIndex {
    hits: Vec<RawHit>,
    search_error: Option<String>,
    search_delay: Duration,
    submit_delay: Duration,
    submissions: AtomicUsize,
    searches: Mutex<Vec<(String, String)>>,
}

impl FakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(mut self, hits: Vec<RawHit>) -> Self {
        self.hits = hits;
        self
    }

    pub fn failing_search(mut self, message: &str) -> Self {
        self.search_error = Some(message.to_string());
        self
    }

    pub fn with_search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = delay;
        self
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// `(index_id, query)` of every search so far.
    pub fn searches(&self) -> Vec<(String, String)> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentIndex for FakeIndex {
    async fn submit_indexing(
        &self,
        _storage_uri: &str,
        _index_id: Option<String>,
    ) -> Result<String, PortError> {
        tokio::time::sleep(self.submit_delay).await;
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("t{n}"))
    }

    async fn search(
        &self,
        index_id: &str,
        query: &str,
        _scopes: &[EmbeddingScope],
    ) -> Result<Vec<RawHit>, PortError> {
        tokio::time::sleep(self.search_delay).await;
        self.searches
            .lock()
            .unwrap()
            .push((index_id.to_string(), query.to_string()));
        match &self.search_error {
            Some(message) => Err(message.clone().into()),
            None => Ok(self.hits.clone()),
        }
    }
}

pub const LECTURE_SUMMARY: &str = "The lecture introduces heat engines as devices that turn \
    heat into work, derives the Carnot efficiency bound from the second law, and shows why \
    the entropy of an isolated system never decreases.";

const LECTURE_TOPICS: &str =
    r#"["Carnot efficiency bound", "Entropy of isolated systems", "Heat engine cycles"]"#;

const LECTURE_FLASHCARDS: &str = r#"[
    {"front": "What does a heat engine convert into work?", "back": "Heat drawn from a hot reservoir"},
    {"front": "What limits the efficiency of any heat engine?", "back": "The Carnot bound set by the reservoir temperatures"},
    {"front": "How does entropy change in an isolated system?", "back": "It never decreases"}
]"#;

const LECTURE_QUIZ: &str = r#"[
    {"question": "Which law of thermodynamics sets the Carnot bound?", "choices": ["First law", "Second law", "Third law", "Zeroth law"], "correct_index": 1},
    {"question": "What happens to the entropy of an isolated system over time?", "choices": ["It decreases", "It never decreases", "It oscillates"], "correct_index": 1}
]"#;

/// Generation engine answering by stage: scripted responses first, then a
/// coherent default about a thermodynamics lecture.
#[derive(Default)]
pub struct FakeEngine {
    scripts: Mutex<HashMap<GenerationStage, VecDeque<Result<String, String>>>>,
    defaults: HashMap<GenerationStage, String>,
    delay: Duration,
    calls: Mutex<Vec<(GenerationStage, String)>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        let defaults = [
            (GenerationStage::Summary, LECTURE_SUMMARY),
            (GenerationStage::Topics, LECTURE_TOPICS),
            (GenerationStage::Flashcards, LECTURE_FLASHCARDS),
            (GenerationStage::Quiz, LECTURE_QUIZ),
        ]
        .into_iter()
        .map(|(stage, text)| (stage, text.to_string()))
        .collect();
        Self {
            defaults,
            ..Self::default()
        }
    }

    /// Queues one response for `stage`, used before the default.
    pub fn respond(self, stage: GenerationStage, response: &str) -> Self {
        self.push(stage, Ok(response.to_string()))
    }

    /// Queues one failure for `stage`.
    pub fn fail(self, stage: GenerationStage, message: &str) -> Self {
        self.push(stage, Err(message.to_string()))
    }

    /// Replaces the default answer for `stage`.
    pub fn always(mut self, stage: GenerationStage, response: &str) -> Self {
        self.defaults.insert(stage, response.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn push(self, stage: GenerationStage, entry: Result<String, String>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(stage)
            .or_default()
            .push_back(entry);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, stage: GenerationStage) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .count()
    }

    /// Stage of every call, in call order.
    pub fn stages(&self) -> Vec<GenerationStage> {
        self.calls.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }

    pub fn instructions(&self, stage: GenerationStage) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, instruction)| instruction.clone())
            .collect()
    }

    fn stage_of(instruction: &str) -> GenerationStage {
        if instruction.contains("multiple-choice questions") {
            GenerationStage::Quiz
        } else if instruction.contains("flashcards about") {
            GenerationStage::Flashcards
        } else if instruction.contains("topic labels") {
            GenerationStage::Topics
        } else {
            GenerationStage::Summary
        }
    }
}

#[async_trait]
impl GenerationEngine for FakeEngine {
    async fn generate(&self, _context: &str, instruction: &str) -> Result<String, PortError> {
        let stage = Self::stage_of(instruction);
        self.calls
            .lock()
            .unwrap()
            .push((stage, instruction.to_string()));
        tokio::time::sleep(self.delay).await;

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&stage)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(message.into()),
            None => Ok(self.defaults.get(&stage).cloned().unwrap_or_default()),
        }
    }
}

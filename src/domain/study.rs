use super::segment::Segment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizItem {
    pub question: String,
    pub choices: Vec<String>,
    pub correct_index: usize,
}

/// Items generated for one topic. `is_partial` is set when fewer than
/// `requested` valid items could be produced within the retry bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicDeck<T> {
    pub items: Vec<T>,
    pub requested: usize,
    pub is_partial: bool,
}

impl<T> TopicDeck<T> {
    pub fn new(items: Vec<T>, requested: usize) -> Self {
        let is_partial = items.len() < requested;
        Self {
            items,
            requested,
            is_partial,
        }
    }
}

/// Complete set of study artifacts for a video. Replaced wholesale on regeneration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyBundle {
    pub video_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub summary: String,
    pub topics: Vec<String>,
    pub flashcards_by_topic: BTreeMap<String, TopicDeck<Flashcard>>,
    pub quiz_by_topic: BTreeMap<String, TopicDeck<QuizItem>>,
    pub grounding_segments: Vec<Segment>,
    pub generated_at: DateTime<Utc>,
}

impl StudyBundle {
    /// True when any topic came back with fewer items than requested.
    pub fn is_partial(&self) -> bool {
        self.flashcards_by_topic.values().any(|deck| deck.is_partial)
            || self.quiz_by_topic.values().any(|deck| deck.is_partial)
    }

    /// Every per-topic key must name one of the bundle's topics.
    pub fn keys_match_topics(&self) -> bool {
        self.flashcards_by_topic
            .keys()
            .chain(self.quiz_by_topic.keys())
            .all(|key| self.topics.contains(key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl SummaryLength {
    /// Target word range handed to the generation engine.
    pub fn word_range(self) -> (usize, usize) {
        match self {
            SummaryLength::Short => (60, 120),
            SummaryLength::Medium => (150, 250),
            SummaryLength::Long => (300, 500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryTone {
    #[default]
    Neutral,
    Casual,
    Academic,
}

impl SummaryTone {
    pub fn as_str(self) -> &'static str {
        match self {
            SummaryTone::Neutral => "neutral",
            SummaryTone::Casual => "casual",
            SummaryTone::Academic => "academic",
        }
    }
}

/// Caller-supplied knobs for `generate_all`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub query: Option<String>,
    pub max_hits: usize,
    pub summary_length: SummaryLength,
    pub summary_tone: SummaryTone,
    pub topics_count: usize,
    pub flashcards_per_topic: usize,
    pub quiz_per_topic: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            query: None,
            max_hits: 12,
            summary_length: SummaryLength::default(),
            summary_tone: SummaryTone::default(),
            topics_count: 5,
            flashcards_per_topic: 5,
            quiz_per_topic: 3,
        }
    }
}

impl GenerationOptions {
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// Pipeline stage, used in progress events and in `GenerationIncomplete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStage {
    Grounding,
    Summary,
    Topics,
    Flashcards,
    Quiz,
    Bundle,
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GenerationStage::Grounding => "grounding",
            GenerationStage::Summary => "summary",
            GenerationStage::Topics => "topics",
            GenerationStage::Flashcards => "flashcards",
            GenerationStage::Quiz => "quiz",
            GenerationStage::Bundle => "bundle",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deck_partial_flag() {
        let full = TopicDeck::new(vec![1, 2, 3], 3);
        assert!(!full.is_partial);
        let short = TopicDeck::new(vec![1], 3);
        assert!(short.is_partial);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: GenerationOptions =
            serde_json::from_str(r#"{"query":"overview","summary_tone":"academic"}"#).unwrap();
        assert_eq!(options.query.as_deref(), Some("overview"));
        assert_eq!(options.summary_tone, SummaryTone::Academic);
        assert_eq!(options.topics_count, 5);
        assert_eq!(options.summary_length, SummaryLength::Medium);
    }

    #[test]
    fn test_bundle_keys_must_match_topics() {
        let mut bundle = StudyBundle {
            video_id: "v1".to_string(),
            query: None,
            summary: String::new(),
            topics: vec!["Thermodynamics".to_string()],
            flashcards_by_topic: BTreeMap::new(),
            quiz_by_topic: BTreeMap::new(),
            grounding_segments: Vec::new(),
            generated_at: Utc::now(),
        };
        bundle
            .flashcards_by_topic
            .insert("Thermodynamics".to_string(), TopicDeck::new(Vec::new(), 0));
        assert!(bundle.keys_match_topics());
        bundle
            .quiz_by_topic
            .insert("Optics".to_string(), TopicDeck::new(Vec::new(), 2));
        assert!(!bundle.keys_match_topics());
        assert!(bundle.is_partial());
    }
}

//! Anti-placeholder gate for generated study content.
//!
//! Everything here is a pure function of its input: no I/O, no mutation, so a
//! verdict can be re-derived at any time (the synthesizer re-audits a finished
//! bundle before persisting it).

use super::study::{Flashcard, QuizItem, StudyBundle};
use regex::{Regex, RegexSet};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use thiserror::Error;

/// Closed set of text kinds, each with its own length rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Summary,
    Topic,
    FlashcardFront,
    FlashcardBack,
    QuizQuestion,
    QuizChoice,
}

struct KindRule {
    min_chars: usize,
    max_chars: usize,
}

impl ContentKind {
    fn rule(self) -> KindRule {
        let (min_chars, max_chars) = match self {
            ContentKind::Summary => (60, 8000),
            ContentKind::Topic => (3, 80),
            ContentKind::FlashcardFront => (8, 300),
            ContentKind::FlashcardBack => (2, 600),
            ContentKind::QuizQuestion => (10, 400),
            ContentKind::QuizChoice => (1, 200),
        };
        KindRule {
            min_chars,
            max_chars,
        }
    }

    pub fn min_chars(self) -> usize {
        self.rule().min_chars
    }
}

/// Reason code attached to a rejected candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("empty text")]
    Empty,
    #[error("too short ({actual} < {min} chars)")]
    TooShort { min: usize, actual: usize },
    #[error("too long ({actual} > {max} chars)")]
    TooLong { max: usize, actual: usize },
    #[error("template token {token}")]
    PlaceholderToken { token: String },
    #[error("generic phrase \"{phrase}\"")]
    GenericPhrase { phrase: String },
    #[error("bare label instead of content")]
    BareLabel,
    #[error("echo of the instruction")]
    PromptEcho,
    #[error("front and back are identical")]
    IdenticalSides,
    #[error("only {count} choices")]
    TooFewChoices { count: usize },
    #[error("duplicate choices")]
    DuplicateChoices,
    #[error("correct index {index} out of range for {len} choices")]
    CorrectIndexOutOfRange { index: usize, len: usize },
    #[error("duplicate topic")]
    DuplicateTopic,
    #[error("not one of the bundle topics")]
    UnknownTopic,
    #[error("{field}: {reason}")]
    InvalidField {
        field: String,
        reason: Box<RejectReason>,
    },
}

impl RejectReason {
    fn in_field(self, field: impl Into<String>) -> Self {
        RejectReason::InvalidField {
            field: field.into(),
            reason: Box::new(self),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            Verdict::Pass => None,
            Verdict::Reject(reason) => Some(reason),
        }
    }
}

impl From<Result<(), RejectReason>> for Verdict {
    fn from(result: Result<(), RejectReason>) -> Self {
        match result {
            Ok(()) => Verdict::Pass,
            Err(reason) => Verdict::Reject(reason),
        }
    }
}

/// Rule violation found when auditing a finished bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleViolation {
    pub location: String,
    pub reason: RejectReason,
}

struct Patterns {
    template: Vec<Regex>,
    generic: Vec<Regex>,
    bare_label: RegexSet,
}

// Each template pattern captures the token itself as `tok`; the leading group
// keeps indexing (`arr[i]`) and sub/superscripts (`x_{max}`) out.
const TEMPLATE_PATTERNS: &[&str] = &[
    r"(?:^|[^\w\]])(?P<tok>\[(?:[A-Z][A-Z0-9 _/\-]{1,40}|[a-z]+(?:_[a-z0-9]+)+)\])",
    r"(?P<tok>\{\{[^{}]{0,60}\}\})",
    r"(?:^|[^\w^_}\\$])(?P<tok>\{[a-z]+(?:_[a-z0-9]+)*\})",
    r"(?:^|[^\w])(?P<tok><[A-Z][A-Z_ ]{1,40}>)",
    r"(?P<tok>\[\s*(?:\.\.\.|…)\s*\])",
];

const GENERIC_PATTERNS: &[&str] = &[
    r"(?i)\blorem ipsum\b",
    r"(?i)\b(sample|generic|dummy|placeholder)\s+(text|content|summary|topic|question|answer|flashcard|card|choice|option)s?\b",
    r"(?i)\b(sample|example)\b[^.\n]{0,40}\b(goes\s+)?here\b",
    r"(?i)\binsert\b[^.\n]{0,40}\bhere\b",
    r"(?i)\b(topic|answer|question|text|content)\s+goes\s+here\b",
    r"(?i)\bplaceholder\b",
    r"(?i)\bas an ai\b",
    r"(?i)\bto be (determined|filled in)\b",
];

const BARE_LABEL_PATTERNS: &[&str] = &[
    r"(?i)^(option|choice|answer|topic|question|card|item|flashcard)\s*#?\s*([a-d]|\d{1,2})\s*[.:)]?$",
    r"(?i)^(all|none) of the above$",
    r"(?i)^(n/?a|tbd|todo|\.\.\.|…)$",
];

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        template: TEMPLATE_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("template pattern compiles"))
            .collect(),
        generic: GENERIC_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("generic pattern compiles"))
            .collect(),
        bare_label: RegexSet::new(BARE_LABEL_PATTERNS).expect("label patterns compile"),
    })
}

/// Comparison key for duplicate detection: lowercased, whitespace collapsed,
/// trailing punctuation dropped. Shared with the synthesizer so candidates it
/// keeps never trip the audit as duplicates.
pub(crate) fn comparison_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContentValidator;

impl ContentValidator {
    pub fn new() -> Self {
        Self
    }

    /// Checks free text of the given kind.
    pub fn validate(&self, text: &str, kind: ContentKind) -> Verdict {
        self.check_text(text, kind, None).into()
    }

    /// Like [`validate`](Self::validate), additionally rejecting a verbatim
    /// echo of the instruction that produced `text`.
    pub fn validate_against_prompt(&self, text: &str, kind: ContentKind, prompt: &str) -> Verdict {
        self.check_text(text, kind, Some(prompt)).into()
    }

    pub fn validate_flashcard(&self, card: &Flashcard) -> Verdict {
        self.check_flashcard(card).into()
    }

    pub fn validate_quiz_item(&self, item: &QuizItem) -> Verdict {
        self.check_quiz_item(item).into()
    }

    /// Re-runs every rule over a finished bundle.
    pub fn audit(&self, bundle: &StudyBundle) -> Vec<BundleViolation> {
        let mut violations = Vec::new();
        let mut push = |location: String, result: Result<(), RejectReason>| {
            if let Err(reason) = result {
                violations.push(BundleViolation { location, reason });
            }
        };

        push(
            "summary".to_string(),
            self.check_text(&bundle.summary, ContentKind::Summary, None),
        );

        let mut seen = HashSet::new();
        for topic in &bundle.topics {
            push(
                format!("topics/{topic}"),
                self.check_text(topic, ContentKind::Topic, None),
            );
            if !seen.insert(comparison_key(topic)) {
                push(format!("topics/{topic}"), Err(RejectReason::DuplicateTopic));
            }
        }

        for (topic, deck) in &bundle.flashcards_by_topic {
            if !bundle.topics.contains(topic) {
                push(format!("flashcards/{topic}"), Err(RejectReason::UnknownTopic));
            }
            for (i, card) in deck.items.iter().enumerate() {
                push(format!("flashcards/{topic}/{i}"), self.check_flashcard(card));
            }
        }
        for (topic, deck) in &bundle.quiz_by_topic {
            if !bundle.topics.contains(topic) {
                push(format!("quiz/{topic}"), Err(RejectReason::UnknownTopic));
            }
            for (i, item) in deck.items.iter().enumerate() {
                push(format!("quiz/{topic}/{i}"), self.check_quiz_item(item));
            }
        }
        violations
    }

    fn check_text(
        &self,
        text: &str,
        kind: ContentKind,
        prompt: Option<&str>,
    ) -> Result<(), RejectReason> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(RejectReason::Empty);
        }

        let rule = kind.rule();
        let actual = trimmed.chars().count();
        if actual < rule.min_chars {
            return Err(RejectReason::TooShort {
                min: rule.min_chars,
                actual,
            });
        }
        if actual > rule.max_chars {
            return Err(RejectReason::TooLong {
                max: rule.max_chars,
                actual,
            });
        }

        let patterns = patterns();
        for re in &patterns.template {
            if let Some(token) = re.captures(trimmed).and_then(|c| c.name("tok")) {
                return Err(RejectReason::PlaceholderToken {
                    token: token.as_str().to_string(),
                });
            }
        }
        for re in &patterns.generic {
            if let Some(m) = re.find(trimmed) {
                return Err(RejectReason::GenericPhrase {
                    phrase: m.as_str().to_lowercase(),
                });
            }
        }
        if patterns.bare_label.is_match(trimmed) {
            return Err(RejectReason::BareLabel);
        }

        if let Some(prompt) = prompt {
            let candidate = comparison_key(trimmed);
            let prompt = comparison_key(prompt);
            if !prompt.is_empty()
                && (candidate == prompt || (prompt.len() >= 24 && candidate.contains(&prompt)))
            {
                return Err(RejectReason::PromptEcho);
            }
        }
        Ok(())
    }

    fn check_flashcard(&self, card: &Flashcard) -> Result<(), RejectReason> {
        self.check_text(&card.front, ContentKind::FlashcardFront, None)
            .map_err(|r| r.in_field("front"))?;
        self.check_text(&card.back, ContentKind::FlashcardBack, None)
            .map_err(|r| r.in_field("back"))?;
        if comparison_key(&card.front) == comparison_key(&card.back) {
            return Err(RejectReason::IdenticalSides);
        }
        Ok(())
    }

    fn check_quiz_item(&self, item: &QuizItem) -> Result<(), RejectReason> {
        self.check_text(&item.question, ContentKind::QuizQuestion, None)
            .map_err(|r| r.in_field("question"))?;
        if item.choices.len() < 2 {
            return Err(RejectReason::TooFewChoices {
                count: item.choices.len(),
            });
        }
        let mut seen = HashSet::new();
        for (i, choice) in item.choices.iter().enumerate() {
            self.check_text(choice, ContentKind::QuizChoice, None)
                .map_err(|r| r.in_field(format!("choices[{i}]")))?;
            if !seen.insert(comparison_key(choice)) {
                return Err(RejectReason::DuplicateChoices);
            }
        }
        if item.correct_index >= item.choices.len() {
            return Err(RejectReason::CorrectIndexOutOfRange {
                index: item.correct_index,
                len: item.choices.len(),
            });
        }
        Ok(())
    }
}

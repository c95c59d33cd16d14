use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Which embedding space a hit was matched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingScope {
    Visual,
    Conversation,
}

impl EmbeddingScope {
    pub fn as_str(self) -> &'static str {
        match self {
            EmbeddingScope::Visual => "visual",
            EmbeddingScope::Conversation => "conversation",
        }
    }
}

/// Unmerged search hit as returned by the content index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub text: String,
    pub confidence: f64,
    #[serde(default = "default_scope")]
    pub scope: EmbeddingScope,
}

impl RawHit {
    /// Conversation-scope hit.
    pub fn new(start: f64, end: f64, text: impl Into<String>, confidence: f64) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            confidence,
            scope: EmbeddingScope::Conversation,
        }
    }

    pub fn visual(start: f64, end: f64, confidence: f64) -> Self {
        Self {
            scope: EmbeddingScope::Visual,
            ..Self::new(start, end, String::new(), confidence)
        }
    }
}

fn default_scope() -> EmbeddingScope {
    EmbeddingScope::Conversation
}

/// Time-bounded excerpt of an indexed video. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub video_id: String,
    pub start_sec: f64,
    pub end_sec: f64,
    pub text: String,
    pub confidence: f64,
    pub embedding_scope: EmbeddingScope,
    pub created_at: DateTime<Utc>,
}

impl Segment {
    /// `mm:ss-mm:ss` label used when handing segments to the generation engine.
    pub fn time_label(&self) -> String {
        format!("{}-{}", clock(self.start_sec), clock(self.end_sec))
    }
}

fn clock(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// A raw hit is usable when its range is finite and non-empty.
fn is_well_formed(hit: &RawHit) -> bool {
    hit.start.is_finite() && hit.end.is_finite() && hit.start >= 0.0 && hit.start < hit.end
}

/// Total order over hits: start, end, confidence, scope, text. Sorting with it
/// makes the merge independent of the order the index returned the hits in.
fn hit_order(a: &RawHit, b: &RawHit) -> Ordering {
    a.start
        .total_cmp(&b.start)
        .then(a.end.total_cmp(&b.end))
        .then(b.confidence.total_cmp(&a.confidence))
        .then(a.scope.cmp(&b.scope))
        .then(a.text.cmp(&b.text))
}

struct Window {
    start: f64,
    end: f64,
    confidence: f64,
    scope: EmbeddingScope,
    fragments: Vec<String>,
}

impl Window {
    fn open(hit: RawHit) -> Self {
        let mut window = Window {
            start: hit.start,
            end: hit.end,
            confidence: hit.confidence,
            scope: hit.scope,
            fragments: Vec::new(),
        };
        window.push_text(&hit.text);
        window
    }

    fn absorb(&mut self, hit: RawHit) {
        self.end = self.end.max(hit.end);
        if hit.confidence > self.confidence {
            self.confidence = hit.confidence;
            self.scope = hit.scope;
        }
        self.push_text(&hit.text);
    }

    fn push_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let duplicate = self
            .fragments
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(text) || existing.contains(text));
        if !duplicate {
            self.fragments.push(text.to_string());
        }
    }

    fn into_segment(self, video_id: &str, created_at: DateTime<Utc>) -> Segment {
        Segment {
            id: format!(
                "{}:{}-{}",
                video_id,
                (self.start * 1000.0).round() as u64,
                (self.end * 1000.0).round() as u64
            ),
            video_id: video_id.to_string(),
            start_sec: self.start,
            end_sec: self.end,
            text: self.fragments.join(" "),
            confidence: self.confidence.clamp(0.0, 1.0),
            embedding_scope: self.scope,
            created_at,
        }
    }
}

/// Merges hits whose ranges overlap or sit within `gap_secs` of each other.
///
/// The merged segment keeps the union range, the de-duplicated texts in time
/// order, and the highest confidence. Output is ordered by start time.
pub fn merge_hits(video_id: &str, mut hits: Vec<RawHit>, gap_secs: f64) -> Vec<Segment> {
    hits.retain(is_well_formed);
    hits.sort_by(hit_order);

    let gap = gap_secs.max(0.0);
    let mut windows: Vec<Window> = Vec::new();
    for hit in hits {
        match windows.last_mut() {
            Some(window) if hit.start <= window.end + gap => window.absorb(hit),
            _ => windows.push(Window::open(hit)),
        }
    }

    let created_at = Utc::now();
    windows
        .into_iter()
        .map(|window| window.into_segment(video_id, created_at))
        .collect()
}

/// Orders by confidence (highest first), then start time, and keeps `limit`.
pub fn rank_and_cap(mut segments: Vec<Segment>, limit: usize) -> Vec<Segment> {
    segments.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(a.start_sec.total_cmp(&b.start_sec))
    });
    segments.truncate(limit);
    segments
}

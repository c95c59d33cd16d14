//! Instructions handed to the generation engine, one builder per stage.

use crate::domain::segment::{EmbeddingScope, Segment};
use crate::domain::study::GenerationOptions;
use crate::domain::validation::RejectReason;

/// Grounding context: one `[mm:ss-mm:ss] text` line per segment, in time order.
pub fn context(segments: &[Segment]) -> String {
    let mut ordered: Vec<&Segment> = segments.iter().collect();
    ordered.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));
    ordered
        .into_iter()
        .map(|segment| {
            let text = segment.text.trim();
            if text.is_empty() && segment.embedding_scope == EmbeddingScope::Visual {
                format!("[{}] (visual content, no speech)", segment.time_label())
            } else {
                format!("[{}] {}", segment.time_label(), text)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn summary(options: &GenerationOptions, rejected: Option<&RejectReason>) -> String {
    let (min, max) = options.summary_length.word_range();
    let mut instruction = format!(
        "Write a {} summary of the lecture excerpts above in {} to {} words. \
         Use only facts stated in the excerpts and respond with plain prose.",
        options.summary_tone.as_str(),
        min,
        max
    );
    if let Some(query) = &options.query {
        instruction.push_str(&format!(" Focus on: {}.", query.trim()));
    }
    push_retry_note(&mut instruction, rejected);
    instruction
}

pub fn topics(count: usize, known: &[String], rejected: Option<&RejectReason>) -> String {
    let mut instruction = format!(
        "List {} distinct topic labels covered by the lecture excerpts above. \
         Each label is 2 to 8 words naming a concrete concept from the excerpts. \
         Respond with a JSON array of strings only.",
        count
    );
    if !known.is_empty() {
        instruction.push_str(&format!(" Do not repeat: {}.", known.join("; ")));
    }
    push_retry_note(&mut instruction, rejected);
    instruction
}

pub fn flashcards(topic: &str, count: usize, known: usize, rejected: Option<&RejectReason>) -> String {
    let mut instruction = format!(
        "Write {} flashcards about the topic \"{}\" using only the lecture excerpts above. \
         Respond with a JSON array of objects with \"front\" (a question) and \"back\" (its answer).",
        count, topic
    );
    if known > 0 {
        instruction.push_str(" Cover points not asked about before.");
    }
    push_retry_note(&mut instruction, rejected);
    instruction
}

pub fn quiz(topic: &str, count: usize, known: usize, rejected: Option<&RejectReason>) -> String {
    let mut instruction = format!(
        "Write {} multiple-choice questions about the topic \"{}\" using only the lecture excerpts above. \
         Respond with a JSON array of objects with \"question\", \"choices\" (4 distinct answers) \
         and \"correct_index\" (zero-based index of the right answer).",
        count, topic
    );
    if known > 0 {
        instruction.push_str(" Ask about points not covered before.");
    }
    push_retry_note(&mut instruction, rejected);
    instruction
}

fn push_retry_note(instruction: &mut String, rejected: Option<&RejectReason>) {
    if let Some(reason) = rejected {
        instruction.push_str(&format!(
            " Your previous answer was rejected ({}). Be specific to this lecture \
             and avoid generic or templated wording.",
            reason
        ));
    }
}

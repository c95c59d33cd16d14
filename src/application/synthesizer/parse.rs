//! Turning raw engine output into typed candidates.

use crate::domain::study::{Flashcard, QuizItem};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Finds the JSON payload in a model response: the whole text, a fenced
/// ```json block, or the first balanced array or object.
pub fn extract_json(response: &str) -> Option<Value> {
    let trimmed = response.trim();

    if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
        return Some(json);
    }

    if let Some(start) = trimmed.find("```json") {
        let after_marker = &trimmed[start + 7..];
        if let Some(end) = after_marker.find("```") {
            if let Ok(json) = serde_json::from_str::<Value>(after_marker[..end].trim()) {
                return Some(json);
            }
        }
    }

    let start = trimmed.find(['[', '{'])?;
    balanced_end(&trimmed[start..])
        .and_then(|len| serde_json::from_str::<Value>(&trimmed[start..start + len]).ok())
}

/// Byte length of the bracketed value opening `text`, honoring strings.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// A list of `T`, either bare or wrapped as `{"<key>": [...]}`.
///
/// Entries that do not deserialize are skipped; `None` means no usable list
/// was found at all.
fn list_of<T: DeserializeOwned>(response: &str, key: &str) -> Option<Vec<T>> {
    let items = match extract_json(response)? {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };
    Some(
        items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
    )
}

pub fn topics(response: &str) -> Option<Vec<String>> {
    list_of::<String>(response, "topics")
        .map(|labels| labels.into_iter().map(|l| l.trim().to_string()).collect())
}

pub fn flashcards(response: &str) -> Option<Vec<Flashcard>> {
    list_of::<Flashcard>(response, "flashcards").map(|cards| {
        cards
            .into_iter()
            .map(|card| Flashcard {
                front: card.front.trim().to_string(),
                back: card.back.trim().to_string(),
            })
            .collect()
    })
}

pub fn quiz(response: &str) -> Option<Vec<QuizItem>> {
    list_of::<QuizItem>(response, "quiz").map(|items| {
        items
            .into_iter()
            .map(|item| QuizItem {
                question: item.question.trim().to_string(),
                choices: item.choices.iter().map(|c| c.trim().to_string()).collect(),
                correct_index: item.correct_index,
            })
            .collect()
    })
}

/// Plain-prose answers sometimes arrive quoted or fenced.
pub fn prose(response: &str) -> String {
    let trimmed = response.trim();
    let unfenced = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
        .map(|body| body.trim_start_matches(|c: char| c.is_ascii_alphabetic()).trim())
        .unwrap_or(trimmed);
    match serde_json::from_str::<String>(unfenced) {
        Ok(unquoted) => unquoted.trim().to_string(),
        Err(_) => unfenced.to_string(),
    }
}

//! Structured extraction: raw model text → flashcards or quiz questions.
//!
//! Models asked for "ONLY a JSON array" still wrap it in prose, fence it in
//! Markdown, drop fields, or return something else entirely. [`extract`] is
//! a total function over all of that:
//!
//! 1. **Best-effort parse**: find the JSON array in the text, map every
//!    object element onto the target shape, fill defaults for missing or
//!    malformed fields.
//! 2. **Synthetic fallback**: when nothing parses, or the array is empty, or
//!    the invoker handed us a sentinel, emit exactly `target_count` numbered
//!    placeholders.
//!
//! Either way the caller gets a well-formed `Vec`. Fallbacks are logged at
//! `warn` so operators can watch the fallback rate.
//!
//! Ids are always freshly generated; ids the model writes are ignored because
//! nothing guarantees they are unique. Two runs over the same text therefore
//! produce identical content with different ids.

use crate::error::is_error_sentinel;
use crate::output::{CardStatus, Flashcard, QuizQuestion, QUIZ_OPTION_COUNT};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

const MISSING_QUESTION: &str = "Missing question";
const MISSING_ANSWER: &str = "Missing answer";
const MISSING_EXPLANATION: &str = "No explanation provided.";
const PLACEHOLDER_OPTIONS: [&str; QUIZ_OPTION_COUNT] = ["Option A", "Option B", "Option C", "Option D"];

/// An item shape the extractor can produce.
pub trait ExtractItem: Sized {
    /// Name used in logs.
    const KIND: &'static str;

    /// Map one JSON object onto the item, defaulting anything unusable.
    fn from_object(obj: &Map<String, Value>) -> Self;

    /// The `n`-th (1-based) synthetic stand-in.
    fn placeholder(n: usize) -> Self;
}

impl ExtractItem for Flashcard {
    const KIND: &'static str = "flashcards";

    fn from_object(obj: &Map<String, Value>) -> Self {
        Flashcard {
            id: fresh_id(),
            question: text_field(obj, &["question"]).unwrap_or_else(|| MISSING_QUESTION.into()),
            answer: text_field(obj, &["answer"]).unwrap_or_else(|| MISSING_ANSWER.into()),
            status: CardStatus::New,
            placeholder: false,
        }
    }

    fn placeholder(n: usize) -> Self {
        Flashcard {
            id: fresh_id(),
            question: format!("Placeholder question {n}"),
            answer: "Placeholder answer (AI parsing failed).".to_string(),
            status: CardStatus::New,
            placeholder: true,
        }
    }
}

impl ExtractItem for QuizQuestion {
    const KIND: &'static str = "quiz";

    fn from_object(obj: &Map<String, Value>) -> Self {
        QuizQuestion {
            id: fresh_id(),
            question: text_field(obj, &["question"]).unwrap_or_else(|| MISSING_QUESTION.into()),
            options: options_field(obj.get("options")),
            correct_answer: answer_index(obj),
            explanation: text_field(obj, &["explanation"])
                .unwrap_or_else(|| MISSING_EXPLANATION.into()),
            placeholder: false,
        }
    }

    fn placeholder(n: usize) -> Self {
        QuizQuestion {
            id: fresh_id(),
            question: format!("Placeholder question {n}"),
            options: placeholder_options(),
            correct_answer: 0,
            explanation: "Placeholder explanation (AI parsing failed).".to_string(),
            placeholder: true,
        }
    }
}

/// Recover `T` items from raw model output. Never fails.
pub fn extract<T: ExtractItem>(raw: &str, target_count: usize) -> Vec<T> {
    let trimmed = raw.trim();

    if is_error_sentinel(trimmed) {
        return fallback(target_count, "generation failed");
    }

    match parse_items::<T>(trimmed) {
        Some(items) if !items.is_empty() => {
            debug!(kind = T::KIND, count = items.len(), "Parsed generated items");
            items
        }
        Some(_) => fallback(target_count, "no items in parsed array"),
        None => fallback(target_count, "output is not a JSON array"),
    }
}

/// [`extract`] specialised to flashcards.
pub fn extract_flashcards(raw: &str, target_count: usize) -> Vec<Flashcard> {
    extract(raw, target_count)
}

/// [`extract`] specialised to quiz questions.
pub fn extract_quiz(raw: &str, target_count: usize) -> Vec<QuizQuestion> {
    extract(raw, target_count)
}

fn parse_items<T: ExtractItem>(trimmed: &str) -> Option<Vec<T>> {
    let candidate = find_json_array(trimmed).unwrap_or(trimmed);
    let values: Vec<Value> = serde_json::from_str(candidate).ok()?;
    Some(
        values
            .iter()
            .filter_map(Value::as_object)
            .map(T::from_object)
            .collect(),
    )
}

fn fallback<T: ExtractItem>(target_count: usize, reason: &str) -> Vec<T> {
    warn!(
        kind = T::KIND,
        target_count,
        reason,
        "Could not parse generated items; returning placeholders"
    );
    (1..=target_count).map(T::placeholder).collect()
}

// ── JSON span location ───────────────────────────────────────────────────

/// Locate the JSON array inside noisy model output.
///
/// Tries, in order:
/// 1. the first balanced `[...]` span (brackets inside JSON strings ignored)
///    that parses to an array holding at least one object;
/// 2. the slice from the first `[` to the last `]`, when that is non-empty.
///
/// Returns `None` when there is no bracket pair at all.
pub fn find_json_array(raw: &str) -> Option<&str> {
    for (start, _) in raw.match_indices('[') {
        if let Some(span) = balanced_span(raw, start) {
            if holds_object(span) {
                return Some(span);
            }
        }
    }

    let first = raw.find('[')?;
    let last = raw.rfind(']')?;
    (last > first).then(|| &raw[first..=last])
}

/// The balanced bracket span opening at byte `start`, if it closes.
fn balanced_span(raw: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn holds_object(span: &str) -> bool {
    serde_json::from_str::<Vec<Value>>(span)
        .map(|values| values.iter().any(Value::is_object))
        .unwrap_or(false)
}

// ── Field helpers ────────────────────────────────────────────────────────

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

/// First non-blank scalar among `keys`, as text.
fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(scalar_text)
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn placeholder_options() -> Vec<String> {
    PLACEHOLDER_OPTIONS.iter().map(|s| s.to_string()).collect()
}

/// Exactly four options. A missing or malformed slot gets its placeholder in
/// place so `correct_answer` keeps pointing at the model's option.
fn options_field(value: Option<&Value>) -> Vec<String> {
    let items: &[Value] = match value {
        Some(Value::Array(items)) => items,
        _ => &[],
    };
    (0..QUIZ_OPTION_COUNT)
        .map(|i| {
            items
                .get(i)
                .and_then(scalar_text)
                .unwrap_or_else(|| PLACEHOLDER_OPTIONS[i].to_string())
        })
        .collect()
}

/// Correct-answer index, defaulting to 0 when absent or out of range.
///
/// Accepts an integer, a digit string, or an option letter (`"C"`).
fn answer_index(obj: &Map<String, Value>) -> usize {
    let raw = ["correct_answer", "correctAnswer", "correct_answer_index"]
        .iter()
        .find_map(|k| obj.get(*k));

    let index = match raw {
        Some(Value::Number(n)) => n.as_u64().map(|n| n as usize),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<usize>().ok().or_else(|| letter_index(s))
        }
        _ => None,
    };

    index.filter(|&i| i < QUIZ_OPTION_COUNT).unwrap_or(0)
}

fn letter_index(s: &str) -> Option<usize> {
    let mut chars = s.chars();
    let c = chars.next()?.to_ascii_uppercase();
    if chars.next().is_some() {
        return None;
    }
    ('A'..='D').position(|l| l == c)
}

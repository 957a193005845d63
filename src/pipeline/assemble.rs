//! Result assembly: normalised items + caller context → stored results.
//!
//! Pure constructors. Each stamps a fresh id and the current UTC time and
//! counts placeholders so callers can report degraded output.

use crate::config::{Difficulty, ExplanationStyle};
use crate::output::{Explanation, Flashcard, FlashcardSet, PodcastScript, Quiz, QuizQuestion};
use crate::pipeline::dialogue::ParsedDialogue;
use crate::pipeline::postprocess::CleanedExplanation;
use chrono::Utc;
use uuid::Uuid;

pub fn flashcard_set(
    document_id: &str,
    difficulty: Difficulty,
    flashcards: Vec<Flashcard>,
) -> FlashcardSet {
    let placeholder_count = flashcards.iter().filter(|c| c.placeholder).count();
    FlashcardSet {
        document_id: document_id.to_string(),
        difficulty,
        flashcards,
        placeholder_count,
        created_at: Utc::now(),
    }
}

pub fn quiz(document_id: &str, difficulty: Difficulty, questions: Vec<QuizQuestion>) -> Quiz {
    let placeholder_count = questions.iter().filter(|q| q.placeholder).count();
    Quiz {
        id: Uuid::new_v4(),
        document_id: document_id.to_string(),
        difficulty,
        questions,
        placeholder_count,
        created_at: Utc::now(),
    }
}

pub fn explanation(
    document_id: &str,
    style: ExplanationStyle,
    cleaned: CleanedExplanation,
) -> Explanation {
    Explanation {
        id: Uuid::new_v4(),
        document_id: document_id.to_string(),
        style,
        content: cleaned.content,
        fallback: cleaned.fallback,
        created_at: Utc::now(),
    }
}

/// Speaker names are stored as given, trimmed.
pub fn podcast_script(
    document_id: &str,
    speaker1: &str,
    speaker2: &str,
    parsed: ParsedDialogue,
) -> PodcastScript {
    PodcastScript {
        id: Uuid::new_v4(),
        document_id: document_id.to_string(),
        speaker1: speaker1.trim().to_string(),
        speaker2: speaker2.trim().to_string(),
        dialogue: parsed.lines,
        fallback: parsed.fallback,
        created_at: Utc::now(),
    }
}

//! Data model: the structured items the pipeline produces and the assembled
//! results it hands back to callers.
//!
//! Item types ([`Flashcard`], [`QuizQuestion`], [`DialogueLine`]) come out of
//! the normalisation stage. Result types ([`FlashcardSet`], [`Quiz`],
//! [`Explanation`], [`PodcastScript`]) come out of
//! [`crate::pipeline::assemble`] and carry the identifiers and timestamps a
//! persistence layer needs. Everything here is plain data and serialises
//! with serde using `snake_case` field names.

use crate::config::{Difficulty, ExplanationStyle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Number of answer options on every quiz question.
pub const QUIZ_OPTION_COUNT: usize = 4;

// ── Items ────────────────────────────────────────────────────────────────

/// Review status of a flashcard.
///
/// Always `New` when the core creates a card; later changes come from the
/// caller's status-update endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    #[default]
    New,
    Mastered,
    Later,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::New => "new",
            CardStatus::Mastered => "mastered",
            CardStatus::Later => "later",
        }
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(CardStatus::New),
            "mastered" => Ok(CardStatus::Mastered),
            "later" => Ok(CardStatus::Later),
            other => Err(format!("Invalid status '{other}': expected new, mastered or later")),
        }
    }
}

/// A generated question/answer card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: String,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub status: CardStatus,
    /// `true` when the card is a synthetic stand-in for unparseable output.
    #[serde(default)]
    pub placeholder: bool,
}

/// A generated multiple-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: String,
    pub question: String,
    /// Always exactly [`QUIZ_OPTION_COUNT`] entries.
    pub options: Vec<String>,
    /// Index into `options`, always in `0..QUIZ_OPTION_COUNT`.
    pub correct_answer: usize,
    pub explanation: String,
    #[serde(default)]
    pub placeholder: bool,
}

/// Which of the two podcast hosts speaks a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Speaker {
    One,
    Two,
}

impl Speaker {
    /// The other host.
    pub fn other(self) -> Self {
        match self {
            Speaker::One => Speaker::Two,
            Speaker::Two => Speaker::One,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Speaker::One => 1,
            Speaker::Two => 2,
        }
    }
}

impl From<Speaker> for u8 {
    fn from(s: Speaker) -> Self {
        s.number()
    }
}

impl TryFrom<u8> for Speaker {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(Speaker::One),
            2 => Ok(Speaker::Two),
            other => Err(format!("speaker must be 1 or 2, got {other}")),
        }
    }
}

/// One exchange in a two-speaker script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub speaker: Speaker,
    pub text: String,
}

impl DialogueLine {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
        }
    }
}

// ── Assembled results ────────────────────────────────────────────────────

/// A batch of flashcards generated for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashcardSet {
    pub document_id: String,
    pub difficulty: Difficulty,
    pub flashcards: Vec<Flashcard>,
    /// How many cards are synthetic placeholders.
    pub placeholder_count: usize,
    pub created_at: DateTime<Utc>,
}

/// A generated quiz, ready to be stored and later graded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: Uuid,
    pub document_id: String,
    pub difficulty: Difficulty,
    pub questions: Vec<QuizQuestion>,
    pub placeholder_count: usize,
    pub created_at: DateTime<Utc>,
}

/// A free-form explanation of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub id: Uuid,
    pub document_id: String,
    pub style: ExplanationStyle,
    pub content: String,
    /// `true` when `content` is the canned fallback rather than model output.
    pub fallback: bool,
    pub created_at: DateTime<Utc>,
}

/// A two-host podcast script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastScript {
    pub id: Uuid,
    pub document_id: String,
    pub speaker1: String,
    pub speaker2: String,
    pub dialogue: Vec<DialogueLine>,
    pub fallback: bool,
    pub created_at: DateTime<Utc>,
}

impl PodcastScript {
    /// Display name for a speaker in this script.
    pub fn name_of(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::One => &self.speaker1,
            Speaker::Two => &self.speaker2,
        }
    }
}

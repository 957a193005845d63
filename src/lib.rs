//! # studygen
//!
//! Turn extracted document text into study material with an LLM: flashcards,
//! multiple-choice quizzes, explanations, and two-host podcast scripts that
//! can be narrated to audio.
//!
//! ## Why this crate?
//!
//! Asking a model for "a JSON array of flashcards" works most of the time.
//! The rest of the time the array is wrapped in prose, fenced in Markdown,
//! missing fields, or absent because the provider timed out. This crate
//! treats raw model output as untrusted and always hands back well-formed
//! results: real items when the output can be recovered, clearly flagged
//! placeholders when it cannot.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source text
//!  │
//!  ├─ 1. Budget     trim to the per-kind character budget
//!  ├─ 2. Prompt     render the template for the requested kind
//!  ├─ 3. Invoke     call the model (timeout, optional retry, sentinel on failure)
//!  ├─ 4. Normalise  JSON recovery / dialogue parsing / Markdown cleanup
//!  └─ 5. Assemble   ids, timestamps, placeholder accounting
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use studygen::{Difficulty, GenerationConfig, Generator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let generator = Generator::new(GenerationConfig::default());
//!     let cancel = CancellationToken::new();
//!     let text = std::fs::read_to_string("chapter3.txt")?;
//!
//!     let quiz = generator.quiz("chapter-3", &text, Difficulty::Medium, &cancel).await?;
//!     for q in &quiz.questions {
//!         println!("{} -> {}", q.question, q.options[q.correct_answer]);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `studygen` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! studygen = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod budget;
pub mod config;
pub mod error;
pub mod generate;
pub mod grade;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod tts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use budget::{budget, TRUNCATION_MARKER};
pub use config::{
    Difficulty, ExplanationStyle, GenerationConfig, GenerationConfigBuilder, GenerationKind,
    VoicePair,
};
pub use error::{is_error_sentinel, ProviderError, SpeechError, StudyGenError};
pub use generate::{GenerationOutcome, GenerationParameters, GenerationRequest, Generator};
pub use grade::{QuestionResult, QuizResult};
pub use output::{
    CardStatus, DialogueLine, Explanation, Flashcard, FlashcardSet, PodcastScript, Quiz,
    QuizQuestion, Speaker,
};
pub use pipeline::dialogue::{parse_dialogue, DialogueParser};
pub use pipeline::extract::{extract, extract_flashcards, extract_quiz, find_json_array};
pub use pipeline::llm::{CompletionBackend, GenerationInvoker};
pub use progress::{NarrationProgressCallback, NoopProgressCallback};
pub use tts::{narrate, write_audio_files, HttpSpeechBackend, NarratedLine, SpeechBackend};

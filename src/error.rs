//! Error types for the studygen library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`StudyGenError`] (**fatal**): the generation cannot proceed at all
//!   (provider not configured, invalid configuration, a template missing a
//!   required parameter). Returned as `Err(StudyGenError)` from the
//!   [`crate::generate::Generator`] entry points.
//!
//! * [`ProviderError`] (**non-fatal**): one call to the generation backend
//!   failed (transport error, rate limit, timeout, cancellation). The invoker
//!   logs it and hands a sentinel string downstream instead, so parsers only
//!   ever see one failure channel: text that is not usable.
//!
//! * [`SpeechError`] (**non-fatal**): one dialogue line could not be
//!   synthesised. Stored inside [`crate::tts::NarratedLine`] so the rest of
//!   the script is still narrated.
//!
//! Malformed model output is not an error at all: the extractor and the
//! dialogue parser are total functions that degrade to placeholders.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the studygen library.
#[derive(Debug, Error)]
pub enum StudyGenError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// The configured provider could not be initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Prompt errors ─────────────────────────────────────────────────────
    /// A prompt template was rendered without one of its required parameters.
    #[error("Template '{template}' is missing required parameter '{missing}'")]
    Template {
        template: &'static str,
        missing: String,
    },

    // ── Quiz errors ───────────────────────────────────────────────────────
    /// A submitted answer sheet does not line up with the quiz.
    #[error("Answer count ({answers}) doesn't match question count ({questions})")]
    AnswerCountMismatch { answers: usize, questions: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a narrated audio file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single failed call to the generation backend.
///
/// Never returned to callers of the pipeline; the invoker renders it into a
/// sentinel string via [`ProviderError::sentinel`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider API returned an error or the transport failed.
    #[error("AI provider error: {message}")]
    Api { message: String },

    /// The provider rejected the call for exceeding its rate limit.
    #[error("AI provider rate limit exceeded: {message}")]
    RateLimited { message: String },

    /// The call did not finish within the configured timeout.
    #[error("AI request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The caller cancelled the request before it finished.
    #[error("AI request cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Classify a provider error message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("429") || lower.contains("rate limit") {
            ProviderError::RateLimited { message }
        } else {
            ProviderError::Api { message }
        }
    }

    /// Whether retrying the call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Cancelled)
    }

    /// The sentinel string handed to the parsing layer in place of content.
    ///
    /// Provider detail stays in the logs; the sentinel only names the class of
    /// failure so it never leaks credentials or request bodies into results.
    pub fn sentinel(&self) -> String {
        let reason = match self {
            ProviderError::Api { .. } => "AI provider error.",
            ProviderError::RateLimited { .. } => "AI provider rate limit exceeded.",
            ProviderError::Timeout { .. } => "AI request timed out.",
            ProviderError::Cancelled => "AI request cancelled.",
        };
        format!("{ERROR_SENTINEL_PREFIX} {reason}")
    }
}

/// Prefix reserved for sentinel error strings returned by the invoker.
pub const ERROR_SENTINEL_PREFIX: &str = "[ERROR]";

/// Whether `raw` is a sentinel error string rather than generated content.
pub fn is_error_sentinel(raw: &str) -> bool {
    raw.trim_start().starts_with(ERROR_SENTINEL_PREFIX)
}

/// A non-fatal error for a single narrated dialogue line.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum SpeechError {
    /// The line had no text to synthesise.
    #[error("Line {index}: empty text")]
    EmptyText { index: usize },

    /// The speech backend failed for this line.
    #[error("Line {index}: speech synthesis failed: {detail}")]
    SynthesisFailed { index: usize, detail: String },
}

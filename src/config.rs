//! Configuration types for study-material generation.
//!
//! All generation behaviour is controlled through [`GenerationConfig`], built
//! via its [`GenerationConfigBuilder`]. The per-request choices (how many
//! cards, which difficulty, which explanation style) live in
//! [`crate::generate::GenerationRequest`]; this struct holds the knobs that
//! stay fixed for the lifetime of a [`crate::generate::Generator`].

use crate::error::StudyGenError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for a [`crate::generate::Generator`].
///
/// Built via [`GenerationConfig::builder()`] or using
/// [`GenerationConfig::default()`].
///
/// # Example
/// ```rust
/// use studygen::GenerationConfig;
///
/// let config = GenerationConfig::builder()
///     .model("llama-3.3-70b-versatile")
///     .max_dialogue_lines(10)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct GenerationConfig {
    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected from env.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature override. Default: None (per-kind default).
    ///
    /// See [`GenerationKind::default_temperature`]; explanations run slightly
    /// cooler than the card and script generators.
    pub temperature: Option<f32>,

    /// Completion token cap override. Default: None (per-kind default).
    pub max_tokens: Option<usize>,

    /// Source-text character budget override. Default: None (per-kind default).
    ///
    /// Long documents are cut to this many characters before being embedded
    /// in the prompt, keeping requests inside the model's context window.
    pub max_text_chars: Option<usize>,

    /// Flashcards generated when the request does not say. Default: 12.
    pub default_flashcard_count: usize,

    /// Maximum exchanges kept in a podcast script. Default: 8.
    pub max_dialogue_lines: usize,

    /// Dialogue lines shorter than this (in characters) are dropped as noise. Default: 10.
    pub min_dialogue_chars: usize,

    /// Host names used when a podcast request does not name them.
    pub speaker1: String,
    pub speaker2: String,

    /// Voice pairing used for narration. Default: [`VoicePair::MaleFemale`].
    pub voice_pair: VoicePair,

    /// Retry attempts on a failed generation call. Default: 0.
    ///
    /// Failures are reported once, as a sentinel, unless the operator opts in
    /// to retries here.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout for the generation backend in seconds. Default: 60.
    pub api_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: None,
            max_tokens: None,
            max_text_chars: None,
            default_flashcard_count: 12,
            max_dialogue_lines: 8,
            min_dialogue_chars: 10,
            speaker1: "Alex".to_string(),
            speaker2: "Jordan".to_string(),
            voice_pair: VoicePair::default(),
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_text_chars", &self.max_text_chars)
            .field("default_flashcard_count", &self.default_flashcard_count)
            .field("max_dialogue_lines", &self.max_dialogue_lines)
            .field("min_dialogue_chars", &self.min_dialogue_chars)
            .field("voice_pair", &self.voice_pair)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl GenerationConfig {
    /// Create a new builder for `GenerationConfig`.
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
        }
    }

    /// Effective sampling temperature for `kind`.
    pub fn temperature_for(&self, kind: GenerationKind) -> f32 {
        self.temperature.unwrap_or_else(|| kind.default_temperature())
    }

    /// Effective completion token cap for `kind`.
    pub fn max_tokens_for(&self, kind: GenerationKind) -> usize {
        self.max_tokens.unwrap_or_else(|| kind.default_max_tokens())
    }

    /// Effective source-text budget for `kind`.
    pub fn max_text_chars_for(&self, kind: GenerationKind) -> usize {
        self.max_text_chars
            .unwrap_or_else(|| kind.default_max_text_chars())
    }
}

/// Builder for [`GenerationConfig`].
#[derive(Debug)]
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl GenerationConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn max_text_chars(mut self, n: usize) -> Self {
        self.config.max_text_chars = Some(n);
        self
    }

    pub fn default_flashcard_count(mut self, n: usize) -> Self {
        self.config.default_flashcard_count = n;
        self
    }

    pub fn max_dialogue_lines(mut self, n: usize) -> Self {
        self.config.max_dialogue_lines = n;
        self
    }

    pub fn min_dialogue_chars(mut self, n: usize) -> Self {
        self.config.min_dialogue_chars = n;
        self
    }

    pub fn speakers(mut self, speaker1: impl Into<String>, speaker2: impl Into<String>) -> Self {
        self.config.speaker1 = speaker1.into();
        self.config.speaker2 = speaker2.into();
        self
    }

    pub fn voice_pair(mut self, pair: VoicePair) -> Self {
        self.config.voice_pair = pair;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GenerationConfig, StudyGenError> {
        let c = &self.config;
        if c.default_flashcard_count == 0 {
            return Err(StudyGenError::InvalidConfig(
                "Flashcard count must be ≥ 1".into(),
            ));
        }
        if c.max_dialogue_lines == 0 {
            return Err(StudyGenError::InvalidConfig(
                "Dialogue line cap must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(StudyGenError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        validate_speakers(&c.speaker1, &c.speaker2)?;
        Ok(self.config)
    }
}

/// Both names present and distinct. Dialogue prefixes match case-insensitively,
/// so names differing only in case would attribute every line to speaker 1.
pub(crate) fn validate_speakers(speaker1: &str, speaker2: &str) -> Result<(), StudyGenError> {
    let (s1, s2) = (speaker1.trim(), speaker2.trim());
    if s1.is_empty() || s2.is_empty() {
        return Err(StudyGenError::InvalidConfig(
            "Speaker names must not be empty".into(),
        ));
    }
    if s1.to_lowercase() == s2.to_lowercase() {
        return Err(StudyGenError::InvalidConfig(format!(
            "Speaker names must differ, both are '{s1}'"
        )));
    }
    Ok(())
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The four things the generator can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    Flashcards,
    Quiz,
    Explanation,
    DialogueScript,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::Flashcards => "flashcards",
            GenerationKind::Quiz => "quiz",
            GenerationKind::Explanation => "explanation",
            GenerationKind::DialogueScript => "dialogue_script",
        }
    }

    /// Completion token cap used when the config does not override it.
    ///
    /// Quizzes carry four options and an explanation per question, so they
    /// get the largest allowance.
    pub fn default_max_tokens(&self) -> usize {
        match self {
            GenerationKind::Flashcards => 2000,
            GenerationKind::Quiz => 3000,
            GenerationKind::Explanation => 1500,
            GenerationKind::DialogueScript => 1500,
        }
    }

    pub fn default_temperature(&self) -> f32 {
        match self {
            GenerationKind::Explanation => 0.55,
            GenerationKind::DialogueScript => 0.7,
            GenerationKind::Flashcards | GenerationKind::Quiz => 0.6,
        }
    }

    /// Source-text budget in characters.
    pub fn default_max_text_chars(&self) -> usize {
        match self {
            GenerationKind::Explanation => 15_000,
            _ => 12_000,
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Difficulty level for flashcards and quizzes.
///
/// | Level | Tone | Quiz questions |
/// |-------|------|----------------|
/// | easy   | definitions and simple recall | 8 |
/// | medium | conceptual understanding and application | 12 |
/// | hard   | analysis, synthesis and evaluation | 15 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Number of questions in a quiz of this difficulty.
    pub fn quiz_question_count(&self) -> usize {
        match self {
            Difficulty::Easy => 8,
            Difficulty::Medium => 12,
            Difficulty::Hard => 15,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Register of a generated explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationStyle {
    /// Plain language for a non-specialist.
    #[default]
    Layman,
    /// Academic, precise, with terminology.
    Professor,
    /// Practical, oriented to how the material is used at work.
    Industry,
}

impl ExplanationStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExplanationStyle::Layman => "layman",
            ExplanationStyle::Professor => "professor",
            ExplanationStyle::Industry => "industry",
        }
    }
}

impl fmt::Display for ExplanationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voice pairing for a narrated podcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoicePair {
    MaleMale,
    FemaleFemale,
    #[default]
    MaleFemale,
}

impl VoicePair {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoicePair::MaleMale => "male-male",
            VoicePair::FemaleFemale => "female-female",
            VoicePair::MaleFemale => "male-female",
        }
    }

    /// Concrete voice ids for speaker 1 and speaker 2.
    pub fn voices(&self) -> (&'static str, &'static str) {
        match self {
            VoicePair::MaleMale => ("Fritz-PlayAI", "Mikail-PlayAI"),
            VoicePair::FemaleFemale => ("Cheyenne-PlayAI", "Deedee-PlayAI"),
            VoicePair::MaleFemale => ("Fritz-PlayAI", "Cheyenne-PlayAI"),
        }
    }
}

impl fmt::Display for VoicePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

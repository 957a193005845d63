//! Generation entry points.
//!
//! A [`Generator`] owns one [`GenerationInvoker`] and runs each request
//! through the same sequence:
//!
//! ```text
//! source text ─▶ budget ─▶ prompt ─▶ invoke ─▶ normalise ─▶ assemble
//! ```
//!
//! Only configuration and template errors come back as `Err`. A failed or
//! cancelled model call still yields a complete result built from
//! placeholders or fallback text; check `placeholder_count` / `fallback` to
//! tell the difference.

use crate::budget::budget;
use crate::config::{
    validate_speakers, Difficulty, ExplanationStyle, GenerationConfig, GenerationKind,
};
use crate::error::StudyGenError;
use crate::output::{Explanation, FlashcardSet, PodcastScript, Quiz};
use crate::pipeline::dialogue::DialogueParser;
use crate::pipeline::llm::GenerationInvoker;
use crate::pipeline::{assemble, extract, postprocess};
use crate::prompts;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What to generate, with per-kind options.
///
/// `None` fields take their value from the [`GenerationConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationParameters {
    Flashcards {
        #[serde(default)]
        count: Option<usize>,
        #[serde(default)]
        difficulty: Difficulty,
    },
    Quiz {
        #[serde(default)]
        difficulty: Difficulty,
    },
    Explanation {
        #[serde(default)]
        style: ExplanationStyle,
    },
    DialogueScript {
        #[serde(default)]
        speaker1: Option<String>,
        #[serde(default)]
        speaker2: Option<String>,
        #[serde(default)]
        max_lines: Option<usize>,
    },
}

impl GenerationParameters {
    pub fn kind(&self) -> GenerationKind {
        match self {
            GenerationParameters::Flashcards { .. } => GenerationKind::Flashcards,
            GenerationParameters::Quiz { .. } => GenerationKind::Quiz,
            GenerationParameters::Explanation { .. } => GenerationKind::Explanation,
            GenerationParameters::DialogueScript { .. } => GenerationKind::DialogueScript,
        }
    }
}

/// One generation request: source text plus parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub source_text: String,
    pub parameters: GenerationParameters,
}

impl GenerationRequest {
    pub fn new(source_text: impl Into<String>, parameters: GenerationParameters) -> Self {
        Self {
            source_text: source_text.into(),
            parameters,
        }
    }

    pub fn kind(&self) -> GenerationKind {
        self.parameters.kind()
    }
}

/// The assembled result of [`Generator::generate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Flashcards(FlashcardSet),
    Quiz(Quiz),
    Explanation(Explanation),
    DialogueScript(PodcastScript),
}

impl GenerationOutcome {
    pub fn kind(&self) -> GenerationKind {
        match self {
            GenerationOutcome::Flashcards(_) => GenerationKind::Flashcards,
            GenerationOutcome::Quiz(_) => GenerationKind::Quiz,
            GenerationOutcome::Explanation(_) => GenerationKind::Explanation,
            GenerationOutcome::DialogueScript(_) => GenerationKind::DialogueScript,
        }
    }

    /// Whether any part of the result is a placeholder or fallback.
    pub fn is_degraded(&self) -> bool {
        match self {
            GenerationOutcome::Flashcards(set) => set.placeholder_count > 0,
            GenerationOutcome::Quiz(quiz) => quiz.placeholder_count > 0,
            GenerationOutcome::Explanation(e) => e.fallback,
            GenerationOutcome::DialogueScript(s) => s.fallback,
        }
    }
}

/// Runs generation requests against one lazily initialised backend.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct Generator {
    invoker: Arc<GenerationInvoker>,
    config: GenerationConfig,
}

impl Generator {
    /// Generator whose backend is resolved from `config` on first use.
    pub fn new(config: GenerationConfig) -> Self {
        let invoker = Arc::new(GenerationInvoker::from_config(&config));
        Self { invoker, config }
    }

    /// Generator over an existing invoker, e.g. one shared between generators.
    pub fn with_invoker(invoker: Arc<GenerationInvoker>, config: GenerationConfig) -> Self {
        Self { invoker, config }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn invoker(&self) -> &Arc<GenerationInvoker> {
        &self.invoker
    }

    /// Dispatch on the request's parameters.
    pub async fn generate(
        &self,
        document_id: &str,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, StudyGenError> {
        let text = request.source_text.as_str();
        let outcome = match &request.parameters {
            GenerationParameters::Flashcards { count, difficulty } => {
                let count = count.unwrap_or(self.config.default_flashcard_count);
                GenerationOutcome::Flashcards(
                    self.flashcards(document_id, text, count, *difficulty, cancel)
                        .await?,
                )
            }
            GenerationParameters::Quiz { difficulty } => {
                GenerationOutcome::Quiz(self.quiz(document_id, text, *difficulty, cancel).await?)
            }
            GenerationParameters::Explanation { style } => GenerationOutcome::Explanation(
                self.explanation(document_id, text, *style, cancel).await?,
            ),
            GenerationParameters::DialogueScript {
                speaker1,
                speaker2,
                max_lines,
            } => {
                let speaker1 = speaker1.as_deref().unwrap_or(&self.config.speaker1);
                let speaker2 = speaker2.as_deref().unwrap_or(&self.config.speaker2);
                let max_lines = max_lines.unwrap_or(self.config.max_dialogue_lines);
                GenerationOutcome::DialogueScript(
                    self.podcast_script(document_id, text, speaker1, speaker2, max_lines, cancel)
                        .await?,
                )
            }
        };
        Ok(outcome)
    }

    /// Generate up to `count` flashcards (exactly `count` on fallback).
    pub async fn flashcards(
        &self,
        document_id: &str,
        source_text: &str,
        count: usize,
        difficulty: Difficulty,
        cancel: &CancellationToken,
    ) -> Result<FlashcardSet, StudyGenError> {
        let kind = GenerationKind::Flashcards;
        let text = self.budgeted(kind, source_text);
        let prompt = prompts::flashcard_prompt(count, difficulty, &text)?;
        let raw = self.call(kind, document_id, &prompt, cancel).await?;

        let cards = extract::extract_flashcards(&raw, count);
        let set = assemble::flashcard_set(document_id, difficulty, cards);
        info!(
            document_id,
            count = set.flashcards.len(),
            placeholders = set.placeholder_count,
            "Generated flashcards"
        );
        Ok(set)
    }

    /// Generate a quiz sized by `difficulty`.
    pub async fn quiz(
        &self,
        document_id: &str,
        source_text: &str,
        difficulty: Difficulty,
        cancel: &CancellationToken,
    ) -> Result<Quiz, StudyGenError> {
        let kind = GenerationKind::Quiz;
        let count = difficulty.quiz_question_count();
        let text = self.budgeted(kind, source_text);
        let prompt = prompts::quiz_prompt(count, difficulty, &text)?;
        let raw = self.call(kind, document_id, &prompt, cancel).await?;

        let questions = extract::extract_quiz(&raw, count);
        let quiz = assemble::quiz(document_id, difficulty, questions);
        info!(
            document_id,
            quiz_id = %quiz.id,
            questions = quiz.questions.len(),
            placeholders = quiz.placeholder_count,
            "Generated quiz"
        );
        Ok(quiz)
    }

    pub async fn explanation(
        &self,
        document_id: &str,
        source_text: &str,
        style: ExplanationStyle,
        cancel: &CancellationToken,
    ) -> Result<Explanation, StudyGenError> {
        let kind = GenerationKind::Explanation;
        let text = self.budgeted(kind, source_text);
        let prompt = prompts::explanation_prompt(style, &text)?;
        let raw = self.call(kind, document_id, &prompt, cancel).await?;

        let explanation =
            assemble::explanation(document_id, style, postprocess::clean_explanation(&raw));
        info!(
            document_id,
            style = %style,
            chars = explanation.content.len(),
            fallback = explanation.fallback,
            "Generated explanation"
        );
        Ok(explanation)
    }

    /// Generate a two-host script of at most `max_lines` lines.
    pub async fn podcast_script(
        &self,
        document_id: &str,
        source_text: &str,
        speaker1: &str,
        speaker2: &str,
        max_lines: usize,
        cancel: &CancellationToken,
    ) -> Result<PodcastScript, StudyGenError> {
        validate_speakers(speaker1, speaker2)?;
        let kind = GenerationKind::DialogueScript;
        let parser = DialogueParser::new(max_lines, self.config.min_dialogue_chars);
        let text = self.budgeted(kind, source_text);
        let prompt = prompts::dialogue_prompt(speaker1, speaker2, parser.max_lines(), &text)?;
        let raw = self.call(kind, document_id, &prompt, cancel).await?;

        let parsed = parser.parse_script(&raw, speaker1, speaker2);
        let script = assemble::podcast_script(document_id, speaker1, speaker2, parsed);
        info!(
            document_id,
            script_id = %script.id,
            lines = script.dialogue.len(),
            fallback = script.fallback,
            "Generated podcast script"
        );
        Ok(script)
    }

    fn budgeted(&self, kind: GenerationKind, source_text: &str) -> String {
        let max_chars = self.config.max_text_chars_for(kind);
        let text = budget(source_text, max_chars);
        if text.len() != source_text.len() {
            debug!(
                kind = %kind,
                max_chars,
                original_chars = source_text.chars().count(),
                "Source text truncated"
            );
        }
        text
    }

    async fn call(
        &self,
        kind: GenerationKind,
        document_id: &str,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, StudyGenError> {
        let start = Instant::now();
        let raw = self
            .invoker
            .invoke(
                prompt,
                self.config.max_tokens_for(kind),
                self.config.temperature_for(kind),
                cancel,
            )
            .await?;
        debug!(
            kind = %kind,
            document_id,
            prompt_chars = prompt.len(),
            response_chars = raw.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model call finished"
        );
        Ok(raw)
    }
}

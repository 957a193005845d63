//! Prompt templates for every generation kind.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: tweaking how cards or scripts are requested
//!    means editing exactly one place.
//!
//! 2. **Testability**: unit tests can render and inspect prompts without a
//!    live model, so a regression in the output-format instructions is caught
//!    before it shows up as a spike in fallback placeholders.
//!
//! Templates use `{name}` placeholders. Rendering fails with
//! [`StudyGenError::Template`] when a required value is empty or a
//! placeholder is left without a value; a prompt is never sent with a hole in
//! its instructions. Substitution is single-pass, so braces inside the source
//! text are never re-expanded.

use crate::config::{Difficulty, ExplanationStyle};
use crate::error::StudyGenError;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Flashcard generation. Placeholders: `count`, `difficulty`, `text`.
pub const FLASHCARD_TEMPLATE: &str = r#"You are an educational assistant. Generate exactly {count} high-quality flashcards from the provided source material.

IMPORTANT: Return ONLY a valid JSON array. No other text before or after.

Difficulty level: {difficulty}
- easy: Basic definitions and simple facts
- medium: Conceptual understanding and connections
- hard: Analysis, synthesis, and application to new scenarios

Format each flashcard as:
{"question": "Your question here?", "answer": "Your concise answer here."}

Example output:
[
{"question": "What is photosynthesis?", "answer": "The process by which plants convert light energy into chemical energy."},
{"question": "Where does photosynthesis occur?", "answer": "In the chloroplasts of plant cells."}
]

Questions should be varied (definitions, concepts, application). Keep answers concise.

SOURCE:
"""{text}""""#;

/// Multiple-choice quiz generation. Placeholders: `count`, `difficulty`, `text`.
pub const QUIZ_TEMPLATE: &str = r#"You are an educational assistant. Generate exactly {count} multiple-choice quiz questions from the provided source material.

IMPORTANT: Return ONLY a valid JSON array. No other text before or after.

Difficulty level: {difficulty}
- easy: Basic recall and simple comprehension
- medium: Application and analysis
- hard: Synthesis and evaluation

Format each question as:
{"question": "Your question here?", "options": ["Option A", "Option B", "Option C", "Option D"], "correct_answer": 0, "explanation": "Brief explanation of why this is correct."}

Requirements:
- Each question must have exactly 4 options
- correct_answer is the index (0-3) of the correct option
- Options should be plausible but only one clearly correct
- Include a brief explanation for the correct answer
- Vary question types (definitions, applications, comparisons, etc.)

Example output:
[
{"question": "What is the primary function of photosynthesis?", "options": ["Convert light to chemical energy", "Break down glucose", "Produce oxygen only", "Absorb carbon dioxide"], "correct_answer": 0, "explanation": "Photosynthesis converts light energy into chemical energy stored in glucose."}
]

SOURCE:
"""{text}""""#;

/// Free-form explanation. Placeholders: `style`, `style_guidance`, `text`.
pub const EXPLANATION_TEMPLATE: &str = r#"Explain the following material in the style: {style}.
{style_guidance}

Guidelines:
- Be accurate
- Avoid hallucinations
- If uncertain, say you lack enough context
- Keep it concise but clear
- Use Markdown headings and lists where they help

MATERIAL:
"""{text}""""#;

/// Two-host podcast script. Placeholders: `speaker1`, `speaker2`, `max_lines`, `text`.
pub const DIALOGUE_TEMPLATE: &str = r#"Write a short, engaging educational podcast conversation between two hosts, {speaker1} and {speaker2}, about the provided source material.

IMPORTANT: Return ONLY the dialogue lines. No title, no headings, no stage directions, no Markdown.

Rules:
- Write at most {max_lines} lines in total, alternating between the hosts
- Start every line with the speaker's name followed by a colon, exactly like "{speaker1}:" or "{speaker2}:"
- {speaker1} opens the episode and {speaker2} closes it
- Each line should be one or two natural spoken sentences
- Explain the key ideas accurately; do not invent facts

Example output:
{speaker1}: Welcome back! Today we're digging into how plants turn sunlight into food.
{speaker2}: It's a great topic. The short version is photosynthesis happens in the chloroplasts.

SOURCE:
"""{text}""""#;

static RE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z_][a-z0-9_]*)\}").unwrap());

/// Render the flashcard prompt.
pub fn flashcard_prompt(
    count: usize,
    difficulty: Difficulty,
    text: &str,
) -> Result<String, StudyGenError> {
    render(
        "flashcards",
        FLASHCARD_TEMPLATE,
        &[
            ("count", count_param(count)),
            ("difficulty", difficulty.as_str().to_string()),
            ("text", text.to_string()),
        ],
    )
}

/// Render the quiz prompt.
pub fn quiz_prompt(
    count: usize,
    difficulty: Difficulty,
    text: &str,
) -> Result<String, StudyGenError> {
    render(
        "quiz",
        QUIZ_TEMPLATE,
        &[
            ("count", count_param(count)),
            ("difficulty", difficulty.as_str().to_string()),
            ("text", text.to_string()),
        ],
    )
}

/// Render the explanation prompt.
pub fn explanation_prompt(style: ExplanationStyle, text: &str) -> Result<String, StudyGenError> {
    render(
        "explanation",
        EXPLANATION_TEMPLATE,
        &[
            ("style", style.as_str().to_string()),
            ("style_guidance", style_guidance(style).to_string()),
            ("text", text.to_string()),
        ],
    )
}

/// Render the podcast-script prompt.
pub fn dialogue_prompt(
    speaker1: &str,
    speaker2: &str,
    max_lines: usize,
    text: &str,
) -> Result<String, StudyGenError> {
    render(
        "dialogue_script",
        DIALOGUE_TEMPLATE,
        &[
            ("speaker1", speaker1.trim().to_string()),
            ("speaker2", speaker2.trim().to_string()),
            ("max_lines", count_param(max_lines)),
            ("text", text.to_string()),
        ],
    )
}

fn style_guidance(style: ExplanationStyle) -> &'static str {
    match style {
        ExplanationStyle::Layman => {
            "Use everyday language and analogies. Assume no background in the subject."
        }
        ExplanationStyle::Professor => {
            "Use precise academic language and correct terminology, as in a university lecture."
        }
        ExplanationStyle::Industry => {
            "Focus on practical use: how a working professional would apply this material."
        }
    }
}

/// Zero counts render as empty so they are reported as missing.
fn count_param(n: usize) -> String {
    if n == 0 {
        String::new()
    } else {
        n.to_string()
    }
}

/// Substitute `params` into `template` in one pass.
fn render(
    name: &'static str,
    template: &str,
    params: &[(&str, String)],
) -> Result<String, StudyGenError> {
    if let Some((key, _)) = params.iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(StudyGenError::Template {
            template: name,
            missing: key.to_string(),
        });
    }

    let mut unfilled: Option<String> = None;
    let rendered = RE_PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        match params.iter().find(|(k, _)| *k == &caps[1]) {
            Some((_, value)) => value.clone(),
            None => {
                unfilled.get_or_insert_with(|| caps[1].to_string());
                caps[0].to_string()
            }
        }
    });
    let rendered = rendered.into_owned();

    match unfilled {
        Some(missing) => Err(StudyGenError::Template {
            template: name,
            missing,
        }),
        None => Ok(rendered),
    }
}

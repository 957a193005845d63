//! Explanation cleanup: deterministic tidy-up of free-form model Markdown.
//!
//! Explanations are shown to the student as-is, so the text gets the same
//! treatment whatever model produced it. Passes run in order: fences first
//! so the later passes see the real content, invisible characters last.
//!
//! A sentinel or blank response is replaced by [`FALLBACK_EXPLANATION`] and
//! flagged, so callers can tell a canned answer from a real one.

use crate::error::is_error_sentinel;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Shown when no usable explanation came back.
pub const FALLBACK_EXPLANATION: &str = "We couldn't generate an explanation for this document right now.\n\n\
Try again in a moment. In the meantime, skim the headings and summary sections of the document \
and note any terms you don't recognise.\n";

/// Cleaned explanation text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedExplanation {
    pub content: String,
    /// `true` when `content` is [`FALLBACK_EXPLANATION`].
    pub fallback: bool,
}

/// Tidy raw model output into display-ready Markdown. Never fails.
pub fn clean_explanation(raw: &str) -> CleanedExplanation {
    if is_error_sentinel(raw) {
        warn!("Explanation generation failed; using fallback text");
        return fallback();
    }

    let s = strip_outer_fence(raw);
    let s = s.replace("\r\n", "\n").replace('\r', "\n");
    let s = trim_line_ends(&s);
    let s = RE_EXCESS_NEWLINES.replace_all(&s, "\n\n\n");
    let s = space_headings(&s);
    let s = strip_invisible(&s);

    let body = s.trim();
    if body.is_empty() {
        warn!("Explanation was empty after cleanup; using fallback text");
        return fallback();
    }

    CleanedExplanation {
        content: format!("{body}\n"),
        fallback: false,
    }
}

fn fallback() -> CleanedExplanation {
    CleanedExplanation {
        content: FALLBACK_EXPLANATION.to_string(),
        fallback: true,
    }
}

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```\s*$").unwrap());

static RE_EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

/// Unwrap a response that is entirely one fenced block.
fn strip_outer_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    match RE_FENCE.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

fn trim_line_ends(s: &str) -> String {
    s.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

/// Blank line before every ATX heading after the first line.
fn space_headings(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 32);
    let mut in_code = false;
    for (i, line) in s.lines().enumerate() {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
        }
        if !in_code && i > 0 && is_heading(line) && !out.ends_with("\n\n") {
            out.push('\n');
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].starts_with(' ')
}

fn strip_invisible(s: &str) -> String {
    s.replace(
        ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}'],
        "",
    )
}

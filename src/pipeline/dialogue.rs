//! Dialogue parsing: raw model text → attributed two-speaker script.
//!
//! The model is asked for `Name: text` lines but routinely adds a title, a
//! Markdown heading, stage directions, or lines with no name at all. The
//! parser walks the output line by line:
//!
//! - blank lines and lines starting with `#` or `*` are noise;
//! - a line is attributed by the first matching rule: `"{speaker1}:"`,
//!   `"{speaker2}:"`, generic `"Speaker 1:"`/`"Speaker 2:"`, else it goes to
//!   whoever did not speak the previous attributed line (speaker 1 first);
//! - lines shorter than the noise threshold after the prefix is stripped
//!   are dropped, but still count for alternation;
//! - the result is capped at `max_lines`.
//!
//! An empty result, or a sentinel from the invoker, yields a fixed six-line
//! script so the caller always has something to show or narrate.

use crate::error::is_error_sentinel;
use crate::output::{DialogueLine, Speaker};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Default script length cap.
pub const DEFAULT_MAX_LINES: usize = 8;

/// Default minimum line length, in characters, after the prefix is stripped.
pub const DEFAULT_MIN_LINE_CHARS: usize = 10;

static RE_GENERIC_SPEAKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^speaker\s*([12])\s*:\s*").unwrap());

/// Line-oriented parser with a length cap and noise threshold.
#[derive(Debug, Clone, Copy)]
pub struct DialogueParser {
    max_lines: usize,
    min_line_chars: usize,
}

impl Default for DialogueParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES, DEFAULT_MIN_LINE_CHARS)
    }
}

impl DialogueParser {
    /// A cap of zero is raised to one.
    pub fn new(max_lines: usize, min_line_chars: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
            min_line_chars,
        }
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Parse `raw` into at most `max_lines` attributed lines. Never empty.
    pub fn parse(&self, raw: &str, speaker1: &str, speaker2: &str) -> Vec<DialogueLine> {
        self.parse_script(raw, speaker1, speaker2).lines
    }

    /// Like [`parse`](Self::parse), also reporting whether the fallback was used.
    pub fn parse_script(&self, raw: &str, speaker1: &str, speaker2: &str) -> ParsedDialogue {
        if is_error_sentinel(raw) {
            warn!("Dialogue generation failed; using fallback script");
            return ParsedDialogue::fallback(speaker1, speaker2, self.max_lines);
        }

        let speaker1 = speaker1.trim();
        let speaker2 = speaker2.trim();
        let mut previous: Option<Speaker> = None;
        let mut lines = Vec::new();

        for line in raw.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') || line.starts_with('*') {
                continue;
            }

            let (speaker, text) = match attribute(line, speaker1, speaker2) {
                Some(found) => found,
                None => (previous.map_or(Speaker::One, Speaker::other), line),
            };
            previous = Some(speaker);

            let text = text.trim();
            if text.chars().count() < self.min_line_chars {
                debug!(line = %text, "Dropping short dialogue line");
                continue;
            }

            lines.push(DialogueLine::new(speaker, text));
            if lines.len() == self.max_lines {
                break;
            }
        }

        if lines.is_empty() {
            warn!("No dialogue lines parsed; using fallback script");
            return ParsedDialogue::fallback(speaker1, speaker2, self.max_lines);
        }
        ParsedDialogue {
            lines,
            fallback: false,
        }
    }
}

/// Parser output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDialogue {
    pub lines: Vec<DialogueLine>,
    /// `true` when `lines` is the canned script.
    pub fallback: bool,
}

impl ParsedDialogue {
    fn fallback(speaker1: &str, speaker2: &str, max_lines: usize) -> Self {
        Self {
            lines: fallback_script(speaker1.trim(), speaker2.trim(), max_lines),
            fallback: true,
        }
    }
}

/// Parse with the default noise threshold.
pub fn parse_dialogue(
    raw: &str,
    speaker1: &str,
    speaker2: &str,
    max_lines: usize,
) -> Vec<DialogueLine> {
    DialogueParser::new(max_lines, DEFAULT_MIN_LINE_CHARS).parse(raw, speaker1, speaker2)
}

/// Speaker and remaining text for a line with a recognised prefix.
fn attribute<'a>(line: &'a str, speaker1: &str, speaker2: &str) -> Option<(Speaker, &'a str)> {
    if let Some(rest) = strip_name(line, speaker1) {
        return Some((Speaker::One, rest));
    }
    if let Some(rest) = strip_name(line, speaker2) {
        return Some((Speaker::Two, rest));
    }
    let caps = RE_GENERIC_SPEAKER.captures(line)?;
    let speaker = if &caps[1] == "1" {
        Speaker::One
    } else {
        Speaker::Two
    };
    Some((speaker, &line[caps.get(0)?.end()..]))
}

/// `line` minus a leading `name:` (case-insensitive, spaces before the colon allowed).
fn strip_name<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    if name.is_empty() {
        return None;
    }
    let head = line.get(..name.len())?;
    if !head.eq_ignore_ascii_case(name) {
        return None;
    }
    line[name.len()..].trim_start().strip_prefix(':')
}

/// Fixed six-line script naming both speakers, cut to `max_lines`.
pub fn fallback_script(speaker1: &str, speaker2: &str, max_lines: usize) -> Vec<DialogueLine> {
    let lines = [
        (
            Speaker::One,
            format!("Welcome to the show! I'm {speaker1}, and today we're going through your study material."),
        ),
        (
            Speaker::Two,
            format!("And I'm {speaker2}. We couldn't build a full episode this time, so let's cover the essentials."),
        ),
        (
            Speaker::One,
            "A good place to start is the main ideas and the key terms the document defines.".to_string(),
        ),
        (
            Speaker::Two,
            "Try summarising each section in your own words as you read it.".to_string(),
        ),
        (
            Speaker::One,
            "Then test yourself with flashcards or a quiz to see what really stuck.".to_string(),
        ),
        (
            Speaker::Two,
            "Thanks for listening. Try generating the episode again in a little while.".to_string(),
        ),
    ];
    lines
        .into_iter()
        .take(max_lines.max(1))
        .map(|(speaker, text)| DialogueLine::new(speaker, text))
        .collect()
}

//! Source-text budgeting.
//!
//! Extracted documents can run to hundreds of thousands of characters; the
//! prompt only has room for a slice of that. [`budget`] keeps the head of the
//! text and marks the cut so the model knows the material continues.

/// Appended to text that was cut to fit the budget.
pub const TRUNCATION_MARKER: &str = "\n...[TRUNCATED]...";

/// Trim `text` to at most `max_chars` characters.
///
/// Returns `text` unchanged when it fits. Otherwise returns the first
/// `max_chars` characters followed by [`TRUNCATION_MARKER`]; a budget of
/// zero yields only the marker. Counts Unicode scalar values, so a cut never
/// lands inside a multi-byte character.
pub fn budget(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
            out.push_str(&text[..cut]);
            out.push_str(TRUNCATION_MARKER);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn short_text_is_unchanged() {
        assert_eq!(budget("hello", 10), "hello");
        assert_eq!(budget("hello", 5), "hello");
        assert_eq!(budget("", 0), "");
    }

    #[test]
    fn long_text_is_cut_and_marked() {
        let out = budget("abcdefghij", 4);
        assert_eq!(out, format!("abcd{TRUNCATION_MARKER}"));
    }

    #[test]
    fn zero_budget_yields_marker_only() {
        assert_eq!(budget("anything", 0), TRUNCATION_MARKER);
    }

    #[test]
    fn multibyte_characters_are_not_split() {
        let out = budget("héllo wörld", 2);
        assert_eq!(out, format!("hé{TRUNCATION_MARKER}"));
    }

    #[test]
    fn length_never_exceeds_budget_plus_marker() {
        let samples = [
            "",
            "a",
            "short text",
            "ünïcødé ünïcødé ünïcødé",
            "a much longer paragraph of study material that keeps going and going",
        ];
        for text in samples {
            for max in 0..=80 {
                let out = budget(text, max);
                assert!(
                    char_len(&out) <= max + char_len(TRUNCATION_MARKER),
                    "text={text:?} max={max} out={out:?}"
                );
                if char_len(text) <= max {
                    assert_eq!(out, text);
                }
            }
        }
    }
}

//! Final pass over every answer: no trailing question.

use regex::Regex;
use std::sync::OnceLock;

fn closing_question_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(any questions\?|any other questions\?)\s*$").expect("valid regex")
    })
}

/// Trim, drop a closing "Any questions?" and turn a final `?` into `.`.
///
/// Idempotent: `finalize(&finalize(x)) == finalize(x)`.
pub fn finalize(answer: &str) -> String {
    let text = answer.trim();
    let text = closing_question_regex().replace(text, "");
    let text = text.trim();

    match text.strip_suffix('?') {
        Some(rest) => format!("{}.", rest.trim_end()),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_any_questions() {
        assert_eq!(finalize("Here is the summary. Any questions?"), "Here is the summary.");
        assert_eq!(finalize("Done.  any OTHER questions?  "), "Done.");
    }

    #[test]
    fn test_trailing_question_mark_becomes_period() {
        assert_eq!(finalize("Is this correct?"), "Is this correct.");
        assert_eq!(finalize("Really ?"), "Really.");
    }

    #[test]
    fn test_declarative_unchanged() {
        assert_eq!(finalize("All good."), "All good.");
        assert_eq!(finalize("  padded  "), "padded");
        assert_eq!(finalize(""), "");
    }

    #[test]
    fn test_idempotent() {
        for input in [
            "Here is the summary. Any questions?",
            "Is this correct?",
            "Why?? ",
            "Plain text",
            "?",
            "Any questions?",
        ] {
            let once = finalize(input);
            assert_eq!(finalize(&once), once, "input: {:?}", input);
        }
    }

    #[test]
    fn test_phrase_must_end_the_text() {
        assert_eq!(
            finalize("Any questions? Ask the docs team."),
            "Any questions? Ask the docs team."
        );
    }
}

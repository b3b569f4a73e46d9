//! Text sanitization and bounded previews.

use crate::constants::{REDACTION_MARKER, TRUNCATION_SUFFIX};
use crate::security::Redactor;

/// Redact/truncate passes before giving up on a stable preview.
const MAX_PREVIEW_PASSES: usize = 4;

/// Drop control characters other than line breaks, collapse whitespace runs
/// inside a line to one space and drop blank lines.
pub fn sanitize_text(text: &str) -> String {
    text.split(['\n', '\r'])
        .map(|line| {
            let cleaned: String = line
                .chars()
                .map(|c| if c == '\t' { ' ' } else { c })
                .filter(|c| !c.is_control())
                .collect();
            cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate to at most `max_chars` characters, suffix included.
///
/// Works on `char`s, so a multi-byte character is never split.
pub fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    if text.chars().count() <= max_chars {
        return (text.to_string(), false);
    }

    let suffix_len = TRUNCATION_SUFFIX.chars().count();
    if max_chars <= suffix_len {
        return (text.chars().take(max_chars).collect(), true);
    }

    let mut out: String = text.chars().take(max_chars - suffix_len).collect();
    out.push_str(TRUNCATION_SUFFIX);
    (out, true)
}

/// Build a display string of at most `max_chars` characters that the
/// redactor no longer matches.
///
/// The full text is redacted before truncation so that a secret straddling
/// the cut is replaced as a whole. The truncated result is scanned again
/// because a shortened string can expose a new match.
pub fn bounded_preview(redactor: &Redactor, text: &str, max_chars: usize) -> String {
    let mut current = redactor.scan(&sanitize_text(text)).text;

    for _ in 0..MAX_PREVIEW_PASSES {
        let (truncated, _) = truncate_chars(&current, max_chars);
        let scan = redactor.scan(&truncated);
        if !scan.matched {
            return truncated;
        }
        current = scan.text;
    }

    truncate_chars(REDACTION_MARKER, max_chars).0
}

/// Rough token count for a piece of text.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / crate::constants::CHARS_PER_TOKEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CONTENT_PREVIEW_MAX_CHARS;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_strips_controls() {
        assert_eq!(sanitize_text("a\u{0}b\u{7}c d\te\u{1b}[0m"), "abc d e[0m");
        assert_eq!(sanitize_text("  \r\n "), "");
    }

    #[test]
    fn test_sanitize_keeps_line_breaks() {
        assert_eq!(
            sanitize_text("first  line\n\n\nsecond\tline \r\n  third"),
            "first line\nsecond line\nthird"
        );

        let preview = bounded_preview(&Redactor::default(), "def main():\n    return 1\n", 500);
        assert_eq!(preview, "def main():\nreturn 1");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(600);
        let (out, truncated) = truncate_chars(&text, 500);
        assert!(truncated);
        assert_eq!(out.chars().count(), 500);
        assert!(out.ends_with(TRUNCATION_SUFFIX));

        let (short, truncated) = truncate_chars("hello", 500);
        assert!(!truncated);
        assert_eq!(short, "hello");
    }

    #[test]
    fn test_preview_redacts_secret_at_cut_point() {
        let redactor = Redactor::default();
        let secret = "sk-ant-REDACTED";
        let text = format!("{}{}", "x ".repeat(240), secret);
        let preview = bounded_preview(&redactor, &text, CONTENT_PREVIEW_MAX_CHARS);

        assert!(preview.chars().count() <= CONTENT_PREVIEW_MAX_CHARS);
        assert!(!preview.contains("sk-ant"));
        assert!(!preview.contains("abcdefghijklmnop"));
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    proptest! {
        #[test]
        fn prop_preview_bounded_and_clean(text in "\\PC{0,1200}") {
            let redactor = Redactor::default();
            let preview = bounded_preview(&redactor, &text, CONTENT_PREVIEW_MAX_CHARS);
            prop_assert!(preview.chars().count() <= CONTENT_PREVIEW_MAX_CHARS);
            prop_assert!(!redactor.contains_secret(&preview));
            prop_assert!(!preview.chars().any(|c| c.is_control() && c != '\n'));
        }

        #[test]
        fn prop_secret_never_survives(prefix in "[a-z ]{0,600}", body in "[A-Za-z0-9]{24,40}") {
            let redactor = Redactor::default();
            let secret = format!("sk-{body}");
            let text = format!("{prefix} {secret} tail");
            let preview = bounded_preview(&redactor, &text, CONTENT_PREVIEW_MAX_CHARS);
            prop_assert!(!preview.contains(&secret));
        }
    }
}

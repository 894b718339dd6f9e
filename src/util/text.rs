use std::borrow::Cow;

/// Returns true for characters XML 1.0 does not allow in documents.
///
/// Tab, newline and carriage return are allowed; the remaining C0 controls,
/// DEL, and the noncharacters U+FFFE/U+FFFF are not.
fn is_forbidden_xml_char(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{7f}' | '\u{fffe}' | '\u{ffff}')
}

/// Removes characters that cannot appear in an XML 1.0 document.
///
/// Feed text comes from workflow input and from previously stored feeds, so
/// stray control bytes (terminal escapes, NULs) must not reach the writer.
///
/// Returns `Cow::Borrowed` when the input is already clean (common case).
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_forbidden_xml_char) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|&c| !is_forbidden_xml_char(c)).collect())
}

/// True when a feed field is missing in practice: empty, whitespace, or a
/// generator placeholder such as "Untitled" / "untitled feed".
pub fn is_placeholder_title(s: &str) -> bool {
    let trimmed = s.trim();
    trimmed.is_empty()
        || trimmed
            .get(..8)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("untitled"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_clean_text_returns_borrowed() {
        let result = strip_control_chars("Episode 12: Rust & XML");
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_preserves_tabs_newlines_cr() {
        assert_eq!(strip_control_chars("a\tb\nc\rd"), "a\tb\nc\rd");
    }

    #[test]
    fn test_strip_removes_controls() {
        assert_eq!(strip_control_chars("he\u{0}llo\u{1b}[31m\u{7f}"), "hello[31m");
    }

    #[test]
    fn test_strip_removes_noncharacters() {
        assert_eq!(strip_control_chars("a\u{fffe}b\u{ffff}"), "ab");
    }

    #[test]
    fn test_strip_unicode_preserved() {
        assert_eq!(strip_control_chars("Café 日本 🎧"), "Café 日本 🎧");
    }

    #[test]
    fn test_placeholder_titles() {
        assert!(is_placeholder_title(""));
        assert!(is_placeholder_title("   "));
        assert!(is_placeholder_title("Untitled"));
        assert!(is_placeholder_title("untitled feed"));
        assert!(is_placeholder_title("UNTITLED-1"));
    }

    #[test]
    fn test_real_titles_are_not_placeholders() {
        assert!(!is_placeholder_title("Morning Show"));
        assert!(!is_placeholder_title("The Untitled Podcast"));
        assert!(!is_placeholder_title("Untitle"));
        // Multibyte input shorter than the prefix must not panic
        assert!(!is_placeholder_title("日本"));
    }
}

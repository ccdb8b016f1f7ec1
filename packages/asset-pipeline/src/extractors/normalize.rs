//! Text normalization shared by the extractors.

use std::sync::LazyLock;

use regex::Regex;

static RE_HYPHEN_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\p{L})-[ \t]*\r?\n[ \t]*(\p{Ll})").unwrap());
static RE_PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t\r]*\n").unwrap());

/// Collapse every whitespace run to a single space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Join words split across lines with a hyphen ("manage-\nment").
pub fn rejoin_hyphenation(text: &str) -> String {
    RE_HYPHEN_BREAK.replace_all(text, "$1$2").into_owned()
}

/// Split on blank lines and collapse whitespace inside each paragraph.
pub fn paragraphs(text: &str) -> Vec<String> {
    let text = text.replace('\u{00a0}', " ");
    RE_PARAGRAPH_BREAK
        .split(&text)
        .map(collapse_whitespace)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Heuristic: a NUL byte in the first 8 KiB means this is not text.
pub fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|&b| b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Hello   world  \n\n  test  "), "Hello world test");
    }

    #[test]
    fn test_rejoin_hyphenation() {
        assert_eq!(rejoin_hyphenation("asset manage-\nment fees"), "asset management fees");
        // Capitalized continuation is a real hyphenated compound.
        assert_eq!(rejoin_hyphenation("Fee-\nBased"), "Fee-\nBased");
    }

    #[test]
    fn test_paragraphs() {
        let text = "First   line\ncontinues\n\n  \nSecond\u{00a0}para\n\n\n";
        assert_eq!(paragraphs(text), vec!["First line continues", "Second para"]);
    }

    #[test]
    fn test_looks_binary() {
        assert!(looks_binary(b"\x89PNG\r\n\x1a\n\0\0\0"));
        assert!(!looks_binary(b"<html>plain</html>"));
    }
}

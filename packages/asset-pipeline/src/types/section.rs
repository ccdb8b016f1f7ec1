//! Section focus: narrow a long filing down to the part worth analyzing.

use serde::{Deserialize, Serialize};

/// Start/end markers delimiting the section sent to the model.
///
/// Markers are matched case-insensitively. When either marker is missing
/// the rule does not apply and the whole document is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionFocus {
    pub name: String,
    pub start_marker: String,
    pub end_marker: String,
}

impl SectionFocus {
    pub fn new(
        name: impl Into<String>,
        start_marker: impl Into<String>,
        end_marker: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            start_marker: start_marker.into(),
            end_marker: end_marker.into(),
        }
    }

    /// Form ADV Part 2A, Item 5 (fees and compensation).
    pub fn form_adv_item5() -> Self {
        Self::new(
            "form_adv_item5",
            "Item 5 Information About Your Advisory Business",
            "Item 6",
        )
    }

    /// Form CRS fee disclosure.
    pub fn crs_fees() -> Self {
        Self::new(
            "crs_fees",
            "WHAT FEES WILL I PAY?",
            "WHAT ARE YOUR LEGAL OBLIGATIONS",
        )
    }

    /// The delimited section, start marker included, end marker excluded.
    pub fn apply<'a>(&self, text: &'a str) -> Option<&'a str> {
        let start = find_ignore_case(text, &self.start_marker, 0)?;
        let after_start = start + self.start_marker.len();
        let end = find_ignore_case(text, &self.end_marker, after_start)?;

        let section = text[start..end].trim();
        (!section.is_empty()).then_some(section)
    }
}

/// Byte offset of `needle` in `haystack` at or after `from`, ignoring
/// ASCII case. Offsets always land on char boundaries.
fn find_ignore_case(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();

    (from..=hay.len().checked_sub(pat.len())?)
        .filter(|&i| haystack.is_char_boundary(i))
        .find(|&i| hay[i..i + pat.len()].eq_ignore_ascii_case(pat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_adv_section() {
        let text = "Cover page\n\nItem 5 Information About Your Advisory Business\nWe charge 1% of AUM.\n\nItem 6 Performance-Based Fees\nNone.";
        let section = SectionFocus::form_adv_item5().apply(text).unwrap();

        assert!(section.starts_with("Item 5"));
        assert!(section.contains("1% of AUM"));
        assert!(!section.contains("Performance-Based"));
    }

    #[test]
    fn test_crs_markers_ignore_case() {
        let text = "Intro. What fees will I pay? Asset-based fees of 0.8%. What are your legal obligations to me?";
        let section = SectionFocus::crs_fees().apply(text).unwrap();
        assert!(section.contains("0.8%"));
        assert!(!section.to_lowercase().contains("legal obligations"));
    }

    #[test]
    fn test_missing_marker_does_not_apply() {
        let focus = SectionFocus::form_adv_item5();
        assert_eq!(focus.apply("no markers in this text"), None);
        assert_eq!(
            focus.apply("Item 5 Information About Your Advisory Business but no end"),
            None
        );
    }

    #[test]
    fn test_multibyte_text() {
        let focus = SectionFocus::new("x", "début", "fin");
        let section = focus.apply("préambule début contenu · fin").unwrap();
        assert_eq!(section, "début contenu ·");
    }
}

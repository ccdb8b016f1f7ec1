//! Extracted document types - normalized text ready for analysis.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::fingerprint::Fingerprint;
use crate::types::source::SourceRef;

/// A paragraph of normalized text, tagged with its PDF page when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl TextBlock {
    /// A block with no page (HTML).
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page: None,
        }
    }

    /// A block from a numbered PDF page.
    pub fn on_page(text: impl Into<String>, page: u32) -> Self {
        Self {
            text: text.into(),
            page: Some(page),
        }
    }
}

/// Article metadata recovered from the document itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub published: Option<NaiveDate>,
}

impl DocumentMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.author.is_none() && self.published.is_none()
    }
}

/// Normalized text of one source.
///
/// Created by an extractor and never mutated afterwards; the orchestrator
/// only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    source: SourceRef,
    fingerprint: Fingerprint,
    blocks: Vec<TextBlock>,
    #[serde(default)]
    skipped_pages: Vec<u32>,
    #[serde(default)]
    metadata: DocumentMetadata,
}

const PARAGRAPH_SEPARATOR: &str = "\n\n";

impl ExtractedDocument {
    /// Create a document from its text blocks. Empty blocks are dropped.
    pub fn new(source: SourceRef, fingerprint: Fingerprint, blocks: Vec<TextBlock>) -> Self {
        let blocks = blocks
            .into_iter()
            .filter(|b| !b.text.trim().is_empty())
            .collect();

        Self {
            source,
            fingerprint,
            blocks,
            skipped_pages: Vec::new(),
            metadata: DocumentMetadata::default(),
        }
    }

    /// Record PDF pages that had no decodable text.
    pub fn with_skipped_pages(mut self, pages: Vec<u32>) -> Self {
        self.skipped_pages = pages;
        self
    }

    /// Attach article metadata.
    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The same document attributed to another source with identical bytes.
    pub fn for_source(&self, source: SourceRef) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn blocks(&self) -> &[TextBlock] {
        &self.blocks
    }

    pub fn skipped_pages(&self) -> &[u32] {
        &self.skipped_pages
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    /// Plain text as shown to the model: paragraphs separated by blank
    /// lines, no page markers.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join(PARAGRAPH_SEPARATOR)
    }

    /// Text with `[[page N]]` lines wherever the page changes.
    pub fn text_with_page_markers(&self) -> String {
        let mut out = String::new();
        let mut current: Option<u32> = None;

        for block in &self.blocks {
            if block.page.is_some() && block.page != current {
                if !out.is_empty() {
                    out.push_str(PARAGRAPH_SEPARATOR);
                }
                if let Some(page) = block.page {
                    out.push_str(&format!("[[page {}]]", page));
                }
                current = block.page;
            }
            if !out.is_empty() {
                out.push_str(PARAGRAPH_SEPARATOR);
            }
            out.push_str(&block.text);
        }

        out
    }

    /// Page containing the character at `offset` of [`text()`](Self::text).
    pub fn page_of(&self, offset: usize) -> Option<u32> {
        let separator_len = PARAGRAPH_SEPARATOR.chars().count();
        let mut start = 0;

        for block in &self.blocks {
            let end = start + block.text.chars().count();
            if offset < end + separator_len {
                return block.page;
            }
            start = end + separator_len;
        }

        None
    }

    /// Length of [`text()`](Self::text) in characters.
    pub fn char_len(&self) -> usize {
        if self.blocks.is_empty() {
            return 0;
        }
        let separators = (self.blocks.len() - 1) * PARAGRAPH_SEPARATOR.chars().count();
        self.blocks.iter().map(|b| b.text.chars().count()).sum::<usize>() + separators
    }

    /// No extractable prose.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::source::SourceKind;

    fn doc(blocks: Vec<TextBlock>) -> ExtractedDocument {
        let source = SourceRef {
            kind: SourceKind::PdfDocument,
            locator: "upload:test.pdf".into(),
            title: None,
        };
        ExtractedDocument::new(source, Fingerprint::from_bytes(b"test"), blocks)
    }

    #[test]
    fn test_text_has_no_page_markers() {
        let d = doc(vec![
            TextBlock::on_page("Item 5 Fees", 1),
            TextBlock::on_page("Assets under management", 2),
        ]);

        assert_eq!(d.text(), "Item 5 Fees\n\nAssets under management");
        assert!(!d.text().contains("[[page"));
        assert_eq!(
            d.text_with_page_markers(),
            "[[page 1]]\n\nItem 5 Fees\n\n[[page 2]]\n\nAssets under management"
        );
    }

    #[test]
    fn test_page_of_offset() {
        let d = doc(vec![
            TextBlock::on_page("aaaa", 1),
            TextBlock::on_page("bbbb", 1),
            TextBlock::on_page("cccc", 3),
        ]);
        let text = d.text();

        assert_eq!(d.page_of(0), Some(1));
        assert_eq!(d.page_of(text.find("bbbb").unwrap()), Some(1));
        assert_eq!(d.page_of(text.find("cccc").unwrap()), Some(3));
        assert_eq!(d.page_of(text.len() + 10), None);
    }

    #[test]
    fn test_char_len_matches_text() {
        let d = doc(vec![TextBlock::new("héllo"), TextBlock::new("wörld")]);
        assert_eq!(d.char_len(), d.text().chars().count());
        assert_eq!(doc(vec![]).char_len(), 0);
    }

    #[test]
    fn test_blank_blocks_are_dropped() {
        let d = doc(vec![TextBlock::new("   "), TextBlock::new("")]);
        assert!(d.is_empty());
        assert_eq!(d.text(), "");
    }
}

//! Extractor trait: raw bytes to normalized text.

use crate::error::ExtractResult;
use crate::traits::fetcher::RawContent;
use crate::types::document::ExtractedDocument;
use crate::types::source::Source;

/// Converts the raw bytes of one kind of document into text blocks.
///
/// Extraction is synchronous and CPU-bound. A document with no prose is
/// an empty `ExtractedDocument`, not an error; only an unparseable byte
/// stream fails, with `ExtractError::Corrupt`.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, raw: &RawContent, source: &Source) -> ExtractResult<ExtractedDocument>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

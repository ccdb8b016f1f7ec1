//! PDF extraction with per-page text and skipped-page tracking.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use lopdf::Document;
use tracing::{debug, warn};

use crate::error::{ExtractError, ExtractResult};
use crate::extractors::normalize::{paragraphs, rejoin_hyphenation};
use crate::traits::extractor::ContentExtractor;
use crate::traits::fetcher::RawContent;
use crate::types::document::{DocumentMetadata, ExtractedDocument, TextBlock};
use crate::types::fingerprint::Fingerprint;
use crate::types::source::Source;

/// How far into the stream the `%PDF-` header may appear.
const HEADER_SEARCH_BYTES: usize = 1024;

/// Extractor for [`SourceKind::PdfDocument`](crate::types::source::SourceKind::PdfDocument).
///
/// Pages are read in order. A page that fails to decode or has no text
/// layer (a scanned image) is recorded in `skipped_pages`; only an
/// unparseable file is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_BYTES)];
    window.windows(5).any(|w| w == b"%PDF-")
}

/// lopdf asserts on some malformed structures instead of returning an
/// error; a panic there must only cost this document (or page).
fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl ContentExtractor for PdfExtractor {
    fn extract(&self, raw: &RawContent, source: &Source) -> ExtractResult<ExtractedDocument> {
        if !has_pdf_header(&raw.bytes) {
            return Err(ExtractError::Corrupt("missing %PDF- header".to_string()));
        }

        let document = guarded(|| Document::load_mem(&raw.bytes))
            .map_err(|msg| ExtractError::Corrupt(format!("PDF parser aborted: {}", msg)))?
            .map_err(|e| ExtractError::Corrupt(format!("failed to parse PDF: {}", e)))?;

        if document.is_encrypted() {
            return Err(ExtractError::Corrupt("PDF is encrypted".to_string()));
        }

        let pages = document.get_pages();
        if pages.is_empty() {
            return Err(ExtractError::Corrupt("PDF has no pages".to_string()));
        }

        let mut blocks = Vec::new();
        let mut skipped_pages = Vec::new();

        for &page_number in pages.keys() {
            let text = match guarded(|| document.extract_text(&[page_number])) {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    debug!(page = page_number, error = %e, "PDF page failed to decode");
                    skipped_pages.push(page_number);
                    continue;
                }
                Err(msg) => {
                    warn!(page = page_number, panic = %msg, "PDF page aborted the parser");
                    skipped_pages.push(page_number);
                    continue;
                }
            };

            let page_paragraphs = paragraphs(&rejoin_hyphenation(&text));
            if page_paragraphs.is_empty() {
                skipped_pages.push(page_number);
                continue;
            }
            blocks.extend(
                page_paragraphs
                    .into_iter()
                    .map(|p| TextBlock::on_page(p, page_number)),
            );
        }

        if !skipped_pages.is_empty() {
            warn!(
                locator = %source.locator(),
                skipped = skipped_pages.len(),
                total = pages.len(),
                "PDF pages without a text layer were skipped"
            );
        }
        debug!(
            locator = %source.locator(),
            pages = pages.len(),
            blocks = blocks.len(),
            "PDF extraction completed"
        );

        let metadata = DocumentMetadata {
            title: source.metadata().title.clone(),
            ..DocumentMetadata::default()
        };

        Ok(ExtractedDocument::new(
            source.reference(),
            Fingerprint::from_bytes(&raw.bytes),
            blocks,
        )
        .with_skipped_pages(skipped_pages)
        .with_metadata(metadata))
    }

    fn name(&self) -> &'static str {
        "pdf"
    }
}

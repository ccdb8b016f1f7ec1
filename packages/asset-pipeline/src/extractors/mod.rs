//! Content extractors, one per source kind.

pub mod html;
pub mod normalize;
pub mod pdf;

pub use html::HtmlExtractor;
pub use pdf::PdfExtractor;

//! Source types - what the caller asks the pipeline to analyze.

use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extractors::{HtmlExtractor, PdfExtractor};
use crate::traits::extractor::ContentExtractor;
use crate::types::section::SectionFocus;

/// Host serving Form ADV and Form CRS PDFs for registered advisers.
pub const ADVISER_REPORTS_BASE: &str = "https://reports.adviserinfo.sec.gov";

static RE_FIRM_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/firm/summary/(\d+)").unwrap());

/// The kind of document behind a source.
///
/// Each kind carries its own extraction capability; fetching is decided by
/// the [`Locator`], since a PDF may live at a URL just as well as on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// An HTML page
    WebPage,
    /// A PDF file, downloaded or uploaded
    PdfDocument,
}

impl SourceKind {
    /// The extractor that turns this kind's bytes into text.
    pub fn extractor(&self) -> &'static dyn ContentExtractor {
        match self {
            Self::WebPage => &HtmlExtractor,
            Self::PdfDocument => &PdfExtractor,
        }
    }

    /// Guess the kind from a locator (`.pdf` suffix means PDF).
    pub fn for_locator(locator: &Locator) -> Self {
        let name = match locator {
            Locator::Url(url) => url
                .split(['?', '#'])
                .next()
                .unwrap_or(url.as_str())
                .to_ascii_lowercase(),
            Locator::File(path) => path.to_string_lossy().to_ascii_lowercase(),
            Locator::Upload { name, .. } => name.to_ascii_lowercase(),
        };

        if name.ends_with(".pdf") {
            Self::PdfDocument
        } else {
            Self::WebPage
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebPage => "web_page",
            Self::PdfDocument => "pdf_document",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the bytes of a source come from.
#[derive(Clone, PartialEq, Eq)]
pub enum Locator {
    /// Remote resource fetched over HTTP(S)
    Url(String),
    /// Local file path
    File(PathBuf),
    /// Bytes handed over by the caller (e.g. an uploaded file)
    Upload { name: String, bytes: Bytes },
}

impl Locator {
    /// The URL, if this is a remote locator.
    pub fn as_url(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url),
            _ => None,
        }
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Upload { name, bytes } => f
                .debug_struct("Upload")
                .field("name", name)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Upload { name, .. } => write!(f, "upload:{}", name),
        }
    }
}

/// Caller-declared metadata for a source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Declared title, used when the document has none of its own
    pub title: Option<String>,

    /// When the caller retrieved or uploaded the source
    pub retrieved_at: Option<DateTime<Utc>>,

    /// Section to analyze, overriding the pipeline's default focus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<SectionFocus>,
}

/// One input to the pipeline. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    kind: SourceKind,
    locator: Locator,
    metadata: SourceMetadata,
}

impl Source {
    /// Create a source from its parts.
    pub fn new(kind: SourceKind, locator: Locator) -> Self {
        Self {
            kind,
            locator,
            metadata: SourceMetadata::default(),
        }
    }

    /// An HTML page at a URL.
    pub fn web_page(url: impl Into<String>) -> Self {
        Self::new(SourceKind::WebPage, Locator::Url(url.into()))
    }

    /// A PDF downloaded from a URL.
    pub fn pdf_url(url: impl Into<String>) -> Self {
        Self::new(SourceKind::PdfDocument, Locator::Url(url.into()))
    }

    /// A PDF on the local filesystem.
    pub fn pdf_file(path: impl Into<PathBuf>) -> Self {
        Self::new(SourceKind::PdfDocument, Locator::File(path.into()))
    }

    /// A PDF uploaded by the caller.
    pub fn pdf_upload(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self::new(
            SourceKind::PdfDocument,
            Locator::Upload {
                name: name.into(),
                bytes: bytes.into(),
            },
        )
    }

    /// The Form ADV and Form CRS filings of the adviser behind an
    /// adviserinfo `/firm/summary/<id>` page.
    ///
    /// Form ADV is focused on Item 5 and Form CRS on its fee section.
    /// Returns `None` when the URL carries no firm id.
    pub fn adviser_filings(summary_url: &str) -> Option<[Source; 2]> {
        let firm_id = firm_id(summary_url)?;
        let adv = Self::pdf_url(format!(
            "{}/reports/ADV/{}/PDF/{}.pdf",
            ADVISER_REPORTS_BASE, firm_id, firm_id
        ))
        .with_title(format!("Form ADV ({})", firm_id))
        .with_focus(SectionFocus::form_adv_item5());
        let crs = Self::pdf_url(format!("{}/crs/crs_{}.pdf", ADVISER_REPORTS_BASE, firm_id))
            .with_title(format!("Form CRS ({})", firm_id))
            .with_focus(SectionFocus::crs_fees());
        Some([adv, crs])
    }

    /// Set the declared title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }

    /// Set the retrieval timestamp.
    pub fn with_retrieved_at(mut self, retrieved_at: DateTime<Utc>) -> Self {
        self.metadata.retrieved_at = Some(retrieved_at);
        self
    }

    /// Analyze only the section `focus` delimits.
    pub fn with_focus(mut self, focus: SectionFocus) -> Self {
        self.metadata.focus = Some(focus);
        self
    }

    pub fn focus(&self) -> Option<&SectionFocus> {
        self.metadata.focus.as_ref()
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    /// Serializable identity of this source for reports and cache records.
    pub fn reference(&self) -> SourceRef {
        SourceRef {
            kind: self.kind,
            locator: self.locator.to_string(),
            title: self.metadata.title.clone(),
        }
    }
}

/// Numeric firm id from an adviserinfo summary URL.
pub fn firm_id(summary_url: &str) -> Option<&str> {
    RE_FIRM_ID
        .captures(summary_url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Lightweight, serializable reference to a [`Source`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub kind: SourceKind,
    pub locator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

//! Analysis result types - one structured record per source.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, ExtractError, FetchError};
use crate::types::document::DocumentMetadata;
use crate::types::fingerprint::Fingerprint;
use crate::types::narrative::NarrativeSections;
use crate::types::source::SourceRef;

/// Structured fields produced by the extraction step, keyed by field name.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Terminal outcome of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
    /// Too little text to analyze; not an error
    NoData,
    /// Pipeline call was cancelled before this source finished
    Cancelled,
}

/// Which family of error ended a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    Extract,
    Analysis,
    Cancelled,
}

/// Display-ready error slot of an [`AnalysisResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub kind: FailureKind,

    /// Short stable code (`http_error`, `corrupt`, ...)
    pub reason: String,

    /// Human-readable detail
    pub message: String,
}

impl SourceFailure {
    pub fn cancelled() -> Self {
        Self {
            kind: FailureKind::Cancelled,
            reason: "cancelled".to_string(),
            message: "analysis was cancelled before this source finished".to_string(),
        }
    }
}

impl From<&FetchError> for SourceFailure {
    fn from(e: &FetchError) -> Self {
        Self {
            kind: FailureKind::Fetch,
            reason: e.reason().to_string(),
            message: e.to_string(),
        }
    }
}

impl From<&ExtractError> for SourceFailure {
    fn from(e: &ExtractError) -> Self {
        Self {
            kind: FailureKind::Extract,
            reason: e.reason().to_string(),
            message: e.to_string(),
        }
    }
}

impl From<&AnalysisError> for SourceFailure {
    fn from(e: &AnalysisError) -> Self {
        Self {
            kind: FailureKind::Analysis,
            reason: e.reason().to_string(),
            message: e.to_string(),
        }
    }
}

/// Output of the classification step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// e.g. "regulatory filing", "market commentary", "fund fact sheet"
    pub document_type: String,

    pub topic: String,

    /// Classifier's confidence (0.0 to 1.0)
    #[serde(default)]
    pub confidence: f32,
}

/// Analysis of one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub source: SourceRef,

    pub outcome: Outcome,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,

    /// Schema-validated fields
    #[serde(default)]
    pub fields: Fields,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Quality indicator (0.0 to 1.0)
    #[serde(default)]
    pub confidence: f32,

    /// PDF pages skipped for lack of a text layer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_pages: Vec<u32>,

    #[serde(default, skip_serializing_if = "DocumentMetadata::is_empty")]
    pub document: DocumentMetadata,

    /// Populated only when the outcome is `Failed` or `Cancelled`
    #[serde(default)]
    pub error: Option<SourceFailure>,
}

impl AnalysisResult {
    fn empty(source: SourceRef, outcome: Outcome) -> Self {
        Self {
            source,
            outcome,
            fingerprint: None,
            classification: None,
            fields: Fields::new(),
            summary: None,
            confidence: 0.0,
            skipped_pages: Vec::new(),
            document: DocumentMetadata::default(),
            error: None,
        }
    }

    /// A successful analysis.
    pub fn succeeded(
        source: SourceRef,
        classification: Classification,
        fields: Fields,
        summary: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            classification: Some(classification),
            fields,
            summary: Some(summary.into()),
            confidence: confidence.clamp(0.0, 1.0),
            ..Self::empty(source, Outcome::Succeeded)
        }
    }

    /// Not enough text to analyze.
    pub fn no_data(source: SourceRef) -> Self {
        Self::empty(source, Outcome::NoData)
    }

    /// A failure at any stage.
    pub fn failed(source: SourceRef, failure: SourceFailure) -> Self {
        Self {
            error: Some(failure),
            ..Self::empty(source, Outcome::Failed)
        }
    }

    /// Unfinished when the run was cancelled.
    pub fn cancelled(source: SourceRef) -> Self {
        Self {
            error: Some(SourceFailure::cancelled()),
            ..Self::empty(source, Outcome::Cancelled)
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn with_skipped_pages(mut self, pages: Vec<u32>) -> Self {
        self.skipped_pages = pages;
        self
    }

    pub fn with_document_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.document = metadata;
        self
    }

    /// The same analysis attributed to another source with identical bytes.
    pub fn for_source(&self, source: SourceRef) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    /// Error reason code, if any.
    pub fn reason(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.reason.as_str())
    }

    /// Bullet sections of the narrative summary.
    pub fn sections(&self) -> NarrativeSections {
        self.summary
            .as_deref()
            .map(NarrativeSections::parse)
            .unwrap_or_default()
    }
}

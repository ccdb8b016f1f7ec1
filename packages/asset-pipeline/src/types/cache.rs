//! Cache records: an extracted document plus, optionally, its analysis.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::analysis::AnalysisResult;
use crate::types::document::ExtractedDocument;
use crate::types::fingerprint::Fingerprint;

/// An analysis together with the prompt set that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAnalysis {
    pub result: AnalysisResult,

    /// Hash of prompts and field schema at the time of analysis
    pub prompt_version: String,
}

/// Fingerprint → (document, optional analysis).
///
/// Entries are replaced wholesale, never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub document: ExtractedDocument,

    #[serde(default)]
    pub analysis: Option<CachedAnalysis>,

    pub created_at: DateTime<Utc>,

    /// `None` means the entry never expires
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// A fresh entry expiring `ttl_seconds` from now.
    pub fn new(document: ExtractedDocument, ttl_seconds: Option<u64>) -> Self {
        let created_at = Utc::now();
        let expires_at = ttl_seconds
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
            .and_then(|ttl| created_at.checked_add_signed(ttl));

        Self {
            document,
            analysis: None,
            created_at,
            expires_at,
        }
    }

    /// A copy of this entry carrying `analysis`, keeping the timestamps.
    pub fn with_analysis(self, result: AnalysisResult, prompt_version: impl Into<String>) -> Self {
        Self {
            analysis: Some(CachedAnalysis {
                result,
                prompt_version: prompt_version.into(),
            }),
            ..self
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        self.document.fingerprint()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// The stored analysis, if it was produced by `prompt_version`.
    pub fn analysis_for(&self, prompt_version: &str) -> Option<&AnalysisResult> {
        self.analysis
            .as_ref()
            .filter(|a| a.prompt_version == prompt_version)
            .map(|a| &a.result)
    }
}

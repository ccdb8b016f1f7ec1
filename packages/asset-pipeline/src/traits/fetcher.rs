//! Fetcher trait: retrieve the raw bytes behind a source.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::FetchResult;
use crate::types::source::Source;

/// Raw bytes of a source, before extraction.
#[derive(Debug, Clone)]
pub struct RawContent {
    pub bytes: Bytes,

    /// MIME type reported by the server, if any
    pub content_type: Option<String>,

    /// URL after redirects (remote sources only)
    pub final_url: Option<String>,

    /// `ETag` or `Last-Modified` from the response
    pub validator: Option<String>,

    pub fetched_at: DateTime<Utc>,
}

impl RawContent {
    /// Raw bytes with no transport metadata.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: None,
            final_url: None,
            validator: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_final_url(mut self, url: impl Into<String>) -> Self {
        self.final_url = Some(url.into());
        self
    }

    pub fn with_validator(mut self, validator: impl Into<String>) -> Self {
        self.validator = Some(validator.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Retrieves source bytes with timeout, retry and size policy applied.
///
/// Implementations never mutate shared state beyond the read itself.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the full content of a source.
    async fn fetch(&self, source: &Source) -> FetchResult<RawContent>;

    /// Cheap pre-fetch validator (`ETag` / `Last-Modified`).
    ///
    /// Returns `None` when the source has no such identifier; local files
    /// and uploads always return `None`. Probing is best-effort: callers
    /// treat an error the same as `None`.
    async fn probe(&self, _source: &Source) -> FetchResult<Option<String>> {
        Ok(None)
    }
}

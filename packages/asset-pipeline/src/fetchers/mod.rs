//! Fetcher implementations.
//!
//! - `HttpFetcher` - remote `http`/`https` sources
//! - `FileFetcher` - local files and caller uploads
//! - `SourceFetcher` - dispatches to one of the above by locator

pub mod file;
pub mod http;

use async_trait::async_trait;

pub use file::FileFetcher;
pub use http::HttpFetcher;

use crate::error::{FetchResult, Result};
use crate::traits::fetcher::{Fetcher, RawContent};
use crate::types::config::PipelineConfig;
use crate::types::source::{Locator, Source};

/// The production fetcher: URLs over HTTP, everything else from disk or
/// memory.
pub struct SourceFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl SourceFetcher {
    pub fn new(http: HttpFetcher, file: FileFetcher) -> Self {
        Self { http, file }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(&config.fetch, config.max_bytes)?,
            file: FileFetcher::new(config.max_bytes),
        })
    }

    fn route(&self, source: &Source) -> &dyn Fetcher {
        match source.locator() {
            Locator::Url(_) => &self.http,
            Locator::File(_) | Locator::Upload { .. } => &self.file,
        }
    }
}

#[async_trait]
impl Fetcher for SourceFetcher {
    async fn fetch(&self, source: &Source) -> FetchResult<RawContent> {
        self.route(source).fetch(source).await
    }

    async fn probe(&self, source: &Source) -> FetchResult<Option<String>> {
        self.route(source).probe(source).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_uploads_route_to_file_fetcher() {
        let fetcher = SourceFetcher::from_config(&PipelineConfig::default()).unwrap();
        let source = Source::pdf_upload("crs.pdf", b"%PDF-1.7".to_vec());

        let raw = fetcher.fetch(&source).await.unwrap();
        assert_eq!(&raw.bytes[..], b"%PDF-1.7");
        assert_eq!(fetcher.probe(&source).await.unwrap(), None);
    }
}

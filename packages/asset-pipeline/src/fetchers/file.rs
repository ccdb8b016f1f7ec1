//! Local file and upload fetcher.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::traits::fetcher::{Fetcher, RawContent};
use crate::types::source::{Locator, Source};

/// Reads `File` locators from disk and passes `Upload` bytes through.
pub struct FileFetcher {
    max_bytes: u64,
}

impl FileFetcher {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    fn check_size(&self, len: u64) -> FetchResult<()> {
        if len > self.max_bytes {
            return Err(FetchError::TooLarge {
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    async fn fetch(&self, source: &Source) -> FetchResult<RawContent> {
        match source.locator() {
            Locator::File(path) => {
                let metadata = tokio::fs::metadata(path)
                    .await
                    .map_err(|e| FetchError::Unreadable(format!("{}: {}", path.display(), e)))?;
                if !metadata.is_file() {
                    return Err(FetchError::Unreadable(format!(
                        "{} is not a regular file",
                        path.display()
                    )));
                }
                self.check_size(metadata.len())?;

                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| FetchError::Unreadable(format!("{}: {}", path.display(), e)))?;
                // The file may have grown since the metadata call.
                self.check_size(bytes.len() as u64)?;

                debug!(path = %path.display(), bytes = bytes.len(), "Read local file");
                Ok(RawContent::new(bytes))
            }
            Locator::Upload { name, bytes } => {
                self.check_size(bytes.len() as u64)?;
                if bytes.is_empty() {
                    return Err(FetchError::Unreadable(format!("upload {} is empty", name)));
                }
                Ok(RawContent::new(bytes.clone()))
            }
            Locator::Url(url) => Err(FetchError::InvalidLocator(format!(
                "{} is not a local file",
                url
            ))),
        }
    }
}

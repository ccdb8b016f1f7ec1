//! HTTP fetcher for remote sources.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use reqwest::{Client, Response};
use tracing::{debug, warn};
use url::Url;

use crate::error::{FetchError, FetchResult, PipelineError, Result};
use crate::resilience::RetryPolicy;
use crate::traits::fetcher::{Fetcher, RawContent};
use crate::types::config::FetchConfig;
use crate::types::source::Source;

/// Fetches `http`/`https` sources with a bounded timeout, retry on
/// transient failures and a hard byte ceiling.
///
/// # Example
///
/// ```rust,ignore
/// use asset_pipeline::fetchers::HttpFetcher;
///
/// let fetcher = HttpFetcher::new(&FetchConfig::default(), 20 * 1024 * 1024)?;
/// let raw = fetcher.fetch(&Source::web_page("https://example.com/insights")).await?;
/// ```
pub struct HttpFetcher {
    client: Client,
    retry: RetryPolicy,
    max_bytes: u64,
}

impl HttpFetcher {
    /// Create a fetcher from fetch settings and a byte ceiling.
    pub fn new(config: &FetchConfig, max_bytes: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry: RetryPolicy::new(
                config.max_attempts,
                std::time::Duration::from_millis(config.backoff_base_ms),
                std::time::Duration::from_millis(config.backoff_max_ms),
            ),
            max_bytes,
        })
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn parse_url(source: &Source) -> FetchResult<Url> {
        let raw = source.locator().as_url().ok_or_else(|| {
            FetchError::InvalidLocator(format!("{} is not a URL", source.locator()))
        })?;

        let url = Url::parse(raw).map_err(|e| FetchError::InvalidLocator(format!("{}: {}", raw, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(FetchError::InvalidLocator(format!(
                "unsupported scheme {:?} in {}",
                other, raw
            ))),
        }
    }

    fn classify(err: reqwest::Error, url: &Url) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Network(err.to_string())
        }
    }

    async fn fetch_once(&self, url: &Url) -> FetchResult<RawContent> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Self::classify(e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if let Some(declared) = header_u64(&response, CONTENT_LENGTH.as_str()) {
            if declared > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
        }

        let final_url = response.url().to_string();
        let content_type = header(&response, CONTENT_TYPE.as_str());
        let validator = validator(&response);
        let bytes = self.read_body(response, url).await?;

        let mut raw = RawContent::new(bytes).with_final_url(final_url);
        raw.content_type = content_type;
        raw.validator = validator;
        raw.fetched_at = Utc::now();
        Ok(raw)
    }

    /// Stream the body, failing as soon as the ceiling is crossed.
    async fn read_body(&self, mut response: Response, url: &Url) -> FetchResult<Bytes> {
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| Self::classify(e, url))? {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

fn header(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn header_u64(response: &Response, name: &str) -> Option<u64> {
    header(response, name).and_then(|v| v.trim().parse().ok())
}

fn validator(response: &Response) -> Option<String> {
    header(response, ETAG.as_str()).or_else(|| header(response, LAST_MODIFIED.as_str()))
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, source: &Source) -> FetchResult<RawContent> {
        let url = Self::parse_url(source)?;
        let mut attempt = 1;

        loop {
            debug!(url = %url, attempt, "HTTP fetch starting");

            match self.fetch_once(&url).await {
                Ok(raw) => {
                    debug!(url = %url, bytes = raw.len(), "HTTP fetch completed");
                    return Ok(raw);
                }
                Err(e) if e.is_retryable() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        url = %url,
                        error = %e,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(url = %url, error = %e, attempt, "Fetch failed");
                    return Err(e);
                }
            }
        }
    }

    async fn probe(&self, source: &Source) -> FetchResult<Option<String>> {
        let url = Self::parse_url(source)?;
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| Self::classify(e, &url))?;

        if !response.status().is_success() {
            return Ok(None);
        }
        Ok(validator(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::Router;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn fetcher(max_bytes: u64) -> HttpFetcher {
        HttpFetcher::new(&FetchConfig::default(), max_bytes)
            .unwrap()
            .with_retry(RetryPolicy::new(
                3,
                Duration::from_millis(1),
                Duration::from_millis(5),
            ))
    }

    #[tokio::test]
    async fn test_fetch_with_validator() {
        let router = Router::new().route(
            "/page",
            get(|| async {
                let mut headers = HeaderMap::new();
                headers.insert("etag", "\"v1\"".parse().unwrap());
                headers.insert("content-type", "text/html".parse().unwrap());
                (headers, "<html><body>hello</body></html>")
            }),
        );
        let base = serve(router).await;
        let source = Source::web_page(format!("{}/page", base));

        let raw = fetcher(1024).fetch(&source).await.unwrap();

        assert_eq!(&raw.bytes[..], b"<html><body>hello</body></html>");
        assert_eq!(raw.validator.as_deref(), Some("\"v1\""));
        assert_eq!(raw.content_type.as_deref(), Some("text/html"));

        let probed = fetcher(1024).probe(&source).await.unwrap();
        assert_eq!(probed.as_deref(), Some("\"v1\""));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_reported() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/down",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::INTERNAL_SERVER_ERROR
                }),
            )
            .with_state(hits.clone());
        let base = serve(router).await;

        let err = fetcher(1024)
            .fetch(&Source::web_page(format!("{}/down", base)))
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "http_error");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/missing",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::NOT_FOUND
                }),
            )
            .with_state(hits.clone());
        let base = serve(router).await;

        let err = fetcher(1024)
            .fetch(&Source::web_page(format!("{}/missing", base)))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/flaky",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::SERVICE_UNAVAILABLE, "busy")
                    } else {
                        (StatusCode::OK, "ok")
                    }
                }),
            )
            .with_state(hits.clone());
        let base = serve(router).await;

        let raw = fetcher(1024)
            .fetch(&Source::web_page(format!("{}/flaky", base)))
            .await
            .unwrap();

        assert_eq!(&raw.bytes[..], b"ok");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_body_over_ceiling_is_too_large() {
        let router = Router::new().route("/big", get(|| async { "x".repeat(4096) }));
        let base = serve(router).await;

        let err = fetcher(1000)
            .fetch(&Source::web_page(format!("{}/big", base)))
            .await
            .unwrap_err();

        assert_eq!(err, FetchError::TooLarge { limit: 1000 });
        assert_eq!(err.reason(), "too large");
    }

    #[tokio::test]
    async fn test_rejects_non_http_locators() {
        let f = fetcher(1024);
        let err = f.fetch(&Source::web_page("ftp://example.com/file")).await.unwrap_err();
        assert_eq!(err.reason(), "invalid_locator");

        let err = f.fetch(&Source::pdf_file("/tmp/x.pdf")).await.unwrap_err();
        assert_eq!(err.reason(), "invalid_locator");
    }
}

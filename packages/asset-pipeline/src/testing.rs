//! Testing utilities including mock implementations.
//!
//! These let applications (and this crate's own tests) exercise the
//! pipeline without network access or a real reasoning service.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::error::{FetchError, FetchResult, ServiceError};
use crate::pipeline::{Orchestrator, Pipeline, PipelineContext};
use crate::reasoning::GuardedService;
use crate::stores::MemoryStore;
use crate::traits::fetcher::{Fetcher, RawContent};
use crate::traits::reasoning::{ReasoningRequest, ReasoningService, ReasoningStep};
use crate::types::config::{PipelineConfig, ReasoningConfig};
use crate::types::source::{Locator, Source};

const DEFAULT_CLASSIFICATION: &str =
    r#"{"document_type": "market commentary", "topic": "fixed income outlook", "confidence": 0.9}"#;

const DEFAULT_FIELDS: &str = r#"{
    "asset_name": "Acme Core Bond Fund",
    "asset_type": "mutual fund",
    "valuation": null,
    "assets_under_management": "$1.2 billion",
    "fees": "0.45% expense ratio",
    "risk_notes": ["Interest rate risk", "Credit risk"],
    "investment_themes": ["duration", "investment grade credit"],
    "key_points": ["Yields fell in Q3", "Manager extended duration"]
}"#;

const DEFAULT_SUMMARY: &str = "**Key Numerical Data**
• Assets under management: $1.2 billion
**Main Points**
• Yields fell across the curve in Q3
**Important Disclosures**
• Past performance does not guarantee future results";

const DEFAULT_MATCHES: &str = r#"{"matches": []}"#;

/// Reasoning settings with millisecond backoff and an effectively
/// unlimited quota, for fast tests.
pub fn test_reasoning_config() -> ReasoningConfig {
    ReasoningConfig {
        max_attempts: 3,
        backoff_base_ms: 1,
        backoff_max_ms: 2,
        requests_per_second: 1000,
        ..ReasoningConfig::default()
    }
}

/// A mock reasoning service for testing.
///
/// Returns scripted responses per step. Without a script, each step gets a
/// canned answer that passes the asset-management schema. Clones share
/// scripts and call history.
#[derive(Clone, Default)]
pub struct MockReasoner {
    /// Scripted responses per step; the last one repeats
    responses: Arc<RwLock<HashMap<ReasoningStep, VecDeque<String>>>>,

    /// Failures returned before any response, per step
    failures: Arc<RwLock<HashMap<ReasoningStep, (usize, ServiceError)>>>,

    /// Artificial delay per call
    latency: Option<Duration>,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<ReasoningRequest>>>,
}

impl MockReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a step.
    pub fn with_response(self, step: ReasoningStep, response: impl Into<String>) -> Self {
        self.responses
            .write()
            .unwrap()
            .entry(step)
            .or_default()
            .push_back(response.into());
        self
    }

    /// Fail the next `times` calls for a step with `error`.
    pub fn fail_times(self, step: ReasoningStep, times: usize, error: ServiceError) -> Self {
        self.failures.write().unwrap().insert(step, (times, error));
        self
    }

    /// Delay every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Total calls, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Requests made for one step, in order.
    pub fn calls_for(&self, step: ReasoningStep) -> Vec<ReasoningRequest> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.step == step)
            .cloned()
            .collect()
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<ReasoningRequest> {
        self.calls.read().unwrap().clone()
    }

    fn next_response(&self, step: ReasoningStep) -> String {
        let mut responses = self.responses.write().unwrap();
        match responses.get_mut(&step) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => match step {
                ReasoningStep::Classify => DEFAULT_CLASSIFICATION,
                ReasoningStep::ExtractFields => DEFAULT_FIELDS,
                ReasoningStep::Summarize => DEFAULT_SUMMARY,
                ReasoningStep::MatchFunds => DEFAULT_MATCHES,
            }
            .to_string(),
        }
    }

    fn next_failure(&self, step: ReasoningStep) -> Option<ServiceError> {
        let mut failures = self.failures.write().unwrap();
        let (remaining, error) = failures.get_mut(&step)?;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(error.clone())
    }
}

#[async_trait]
impl ReasoningService for MockReasoner {
    async fn complete(&self, request: ReasoningRequest) -> Result<String, ServiceError> {
        let step = request.step;
        self.calls.write().unwrap().push(request);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match self.next_failure(step) {
            Some(error) => Err(error),
            None => Ok(self.next_response(step)),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A mock fetcher for testing.
///
/// Serves canned bytes keyed by the locator's display form (URL, path or
/// `upload:<name>`). Uploads without canned bytes pass their own bytes
/// through; any other unknown locator is an HTTP 404.
#[derive(Clone, Default)]
pub struct MockFetcher {
    pages: Arc<RwLock<HashMap<String, Bytes>>>,
    validators: Arc<RwLock<HashMap<String, String>>>,
    failures: Arc<RwLock<HashMap<String, FetchError>>>,
    latency: Arc<RwLock<HashMap<String, Duration>>>,
    default_latency: Option<Duration>,
    fetches: Arc<RwLock<HashMap<String, usize>>>,
    total: Arc<AtomicUsize>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for a locator.
    pub fn with_page(self, locator: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.pages.write().unwrap().insert(locator.into(), body.into());
        self
    }

    /// Report `validator` (an ETag) for a locator, on probe and fetch.
    pub fn with_validator(self, locator: impl Into<String>, validator: impl Into<String>) -> Self {
        self.validators
            .write()
            .unwrap()
            .insert(locator.into(), validator.into());
        self
    }

    /// Fail every fetch of a locator.
    pub fn fail(self, locator: impl Into<String>, error: FetchError) -> Self {
        self.failures.write().unwrap().insert(locator.into(), error);
        self
    }

    /// Delay every fetch.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.default_latency = Some(latency);
        self
    }

    /// Delay fetches of one locator.
    pub fn with_latency_for(self, locator: impl Into<String>, latency: Duration) -> Self {
        self.latency.write().unwrap().insert(locator.into(), latency);
        self
    }

    /// Fetches of one locator so far.
    pub fn fetch_count(&self, locator: &str) -> usize {
        self.fetches.read().unwrap().get(locator).copied().unwrap_or(0)
    }

    /// Fetches of every locator so far.
    pub fn total_fetches(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, source: &Source) -> FetchResult<RawContent> {
        let key = source.locator().to_string();
        *self.fetches.write().unwrap().entry(key.clone()).or_insert(0) += 1;
        self.total.fetch_add(1, Ordering::SeqCst);

        let latency = self
            .latency
            .read()
            .unwrap()
            .get(&key)
            .copied()
            .or(self.default_latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = self.failures.read().unwrap().get(&key) {
            return Err(error.clone());
        }

        let body = self.pages.read().unwrap().get(&key).cloned();
        let body = match (body, source.locator()) {
            (Some(body), _) => body,
            (None, Locator::Upload { bytes, .. }) => bytes.clone(),
            (None, _) => {
                return Err(FetchError::HttpStatus {
                    status: 404,
                    url: key,
                })
            }
        };

        let mut raw = RawContent::new(body);
        if let Some(validator) = self.validators.read().unwrap().get(&key) {
            raw = raw.with_validator(validator.clone());
        }
        Ok(raw)
    }

    async fn probe(&self, source: &Source) -> FetchResult<Option<String>> {
        let key = source.locator().to_string();
        Ok(self.validators.read().unwrap().get(&key).cloned())
    }
}

/// A pipeline over mocks with an in-memory cache.
///
/// The config's reasoning timings are replaced by [`test_reasoning_config`].
pub fn mock_pipeline(fetcher: MockFetcher, reasoner: MockReasoner, config: PipelineConfig) -> Pipeline {
    let config = PipelineConfig {
        reasoning: ReasoningConfig {
            breaker_threshold: config.reasoning.breaker_threshold,
            ..test_reasoning_config()
        },
        ..config
    };
    let guarded = GuardedService::new(Arc::new(reasoner), &config.reasoning);
    let orchestrator = Orchestrator::new(Arc::new(guarded), &config);
    let context = PipelineContext::new(
        Arc::new(fetcher),
        Arc::new(MemoryStore::new()),
        Arc::new(orchestrator),
    );
    Pipeline::new(context, config)
}

/// A market-commentary article wrapped in typical site chrome.
pub fn sample_article_html() -> String {
    r#"<!DOCTYPE html>
<html>
<head>
  <title>Fixed Income Outlook | Acme Asset Management</title>
  <meta name="author" content="Jane Analyst">
  <meta property="article:published_time" content="2024-07-15T09:00:00Z">
  <script>window.analytics && analytics.trackPageView();</script>
  <style>body { font-family: sans-serif; }</style>
</head>
<body>
  <header class="site-header">
    <div class="logo">Acme Asset Management</div>
    <nav class="navbar">Home | Funds | Insights</nav>
  </header>
  <div class="cookie-banner">We use cookies. <button>Accept cookies</button></div>
  <main>
    <article>
      <h1>Fixed Income Outlook: Q3</h1>
      <p class="byline">By Jane Analyst</p>
      <p>Fixed income markets rallied through the third quarter as inflation cooled and
         central banks signalled that the tightening cycle had ended.</p>
      <p>Ten-year Treasury yields fell 45 basis points to 3.9%, while investment grade
         credit spreads tightened to their narrowest level since 2021.</p>
      <div class="newsletter-signup">Subscribe to our newsletter for weekly insights.</div>
      <p>The Acme Core Bond Fund, with $1.2 billion in assets, extended duration to 6.5 years
         and added to high-quality corporate bonds. The fund charges a 0.45% expense ratio.</p>
      <p>Risks include rising rates, credit defaults and reduced liquidity in stressed markets.
         Past performance does not guarantee future results.</p>
    </article>
  </main>
  <aside class="related">Related: Equity Outlook Q3</aside>
  <footer>© 2024 Acme Asset Management. All rights reserved.</footer>
</body>
</html>"#
        .to_string()
}

/// A minimal text PDF with one page per entry. An empty entry is a page
/// with no text layer.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    build_pdf(pages, None)
}

/// Like [`pdf_with_pages`], but page `bad_page` (1-based) carries its own
/// font resource without `/Type /Font`, which lopdf asserts against.
pub fn pdf_with_malformed_font(pages: &[&str], bad_page: usize) -> Vec<u8> {
    build_pdf(pages, Some(bad_page))
}

fn build_pdf(pages: &[&str], bad_page: Option<usize>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for (index, text) in pages.iter().enumerate() {
        let operations = if text.is_empty() {
            Vec::new()
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        };
        if bad_page == Some(index + 1) {
            page.set(
                "Resources",
                dictionary! {
                    "Font" => dictionary! {
                        "F1" => dictionary! {
                            "Subtype" => "Type1",
                            "BaseFont" => "Courier",
                        },
                    },
                },
            );
        }
        let page_id = doc.add_object(page);
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_repeat_last() {
        let mock = MockReasoner::new()
            .with_response(ReasoningStep::Classify, "first")
            .with_response(ReasoningStep::Classify, "second");
        let request = || ReasoningRequest::new(ReasoningStep::Classify, "sys", "doc");

        assert_eq!(mock.complete(request()).await.unwrap(), "first");
        assert_eq!(mock.complete(request()).await.unwrap(), "second");
        assert_eq!(mock.complete(request()).await.unwrap(), "second");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_fetcher_counts_and_fails() {
        let fetcher = MockFetcher::new()
            .with_page("https://a.example", "<p>hi</p>")
            .fail("https://b.example", FetchError::Timeout { url: "https://b.example".into() });

        assert!(fetcher.fetch(&Source::web_page("https://a.example")).await.is_ok());
        let err = fetcher.fetch(&Source::web_page("https://b.example")).await.unwrap_err();
        assert_eq!(err.reason(), "timeout");
        let err = fetcher.fetch(&Source::web_page("https://c.example")).await.unwrap_err();
        assert_eq!(err.reason(), "http_error");

        assert_eq!(fetcher.fetch_count("https://a.example"), 1);
        assert_eq!(fetcher.total_fetches(), 3);
    }

    #[test]
    fn test_pdf_fixture_has_header_and_pages() {
        let bytes = pdf_with_pages(&["one", "", "three"]);
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }
}

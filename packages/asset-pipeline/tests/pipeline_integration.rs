//! Integration tests for the analysis pipeline.
//!
//! These drive whole batches through the controller:
//! 1. Fetch (mocked, or a real local HTTP server)
//! 2. Extract HTML / PDF
//! 3. Analyze with a scripted reasoning service
//! 4. Aggregate into a report

use std::sync::Arc;
use std::time::Duration;

use asset_pipeline::{
    testing::{mock_pipeline, pdf_with_malformed_font, pdf_with_pages, sample_article_html, test_reasoning_config, MockFetcher, MockReasoner},
    AnalyzeOptions, FetchConfig, GuardedService, MemoryStore, Orchestrator, Outcome, Pipeline,
    PipelineConfig, PipelineContext, ReasoningStep, ServiceError, Source, SourceFetcher,
};
use tokio_util::sync::CancellationToken;

const ARTICLE: &str = "https://insights.example/fixed-income-q3";

fn long_pdf() -> Vec<u8> {
    pdf_with_pages(&[
        "Item 4 Advisory Business. Acme Advisers manages $2.4 billion for individuals and pension plans.",
        "",
        "Item 5 Fees and Compensation. We charge an annual fee of 1.00% on the first $1 million and 0.75% thereafter. Fees are billed quarterly in advance based on account value.",
    ])
}

#[tokio::test]
async fn test_one_result_per_source_in_input_order() {
    let fetcher = MockFetcher::new()
        .with_page(ARTICLE, sample_article_html())
        .with_latency_for(ARTICLE, Duration::from_millis(50))
        .with_page("https://insights.example/empty", "<html><body><nav>Menu</nav></body></html>");
    let pipeline = mock_pipeline(fetcher, MockReasoner::new(), PipelineConfig::default());

    let sources = vec![
        Source::web_page(ARTICLE),
        Source::pdf_upload("adv.pdf", long_pdf()),
        Source::web_page("https://insights.example/gone"),
        Source::web_page("https://insights.example/empty"),
    ];
    let report = pipeline.run(&sources).await;

    assert_eq!(report.len(), sources.len());
    for (result, source) in report.results.iter().zip(&sources) {
        assert_eq!(result.source, source.reference());
    }
    assert_eq!(report.results[0].outcome, Outcome::Succeeded);
    assert_eq!(report.results[1].outcome, Outcome::Succeeded);
    assert_eq!(report.results[1].skipped_pages, vec![2]);
    assert_eq!(report.results[2].reason(), Some("http_error"));
    assert_eq!(report.results[3].outcome, Outcome::NoData);
    assert_eq!(
        (report.succeeded, report.failed, report.no_data, report.cancelled),
        (2, 1, 1, 0)
    );
}

#[tokio::test]
async fn test_second_run_is_served_from_cache() {
    let reasoner = MockReasoner::new();
    let fetcher = MockFetcher::new().with_page(ARTICLE, sample_article_html());
    let pipeline = mock_pipeline(fetcher, reasoner.clone(), PipelineConfig::default());
    let sources = [Source::web_page(ARTICLE)];

    let first = pipeline.run(&sources).await;
    let calls = reasoner.call_count();
    let second = pipeline.run(&sources).await;

    assert_eq!(calls, 3);
    assert_eq!(reasoner.call_count(), calls);
    assert_eq!(first.results, second.results);
    assert_eq!(first.cache_hits, 0);
    assert_eq!(second.cache_hits, 1);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn test_identical_bytes_share_one_analysis() {
    let reasoner = MockReasoner::new();
    let fetcher = MockFetcher::new()
        .with_page("https://mirror-a.example/q3", sample_article_html())
        .with_page("https://mirror-b.example/q3", sample_article_html());
    let pipeline = mock_pipeline(
        fetcher,
        reasoner.clone(),
        PipelineConfig::default().with_max_concurrency(1),
    );

    let report = pipeline
        .run(&[
            Source::web_page("https://mirror-a.example/q3"),
            Source::web_page("https://mirror-b.example/q3"),
        ])
        .await;

    assert_eq!(reasoner.calls_for(ReasoningStep::Classify).len(), 1);
    assert_eq!(report.results[0].fingerprint, report.results[1].fingerprint);
    assert_eq!(report.results[1].source.locator, "https://mirror-b.example/q3");
    assert_eq!(report.results[0].fields, report.results[1].fields);
}

#[tokio::test]
async fn test_short_text_is_no_data_without_service_calls() {
    let reasoner = MockReasoner::new();
    let fetcher = MockFetcher::new().with_page(
        "https://insights.example/brief",
        "<html><body><p>Markets were flat today.</p></body></html>",
    );
    let pipeline = mock_pipeline(fetcher, reasoner.clone(), PipelineConfig::default());
    let sources = [Source::web_page("https://insights.example/brief")];

    let report = pipeline.run(&sources).await;

    assert_eq!(report.results[0].outcome, Outcome::NoData);
    assert!(report.results[0].error.is_none());
    assert_eq!(reasoner.call_count(), 0);

    // The same page is analyzed once the threshold is lowered for a call.
    let report = pipeline
        .analyze(&sources, AnalyzeOptions::new().with_min_text_length(10))
        .await;
    assert_eq!(report.results[0].outcome, Outcome::Succeeded);
    assert_eq!(reasoner.calls_for(ReasoningStep::Classify).len(), 1);
}

#[tokio::test]
async fn test_concurrent_runs_analyze_once() {
    let reasoner = MockReasoner::new().with_latency(Duration::from_millis(30));
    let fetcher = MockFetcher::new().with_page(ARTICLE, sample_article_html());
    let pipeline = mock_pipeline(fetcher, reasoner.clone(), PipelineConfig::default());
    let other = pipeline.clone();
    let sources = [Source::web_page(ARTICLE)];

    let (a, b) = tokio::join!(pipeline.run(&sources), other.run(&sources));

    assert!(a.results[0].is_success());
    assert!(b.results[0].is_success());
    assert_eq!(reasoner.calls_for(ReasoningStep::Classify).len(), 1);
    assert_eq!(reasoner.call_count(), 3);
    assert_eq!(a.cache_hits + b.cache_hits, 1);
}

#[tokio::test]
async fn test_corrupt_pdf_fails_only_its_source() {
    let fetcher = MockFetcher::new().with_page(ARTICLE, sample_article_html());
    let pipeline = mock_pipeline(fetcher, MockReasoner::new(), PipelineConfig::default());

    let report = pipeline
        .run(&[
            Source::pdf_upload("broken.pdf", b"%PDF-1.4\n%%garbage".to_vec()),
            Source::web_page(ARTICLE),
        ])
        .await;

    assert_eq!(report.results[0].outcome, Outcome::Failed);
    assert_eq!(report.results[0].reason(), Some("corrupt"));
    assert!(report.results[1].is_success());
}

#[tokio::test]
async fn test_pdf_parser_panic_spares_sibling_sources() {
    let fetcher = MockFetcher::new().with_page(ARTICLE, sample_article_html());
    let pipeline = mock_pipeline(fetcher, MockReasoner::new(), PipelineConfig::default());
    let bad_pdf = pdf_with_malformed_font(
        &["Item 5 Fees and Compensation. We charge an annual fee of 1.00% on the first $1 million and 0.75% thereafter. Fees are billed quarterly in advance based on account value, and clients may terminate at any time."],
        1,
    );

    let report = pipeline
        .run(&[
            Source::web_page(ARTICLE),
            Source::pdf_upload("bad.pdf", bad_pdf),
        ])
        .await;

    assert_eq!(report.len(), 2);
    assert!(report.results[0].is_success());
    assert_ne!(report.results[1].outcome, Outcome::Cancelled);
    #[cfg(debug_assertions)]
    {
        assert_eq!(report.results[1].outcome, Outcome::NoData);
        assert_eq!(report.results[1].skipped_pages, vec![1]);
    }
}

#[tokio::test]
async fn test_cancellation_marks_unfinished_sources() {
    let slow = Duration::from_secs(30);
    let fetcher = MockFetcher::new()
        .with_page("https://fast.example/1", sample_article_html())
        .with_page("https://fast.example/2", "<html><body><p>Short note.</p></body></html>")
        .with_page("https://slow.example/3", sample_article_html())
        .with_latency_for("https://slow.example/3", slow)
        .with_page("https://slow.example/4", sample_article_html())
        .with_latency_for("https://slow.example/4", slow)
        .with_page("https://slow.example/5", sample_article_html())
        .with_latency_for("https://slow.example/5", slow);
    let pipeline = mock_pipeline(fetcher, MockReasoner::new(), PipelineConfig::default().with_max_concurrency(5));

    let sources = vec![
        Source::web_page("https://fast.example/1"),
        Source::web_page("https://slow.example/3"),
        Source::web_page("https://fast.example/2"),
        Source::web_page("https://slow.example/4"),
        Source::web_page("https://slow.example/5"),
    ];
    let report = pipeline
        .run_with_deadline(&sources, Duration::from_millis(500))
        .await;

    assert_eq!(report.len(), 5);
    assert_eq!(report.results[0].outcome, Outcome::Succeeded);
    assert_eq!(report.results[2].outcome, Outcome::NoData);
    for i in [1, 3, 4] {
        assert_eq!(report.results[i].outcome, Outcome::Cancelled);
        assert_eq!(report.results[i].reason(), Some("cancelled"));
    }
    assert_eq!(report.cancelled, 3);
}

#[tokio::test]
async fn test_cancel_token_before_start() {
    let fetcher = MockFetcher::new().with_page(ARTICLE, sample_article_html());
    let pipeline = mock_pipeline(fetcher.clone(), MockReasoner::new(), PipelineConfig::default());
    let token = CancellationToken::new();
    token.cancel();

    let report = pipeline
        .run_with_cancel(&[Source::web_page(ARTICLE)], token)
        .await;

    assert_eq!(report.cancelled, 1);
    assert_eq!(fetcher.total_fetches(), 0);
}

#[tokio::test]
async fn test_breaker_opens_across_sources() {
    let reasoner = MockReasoner::new().fail_times(
        ReasoningStep::Classify,
        1000,
        ServiceError::Transient("503".into()),
    );
    let fetcher = MockFetcher::new()
        .with_page("https://a.example/1", sample_article_html())
        .with_page("https://a.example/2", sample_article_html().replace("Q3", "Q4"));
    let mut config = PipelineConfig::default().with_max_concurrency(1);
    config.reasoning.breaker_threshold = 2;
    let pipeline = mock_pipeline(fetcher, reasoner.clone(), config);

    let report = pipeline
        .run(&[
            Source::web_page("https://a.example/1"),
            Source::web_page("https://a.example/2"),
        ])
        .await;

    for result in &report.results {
        assert_eq!(result.reason(), Some("service_unavailable"));
    }
    // The second source fails fast on the open breaker.
    assert_eq!(reasoner.call_count(), 2);
}

mod http {
    use super::*;
    use axum::http::StatusCode;
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

    fn pipeline(reasoner: &MockReasoner) -> Pipeline {
        let config = PipelineConfig::default()
            .with_fetch(FetchConfig {
                backoff_base_ms: 1,
                backoff_max_ms: 5,
                ..FetchConfig::default()
            })
            .with_reasoning(test_reasoning_config());
        let guarded = GuardedService::new(Arc::new(reasoner.clone()), &config.reasoning);
        let context = PipelineContext::new(
            Arc::new(SourceFetcher::from_config(&config).unwrap()),
            Arc::new(MemoryStore::new()),
            Arc::new(Orchestrator::new(Arc::new(guarded), &config)),
        );
        Pipeline::new(context, config)
    }

    #[tokio::test]
    async fn test_server_errors_fail_one_source() {
        let router = Router::new()
            .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/article", get(|| async { axum::response::Html(sample_article_html()) }));
        let base = serve(router).await;
        let reasoner = MockReasoner::new();

        let report = pipeline(&reasoner)
            .run(&[
                Source::web_page(format!("{}/broken", base)),
                Source::web_page(format!("{}/article", base)),
            ])
            .await;

        assert_eq!(report.results[0].outcome, Outcome::Failed);
        assert_eq!(report.results[0].reason(), Some("http_error"));
        assert!(report.results[0].error.as_ref().unwrap().message.contains("500"));
        assert!(report.results[1].is_success());
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 1);
    }
}

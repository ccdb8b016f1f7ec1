//! Pipeline controller: fetch → extract → analyze for a batch of sources.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::fetchers::SourceFetcher;
use crate::pipeline::orchestrator::Orchestrator;
use crate::pipeline::state::{SourceProgress, SourceState};
use crate::reasoning::{GuardedService, OpenAiService};
use crate::stores::{MemoryStore, SingleFlight};
use crate::traits::fetcher::Fetcher;
use crate::traits::reasoning::ReasoningService;
use crate::traits::store::CacheStore;
use crate::types::analysis::{AnalysisResult, SourceFailure};
use crate::types::cache::CacheEntry;
use crate::types::config::{AnalyzeOptions, PipelineConfig};
use crate::types::document::ExtractedDocument;
use crate::types::fingerprint::Fingerprint;
use crate::types::report::Report;
use crate::types::section::SectionFocus;
use crate::types::source::{Source, SourceRef};

/// Shared handles for pipeline runs.
///
/// Cloning is cheap. Pipelines built from one context share the cache,
/// the in-flight table and the guarded reasoning service (breaker and
/// quota included).
#[derive(Clone)]
pub struct PipelineContext {
    pub fetcher: Arc<dyn Fetcher>,
    pub store: Arc<dyn CacheStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub flights: Arc<SingleFlight>,
}

impl PipelineContext {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn CacheStore>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            fetcher,
            store,
            orchestrator,
            flights: Arc::new(SingleFlight::new()),
        }
    }

    /// Production fetchers and an in-memory cache around `service`.
    pub fn with_service(config: &PipelineConfig, service: Arc<dyn ReasoningService>) -> Result<Self> {
        let guarded = GuardedService::new(service, &config.reasoning);
        Ok(Self::new(
            Arc::new(SourceFetcher::from_config(config)?),
            Arc::new(MemoryStore::new()),
            Arc::new(Orchestrator::new(Arc::new(guarded), config)),
        ))
    }

    /// Replace the cache backend.
    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = store;
        self
    }
}

/// How one source is analyzed: its section focus and the matching
/// prompt version that keys its cached analysis.
struct AnalysisPlan<'a> {
    focus: Option<&'a SectionFocus>,
    version: String,
}

/// What one source produced, and whether the analysis came from the cache.
struct SourceRun {
    result: AnalysisResult,
    cache_hit: bool,
}

impl SourceRun {
    fn fresh(result: AnalysisResult) -> Self {
        Self {
            result,
            cache_hit: false,
        }
    }

    fn cached(result: AnalysisResult) -> Self {
        Self {
            result,
            cache_hit: true,
        }
    }
}

/// Runs batches of sources against a shared [`PipelineContext`].
#[derive(Clone)]
pub struct Pipeline {
    context: PipelineContext,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(context: PipelineContext, config: PipelineConfig) -> Self {
        Self { context, config }
    }

    /// Configuration and credentials from the environment, OpenAI as the
    /// reasoning service.
    ///
    /// A missing `OPENAI_API_KEY` is a configuration error.
    pub fn from_env() -> Result<Self> {
        let config = PipelineConfig::from_env()?;
        let service = OpenAiService::from_config(&config.reasoning)?;
        let context = PipelineContext::with_service(&config, Arc::new(service))?;
        Ok(Self::new(context, config))
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Same context, per-call overrides applied to the config.
    pub fn with_options(&self, options: &AnalyzeOptions) -> Self {
        Self {
            context: self.context.clone(),
            config: self.config.with_options(options),
        }
    }

    /// Run with per-call overrides.
    pub async fn analyze(&self, sources: &[Source], options: AnalyzeOptions) -> Report {
        self.with_options(&options).run(sources).await
    }

    pub async fn run(&self, sources: &[Source]) -> Report {
        self.run_with_cancel(sources, CancellationToken::new()).await
    }

    /// Run, cancelling whatever is unfinished once `deadline` elapses.
    pub async fn run_with_deadline(&self, sources: &[Source], deadline: Duration) -> Report {
        let token = CancellationToken::new();
        let run = self.run_with_cancel(sources, token.clone());
        tokio::pin!(run);

        tokio::select! {
            report = &mut run => report,
            _ = tokio::time::sleep(deadline) => {
                warn!(deadline_ms = deadline.as_millis() as u64, "Deadline reached, cancelling run");
                token.cancel();
                run.await
            }
        }
    }

    /// Run until done or until `cancel` fires.
    ///
    /// Sources finished before cancellation keep their results; the rest
    /// are reported as cancelled. Results are in input order.
    pub async fn run_with_cancel(&self, sources: &[Source], cancel: CancellationToken) -> Report {
        let run_id = Uuid::now_v7();
        let span = info_span!("pipeline_run", %run_id, sources = sources.len());

        async {
            let started = Instant::now();
            info!(
                max_concurrency = self.config.max_concurrency,
                ttl_seconds = self.config.ttl_seconds,
                "Starting analysis run"
            );
            if self.config.cache_ttl().is_some() {
                self.purge_expired().await;
            }

            let semaphore = Semaphore::new(self.config.max_concurrency.max(1));
            let tasks = sources.iter().enumerate().map(|(index, source)| {
                let semaphore = &semaphore;
                let cancel = &cancel;
                let span = info_span!("source", index, locator = %source.locator());

                async move {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            debug!("Source cancelled");
                            SourceRun::fresh(AnalysisResult::cancelled(source.reference()))
                        }
                        run = async {
                            let Ok(_permit) = semaphore.acquire().await else {
                                return SourceRun::fresh(AnalysisResult::cancelled(source.reference()));
                            };
                            self.process(source).await
                        } => run,
                    }
                }
                .instrument(span)
            });

            let runs = join_all(tasks).await;
            let cache_hits = runs.iter().filter(|r| r.cache_hit).count();
            let results = runs.into_iter().map(|r| r.result).collect();
            let report = Report::from_results(run_id, results, cache_hits, started.elapsed());

            info!(
                succeeded = report.succeeded,
                failed = report.failed,
                no_data = report.no_data,
                cancelled = report.cancelled,
                cache_hits = report.cache_hits,
                elapsed_ms = report.elapsed_ms,
                "Analysis run complete"
            );
            report
        }
        .instrument(span)
        .await
    }

    /// Drop a cached document and analysis.
    pub async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<()> {
        self.context.store.invalidate(fingerprint).await
    }

    async fn purge_expired(&self) {
        match self.context.store.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "Purged expired cache entries"),
            Err(e) => warn!(error = %e, "Failed to purge expired cache entries"),
        }
    }

    async fn process(&self, source: &Source) -> SourceRun {
        let mut progress = SourceProgress::new();
        let run = self.process_stages(source, &mut progress).await;

        advance(&mut progress, SourceState::from_outcome(run.result.outcome));
        debug!(
            state = %progress.state(),
            cache_hit = run.cache_hit,
            "Source finished"
        );
        run
    }

    async fn process_stages(&self, source: &Source, progress: &mut SourceProgress) -> SourceRun {
        let reference = source.reference();
        let caching = self.config.cache_ttl().is_some();
        let plan = self.plan(source);

        advance(progress, SourceState::Fetching);

        // Locator shortcut: a known URL + validator skips the download.
        let mut locator_key = None;
        if caching {
            if let Some(key) = self.locator_key(source).await {
                if let Some(entry) = self.lookup_alias(&key).await {
                    if let Some(result) = self.reuse_analysis(&entry, &reference, &plan) {
                        debug!(fingerprint = %entry.fingerprint().short(), "Served from cache without fetching");
                        return SourceRun::cached(result);
                    }
                }
                locator_key = Some(key);
            }
        }

        let raw = match self.context.fetcher.fetch(source).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(reason = e.reason(), error = %e, "Fetch failed");
                advance(progress, SourceState::Failed);
                return SourceRun::fresh(AnalysisResult::failed(reference, SourceFailure::from(&e)));
            }
        };

        let fingerprint = Fingerprint::from_bytes(&raw.bytes);
        debug!(fingerprint = %fingerprint.short(), bytes = raw.len(), "Fetched source");

        if locator_key.is_none() && caching {
            if let (Some(url), Some(validator)) = (source.locator().as_url(), raw.validator.as_deref()) {
                locator_key = Some(Fingerprint::for_locator(url, validator));
            }
        }

        let cached = if caching {
            self.lookup(&fingerprint).await
        } else {
            None
        };

        if let Some(entry) = &cached {
            self.record_alias(locator_key.as_ref(), &fingerprint).await;
            if let Some(result) = self.reuse_analysis(entry, &reference, &plan) {
                debug!(fingerprint = %fingerprint.short(), "Reusing cached analysis");
                return SourceRun::cached(result);
            }
        }

        advance(progress, SourceState::Extracting);
        let document = match cached {
            Some(entry) => {
                debug!(fingerprint = %fingerprint.short(), "Reusing cached document");
                entry.document.for_source(reference.clone())
            }
            None => {
                let extractor = source.kind().extractor();
                match extractor.extract(&raw, source) {
                    Ok(document) => {
                        debug!(
                            extractor = extractor.name(),
                            blocks = document.blocks().len(),
                            chars = document.char_len(),
                            skipped_pages = document.skipped_pages().len(),
                            "Extracted document"
                        );
                        if caching {
                            self.record_alias(locator_key.as_ref(), &fingerprint).await;
                        }
                        document
                    }
                    Err(e) => {
                        warn!(reason = e.reason(), error = %e, "Extraction failed");
                        advance(progress, SourceState::Failed);
                        return SourceRun::fresh(AnalysisResult::failed(
                            reference,
                            SourceFailure::from(&e),
                        ));
                    }
                }
            }
        };

        advance(progress, SourceState::Analyzing);
        self.analyze_document(&document, &plan, caching).await
    }

    /// The source's own focus wins over the orchestrator's default.
    fn plan<'a>(&'a self, source: &'a Source) -> AnalysisPlan<'a> {
        let orchestrator = &self.context.orchestrator;
        match source.focus() {
            Some(focus) => AnalysisPlan {
                focus: Some(focus),
                version: orchestrator.version_for(Some(focus)),
            },
            None => AnalysisPlan {
                focus: orchestrator.focus(),
                version: orchestrator.prompt_version().to_string(),
            },
        }
    }

    /// Analyze under the per-fingerprint single-flight lock.
    ///
    /// A caller that waited on the lock re-checks the store and reuses the
    /// analysis the previous holder stored. Cache writes for a fingerprint
    /// happen only while holding its lock.
    async fn analyze_document(
        &self,
        document: &ExtractedDocument,
        plan: &AnalysisPlan<'_>,
        caching: bool,
    ) -> SourceRun {
        let orchestrator = &self.context.orchestrator;
        let min_text_length = self.config.min_text_length;

        if !caching {
            return SourceRun::fresh(
                orchestrator
                    .analyze_focused(document, min_text_length, plan.focus)
                    .await,
            );
        }

        let fingerprint = document.fingerprint();
        let _flight = self.context.flights.acquire(fingerprint).await;

        let existing = self.lookup(fingerprint).await;
        if let Some(entry) = &existing {
            if let Some(result) = self.reuse_analysis(entry, document.source(), plan) {
                debug!(fingerprint = %fingerprint.short(), "Analysis completed by a concurrent run");
                return SourceRun::cached(result);
            }
        }

        let result = orchestrator
            .analyze_focused(document, min_text_length, plan.focus)
            .await;
        let entry = CacheEntry::new(document.clone(), self.config.cache_ttl());
        if result.is_success() {
            self.store_entry(entry.with_analysis(result.clone(), plan.version.as_str()))
                .await;
        } else if existing.is_none() {
            // Keep the extracted document so a retry skips extraction.
            self.store_entry(entry).await;
        }

        SourceRun::fresh(result)
    }

    /// Cached analysis for `entry`, if still valid for this run.
    ///
    /// Documents now shorter than the minimum are left to the
    /// orchestrator so they finish as `NoData`.
    fn reuse_analysis(
        &self,
        entry: &CacheEntry,
        source: &SourceRef,
        plan: &AnalysisPlan<'_>,
    ) -> Option<AnalysisResult> {
        if entry.document.char_len() < self.config.min_text_length {
            return None;
        }
        entry
            .analysis_for(&plan.version)
            .map(|result| result.for_source(source.clone()))
    }

    async fn locator_key(&self, source: &Source) -> Option<Fingerprint> {
        let url = source.locator().as_url()?;
        match self.context.fetcher.probe(source).await {
            Ok(Some(validator)) => Some(Fingerprint::for_locator(url, &validator)),
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "Probe failed, fetching without locator key");
                None
            }
        }
    }

    async fn lookup(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        match self.context.store.get(fingerprint).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(fingerprint = %fingerprint.short(), error = %e, "Cache lookup failed");
                None
            }
        }
    }

    async fn lookup_alias(&self, locator: &Fingerprint) -> Option<CacheEntry> {
        match self.context.store.resolve_alias(locator).await {
            Ok(Some(content)) => self.lookup(&content).await,
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Alias lookup failed");
                None
            }
        }
    }

    async fn store_entry(&self, entry: CacheEntry) {
        let fingerprint = entry.fingerprint().clone();
        if let Err(e) = self.context.store.put(entry).await {
            warn!(fingerprint = %fingerprint.short(), error = %e, "Failed to cache entry");
        }
    }

    async fn record_alias(&self, locator: Option<&Fingerprint>, content: &Fingerprint) {
        let Some(locator) = locator else {
            return;
        };
        if let Err(e) = self.context.store.put_alias(locator, content).await {
            warn!(error = %e, "Failed to record locator alias");
        }
    }
}

fn advance(progress: &mut SourceProgress, next: SourceState) {
    let from = progress.state();
    if progress.advance(next) {
        debug!(%from, to = %next, "Source state");
    }
}

/// Analyze `sources` with OpenAI and environment configuration.
///
/// Fails only when the configuration is unusable (for example a missing
/// `OPENAI_API_KEY`); per-source failures are reported in the [`Report`].
pub async fn analyze(sources: &[Source], options: AnalyzeOptions) -> Result<Report> {
    let pipeline = Pipeline::from_env()?;
    Ok(pipeline.analyze(sources, options).await)
}

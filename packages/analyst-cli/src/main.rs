// Command-line entry point for the analysis pipeline

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use asset_pipeline::{
    AnalysisResult, AnalyzeOptions, FundMatch, FundMatcher, FundProfile, Locator, OpenAiService,
    Outcome, Pipeline, PipelineConfig, PipelineContext, Report, SectionFocus, Source, SourceKind,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "analyst", about = "Analyze financial web pages and PDFs", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, extract and analyze a batch of sources
    Analyze(AnalyzeArgs),
}

#[derive(clap::Args)]
struct AnalyzeArgs {
    /// Web page URL (a URL ending in .pdf is treated as a PDF)
    #[arg(long = "url")]
    urls: Vec<String>,

    /// Local PDF file
    #[arg(long = "pdf")]
    pdfs: Vec<PathBuf>,

    /// PDF served over HTTP
    #[arg(long = "pdf-url")]
    pdf_urls: Vec<String>,

    /// Adviser summary page (.../firm/summary/<id>); analyzes the firm's
    /// Form ADV Item 5 and Form CRS fee section
    #[arg(long = "adviser")]
    advisers: Vec<String>,

    /// Cache time-to-live in seconds (0 disables the cache)
    #[arg(long)]
    ttl: Option<u64>,

    /// Sources processed at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Minimum characters of text before the model is called
    #[arg(long = "min-text")]
    min_text: Option<usize>,

    /// Give up on unfinished sources after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Only analyze one section of each document (adviser filings keep
    /// their own sections)
    #[arg(long, value_enum)]
    focus: Option<Focus>,

    /// JSON file with a fund catalog to match against
    #[arg(long)]
    funds: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Focus {
    /// Form ADV Part 2A, Item 5
    AdvItem5,
    /// Form CRS fee disclosure
    CrsFees,
}

impl Focus {
    fn section(self) -> SectionFocus {
        match self {
            Self::AdvItem5 => SectionFocus::form_adv_item5(),
            Self::CrsFees => SectionFocus::crs_fees(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,asset_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => run_analyze(args).await,
    }
}

async fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let sources = collect_sources(&args)?;
    if sources.is_empty() {
        anyhow::bail!("no sources given; use --url, --pdf, --pdf-url or --adviser");
    }

    let catalog = match &args.funds {
        Some(path) => load_catalog(path)?,
        None => Vec::new(),
    };

    let mut config = PipelineConfig::from_env().context("Failed to load configuration")?;
    if let Some(focus) = args.focus {
        config = config.with_focus(focus.section());
    }
    let service = OpenAiService::from_config(&config.reasoning)
        .context("Failed to configure reasoning service")?;
    let context = PipelineContext::with_service(&config, Arc::new(service))
        .context("Failed to configure pipeline")?;

    let options = AnalyzeOptions {
        ttl_seconds: args.ttl,
        max_concurrency: args.concurrency,
        min_text_length: args.min_text,
    };
    let pipeline = Pipeline::new(context, config).with_options(&options);

    tracing::info!(sources = sources.len(), "Analyzing sources");
    let report = match args.timeout {
        Some(secs) => pipeline.run_with_deadline(&sources, Duration::from_secs(secs)).await,
        None => pipeline.run(&sources).await,
    };

    let matches = if catalog.is_empty() {
        Vec::new()
    } else {
        let matcher = FundMatcher::new(pipeline.context().orchestrator.service().clone());
        match matcher.match_funds(&report, &catalog).await {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(error = %e, "Fund matching failed");
                Vec::new()
            }
        }
    };

    if args.json {
        let output = if catalog.is_empty() {
            serde_json::to_value(&report)?
        } else {
            serde_json::json!({ "report": report, "fund_matches": matches })
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&report);
        if !catalog.is_empty() {
            print_matches(&matches);
        }
    }

    Ok(())
}

fn collect_sources(args: &AnalyzeArgs) -> Result<Vec<Source>> {
    let urls = args.urls.iter().map(|url| {
        let locator = Locator::Url(url.clone());
        Source::new(SourceKind::for_locator(&locator), locator)
    });
    let pdfs = args.pdfs.iter().map(|path| Source::pdf_file(path.clone()));
    let pdf_urls = args.pdf_urls.iter().map(|url| Source::pdf_url(url.clone()));

    let mut sources: Vec<Source> = urls.chain(pdfs).chain(pdf_urls).collect();

    for url in &args.advisers {
        let filings = Source::adviser_filings(url)
            .with_context(|| format!("No firm id in adviser URL {}", url))?;
        sources.extend(filings);
    }
    Ok(sources)
}

fn load_catalog(path: &PathBuf) -> Result<Vec<FundProfile>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fund catalog {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse fund catalog {}", path.display()))
}

fn print_report(report: &Report) {
    println!(
        "Run {}: {} succeeded, {} failed, {} no data, {} cancelled ({} from cache) in {} ms",
        report.run_id,
        report.succeeded,
        report.failed,
        report.no_data,
        report.cancelled,
        report.cache_hits,
        report.elapsed_ms
    );

    for (i, result) in report.results.iter().enumerate() {
        println!();
        println!("[{}] {} - {}", i + 1, status(result.outcome), result.source.locator);
        print_result(result);
    }
}

fn status(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Succeeded => "OK",
        Outcome::Failed => "FAILED",
        Outcome::NoData => "NO DATA",
        Outcome::Cancelled => "CANCELLED",
    }
}

fn print_result(result: &AnalysisResult) {
    if let Some(error) = &result.error {
        println!("    reason: {} ({})", error.reason, error.message);
        return;
    }
    if let Some(title) = &result.document.title {
        println!("    title: {}", title);
    }
    if let Some(classification) = &result.classification {
        println!(
            "    type: {} | topic: {} | confidence: {:.2}",
            classification.document_type, classification.topic, result.confidence
        );
    }
    if !result.skipped_pages.is_empty() {
        println!("    skipped pages: {:?}", result.skipped_pages);
    }
    for (name, value) in &result.fields {
        println!("    {}: {}", name, value);
    }

    let sections = result.sections();
    if sections.is_empty() {
        if let Some(summary) = &result.summary {
            println!("    summary: {}", summary);
        }
        return;
    }
    for section in &sections.sections {
        println!("    {}", section.title);
        for point in &section.points {
            println!("      • {}", point);
        }
    }
}

fn print_matches(matches: &[FundMatch]) {
    println!();
    if matches.is_empty() {
        println!("No fund matches.");
        return;
    }
    println!("Fund matches:");
    for m in matches {
        println!("  {} - {}/5: {}", m.fund_name, m.score, m.rationale);
        for strength in &m.strengths {
            println!("      + {}", strength);
        }
        for concern in &m.concerns {
            println!("      - {}", concern);
        }
    }
}

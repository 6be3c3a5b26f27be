//! arXiv Harvester - Entry Point
//!
//! Harvests one date window of one set and writes it as CSV.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use arxiv_harvester::config::api;
use arxiv_harvester::models::FieldSchema;
use arxiv_harvester::{CitationEnricher, Config, HarvestClient, HarvestOutcome, HarvestRequest, harvest};

#[derive(Parser, Debug)]
#[command(name = "arxiv-harvester")]
#[command(about = "Harvest arXiv records over OAI-PMH into CSV")]
#[command(version)]
struct Cli {
    /// First datestamp to harvest (YYYY-MM-DD, default: yesterday)
    #[arg(long)]
    from: Option<String>,

    /// Last datestamp to harvest (YYYY-MM-DD, default: today)
    #[arg(long)]
    until: Option<String>,

    /// OAI set, e.g. cs, math or physics:hep-th
    #[arg(long, default_value = "physics:astro-ph", env = "ARXIV_SET")]
    set: String,

    /// Fields to extract: "everything" or a comma-separated list of tag names
    #[arg(long, default_value = "everything")]
    fields: FieldSchema,

    /// Output CSV path (default: set=<set>-from=<from>-to=<until>.csv)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Count citations for every record through INSPIRE-HEP
    #[arg(long)]
    citations: bool,

    /// Concurrent citation workers
    #[arg(long, default_value_t = api::DEFAULT_CONCURRENCY, env = "CITATION_CONCURRENCY")]
    concurrency: usize,

    /// Parse timestamps, split categories and count authors before writing
    #[arg(long)]
    post_process: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    let request = HarvestRequest::parse(cli.from.as_deref(), cli.until.as_deref(), &cli.set, cli.fields)?;
    let output = cli.output.unwrap_or_else(|| PathBuf::from(request.default_file_name()));

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        set = %request.set(),
        from = %request.from(),
        until = %request.until(),
        output = %output.display(),
        "Starting arXiv harvest"
    );

    let config = Config::from_env()?;
    let client = HarvestClient::new(&config)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping after the current request");
                cancel.cancel();
            }
        }
    });

    let report = harvest(&client, &request, config.page_delay, cancel.clone()).await;
    let mut failure = match report.outcome {
        HarvestOutcome::Completed | HarvestOutcome::EndOfStream { .. } => None,
        HarvestOutcome::Failed(err) => Some(anyhow::Error::from(err)),
        HarvestOutcome::Cancelled => Some(anyhow::anyhow!("harvest cancelled")),
    };
    let mut table = report.table;

    if cli.citations && failure.is_none() {
        table = CitationEnricher::new(Arc::new(client))
            .with_cancellation(cancel.clone())
            .enrich(table, cli.concurrency)
            .await?;

        if cancel.is_cancelled() {
            failure = Some(anyhow::anyhow!("citation enrichment cancelled, unfinished counts left empty"));
        }
    }

    if cli.post_process {
        table.post_process();
    }

    table
        .serialize(&output)
        .with_context(|| format!("writing {}", output.display()))?;

    match failure {
        Some(err) => Err(err.context(format!("partial results ({} records) written", table.len()))),
        None => Ok(()),
    }
}

//! Insight deduplication command-line tool
//!
//! Checks and ingests structured insights against a local file-backed record
//! store. Results are printed to stdout as JSON; logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use insight_dedup::{
    Cleaner, DedupError, Deduplicator, EngineConfig, FileStorage, InsightCandidate, InsightId,
    InsightStatus, InsightStore, SimilarityEngine, StoredInsight, StructuredInsight,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "insight-dedup")]
#[command(about = "Ad-creative insight deduplication and review store")]
#[command(version)]
struct Args {
    /// Record store directory
    #[arg(long, env = "INSIGHT_STORE_DIR", default_value = "insights")]
    store_dir: PathBuf,

    /// Engine configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Duplicate threshold, overrides the configuration file
    #[arg(long, env = "SIMILARITY_THRESHOLD")]
    threshold: Option<f64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check one structured insight for duplicates
    Check {
        /// JSON file with INSIGHT, RESULTS, LIMITATIONS_CONTEXT, DIFFERENCE_SCORE
        #[arg(long)]
        candidate: PathBuf,
    },

    /// Deduplicate a batch of structured insights and store the unique ones
    Ingest {
        /// JSON file holding an array of structured insights
        #[arg(long)]
        input: PathBuf,

        /// Trim fields and clamp scores instead of rejecting them
        #[arg(long)]
        lenient: bool,
    },

    /// Set the review status of stored insights
    Review {
        /// greylist, approved, rejected or archived
        #[arg(long)]
        status: InsightStatus,

        ids: Vec<InsightId>,
    },

    /// Count stored insights per status
    Overview,

    /// Clean raw scraped text
    Clean {
        #[arg(long)]
        input: PathBuf,
    },

    /// Print the JSON schema of a stored insight
    Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("insight_dedup={}", log_level))
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("insight-dedup version: {}", insight_dedup::VERSION);

    match &args.command {
        Command::Check { candidate } => {
            let candidate = read_candidate(candidate)?;
            let dedup = open_deduplicator(&args).await?;
            print_json(&dedup.check(&candidate).await?)
        }
        Command::Ingest { input, lenient } => {
            let candidates = read_candidates(input, *lenient)?;
            let mut dedup = open_deduplicator(&args).await?;
            let report = dedup.ingest(candidates).await?;
            print_json(&report)
        }
        Command::Review { status, ids } => {
            let mut storage = FileStorage::new(&args.store_dir).await?;
            let updated = storage.bulk_update_status(ids, *status).await?;
            print_json(&serde_json::json!({ "updated": updated, "status": status }))
        }
        Command::Overview => {
            let storage = FileStorage::new(&args.store_dir).await?;
            print_json(&storage.status_overview().await?)
        }
        Command::Clean { input } => {
            let raw = std::fs::read_to_string(input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            match Cleaner::default().clean(&raw) {
                Some(cleaned) => println!("{cleaned}"),
                None => tracing::warn!("Not enough text left after cleaning"),
            }
            Ok(())
        }
        Command::Schema => print_json(&schemars::schema_for!(StoredInsight)),
    }
}

/// Build the engine configuration from the config file and flags
fn engine_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(threshold) = args.threshold {
        config = config.with_threshold(threshold);
    }
    config.validate()?;
    Ok(config)
}

async fn open_deduplicator(args: &Args) -> anyhow::Result<Deduplicator<FileStorage>> {
    let engine = SimilarityEngine::new(engine_config(args)?)?;
    let storage = FileStorage::new(&args.store_dir).await?;
    tracing::info!("Record store: {}", args.store_dir.display());
    Ok(Deduplicator::new(storage, engine))
}

fn read_candidate(path: &Path) -> anyhow::Result<InsightCandidate> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(StructuredInsight::from_json(&content)?.into())
}

fn read_candidates(path: &Path, lenient: bool) -> anyhow::Result<Vec<InsightCandidate>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&content)
        .map_err(|e| DedupError::InvalidInput {
            message: format!("expected a JSON array of insights: {e}"),
        })?;

    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let structured = if lenient {
                StructuredInsight::sanitize(value)
            } else {
                StructuredInsight::from_value(value)
            };
            structured
                .map(InsightCandidate::from)
                .with_context(|| format!("Invalid insight at index {index}"))
        })
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

mod config;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use extract::{BoundedExtractor, OllamaClient};
use pipeline::{BatchDriver, CheckpointStore, ResumeController, RetryPolicy, RunMetrics};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "catalog-extract", about = "Extract structured course records from an HTML catalog")]
struct Cli {
    /// TOML config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Catalog HTML file
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Checkpoint file read at startup and rewritten after every batch
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Blocks per checkpoint write
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Seconds allowed for each model call
    #[arg(short, long)]
    deadline_secs: Option<u64>,

    /// Ollama model name
    #[arg(short, long)]
    model: Option<String>,

    /// Ollama base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Extra attempts for a block that timed out or hit a model error
    #[arg(long)]
    max_retries: Option<usize>,

    /// Re-attempt blocks that failed transiently in an earlier run
    #[arg(long)]
    retry_failed: bool,

    /// Output path for the course JSON array
    #[arg(long)]
    courses_out: Option<PathBuf>,

    /// Output path for the raw response transcript
    #[arg(long)]
    transcript_out: Option<PathBuf>,

    /// Report pending blocks without calling the model
    #[arg(long)]
    dry_run: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(input) = &self.input {
            config.input = input.clone();
        }
        if let Some(checkpoint) = &self.checkpoint {
            config.checkpoint_path = checkpoint.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.batch.batch_size = batch_size;
        }
        if let Some(deadline_secs) = self.deadline_secs {
            config.batch.deadline_secs = deadline_secs;
        }
        if let Some(model) = &self.model {
            config.model.model = model.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.model.base_url = base_url.clone();
        }
        if let Some(max_retries) = self.max_retries {
            config.retry.max_retries = max_retries;
        }
        if self.retry_failed {
            config.retry_failed = true;
        }
        if let Some(path) = &self.courses_out {
            config.output.courses_path = path.clone();
        }
        if let Some(path) = &self.transcript_out {
            config.output.transcript_path = path.clone();
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    // Nothing to do without a catalog, so this is the one fatal input error.
    let blocks = ingest::ingest_catalog(&config.input, &config.catalog)
        .await
        .context("Failed to load course catalog")?;
    info!(path = ?config.input, blocks = blocks.len(), "Loaded course catalog");

    let client = OllamaClient::new(config.model.base_url.clone(), config.model.model.clone())
        .with_options(config.model.generation.clone())
        .with_json_format(config.model.json_format)
        .with_unload_between_batches(config.model.unload_between_batches);
    let extractor = BoundedExtractor::new(Arc::new(client))
        .with_max_input_tokens(config.model.max_input_tokens);

    let metrics = RunMetrics::new();
    let driver = BatchDriver::new(
        extractor,
        CheckpointStore::new(&config.checkpoint_path),
        &config.batch,
    )
    .with_retry(RetryPolicy::from_config(&config.retry))
    .with_metrics(metrics.clone());
    let controller = ResumeController::new(driver).with_retry_failed(config.retry_failed);

    if cli.dry_run {
        let checkpoint = controller.load_checkpoint(&blocks).await;
        let pending = controller.pending(&blocks, &checkpoint);
        info!(
            total = blocks.len(),
            checkpointed = checkpoint.len(),
            succeeded = checkpoint.success_count(),
            pending = pending.len(),
            "Dry run"
        );
        return Ok(());
    }

    let checkpoint = controller.resume(&blocks).await;

    let snapshot = metrics.snapshot();
    info!(
        attempted = snapshot.blocks_attempted,
        succeeded = snapshot.blocks_succeeded,
        malformed = snapshot.malformed_inputs,
        timeouts = snapshot.timeouts,
        model_errors = snapshot.model_errors,
        sanitize_failures = snapshot.sanitize_failures,
        checkpoint_failures = snapshot.checkpoint_failures,
        model_calls = snapshot.model_calls,
        avg_call_ms = snapshot.avg_call_time_ms,
        "Run finished"
    );

    if checkpoint.success_count() == 0 {
        warn!("No courses extracted; skipping output files");
        return Ok(());
    }

    output::write_courses(&checkpoint, &config.output.courses_path).await?;
    output::write_transcript(&checkpoint, &config.output.transcript_path).await?;

    Ok(())
}

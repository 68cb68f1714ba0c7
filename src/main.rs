//! floe: upload a dataset to object storage as Parquet.
//!
//! Loads NDJSON rows with a configured schema and uploads them to S3, GCS,
//! Azure, the local filesystem or an in-process store, either as one
//! transactional object or as one object per chunk of rows.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use floe::config::Config;
use floe::error::{ConfigSnafu, MetricsSnafu, ReaderSnafu, RunError, RunStorageSnafu};
use floe::job::{JobPlan, JobReport, UploadJob};
use floe::metrics;
use floe::source::{NdjsonReader, NdjsonReaderConfig};
use floe::storage::StorageProvider;
use floe::upload::{UploadOutcome, UploadPlan};

/// Parquet uploader for object storage.
#[derive(Parser, Debug)]
#[command(name = "floe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - load the input and print the upload plan without calling the store.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), RunError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("floe starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;
    let exporter = metrics::init().context(MetricsSnafu)?;

    let reader = NdjsonReader::new(
        config.to_arrow_schema(),
        NdjsonReaderConfig::from(&config.input),
    );
    let dataset = reader
        .read_file(&config.input.path)
        .await
        .context(ReaderSnafu)?;
    info!(
        "Loaded {} rows from {}",
        dataset.num_rows(),
        config.input.path.display()
    );

    if args.dry_run {
        let job = UploadJob::from_config(&config, Arc::new(StorageProvider::in_memory()));
        print_plan(&job.plan_at(&dataset, chrono::Utc::now())?);
        return Ok(());
    }

    let client = StorageProvider::for_url_with_options(
        &config.storage.url,
        config.storage.storage_options.clone(),
    )
    .await
    .context(RunStorageSnafu)?;
    debug!("Using storage {:?}", client);

    let result = UploadJob::from_config(&config, Arc::new(client))
        .run(&dataset)
        .await;

    // Export metrics for failed runs too
    let report = exporter.finish_run(config.metrics.textfile.as_deref(), result)?;

    match report {
        JobReport::Transactional { key, outcome } => match outcome {
            UploadOutcome::SinglePut { bytes } => {
                info!("Uploaded {} ({} bytes) with a single put", key, bytes)
            }
            UploadOutcome::Multipart { bytes, parts } => {
                info!("Uploaded {} ({} bytes) in {} parts", key, bytes, parts)
            }
        },
        JobReport::Chunked(report) => {
            info!(
                "Uploaded {} chunks ({} bytes), removed {} existing objects",
                report.chunks.len(),
                report.total_bytes(),
                report.deleted
            );
        }
    }

    Ok(())
}

fn print_plan(plan: &JobPlan) {
    info!("Dry run mode - no store calls made");
    match plan {
        JobPlan::Transactional { key, bytes, plan } => match plan {
            UploadPlan::SinglePut => info!("Would put {} ({} bytes)", key, bytes),
            UploadPlan::Multipart { parts } => {
                info!("Would upload {} ({} bytes) in {} parts", key, bytes, parts)
            }
        },
        JobPlan::Chunked {
            prefix,
            clean_prefix,
            keys,
        } => {
            if *clean_prefix {
                info!("Would delete everything under '{}'", prefix);
            }
            info!("Would upload {} chunks", keys.len());
            for key in keys {
                info!("  - {}", key);
            }
        }
    }
}

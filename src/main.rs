//! nfscheck - Scheduled NFS disk usage collector
//!
//! Entry point for the nfscheck command-line tool.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Datelike, Local, Weekday};
use clap::{Parser, Subcommand};
use nfscheck::config::parse_weekday;
use nfscheck::index::{ElasticsearchStore, IndexStore};
use nfscheck::job::JobRunner;
use nfscheck::measure::DucMeasurer;
use nfscheck::observability::{init_tracing, TracingConfig};
use nfscheck::{Config, Error, Result};

/// nfscheck - Scheduled NFS disk usage collector
#[derive(Parser, Debug)]
#[command(name = "nfscheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML job configuration
    #[arg(short = 'f', long, env = "NFSCHECK_CONFIG", default_value = "nfscheck.yaml")]
    config_file: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "NFSCHECK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "NFSCHECK_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the jobs scheduled for today
    Run {
        /// Run the jobs of another weekday instead
        #[arg(long, value_parser = weekday_arg)]
        day: Option<Weekday>,

        /// Print bulk payloads instead of indexing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Check that the configured index exists
    IndexStatus,

    /// Partially update one indexed document
    Update {
        /// Document id
        #[arg(long)]
        id: String,

        /// JSON object with the fields to change
        #[arg(long)]
        doc: String,
    },

    /// Delete one indexed document
    Delete {
        /// Document id
        #[arg(long)]
        id: String,
    },
}

fn weekday_arg(value: &str) -> std::result::Result<Weekday, String> {
    parse_weekday(value).ok_or_else(|| format!("'{value}' is not a weekday"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let tracing_config = TracingConfig {
        level: cli.log_level,
        json: cli.log_json,
    };
    if !tracing_config.is_valid_level() {
        return Err(Error::config(format!(
            "invalid log level '{}'",
            tracing_config.level
        )));
    }
    init_tracing(&tracing_config);

    tracing::info!(
        "nfscheck v{} starting, config {}",
        env!("CARGO_PKG_VERSION"),
        cli.config_file.display()
    );

    let config = Config::load(&cli.config_file)?;
    tracing::debug!(?config, "Configuration loaded");

    let store = ElasticsearchStore::new(&config.elasticsearch)?;
    let index = config.elasticsearch.index_name.clone();

    match cli.command {
        Commands::Run { day, dry_run } => {
            let weekday = day.unwrap_or_else(|| Local::now().weekday());
            std::fs::create_dir_all(&config.output_dir).map_err(|e| {
                Error::config(format!(
                    "cannot create outputDir '{}': {e}",
                    config.output_dir.display()
                ))
            })?;

            let measurer = DucMeasurer::new(&config.duc, config.output_dir.clone());
            let runner = JobRunner::new(Arc::new(config), measurer, store).with_dry_run(dry_run);
            runner.run(weekday).await?.into_result()?;
        }
        Commands::IndexStatus => {
            let exists = store.index_exists(&index).await?;
            tracing::info!(index = %index, exists, "Index status");
            println!("{index}: {}", if exists { "exists" } else { "missing" });
        }
        Commands::Update { id, doc } => {
            let doc: serde_json::Value = serde_json::from_str(&doc)
                .map_err(|e| Error::config(format!("--doc is not valid JSON: {e}")))?;
            store.update_document(&index, &id, &doc).await?;
            tracing::info!(index = %index, id = %id, "Document updated");
        }
        Commands::Delete { id } => {
            store.delete_document(&index, &id).await?;
            tracing::info!(index = %index, id = %id, "Document deleted");
        }
    }

    Ok(())
}

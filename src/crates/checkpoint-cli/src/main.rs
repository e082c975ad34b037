//! # checkpoint-cli
//!
//! Inspect and prune checkpoint threads stored in a SQLite database.
//!
//! ```text
//! checkpoint --database sqlite://checkpoints.db list thread-1 --limit 5
//! checkpoint show thread-1 --checkpoint 0003
//! checkpoint delete thread-1
//! ```

use anyhow::{Context, Result};
use checkpoint_store::{
    CheckpointConfig, CheckpointSource, CheckpointStore, CheckpointTuple, ListOptions,
    SqliteDocumentStore, StoreConfig,
};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const DEFAULT_DATABASE_URL: &str = "sqlite://checkpoints.db";

#[derive(Parser)]
#[command(name = "checkpoint")]
#[command(about = "Inspect and prune stored checkpoint threads", long_about = None)]
#[command(version)]
struct Cli {
    /// YAML store configuration
    #[arg(short, long, global = true, env = "CHECKPOINT_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL; overrides `database_url` from the configuration
    #[arg(short, long, global = true, env = "CHECKPOINT_DATABASE_URL")]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a thread's checkpoints, newest first, one JSON object per line
    List {
        thread: String,

        /// Only this namespace
        #[arg(short, long)]
        namespace: Option<String>,

        /// Only checkpoints older than this one
        #[arg(short, long)]
        before: Option<String>,

        /// Namespace of the `--before` checkpoint
        #[arg(long, requires = "before")]
        before_namespace: Option<String>,

        /// Maximum number of checkpoints
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print one checkpoint with its pending writes
    Show {
        thread: String,

        #[arg(short, long, default_value = "")]
        namespace: String,

        /// Checkpoint id (defaults to the latest)
        #[arg(short = 'k', long)]
        checkpoint: Option<String>,
    },

    /// Delete every checkpoint and write of a thread
    Delete { thread: String },
}

/// One line of `list` output
#[derive(Debug, Serialize)]
struct Summary<'a> {
    checkpoint_id: &'a str,
    namespace: &'a str,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<CheckpointSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<&'a str>,
    pending_writes: usize,
}

impl<'a> From<&'a CheckpointTuple> for Summary<'a> {
    fn from(tuple: &'a CheckpointTuple) -> Self {
        Self {
            checkpoint_id: tuple.checkpoint_id(),
            namespace: tuple.namespace(),
            timestamp: tuple.checkpoint.ts_millis(),
            step: tuple.metadata.step,
            source: tuple.metadata.source,
            parent: tuple.parent_checkpoint_id(),
            pending_writes: tuple.pending_writes.len(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = open_store(cli.config.as_deref(), cli.database.as_deref()).await?;

    match cli.command {
        Commands::List {
            thread,
            namespace,
            before,
            before_namespace,
            limit,
        } => {
            let options = ListOptions {
                namespace,
                before,
                before_namespace,
                limit,
                ..ListOptions::default()
            };
            list(&store, &thread, options).await?;
        }
        Commands::Show {
            thread,
            namespace,
            checkpoint,
        } => {
            let mut config = CheckpointConfig::new(thread).with_checkpoint_ns(namespace);
            config.checkpoint_id = checkpoint;
            if !show(&store, &config).await? {
                eprintln!("No checkpoint found");
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Delete { thread } => {
            store
                .delete_thread(&thread)
                .await
                .with_context(|| format!("Failed to delete thread {thread}"))?;
            println!("Deleted thread {thread}");
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn open_store(
    config_path: Option<&std::path::Path>,
    database: Option<&str>,
) -> Result<CheckpointStore> {
    let config = match config_path {
        Some(path) => StoreConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => StoreConfig::default(),
    };

    let database_url = database
        .map(str::to_string)
        .or_else(|| config.database_url.clone())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
    tracing::debug!(%database_url, key_prefix = %config.key_prefix, "opening checkpoint store");

    let backend = SqliteDocumentStore::connect_with_page_size(&database_url, config.scan_page_size)
        .await
        .with_context(|| format!("Failed to open database {database_url}"))?;

    Ok(CheckpointStore::with_config(backend, config)?)
}

async fn list(store: &CheckpointStore, thread: &str, options: ListOptions) -> Result<()> {
    let mut stream = store.list(thread, options).await?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    while let Some(tuple) = stream.next().await {
        let tuple = tuple?;
        serde_json::to_writer(&mut out, &Summary::from(&tuple))?;
        writeln!(out)?;
    }
    Ok(())
}

async fn show(store: &CheckpointStore, config: &CheckpointConfig) -> Result<bool> {
    let Some(tuple) = store.get_tuple(config).await? else {
        return Ok(false);
    };
    println!("{}", serde_json::to_string_pretty(&tuple)?);
    Ok(true)
}

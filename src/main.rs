//! # Corpus Index CLI (`cidx`)
//!
//! The `cidx` binary drives the chunk, embed and search pipeline.
//!
//! ## Usage
//!
//! ```bash
//! cidx --config ./config/cidx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cidx chunk` | Split cleaned documents into chunk files |
//! | `cidx embed` | Embed chunks that are not yet indexed |
//! | `cidx embed --rebuild` | Discard the index and embed every chunk |
//! | `cidx search "<query>"` | Print the top-k matching chunks |
//! | `cidx stats` | Summarize the index |
//! | `cidx run` | `chunk` followed by `embed` |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use corpus_index::{chunk_cmd, config, embed_cmd, search, stats};

/// Corpus Index CLI: chunk cleaned documents, embed them incrementally and
/// search the resulting vector index.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/cidx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cidx",
    about = "Corpus Index: chunk, embed and search a local document corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/cidx.toml`. A missing file means built-in
    /// defaults are used.
    #[arg(long, global = true, default_value = "./config/cidx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Split every `<clean_dir>/<site>/*.txt` into sentence-aligned chunks.
    ///
    /// Writes one `<stem>_chunks.json` per document and a consolidated
    /// `all_chunks.json`.
    Chunk,

    /// Embed chunks from `all_chunks.json` that the index does not hold yet.
    Embed {
        /// Discard the existing index and embed every chunk again.
        #[arg(long)]
        rebuild: bool,

        /// Show how many chunks would be embedded without calling the encoder.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search the index for chunks closest to a query.
    Search {
        /// Query text.
        query: String,

        /// Number of results (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Show index size, dimension, metric and per-site counts.
    Stats,

    /// Chunk the corpus, then embed new chunks.
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        tracing::warn!(
            config = %cli.config.display(),
            "config file not found; using defaults"
        );
        config::Config::minimal()
    };

    match cli.command {
        Commands::Chunk => {
            chunk_cmd::run_chunk(&cfg)?;
        }
        Commands::Embed { rebuild, dry_run } => {
            embed_cmd::run_embed(&cfg, rebuild, dry_run).await?;
        }
        Commands::Search { query, k } => {
            search::run_search(&cfg, &query, k).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
        Commands::Run => {
            chunk_cmd::run_chunk(&cfg)?;
            embed_cmd::run_embed(&cfg, false, false).await?;
        }
    }

    Ok(())
}

//! # Newsletter Archive CLI (`newsletter`)
//!
//! ## Usage
//!
//! ```bash
//! newsletter --config ./config/newsletter.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `newsletter init` | Create the SQLite database and schema |
//! | `newsletter ingest` | Fetch posts published since the last run |
//! | `newsletter search` | List articles by keyword, date range, audience |
//! | `newsletter fts "<query>"` | Ranked full-text search |
//! | `newsletter get <id>...` | Print up to five articles |
//! | `newsletter top` | Top articles by reactions, comments, or word count |
//! | `newsletter stats` | Archive statistics |
//! | `newsletter info` | Publication metadata |
//! | `newsletter serve mcp` | MCP server on stdio (or `--http`) |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use newsletter_archive::config;
use newsletter_archive::ingest::{self, IngestMode};
use newsletter_archive::progress::ProgressMode;
use newsletter_archive::query::SearchParams;
use newsletter_archive::store::ArchiveStore;
use newsletter_archive::{get, search, server, stats};

/// Newsletter Archive: a local, searchable copy of one newsletter's posts,
/// served read-only to AI assistants.
///
/// Settings come from `--config` (TOML, optional) and the `NEWSLETTER_*`
/// environment variables, which take precedence.
#[derive(Parser)]
#[command(name = "newsletter", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Missing file is not an error.
    #[arg(long, global = true, default_value = "./config/newsletter.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Fetch new posts from the publication and store them.
    ///
    /// By default only posts published after the last completed run are
    /// considered. Stored URLs are never fetched twice unless `--refetch`.
    Ingest {
        /// Walk the entire archive instead of stopping at the last run.
        #[arg(long, conflicts_with = "refetch")]
        full: bool,

        /// Walk the entire archive and overwrite stored articles.
        #[arg(long)]
        refetch: bool,

        /// Progress output: `human`, `json`, or `off`.
        #[arg(long, default_value = "human")]
        progress: ProgressMode,
    },

    /// List articles (metadata only), newest first.
    Search(SearchArgs),

    /// Ranked full-text search over titles, subtitles and bodies.
    Fts {
        query: String,

        /// Maximum number of results (max 25).
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Print full articles by id (at most five).
    Get {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Top articles by an engagement metric.
    Top {
        /// `reactions`, `comments`, or `word_count`.
        #[arg(long, default_value = "reactions")]
        metric: String,

        /// Number of articles (max 25).
        #[arg(short, long)]
        n: Option<i64>,
    },

    /// Show archive statistics.
    Stats,

    /// Show publication metadata.
    Info,

    /// Serve the archive tools.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

#[derive(Args)]
struct SearchArgs {
    /// Case-insensitive substring of title or subtitle.
    keyword: Option<String>,

    /// Published on or after (YYYY-MM-DD).
    #[arg(long)]
    from: Option<String>,

    /// Published on or before (YYYY-MM-DD).
    #[arg(long)]
    to: Option<String>,

    /// `everyone`, `only_free`, `only_paid`, or `founding`.
    #[arg(long)]
    audience: Option<String>,

    /// Maximum number of results (max 50).
    #[arg(long)]
    limit: Option<i64>,

    #[arg(long)]
    offset: Option<i64>,
}

#[derive(Subcommand)]
enum ServeService {
    /// Start the MCP server (stdio by default).
    Mcp {
        /// Serve streamable HTTP on `[server].bind` instead of stdio.
        #[arg(long)]
        http: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = ArchiveStore::open(&cfg.db.path).await?;
            store.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            full,
            refetch,
            progress,
        } => {
            let mode = if refetch {
                IngestMode::Refetch
            } else if full {
                IngestMode::Full
            } else {
                IngestMode::Incremental
            };
            ingest::run_ingest(&cfg, mode, progress).await?;
        }
        Commands::Search(args) => {
            let params = SearchParams {
                keyword: args.keyword,
                date_from: args.from,
                date_to: args.to,
                audience: args.audience,
                limit: args.limit,
                offset: args.offset,
            };
            search::run_search(&cfg, params).await?;
        }
        Commands::Fts { query, limit } => {
            search::run_fts(&cfg, &query, limit).await?;
        }
        Commands::Get { ids } => {
            get::run_get(&cfg, &ids).await?;
        }
        Commands::Top { metric, n } => {
            search::run_top(&cfg, &metric, n).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Info => {
            stats::run_info(&cfg).await?;
        }
        Commands::Serve { service } => match service {
            ServeService::Mcp { http: false } => {
                server::run_stdio_server(&cfg).await?;
            }
            ServeService::Mcp { http: true } => {
                server::run_http_server(&cfg).await?;
            }
        },
    }

    Ok(())
}

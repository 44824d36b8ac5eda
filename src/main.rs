//! # Tome CLI (`tome`)
//!
//! ## Usage
//!
//! ```bash
//! tome --config ./config/tome.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tome init` | Create the SQLite database and schema |
//! | `tome ingest <domain>` | Crawl a domain's `llms.txt` and activate the new generation |
//! | `tome get <domain> <path>` | Print a document, or one heading with `--heading` |
//! | `tome search <domain> "<query>"` | Full-text search with heading breadcrumbs |
//! | `tome toc <domain> <path>` | Print a document's heading tree |
//! | `tome domains` | List indexed domains |
//! | `tome cleanup <domain>` | Remove leftover inactive generations |
//! | `tome forget <domain>` | Delete everything stored for a domain |
//!
//! Logs go to stderr. `-v` enables info, `-vv` debug; `RUST_LOG` overrides both.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tome::{config, get, ingest, migrate, search, stats};

/// Tome: crawl llms.txt documentation sites into a local search index.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tome.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tome",
    about = "Tome: crawl llms.txt documentation sites into a local search index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tome.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, sections, sections_fts). Safe to run repeatedly.
    Init,

    /// Crawl a domain's llms.txt and the same-domain pages it links to.
    ///
    /// The new crawl generation replaces the previous one atomically once
    /// the crawl completes. If the manifest cannot be fetched, the previous
    /// generation stays active.
    Ingest {
        /// Domain or URL, e.g. `react.dev` or `https://docs.example.com/llms-full.txt`.
        domain: String,

        /// Maximum link hops from the manifest (defaults to `crawl.max_depth`).
        #[arg(long)]
        max_depth: Option<u32>,
    },

    /// Print a stored document, or one heading and everything nested under it.
    Get {
        domain: String,

        /// Document path, or `INDEX` / `FULL` for `/llms.txt` / `/llms-full.txt`.
        path: String,

        /// Heading text to extract.
        #[arg(long)]
        heading: Option<String>,
    },

    /// Search a domain's documents.
    Search {
        domain: String,

        /// The search query. All terms must match.
        query: String,

        /// Restrict results to paths starting with this prefix (repeatable).
        #[arg(long = "path")]
        paths: Vec<String>,

        /// Maximum number of results (defaults to `retrieval.search_limit`).
        #[arg(long)]
        limit: Option<i64>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a document's heading tree.
    Toc {
        domain: String,

        /// Document path, or `INDEX` / `FULL`.
        path: String,

        /// Print the tree as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List indexed domains with document and section counts.
    Domains,

    /// Remove inactive generations left behind by failed crawls.
    Cleanup { domain: String },

    /// Delete every stored document of a domain.
    Forget { domain: String },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { domain, max_depth } => {
            ingest::run_ingest(&cfg, &domain, max_depth).await?;
        }
        Commands::Get {
            domain,
            path,
            heading,
        } => {
            get::run_get(&cfg, &domain, &path, heading.as_deref()).await?;
        }
        Commands::Search {
            domain,
            query,
            paths,
            limit,
            json,
        } => {
            search::run_search(&cfg, &domain, &query, &paths, limit, json).await?;
        }
        Commands::Toc { domain, path, json } => {
            get::run_toc(&cfg, &domain, &path, json).await?;
        }
        Commands::Domains => {
            stats::run_domains(&cfg).await?;
        }
        Commands::Cleanup { domain } => {
            stats::run_cleanup(&cfg, &domain).await?;
        }
        Commands::Forget { domain } => {
            stats::run_forget(&cfg, &domain).await?;
        }
    }

    Ok(())
}

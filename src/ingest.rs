//! `tome ingest`: crawl a domain's `llms.txt` tree into SQLite.
//!
//! Wires the reqwest [`HttpFetcher`] and [`SqliteStore`] into the core
//! [`Crawler`]. A crawl either activates a complete new generation or leaves
//! the previous one untouched.

use std::sync::Arc;

use anyhow::Result;

use tome_core::crawl::Crawler;
use tome_core::models::IngestResult;

use crate::config::Config;
use crate::db;
use crate::http::HttpFetcher;

/// Crawl `domain` and return the outcome without printing.
pub async fn ingest_domain(
    config: &Config,
    domain: &str,
    max_depth: Option<u32>,
) -> Result<IngestResult> {
    let store = Arc::new(db::open_store(config).await?);
    let fetcher = HttpFetcher::from_config(config)?;
    let crawler = Crawler::new(fetcher, store.clone(), config.crawl_settings());

    let depth = max_depth.unwrap_or(config.crawl.max_depth);
    let result = crawler.ingest(domain, depth).await;

    store.pool().close().await;
    Ok(result?)
}

pub async fn run_ingest(config: &Config, domain: &str, max_depth: Option<u32>) -> Result<()> {
    let result = ingest_domain(config, domain, max_depth).await?;

    println!("ingest {}", result.domain);
    println!("  generation: {}", result.generation_id);
    println!("  documents added: {}", result.documents_added);
    println!("  documents updated: {}", result.documents_updated_or_skipped);
    if !result.warnings.is_empty() {
        println!("  warnings: {}", result.warnings.len());
        for warning in &result.warnings {
            println!("    - {}", warning);
        }
    }
    if !result.failures.is_empty() {
        println!("  failures: {}", result.failures.len());
        for failure in &result.failures {
            println!("    - {}", failure);
        }
    }
    println!("ok");

    Ok(())
}

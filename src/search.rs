//! `tome search`: full-text search within one domain.

use anyhow::Result;

use tome_core::service;

use crate::config::Config;
use crate::db;

pub async fn run_search(
    config: &Config,
    domain: &str,
    query: &str,
    paths: &[String],
    limit: Option<i64>,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or(config.retrieval.search_limit);

    let store = db::open_store(config).await?;
    let hits = service::search(&store, domain, query, paths, limit).await;
    store.pool().close().await;
    let hits = hits?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.rank, hit.path);
        if !hit.heading_path.is_empty() {
            println!("    section: {}", hit.heading_path);
        }
        println!("    url: {}", hit.url);
        println!("    {}", hit.snippet.replace('\n', " "));
        println!();
    }

    Ok(())
}

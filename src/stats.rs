//! Domain bookkeeping: `tome domains`, `tome cleanup`, `tome forget`.

use anyhow::Result;

use tome_core::domain::normalize;
use tome_core::store::Store;

use crate::config::Config;
use crate::db;

pub async fn run_domains(config: &Config) -> Result<()> {
    let store = db::open_store(config).await?;
    let domains = store.list_domains().await;
    store.pool().close().await;
    let domains = domains?;

    if domains.is_empty() {
        println!("No domains indexed.");
        return Ok(());
    }

    println!(
        "{:<32} {:>6} {:>9}   {:<20} {}",
        "DOMAIN", "DOCS", "SECTIONS", "LAST CRAWL", "GENERATION"
    );
    println!("{}", "-".repeat(100));
    for d in &domains {
        let crawled = match d.last_crawled_at {
            Some(ts) => format_ts(ts),
            None => "never".to_string(),
        };
        println!(
            "{:<32} {:>6} {:>9}   {:<20} {}",
            d.domain, d.documents, d.sections, crawled, d.generation_id
        );
    }

    Ok(())
}

/// Remove documents of inactive generations left behind by aborted crawls.
pub async fn run_cleanup(config: &Config, domain: &str) -> Result<()> {
    let domain = normalize(domain)?;
    let store = db::open_store(config).await?;
    let removed = store.cleanup_inactive_generations(&domain).await;
    store.pool().close().await;

    println!("cleanup {}", domain);
    println!("  documents removed: {}", removed?);
    println!("ok");
    Ok(())
}

/// Delete every generation of a domain.
pub async fn run_forget(config: &Config, domain: &str) -> Result<()> {
    let domain = normalize(domain)?;
    let store = db::open_store(config).await?;
    let removed = store.delete_domain(&domain).await;
    store.pool().close().await;

    println!("forget {}", domain);
    println!("  documents removed: {}", removed?);
    println!("ok");
    Ok(())
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

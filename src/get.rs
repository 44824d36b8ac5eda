//! Document retrieval: `tome get` and `tome toc`.
//!
//! Paths accept the `INDEX` (`/llms.txt`) and `FULL` (`/llms-full.txt`)
//! sentinels. Only the domain's active generation is read.

use anyhow::{bail, Result};

use tome_core::models::TocEntry;
use tome_core::service;

use crate::config::Config;
use crate::db;

pub async fn run_get(config: &Config, domain: &str, path: &str, heading: Option<&str>) -> Result<()> {
    let store = db::open_store(config).await?;
    let text = service::get_document(&store, domain, path, heading).await;
    store.pool().close().await;

    match text? {
        Some(text) => {
            println!("{}", text);
            Ok(())
        }
        None => match heading {
            Some(h) => bail!(
                "heading not found: '{}' in {} {}",
                h,
                domain,
                service::resolve_path(path)
            ),
            None => bail!("document not found: {} {}", domain, service::resolve_path(path)),
        },
    }
}

pub async fn run_toc(config: &Config, domain: &str, path: &str, json: bool) -> Result<()> {
    let store = db::open_store(config).await?;
    let entries = service::toc(&store, domain, path).await;
    store.pool().close().await;

    let Some(entries) = entries? else {
        bail!("document not found: {} {}", domain, service::resolve_path(path));
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("(no headings)");
    }
    for entry in &entries {
        print_entry(entry, 0);
    }
    Ok(())
}

fn print_entry(entry: &TocEntry, indent: usize) {
    println!("{}- {}", "  ".repeat(indent), entry.heading);
    for child in &entry.children {
        print_entry(child, indent + 1);
    }
}

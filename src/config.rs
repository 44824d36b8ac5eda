//! TOML configuration.
//!
//! `[db]` and `[chunking]` are required; `[crawl]` and `[retrieval]` fall
//! back to their defaults when absent. See `config/tome.example.toml`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::http::DEFAULT_MAX_BODY_BYTES;
use tome_core::crawl::{CrawlSettings, DEFAULT_CONCURRENCY, DEFAULT_MANIFEST_PATH, DEFAULT_MAX_REQUESTS};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            concurrency: default_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
            max_requests: default_max_requests(),
            manifest_path: default_manifest_path(),
            user_agent: default_user_agent(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_max_depth() -> u32 {
    3
}
fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_requests() -> usize {
    DEFAULT_MAX_REQUESTS
}
fn default_manifest_path() -> String {
    DEFAULT_MANIFEST_PATH.to_string()
}
fn default_max_body_bytes() -> u64 {
    DEFAULT_MAX_BODY_BYTES
}
fn default_user_agent() -> String {
    format!("tome/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_search_limit")]
    pub search_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
        }
    }
}

fn default_search_limit() -> i64 {
    10
}

impl Config {
    /// Crawler settings derived from `[chunking]` and `[crawl]`.
    pub fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            max_tokens: self.chunking.max_tokens,
            concurrency: self.crawl.concurrency,
            max_requests: self.crawl.max_requests,
            manifest_path: self.crawl.manifest_path.clone(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    let crawl = &config.crawl;
    if !(1..=64).contains(&crawl.concurrency) {
        anyhow::bail!("crawl.concurrency must be in [1, 64]");
    }
    if crawl.request_timeout_secs == 0 {
        anyhow::bail!("crawl.request_timeout_secs must be > 0");
    }
    if crawl.max_requests == 0 {
        anyhow::bail!("crawl.max_requests must be > 0");
    }
    if !crawl.manifest_path.starts_with('/') {
        anyhow::bail!(
            "crawl.manifest_path must start with '/', got '{}'",
            crawl.manifest_path
        );
    }
    if crawl.max_body_bytes == 0 {
        anyhow::bail!("crawl.max_body_bytes must be > 0");
    }
    if crawl.user_agent.trim().is_empty() {
        anyhow::bail!("crawl.user_agent must not be empty");
    }

    if config.retrieval.search_limit < 1 {
        anyhow::bail!("retrieval.search_limit must be >= 1");
    }

    Ok(())
}

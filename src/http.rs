//! reqwest-backed [`Fetcher`] used by `tome ingest`.
//!
//! Redirects are followed (reqwest's default policy, up to 10 hops) and the
//! final URL is reported back so the crawler can store documents under it.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use tome_core::fetch::{FetchError, FetchResponse, Fetcher};

use crate::config::Config;

/// Default cap on a response body.
pub const DEFAULT_MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_bytes: u64,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str, max_body_bytes: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            max_body_bytes,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            Duration::from_secs(config.crawl.request_timeout_secs),
            &config.crawl.user_agent,
            config.crawl.max_body_bytes,
        )
    }
}

fn fetch_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(e.to_string())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(fetch_error)?;

        let final_url = response.url().clone();
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let limit = self.max_body_bytes;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(FetchError::TooLarge { limit });
        }
        // Content-Length may be absent or wrong, so count while reading too.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(fetch_error)? {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(url = %url, final_url = %final_url, status, "fetched");

        Ok(FetchResponse {
            url: final_url,
            status,
            content_type,
            body,
        })
    }
}

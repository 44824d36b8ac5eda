//! HTTP fetch abstraction consumed by the crawler.
//!
//! The application supplies a reqwest-backed implementation; tests use
//! scripted in-memory fetchers. Timeouts are the implementation's concern.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Media types accepted as markdown. Many servers send `.md` as `text/plain`.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &["text/markdown", "text/plain", "text/x-markdown"];

/// A completed HTTP exchange, whatever its status.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    /// Raw `Content-Type` header value, if any.
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True when the media type (parameters ignored) is markdown or plain text.
    pub fn is_markdown(&self) -> bool {
        is_markdown_content_type(self.content_type.as_deref())
    }
}

/// Transport-level failure: no HTTP response was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: u64 },
}

/// Issues HTTP GET requests for the crawler.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError>;
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        (**self).fetch(url).await
    }
}

/// Check a `Content-Type` header value against [`ALLOWED_CONTENT_TYPES`].
pub fn is_markdown_content_type(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    ALLOWED_CONTENT_TYPES.contains(&media_type.as_str())
}

//! Generation-based crawl orchestration.
//!
//! A crawl of one domain starts from its `llms.txt` manifest, follows
//! same-domain markdown links breadth-first up to `max_depth`, chunks each
//! document and writes it to the [`Store`] tagged with a fresh generation ID.
//! Nothing becomes visible to readers until the whole crawl finishes and
//! [`Store::activate_generation`] swaps the domain over in one write.
//!
//! # Failure handling
//!
//! | Condition | Manifest (depth 0) | Linked document |
//! |-----------|--------------------|-----------------|
//! | transport error / timeout | abort, [`CrawlError::ManifestUnavailable`] | warning |
//! | non-2xx status, non-markdown type, non-UTF-8 body | abort | warning |
//! | [`ChunkError::Oversized`](crate::chunk::ChunkError) | abort | failure |
//! | storage error | failure | failure |
//!
//! An aborted crawl never activates, so the previous generation keeps
//! serving reads.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::chunk::{chunk_markdown, content_hash, flatten_sections, DEFAULT_MAX_TOKENS};
use crate::domain::{normalize, parse_loose, DomainError};
use crate::fetch::{FetchError, FetchResponse, Fetcher};
use crate::links::{extract_links, extract_path, same_domain_links};
use crate::models::{Document, IngestResult, SectionData};
use crate::store::Store;

pub const DEFAULT_MANIFEST_PATH: &str = "/llms.txt";
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_MAX_REQUESTS: usize = 10_000;

/// Tunables for one [`Crawler`].
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Chunker budget per section.
    pub max_tokens: usize,
    /// Maximum fetches in flight.
    pub concurrency: usize,
    /// Upper bound on fetches per crawl.
    pub max_requests: usize,
    /// Manifest location used when the input names only a host.
    pub manifest_path: String,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            concurrency: DEFAULT_CONCURRENCY,
            max_requests: DEFAULT_MAX_REQUESTS,
            manifest_path: DEFAULT_MANIFEST_PATH.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    InvalidDomain(#[from] DomainError),

    #[error("manifest {url} unavailable: {reason}")]
    ManifestUnavailable { url: String, reason: String },

    #[error("no documents were stored for {domain}; previous generation left active")]
    NothingStored { domain: String },

    #[error("failed to activate generation {generation_id} for {domain}: {reason}")]
    Activation {
        domain: String,
        generation_id: String,
        reason: String,
    },
}

impl CrawlError {
    /// True when retrying the same crawl later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CrawlError::ManifestUnavailable { .. })
    }
}

/// Location of the manifest for a crawl input.
///
/// A URL with a non-root path is taken as the manifest itself. Otherwise the
/// input's scheme (default `https`), host and port are combined with
/// `manifest_path`.
///
/// ```rust
/// use tome_core::crawl::manifest_url;
///
/// assert_eq!(manifest_url("react.dev", "/llms.txt").unwrap().as_str(), "https://react.dev/llms.txt");
/// assert_eq!(
///     manifest_url("http://localhost:8080/docs/llms-full.txt", "/llms.txt").unwrap().as_str(),
///     "http://localhost:8080/docs/llms-full.txt",
/// );
/// ```
pub fn manifest_url(input: &str, manifest_path: &str) -> Result<Url, DomainError> {
    let mut url = parse_loose(input)?;
    url.set_fragment(None);
    if url.path() != "/" && !url.path().is_empty() {
        return Ok(url);
    }
    url.set_query(None);
    url.set_path(manifest_path);
    Ok(url)
}

/// What happened to one fetched URL.
enum Outcome {
    Stored { text: String, final_url: Url },
    Warning(String),
    Failure(String),
    Duplicate,
}

/// Crawls one domain at a time into a [`Store`].
pub struct Crawler<F: Fetcher, S: Store> {
    fetcher: F,
    store: Arc<S>,
    settings: CrawlSettings,
}

impl<F: Fetcher, S: Store> Crawler<F, S> {
    pub fn new(fetcher: F, store: Arc<S>, settings: CrawlSettings) -> Self {
        Self {
            fetcher,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Crawl `domain` (a bare domain or URL) to `max_depth` link hops from
    /// the manifest and activate the result as the domain's new generation.
    pub async fn ingest(&self, domain: &str, max_depth: u32) -> Result<IngestResult, CrawlError> {
        let normalized = normalize(domain)?;
        let manifest = manifest_url(domain, &self.settings.manifest_path)?;
        let generation_id = Uuid::new_v4().to_string();

        info!(domain = %normalized, manifest = %manifest, generation = %generation_id, max_depth, "starting crawl");

        let mut result = IngestResult {
            domain: normalized.clone(),
            generation_id: generation_id.clone(),
            ..Default::default()
        };

        let previous = match self.store.active_document_hashes(&normalized).await {
            Ok(hashes) => hashes,
            Err(e) => {
                warn!(domain = %normalized, error = %e, "could not read active generation");
                result
                    .warnings
                    .push(format!("could not read previous generation: {:#}", e));
                HashMap::new()
            }
        };

        let concurrency = self.settings.concurrency.max(1);
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(Url, u32)> = VecDeque::new();
        let mut in_flight = FuturesUnordered::new();
        let mut requests = 0usize;
        let mut limit_reached = false;
        let mut stored = 0u64;

        seen.insert(manifest.to_string());
        queue.push_back((manifest.clone(), 0));

        loop {
            while in_flight.len() < concurrency {
                let Some((url, depth)) = queue.pop_front() else {
                    break;
                };
                if requests >= self.settings.max_requests {
                    if !limit_reached {
                        limit_reached = true;
                        let skipped = queue.len() + 1;
                        warn!(domain = %normalized, limit = self.settings.max_requests, skipped, "request limit reached");
                        result.warnings.push(format!(
                            "request limit of {} reached; {} URL(s) not fetched",
                            self.settings.max_requests, skipped
                        ));
                    }
                    queue.clear();
                    break;
                }
                requests += 1;
                let fetcher = &self.fetcher;
                in_flight.push(async move {
                    let response = fetcher.fetch(&url).await;
                    (url, depth, response)
                });
            }

            let Some((url, depth, response)) = in_flight.next().await else {
                break;
            };

            let outcome = self
                .process(&normalized, &generation_id, &url, depth, response, &mut seen)
                .await;

            match outcome {
                Outcome::Stored { text, final_url } => {
                    stored += 1;
                    let key = final_url.to_string();
                    if previous.contains_key(&key) {
                        result.documents_updated_or_skipped += 1;
                    } else {
                        result.documents_added += 1;
                    }

                    if depth < max_depth {
                        let links =
                            same_domain_links(extract_links(&text, &final_url), &normalized);
                        let mut enqueued = 0usize;
                        for link in links {
                            let Ok(mut next) = Url::parse(&link) else {
                                continue;
                            };
                            next.set_fragment(None);
                            if seen.insert(next.to_string()) {
                                queue.push_back((next, depth + 1));
                                enqueued += 1;
                            }
                        }
                        debug!(url = %final_url, depth, enqueued, "links analyzed");
                    }
                }
                Outcome::Warning(reason) => {
                    if depth == 0 {
                        warn!(url = %url, reason = %reason, "manifest unavailable, aborting crawl");
                        return Err(CrawlError::ManifestUnavailable {
                            url: url.to_string(),
                            reason,
                        });
                    }
                    warn!(url = %url, reason = %reason, "skipping document");
                    result.warnings.push(format!("{}: {}", url, reason));
                }
                Outcome::Failure(reason) => {
                    warn!(url = %url, reason = %reason, "document failed");
                    result.failures.push(format!("{}: {}", url, reason));
                }
                Outcome::Duplicate => {}
            }
        }

        if stored == 0 {
            return Err(CrawlError::NothingStored { domain: normalized });
        }

        self.store
            .activate_generation(&normalized, &generation_id)
            .await
            .map_err(|e| CrawlError::Activation {
                domain: normalized.clone(),
                generation_id: generation_id.clone(),
                reason: format!("{:#}", e),
            })?;

        match self.store.cleanup_inactive_generations(&normalized).await {
            Ok(removed) => debug!(domain = %normalized, removed, "old generations cleaned up"),
            Err(e) => {
                warn!(domain = %normalized, error = %e, "cleanup of old generations failed");
                result
                    .warnings
                    .push(format!("cleanup of old generations failed: {:#}", e));
            }
        }

        info!(
            domain = %normalized,
            generation = %generation_id,
            added = result.documents_added,
            updated = result.documents_updated_or_skipped,
            warnings = result.warnings.len(),
            failures = result.failures.len(),
            requests,
            "crawl complete"
        );

        Ok(result)
    }

    /// Validate, chunk and persist one fetch result.
    async fn process(
        &self,
        domain: &str,
        generation_id: &str,
        request_url: &Url,
        depth: u32,
        response: Result<FetchResponse, FetchError>,
        seen: &mut HashSet<String>,
    ) -> Outcome {
        let response = match response {
            Ok(r) => r,
            Err(e) => return Outcome::Warning(e.to_string()),
        };

        let mut final_url = response.url.clone();
        final_url.set_fragment(None);
        if normalize(final_url.as_str()).ok().as_deref() != Some(domain) {
            return Outcome::Warning(format!("redirected off-domain to {}", final_url));
        }
        if final_url != *request_url && !seen.insert(final_url.to_string()) {
            debug!(from = %request_url, to = %final_url, "redirect to an already crawled URL");
            return Outcome::Duplicate;
        }

        if !response.is_success() {
            return Outcome::Warning(format!("HTTP status {}", response.status));
        }
        if !response.is_markdown() {
            return Outcome::Warning(format!(
                "unsupported content type '{}'",
                response.content_type.as_deref().unwrap_or("none")
            ));
        }
        let text = match String::from_utf8(response.body) {
            Ok(text) => text,
            Err(_) => return Outcome::Warning("body is not valid UTF-8".to_string()),
        };

        let root = match chunk_markdown(&text, self.settings.max_tokens) {
            Ok(root) => root,
            Err(e) if depth == 0 => return Outcome::Warning(e.to_string()),
            Err(e) => return Outcome::Failure(e.to_string()),
        };

        match self
            .persist(domain, generation_id, &final_url, depth, &text, &root)
            .await
        {
            Ok(()) => Outcome::Stored { text, final_url },
            Err(e) => Outcome::Failure(format!("storage error: {:#}", e)),
        }
    }

    async fn persist(
        &self,
        domain: &str,
        generation_id: &str,
        url: &Url,
        depth: u32,
        text: &str,
        root: &SectionData,
    ) -> anyhow::Result<()> {
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            domain: domain.to_string(),
            url: url.to_string(),
            path: extract_path(url),
            content_hash: content_hash(text),
            depth,
            generation_id: generation_id.to_string(),
            generation_active: false,
            crawled_at: chrono::Utc::now().timestamp(),
        };

        let document_id = self.store.insert_document(&doc).await?;
        let sections = flatten_sections(root, &document_id);
        if let Err(e) = self.store.save_sections(&document_id, &sections).await {
            // A document row without its sections must not reach activation.
            if let Err(cleanup) = self.store.delete_document(&document_id).await {
                warn!(url = %url, error = %cleanup, "could not remove partially stored document");
                return Err(e.context(format!(
                    "partial document {} left behind: {:#}",
                    document_id, cleanup
                )));
            }
            return Err(e);
        }

        debug!(url = %url, depth, sections = sections.len(), hash = %doc.content_hash, "document stored");
        Ok(())
    }
}

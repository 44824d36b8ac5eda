//! Storage abstraction for Tome.
//!
//! The [`Store`] trait is the contract between the crawler/retrieval logic
//! and persistence. Documents are written tagged with a crawl generation and
//! stay invisible until [`Store::activate_generation`] flips the domain's
//! active generation in one atomic step. Every read filters on the active
//! generation, so readers need no locking of their own.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, DomainStats, SearchHit, Section};

/// Separator between headings in a search breadcrumb.
pub const BREADCRUMB_SEPARATOR: &str = " > ";

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_document`](Store::insert_document) | Write a document row for a (not yet active) generation |
/// | [`save_sections`](Store::save_sections) | Replace all sections of a document |
/// | [`delete_document`](Store::delete_document) | Remove one document and its sections |
/// | [`activate_generation`](Store::activate_generation) | Atomically make one generation the domain's only active one |
/// | [`cleanup_inactive_generations`](Store::cleanup_inactive_generations) | Delete a domain's inactive documents |
/// | [`active_document_hashes`](Store::active_document_hashes) | URL → content hash for the active generation |
/// | [`get_sections_by_document`](Store::get_sections_by_document) | Ordered sections of an active document |
/// | [`get_section_subtree`](Store::get_section_subtree) | A heading's section plus descendants |
/// | [`search_sections`](Store::search_sections) | Full-text search with breadcrumbs |
/// | [`list_domains`](Store::list_domains) | Per-domain summary of active data |
/// | [`delete_domain`](Store::delete_domain) | Remove every generation of a domain |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a document row. If the generation already holds the same URL,
    /// that row is updated in place. Returns the stored document ID.
    async fn insert_document(&self, doc: &Document) -> Result<String>;

    /// Replace all sections of a document. `sections` are in position order
    /// with parents before children.
    async fn save_sections(&self, document_id: &str, sections: &[Section]) -> Result<()>;

    /// Delete one document and its sections. Deleting a missing document is
    /// not an error.
    async fn delete_document(&self, document_id: &str) -> Result<()>;

    /// Activate `generation_id` for `domain` and deactivate every other
    /// generation of that domain, as a single atomic write.
    async fn activate_generation(&self, domain: &str, generation_id: &str) -> Result<()>;

    /// Delete documents (and their sections) of the domain's inactive
    /// generations. Returns the number of documents deleted.
    async fn cleanup_inactive_generations(&self, domain: &str) -> Result<u64>;

    /// URL → content hash of every document in the domain's active generation.
    async fn active_document_hashes(&self, domain: &str) -> Result<HashMap<String, String>>;

    /// All sections of the active document at `path`, in position order.
    async fn get_sections_by_document(&self, domain: &str, path: &str) -> Result<Vec<Section>>;

    /// The first section (by position) titled `heading` in the active
    /// document at `path`, followed by all its descendants, in position order.
    async fn get_section_subtree(
        &self,
        domain: &str,
        path: &str,
        heading: &str,
    ) -> Result<Vec<Section>>;

    /// Full-text search over the domain's active sections. An empty
    /// `path_prefixes` searches every document.
    async fn search_sections(
        &self,
        domain: &str,
        query: &str,
        path_prefixes: &[String],
        limit: i64,
    ) -> Result<Vec<SearchHit>>;

    /// Summary of every domain with an active generation.
    async fn list_domains(&self) -> Result<Vec<DomainStats>>;

    /// Delete every document of `domain`, active or not. Returns the count.
    async fn delete_domain(&self, domain: &str) -> Result<u64>;
}

/// Parent link and heading of one section, keyed by section ID.
pub type Lineage = HashMap<String, (Option<String>, Option<String>)>;

/// Build the heading breadcrumb for `section_id` by walking parent links to
/// the document root. Headings are joined root-to-leaf with
/// [`BREADCRUMB_SEPARATOR`]; sections without a heading are skipped.
pub fn heading_breadcrumb(section_id: &str, lineage: &Lineage) -> String {
    let mut headings = Vec::new();
    let mut current = Some(section_id.to_string());
    // Bounded by the lineage size so malformed parent links cannot loop.
    let mut remaining = lineage.len();

    while let Some(id) = current {
        if remaining == 0 {
            break;
        }
        remaining -= 1;
        let Some((parent, heading)) = lineage.get(&id) else {
            break;
        };
        if let Some(h) = heading.as_deref().filter(|h| !h.is_empty()) {
            headings.push(h.to_string());
        }
        current = parent.clone();
    }

    headings.reverse();
    headings.join(BREADCRUMB_SEPARATOR)
}

/// Turn free text into an FTS-safe conjunctive query: every whitespace
/// term is double-quoted with embedded quotes removed.
pub fn sanitize_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| term.replace('"', ""))
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{}\"", term))
        .collect::<Vec<_>>()
        .join(" ")
}

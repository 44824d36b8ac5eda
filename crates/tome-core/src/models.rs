//! Core data types that flow through the crawl and retrieval pipeline.
//!
//! [`SectionData`] is the chunker's in-memory tree. [`Document`] and
//! [`Section`] are the persisted rows; [`SearchHit`], [`TocEntry`],
//! [`IngestResult`] and [`DomainStats`] are read models returned to callers.

use serde::Serialize;

/// A node of the chunker's output tree. Not persisted directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionData {
    /// Heading text, `None` for a document root or a pre-heading intro.
    pub heading: Option<String>,
    /// Heading level: 0 for root/intro, 1..=6 otherwise.
    pub level: u8,
    /// Literal chunk text. For a split node this is only its intro.
    pub content: String,
    /// Child sections in document order.
    pub children: Vec<SectionData>,
}

impl SectionData {
    /// A leaf with no heading, holding `content` verbatim.
    pub fn leaf(content: impl Into<String>) -> Self {
        Self {
            heading: None,
            level: 0,
            content: content.into(),
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A fetched resource, tagged with the crawl generation that wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub id: String,
    /// Normalized registrable domain.
    pub domain: String,
    /// Final URL (after redirects). Unique within a generation.
    pub url: String,
    pub path: String,
    pub content_hash: String,
    /// Link depth at which the document was discovered (0 = manifest).
    pub depth: u32,
    pub generation_id: String,
    pub generation_active: bool,
    /// Unix timestamp (seconds).
    pub crawled_at: i64,
}

/// One persisted chunk of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub id: String,
    pub document_id: String,
    pub parent_section_id: Option<String>,
    pub heading: Option<String>,
    pub level: u8,
    pub content: String,
    /// Pre-order index within the document.
    pub position: i64,
}

/// A ranked full-text search match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub url: String,
    pub path: String,
    pub snippet: String,
    /// Relevance; higher is better.
    pub rank: f64,
    /// Headings from the document root down to the match, joined by `" > "`.
    pub heading_path: String,
}

/// Table-of-contents node derived from section parent links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub heading: String,
    pub level: u8,
    pub children: Vec<TocEntry>,
}

/// Outcome of one crawl invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestResult {
    pub domain: String,
    pub generation_id: String,
    /// Documents whose URL was not in the previously active generation.
    pub documents_added: u64,
    /// Documents whose URL was already present in the previously active generation.
    pub documents_updated_or_skipped: u64,
    /// Skipped documents and other non-fatal conditions.
    pub warnings: Vec<String>,
    /// Documents abandoned because of a data or storage error.
    pub failures: Vec<String>,
}

/// Per-domain summary of the active generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainStats {
    pub domain: String,
    pub generation_id: String,
    pub documents: i64,
    pub sections: i64,
    pub last_crawled_at: Option<i64>,
}

//! Retrieval over a domain's active generation.
//!
//! Thin layer over [`Store`]: path sentinels, document and heading
//! reconstruction from ordered sections, validated search, and table of
//! contents building. Every read goes through the store's active-generation
//! filter, so a crawl in progress is never visible here.

use std::collections::HashMap;

use thiserror::Error;

use crate::chunk::join_sections;
use crate::domain::{normalize, DomainError};
use crate::headings::find_headings;
use crate::models::{SearchHit, Section, TocEntry};
use crate::store::Store;

/// Path sentinel for the domain's manifest.
pub const INDEX_SENTINEL: &str = "INDEX";
/// Path sentinel for the domain's full-text manifest.
pub const FULL_SENTINEL: &str = "FULL";

pub const INDEX_PATH: &str = "/llms.txt";
pub const FULL_PATH: &str = "/llms-full.txt";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("search query must not be empty")]
    EmptyQuery,

    #[error("limit must be at least 1 (got {0})")]
    InvalidLimit(i64),

    #[error(transparent)]
    InvalidDomain(#[from] DomainError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Map sentinels to their paths and make sure the result starts with `/`.
///
/// ```rust
/// use tome_core::service::resolve_path;
///
/// assert_eq!(resolve_path("INDEX"), "/llms.txt");
/// assert_eq!(resolve_path("FULL"), "/llms-full.txt");
/// assert_eq!(resolve_path("reference/hooks.md"), "/reference/hooks.md");
/// ```
pub fn resolve_path(path: &str) -> String {
    match path.trim() {
        INDEX_SENTINEL => INDEX_PATH.to_string(),
        FULL_SENTINEL => FULL_PATH.to_string(),
        p if p.starts_with('/') => p.to_string(),
        p => format!("/{}", p),
    }
}

/// Reconstruct a document, or one heading's part of it.
///
/// Without `heading` the whole document is returned. With it, the first
/// section titled `heading` and all its descendants are joined. Headings
/// that did not become sections of their own (the document was small enough
/// to store whole) are located in the text instead. `None` means not found.
pub async fn get_document<S: Store + ?Sized>(
    store: &S,
    domain: &str,
    path: &str,
    heading: Option<&str>,
) -> Result<Option<String>, ServiceError> {
    let domain = normalize(domain)?;
    let path = resolve_path(path);

    let Some(heading) = heading else {
        let sections = store.get_sections_by_document(&domain, &path).await?;
        if sections.is_empty() {
            return Ok(None);
        }
        return Ok(Some(join_sections(&sections)));
    };

    let subtree = store.get_section_subtree(&domain, &path, heading).await?;
    if !subtree.is_empty() {
        return Ok(Some(join_sections(&subtree)));
    }

    let sections = store.get_sections_by_document(&domain, &path).await?;
    if sections.is_empty() {
        return Ok(None);
    }
    Ok(heading_span(&join_sections(&sections), heading))
}

/// Ranked full-text search within a domain's active generation.
pub async fn search<S: Store + ?Sized>(
    store: &S,
    domain: &str,
    query: &str,
    path_prefixes: &[String],
    limit: i64,
) -> Result<Vec<SearchHit>, ServiceError> {
    if query.trim().is_empty() {
        return Err(ServiceError::EmptyQuery);
    }
    if limit < 1 {
        return Err(ServiceError::InvalidLimit(limit));
    }
    let domain = normalize(domain)?;
    let prefixes: Vec<String> = path_prefixes
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(resolve_path)
        .collect();

    Ok(store
        .search_sections(&domain, query.trim(), &prefixes, limit)
        .await?)
}

/// Heading tree of a document. `None` when the document does not exist.
pub async fn toc<S: Store + ?Sized>(
    store: &S,
    domain: &str,
    path: &str,
) -> Result<Option<Vec<TocEntry>>, ServiceError> {
    let domain = normalize(domain)?;
    let path = resolve_path(path);

    let sections = store.get_sections_by_document(&domain, &path).await?;
    if sections.is_empty() {
        return Ok(None);
    }
    if sections.iter().any(|s| s.heading.is_some()) {
        return Ok(Some(build_toc(&sections)));
    }
    Ok(Some(toc_from_text(&join_sections(&sections))))
}

/// Build the heading tree from section parent links.
///
/// Sections without a heading are omitted. A heading whose parent is not a
/// heading section becomes a root. Order follows `position`.
pub fn build_toc(sections: &[Section]) -> Vec<TocEntry> {
    let mut ordered: Vec<&Section> = sections.iter().filter(|s| s.heading.is_some()).collect();
    ordered.sort_by_key(|s| s.position);

    let headed: HashMap<&str, &Section> = ordered.iter().map(|s| (s.id.as_str(), *s)).collect();
    let mut children: HashMap<&str, Vec<&Section>> = HashMap::new();
    let mut roots = Vec::new();

    for s in ordered.iter().copied() {
        match s.parent_section_id.as_deref().filter(|p| headed.contains_key(p)) {
            Some(parent) => children.entry(parent).or_default().push(s),
            None => roots.push(s),
        }
    }

    fn build(section: &Section, children: &HashMap<&str, Vec<&Section>>) -> TocEntry {
        TocEntry {
            heading: section.heading.clone().unwrap_or_default(),
            level: section.level,
            children: children
                .get(section.id.as_str())
                .map(|kids| kids.iter().map(|k| build(k, children)).collect())
                .unwrap_or_default(),
        }
    }

    roots.into_iter().map(|s| build(s, &children)).collect()
}

/// Heading tree from the markdown text itself, nesting each heading under
/// the nearest preceding heading of a lower level.
pub fn toc_from_text(text: &str) -> Vec<TocEntry> {
    let mut roots: Vec<TocEntry> = Vec::new();
    // Levels of the currently open entries, outermost first.
    let mut open: Vec<u8> = Vec::new();

    for heading in find_headings(text) {
        while open.last().is_some_and(|&level| level >= heading.level) {
            open.pop();
        }
        let entry = TocEntry {
            heading: heading.text,
            level: heading.level,
            children: Vec::new(),
        };
        push_at_depth(&mut roots, open.len(), entry);
        open.push(heading.level);
    }

    roots
}

fn push_at_depth(entries: &mut Vec<TocEntry>, depth: usize, entry: TocEntry) {
    if depth > 0 {
        if let Some(last) = entries.last_mut() {
            return push_at_depth(&mut last.children, depth - 1, entry);
        }
    }
    entries.push(entry);
}

/// Text of the first heading titled `heading`, through the line before the
/// next heading of the same or a shallower level.
fn heading_span(text: &str, heading: &str) -> Option<String> {
    let headings = find_headings(text);
    let index = headings.iter().position(|h| h.text == heading)?;
    let start = headings[index].start_line;
    let level = headings[index].level;

    let lines: Vec<&str> = text.split('\n').collect();
    let end = headings[index + 1..]
        .iter()
        .find(|h| h.level <= level)
        .map(|h| h.start_line)
        .unwrap_or(lines.len());

    Some(lines[start..end].join("\n"))
}

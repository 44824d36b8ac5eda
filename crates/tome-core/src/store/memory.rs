//! In-memory [`Store`] implementation for testing and embedding.
//!
//! All state lives behind one `std::sync::RwLock`, so generation activation
//! is a single write-locked update and readers observe either the old or
//! the new generation in full. Keyword search is a case-insensitive
//! conjunctive term match scored by occurrence count.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{Document, DomainStats, SearchHit, Section};

use super::{heading_breadcrumb, Lineage, Store};

const SNIPPET_CHARS: usize = 240;
const SNIPPET_LEAD: usize = 60;

#[derive(Default)]
struct State {
    documents: HashMap<String, Document>,
    /// Document ID → sections in position order.
    sections: HashMap<String, Vec<Section>>,
}

impl State {
    fn active_document(&self, domain: &str, path: &str) -> Option<&Document> {
        self.documents
            .values()
            .filter(|d| d.domain == domain && d.path == path && d.generation_active)
            .min_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.url.cmp(&b.url)))
    }

    fn remove_documents(&mut self, keep: impl Fn(&Document) -> bool) -> u64 {
        let doomed: Vec<String> = self
            .documents
            .values()
            .filter(|d| !keep(d))
            .map(|d| d.id.clone())
            .collect();
        for id in &doomed {
            self.documents.remove(id);
            self.sections.remove(id);
        }
        doomed.len() as u64
    }
}

/// In-memory store for tests and single-process embedding.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_document(&self, doc: &Document) -> Result<String> {
        let mut state = self.write()?;
        let existing = state
            .documents
            .values()
            .find(|d| d.generation_id == doc.generation_id && d.url == doc.url)
            .map(|d| d.id.clone());

        let id = existing.unwrap_or_else(|| doc.id.clone());
        let mut stored = doc.clone();
        stored.id = id.clone();
        state.documents.insert(id.clone(), stored);
        Ok(id)
    }

    async fn save_sections(&self, document_id: &str, sections: &[Section]) -> Result<()> {
        let mut state = self.write()?;
        if !state.documents.contains_key(document_id) {
            return Err(anyhow!("document not found: {}", document_id));
        }
        let mut rows = sections.to_vec();
        rows.sort_by_key(|s| s.position);
        state.sections.insert(document_id.to_string(), rows);
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut state = self.write()?;
        state.remove_documents(|d| d.id != document_id);
        Ok(())
    }

    async fn activate_generation(&self, domain: &str, generation_id: &str) -> Result<()> {
        let mut state = self.write()?;
        for doc in state.documents.values_mut().filter(|d| d.domain == domain) {
            doc.generation_active = doc.generation_id == generation_id;
        }
        Ok(())
    }

    async fn cleanup_inactive_generations(&self, domain: &str) -> Result<u64> {
        let mut state = self.write()?;
        Ok(state.remove_documents(|d| d.domain != domain || d.generation_active))
    }

    async fn active_document_hashes(&self, domain: &str) -> Result<HashMap<String, String>> {
        let state = self.read()?;
        Ok(state
            .documents
            .values()
            .filter(|d| d.domain == domain && d.generation_active)
            .map(|d| (d.url.clone(), d.content_hash.clone()))
            .collect())
    }

    async fn get_sections_by_document(&self, domain: &str, path: &str) -> Result<Vec<Section>> {
        let state = self.read()?;
        Ok(state
            .active_document(domain, path)
            .and_then(|d| state.sections.get(&d.id))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_section_subtree(
        &self,
        domain: &str,
        path: &str,
        heading: &str,
    ) -> Result<Vec<Section>> {
        let state = self.read()?;
        let Some(sections) = state
            .active_document(domain, path)
            .and_then(|d| state.sections.get(&d.id))
        else {
            return Ok(Vec::new());
        };
        let Some(start) = sections
            .iter()
            .position(|s| s.heading.as_deref() == Some(heading))
        else {
            return Ok(Vec::new());
        };

        // Pre-order: descendants follow their ancestor contiguously.
        let mut in_subtree = vec![sections[start].id.clone()];
        let mut result = vec![sections[start].clone()];
        for s in &sections[start + 1..] {
            match &s.parent_section_id {
                Some(parent) if in_subtree.contains(parent) => {
                    in_subtree.push(s.id.clone());
                    result.push(s.clone());
                }
                _ => break,
            }
        }
        Ok(result)
    }

    async fn search_sections(
        &self,
        domain: &str,
        query: &str,
        path_prefixes: &[String],
        limit: i64,
    ) -> Result<Vec<SearchHit>> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.replace('"', "").to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() || limit <= 0 {
            return Ok(Vec::new());
        }

        let state = self.read()?;
        let mut scored: Vec<(f64, SearchHit)> = Vec::new();

        for doc in state
            .documents
            .values()
            .filter(|d| d.domain == domain && d.generation_active)
            .filter(|d| path_prefixes.is_empty() || path_prefixes.iter().any(|p| d.path.starts_with(p.as_str())))
        {
            let Some(sections) = state.sections.get(&doc.id) else {
                continue;
            };
            let lineage: Lineage = sections
                .iter()
                .map(|s| (s.id.clone(), (s.parent_section_id.clone(), s.heading.clone())))
                .collect();

            for section in sections {
                let haystack = format!(
                    "{}\n{}",
                    section.heading.as_deref().unwrap_or(""),
                    section.content
                )
                .to_lowercase();
                if !terms.iter().all(|t| haystack.contains(t.as_str())) {
                    continue;
                }
                let score: usize = terms.iter().map(|t| haystack.matches(t.as_str()).count()).sum();
                scored.push((
                    score as f64,
                    SearchHit {
                        url: doc.url.clone(),
                        path: doc.path.clone(),
                        snippet: make_snippet(&section.content, &terms[0]),
                        rank: score as f64,
                        heading_path: heading_breadcrumb(&section.id, &lineage),
                    },
                ));
            }
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.url.cmp(&b.1.url))
        });
        Ok(scored
            .into_iter()
            .take(limit as usize)
            .map(|(_, hit)| hit)
            .collect())
    }

    async fn list_domains(&self) -> Result<Vec<DomainStats>> {
        let state = self.read()?;
        let mut by_domain: HashMap<&str, DomainStats> = HashMap::new();

        for doc in state.documents.values().filter(|d| d.generation_active) {
            let stats = by_domain.entry(doc.domain.as_str()).or_insert_with(|| DomainStats {
                domain: doc.domain.clone(),
                generation_id: doc.generation_id.clone(),
                documents: 0,
                sections: 0,
                last_crawled_at: None,
            });
            stats.documents += 1;
            stats.sections += state.sections.get(&doc.id).map(|s| s.len() as i64).unwrap_or(0);
            stats.last_crawled_at = stats.last_crawled_at.max(Some(doc.crawled_at));
        }

        let mut domains: Vec<DomainStats> = by_domain.into_values().collect();
        domains.sort_by(|a, b| a.domain.cmp(&b.domain));
        Ok(domains)
    }

    async fn delete_domain(&self, domain: &str) -> Result<u64> {
        let mut state = self.write()?;
        Ok(state.remove_documents(|d| d.domain != domain))
    }
}

/// A window of `content` around the first occurrence of `term`, with the
/// match wrapped in `**`.
fn make_snippet(content: &str, term: &str) -> String {
    let lower = content.to_lowercase();
    // Lower-casing can change byte lengths; fall back to the head of the text.
    let found = lower
        .find(term)
        .filter(|_| lower.len() == content.len());

    let Some(byte_pos) = found else {
        return content.chars().take(SNIPPET_CHARS).collect();
    };

    let match_start = content[..byte_pos].chars().count();
    let match_len = content[byte_pos..byte_pos + term.len()].chars().count();
    let start = match_start.saturating_sub(SNIPPET_LEAD);

    let mut snippet = String::new();
    for (i, c) in content.chars().enumerate().skip(start).take(SNIPPET_CHARS) {
        if i == match_start {
            snippet.push_str("**");
        }
        snippet.push(c);
        if i + 1 == match_start + match_len {
            snippet.push_str("**");
        }
    }
    snippet
}

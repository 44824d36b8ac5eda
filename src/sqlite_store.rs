//! SQLite-backed [`Store`] implementation.
//!
//! Documents of every generation live side by side in `documents`; the
//! `generation_active` flag decides what readers see. Activation is a single
//! `UPDATE` so a reader's statement observes either the old or the new
//! generation. Sections are mirrored into the `sections_fts` FTS5 table.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use tome_core::models::{Document, DomainStats, SearchHit, Section};
use tome_core::store::{heading_breadcrumb, sanitize_fts_query, Lineage, Store};

const SECTION_COLUMNS: &str =
    "s.id, s.document_id, s.parent_section_id, s.heading, s.level, s.content, s.position";

/// Active document for a (domain, path). Several URLs can share a path
/// (query strings); the shallowest, then lexically first, wins.
const ACTIVE_DOCUMENT: &str = "SELECT id FROM documents \
     WHERE domain = ? AND path = ? AND generation_active = 1 \
     ORDER BY depth, url LIMIT 1";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn section_from_row(row: &SqliteRow) -> Section {
    let level: i64 = row.get("level");
    Section {
        id: row.get("id"),
        document_id: row.get("document_id"),
        parent_section_id: row.get("parent_section_id"),
        heading: row.get("heading"),
        level: level.clamp(0, u8::MAX as i64) as u8,
        content: row.get("content"),
        position: row.get("position"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_document(&self, doc: &Document) -> Result<String> {
        let existing: Option<String> =
            sqlx::query_scalar("SELECT id FROM documents WHERE generation_id = ? AND url = ?")
                .bind(&doc.generation_id)
                .bind(&doc.url)
                .fetch_optional(&self.pool)
                .await?;
        let id = existing.unwrap_or_else(|| doc.id.clone());

        sqlx::query(
            r#"
            INSERT INTO documents (id, domain, url, path, content_hash, depth,
                                   generation_id, generation_active, crawled_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(generation_id, url) DO UPDATE SET
                path = excluded.path,
                content_hash = excluded.content_hash,
                depth = excluded.depth,
                crawled_at = excluded.crawled_at
            "#,
        )
        .bind(&id)
        .bind(&doc.domain)
        .bind(&doc.url)
        .bind(&doc.path)
        .bind(&doc.content_hash)
        .bind(doc.depth as i64)
        .bind(&doc.generation_id)
        .bind(doc.generation_active)
        .bind(doc.crawled_at)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn save_sections(&self, document_id: &str, sections: &[Section]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM sections_fts WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM sections WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        // Callers pass pre-order rows, so parents are inserted before children
        for section in sections {
            sqlx::query(
                r#"
                INSERT INTO sections (id, document_id, parent_section_id, heading, level, content, position)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&section.id)
            .bind(document_id)
            .bind(&section.parent_section_id)
            .bind(&section.heading)
            .bind(section.level as i64)
            .bind(&section.content)
            .bind(section.position)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO sections_fts (section_id, document_id, heading, content) VALUES (?, ?, ?, ?)",
            )
            .bind(&section.id)
            .bind(document_id)
            .bind(section.heading.as_deref().unwrap_or(""))
            .bind(&section.content)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM sections_fts WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sections WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn activate_generation(&self, domain: &str, generation_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE documents SET generation_active = (generation_id = ?) WHERE domain = ?",
        )
        .bind(generation_id)
        .bind(domain)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn cleanup_inactive_generations(&self, domain: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM sections_fts WHERE document_id IN \
             (SELECT id FROM documents WHERE domain = ? AND generation_active = 0)",
        )
        .bind(domain)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM sections WHERE document_id IN \
             (SELECT id FROM documents WHERE domain = ? AND generation_active = 0)",
        )
        .bind(domain)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM documents WHERE domain = ? AND generation_active = 0")
            .bind(domain)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted)
    }

    async fn active_document_hashes(&self, domain: &str) -> Result<HashMap<String, String>> {
        let rows = sqlx::query(
            "SELECT url, content_hash FROM documents WHERE domain = ? AND generation_active = 1",
        )
        .bind(domain)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("url"), row.get("content_hash")))
            .collect())
    }

    async fn get_sections_by_document(&self, domain: &str, path: &str) -> Result<Vec<Section>> {
        let sql = format!(
            "SELECT {} FROM sections s WHERE s.document_id = ({}) ORDER BY s.position",
            SECTION_COLUMNS, ACTIVE_DOCUMENT
        );
        let rows = sqlx::query(&sql)
            .bind(domain)
            .bind(path)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(section_from_row).collect())
    }

    async fn get_section_subtree(
        &self,
        domain: &str,
        path: &str,
        heading: &str,
    ) -> Result<Vec<Section>> {
        let sql = format!(
            r#"
            WITH RECURSIVE
                root AS (
                    SELECT id FROM sections
                    WHERE document_id = ({active}) AND heading = ?
                    ORDER BY position LIMIT 1
                ),
                subtree(id) AS (
                    SELECT id FROM root
                    UNION ALL
                    SELECT c.id FROM sections c JOIN subtree t ON c.parent_section_id = t.id
                )
            SELECT {columns} FROM sections s JOIN subtree t ON s.id = t.id
            ORDER BY s.position
            "#,
            active = ACTIVE_DOCUMENT,
            columns = SECTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(domain)
            .bind(path)
            .bind(heading)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(section_from_row).collect())
    }

    async fn search_sections(
        &self,
        domain: &str,
        query: &str,
        path_prefixes: &[String],
        limit: i64,
    ) -> Result<Vec<SearchHit>> {
        let fts_query = sanitize_fts_query(query);
        if fts_query.is_empty() || limit <= 0 {
            return Ok(Vec::new());
        }

        let prefix_filter = if path_prefixes.is_empty() {
            String::new()
        } else {
            let clauses = vec!["substr(d.path, 1, length(?)) = ?"; path_prefixes.len()];
            format!("AND ({})", clauses.join(" OR "))
        };

        let sql = format!(
            r#"
            SELECT sections_fts.section_id AS section_id,
                   sections_fts.document_id AS document_id,
                   d.url AS url, d.path AS path, rank,
                   snippet(sections_fts, 3, '**', '**', '...', 32) AS snippet
            FROM sections_fts
            JOIN documents d ON d.id = sections_fts.document_id
            WHERE sections_fts MATCH ?
              AND d.domain = ?
              AND d.generation_active = 1
              {}
            ORDER BY rank
            LIMIT ?
            "#,
            prefix_filter
        );

        // One read transaction so hits and their lineage come from the same snapshot
        let mut tx = self.pool.begin().await?;

        let mut q = sqlx::query(&sql).bind(&fts_query).bind(domain);
        for prefix in path_prefixes {
            q = q.bind(prefix).bind(prefix);
        }
        let rows = q.bind(limit).fetch_all(&mut *tx).await?;

        let mut lineages: HashMap<String, Lineage> = HashMap::new();
        let mut hits = Vec::with_capacity(rows.len());

        for row in &rows {
            let section_id: String = row.get("section_id");
            let document_id: String = row.get("document_id");

            if !lineages.contains_key(&document_id) {
                let lineage_rows = sqlx::query(
                    "SELECT id, parent_section_id, heading FROM sections WHERE document_id = ?",
                )
                .bind(&document_id)
                .fetch_all(&mut *tx)
                .await?;
                let lineage: Lineage = lineage_rows
                    .iter()
                    .map(|r| (r.get("id"), (r.get("parent_section_id"), r.get("heading"))))
                    .collect();
                lineages.insert(document_id.clone(), lineage);
            }

            let rank: f64 = row.get("rank");
            hits.push(SearchHit {
                url: row.get("url"),
                path: row.get("path"),
                snippet: row.get("snippet"),
                rank: -rank,
                heading_path: lineages
                    .get(&document_id)
                    .map(|l| heading_breadcrumb(&section_id, l))
                    .unwrap_or_default(),
            });
        }

        tx.commit().await?;
        Ok(hits)
    }

    async fn list_domains(&self) -> Result<Vec<DomainStats>> {
        let rows = sqlx::query(
            r#"
            SELECT d.domain AS domain,
                   d.generation_id AS generation_id,
                   COUNT(DISTINCT d.id) AS documents,
                   COUNT(s.id) AS sections,
                   MAX(d.crawled_at) AS last_crawled_at
            FROM documents d
            LEFT JOIN sections s ON s.document_id = d.id
            WHERE d.generation_active = 1
            GROUP BY d.domain, d.generation_id
            ORDER BY d.domain
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DomainStats {
                domain: row.get("domain"),
                generation_id: row.get("generation_id"),
                documents: row.get("documents"),
                sections: row.get("sections"),
                last_crawled_at: row.get("last_crawled_at"),
            })
            .collect())
    }

    async fn delete_domain(&self, domain: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM sections_fts WHERE document_id IN (SELECT id FROM documents WHERE domain = ?)",
        )
        .bind(domain)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM sections WHERE document_id IN (SELECT id FROM documents WHERE domain = ?)",
        )
        .bind(domain)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM documents WHERE domain = ?")
            .bind(domain)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::create_schema;
    use sqlx::sqlite::SqlitePoolOptions;
    use tome_core::chunk::{chunk_markdown, flatten_sections, join_sections};

    async fn memory_store() -> SqliteStore {
        // One connection: every new in-memory connection is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn doc(id: &str, url: &str, generation: &str) -> Document {
        let path = url::Url::parse(url).unwrap().path().to_string();
        Document {
            id: id.into(),
            domain: "example.com".into(),
            url: url.into(),
            path,
            content_hash: format!("h-{}", id),
            depth: 0,
            generation_id: generation.into(),
            generation_active: false,
            crawled_at: 1_700_000_000,
        }
    }

    async fn seed(store: &SqliteStore, d: &Document, markdown: &str, max_tokens: usize) {
        let id = store.insert_document(d).await.unwrap();
        let root = chunk_markdown(markdown, max_tokens).unwrap();
        store.save_sections(&id, &flatten_sections(&root, &id)).await.unwrap();
    }

    const GUIDE: &str = "# Guide\n\nWelcome.\n\n## Install\n\nRun the installer.\n\n### Linux\n\nUse apt to install.\n\n## Usage\n\nCall tome.";

    #[tokio::test]
    async fn test_sections_round_trip_after_activation() {
        let store = memory_store().await;
        seed(&store, &doc("d1", "https://example.com/g.md", "g1"), GUIDE, 6).await;

        assert!(store.get_sections_by_document("example.com", "/g.md").await.unwrap().is_empty());
        store.activate_generation("example.com", "g1").await.unwrap();

        let sections = store.get_sections_by_document("example.com", "/g.md").await.unwrap();
        assert_eq!(sections.len(), 4);
        assert_eq!(join_sections(&sections), GUIDE);
        assert!(sections.windows(2).all(|w| w[0].position < w[1].position));
    }

    #[tokio::test]
    async fn test_subtree_via_recursive_query() {
        let store = memory_store().await;
        seed(&store, &doc("d1", "https://example.com/g.md", "g1"), GUIDE, 6).await;
        store.activate_generation("example.com", "g1").await.unwrap();

        let subtree = store.get_section_subtree("example.com", "/g.md", "Install").await.unwrap();
        assert_eq!(
            join_sections(&subtree),
            "## Install\n\nRun the installer.\n\n### Linux\n\nUse apt to install.\n"
        );
        assert!(store.get_section_subtree("example.com", "/g.md", "Nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generation_swap_and_cleanup() {
        let store = memory_store().await;
        seed(&store, &doc("a", "https://example.com/llms.txt", "g1"), "old text", 100).await;
        store.activate_generation("example.com", "g1").await.unwrap();
        seed(&store, &doc("b", "https://example.com/llms.txt", "g2"), "new text", 100).await;

        let before = store.get_sections_by_document("example.com", "/llms.txt").await.unwrap();
        assert_eq!(before[0].content, "old text");

        store.activate_generation("example.com", "g2").await.unwrap();
        let after = store.get_sections_by_document("example.com", "/llms.txt").await.unwrap();
        assert_eq!(after[0].content, "new text");

        assert_eq!(store.cleanup_inactive_generations("example.com").await.unwrap(), 1);
        let fts_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sections_fts")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(fts_rows, 1);

        let hashes = store.active_document_hashes("example.com").await.unwrap();
        assert_eq!(hashes.get("https://example.com/llms.txt").map(String::as_str), Some("h-b"));
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_per_generation_url() {
        let store = memory_store().await;
        let first = store.insert_document(&doc("a", "https://example.com/x.md", "g1")).await.unwrap();
        let second = store.insert_document(&doc("b", "https://example.com/x.md", "g1")).await.unwrap();
        assert_eq!(first, second);
        let other = store.insert_document(&doc("c", "https://example.com/x.md", "g2")).await.unwrap();
        assert_eq!(other, "c");
    }

    #[tokio::test]
    async fn test_search_ranks_filters_and_breadcrumbs() {
        let store = memory_store().await;
        seed(&store, &doc("a", "https://example.com/docs/g.md", "g1"), GUIDE, 6).await;
        seed(&store, &doc("b", "https://example.com/blog/apt.md", "g1"), "apt apt apt", 100).await;
        seed(&store, &doc("c", "https://example.com/docs/old.md", "g0"), "apt forever", 100).await;
        store.activate_generation("example.com", "g1").await.unwrap();

        let hits = store.search_sections("example.com", "apt", &[], 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.rank > 0.0));
        assert!(hits[0].rank >= hits[1].rank);
        assert!(hits.iter().all(|h| h.path != "/docs/old.md"));

        let docs_only = store
            .search_sections("example.com", "apt install", &["/docs".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(docs_only.len(), 1);
        assert_eq!(docs_only[0].heading_path, "Guide > Install > Linux");
        assert!(docs_only[0].snippet.contains("**apt**"));

        let quoted = store.search_sections("example.com", "\"apt\" OR", &[], 10).await.unwrap();
        assert!(quoted.is_empty());
    }

    #[tokio::test]
    async fn test_delete_document_removes_rows_and_index() {
        let store = memory_store().await;
        seed(&store, &doc("a", "https://example.com/g.md", "g1"), GUIDE, 6).await;
        seed(&store, &doc("b", "https://example.com/h.md", "g1"), "hello", 100).await;

        store.delete_document("a").await.unwrap();
        store.delete_document("missing").await.unwrap();
        store.activate_generation("example.com", "g1").await.unwrap();

        let hashes = store.active_document_hashes("example.com").await.unwrap();
        assert_eq!(hashes.len(), 1);
        assert!(hashes.contains_key("https://example.com/h.md"));
        let fts_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sections_fts")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(fts_rows, 1);
    }

    #[tokio::test]
    async fn test_list_and_delete_domain() {
        let store = memory_store().await;
        seed(&store, &doc("a", "https://example.com/g.md", "g1"), GUIDE, 6).await;
        seed(&store, &doc("b", "https://example.com/h.md", "g1"), "hello", 100).await;
        store.activate_generation("example.com", "g1").await.unwrap();

        let domains = store.list_domains().await.unwrap();
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0].documents, 2);
        assert_eq!(domains[0].sections, 5);
        assert_eq!(domains[0].last_crawled_at, Some(1_700_000_000));

        assert_eq!(store.delete_domain("example.com").await.unwrap(), 2);
        assert!(store.list_domains().await.unwrap().is_empty());
    }
}

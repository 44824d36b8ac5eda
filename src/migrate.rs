use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Safe to run repeatedly.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // One row per fetched URL per crawl generation
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            domain TEXT NOT NULL,
            url TEXT NOT NULL,
            path TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            depth INTEGER NOT NULL DEFAULT 0,
            generation_id TEXT NOT NULL,
            generation_active INTEGER NOT NULL DEFAULT 0,
            crawled_at INTEGER NOT NULL,
            UNIQUE(generation_id, url)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sections (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            parent_section_id TEXT,
            heading TEXT,
            level INTEGER NOT NULL,
            content TEXT NOT NULL,
            position INTEGER NOT NULL,
            UNIQUE(document_id, position),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS sections_fts USING fts5(
            section_id UNINDEXED,
            document_id UNINDEXED,
            heading,
            content
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_domain_active ON documents(domain, generation_active)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_domain_path ON documents(domain, path)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sections_document_id ON sections(document_id)")
        .execute(pool)
        .await?;

    Ok(())
}

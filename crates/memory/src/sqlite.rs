//! SQLite backend with FTS5 full-text search.
//!
//! One database file, two tables:
//! - `memories` holds the entries (tags and metadata as JSON text)
//! - `memories_fts` is an external-content FTS5 index ranked with BM25
//!
//! Triggers keep the FTS index in sync on insert/delete/update.

use async_trait::async_trait;
use chrono::Utc;
use miniluma_core::error::MemoryError;
use miniluma_core::memory::{MemoryBackend, MemoryEntry, MemoryQuery};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::generate_memory_id;

const SCHEMA: &[(&str, &str)] = &[
    (
        "memories table",
        r#"
        CREATE TABLE IF NOT EXISTS memories (
            iid           INTEGER PRIMARY KEY AUTOINCREMENT,
            id            TEXT UNIQUE NOT NULL,
            content       TEXT NOT NULL,
            tags          TEXT NOT NULL DEFAULT '[]',
            source        TEXT,
            metadata      TEXT NOT NULL DEFAULT '{}',
            created_at    TEXT NOT NULL,
            last_accessed TEXT NOT NULL
        )
        "#,
    ),
    (
        "FTS5 table",
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
            content,
            tags,
            content='memories',
            content_rowid='iid',
            tokenize='porter unicode61'
        )
        "#,
    ),
    (
        "insert trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
            INSERT INTO memories_fts(rowid, content, tags)
            VALUES (new.iid, new.content, new.tags);
        END
        "#,
    ),
    (
        "delete trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
            INSERT INTO memories_fts(memories_fts, rowid, content, tags)
            VALUES ('delete', old.iid, old.content, old.tags);
        END
        "#,
    ),
    (
        "update trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
            INSERT INTO memories_fts(memories_fts, rowid, content, tags)
            VALUES ('delete', old.iid, old.content, old.tags);
            INSERT INTO memories_fts(rowid, content, tags)
            VALUES (new.iid, new.content, new.tags);
        END
        "#,
    ),
    (
        "created_at index",
        "CREATE INDEX IF NOT EXISTS idx_memories_created_at ON memories(created_at DESC)",
    ),
];

/// Persistent memory backed by SQLite.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open a database from a connection string such as `sqlite://memory.db`.
    ///
    /// `sqlite::memory:` gives an ephemeral database on a single connection.
    pub async fn new(url: &str) -> Result<Self, MemoryError> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true);
        if !in_memory {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        // Every pooled connection to :memory: would see its own database.
        let max_connections = if in_memory { 1 } else { 4 };
        Self::connect(options, max_connections, url).await
    }

    /// Open (or create) a database file, creating parent directories.
    pub async fn open(path: &Path) -> Result<Self, MemoryError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| MemoryError::Storage(format!("Failed to create {}: {e}", parent.display())))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
        Self::connect(options, 4, &path.display().to_string()).await
    }

    async fn connect(
        options: SqliteConnectOptions,
        max_connections: u32,
        label: &str,
    ) -> Result<Self, MemoryError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let backend = Self { pool };
        backend.run_migrations().await?;
        info!(path = %label, "SQLite memory backend initialized");
        Ok(backend)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        for (what, sql) in SCHEMA {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::MigrationFailed(format!("{what}: {e}")))?;
        }
        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_entry(row: &SqliteRow) -> Result<MemoryEntry, MemoryError> {
        fn col<'r, T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>>(
            row: &'r SqliteRow,
            name: &str,
        ) -> Result<T, MemoryError> {
            row.try_get(name)
                .map_err(|e| MemoryError::QueryFailed(format!("{name} column: {e}")))
        }

        let parse_time = |s: String| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now())
        };

        let tags: String = col(row, "tags")?;
        let metadata: String = col(row, "metadata")?;

        Ok(MemoryEntry {
            id: col(row, "id")?,
            content: col(row, "content")?,
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            source: col(row, "source")?,
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
            created_at: parse_time(col(row, "created_at")?),
            last_accessed: parse_time(col(row, "last_accessed")?),
            score: 0.0,
        })
    }

    /// Build a safe FTS5 query from free text.
    ///
    /// Each word is stripped to alphanumerics, quoted, and prefix-matched.
    /// Words are OR-ed so that recall works for natural-language questions;
    /// BM25 still ranks entries matching more words higher.
    fn sanitize_fts_query(text: &str) -> String {
        text.split_whitespace()
            .map(|w| w.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect::<String>())
            .filter(|w| !w.is_empty())
            .map(|w| format!("\"{w}\"*"))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    /// `AND (m.tags LIKE ? OR ...)` with one bind per tag, or empty.
    fn tag_filter(tags: &[String], first_param: usize) -> String {
        if tags.is_empty() {
            return String::new();
        }
        let conditions: Vec<String> = (0..tags.len())
            .map(|i| format!("m.tags LIKE ?{} ESCAPE '\\'", first_param + i))
            .collect();
        format!("AND ({})", conditions.join(" OR "))
    }

    fn tag_pattern(tag: &str) -> String {
        let escaped = tag.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        format!("%\"{escaped}\"%")
    }

    async fn like_search(&self, query: &MemoryQuery) -> Result<Vec<MemoryEntry>, MemoryError> {
        let sql = format!(
            "SELECT m.* FROM memories m WHERE m.content LIKE ?1 {} ORDER BY m.created_at DESC, m.iid DESC LIMIT ?2",
            Self::tag_filter(&query.tags, 3)
        );
        let mut db_query = sqlx::query(&sql)
            .bind(format!("%{}%", query.text.trim()))
            .bind(query.limit as i64);
        for tag in &query.tags {
            db_query = db_query.bind(Self::tag_pattern(tag));
        }

        let rows = db_query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("LIKE search: {e}")))?;
        rows.iter()
            .map(|row| {
                let mut entry = Self::row_to_entry(row)?;
                entry.score = 1.0;
                Ok(entry)
            })
            .collect()
    }
}

#[async_trait]
impl MemoryBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn store(&self, mut entry: MemoryEntry) -> Result<String, MemoryError> {
        if entry.id.is_empty() {
            entry.id = generate_memory_id();
        }
        let tags_json = serde_json::to_string(&entry.tags)
            .map_err(|e| MemoryError::Storage(format!("Tags serialization: {e}")))?;
        let metadata_json = serde_json::to_string(&entry.metadata)
            .map_err(|e| MemoryError::Storage(format!("Metadata serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO memories (id, content, tags, source, metadata, created_at, last_accessed)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                tags = excluded.tags,
                source = excluded.source,
                metadata = excluded.metadata,
                last_accessed = excluded.last_accessed
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.content)
        .bind(&tags_json)
        .bind(&entry.source)
        .bind(&metadata_json)
        .bind(entry.created_at.to_rfc3339())
        .bind(entry.last_accessed.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        debug!(id = %entry.id, "Stored memory");
        Ok(entry.id)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryEntry>, MemoryError> {
        let row = sqlx::query("SELECT * FROM memories WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("GET by ID: {e}")))?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn search(&self, query: MemoryQuery) -> Result<Vec<MemoryEntry>, MemoryError> {
        if query.text.trim().is_empty() {
            return self.recent(query.limit).await;
        }

        let fts_query = Self::sanitize_fts_query(&query.text);
        if fts_query.is_empty() {
            return self.like_search(&query).await;
        }

        let sql = format!(
            r#"
            SELECT m.*, bm25(memories_fts) AS rank
            FROM memories_fts f
            JOIN memories m ON m.iid = f.rowid
            WHERE memories_fts MATCH ?1
            {}
            ORDER BY rank
            LIMIT ?2
            "#,
            Self::tag_filter(&query.tags, 3)
        );

        let mut db_query = sqlx::query(&sql).bind(&fts_query).bind(query.limit as i64);
        for tag in &query.tags {
            db_query = db_query.bind(Self::tag_pattern(tag));
        }

        let rows = db_query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("FTS5 search: {e}")))?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut entry = Self::row_to_entry(row)?;
            // bm25() is negative, lower is better
            let rank: f64 = row.try_get("rank").unwrap_or(0.0);
            entry.score = (-rank) as f32;
            if entry.score >= query.min_score {
                results.push(entry);
            }
        }
        Ok(results)
    }

    async fn update(
        &self,
        id: &str,
        content: Option<String>,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<bool, MemoryError> {
        let metadata_json = metadata
            .map(|m| serde_json::to_string(&m))
            .transpose()
            .map_err(|e| MemoryError::Storage(format!("Metadata serialization: {e}")))?;

        let result = sqlx::query(
            r#"
            UPDATE memories SET
                content = COALESCE(?2, content),
                metadata = COALESCE(?3, metadata),
                last_accessed = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(content)
        .bind(metadata_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("UPDATE failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM memories WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<MemoryEntry>, MemoryError> {
        let rows = sqlx::query("SELECT * FROM memories ORDER BY created_at DESC, iid DESC LIMIT ?1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("Recent: {e}")))?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        let cnt: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memories")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("COUNT: {e}")))?;
        Ok(cnt as usize)
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        sqlx::query("DELETE FROM memories")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("CLEAR failed: {e}")))?;
        Ok(())
    }
}

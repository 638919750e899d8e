//! SQLite-backed store.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::HierarchyStore;
use crate::types::{HierarchyNode, NewNode, RunRecord, RunStatus};

/// Stores hierarchies in SQLite. Ids, timestamps, and id arrays are kept
/// as TEXT (uuid strings, RFC 3339, JSON) so the file stays portable and
/// readable from the sqlite3 shell.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url`, e.g.
    /// `sqlite://summaries.db?mode=rwc`, and apply migrations.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Fresh in-memory database, one per call.
    pub async fn in_memory() -> StoreResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Wrap an existing pool. Migrations are the caller's problem.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes if missing. Safe to call repeatedly.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hierarchy_nodes (
                id TEXT PRIMARY KEY,
                batch_id TEXT NOT NULL,
                level INTEGER NOT NULL,
                kind TEXT NOT NULL,
                content TEXT NOT NULL,
                summary TEXT,
                parent_id TEXT,
                source_ids TEXT NOT NULL DEFAULT '[]',
                child_ids TEXT NOT NULL DEFAULT '[]',
                token_count INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_nodes_batch_level
             ON hierarchy_nodes (batch_id, level)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS summarization_runs (
                batch_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                document_count INTEGER NOT NULL,
                final_node_id TEXT,
                hierarchy_depth INTEGER,
                error TEXT,
                prompt_hash TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Additive upgrade for databases created before prompt hashes
        // were recorded; fails harmlessly when the column exists.
        let _ = sqlx::query("ALTER TABLE summarization_runs ADD COLUMN prompt_hash TEXT")
            .execute(&self.pool)
            .await;

        Ok(())
    }
}

#[derive(FromRow)]
struct NodeRow {
    id: String,
    batch_id: String,
    level: i64,
    kind: String,
    content: String,
    summary: Option<String>,
    parent_id: Option<String>,
    source_ids: String,
    child_ids: String,
    token_count: i64,
    metadata: String,
    created_at: String,
}

impl NodeRow {
    fn into_node(self) -> StoreResult<HierarchyNode> {
        Ok(HierarchyNode {
            id: parse_uuid(&self.id)?,
            batch_id: parse_uuid(&self.batch_id)?,
            level: self.level as i32,
            kind: self.kind.parse().map_err(row_error)?,
            content: self.content,
            summary: self.summary,
            parent_id: self.parent_id.as_deref().map(parse_uuid).transpose()?,
            source_ids: parse_json(&self.source_ids)?,
            child_ids: parse_json(&self.child_ids)?,
            token_count: self.token_count,
            metadata: parse_json(&self.metadata)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct RunRow {
    batch_id: String,
    status: String,
    document_count: i64,
    final_node_id: Option<String>,
    hierarchy_depth: Option<i64>,
    error: Option<String>,
    prompt_hash: Option<String>,
    started_at: String,
    finished_at: Option<String>,
}

impl RunRow {
    fn into_record(self) -> StoreResult<RunRecord> {
        Ok(RunRecord {
            batch_id: parse_uuid(&self.batch_id)?,
            status: self.status.parse().map_err(row_error)?,
            document_count: self.document_count,
            final_node_id: self.final_node_id.as_deref().map(parse_uuid).transpose()?,
            hierarchy_depth: self.hierarchy_depth.map(|d| d as i32),
            error: self.error,
            prompt_hash: self.prompt_hash,
            started_at: parse_timestamp(&self.started_at)?,
            finished_at: self
                .finished_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
        })
    }
}

fn parse_uuid(value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::Backend(Box::new(e)))
}

fn parse_json<T: serde::de::DeserializeOwned>(value: &str) -> StoreResult<T> {
    serde_json::from_str(value).map_err(|e| StoreError::Backend(Box::new(e)))
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(Box::new(e)))
}

fn row_error(detail: String) -> StoreError {
    StoreError::Backend(detail.into())
}

// Fixed-width timestamps keep lexicographic and chronological order in
// agreement for ORDER BY.
fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl HierarchyStore for SqliteStore {
    async fn insert_node(&self, node: NewNode) -> StoreResult<HierarchyNode> {
        let node = node.into_node(Uuid::new_v4());
        sqlx::query(
            r#"
            INSERT INTO hierarchy_nodes
                (id, batch_id, level, kind, content, summary, parent_id,
                 source_ids, child_ids, token_count, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(node.id.to_string())
        .bind(node.batch_id.to_string())
        .bind(node.level)
        .bind(node.kind.as_str())
        .bind(&node.content)
        .bind(node.summary.as_deref())
        .bind(node.parent_id.map(|id| id.to_string()))
        .bind(serde_json::to_string(&node.source_ids).map_err(|e| StoreError::Backend(Box::new(e)))?)
        .bind(serde_json::to_string(&node.child_ids).map_err(|e| StoreError::Backend(Box::new(e)))?)
        .bind(node.token_count)
        .bind(serde_json::to_string(&node.metadata).map_err(|e| StoreError::Backend(Box::new(e)))?)
        .bind(format_timestamp(node.created_at))
        .execute(&self.pool)
        .await?;
        Ok(node)
    }

    async fn append_child(&self, parent_id: Uuid, child_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE hierarchy_nodes
             SET child_ids = json_insert(child_ids, '$[#]', ?)
             WHERE id = ?",
        )
        .bind(child_id.to_string())
        .bind(parent_id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NodeNotFound { id: parent_id });
        }
        Ok(())
    }

    async fn set_summary(&self, id: Uuid, summary: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE hierarchy_nodes
             SET summary = ?
             WHERE id = ? AND summary IS NULL",
        )
        .bind(summary)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing node from a second write.
            let exists =
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM hierarchy_nodes WHERE id = ?")
                    .bind(id.to_string())
                    .fetch_one(&self.pool)
                    .await?;
            if exists == 0 {
                return Err(StoreError::NodeNotFound { id });
            }
            return Err(StoreError::SummaryAlreadySet { id });
        }
        Ok(())
    }

    async fn node(&self, id: Uuid) -> StoreResult<HierarchyNode> {
        let row = sqlx::query_as::<_, NodeRow>("SELECT * FROM hierarchy_nodes WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or(StoreError::NodeNotFound { id })?.into_node()
    }

    async fn nodes_at_level(&self, batch_id: Uuid, level: i32) -> StoreResult<Vec<HierarchyNode>> {
        let rows = sqlx::query_as::<_, NodeRow>(
            "SELECT * FROM hierarchy_nodes
             WHERE batch_id = ? AND level = ?
             ORDER BY created_at, rowid",
        )
        .bind(batch_id.to_string())
        .bind(level)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(NodeRow::into_node).collect()
    }

    async fn create_run(&self, record: RunRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO summarization_runs
                (batch_id, status, document_count, final_node_id,
                 hierarchy_depth, error, prompt_hash, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.batch_id.to_string())
        .bind(record.status.as_str())
        .bind(record.document_count)
        .bind(record.final_node_id.map(|id| id.to_string()))
        .bind(record.hierarchy_depth)
        .bind(record.error.as_deref())
        .bind(record.prompt_hash.as_deref())
        .bind(format_timestamp(record.started_at))
        .bind(record.finished_at.map(format_timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_run(
        &self,
        batch_id: Uuid,
        final_node_id: Uuid,
        hierarchy_depth: i32,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE summarization_runs
             SET status = ?, final_node_id = ?, hierarchy_depth = ?, finished_at = ?
             WHERE batch_id = ?",
        )
        .bind(RunStatus::Completed.as_str())
        .bind(final_node_id.to_string())
        .bind(hierarchy_depth)
        .bind(format_timestamp(Utc::now()))
        .bind(batch_id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RunNotFound { batch_id });
        }
        Ok(())
    }

    async fn fail_run(&self, batch_id: Uuid, error: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE summarization_runs
             SET status = ?, error = ?, finished_at = ?
             WHERE batch_id = ?",
        )
        .bind(RunStatus::Failed.as_str())
        .bind(error)
        .bind(format_timestamp(Utc::now()))
        .bind(batch_id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RunNotFound { batch_id });
        }
        Ok(())
    }

    async fn run(&self, batch_id: Uuid) -> StoreResult<RunRecord> {
        let row = sqlx::query_as::<_, RunRow>(
            "SELECT * FROM summarization_runs WHERE batch_id = ?",
        )
        .bind(batch_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(StoreError::RunNotFound { batch_id })?.into_record()
    }
}

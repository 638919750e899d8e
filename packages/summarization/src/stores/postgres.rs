//! PostgreSQL-backed store.
//!
//! Uses native column types (UUID, UUID[], JSONB, TIMESTAMPTZ) rather
//! than the TEXT encodings of the SQLite store, and a sequence column
//! for creation order.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::HierarchyStore;
use crate::types::{HierarchyNode, NewNode, RunRecord, RunStatus};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to `url` (a `postgres://` connection string) and apply
    /// migrations.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.run_migrations().await?;
        debug!("postgres store ready");
        Ok(store)
    }

    /// Wrap an existing pool. Migrations are the caller's problem.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if missing. Safe to call repeatedly.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hierarchy_nodes (
                id UUID PRIMARY KEY,
                seq BIGSERIAL,
                batch_id UUID NOT NULL,
                level INT NOT NULL,
                kind TEXT NOT NULL,
                content TEXT NOT NULL,
                summary TEXT,
                parent_id UUID,
                source_ids UUID[] NOT NULL DEFAULT '{}',
                child_ids UUID[] NOT NULL DEFAULT '{}',
                token_count BIGINT NOT NULL DEFAULT 0,
                metadata JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL
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
                batch_id UUID PRIMARY KEY,
                status TEXT NOT NULL,
                document_count BIGINT NOT NULL,
                final_node_id UUID,
                hierarchy_depth INT,
                error TEXT,
                prompt_hash TEXT,
                started_at TIMESTAMPTZ NOT NULL,
                finished_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("ALTER TABLE summarization_runs ADD COLUMN IF NOT EXISTS prompt_hash TEXT")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[derive(FromRow)]
struct NodeRow {
    id: Uuid,
    batch_id: Uuid,
    level: i32,
    kind: String,
    content: String,
    summary: Option<String>,
    parent_id: Option<Uuid>,
    source_ids: Vec<Uuid>,
    child_ids: Vec<Uuid>,
    token_count: i64,
    metadata: Json<HashMap<String, String>>,
    created_at: DateTime<Utc>,
}

impl NodeRow {
    fn into_node(self) -> StoreResult<HierarchyNode> {
        Ok(HierarchyNode {
            id: self.id,
            batch_id: self.batch_id,
            level: self.level,
            kind: self.kind.parse().map_err(row_error)?,
            content: self.content,
            summary: self.summary,
            parent_id: self.parent_id,
            source_ids: self.source_ids,
            child_ids: self.child_ids,
            token_count: self.token_count,
            metadata: self.metadata.0,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct RunRow {
    batch_id: Uuid,
    status: String,
    document_count: i64,
    final_node_id: Option<Uuid>,
    hierarchy_depth: Option<i32>,
    error: Option<String>,
    prompt_hash: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl RunRow {
    fn into_record(self) -> StoreResult<RunRecord> {
        Ok(RunRecord {
            batch_id: self.batch_id,
            status: self.status.parse().map_err(row_error)?,
            document_count: self.document_count,
            final_node_id: self.final_node_id,
            hierarchy_depth: self.hierarchy_depth,
            error: self.error,
            prompt_hash: self.prompt_hash,
            started_at: self.started_at,
            finished_at: self.finished_at,
        })
    }
}

fn row_error(detail: String) -> StoreError {
    StoreError::Backend(detail.into())
}

#[async_trait]
impl HierarchyStore for PostgresStore {
    #[instrument(skip(self, node), fields(batch_id = %node.batch_id, level = node.level, kind = %node.kind))]
    async fn insert_node(&self, node: NewNode) -> StoreResult<HierarchyNode> {
        let node = node.into_node(Uuid::new_v4());
        sqlx::query(
            r#"
            INSERT INTO hierarchy_nodes
                (id, batch_id, level, kind, content, summary, parent_id,
                 source_ids, child_ids, token_count, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(node.id)
        .bind(node.batch_id)
        .bind(node.level)
        .bind(node.kind.as_str())
        .bind(&node.content)
        .bind(node.summary.as_deref())
        .bind(node.parent_id)
        .bind(&node.source_ids)
        .bind(&node.child_ids)
        .bind(node.token_count)
        .bind(Json(&node.metadata))
        .bind(node.created_at)
        .execute(&self.pool)
        .await?;
        Ok(node)
    }

    #[instrument(skip(self), fields(parent_id = %parent_id, child_id = %child_id))]
    async fn append_child(&self, parent_id: Uuid, child_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE hierarchy_nodes
             SET child_ids = array_append(child_ids, $1)
             WHERE id = $2",
        )
        .bind(child_id)
        .bind(parent_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NodeNotFound { id: parent_id });
        }
        Ok(())
    }

    #[instrument(skip(self, summary), fields(id = %id, summary_len = summary.len()))]
    async fn set_summary(&self, id: Uuid, summary: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE hierarchy_nodes
             SET summary = $1
             WHERE id = $2 AND summary IS NULL",
        )
        .bind(summary)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists =
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM hierarchy_nodes WHERE id = $1")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await?;
            if exists == 0 {
                return Err(StoreError::NodeNotFound { id });
            }
            return Err(StoreError::SummaryAlreadySet { id });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn node(&self, id: Uuid) -> StoreResult<HierarchyNode> {
        let row = sqlx::query_as::<_, NodeRow>("SELECT * FROM hierarchy_nodes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or(StoreError::NodeNotFound { id })?.into_node()
    }

    #[instrument(skip(self), fields(batch_id = %batch_id, level = level))]
    async fn nodes_at_level(&self, batch_id: Uuid, level: i32) -> StoreResult<Vec<HierarchyNode>> {
        let rows = sqlx::query_as::<_, NodeRow>(
            "SELECT * FROM hierarchy_nodes
             WHERE batch_id = $1 AND level = $2
             ORDER BY seq",
        )
        .bind(batch_id)
        .bind(level)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(NodeRow::into_node).collect()
    }

    #[instrument(skip(self, record), fields(batch_id = %record.batch_id, documents = record.document_count))]
    async fn create_run(&self, record: RunRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO summarization_runs
                (batch_id, status, document_count, final_node_id,
                 hierarchy_depth, error, prompt_hash, started_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.batch_id)
        .bind(record.status.as_str())
        .bind(record.document_count)
        .bind(record.final_node_id)
        .bind(record.hierarchy_depth)
        .bind(record.error.as_deref())
        .bind(record.prompt_hash.as_deref())
        .bind(record.started_at)
        .bind(record.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(batch_id = %batch_id, hierarchy_depth = hierarchy_depth))]
    async fn complete_run(
        &self,
        batch_id: Uuid,
        final_node_id: Uuid,
        hierarchy_depth: i32,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE summarization_runs
             SET status = $1, final_node_id = $2, hierarchy_depth = $3, finished_at = $4
             WHERE batch_id = $5",
        )
        .bind(RunStatus::Completed.as_str())
        .bind(final_node_id)
        .bind(hierarchy_depth)
        .bind(Utc::now())
        .bind(batch_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RunNotFound { batch_id });
        }
        Ok(())
    }

    #[instrument(skip(self, error), fields(batch_id = %batch_id))]
    async fn fail_run(&self, batch_id: Uuid, error: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE summarization_runs
             SET status = $1, error = $2, finished_at = $3
             WHERE batch_id = $4",
        )
        .bind(RunStatus::Failed.as_str())
        .bind(error)
        .bind(Utc::now())
        .bind(batch_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RunNotFound { batch_id });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(batch_id = %batch_id))]
    async fn run(&self, batch_id: Uuid) -> StoreResult<RunRecord> {
        let row = sqlx::query_as::<_, RunRow>(
            "SELECT * FROM summarization_runs WHERE batch_id = $1",
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(StoreError::RunNotFound { batch_id })?.into_record()
    }
}

//! Persistence abstraction for hierarchies and run records.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::{HierarchyNode, NewNode, RunRecord};

/// Storage backend for hierarchy nodes and run records.
///
/// `child_ids` is append-only and `summary` is set-once; implementations
/// enforce both so a replayed or concurrent pipeline step cannot corrupt
/// a finished hierarchy.
#[async_trait]
pub trait HierarchyStore: Send + Sync {
    /// Insert a node and return it with its assigned id.
    async fn insert_node(&self, node: NewNode) -> StoreResult<HierarchyNode>;

    /// Append `child_id` to the parent's `child_ids`.
    async fn append_child(&self, parent_id: Uuid, child_id: Uuid) -> StoreResult<()>;

    /// Set a node's summary. Fails with `StoreError::SummaryAlreadySet`
    /// when one exists.
    async fn set_summary(&self, id: Uuid, summary: &str) -> StoreResult<()>;

    async fn node(&self, id: Uuid) -> StoreResult<HierarchyNode>;

    /// All nodes of a run at `level`, in creation order.
    async fn nodes_at_level(&self, batch_id: Uuid, level: i32) -> StoreResult<Vec<HierarchyNode>>;

    async fn create_run(&self, record: RunRecord) -> StoreResult<()>;

    /// Mark a run completed and record its root node and depth.
    async fn complete_run(
        &self,
        batch_id: Uuid,
        final_node_id: Uuid,
        hierarchy_depth: i32,
    ) -> StoreResult<()>;

    /// Mark a run failed with a human-readable reason.
    async fn fail_run(&self, batch_id: Uuid, error: &str) -> StoreResult<()>;

    async fn run(&self, batch_id: Uuid) -> StoreResult<RunRecord>;

    /// Final summary text of a run, or `None` while it is unfinished.
    async fn final_summary(&self, batch_id: Uuid) -> StoreResult<Option<String>> {
        let record = self.run(batch_id).await?;
        let Some(final_id) = record.final_node_id else {
            return Ok(None);
        };
        let node = self.node(final_id).await?;
        Ok(Some(node.payload().to_string()))
    }

    /// Children of a node, in append order.
    async fn children_of(&self, id: Uuid) -> StoreResult<Vec<HierarchyNode>> {
        let parent = self.node(id).await?;
        let mut children = Vec::with_capacity(parent.child_ids.len());
        for child_id in parent.child_ids {
            children.push(self.node(child_id).await?);
        }
        Ok(children)
    }
}

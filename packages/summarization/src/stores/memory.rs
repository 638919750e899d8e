//! In-memory store for tests, examples, and single-process runs.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::HierarchyStore;
use crate::types::{HierarchyNode, NewNode, RunRecord, RunStatus};

/// Keeps hierarchies in process memory, in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    nodes: RwLock<IndexMap<Uuid, HierarchyNode>>,
    runs: RwLock<IndexMap<Uuid, RunRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything. Handy between test cases sharing a store.
    pub fn clear(&self) {
        self.nodes.write().unwrap().clear();
        self.runs.write().unwrap().clear();
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().unwrap().len()
    }

    pub fn run_count(&self) -> usize {
        self.runs.read().unwrap().len()
    }

    /// Batch ids of recorded runs, oldest first.
    pub fn batch_ids(&self) -> Vec<Uuid> {
        self.runs.read().unwrap().keys().copied().collect()
    }
}

#[async_trait]
impl HierarchyStore for MemoryStore {
    async fn insert_node(&self, node: NewNode) -> StoreResult<HierarchyNode> {
        let node = node.into_node(Uuid::new_v4());
        self.nodes.write().unwrap().insert(node.id, node.clone());
        Ok(node)
    }

    async fn append_child(&self, parent_id: Uuid, child_id: Uuid) -> StoreResult<()> {
        let mut nodes = self.nodes.write().unwrap();
        let parent = nodes
            .get_mut(&parent_id)
            .ok_or(StoreError::NodeNotFound { id: parent_id })?;
        parent.child_ids.push(child_id);
        Ok(())
    }

    async fn set_summary(&self, id: Uuid, summary: &str) -> StoreResult<()> {
        let mut nodes = self.nodes.write().unwrap();
        let node = nodes.get_mut(&id).ok_or(StoreError::NodeNotFound { id })?;
        if node.summary.is_some() {
            return Err(StoreError::SummaryAlreadySet { id });
        }
        node.summary = Some(summary.to_string());
        Ok(())
    }

    async fn node(&self, id: Uuid) -> StoreResult<HierarchyNode> {
        self.nodes
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NodeNotFound { id })
    }

    async fn nodes_at_level(&self, batch_id: Uuid, level: i32) -> StoreResult<Vec<HierarchyNode>> {
        Ok(self
            .nodes
            .read()
            .unwrap()
            .values()
            .filter(|node| node.batch_id == batch_id && node.level == level)
            .cloned()
            .collect())
    }

    async fn create_run(&self, record: RunRecord) -> StoreResult<()> {
        self.runs.write().unwrap().insert(record.batch_id, record);
        Ok(())
    }

    async fn complete_run(
        &self,
        batch_id: Uuid,
        final_node_id: Uuid,
        hierarchy_depth: i32,
    ) -> StoreResult<()> {
        let mut runs = self.runs.write().unwrap();
        let run = runs
            .get_mut(&batch_id)
            .ok_or(StoreError::RunNotFound { batch_id })?;
        run.status = RunStatus::Completed;
        run.final_node_id = Some(final_node_id);
        run.hierarchy_depth = Some(hierarchy_depth);
        run.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn fail_run(&self, batch_id: Uuid, error: &str) -> StoreResult<()> {
        let mut runs = self.runs.write().unwrap();
        let run = runs
            .get_mut(&batch_id)
            .ok_or(StoreError::RunNotFound { batch_id })?;
        run.status = RunStatus::Failed;
        run.error = Some(error.to_string());
        run.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn run(&self, batch_id: Uuid) -> StoreResult<RunRecord> {
        self.runs
            .read()
            .unwrap()
            .get(&batch_id)
            .cloned()
            .ok_or(StoreError::RunNotFound { batch_id })
    }
}

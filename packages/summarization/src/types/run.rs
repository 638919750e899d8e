//! Run records and outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// Persistent record of one summarization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub batch_id: Uuid,
    pub status: RunStatus,
    pub document_count: i64,
    /// Root of the hierarchy once the run completes.
    pub final_node_id: Option<Uuid>,
    /// Hierarchy level of the final node.
    pub hierarchy_depth: Option<i32>,
    /// Failure description when the run ends in `Failed`.
    pub error: Option<String>,
    /// Hash of the effective prompt configuration, kept so reruns can be
    /// checked against the prompts that produced earlier output.
    pub prompt_hash: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn new(batch_id: Uuid, document_count: usize, prompt_hash: impl Into<String>) -> Self {
        Self {
            batch_id,
            status: RunStatus::Running,
            document_count: document_count as i64,
            final_node_id: None,
            hierarchy_depth: None,
            error: None,
            prompt_hash: Some(prompt_hash.into()),
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// What a completed run hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Payload of the hierarchy root.
    pub final_summary: String,
    pub batch_id: Uuid,
    /// Hierarchy level of the root node.
    pub hierarchy_depth: i32,
    /// Nodes created during the run, source documents included.
    pub node_count: usize,
}

//! Hierarchy node and source document types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::text::estimate_tokens;

/// Metadata key carrying the human-readable name of a node's source.
pub const SOURCE_NAME_KEY: &str = "source_name";

/// What role a node plays in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A verbatim input document at level 0.
    Source,
    /// A sentence-bounded slice of an oversized node.
    Chunk,
    /// Several sibling payloads concatenated without model involvement.
    Batch,
    /// A model-produced condensation of one or more nodes.
    Summary,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Source => "source",
            NodeKind::Chunk => "chunk",
            NodeKind::Batch => "batch",
            NodeKind::Summary => "summary",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(NodeKind::Source),
            "chunk" => Ok(NodeKind::Chunk),
            "batch" => Ok(NodeKind::Batch),
            "summary" => Ok(NodeKind::Summary),
            other => Err(format!("unknown node kind: {other}")),
        }
    }
}

/// One node in a summarization hierarchy.
///
/// Level 0 holds the source documents verbatim; every level above it
/// condenses the level below. `content` is the text the node carries
/// itself (document, chunk slice, or concatenated batch) and `summary`
/// is the model condensation once one has been produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub id: Uuid,
    /// Run this node belongs to.
    pub batch_id: Uuid,
    /// Hierarchy level; 0 for source documents.
    pub level: i32,
    pub kind: NodeKind,
    pub content: String,
    /// Model-produced condensation. Set at most once.
    pub summary: Option<String>,
    pub parent_id: Option<Uuid>,
    /// Nodes one level down that this one condenses. Fixed at insert.
    pub source_ids: Vec<Uuid>,
    /// Nodes derived from this one, in creation order.
    pub child_ids: Vec<Uuid>,
    /// Estimated tokens, fixed when the node is created.
    pub token_count: i64,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl HierarchyNode {
    /// Text this node contributes to the level above: the summary once
    /// set, otherwise the raw content.
    pub fn payload(&self) -> &str {
        self.summary.as_deref().unwrap_or(&self.content)
    }
}

/// Insert payload for a hierarchy node. The store assigns the id and
/// creation timestamp.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub batch_id: Uuid,
    pub level: i32,
    pub kind: NodeKind,
    pub content: String,
    pub summary: Option<String>,
    pub parent_id: Option<Uuid>,
    pub source_ids: Vec<Uuid>,
    pub token_count: i64,
    pub metadata: HashMap<String, String>,
}

impl NewNode {
    pub fn new(batch_id: Uuid, level: i32, kind: NodeKind, content: impl Into<String>) -> Self {
        let content = content.into();
        let token_count = estimate_tokens(&content) as i64;
        Self {
            batch_id,
            level,
            kind,
            content,
            summary: None,
            parent_id: None,
            source_ids: Vec::new(),
            token_count,
            metadata: HashMap::new(),
        }
    }

    /// Attach a summary. The token count follows the summary because
    /// that is the text that flows upward.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        let summary = summary.into();
        self.token_count = estimate_tokens(&summary) as i64;
        self.summary = Some(summary);
        self
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_source_ids(mut self, source_ids: Vec<Uuid>) -> Self {
        self.source_ids = source_ids;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Materialize the node under a store-assigned id.
    pub fn into_node(self, id: Uuid) -> HierarchyNode {
        HierarchyNode {
            id,
            batch_id: self.batch_id,
            level: self.level,
            kind: self.kind,
            content: self.content,
            summary: self.summary,
            parent_id: self.parent_id,
            source_ids: self.source_ids,
            child_ids: Vec::new(),
            token_count: self.token_count,
            metadata: self.metadata,
            created_at: Utc::now(),
        }
    }
}

/// An input document handed to the summarizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

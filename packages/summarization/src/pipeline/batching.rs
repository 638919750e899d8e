//! Greedy batch planning over one level of the hierarchy.

use crate::types::HierarchyNode;

/// One unit of work at a level: a group whose estimates fit the content
/// budget together, or a single node too large for any group.
#[derive(Debug)]
pub enum BatchPlan {
    Group(Vec<HierarchyNode>),
    Oversized(Box<HierarchyNode>),
}

/// Pack nodes into budget-sized groups, preserving creation order.
///
/// Nodes are taken greedily; a node whose own estimate exceeds the
/// budget is isolated as `Oversized` so the caller can chunk it instead
/// of batching it.
pub fn plan_batches(nodes: Vec<HierarchyNode>, content_budget: usize) -> Vec<BatchPlan> {
    let mut plans = Vec::new();
    let mut group: Vec<HierarchyNode> = Vec::new();
    let mut group_tokens = 0usize;

    for node in nodes {
        let tokens = node.token_count.max(0) as usize;

        if tokens > content_budget {
            if !group.is_empty() {
                plans.push(BatchPlan::Group(std::mem::take(&mut group)));
                group_tokens = 0;
            }
            plans.push(BatchPlan::Oversized(Box::new(node)));
            continue;
        }

        if !group.is_empty() && group_tokens + tokens > content_budget {
            plans.push(BatchPlan::Group(std::mem::take(&mut group)));
            group_tokens = 0;
        }
        group_tokens += tokens;
        group.push(node);
    }

    if !group.is_empty() {
        plans.push(BatchPlan::Group(group));
    }
    plans
}

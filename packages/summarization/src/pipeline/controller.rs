//! The summarization controller: index documents at level 0, then
//! reduce level by level until a single node remains.

use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ModelError, Result, SummarizationError, ValidationError};
use crate::pipeline::batching::{plan_batches, BatchPlan};
use crate::pipeline::prompts;
use crate::resilience::Resilience;
use crate::text::split_into_chunks;
use crate::traits::{CompletionRequest, HierarchyStore, LanguageModel};
use crate::types::{
    HierarchyNode, NewNode, NodeKind, ResilienceConfig, RunOutcome, RunRecord, SourceDocument,
    SummarizeConfig, SOURCE_NAME_KEY,
};

/// Drives hierarchical summarization over a store and a model.
///
/// The first reduction (level 0 to 1) is structural: source documents
/// are batched by concatenation or chunked, never sent to the model, so
/// a flaky endpoint cannot lose source text. Model calls begin with the
/// reduction from level 1 upward and all pass through one shared
/// [`Resilience`] stack.
pub struct Summarizer<S, M> {
    store: S,
    model: M,
    resilience: Resilience,
    config: SummarizeConfig,
}

impl<S, M> Summarizer<S, M>
where
    S: HierarchyStore,
    M: LanguageModel,
{
    pub fn new(store: S, model: M) -> Self {
        Self {
            store,
            model,
            resilience: Resilience::default(),
            config: SummarizeConfig::default(),
        }
    }

    pub fn with_config(
        store: S,
        model: M,
        config: SummarizeConfig,
        resilience: ResilienceConfig,
    ) -> std::result::Result<Self, ValidationError> {
        let resilience = Resilience::new(&resilience)?;
        Ok(Self {
            store,
            model,
            resilience,
            config,
        })
    }

    pub fn config(&self) -> &SummarizeConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SummarizeConfig {
        &mut self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn resilience(&self) -> &Resilience {
        &self.resilience
    }

    /// Summarize `documents` down to a single root node.
    pub async fn run(&self, documents: &[SourceDocument]) -> Result<RunOutcome> {
        let content_budget = self.validate(documents)?;
        let batch_id = self.start_run(documents).await?;
        let result = self
            .reduce_to_root(batch_id, documents, content_budget)
            .await;
        self.finish_run(batch_id, result).await
    }

    /// Like [`Summarizer::run`], but abandons the run when `cancel`
    /// fires. The run record is marked failed; nodes created so far stay
    /// queryable.
    pub async fn run_with_cancel(
        &self,
        documents: &[SourceDocument],
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let content_budget = self.validate(documents)?;
        let batch_id = self.start_run(documents).await?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(%batch_id, "summarization run cancelled");
                if let Err(store_error) = self.store.fail_run(batch_id, "cancelled").await {
                    warn!(%batch_id, error = %store_error, "failed to record cancellation");
                }
                Err(SummarizationError::Cancelled)
            }
            result = self.reduce_to_root(batch_id, documents, content_budget) => {
                self.finish_run(batch_id, result).await
            }
        }
    }

    async fn start_run(&self, documents: &[SourceDocument]) -> Result<Uuid> {
        let batch_id = Uuid::new_v4();
        let record = RunRecord::new(
            batch_id,
            documents.len(),
            prompts::prompt_hash(&self.config),
        );
        self.store.create_run(record).await?;
        info!(%batch_id, documents = documents.len(), "summarization run started");
        Ok(batch_id)
    }

    async fn finish_run(
        &self,
        batch_id: Uuid,
        result: Result<(HierarchyNode, usize)>,
    ) -> Result<RunOutcome> {
        match result {
            Ok((final_node, node_count)) => {
                self.store
                    .complete_run(batch_id, final_node.id, final_node.level)
                    .await?;
                info!(
                    %batch_id,
                    depth = final_node.level,
                    nodes = node_count,
                    "summarization run completed"
                );
                Ok(RunOutcome {
                    final_summary: final_node.payload().to_string(),
                    batch_id,
                    hierarchy_depth: final_node.level,
                    node_count,
                })
            }
            Err(error) => {
                warn!(%batch_id, error = %error, "summarization run failed");
                if let Err(store_error) = self.store.fail_run(batch_id, &error.to_string()).await {
                    warn!(%batch_id, error = %store_error, "failed to record run failure");
                }
                Err(error)
            }
        }
    }

    fn validate(&self, documents: &[SourceDocument]) -> std::result::Result<usize, ValidationError> {
        self.config.validate()?;
        if documents.is_empty() {
            return Err(ValidationError::NoDocuments);
        }
        for document in documents {
            if document.content.trim().is_empty() {
                return Err(ValidationError::EmptyDocument {
                    name: document.name.clone(),
                });
            }
        }
        prompts::content_token_budget(&self.config).ok_or(ValidationError::NoContentBudget {
            prompt_tokens: prompts::prompt_token_overhead(&self.config),
            safety_margin: self.config.safety_margin_tokens,
            max_batch_tokens: self.config.max_batch_tokens,
        })
    }

    async fn reduce_to_root(
        &self,
        batch_id: Uuid,
        documents: &[SourceDocument],
        content_budget: usize,
    ) -> Result<(HierarchyNode, usize)> {
        let started = Instant::now();
        let mut node_count = 0usize;

        for document in documents {
            let mut node = NewNode::new(batch_id, 0, NodeKind::Source, document.content.as_str());
            for (key, value) in &document.metadata {
                node = node.with_metadata(key.as_str(), value.as_str());
            }
            let node = node.with_metadata(SOURCE_NAME_KEY, document.name.as_str());
            self.store.insert_node(node).await?;
            node_count += 1;
        }
        debug!(%batch_id, documents = documents.len(), "indexed source documents");

        let mut level = 0;
        loop {
            self.check_run_timeout(started)?;
            if level > self.config.max_depth {
                return Err(SummarizationError::MaxDepthExceeded {
                    level,
                    max_depth: self.config.max_depth,
                });
            }

            let mut nodes = self.store.nodes_at_level(batch_id, level).await?;
            if nodes.is_empty() {
                return Err(SummarizationError::NonConvergence {
                    level,
                    detail: "no nodes at level".to_string(),
                });
            }

            if nodes.len() == 1 && nodes[0].summary.is_some() {
                let node = nodes.remove(0);
                debug!(%batch_id, level, "hierarchy converged");
                return Ok((node, node_count));
            }

            if nodes.len() == 1 && (nodes[0].token_count.max(0) as usize) <= content_budget {
                // One unsummarized node that fits a single call: summarize
                // it in place and promote the result one level up, where
                // the next iteration converges on it.
                let node = nodes.remove(0);
                let summary = self.summarize_text(level + 1, node.payload()).await?;
                self.store.set_summary(node.id, &summary).await?;
                let promoted = NewNode::new(batch_id, level + 1, NodeKind::Summary, "")
                    .with_summary(summary)
                    .with_parent(node.id)
                    .with_source_ids(vec![node.id]);
                let inserted = self.store.insert_node(promoted).await?;
                self.store.append_child(node.id, inserted.id).await?;
                node_count += 1;
                level += 1;
                continue;
            }

            let prev_count = nodes.len();
            let prev_tokens: usize = nodes.iter().map(|n| n.token_count.max(0) as usize).sum();
            let next_level = level + 1;

            let plans = plan_batches(nodes, content_budget);
            debug!(%batch_id, level, batches = plans.len(), "planned level reduction");

            let mut created = 0usize;
            if level == 0 {
                for plan in plans {
                    created += match plan {
                        BatchPlan::Group(group) => {
                            self.combine_batch(batch_id, next_level, group).await?
                        }
                        BatchPlan::Oversized(node) => {
                            self.chunk_node(batch_id, next_level, *node, content_budget)
                                .await?
                        }
                    };
                }
            } else {
                let mut groups = Vec::new();
                for plan in plans {
                    match plan {
                        BatchPlan::Group(group) => groups.push(group),
                        BatchPlan::Oversized(node) => {
                            created += self
                                .chunk_node(batch_id, next_level, *node, content_budget)
                                .await?
                        }
                    }
                }

                // Model calls run concurrently under the shared pacer;
                // results are applied in batch order so node creation
                // order stays deterministic.
                let bodies: Vec<String> = groups.iter().map(|group| labeled_payloads(group)).collect();
                let summaries =
                    join_all(bodies.iter().map(|body| self.summarize_text(next_level, body)))
                        .await;
                for (group, summary) in groups.into_iter().zip(summaries) {
                    let summary = summary?;
                    self.insert_summary_node(batch_id, next_level, group, summary)
                        .await?;
                    created += 1;
                }
            }

            node_count += created;

            // The audit starts with the second reduction; level-1 chunk
            // expansion may legitimately grow the node count.
            if next_level >= 2 {
                let new_nodes = self.store.nodes_at_level(batch_id, next_level).await?;
                let new_tokens: usize =
                    new_nodes.iter().map(|n| n.token_count.max(0) as usize).sum();
                if new_nodes.len() >= prev_count && new_tokens as f64 >= 0.9 * prev_tokens as f64 {
                    return Err(SummarizationError::NonConvergence {
                        level: next_level,
                        detail: format!(
                            "{prev_count} nodes ({prev_tokens} tokens) became {} nodes ({new_tokens} tokens)",
                            new_nodes.len()
                        ),
                    });
                }
            }

            debug!(%batch_id, level, created, "level reduced");
            level = next_level;
        }
    }

    /// Merge a level-0 group into one `Batch` node. Structural: payloads
    /// are concatenated under source labels, with no model call.
    async fn combine_batch(
        &self,
        batch_id: Uuid,
        level: i32,
        group: Vec<HierarchyNode>,
    ) -> Result<usize> {
        let content = labeled_payloads(&group);
        let mut node = NewNode::new(batch_id, level, NodeKind::Batch, content)
            .with_source_ids(member_ids(&group));
        if group.len() == 1 {
            node = node.with_parent(group[0].id);
        }
        let inserted = self.store.insert_node(node).await?;
        for member in &group {
            self.store.append_child(member.id, inserted.id).await?;
        }
        Ok(1)
    }

    /// Split one oversized node into sentence-bounded chunks at the next
    /// level. Structural, no model call; the chunks are summarized on
    /// the following pass.
    async fn chunk_node(
        &self,
        batch_id: Uuid,
        level: i32,
        node: HierarchyNode,
        content_budget: usize,
    ) -> Result<usize> {
        let chunks = split_into_chunks(
            node.payload(),
            content_budget,
            self.config.chunk_overlap_tokens,
        );
        debug!(node_id = %node.id, parts = chunks.len(), "chunked oversized node");

        let source_ids = vec![node.id];
        let name = node.metadata.get(SOURCE_NAME_KEY).cloned();
        let mut created = 0;
        for (index, chunk) in chunks.into_iter().enumerate() {
            let mut new_node = NewNode::new(batch_id, level, NodeKind::Chunk, chunk)
                .with_parent(node.id)
                .with_source_ids(source_ids.clone())
                .with_metadata("chunk_index", index.to_string());
            if let Some(name) = &name {
                new_node =
                    new_node.with_metadata(SOURCE_NAME_KEY, format!("{} (part {})", name, index + 1));
            }
            let inserted = self.store.insert_node(new_node).await?;
            self.store.append_child(node.id, inserted.id).await?;
            created += 1;
        }
        Ok(created)
    }

    async fn insert_summary_node(
        &self,
        batch_id: Uuid,
        level: i32,
        group: Vec<HierarchyNode>,
        summary: String,
    ) -> Result<()> {
        let mut node = NewNode::new(batch_id, level, NodeKind::Summary, "")
            .with_summary(summary)
            .with_source_ids(member_ids(&group));
        if group.len() == 1 {
            node = node.with_parent(group[0].id);
        }
        let inserted = self.store.insert_node(node).await?;
        for member in &group {
            self.store.append_child(member.id, inserted.id).await?;
        }
        Ok(())
    }

    /// One condensation call through the resilience stack. Output at
    /// least 80% the length of the user content counts as a failed
    /// reduction and is retried like a transient fault.
    async fn summarize_text(&self, target_level: i32, body: &str) -> Result<String> {
        let user = prompts::format_user_content(&self.config, body);
        let request = CompletionRequest::new(prompts::resolved_system_prompt(&self.config), user)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_summary_tokens);

        let outcome = self
            .resilience
            .execute(|| {
                let request = request.clone();
                async move {
                    let raw = self.model.invoke(&request).await?;
                    let text = crate::model::completion_text(&raw)?;
                    let input_chars = request.user.len();
                    if text.len() as f64 >= 0.8 * input_chars as f64 {
                        return Err(ModelError::NonReducing {
                            input_chars,
                            output_chars: text.len(),
                        });
                    }
                    Ok(text)
                }
            })
            .await;

        match outcome {
            Ok(text) => Ok(text),
            Err(ModelError::NonReducing {
                input_chars,
                output_chars,
            }) => Err(SummarizationError::NonConvergence {
                level: target_level,
                detail: format!(
                    "summary of {output_chars} chars did not reduce {input_chars}-char input"
                ),
            }),
            Err(error) => Err(SummarizationError::Model(error)),
        }
    }

    fn check_run_timeout(&self, started: Instant) -> Result<()> {
        let elapsed = started.elapsed();
        let limit = Duration::from_millis(self.config.run_timeout_ms);
        if elapsed > limit {
            return Err(SummarizationError::Timeout {
                elapsed_ms: elapsed.as_millis() as u64,
                limit_ms: self.config.run_timeout_ms,
            });
        }
        Ok(())
    }
}

/// Payloads of a group joined for prompting, labeled by source name when
/// there is more than one member.
fn labeled_payloads(group: &[HierarchyNode]) -> String {
    let parts: Vec<(String, String)> = group
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let name = node
                .metadata
                .get(SOURCE_NAME_KEY)
                .cloned()
                .unwrap_or_else(|| format!("Part {}", i + 1));
            (name, node.payload().to_string())
        })
        .collect();
    prompts::label_sources(&parts)
}

/// Ids a derived node records as its `source_ids`: the group members it
/// condenses, all one level below it.
fn member_ids(group: &[HierarchyNode]) -> Vec<Uuid> {
    group.iter().map(|node| node.id).collect()
}

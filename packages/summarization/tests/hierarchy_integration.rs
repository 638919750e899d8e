//! Integration tests for the full reduction loop.
//!
//! These tests drive complete runs through the public API:
//! 1. Index documents at level 0
//! 2. Batch or chunk into level 1 without model calls
//! 3. Summarize level by level through the resilience stack
//! 4. Converge on a single root and record the run
//!
//! The mock model condenses to roughly three fifths of its input, so
//! multi-level hierarchies reduce without scripted responses.

use std::time::Duration;

use summarization::testing::MockModel;
use summarization::{
    estimate_tokens, HierarchyStore, MemoryStore, ModelError, NodeKind, ResilienceConfig,
    RunStatus, SourceDocument, SummarizationError, Summarizer, SummarizeConfig,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Resilience settings that keep tests fast: effectively no pacing,
/// millisecond backoff, one retry.
fn fast_resilience() -> ResilienceConfig {
    ResilienceConfig::new()
        .with_requests_per_minute(600_000)
        .with_initial_retry_delay_ms(1)
        .with_jitter_factor(0.0)
        .with_max_retries(1)
}

/// A small batch budget so a handful of medium documents already needs
/// several batches and several reduction levels.
fn small_batch_config() -> SummarizeConfig {
    SummarizeConfig::new()
        .with_max_batch_tokens(512)
        .with_safety_margin_tokens(50)
}

/// A document of `sentences` short sentences, about 13 tokens each.
fn corpus_doc(name: &str, sentences: usize) -> SourceDocument {
    let text = (0..sentences)
        .map(|i| format!("Observation {i}: the relay station logged a nominal reading."))
        .collect::<Vec<_>>()
        .join(" ");
    SourceDocument::new(name, text)
}

fn summarizer(
    model: MockModel,
    config: SummarizeConfig,
) -> Summarizer<MemoryStore, MockModel> {
    Summarizer::with_config(MemoryStore::new(), model, config, fast_resilience()).unwrap()
}

#[tokio::test]
async fn test_corpus_reduces_to_single_root() {
    let model = MockModel::new();
    let engine = summarizer(model.clone(), small_batch_config());
    let docs: Vec<SourceDocument> = (0..5).map(|i| corpus_doc(&format!("doc-{i}.txt"), 10)).collect();

    let outcome = engine.run(&docs).await.unwrap();

    assert!(!outcome.final_summary.is_empty());
    assert!(outcome.hierarchy_depth >= 2);
    assert_eq!(outcome.node_count, engine.store().node_count());
    assert!(model.call_count() >= 1);

    let record = engine.store().run(outcome.batch_id).await.unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.document_count, 5);
    assert_eq!(record.hierarchy_depth, Some(outcome.hierarchy_depth));
    assert!(record.prompt_hash.is_some());
    assert!(record.finished_at.is_some());

    // The recorded root carries the returned summary.
    let root = engine.store().node(record.final_node_id.unwrap()).await.unwrap();
    assert_eq!(root.level, outcome.hierarchy_depth);
    assert_eq!(root.kind, NodeKind::Summary);
    assert_eq!(root.payload(), outcome.final_summary);

    // Level 0 holds exactly the sources, every one wired into the tree.
    let sources = engine.store().nodes_at_level(outcome.batch_id, 0).await.unwrap();
    assert_eq!(sources.len(), 5);
    for source in &sources {
        assert_eq!(source.kind, NodeKind::Source);
        assert!(!source.child_ids.is_empty());
    }

    // Level 1 was built structurally, without the model.
    let level_one = engine.store().nodes_at_level(outcome.batch_id, 1).await.unwrap();
    assert!(level_one.iter().all(|n| n.kind == NodeKind::Batch));

    // The root really condensed the corpus.
    let source_tokens: i64 = sources.iter().map(|n| n.token_count).sum();
    assert!(root.token_count < source_tokens);

    // Every summary names its immediate contributors, one level down,
    // and carries fewer tokens than they do together.
    for level in 2..=outcome.hierarchy_depth {
        let nodes = engine.store().nodes_at_level(outcome.batch_id, level).await.unwrap();
        for node in nodes.iter().filter(|n| n.kind == NodeKind::Summary) {
            assert!(!node.source_ids.is_empty());
            let mut contributor_tokens = 0i64;
            for contributor_id in &node.source_ids {
                let contributor = engine.store().node(*contributor_id).await.unwrap();
                assert_eq!(contributor.level, level - 1);
                contributor_tokens += contributor.token_count;
            }
            assert!(
                node.token_count < contributor_tokens,
                "summary at level {level} holds {} tokens against {contributor_tokens} contributed",
                node.token_count
            );
        }
    }

    // Following source ids downward from the root recovers the corpus.
    let mut frontier = vec![root.id];
    let mut reached = Vec::new();
    while let Some(id) = frontier.pop() {
        let node = engine.store().node(id).await.unwrap();
        if node.level == 0 {
            reached.push(node.id);
        } else {
            frontier.extend(node.source_ids.iter().copied());
        }
    }
    reached.sort();
    reached.dedup();
    let mut expected: Vec<Uuid> = sources.iter().map(|n| n.id).collect();
    expected.sort();
    assert_eq!(reached, expected);
}

#[tokio::test]
async fn test_tiny_corpus_needs_one_model_call() {
    let model = MockModel::new();
    let engine = summarizer(model.clone(), SummarizeConfig::new());
    let docs = vec![
        corpus_doc("alpha.txt", 2),
        corpus_doc("beta.txt", 2),
        corpus_doc("gamma.txt", 2),
    ];

    let outcome = engine.run(&docs).await.unwrap();

    // Everything fits one batch: three sources, one batch node, one
    // promoted summary, one call.
    assert_eq!(outcome.hierarchy_depth, 2);
    assert_eq!(outcome.node_count, 5);
    assert_eq!(model.call_count(), 1);

    let level_one = engine.store().nodes_at_level(outcome.batch_id, 1).await.unwrap();
    let batch = &level_one[0];
    assert_eq!(batch.kind, NodeKind::Batch);
    assert!(batch.summary.is_some());
    // Summarizing the batch in place does not disturb the token count of
    // its concatenated content.
    assert_eq!(batch.token_count, estimate_tokens(&batch.content) as i64);
    assert!(batch.content.contains("[Source 1: alpha.txt]"));
    assert!(batch.content.contains("[Source 3: gamma.txt]"));

    let level_two = engine.store().nodes_at_level(outcome.batch_id, 2).await.unwrap();
    let root = &level_two[0];
    assert_eq!(root.kind, NodeKind::Summary);
    assert_eq!(root.parent_id, Some(batch.id));
    assert_eq!(batch.child_ids, vec![root.id]);
    // The root names the batch node it condensed; the batch names the
    // documents it concatenated.
    assert_eq!(root.source_ids, vec![batch.id]);

    let sources = engine.store().nodes_at_level(outcome.batch_id, 0).await.unwrap();
    assert_eq!(batch.source_ids.len(), 3);
    for source in &sources {
        assert_eq!(source.child_ids, vec![batch.id]);
        assert!(batch.source_ids.contains(&source.id));
    }

    // Trait-level navigation agrees with the outcome.
    let final_summary = engine.store().final_summary(outcome.batch_id).await.unwrap();
    assert_eq!(final_summary.as_deref(), Some(outcome.final_summary.as_str()));
    let derived = engine.store().children_of(batch.id).await.unwrap();
    assert_eq!(derived.len(), 1);
    assert_eq!(derived[0].id, root.id);
}

#[tokio::test]
async fn test_oversized_document_is_chunked_then_summarized() {
    let model = MockModel::new();
    let config = small_batch_config();
    let budget =
        summarization::pipeline::prompts::content_token_budget(&config).unwrap() as i64;
    let engine = summarizer(model.clone(), config);

    // One document several times larger than the batch budget.
    let docs = vec![corpus_doc("long_report.txt", 430)];
    let outcome = engine.run(&docs).await.unwrap();

    let chunks = engine.store().nodes_at_level(outcome.batch_id, 1).await.unwrap();
    assert!(chunks.len() >= 3);
    let level_zero = engine.store().nodes_at_level(outcome.batch_id, 0).await.unwrap();
    let source = &level_zero[0];
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.kind, NodeKind::Chunk);
        assert!(chunk.token_count <= budget);
        assert_eq!(chunk.parent_id, Some(source.id));
        assert_eq!(chunk.source_ids, vec![source.id]);
        assert_eq!(chunk.metadata.get("chunk_index"), Some(&i.to_string()));
        assert_eq!(
            chunk.metadata.get("source_name"),
            Some(&format!("long_report.txt (part {})", i + 1))
        );
    }
    assert_eq!(source.child_ids.len(), chunks.len());

    assert!(outcome.hierarchy_depth >= 2);
    assert!(!outcome.final_summary.is_empty());
}

#[tokio::test]
async fn test_echo_model_fails_non_convergence() {
    let model = MockModel::new().with_echo();
    let engine = summarizer(model.clone(), SummarizeConfig::new());
    let docs = vec![corpus_doc("a.txt", 3), corpus_doc("b.txt", 3)];

    match engine.run(&docs).await {
        Err(SummarizationError::NonConvergence { level, .. }) => assert_eq!(level, 2),
        other => panic!("expected NonConvergence, got {other:?}"),
    }

    // The quality failure was retried once before giving up.
    assert_eq!(model.call_count(), 2);

    let record = engine.store().run(first_batch_id(engine.store())).await.unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.error.unwrap().contains("converging"));
}

#[tokio::test]
async fn test_transport_failure_opens_circuit_for_next_run() {
    let model = MockModel::new().with_fail_first(10);
    let resilience = fast_resilience().with_failure_threshold(1);
    let engine = Summarizer::with_config(
        MemoryStore::new(),
        model.clone(),
        SummarizeConfig::new(),
        resilience,
    )
    .unwrap();
    let docs = vec![corpus_doc("a.txt", 3), corpus_doc("b.txt", 3)];

    match engine.run(&docs).await {
        Err(SummarizationError::Model(ModelError::Transport(_))) => {}
        other => panic!("expected transport failure, got {other:?}"),
    }
    // Initial attempt plus one retry, and the structural nodes survive
    // the failed run.
    assert_eq!(model.call_count(), 2);
    let batch_id = first_batch_id(engine.store());
    assert_eq!(engine.store().nodes_at_level(batch_id, 0).await.unwrap().len(), 2);
    assert_eq!(engine.store().nodes_at_level(batch_id, 1).await.unwrap().len(), 1);
    assert_eq!(
        engine.store().run(batch_id).await.unwrap().status,
        RunStatus::Failed
    );

    // The breaker tripped on the exhausted sequence, so the next run is
    // rejected before the model sees it.
    match engine.run(&docs).await {
        Err(SummarizationError::Model(ModelError::CircuitOpen { retry_after_ms })) => {
            assert!(retry_after_ms > 0);
        }
        other => panic!("expected CircuitOpen, got {other:?}"),
    }
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let engine = summarizer(MockModel::new(), SummarizeConfig::new());
    let docs = vec![corpus_doc("a.txt", 3)];

    let cancel = CancellationToken::new();
    cancel.cancel();

    match engine.run_with_cancel(&docs, cancel).await {
        Err(SummarizationError::Cancelled) => {}
        other => panic!("expected Cancelled, got {other:?}"),
    }

    let record = engine.store().run(first_batch_id(engine.store())).await.unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("cancelled"));
}

#[tokio::test]
async fn test_scripted_summaries_reach_the_root() {
    let model = MockModel::new().with_response("All observations were nominal.");
    let engine = summarizer(model.clone(), SummarizeConfig::new());
    let docs = vec![corpus_doc("a.txt", 4), corpus_doc("b.txt", 4)];

    let outcome = engine.run(&docs).await.unwrap();

    assert_eq!(outcome.final_summary, "All observations were nominal.");
    assert_eq!(model.call_count(), 1);
    let calls = model.calls();
    let request = &calls[0];
    assert!(request.user.contains("[Source 1: a.txt]"));
    assert_eq!(request.max_tokens, engine.config().max_summary_tokens);
}

#[tokio::test]
async fn test_slow_model_hits_request_timeout() {
    let model = MockModel::new().with_latency(Duration::from_secs(2));
    let resilience = fast_resilience().with_request_timeout_ms(20);
    let engine = Summarizer::with_config(
        MemoryStore::new(),
        model,
        SummarizeConfig::new(),
        resilience,
    )
    .unwrap();
    let docs = vec![corpus_doc("a.txt", 3)];

    match engine.run(&docs).await {
        Err(SummarizationError::Model(ModelError::Timeout { elapsed_ms })) => {
            assert_eq!(elapsed_ms, 20);
        }
        other => panic!("expected request timeout, got {other:?}"),
    }
}

fn first_batch_id(store: &MemoryStore) -> Uuid {
    store.batch_ids()[0]
}

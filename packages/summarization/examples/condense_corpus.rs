//! Condense a small corpus into one summary and walk the hierarchy.
//!
//! By default this runs fully offline against the bundled mock model.
//! Point it at a real OpenAI-compatible endpoint instead by setting:
//!
//! ```bash
//! export SUMMARIZER_BASE_URL=https://api.openai.com/v1
//! export SUMMARIZER_API_KEY=sk-...
//! export SUMMARIZER_MODEL=gpt-4o-mini   # optional
//! cargo run --example condense_corpus
//! ```

use std::error::Error;

use summarization::model::http::BASE_URL_ENV;
use summarization::testing::MockModel;
use summarization::{
    HierarchyStore, HttpModel, LanguageModel, MemoryStore, ResilienceConfig, SourceDocument,
    Summarizer, SummarizeConfig,
};

fn corpus() -> Vec<SourceDocument> {
    vec![
        SourceDocument::new(
            "minutes-march.txt",
            "The park committee met on March 4th. Dr. Alvarez reported that the east \
             trail repairs are 80% complete and should finish by April. The budget \
             stands at $12,400 after the fence replacement. Two volunteers were \
             recognized for leading weekend cleanups. The committee voted 5 to 1 to \
             extend summer hours until 9 p.m. starting Memorial Day.",
        ),
        SourceDocument::new(
            "minutes-april.txt",
            "The April meeting opened with the trail update: repairs finished ahead \
             of schedule and $800 under budget. Ms. Okafor proposed a native planting \
             program along the east trail, seconded and approved unanimously. The \
             treasurer flagged that the mower lease renews in June at a 6% increase. \
             Summer staffing was confirmed with two returning rangers.",
        ),
        SourceDocument::new(
            "survey-results.txt",
            "Of 214 park visitors surveyed in April, 78% rated trail conditions good \
             or excellent, up from 54% last fall. The most requested improvement was \
             shaded seating near the playground. 15% reported parking difficulties on \
             weekends. Respondents strongly supported extended summer hours.",
        ),
    ]
}

/// A batch budget small enough that even this corpus needs real batching.
fn demo_config() -> SummarizeConfig {
    SummarizeConfig::new()
        .with_max_batch_tokens(350)
        .with_safety_margin_tokens(50)
        .with_context_prompt("Park committee records, spring season.")
}

async fn condense<M: LanguageModel>(model: M) -> Result<(), Box<dyn Error>> {
    let config = demo_config();
    let resilience = ResilienceConfig::new().with_requests_per_minute(120);

    let engine = Summarizer::with_config(MemoryStore::new(), model, config, resilience)?;
    let outcome = engine.run(&corpus()).await?;

    println!("Final summary:");
    println!("{}", outcome.final_summary);
    println!();
    println!(
        "Hierarchy: {} nodes, {} levels deep",
        outcome.node_count, outcome.hierarchy_depth
    );

    // Walk the tree level by level to show what each pass produced.
    for level in 0..=outcome.hierarchy_depth {
        let nodes = engine.store().nodes_at_level(outcome.batch_id, level).await?;
        println!();
        println!("Level {level}:");
        for node in nodes {
            let preview: String = node.payload().chars().take(70).collect();
            println!(
                "  {:>7} {:>5} tokens  {}...",
                node.kind.to_string(),
                node.token_count,
                preview
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    if std::env::var(BASE_URL_ENV).is_ok() {
        println!("Using HTTP model from environment.");
        println!();
        condense(HttpModel::from_env()?).await
    } else {
        println!("No {BASE_URL_ENV} set; using the offline mock model.");
        println!();
        condense(MockModel::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use summarization::estimate_tokens;
    use summarization::pipeline::prompts::content_token_budget;

    #[test]
    fn test_corpus_overflows_one_batch() {
        let budget = content_token_budget(&demo_config()).unwrap();
        let total: usize = corpus()
            .iter()
            .map(|doc| estimate_tokens(&doc.content))
            .sum();
        assert!(
            total > budget,
            "corpus ({total} tokens) must overflow the {budget}-token budget \
             or the walk collapses to a single level"
        );
    }

    #[test]
    fn test_each_document_fits_a_batch() {
        let budget = content_token_budget(&demo_config()).unwrap();
        for doc in corpus() {
            let tokens = estimate_tokens(&doc.content);
            assert!(
                tokens <= budget,
                "document '{}' ({tokens} tokens) should batch, not chunk",
                doc.name
            );
        }
    }
}

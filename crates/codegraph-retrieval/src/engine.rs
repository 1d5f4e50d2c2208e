//! Pipeline orchestration: wires the stages together and guarantees that a
//! query always produces an outcome, however degraded.

use crate::deadline::Deadline;
use crate::entities::extract_entities;
use crate::expansion::{EmbeddingExpander, GraphTermExpander, MultiLevelExpander, QualityFilter};
use crate::graph::GraphExpander;
use crate::intent::IntentAnalyzer;
use crate::ranking::{NodeScorer, ReRankingService};
use crate::search::{ParallelSearchService, combine};
use codegraph_core::config::Config;
use codegraph_core::error::Error;
use codegraph_core::types::{
    IntentAnalysis, QueryExpansion, QueryIntent, RetrievalOutcome, SubGraph,
};
use codegraph_store::GraphStore;
use codegraph_store::embedding::build_embedding_provider;
use codegraph_store::text_model::build_text_model;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

pub struct RetrievalEngine {
    config: Config,
    intent: IntentAnalyzer,
    expander: MultiLevelExpander,
    quality: QualityFilter,
    search: ParallelSearchService,
    graph: GraphExpander,
    scorer: NodeScorer,
    reranker: ReRankingService,
}

impl RetrievalEngine {
    /// Build the full pipeline against one graph store. The embedding
    /// provider is shared by the expansion, search, and re-ranking stages.
    pub fn new(store: Arc<dyn GraphStore>, config: Config) -> Result<Self, Error> {
        config.validate()?;
        let provider = Arc::new(Mutex::new(build_embedding_provider(
            &config.models.embedding,
        )?));
        let text_model = build_text_model(&config.models.text);

        let embedding_expander = EmbeddingExpander::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            config.expansion.embedding_similarity_threshold,
            config.expansion.max_expansions_per_term,
        );
        let graph_expander = GraphTermExpander::new(
            Arc::clone(&store),
            config.expansion.graph_term_depth,
            config.expansion.max_expansions_per_term,
        );

        Ok(Self {
            intent: IntentAnalyzer::new(config.intent.clone(), text_model),
            expander: MultiLevelExpander::new(
                config.expansion.clone(),
                embedding_expander,
                graph_expander,
            ),
            quality: QualityFilter::new(config.expansion.clone()),
            search: ParallelSearchService::new(
                Arc::clone(&store),
                Arc::clone(&provider),
                config.search.clone(),
            ),
            graph: GraphExpander::new(Arc::clone(&store), config.graph.clone()),
            scorer: NodeScorer::new(config.scoring.clone()),
            reranker: ReRankingService::new(store, provider, config.rerank.clone()),
            config,
        })
    }

    /// Run the full pipeline for one query. Never fails: degenerate input
    /// and stage failures produce an explained, possibly empty outcome.
    pub fn retrieve(&self, query: &str) -> RetrievalOutcome {
        let started = Instant::now();
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return empty_outcome(query, "empty query");
        }
        let deadline = Deadline::from_millis(self.config.search.query_timeout_ms);

        let intent = self.intent.analyze(trimmed);
        let expansion = self.expander.expand(trimmed, &intent);
        let filtered =
            self.quality
                .filter(&expansion.all_terms, trimmed, intent.primary_intent);
        let entities = extract_entities(&filtered);

        let hits = self.search.search(trimmed, &entities, &deadline);
        let results = combine(&hits.lexical, &hits.vector, &self.config.search);

        let seed_ids: Vec<String> = results
            .iter()
            .map(|result| result.node_id.clone())
            .collect();
        let subgraph = self.graph.expand(&seed_ids);
        let scored = self.scorer.score(&subgraph, &results);
        let ranked = self.reranker.rerank(trimmed, &scored, &deadline);

        let mut metadata = BTreeMap::new();
        metadata.insert("intent".to_string(), intent.primary_intent.to_string());
        metadata.insert(
            "intent_confidence".to_string(),
            format!("{:.3}", intent.confidence),
        );
        metadata.insert(
            "expansion_terms".to_string(),
            expansion.all_terms.len().to_string(),
        );
        metadata.insert("filtered_terms".to_string(), filtered.len().to_string());
        metadata.insert("lexical_hits".to_string(), hits.lexical.len().to_string());
        metadata.insert("vector_hits".to_string(), hits.vector.len().to_string());
        metadata.insert("combined_results".to_string(), results.len().to_string());
        metadata.insert(
            "subgraph_nodes".to_string(),
            subgraph.nodes.len().to_string(),
        );
        metadata.insert("ranked_nodes".to_string(), ranked.len().to_string());
        metadata.insert(
            "elapsed_ms".to_string(),
            started.elapsed().as_millis().to_string(),
        );
        if deadline.expired() {
            metadata.insert("deadline_expired".to_string(), "true".to_string());
        }
        if ranked.is_empty() && results.is_empty() {
            metadata.insert(
                "outcome".to_string(),
                "no relevant results found".to_string(),
            );
        }

        info!(
            query = trimmed,
            intent = %intent.primary_intent,
            results = results.len(),
            ranked = ranked.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieval complete"
        );
        RetrievalOutcome {
            ranked,
            results,
            subgraph,
            intent,
            expansion,
            metadata,
        }
    }
}

fn empty_outcome(query: &str, reason: &str) -> RetrievalOutcome {
    debug!(query, reason, "short-circuiting to empty outcome");
    let mut metadata = BTreeMap::new();
    metadata.insert("reason".to_string(), reason.to_string());
    RetrievalOutcome {
        ranked: Vec::new(),
        results: Vec::new(),
        subgraph: SubGraph::empty_with_reason(reason),
        intent: IntentAnalysis {
            original_query: query.to_string(),
            primary_intent: QueryIntent::Discovery,
            secondary_intents: Vec::new(),
            intent_scores: BTreeMap::new(),
            contexts: BTreeMap::new(),
            confidence: 0.0,
        },
        expansion: QueryExpansion {
            original_query: query.to_string(),
            intent: QueryIntent::Discovery,
            all_terms: Vec::new(),
            high_confidence: Vec::new(),
            medium_confidence: Vec::new(),
            low_confidence: Vec::new(),
            level_counts: BTreeMap::new(),
        },
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_outcome_explains_itself() {
        let outcome = empty_outcome("", "empty query");
        assert!(outcome.ranked.is_empty());
        assert!(outcome.results.is_empty());
        assert!(outcome.subgraph.is_empty());
        assert_eq!(
            outcome.metadata.get("reason").map(String::as_str),
            Some("empty query")
        );
    }
}

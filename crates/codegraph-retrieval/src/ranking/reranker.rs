//! Semantic re-ranking: cosine similarity between the query embedding and
//! each candidate node's precomputed embedding, with a text-overlap fallback
//! and an adaptive acceptance threshold.

use crate::deadline::Deadline;
use codegraph_core::config::RerankConfig;
use codegraph_core::error::StoreError;
use codegraph_core::types::{EntityKind, GraphNode, RankedNode, ScoredNode};
use codegraph_store::embedding::{EmbeddingProvider, cosine_similarity_or_zero};
use codegraph_store::{EmbeddingIndex, GraphStore};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

const GENERIC_QUERY_WORDS: &[&str] = &[
    "explain", "show", "find", "list", "what", "how", "does", "the", "tell", "about",
];

const SPECIFICITY_FLOOR: f64 = 0.5;
const SPECIFICITY_CEIL: f64 = 1.5;
const DISTRIBUTION_FLOOR: f64 = 0.3;
const DISTRIBUTION_CEIL: f64 = 1.2;
const NONZERO_FRACTION_WEIGHT: f64 = 0.7;
const TOP_QUALITY_WEIGHT: f64 = 0.3;

pub struct ReRankingService {
    store: Arc<dyn GraphStore>,
    provider: Arc<Mutex<Box<dyn EmbeddingProvider + Send>>>,
    config: RerankConfig,
}

impl ReRankingService {
    pub fn new(
        store: Arc<dyn GraphStore>,
        provider: Arc<Mutex<Box<dyn EmbeddingProvider + Send>>>,
        config: RerankConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Re-score the candidate nodes against the query. Candidates are
    /// processed in fixed-size batches; an expired deadline stops scoring
    /// and ranks whatever was scored so far.
    pub fn rerank(
        &self,
        query: &str,
        candidates: &[ScoredNode],
        deadline: &Deadline,
    ) -> Vec<RankedNode> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let query_vector = match self.embed(query) {
            Ok(vector) => Some(vector),
            Err(err) => {
                warn!(query, error = %err, "query embedding failed; fallback scoring only");
                None
            }
        };
        let query_terms = significant_terms(query);

        let mut ranked: Vec<RankedNode> = Vec::new();
        for batch in candidates.chunks(self.config.batch_size.max(1)) {
            if deadline.expired() {
                warn!(scored = ranked.len(), "deadline expired during re-ranking");
                break;
            }
            for candidate in batch {
                ranked.push(self.score_node(
                    &candidate.node,
                    query_vector.as_deref(),
                    &query_terms,
                ));
            }
        }

        let threshold = self.adaptive_threshold(query, &ranked);
        ranked.retain(|node| node.similarity_score >= threshold);
        ranked.sort_by(|left, right| {
            right
                .similarity_score
                .partial_cmp(&left.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| left.node.id.cmp(&right.node.id))
        });
        ranked.truncate(self.config.final_limit);
        debug!(query, kept = ranked.len(), threshold, "re-ranking complete");
        ranked
    }

    fn score_node(
        &self,
        node: &GraphNode,
        query_vector: Option<&[f32]>,
        query_terms: &[String],
    ) -> RankedNode {
        let description = self.describe(node);
        let embedding = query_vector.and_then(|_| self.lookup_embedding(node));

        let similarity = match (query_vector, embedding) {
            (Some(query_vector), Some(vector)) => {
                cosine_similarity_or_zero(query_vector, &vector).clamp(0.0, 1.0)
            }
            _ => {
                // No embedding available for this pair: fallback only.
                let score = self.fallback_score(&description, query_terms);
                return RankedNode {
                    node: node.clone(),
                    similarity_score: score,
                    description,
                };
            }
        };

        let score = if self.config.fallback_scoring_enabled
            && similarity < self.config.low_similarity_cutoff
        {
            // A weak embedding signal never drags the node below what plain
            // text overlap supports.
            similarity.max(self.fallback_score(&description, query_terms))
        } else {
            similarity
        };
        RankedNode {
            node: node.clone(),
            similarity_score: score,
            description,
        }
    }

    /// Type-specific embedding lookup; store failures degrade to None.
    fn lookup_embedding(&self, node: &GraphNode) -> Option<Vec<f32>> {
        let index = embedding_index_for(node.kind);
        match self.store.node_embedding(&node.id, index) {
            Ok(vector) => vector,
            Err(err) => {
                warn!(node = node.id, error = %err, "embedding lookup failed");
                None
            }
        }
    }

    /// Description fallback chain: stored description, then file-doc style
    /// content properties, then a summary synthesized from the node itself.
    fn describe(&self, node: &GraphNode) -> String {
        match self.store.node_description(&node.id) {
            Ok(Some(description)) if !description.trim().is_empty() => return description,
            Ok(_) => {}
            Err(err) => {
                warn!(node = node.id, error = %err, "description lookup failed");
            }
        }
        for key in ["description", "doc", "content"] {
            if let Some(text) = node.property_str(key) {
                if !text.trim().is_empty() {
                    return text.to_string();
                }
            }
        }
        synthesize_description(node)
    }

    fn fallback_score(&self, description: &str, query_terms: &[String]) -> f64 {
        let ratio = match_ratio(description, query_terms);
        (self.config.fallback_base_score + ratio * self.config.text_match_bonus).clamp(0.0, 1.0)
    }

    /// `base x querySpecificity x scoreDistribution`, clamped to the
    /// configured bounds.
    fn adaptive_threshold(&self, query: &str, ranked: &[RankedNode]) -> f64 {
        let specificity = query_specificity_factor(query);
        let distribution = score_distribution_factor(ranked);
        (self.config.base_threshold * specificity * distribution)
            .clamp(self.config.min_threshold, self.config.max_threshold)
    }

    fn embed(&self, query: &str) -> Result<Vec<f32>, StoreError> {
        let mut provider = self
            .provider
            .lock()
            .map_err(|_| StoreError::external("embedding provider mutex poisoned"))?;
        provider.embed(query)
    }
}

fn embedding_index_for(kind: EntityKind) -> EmbeddingIndex {
    match kind {
        EntityKind::Method => EmbeddingIndex::Method,
        EntityKind::Class | EntityKind::Interface | EntityKind::Enum | EntityKind::Package => {
            EmbeddingIndex::Class
        }
        EntityKind::FileDoc => EmbeddingIndex::FileDoc,
        EntityKind::Description | EntityKind::Other => EmbeddingIndex::Description,
    }
}

fn synthesize_description(node: &GraphNode) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.push(node.kind.as_str().to_string());
    if let Some(name) = node.name() {
        parts.push(name.to_string());
    }
    if let Some(signature) = node.property_str("signature") {
        parts.push(signature.to_string());
    }
    if let Some(class) = node.property_str("class") {
        parts.push(format!("in {class}"));
    }
    parts.join(" ")
}

/// Query terms worth matching literally: longer than two characters.
fn significant_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|token| token.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of significant query terms literally present in the description.
fn match_ratio(description: &str, query_terms: &[String]) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let description_lower = description.to_lowercase();
    let matched = query_terms
        .iter()
        .filter(|term| description_lower.contains(term.as_str()))
        .count();
    matched as f64 / query_terms.len() as f64
}

/// Rises with technical identifiers in the query, falls with generic words.
fn query_specificity_factor(query: &str) -> f64 {
    let mut technical = 0usize;
    let mut generic = 0usize;
    for token in query.split_whitespace() {
        let cleaned: String = token.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect();
        if cleaned.is_empty() {
            continue;
        }
        let lower = cleaned.to_lowercase();
        if GENERIC_QUERY_WORDS.contains(&lower.as_str()) {
            generic += 1;
        } else if looks_technical(&cleaned) {
            technical += 1;
        }
    }
    (1.0 + 0.15 * technical as f64 - 0.1 * generic as f64)
        .clamp(SPECIFICITY_FLOOR, SPECIFICITY_CEIL)
}

/// camelCase, snake_case, dotted paths, or long identifiers.
fn looks_technical(token: &str) -> bool {
    let mixed_case =
        token.chars().any(char::is_uppercase) && token.chars().any(char::is_lowercase);
    let has_hump = mixed_case && !token.chars().next().is_some_and(char::is_uppercase)
        || (mixed_case && token.chars().skip(1).any(char::is_uppercase));
    token.contains('_') || has_hump || token.len() >= 10
}

/// Combines the fraction of nonzero scores with the quality of the top
/// score.
fn score_distribution_factor(ranked: &[RankedNode]) -> f64 {
    if ranked.is_empty() {
        return DISTRIBUTION_FLOOR;
    }
    let nonzero = ranked.iter().filter(|node| node.similarity_score > 0.0).count();
    let nonzero_fraction = nonzero as f64 / ranked.len() as f64;
    let top_quality = ranked
        .iter()
        .map(|node| node.similarity_score)
        .fold(0.0_f64, f64::max)
        .clamp(0.0, 1.0);
    (NONZERO_FRACTION_WEIGHT * nonzero_fraction + TOP_QUALITY_WEIGHT * top_quality)
        .clamp(DISTRIBUTION_FLOOR, DISTRIBUTION_CEIL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::types::{GraphRelationship, RelatedTerm, SearchHit};
    use codegraph_store::LexicalScope;
    use codegraph_store::embedding::{DeterministicEmbedder, deterministic_embedding};
    use std::collections::BTreeMap;

    /// Serves embeddings and descriptions from in-memory maps.
    struct MapStore {
        embeddings: BTreeMap<String, Vec<f32>>,
        descriptions: BTreeMap<String, String>,
    }

    impl GraphStore for MapStore {
        fn fulltext_search(
            &self,
            _scope: LexicalScope,
            _terms: &[String],
            _limit: usize,
        ) -> Result<Vec<SearchHit>, StoreError> {
            Ok(Vec::new())
        }

        fn vector_search(
            &self,
            _index: EmbeddingIndex,
            _query: &[f32],
            _k: usize,
        ) -> Result<Vec<SearchHit>, StoreError> {
            Ok(Vec::new())
        }

        fn traverse(
            &self,
            _seed_ids: &[String],
            _relationship_types: &[String],
            _max_depth: usize,
            _max_nodes_per_hop: usize,
        ) -> Result<(Vec<GraphNode>, Vec<GraphRelationship>), StoreError> {
            Ok((Vec::new(), Vec::new()))
        }

        fn node_embedding(
            &self,
            node_id: &str,
            _index: EmbeddingIndex,
        ) -> Result<Option<Vec<f32>>, StoreError> {
            Ok(self.embeddings.get(node_id).cloned())
        }

        fn node_description(&self, node_id: &str) -> Result<Option<String>, StoreError> {
            Ok(self.descriptions.get(node_id).cloned())
        }

        fn related_terms(
            &self,
            _term: &str,
            _max_depth: usize,
        ) -> Result<Vec<RelatedTerm>, StoreError> {
            Ok(Vec::new())
        }

        fn hierarchy_terms(&self, _term: &str) -> Result<Vec<RelatedTerm>, StoreError> {
            Ok(Vec::new())
        }

        fn call_chain_terms(&self, _term: &str) -> Result<Vec<RelatedTerm>, StoreError> {
            Ok(Vec::new())
        }

        fn package_sibling_terms(&self, _term: &str) -> Result<Vec<RelatedTerm>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn scored(id: &str, kind: EntityKind) -> ScoredNode {
        let mut properties = BTreeMap::new();
        properties.insert("name".to_string(), serde_json::json!(id));
        ScoredNode {
            node: GraphNode {
                id: id.to_string(),
                kind,
                properties,
            },
            score: 0.5,
        }
    }

    fn service(store: MapStore) -> ReRankingService {
        ReRankingService::new(
            Arc::new(store),
            Arc::new(Mutex::new(Box::new(DeterministicEmbedder::new("test", 32)))),
            RerankConfig::default(),
        )
    }

    #[test]
    fn identical_embedding_ranks_first() {
        let query = "How does PaymentService process a refund?";
        let mut embeddings = BTreeMap::new();
        // One node's stored embedding is exactly the query embedding.
        embeddings.insert("match".to_string(), deterministic_embedding(query, 32));
        embeddings.insert(
            "other".to_string(),
            deterministic_embedding("unrelated inventory counter", 32),
        );
        let store = MapStore {
            embeddings,
            descriptions: BTreeMap::new(),
        };

        let ranked = service(store).rerank(
            query,
            &[
                scored("other", EntityKind::Method),
                scored("match", EntityKind::Method),
            ],
            &Deadline::from_millis(30_000),
        );
        assert!(!ranked.is_empty());
        assert_eq!(ranked[0].node.id, "match");
        assert!((ranked[0].similarity_score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn missing_embedding_uses_text_overlap_fallback() {
        let mut descriptions = BTreeMap::new();
        descriptions.insert(
            "m1".to_string(),
            "Processes a refund for a payment transaction".to_string(),
        );
        let store = MapStore {
            embeddings: BTreeMap::new(),
            descriptions,
        };

        let ranked = service(store).rerank(
            "How does PaymentService process a refund?",
            &[scored("m1", EntityKind::Method)],
            &Deadline::from_millis(30_000),
        );
        assert_eq!(ranked.len(), 1);
        // Query terms: how, does, paymentservice, process, refund.
        // "process", "refund", "payment..." overlap -> ratio 2/5 at least.
        assert!(ranked[0].similarity_score >= 0.3);
        assert!(ranked[0].description.contains("refund"));
    }

    #[test]
    fn description_is_synthesized_when_nothing_is_stored() {
        let store = MapStore {
            embeddings: BTreeMap::new(),
            descriptions: BTreeMap::new(),
        };
        let ranked = service(store).rerank(
            "processRefund logic",
            &[scored("processRefund", EntityKind::Method)],
            &Deadline::from_millis(30_000),
        );
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].description.contains("processRefund"));
    }

    #[test]
    fn specificity_rises_with_identifiers_and_falls_with_generic_words() {
        let technical = query_specificity_factor("PaymentServiceImpl processRefund chargeback_flow");
        let generic = query_specificity_factor("explain how does the find show list");
        assert!(technical > 1.0);
        assert!(generic < 1.0);
        assert!((SPECIFICITY_FLOOR..=SPECIFICITY_CEIL).contains(&technical));
        assert!((SPECIFICITY_FLOOR..=SPECIFICITY_CEIL).contains(&generic));
    }

    #[test]
    fn distribution_factor_bounds() {
        assert_eq!(score_distribution_factor(&[]), DISTRIBUTION_FLOOR);
        let strong: Vec<RankedNode> = (0..4)
            .map(|i| RankedNode {
                node: GraphNode {
                    id: format!("n{i}"),
                    kind: EntityKind::Method,
                    properties: BTreeMap::new(),
                },
                similarity_score: 0.9,
                description: String::new(),
            })
            .collect();
        let factor = score_distribution_factor(&strong);
        assert!((factor - (0.7 + 0.3 * 0.9)).abs() < 1e-12);
    }

    #[test]
    fn match_ratio_counts_significant_terms_only() {
        let terms = significant_terms("How does PaymentService process a refund?");
        assert_eq!(terms.len(), 5);
        let ratio = match_ratio("process a refund", &terms);
        assert!((ratio - 2.0 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn empty_candidates_rank_to_nothing() {
        let store = MapStore {
            embeddings: BTreeMap::new(),
            descriptions: BTreeMap::new(),
        };
        assert!(
            service(store)
                .rerank("query", &[], &Deadline::from_millis(30_000))
                .is_empty()
        );
    }
}

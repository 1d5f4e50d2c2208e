//! Embedding-similarity expansion: nearest neighbors of a term across the
//! precomputed method, class, and description embedding indexes.

use codegraph_core::error::StoreError;
use codegraph_core::types::EntityKind;
use codegraph_store::embedding::EmbeddingProvider;
use codegraph_store::{EmbeddingIndex, GraphStore};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::warn;

const NEIGHBOR_INDEXES: [EmbeddingIndex; 3] = [
    EmbeddingIndex::Method,
    EmbeddingIndex::Class,
    EmbeddingIndex::Description,
];

/// A neighbor term discovered through embedding similarity.
#[derive(Debug, Clone)]
pub struct SimilarTerm {
    pub term: String,
    pub kind: EntityKind,
    pub similarity: f64,
}

pub struct EmbeddingExpander {
    store: Arc<dyn GraphStore>,
    provider: Arc<Mutex<Box<dyn EmbeddingProvider + Send>>>,
    similarity_threshold: f64,
    max_output: usize,
}

impl EmbeddingExpander {
    pub fn new(
        store: Arc<dyn GraphStore>,
        provider: Arc<Mutex<Box<dyn EmbeddingProvider + Send>>>,
        similarity_threshold: f64,
        max_output: usize,
    ) -> Self {
        Self {
            store,
            provider,
            similarity_threshold,
            max_output,
        }
    }

    /// Expand one term. The term is embedded once; the three indexes are
    /// then queried concurrently. A failed index query logs and contributes
    /// nothing.
    pub fn expand(&self, term: &str) -> Vec<SimilarTerm> {
        if term.trim().is_empty() || self.max_output == 0 {
            return Vec::new();
        }
        let vector = match self.embed(term) {
            Ok(vector) => vector,
            Err(err) => {
                warn!(term, error = %err, "term embedding failed; skipping embedding expansion");
                return Vec::new();
            }
        };

        let store = &self.store;
        let per_index_limit = self.max_output;
        let mut collected: Vec<SimilarTerm> = Vec::new();
        std::thread::scope(|scope| {
            let handles: Vec<_> = NEIGHBOR_INDEXES
                .iter()
                .map(|index| {
                    let vector = &vector;
                    scope.spawn(move || store.vector_search(*index, vector, per_index_limit))
                })
                .collect();
            for (index, handle) in NEIGHBOR_INDEXES.iter().zip(handles) {
                match handle.join() {
                    Ok(Ok(hits)) => {
                        for hit in hits {
                            let Some(name) = hit.name else { continue };
                            if hit.score >= self.similarity_threshold {
                                collected.push(SimilarTerm {
                                    term: name,
                                    kind: hit.kind,
                                    similarity: hit.score,
                                });
                            }
                        }
                    }
                    Ok(Err(err)) => {
                        warn!(index = index.as_str(), error = %err, "neighbor search failed");
                    }
                    Err(_) => {
                        warn!(index = index.as_str(), "neighbor search panicked");
                    }
                }
            }
        });

        // Dedup by (term, kind), keep the best similarity, sort descending.
        let mut seen: HashSet<(String, EntityKind)> = HashSet::new();
        collected.sort_by(|left, right| {
            right
                .similarity
                .partial_cmp(&left.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| left.term.cmp(&right.term))
        });
        collected.retain(|candidate| seen.insert((candidate.term.clone(), candidate.kind)));
        collected.truncate(self.max_output);
        collected
    }

    fn embed(&self, term: &str) -> Result<Vec<f32>, StoreError> {
        let mut provider = self
            .provider
            .lock()
            .map_err(|_| StoreError::external("embedding provider mutex poisoned"))?;
        provider.embed(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::types::{
        GraphNode, GraphRelationship, RelatedTerm, SearchChannel, SearchHit,
    };
    use codegraph_store::LexicalScope;
    use codegraph_store::embedding::DeterministicEmbedder;

    /// Store stub: method index succeeds, class index errors, description
    /// index is empty.
    struct PartialStore;

    impl GraphStore for PartialStore {
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
            index: EmbeddingIndex,
            _query: &[f32],
            _k: usize,
        ) -> Result<Vec<SearchHit>, StoreError> {
            match index {
                EmbeddingIndex::Method => Ok(vec![
                    hit("m1", "processRefund", 0.91, EntityKind::Method),
                    hit("m2", "processRefund", 0.85, EntityKind::Method),
                    hit("m3", "unrelatedThing", 0.2, EntityKind::Method),
                ]),
                EmbeddingIndex::Class => Err(StoreError::external("index offline")),
                _ => Ok(Vec::new()),
            }
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
            _node_id: &str,
            _index: EmbeddingIndex,
        ) -> Result<Option<Vec<f32>>, StoreError> {
            Ok(None)
        }

        fn node_description(&self, _node_id: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
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

    fn hit(node_id: &str, name: &str, score: f64, kind: EntityKind) -> SearchHit {
        SearchHit {
            node_id: node_id.to_string(),
            name: Some(name.to_string()),
            signature: None,
            context: None,
            score,
            kind,
            channel: SearchChannel::Vector,
        }
    }

    fn expander() -> EmbeddingExpander {
        EmbeddingExpander::new(
            Arc::new(PartialStore),
            Arc::new(Mutex::new(Box::new(DeterministicEmbedder::new("test", 16)))),
            0.7,
            10,
        )
    }

    #[test]
    fn partial_index_failure_still_yields_survivors() {
        let out = expander().expand("refund");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].term, "processRefund");
        assert_eq!(out[0].similarity, 0.91);
    }

    #[test]
    fn below_threshold_neighbors_are_dropped() {
        let out = expander().expand("refund");
        assert!(out.iter().all(|t| t.similarity >= 0.7));
    }

    #[test]
    fn empty_term_expands_to_nothing() {
        assert!(expander().expand("  ").is_empty());
    }
}

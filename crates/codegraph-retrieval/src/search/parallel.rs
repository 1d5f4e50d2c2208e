//! Parallel search: the lexical and vector branches run as independent
//! concurrent tasks and are joined with partial-success semantics.

use crate::deadline::Deadline;
use codegraph_core::config::SearchConfig;
use codegraph_core::error::StoreError;
use codegraph_core::types::{ExtractedEntities, SearchHit};
use codegraph_store::embedding::EmbeddingProvider;
use codegraph_store::{EmbeddingIndex, GraphStore, LexicalScope};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Raw hits from both channels, pre-fusion.
#[derive(Debug, Default)]
pub struct SearchOutput {
    pub lexical: Vec<SearchHit>,
    pub vector: Vec<SearchHit>,
}

pub struct ParallelSearchService {
    store: Arc<dyn GraphStore>,
    provider: Arc<Mutex<Box<dyn EmbeddingProvider + Send>>>,
    config: SearchConfig,
}

impl ParallelSearchService {
    pub fn new(
        store: Arc<dyn GraphStore>,
        provider: Arc<Mutex<Box<dyn EmbeddingProvider + Send>>>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Run both branches concurrently. A failed branch (or individual scope
    /// query) logs and contributes nothing; the other branch's hits survive.
    pub fn search(
        &self,
        query: &str,
        entities: &ExtractedEntities,
        deadline: &Deadline,
    ) -> SearchOutput {
        if entities.is_empty() || deadline.expired() {
            return SearchOutput::default();
        }

        // Embed the query before fanning out so the provider mutex is not
        // held across the join.
        let query_vector = match self.embed(query) {
            Ok(vector) => Some(vector),
            Err(err) => {
                warn!(query, error = %err, "query embedding failed; vector branch disabled");
                None
            }
        };

        let mut output = SearchOutput::default();
        std::thread::scope(|scope| {
            let lexical = scope.spawn(|| self.lexical_branch(entities, deadline));
            let vector = scope.spawn(|| match &query_vector {
                Some(vector) => self.vector_branch(vector, deadline),
                None => Vec::new(),
            });

            match lexical.join() {
                Ok(hits) => output.lexical = hits,
                Err(_) => warn!("lexical search branch panicked"),
            }
            match vector.join() {
                Ok(hits) => output.vector = hits,
                Err(_) => warn!("vector search branch panicked"),
            }
        });

        debug!(
            query,
            lexical = output.lexical.len(),
            vector = output.vector.len(),
            "parallel search joined"
        );
        output
    }

    /// One full-text query per lexical scope, fed by the entity categories
    /// that make sense for that scope.
    fn lexical_branch(&self, entities: &ExtractedEntities, deadline: &Deadline) -> Vec<SearchHit> {
        let limit = self.config.per_channel_limit;
        let searches: [(LexicalScope, Vec<String>); 4] = [
            (
                LexicalScope::Methods,
                concat(&entities.methods, &entities.terms),
            ),
            (
                LexicalScope::Classes,
                concat(&entities.classes, &entities.terms),
            ),
            (
                LexicalScope::Descriptions,
                concat(&entities.terms, &entities.classes),
            ),
            (LexicalScope::FileDocs, entities.packages.to_vec()),
        ];

        let mut hits = Vec::new();
        for (scope, terms) in searches {
            if terms.is_empty() {
                continue;
            }
            if deadline.expired() {
                warn!(scope = scope.index_name(), "deadline expired; skipping lexical scope");
                break;
            }
            match self.store.fulltext_search(scope, &terms, limit) {
                Ok(found) => hits.extend(found),
                Err(err) => {
                    warn!(scope = scope.index_name(), error = %err, "lexical search failed");
                }
            }
        }
        hits
    }

    /// One nearest-neighbor query per embedding index against the query
    /// embedding.
    fn vector_branch(&self, query_vector: &[f32], deadline: &Deadline) -> Vec<SearchHit> {
        let limit = self.config.per_channel_limit;
        let mut hits = Vec::new();
        for index in EmbeddingIndex::ALL {
            if deadline.expired() {
                warn!(index = index.as_str(), "deadline expired; skipping vector index");
                break;
            }
            match self.store.vector_search(index, query_vector, limit) {
                Ok(found) => hits.extend(found),
                Err(err) => {
                    warn!(index = index.as_str(), error = %err, "vector search failed");
                }
            }
        }
        hits
    }

    fn embed(&self, query: &str) -> Result<Vec<f32>, StoreError> {
        let mut provider = self
            .provider
            .lock()
            .map_err(|_| StoreError::external("embedding provider mutex poisoned"))?;
        provider.embed(query)
    }
}

fn concat(primary: &[String], secondary: &[String]) -> Vec<String> {
    let mut out = primary.to_vec();
    for term in secondary {
        if !out.contains(term) {
            out.push(term.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::types::{
        EntityKind, GraphNode, GraphRelationship, RelatedTerm, SearchChannel,
    };
    use codegraph_store::embedding::DeterministicEmbedder;

    /// Lexical queries succeed; every vector query errors.
    struct LexicalOnlyStore;

    impl GraphStore for LexicalOnlyStore {
        fn fulltext_search(
            &self,
            scope: LexicalScope,
            _terms: &[String],
            _limit: usize,
        ) -> Result<Vec<SearchHit>, StoreError> {
            Ok(vec![SearchHit {
                node_id: format!("{}-1", scope.index_name()),
                name: Some("processRefund".to_string()),
                signature: None,
                context: None,
                score: 3.0,
                kind: EntityKind::Method,
                channel: SearchChannel::Lexical,
            }])
        }

        fn vector_search(
            &self,
            _index: EmbeddingIndex,
            _query: &[f32],
            _k: usize,
        ) -> Result<Vec<SearchHit>, StoreError> {
            Err(StoreError::external("vector store offline"))
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

    fn service() -> ParallelSearchService {
        ParallelSearchService::new(
            Arc::new(LexicalOnlyStore),
            Arc::new(Mutex::new(Box::new(DeterministicEmbedder::new("test", 16)))),
            SearchConfig::default(),
        )
    }

    fn entities() -> ExtractedEntities {
        ExtractedEntities {
            classes: vec!["PaymentService".to_string()],
            methods: vec!["processRefund".to_string()],
            packages: Vec::new(),
            terms: vec!["refund".to_string()],
        }
    }

    #[test]
    fn vector_branch_failure_keeps_lexical_hits() {
        let output = service().search(
            "refund",
            &entities(),
            &Deadline::from_millis(30_000),
        );
        assert!(!output.lexical.is_empty());
        assert!(output.vector.is_empty());
    }

    #[test]
    fn empty_entities_short_circuit() {
        let output = service().search(
            "refund",
            &ExtractedEntities::default(),
            &Deadline::from_millis(30_000),
        );
        assert!(output.lexical.is_empty());
        assert!(output.vector.is_empty());
    }

    #[test]
    fn expired_deadline_short_circuits() {
        let deadline = Deadline::from_millis(1);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let output = service().search("refund", &entities(), &deadline);
        assert!(output.lexical.is_empty());
    }
}

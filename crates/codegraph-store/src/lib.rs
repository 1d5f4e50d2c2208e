pub mod embedding;
pub mod fulltext;
pub mod rate_limit;
pub mod sqlite;
pub mod text_model;

use codegraph_core::error::StoreError;
use codegraph_core::types::{GraphNode, GraphRelationship, RelatedTerm, SearchHit};
use serde::{Deserialize, Serialize};

/// Lexical full-text index scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LexicalScope {
    Methods,
    Classes,
    Descriptions,
    FileDocs,
}

impl LexicalScope {
    pub const ALL: [LexicalScope; 4] = [
        LexicalScope::Methods,
        LexicalScope::Classes,
        LexicalScope::Descriptions,
        LexicalScope::FileDocs,
    ];

    pub const fn index_name(self) -> &'static str {
        match self {
            Self::Methods => "methods",
            Self::Classes => "classes",
            Self::Descriptions => "descriptions",
            Self::FileDocs => "filedocs",
        }
    }
}

/// Precomputed embedding index families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingIndex {
    Method,
    Class,
    Description,
    FileDoc,
}

impl EmbeddingIndex {
    pub const ALL: [EmbeddingIndex; 4] = [
        EmbeddingIndex::Method,
        EmbeddingIndex::Class,
        EmbeddingIndex::Description,
        EmbeddingIndex::FileDoc,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Method => "method",
            Self::Class => "class",
            Self::Description => "description",
            Self::FileDoc => "filedoc",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "method" => Some(Self::Method),
            "class" => Some(Self::Class),
            "description" => Some(Self::Description),
            "filedoc" => Some(Self::FileDoc),
            _ => None,
        }
    }
}

/// The abstract graph+index collaborator the retrieval engine runs against.
///
/// Implementations must be safe to share across the pipeline's fan-out
/// threads. All methods are point-in-time reads; the engine never writes.
pub trait GraphStore: Send + Sync {
    /// Ranked full-text search within one lexical scope.
    fn fulltext_search(
        &self,
        scope: LexicalScope,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError>;

    /// Nearest-neighbor search against one embedding index.
    fn vector_search(
        &self,
        index: EmbeddingIndex,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, StoreError>;

    /// Bounded relationship traversal outward from the seed set.
    ///
    /// An empty `relationship_types` slice means all types are followed.
    fn traverse(
        &self,
        seed_ids: &[String],
        relationship_types: &[String],
        max_depth: usize,
        max_nodes_per_hop: usize,
    ) -> Result<(Vec<GraphNode>, Vec<GraphRelationship>), StoreError>;

    /// Point lookup for a node's precomputed embedding.
    fn node_embedding(
        &self,
        node_id: &str,
        index: EmbeddingIndex,
    ) -> Result<Option<Vec<f32>>, StoreError>;

    /// Point lookup for a node's stored description text.
    fn node_description(&self, node_id: &str) -> Result<Option<String>, StoreError>;

    /// Terms reachable from nodes matching `term` through any relationship,
    /// up to `max_depth` hops.
    fn related_terms(&self, term: &str, max_depth: usize) -> Result<Vec<RelatedTerm>, StoreError>;

    /// Parents, children, and interfaces of classes matching `term`.
    fn hierarchy_terms(&self, term: &str) -> Result<Vec<RelatedTerm>, StoreError>;

    /// Methods co-occurring with `term` in call chains.
    fn call_chain_terms(&self, term: &str) -> Result<Vec<RelatedTerm>, StoreError>;

    /// Entities declared in the same package as nodes matching `term`.
    fn package_sibling_terms(&self, term: &str) -> Result<Vec<RelatedTerm>, StoreError>;
}

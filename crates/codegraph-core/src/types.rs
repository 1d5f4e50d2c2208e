use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coarse classification of what kind of answer a query is seeking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Implementation,
    Usage,
    Configuration,
    Discovery,
    Status,
}

impl QueryIntent {
    pub const ALL: [QueryIntent; 5] = [
        QueryIntent::Implementation,
        QueryIntent::Usage,
        QueryIntent::Configuration,
        QueryIntent::Discovery,
        QueryIntent::Status,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Implementation => "implementation",
            Self::Usage => "usage",
            Self::Configuration => "configuration",
            Self::Discovery => "discovery",
            Self::Status => "status",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "implementation" => Some(Self::Implementation),
            "usage" => Some(Self::Usage),
            "configuration" => Some(Self::Configuration),
            "discovery" => Some(Self::Discovery),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an expanded term came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermSource {
    Base,
    Pattern,
    Compound,
    Semantic,
    Graph,
    Embedding,
}

/// A candidate search term with a confidence weight in [0, 1].
///
/// Identity is `term`; merging two weighted terms with the same text keeps
/// the higher weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedTerm {
    pub term: String,
    pub weight: f64,
    pub source: TermSource,
}

impl WeightedTerm {
    pub fn new(term: impl Into<String>, weight: f64, source: TermSource) -> Self {
        Self {
            term: term.into(),
            weight: weight.clamp(0.0, 1.0),
            source,
        }
    }

    /// Max-merge: keep the higher weight (and its source) for the same term.
    pub fn merge(self, other: WeightedTerm) -> WeightedTerm {
        if other.weight > self.weight { other } else { self }
    }
}

/// Result of intent analysis. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentAnalysis {
    pub original_query: String,
    pub primary_intent: QueryIntent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_intents: Vec<QueryIntent>,
    /// Normalized per-intent scores (sum to 1 when any pattern matched).
    pub intent_scores: BTreeMap<QueryIntent, f64>,
    /// Context phrases by category (scope, relationship, temporal, quality).
    /// Informational only; not part of the score.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub contexts: BTreeMap<String, Vec<String>>,
    pub confidence: f64,
}

/// The full expanded term set for one query, built once per query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryExpansion {
    pub original_query: String,
    pub intent: QueryIntent,
    pub all_terms: Vec<WeightedTerm>,
    /// Terms with weight >= 0.8.
    pub high_confidence: Vec<WeightedTerm>,
    /// Terms with weight in [0.5, 0.8).
    pub medium_confidence: Vec<WeightedTerm>,
    /// Terms with weight < 0.5.
    pub low_confidence: Vec<WeightedTerm>,
    /// Term counts contributed per expansion level, for explainability.
    pub level_counts: BTreeMap<String, usize>,
}

/// Filtered terms classified by the shape of entity they likely name.
/// Each list preserves first-occurrence order with duplicates removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub classes: Vec<String>,
    pub methods: Vec<String>,
    pub packages: Vec<String>,
    pub terms: Vec<String>,
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
            && self.methods.is_empty()
            && self.packages.is_empty()
            && self.terms.is_empty()
    }
}

/// Kind of entity a search hit or graph node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Method,
    Class,
    Interface,
    Enum,
    Package,
    Description,
    FileDoc,
    Other,
}

impl EntityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Enum => "enum",
            Self::Package => "package",
            Self::Description => "description",
            Self::FileDoc => "filedoc",
            Self::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "method" | "function" => Self::Method,
            "class" | "struct" => Self::Class,
            "interface" | "trait" => Self::Interface,
            "enum" => Self::Enum,
            "package" | "module" => Self::Package,
            "description" => Self::Description,
            "filedoc" | "file_doc" => Self::FileDoc,
            _ => Self::Other,
        }
    }
}

/// Which search channel produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchChannel {
    Lexical,
    Vector,
}

/// A raw hit from one search call. Not deduplicated across calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Enclosing class or file context, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub score: f64,
    pub kind: EntityKind,
    pub channel: SearchChannel,
}

/// One fused score per unique node after lexical/vector combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub node_id: String,
    pub fulltext_score: f64,
    pub vector_score: f64,
    pub combined_score: f64,
    pub has_fulltext_match: bool,
    pub has_vector_match: bool,
}

/// A node from the knowledge graph. `kind` is the node's first label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl GraphNode {
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|value| value.as_str())
    }

    pub fn property_bool(&self, key: &str) -> bool {
        self.properties
            .get(key)
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    pub fn name(&self) -> Option<&str> {
        self.property_str("name")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub id: String,
    pub rel_type: String,
    pub start_node_id: String,
    pub end_node_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// The bounded neighborhood reachable from the seed set.
///
/// Immutable once built by graph expansion; later stages derive filtered
/// copies rather than mutate in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubGraph {
    pub nodes: BTreeMap<String, GraphNode>,
    pub relationships: Vec<GraphRelationship>,
    /// Traversal metadata (depth reached, counts, degradation reasons).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl SubGraph {
    /// Empty subgraph carrying an explanation instead of an error.
    pub fn empty_with_reason(reason: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("reason".to_string(), reason.into());
        Self {
            nodes: BTreeMap::new(),
            relationships: Vec::new(),
            metadata,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredNode {
    pub node: GraphNode,
    pub score: f64,
}

/// Final re-ranked node handed to the narration layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedNode {
    pub node: GraphNode,
    /// Cosine similarity to the query embedding, clamped to [0, 1].
    pub similarity_score: f64,
    /// The text used for scoring; synthesized from properties when the node
    /// has no stored description.
    pub description: String,
}

/// A term discovered through graph relationships during expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedTerm {
    pub term: String,
    pub relationship_type: String,
    pub distance: usize,
    pub score: f64,
}

/// Everything the pipeline hands to the downstream distillation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    pub ranked: Vec<RankedNode>,
    pub results: Vec<RankedResult>,
    pub subgraph: SubGraph,
    pub intent: IntentAnalysis,
    pub expansion: QueryExpansion,
    /// Per-stage diagnostics and degradation warnings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_term_merge_keeps_max_weight() {
        let low = WeightedTerm::new("payment", 0.3, TermSource::Pattern);
        let high = WeightedTerm::new("payment", 0.7, TermSource::Semantic);
        let merged = low.merge(high);
        assert_eq!(merged.weight, 0.7);
        assert_eq!(merged.source, TermSource::Semantic);
    }

    #[test]
    fn weighted_term_clamps_weight() {
        let term = WeightedTerm::new("x", 1.4, TermSource::Base);
        assert_eq!(term.weight, 1.0);
    }

    #[test]
    fn entity_kind_parse_maps_aliases() {
        assert_eq!(EntityKind::parse("function"), EntityKind::Method);
        assert_eq!(EntityKind::parse("Trait"), EntityKind::Interface);
        assert_eq!(EntityKind::parse("file_doc"), EntityKind::FileDoc);
        assert_eq!(EntityKind::parse("widget"), EntityKind::Other);
    }

    #[test]
    fn query_intent_round_trips_through_strings() {
        for intent in QueryIntent::ALL {
            assert_eq!(QueryIntent::parse(intent.as_str()), Some(intent));
        }
        assert_eq!(QueryIntent::parse("nonsense"), None);
    }

    #[test]
    fn empty_subgraph_carries_reason() {
        let graph = SubGraph::empty_with_reason("no seed nodes");
        assert!(graph.is_empty());
        assert_eq!(graph.metadata.get("reason").map(String::as_str), Some("no seed nodes"));
    }
}

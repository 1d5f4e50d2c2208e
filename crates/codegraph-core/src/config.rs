use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Root configuration for the retrieval engine.
///
/// One immutable tree populated at startup (from TOML or defaults) and passed
/// by reference into each component's constructor; there is no global mutable
/// state and no runtime re-binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub intent: IntentConfig,
    #[serde(default)]
    pub expansion: ExpansionConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    /// Pattern classification below this confidence triggers the text-model
    /// fallback.
    #[serde(default = "default_intent_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_true")]
    pub multi_intent_enabled: bool,
    /// Weight given to the model's scores when blending with pattern scores.
    #[serde(default = "default_model_blend_weight")]
    pub model_blend_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionConfig {
    #[serde(default = "default_level1_weight")]
    pub level1_weight: f64,
    #[serde(default = "default_level2_weight")]
    pub level2_weight: f64,
    #[serde(default = "default_level3_weight")]
    pub level3_weight: f64,
    #[serde(default = "default_max_total_expansions")]
    pub max_total_expansions: usize,
    /// Per-expander output cap.
    #[serde(default = "default_max_expansions_per_term")]
    pub max_expansions_per_term: usize,
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
    #[serde(default = "default_max_edit_distance")]
    pub max_edit_distance: usize,
    /// Minimum cosine similarity for embedding-based term neighbors.
    #[serde(default = "default_embedding_similarity_threshold")]
    pub embedding_similarity_threshold: f64,
    /// Worker pool size for per-term expansion fan-out.
    #[serde(default = "default_expansion_workers")]
    pub workers: usize,
    #[serde(default = "default_graph_term_depth")]
    pub graph_term_depth: usize,
    #[serde(default = "default_noise_terms")]
    pub noise_terms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_fulltext_weight")]
    pub fulltext_weight: f64,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    /// Boost applied when a node is found by both search channels.
    #[serde(default = "default_dual_match_boost")]
    pub dual_match_boost: f64,
    #[serde(default = "default_max_combined_results")]
    pub max_combined_results: usize,
    /// Per-channel result fan-out before combination.
    #[serde(default = "default_per_channel_limit")]
    pub per_channel_limit: usize,
    /// Cooperative per-query deadline for the whole pipeline.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_expansion_depth")]
    pub expansion_depth: usize,
    #[serde(default = "default_max_nodes_per_hop")]
    pub max_nodes_per_hop: usize,
    /// Relationship types to follow during expansion. Empty means all types.
    #[serde(default)]
    pub relationship_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_distance_penalty")]
    pub distance_penalty: f64,
    #[serde(default = "default_max_distance_penalty")]
    pub max_distance_penalty: f64,
    #[serde(default = "default_min_node_score")]
    pub min_score: f64,
    #[serde(default = "default_type_boost")]
    pub type_boost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    #[serde(default = "default_rerank_base_threshold")]
    pub base_threshold: f64,
    #[serde(default = "default_rerank_min_threshold")]
    pub min_threshold: f64,
    #[serde(default = "default_rerank_max_threshold")]
    pub max_threshold: f64,
    #[serde(default = "default_true")]
    pub fallback_scoring_enabled: bool,
    #[serde(default = "default_fallback_base_score")]
    pub fallback_base_score: f64,
    #[serde(default = "default_text_match_bonus")]
    pub text_match_bonus: f64,
    /// Similarity below which the text-overlap fallback is blended in.
    #[serde(default = "default_low_similarity_cutoff")]
    pub low_similarity_cutoff: f64,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub embedding: EmbeddingModelConfig,
    #[serde(default)]
    pub text: TextModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingModelConfig {
    /// "local" (deterministic / fastembed) or an external provider name.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextModelConfig {
    /// "none" disables the model fallback entirely.
    #[serde(default = "default_text_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_text_model")]
    pub model: String,
    #[serde(default = "default_text_timeout_ms")]
    pub timeout_ms: u64,
    /// Sustained request rate allowed against the model endpoint.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults for any
    /// missing section or field.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit_range("search.fulltext_weight", self.search.fulltext_weight)?;
        check_unit_range("search.vector_weight", self.search.vector_weight)?;
        check_unit_range("expansion.level1_weight", self.expansion.level1_weight)?;
        check_unit_range("expansion.level2_weight", self.expansion.level2_weight)?;
        check_unit_range("expansion.level3_weight", self.expansion.level3_weight)?;
        check_unit_range("intent.confidence_threshold", self.intent.confidence_threshold)?;
        if self.rerank.min_threshold > self.rerank.max_threshold {
            return Err(ConfigError::invalid_value(
                "rerank.min_threshold",
                "must not exceed rerank.max_threshold",
            ));
        }
        if self.rerank.batch_size == 0 {
            return Err(ConfigError::invalid_value(
                "rerank.batch_size",
                "must be at least 1",
            ));
        }
        if self.expansion.workers == 0 {
            return Err(ConfigError::invalid_value(
                "expansion.workers",
                "must be at least 1",
            ));
        }
        if self.models.embedding.dimensions == 0 {
            return Err(ConfigError::invalid_value(
                "models.embedding.dimensions",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

fn check_unit_range(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid_value(
            field,
            format!("{value} is outside [0.0, 1.0]"),
        ));
    }
    Ok(())
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_intent_confidence_threshold(),
            multi_intent_enabled: default_true(),
            model_blend_weight: default_model_blend_weight(),
        }
    }
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            level1_weight: default_level1_weight(),
            level2_weight: default_level2_weight(),
            level3_weight: default_level3_weight(),
            max_total_expansions: default_max_total_expansions(),
            max_expansions_per_term: default_max_expansions_per_term(),
            relevance_threshold: default_relevance_threshold(),
            max_edit_distance: default_max_edit_distance(),
            embedding_similarity_threshold: default_embedding_similarity_threshold(),
            workers: default_expansion_workers(),
            graph_term_depth: default_graph_term_depth(),
            noise_terms: default_noise_terms(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fulltext_weight: default_fulltext_weight(),
            vector_weight: default_vector_weight(),
            score_threshold: default_score_threshold(),
            dual_match_boost: default_dual_match_boost(),
            max_combined_results: default_max_combined_results(),
            per_channel_limit: default_per_channel_limit(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            expansion_depth: default_expansion_depth(),
            max_nodes_per_hop: default_max_nodes_per_hop(),
            relationship_types: Vec::new(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            distance_penalty: default_distance_penalty(),
            max_distance_penalty: default_max_distance_penalty(),
            min_score: default_min_node_score(),
            type_boost: default_type_boost(),
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            base_threshold: default_rerank_base_threshold(),
            min_threshold: default_rerank_min_threshold(),
            max_threshold: default_rerank_max_threshold(),
            fallback_scoring_enabled: default_true(),
            fallback_base_score: default_fallback_base_score(),
            text_match_bonus: default_text_match_bonus(),
            low_similarity_cutoff: default_low_similarity_cutoff(),
            final_limit: default_final_limit(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingModelConfig::default(),
            text: TextModelConfig::default(),
        }
    }
}

impl Default for EmbeddingModelConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimensions: default_embedding_dimensions(),
            batch_size: default_embedding_batch_size(),
        }
    }
}

impl Default for TextModelConfig {
    fn default() -> Self {
        Self {
            provider: default_text_provider(),
            endpoint: None,
            model: default_text_model(),
            timeout_ms: default_text_timeout_ms(),
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_intent_confidence_threshold() -> f64 {
    0.7
}

fn default_model_blend_weight() -> f64 {
    0.6
}

fn default_level1_weight() -> f64 {
    1.0
}

fn default_level2_weight() -> f64 {
    0.8
}

fn default_level3_weight() -> f64 {
    0.6
}

fn default_max_total_expansions() -> usize {
    50
}

fn default_max_expansions_per_term() -> usize {
    20
}

fn default_relevance_threshold() -> f64 {
    0.5
}

fn default_max_edit_distance() -> usize {
    5
}

fn default_embedding_similarity_threshold() -> f64 {
    0.7
}

fn default_expansion_workers() -> usize {
    3
}

fn default_graph_term_depth() -> usize {
    2
}

fn default_noise_terms() -> Vec<String> {
    [
        "test", "tests", "mock", "stub", "todo", "fixme", "temp", "tmp", "foo", "bar", "baz",
        "dummy", "sample",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_fulltext_weight() -> f64 {
    0.4
}

fn default_vector_weight() -> f64 {
    0.6
}

fn default_score_threshold() -> f64 {
    0.1
}

fn default_dual_match_boost() -> f64 {
    1.2
}

fn default_max_combined_results() -> usize {
    100
}

fn default_per_channel_limit() -> usize {
    50
}

fn default_query_timeout_ms() -> u64 {
    30_000
}

fn default_expansion_depth() -> usize {
    2
}

fn default_max_nodes_per_hop() -> usize {
    50
}

fn default_distance_penalty() -> f64 {
    0.1
}

fn default_max_distance_penalty() -> f64 {
    0.5
}

fn default_min_node_score() -> f64 {
    0.1
}

fn default_type_boost() -> f64 {
    0.2
}

fn default_rerank_base_threshold() -> f64 {
    0.35
}

fn default_rerank_min_threshold() -> f64 {
    0.2
}

fn default_rerank_max_threshold() -> f64 {
    0.75
}

fn default_fallback_base_score() -> f64 {
    0.3
}

fn default_text_match_bonus() -> f64 {
    0.2
}

fn default_low_similarity_cutoff() -> f64 {
    0.4
}

fn default_final_limit() -> usize {
    50
}

fn default_batch_size() -> usize {
    10
}

fn default_embedding_provider() -> String {
    "local".to_string()
}

fn default_embedding_model() -> String {
    "deterministic".to_string()
}

fn default_embedding_dimensions() -> usize {
    384
}

fn default_embedding_batch_size() -> usize {
    16
}

fn default_text_provider() -> String {
    "none".to_string()
}

fn default_text_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_text_timeout_ms() -> u64 {
    10_000
}

fn default_requests_per_second() -> f64 {
    2.0
}

fn default_burst_size() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_documented_weights() {
        let config = Config::default();
        assert_eq!(config.search.fulltext_weight, 0.4);
        assert_eq!(config.search.vector_weight, 0.6);
        assert_eq!(config.expansion.level1_weight, 1.0);
        assert_eq!(config.expansion.level2_weight, 0.8);
        assert_eq!(config.expansion.level3_weight, 0.6);
        assert_eq!(config.expansion.max_total_expansions, 50);
        assert_eq!(config.graph.expansion_depth, 2);
        assert_eq!(config.graph.max_nodes_per_hop, 50);
        assert_eq!(config.scoring.distance_penalty, 0.1);
        assert_eq!(config.rerank.batch_size, 10);
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let raw = r#"
[search]
fulltext_weight = 0.5
vector_weight = 0.5

[rerank]
final_limit = 100
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.search.fulltext_weight, 0.5);
        assert_eq!(config.rerank.final_limit, 100);
        assert_eq!(config.search.score_threshold, 0.1);
        assert_eq!(config.expansion.workers, 3);
    }

    #[test]
    fn load_reads_file_and_reports_missing_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("codegraph.toml");
        std::fs::write(&path, "[search]\nvector_weight = 0.7\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.search.vector_weight, 0.7);

        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn validate_rejects_out_of_range_weight() {
        let mut config = Config::default();
        config.search.vector_weight = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_rerank_bounds() {
        let mut config = Config::default();
        config.rerank.min_threshold = 0.9;
        config.rerank.max_threshold = 0.5;
        assert!(config.validate().is_err());
    }
}

use codegraph_core::config::IntentConfig;
use codegraph_core::types::{IntentAnalysis, QueryIntent};
use codegraph_store::text_model::TextModel;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const PATTERN_BASE_SCORE: f64 = 0.8;
const STARTS_WITH_BONUS: f64 = 0.2;
const SECONDARY_INTENT_FACTOR: f64 = 0.7;

/// Phrase patterns per intent. Matching is case-insensitive substring
/// matching against the normalized query; a match at the very start of the
/// query earns a bonus.
const INTENT_PATTERNS: &[(QueryIntent, &[&str])] = &[
    (
        QueryIntent::Implementation,
        &[
            "how does",
            "how is",
            "implemented",
            "implementation",
            "internals",
            "algorithm",
            "logic",
            "works",
            "work",
            "process",
            "handle",
            "under the hood",
        ],
    ),
    (
        QueryIntent::Usage,
        &[
            "who calls",
            "where is",
            "used by",
            "used",
            "usage",
            "callers",
            "calls",
            "invoke",
            "depends on",
            "references",
            "example of",
        ],
    ),
    (
        QueryIntent::Configuration,
        &[
            "config",
            "configuration",
            "configure",
            "configured",
            "setting",
            "property",
            "parameter",
            "environment",
            "setup",
        ],
    ),
    (
        QueryIntent::Discovery,
        &[
            "what is",
            "show me",
            "find",
            "list",
            "search for",
            "which",
            "explore",
            "overview",
            "are there",
        ],
    ),
    (
        QueryIntent::Status,
        &[
            "status",
            "health",
            "deprecated",
            "version",
            "coverage",
            "metrics",
            "up to date",
        ],
    ),
];

/// Context phrase categories. Informational only; never part of the score.
const CONTEXT_PATTERNS: &[(&str, &[&str])] = &[
    (
        "scope",
        &["in the", "within", "entire", "whole", "only", "package", "module"],
    ),
    (
        "relationship",
        &["calls", "called by", "extends", "implements", "depends", "uses", "related to"],
    ),
    (
        "temporal",
        &["recent", "latest", "new", "old", "before", "after", "deprecated"],
    ),
    (
        "quality",
        &["slow", "fast", "complex", "simple", "buggy", "untested", "critical"],
    ),
];

/// Classifies a query into an intent category.
///
/// Pattern scoring runs first; when it is inconclusive (no match, or top
/// score under the confidence threshold) and a text model is wired in, the
/// model's scores are blended with the pattern scores. Model failures keep
/// the pattern-only result.
pub struct IntentAnalyzer {
    config: IntentConfig,
    model: Option<Box<dyn TextModel>>,
}

impl IntentAnalyzer {
    pub fn new(config: IntentConfig, model: Option<Box<dyn TextModel>>) -> Self {
        Self { config, model }
    }

    pub fn analyze(&self, query: &str) -> IntentAnalysis {
        let normalized = query.trim().to_lowercase();
        let mut raw_scores = pattern_scores(&normalized);
        let contexts = extract_contexts(&normalized);

        let top = raw_scores.values().copied().fold(0.0_f64, f64::max);
        if top < self.config.confidence_threshold {
            if let Some(model) = self.model.as_deref() {
                match self.model_scores(model, query) {
                    Ok(model_scores) if !model_scores.is_empty() => {
                        raw_scores = blend_scores(
                            &raw_scores,
                            &model_scores,
                            self.config.model_blend_weight,
                        );
                    }
                    Ok(_) => {
                        debug!(query, "intent model returned no parsable scores");
                    }
                    Err(err) => {
                        warn!(query, error = %err, "intent model fallback failed; keeping pattern scores");
                    }
                }
            }
        }

        let confidence = raw_scores.values().copied().fold(0.0_f64, f64::max);
        let primary = raw_scores
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(intent, _)| *intent)
            .unwrap_or(QueryIntent::Discovery);

        let secondary_cutoff = SECONDARY_INTENT_FACTOR * self.config.confidence_threshold;
        let secondary_intents = if self.config.multi_intent_enabled {
            raw_scores
                .iter()
                .filter(|(intent, score)| **intent != primary && **score >= secondary_cutoff)
                .map(|(intent, _)| *intent)
                .collect()
        } else {
            Vec::new()
        };

        debug!(
            query,
            intent = %primary,
            confidence,
            secondary = secondary_intents.len(),
            "intent classified"
        );
        IntentAnalysis {
            original_query: query.to_string(),
            primary_intent: primary,
            secondary_intents,
            intent_scores: normalize_scores(&raw_scores),
            contexts,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    fn model_scores(
        &self,
        model: &dyn TextModel,
        query: &str,
    ) -> Result<BTreeMap<QueryIntent, f64>, codegraph_core::error::StoreError> {
        let prompt = classification_prompt(query);
        let response = model.generate(&prompt)?;
        Ok(parse_model_response(&response))
    }
}

/// Raw (unnormalized) pattern scores. Per intent: base score for any
/// matching pattern, plus a starts-with bonus, taking the max over patterns.
fn pattern_scores(normalized_query: &str) -> BTreeMap<QueryIntent, f64> {
    let mut scores = BTreeMap::new();
    for (intent, patterns) in INTENT_PATTERNS {
        let mut best = 0.0_f64;
        for pattern in *patterns {
            if !normalized_query.contains(pattern) {
                continue;
            }
            let mut score = PATTERN_BASE_SCORE;
            if normalized_query.starts_with(pattern) {
                score += STARTS_WITH_BONUS;
            }
            best = best.max(score);
        }
        if best > 0.0 {
            scores.insert(*intent, best);
        }
    }
    scores
}

fn extract_contexts(normalized_query: &str) -> BTreeMap<String, Vec<String>> {
    let mut contexts = BTreeMap::new();
    for (category, phrases) in CONTEXT_PATTERNS {
        let matched: Vec<String> = phrases
            .iter()
            .filter(|phrase| normalized_query.contains(*phrase))
            .map(ToString::to_string)
            .collect();
        if !matched.is_empty() {
            contexts.insert((*category).to_string(), matched);
        }
    }
    contexts
}

/// Normalize so the stored per-intent scores sum to 1.
fn normalize_scores(raw: &BTreeMap<QueryIntent, f64>) -> BTreeMap<QueryIntent, f64> {
    let total: f64 = raw.values().sum();
    if total <= 0.0 {
        return BTreeMap::new();
    }
    raw.iter()
        .map(|(intent, score)| (*intent, score / total))
        .collect()
}

fn blend_scores(
    pattern: &BTreeMap<QueryIntent, f64>,
    model: &BTreeMap<QueryIntent, f64>,
    model_weight: f64,
) -> BTreeMap<QueryIntent, f64> {
    let model_weight = model_weight.clamp(0.0, 1.0);
    let pattern_weight = 1.0 - model_weight;
    let mut blended = BTreeMap::new();
    for intent in QueryIntent::ALL {
        let p = pattern.get(&intent).copied().unwrap_or(0.0);
        let m = model.get(&intent).copied().unwrap_or(0.0);
        let score = pattern_weight * p + model_weight * m;
        if score > 0.0 {
            blended.insert(intent, score);
        }
    }
    blended
}

fn classification_prompt(query: &str) -> String {
    format!(
        "Classify the intent of this code search query into the categories \
         implementation, usage, configuration, discovery, status.\n\
         Respond with one line per applicable category in the form CATEGORY:score \
         where score is between 0.0 and 1.0.\n\nQuery: {query}"
    )
}

/// Parse "INTENT:score" lines; anything unparsable is skipped.
fn parse_model_response(response: &str) -> BTreeMap<QueryIntent, f64> {
    let mut scores = BTreeMap::new();
    for line in response.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let Some(intent) = QueryIntent::parse(label) else {
            continue;
        };
        let Ok(score) = value.trim().parse::<f64>() else {
            continue;
        };
        let score = score.clamp(0.0, 1.0);
        let entry = scores.entry(intent).or_insert(0.0);
        if score > *entry {
            *entry = score;
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::error::StoreError;

    struct ScriptedModel(Result<String, &'static str>);

    impl TextModel for ScriptedModel {
        fn generate(&self, _prompt: &str) -> Result<String, StoreError> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(code) => Err(StoreError::external(*code)),
            }
        }
    }

    fn analyzer(model: Option<Box<dyn TextModel>>) -> IntentAnalyzer {
        IntentAnalyzer::new(IntentConfig::default(), model)
    }

    #[test]
    fn how_does_query_is_implementation_with_high_confidence() {
        let analysis = analyzer(None).analyze("How does PaymentService process a refund?");
        assert_eq!(analysis.primary_intent, QueryIntent::Implementation);
        assert!(analysis.confidence > 0.7);
    }

    #[test]
    fn starts_with_bonus_beats_mid_query_match() {
        let scores = pattern_scores("how does the config loader work");
        assert_eq!(scores.get(&QueryIntent::Implementation), Some(&1.0));
        assert_eq!(scores.get(&QueryIntent::Configuration), Some(&0.8));
    }

    #[test]
    fn normalized_scores_sum_to_one() {
        let analysis = analyzer(None).analyze("how does the config loader work");
        let total: f64 = analysis.intent_scores.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unmatched_query_defaults_to_discovery() {
        let analysis = analyzer(None).analyze("payment refund");
        assert_eq!(analysis.primary_intent, QueryIntent::Discovery);
        assert_eq!(analysis.confidence, 0.0);
        assert!(analysis.intent_scores.is_empty());
    }

    #[test]
    fn model_fallback_blends_on_low_confidence() {
        let model = ScriptedModel(Ok("implementation:0.9\nusage:0.2".to_string()));
        let analysis = analyzer(Some(Box::new(model))).analyze("payment refund");
        // No pattern matched, so blended score is 0.6 x model only.
        assert_eq!(analysis.primary_intent, QueryIntent::Implementation);
        assert!((analysis.confidence - 0.54).abs() < 1e-9);
    }

    #[test]
    fn model_failure_keeps_pattern_result() {
        let model = ScriptedModel(Err("timeout"));
        let analysis = analyzer(Some(Box::new(model))).analyze("payment refund");
        assert_eq!(analysis.primary_intent, QueryIntent::Discovery);
        assert_eq!(analysis.confidence, 0.0);
    }

    #[test]
    fn malformed_model_lines_are_skipped() {
        let parsed = parse_model_response("implementation:0.8\nnot a line\nwidget:0.9\nusage:abc");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.get(&QueryIntent::Implementation), Some(&0.8));
    }

    #[test]
    fn secondary_intents_require_multi_intent_enabled() {
        let query = "how does the service work and where is it used";
        let enabled = analyzer(None).analyze(query);
        assert!(enabled.secondary_intents.contains(&QueryIntent::Usage));

        let config = IntentConfig {
            multi_intent_enabled: false,
            ..IntentConfig::default()
        };
        let disabled = IntentAnalyzer::new(config, None).analyze(query);
        assert!(disabled.secondary_intents.is_empty());
    }

    #[test]
    fn context_phrases_are_categorized() {
        let analysis = analyzer(None).analyze("show me recent methods in the billing package");
        assert!(analysis.contexts.get("temporal").is_some());
        assert!(analysis.contexts.get("scope").is_some());
    }
}

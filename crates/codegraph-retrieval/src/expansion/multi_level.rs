//! Three-level term expansion: naming patterns and compounds, then
//! synonyms and context variants, then graph and embedding neighbors, each
//! level seeded by the previous one and carrying a decreasing weight.

use super::compound;
use super::embedding::EmbeddingExpander;
use super::graph_terms::GraphTermExpander;
use super::patterns;
use super::synonyms;
use codegraph_core::config::ExpansionConfig;
use codegraph_core::types::{
    IntentAnalysis, QueryExpansion, QueryIntent, TermSource, WeightedTerm,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "does", "how", "what", "where", "when", "who",
    "why", "can", "are", "was", "were", "this", "that", "these", "them", "its", "has", "have",
    "had", "not", "but", "all", "any", "use", "you",
];

const LEVEL1_SEED_CARRYOVER: usize = 10;
const LEVEL2_SEED_CARRYOVER: usize = 5;

const HIGH_CONFIDENCE_CUTOFF: f64 = 0.8;
const MEDIUM_CONFIDENCE_CUTOFF: f64 = 0.5;

/// Class suffixes each intent favors in pattern expansions. `None` means no
/// filtering for that intent.
fn preferred_suffixes(intent: QueryIntent) -> Option<&'static [&'static str]> {
    match intent {
        QueryIntent::Implementation => Some(&["Impl", "Engine", "Processor", "Handler"]),
        QueryIntent::Usage => Some(&["Service", "Controller", "Provider"]),
        QueryIntent::Configuration => Some(&["Factory", "Builder", "Provider", "Manager"]),
        QueryIntent::Discovery => None,
        QueryIntent::Status => Some(&["Manager", "Helper", "Service"]),
    }
}

/// Substring boosts applied after merging, per intent.
fn intent_boosts(intent: QueryIntent) -> &'static [(&'static str, f64)] {
    match intent {
        QueryIntent::Implementation => &[
            ("impl", 0.15),
            ("engine", 0.15),
            ("processor", 0.15),
            ("internal", 0.1),
        ],
        QueryIntent::Usage => &[("client", 0.1), ("call", 0.1), ("usage", 0.1)],
        QueryIntent::Configuration => &[("config", 0.15), ("setting", 0.15), ("propert", 0.1)],
        QueryIntent::Discovery => &[("service", 0.1), ("manager", 0.1)],
        QueryIntent::Status => &[("status", 0.1), ("health", 0.1), ("version", 0.1)],
    }
}

pub struct MultiLevelExpander {
    config: ExpansionConfig,
    embedding: EmbeddingExpander,
    graph: GraphTermExpander,
}

impl MultiLevelExpander {
    pub fn new(
        config: ExpansionConfig,
        embedding: EmbeddingExpander,
        graph: GraphTermExpander,
    ) -> Self {
        Self {
            config,
            embedding,
            graph,
        }
    }

    pub fn expand(&self, query: &str, intent: &IntentAnalysis) -> QueryExpansion {
        let base_terms = extract_base_terms(query);
        if base_terms.is_empty() {
            return empty_expansion(query, intent.primary_intent);
        }

        let level1 = self.expand_level1(&base_terms, intent.primary_intent);
        let level2 = self.expand_level2(&base_terms, &level1, intent);
        let level3 = self.expand_level3(&base_terms, &level2);

        let mut level_counts = BTreeMap::new();
        level_counts.insert("base".to_string(), base_terms.len());
        level_counts.insert("level1".to_string(), level1.len());
        level_counts.insert("level2".to_string(), level2.len());
        level_counts.insert("level3".to_string(), level3.len());

        // Max-merge across base terms and all three levels.
        let mut merged: HashMap<String, WeightedTerm> = HashMap::new();
        let base_weighted = base_terms
            .iter()
            .map(|term| WeightedTerm::new(term.clone(), 1.0, TermSource::Base));
        for term in base_weighted.chain(level1).chain(level2).chain(level3) {
            match merged.remove(&term.term) {
                Some(existing) => {
                    let kept = existing.merge(term);
                    merged.insert(kept.term.clone(), kept);
                }
                None => {
                    merged.insert(term.term.clone(), term);
                }
            }
        }

        apply_intent_boosts(&mut merged, intent.primary_intent);

        let mut all_terms: Vec<WeightedTerm> = merged.into_values().collect();
        all_terms.sort_by(|left, right| {
            right
                .weight
                .partial_cmp(&left.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| left.term.cmp(&right.term))
        });
        all_terms.truncate(self.config.max_total_expansions);

        let high_confidence = bucket(&all_terms, |w| w >= HIGH_CONFIDENCE_CUTOFF);
        let medium_confidence = bucket(&all_terms, |w| {
            (MEDIUM_CONFIDENCE_CUTOFF..HIGH_CONFIDENCE_CUTOFF).contains(&w)
        });
        let low_confidence = bucket(&all_terms, |w| w < MEDIUM_CONFIDENCE_CUTOFF);

        debug!(
            query,
            total = all_terms.len(),
            high = high_confidence.len(),
            medium = medium_confidence.len(),
            low = low_confidence.len(),
            "query expanded"
        );
        QueryExpansion {
            original_query: query.to_string(),
            intent: intent.primary_intent,
            all_terms,
            high_confidence,
            medium_confidence,
            low_confidence,
            level_counts,
        }
    }

    /// Level 1: naming patterns and compounds of the base terms, filtered by
    /// the intent's preferred suffixes.
    fn expand_level1(&self, base_terms: &[String], intent: QueryIntent) -> Vec<WeightedTerm> {
        let weight = self.config.level1_weight;
        let cap = self.config.max_expansions_per_term;
        let mut out = Vec::new();

        for term in base_terms {
            for candidate in patterns::expand(term, cap) {
                if keeps_intent_suffix(&candidate, intent) {
                    out.push(WeightedTerm::new(candidate, weight, TermSource::Pattern));
                }
            }
        }
        for candidate in compound::generate(base_terms, cap * base_terms.len().max(1)) {
            out.push(WeightedTerm::new(candidate, weight, TermSource::Compound));
        }
        out
    }

    /// Level 2: synonym and context-variant expansion of the base terms plus
    /// the top level-1 terms.
    fn expand_level2(
        &self,
        base_terms: &[String],
        level1: &[WeightedTerm],
        intent: &IntentAnalysis,
    ) -> Vec<WeightedTerm> {
        let weight = self.config.level2_weight;
        let cap = self.config.max_expansions_per_term;
        let seeds = seed_terms(base_terms, level1, LEVEL1_SEED_CARRYOVER);
        let context_keywords: Vec<String> = intent
            .contexts
            .values()
            .flatten()
            .cloned()
            .chain(std::iter::once(intent.original_query.to_lowercase()))
            .collect();

        let mut out = Vec::new();
        for seed in &seeds {
            for candidate in synonyms::expand(seed, cap) {
                out.push(WeightedTerm::new(candidate, weight, TermSource::Semantic));
            }
            for candidate in synonyms::cluster_members(seed) {
                out.push(WeightedTerm::new(candidate, weight, TermSource::Semantic));
            }
            for candidate in synonyms::context_variants(seed, &context_keywords, cap) {
                out.push(WeightedTerm::new(candidate, weight, TermSource::Semantic));
            }
        }
        out
    }

    /// Level 3: graph-relationship and embedding-similarity expansion of the
    /// base terms plus the top level-2 terms, fanned out over a bounded
    /// worker pool.
    fn expand_level3(&self, base_terms: &[String], level2: &[WeightedTerm]) -> Vec<WeightedTerm> {
        let weight = self.config.level3_weight;
        let seeds = seed_terms(base_terms, level2, LEVEL2_SEED_CARRYOVER);
        if seeds.is_empty() {
            return Vec::new();
        }

        let workers = self.config.workers.max(1).min(seeds.len());
        let chunk_size = seeds.len().div_ceil(workers);
        let mut out: Vec<WeightedTerm> = Vec::new();

        std::thread::scope(|scope| {
            let handles: Vec<_> = seeds
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        let mut found = Vec::new();
                        for seed in chunk {
                            for related in self.graph.expand(seed) {
                                // Graph co-occurrence strength maps into
                                // [0.5, 1.0] of the level weight.
                                let scaled =
                                    (weight * (0.5 + related.score)).min(weight);
                                found.push(WeightedTerm::new(
                                    related.term,
                                    scaled,
                                    TermSource::Graph,
                                ));
                            }
                            for similar in self.embedding.expand(seed) {
                                found.push(WeightedTerm::new(
                                    similar.term,
                                    weight * similar.similarity.clamp(0.0, 1.0),
                                    TermSource::Embedding,
                                ));
                            }
                        }
                        found
                    })
                })
                .collect();
            for handle in handles {
                if let Ok(found) = handle.join() {
                    out.extend(found);
                }
            }
        });
        out
    }
}

/// Tokenize the query preserving original casing, dropping stop words and
/// tokens of length <= 2; dedup case-insensitively keeping first occurrence.
pub fn extract_base_terms(query: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut terms = Vec::new();
    for token in query.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if token.len() <= 2 {
            continue;
        }
        let lower = token.to_lowercase();
        if STOP_WORDS.contains(&lower.as_str()) || !seen.insert(lower) {
            continue;
        }
        terms.push(token.to_string());
    }
    terms
}

fn empty_expansion(query: &str, intent: QueryIntent) -> QueryExpansion {
    QueryExpansion {
        original_query: query.to_string(),
        intent,
        all_terms: Vec::new(),
        high_confidence: Vec::new(),
        medium_confidence: Vec::new(),
        low_confidence: Vec::new(),
        level_counts: BTreeMap::new(),
    }
}

fn seed_terms(base_terms: &[String], previous: &[WeightedTerm], carryover: usize) -> Vec<String> {
    let mut seeds: Vec<String> = base_terms.to_vec();
    let mut ranked: Vec<&WeightedTerm> = previous.iter().collect();
    ranked.sort_by(|left, right| {
        right
            .weight
            .partial_cmp(&left.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| left.term.cmp(&right.term))
    });
    for term in ranked.into_iter().take(carryover) {
        if !seeds.iter().any(|seed| seed.eq_ignore_ascii_case(&term.term)) {
            seeds.push(term.term.clone());
        }
    }
    seeds
}

fn keeps_intent_suffix(candidate: &str, intent: QueryIntent) -> bool {
    match preferred_suffixes(intent) {
        None => true,
        Some(preferred) => preferred.iter().any(|suffix| candidate.ends_with(suffix)),
    }
}

fn apply_intent_boosts(merged: &mut HashMap<String, WeightedTerm>, intent: QueryIntent) {
    for weighted in merged.values_mut() {
        let lower = weighted.term.to_lowercase();
        for (substring, boost) in intent_boosts(intent) {
            if lower.contains(substring) {
                weighted.weight = (weighted.weight + boost).min(1.0);
                break;
            }
        }
    }
}

fn bucket(terms: &[WeightedTerm], keep: impl Fn(f64) -> bool) -> Vec<WeightedTerm> {
    terms
        .iter()
        .filter(|term| keep(term.weight))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_terms_preserve_case_and_drop_stop_words() {
        let terms = extract_base_terms("How does PaymentService process a refund?");
        assert_eq!(terms, vec!["PaymentService", "process", "refund"]);
    }

    #[test]
    fn base_terms_dedup_case_insensitively() {
        let terms = extract_base_terms("refund Refund REFUND processing");
        assert_eq!(terms, vec!["refund", "processing"]);
    }

    #[test]
    fn implementation_intent_filters_suffix_patterns() {
        assert!(keeps_intent_suffix(
            "PaymentServiceImpl",
            QueryIntent::Implementation
        ));
        assert!(!keeps_intent_suffix(
            "PaymentServiceRepository",
            QueryIntent::Implementation
        ));
        assert!(!keeps_intent_suffix(
            "getPaymentService",
            QueryIntent::Implementation
        ));
        // Discovery applies no filter.
        assert!(keeps_intent_suffix(
            "PaymentServiceRepository",
            QueryIntent::Discovery
        ));
    }

    #[test]
    fn intent_boosts_clamp_at_one() {
        let mut merged = HashMap::new();
        merged.insert(
            "RefundEngine".to_string(),
            WeightedTerm::new("RefundEngine", 0.95, TermSource::Pattern),
        );
        merged.insert(
            "refund".to_string(),
            WeightedTerm::new("refund", 0.6, TermSource::Base),
        );
        apply_intent_boosts(&mut merged, QueryIntent::Implementation);
        assert_eq!(merged.get("RefundEngine").unwrap().weight, 1.0);
        assert_eq!(merged.get("refund").unwrap().weight, 0.6);
    }

    #[test]
    fn seed_terms_carry_over_top_previous_terms() {
        let base = vec!["refund".to_string()];
        let previous = vec![
            WeightedTerm::new("low", 0.2, TermSource::Semantic),
            WeightedTerm::new("high", 0.9, TermSource::Semantic),
            WeightedTerm::new("Refund", 0.8, TermSource::Semantic),
        ];
        let seeds = seed_terms(&base, &previous, 1);
        // Top previous term carried; base-term duplicate would be skipped.
        assert_eq!(seeds, vec!["refund", "high"]);
    }
}

//! Quality filtering for expanded terms: relevance scoring against the
//! original query, tier assignment, and noise exclusion.

use super::patterns::split_identifier;
use super::synonyms;
use codegraph_core::config::ExpansionConfig;
use codegraph_core::types::{QueryIntent, WeightedTerm};
use std::collections::HashSet;
use tracing::debug;

const STRING_SIMILARITY_WEIGHT: f64 = 0.4;
const SEMANTIC_COHERENCE_WEIGHT: f64 = 0.3;
const NAMING_CONVENTION_WEIGHT: f64 = 0.2;
const TERM_QUALITY_WEIGHT: f64 = 0.1;

const SUBSTRING_SIMILARITY: f64 = 0.8;

const TIER1_WEIGHT_CUTOFF: f64 = 0.8;
const TIER2_WEIGHT_CUTOFF: f64 = 0.6;
const TIER2_SIMILARITY_CUTOFF: f64 = 0.5;
const TIER3_WEIGHT_CUTOFF: f64 = 0.3;

pub struct QualityFilter {
    config: ExpansionConfig,
}

impl QualityFilter {
    pub fn new(config: ExpansionConfig) -> Self {
        Self { config }
    }

    /// Filter and reorder expanded terms: tier 1, then tier 2, then tier 3
    /// capped to the remaining budget. Terms outside tier 1 must also clear
    /// the configured relevance threshold. Noise terms never survive.
    pub fn filter(
        &self,
        terms: &[WeightedTerm],
        query: &str,
        intent: QueryIntent,
    ) -> Vec<WeightedTerm> {
        let query_lower = query.to_lowercase();
        let query_tokens = split_identifier(query);

        let mut tiers: [Vec<(f64, WeightedTerm)>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for weighted in terms {
            if self.is_noise(&weighted.term) {
                continue;
            }
            let string_sim = string_similarity(
                &weighted.term,
                &query_lower,
                self.config.max_edit_distance,
            );
            let relevance = STRING_SIMILARITY_WEIGHT * string_sim
                + SEMANTIC_COHERENCE_WEIGHT
                    * semantic_coherence(&weighted.term, &query_tokens)
                + NAMING_CONVENTION_WEIGHT * naming_convention_score(&weighted.term)
                + TERM_QUALITY_WEIGHT * term_quality(&weighted.term);

            let tier = if weighted.weight >= TIER1_WEIGHT_CUTOFF
                || query_lower.contains(&weighted.term.to_lowercase())
                || is_intent_signature_term(&weighted.term, intent)
            {
                0
            } else if relevance < self.config.relevance_threshold {
                continue;
            } else if weighted.weight >= TIER2_WEIGHT_CUTOFF
                || string_sim >= TIER2_SIMILARITY_CUTOFF
            {
                1
            } else if weighted.weight >= TIER3_WEIGHT_CUTOFF {
                2
            } else {
                continue;
            };
            tiers[tier].push((relevance, weighted.clone()));
        }

        for tier in &mut tiers {
            tier.sort_by(|left, right| {
                right
                    .0
                    .partial_cmp(&left.0)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| left.1.term.cmp(&right.1.term))
            });
        }

        let budget = self.config.max_total_expansions;
        let mut out: Vec<WeightedTerm> = Vec::new();
        let [tier1, tier2, tier3] = tiers;
        for (_, term) in tier1.into_iter().chain(tier2) {
            if out.len() >= budget {
                break;
            }
            out.push(term);
        }
        for (_, term) in tier3 {
            if out.len() >= budget {
                break;
            }
            out.push(term);
        }

        debug!(query, kept = out.len(), dropped = terms.len() - out.len(), "expansion filtered");
        out
    }

    /// Blacklisted, single-character, or purely numeric terms are noise
    /// regardless of weight.
    fn is_noise(&self, term: &str) -> bool {
        let trimmed = term.trim();
        if trimmed.chars().count() <= 1 {
            return true;
        }
        if trimmed.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
        let lower = trimmed.to_lowercase();
        let pieces = split_identifier(trimmed);
        self.config
            .noise_terms
            .iter()
            .any(|noise| lower == *noise || pieces.contains(noise))
    }
}

/// Exact match 1.0; substring containment 0.8; bounded edit distance; else
/// Jaccard over identifier pieces.
fn string_similarity(term: &str, query_lower: &str, max_edit_distance: usize) -> f64 {
    let term_lower = term.to_lowercase();
    if term_lower == query_lower {
        return 1.0;
    }
    if query_lower.contains(&term_lower) || term_lower.contains(query_lower) {
        return SUBSTRING_SIMILARITY;
    }
    let distance = edit_distance(&term_lower, query_lower);
    if distance <= max_edit_distance {
        let longest = term_lower.chars().count().max(query_lower.chars().count());
        if longest > 0 {
            return 1.0 - distance as f64 / longest as f64;
        }
    }
    // Split the original casing; lowercasing first would erase camel humps.
    jaccard(&split_identifier(term), &split_identifier(query_lower))
}

/// Token overlap with the query, nudged up when a term piece shares a
/// semantic cluster with a query token.
fn semantic_coherence(term: &str, query_tokens: &[String]) -> f64 {
    let term_tokens = split_identifier(term);
    let mut score = jaccard(&term_tokens, query_tokens);
    'outer: for piece in &term_tokens {
        for members in [synonyms::cluster_members(piece), synonyms::expand(piece, 8)] {
            if members.iter().any(|member| query_tokens.contains(member)) {
                score += 0.3;
                break 'outer;
            }
        }
    }
    score.min(1.0)
}

/// How much the term looks like a real code identifier.
fn naming_convention_score(term: &str) -> f64 {
    let has_upper = term.chars().any(char::is_uppercase);
    let has_lower = term.chars().any(char::is_lowercase);
    let has_underscore = term.contains('_');
    let alnum = term.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.');
    if !alnum {
        return 0.2;
    }
    if has_upper && has_lower {
        return 1.0;
    }
    if has_underscore && has_lower {
        return 0.7;
    }
    if has_lower {
        return 0.5;
    }
    0.2
}

/// Length-based usefulness of the term as a search key.
fn term_quality(term: &str) -> f64 {
    match term.chars().count() {
        4..=30 => 1.0,
        3 => 0.6,
        _ => 0.3,
    }
}

fn jaccard(left: &[String], right: &[String]) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let left_set: HashSet<&String> = left.iter().collect();
    let right_set: HashSet<&String> = right.iter().collect();
    let intersection = left_set.intersection(&right_set).count();
    let union = left_set.union(&right_set).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Terms whose shape directly signals the intent, promoted to tier 1.
fn is_intent_signature_term(term: &str, intent: QueryIntent) -> bool {
    match intent {
        QueryIntent::Implementation => {
            term.ends_with("Impl") || term.ends_with("Engine") || term.ends_with("Processor")
        }
        QueryIntent::Configuration => {
            let lower = term.to_lowercase();
            lower.contains("config") || lower.contains("setting")
        }
        _ => false,
    }
}

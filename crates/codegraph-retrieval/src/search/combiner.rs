//! Score fusion: one weighted score per unique node from the lexical and
//! vector channels, with a boost for nodes found by both.

use codegraph_core::config::SearchConfig;
use codegraph_core::types::{RankedResult, SearchHit};
use std::collections::BTreeMap;
use tracing::debug;

/// Squash an unbounded lexical index score into [0, 1).
pub fn normalize_lexical_score(raw: f64) -> f64 {
    let raw = raw.max(0.0);
    raw / (raw + 1.0)
}

/// Vector scores are cosine similarities; clamp into [0, 1].
pub fn normalize_vector_score(raw: f64) -> f64 {
    raw.clamp(0.0, 1.0)
}

#[derive(Debug, Default)]
struct Accumulator {
    fulltext_raw: f64,
    vector_raw: f64,
    has_fulltext: bool,
    has_vector: bool,
}

/// Fuse per-node scores: normalize, weight, sum, boost dual matches, drop
/// sub-threshold entries, sort descending, cap.
pub fn combine(
    lexical: &[SearchHit],
    vector: &[SearchHit],
    config: &SearchConfig,
) -> Vec<RankedResult> {
    let mut accumulators: BTreeMap<String, Accumulator> = BTreeMap::new();
    for hit in lexical {
        let entry = accumulators.entry(hit.node_id.clone()).or_default();
        entry.fulltext_raw = entry.fulltext_raw.max(normalize_lexical_score(hit.score));
        entry.has_fulltext = true;
    }
    for hit in vector {
        let entry = accumulators.entry(hit.node_id.clone()).or_default();
        entry.vector_raw = entry.vector_raw.max(normalize_vector_score(hit.score));
        entry.has_vector = true;
    }

    let mut results: Vec<RankedResult> = Vec::with_capacity(accumulators.len());
    for (node_id, acc) in accumulators {
        let fulltext_score = acc.fulltext_raw * config.fulltext_weight;
        let vector_score = acc.vector_raw * config.vector_weight;
        let mut combined_score = fulltext_score + vector_score;
        if acc.has_fulltext && acc.has_vector {
            combined_score *= config.dual_match_boost;
        }
        if combined_score < config.score_threshold {
            continue;
        }
        results.push(RankedResult {
            node_id,
            fulltext_score,
            vector_score,
            combined_score,
            has_fulltext_match: acc.has_fulltext,
            has_vector_match: acc.has_vector,
        });
    }

    results.sort_by(|left, right| {
        right
            .combined_score
            .partial_cmp(&left.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| left.node_id.cmp(&right.node_id))
    });
    results.truncate(config.max_combined_results);
    debug!(results = results.len(), "search channels combined");
    results
}

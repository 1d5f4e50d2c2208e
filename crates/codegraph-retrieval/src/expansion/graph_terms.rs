//! Graph-relationship expansion: terms discovered by walking the knowledge
//! graph outward from nodes whose names match the input term.

use codegraph_core::types::RelatedTerm;
use codegraph_store::GraphStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

pub struct GraphTermExpander {
    store: Arc<dyn GraphStore>,
    depth: usize,
    max_output: usize,
}

impl GraphTermExpander {
    pub fn new(store: Arc<dyn GraphStore>, depth: usize, max_output: usize) -> Self {
        Self {
            store,
            depth,
            max_output,
        }
    }

    /// Run the four relationship queries concurrently and merge their
    /// results. A failed query logs and contributes nothing.
    pub fn expand(&self, term: &str) -> Vec<RelatedTerm> {
        if term.trim().is_empty() || self.max_output == 0 {
            return Vec::new();
        }
        let store = &self.store;
        let depth = self.depth;

        let mut collected: Vec<RelatedTerm> = Vec::new();
        std::thread::scope(|scope| {
            let related = scope.spawn(move || store.related_terms(term, depth));
            let hierarchy = scope.spawn(move || store.hierarchy_terms(term));
            let call_chain = scope.spawn(move || store.call_chain_terms(term));
            let siblings = scope.spawn(move || store.package_sibling_terms(term));

            for (label, handle) in [
                ("related", related),
                ("hierarchy", hierarchy),
                ("call_chain", call_chain),
                ("package_siblings", siblings),
            ] {
                match handle.join() {
                    Ok(Ok(terms)) => collected.extend(terms),
                    Ok(Err(err)) => {
                        warn!(term, query = label, error = %err, "graph term query failed");
                    }
                    Err(_) => {
                        warn!(term, query = label, "graph term query panicked");
                    }
                }
            }
        });

        merge_related_terms(collected, self.max_output)
    }
}

/// Dedup by term keeping the closest (then highest-scored) entry; sort by
/// (distance asc, score desc, term asc).
fn merge_related_terms(collected: Vec<RelatedTerm>, max_output: usize) -> Vec<RelatedTerm> {
    let mut best: HashMap<String, RelatedTerm> = HashMap::new();
    for candidate in collected {
        match best.get_mut(&candidate.term) {
            Some(existing) => {
                let better = candidate.distance < existing.distance
                    || (candidate.distance == existing.distance
                        && candidate.score > existing.score);
                if better {
                    *existing = candidate;
                }
            }
            None => {
                best.insert(candidate.term.clone(), candidate);
            }
        }
    }

    let mut merged: Vec<RelatedTerm> = best.into_values().collect();
    merged.sort_by(|left, right| {
        left.distance
            .cmp(&right.distance)
            .then_with(|| {
                right
                    .score
                    .partial_cmp(&left.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| left.term.cmp(&right.term))
    });
    merged.truncate(max_output);
    merged
}

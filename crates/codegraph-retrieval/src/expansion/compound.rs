//! Compound-term generation: ordered multi-term concatenations in common
//! code naming styles, seeded with semantic-cluster alternatives.

use super::patterns::{capitalize, decapitalize};
use super::synonyms;

const COMPOUND_SUFFIXES: &[&str] = &["Service", "Manager", "Processor", "Handler"];

const CALL_PREFIXES: &[&str] = &["get", "process", "handle"];

// Cluster alternatives considered per input term when combining.
const CLUSTER_ALTERNATIVES_PER_TERM: usize = 2;

/// Generate compound candidates from two or more input terms, capped at
/// `max_output`. Single-term input yields only suffix forms.
pub fn generate(terms: &[String], max_output: usize) -> Vec<String> {
    if terms.is_empty() || max_output == 0 {
        return Vec::new();
    }

    // Each term contributes itself plus a couple of cluster alternatives.
    let mut pools: Vec<Vec<String>> = Vec::with_capacity(terms.len());
    for term in terms {
        let mut pool = vec![term.clone()];
        for alternative in synonyms::cluster_members(term)
            .into_iter()
            .take(CLUSTER_ALTERNATIVES_PER_TERM)
        {
            pool.push(alternative);
        }
        pools.push(pool);
    }

    let mut out: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !out.contains(&candidate) {
            out.push(candidate);
        }
    };

    // Suffix and call-prefix forms of each single term.
    for pool in &pools {
        for term in pool {
            for suffix in COMPOUND_SUFFIXES {
                push(format!("{}{suffix}", capitalize(term)));
            }
        }
    }

    // Ordered pairs, both orders, in camelCase and snake_case.
    for (i, left_pool) in pools.iter().enumerate() {
        for (j, right_pool) in pools.iter().enumerate() {
            if i == j {
                continue;
            }
            for left in left_pool {
                for right in right_pool {
                    push(camel_join(&[left, right]));
                    push(snake_join(&[left, right]));
                    for prefix in CALL_PREFIXES {
                        push(format!("{prefix}{}{}", capitalize(left), capitalize(right)));
                    }
                }
            }
        }
    }

    // Ordered triples (original terms only, both directions of the first
    // three terms) when enough input exists.
    if terms.len() >= 3 {
        let t: Vec<&str> = terms.iter().take(3).map(String::as_str).collect();
        push(camel_join(&[t[0], t[1], t[2]]));
        push(camel_join(&[t[2], t[1], t[0]]));
        push(snake_join(&[t[0], t[1], t[2]]));
    }

    out.truncate(max_output);
    out
}

fn camel_join(parts: &[&str]) -> String {
    let mut joined = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            joined.push_str(&decapitalize(part));
        } else {
            joined.push_str(&capitalize(part));
        }
    }
    joined
}

fn snake_join(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

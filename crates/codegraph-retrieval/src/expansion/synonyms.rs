//! Static domain-synonym and semantic-cluster tables, with context-aware
//! variants. All lookups are case-insensitive over lowercase keys.

use super::patterns::capitalize;

/// Domain noun synonyms. Lookup works in both directions: a term matching
/// any member of a row expands to the other members.
const DOMAIN_SYNONYMS: &[&[&str]] = &[
    &["payment", "transaction", "billing", "charge"],
    &["refund", "reimbursement", "chargeback"],
    &["user", "account", "customer", "client"],
    &["order", "purchase", "checkout"],
    &["config", "configuration", "settings", "properties"],
    &["error", "exception", "failure", "fault"],
    &["auth", "authentication", "authorization", "login"],
    &["cache", "store", "repository"],
    &["message", "event", "notification"],
    &["database", "storage", "persistence"],
];

/// Verb synonyms applied to method-ish terms.
const ACTION_SYNONYMS: &[&[&str]] = &[
    &["process", "handle", "execute", "run"],
    &["create", "build", "generate", "make"],
    &["get", "fetch", "retrieve", "load"],
    &["update", "modify", "change", "edit"],
    &["delete", "remove", "drop"],
    &["validate", "verify", "check"],
    &["send", "publish", "emit", "dispatch"],
    &["parse", "decode", "read"],
];

/// Conceptual clusters used by the compound generator before combining.
const SEMANTIC_CLUSTERS: &[&[&str]] = &[
    &["pipeline", "workflow", "chain", "flow"],
    &["search", "query", "lookup", "retrieval"],
    &["rank", "score", "weight", "sort"],
    &["graph", "network", "tree"],
    &["index", "catalog", "registry"],
    &["worker", "task", "job", "executor"],
];

/// Context keyword to typed-variant prefixes. Triggered by the intent's
/// context phrases or by the keyword appearing among the terms.
const CONTEXT_VARIANTS: &[(&str, &[&str])] = &[
    ("async", &["Async", "Reactive"]),
    ("batch", &["Batch", "Bulk"]),
    ("stream", &["Stream", "Streaming"]),
    ("distributed", &["Distributed", "Remote"]),
];

fn table_neighbors(tables: &[&[&str]], term_lower: &str) -> Vec<String> {
    let mut out = Vec::new();
    for row in tables {
        if !row.contains(&term_lower) {
            continue;
        }
        for member in *row {
            if *member != term_lower && !out.contains(&(*member).to_string()) {
                out.push((*member).to_string());
            }
        }
    }
    out
}

/// Domain and action synonyms for one term, capped at `max_output`.
pub fn expand(term: &str, max_output: usize) -> Vec<String> {
    let term_lower = term.trim().to_lowercase();
    if term_lower.is_empty() || max_output == 0 {
        return Vec::new();
    }
    let mut out = table_neighbors(DOMAIN_SYNONYMS, &term_lower);
    for synonym in table_neighbors(ACTION_SYNONYMS, &term_lower) {
        if !out.contains(&synonym) {
            out.push(synonym);
        }
    }
    out.truncate(max_output);
    out
}

/// Cluster members for one term (conceptual neighbors, not strict synonyms).
pub fn cluster_members(term: &str) -> Vec<String> {
    table_neighbors(SEMANTIC_CLUSTERS, &term.trim().to_lowercase())
}

/// Typed variants triggered by context keywords found in the query or the
/// intent's context phrases, e.g. "async" + "processor" -> "AsyncProcessor".
pub fn context_variants(term: &str, context_keywords: &[String], max_output: usize) -> Vec<String> {
    let mut out = Vec::new();
    let capitalized = capitalize(term.trim());
    if capitalized.is_empty() {
        return out;
    }
    for (keyword, prefixes) in CONTEXT_VARIANTS {
        let triggered = context_keywords
            .iter()
            .any(|phrase| phrase.to_lowercase().contains(keyword));
        if !triggered {
            continue;
        }
        for prefix in *prefixes {
            let candidate = format!("{prefix}{capitalized}");
            if !out.contains(&candidate) {
                out.push(candidate);
            }
            if out.len() >= max_output {
                return out;
            }
        }
    }
    out
}

use codegraph_core::types::{ExtractedEntities, WeightedTerm};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

// PascalCase identifier, e.g. "PaymentService".
static CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)+$").unwrap());

// camelCase or snake_case with a verb-ish first piece, e.g. "processRefund".
static METHOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9]*(?:[A-Z][a-z0-9]*|_[a-z0-9]+)+$").unwrap());

// Dotted path, e.g. "com.acme.billing".
static PACKAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*(?:\.[a-z][a-z0-9_]*)+$").unwrap());

/// Classifies filtered expansion terms into the candidate entity shapes the
/// search stage fans out over. Each list preserves first-occurrence order
/// with duplicates removed.
pub fn extract_entities(terms: &[WeightedTerm]) -> ExtractedEntities {
    let mut out = ExtractedEntities::default();
    let mut seen: HashSet<String> = HashSet::new();

    for weighted in terms {
        let term = weighted.term.trim();
        if term.is_empty() || !seen.insert(term.to_lowercase()) {
            continue;
        }
        if PACKAGE_RE.is_match(term) {
            out.packages.push(term.to_string());
        } else if CLASS_RE.is_match(term) {
            out.classes.push(term.to_string());
        } else if METHOD_RE.is_match(term) {
            out.methods.push(term.to_string());
        } else {
            out.terms.push(term.to_string());
        }
    }

    debug!(
        classes = out.classes.len(),
        methods = out.methods.len(),
        packages = out.packages.len(),
        terms = out.terms.len(),
        "entities extracted"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::types::TermSource;

    fn terms(raw: &[&str]) -> Vec<WeightedTerm> {
        raw.iter()
            .map(|t| WeightedTerm::new(*t, 1.0, TermSource::Base))
            .collect()
    }

    #[test]
    fn classifies_by_identifier_shape() {
        let out = extract_entities(&terms(&[
            "PaymentService",
            "processRefund",
            "com.acme.billing",
            "refund",
            "validate_refund",
        ]));
        assert_eq!(out.classes, vec!["PaymentService"]);
        assert_eq!(out.methods, vec!["processRefund", "validate_refund"]);
        assert_eq!(out.packages, vec!["com.acme.billing"]);
        assert_eq!(out.terms, vec!["refund"]);
    }

    #[test]
    fn dedup_preserves_first_occurrence_case_insensitively() {
        let out = extract_entities(&terms(&["refund", "Refund", "refund"]));
        assert_eq!(out.terms, vec!["refund"]);
        assert!(out.classes.is_empty());
    }

    #[test]
    fn empty_input_yields_empty_entities() {
        let out = extract_entities(&[]);
        assert!(out.is_empty());
    }
}

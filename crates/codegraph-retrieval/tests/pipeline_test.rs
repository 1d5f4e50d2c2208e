//! End-to-end pipeline tests against the SQLite/Tantivy reference store.

use codegraph_core::config::Config;
use codegraph_core::types::{EntityKind, GraphNode, GraphRelationship, QueryIntent};
use codegraph_retrieval::RetrievalEngine;
use codegraph_store::embedding::deterministic_embedding;
use codegraph_store::fulltext::EntityDocument;
use codegraph_store::sqlite::SqliteGraphStore;
use codegraph_store::{EmbeddingIndex, LexicalScope};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

const DIMS: usize = 64;

fn node(id: &str, kind: EntityKind, name: &str, extra: &[(&str, serde_json::Value)]) -> GraphNode {
    let mut properties = BTreeMap::new();
    properties.insert("name".to_string(), serde_json::json!(name));
    for (key, value) in extra {
        properties.insert((*key).to_string(), value.clone());
    }
    GraphNode {
        id: id.to_string(),
        kind,
        properties,
    }
}

fn rel(id: &str, rel_type: &str, start: &str, end: &str) -> GraphRelationship {
    GraphRelationship {
        id: id.to_string(),
        rel_type: rel_type.to_string(),
        start_node_id: start.to_string(),
        end_node_id: end.to_string(),
        properties: BTreeMap::new(),
    }
}

fn doc(node_id: &str, name: &str, signature: &str, context: &str, content: &str) -> EntityDocument {
    EntityDocument {
        node_id: node_id.to_string(),
        name: name.to_string(),
        signature: signature.to_string(),
        context: context.to_string(),
        content: content.to_string(),
    }
}

/// A small billing codebase: PaymentService with a refund call chain.
fn seed_store(store: &SqliteGraphStore) {
    let class_id = "class:PaymentService";
    let process_id = "method:PaymentService.processRefund";
    let validate_id = "method:PaymentService.validateRefund";
    let audit_id = "method:RefundAuditor.recordRefund";

    store
        .upsert_node(&node(
            class_id,
            EntityKind::Class,
            "PaymentService",
            &[
                ("package", serde_json::json!("com.acme.billing")),
                ("visibility", serde_json::json!("public")),
            ],
        ))
        .unwrap();
    store
        .upsert_node(&node(
            process_id,
            EntityKind::Method,
            "processRefund",
            &[
                ("signature", serde_json::json!("processRefund(String orderId)")),
                ("class", serde_json::json!("PaymentService")),
                ("visibility", serde_json::json!("public")),
            ],
        ))
        .unwrap();
    store
        .upsert_node(&node(
            validate_id,
            EntityKind::Method,
            "validateRefund",
            &[("class", serde_json::json!("PaymentService"))],
        ))
        .unwrap();
    store
        .upsert_node(&node(
            audit_id,
            EntityKind::Method,
            "recordRefund",
            &[("class", serde_json::json!("RefundAuditor"))],
        ))
        .unwrap();

    store
        .upsert_relationship(&rel("r1", "HAS_METHOD", class_id, process_id))
        .unwrap();
    store
        .upsert_relationship(&rel("r2", "CALLS", process_id, validate_id))
        .unwrap();
    store
        .upsert_relationship(&rel("r3", "CALLS", process_id, audit_id))
        .unwrap();

    store
        .index_document(
            LexicalScope::Classes,
            &doc(
                class_id,
                "PaymentService",
                "class PaymentService",
                "com.acme.billing",
                "payment service handling refunds and charges",
            ),
        )
        .unwrap();
    store
        .index_document(
            LexicalScope::Methods,
            &doc(
                process_id,
                "processRefund",
                "processRefund(String orderId)",
                "PaymentService",
                "process a refund for a payment order",
            ),
        )
        .unwrap();
    store
        .index_document(
            LexicalScope::Methods,
            &doc(
                validate_id,
                "validateRefund",
                "validateRefund(String orderId)",
                "PaymentService",
                "validate a refund request before processing",
            ),
        )
        .unwrap();
    store.commit().unwrap();

    let embeddings = [
        (class_id, EmbeddingIndex::Class, "payment service refunds"),
        (process_id, EmbeddingIndex::Method, "process refund payment"),
        (validate_id, EmbeddingIndex::Method, "validate refund request"),
        (audit_id, EmbeddingIndex::Method, "record refund audit entry"),
    ];
    for (node_id, index, text) in embeddings {
        store
            .upsert_embedding(node_id, index, &deterministic_embedding(text, DIMS))
            .unwrap();
    }

    let descriptions = [
        (class_id, "Payment service handling refunds and charges"),
        (process_id, "Processes a refund for a payment order"),
        (validate_id, "Validates a refund request before processing"),
        (audit_id, "Records refund audit entries"),
    ];
    for (node_id, text) in descriptions {
        store.upsert_description(node_id, text).unwrap();
    }
}

fn engine_with_threshold(dir: &TempDir, score_threshold: f64) -> RetrievalEngine {
    let store = SqliteGraphStore::open(dir.path()).unwrap();
    seed_store(&store);
    let mut config = Config::default();
    config.models.embedding.dimensions = DIMS;
    config.search.score_threshold = score_threshold;
    RetrievalEngine::new(Arc::new(store), config).unwrap()
}

// Tiny-corpus BM25 scores normalize low, so the E2E engine uses a fusion
// threshold suited to a four-node fixture.
fn engine(dir: &TempDir) -> RetrievalEngine {
    engine_with_threshold(dir, 0.05)
}

#[test]
fn payment_refund_query_runs_end_to_end() {
    let dir = TempDir::new().unwrap();
    let outcome = engine(&dir).retrieve("How does PaymentService process a refund?");

    // Intent: pattern "how does" at the start of the query.
    assert_eq!(outcome.intent.primary_intent, QueryIntent::Implementation);
    assert!(outcome.intent.confidence > 0.7);

    // Expansion surfaces the naming-convention candidates.
    let terms: Vec<&str> = outcome
        .expansion
        .all_terms
        .iter()
        .map(|t| t.term.as_str())
        .collect();
    assert!(terms.contains(&"PaymentServiceImpl"));
    assert!(terms.contains(&"processRefund"));
    assert!(terms.contains(&"RefundProcessor"));

    // Search found lexical hits and fused them.
    assert!(!outcome.results.is_empty());
    assert!(outcome.results.iter().any(|r| r.has_fulltext_match));
    let lexical_hits: usize = outcome.metadata["lexical_hits"].parse().unwrap();
    assert!(lexical_hits >= 1);
    let vector_hits: usize = outcome.metadata["vector_hits"].parse().unwrap();
    assert!(vector_hits >= 1);

    // Two-hop expansion from the seeds reveals the call chain.
    assert!(outcome.subgraph.nodes.contains_key("method:PaymentService.validateRefund"));
    assert!(outcome.subgraph.nodes.contains_key("method:RefundAuditor.recordRefund"));

    // Final ranking is non-empty, ordered by similarity, and every survivor
    // shares at least one query term in its description.
    assert!(!outcome.ranked.is_empty());
    for pair in outcome.ranked.windows(2) {
        assert!(pair[0].similarity_score >= pair[1].similarity_score);
    }
    for ranked in &outcome.ranked {
        let description = ranked.description.to_lowercase();
        assert!(
            ["payment", "refund", "process"]
                .iter()
                .any(|term| description.contains(term)),
            "unexpected survivor: {}",
            ranked.description
        );
    }
}

#[test]
fn combined_scores_are_positive_and_bounded_sensibly() {
    let dir = TempDir::new().unwrap();
    let outcome = engine(&dir).retrieve("How does PaymentService process a refund?");
    for result in &outcome.results {
        assert!(result.combined_score >= 0.0);
        assert!(result.fulltext_score >= 0.0);
        assert!(result.vector_score >= 0.0);
    }
}

#[test]
fn empty_query_short_circuits_every_stage() {
    let dir = TempDir::new().unwrap();
    let outcome = engine(&dir).retrieve("   ");
    assert!(outcome.ranked.is_empty());
    assert!(outcome.results.is_empty());
    assert!(outcome.subgraph.is_empty());
    assert!(outcome.expansion.all_terms.is_empty());
    assert_eq!(
        outcome.metadata.get("reason").map(String::as_str),
        Some("empty query")
    );
}

#[test]
fn unmatched_query_reports_no_relevant_results() {
    let dir = TempDir::new().unwrap();
    // High fusion threshold keeps embedding noise out of the result set.
    let outcome = engine_with_threshold(&dir, 0.35).retrieve("zzz qqqq xxxxx");
    assert!(outcome.results.is_empty());
    assert!(outcome.ranked.is_empty());
    assert_eq!(
        outcome.metadata.get("outcome").map(String::as_str),
        Some("no relevant results found")
    );
}

#[test]
fn graph_metadata_documents_the_traversal() {
    let dir = TempDir::new().unwrap();
    let outcome = engine(&dir).retrieve("How does PaymentService process a refund?");
    assert_eq!(outcome.subgraph.metadata.get("depth").map(String::as_str), Some("2"));
    assert!(outcome.subgraph.metadata.contains_key("node_count"));
}

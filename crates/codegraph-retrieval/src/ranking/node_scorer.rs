//! Multi-factor node scoring over the expanded subgraph: search score,
//! graph-distance penalty, node-type boost, and property-based boosts.

use codegraph_core::config::ScoringConfig;
use codegraph_core::types::{EntityKind, RankedResult, ScoredNode, SubGraph};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Per-type multiplier of the base type boost.
fn type_boost_factor(kind: EntityKind) -> f64 {
    match kind {
        EntityKind::Method => 1.0,
        EntityKind::Description => 0.9,
        EntityKind::Class => 0.8,
        EntityKind::Interface => 0.7,
        EntityKind::Enum | EntityKind::FileDoc => 0.6,
        EntityKind::Package | EntityKind::Other => 0.5,
    }
}

pub struct NodeScorer {
    config: ScoringConfig,
}

impl NodeScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score every subgraph node. Seed search scores carry over; everything
    /// else starts from its boosts minus the distance penalty. Nodes under
    /// the minimum score are dropped.
    pub fn score(&self, subgraph: &SubGraph, results: &[RankedResult]) -> Vec<ScoredNode> {
        if subgraph.is_empty() {
            return Vec::new();
        }

        let search_scores: HashMap<&str, &RankedResult> = results
            .iter()
            .map(|result| (result.node_id.as_str(), result))
            .collect();
        let seeds: Vec<&str> = subgraph
            .nodes
            .keys()
            .map(String::as_str)
            .filter(|id| search_scores.contains_key(*id))
            .collect();
        let distances = bfs_distances(subgraph, &seeds);

        let mut scored = Vec::new();
        for (id, node) in &subgraph.nodes {
            let (fulltext, vector) = search_scores
                .get(id.as_str())
                .map(|result| (result.fulltext_score, result.vector_score))
                .unwrap_or((0.0, 0.0));

            let type_boost = self.config.type_boost * type_boost_factor(node.kind);
            let property_boost = property_boost(node);
            let distance = distances.get(id.as_str()).copied();
            let distance_penalty = match distance {
                Some(d) => (d as f64 * self.config.distance_penalty)
                    .min(self.config.max_distance_penalty),
                // Disconnected from every seed: maximum penalty.
                None => self.config.max_distance_penalty,
            };

            let score =
                (fulltext + vector + type_boost + property_boost - distance_penalty).max(0.0);
            if score < self.config.min_score {
                continue;
            }
            scored.push(ScoredNode {
                node: node.clone(),
                score,
            });
        }

        scored.sort_by(|left, right| {
            right
                .score
                .partial_cmp(&left.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| left.node.id.cmp(&right.node.id))
        });
        debug!(scored = scored.len(), total = subgraph.nodes.len(), "subgraph scored");
        scored
    }
}

/// Property-driven boost: visibility, annotations, and business tagging add;
/// flagged complexity subtracts.
fn property_boost(node: &codegraph_core::types::GraphNode) -> f64 {
    let mut boost = 0.0;
    if node.property_str("visibility") == Some("public") || node.property_bool("public") {
        boost += 0.1;
    }
    if node
        .properties
        .get("annotations")
        .is_some_and(|value| !value.as_array().map(Vec::is_empty).unwrap_or(true))
    {
        boost += 0.15;
    }
    if node.property_bool("business")
        || node
            .properties
            .get("business_tags")
            .is_some_and(|value| !value.as_array().map(Vec::is_empty).unwrap_or(true))
    {
        boost += 0.2;
    }
    if node.property_bool("high_complexity") {
        boost -= 0.1;
    }
    boost
}

/// Multi-source BFS over the subgraph's undirected adjacency. Seeds are at
/// distance 0; unreachable nodes are absent from the map.
pub fn bfs_distances<'a>(subgraph: &'a SubGraph, seeds: &[&'a str]) -> HashMap<&'a str, usize> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for rel in &subgraph.relationships {
        adjacency
            .entry(rel.start_node_id.as_str())
            .or_default()
            .push(rel.end_node_id.as_str());
        adjacency
            .entry(rel.end_node_id.as_str())
            .or_default()
            .push(rel.start_node_id.as_str());
    }

    let mut distances: HashMap<&str, usize> = HashMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    for seed in seeds {
        if subgraph.nodes.contains_key(*seed) && !distances.contains_key(*seed) {
            distances.insert(*seed, 0);
            queue.push_back(*seed);
        }
    }
    while let Some(current) = queue.pop_front() {
        let next = distances[current] + 1;
        let Some(neighbors) = adjacency.get(current) else {
            continue;
        };
        for neighbor in neighbors {
            if subgraph.nodes.contains_key(*neighbor) && !distances.contains_key(*neighbor) {
                distances.insert(*neighbor, next);
                queue.push_back(*neighbor);
            }
        }
    }
    distances
}

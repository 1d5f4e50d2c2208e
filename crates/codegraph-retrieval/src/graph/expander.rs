//! Bounded graph expansion: builds the subgraph reachable from the combined
//! search seeds within a depth limit.

use codegraph_core::config::GraphConfig;
use codegraph_core::types::SubGraph;
use codegraph_store::GraphStore;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct GraphExpander {
    store: Arc<dyn GraphStore>,
    config: GraphConfig,
}

impl GraphExpander {
    pub fn new(store: Arc<dyn GraphStore>, config: GraphConfig) -> Self {
        Self { store, config }
    }

    /// Traverse outward from the seed nodes. Empty seeds or a store failure
    /// produce an empty subgraph with an explanatory metadata entry.
    pub fn expand(&self, seed_ids: &[String]) -> SubGraph {
        if seed_ids.is_empty() {
            return SubGraph::empty_with_reason("no seed nodes from search");
        }

        let (nodes, relationships) = match self.store.traverse(
            seed_ids,
            &self.config.relationship_types,
            self.config.expansion_depth,
            self.config.max_nodes_per_hop,
        ) {
            Ok(result) => result,
            Err(err) => {
                warn!(seeds = seed_ids.len(), error = %err, "graph traversal failed");
                return SubGraph::empty_with_reason(format!("graph traversal failed: {err}"));
            }
        };

        let mut subgraph = SubGraph::default();
        for node in nodes {
            subgraph.nodes.insert(node.id.clone(), node);
        }
        subgraph.relationships = relationships;
        subgraph.metadata.insert(
            "depth".to_string(),
            self.config.expansion_depth.to_string(),
        );
        subgraph
            .metadata
            .insert("seed_count".to_string(), seed_ids.len().to_string());
        subgraph
            .metadata
            .insert("node_count".to_string(), subgraph.nodes.len().to_string());
        subgraph.metadata.insert(
            "relationship_count".to_string(),
            subgraph.relationships.len().to_string(),
        );

        debug!(
            seeds = seed_ids.len(),
            nodes = subgraph.nodes.len(),
            relationships = subgraph.relationships.len(),
            "subgraph built"
        );
        subgraph
    }
}

use crate::fulltext::{EntityDocument, IndexSet};
use crate::{EmbeddingIndex, GraphStore, LexicalScope};
use codegraph_core::error::StoreError;
use codegraph_core::types::{
    EntityKind, GraphNode, GraphRelationship, RelatedTerm, SearchChannel, SearchHit,
};
use rusqlite::{Connection, OptionalExtension, params};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Canonical DDL for the graph tables. Defined in one place so schema setup
/// and migrations cannot drift apart.
pub const GRAPH_SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS graph_nodes (
    node_id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    name TEXT,
    properties_json TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_graph_nodes_name ON graph_nodes(name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_graph_nodes_kind ON graph_nodes(kind);
CREATE TABLE IF NOT EXISTS graph_relationships (
    rel_id TEXT PRIMARY KEY,
    rel_type TEXT NOT NULL,
    start_node_id TEXT NOT NULL,
    end_node_id TEXT NOT NULL,
    properties_json TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_graph_rels_start ON graph_relationships(start_node_id);
CREATE INDEX IF NOT EXISTS idx_graph_rels_end ON graph_relationships(end_node_id);
CREATE INDEX IF NOT EXISTS idx_graph_rels_type ON graph_relationships(rel_type);
CREATE TABLE IF NOT EXISTS node_embeddings (
    node_id TEXT NOT NULL,
    index_kind TEXT NOT NULL,
    dimensions INTEGER NOT NULL,
    vector_json TEXT NOT NULL,
    PRIMARY KEY (node_id, index_kind)
);
CREATE TABLE IF NOT EXISTS node_descriptions (
    node_id TEXT PRIMARY KEY,
    description TEXT NOT NULL
);
"#;

const MATCHING_NODE_LIMIT: usize = 10;

/// Node kinds the bounded traversal may pull into a subgraph.
const ENTITY_BEARING_KINDS: &[EntityKind] = &[
    EntityKind::Method,
    EntityKind::Class,
    EntityKind::Interface,
    EntityKind::Enum,
];

/// Reference `GraphStore` backend: SQLite for the graph, embeddings, and
/// descriptions; Tantivy for the lexical indexes.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
    indexes: IndexSet,
}

impl SqliteGraphStore {
    /// Create or open a store under `data_dir` (`graph.db` plus one Tantivy
    /// index directory per lexical scope).
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir).map_err(StoreError::Io)?;
        let conn = Connection::open(data_dir.join("graph.db")).map_err(StoreError::sqlite)?;
        conn.execute_batch(GRAPH_SCHEMA_DDL)
            .map_err(StoreError::sqlite)?;
        let indexes = IndexSet::open(&data_dir.join("fulltext"))?;
        Ok(Self {
            conn: Mutex::new(conn),
            indexes,
        })
    }

    pub fn upsert_node(&self, node: &GraphNode) -> Result<(), StoreError> {
        let properties = serde_json::to_string(&node.properties).map_err(StoreError::sqlite)?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO graph_nodes (node_id, kind, name, properties_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(node_id) DO UPDATE SET
                 kind = excluded.kind,
                 name = excluded.name,
                 properties_json = excluded.properties_json",
            params![node.id, node.kind.as_str(), node.name(), properties],
        )
        .map_err(StoreError::sqlite)?;
        Ok(())
    }

    pub fn upsert_relationship(&self, rel: &GraphRelationship) -> Result<(), StoreError> {
        let properties = serde_json::to_string(&rel.properties).map_err(StoreError::sqlite)?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO graph_relationships (rel_id, rel_type, start_node_id, end_node_id, properties_json)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(rel_id) DO UPDATE SET
                 rel_type = excluded.rel_type,
                 start_node_id = excluded.start_node_id,
                 end_node_id = excluded.end_node_id,
                 properties_json = excluded.properties_json",
            params![rel.id, rel.rel_type, rel.start_node_id, rel.end_node_id, properties],
        )
        .map_err(StoreError::sqlite)?;
        Ok(())
    }

    pub fn upsert_embedding(
        &self,
        node_id: &str,
        index: EmbeddingIndex,
        vector: &[f32],
    ) -> Result<(), StoreError> {
        let vector_json = serde_json::to_string(vector).map_err(StoreError::sqlite)?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO node_embeddings (node_id, index_kind, dimensions, vector_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(node_id, index_kind) DO UPDATE SET
                 dimensions = excluded.dimensions,
                 vector_json = excluded.vector_json",
            params![node_id, index.as_str(), vector.len() as i64, vector_json],
        )
        .map_err(StoreError::sqlite)?;
        Ok(())
    }

    pub fn upsert_description(&self, node_id: &str, description: &str) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO node_descriptions (node_id, description) VALUES (?1, ?2)
             ON CONFLICT(node_id) DO UPDATE SET description = excluded.description",
            params![node_id, description],
        )
        .map_err(StoreError::sqlite)?;
        Ok(())
    }

    pub fn index_document(
        &self,
        scope: LexicalScope,
        document: &EntityDocument,
    ) -> Result<(), StoreError> {
        self.indexes.add_document(scope, document)
    }

    /// Commit pending lexical-index writes.
    pub fn commit(&self) -> Result<(), StoreError> {
        self.indexes.commit()
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::sqlite("connection mutex poisoned"))
    }

    fn load_node(&self, conn: &Connection, node_id: &str) -> Result<Option<GraphNode>, StoreError> {
        conn.query_row(
            "SELECT node_id, kind, properties_json FROM graph_nodes WHERE node_id = ?1",
            params![node_id],
            row_to_node,
        )
        .optional()
        .map_err(StoreError::sqlite)
    }

    fn relationships_touching(
        &self,
        conn: &Connection,
        node_id: &str,
    ) -> Result<Vec<GraphRelationship>, StoreError> {
        let mut stmt = conn
            .prepare_cached(
                "SELECT rel_id, rel_type, start_node_id, end_node_id, properties_json
                 FROM graph_relationships
                 WHERE start_node_id = ?1 OR end_node_id = ?1",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map(params![node_id], row_to_relationship)
            .map_err(StoreError::sqlite)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::sqlite)
    }

    /// Node ids whose name contains `term`, case-insensitively.
    fn matching_node_ids(
        &self,
        conn: &Connection,
        term: &str,
    ) -> Result<Vec<String>, StoreError> {
        let pattern = format!("%{}%", term.replace('%', "").replace('_', "\\_"));
        let mut stmt = conn
            .prepare_cached(
                "SELECT node_id FROM graph_nodes
                 WHERE name LIKE ?1 ESCAPE '\\'
                 ORDER BY length(name), node_id
                 LIMIT ?2",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map(params![pattern, MATCHING_NODE_LIMIT as i64], |row| {
                row.get::<_, String>(0)
            })
            .map_err(StoreError::sqlite)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::sqlite)
    }

    fn node_name(&self, conn: &Connection, node_id: &str) -> Result<Option<String>, StoreError> {
        conn.query_row(
            "SELECT name FROM graph_nodes WHERE node_id = ?1",
            params![node_id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .map_err(StoreError::sqlite)
        .map(Option::flatten)
    }
}

impl GraphStore for SqliteGraphStore {
    fn fulltext_search(
        &self,
        scope: LexicalScope,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        self.indexes.search(scope, terms, limit)
    }

    fn vector_search(
        &self,
        index: EmbeddingIndex,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        if query.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT e.node_id, e.dimensions, e.vector_json, n.kind, n.name, n.properties_json
                 FROM node_embeddings e
                 JOIN graph_nodes n ON n.node_id = e.node_id
                 WHERE e.index_kind = ?1",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map(params![index.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(StoreError::sqlite)?;

        let mut scored = Vec::new();
        let mut mismatches = 0usize;
        for row in rows {
            let (node_id, dimensions, vector_json, kind, name, properties_json) =
                row.map_err(StoreError::sqlite)?;
            if dimensions as usize != query.len() {
                mismatches += 1;
                continue;
            }
            let vector: Vec<f32> =
                serde_json::from_str(&vector_json).map_err(StoreError::sqlite)?;
            let score = crate::embedding::cosine_similarity_or_zero(query, &vector);
            let properties: BTreeMap<String, serde_json::Value> =
                serde_json::from_str(&properties_json).unwrap_or_default();
            scored.push(SearchHit {
                node_id,
                name,
                signature: properties
                    .get("signature")
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string),
                context: properties
                    .get("class")
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string),
                score,
                kind: EntityKind::parse(&kind),
                channel: SearchChannel::Vector,
            });
        }
        if mismatches > 0 {
            warn!(
                index = index.as_str(),
                mismatches, "skipped stored vectors with mismatched dimensions"
            );
        }

        scored.sort_by(|left, right| {
            right
                .score
                .partial_cmp(&left.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| left.node_id.cmp(&right.node_id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    fn traverse(
        &self,
        seed_ids: &[String],
        relationship_types: &[String],
        max_depth: usize,
        max_nodes_per_hop: usize,
    ) -> Result<(Vec<GraphNode>, Vec<GraphRelationship>), StoreError> {
        let conn = self.lock_conn()?;
        let mut nodes: BTreeMap<String, GraphNode> = BTreeMap::new();
        let mut relationships: BTreeMap<String, GraphRelationship> = BTreeMap::new();

        let mut frontier: Vec<String> = Vec::new();
        for seed in seed_ids {
            if nodes.contains_key(seed) {
                continue;
            }
            if let Some(node) = self.load_node(&conn, seed)? {
                nodes.insert(node.id.clone(), node);
                frontier.push(seed.clone());
            }
        }

        for _depth in 0..max_depth {
            if frontier.is_empty() {
                break;
            }
            let mut next_frontier = Vec::new();
            let mut added_this_hop = 0usize;
            for node_id in &frontier {
                for rel in self.relationships_touching(&conn, node_id)? {
                    if !relationship_types.is_empty()
                        && !relationship_types.iter().any(|t| t == &rel.rel_type)
                    {
                        continue;
                    }
                    let neighbor_id = if &rel.start_node_id == node_id {
                        rel.end_node_id.clone()
                    } else {
                        rel.start_node_id.clone()
                    };
                    if nodes.contains_key(&neighbor_id) {
                        relationships.entry(rel.id.clone()).or_insert(rel);
                        continue;
                    }
                    if added_this_hop >= max_nodes_per_hop {
                        continue;
                    }
                    let Some(neighbor) = self.load_node(&conn, &neighbor_id)? else {
                        continue;
                    };
                    if !ENTITY_BEARING_KINDS.contains(&neighbor.kind) {
                        continue;
                    }
                    relationships.entry(rel.id.clone()).or_insert(rel);
                    nodes.insert(neighbor_id.clone(), neighbor);
                    next_frontier.push(neighbor_id);
                    added_this_hop += 1;
                }
            }
            frontier = next_frontier;
        }

        debug!(
            seeds = seed_ids.len(),
            nodes = nodes.len(),
            relationships = relationships.len(),
            "graph traversal"
        );
        Ok((
            nodes.into_values().collect(),
            relationships.into_values().collect(),
        ))
    }

    fn node_embedding(
        &self,
        node_id: &str,
        index: EmbeddingIndex,
    ) -> Result<Option<Vec<f32>>, StoreError> {
        let conn = self.lock_conn()?;
        let vector_json: Option<String> = conn
            .query_row(
                "SELECT vector_json FROM node_embeddings WHERE node_id = ?1 AND index_kind = ?2",
                params![node_id, index.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::sqlite)?;
        match vector_json {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(StoreError::sqlite),
            None => Ok(None),
        }
    }

    fn node_description(&self, node_id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT description FROM node_descriptions WHERE node_id = ?1",
            params![node_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(StoreError::sqlite)
    }

    fn related_terms(&self, term: &str, max_depth: usize) -> Result<Vec<RelatedTerm>, StoreError> {
        let conn = self.lock_conn()?;
        let origins = self.matching_node_ids(&conn, term)?;
        if origins.is_empty() {
            return Ok(Vec::new());
        }

        let mut visited: HashSet<String> = origins.iter().cloned().collect();
        let mut queue: VecDeque<(String, usize)> =
            origins.into_iter().map(|id| (id, 0)).collect();
        let mut found: Vec<RelatedTerm> = Vec::new();

        while let Some((node_id, distance)) = queue.pop_front() {
            if distance >= max_depth {
                continue;
            }
            for rel in self.relationships_touching(&conn, &node_id)? {
                let neighbor_id = if rel.start_node_id == node_id {
                    rel.end_node_id.clone()
                } else {
                    rel.start_node_id.clone()
                };
                if !visited.insert(neighbor_id.clone()) {
                    continue;
                }
                let neighbor_distance = distance + 1;
                if let Some(name) = self.node_name(&conn, &neighbor_id)? {
                    found.push(RelatedTerm {
                        term: name,
                        relationship_type: rel.rel_type.clone(),
                        distance: neighbor_distance,
                        score: 1.0 / (1.0 + neighbor_distance as f64),
                    });
                }
                queue.push_back((neighbor_id, neighbor_distance));
            }
        }
        Ok(dedup_related_terms(found))
    }

    fn hierarchy_terms(&self, term: &str) -> Result<Vec<RelatedTerm>, StoreError> {
        let conn = self.lock_conn()?;
        let origins = self.matching_node_ids(&conn, term)?;
        let mut found = Vec::new();
        for node_id in origins {
            for rel in self.relationships_touching(&conn, &node_id)? {
                if !matches!(rel.rel_type.as_str(), "EXTENDS" | "IMPLEMENTS") {
                    continue;
                }
                let other = if rel.start_node_id == node_id {
                    &rel.end_node_id
                } else {
                    &rel.start_node_id
                };
                if let Some(name) = self.node_name(&conn, other)? {
                    found.push(RelatedTerm {
                        term: name,
                        relationship_type: rel.rel_type.clone(),
                        distance: 1,
                        score: 0.9,
                    });
                }
            }
        }
        Ok(dedup_related_terms(found))
    }

    fn call_chain_terms(&self, term: &str) -> Result<Vec<RelatedTerm>, StoreError> {
        let conn = self.lock_conn()?;
        let origins: HashSet<String> = self.matching_node_ids(&conn, term)?.into_iter().collect();
        if origins.is_empty() {
            return Ok(Vec::new());
        }

        let mut direct: Vec<RelatedTerm> = Vec::new();
        let mut callers: Vec<String> = Vec::new();
        for node_id in &origins {
            for rel in self.relationships_touching(&conn, node_id)? {
                if rel.rel_type != "CALLS" {
                    continue;
                }
                let other = if &rel.start_node_id == node_id {
                    rel.end_node_id.clone()
                } else {
                    callers.push(rel.start_node_id.clone());
                    rel.start_node_id.clone()
                };
                if let Some(name) = self.node_name(&conn, &other)? {
                    direct.push(RelatedTerm {
                        term: name,
                        relationship_type: "CALLS".to_string(),
                        distance: 1,
                        score: 0.8,
                    });
                }
            }
        }

        // Co-occurrence: other methods invoked by the same callers.
        let mut co_occurrence: HashMap<String, usize> = HashMap::new();
        for caller in &callers {
            for rel in self.relationships_touching(&conn, caller)? {
                if rel.rel_type != "CALLS" || &rel.start_node_id != caller {
                    continue;
                }
                if origins.contains(&rel.end_node_id) {
                    continue;
                }
                if let Some(name) = self.node_name(&conn, &rel.end_node_id)? {
                    *co_occurrence.entry(name).or_insert(0) += 1;
                }
            }
        }
        for (name, count) in co_occurrence {
            direct.push(RelatedTerm {
                term: name,
                relationship_type: "CALLS_WITH".to_string(),
                distance: 2,
                score: count as f64 / (count as f64 + 1.0),
            });
        }
        Ok(dedup_related_terms(direct))
    }

    fn package_sibling_terms(&self, term: &str) -> Result<Vec<RelatedTerm>, StoreError> {
        let conn = self.lock_conn()?;
        let origins = self.matching_node_ids(&conn, term)?;
        let mut packages: HashSet<String> = HashSet::new();
        for node_id in &origins {
            let package: Option<String> = conn
                .query_row(
                    "SELECT json_extract(properties_json, '$.package') FROM graph_nodes WHERE node_id = ?1",
                    params![node_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StoreError::sqlite)?
                .flatten();
            if let Some(package) = package {
                packages.insert(package);
            }
        }

        let origin_set: HashSet<String> = origins.into_iter().collect();
        let mut found = Vec::new();
        for package in packages {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT node_id, name FROM graph_nodes
                     WHERE json_extract(properties_json, '$.package') = ?1 AND name IS NOT NULL
                     ORDER BY node_id",
                )
                .map_err(StoreError::sqlite)?;
            let rows = stmt
                .query_map(params![package], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(StoreError::sqlite)?;
            for row in rows {
                let (node_id, name) = row.map_err(StoreError::sqlite)?;
                if origin_set.contains(&node_id) {
                    continue;
                }
                found.push(RelatedTerm {
                    term: name,
                    relationship_type: "SAME_PACKAGE".to_string(),
                    distance: 1,
                    score: 0.6,
                });
            }
        }
        Ok(dedup_related_terms(found))
    }
}

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<GraphNode> {
    let node_id: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let properties_json: String = row.get(2)?;
    let properties: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&properties_json).unwrap_or_default();
    Ok(GraphNode {
        id: node_id,
        kind: EntityKind::parse(&kind),
        properties,
    })
}

fn row_to_relationship(row: &rusqlite::Row<'_>) -> rusqlite::Result<GraphRelationship> {
    let properties_json: String = row.get(4)?;
    let properties: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&properties_json).unwrap_or_default();
    Ok(GraphRelationship {
        id: row.get(0)?,
        rel_type: row.get(1)?,
        start_node_id: row.get(2)?,
        end_node_id: row.get(3)?,
        properties,
    })
}

/// Dedup by term keeping the best entry; sort by (distance asc, score desc).
fn dedup_related_terms(terms: Vec<RelatedTerm>) -> Vec<RelatedTerm> {
    let mut best: HashMap<String, RelatedTerm> = HashMap::new();
    for candidate in terms {
        match best.get(&candidate.term) {
            Some(existing)
                if (existing.distance, std::cmp::Reverse(ordered(existing.score)))
                    <= (candidate.distance, std::cmp::Reverse(ordered(candidate.score))) => {}
            _ => {
                best.insert(candidate.term.clone(), candidate);
            }
        }
    }
    let mut deduped: Vec<RelatedTerm> = best.into_values().collect();
    deduped.sort_by(|left, right| {
        left.distance
            .cmp(&right.distance)
            .then_with(|| {
                right
                    .score
                    .partial_cmp(&left.score)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| left.term.cmp(&right.term))
    });
    deduped
}

fn ordered(score: f64) -> i64 {
    (score * 1_000_000.0) as i64
}

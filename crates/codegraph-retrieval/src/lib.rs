//! Hybrid retrieval and ranking pipeline.
//!
//! Turns a natural-language question about a codebase into a ranked,
//! graph-connected set of candidate entities. The pipeline runs in fixed
//! stages: intent analysis, multi-level term expansion, quality filtering,
//! entity extraction, parallel lexical+vector search, score fusion, bounded
//! graph expansion, node scoring, and semantic re-ranking. Every stage
//! degrades to an empty result on failure; the pipeline always produces an
//! outcome.

pub mod deadline;
pub mod engine;
pub mod entities;
pub mod expansion;
pub mod graph;
pub mod intent;
pub mod ranking;
pub mod search;

pub use engine::RetrievalEngine;

//! The term-expansion subsystem: independent expander strategies, the
//! three-level orchestrator, and the quality filter.

pub mod compound;
pub mod embedding;
pub mod graph_terms;
pub mod multi_level;
pub mod patterns;
pub mod quality;
pub mod synonyms;

pub use embedding::EmbeddingExpander;
pub use graph_terms::GraphTermExpander;
pub use multi_level::MultiLevelExpander;
pub use quality::QualityFilter;

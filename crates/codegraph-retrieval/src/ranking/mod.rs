pub mod node_scorer;
pub mod reranker;

pub use node_scorer::NodeScorer;
pub use reranker::ReRankingService;

pub mod combiner;
pub mod parallel;

pub use combiner::combine;
pub use parallel::{ParallelSearchService, SearchOutput};

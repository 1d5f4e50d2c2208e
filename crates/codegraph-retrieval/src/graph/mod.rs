pub mod expander;

pub use expander::GraphExpander;

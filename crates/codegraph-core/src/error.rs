use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("query error: {0}")]
    Query(#[from] QueryError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid config value: {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the graph/index store and the model providers.
///
/// Pipeline stages catch these at the call site, log them, and degrade to
/// empty results; they must never unwind across stage boundaries.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(String),

    #[error("tantivy error: {0}")]
    Tantivy(String),

    #[error("external call failed: {0}")]
    External(String),

    #[error("embedding dimensions mismatch: expected={expected}, got={got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("node not found: {node_id}")]
    NodeNotFound { node_id: String },

    #[error("index schema incompatible: {0}")]
    SchemaIncompatible(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Convenience constructor for SQLite errors, for `.map_err(StoreError::sqlite)`.
    pub fn sqlite<E: std::fmt::Display>(e: E) -> Self {
        Self::Sqlite(e.to_string())
    }

    /// Convenience constructor for Tantivy errors, for `.map_err(StoreError::tantivy)`.
    pub fn tantivy<E: std::fmt::Display>(e: E) -> Self {
        Self::Tantivy(e.to_string())
    }

    /// Convenience constructor for external model/HTTP errors.
    pub fn external<E: std::fmt::Display>(e: E) -> Self {
        Self::External(e.to_string())
    }

    pub fn node_not_found(node_id: impl Into<String>) -> Self {
        Self::NodeNotFound {
            node_id: node_id.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_constructors_preserve_message() {
        let err = StoreError::sqlite("database is locked");
        assert_eq!(err.to_string(), "sqlite error: database is locked");

        let err = StoreError::external("model_timeout");
        assert_eq!(err.to_string(), "external call failed: model_timeout");
    }

    #[test]
    fn dimension_mismatch_reports_both_sizes() {
        let err = StoreError::DimensionMismatch {
            expected: 384,
            got: 768,
        };
        assert!(err.to_string().contains("expected=384"));
        assert!(err.to_string().contains("got=768"));
    }
}

use std::fmt::Display;

use thiserror::Error;

/// Startup-time configuration rejection. Serving must not begin while one
/// of these is outstanding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("boost for field `{field}` must be finite and positive, got {value}")]
    Boost { field: &'static str, value: f32 },
    #[error(
        "hybrid weights must lie in [0,1] and sum to 1, got keyword={keyword} vector={vector}"
    )]
    Weights { keyword: f32, vector: f32 },
    #[error("transitive depth must lie in [1,{max}], got {value}")]
    Depth { value: u32, max: u32 },
    #[error("`{field}` must be a positive integer, got {value}")]
    PositiveInt { field: &'static str, value: usize },
    #[error("failed reading configuration: {0}")]
    Io(String),
    #[error("failed parsing configuration: {0}")]
    Parse(String),
}

/// Request-scoped failure kinds surfaced by the retrieval core.
///
/// Backend kinds carry a message only; the underlying error is rendered
/// through `Display` so no connection strings or payloads leak through.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("keyword index failure: {0}")]
    KeywordIndex(String),
    #[error("vector store failure: {0}")]
    VectorStore(String),
    #[error("graph backend failure: {0}")]
    Graph(String),
    #[error("request cancelled")]
    Cancelled,
}

impl SearchError {
    pub fn keyword(err: impl Display) -> Self {
        Self::KeywordIndex(err.to_string())
    }

    pub fn vector(err: impl Display) -> Self {
        Self::VectorStore(err.to_string())
    }

    pub fn graph(err: impl Display) -> Self {
        Self::Graph(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, SearchError};

    #[test]
    fn config_errors_convert_into_search_errors() {
        let err: SearchError = ConfigError::Weights {
            keyword: 0.9,
            vector: 0.9,
        }
        .into();
        assert!(matches!(err, SearchError::Config(_)));
        assert!(err.to_string().contains("hybrid weights"));
    }

    #[test]
    fn backend_constructors_keep_the_kind() {
        assert!(matches!(
            SearchError::vector("connection refused"),
            SearchError::VectorStore(_)
        ));
        assert!(matches!(
            SearchError::graph("bolt handshake failed"),
            SearchError::Graph(_)
        ));
    }
}

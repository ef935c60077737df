use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid search request: {0}")]
    Validation(String),

    #[error("search environment not ready: {0}")]
    EnvironmentNotReady(String),

    #[error("{collection} does not support {capability}")]
    Unsupported {
        collection: String,
        capability: String,
    },

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("search request failed: {0}")]
    Request(String),
}

impl SearchError {
    /// Errors that reach the caller of `execute_search`; everything else is
    /// absorbed per collection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::EnvironmentNotReady(_))
    }
}

pub type Result<T, E = SearchError> = std::result::Result<T, E>;

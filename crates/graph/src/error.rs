use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    /// No connection is established (yet) and the caller chose not to wait.
    #[error("Graph database not ready: {0}")]
    NotReady(String),

    /// The database could not be reached, or reported itself unavailable.
    #[error("Graph database unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed [{code}]: {message}")]
    Query { code: String, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphError {
    /// Whether this error means the service itself went away, as opposed to
    /// a problem with the request.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<reqwest::Error> for GraphError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Self::Unavailable(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

use thiserror::Error;

/// Failures preparing or launching the loader.
///
/// A loader that runs and exits nonzero is not an error here; its exit code
/// and output are returned in [`LoaderOutput`](crate::LoaderOutput).
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to stage loader inputs: {0}")]
    Staging(#[source] std::io::Error),

    #[error("Failed to launch loader '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read loader output: {0}")]
    Output(#[source] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

//! Notifier trait definition and shared error types.

use atomspace_core::WriterType;

/// Errors that can occur while notifying the annotation service.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Annotation service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Timeout connecting to annotation service")]
    Timeout,

    #[error("Failed to connect to annotation service: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Payload posted to the annotation service.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct JobNotification<'a> {
    pub folder_id: &'a str,
    #[serde(rename = "type")]
    pub writer_type: WriterType,
}

/// Tells the annotation service which job output to serve.
#[async_trait::async_trait]
pub trait AnnotationNotifier: Send + Sync {
    async fn notify(&self, job_id: &str, writer_type: WriterType) -> Result<(), NotifyError>;

    /// Whether notifications actually reach a remote service.
    fn is_configured(&self) -> bool {
        true
    }
}

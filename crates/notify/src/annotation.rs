//! HTTP annotation-service notifier.
//!
//! Posts `{"folder_id": <job_id>, "type": <writer_type>}` to the configured
//! URL. Only a `200 OK` counts as delivered.

use std::time::Duration;

use atomspace_core::config::AnnotationConfig;
use atomspace_core::WriterType;
use tracing::{debug, warn};
use url::Url;

use crate::traits::{AnnotationNotifier, JobNotification, NotifyError};

#[derive(Debug, Clone)]
pub struct HttpAnnotationNotifier {
    /// `None` disables delivery; every notify succeeds with a warning.
    url: Option<Url>,
    timeout: Duration,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

impl HttpAnnotationNotifier {
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let url = url
            .map(|u| {
                Url::parse(&u)
                    .map_err(|e| NotifyError::Config(format!("invalid annotation URL '{u}': {e}")))
            })
            .transpose()?;
        Ok(Self {
            url,
            timeout,
            client: reqwest::Client::new(),
        })
    }

    pub fn from_config(config: &AnnotationConfig) -> Result<Self, NotifyError> {
        Self::new(config.url.clone(), config.timeout())
    }
}

#[async_trait::async_trait]
impl AnnotationNotifier for HttpAnnotationNotifier {
    async fn notify(&self, job_id: &str, writer_type: WriterType) -> Result<(), NotifyError> {
        let Some(url) = self.url.as_ref() else {
            warn!(job_id = %job_id, "annotation service URL not configured, skipping notification");
            return Ok(());
        };

        let payload = JobNotification {
            folder_id: job_id,
            writer_type,
        };

        let response = self
            .client
            .post(url.clone())
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                let err = NotifyError::from(e);
                warn!(url = %url, job_id = %job_id, error = %err, "annotation notification failed");
                err
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!(url = %url, %status, body = %body, "annotation service returned non-200 status");
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(url = %url, job_id = %job_id, writer_type = %writer_type, "annotation service notified");
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one request with a canned status line, returning the raw request.
    async fn one_shot_server(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut request = String::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.push_str(&String::from_utf8_lossy(&buf[..n]));
                if n == 0 || request.contains("\"type\"") {
                    break;
                }
            }
            let body = "nope";
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            request
        });
        (format!("http://{addr}/notify"), handle)
    }

    #[tokio::test]
    async fn posts_folder_id_and_writer_type() {
        let (url, server) = one_shot_server("200 OK").await;
        let notifier = HttpAnnotationNotifier::new(Some(url), Duration::from_secs(5)).unwrap();

        notifier.notify("job-42", WriterType::Neo4j).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /notify"));
        assert!(request.contains(r#""folder_id":"job-42""#));
        assert!(request.contains(r#""type":"neo4j""#));
    }

    #[tokio::test]
    async fn non_200_is_an_error() {
        let (url, server) = one_shot_server("500 Internal Server Error").await;
        let notifier = HttpAnnotationNotifier::new(Some(url), Duration::from_secs(5)).unwrap();

        let err = notifier.notify("job-1", WriterType::Metta).await.unwrap_err();
        server.await.unwrap();
        match err {
            NotifyError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unconfigured_notifier_is_a_no_op() {
        let notifier = HttpAnnotationNotifier::new(None, Duration::from_secs(1)).unwrap();
        assert!(!notifier.is_configured());
        notifier.notify("job-1", WriterType::Metta).await.unwrap();
    }

    #[test]
    fn rejects_malformed_url() {
        let err = HttpAnnotationNotifier::new(Some("not a url".into()), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, NotifyError::Config(_)));
    }
}

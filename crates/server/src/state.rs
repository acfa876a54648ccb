use std::sync::Arc;

use atomspace_core::Config;
use atomspace_graph::{ConnectionHealth, ConnectionManager};
use atomspace_notify::AnnotationNotifier;
use serde::Serialize;

use crate::history::JobHistoryStore;
use crate::pipeline::JobPipeline;
use crate::sessions::UploadSessionStore;

pub struct AppState {
    pub config: Config,
    pub sessions: Arc<UploadSessionStore>,
    pub history: Arc<JobHistoryStore>,
    pub pipeline: JobPipeline,
    /// Present when a graph database is configured.
    pub connection: Option<ConnectionManager>,
    pub notifier: Arc<dyn AnnotationNotifier>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub active_sessions: usize,
    pub annotation_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_database: Option<ConnectionHealth>,
}

impl AppState {
    /// Overall status is `degraded` when a configured database is unreachable.
    pub async fn health(&self) -> HealthReport {
        let graph_database = match &self.connection {
            Some(conn) => Some(conn.health_check().await),
            None => None,
        };
        let status = match &graph_database {
            Some(db) if !db.connected => "degraded",
            _ => "ok",
        };
        HealthReport {
            status,
            active_sessions: self.sessions.len(),
            annotation_configured: self.notifier.is_configured(),
            graph_database,
        }
    }
}

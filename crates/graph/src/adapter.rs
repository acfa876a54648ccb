use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Success,
    Error,
}

/// Outcome of importing one job into the graph database.
///
/// Persisted verbatim as the job's `neo4j_load_result.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkLoadResult {
    pub status: LoadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub nodes_loaded: u64,
    #[serde(default)]
    pub edges_loaded: u64,
    #[serde(default)]
    pub files_processed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BulkLoadResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: LoadStatus::Error,
            job_id: None,
            nodes_loaded: 0,
            edges_loaded: 0,
            files_processed: Vec::new(),
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == LoadStatus::Success
    }
}

/// Imports job artifacts into, and removes them from, a live graph database.
///
/// Jobs are isolated by tenant: every imported node carries
/// `tenant_id = job_id`.
#[async_trait]
pub trait GraphDatabaseAdapter: Send + Sync {
    /// Import the artifacts in `output_dir`. Failures are reported in the
    /// result, never raised.
    async fn bulk_load(&self, output_dir: &Path, job_id: &str) -> BulkLoadResult;

    /// Remove everything imported for `job_id`. Returns whether the delete ran.
    async fn delete_subgraph(&self, job_id: &str) -> bool;
}

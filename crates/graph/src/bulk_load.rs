//! Neo4j import of loader output.
//!
//! The loader's neo4j writer emits `*.csv` data files plus `nodes_*.cypher`
//! and `edges_*.cypher` scripts that `LOAD CSV` from `import/<job_id>/`.
//! Import = copy CSVs into the database's import directory, run every node
//! script then every edge script, then remove the copied CSVs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::adapter::{BulkLoadResult, GraphDatabaseAdapter, LoadStatus};
use crate::backend::{Row, Statement};
use crate::connection::ConnectionManager;
use crate::error::GraphError;

pub struct Neo4jBulkLoader {
    connection: ConnectionManager,
    import_dir: PathBuf,
}

impl Neo4jBulkLoader {
    pub fn new(connection: ConnectionManager, import_dir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            connection,
            import_dir: import_dir.into(),
        })
    }

    fn job_import_dir(&self, job_id: &str) -> PathBuf {
        self.import_dir.join(job_id)
    }

    async fn copy_csv_files(&self, output_dir: &Path, job_id: &str) -> Result<usize, GraphError> {
        let csv_files = list_files(output_dir, |name| name.ends_with(".csv")).await?;
        if csv_files.is_empty() {
            return Err(GraphError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No CSV files found",
            )));
        }

        let target = self.job_import_dir(job_id);
        tokio::fs::create_dir_all(&target).await?;
        for file in &csv_files {
            if let Some(name) = file.file_name() {
                tokio::fs::copy(file, target.join(name)).await?;
            }
        }
        Ok(csv_files.len())
    }

    async fn cleanup_import_files(&self, job_id: &str) {
        let target = self.job_import_dir(job_id);
        match tokio::fs::remove_dir_all(&target).await {
            Ok(()) => info!(job_id = %job_id, "cleaned up neo4j import files"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(job_id = %job_id, error = %e, "could not clean up neo4j import files"),
        }
    }

    /// Run each `;`-separated statement of a script, summing the `total` (or
    /// `batches`) column of each statement's first row.
    async fn execute_script(&self, path: &Path) -> Result<u64, GraphError> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut total = 0;
        for query in content.split(';').map(str::trim).filter(|q| !q.is_empty()) {
            let rows = self.connection.run(Statement::new(query), false).await?;
            total += rows.first().map(operation_count).unwrap_or(0);
        }
        Ok(total)
    }

    async fn run_scripts(
        &self,
        scripts: &[PathBuf],
        files_processed: &mut Vec<String>,
    ) -> Result<u64, GraphError> {
        let mut loaded = 0;
        for script in scripts {
            let name = script
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match self.execute_script(script).await {
                Ok(count) => {
                    loaded += count;
                    files_processed.push(name);
                }
                // Losing the database mid-import aborts the whole load.
                Err(e) if e.is_unavailable() || matches!(e, GraphError::NotReady(_)) => {
                    return Err(e)
                }
                Err(e) => warn!(script = %name, error = %e, "cypher script failed, skipping"),
            }
        }
        Ok(loaded)
    }

    async fn load(&self, output_dir: &Path, job_id: &str) -> Result<BulkLoadResult, GraphError> {
        let copied = self.copy_csv_files(output_dir, job_id).await?;
        info!(job_id = %job_id, files = copied, "copied CSV files to neo4j import directory");

        let node_scripts =
            list_files(output_dir, |n| n.starts_with("nodes_") && n.ends_with(".cypher")).await?;
        let edge_scripts =
            list_files(output_dir, |n| n.starts_with("edges_") && n.ends_with(".cypher")).await?;

        let mut files_processed = Vec::new();
        let nodes_loaded = self.run_scripts(&node_scripts, &mut files_processed).await?;
        let edges_loaded = self.run_scripts(&edge_scripts, &mut files_processed).await?;

        Ok(BulkLoadResult {
            status: LoadStatus::Success,
            job_id: Some(job_id.to_string()),
            nodes_loaded,
            edges_loaded,
            files_processed,
            message: None,
        })
    }
}

#[async_trait]
impl GraphDatabaseAdapter for Neo4jBulkLoader {
    async fn bulk_load(&self, output_dir: &Path, job_id: &str) -> BulkLoadResult {
        let wait_timeout = self.connection.settings().wait_timeout;
        if !self.connection.wait_for_connection(wait_timeout).await {
            warn!(job_id = %job_id, timeout = ?wait_timeout, "neo4j connection not ready");
            return BulkLoadResult::error("Neo4j connection not ready");
        }

        let result = self.load(output_dir, job_id).await;
        self.cleanup_import_files(job_id).await;

        match result {
            Ok(result) => {
                info!(
                    job_id = %job_id,
                    nodes = result.nodes_loaded,
                    edges = result.edges_loaded,
                    "neo4j bulk load complete"
                );
                result
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "neo4j bulk load failed");
                BulkLoadResult::error(e.to_string())
            }
        }
    }

    async fn delete_subgraph(&self, job_id: &str) -> bool {
        let statement = Statement::new("MATCH (n) WHERE n.tenant_id = $tenant_id DETACH DELETE n")
            .param("tenant_id", job_id);
        match self.connection.run(statement, false).await {
            Ok(_) => {
                info!(job_id = %job_id, "deleted neo4j subgraph");
                true
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "failed to delete neo4j subgraph");
                false
            }
        }
    }
}

fn operation_count(row: &Row) -> u64 {
    row.get("total")
        .or_else(|| row.get("batches"))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Top-level files of `dir` whose name matches, sorted by name.
async fn list_files(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>, GraphError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if entry.file_name().to_str().is_some_and(&keep) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

//! HugeGraph loader CLI adapter.
//!
//! Each run gets a private temp directory holding copies of the uploaded
//! files, the Groovy schema and the mapping config rewritten to point at
//! those copies. The temp directory is removed when the run finishes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use atomspace_core::config::LoaderConfig;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::adapter::{ExternalLoaderAdapter, LoadRequest, LoaderOutput};
use crate::error::LoaderError;

#[derive(Debug, Clone)]
pub struct HugeGraphLoader {
    loader_path: PathBuf,
    graph: String,
    host: String,
    port: u16,
}

impl HugeGraphLoader {
    pub fn new(loader_path: impl Into<PathBuf>, graph: &str, host: &str, port: u16) -> Self {
        Self {
            loader_path: loader_path.into(),
            graph: graph.to_string(),
            host: host.to_string(),
            port,
        }
    }

    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(&config.loader_path, &config.graph, &config.host, config.port)
    }

    fn command(&self, schema: &Path, config: &Path, request: &LoadRequest<'_>) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg(&self.loader_path)
            .arg("-g")
            .arg(&self.graph)
            .arg("-f")
            .arg(config)
            .arg("-h")
            .arg(&self.host)
            .arg("-p")
            .arg(self.port.to_string())
            .args(["--clear-all-data", "true"])
            .arg("-o")
            .arg(request.output_dir)
            .args(["-w", request.writer_type.as_str()])
            .args(["--job-id", request.job_id])
            .arg("-s")
            .arg(schema)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

/// Copy every top-level file of `files_dir` into `staging`, keyed by name.
async fn stage_files(files_dir: &Path, staging: &Path) -> std::io::Result<HashMap<String, PathBuf>> {
    let mut staged = HashMap::new();
    let mut entries = tokio::fs::read_dir(files_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let target = staging.join(&name);
        tokio::fs::copy(entry.path(), &target).await?;
        staged.insert(name, target);
    }
    Ok(staged)
}

/// Names of the regular files directly inside `dir`, sorted. Missing dir = empty.
pub async fn collect_manifest(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    files.sort();
    Ok(files)
}

#[async_trait]
impl ExternalLoaderAdapter for HugeGraphLoader {
    async fn process(&self, request: &LoadRequest<'_>) -> Result<LoaderOutput, LoaderError> {
        let staging = TempDir::new().map_err(LoaderError::Staging)?;

        let staged = stage_files(request.files_dir, staging.path())
            .await
            .map_err(LoaderError::Staging)?;
        debug!(job_id = %request.job_id, files = staged.len(), "staged upload files");
        for name in request.config.referenced_files() {
            if !staged.contains_key(&name) {
                warn!(job_id = %request.job_id, file = %name, "config references a file that was not uploaded");
            }
        }

        let schema_path = staging.path().join(format!("schema-{}.groovy", request.job_id));
        tokio::fs::write(&schema_path, request.schema.to_groovy())
            .await
            .map_err(LoaderError::Staging)?;

        let config_path = staging.path().join(format!("struct-{}.json", request.job_id));
        let config = request.config.with_staged_paths(&staged);
        tokio::fs::write(&config_path, serde_json::to_vec_pretty(&config)?)
            .await
            .map_err(LoaderError::Staging)?;

        info!(
            job_id = %request.job_id,
            writer_type = %request.writer_type,
            loader = %self.loader_path.display(),
            "running bulk loader"
        );

        let output = self
            .command(&schema_path, &config_path, request)
            .spawn()
            .map_err(|source| LoaderError::Spawn {
                program: self.loader_path.display().to_string(),
                source,
            })?
            .wait_with_output()
            .await
            .map_err(LoaderError::Output)?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if exit_code != 0 {
            warn!(job_id = %request.job_id, exit_code, "bulk loader exited with error");
        }

        let manifest_files = collect_manifest(request.output_dir)
            .await
            .map_err(LoaderError::Output)?;

        Ok(LoaderOutput {
            output_dir: request.output_dir.to_path_buf(),
            manifest_files,
            stdout,
            stderr,
            exit_code,
        })
    }
}

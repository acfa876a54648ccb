use std::path::{Path, PathBuf};

use async_trait::async_trait;
use atomspace_core::{SchemaDefinition, StructConfig, WriterType};

use crate::error::LoaderError;

/// Everything one loader run needs.
#[derive(Debug, Clone)]
pub struct LoadRequest<'a> {
    pub job_id: &'a str,
    /// Directory holding the uploaded files.
    pub files_dir: &'a Path,
    /// Where the loader writes its artifacts; created by the loader.
    pub output_dir: &'a Path,
    pub config: &'a StructConfig,
    pub schema: &'a SchemaDefinition,
    pub writer_type: WriterType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoaderOutput {
    pub output_dir: PathBuf,
    /// Names of the files the loader produced, sorted.
    pub manifest_files: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl LoaderOutput {
    /// A run counts as failed on nonzero exit or when it produced nothing.
    pub fn is_failure(&self) -> bool {
        self.exit_code != 0 || self.manifest_files.is_empty()
    }
}

#[async_trait]
pub trait ExternalLoaderAdapter: Send + Sync {
    async fn process(&self, request: &LoadRequest<'_>) -> Result<LoaderOutput, LoaderError>;
}

//! Job pipeline: turns an upload session into a selected, finalized job.
//!
//! [`JobPipeline::run`] drives one job through the [`Stage`]s in order:
//! validate the session and inputs, run the bulk loader into the job's
//! output directory, optionally import into the graph database, notify the
//! annotation service, then record the job in history and select it.
//!
//! A failure after the output directory exists is undone according to
//! [`rollback_plan`]. Graph database sync failures are recorded on the
//! outcome and do not fail the job; notification failures do.

mod stages;

pub use stages::{rollback_plan, Cleanup, Stage};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use atomspace_core::{
    AnnotationSchema, JobHistory, JobHistoryRecord, JobMetadata, SchemaDefinition, SchemaError,
    StructConfig, WriterType,
};
use atomspace_graph::{BulkLoadResult, GraphDatabaseAdapter};
use atomspace_loader::hugegraph::collect_manifest;
use atomspace_loader::{ExternalLoaderAdapter, LoadRequest, LoaderError};
use atomspace_notify::AnnotationNotifier;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::history::{
    HistoryError, JobHistoryStore, GRAPH_INFO_FILE, JOB_METADATA_FILE, NEO4J_RESULT_FILE,
    SCHEMA_FILE,
};
use crate::sessions::{SessionError, UploadSessionStore};
use crate::stats::compute_graph_info;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("{0}")]
    Validation(#[from] SchemaError),

    #[error("Loader failed for job {job_id} (exit code {exit_code}): {message}")]
    Loader {
        job_id: String,
        exit_code: i32,
        message: String,
        stdout: String,
        stderr: String,
    },

    #[error("Failed to notify annotation service for job {job_id}: {message}")]
    Notification { job_id: String, message: String },

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Session(e) => e.status_code(),
            Self::Validation(_) => 400,
            Self::History(e) => e.status_code(),
            Self::Loader { .. } | Self::Notification { .. } | Self::Io(_) => 500,
        }
    }
}

// ── Requests and outcomes ───────────────────────────────────────────

/// A validated job submission.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub session_id: String,
    pub config: StructConfig,
    pub schema: SchemaDefinition,
    pub writer_type: WriterType,
}

impl JobRequest {
    /// Parse and validate the raw submission fields.
    pub fn from_raw(
        session_id: &str,
        config_json: &str,
        schema_json: &str,
        writer_type: &str,
    ) -> Result<Self, PipelineError> {
        let writer_type: WriterType = writer_type.parse()?;
        let config = StructConfig::from_json_str(config_json)?;
        let schema = SchemaDefinition::from_json_str(schema_json)?;
        Ok(Self {
            session_id: session_id.to_string(),
            config,
            schema,
            writer_type,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub status: &'static str,
    pub message: String,
    pub stage: Stage,
    pub writer_type: WriterType,
    pub output_dir: PathBuf,
    pub output_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_sync: Option<BulkLoadResult>,
    /// Non-fatal problems hit while finishing the job.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteJobOutcome {
    pub message: String,
    pub history: JobHistory,
    pub directory_deleted: bool,
    pub selected_job_affected: bool,
    pub new_selected_job: Option<String>,
}

/// Per-run bookkeeping for one job.
struct JobContext {
    job_id: String,
    output_dir: PathBuf,
    /// Job the annotation service pointed at before this run started.
    previous: Option<String>,
    stage: Stage,
}

impl JobContext {
    fn advance(&mut self, stage: Stage) {
        info!(job_id = %self.job_id, from = %self.stage, to = %stage, "job stage");
        self.stage = stage;
    }
}

// ── Pipeline ────────────────────────────────────────────────────────

pub struct JobPipeline {
    sessions: Arc<UploadSessionStore>,
    history: Arc<JobHistoryStore>,
    loader: Arc<dyn ExternalLoaderAdapter>,
    graph_db: Option<Arc<dyn GraphDatabaseAdapter>>,
    notifier: Arc<dyn AnnotationNotifier>,
}

impl JobPipeline {
    pub fn new(
        sessions: Arc<UploadSessionStore>,
        history: Arc<JobHistoryStore>,
        loader: Arc<dyn ExternalLoaderAdapter>,
        graph_db: Option<Arc<dyn GraphDatabaseAdapter>>,
        notifier: Arc<dyn AnnotationNotifier>,
    ) -> Self {
        Self {
            sessions,
            history,
            loader,
            graph_db,
            notifier,
        }
    }

    pub fn history_store(&self) -> &JobHistoryStore {
        &self.history
    }

    /// Run one job end to end.
    pub async fn run(&self, request: JobRequest) -> Result<JobOutcome, PipelineError> {
        let session = self.sessions.require_active(&request.session_id)?;
        if session.uploaded_files.is_empty() {
            return Err(SessionError::NoFiles(request.session_id.clone()).into());
        }

        let job_id = Uuid::new_v4().to_string();
        let mut ctx = JobContext {
            output_dir: self.history.job_dir(&job_id)?,
            previous: self.history.resolve(None),
            job_id,
            stage: Stage::Created,
        };
        info!(
            job_id = %ctx.job_id,
            session_id = %request.session_id,
            writer_type = %request.writer_type,
            files = session.uploaded_files.len(),
            "starting job"
        );

        // Bulk load.
        ctx.advance(Stage::FilesStaged);
        let load = self
            .loader
            .process(&LoadRequest {
                job_id: &ctx.job_id,
                files_dir: &session.dir,
                output_dir: &ctx.output_dir,
                config: &request.config,
                schema: &request.schema,
                writer_type: request.writer_type,
            })
            .await;
        let output = match load {
            Ok(output) if !output.is_failure() => output,
            Ok(output) => {
                let message = if output.exit_code != 0 {
                    "Bulk loader exited with an error".to_string()
                } else {
                    "Bulk loader produced no output files".to_string()
                };
                self.rollback(&mut ctx).await;
                return Err(PipelineError::Loader {
                    job_id: ctx.job_id,
                    exit_code: output.exit_code,
                    message,
                    stdout: output.stdout,
                    stderr: output.stderr,
                });
            }
            Err(e) => {
                self.rollback(&mut ctx).await;
                return Err(loader_error(ctx.job_id, e));
            }
        };
        ctx.advance(Stage::BulkLoaded);

        // The manifest is the loader's output only; job metadata comes after.
        let manifest = output.manifest_files;
        if let Err(e) = self.write_job_metadata(&ctx.job_id, &request) {
            self.rollback(&mut ctx).await;
            return Err(e.into());
        }

        let mut warnings = Vec::new();
        let db_sync = self.sync_database(&mut ctx, request.writer_type, &mut warnings).await;

        if let Err(e) = self.notifier.notify(&ctx.job_id, request.writer_type).await {
            error!(job_id = %ctx.job_id, error = %e, "annotation service notification failed");
            self.rollback(&mut ctx).await;
            return Err(PipelineError::Notification {
                job_id: ctx.job_id,
                message: e.to_string(),
            });
        }
        ctx.advance(Stage::Notified);

        self.finalize(&ctx, &request, &manifest, db_sync.as_ref(), &mut warnings);
        ctx.advance(Stage::Finalized);

        if let Err(e) = self.sessions.consume(&request.session_id) {
            warn!(session_id = %request.session_id, error = %e, "could not mark session consumed");
        }
        if let Err(e) = self.sessions.cleanup(&request.session_id) {
            warn!(session_id = %request.session_id, error = %e, "could not clean up session");
        }

        let mut message = format!(
            "Graph generated successfully using {} writer",
            request.writer_type
        );
        if db_sync.as_ref().is_some_and(BulkLoadResult::is_success) {
            message.push_str(" and loaded to Neo4j");
        }
        info!(job_id = %ctx.job_id, files = manifest.len(), warnings = warnings.len(), "job finalized");

        Ok(JobOutcome {
            job_id: ctx.job_id,
            status: "success",
            message,
            stage: ctx.stage,
            writer_type: request.writer_type,
            output_dir: ctx.output_dir,
            output_files: manifest,
            db_sync,
            warnings,
        })
    }

    fn write_job_metadata(&self, job_id: &str, request: &JobRequest) -> Result<(), HistoryError> {
        self.history.write_job_file(job_id, SCHEMA_FILE, &request.schema)?;
        let metadata = JobMetadata {
            job_id: job_id.to_string(),
            writer_type: request.writer_type,
            created_at: Utc::now().to_rfc3339(),
        };
        self.history.write_job_file(job_id, JOB_METADATA_FILE, &metadata)
    }

    /// Import into the graph database when the writer needs one. Never fails
    /// the job; a failed import is recorded and returned.
    async fn sync_database(
        &self,
        ctx: &mut JobContext,
        writer_type: WriterType,
        warnings: &mut Vec<String>,
    ) -> Option<BulkLoadResult> {
        if !writer_type.requires_graph_database() {
            ctx.advance(Stage::DbSyncSkipped);
            return None;
        }

        let result = match &self.graph_db {
            Some(db) => db.bulk_load(&ctx.output_dir, &ctx.job_id).await,
            None => BulkLoadResult::error("Graph database is not configured"),
        };
        if let Err(e) = self.history.write_job_file(&ctx.job_id, NEO4J_RESULT_FILE, &result) {
            warn!(job_id = %ctx.job_id, error = %e, "could not persist graph database load result");
        }

        if result.is_success() {
            ctx.advance(Stage::DbSynced);
        } else {
            let reason = result.message.clone().unwrap_or_default();
            warn!(job_id = %ctx.job_id, reason = %reason, "graph database sync degraded");
            warnings.push(format!("Graph database sync failed: {reason}"));
            ctx.advance(Stage::DbSyncDegraded);
        }
        Some(result)
    }

    /// Record stats, append to history and select the job. Failures here
    /// leave a working job and are only reported as warnings.
    fn finalize(
        &self,
        ctx: &JobContext,
        request: &JobRequest,
        manifest: &[String],
        db_sync: Option<&BulkLoadResult>,
        warnings: &mut Vec<String>,
    ) {
        let info = compute_graph_info(
            &ctx.job_id,
            request.writer_type,
            &ctx.output_dir,
            &request.schema,
            manifest,
            db_sync,
        );

        let mut note = |what: &str, e: HistoryError| {
            warn!(job_id = %ctx.job_id, error = %e, "{what}");
            warnings.push(format!("{what}: {e}"));
        };
        if let Err(e) = self.history.write_job_file(&ctx.job_id, GRAPH_INFO_FILE, &info) {
            note("could not write graph info", e);
        }
        if let Err(e) = self.history.append(info) {
            note("could not append job to history", e);
        }
        if let Err(e) = self.history.select(&ctx.job_id) {
            note("could not select job", e);
        }
    }

    async fn rollback(&self, ctx: &mut JobContext) {
        let plan = rollback_plan(ctx.stage);
        warn!(job_id = %ctx.job_id, stage = %ctx.stage, steps = ?plan, "rolling back job");

        for step in plan {
            match step {
                Cleanup::RenotifyPrevious => self.renotify_previous(ctx.previous.clone()),
                Cleanup::DeleteSubgraph => {
                    if let Some(db) = &self.graph_db {
                        db.delete_subgraph(&ctx.job_id).await;
                    }
                }
                Cleanup::RemoveOutputDir => remove_dir(&ctx.job_id, &ctx.output_dir).await,
            }
        }
        ctx.advance(Stage::FailedRolledBack);
    }

    /// Point the annotation service back at `previous` in the background.
    fn renotify_previous(&self, previous: Option<String>) {
        let Some(previous) = previous else {
            return;
        };
        let writer_type = self.history.writer_type(&previous);
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            match notifier.notify(&previous, writer_type).await {
                Ok(()) => info!(job_id = %previous, "restored previous job on annotation service"),
                Err(e) => debug!(job_id = %previous, error = %e, "could not restore previous job"),
            }
        });
    }

    // ── Job management ──────────────────────────────────────────────

    /// The history, with the selection resolved the way read APIs see it.
    pub fn history(&self) -> Result<JobHistory, PipelineError> {
        let mut history = self.history.get()?;
        if history.selected_job_id.is_empty() {
            history.selected_job_id = self.history.resolve(None).unwrap_or_default();
        }
        Ok(history)
    }

    /// Make `job_id` the job the annotation service serves.
    pub async fn select_job(&self, job_id: &str) -> Result<(), PipelineError> {
        if !self.history.job_exists(job_id) {
            return Err(HistoryError::JobNotFound(job_id.to_string()).into());
        }
        let writer_type = self.history.writer_type(job_id);
        self.notifier
            .notify(job_id, writer_type)
            .await
            .map_err(|e| PipelineError::Notification {
                job_id: job_id.to_string(),
                message: e.to_string(),
            })?;
        self.history.select(job_id)?;
        Ok(())
    }

    /// Remove a job from history, its output directory and, for graph
    /// database writers, its subgraph. Deleting the selected job promotes
    /// the newest remaining one.
    pub async fn delete_job(&self, job_id: &str) -> Result<DeleteJobOutcome, PipelineError> {
        let job_dir = self.history.job_dir(job_id)?;

        let writer_type = self.history.writer_type(job_id);
        if writer_type.requires_graph_database() {
            if let Some(db) = &self.graph_db {
                db.delete_subgraph(job_id).await;
            }
        }

        let (mut history, selected_job_affected) = self.history.delete(job_id)?;

        let directory_deleted = match tokio::fs::remove_dir_all(&job_dir).await {
            Ok(()) => {
                info!(job_id = %job_id, "deleted job output directory");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "failed to delete job output directory");
                false
            }
        };

        let mut new_selected_job = None;
        if selected_job_affected {
            if let Some(head) = history.history.first().map(|r| r.job_id.clone()) {
                match self.select_job(&head).await {
                    Ok(()) => {
                        history.selected_job_id = head.clone();
                        new_selected_job = Some(head);
                    }
                    Err(e) => warn!(job_id = %head, error = %e, "could not promote next job"),
                }
            }
        }

        let mut message = format!("Job {job_id} deleted successfully");
        if selected_job_affected {
            match &new_selected_job {
                Some(head) => message.push_str(&format!(". Selected job switched to {head}")),
                None => message.push_str(". No jobs remain selected"),
            }
        }

        Ok(DeleteJobOutcome {
            message,
            history,
            directory_deleted,
            selected_job_affected,
            new_selected_job,
        })
    }

    pub fn clear_history(&self) -> Result<JobHistory, PipelineError> {
        Ok(self.history.clear()?)
    }

    /// Graph info for `job_id` (or the resolved job), regenerating and
    /// saving it when the stored copy is missing.
    pub async fn graph_info(&self, job_id: Option<&str>) -> Result<JobHistoryRecord, PipelineError> {
        let Some(job_id) = self.history.resolve(job_id) else {
            return Ok(JobHistoryRecord::empty());
        };
        if let Some(info) = self.history.graph_info(&job_id)? {
            return Ok(info);
        }

        debug!(job_id = %job_id, "regenerating graph info");
        let dir = self.history.job_dir(&job_id)?;
        let schema = self.history.schema(&job_id)?.unwrap_or_default();
        let sync: Option<BulkLoadResult> = self.history.read_job_file(&job_id, NEO4J_RESULT_FILE)?;
        let manifest = collect_manifest(&dir).await?;
        let info = compute_graph_info(
            &job_id,
            self.history.writer_type(&job_id),
            &dir,
            &schema,
            &manifest,
            sync.as_ref(),
        );
        if let Err(e) = self.history.write_job_file(&job_id, GRAPH_INFO_FILE, &info) {
            warn!(job_id = %job_id, error = %e, "could not save regenerated graph info");
        }
        Ok(info)
    }

    pub fn annotation_schema(
        &self,
        job_id: Option<&str>,
    ) -> Result<Option<AnnotationSchema>, PipelineError> {
        match self.history.resolve(job_id) {
            Some(job_id) => Ok(self.history.annotation_schema(&job_id)?),
            None => Ok(None),
        }
    }
}

fn loader_error(job_id: String, e: LoaderError) -> PipelineError {
    PipelineError::Loader {
        job_id,
        exit_code: -1,
        message: e.to_string(),
        stdout: String::new(),
        stderr: String::new(),
    }
}

async fn remove_dir(job_id: &str, dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => info!(job_id = %job_id, "removed job output directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(job_id = %job_id, error = %e, "failed to remove job output directory"),
    }
}

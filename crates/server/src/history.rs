//! Durable job history plus the "selected job" pointer.
//!
//! Layout under the output directory:
//!
//! ```text
//! history.json          {"selected_job_id": "...", "history": [newest, ..., oldest]}
//! selected_job.txt      a single job id
//! <job_id>/             one directory per finalized job
//! ```
//!
//! Both files are rewritten whole on every change. Concurrent writers are
//! last-writer-wins.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use atomspace_core::{AnnotationSchema, JobHistory, JobHistoryRecord, JobMetadata, SchemaDefinition, WriterType};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const HISTORY_FILE: &str = "history.json";
pub const SELECTION_FILE: &str = "selected_job.txt";

pub const SCHEMA_FILE: &str = "schema.json";
pub const JOB_METADATA_FILE: &str = "job_metadata.json";
pub const GRAPH_INFO_FILE: &str = "graph_info.json";
pub const ANNOTATION_SCHEMA_FILE: &str = "annotation_schema.json";
pub const NEO4J_RESULT_FILE: &str = "neo4j_load_result.json";

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Job ID {0} does not exist")]
    JobNotFound(String),

    #[error("Invalid job id '{0}'")]
    InvalidJobId(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HistoryError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::JobNotFound(_) => 404,
            Self::InvalidJobId(_) => 400,
            Self::Io(_) | Self::Serialization(_) => 500,
        }
    }
}

pub struct JobHistoryStore {
    output_dir: PathBuf,
    /// Never treated as a job directory.
    uploads_dir: PathBuf,
}

impl JobHistoryStore {
    pub fn new(output_dir: &Path, uploads_dir: &Path) -> Result<Self, HistoryError> {
        std::fs::create_dir_all(output_dir)?;
        info!(path = %output_dir.display(), "job history store initialized");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            uploads_dir: uploads_dir.to_path_buf(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn history_path(&self) -> PathBuf {
        self.output_dir.join(HISTORY_FILE)
    }

    fn selection_path(&self) -> PathBuf {
        self.output_dir.join(SELECTION_FILE)
    }

    /// Directory of `job_id`. The id must be a single plain path component.
    pub fn job_dir(&self, job_id: &str) -> Result<PathBuf, HistoryError> {
        let mut components = Path::new(job_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) if !job_id.starts_with('.') => {
                Ok(self.output_dir.join(job_id))
            }
            _ => Err(HistoryError::InvalidJobId(job_id.to_string())),
        }
    }

    pub fn job_exists(&self, job_id: &str) -> bool {
        self.job_dir(job_id)
            .map(|d| d.is_dir() && !self.is_uploads_dir(&d))
            .unwrap_or(false)
    }

    /// Compares resolved paths so `./out/uploads` and `out/uploads` match.
    /// Falls back to the directory name when either side cannot be resolved.
    fn is_uploads_dir(&self, path: &Path) -> bool {
        match (std::fs::canonicalize(path), std::fs::canonicalize(&self.uploads_dir)) {
            (Ok(path), Ok(uploads)) => path == uploads,
            _ => path.file_name().is_some() && path.file_name() == self.uploads_dir.file_name(),
        }
    }

    // ── History document ─────────────────────────────────────────

    fn load(&self) -> Result<JobHistory, HistoryError> {
        match std::fs::read_to_string(self.history_path()) {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(JobHistory::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, history: &JobHistory) -> Result<(), HistoryError> {
        write_json(&self.history_path(), history)
    }

    /// The history with `selected_job_id` taken from the pointer file, or
    /// empty when the pointer is missing or stale.
    pub fn get(&self) -> Result<JobHistory, HistoryError> {
        let mut history = self.load()?;
        history.selected_job_id = self.selected().unwrap_or_default();
        Ok(history)
    }

    /// Prepend `record` as the newest entry.
    pub fn append(&self, record: JobHistoryRecord) -> Result<(), HistoryError> {
        let mut history = self.load()?;
        debug!(job_id = %record.job_id, previous = history.history.len(), "appending job to history");
        history.history.insert(0, record);
        history.selected_job_id = self.selected().unwrap_or_default();
        self.save(&history)
    }

    /// Remove every record of `job_id`. Returns the updated history and
    /// whether the removed job was the selected one; in that case the
    /// pointer is cleared and choosing a replacement is up to the caller.
    pub fn delete(&self, job_id: &str) -> Result<(JobHistory, bool), HistoryError> {
        let selected_affected = self.read_pointer().as_deref() == Some(job_id);
        if selected_affected {
            self.clear_selection()?;
        }

        let mut history = self.load()?;
        let before = history.history.len();
        history.history.retain(|r| r.job_id != job_id);
        history.selected_job_id = self.selected().unwrap_or_default();
        if history.history.len() != before || selected_affected {
            self.save(&history)?;
        }
        Ok((history, selected_affected))
    }

    /// Reset to the empty skeleton and delete every job directory.
    pub fn clear(&self) -> Result<JobHistory, HistoryError> {
        let history = JobHistory::default();
        self.save(&history)?;
        self.clear_selection()?;

        for (job_id, _) in self.job_dirs()? {
            let dir = self.output_dir.join(&job_id);
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => info!(job_id = %job_id, "deleted job output directory"),
                Err(e) => warn!(job_id = %job_id, error = %e, "failed to delete job output directory"),
            }
        }
        Ok(history)
    }

    // ── Selection pointer ────────────────────────────────────────

    fn read_pointer(&self) -> Option<String> {
        let raw = std::fs::read_to_string(self.selection_path()).ok()?;
        let id = raw.trim();
        (!id.is_empty()).then(|| id.to_string())
    }

    /// The selected job id, if the pointer names an existing job.
    pub fn selected(&self) -> Option<String> {
        self.read_pointer().filter(|id| self.job_exists(id))
    }

    pub fn select(&self, job_id: &str) -> Result<(), HistoryError> {
        if !self.job_exists(job_id) {
            return Err(HistoryError::JobNotFound(job_id.to_string()));
        }
        std::fs::write(self.selection_path(), job_id)?;
        info!(job_id = %job_id, "selected job");
        Ok(())
    }

    pub fn clear_selection(&self) -> Result<(), HistoryError> {
        match std::fs::remove_file(self.selection_path()) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Pick the job read APIs should use: `explicit` if it exists, else the
    /// valid selection, else the most recently modified job directory.
    pub fn resolve(&self, explicit: Option<&str>) -> Option<String> {
        if let Some(id) = explicit.filter(|id| self.job_exists(id)) {
            return Some(id.to_string());
        }
        if let Some(id) = self.selected() {
            return Some(id);
        }
        match self.job_dirs() {
            Ok(dirs) => dirs
                .into_iter()
                .max_by_key(|(_, modified)| *modified)
                .map(|(id, _)| id),
            Err(e) => {
                warn!(error = %e, "failed to list job directories");
                None
            }
        }
    }

    /// Job directories with their modification times.
    fn job_dirs(&self) -> Result<Vec<(String, SystemTime)>, HistoryError> {
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(&self.output_dir)? {
            let entry = entry?;
            let path = entry.path();
            let meta = entry.metadata()?;
            if !meta.is_dir() || self.is_uploads_dir(&path) {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            dirs.push((name, meta.modified()?));
        }
        Ok(dirs)
    }

    // ── Per-job files ────────────────────────────────────────────

    pub fn read_job_file<T: DeserializeOwned>(
        &self,
        job_id: &str,
        name: &str,
    ) -> Result<Option<T>, HistoryError> {
        let path = self.job_dir(job_id)?.join(name);
        match std::fs::read_to_string(&path) {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_job_file<T: Serialize>(
        &self,
        job_id: &str,
        name: &str,
        value: &T,
    ) -> Result<(), HistoryError> {
        write_json(&self.job_dir(job_id)?.join(name), value)
    }

    /// Writer type recorded in the job's metadata, defaulting to metta.
    pub fn writer_type(&self, job_id: &str) -> WriterType {
        match self.read_job_file::<JobMetadata>(job_id, JOB_METADATA_FILE) {
            Ok(Some(meta)) => meta.writer_type,
            Ok(None) => WriterType::default(),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "unreadable job metadata, assuming metta");
                WriterType::default()
            }
        }
    }

    pub fn schema(&self, job_id: &str) -> Result<Option<SchemaDefinition>, HistoryError> {
        self.read_job_file(job_id, SCHEMA_FILE)
    }

    pub fn graph_info(&self, job_id: &str) -> Result<Option<JobHistoryRecord>, HistoryError> {
        self.read_job_file(job_id, GRAPH_INFO_FILE)
    }

    /// Stored annotation schema, generated from `schema.json` on first read.
    pub fn annotation_schema(&self, job_id: &str) -> Result<Option<AnnotationSchema>, HistoryError> {
        if !self.job_exists(job_id) {
            return Ok(None);
        }
        if let Some(existing) = self.read_job_file(job_id, ANNOTATION_SCHEMA_FILE)? {
            return Ok(Some(existing));
        }
        let Some(schema) = self.schema(job_id)? else {
            return Ok(None);
        };
        let annotation = AnnotationSchema::from_schema(&schema, job_id);
        self.write_job_file(job_id, ANNOTATION_SCHEMA_FILE, &annotation)?;
        Ok(Some(annotation))
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), HistoryError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn store() -> (TempDir, JobHistoryStore) {
        let dir = TempDir::new().unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        let store = JobHistoryStore::new(dir.path(), &uploads).unwrap();
        (dir, store)
    }

    fn record(job_id: &str) -> JobHistoryRecord {
        JobHistoryRecord {
            job_id: job_id.to_string(),
            ..JobHistoryRecord::empty()
        }
    }

    fn make_job(store: &JobHistoryStore, job_id: &str, age_secs: u64) {
        let dir = store.job_dir(job_id).unwrap();
        std::fs::create_dir_all(&dir).unwrap();
        let modified = SystemTime::now() - Duration::from_secs(age_secs);
        std::fs::File::open(&dir).unwrap().set_modified(modified).unwrap();
    }

    #[test]
    fn empty_store_returns_skeleton() {
        let (_dir, store) = store();
        assert_eq!(store.get().unwrap(), JobHistory::default());
        assert_eq!(store.resolve(None), None);
    }

    #[test]
    fn append_prepends() {
        let (_dir, store) = store();
        store.append(record("a")).unwrap();
        store.append(record("b")).unwrap();
        let ids: Vec<_> = store.get().unwrap().history.into_iter().map(|r| r.job_id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn resolution_prefers_explicit_then_selection_then_newest() {
        let (_dir, store) = store();
        make_job(&store, "old", 300);
        make_job(&store, "newest", 10);
        make_job(&store, "middle", 100);

        // Tier 3: newest directory by mtime; uploads/ never counts.
        let uploads = store.output_dir().join("uploads");
        std::fs::File::open(&uploads).unwrap().set_modified(SystemTime::now()).unwrap();
        assert_eq!(store.resolve(None).as_deref(), Some("newest"));

        // Tier 2: a valid selection beats recency.
        store.select("old").unwrap();
        assert_eq!(store.resolve(None).as_deref(), Some("old"));

        // Tier 1: an existing explicit id beats the selection.
        assert_eq!(store.resolve(Some("middle")).as_deref(), Some("middle"));
        // A missing explicit id falls through.
        assert_eq!(store.resolve(Some("ghost")).as_deref(), Some("old"));

        // A stale selection falls through to recency.
        std::fs::remove_dir_all(store.job_dir("old").unwrap()).unwrap();
        assert_eq!(store.resolve(None).as_deref(), Some("newest"));
        assert_eq!(store.get().unwrap().selected_job_id, "");
    }

    #[test]
    fn select_requires_existing_job() {
        let (_dir, store) = store();
        assert!(matches!(store.select("ghost"), Err(HistoryError::JobNotFound(_))));
        assert!(matches!(store.job_dir("../etc"), Err(HistoryError::InvalidJobId(_))));
        assert!(matches!(store.job_dir("a/b"), Err(HistoryError::InvalidJobId(_))));
    }

    #[test]
    fn deleting_selected_job_clears_pointer() {
        let (_dir, store) = store();
        make_job(&store, "a", 10);
        make_job(&store, "b", 5);
        store.append(record("a")).unwrap();
        store.append(record("b")).unwrap();
        store.select("b").unwrap();

        let (history, affected) = store.delete("b").unwrap();
        assert!(affected);
        assert_eq!(history.history.len(), 1);
        assert_eq!(history.selected_job_id, "");
        assert!(store.selected().is_none());

        let (_, affected) = store.delete("a").unwrap();
        assert!(!affected);
        assert!(store.get().unwrap().history.is_empty());
    }

    #[test]
    fn clear_removes_job_dirs_but_not_uploads() {
        let (_dir, store) = store();
        make_job(&store, "a", 10);
        store.append(record("a")).unwrap();
        store.select("a").unwrap();

        let history = store.clear().unwrap();
        assert_eq!(history, JobHistory::default());
        assert!(!store.job_exists("a"));
        assert!(store.output_dir().join("uploads").is_dir());
        assert!(!store.output_dir().join(SELECTION_FILE).exists());
        assert_eq!(store.get().unwrap(), JobHistory::default());
    }

    #[test]
    fn uploads_dir_is_recognised_through_unnormalised_paths() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("work")).unwrap();
        let uploads = root.path().join("output").join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        let output = root.path().join("work").join("..").join("output");
        let store = JobHistoryStore::new(&output, &uploads).unwrap();

        assert_eq!(store.resolve(None), None);
        assert!(!store.job_exists("uploads"));
        assert!(store.select("uploads").is_err());

        make_job(&store, "a", 10);
        assert_eq!(store.resolve(Some("uploads")).as_deref(), Some("a"));

        store.clear().unwrap();
        assert!(uploads.is_dir());
        assert!(!store.job_exists("a"));
    }

    #[test]
    fn annotation_schema_is_generated_once_from_schema_json() {
        let (_dir, store) = store();
        make_job(&store, "a", 1);
        assert_eq!(store.annotation_schema("a").unwrap(), None);

        let schema = SchemaDefinition::from_json_str(
            r#"{"vertex_labels": [{"name": "gene"}], "edge_labels": [{"name": "self", "source_label": "gene", "target_label": "gene"}]}"#,
        )
        .unwrap();
        store.write_job_file("a", SCHEMA_FILE, &schema).unwrap();

        let annotation = store.annotation_schema("a").unwrap().unwrap();
        assert_eq!(annotation.nodes[0].id, "gene");
        assert!(store.job_dir("a").unwrap().join(ANNOTATION_SCHEMA_FILE).exists());
    }

    #[test]
    fn writer_type_defaults_to_metta() {
        let (_dir, store) = store();
        make_job(&store, "a", 1);
        assert_eq!(store.writer_type("a"), WriterType::Metta);
        store
            .write_job_file(
                "a",
                JOB_METADATA_FILE,
                &JobMetadata {
                    job_id: "a".into(),
                    writer_type: WriterType::Neo4j,
                    created_at: "now".into(),
                },
            )
            .unwrap();
        assert_eq!(store.writer_type("a"), WriterType::Neo4j);
    }
}

//! Upload sessions: time-boxed staging areas for files awaiting a job.
//!
//! Each session owns `<uploads_dir>/<session_id>/`. Sessions expire lazily
//! when read after their deadline and are garbage-collected by the periodic
//! [`sweep`](UploadSessionStore::sweep).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Expired,
    Consumed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Consumed => "consumed",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadSession {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    /// Unique within the session, in upload order.
    pub uploaded_files: Vec<String>,
    #[serde(skip)]
    pub dir: PathBuf,
}

impl UploadSession {
    fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub filename: String,
    pub size: u64,
    pub status: &'static str,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid or expired session: {0}")]
    NotFound(String),

    #[error("Session {0} has expired")]
    Expired(String),

    #[error("Session {0} has already been consumed")]
    Consumed(String),

    #[error("No files uploaded in session {0}")]
    NoFiles(String),

    #[error("File '{filename}' already uploaded to session {session_id}")]
    DuplicateFile { session_id: String, filename: String },

    #[error("File '{filename}' not found in session {session_id}")]
    FileNotFound { session_id: String, filename: String },

    #[error("Invalid filename '{0}'")]
    InvalidFilename(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_)
            | Self::Expired(_)
            | Self::Consumed(_)
            | Self::NoFiles(_)
            | Self::InvalidFilename(_) => 400,
            Self::FileNotFound { .. } => 404,
            Self::DuplicateFile { .. } => 409,
            Self::Io(_) => 500,
        }
    }
}

/// A bare file name: no separators, not `.`/`..`, not empty.
pub fn validate_filename(filename: &str) -> Result<(), SessionError> {
    let bad = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0']);
    if bad {
        return Err(SessionError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

fn new_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct UploadSessionStore {
    root: PathBuf,
    ttl: chrono::Duration,
    sessions: RwLock<HashMap<String, UploadSession>>,
}

impl UploadSessionStore {
    pub fn new(root: &Path, ttl: Duration) -> Result<Self, SessionError> {
        std::fs::create_dir_all(root)?;
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        info!(path = %root.display(), ttl_secs = ttl.num_seconds(), "upload session store initialized");
        Ok(Self {
            root: root.to_path_buf(),
            ttl,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    pub fn create(&self) -> Result<String, SessionError> {
        let session_id = new_session_id();
        let dir = self.session_dir(&session_id);
        std::fs::create_dir_all(&dir)?;

        let now = Utc::now();
        let session = UploadSession {
            session_id: session_id.clone(),
            created_at: now,
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            status: SessionStatus::Active,
            uploaded_files: Vec::new(),
            dir,
        };
        self.sessions
            .write()
            .unwrap()
            .insert(session_id.clone(), session);
        debug!(session_id = %session_id, "upload session created");
        Ok(session_id)
    }

    /// The session, unless unknown or expired. Reading a session past its
    /// deadline marks it expired.
    pub fn get(&self, session_id: &str) -> Option<UploadSession> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(session_id)?;
        if session.is_past_deadline(Utc::now()) {
            if session.status == SessionStatus::Active {
                session.status = SessionStatus::Expired;
                debug!(session_id = %session_id, "upload session expired");
            }
            return None;
        }
        if session.status == SessionStatus::Expired {
            return None;
        }
        Some(session.clone())
    }

    /// The session if it can still accept files or feed a job.
    pub fn require_active(&self, session_id: &str) -> Result<UploadSession, SessionError> {
        match self.get(session_id) {
            Some(s) if s.status == SessionStatus::Active => Ok(s),
            Some(_) => Err(SessionError::Consumed(session_id.to_string())),
            None => {
                let known = self.sessions.read().unwrap().contains_key(session_id);
                if known {
                    Err(SessionError::Expired(session_id.to_string()))
                } else {
                    Err(SessionError::NotFound(session_id.to_string()))
                }
            }
        }
    }

    fn with_active<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut UploadSession) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        self.require_active(session_id)?;
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        f(session)
    }

    /// Register an already-written file.
    pub fn add_file(&self, session_id: &str, filename: &str) -> Result<(), SessionError> {
        validate_filename(filename)?;
        self.with_active(session_id, |session| {
            if session.uploaded_files.iter().any(|f| f == filename) {
                return Err(SessionError::DuplicateFile {
                    session_id: session_id.to_string(),
                    filename: filename.to_string(),
                });
            }
            session.uploaded_files.push(filename.to_string());
            Ok(())
        })
    }

    /// Write `bytes` into the session directory and register the file.
    pub fn stage_file(
        &self,
        session_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, SessionError> {
        validate_filename(filename)?;
        let session = self.require_active(session_id)?;
        if session.uploaded_files.iter().any(|f| f == filename) {
            return Err(SessionError::DuplicateFile {
                session_id: session_id.to_string(),
                filename: filename.to_string(),
            });
        }
        let path = session.dir.join(filename);
        std::fs::write(&path, bytes)?;
        self.add_file(session_id, filename)?;
        debug!(session_id = %session_id, filename, size = bytes.len(), "file staged");
        Ok(path)
    }

    pub fn remove_file(&self, session_id: &str, filename: &str) -> Result<(), SessionError> {
        let dir = self.with_active(session_id, |session| {
            let index = session
                .uploaded_files
                .iter()
                .position(|f| f == filename)
                .ok_or_else(|| SessionError::FileNotFound {
                    session_id: session_id.to_string(),
                    filename: filename.to_string(),
                })?;
            session.uploaded_files.remove(index);
            Ok(session.dir.clone())
        })?;
        match std::fs::remove_file(dir.join(filename)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Mark consumed by a job. Storage is kept until [`cleanup`](Self::cleanup).
    pub fn consume(&self, session_id: &str) -> Result<(), SessionError> {
        self.with_active(session_id, |session| {
            session.status = SessionStatus::Consumed;
            Ok(())
        })
    }

    /// Delete the session's storage and forget it. Idempotent.
    pub fn cleanup(&self, session_id: &str) -> Result<(), SessionError> {
        let dir = self.session_dir(session_id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.sessions.write().unwrap().remove(session_id);
        debug!(session_id = %session_id, "upload session cleaned up");
        Ok(())
    }

    /// Expire and clean up every active session past its deadline. A failed
    /// cleanup is logged and skipped. Returns how many were cleaned.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = {
            let mut sessions = self.sessions.write().unwrap();
            sessions
                .values_mut()
                .filter(|s| s.status == SessionStatus::Active && s.is_past_deadline(now))
                .map(|s| {
                    s.status = SessionStatus::Expired;
                    s.session_id.clone()
                })
                .collect()
        };

        let mut cleaned = 0;
        for session_id in &expired {
            match self.cleanup(session_id) {
                Ok(()) => cleaned += 1,
                Err(e) => warn!(session_id = %session_id, error = %e, "failed to clean up expired session"),
            }
        }
        cleaned
    }

    /// Size of each registered file still present on disk.
    pub fn files_info(&self, session_id: &str) -> Vec<FileInfo> {
        let Some(session) = self.get(session_id) else {
            return Vec::new();
        };
        session
            .uploaded_files
            .iter()
            .filter_map(|filename| {
                let meta = std::fs::metadata(session.dir.join(filename)).ok()?;
                meta.is_file().then(|| FileInfo {
                    filename: filename.clone(),
                    size: meta.len(),
                    status: "uploaded",
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(ttl: Duration) -> (TempDir, UploadSessionStore) {
        let dir = TempDir::new().unwrap();
        let store = UploadSessionStore::new(&dir.path().join("uploads"), ttl).unwrap();
        (dir, store)
    }

    fn backdate(store: &UploadSessionStore, session_id: &str) {
        let mut sessions = store.sessions.write().unwrap();
        sessions.get_mut(session_id).unwrap().expires_at = Utc::now() - chrono::Duration::seconds(1);
    }

    #[test]
    fn session_ids_are_unguessable_hex() {
        let (_dir, store) = store(Duration::from_secs(60));
        let a = store.create().unwrap();
        let b = store.create().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(store.session_dir(&a).is_dir());
    }

    #[test]
    fn stage_and_remove_files() {
        let (_dir, store) = store(Duration::from_secs(60));
        let id = store.create().unwrap();

        let path = store.stage_file(&id, "a.csv", b"id\n1\n").unwrap();
        assert!(path.exists());
        let err = store.stage_file(&id, "a.csv", b"again").unwrap_err();
        assert!(matches!(err, SessionError::DuplicateFile { .. }));
        assert_eq!(err.status_code(), 409);

        assert_eq!(
            store.files_info(&id),
            vec![FileInfo { filename: "a.csv".into(), size: 5, status: "uploaded" }]
        );

        store.remove_file(&id, "a.csv").unwrap();
        assert!(!path.exists());
        assert!(store.get(&id).unwrap().uploaded_files.is_empty());
        assert!(matches!(
            store.remove_file(&id, "a.csv").unwrap_err(),
            SessionError::FileNotFound { .. }
        ));
    }

    #[test]
    fn rejects_path_like_filenames() {
        let (_dir, store) = store(Duration::from_secs(60));
        let id = store.create().unwrap();
        for name in ["", "..", "../escape.csv", "dir/a.csv", "a\\b.csv"] {
            assert!(
                matches!(store.add_file(&id, name), Err(SessionError::InvalidFilename(_))),
                "{name:?} accepted"
            );
        }
    }

    #[test]
    fn reading_an_expired_session_marks_it_expired() {
        let (_dir, store) = store(Duration::from_secs(60));
        let id = store.create().unwrap();
        backdate(&store, &id);

        assert!(store.get(&id).is_none());
        assert_eq!(
            store.sessions.read().unwrap()[&id].status,
            SessionStatus::Expired
        );
        assert!(matches!(store.require_active(&id), Err(SessionError::Expired(_))));
        assert!(matches!(store.require_active("nope"), Err(SessionError::NotFound(_))));
    }

    #[test]
    fn consumed_sessions_keep_storage_until_cleanup() {
        let (_dir, store) = store(Duration::from_secs(60));
        let id = store.create().unwrap();
        store.stage_file(&id, "a.csv", b"x").unwrap();

        store.consume(&id).unwrap();
        assert_eq!(store.get(&id).unwrap().status, SessionStatus::Consumed);
        assert!(store.session_dir(&id).join("a.csv").exists());
        assert!(matches!(store.add_file(&id, "b.csv"), Err(SessionError::Consumed(_))));

        store.cleanup(&id).unwrap();
        store.cleanup(&id).unwrap();
        assert!(!store.session_dir(&id).exists());
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn sweep_cleans_only_expired_active_sessions() {
        let (_dir, store) = store(Duration::from_secs(60));
        let live = store.create().unwrap();
        let stale = store.create().unwrap();
        let consumed = store.create().unwrap();
        store.consume(&consumed).unwrap();
        backdate(&store, &stale);
        backdate(&store, &consumed);

        assert_eq!(store.sweep(), 1);
        assert!(!store.session_dir(&stale).exists());
        assert!(store.session_dir(&live).exists());
        assert!(store.session_dir(&consumed).exists());
        assert_eq!(store.sweep(), 0);
    }

    #[test]
    fn sweep_continues_past_a_failed_cleanup() {
        let (_dir, store) = store(Duration::from_secs(60));
        let broken = store.create().unwrap();
        let fine = store.create().unwrap();
        backdate(&store, &broken);
        backdate(&store, &fine);

        // A plain file where the directory should be makes remove_dir_all fail.
        let broken_dir = store.session_dir(&broken);
        std::fs::remove_dir(&broken_dir).unwrap();
        std::fs::write(&broken_dir, b"not a dir").unwrap();

        assert_eq!(store.sweep(), 1);
        assert!(!store.session_dir(&fine).exists());
        assert_eq!(store.len(), 1);
    }
}

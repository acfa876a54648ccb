//! Job stages and the cleanup each one needs on failure.

use serde::Serialize;

/// Furthest point a job has reached.
///
/// ```text
/// Created -> FilesStaged -> BulkLoaded -> DbSynced | DbSyncDegraded | DbSyncSkipped
///         -> Notified -> Finalized
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Created,
    FilesStaged,
    BulkLoaded,
    DbSynced,
    DbSyncDegraded,
    DbSyncSkipped,
    Notified,
    Finalized,
    FailedRolledBack,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::FilesStaged => "files_staged",
            Self::BulkLoaded => "bulk_loaded",
            Self::DbSynced => "db_synced",
            Self::DbSyncDegraded => "db_sync_degraded",
            Self::DbSyncSkipped => "db_sync_skipped",
            Self::Notified => "notified",
            Self::Finalized => "finalized",
            Self::FailedRolledBack => "failed_rolled_back",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    /// Point the annotation service back at the job that was active before.
    /// Errors are ignored.
    RenotifyPrevious,
    /// Drop whatever the sync imported into the graph database.
    DeleteSubgraph,
    RemoveOutputDir,
}

/// Cleanup steps, in order, for a job that fails after reaching `stage`.
///
/// Past `BulkLoaded` the only step that can fail fatally is notification,
/// so those plans start by restoring the previous job.
pub fn rollback_plan(stage: Stage) -> &'static [Cleanup] {
    use Cleanup::*;
    match stage {
        Stage::Created => &[],
        Stage::FilesStaged | Stage::BulkLoaded => &[RemoveOutputDir],
        Stage::DbSyncSkipped => &[RenotifyPrevious, RemoveOutputDir],
        Stage::DbSynced | Stage::DbSyncDegraded => {
            &[RenotifyPrevious, DeleteSubgraph, RemoveOutputDir]
        }
        Stage::Notified | Stage::Finalized | Stage::FailedRolledBack => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_to_undo_before_loading_or_after_notifying() {
        assert!(rollback_plan(Stage::Created).is_empty());
        assert!(rollback_plan(Stage::Notified).is_empty());
        assert!(rollback_plan(Stage::Finalized).is_empty());
    }

    #[test]
    fn loader_failures_only_remove_output() {
        assert_eq!(rollback_plan(Stage::FilesStaged), &[Cleanup::RemoveOutputDir]);
        assert_eq!(rollback_plan(Stage::BulkLoaded), &[Cleanup::RemoveOutputDir]);
    }

    #[test]
    fn synced_jobs_also_drop_their_subgraph() {
        for stage in [Stage::DbSynced, Stage::DbSyncDegraded] {
            assert_eq!(
                rollback_plan(stage),
                &[Cleanup::RenotifyPrevious, Cleanup::DeleteSubgraph, Cleanup::RemoveOutputDir]
            );
        }
        assert!(!rollback_plan(Stage::DbSyncSkipped).contains(&Cleanup::DeleteSubgraph));
    }
}

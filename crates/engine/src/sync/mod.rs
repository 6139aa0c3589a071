// Repository synchronization: bring the course store in line with the
// working copy on disk.

pub mod loader;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::course::CourseWorkingCopy;
use crate::git::{CommandExecutor, GitWorker, ProcessCommandExecutor};
use crate::job::EditJob;
use crate::store::CourseStore;

pub use loader::{load_course, ContentIssue, LoadedCourse};

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Revision of the working copy that was synced, when it is a git checkout.
    pub commit_hash: Option<String>,
    pub errors: Vec<ContentIssue>,
    pub warnings: Vec<ContentIssue>,
    pub had_errors: bool,
    /// Rows inserted, updated, revived or soft-deleted.
    pub store_changes: usize,
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// Content was synced, but some info files were invalid.
    #[error("One or more JSON files contained errors and were unable to be synced")]
    JsonErrors { result: Box<SyncResult> },

    #[error("failed to load course content: {0}")]
    Load(String),

    #[error("failed to update course store: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Propagates a working copy into whatever the rest of the system reads.
///
/// Runs while the caller holds the course lock, and must be idempotent: a
/// second pass over an unchanged directory changes nothing.
pub trait RepositorySynchronizer: Send + Sync {
    fn sync_to_store(
        &self,
        course: &CourseWorkingCopy,
        job: &EditJob,
    ) -> Result<SyncResult, SyncError>;
}

/// Loads the course from disk and reconciles it into a [`CourseStore`].
#[derive(Debug, Clone)]
pub struct DiskSynchronizer<E = ProcessCommandExecutor> {
    store: Arc<CourseStore>,
    executor: E,
}

impl DiskSynchronizer<ProcessCommandExecutor> {
    pub fn new(store: Arc<CourseStore>) -> Self {
        Self::with_executor(store, ProcessCommandExecutor)
    }
}

impl<E: CommandExecutor + Clone> DiskSynchronizer<E> {
    pub fn with_executor(store: Arc<CourseStore>, executor: E) -> Self {
        Self { store, executor }
    }

    pub fn store(&self) -> &Arc<CourseStore> {
        &self.store
    }

    fn commit_hash(&self, course: &CourseWorkingCopy) -> Option<String> {
        if !course.uses_git {
            return None;
        }
        match GitWorker::with_executor(&course.root, self.executor.clone()).head_commit() {
            Ok(hash) => Some(hash),
            Err(error) => {
                debug!(course = %course.id, %error, "could not read working copy revision");
                None
            }
        }
    }
}

impl<E: CommandExecutor + Clone> RepositorySynchronizer for DiskSynchronizer<E> {
    fn sync_to_store(
        &self,
        course: &CourseWorkingCopy,
        job: &EditJob,
    ) -> Result<SyncResult, SyncError> {
        job.info(format!("Loading info.json files from course repository {}", course.root.display()));
        let loaded = load_course(&course.root).map_err(|error| SyncError::Load(format!("{error:#}")))?;

        let store_changes = self.store.apply_snapshot(&course.id, &course.root, &loaded.snapshot)?;
        let commit_hash = self.commit_hash(course);
        self.store.update_commit_hash(&course.id, commit_hash.as_deref())?;

        for issue in &loaded.warnings {
            job.warn(format!("{}: {}", issue.path, issue.message));
        }
        for issue in &loaded.errors {
            job.error(format!("{}: {}", issue.path, issue.message));
        }

        let result = SyncResult {
            commit_hash,
            had_errors: loaded.has_errors(),
            errors: loaded.errors,
            warnings: loaded.warnings,
            store_changes,
        };
        info!(
            course = %course.id,
            changes = result.store_changes,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "synced course to store"
        );
        job.info(format!("Synced course content ({} changes)", result.store_changes));

        if result.had_errors {
            return Err(SyncError::JsonErrors { result: Box::new(result) });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn write(root: &Path, relative: &str, contents: String) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn fixture() -> (TempDir, CourseWorkingCopy, DiskSynchronizer) {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "infoCourse.json", json!({"name": "CS 101", "title": "Intro"}).to_string());
        write(
            tmp.path(),
            "questions/q1/info.json",
            json!({"uuid": "0f4c1b8e-5e84-4d7f-9c34-2a6bd0d4c901", "title": "First"}).to_string(),
        );
        let course = CourseWorkingCopy::local("c1", tmp.path());
        let store = Arc::new(CourseStore::open_in_memory().unwrap());
        (tmp, course, DiskSynchronizer::new(store))
    }

    #[test]
    fn second_sync_of_unchanged_directory_is_a_no_op() {
        let (_tmp, course, sync) = fixture();
        let job = EditJob::new("c1", "sync", "ada", "ada");

        let first = sync.sync_to_store(&course, &job).unwrap();
        assert!(first.store_changes > 0);
        assert!(first.commit_hash.is_none());

        let second = sync.sync_to_store(&course, &job).unwrap();
        assert_eq!(second.store_changes, 0);
        assert_eq!(sync.store().live_question_ids("c1").unwrap(), vec!["q1"]);
    }

    #[test]
    fn json_errors_fail_the_sync_after_storing_good_rows() {
        let (tmp, course, sync) = fixture();
        write(tmp.path(), "questions/broken/info.json", "{".to_string());
        let job = EditJob::new("c1", "sync", "ada", "ada");

        let error = sync.sync_to_store(&course, &job).expect_err("sync should fail");
        let SyncError::JsonErrors { result } = error else {
            panic!("expected JSON errors, got {error:?}");
        };
        assert!(result.had_errors);
        assert_eq!(
            sync.store().live_question_ids("c1").unwrap(),
            vec!["broken".to_string(), "q1".to_string()]
        );
        assert!(job.log().iter().any(|line| line.message.starts_with("questions/broken/info.json")));
    }

    #[test]
    fn removed_question_is_soft_deleted() {
        let (tmp, course, sync) = fixture();
        let job = EditJob::new("c1", "sync", "ada", "ada");
        sync.sync_to_store(&course, &job).unwrap();

        fs::remove_dir_all(tmp.path().join("questions/q1")).unwrap();
        let result = sync.sync_to_store(&course, &job).unwrap();
        assert_eq!(result.store_changes, 1);
        assert_eq!(sync.store().deleted_question_ids("c1").unwrap(), vec!["q1"]);
    }
}

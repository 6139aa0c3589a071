// Error taxonomy surfaced by edits.

use std::fmt;

use coursesmith_common::encoding::EncodingError;
use coursesmith_common::path::{ContainmentError, PathError};
use thiserror::Error;
use uuid::Uuid;

use crate::git::GitWorkerError;
use crate::lock::LockError;
use crate::sync::SyncError;

#[derive(Debug, Error)]
pub enum EditError {
    /// The identity may not edit this course.
    #[error("access denied ({0})")]
    Forbidden(String),

    /// A target path escapes its container or enters an excluded directory.
    #[error("invalid file path: {0}")]
    InvalidPath(String),

    /// Caller-supplied input could not be interpreted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The file changed on disk since the caller read it.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    LockTimeout(#[from] LockError),

    #[error("git repository or branch are not set for course {0}")]
    RepositoryNotConfigured(String),

    #[error(transparent)]
    Git(#[from] GitWorkerError),

    /// The filesystem mutation itself failed.
    #[error("write failed: {0}")]
    Write(String),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("edit was cancelled")]
    Cancelled,
}

impl EditError {
    pub fn write(context: impl fmt::Display, error: impl fmt::Display) -> Self {
        Self::Write(format!("{context}: {error}"))
    }

    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Forbidden(_) => "forbidden",
            Self::InvalidPath(_) => "invalid_path",
            Self::InvalidInput(_) => "invalid_input",
            Self::Conflict(_) => "conflict",
            Self::LockTimeout(_) => "lock_timeout",
            Self::RepositoryNotConfigured(_) => "repository_not_configured",
            Self::Git(_) => "git_failure",
            Self::Write(_) => "write_failure",
            Self::Sync(_) => "sync_failure",
            Self::Cancelled => "cancelled",
        }
    }

    /// HTTP-style status the request layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Forbidden(_) => 403,
            Self::InvalidPath(_) | Self::InvalidInput(_) => 400,
            Self::Conflict(_) => 409,
            Self::LockTimeout(_) => 503,
            Self::RepositoryNotConfigured(_)
            | Self::Git(_)
            | Self::Write(_)
            | Self::Sync(_)
            | Self::Cancelled => 500,
        }
    }

    /// Whether the error was raised before any shared state was touched.
    pub fn is_pre_mutation(&self) -> bool {
        matches!(
            self,
            Self::Forbidden(_)
                | Self::InvalidPath(_)
                | Self::InvalidInput(_)
                | Self::Conflict(_)
                | Self::LockTimeout(_)
                | Self::RepositoryNotConfigured(_)
        )
    }
}

impl From<ContainmentError> for EditError {
    fn from(error: ContainmentError) -> Self {
        Self::InvalidPath(error.to_string())
    }
}

impl From<PathError> for EditError {
    fn from(error: PathError) -> Self {
        Self::InvalidPath(error.to_string())
    }
}

impl From<EncodingError> for EditError {
    fn from(error: EncodingError) -> Self {
        Self::InvalidInput(error.to_string())
    }
}

/// A failed edit, correlated with the job whose log explains it.
#[derive(Debug, Error)]
#[error("edit failed (job {job_sequence_id}): {error}")]
pub struct EditFailure {
    pub job_sequence_id: Uuid,
    #[source]
    pub error: EditError,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(EditError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(EditError::InvalidPath("x".into()).status_code(), 400);
        assert_eq!(EditError::Conflict("x".into()).status_code(), 409);
        let timeout =
            LockError::Timeout { name: "coursedir:/c".into(), timeout: Duration::from_secs(5) };
        assert_eq!(EditError::from(timeout).status_code(), 503);
        assert_eq!(EditError::Write("disk full".into()).status_code(), 500);
    }

    #[test]
    fn containment_errors_become_invalid_path() {
        let error = EditError::from(ContainmentError::OutsideRoot {
            path: "/etc/passwd".into(),
            root: "/courses/cs101".into(),
        });
        assert_eq!(error.kind(), "invalid_path");
        assert!(error.to_string().contains("/etc/passwd"));
    }

    #[test]
    fn failure_names_the_job() {
        let id = Uuid::new_v4();
        let failure = EditFailure { job_sequence_id: id, error: EditError::Cancelled };
        assert!(failure.to_string().contains(&id.to_string()));
    }
}

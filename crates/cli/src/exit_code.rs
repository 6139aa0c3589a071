// Consistent exit codes for the coursesmith CLI.
//
//   0  = success
//   1  = general error (git, write or sync failure)
//   2  = usage error (bad arguments, invalid path or input)
//   10 = course is busy (lock timeout)
//   11 = not allowed to edit
//   12 = conflict with another editor

use std::process;

use coursesmith_engine::error::{EditError, EditFailure};

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Busy = 10,
    Forbidden = 11,
    Conflict = 12,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(failure) = cause.downcast_ref::<EditFailure>() {
                return Self::from_edit_error(&failure.error);
            }
            if let Some(error) = cause.downcast_ref::<EditError>() {
                return Self::from_edit_error(error);
            }
        }
        Self::Error
    }

    pub fn from_edit_error(error: &EditError) -> Self {
        match error {
            EditError::Forbidden(_) => Self::Forbidden,
            EditError::InvalidPath(_) | EditError::InvalidInput(_) => Self::Usage,
            EditError::Conflict(_) => Self::Conflict,
            EditError::LockTimeout(_) => Self::Busy,
            EditError::RepositoryNotConfigured(_)
            | EditError::Git(_)
            | EditError::Write(_)
            | EditError::Sync(_)
            | EditError::Cancelled => Self::Error,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use coursesmith_engine::job::EditJob;
    use coursesmith_engine::lock::LockError;

    use super::*;

    #[test]
    fn exit_code_values() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::Error.code(), 1);
        assert_eq!(ExitCode::Usage.code(), 2);
        assert_eq!(ExitCode::Busy.code(), 10);
        assert_eq!(ExitCode::Forbidden.code(), 11);
        assert_eq!(ExitCode::Conflict.code(), 12);
    }

    #[test]
    fn edit_failures_map_through_the_chain() {
        let failure = EditFailure {
            job_sequence_id: EditJob::new("c1", "Modify file", "ada", "ada").id(),
            error: EditError::Conflict("Another user made changes to the file you were editing.".into()),
        };
        let err = anyhow::Error::new(failure).context("edit failed");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Conflict);
    }

    #[test]
    fn lock_timeout_is_busy() {
        let error = EditError::from(LockError::Timeout {
            name: "coursedir:/c".into(),
            timeout: Duration::from_secs(5),
        });
        assert_eq!(ExitCode::from_edit_error(&error), ExitCode::Busy);
    }

    #[test]
    fn pre_mutation_errors() {
        assert_eq!(ExitCode::from_edit_error(&EditError::Forbidden("x".into())), ExitCode::Forbidden);
        assert_eq!(ExitCode::from_edit_error(&EditError::InvalidPath("x".into())), ExitCode::Usage);
        assert_eq!(ExitCode::from_edit_error(&EditError::InvalidInput("x".into())), ExitCode::Usage);
    }

    #[test]
    fn from_error_generic_is_error() {
        let err = anyhow::anyhow!("something went wrong");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Error);
    }
}

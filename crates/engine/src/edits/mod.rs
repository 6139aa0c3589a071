// Mutation operations: every way an edit can change a course working copy.
//
// An operation is checked with `assert_can_edit` before the orchestrator takes
// any lock, then consumed by `write` exactly once while the lock is held.

pub mod assessment;
pub mod composite;
pub mod course_info;
pub mod course_instance;
pub mod file;
pub mod fs_util;
pub mod question;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::course::{CourseWorkingCopy, EditIdentity};
use crate::error::EditError;
use crate::job::EditJob;
use crate::store::CourseIndex;

pub use assessment::{AssessmentAdd, AssessmentCopy, AssessmentDelete, AssessmentRename};
pub use composite::CompositeMutation;
pub use course_info::CourseInfoCreate;
pub use course_instance::{
    CourseInstanceAdd, CourseInstanceCopy, CourseInstanceDelete, CourseInstanceRename,
};
pub use file::{FileDelete, FileModify, FileRename, FileUpload};
pub use question::{QuestionAdd, QuestionCopy, QuestionDelete, QuestionRename, QuestionTransfer};

/// What a completed write asks the orchestrator to commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationDescriptor {
    pub description: String,
    /// Exactly the paths to stage, including removed ones.
    pub paths_to_add: Vec<PathBuf>,
    pub commit_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Changed(MutationDescriptor),
    /// Nothing needed to change; no paths, no commit.
    Skipped,
}

impl WriteOutcome {
    pub fn changed(
        description: impl Into<String>,
        paths_to_add: Vec<PathBuf>,
        commit_message: impl Into<String>,
    ) -> Self {
        Self::Changed(MutationDescriptor {
            description: description.into(),
            paths_to_add,
            commit_message: commit_message.into(),
        })
    }
}

/// Everything an operation may consult while it runs.
#[derive(Clone)]
pub struct EditContext {
    pub course: CourseWorkingCopy,
    pub identity: EditIdentity,
    /// Synced view of the course, used for display names and references.
    pub index: Arc<dyn CourseIndex>,
    /// Directory question-add copies from.
    pub template_question: Option<PathBuf>,
}

impl EditContext {
    pub fn new(course: CourseWorkingCopy, identity: EditIdentity, index: Arc<dyn CourseIndex>) -> Self {
        Self { course, identity, index, template_question: None }
    }

    pub fn with_template_question(mut self, template: Option<PathBuf>) -> Self {
        self.template_question = template;
        self
    }

    /// The permission gate shared by every operation.
    pub fn assert_can_edit(&self) -> Result<(), EditError> {
        if !self.identity.authz.has_course_permission_edit {
            return Err(EditError::Forbidden("must be course editor".into()));
        }
        if self.identity.authz.is_example_course {
            return Err(EditError::Forbidden("cannot edit the example course".into()));
        }
        Ok(())
    }

    pub(crate) fn index_error(error: anyhow::Error) -> EditError {
        EditError::write("failed to read existing names", format!("{error:#}"))
    }
}

/// One edit to a course working copy.
pub trait MutationOperation: Send {
    /// Human-readable summary, also used as the job description.
    fn description(&self, course: &CourseWorkingCopy) -> String;

    /// Fail unless the edit is allowed. Must not touch the filesystem.
    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        ctx.assert_can_edit()
    }

    /// Perform the filesystem mutation.
    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::path::Path;

    use anyhow::Result;
    use tempfile::TempDir;

    use super::*;
    use crate::course::{Authorization, UserRef};
    use crate::store::AssessmentRef;

    /// In-memory index with whatever the test says is synced.
    #[derive(Default)]
    pub struct FakeIndex {
        pub question_titles: Vec<String>,
        pub course_instance_long_names: Vec<String>,
        pub assessment_titles: Vec<String>,
        pub references: Vec<AssessmentRef>,
    }

    impl CourseIndex for FakeIndex {
        fn question_titles(&self, _: &str) -> Result<Vec<String>> {
            Ok(self.question_titles.clone())
        }

        fn course_instance_long_names(&self, _: &str) -> Result<Vec<String>> {
            Ok(self.course_instance_long_names.clone())
        }

        fn assessment_titles(&self, _: &str, _: &str) -> Result<Vec<String>> {
            Ok(self.assessment_titles.clone())
        }

        fn assessments_with_question(&self, _: &str, _: &str) -> Result<Vec<AssessmentRef>> {
            Ok(self.references.clone())
        }
    }

    pub fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    pub fn context(tmp: &TempDir, index: FakeIndex) -> EditContext {
        EditContext::new(
            CourseWorkingCopy::local("c1", tmp.path()),
            EditIdentity::editor(UserRef::new("ada@example.com")),
            Arc::new(index),
        )
    }

    pub fn viewer_context(tmp: &TempDir) -> EditContext {
        let mut ctx = context(tmp, FakeIndex::default());
        ctx.identity.authz = Authorization { has_course_permission_edit: false, is_example_course: false };
        ctx
    }

    pub fn job() -> EditJob {
        EditJob::new("c1", "test edit", "ada@example.com", "ada@example.com")
    }

    pub fn changed(outcome: WriteOutcome) -> MutationDescriptor {
        match outcome {
            WriteOutcome::Changed(descriptor) => descriptor,
            WriteOutcome::Skipped => panic!("expected a change, got a skip"),
        }
    }
}

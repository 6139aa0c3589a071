// Course working copy and the acting principal.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Conventional directory and file names inside a course.
pub const QUESTIONS_DIR: &str = "questions";
pub const COURSE_INSTANCES_DIR: &str = "courseInstances";
pub const ASSESSMENTS_DIR: &str = "assessments";
pub const COURSE_INFO_FILE: &str = "infoCourse.json";
pub const QUESTION_INFO_FILE: &str = "info.json";
pub const COURSE_INSTANCE_INFO_FILE: &str = "infoCourseInstance.json";
pub const ASSESSMENT_INFO_FILE: &str = "infoAssessment.json";

/// The single on-disk directory tree for one course, mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseWorkingCopy {
    /// Stable identifier of the course in the store.
    pub id: String,
    pub root: PathBuf,
    /// Remote repository URL, required when `uses_git` is set.
    pub repository: Option<String>,
    pub branch: Option<String>,
    pub uses_git: bool,
    /// Courses new content is seeded from; questions copied in lose their tags.
    #[serde(default)]
    pub template_course: bool,
}

impl CourseWorkingCopy {
    /// A course edited directly on disk, without a git remote.
    pub fn local(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
            repository: None,
            branch: None,
            uses_git: false,
            template_course: false,
        }
    }

    /// A course backed by `repository`, tracking `branch`.
    pub fn git_backed(
        id: impl Into<String>,
        root: impl Into<PathBuf>,
        repository: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
            repository: Some(repository.into()),
            branch: Some(branch.into()),
            uses_git: true,
            template_course: false,
        }
    }

    pub fn questions_dir(&self) -> PathBuf {
        self.root.join(QUESTIONS_DIR)
    }

    pub fn course_instances_dir(&self) -> PathBuf {
        self.root.join(COURSE_INSTANCES_DIR)
    }

    pub fn assessments_dir(&self, course_instance: &str) -> PathBuf {
        self.course_instances_dir().join(course_instance).join(ASSESSMENTS_DIR)
    }

    pub fn course_info_path(&self) -> PathBuf {
        self.root.join(COURSE_INFO_FILE)
    }

    /// `root` relative display used in job narration.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

/// A user as seen by the editing core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// Login identifier, used as the commit email when no email is known.
    pub uid: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserRef {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into(), name: None, email: None }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn commit_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.uid)
    }

    pub fn commit_email(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.uid)
    }
}

/// Permission snapshot resolved by the request layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub has_course_permission_edit: bool,
    /// The target is the protected, read-only example course.
    pub is_example_course: bool,
}

/// Who is editing, and what they are allowed to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditIdentity {
    pub user: UserRef,
    /// The authenticated user; differs from `user` under impersonation.
    pub authn_user: UserRef,
    pub authz: Authorization,
}

impl EditIdentity {
    /// An editor acting as themselves.
    pub fn editor(user: UserRef) -> Self {
        Self {
            authn_user: user.clone(),
            user,
            authz: Authorization { has_course_permission_edit: true, is_example_course: false },
        }
    }
}

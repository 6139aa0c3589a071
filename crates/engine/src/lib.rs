// coursesmith-engine: concurrent, git-backed editing of course content trees.

pub mod config;
pub mod course;
pub mod edits;
pub mod error;
pub mod git;
pub mod job;
pub mod lock;
pub mod orchestrator;
pub mod store;
pub mod sync;

pub use config::EditorConfig;
pub use course::{Authorization, CourseWorkingCopy, EditIdentity, UserRef};
pub use edits::{EditContext, MutationOperation, WriteOutcome};
pub use error::{EditError, EditFailure};
pub use job::{EditJob, JobStatus};
pub use orchestrator::{EditJobResult, EditOrchestrator};

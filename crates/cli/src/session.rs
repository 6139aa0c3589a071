// Per-invocation wiring shared by the course commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use coursesmith_engine::config::{global_config_path, EditorConfig};
use coursesmith_engine::course::{CourseWorkingCopy, EditIdentity, UserRef};
use coursesmith_engine::edits::EditContext;
use coursesmith_engine::orchestrator::EditOrchestrator;
use coursesmith_engine::store::{CourseIndex, CourseStore};
use coursesmith_engine::sync::DiskSynchronizer;
use tracing::debug;

use crate::output::OutputFormat;

/// Which course is being edited, and by whom.
#[derive(Debug, Clone, Args)]
pub struct CourseArgs {
    /// Course working copy directory.
    #[arg(long, default_value = ".")]
    pub course_dir: PathBuf,

    /// Course identifier in the store (defaults to the directory name).
    #[arg(long)]
    pub course_id: Option<String>,

    /// Remote repository URL. Without it the course is edited on disk only.
    #[arg(long)]
    pub repository: Option<String>,

    /// Branch tracked on the remote.
    #[arg(long, default_value = "master")]
    pub branch: String,

    /// Editor login (defaults to `identity.email` from config).
    #[arg(long)]
    pub user: Option<String>,

    /// Commit author name.
    #[arg(long)]
    pub name: Option<String>,

    /// Commit author email.
    #[arg(long)]
    pub email: Option<String>,

    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

impl CourseArgs {
    pub fn format(&self) -> OutputFormat {
        OutputFormat::detect(self.json)
    }

    fn working_copy(&self) -> Result<CourseWorkingCopy> {
        let root = std::path::absolute(&self.course_dir)
            .with_context(|| format!("invalid course directory {}", self.course_dir.display()))?;
        let id = match &self.course_id {
            Some(id) => id.clone(),
            None => root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .context("cannot derive a course id from the course directory; pass --course-id")?,
        };
        Ok(match &self.repository {
            Some(repository) => CourseWorkingCopy::git_backed(id, root, repository.clone(), self.branch.clone()),
            None => CourseWorkingCopy::local(id, root),
        })
    }

    fn user(&self, config: &EditorConfig) -> Result<UserRef> {
        let Some(uid) = self.user.clone().or_else(|| config.identity.email.clone()) else {
            bail!("no editor identity; pass --user or set identity.email in the config file");
        };
        let mut user = UserRef::new(uid);
        if let Some(name) = self.name.clone().or_else(|| config.identity.name.clone()) {
            user = user.with_name(name);
        }
        if let Some(email) = self.email.clone().or_else(|| config.identity.email.clone()) {
            user = user.with_email(email);
        }
        Ok(user)
    }
}

/// Load the config named by `--config`, or the global one when present.
pub fn load_config(path: Option<&Path>) -> Result<EditorConfig> {
    match path {
        Some(path) => EditorConfig::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => match global_config_path() {
            Some(path) => EditorConfig::load_or_default(&path)
                .with_context(|| format!("failed to load config {}", path.display())),
            None => Ok(EditorConfig::default()),
        },
    }
}

/// The store and orchestrator for one CLI invocation.
pub struct Session {
    pub config: EditorConfig,
    pub store: Arc<CourseStore>,
    pub orchestrator: EditOrchestrator,
}

impl Session {
    pub fn new(config: EditorConfig) -> Result<Self> {
        let store = match config.database_path() {
            Some(path) => {
                debug!(path = %path.display(), "opening course store");
                CourseStore::open(&path)
                    .with_context(|| format!("failed to open course store {}", path.display()))?
            }
            None => CourseStore::open_in_memory()?,
        };
        let store = Arc::new(store);
        let orchestrator =
            EditOrchestrator::new(config.clone(), Arc::new(DiskSynchronizer::new(store.clone())))
                .with_job_store(store.clone());
        Ok(Self { config, store, orchestrator })
    }

    /// Edit context for the course named by `args`.
    pub fn context(&self, args: &CourseArgs) -> Result<EditContext> {
        let course = args.working_copy()?;
        let mut identity = EditIdentity::editor(args.user(&self.config)?);
        identity.authz.is_example_course = self.config.is_example_course(&course.root);
        let index: Arc<dyn CourseIndex> = self.store.clone();
        Ok(EditContext::new(course, identity, index).with_template_question(self.config.template_question()))
    }
}

/// Single-threaded runtime driving one command.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use coursesmith_engine::config::IdentitySettings;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        course: CourseArgs,
    }

    fn parse(args: &[&str]) -> CourseArgs {
        let mut argv = vec!["coursesmith"];
        argv.extend_from_slice(args);
        Harness::try_parse_from(argv).unwrap().course
    }

    #[test]
    fn course_id_defaults_to_directory_name() {
        let args = parse(&["--course-dir", "/srv/courses/cs101"]);
        let course = args.working_copy().unwrap();
        assert_eq!(course.id, "cs101");
        assert!(!course.uses_git);
    }

    #[test]
    fn repository_makes_the_course_git_backed() {
        let args = parse(&[
            "--course-dir",
            "/srv/courses/cs101",
            "--course-id",
            "7",
            "--repository",
            "git@example.test:cs101.git",
            "--branch",
            "main",
        ]);
        let course = args.working_copy().unwrap();
        assert_eq!(course.id, "7");
        assert!(course.uses_git);
        assert_eq!(course.branch.as_deref(), Some("main"));
    }

    #[test]
    fn identity_falls_back_to_config() {
        let mut config = EditorConfig::default();
        assert!(parse(&[]).user(&config).is_err());

        config.identity = IdentitySettings { name: Some("Ada".into()), email: Some("ada@example.test".into()) };
        let user = parse(&[]).user(&config).unwrap();
        assert_eq!(user.uid, "ada@example.test");
        assert_eq!(user.commit_name(), "Ada");

        let user = parse(&["--user", "bo", "--name", "Bo"]).user(&config).unwrap();
        assert_eq!(user.uid, "bo");
        assert_eq!(user.commit_name(), "Bo");
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn context_carries_template_and_example_flag() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = EditorConfig::default();
        config.paths.database = Some(dir.path().join("courses.db"));
        config.paths.example_course = Some(dir.path().join("exampleCourse"));
        let session = Session::new(config).unwrap();

        let example = dir.path().join("exampleCourse");
        let args = parse(&["--course-dir", example.to_str().unwrap(), "--user", "ada"]);
        let ctx = session.context(&args).unwrap();
        assert!(ctx.identity.authz.is_example_course);
        assert_eq!(
            ctx.template_question,
            Some(example.join("questions/demo/calculation"))
        );
    }
}

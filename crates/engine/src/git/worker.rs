use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Environment variable git consults for the ssh transport command.
pub const GIT_SSH_COMMAND_ENV: &str = "GIT_SSH_COMMAND";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GitWorkerError {
    #[error("git add requires at least one path")]
    EmptyAddPaths,
    #[error("failed to run `{command}`: {message}")]
    SpawnFailed { command: String, message: String },
    #[error("`{command}` failed with code {code:?}: {}", .stderr.trim())]
    CommandFailed { command: String, code: Option<i32>, stderr: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs.
///
/// `env` holds extra variables for this invocation only; implementations must
/// never write them into the process-wide environment, since several courses
/// may be running git at the same time.
pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        env: &[(String, String)],
    ) -> Result<CommandResult, std::io::Error>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        env: &[(String, String)],
    ) -> Result<CommandResult, std::io::Error> {
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .envs(env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .output()?;
        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Git operations against one course working copy.
///
/// Every command runs with its working directory pinned to the course root.
#[derive(Debug, Clone)]
pub struct GitWorker<E = ProcessCommandExecutor> {
    repo_path: PathBuf,
    remote: String,
    env: Vec<(String, String)>,
    executor: E,
}

impl GitWorker<ProcessCommandExecutor> {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self::with_executor(repo_path, ProcessCommandExecutor)
    }
}

impl<E: CommandExecutor> GitWorker<E> {
    pub fn with_executor(repo_path: impl Into<PathBuf>, executor: E) -> Self {
        Self { repo_path: repo_path.into(), remote: "origin".to_string(), env: Vec::new(), executor }
    }

    /// Use `remote` instead of `origin`.
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Authenticate ssh transports with `command` for this worker's invocations.
    pub fn with_ssh_command(mut self, command: Option<&str>) -> Self {
        self.env.retain(|(key, _)| key != GIT_SSH_COMMAND_ENV);
        if let Some(command) = command {
            self.env.push((GIT_SSH_COMMAND_ENV.to_string(), command.to_string()));
        }
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// `<remote>/<branch>`, the revision edits reset to.
    pub fn remote_branch(&self, branch: &str) -> String {
        format!("{}/{branch}", self.remote)
    }

    /// Clone `repository` into the working copy path.
    pub fn clone_repository(
        &self,
        repository: &str,
        branch: &str,
    ) -> Result<GitCommandOutput, GitWorkerError> {
        let parent = self.repo_path.parent().unwrap_or_else(|| Path::new("."));
        let args = vec![
            "clone".to_string(),
            "--origin".to_string(),
            self.remote.clone(),
            "--branch".to_string(),
            branch.to_string(),
            repository.to_string(),
            self.repo_path.display().to_string(),
        ];
        self.run_in(parent, args)
    }

    pub fn set_remote_url(&self, url: &str) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec![
            "remote".to_string(),
            "set-url".to_string(),
            self.remote.clone(),
            url.to_string(),
        ])
    }

    pub fn fetch(&self) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec!["fetch".to_string(), self.remote.clone()])
    }

    /// Remove untracked and ignored files, then hard-reset to `revision`.
    ///
    /// This is the only way local mutations get discarded.
    pub fn clean_and_reset(&self, revision: &str) -> Result<(), GitWorkerError> {
        self.run(vec!["clean".to_string(), "-fdx".to_string()])?;
        self.run(vec!["reset".to_string(), "--hard".to_string(), revision.to_string()])?;
        Ok(())
    }

    /// Stage exactly `paths`, including removals.
    pub fn add<P: AsRef<Path>>(&self, paths: &[P]) -> Result<GitCommandOutput, GitWorkerError> {
        if paths.is_empty() {
            return Err(GitWorkerError::EmptyAddPaths);
        }

        let mut args = vec!["add".to_string(), "--all".to_string(), "--".to_string()];
        args.extend(paths.iter().map(|path| self.pathspec(path.as_ref())));
        self.run(args)
    }

    /// Commit the index with an explicit author identity.
    pub fn commit_as(
        &self,
        name: &str,
        email: &str,
        message: &str,
    ) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec![
            "-c".to_string(),
            format!("user.name={name}"),
            "-c".to_string(),
            format!("user.email={email}"),
            "commit".to_string(),
            "-m".to_string(),
            message.to_string(),
        ])
    }

    pub fn push(&self, branch: &str) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec!["push".to_string(), self.remote.clone(), format!("HEAD:{branch}")])
    }

    /// Stage `paths`, commit them as `name <email>`, and push to `branch`.
    ///
    /// Nothing is retried; the caller is responsible for `clean_and_reset`
    /// whichever step failed.
    pub fn commit_and_push<P: AsRef<Path>>(
        &self,
        paths: &[P],
        name: &str,
        email: &str,
        message: &str,
        branch: &str,
    ) -> Result<(), GitWorkerError> {
        self.add(paths)?;
        self.commit_as(name, email, message)?;
        self.push(branch)?;
        Ok(())
    }

    /// Current `HEAD` revision.
    pub fn head_commit(&self) -> Result<String, GitWorkerError> {
        let output = self.run(vec!["rev-parse".to_string(), "HEAD".to_string()])?;
        Ok(output.stdout.trim().to_string())
    }

    /// Repo-relative form of `path` when it lives under the working copy.
    fn pathspec(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.repo_path).unwrap_or(path);
        if relative.as_os_str().is_empty() {
            ".".to_string()
        } else {
            relative.display().to_string()
        }
    }

    fn run(&self, args: Vec<String>) -> Result<GitCommandOutput, GitWorkerError> {
        self.run_in(&self.repo_path, args)
    }

    fn run_in(&self, cwd: &Path, args: Vec<String>) -> Result<GitCommandOutput, GitWorkerError> {
        let command = format!("git {}", args.join(" "));
        debug!(cwd = %cwd.display(), %command, "running git");
        let result = self.executor.execute("git", &args, cwd, &self.env).map_err(|error| {
            GitWorkerError::SpawnFailed { command: command.clone(), message: error.to_string() }
        })?;

        if result.success {
            return Ok(GitCommandOutput { stdout: result.stdout, stderr: result.stderr });
        }

        let stderr = if result.stderr.trim().is_empty() { result.stdout } else { result.stderr };

        Err(GitWorkerError::CommandFailed { command, code: result.code, stderr })
    }
}

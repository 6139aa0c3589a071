// Edit orchestrator: lock, pull, write, commit, push, reset and sync.
//
// The transactional part of every edit runs on a blocking task that owns the
// course lock. Dropping the `run` future therefore never interrupts the
// clean+reset+sync bracket; cancellation is cooperative and only checked at
// step boundaries before anything is written or pushed.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EditorConfig;
use crate::course::CourseWorkingCopy;
use crate::edits::{EditContext, MutationOperation, WriteOutcome};
use crate::error::{EditError, EditFailure};
use crate::git::{CommandExecutor, GitWorker, ProcessCommandExecutor};
use crate::job::{EditJob, JobData, JobStatus};
use crate::lock::{lock_name_for_course_path, NamedLocks, ScopedLock};
use crate::store::JobStore;
use crate::sync::{RepositorySynchronizer, SyncError, SyncResult};

/// What the caller gets back from a successful edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditJobResult {
    pub job_sequence_id: Uuid,
    pub description: String,
    pub data: JobData,
    /// Working copy revision before the edit, when it is a git checkout.
    pub before_commit: Option<String>,
    pub after_commit: Option<String>,
    pub sync: Option<SyncResult>,
    /// Whether anything was written (false when every operation skipped).
    pub changed: bool,
}

/// Runs edits against course working copies, one at a time per course.
pub struct EditOrchestrator<E = ProcessCommandExecutor> {
    config: EditorConfig,
    locks: NamedLocks,
    executor: E,
    synchronizer: Arc<dyn RepositorySynchronizer>,
    jobs: Option<Arc<dyn JobStore>>,
}

impl EditOrchestrator<ProcessCommandExecutor> {
    pub fn new(config: EditorConfig, synchronizer: Arc<dyn RepositorySynchronizer>) -> Self {
        Self::with_executor(config, synchronizer, ProcessCommandExecutor)
    }
}

impl<E: CommandExecutor + Clone + 'static> EditOrchestrator<E> {
    pub fn with_executor(
        config: EditorConfig,
        synchronizer: Arc<dyn RepositorySynchronizer>,
        executor: E,
    ) -> Self {
        Self { config, locks: NamedLocks::new(), executor, synchronizer, jobs: None }
    }

    /// Share a lock registry with other orchestrators in this process.
    pub fn with_locks(mut self, locks: NamedLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Persist job snapshots when they are prepared and when they finish.
    pub fn with_job_store(mut self, jobs: Arc<dyn JobStore>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn locks(&self) -> &NamedLocks {
        &self.locks
    }

    /// Authorize `op` and open a job for it. No lock is taken.
    pub fn prepare_job(
        &self,
        ctx: &EditContext,
        op: &dyn MutationOperation,
    ) -> Result<EditJob, EditError> {
        if self.config.is_example_course(&ctx.course.root) {
            return Err(EditError::Forbidden("cannot edit the example course".into()));
        }
        op.assert_can_edit(ctx)?;
        if self.uses_git(&ctx.course) {
            remote_of(&ctx.course)?;
        }

        let job = self.open_job(ctx, &op.description(&ctx.course));
        info!(course = %ctx.course.id, job = %job.id(), description = %job.description(), "prepared edit job");
        Ok(job)
    }

    /// Run a prepared job to completion.
    pub async fn run(
        &self,
        job: EditJob,
        ctx: EditContext,
        op: Box<dyn MutationOperation>,
    ) -> Result<EditJobResult, EditFailure> {
        let transaction = self.transaction(job.clone(), ctx.course.clone());
        let guard = match self.lock(&job, &ctx.course).await {
            Ok(guard) => guard,
            Err(error) => return transaction.finish(Err(error)),
        };
        join_blocking(&job, tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let outcome = transaction.edit(&ctx, op);
            transaction.finish(outcome)
        }))
        .await
    }

    /// Bring the working copy up to date with its remote and resync it.
    ///
    /// Clones the repository when the working copy does not exist yet.
    pub async fn pull_and_update(&self, ctx: EditContext) -> Result<EditJobResult, EditFailure> {
        let transaction = self.transaction(self.open_job(&ctx, "Pull from remote git repository"), ctx.course.clone());
        self.run_locked(&ctx, transaction, Transaction::pull).await
    }

    /// Resync the store from the working copy as it is on disk, without git.
    pub async fn sync_from_disk(&self, ctx: EditContext) -> Result<EditJobResult, EditFailure> {
        let mut transaction = self.transaction(self.open_job(&ctx, "Sync from disk"), ctx.course.clone());
        transaction.git = None;
        self.run_locked(&ctx, transaction, Transaction::pull).await
    }

    fn open_job(&self, ctx: &EditContext, description: &str) -> EditJob {
        let job = EditJob::new(
            ctx.course.id.clone(),
            description,
            ctx.identity.user.uid.clone(),
            ctx.identity.authn_user.uid.clone(),
        );
        record(self.jobs.as_deref(), &job);
        job
    }

    async fn run_locked(
        &self,
        ctx: &EditContext,
        transaction: Transaction<E>,
        body: fn(&Transaction<E>) -> Result<Progress, EditError>,
    ) -> Result<EditJobResult, EditFailure> {
        let job = transaction.job.clone();
        if !ctx.identity.authz.has_course_permission_edit {
            return transaction.finish(Err(EditError::Forbidden("must be course editor".into())));
        }
        let guard = match self.lock(&job, &ctx.course).await {
            Ok(guard) => guard,
            Err(error) => return transaction.finish(Err(error)),
        };
        join_blocking(&job, tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let outcome = body(&transaction);
            transaction.finish(outcome)
        }))
        .await
    }

    fn uses_git(&self, course: &CourseWorkingCopy) -> bool {
        self.config.git.use_git && course.uses_git
    }

    async fn lock(&self, job: &EditJob, course: &CourseWorkingCopy) -> Result<ScopedLock, EditError> {
        let name = lock_name_for_course_path(&course.root);
        tokio::select! {
            acquired = self.locks.acquire(&name, self.config.lock.timeout()) => Ok(acquired?),
            () = job.cancelled() => Err(EditError::Cancelled),
        }
    }

    fn transaction(&self, job: EditJob, course: CourseWorkingCopy) -> Transaction<E> {
        let git = self.uses_git(&course).then(|| {
            GitWorker::with_executor(&course.root, self.executor.clone())
                .with_remote(self.config.git.remote.clone())
                .with_ssh_command(self.config.git.ssh_command.as_deref())
        });
        Transaction {
            job,
            course,
            git,
            synchronizer: Arc::clone(&self.synchronizer),
            jobs: self.jobs.clone(),
        }
    }
}

fn remote_of(course: &CourseWorkingCopy) -> Result<(&str, &str), EditError> {
    match (course.repository.as_deref(), course.branch.as_deref()) {
        (Some(repository), Some(branch)) if !repository.is_empty() && !branch.is_empty() => {
            Ok((repository, branch))
        }
        _ => Err(EditError::RepositoryNotConfigured(course.id.clone())),
    }
}

fn record(jobs: Option<&dyn JobStore>, job: &EditJob) {
    if let Some(jobs) = jobs {
        if let Err(error) = jobs.record_job(&job.snapshot()) {
            warn!(job = %job.id(), error = %format!("{error:#}"), "failed to record job");
        }
    }
}

async fn join_blocking(
    job: &EditJob,
    handle: tokio::task::JoinHandle<Result<EditJobResult, EditFailure>>,
) -> Result<EditJobResult, EditFailure> {
    match handle.await {
        Ok(result) => result,
        Err(error) => {
            job.error(format!("Edit task failed: {error}"));
            job.finish(JobStatus::Error);
            Err(EditFailure { job_sequence_id: job.id(), error: EditError::write("edit task failed", error) })
        }
    }
}

// ── Transaction ─────────────────────────────────────────────────────

/// Everything one locked edit needs, detached from the orchestrator.
struct Transaction<E> {
    job: EditJob,
    course: CourseWorkingCopy,
    /// Present in git mode.
    git: Option<GitWorker<E>>,
    synchronizer: Arc<dyn RepositorySynchronizer>,
    jobs: Option<Arc<dyn JobStore>>,
}

/// Progress of a transaction, reported even when it fails part way.
#[derive(Default)]
struct Progress {
    before_commit: Option<String>,
    after_commit: Option<String>,
    sync: Option<SyncResult>,
    changed: bool,
}

impl<E: CommandExecutor> Transaction<E> {
    fn edit(&self, ctx: &EditContext, op: Box<dyn MutationOperation>) -> Result<Progress, EditError> {
        match &self.git {
            None => self.edit_without_git(ctx, op),
            Some(git) => self.edit_with_git(git, ctx, op),
        }
    }

    fn edit_without_git(
        &self,
        ctx: &EditContext,
        op: Box<dyn MutationOperation>,
    ) -> Result<Progress, EditError> {
        let job = &self.job;
        let mut progress = Progress::default();
        if job.is_cancelled() {
            return Err(EditError::Cancelled);
        }

        job.info("Write changes to disk");
        job.update_data(|data| data.save_attempted = true);
        progress.changed = matches!(op.write(ctx, job)?, WriteOutcome::Changed(_));
        job.update_data(|data| data.save_succeeded = true);

        progress.sync = Some(self.sync()?);
        Ok(progress)
    }

    fn edit_with_git(
        &self,
        git: &GitWorker<E>,
        ctx: &EditContext,
        op: Box<dyn MutationOperation>,
    ) -> Result<Progress, EditError> {
        let job = &self.job;
        let (repository, branch) = remote_of(&self.course)?;
        let revision = git.remote_branch(branch);
        let mut progress = Progress { before_commit: git.head_commit().ok(), ..Progress::default() };

        job.info("Update to latest remote origin address");
        git.set_remote_url(repository)?;
        job.info("Fetch from remote git repository");
        git.fetch()?;
        self.clean_and_reset(git, &revision)?;

        let attempt = self.write_and_push(git, ctx, op, branch);
        if let Ok(changed) = &attempt {
            progress.changed = *changed;
            job.update_data(|data| data.save_succeeded = true);
        }

        let cleanup = self.clean_and_reset(git, &revision);
        let sync = match &cleanup {
            Ok(()) => Some(self.sync()),
            Err(_) => {
                job.warn("Skipping sync because the working copy could not be reset");
                None
            }
        };
        progress.after_commit = git.head_commit().ok();

        match (attempt, cleanup, sync) {
            (Err(error), cleanup, sync) => {
                if let Err(cleanup) = cleanup {
                    job.error(format!("Cleanup after failed edit also failed: {cleanup}"));
                }
                if let Some(Err(sync)) = sync {
                    job.error(format!("Sync after failed edit also failed: {sync}"));
                }
                Err(error)
            }
            (Ok(_), Err(cleanup), _) => Err(cleanup.into()),
            (Ok(_), Ok(()), Some(Err(sync))) => Err(sync.into()),
            (Ok(_), Ok(()), Some(Ok(result))) => {
                progress.sync = Some(result);
                Ok(progress)
            }
            (Ok(_), Ok(()), None) => Ok(progress),
        }
    }

    /// The `try` half of a git edit. Returns whether a commit was pushed.
    fn write_and_push(
        &self,
        git: &GitWorker<E>,
        ctx: &EditContext,
        op: Box<dyn MutationOperation>,
        branch: &str,
    ) -> Result<bool, EditError> {
        let job = &self.job;
        if job.is_cancelled() {
            return Err(EditError::Cancelled);
        }

        job.info("Write changes to disk");
        job.update_data(|data| data.save_attempted = true);
        let descriptor = match op.write(ctx, job)? {
            WriteOutcome::Changed(descriptor) => descriptor,
            WriteOutcome::Skipped => {
                job.info("No changes to commit");
                return Ok(false);
            }
        };
        if job.is_cancelled() {
            return Err(EditError::Cancelled);
        }

        let user = &ctx.identity.user;
        job.info("Commit changes and push to remote git repository");
        git.commit_and_push(
            &descriptor.paths_to_add,
            user.commit_name(),
            user.commit_email(),
            &descriptor.commit_message,
            branch,
        )?;
        Ok(true)
    }

    fn pull(&self) -> Result<Progress, EditError> {
        let job = &self.job;
        let mut progress = Progress::default();

        if let Some(git) = &self.git {
            let (repository, branch) = remote_of(&self.course)?;
            if self.course.root.exists() {
                progress.before_commit = git.head_commit().ok();
                job.info("Update to latest remote origin address");
                git.set_remote_url(repository)?;
                job.info("Fetch from remote git repository");
                git.fetch()?;
                self.clean_and_reset(git, &git.remote_branch(branch))?;
            } else {
                job.info("Clone from remote git repository");
                git.clone_repository(repository, branch)?;
            }
            progress.after_commit = git.head_commit().ok();
        }

        progress.sync = Some(self.sync()?);
        Ok(progress)
    }

    fn clean_and_reset(&self, git: &GitWorker<E>, revision: &str) -> Result<(), EditError> {
        self.job.info("Clean local files not in remote git repository");
        self.job.info("Reset state to remote git repository");
        git.clean_and_reset(revision)?;
        Ok(())
    }

    fn sync(&self) -> Result<SyncResult, SyncError> {
        self.job.info("Sync changes from disk");
        self.job.update_data(|data| data.sync_attempted = true);
        let result = self.synchronizer.sync_to_store(&self.course, &self.job)?;
        self.job.update_data(|data| data.sync_succeeded = true);
        Ok(result)
    }

    /// Move the job to its terminal state and persist it.
    fn finish(&self, outcome: Result<Progress, EditError>) -> Result<EditJobResult, EditFailure> {
        let job = &self.job;
        let result = match outcome {
            Ok(progress) => {
                if progress.before_commit.is_some() || progress.after_commit.is_some() {
                    job.info(format!(
                        "Commit hash before: {}, after: {}",
                        progress.before_commit.as_deref().unwrap_or("none"),
                        progress.after_commit.as_deref().unwrap_or("none"),
                    ));
                }
                job.finish(JobStatus::Success);
                Ok(EditJobResult {
                    job_sequence_id: job.id(),
                    description: job.description(),
                    data: job.data(),
                    before_commit: progress.before_commit,
                    after_commit: progress.after_commit,
                    sync: progress.sync,
                    changed: progress.changed,
                })
            }
            Err(error) => {
                job.error(error.to_string());
                job.finish(JobStatus::Error);
                Err(EditFailure { job_sequence_id: job.id(), error })
            }
        };
        record(self.jobs.as_deref(), job);
        info!(
            course = %self.course.id,
            job = %job.id(),
            succeeded = result.is_ok(),
            "edit job finished"
        );
        result
    }
}

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use coursesmith_common::encoding::ContentEncoding;
use coursesmith_common::hash::fingerprint_file;
use coursesmith_common::path::FileContainer;
use coursesmith_engine::config::EditorConfig;
use coursesmith_engine::course::{CourseWorkingCopy, EditIdentity, UserRef};
use coursesmith_engine::edits::{EditContext, FileModify, MutationOperation, QuestionRename};
use coursesmith_engine::error::{EditError, EditFailure};
use coursesmith_engine::job::JobStatus;
use coursesmith_engine::orchestrator::{EditJobResult, EditOrchestrator};
use coursesmith_engine::store::{CourseIndex, CourseStore, JobStore};
use coursesmith_engine::sync::{DiskSynchronizer, SyncError};
use serde_json::json;
use tempfile::TempDir;

struct Fixture {
    temp: TempDir,
    remote: String,
    store: Arc<CourseStore>,
    orchestrator: EditOrchestrator,
    ctx: EditContext,
}

impl Fixture {
    fn course_root(&self) -> &Path {
        &self.ctx.course.root
    }
}

fn fixture() -> Fixture {
    let temp = TempDir::new().expect("tempdir should be created");
    let remote_path = temp.path().join("remote.git");
    let seed_path = temp.path().join("seed");
    let remote = remote_path.to_str().expect("utf8 remote path").to_string();

    run_git(temp.path(), &["init", "--bare", "-b", "main", &remote]);
    run_git(temp.path(), &["init", "-b", "main", seed_path.to_str().expect("utf8 seed path")]);
    run_git(&seed_path, &["config", "user.name", "Seed"]);
    run_git(&seed_path, &["config", "user.email", "seed@example.test"]);
    run_git(&seed_path, &["remote", "add", "origin", &remote]);

    write_json(&seed_path, "infoCourse.json", json!({"name": "CS 101", "title": "Intro"}));
    write_json(
        &seed_path,
        "questions/topic/q1/info.json",
        json!({"uuid": "0f4c1b8e-5e84-4d7f-9c34-2a6bd0d4c901", "title": "First"}),
    );
    std::fs::write(seed_path.join("questions/topic/q1/question.html"), "<p>old</p>\n")
        .expect("question html should be written");
    write_json(
        &seed_path,
        "courseInstances/Fa19/infoCourseInstance.json",
        json!({"uuid": "6a1f0c1e-5d2b-4a8e-9b3c-1d2e3f4a5b6c", "longName": "Fall 2019"}),
    );
    write_json(
        &seed_path,
        "courseInstances/Fa19/assessments/hw1/infoAssessment.json",
        json!({
            "uuid": "c2b1a0f9-8e7d-4c6b-9a5f-4e3d2c1b0a99",
            "type": "Homework",
            "title": "Homework 1",
            "set": "Homework",
            "number": "1",
            "zones": [{"questions": [{"id": "topic/q1"}]}]
        }),
    );
    run_git(&seed_path, &["add", "."]);
    run_git(&seed_path, &["commit", "-m", "initial course"]);
    run_git(&seed_path, &["push", "-u", "origin", "main"]);

    let store = Arc::new(CourseStore::open_in_memory().expect("store should open"));
    let mut config = EditorConfig::default();
    config.git.use_git = true;
    let orchestrator = EditOrchestrator::new(config, Arc::new(DiskSynchronizer::new(store.clone())))
        .with_job_store(store.clone());

    let course = CourseWorkingCopy::git_backed("cs101", temp.path().join("course"), remote.clone(), "main");
    let identity = EditIdentity::editor(UserRef::new("ada").with_name("Ada").with_email("ada@example.test"));
    let index: Arc<dyn CourseIndex> = store.clone();
    let ctx = EditContext::new(course, identity, index);

    Fixture { temp, remote, store, orchestrator, ctx }
}

async fn run(
    fixture: &Fixture,
    op: Box<dyn MutationOperation>,
) -> Result<EditJobResult, EditFailure> {
    let job =
        fixture.orchestrator.prepare_job(&fixture.ctx, op.as_ref()).expect("job should be prepared");
    fixture.orchestrator.run(job, fixture.ctx.clone(), op).await
}

#[tokio::test]
async fn pull_clones_then_rename_is_pushed_and_synced() {
    let fixture = fixture();

    let pulled = fixture.orchestrator.pull_and_update(fixture.ctx.clone()).await.expect("pull should succeed");
    assert!(fixture.course_root().join("questions/topic/q1/info.json").exists());
    assert!(pulled.after_commit.is_some());
    assert_eq!(fixture.store.live_question_ids("cs101").expect("question ids"), vec!["topic/q1"]);

    let result = run(&fixture, Box::new(QuestionRename::new("topic/q1", "q1")))
        .await
        .expect("rename should succeed");
    assert!(result.changed);
    assert!(result.data.save_succeeded && result.data.sync_succeeded);
    assert_ne!(result.before_commit, result.after_commit);

    let remote_log = run_git_capture(
        fixture.temp.path(),
        &["--git-dir", &fixture.remote, "log", "-1", "--pretty=%an <%ae>%n%s", "main"],
    );
    assert_eq!(remote_log.trim(), "Ada <ada@example.test>\nrename question topic/q1 to q1");

    let hw1 = std::fs::read_to_string(
        fixture.course_root().join("courseInstances/Fa19/assessments/hw1/infoAssessment.json"),
    )
    .expect("assessment should exist");
    assert!(hw1.contains("\"id\": \"q1\""), "assessment should reference the new qid: {hw1}");
    assert!(!fixture.course_root().join("questions/topic").exists());

    assert_eq!(fixture.store.live_question_ids("cs101").expect("question ids"), vec!["q1"]);
    assert_eq!(fixture.store.deleted_question_ids("cs101").expect("deleted ids"), vec!["topic/q1"]);
    assert_eq!(
        fixture.store.commit_hash("cs101").expect("commit hash"),
        result.after_commit
    );

    let status = run_git_capture(fixture.course_root(), &["status", "--porcelain"]);
    assert!(status.trim().is_empty(), "working copy should be clean, got: {status}");
}

#[tokio::test]
async fn stale_modify_conflicts_and_leaves_working_copy_clean() {
    let fixture = fixture();
    fixture.orchestrator.pull_and_update(fixture.ctx.clone()).await.expect("pull should succeed");
    let html = fixture.course_root().join("questions/topic/q1/question.html");
    let orig_hash = fingerprint_file(&html).expect("fingerprint should be computed");

    // Another instructor pushes a change first.
    let other = fixture.temp.path().join("other");
    run_git(fixture.temp.path(), &["clone", &fixture.remote, other.to_str().expect("utf8 path")]);
    std::fs::write(other.join("questions/topic/q1/question.html"), "<p>theirs</p>\n")
        .expect("other edit should be written");
    run_git(&other, &["-c", "user.name=Bo", "-c", "user.email=bo@example.test", "commit", "-am", "their edit"]);
    run_git(&other, &["push", "origin", "HEAD:main"]);

    let container = FileContainer::new(fixture.course_root().join("questions/topic/q1"));
    let op = FileModify::new(container, "question.html", "<p>mine</p>\n", ContentEncoding::Raw, orig_hash);
    let failure = run(&fixture, Box::new(op)).await.expect_err("stale edit should conflict");
    assert!(matches!(failure.error, EditError::Conflict(_)));
    assert_eq!(
        std::fs::read_to_string(&html).expect("html should exist"),
        "<p>theirs</p>\n",
        "working copy should hold the remote state"
    );

    let job = fixture
        .store
        .load_job(failure.job_sequence_id)
        .expect("job should load")
        .expect("job should be recorded");
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.data.save_attempted && !job.data.save_succeeded);
    assert!(job.data.sync_succeeded);
    assert!(job.log.iter().any(|line| line.message == "Reset state to remote git repository"));
}

#[tokio::test]
async fn pushed_edit_fails_when_remote_content_does_not_sync() {
    let fixture = fixture();
    fixture.orchestrator.pull_and_update(fixture.ctx.clone()).await.expect("pull should succeed");

    // Someone pushes a question whose info file is not JSON.
    let other = fixture.temp.path().join("other");
    run_git(fixture.temp.path(), &["clone", &fixture.remote, other.to_str().expect("utf8 path")]);
    std::fs::create_dir_all(other.join("questions/broken")).expect("question dir should be created");
    std::fs::write(other.join("questions/broken/info.json"), "{ not json").expect("broken info");
    run_git(&other, &["add", "."]);
    run_git(&other, &["-c", "user.name=Bo", "-c", "user.email=bo@example.test", "commit", "-m", "broken"]);
    run_git(&other, &["push", "origin", "HEAD:main"]);

    let failure = run(&fixture, Box::new(QuestionRename::new("topic/q1", "q1")))
        .await
        .expect_err("sync errors should fail the edit");
    assert!(
        matches!(failure.error, EditError::Sync(SyncError::JsonErrors { .. })),
        "unexpected error: {:?}",
        failure.error
    );

    let job = fixture
        .store
        .load_job(failure.job_sequence_id)
        .expect("job should load")
        .expect("job should be recorded");
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.data.save_succeeded);
    assert!(job.data.sync_attempted && !job.data.sync_succeeded);

    let subject = run_git_capture(
        fixture.temp.path(),
        &["--git-dir", &fixture.remote, "log", "-1", "--pretty=%s", "main"],
    );
    assert_eq!(subject.trim(), "rename question topic/q1 to q1");
    assert!(fixture.store.live_question_ids("cs101").expect("question ids").contains(&"q1".to_string()));
}

fn write_json(root: &Path, relative: &str, value: serde_json::Value) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("dirs should be created");
    std::fs::write(path, serde_json::to_string_pretty(&value).expect("json")).expect("json should be written");
}

fn run_git(cwd: &Path, args: &[&str]) {
    let output =
        Command::new("git").args(args).current_dir(cwd).output().expect("git command should run");
    assert!(
        output.status.success(),
        "git {:?} failed:\nstdout: {}\nstderr: {}",
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn run_git_capture(cwd: &Path, args: &[&str]) -> String {
    let output =
        Command::new("git").args(args).current_dir(cwd).output().expect("git command should run");
    assert!(
        output.status.success(),
        "git {:?} failed:\nstdout: {}\nstderr: {}",
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("utf8 output")
}

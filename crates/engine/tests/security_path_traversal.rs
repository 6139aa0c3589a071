use std::path::Path;
use std::sync::Arc;

use coursesmith_common::encoding::ContentEncoding;
use coursesmith_common::hash::fingerprint;
use coursesmith_common::path::{normalize_path, FileContainer, PathError};
use coursesmith_engine::config::EditorConfig;
use coursesmith_engine::course::{CourseWorkingCopy, EditIdentity, UserRef};
use coursesmith_engine::edits::{
    AssessmentRename, EditContext, FileDelete, FileModify, FileRename, FileUpload, MutationOperation,
    QuestionRename,
};
use coursesmith_engine::error::EditError;
use coursesmith_engine::orchestrator::EditOrchestrator;
use coursesmith_engine::store::{CourseIndex, CourseStore};
use coursesmith_engine::sync::DiskSynchronizer;
use tempfile::TempDir;

fn setup(temp: &TempDir) -> (EditOrchestrator, EditContext) {
    let root = temp.path().join("cs101");
    std::fs::create_dir_all(root.join("questions/q1")).expect("question dir should be created");
    std::fs::write(root.join("infoCourse.json"), r#"{"name": "CS 101"}"#).expect("course info");
    std::fs::write(root.join("secret.txt"), "outside the question").expect("secret");
    std::fs::write(temp.path().join("outside.txt"), "outside the course").expect("outside");

    let store = Arc::new(CourseStore::open_in_memory().expect("store should open"));
    let mut config = EditorConfig::default();
    config.git.use_git = false;
    let orchestrator = EditOrchestrator::new(config, Arc::new(DiskSynchronizer::new(store.clone())));
    let index: Arc<dyn CourseIndex> = store;
    let ctx = EditContext::new(
        CourseWorkingCopy::local("cs101", root),
        EditIdentity::editor(UserRef::new("ada")),
        index,
    );
    (orchestrator, ctx)
}

fn assert_rejected(orchestrator: &EditOrchestrator, ctx: &EditContext, op: &dyn MutationOperation) {
    match orchestrator.prepare_job(ctx, op) {
        Err(EditError::InvalidPath(_)) => {}
        other => panic!("expected InvalidPath before any job, got {other:?}"),
    }
}

#[test]
fn rejects_parent_directory_traversal_sequences() {
    assert_eq!(
        normalize_path("../../../etc/passwd"),
        Err(PathError::Traversal("..".to_string()))
    );
    assert_eq!(
        normalize_path("topic/../../infoCourse.json"),
        Err(PathError::Traversal("..".to_string()))
    );
}

#[test]
fn rejects_null_bytes_and_overlong_paths() {
    assert_eq!(normalize_path("topic/q\0"), Err(PathError::NullByte));
    assert_eq!(normalize_path(&"a".repeat(513)), Err(PathError::TooLong));
}

#[test]
fn normalizes_unicode_equivalents_to_same_id() {
    let decomposed = normalize_path("topic/caf\u{0065}\u{0301}").expect("id should normalize");
    let composed = normalize_path("topic/café").expect("id should normalize");
    assert_eq!(decomposed, composed);
}

#[test]
fn content_ids_cannot_escape_their_directory() {
    let temp = TempDir::new().expect("tempdir should be created");
    let (orchestrator, ctx) = setup(&temp);

    assert_rejected(&orchestrator, &ctx, &QuestionRename::new("q1", "../escaped"));
    assert_rejected(&orchestrator, &ctx, &QuestionRename::new("../../outside", "q2"));
    assert_rejected(&orchestrator, &ctx, &AssessmentRename::new("../..", "hw1", "hw2"));
    assert!(ctx.course.root.join("questions/q1").is_dir());
}

#[test]
fn file_edits_stay_inside_their_container() {
    let temp = TempDir::new().expect("tempdir should be created");
    let (orchestrator, ctx) = setup(&temp);
    let container = FileContainer::new(ctx.course.root.join("questions/q1"));

    let escapes: Vec<Box<dyn MutationOperation>> = vec![
        Box::new(FileUpload::new(container.clone(), "../../secret.txt", b"pwned".to_vec())),
        Box::new(FileUpload::new(container.clone(), "/etc/passwd", b"pwned".to_vec())),
        Box::new(FileDelete::new(container.clone(), "../../../outside.txt")),
        Box::new(FileRename::new(container.clone(), "question.html", "../../question.html")),
        Box::new(FileModify::new(
            container,
            "../../secret.txt",
            "pwned",
            ContentEncoding::Raw,
            fingerprint(b"outside the question"),
        )),
    ];
    for op in &escapes {
        assert_rejected(&orchestrator, &ctx, op.as_ref());
    }

    let read = |path: &Path| std::fs::read_to_string(path).expect("file should still exist");
    assert_eq!(read(&ctx.course.root.join("secret.txt")), "outside the question");
    assert_eq!(read(&temp.path().join("outside.txt")), "outside the course");
}

#[test]
fn excluded_directories_are_off_limits() {
    let temp = TempDir::new().expect("tempdir should be created");
    let (orchestrator, ctx) = setup(&temp);
    let container = FileContainer::new(&ctx.course.root)
        .excluding(ctx.course.questions_dir())
        .excluding(ctx.course.course_instances_dir());

    assert_rejected(
        &orchestrator,
        &ctx,
        &FileUpload::new(container.clone(), "questions/q1/server.py", b"x".to_vec()),
    );
    assert_rejected(&orchestrator, &ctx, &FileDelete::new(container.clone(), "questions"));
    orchestrator
        .prepare_job(&ctx, &FileUpload::new(container, "clientFilesCourse/lib.js", b"x".to_vec()))
        .expect("course-level files outside excluded directories are editable");
}

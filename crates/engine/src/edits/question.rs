// Question editors: add, copy, rename, delete and transfer between courses.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use coursesmith_common::names::{names_for_add, names_for_copy};
use coursesmith_common::path::FileContainer;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::fs_util::{
    copy_dir_all, existing_short_names, move_dir, prune_empty_parents, read_json_object,
    remove_path, resolve_id, write_json,
};
use super::{EditContext, MutationOperation, WriteOutcome};
use crate::course::{CourseWorkingCopy, ASSESSMENT_INFO_FILE, QUESTION_INFO_FILE};
use crate::error::EditError;
use crate::job::EditJob;

/// Fields that would publish a copy without the author meaning to.
const SHARING_FIELDS: &[&str] = &["sharingSets", "sharePublicly", "sharedPublicly", "shareSourcePublicly"];

/// Template files replaced when the caller supplies the question's files.
const TEMPLATE_CONTENT_FILES: &[&str] = &["question.html", "server.py"];

fn strip_sharing(info: &mut Map<String, Value>) {
    for field in SHARING_FIELDS {
        info.remove(*field);
    }
}

fn existing_qids(ctx: &EditContext) -> Result<Vec<String>, EditError> {
    existing_short_names(&ctx.course.questions_dir(), QUESTION_INFO_FILE)
        .map_err(|e| EditError::write("failed to list existing questions", e))
}

fn existing_titles(ctx: &EditContext) -> Result<Vec<String>, EditError> {
    ctx.index.question_titles(&ctx.course.id).map_err(EditContext::index_error)
}

/// Rewrite `info.json` in `question_dir` with a new title and uuid.
fn retitle(
    question_dir: &Path,
    title: &str,
    uuid: Uuid,
    edit: impl FnOnce(&mut Map<String, Value>),
) -> Result<(), EditError> {
    let info_path = question_dir.join(QUESTION_INFO_FILE);
    let mut info =
        read_json_object(&info_path).map_err(|e| EditError::write(info_path.display(), e))?;
    info.insert("title".into(), Value::String(title.to_string()));
    info.insert("uuid".into(), Value::String(uuid.to_string()));
    edit(&mut info);
    write_json(&info_path, &Value::Object(info)).map_err(|e| EditError::write(info_path.display(), e))
}

// ── Add ─────────────────────────────────────────────────────────────

/// Create `New_<n>` from the template question, optionally with caller files.
#[derive(Debug, Clone)]
pub struct QuestionAdd {
    uuid: Uuid,
    files: Option<BTreeMap<String, String>>,
}

impl Default for QuestionAdd {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestionAdd {
    pub fn new() -> Self {
        Self { uuid: Uuid::new_v4(), files: None }
    }

    /// Replace the template's content with `files` (question-relative name to text).
    pub fn with_files(mut self, files: BTreeMap<String, String>) -> Self {
        self.files = Some(files);
        self
    }

    /// UUID written into the new question, for finding it after sync.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl MutationOperation for QuestionAdd {
    fn description(&self, _course: &CourseWorkingCopy) -> String {
        "Add question".to_string()
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let template = ctx
            .template_question
            .clone()
            .ok_or_else(|| EditError::Write("no template question is configured".into()))?;

        let names = names_for_add(&existing_qids(ctx)?, &existing_titles(ctx)?);
        let question_dir = ctx.course.questions_dir().join(&names.short_name);

        let container = FileContainer::new(&question_dir);
        let files: Vec<(PathBuf, &String)> = match &self.files {
            Some(files) => files
                .iter()
                .map(|(name, contents)| {
                    let path = question_dir.join(name);
                    container.check(&path)?;
                    Ok((container.resolve(&path), contents))
                })
                .collect::<Result<_, EditError>>()?,
            None => Vec::new(),
        };

        job.info(format!("Copy template question to {}", ctx.course.relative(&question_dir).display()));
        copy_dir_all(&template, &question_dir)
            .map_err(|e| EditError::write("failed to copy template question", e))?;

        if let Some(supplied) = &self.files {
            debug!("replacing template files with supplied files");
            let mut removals: Vec<&str> = TEMPLATE_CONTENT_FILES.to_vec();
            if supplied.contains_key(QUESTION_INFO_FILE) {
                removals.push(QUESTION_INFO_FILE);
            }
            for name in removals {
                let path = question_dir.join(name);
                remove_path(&path).map_err(|e| EditError::write(path.display(), e))?;
            }
            for (path, contents) in &files {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(|e| EditError::write(parent.display(), e))?;
                }
                fs::write(path, contents).map_err(|e| EditError::write(path.display(), e))?;
            }
        }

        retitle(&question_dir, &names.long_name, self.uuid, |info| {
            info.remove("tags");
        })?;

        Ok(WriteOutcome::changed(
            "Add question",
            vec![question_dir],
            format!("add question {}", names.short_name),
        ))
    }
}

// ── Copy ────────────────────────────────────────────────────────────

/// Duplicate a question as `<qid>_copy<n>`.
#[derive(Debug, Clone)]
pub struct QuestionCopy {
    qid: String,
    title: Option<String>,
    uuid: Uuid,
}

impl QuestionCopy {
    pub fn new(qid: impl Into<String>, title: Option<String>) -> Self {
        Self { qid: qid.into(), title, uuid: Uuid::new_v4() }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl MutationOperation for QuestionCopy {
    fn description(&self, _course: &CourseWorkingCopy) -> String {
        format!("Copy question {}", self.qid)
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        ctx.assert_can_edit()?;
        resolve_id(&ctx.course.questions_dir(), &self.qid)?;
        Ok(())
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let questions_dir = ctx.course.questions_dir();
        let from = resolve_id(&questions_dir, &self.qid)?;

        let names = names_for_copy(
            &self.qid,
            &existing_qids(ctx)?,
            self.title.as_deref(),
            &existing_titles(ctx)?,
        );
        let to = questions_dir.join(&names.short_name);

        job.info(format!("Copy question {} to {}", self.qid, names.short_name));
        copy_dir_all(&from, &to).map_err(|e| EditError::write("failed to copy question", e))?;
        retitle(&to, &names.long_name, self.uuid, strip_sharing)?;

        Ok(WriteOutcome::changed(
            self.description(&ctx.course),
            vec![to],
            format!("copy question {} to {}", self.qid, names.short_name),
        ))
    }
}

// ── Rename ──────────────────────────────────────────────────────────

/// Move a question and repoint every assessment that uses it.
#[derive(Debug, Clone)]
pub struct QuestionRename {
    qid: String,
    new_qid: String,
}

impl QuestionRename {
    pub fn new(qid: impl Into<String>, new_qid: impl Into<String>) -> Self {
        Self { qid: qid.into(), new_qid: new_qid.into() }
    }
}

/// Replace `old` with `new` in an assessment's zones. Returns whether any
/// reference was found.
fn rewrite_question_ids(info: &mut Map<String, Value>, old: &str, new: &str) -> bool {
    let mut found = false;
    let zones = info.get_mut("zones").and_then(Value::as_array_mut);
    for zone in zones.into_iter().flatten() {
        let questions = zone.get_mut("questions").and_then(Value::as_array_mut);
        for question in questions.into_iter().flatten() {
            if let Some(alternatives) = question.get_mut("alternatives").and_then(Value::as_array_mut) {
                for alternative in alternatives {
                    if alternative.get("id").and_then(Value::as_str) == Some(old) {
                        alternative["id"] = Value::String(new.to_string());
                        found = true;
                    }
                }
            } else if question.get("id").and_then(Value::as_str) == Some(old) {
                question["id"] = Value::String(new.to_string());
                found = true;
            }
        }
    }
    found
}

impl MutationOperation for QuestionRename {
    fn description(&self, _course: &CourseWorkingCopy) -> String {
        format!("Rename question {}", self.qid)
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        ctx.assert_can_edit()?;
        let dir = ctx.course.questions_dir();
        resolve_id(&dir, &self.qid)?;
        resolve_id(&dir, &self.new_qid)?;
        Ok(())
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let questions_dir = ctx.course.questions_dir();
        let old_path = resolve_id(&questions_dir, &self.qid)?;
        let new_path = resolve_id(&questions_dir, &self.new_qid)?;
        if old_path == new_path {
            job.info(format!("Question {} already has that name", self.qid));
            return Ok(WriteOutcome::Skipped);
        }

        job.info(format!("Move question {} to {}", self.qid, self.new_qid));
        move_dir(&old_path, &new_path).map_err(|e| EditError::write("failed to move question", e))?;
        prune_empty_parents(&questions_dir, &self.qid)
            .map_err(|e| EditError::write("failed to prune empty directories", e))?;

        let mut paths = vec![old_path, new_path];
        let references = ctx
            .index
            .assessments_with_question(&ctx.course.id, &self.qid)
            .map_err(EditContext::index_error)?;

        for reference in references {
            let info_path = ctx
                .course
                .assessments_dir(&reference.course_instance)
                .join(&reference.tid)
                .join(ASSESSMENT_INFO_FILE);
            let mut info = match read_json_object(&info_path) {
                Ok(info) => info,
                Err(error) => {
                    job.warn(format!("Could not read {}: {error}", ctx.course.relative(&info_path).display()));
                    continue;
                }
            };
            if !rewrite_question_ids(&mut info, &self.qid, &self.new_qid) {
                job.warn(format!(
                    "Should have but did not find {} in {}",
                    self.qid,
                    ctx.course.relative(&info_path).display()
                ));
            }
            write_json(&info_path, &Value::Object(info))
                .map_err(|e| EditError::write(info_path.display(), e))?;
            paths.push(info_path);
        }

        Ok(WriteOutcome::changed(
            self.description(&ctx.course),
            paths,
            format!("rename question {} to {}", self.qid, self.new_qid),
        ))
    }
}

// ── Delete ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct QuestionDelete {
    qid: String,
}

impl QuestionDelete {
    pub fn new(qid: impl Into<String>) -> Self {
        Self { qid: qid.into() }
    }
}

impl MutationOperation for QuestionDelete {
    fn description(&self, _course: &CourseWorkingCopy) -> String {
        format!("Delete question {}", self.qid)
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        ctx.assert_can_edit()?;
        resolve_id(&ctx.course.questions_dir(), &self.qid)?;
        Ok(())
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let questions_dir = ctx.course.questions_dir();
        let path = resolve_id(&questions_dir, &self.qid)?;

        job.info(format!("Remove question {}", self.qid));
        remove_path(&path).map_err(|e| EditError::write("failed to remove question", e))?;
        prune_empty_parents(&questions_dir, &self.qid)
            .map_err(|e| EditError::write("failed to prune empty directories", e))?;

        Ok(WriteOutcome::changed(
            self.description(&ctx.course),
            vec![path],
            format!("delete question {}", self.qid),
        ))
    }
}

// ── Transfer ────────────────────────────────────────────────────────

/// Copy a question from another course's working copy into this one.
#[derive(Debug, Clone)]
pub struct QuestionTransfer {
    from_path: PathBuf,
    from_qid: String,
    from_course_short_name: String,
    uuid: Uuid,
}

impl QuestionTransfer {
    pub fn new(
        from_path: impl Into<PathBuf>,
        from_qid: impl Into<String>,
        from_course_short_name: impl Into<String>,
    ) -> Self {
        Self {
            from_path: from_path.into(),
            from_qid: from_qid.into(),
            from_course_short_name: from_course_short_name.into(),
            uuid: Uuid::new_v4(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl MutationOperation for QuestionTransfer {
    fn description(&self, _course: &CourseWorkingCopy) -> String {
        format!("Copy question {} from course {}", self.from_qid, self.from_course_short_name)
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let source_info_path = self.from_path.join(QUESTION_INFO_FILE);
        let source_info = read_json_object(&source_info_path)
            .map_err(|e| EditError::write(source_info_path.display(), e))?;
        let from_title = source_info
            .get("title")
            .and_then(Value::as_str)
            .filter(|title| !title.is_empty())
            .unwrap_or("Empty Title")
            .to_string();

        let qids = existing_qids(ctx)?;
        let titles = existing_titles(ctx)?;
        let (qid, title) = if qids.contains(&self.from_qid) || titles.contains(&from_title) {
            let names = names_for_copy(&self.from_qid, &qids, Some(&from_title), &titles);
            (names.short_name, names.long_name)
        } else {
            (self.from_qid.clone(), from_title)
        };

        let questions_dir = ctx.course.questions_dir();
        let to = resolve_id(&questions_dir, &qid)?;

        job.info(format!("Copy question {} from course {}", self.from_qid, self.from_course_short_name));
        copy_dir_all(&self.from_path, &to).map_err(|e| EditError::write("failed to copy question", e))?;

        let drop_tags = ctx.course.template_course || ctx.identity.authz.is_example_course;
        retitle(&to, &title, self.uuid, |info| {
            if drop_tags {
                info.remove("tags");
            }
            strip_sharing(info);
        })?;

        Ok(WriteOutcome::changed(
            self.description(&ctx.course),
            vec![to],
            format!(
                "copy question {} (from course {}) to {qid}",
                self.from_qid, self.from_course_short_name
            ),
        ))
    }
}

// Assessment editors, scoped to one course instance.

use coursesmith_common::names::{names_for_add, names_for_copy};
use serde_json::{json, Value};
use uuid::Uuid;

use super::fs_util::{
    copy_dir_all, create_json, existing_short_names, move_dir, prune_empty_parents,
    read_json_object, remove_path, resolve_id, write_json,
};
use super::{EditContext, MutationOperation, WriteOutcome};
use crate::course::{CourseWorkingCopy, ASSESSMENT_INFO_FILE};
use crate::error::EditError;
use crate::job::EditJob;

fn assessments_dir(ctx: &EditContext, course_instance: &str) -> Result<std::path::PathBuf, EditError> {
    let instance_dir = resolve_id(&ctx.course.course_instances_dir(), course_instance)?;
    Ok(instance_dir.join(crate::course::ASSESSMENTS_DIR))
}

fn existing_names(
    ctx: &EditContext,
    course_instance: &str,
    dir: &std::path::Path,
) -> Result<(Vec<String>, Vec<String>), EditError> {
    let tids = existing_short_names(dir, ASSESSMENT_INFO_FILE)
        .map_err(|e| EditError::write("failed to list existing assessments", e))?;
    let titles = ctx
        .index
        .assessment_titles(&ctx.course.id, course_instance)
        .map_err(EditContext::index_error)?;
    Ok((tids, titles))
}

// ── Add ─────────────────────────────────────────────────────────────

/// Create an empty homework named `New_<n>`.
#[derive(Debug, Clone)]
pub struct AssessmentAdd {
    course_instance: String,
    uuid: Uuid,
}

impl AssessmentAdd {
    pub fn new(course_instance: impl Into<String>) -> Self {
        Self { course_instance: course_instance.into(), uuid: Uuid::new_v4() }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl MutationOperation for AssessmentAdd {
    fn description(&self, _course: &CourseWorkingCopy) -> String {
        format!("{}: add assessment", self.course_instance)
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        ctx.assert_can_edit()?;
        assessments_dir(ctx, &self.course_instance)?;
        Ok(())
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let dir = assessments_dir(ctx, &self.course_instance)?;
        let (tids, titles) = existing_names(ctx, &self.course_instance, &dir)?;
        let names = names_for_add(&tids, &titles);
        let assessment_dir = dir.join(&names.short_name);

        let info = json!({
            "uuid": self.uuid.to_string(),
            "type": "Homework",
            "title": names.long_name,
            "set": "Homework",
            "number": "1",
            "allowAccess": [],
            "zones": [],
        });
        job.info(format!("Write {}", ctx.course.relative(&assessment_dir).display()));
        create_json(&assessment_dir.join(ASSESSMENT_INFO_FILE), &info)
            .map_err(|e| EditError::write("failed to create assessment", e))?;

        Ok(WriteOutcome::changed(
            self.description(&ctx.course),
            vec![assessment_dir],
            format!("{}: add assessment {}", self.course_instance, names.short_name),
        ))
    }
}

// ── Copy ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AssessmentCopy {
    course_instance: String,
    tid: String,
    title: Option<String>,
    uuid: Uuid,
}

impl AssessmentCopy {
    pub fn new(course_instance: impl Into<String>, tid: impl Into<String>, title: Option<String>) -> Self {
        Self { course_instance: course_instance.into(), tid: tid.into(), title, uuid: Uuid::new_v4() }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl MutationOperation for AssessmentCopy {
    fn description(&self, _course: &CourseWorkingCopy) -> String {
        format!("{}: copy assessment {}", self.course_instance, self.tid)
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        ctx.assert_can_edit()?;
        resolve_id(&assessments_dir(ctx, &self.course_instance)?, &self.tid)?;
        Ok(())
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let dir = assessments_dir(ctx, &self.course_instance)?;
        let from = resolve_id(&dir, &self.tid)?;
        let (tids, titles) = existing_names(ctx, &self.course_instance, &dir)?;
        let names = names_for_copy(&self.tid, &tids, self.title.as_deref(), &titles);
        let to = dir.join(&names.short_name);

        job.info(format!("Copy assessment {} to {}", self.tid, names.short_name));
        copy_dir_all(&from, &to).map_err(|e| EditError::write("failed to copy assessment", e))?;

        let info_path = to.join(ASSESSMENT_INFO_FILE);
        let mut info =
            read_json_object(&info_path).map_err(|e| EditError::write(info_path.display(), e))?;
        info.insert("title".into(), Value::String(names.long_name));
        info.insert("uuid".into(), Value::String(self.uuid.to_string()));
        write_json(&info_path, &Value::Object(info))
            .map_err(|e| EditError::write(info_path.display(), e))?;

        Ok(WriteOutcome::changed(
            self.description(&ctx.course),
            vec![to],
            format!("{}: copy assessment {} to {}", self.course_instance, self.tid, names.short_name),
        ))
    }
}

// ── Rename ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AssessmentRename {
    course_instance: String,
    tid: String,
    new_tid: String,
}

impl AssessmentRename {
    pub fn new(
        course_instance: impl Into<String>,
        tid: impl Into<String>,
        new_tid: impl Into<String>,
    ) -> Self {
        Self { course_instance: course_instance.into(), tid: tid.into(), new_tid: new_tid.into() }
    }
}

impl MutationOperation for AssessmentRename {
    fn description(&self, _course: &CourseWorkingCopy) -> String {
        format!("{}: rename assessment {}", self.course_instance, self.tid)
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        ctx.assert_can_edit()?;
        let dir = assessments_dir(ctx, &self.course_instance)?;
        resolve_id(&dir, &self.tid)?;
        resolve_id(&dir, &self.new_tid)?;
        Ok(())
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let dir = assessments_dir(ctx, &self.course_instance)?;
        let old_path = resolve_id(&dir, &self.tid)?;
        let new_path = resolve_id(&dir, &self.new_tid)?;
        if old_path == new_path {
            job.info(format!("Assessment {} already has that name", self.tid));
            return Ok(WriteOutcome::Skipped);
        }

        job.info(format!("Move assessment {} to {}", self.tid, self.new_tid));
        move_dir(&old_path, &new_path).map_err(|e| EditError::write("failed to move assessment", e))?;
        prune_empty_parents(&dir, &self.tid)
            .map_err(|e| EditError::write("failed to prune empty directories", e))?;

        Ok(WriteOutcome::changed(
            self.description(&ctx.course),
            vec![old_path, new_path],
            format!("{}: rename assessment {} to {}", self.course_instance, self.tid, self.new_tid),
        ))
    }
}

// ── Delete ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AssessmentDelete {
    course_instance: String,
    tid: String,
}

impl AssessmentDelete {
    pub fn new(course_instance: impl Into<String>, tid: impl Into<String>) -> Self {
        Self { course_instance: course_instance.into(), tid: tid.into() }
    }
}

impl MutationOperation for AssessmentDelete {
    fn description(&self, _course: &CourseWorkingCopy) -> String {
        format!("{}: delete assessment {}", self.course_instance, self.tid)
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        ctx.assert_can_edit()?;
        resolve_id(&assessments_dir(ctx, &self.course_instance)?, &self.tid)?;
        Ok(())
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let dir = assessments_dir(ctx, &self.course_instance)?;
        let path = resolve_id(&dir, &self.tid)?;

        job.info(format!("Remove assessment {}", self.tid));
        remove_path(&path).map_err(|e| EditError::write("failed to remove assessment", e))?;
        prune_empty_parents(&dir, &self.tid)
            .map_err(|e| EditError::write("failed to prune empty directories", e))?;

        Ok(WriteOutcome::changed(
            self.description(&ctx.course),
            vec![path],
            format!("{}: delete assessment {}", self.course_instance, self.tid),
        ))
    }
}

// Course instance editors.

use std::path::{Path, PathBuf};

use coursesmith_common::names::{names_for_add, names_for_copy, unique_names, NamePair};
use serde_json::{json, Value};
use uuid::Uuid;

use super::fs_util::{
    copy_dir_all, create_json, existing_short_names, move_dir, prune_empty_parents,
    read_json_object, remove_path, resolve_id, write_json,
};
use super::{EditContext, MutationOperation, WriteOutcome};
use crate::course::{CourseWorkingCopy, COURSE_INSTANCE_INFO_FILE};
use crate::error::EditError;
use crate::job::EditJob;

fn existing_names(ctx: &EditContext, dir: &Path) -> Result<(Vec<String>, Vec<String>), EditError> {
    let short_names = existing_short_names(dir, COURSE_INSTANCE_INFO_FILE)
        .map_err(|e| EditError::write("failed to list existing course instances", e))?;
    let long_names = ctx
        .index
        .course_instance_long_names(&ctx.course.id)
        .map_err(EditContext::index_error)?;
    Ok((short_names, long_names))
}

fn check_requested(dir: &Path, requested: Option<&NamePair>) -> Result<(), EditError> {
    if let Some(names) = requested {
        if names.long_name.trim().is_empty() {
            return Err(EditError::InvalidInput("course instance long name must not be empty".into()));
        }
        resolve_id(dir, &names.short_name)?;
    }
    Ok(())
}

// ── Add ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CourseInstanceAdd {
    requested: Option<NamePair>,
    uuid: Uuid,
}

impl CourseInstanceAdd {
    pub fn new() -> Self {
        Self { requested: None, uuid: Uuid::new_v4() }
    }

    /// Start from caller-chosen names; collisions get a numeric suffix.
    pub fn with_names(short_name: impl Into<String>, long_name: impl Into<String>) -> Self {
        Self {
            requested: Some(NamePair { short_name: short_name.into(), long_name: long_name.into() }),
            uuid: Uuid::new_v4(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl Default for CourseInstanceAdd {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationOperation for CourseInstanceAdd {
    fn description(&self, _course: &CourseWorkingCopy) -> String {
        "Add course instance".into()
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        ctx.assert_can_edit()?;
        check_requested(&ctx.course.course_instances_dir(), self.requested.as_ref())
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let dir = ctx.course.course_instances_dir();
        let (short_names, long_names) = existing_names(ctx, &dir)?;
        let names = match &self.requested {
            Some(requested) => unique_names(
                &requested.short_name,
                &short_names,
                &requested.long_name,
                &long_names,
            ),
            None => names_for_add(&short_names, &long_names),
        };
        let instance_dir = resolve_id(&dir, &names.short_name)?;

        let info = json!({
            "uuid": self.uuid.to_string(),
            "longName": names.long_name,
            "allowAccess": [],
        });
        job.info(format!("Write {}", ctx.course.relative(&instance_dir).display()));
        create_json(&instance_dir.join(COURSE_INSTANCE_INFO_FILE), &info)
            .map_err(|e| EditError::write("failed to create course instance", e))?;

        Ok(WriteOutcome::changed(
            self.description(&ctx.course),
            vec![instance_dir],
            format!("add course instance {}", names.short_name),
        ))
    }
}

// ── Copy ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CourseInstanceCopy {
    short_name: String,
    long_name: Option<String>,
    requested: Option<NamePair>,
    uuid: Uuid,
}

impl CourseInstanceCopy {
    pub fn new(short_name: impl Into<String>, long_name: Option<String>) -> Self {
        Self { short_name: short_name.into(), long_name, requested: None, uuid: Uuid::new_v4() }
    }

    /// Name the copy after caller-chosen names instead of `<name>_copy<n>`.
    pub fn with_names(mut self, short_name: impl Into<String>, long_name: impl Into<String>) -> Self {
        self.requested = Some(NamePair { short_name: short_name.into(), long_name: long_name.into() });
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl MutationOperation for CourseInstanceCopy {
    fn description(&self, _course: &CourseWorkingCopy) -> String {
        format!("Copy course instance {}", self.short_name)
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        ctx.assert_can_edit()?;
        let dir = ctx.course.course_instances_dir();
        resolve_id(&dir, &self.short_name)?;
        check_requested(&dir, self.requested.as_ref())
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let dir = ctx.course.course_instances_dir();
        let from = resolve_id(&dir, &self.short_name)?;
        let (short_names, long_names) = existing_names(ctx, &dir)?;
        let names = match &self.requested {
            Some(requested) => unique_names(
                &requested.short_name,
                &short_names,
                &requested.long_name,
                &long_names,
            ),
            None => names_for_copy(&self.short_name, &short_names, self.long_name.as_deref(), &long_names),
        };
        let to = resolve_id(&dir, &names.short_name)?;

        job.info(format!("Copy course instance {} to {}", self.short_name, names.short_name));
        copy_dir_all(&from, &to).map_err(|e| EditError::write("failed to copy course instance", e))?;

        let info_path = to.join(COURSE_INSTANCE_INFO_FILE);
        let mut info =
            read_json_object(&info_path).map_err(|e| EditError::write(info_path.display(), e))?;
        info.insert("longName".into(), Value::String(names.long_name));
        info.insert("uuid".into(), Value::String(self.uuid.to_string()));
        write_json(&info_path, &Value::Object(info))
            .map_err(|e| EditError::write(info_path.display(), e))?;

        Ok(WriteOutcome::changed(
            self.description(&ctx.course),
            vec![to],
            format!("copy course instance {} to {}", self.short_name, names.short_name),
        ))
    }
}

// ── Rename ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CourseInstanceRename {
    short_name: String,
    new_short_name: String,
}

impl CourseInstanceRename {
    pub fn new(short_name: impl Into<String>, new_short_name: impl Into<String>) -> Self {
        Self { short_name: short_name.into(), new_short_name: new_short_name.into() }
    }

    fn paths(&self, course: &CourseWorkingCopy) -> Result<(PathBuf, PathBuf), EditError> {
        let dir = course.course_instances_dir();
        Ok((resolve_id(&dir, &self.short_name)?, resolve_id(&dir, &self.new_short_name)?))
    }
}

impl MutationOperation for CourseInstanceRename {
    fn description(&self, _course: &CourseWorkingCopy) -> String {
        format!("Rename course instance {}", self.short_name)
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        ctx.assert_can_edit()?;
        self.paths(&ctx.course).map(|_| ())
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let (old_path, new_path) = self.paths(&ctx.course)?;
        if old_path == new_path {
            job.info(format!("Course instance {} already has that name", self.short_name));
            return Ok(WriteOutcome::Skipped);
        }

        job.info(format!("Move course instance {} to {}", self.short_name, self.new_short_name));
        move_dir(&old_path, &new_path)
            .map_err(|e| EditError::write("failed to move course instance", e))?;
        prune_empty_parents(&ctx.course.course_instances_dir(), &self.short_name)
            .map_err(|e| EditError::write("failed to prune empty directories", e))?;

        Ok(WriteOutcome::changed(
            self.description(&ctx.course),
            vec![old_path, new_path],
            format!("rename course instance {} to {}", self.short_name, self.new_short_name),
        ))
    }
}

// ── Delete ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CourseInstanceDelete {
    short_name: String,
}

impl CourseInstanceDelete {
    pub fn new(short_name: impl Into<String>) -> Self {
        Self { short_name: short_name.into() }
    }
}

impl MutationOperation for CourseInstanceDelete {
    fn description(&self, _course: &CourseWorkingCopy) -> String {
        format!("Delete course instance {}", self.short_name)
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        ctx.assert_can_edit()?;
        resolve_id(&ctx.course.course_instances_dir(), &self.short_name)?;
        Ok(())
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let dir = ctx.course.course_instances_dir();
        let path = resolve_id(&dir, &self.short_name)?;

        job.info(format!("Remove course instance {}", self.short_name));
        remove_path(&path).map_err(|e| EditError::write("failed to remove course instance", e))?;
        prune_empty_parents(&dir, &self.short_name)
            .map_err(|e| EditError::write("failed to prune empty directories", e))?;

        Ok(WriteOutcome::changed(
            self.description(&ctx.course),
            vec![path],
            format!("delete course instance {}", self.short_name),
        ))
    }
}

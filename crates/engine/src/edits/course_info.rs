use serde_json::Value;

use super::fs_util::create_json;
use super::{EditContext, MutationOperation, WriteOutcome};
use crate::course::{CourseWorkingCopy, COURSE_INFO_FILE};
use crate::error::EditError;
use crate::job::EditJob;

/// Write `infoCourse.json` for a course that has none yet.
#[derive(Debug, Clone)]
pub struct CourseInfoCreate {
    info: Value,
}

impl CourseInfoCreate {
    pub fn new(info: Value) -> Self {
        Self { info }
    }
}

impl MutationOperation for CourseInfoCreate {
    fn description(&self, _course: &CourseWorkingCopy) -> String {
        "Create infoCourse.json".into()
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        if !self.info.is_object() {
            return Err(EditError::InvalidInput("course info must be a JSON object".into()));
        }
        ctx.assert_can_edit()
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let path = ctx.course.course_info_path();
        if !ctx.course.root.is_dir() {
            return Err(EditError::write(
                "failed to create infoCourse.json",
                format!("course directory {} does not exist", ctx.course.root.display()),
            ));
        }

        job.info(format!("Write {COURSE_INFO_FILE}"));
        create_json(&path, &self.info)
            .map_err(|e| EditError::write("failed to create infoCourse.json", e))?;

        Ok(WriteOutcome::changed(
            self.description(&ctx.course),
            vec![path],
            "create infoCourse.json",
        ))
    }
}

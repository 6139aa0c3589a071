use super::{EditContext, MutationOperation, WriteOutcome};
use crate::course::CourseWorkingCopy;
use crate::error::EditError;
use crate::job::EditJob;

/// Several operations sharing one job, one lock and at most one commit.
pub struct CompositeMutation {
    description: String,
    operations: Vec<Box<dyn MutationOperation>>,
}

impl CompositeMutation {
    pub fn new(description: impl Into<String>, operations: Vec<Box<dyn MutationOperation>>) -> Self {
        Self { description: description.into(), operations }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl MutationOperation for CompositeMutation {
    fn description(&self, _course: &CourseWorkingCopy) -> String {
        self.description.clone()
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        ctx.assert_can_edit()?;
        self.operations.iter().try_for_each(|op| op.assert_can_edit(ctx))
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let mut paths_to_add = Vec::new();
        let total = self.operations.len();
        for (index, op) in self.operations.into_iter().enumerate() {
            let step = op.description(&ctx.course);
            match op.write(ctx, job)? {
                WriteOutcome::Changed(descriptor) => {
                    job.info(format!("[{}/{total}] {step}", index + 1));
                    for path in descriptor.paths_to_add {
                        if !paths_to_add.contains(&path) {
                            paths_to_add.push(path);
                        }
                    }
                }
                WriteOutcome::Skipped => job.info(format!("[{}/{total}] {step} (skipped)", index + 1)),
            }
        }

        if paths_to_add.is_empty() {
            return Ok(WriteOutcome::Skipped);
        }
        Ok(WriteOutcome::changed(self.description.clone(), paths_to_add, self.description))
    }
}

// CLI subcommand dispatch.

use std::path::Path;

use anyhow::Context;
use clap::Subcommand;
use coursesmith_engine::config::EditorConfig;
use coursesmith_engine::edits::{EditContext, MutationOperation};
use coursesmith_engine::orchestrator::EditJobResult;

use crate::output::{self, OutputFormat};
use crate::session::{self, CourseArgs, Session};

pub mod edit;
pub mod hash;
pub mod pull;
pub mod sync;

#[derive(Subcommand)]
pub enum Command {
    /// Print the content fingerprint of a file
    Hash(hash::HashArgs),
    /// Sync the course store from the working copy on disk
    Sync(sync::SyncArgs),
    /// Clone or update the working copy from its remote, then sync
    Pull(pull::PullArgs),
    /// Apply one edit to a course
    Edit(edit::EditArgs),
}

pub fn run(cmd: Command, config: Option<&Path>) -> anyhow::Result<()> {
    match cmd {
        Command::Hash(args) => hash::run(args),
        Command::Sync(args) => sync::run(args, session::load_config(config)?),
        Command::Pull(args) => pull::run(args, session::load_config(config)?),
        Command::Edit(args) => edit::run(args, session::load_config(config)?),
    }
}

/// Prepare and run one edit, printing the job result or failure.
fn run_edit<F>(config: EditorConfig, course: &CourseArgs, build: F) -> anyhow::Result<()>
where
    F: FnOnce(&EditContext) -> anyhow::Result<Box<dyn MutationOperation>>,
{
    let format = course.format();
    let outcome: anyhow::Result<EditJobResult> = (|| {
        let session = Session::new(config)?;
        let ctx = session.context(course)?;
        let op = build(&ctx)?;
        let job = session.orchestrator.prepare_job(&ctx, op.as_ref())?;
        let result = session::runtime()?
            .block_on(session.orchestrator.run(job, ctx, op))
            .context("edit failed")?;
        Ok(result)
    })();
    report(format, outcome)
}

/// Print a finished job, or the error that ended it.
fn report(format: OutputFormat, outcome: anyhow::Result<EditJobResult>) -> anyhow::Result<()> {
    match outcome {
        Ok(result) => {
            output::print_output(format, &result, format_human)?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

fn format_human(result: &EditJobResult) -> String {
    let mut out = if result.changed {
        format!("{} (job {})", result.description, result.job_sequence_id)
    } else {
        format!("{}: nothing to change (job {})", result.description, result.job_sequence_id)
    };
    if let (Some(before), Some(after)) = (&result.before_commit, &result.after_commit) {
        if before != after {
            out.push_str(&format!("\n  commit {} -> {}", short(before), short(after)));
        }
    }
    if let Some(sync) = &result.sync {
        for warning in &sync.warnings {
            out.push_str(&format!("\n  warning: {}: {}", warning.path, warning.message));
        }
    }
    out
}

fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

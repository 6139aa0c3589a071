// `coursesmith pull` — clone or hard-update the working copy, then sync.

use anyhow::bail;
use clap::Args;
use coursesmith_engine::config::EditorConfig;
use coursesmith_engine::orchestrator::EditJobResult;

use super::report;
use crate::session::{self, CourseArgs, Session};

#[derive(Debug, Args)]
pub struct PullArgs {
    #[command(flatten)]
    pub course: CourseArgs,
}

pub fn run(args: PullArgs, config: EditorConfig) -> anyhow::Result<()> {
    let format = args.course.format();
    let outcome: anyhow::Result<EditJobResult> = (|| {
        if args.course.repository.is_none() {
            bail!("pull needs --repository");
        }
        if !config.git.use_git {
            bail!("git is disabled in the config ([git] use_git = false)");
        }
        let session = Session::new(config)?;
        let ctx = session.context(&args.course)?;
        Ok(session::runtime()?.block_on(session.orchestrator.pull_and_update(ctx))?)
    })();
    report(format, outcome)
}

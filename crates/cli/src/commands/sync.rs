// `coursesmith sync` — load the working copy into the course store.

use clap::Args;
use coursesmith_engine::config::EditorConfig;
use coursesmith_engine::orchestrator::EditJobResult;

use super::report;
use crate::session::{self, CourseArgs, Session};

#[derive(Debug, Args)]
pub struct SyncArgs {
    #[command(flatten)]
    pub course: CourseArgs,
}

pub fn run(args: SyncArgs, config: EditorConfig) -> anyhow::Result<()> {
    let format = args.course.format();
    let outcome: anyhow::Result<EditJobResult> = (|| {
        let session = Session::new(config)?;
        let ctx = session.context(&args.course)?;
        Ok(session::runtime()?.block_on(session.orchestrator.sync_from_disk(ctx))?)
    })();
    report(format, outcome)
}

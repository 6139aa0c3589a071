// Git working-copy controller: subprocess git with per-invocation environment.

pub mod worker;

pub use worker::{
    CommandExecutor, CommandResult, GitCommandOutput, GitWorker, GitWorkerError,
    ProcessCommandExecutor,
};

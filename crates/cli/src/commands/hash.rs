// `coursesmith hash` — print the fingerprint clients send back as `orig_hash`.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use coursesmith_common::hash::fingerprint_file;
use serde::Serialize;

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct HashArgs {
    /// File to fingerprint.
    pub file: PathBuf,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct HashResult {
    path: String,
    hash: String,
}

pub fn run(args: HashArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let outcome = fingerprint_file(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()));
    match outcome {
        Ok(hash) => {
            let result = HashResult { path: args.file.display().to_string(), hash: hash.into_string() };
            output::print_output(format, &result, |r| r.hash.clone())?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

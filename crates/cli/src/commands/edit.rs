// `coursesmith edit` — apply one mutation to a course working copy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Subcommand};
use coursesmith_common::encoding::ContentEncoding;
use coursesmith_common::hash::ContentFingerprint;
use coursesmith_common::path::FileContainer;
use coursesmith_engine::config::EditorConfig;
use coursesmith_engine::course::{CourseWorkingCopy, COURSE_INSTANCES_DIR, QUESTIONS_DIR};
use coursesmith_engine::edits::{
    AssessmentAdd, AssessmentCopy, AssessmentDelete, AssessmentRename, CompositeMutation,
    CourseInfoCreate, CourseInstanceAdd, CourseInstanceCopy, CourseInstanceDelete,
    CourseInstanceRename, EditContext, FileDelete, FileModify, FileRename, FileUpload,
    MutationOperation, QuestionAdd, QuestionCopy, QuestionDelete, QuestionRename,
    QuestionTransfer,
};

use super::run_edit;
use crate::session::CourseArgs;

#[derive(Debug, Args)]
pub struct EditArgs {
    #[command(flatten)]
    pub course: CourseArgs,

    #[command(subcommand)]
    pub target: EditTarget,
}

#[derive(Debug, Subcommand)]
pub enum EditTarget {
    /// Questions under `questions/`
    Question {
        #[command(subcommand)]
        action: QuestionAction,
    },
    /// Assessments of one course instance
    Assessment {
        /// Course instance short name.
        #[arg(long = "instance")]
        course_instance: String,
        #[command(subcommand)]
        action: AssessmentAction,
    },
    /// Course instances under `courseInstances/`
    Instance {
        #[command(subcommand)]
        action: InstanceAction,
    },
    /// Arbitrary files inside a container directory
    File {
        #[command(flatten)]
        container: ContainerArgs,
        #[command(subcommand)]
        action: FileAction,
    },
    /// The course's `infoCourse.json`
    CourseInfo {
        #[command(subcommand)]
        action: CourseInfoAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum QuestionAction {
    /// Add a question from the template
    Add {
        /// Seed file as NAME=PATH, relative to the new question directory.
        #[arg(long = "file", value_name = "NAME=PATH")]
        files: Vec<String>,
    },
    /// Copy a question
    Copy {
        qid: String,
        /// Title for the copy.
        #[arg(long)]
        title: Option<String>,
    },
    /// Rename a question and rewrite assessments that use it
    Rename { qid: String, new_qid: String },
    /// Delete a question
    Delete { qid: String },
    /// Copy a question in from another course's working copy
    Transfer {
        /// Root of the source course.
        #[arg(long)]
        from_course_dir: PathBuf,
        /// Short name of the source course.
        #[arg(long)]
        from_course_name: String,
        /// Question id in the source course.
        qid: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum AssessmentAction {
    /// Add an empty homework
    Add,
    /// Copy an assessment
    Copy {
        tid: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Rename an assessment directory
    Rename { tid: String, new_tid: String },
    /// Delete an assessment
    Delete { tid: String },
}

#[derive(Debug, Subcommand)]
pub enum InstanceAction {
    /// Add a course instance
    Add {
        /// Requested short name; a numeric suffix is added on collision.
        #[arg(long, requires = "long_name")]
        short_name: Option<String>,
        #[arg(long, requires = "short_name")]
        long_name: Option<String>,
    },
    /// Copy a course instance
    Copy {
        short_name: String,
        /// Name the copy after this short name instead of `<name>_copy<n>`.
        #[arg(long, requires = "to_long_name")]
        to_short_name: Option<String>,
        #[arg(long, requires = "to_short_name")]
        to_long_name: Option<String>,
    },
    /// Rename a course instance directory
    Rename { short_name: String, new_short_name: String },
    /// Delete a course instance
    Delete { short_name: String },
}

#[derive(Debug, Clone, Args)]
pub struct ContainerArgs {
    /// Container directory, relative to the course root. Defaults to the
    /// course root with `questions/` and `courseInstances/` excluded.
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Directory inside the container that may not be edited (repeatable).
    #[arg(long = "exclude")]
    pub excluded: Vec<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum FileAction {
    /// Upload files as DEST=SOURCE pairs
    Upload {
        #[arg(required = true, value_name = "DEST=SOURCE")]
        files: Vec<String>,
    },
    /// Replace a file's contents if nobody changed it since `--orig-hash`
    Modify {
        path: PathBuf,
        /// Fingerprint of the file as the editor last saw it.
        #[arg(long)]
        orig_hash: String,
        /// Read new contents from this file (`-` for stdin).
        #[arg(long, value_name = "PATH")]
        contents_from: PathBuf,
        /// Contents are base64-encoded.
        #[arg(long)]
        base64: bool,
    },
    /// Move a file inside the container
    Rename { path: PathBuf, new_path: PathBuf },
    /// Delete a file or directory
    Delete { path: PathBuf },
}

#[derive(Debug, Subcommand)]
pub enum CourseInfoAction {
    /// Write `infoCourse.json`; fails if it already exists
    Create {
        /// JSON object to write.
        #[arg(long, value_name = "PATH")]
        from: PathBuf,
    },
}

pub fn run(args: EditArgs, config: EditorConfig) -> Result<()> {
    let EditArgs { course, target } = args;
    run_edit(config, &course, move |ctx| build(target, ctx))
}

fn build(target: EditTarget, ctx: &EditContext) -> Result<Box<dyn MutationOperation>> {
    Ok(match target {
        EditTarget::Question { action } => question(action)?,
        EditTarget::Assessment { course_instance, action } => assessment(course_instance, action),
        EditTarget::Instance { action } => instance(action),
        EditTarget::File { container, action } => file(container.resolve(&ctx.course), action)?,
        EditTarget::CourseInfo { action: CourseInfoAction::Create { from } } => {
            let info = serde_json::from_str(&read_text(&from)?)
                .with_context(|| format!("{} is not valid JSON", from.display()))?;
            Box::new(CourseInfoCreate::new(info))
        }
    })
}

fn question(action: QuestionAction) -> Result<Box<dyn MutationOperation>> {
    Ok(match action {
        QuestionAction::Add { files } => {
            let mut op = QuestionAdd::new();
            if !files.is_empty() {
                let mut contents = BTreeMap::new();
                for pair in &files {
                    let (name, source) = split_pair(pair)?;
                    contents.insert(name.to_string(), read_text(Path::new(source))?);
                }
                op = op.with_files(contents);
            }
            Box::new(op)
        }
        QuestionAction::Copy { qid, title } => Box::new(QuestionCopy::new(qid, title)),
        QuestionAction::Rename { qid, new_qid } => Box::new(QuestionRename::new(qid, new_qid)),
        QuestionAction::Delete { qid } => Box::new(QuestionDelete::new(qid)),
        QuestionAction::Transfer { from_course_dir, from_course_name, qid } => {
            let from_path = std::path::absolute(&from_course_dir)?.join(QUESTIONS_DIR).join(&qid);
            Box::new(QuestionTransfer::new(from_path, qid, from_course_name))
        }
    })
}

fn assessment(course_instance: String, action: AssessmentAction) -> Box<dyn MutationOperation> {
    match action {
        AssessmentAction::Add => Box::new(AssessmentAdd::new(course_instance)),
        AssessmentAction::Copy { tid, title } => Box::new(AssessmentCopy::new(course_instance, tid, title)),
        AssessmentAction::Rename { tid, new_tid } => {
            Box::new(AssessmentRename::new(course_instance, tid, new_tid))
        }
        AssessmentAction::Delete { tid } => Box::new(AssessmentDelete::new(course_instance, tid)),
    }
}

fn instance(action: InstanceAction) -> Box<dyn MutationOperation> {
    match action {
        InstanceAction::Add { short_name: Some(short), long_name: Some(long) } => {
            Box::new(CourseInstanceAdd::with_names(short, long))
        }
        InstanceAction::Add { .. } => Box::new(CourseInstanceAdd::new()),
        InstanceAction::Copy { short_name, to_short_name, to_long_name } => {
            let op = CourseInstanceCopy::new(short_name, None);
            match (to_short_name, to_long_name) {
                (Some(short), Some(long)) => Box::new(op.with_names(short, long)),
                _ => Box::new(op),
            }
        }
        InstanceAction::Rename { short_name, new_short_name } => {
            Box::new(CourseInstanceRename::new(short_name, new_short_name))
        }
        InstanceAction::Delete { short_name } => Box::new(CourseInstanceDelete::new(short_name)),
    }
}

fn file(container: FileContainer, action: FileAction) -> Result<Box<dyn MutationOperation>> {
    Ok(match action {
        FileAction::Upload { files } => {
            let mut uploads: Vec<Box<dyn MutationOperation>> = Vec::with_capacity(files.len());
            for pair in &files {
                let (dest, source) = split_pair(pair)?;
                let contents =
                    std::fs::read(source).with_context(|| format!("failed to read {source}"))?;
                uploads.push(Box::new(FileUpload::new(container.clone(), dest, contents)));
            }
            match uploads.len() {
                1 => uploads.remove(0),
                n => Box::new(CompositeMutation::new(format!("upload {n} files"), uploads)),
            }
        }
        FileAction::Modify { path, orig_hash, contents_from, base64 } => {
            let encoding = if base64 { ContentEncoding::Base64 } else { ContentEncoding::Raw };
            Box::new(FileModify::new(
                container,
                path,
                read_text(&contents_from)?,
                encoding,
                ContentFingerprint::from_hex(orig_hash),
            ))
        }
        FileAction::Rename { path, new_path } => Box::new(FileRename::new(container, path, new_path)),
        FileAction::Delete { path } => Box::new(FileDelete::new(container, path)),
    })
}

impl ContainerArgs {
    fn resolve(&self, course: &CourseWorkingCopy) -> FileContainer {
        let mut container = match &self.root {
            Some(root) => FileContainer::new(course.root.join(root)),
            None => FileContainer::new(&course.root)
                .excluding(course.root.join(QUESTIONS_DIR))
                .excluding(course.root.join(COURSE_INSTANCES_DIR)),
        };
        for excluded in &self.excluded {
            let excluded = container.resolve(excluded);
            container = container.excluding(excluded);
        }
        container
    }
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => Ok((name, path)),
        _ => Err(anyhow!("expected NAME=PATH, got `{pair}`")),
    }
}

fn read_text(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let contents = std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?;
        return Ok(contents);
    }
    if !path.is_file() {
        bail!("{} is not a file", path.display());
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

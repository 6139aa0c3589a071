// Editors for arbitrary files inside a container directory.
//
// Every path is checked against the container in `assert_can_edit`, before
// the lock is taken and before anything on disk is read.

use std::fs;
use std::path::{Path, PathBuf};

use coursesmith_common::encoding::{decode_contents, ContentEncoding};
use coursesmith_common::hash::{fingerprint, fingerprint_file_if_exists, ContentFingerprint};
use coursesmith_common::path::FileContainer;
use tracing::debug;

use super::fs_util::remove_path;
use super::{EditContext, MutationOperation, WriteOutcome};
use crate::course::CourseWorkingCopy;
use crate::error::EditError;
use crate::job::EditJob;

/// Message surfaced when the optimistic concurrency check fails.
pub const CONFLICT_MESSAGE: &str = "Another user made changes to the file you were editing.";

fn describe(course: &CourseWorkingCopy, container: &FileContainer, verb: &str, paths: &[&Path]) -> String {
    let prefix = if container.root_path == course.root {
        String::new()
    } else {
        container
            .root_path
            .file_name()
            .map(|name| format!("{}: ", name.to_string_lossy()))
            .unwrap_or_default()
    };
    let relative: Vec<String> = paths
        .iter()
        .map(|path| {
            let resolved = container.resolve(path);
            resolved
                .strip_prefix(&container.root_path)
                .unwrap_or(&resolved)
                .display()
                .to_string()
        })
        .collect();
    format!("{prefix}{verb} {}", relative.join(" to "))
}

fn ensure_parent(path: &Path) -> Result<(), EditError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| EditError::write(format!("failed to create {}", parent.display()), e))?;
    }
    Ok(())
}

// ── Upload ──────────────────────────────────────────────────────────

/// Write raw bytes to a file, skipping when the file already holds them.
#[derive(Debug, Clone)]
pub struct FileUpload {
    container: FileContainer,
    path: PathBuf,
    contents: Vec<u8>,
}

impl FileUpload {
    pub fn new(container: FileContainer, path: impl Into<PathBuf>, contents: Vec<u8>) -> Self {
        Self { container, path: path.into(), contents }
    }
}

impl MutationOperation for FileUpload {
    fn description(&self, course: &CourseWorkingCopy) -> String {
        describe(course, &self.container, "upload", &[self.path.as_path()])
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        self.container.check(&self.path)?;
        ctx.assert_can_edit()
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let path = self.container.resolve(&self.path);
        let existing = fingerprint_file_if_exists(&path)
            .map_err(|e| EditError::write(format!("failed to read {}", path.display()), e))?;
        if existing.as_ref() == Some(&fingerprint(&self.contents)) {
            debug!(path = %path.display(), "upload matches file on disk");
            job.info("New contents are the same as old contents, nothing to upload");
            return Ok(WriteOutcome::Skipped);
        }

        ensure_parent(&path)?;
        fs::write(&path, &self.contents)
            .map_err(|e| EditError::write(format!("failed to write {}", path.display()), e))?;

        let description = self.description(&ctx.course);
        Ok(WriteOutcome::changed(description.clone(), vec![path], description))
    }
}

// ── Modify ──────────────────────────────────────────────────────────

/// Replace a file's contents, provided nobody changed it since `orig_hash` was taken.
#[derive(Debug, Clone)]
pub struct FileModify {
    container: FileContainer,
    path: PathBuf,
    contents: String,
    encoding: ContentEncoding,
    orig_hash: ContentFingerprint,
}

impl FileModify {
    pub fn new(
        container: FileContainer,
        path: impl Into<PathBuf>,
        contents: impl Into<String>,
        encoding: ContentEncoding,
        orig_hash: ContentFingerprint,
    ) -> Self {
        Self { container, path: path.into(), contents: contents.into(), encoding, orig_hash }
    }
}

impl MutationOperation for FileModify {
    fn description(&self, course: &CourseWorkingCopy) -> String {
        describe(course, &self.container, "modify", &[self.path.as_path()])
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        self.container.check(&self.path)?;
        decode_contents(self.encoding, &self.contents)?;
        ctx.assert_can_edit()
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let path = self.container.resolve(&self.path);
        let contents = decode_contents(self.encoding, &self.contents)?;

        let edit_hash = fingerprint(&contents);
        if edit_hash == self.orig_hash {
            job.info("Edit contents are the same as original contents, nothing to save");
            return Ok(WriteOutcome::Skipped);
        }

        let disk_hash = fingerprint_file_if_exists(&path)
            .map_err(|e| EditError::write(format!("failed to read {}", path.display()), e))?;
        debug!(
            path = %path.display(),
            orig = %self.orig_hash,
            disk = ?disk_hash.as_ref().map(ContentFingerprint::as_str),
            "checking file fingerprint"
        );
        if disk_hash.as_ref() != Some(&self.orig_hash) {
            return Err(EditError::Conflict(CONFLICT_MESSAGE.into()));
        }

        ensure_parent(&path)?;
        fs::write(&path, &contents)
            .map_err(|e| EditError::write(format!("failed to write {}", path.display()), e))?;

        let description = self.description(&ctx.course);
        Ok(WriteOutcome::changed(description.clone(), vec![path], description))
    }
}

// ── Rename ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FileRename {
    container: FileContainer,
    old_path: PathBuf,
    new_path: PathBuf,
}

impl FileRename {
    pub fn new(container: FileContainer, old_path: impl Into<PathBuf>, new_path: impl Into<PathBuf>) -> Self {
        Self { container, old_path: old_path.into(), new_path: new_path.into() }
    }
}

impl MutationOperation for FileRename {
    fn description(&self, course: &CourseWorkingCopy) -> String {
        describe(course, &self.container, "rename", &[self.old_path.as_path(), self.new_path.as_path()])
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        self.container.check(&self.old_path)?;
        self.container.check(&self.new_path)?;
        ctx.assert_can_edit()
    }

    fn write(self: Box<Self>, ctx: &EditContext, job: &EditJob) -> Result<WriteOutcome, EditError> {
        let old_path = self.container.resolve(&self.old_path);
        let new_path = self.container.resolve(&self.new_path);
        if old_path == new_path {
            job.info("File already has that name");
            return Ok(WriteOutcome::Skipped);
        }

        ensure_parent(&new_path)?;
        fs::rename(&old_path, &new_path).map_err(|e| {
            EditError::write(
                format!("failed to rename {} to {}", old_path.display(), new_path.display()),
                e,
            )
        })?;

        let description = self.description(&ctx.course);
        Ok(WriteOutcome::changed(description.clone(), vec![old_path, new_path], description))
    }
}

// ── Delete ──────────────────────────────────────────────────────────

/// Remove a file. Deleting a file that is already gone still commits the path.
#[derive(Debug, Clone)]
pub struct FileDelete {
    container: FileContainer,
    path: PathBuf,
}

impl FileDelete {
    pub fn new(container: FileContainer, path: impl Into<PathBuf>) -> Self {
        Self { container, path: path.into() }
    }
}

impl MutationOperation for FileDelete {
    fn description(&self, course: &CourseWorkingCopy) -> String {
        describe(course, &self.container, "delete", &[self.path.as_path()])
    }

    fn assert_can_edit(&self, ctx: &EditContext) -> Result<(), EditError> {
        self.container.check(&self.path)?;
        ctx.assert_can_edit()
    }

    fn write(self: Box<Self>, ctx: &EditContext, _job: &EditJob) -> Result<WriteOutcome, EditError> {
        let path = self.container.resolve(&self.path);
        remove_path(&path)
            .map_err(|e| EditError::write(format!("failed to remove {}", path.display()), e))?;

        let description = self.description(&ctx.course);
        Ok(WriteOutcome::changed(description.clone(), vec![path], description))
    }
}

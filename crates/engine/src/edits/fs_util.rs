// Filesystem helpers shared by the editors.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use coursesmith_common::path::{normalize_path, FileContainer};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::EditError;

/// Resolve a caller-supplied id (`qid`, `tid`, course instance name) to its
/// directory under `dir`, rejecting anything that would land elsewhere.
pub fn resolve_id(dir: &Path, id: &str) -> Result<PathBuf, EditError> {
    let normalized = normalize_path(id)?;
    let path = dir.join(&normalized);
    FileContainer::new(dir).check(&path)?;
    Ok(path)
}

/// Copy the directory tree at `from` to `to`. Fails if `to` already exists.
pub fn copy_dir_all(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("`{}` already exists", to.display()),
        ));
    }
    if !from.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("`{}` is not a directory", from.display()),
        ));
    }
    copy_tree(from, to)
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Move `from` to `to`, creating `to`'s parents. Never overwrites.
pub fn move_dir(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("`{}` already exists", to.display()),
        ));
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(from, to)
}

/// Remove a file or directory tree. A missing path is not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(error) => Err(error),
    };
    match result {
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Short names of every item under `root`, recursing into directories that
/// do not hold `info_file`. A missing `root` has no items.
pub fn existing_short_names(root: &Path, info_file: &str) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    collect_short_names(root, "", info_file, &mut names)?;
    names.sort();
    Ok(names)
}

fn collect_short_names(
    root: &Path,
    relative: &str,
    info_file: &str,
    names: &mut Vec<String>,
) -> io::Result<()> {
    let dir = root.join(relative);
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let sub = if relative.is_empty() { name } else { format!("{relative}/{name}") };
        if root.join(&sub).join(info_file).exists() {
            names.push(sub);
        } else {
            collect_short_names(root, &sub, info_file, names)?;
        }
    }
    Ok(())
}

/// After `id` was removed from `root`, delete the now-empty directories that
/// used to contain it, deepest first, stopping at the first non-empty one.
pub fn prune_empty_parents(root: &Path, id: &str) -> io::Result<()> {
    let id = normalize_path(id).map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;
    let segments: Vec<&str> = id.split('/').filter(|s| !s.is_empty()).collect();
    for depth in (1..segments.len()).rev() {
        let dir = segments[..depth].iter().fold(root.to_path_buf(), |path, s| path.join(s));
        let is_empty = match fs::read_dir(&dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(error) if error.kind() == io::ErrorKind::NotFound => continue,
            Err(error) => return Err(error),
        };
        if !is_empty {
            debug!(dir = %dir.display(), "stopping prune at non-empty directory");
            break;
        }
        debug!(dir = %dir.display(), "pruning empty directory");
        fs::remove_dir(&dir)?;
    }
    Ok(())
}

// ── JSON ────────────────────────────────────────────────────────────

/// Four-space indented JSON with a trailing newline, the layout course files use.
pub fn to_pretty_json(value: &Value) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    out.push(b'\n');
    Ok(out)
}

fn invalid_data(error: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, error)
}

/// Read a JSON object from disk.
pub fn read_json_object(path: &Path) -> io::Result<Map<String, Value>> {
    let contents = fs::read(path)?;
    match serde_json::from_slice(&contents).map_err(invalid_data)? {
        Value::Object(map) => Ok(map),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("`{}` does not hold a JSON object", path.display()),
        )),
    }
}

pub fn write_json(path: &Path, value: &Value) -> io::Result<()> {
    fs::write(path, to_pretty_json(value).map_err(invalid_data)?)
}

/// Write a JSON file that must not exist yet, creating its parent directories.
pub fn create_json(path: &Path, value: &Value) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = to_pretty_json(value).map_err(invalid_data)?;
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(&bytes)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn pretty_json_uses_four_spaces_and_trailing_newline() {
        let bytes = to_pretty_json(&json!({"uuid": "u", "zones": []})).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "{\n    \"uuid\": \"u\",\n    \"zones\": []\n}\n");
    }

    #[test]
    fn short_names_recurse_until_info_file() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        for dir in ["q1", "topic/q2", "topic/deeper/q3"] {
            fs::create_dir_all(root.join(dir)).unwrap();
            fs::write(root.join(dir).join("info.json"), "{}").unwrap();
        }
        fs::create_dir_all(root.join("q1/clientFilesQuestion")).unwrap();
        fs::write(root.join("README.md"), "").unwrap();

        let names = existing_short_names(root, "info.json").unwrap();
        assert_eq!(names, vec!["q1", "topic/deeper/q3", "topic/q2"]);
        assert!(existing_short_names(&root.join("missing"), "info.json").unwrap().is_empty());
    }

    #[test]
    fn prune_removes_empty_chain_up_to_first_non_empty_ancestor() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("a/b/c/q")).unwrap();
        fs::write(root.join("a/keep.txt"), "").unwrap();

        remove_path(&root.join("a/b/c/q")).unwrap();
        prune_empty_parents(root, "a/b/c/q").unwrap();

        assert!(!root.join("a/b").exists());
        assert!(root.join("a/keep.txt").exists());
    }

    #[test]
    fn prune_never_touches_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("questions");
        fs::create_dir_all(root.join("only/q")).unwrap();

        remove_path(&root.join("only/q")).unwrap();
        prune_empty_parents(&root, "only/q").unwrap();

        assert!(!root.join("only").exists());
        assert!(root.exists());
    }

    #[test]
    fn prune_folds_backslash_separators() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("topic/nested/q")).unwrap();

        remove_path(&root.join("topic/nested/q")).unwrap();
        prune_empty_parents(root, "topic\\nested\\q").unwrap();

        assert!(!root.join("topic").exists());
        assert_eq!(
            prune_empty_parents(root, "../q").unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
    }

    #[test]
    fn copy_refuses_existing_target() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src/sub")).unwrap();
        fs::write(tmp.path().join("src/sub/file.txt"), "x").unwrap();

        copy_dir_all(&tmp.path().join("src"), &tmp.path().join("dst")).unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join("dst/sub/file.txt")).unwrap(), "x");

        let error = copy_dir_all(&tmp.path().join("src"), &tmp.path().join("dst")).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn create_json_is_create_new() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/info.json");
        create_json(&path, &json!({"x": 1})).unwrap();
        let error = create_json(&path, &json!({"x": 2})).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(read_json_object(&path).unwrap()["x"], json!(1));
    }

    #[test]
    fn remove_missing_path_is_ok() {
        let tmp = TempDir::new().unwrap();
        remove_path(&tmp.path().join("nope")).unwrap();
    }

    #[test]
    fn resolve_id_rejects_traversal() {
        let dir = Path::new("/courses/cs101/questions");
        assert_eq!(resolve_id(dir, "topic/q1").unwrap(), dir.join("topic/q1"));
        assert!(matches!(resolve_id(dir, "../infoCourse.json"), Err(EditError::InvalidPath(_))));
        assert!(matches!(resolve_id(dir, ""), Err(EditError::InvalidPath(_))));
    }
}

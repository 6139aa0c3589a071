// Lexical path containment for file edits.
//
// All checks here are pure: nothing touches the filesystem, so they can run
// before any mutation is attempted.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContainmentError {
    #[error("path `{path}` must be inside the root directory `{root}`")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("path `{path}` must not be inside the directory `{excluded}`")]
    InsideExcluded { path: PathBuf, excluded: PathBuf },
}

/// Resolve `.` and `..` components without consulting the filesystem.
///
/// `..` never climbs above the root of an absolute path.
pub fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if popped {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether `candidate` lies strictly inside `root`.
///
/// Relative candidates are interpreted against `root`. The root itself is not
/// considered to be contained in itself.
pub fn contains(root: &Path, candidate: &Path) -> bool {
    let root = lexical_clean(root);
    let candidate = if candidate.is_absolute() {
        lexical_clean(candidate)
    } else {
        lexical_clean(&root.join(candidate))
    };
    candidate != root && candidate.starts_with(&root)
}

/// A root directory that file edits may touch, minus excluded subtrees.
///
/// At the course level the excluded set typically holds `questions/` and
/// `courseInstances/`, which have their own dedicated editors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContainer {
    pub root_path: PathBuf,
    pub invalid_root_paths: Vec<PathBuf>,
}

impl FileContainer {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self { root_path: root_path.into(), invalid_root_paths: Vec::new() }
    }

    pub fn excluding(mut self, path: impl Into<PathBuf>) -> Self {
        self.invalid_root_paths.push(path.into());
        self
    }

    /// Absolute, cleaned form of `path` as seen from this container.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            lexical_clean(path)
        } else {
            lexical_clean(&self.root_path.join(path))
        }
    }

    /// Fail unless `path` is inside the root and outside every excluded directory.
    pub fn check(&self, path: &Path) -> Result<(), ContainmentError> {
        let resolved = self.resolve(path);
        if !contains(&self.root_path, &resolved) {
            return Err(ContainmentError::OutsideRoot {
                path: resolved,
                root: self.root_path.clone(),
            });
        }

        if let Some(excluded) =
            self.invalid_root_paths.iter().find(|invalid| {
                let invalid = lexical_clean(invalid);
                resolved == invalid || contains(&invalid, &resolved)
            })
        {
            return Err(ContainmentError::InsideExcluded {
                path: resolved,
                excluded: excluded.clone(),
            });
        }

        Ok(())
    }
}

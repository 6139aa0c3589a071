// Course-relative path canonicalization: NFC normalization, traversal rejection, 512 char max.

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Maximum allowed path length in characters.
const MAX_PATH_CHARS: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path exceeds maximum length of {MAX_PATH_CHARS} characters")]
    TooLong,

    #[error("path contains directory traversal component: {0}")]
    Traversal(String),

    #[error("path contains null byte")]
    NullByte,

    #[error("path contains invalid component: {0}")]
    InvalidComponent(String),
}

/// Normalize a caller-supplied path relative to a course directory.
///
/// Used for question ids, assessment ids, course instance ids and file names
/// inside a content directory, all of which may contain `/` for nesting.
///
/// Rules:
/// - Apply Unicode NFC normalization
/// - Convert all separators to `/`
/// - Collapse consecutive `/` into one
/// - Strip leading and trailing `/`
/// - Reject `.` and `..` path components (traversal)
/// - Reject null bytes
/// - Reject empty paths
/// - Enforce max 512 character limit (after normalization)
pub fn normalize_path(input: &str) -> Result<String, PathError> {
    if input.is_empty() {
        return Err(PathError::Empty);
    }

    if input.contains('\0') {
        return Err(PathError::NullByte);
    }

    let normalized: String = input.nfc().collect();
    let unified = normalized.replace('\\', "/");

    let components: Vec<&str> = unified.split('/').filter(|s| !s.is_empty()).collect();

    if components.is_empty() {
        return Err(PathError::Empty);
    }

    for component in &components {
        if *component == "." || *component == ".." {
            return Err(PathError::Traversal((*component).to_string()));
        }
        if component.trim().is_empty() {
            return Err(PathError::InvalidComponent(
                "(whitespace-only component)".to_string(),
            ));
        }
    }

    let result = components.join("/");

    if result.chars().count() > MAX_PATH_CHARS {
        return Err(PathError::TooLong);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_question_id_is_kept() {
        assert_eq!(normalize_path("demo/calculation").unwrap(), "demo/calculation");
    }

    #[test]
    fn backslashes_become_forward_slashes() {
        assert_eq!(normalize_path("demo\\nested\\q1").unwrap(), "demo/nested/q1");
    }

    #[test]
    fn leading_and_trailing_slashes_are_stripped() {
        assert_eq!(normalize_path("/clientFilesQuestion/data.csv/").unwrap(), "clientFilesQuestion/data.csv");
    }

    #[test]
    fn consecutive_slashes_collapse() {
        assert_eq!(normalize_path("a///b//c.json").unwrap(), "a/b/c.json");
    }

    #[test]
    fn combining_sequences_compose() {
        let decomposed = normalize_path("questions/caf\u{0065}\u{0301}").unwrap();
        let composed = normalize_path("questions/café").unwrap();
        assert_eq!(decomposed, composed);
    }

    #[test]
    fn compatibility_characters_are_left_alone() {
        // NFC keeps the fi ligature; only canonical equivalents are merged.
        assert_eq!(normalize_path("\u{FB01}le.txt").unwrap(), "\u{FB01}le.txt");
    }

    #[test]
    fn rejects_dotdot() {
        assert_eq!(normalize_path("q/../../etc"), Err(PathError::Traversal("..".to_string())));
    }

    #[test]
    fn rejects_dot_component() {
        assert_eq!(normalize_path("q/./info.json"), Err(PathError::Traversal(".".to_string())));
    }

    #[test]
    fn rejects_backslash_traversal() {
        assert_eq!(normalize_path("q\\..\\secret"), Err(PathError::Traversal("..".to_string())));
    }

    #[test]
    fn rejects_empty_and_slash_only() {
        assert_eq!(normalize_path(""), Err(PathError::Empty));
        assert_eq!(normalize_path("///"), Err(PathError::Empty));
    }

    #[test]
    fn rejects_null_byte() {
        assert_eq!(normalize_path("q/info\0.json"), Err(PathError::NullByte));
    }

    #[test]
    fn rejects_whitespace_component() {
        assert!(matches!(normalize_path("q/  /info.json"), Err(PathError::InvalidComponent(_))));
    }

    #[test]
    fn enforces_length_limit() {
        assert!(normalize_path(&"a".repeat(512)).is_ok());
        assert_eq!(normalize_path(&"a".repeat(513)), Err(PathError::TooLong));
    }

    #[test]
    fn dotfiles_and_triple_dots_are_valid() {
        assert_eq!(normalize_path(".gitignore").unwrap(), ".gitignore");
        assert_eq!(normalize_path("q/...").unwrap(), "q/...");
    }
}

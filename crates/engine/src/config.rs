// Local configuration for the editing engine.
//
// Global config: `~/.coursesmith/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lock::DEFAULT_LOCK_TIMEOUT;

/// Root directory for coursesmith global state: `~/.coursesmith/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".coursesmith"))
}

/// Path to the global config file: `~/.coursesmith/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Template copied by question-add, relative to the example course.
pub const TEMPLATE_QUESTION_RELATIVE: &str = "questions/demo/calculation";

/// Engine configuration at `~/.coursesmith/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    pub git: GitSettings,
    pub lock: LockSettings,
    pub paths: PathSettings,
    /// Default author when the CLI is not told who is editing.
    pub identity: IdentitySettings,
}

impl EditorConfig {
    /// Load from `~/.coursesmith/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load from `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(error.into()),
        }
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Template question directory used by question-add.
    pub fn template_question(&self) -> Option<PathBuf> {
        self.paths.template_question.clone().or_else(|| {
            self.paths.example_course.as_ref().map(|course| course.join(TEMPLATE_QUESTION_RELATIVE))
        })
    }

    /// Course store database location.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.paths.database.clone().or_else(|| global_dir().map(|d| d.join("courses.db")))
    }

    /// Whether `root` is the protected example course.
    pub fn is_example_course(&self, root: &Path) -> bool {
        self.paths.example_course.as_deref().is_some_and(|example| example == root)
    }
}

/// Git behavior for edits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GitSettings {
    /// Commit and push edits. When off, edits are written and synced only.
    pub use_git: bool,
    /// Value for `GIT_SSH_COMMAND`, passed per invocation.
    pub ssh_command: Option<String>,
    /// Remote name (defaults to `"origin"`).
    pub remote: String,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self { use_git: true, ssh_command: None, remote: "origin".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LockSettings {
    /// How long an edit waits for the course lock.
    pub timeout_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self { timeout_ms: DEFAULT_LOCK_TIMEOUT.as_millis() as u64 }
    }
}

impl LockSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathSettings {
    /// Root of the read-only example course.
    pub example_course: Option<PathBuf>,
    /// Overrides `<example_course>/questions/demo/calculation`.
    pub template_question: Option<PathBuf>,
    /// Overrides `~/.coursesmith/courses.db`.
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IdentitySettings {
    pub name: Option<String>,
    pub email: Option<String>,
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

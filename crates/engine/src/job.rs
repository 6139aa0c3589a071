// Edit jobs: the tracked unit of work for one edit request.
//
// A job carries a sequence id, an append-only narration log, and the small
// result bag the request layer inspects afterwards. Jobs are never retried or
// resumed once finished.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLogLine {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Success,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Result flags read by the caller once the job finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobData {
    pub save_attempted: bool,
    pub save_succeeded: bool,
    pub sync_attempted: bool,
    pub sync_succeeded: bool,
}

/// Point-in-time copy of a job, suitable for persisting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub course_id: String,
    pub description: String,
    pub user_uid: String,
    pub authn_user_uid: String,
    pub status: JobStatus,
    pub data: JobData,
    pub log: Vec<JobLogLine>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct JobState {
    snapshot: JobSnapshot,
}

/// Shared handle to one edit job. Clones refer to the same job.
#[derive(Debug, Clone)]
pub struct EditJob {
    state: Arc<Mutex<JobState>>,
    cancel: Arc<watch::Sender<bool>>,
}

impl EditJob {
    pub fn new(
        course_id: impl Into<String>,
        description: impl Into<String>,
        user_uid: impl Into<String>,
        authn_user_uid: impl Into<String>,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        let snapshot = JobSnapshot {
            id: Uuid::new_v4(),
            course_id: course_id.into(),
            description: description.into(),
            user_uid: user_uid.into(),
            authn_user_uid: authn_user_uid.into(),
            status: JobStatus::Running,
            data: JobData::default(),
            log: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
        };
        Self { state: Arc::new(Mutex::new(JobState { snapshot })), cancel: Arc::new(cancel) }
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The job sequence id surfaced to users for diagnostics.
    pub fn id(&self) -> Uuid {
        self.state().snapshot.id
    }

    pub fn description(&self) -> String {
        self.state().snapshot.description.clone()
    }

    fn push(&self, level: LogLevel, message: String) {
        let id = self.id();
        match level {
            LogLevel::Info => info!(job = %id, "{message}"),
            LogLevel::Warn => warn!(job = %id, "{message}"),
            LogLevel::Error => error!(job = %id, "{message}"),
        }
        self.state().snapshot.log.push(JobLogLine { at: Utc::now(), level, message });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message.into());
    }

    pub fn log(&self) -> Vec<JobLogLine> {
        self.state().snapshot.log.clone()
    }

    pub fn data(&self) -> JobData {
        self.state().snapshot.data
    }

    pub fn update_data(&self, update: impl FnOnce(&mut JobData)) {
        update(&mut self.state().snapshot.data);
    }

    pub fn status(&self) -> JobStatus {
        self.state().snapshot.status
    }

    /// Move the job to its terminal state. Later calls are ignored.
    pub fn finish(&self, status: JobStatus) {
        let mut state = self.state();
        if state.snapshot.status != JobStatus::Running {
            return;
        }
        state.snapshot.status = status;
        state.snapshot.finished_at = Some(Utc::now());
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.state().snapshot.clone()
    }

    /// Handle the request layer can use to cancel this job.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle { sender: self.cancel.clone() }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut receiver = self.cancel.subscribe();
        // The sender lives as long as this job, so the wait cannot fail.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

/// Requests cancellation of a running job.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

// Named, timeout-bounded mutual exclusion keyed by course path.
//
// Every mutation of a course working copy runs while holding the lock named
// after the course root. Edits to the same course serialize; edits to
// different courses proceed concurrently. The lock is released when the
// returned `ScopedLock` is dropped, on every exit path.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

/// Default bound on lock acquisition.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("timed out after {} ms waiting for lock `{name}`", .timeout.as_millis())]
    Timeout { name: String, timeout: Duration },
}

/// Lock name for a course working copy.
pub fn lock_name_for_course_path(root: &Path) -> String {
    format!("coursedir:{}", root.display())
}

type LockSlot = Arc<tokio::sync::Mutex<()>>;

/// Registry of named locks shared by everything editing courses in this process.
#[derive(Debug, Clone, Default)]
pub struct NamedLocks {
    slots: Arc<Mutex<HashMap<String, LockSlot>>>,
}

impl NamedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    // Slots are never evicted: there is one per course path this process edits.
    fn slot(&self, name: &str) -> LockSlot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(name.to_string()).or_default().clone()
    }

    /// Wait for the named lock, giving up after `timeout`.
    ///
    /// Waiters are served in FIFO order.
    pub async fn acquire(&self, name: &str, timeout: Duration) -> Result<ScopedLock, LockError> {
        let slot = self.slot(name);
        match tokio::time::timeout(timeout, slot.lock_owned()).await {
            Ok(guard) => {
                debug!(lock = name, "acquired named lock");
                Ok(ScopedLock { name: name.to_string(), _guard: guard })
            }
            Err(_) => {
                debug!(lock = name, timeout_ms = timeout.as_millis() as u64, "named lock timed out");
                Err(LockError::Timeout { name: name.to_string(), timeout })
            }
        }
    }

    /// Whether someone currently holds the named lock.
    pub fn is_held(&self, name: &str) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(name).is_some_and(|slot| slot.try_lock().is_err())
    }
}

/// Proof of holding a named lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct ScopedLock {
    name: String,
    _guard: OwnedMutexGuard<()>,
}

impl ScopedLock {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ScopedLock {
    fn drop(&mut self) {
        debug!(lock = %self.name, "released named lock");
    }
}

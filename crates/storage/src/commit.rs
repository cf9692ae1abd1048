//! Commit futures
//!
//! `commit_artifact` returns immediately after the journal write; the
//! copy to permanent storage completes on a worker. The caller holds a
//! [`CommitFuture`] and may wait for it with or without a deadline.
//! Timing out does not cancel anything: the copy still completes (or is
//! re-driven by reload after a crash), and the operation is idempotent.

use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use warcstore_core::{Artifact, RepositoryError, Result};

// Completed value: the updated descriptor, None when deletion won, or the
// failure message of a copy that completed exceptionally.
type Outcome = std::result::Result<Option<Artifact>, String>;

#[derive(Debug)]
struct Shared {
    outcome: Mutex<Option<Outcome>>,
    done: Condvar,
}

/// Future of a commit's updated artifact descriptor
///
/// Resolves to `Some(artifact)` once the record is durable in permanent
/// storage, or `None` when the artifact was deleted (deletion wins).
#[derive(Clone, Debug)]
pub struct CommitFuture {
    shared: Arc<Shared>,
}

/// Completion side held by the copy task
pub(crate) struct CommitPromise {
    shared: Arc<Shared>,
}

impl CommitFuture {
    /// A future and its completion handle
    pub(crate) fn pending() -> (CommitFuture, CommitPromise) {
        let shared = Arc::new(Shared {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        });
        (
            CommitFuture {
                shared: Arc::clone(&shared),
            },
            CommitPromise { shared },
        )
    }

    /// An already-completed future (idempotent re-commit, deletion wins)
    pub(crate) fn resolved(outcome: std::result::Result<Option<Artifact>, String>) -> CommitFuture {
        let (future, promise) = CommitFuture::pending();
        promise.complete(outcome);
        future
    }

    /// Whether the commit has completed (successfully or not)
    pub fn is_complete(&self) -> bool {
        self.shared.outcome.lock().is_some()
    }

    /// Block until the commit completes
    pub fn wait(&self) -> Result<Option<Artifact>> {
        let mut outcome = self.shared.outcome.lock();
        while outcome.is_none() {
            self.shared.done.wait(&mut outcome);
        }
        Self::to_result(outcome.as_ref().expect("checked above"))
    }

    /// Wait up to `timeout`; `None` means the deadline passed with the
    /// copy still in progress
    pub fn wait_for(&self, timeout: Duration) -> Option<Result<Option<Artifact>>> {
        let mut outcome = self.shared.outcome.lock();
        if outcome.is_none() {
            self.shared.done.wait_for(&mut outcome, timeout);
        }
        outcome.as_ref().map(Self::to_result)
    }

    fn to_result(outcome: &Outcome) -> Result<Option<Artifact>> {
        match outcome {
            Ok(artifact) => Ok(artifact.clone()),
            Err(message) => Err(RepositoryError::Io(io::Error::other(message.clone()))),
        }
    }
}

impl CommitPromise {
    /// Complete the future, waking all waiters
    pub(crate) fn complete(self, outcome: Outcome) {
        let mut slot = self.shared.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.shared.done.notify_all();
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a batch job.
///
/// `created → validating → in_progress → finalizing → completed`, with
/// `failed` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Validating,
    InProgress,
    Finalizing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    // Position along the happy path. `Failed` sits outside it.
    fn rank(self) -> u8 {
        match self {
            JobStatus::Created => 0,
            JobStatus::Validating => 1,
            JobStatus::InProgress => 2,
            JobStatus::Finalizing => 3,
            JobStatus::Completed => 4,
            JobStatus::Failed => u8::MAX,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Validating => "validating",
            JobStatus::InProgress => "in_progress",
            JobStatus::Finalizing => "finalizing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Provider status, already folded into the generic lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteState {
    Validating,
    InProgress,
    Finalizing,
    Completed,
    Failed(String),
}

/// What an adapter reports from one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub state: RemoteState,
    /// The provider's own status string, kept for display and debugging.
    pub raw: String,
}

impl RemoteStatus {
    pub fn new(state: RemoteState, raw: impl Into<String>) -> Self {
        Self {
            state,
            raw: raw.into(),
        }
    }
}

/// The result of applying a remote status to a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Move forward to a new status.
    Advance(JobStatus),
    /// Remote job failed; carries the reason.
    Fail(String),
    /// Nothing to change: same state, a stale report, or already terminal.
    Stay,
}

/// Maps provider observations onto the job lifecycle.
pub struct StateMachine;

impl StateMachine {
    /// Computes the transition for a job currently in `current` given a
    /// freshly polled remote state.
    ///
    /// - Terminal statuses never change.
    /// - Forward moves may skip stages when polls are sparse.
    /// - A report behind the current status is ignored.
    pub fn next(current: JobStatus, remote: &RemoteState) -> Transition {
        if current.is_terminal() {
            return Transition::Stay;
        }
        let target = match remote {
            RemoteState::Failed(reason) => return Transition::Fail(reason.clone()),
            RemoteState::Validating => JobStatus::Validating,
            RemoteState::InProgress => JobStatus::InProgress,
            RemoteState::Finalizing => JobStatus::Finalizing,
            RemoteState::Completed => JobStatus::Completed,
        };
        if target.rank() > current.rank() {
            Transition::Advance(target)
        } else {
            Transition::Stay
        }
    }

    /// Status after a transition has been applied.
    pub fn resolve(current: JobStatus, transition: &Transition) -> JobStatus {
        match transition {
            Transition::Advance(next) => *next,
            Transition::Fail(_) => JobStatus::Failed,
            Transition::Stay => current,
        }
    }
}

//! Job lifecycle states

/// Lifecycle state of a transcode job
///
/// ```text
/// Created ──► Starting ──► Running ──► Stopping ──► Stopped
///                │            │           │
///                │            │           └──► Stopped
///                └────────────┴──► Failed
/// ```
///
/// `Stopped` and `Failed` are terminal. A stop requested before the job
/// reaches `Running` still converges to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Job object exists, subprocess not yet launched
    Created,
    /// Subprocess launched, encoding not yet confirmed
    Starting,
    /// Subprocess confirmed encoding; output is being produced
    Running,
    /// Termination requested, awaiting subprocess exit
    Stopping,
    /// Subprocess exited after a stop request (or ran to completion)
    Stopped,
    /// Subprocess failed or exited unexpectedly without a stop request
    Failed,
}

impl JobState {
    /// Whether the job has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Stopped | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Created => "created",
            JobState::Starting => "starting",
            JobState::Running => "running",
            JobState::Stopping => "stopping",
            JobState::Stopped => "stopped",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

// Scheduled-job bookkeeping types shared by the runner and the scheduler.

use std::fmt;

/// Opaque handle to a job registered with a runner. Process-local and never
/// reused within one runner's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle(pub u64);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Why a deletion job was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// The link's own lifetime elapsed.
    ExpiryDeletion,
    /// Staged by a downgrade cleanup; fires when the subscription window
    /// runs out.
    DowngradeDeletion,
}

/// One outstanding deletion job as the scheduler tracks it.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub handle: JobHandle,
    pub owner: String,
    pub short_code: String,
    pub kind: JobKind,
}

// One-shot job runner backing the lifecycle scheduler.
//
// The contract mirrors a cron-style engine (schedule / cancel / last-fired)
// but the shipped implementation is a genuine one-shot delay queue: one
// spawned task per job sleeping until its fire instant. Fired entries stay
// in the handle table until cancelled, so the scheduler's periodic sweep
// still has something to reclaim regardless of which runner is plugged in.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::models::job::JobHandle;

// =============================================================================
// TYPES
// =============================================================================

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Deferred job body. Invoked at most once, on the job's own task; a stuck
/// body blocks only that task.
pub type JobFn = Box<dyn FnOnce() -> JobFuture + Send>;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to register job: {0}")]
    Schedule(String),
}

/// Capability interface the scheduler drives.
pub trait JobRunner: Send + Sync {
    /// Register a one-shot job firing once `delay` has elapsed.
    fn schedule_once(&self, delay: Duration, job: JobFn) -> Result<JobHandle, RunnerError>;

    /// Drop the job from the runner's table, aborting it if it has not fired
    /// yet. Unknown handles are ignored.
    fn cancel(&self, handle: JobHandle);

    /// When the job fired, or `None` if it has not executed (or the handle
    /// is unknown).
    fn last_fired(&self, handle: JobHandle) -> Option<DateTime<Utc>>;
}

// =============================================================================
// TOKIO IMPLEMENTATION
// =============================================================================

struct JobEntry {
    fired_at: Option<DateTime<Utc>>,
    task: Option<JoinHandle<()>>,
}

/// Tokio-backed one-shot runner. Handles are process-local and never reused.
pub struct TokioJobRunner {
    jobs: Arc<RwLock<HashMap<JobHandle, JobEntry>>>,
    next_id: AtomicU64,
}

impl Default for TokioJobRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioJobRunner {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of entries in the handle table, fired or not.
    pub fn job_count(&self) -> usize {
        match self.jobs.read() {
            Ok(jobs) => jobs.len(),
            Err(e) => {
                error!("Failed to acquire read lock on job table: {}", e);
                0
            },
        }
    }
}

impl JobRunner for TokioJobRunner {
    fn schedule_once(&self, delay: Duration, job: JobFn) -> Result<JobHandle, RunnerError> {
        let handle = JobHandle(self.next_id.fetch_add(1, Ordering::Relaxed));

        {
            let mut jobs = self
                .jobs
                .write()
                .map_err(|e| RunnerError::Schedule(e.to_string()))?;
            jobs.insert(
                handle,
                JobEntry {
                    fired_at: None,
                    task: None,
                },
            );
        }

        let table = Arc::clone(&self.jobs);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // A concurrent cancel may have dropped the entry between the
            // abort landing and this task waking up; fire only if it is
            // still registered.
            let registered = match table.write() {
                Ok(mut jobs) => match jobs.get_mut(&handle) {
                    Some(entry) => {
                        entry.fired_at = Some(Utc::now());
                        true
                    },
                    None => false,
                },
                Err(e) => {
                    error!("Job table lock poisoned, skipping {}: {}", handle, e);
                    false
                },
            };

            if registered {
                debug!("Firing one-shot {}", handle);
                job().await;
            }
        });

        if let Ok(mut jobs) = self.jobs.write() {
            if let Some(entry) = jobs.get_mut(&handle) {
                entry.task = Some(task);
            }
        }

        Ok(handle)
    }

    fn cancel(&self, handle: JobHandle) {
        let entry = match self.jobs.write() {
            Ok(mut jobs) => jobs.remove(&handle),
            Err(e) => {
                error!("Failed to acquire write lock cancelling {}: {}", handle, e);
                None
            },
        };

        if let Some(entry) = entry {
            if let Some(task) = entry.task {
                // No-op for tasks that already ran to completion.
                task.abort();
            }
            debug!("Cancelled {}", handle);
        }
    }

    fn last_fired(&self, handle: JobHandle) -> Option<DateTime<Utc>> {
        match self.jobs.read() {
            Ok(jobs) => jobs.get(&handle).and_then(|entry| entry.fired_at),
            Err(e) => {
                error!("Failed to acquire read lock on job table: {}", e);
                None
            },
        }
    }
}

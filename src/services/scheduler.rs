// Subscription-aware link-lifecycle scheduler.
//
// Owns the job table: one flat list of expiry deletions plus a per-user
// table of staged downgrade-cleanup jobs (SubscriptionWindow). All state is
// injected and torn down through an explicit shutdown hook; locks are held
// for map access only, never across runner or repository calls.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::models::job::{JobHandle, JobKind, ScheduledJob};
use crate::models::subscription::{SubscriptionWindow, TierQuota};
use crate::repository::{LinkRepository, RepositoryError};
use crate::services::quota;
use crate::services::runner::{JobFn, JobRunner, RunnerError};

// =============================================================================
// ERROR TYPES
// =============================================================================

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Job runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Cancellation requested for a user with no staged cleanup. Non-fatal:
    /// callers log it and continue.
    #[error("No pending cleanup for user {0}")]
    NoPendingCleanup(String),

    #[error("Scheduler state lock poisoned")]
    LockPoisoned,
}

// =============================================================================
// SCHEDULER
// =============================================================================

pub struct LifecycleScheduler {
    runner: Arc<dyn JobRunner>,
    links: Arc<dyn LinkRepository>,
    /// Flat per-process list of outstanding expiry deletions.
    expiry_jobs: RwLock<Vec<ScheduledJob>>,
    /// Staged downgrade cleanups keyed by username. A user appears here only
    /// while at least one of their jobs is outstanding.
    windows: RwLock<HashMap<String, SubscriptionWindow>>,
}

impl LifecycleScheduler {
    pub fn new(runner: Arc<dyn JobRunner>, links: Arc<dyn LinkRepository>) -> Self {
        Self {
            runner,
            links,
            expiry_jobs: RwLock::new(Vec::new()),
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Deletion callback bound to one link. Failures are logged; the job has
    /// fired either way and the next sweep reclaims its handle.
    fn deletion_job(&self, short_code: &str, owner: &str) -> JobFn {
        let links = Arc::clone(&self.links);
        let code = short_code.to_string();
        let owner = owner.to_string();

        Box::new(move || {
            Box::pin(async move {
                match links.delete(&code, &owner).await {
                    Ok(()) => debug!("Scheduled deletion removed link {} of {}", code, owner),
                    Err(e) => {
                        error!("Scheduled deletion of link {} for {} failed: {}", code, owner, e)
                    },
                }
            })
        })
    }

    // =========================================================================
    // EXPIRY SCHEDULING
    // =========================================================================

    /// Register a one-shot deletion firing once `lifetime` elapses. Used for
    /// links stored in container types the backend cannot expire per-field.
    ///
    /// Any previous expiry job for the same (owner, code) pair is cancelled
    /// first. On runner failure the error propagates and no bookkeeping is
    /// left behind.
    pub fn schedule_expiry(
        &self,
        short_code: &str,
        owner: &str,
        lifetime: Duration,
    ) -> Result<JobHandle, SchedulerError> {
        let stale = {
            let mut jobs = self
                .expiry_jobs
                .write()
                .map_err(|_| SchedulerError::LockPoisoned)?;
            jobs.iter()
                .position(|j| {
                    j.owner == owner && j.short_code == short_code && j.kind == JobKind::ExpiryDeletion
                })
                .map(|idx| jobs.remove(idx))
        };
        if let Some(job) = stale {
            self.runner.cancel(job.handle);
        }

        let handle = self
            .runner
            .schedule_once(lifetime, self.deletion_job(short_code, owner))?;

        let mut jobs = self
            .expiry_jobs
            .write()
            .map_err(|_| SchedulerError::LockPoisoned)?;
        jobs.push(ScheduledJob {
            handle,
            owner: owner.to_string(),
            short_code: short_code.to_string(),
            kind: JobKind::ExpiryDeletion,
        });

        debug!(
            "Scheduled expiry deletion of link {} for {} in {:?} ({})",
            short_code, owner, lifetime, handle
        );
        Ok(handle)
    }

    // =========================================================================
    // SWEEP
    // =========================================================================

    /// Reclaim every job that already fired, from the runner's table and
    /// from local bookkeeping. One-shot jobs are not removed by the runner
    /// on firing, so without this the job table grows for the lifetime of
    /// the process. Jobs that have not fired are never touched.
    pub fn sweep(&self) {
        let mut handles: Vec<JobHandle> = Vec::new();
        match self.expiry_jobs.read() {
            Ok(jobs) => handles.extend(jobs.iter().map(|j| j.handle)),
            Err(e) => {
                error!("Sweep skipped, expiry job lock poisoned: {}", e);
                return;
            },
        }
        match self.windows.read() {
            Ok(windows) => {
                handles.extend(
                    windows
                        .values()
                        .flat_map(|w| w.pending_jobs.iter().map(|j| j.handle)),
                );
            },
            Err(e) => {
                error!("Sweep skipped, window lock poisoned: {}", e);
                return;
            },
        }

        // Lock released: query the runner, then prune under the lock again.
        let fired: HashSet<JobHandle> = handles
            .into_iter()
            .filter(|h| self.runner.last_fired(*h).is_some())
            .collect();
        if fired.is_empty() {
            return;
        }

        if let Ok(mut jobs) = self.expiry_jobs.write() {
            jobs.retain(|j| !fired.contains(&j.handle));
        }
        if let Ok(mut windows) = self.windows.write() {
            for window in windows.values_mut() {
                window.pending_jobs.retain(|j| !fired.contains(&j.handle));
            }
            windows.retain(|_, w| !w.pending_jobs.is_empty());
        }

        for handle in &fired {
            self.runner.cancel(*handle);
        }
        info!("Sweep reclaimed {} fired jobs", fired.len());
    }

    // =========================================================================
    // DOWNGRADE CLEANUP
    // =========================================================================

    /// Stage deletion of every link exceeding free-tier quotas, firing once
    /// `remaining` (the user's current entitlement) elapses. The resulting
    /// window replaces any previously staged one, whose jobs are cancelled.
    ///
    /// Repository failures abort before anything is scheduled. A runner
    /// failure mid-loop aborts the rest and surfaces the error; jobs already
    /// staged by that call stay recorded so they remain cancellable.
    pub async fn schedule_downgrade_cleanup(
        &self,
        owner: &str,
        remaining: Duration,
    ) -> Result<usize, SchedulerError> {
        let listing = self.links.list_all(owner).await?;

        let victims = quota::select_downgrade_victims(&listing, &TierQuota::free());

        let mut staged: Vec<ScheduledJob> = Vec::with_capacity(victims.len());
        let mut failure: Option<RunnerError> = None;
        for code in victims {
            match self
                .runner
                .schedule_once(remaining, self.deletion_job(&code, owner))
            {
                Ok(handle) => staged.push(ScheduledJob {
                    handle,
                    owner: owner.to_string(),
                    short_code: code,
                    kind: JobKind::DowngradeDeletion,
                }),
                Err(e) => {
                    error!("Staging downgrade deletion of {} for {} failed: {}", code, owner, e);
                    failure = Some(e);
                    break;
                },
            }
        }

        let staged_count = staged.len();
        let previous = {
            let mut windows = self
                .windows
                .write()
                .map_err(|_| SchedulerError::LockPoisoned)?;
            let previous = windows.remove(owner);
            if !staged.is_empty() {
                windows.insert(
                    owner.to_string(),
                    SubscriptionWindow {
                        remaining,
                        pending_jobs: staged,
                    },
                );
            }
            previous
        };
        if let Some(window) = previous {
            for job in window.pending_jobs {
                self.runner.cancel(job.handle);
            }
        }

        match failure {
            Some(e) => Err(e.into()),
            None => {
                info!(
                    "Staged {} downgrade deletions for {} firing in {:?}",
                    staged_count, owner, remaining
                );
                Ok(staged_count)
            },
        }
    }

    /// Cancel every staged cleanup job for `owner` and drop the window.
    /// Called on resubscription so stale deletions never fire against a
    /// now-longer entitlement.
    pub fn cancel_pending_cleanup(&self, owner: &str) -> Result<usize, SchedulerError> {
        let window = self
            .windows
            .write()
            .map_err(|_| SchedulerError::LockPoisoned)?
            .remove(owner)
            .ok_or_else(|| SchedulerError::NoPendingCleanup(owner.to_string()))?;

        let cancelled = window.pending_jobs.len();
        for job in window.pending_jobs {
            self.runner.cancel(job.handle);
        }

        info!("Cancelled {} staged deletions for {}", cancelled, owner);
        Ok(cancelled)
    }

    // =========================================================================
    // TEARDOWN & INTROSPECTION
    // =========================================================================

    /// Drain and cancel every outstanding job. Called once at shutdown.
    pub fn shutdown(&self) {
        let expiry: Vec<ScheduledJob> = match self.expiry_jobs.write() {
            Ok(mut jobs) => jobs.drain(..).collect(),
            Err(e) => {
                warn!("Expiry job lock poisoned during shutdown: {}", e);
                Vec::new()
            },
        };
        let windows: Vec<SubscriptionWindow> = match self.windows.write() {
            Ok(mut windows) => windows.drain().map(|(_, w)| w).collect(),
            Err(e) => {
                warn!("Window lock poisoned during shutdown: {}", e);
                Vec::new()
            },
        };

        let mut cancelled = 0usize;
        for job in expiry {
            self.runner.cancel(job.handle);
            cancelled += 1;
        }
        for window in windows {
            for job in window.pending_jobs {
                self.runner.cancel(job.handle);
                cancelled += 1;
            }
        }

        info!("Scheduler shutdown cancelled {} outstanding jobs", cancelled);
    }

    /// Outstanding expiry jobs, fired ones included until swept.
    pub fn expiry_job_count(&self) -> usize {
        self.expiry_jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    /// Number of staged cleanup jobs for `owner`, or `None` if no window
    /// exists.
    pub fn pending_cleanup_count(&self, owner: &str) -> Option<usize> {
        self.windows
            .read()
            .ok()
            .and_then(|windows| windows.get(owner).map(|w| w.pending_jobs.len()))
    }
}

// Services module for the lifecycle core.
// Business logic layer: scheduling, quota policy, billing reconciliation.

pub mod background_tasks;
pub mod billing;
pub mod link;
pub mod quota;
pub mod runner;
pub mod scheduler;

// Re-export commonly used services
pub use background_tasks::{
    spawn_reconciliation_loop, spawn_sweep_loop, start_background_tasks, BackgroundTasks,
    StopHandle,
};
pub use billing::{BillingError, BillingGateway, BillingService, GatewayError, QiwiBillingGateway};
pub use link::{LinkError, LinkLifecycleService};
pub use quota::{check_creation, select_downgrade_victims, AdmissionError};
pub use runner::{JobFn, JobFuture, JobRunner, RunnerError, TokioJobRunner};
pub use scheduler::{LifecycleScheduler, SchedulerError};

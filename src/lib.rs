// Library exports for the link-lifecycle core.
// This crate owns the subscription-aware scheduler, the tier quota policy
// and the billing reconciliation loop of a short-link service; storage
// backends and the HTTP surface are injected by the embedding application.

pub mod app_config;
pub mod models;
pub mod repository;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use app_config::{AppConfig, ConfigError, CONFIG};
pub use models::{
    BillNotification, CreateLinkRequest, CreatedInvoice, InvoiceStatus, JobHandle, JobKind,
    LinkCounts, LinkRecord, PendingInvoice, PlanPrices, RequestedLifetime, ScheduledJob,
    SubscriptionPlan,
    SubscriptionTier, SubscriptionWindow, TierQuota,
};
pub use repository::{LinkRepository, RepositoryError, SubscriptionStore};
pub use services::{
    AdmissionError, BackgroundTasks, BillingError, BillingGateway, BillingService, GatewayError,
    JobRunner, LifecycleScheduler, LinkError, LinkLifecycleService, QiwiBillingGateway,
    RunnerError, SchedulerError, StopHandle, TokioJobRunner,
};
pub use utils::signature::{sign_payload, verify_signature};

pub mod billing;
pub mod job;
pub mod link;
pub mod subscription;

// Re-export common types
pub use billing::{BillNotification, CreatedInvoice, InvoiceStatus, PendingInvoice};
pub use job::{JobHandle, JobKind, ScheduledJob};
pub use link::{CreateLinkRequest, LinkCounts, LinkRecord, RequestedLifetime};
pub use subscription::{
    PlanPrices, SubscriptionPlan, SubscriptionTier, SubscriptionWindow, TierQuota,
};

// Subscription tiers, quotas, purchasable plans and per-user cleanup state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::job::ScheduledJob;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

// =============================================================================
// TIERS & QUOTAS
// =============================================================================

/// Subscription tier a user currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionTier {
    Free,
    Paid,
}

impl SubscriptionTier {
    pub fn quota(&self) -> TierQuota {
        match self {
            SubscriptionTier::Free => TierQuota::free(),
            SubscriptionTier::Paid => TierQuota::paid(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Paid => "paid",
        }
    }
}

/// Link quotas attached to a subscription tier. Policy constants, not
/// computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierQuota {
    /// Maximum total links per user.
    pub max_all: usize,
    /// Maximum custom-alias links per user.
    pub max_custom: usize,
    /// Maximum permanent (never-expiring) links per user.
    pub max_permanent: usize,
}

impl TierQuota {
    /// Quota for the free tier. Permanent links are a subscriber feature.
    pub fn free() -> Self {
        Self {
            max_all: 50,
            max_custom: 15,
            max_permanent: 0,
        }
    }

    /// Quota for the paid tier.
    pub fn paid() -> Self {
        Self {
            max_all: 100,
            max_custom: 30,
            max_permanent: 10,
        }
    }
}

// =============================================================================
// PLANS & PRICES
// =============================================================================

/// Purchasable subscription plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionPlan {
    Weekly,
    Monthly,
    Yearly,
}

impl SubscriptionPlan {
    /// Entitlement granted by one paid invoice for this plan.
    pub fn granted_duration(&self) -> Duration {
        match self {
            SubscriptionPlan::Weekly => 7 * DAY,
            SubscriptionPlan::Monthly => 31 * DAY,
            SubscriptionPlan::Yearly => 365 * DAY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Weekly => "weekly",
            SubscriptionPlan::Monthly => "monthly",
            SubscriptionPlan::Yearly => "yearly",
        }
    }
}

/// Invoice amounts per plan, loaded from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanPrices {
    pub weekly: f64,
    pub monthly: f64,
    pub yearly: f64,
}

impl PlanPrices {
    pub fn amount_for(&self, plan: SubscriptionPlan) -> f64 {
        match plan {
            SubscriptionPlan::Weekly => self.weekly,
            SubscriptionPlan::Monthly => self.monthly,
            SubscriptionPlan::Yearly => self.yearly,
        }
    }

    /// Reverse lookup used when only the billed amount is known.
    pub fn plan_for_amount(&self, amount: f64) -> Option<SubscriptionPlan> {
        if amount == self.weekly {
            Some(SubscriptionPlan::Weekly)
        } else if amount == self.monthly {
            Some(SubscriptionPlan::Monthly)
        } else if amount == self.yearly {
            Some(SubscriptionPlan::Yearly)
        } else {
            None
        }
    }
}

// =============================================================================
// PER-USER CLEANUP STATE
// =============================================================================

/// Downgrade-cleanup jobs currently staged for one user, keyed by username
/// in the scheduler. Created when a cleanup is staged, replaced on
/// re-subscription, removed once its jobs are cancelled or swept.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionWindow {
    /// Entitlement remaining when the cleanup was staged; the jobs fire once
    /// it elapses.
    pub remaining: Duration,
    pub pending_jobs: Vec<ScheduledJob>,
}

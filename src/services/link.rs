// Link lifecycle facade: quota-checked creation with expiry scheduling as
// a single logical unit, plus explicit deletion.

use std::sync::Arc;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, error};

use crate::models::link::{CreateLinkRequest, LinkRecord, RequestedLifetime};
use crate::models::subscription::SubscriptionTier;
use crate::repository::{LinkRepository, RepositoryError};
use crate::services::quota::{self, AdmissionError};
use crate::services::scheduler::{LifecycleScheduler, SchedulerError};

/// Length of generated short codes.
const CODE_LENGTH: usize = 8;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("{0}")]
    Admission(#[from] AdmissionError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

pub struct LinkLifecycleService {
    links: Arc<dyn LinkRepository>,
    scheduler: Arc<LifecycleScheduler>,
    /// Applied when a request gives no explicit lifetime
    /// (`RequestedLifetime::Default`), from `SchedulerConfig`.
    default_lifetime: Duration,
}

impl LinkLifecycleService {
    pub fn new(
        links: Arc<dyn LinkRepository>,
        scheduler: Arc<LifecycleScheduler>,
        default_lifetime: Duration,
    ) -> Self {
        Self {
            links,
            scheduler,
            default_lifetime,
        }
    }

    /// Create a link for `owner` under their tier's quota. Links with a
    /// finite lifetime get their expiry deletion scheduled as part of the
    /// same call: if scheduling fails, the freshly created record is deleted
    /// again and creation fails, so no link ever outlives its lifetime
    /// silently.
    pub async fn create_link(
        &self,
        request: CreateLinkRequest,
        owner: &str,
        tier: SubscriptionTier,
    ) -> Result<LinkRecord, LinkError> {
        let lifetime = match request.lifetime {
            RequestedLifetime::Permanent => None,
            RequestedLifetime::Default => Some(self.default_lifetime),
            RequestedLifetime::Finite(d) => Some(d),
        };

        let counts = self.links.count_by_category(owner).await?;
        quota::check_creation(
            &counts,
            &tier.quota(),
            lifetime.is_none(),
            request.custom_alias.is_some(),
        )?;

        let is_custom = request.custom_alias.is_some();
        let short_code = request.custom_alias.unwrap_or_else(random_code);

        let record = self
            .links
            .create(&short_code, owner, &request.full_url, lifetime, is_custom)
            .await?;

        if let Some(lifetime) = lifetime {
            if let Err(e) = self.scheduler.schedule_expiry(&short_code, owner, lifetime) {
                if let Err(cleanup) = self.links.delete(&short_code, owner).await {
                    error!(
                        "Rollback of link {} after scheduling failure also failed: {}",
                        short_code, cleanup
                    );
                }
                return Err(e.into());
            }
        }

        debug!("Created link {} for {} ({})", short_code, owner, tier.as_str());
        Ok(record)
    }

    pub async fn delete_link(&self, short_code: &str, owner: &str) -> Result<(), LinkError> {
        self.links.delete(short_code, owner).await?;
        Ok(())
    }
}

fn random_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_LENGTH)
        .map(char::from)
        .collect()
}

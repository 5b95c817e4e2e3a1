// Repository seams for the lifecycle services. The concrete key-value and
// user stores live outside this crate; implementations are injected.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::link::{LinkCounts, LinkRecord};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Record not found")]
    NotFound,

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Storage for link records.
///
/// `list_all` order is authoritative for the downgrade policy and must be
/// stable across calls; the repository's uniqueness constraint on
/// (owner, short_code) also serializes concurrent creation per link.
#[async_trait]
pub trait LinkRepository: Send + Sync {
    async fn create(
        &self,
        short_code: &str,
        owner: &str,
        full_url: &str,
        lifetime: Option<Duration>,
        is_custom: bool,
    ) -> Result<LinkRecord, RepositoryError>;

    async fn delete(&self, short_code: &str, owner: &str) -> Result<(), RepositoryError>;

    async fn find(&self, short_code: &str) -> Result<LinkRecord, RepositoryError>;

    /// Per-category counts for creation admission. Categories are disjoint:
    /// a permanent link counts under `permanent` only, even when it carries
    /// a custom alias; `custom` covers non-permanent custom-alias links.
    /// `all` is the total across every category.
    async fn count_by_category(&self, owner: &str) -> Result<LinkCounts, RepositoryError>;

    async fn list_all(&self, owner: &str) -> Result<Vec<LinkRecord>, RepositoryError>;
}

/// Storage for the current subscription expiry per username.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Remaining entitlement for the user, or `None` when no subscription
    /// exists (or it has already expired).
    async fn get(&self, owner: &str) -> Result<Option<Duration>, RepositoryError>;

    async fn set(&self, owner: &str, remaining: Duration) -> Result<(), RepositoryError>;
}

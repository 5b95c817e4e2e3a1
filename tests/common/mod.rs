// Shared test fixtures: in-memory repositories, a scripted billing gateway
// and a runner that refuses to schedule, for failure-path tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use linklife_core::services::runner::{JobFn, JobRunner, RunnerError};
use linklife_core::{
    CreatedInvoice, GatewayError, InvoiceStatus, JobHandle, LinkCounts, LinkRecord,
    LinkRepository, RepositoryError, SubscriptionStore,
};
use linklife_core::services::billing::BillingGateway;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("linklife_core=debug")
        .with_test_writer()
        .try_init();
}

// =============================================================================
// LINK REPOSITORY
// =============================================================================

/// Insertion-ordered in-memory link store. Listing order is creation order,
/// which the downgrade policy treats as authoritative.
#[derive(Default)]
pub struct InMemoryLinkRepository {
    links: Mutex<HashMap<String, Vec<LinkRecord>>>,
}

impl InMemoryLinkRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_link(&self, short_code: &str, owner: &str) -> bool {
        self.links
            .lock()
            .unwrap()
            .get(owner)
            .map(|links| links.iter().any(|l| l.short_code == short_code))
            .unwrap_or(false)
    }

    pub fn link_count(&self, owner: &str) -> usize {
        self.links
            .lock()
            .unwrap()
            .get(owner)
            .map(|links| links.len())
            .unwrap_or(0)
    }

    /// Seed a record directly, bypassing quota checks.
    pub fn seed(&self, owner: &str, record: LinkRecord) {
        self.links
            .lock()
            .unwrap()
            .entry(owner.to_string())
            .or_default()
            .push(record);
    }
}

pub fn make_link(code: &str, permanent: bool, custom: bool) -> LinkRecord {
    LinkRecord {
        short_code: code.to_string(),
        full_url: format!("https://example.com/{}", code),
        remaining_lifetime: if permanent {
            Duration::ZERO
        } else {
            Duration::from_secs(3600)
        },
        is_permanent: permanent,
        is_custom: custom,
    }
}

#[async_trait]
impl LinkRepository for InMemoryLinkRepository {
    async fn create(
        &self,
        short_code: &str,
        owner: &str,
        full_url: &str,
        lifetime: Option<Duration>,
        is_custom: bool,
    ) -> Result<LinkRecord, RepositoryError> {
        let mut links = self.links.lock().unwrap();
        let owned = links.entry(owner.to_string()).or_default();
        if owned.iter().any(|l| l.short_code == short_code) {
            return Err(RepositoryError::Backend(format!(
                "short code {} already exists",
                short_code
            )));
        }

        let record = LinkRecord {
            short_code: short_code.to_string(),
            full_url: full_url.to_string(),
            remaining_lifetime: lifetime.unwrap_or(Duration::ZERO),
            is_permanent: lifetime.is_none(),
            is_custom,
        };
        owned.push(record.clone());
        Ok(record)
    }

    async fn delete(&self, short_code: &str, owner: &str) -> Result<(), RepositoryError> {
        let mut links = self.links.lock().unwrap();
        let owned = links.get_mut(owner).ok_or(RepositoryError::NotFound)?;
        let before = owned.len();
        owned.retain(|l| l.short_code != short_code);
        if owned.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn find(&self, short_code: &str) -> Result<LinkRecord, RepositoryError> {
        let links = self.links.lock().unwrap();
        links
            .values()
            .flatten()
            .find(|l| l.short_code == short_code)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn count_by_category(&self, owner: &str) -> Result<LinkCounts, RepositoryError> {
        let links = self.links.lock().unwrap();
        let owned = links.get(owner).map(|v| v.as_slice()).unwrap_or(&[]);
        Ok(LinkCounts {
            all: owned.len(),
            permanent: owned.iter().filter(|l| l.is_permanent).count(),
            custom: owned.iter().filter(|l| l.is_custom && !l.is_permanent).count(),
        })
    }

    async fn list_all(&self, owner: &str) -> Result<Vec<LinkRecord>, RepositoryError> {
        let links = self.links.lock().unwrap();
        Ok(links.get(owner).cloned().unwrap_or_default())
    }
}

// =============================================================================
// SUBSCRIPTION STORE
// =============================================================================

#[derive(Default)]
pub struct InMemorySubscriptionStore {
    remaining: Mutex<HashMap<String, Duration>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn get(&self, owner: &str) -> Result<Option<Duration>, RepositoryError> {
        Ok(self.remaining.lock().unwrap().get(owner).copied())
    }

    async fn set(&self, owner: &str, remaining: Duration) -> Result<(), RepositoryError> {
        self.remaining
            .lock()
            .unwrap()
            .insert(owner.to_string(), remaining);
        Ok(())
    }
}

// =============================================================================
// BILLING GATEWAY
// =============================================================================

/// Gateway double whose invoice ids and statuses are scripted by the test.
#[derive(Default)]
pub struct ScriptedGateway {
    next_ids: Mutex<Vec<String>>,
    statuses: Mutex<HashMap<String, InvoiceStatus>>,
    created_amounts: Mutex<Vec<(String, f64)>>,
    fail_checks: AtomicBool,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the ids handed out by subsequent `create_invoice` calls, in
    /// order.
    pub fn with_ids(ids: &[&str]) -> Self {
        let gateway = Self::default();
        {
            let mut next = gateway.next_ids.lock().unwrap();
            // Popped from the back.
            for id in ids.iter().rev() {
                next.push(id.to_string());
            }
        }
        gateway
    }

    pub fn set_status(&self, bill_id: &str, status: InvoiceStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(bill_id.to_string(), status);
    }

    pub fn set_check_failure(&self, fail: bool) {
        self.fail_checks.store(fail, Ordering::SeqCst);
    }

    pub fn created_amounts(&self) -> Vec<(String, f64)> {
        self.created_amounts.lock().unwrap().clone()
    }
}

#[async_trait]
impl BillingGateway for ScriptedGateway {
    async fn create_invoice(&self, amount: f64) -> Result<CreatedInvoice, GatewayError> {
        let bill_id = self
            .next_ids
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        self.statuses
            .lock()
            .unwrap()
            .entry(bill_id.clone())
            .or_insert(InvoiceStatus::Waiting);
        self.created_amounts
            .lock()
            .unwrap()
            .push((bill_id.clone(), amount));

        Ok(CreatedInvoice {
            pay_url: format!("https://pay.example/{}", bill_id),
            bill_id,
        })
    }

    async fn check_invoice(&self, bill_id: &str) -> Result<InvoiceStatus, GatewayError> {
        if self.fail_checks.load(Ordering::SeqCst) {
            return Err(GatewayError::UnexpectedStatus(502));
        }

        self.statuses
            .lock()
            .unwrap()
            .get(bill_id)
            .cloned()
            .ok_or_else(|| GatewayError::Decode(format!("unknown bill {}", bill_id)))
    }
}

// =============================================================================
// RUNNER
// =============================================================================

/// Runner that rejects every schedule request.
pub struct FailingRunner;

impl JobRunner for FailingRunner {
    fn schedule_once(&self, _delay: Duration, _job: JobFn) -> Result<JobHandle, RunnerError> {
        Err(RunnerError::Schedule("runner unavailable".to_string()))
    }

    fn cancel(&self, _handle: JobHandle) {}

    fn last_fired(&self, _handle: JobHandle) -> Option<chrono::DateTime<chrono::Utc>> {
        None
    }
}

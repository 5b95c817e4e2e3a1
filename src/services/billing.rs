// Billing gateway client and the reconciliation service.
//
// The service holds the outstanding-invoice table and applies subscription
// state transitions when a terminal invoice status is observed, whether by
// the periodic polling loop or by an inbound signed webhook. The table lock
// is held for map access only; gateway I/O happens on copied-out state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::billing::{CreatedInvoice, InvoiceStatus, PendingInvoice};
use crate::models::billing::BillNotification;
use crate::models::subscription::{PlanPrices, SubscriptionPlan};
use crate::repository::{RepositoryError, SubscriptionStore};
use crate::services::scheduler::{LifecycleScheduler, SchedulerError};
use crate::utils::signature::verify_signature;

// =============================================================================
// ERROR TYPES
// =============================================================================

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway returned HTTP status {0}")]
    UnexpectedStatus(u16),

    #[error("Malformed gateway response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Billing gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// An invoice id was registered twice. Ids are gateway-generated UUIDs,
    /// so this indicates an upstream inconsistency.
    #[error("Invoice {0} is already registered")]
    DuplicateInvoice(String),

    /// A terminal status arrived for an invoice not in the outstanding
    /// table (already processed, or never registered here).
    #[error("Unknown invoice {0}")]
    UnknownInvoice(String),

    #[error("Webhook signature verification failed")]
    InvalidSignature,

    #[error("Billing state lock poisoned")]
    LockPoisoned,
}

// =============================================================================
// GATEWAY
// =============================================================================

/// External payment provider, narrowed to invoice creation and polling.
#[async_trait]
pub trait BillingGateway: Send + Sync {
    async fn create_invoice(&self, amount: f64) -> Result<CreatedInvoice, GatewayError>;

    async fn check_invoice(&self, bill_id: &str) -> Result<InvoiceStatus, GatewayError>;
}

/// Invoice creation request body (p2p bills API).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BillRequest {
    amount: BillAmount,
    comment: String,
    expiration_date_time: String,
    customer: EmptyFields,
    custom_fields: EmptyFields,
}

#[derive(Debug, Serialize)]
struct BillAmount {
    currency: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct EmptyFields {}

/// Invoice state as the gateway reports it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BillStatusResponse {
    status: BillStatusField,
    pay_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BillStatusField {
    value: String,
}

/// How long a created invoice stays payable.
const INVOICE_VALIDITY_HOURS: i64 = 24;

/// reqwest-backed gateway speaking the QIWI p2p bills protocol.
pub struct QiwiBillingGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl QiwiBillingGateway {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn bill_url(&self, bill_id: &str) -> String {
        format!("{}/partner/bill/v1/bills/{}", self.base_url, bill_id)
    }
}

#[async_trait]
impl BillingGateway for QiwiBillingGateway {
    async fn create_invoice(&self, amount: f64) -> Result<CreatedInvoice, GatewayError> {
        // The bill id is chosen by the caller in this protocol; a UUID keeps
        // it unique per request.
        let bill_id = Uuid::new_v4().to_string();
        let expiration = (Utc::now() + chrono::Duration::hours(INVOICE_VALIDITY_HOURS)).to_rfc3339();

        let body = BillRequest {
            amount: BillAmount {
                currency: "RUB".to_string(),
                value: format!("{:.2}", amount),
            },
            comment: "Thank you for using our service".to_string(),
            expiration_date_time: expiration,
            customer: EmptyFields {},
            custom_fields: EmptyFields {},
        };

        let response = self
            .client
            .put(self.bill_url(&bill_id))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, &self.api_key)
            .json(&body)
            .send()
            .await?;

        let http_status = response.status();
        if !http_status.is_success() {
            return Err(GatewayError::UnexpectedStatus(http_status.as_u16()));
        }

        let decoded: BillStatusResponse = response.json().await?;
        let pay_url = decoded
            .pay_url
            .ok_or_else(|| GatewayError::Decode("payUrl missing from response".to_string()))?;

        Ok(CreatedInvoice { bill_id, pay_url })
    }

    async fn check_invoice(&self, bill_id: &str) -> Result<InvoiceStatus, GatewayError> {
        let response = self
            .client
            .get(self.bill_url(bill_id))
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, &self.api_key)
            .send()
            .await?;

        let http_status = response.status();
        if !http_status.is_success() {
            return Err(GatewayError::UnexpectedStatus(http_status.as_u16()));
        }

        let decoded: BillStatusResponse = response.json().await?;
        Ok(InvoiceStatus::from_value(&decoded.status.value))
    }
}

// =============================================================================
// BILLING SERVICE
// =============================================================================

pub struct BillingService {
    gateway: Arc<dyn BillingGateway>,
    subscriptions: Arc<dyn SubscriptionStore>,
    scheduler: Arc<LifecycleScheduler>,
    prices: PlanPrices,
    webhook_secret: String,
    /// Invoices whose terminal status has not been observed, keyed by
    /// gateway bill id.
    invoices: RwLock<HashMap<String, PendingInvoice>>,
}

impl BillingService {
    pub fn new(
        gateway: Arc<dyn BillingGateway>,
        subscriptions: Arc<dyn SubscriptionStore>,
        scheduler: Arc<LifecycleScheduler>,
        prices: PlanPrices,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            subscriptions,
            scheduler,
            prices,
            webhook_secret: webhook_secret.into(),
            invoices: RwLock::new(HashMap::new()),
        }
    }

    /// Create a gateway invoice for `plan` and start tracking it. Returns
    /// the payment page URL for the user.
    pub async fn request_subscription(
        &self,
        owner: &str,
        plan: SubscriptionPlan,
    ) -> Result<String, BillingError> {
        let amount = self.prices.amount_for(plan);
        let created = self.gateway.create_invoice(amount).await?;

        self.register_invoice(
            &created.bill_id,
            PendingInvoice {
                owner: owner.to_string(),
                granted: plan.granted_duration(),
            },
        )?;

        info!(
            "Registered {} invoice {} for {}",
            plan.as_str(),
            created.bill_id,
            owner
        );
        Ok(created.pay_url)
    }

    fn register_invoice(&self, bill_id: &str, invoice: PendingInvoice) -> Result<(), BillingError> {
        let mut invoices = self.invoices.write().map_err(|_| BillingError::LockPoisoned)?;
        if invoices.contains_key(bill_id) {
            return Err(BillingError::DuplicateInvoice(bill_id.to_string()));
        }
        invoices.insert(bill_id.to_string(), invoice);
        Ok(())
    }

    /// Remove an invoice from the outstanding table. Whoever gets `Some`
    /// back owns applying the terminal transition, which makes terminal
    /// processing idempotent between the poll loop and the webhook path.
    fn remove_invoice(&self, bill_id: &str) -> Result<Option<PendingInvoice>, BillingError> {
        let mut invoices = self.invoices.write().map_err(|_| BillingError::LockPoisoned)?;
        Ok(invoices.remove(bill_id))
    }

    /// Number of invoices still awaiting a terminal status.
    pub fn outstanding_invoices(&self) -> usize {
        self.invoices.read().map(|i| i.len()).unwrap_or(0)
    }

    // =========================================================================
    // RECONCILIATION
    // =========================================================================

    /// One reconciliation pass over the outstanding-invoice table. Transient
    /// gateway failures skip the affected invoice until the next tick; a
    /// single bad invoice never aborts the rest of the pass.
    pub async fn reconcile_outstanding(&self) {
        let snapshot: Vec<(String, PendingInvoice)> = match self.invoices.read() {
            Ok(invoices) => invoices
                .iter()
                .map(|(id, invoice)| (id.clone(), invoice.clone()))
                .collect(),
            Err(e) => {
                error!("Reconciliation skipped, invoice lock poisoned: {}", e);
                return;
            },
        };

        for (bill_id, invoice) in snapshot {
            let status = match self.gateway.check_invoice(&bill_id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("Status check for invoice {} failed: {}", bill_id, e);
                    continue;
                },
            };

            if !status.is_terminal() {
                continue;
            }

            // Terminal either way: drop it from the table exactly once.
            let removed = match self.remove_invoice(&bill_id) {
                Ok(removed) => removed,
                Err(e) => {
                    error!("Failed to drop invoice {}: {}", bill_id, e);
                    continue;
                },
            };
            if removed.is_none() {
                // Webhook got there first.
                continue;
            }

            if status.is_paid() {
                if let Err(e) = self.apply_paid(&invoice.owner, invoice.granted).await {
                    error!("Applying paid invoice {} for {} failed: {}", bill_id, invoice.owner, e);
                }
            } else {
                info!("Invoice {} for {} closed unpaid: {:?}", bill_id, invoice.owner, status);
            }
        }
    }

    /// Apply a paid invoice: additive extension over the prior remainder
    /// (missing or already-expired subscriptions count as zero), stale
    /// cleanup jobs dropped and re-staged against the new window, then the
    /// new expiry persisted.
    async fn apply_paid(&self, owner: &str, granted: Duration) -> Result<(), BillingError> {
        let prior = self
            .subscriptions
            .get(owner)
            .await?
            .unwrap_or(Duration::ZERO);

        if prior > Duration::ZERO {
            if let Err(e) = self.scheduler.cancel_pending_cleanup(owner) {
                // Not fatal: there may simply be nothing staged yet.
                warn!("Cancelling staged cleanup for {} failed: {}", owner, e);
            }
        }

        let new_expiry = granted + prior;
        self.scheduler
            .schedule_downgrade_cleanup(owner, new_expiry)
            .await?;
        self.subscriptions.set(owner, new_expiry).await?;

        info!(
            "Subscription of {} extended to {:?} ({:?} granted + {:?} prior)",
            owner, new_expiry, granted, prior
        );
        Ok(())
    }

    // =========================================================================
    // WEBHOOK PATH
    // =========================================================================

    /// Process a pushed bill notification. The signature header must match
    /// the HMAC over the notification's pipe-joined fields before anything
    /// is trusted; on a bad signature no state is mutated.
    pub async fn handle_notification(
        &self,
        notification: &BillNotification,
        signature: &str,
    ) -> Result<(), BillingError> {
        if !verify_signature(
            &self.webhook_secret,
            &notification.signature_payload(),
            signature,
        ) {
            warn!(
                "Rejected bill notification for {} with bad signature",
                notification.bill.bill_id
            );
            return Err(BillingError::InvalidSignature);
        }

        let status = notification.status();
        if !status.is_terminal() {
            return Ok(());
        }

        let bill_id = notification.bill.bill_id.as_str();
        let invoice = self
            .remove_invoice(bill_id)?
            .ok_or_else(|| BillingError::UnknownInvoice(bill_id.to_string()))?;

        if status.is_paid() {
            self.apply_paid(&invoice.owner, invoice.granted).await?;
        } else {
            info!("Invoice {} for {} closed unpaid via webhook: {:?}", bill_id, invoice.owner, status);
        }

        Ok(())
    }
}

// Billing reconciliation and the signed webhook path: invoice lifecycle,
// additive subscription extension and downgrade staging on payment.

mod common;

use std::sync::Arc;
use std::time::Duration;

use linklife_core::{
    sign_payload, BillNotification, BillingError, BillingService, InvoiceStatus,
    LifecycleScheduler, PlanPrices, SubscriptionPlan, SubscriptionStore, TokioJobRunner,
};

use common::{make_link, InMemoryLinkRepository, InMemorySubscriptionStore, ScriptedGateway};

const DAY: Duration = Duration::from_secs(86400);
const SECRET: &str = "test-webhook-secret";

struct Fixture {
    gateway: Arc<ScriptedGateway>,
    subscriptions: Arc<InMemorySubscriptionStore>,
    links: Arc<InMemoryLinkRepository>,
    scheduler: Arc<LifecycleScheduler>,
    billing: BillingService,
}

fn setup_with(gateway: ScriptedGateway) -> Fixture {
    common::init_tracing();
    let gateway = Arc::new(gateway);
    let subscriptions = Arc::new(InMemorySubscriptionStore::new());
    let links = Arc::new(InMemoryLinkRepository::new());
    let scheduler = Arc::new(LifecycleScheduler::new(
        Arc::new(TokioJobRunner::new()),
        links.clone(),
    ));
    let billing = BillingService::new(
        gateway.clone(),
        subscriptions.clone(),
        scheduler.clone(),
        PlanPrices {
            weekly: 1.99,
            monthly: 4.99,
            yearly: 39.99,
        },
        SECRET,
    );

    Fixture {
        gateway,
        subscriptions,
        links,
        scheduler,
        billing,
    }
}

fn setup() -> Fixture {
    setup_with(ScriptedGateway::new())
}

fn notification(bill_id: &str, status: &str) -> BillNotification {
    let raw = format!(
        r#"{{
            "bill": {{
                "siteId": "site-1",
                "billId": "{}",
                "amount": {{ "value": "4.99", "currency": "RUB" }},
                "status": {{ "value": "{}" }}
            }},
            "version": "1"
        }}"#,
        bill_id, status
    );
    BillNotification::from_json(&raw).unwrap()
}

fn signed(n: &BillNotification) -> String {
    sign_payload(SECRET, &n.signature_payload())
}

#[tokio::test]
async fn test_request_subscription_registers_invoice() {
    let f = setup_with(ScriptedGateway::with_ids(&["bill-1"]));

    let pay_url = f
        .billing
        .request_subscription("alice", SubscriptionPlan::Monthly)
        .await
        .unwrap();

    assert_eq!(pay_url, "https://pay.example/bill-1");
    assert_eq!(f.billing.outstanding_invoices(), 1);
    // The invoice was created at the monthly price.
    assert_eq!(f.gateway.created_amounts(), vec![("bill-1".to_string(), 4.99)]);
}

#[tokio::test]
async fn test_paid_invoice_grants_plan_duration() {
    let f = setup_with(ScriptedGateway::with_ids(&["bill-1"]));

    f.billing
        .request_subscription("alice", SubscriptionPlan::Monthly)
        .await
        .unwrap();
    f.gateway.set_status("bill-1", InvoiceStatus::Paid);

    f.billing.reconcile_outstanding().await;

    assert_eq!(f.billing.outstanding_invoices(), 0);
    assert_eq!(f.subscriptions.get("alice").await.unwrap(), Some(31 * DAY));
}

#[tokio::test]
async fn test_second_payment_extends_additively() {
    let f = setup_with(ScriptedGateway::with_ids(&["bill-1", "bill-2"]));

    f.billing
        .request_subscription("alice", SubscriptionPlan::Monthly)
        .await
        .unwrap();
    f.gateway.set_status("bill-1", InvoiceStatus::Paid);
    f.billing.reconcile_outstanding().await;

    f.billing
        .request_subscription("alice", SubscriptionPlan::Monthly)
        .await
        .unwrap();
    f.gateway.set_status("bill-2", InvoiceStatus::Paid);
    f.billing.reconcile_outstanding().await;

    // The second grant stacks on the prior remainder.
    assert_eq!(f.subscriptions.get("alice").await.unwrap(), Some(62 * DAY));
}

#[tokio::test]
async fn test_unpaid_terminal_invoice_grants_nothing() {
    let f = setup_with(ScriptedGateway::with_ids(&["bill-1"]));

    f.billing
        .request_subscription("alice", SubscriptionPlan::Weekly)
        .await
        .unwrap();
    f.gateway.set_status("bill-1", InvoiceStatus::Expired);

    f.billing.reconcile_outstanding().await;

    // Closed and dropped from the table, but nothing was granted.
    assert_eq!(f.billing.outstanding_invoices(), 0);
    assert_eq!(f.subscriptions.get("alice").await.unwrap(), None);
}

#[tokio::test]
async fn test_waiting_invoice_stays_outstanding() {
    let f = setup_with(ScriptedGateway::with_ids(&["bill-1"]));

    f.billing
        .request_subscription("alice", SubscriptionPlan::Weekly)
        .await
        .unwrap();

    f.billing.reconcile_outstanding().await;

    assert_eq!(f.billing.outstanding_invoices(), 1);
    assert_eq!(f.subscriptions.get("alice").await.unwrap(), None);
}

#[tokio::test]
async fn test_duplicate_invoice_id_is_rejected() {
    let f = setup_with(ScriptedGateway::with_ids(&["same-id", "same-id"]));

    f.billing
        .request_subscription("alice", SubscriptionPlan::Weekly)
        .await
        .unwrap();
    let result = f
        .billing
        .request_subscription("bob", SubscriptionPlan::Weekly)
        .await;

    assert!(matches!(result, Err(BillingError::DuplicateInvoice(id)) if id == "same-id"));
    // The first registration is untouched.
    assert_eq!(f.billing.outstanding_invoices(), 1);
}

#[tokio::test]
async fn test_transient_check_failure_skips_until_next_pass() {
    let f = setup_with(ScriptedGateway::with_ids(&["bill-1"]));

    f.billing
        .request_subscription("alice", SubscriptionPlan::Monthly)
        .await
        .unwrap();
    f.gateway.set_status("bill-1", InvoiceStatus::Paid);

    // Gateway down: the pass completes without dropping the invoice.
    f.gateway.set_check_failure(true);
    f.billing.reconcile_outstanding().await;
    assert_eq!(f.billing.outstanding_invoices(), 1);
    assert_eq!(f.subscriptions.get("alice").await.unwrap(), None);

    f.gateway.set_check_failure(false);
    f.billing.reconcile_outstanding().await;
    assert_eq!(f.billing.outstanding_invoices(), 0);
    assert_eq!(f.subscriptions.get("alice").await.unwrap(), Some(31 * DAY));
}

#[tokio::test]
async fn test_payment_stages_downgrade_for_over_quota_corpus() {
    let f = setup_with(ScriptedGateway::with_ids(&["bill-1"]));
    // More links than the free tier allows once the new window runs out.
    for i in 0..60 {
        f.links.seed("alice", make_link(&format!("d{}", i), false, false));
    }

    f.billing
        .request_subscription("alice", SubscriptionPlan::Monthly)
        .await
        .unwrap();
    f.gateway.set_status("bill-1", InvoiceStatus::Paid);
    f.billing.reconcile_outstanding().await;

    // 60 default links against a free quota of 50 total.
    assert_eq!(f.scheduler.pending_cleanup_count("alice"), Some(10));
}

// =============================================================================
// WEBHOOK PATH
// =============================================================================

#[tokio::test]
async fn test_signed_paid_webhook_applies_grant() {
    let f = setup_with(ScriptedGateway::with_ids(&["bill-1"]));

    f.billing
        .request_subscription("alice", SubscriptionPlan::Monthly)
        .await
        .unwrap();

    let n = notification("bill-1", "PAID");
    f.billing.handle_notification(&n, &signed(&n)).await.unwrap();

    assert_eq!(f.billing.outstanding_invoices(), 0);
    assert_eq!(f.subscriptions.get("alice").await.unwrap(), Some(31 * DAY));
}

#[tokio::test]
async fn test_webhook_and_poll_apply_the_grant_once() {
    let f = setup_with(ScriptedGateway::with_ids(&["bill-1"]));

    f.billing
        .request_subscription("alice", SubscriptionPlan::Monthly)
        .await
        .unwrap();
    f.gateway.set_status("bill-1", InvoiceStatus::Paid);

    let n = notification("bill-1", "PAID");
    f.billing.handle_notification(&n, &signed(&n)).await.unwrap();

    // The poll loop observing the same terminal status afterwards finds
    // nothing left to process.
    f.billing.reconcile_outstanding().await;
    assert_eq!(f.subscriptions.get("alice").await.unwrap(), Some(31 * DAY));
}

#[tokio::test]
async fn test_bad_signature_is_rejected_without_mutation() {
    let f = setup_with(ScriptedGateway::with_ids(&["bill-1"]));

    f.billing
        .request_subscription("alice", SubscriptionPlan::Monthly)
        .await
        .unwrap();

    let n = notification("bill-1", "PAID");
    let result = f
        .billing
        .handle_notification(&n, "deadbeef00000000")
        .await;

    assert!(matches!(result, Err(BillingError::InvalidSignature)));
    assert_eq!(f.billing.outstanding_invoices(), 1);
    assert_eq!(f.subscriptions.get("alice").await.unwrap(), None);
}

#[tokio::test]
async fn test_webhook_for_unknown_invoice_is_an_error() {
    let f = setup();

    let n = notification("never-registered", "PAID");
    let result = f.billing.handle_notification(&n, &signed(&n)).await;

    assert!(matches!(
        result,
        Err(BillingError::UnknownInvoice(id)) if id == "never-registered"
    ));
}

#[tokio::test]
async fn test_non_terminal_webhook_is_acknowledged_and_ignored() {
    let f = setup_with(ScriptedGateway::with_ids(&["bill-1"]));

    f.billing
        .request_subscription("alice", SubscriptionPlan::Monthly)
        .await
        .unwrap();

    let n = notification("bill-1", "WAITING");
    f.billing.handle_notification(&n, &signed(&n)).await.unwrap();

    assert_eq!(f.billing.outstanding_invoices(), 1);
}

#[tokio::test]
async fn test_unpaid_webhook_drops_invoice_without_grant() {
    let f = setup_with(ScriptedGateway::with_ids(&["bill-1"]));

    f.billing
        .request_subscription("alice", SubscriptionPlan::Monthly)
        .await
        .unwrap();

    let n = notification("bill-1", "REJECTED");
    f.billing.handle_notification(&n, &signed(&n)).await.unwrap();

    assert_eq!(f.billing.outstanding_invoices(), 0);
    assert_eq!(f.subscriptions.get("alice").await.unwrap(), None);
}

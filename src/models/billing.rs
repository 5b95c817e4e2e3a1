// Billing wire schemas and the outstanding-invoice bookkeeping types.
// Gateway responses and the inbound webhook are decoded into typed structs;
// no dynamic JSON maps.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// =============================================================================
// INVOICE STATUS
// =============================================================================

/// Payment status of an invoice as reported by the billing gateway.
///
/// `WAITING` is the only non-terminal status; any string other than the
/// known ones is treated as terminal-failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceStatus {
    Waiting,
    Paid,
    Expired,
    Rejected,
    Failed(String),
}

impl InvoiceStatus {
    pub fn from_value(value: &str) -> Self {
        match value {
            "WAITING" => InvoiceStatus::Waiting,
            "PAID" => InvoiceStatus::Paid,
            "EXPIRED" => InvoiceStatus::Expired,
            "REJECTED" => InvoiceStatus::Rejected,
            other => InvoiceStatus::Failed(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvoiceStatus::Waiting)
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, InvoiceStatus::Paid)
    }
}

// =============================================================================
// OUTSTANDING INVOICES
// =============================================================================

/// An invoice whose terminal status has not yet been observed, held in the
/// billing service's in-memory table keyed by gateway bill id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInvoice {
    pub owner: String,
    /// Entitlement granted once this invoice is observed as paid.
    pub granted: Duration,
}

/// Result of registering a new invoice with the gateway.
#[derive(Debug, Clone)]
pub struct CreatedInvoice {
    pub bill_id: String,
    /// Payment page URL handed back to the requesting user.
    pub pay_url: String,
}

// =============================================================================
// WEBHOOK PAYLOAD
// =============================================================================

/// Inbound bill notification pushed by the gateway instead of being polled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillNotification {
    pub bill: NotifiedBill,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifiedBill {
    pub site_id: String,
    pub bill_id: String,
    pub amount: NotifiedAmount,
    pub status: NotifiedStatus,
}

/// Billed amount. The gateway sends `value` as a decimal string; it is kept
/// verbatim because the signature is computed over the exact wire text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifiedAmount {
    pub value: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifiedStatus {
    pub value: String,
}

impl BillNotification {
    /// Decode a raw webhook body.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// The pipe-joined field string the gateway signs, in this exact order:
    /// `currency|value|billId|siteId|status`.
    pub fn signature_payload(&self) -> String {
        [
            self.bill.amount.currency.as_str(),
            self.bill.amount.value.as_str(),
            self.bill.bill_id.as_str(),
            self.bill.site_id.as_str(),
            self.bill.status.value.as_str(),
        ]
        .join("|")
    }

    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_value(&self.bill.status.value)
    }
}

//! Receipt notifications.
//!
//! Receipts are sent after the unit of work commits. A failing notifier is
//! logged and never undoes the money movement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::{Money, PaymentPurpose};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification not delivered: {0}")]
    Delivery(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiptKind {
    Payment,
    Refund,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub kind: ReceiptKind,
    /// The payment id doubles as receipt number.
    pub payment_id: Uuid,
    pub purpose: PaymentPurpose,
    pub amount: Money,
    /// Human readable subject, e.g. the event title.
    pub subject: String,
    pub recipient_name: String,
    pub issued_at: DateTime<Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_receipt(&self, email: &str, receipt: &Receipt) -> Result<(), NotifyError>;
}

/// Notifier that only writes receipts to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send_receipt(&self, email: &str, receipt: &Receipt) -> Result<(), NotifyError> {
        tracing::info!(
            email,
            recipient = %receipt.recipient_name,
            payment_id = %receipt.payment_id,
            kind = ?receipt.kind,
            purpose = receipt.purpose.as_str(),
            amount = %receipt.amount,
            issued_at = %receipt.issued_at.to_rfc3339(),
            subject = %receipt.subject,
            "receipt sent"
        );
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Eur,
    Usd,
    Gbp,
}

/// `?page=&limit=` query of list endpoints. `page` is 1-based; the server
/// clamps `limit` to 1..=100.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

pub mod registration {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum RegistrationStatus {
        Pending,
        Confirmed,
        Cancelled,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RegistrationNew {
        pub event_id: Uuid,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RegistrationView {
        pub id: Uuid,
        pub event_id: Uuid,
        pub status: RegistrationStatus,
        pub payment_status: super::payment::PaymentStatus,
        pub payment_amount_minor: i64,
        pub currency: Currency,
        /// Present while the registration holds a seat without being paid.
        pub hold_until: Option<DateTime<Utc>>,
        pub is_active: bool,
        pub registered_at: DateTime<Utc>,
        pub cancelled_at: Option<DateTime<Utc>>,
    }

    /// Result of `POST /registrations/{id}/cancel`.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct CancelResponse {
        pub registration_id: Uuid,
        /// Set when a settled payment went back to the wallet.
        pub refund: Option<super::payment::RefundView>,
    }
}

pub mod payment {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum PaymentStatus {
        Pending,
        Succeeded,
        Failed,
        Refunded,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum PaymentMethod {
        Card,
        Wallet,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum PaymentPurpose {
        EventPayment,
        WalletTopup,
        VendorFee,
    }

    /// Handshake data for finishing a card payment client-side.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct CardPaymentInitView {
        pub payment_id: Uuid,
        pub client_secret: String,
        pub amount_minor: i64,
        pub currency: Currency,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct PaymentView {
        pub id: Uuid,
        pub registration_id: Option<Uuid>,
        pub event_id: Option<Uuid>,
        pub vendor_application_id: Option<Uuid>,
        pub method: PaymentMethod,
        pub purpose: PaymentPurpose,
        pub status: PaymentStatus,
        pub amount_minor: i64,
        pub currency: Currency,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct PaymentListResponse {
        pub payments: Vec<PaymentView>,
        pub page: u64,
        pub limit: u64,
        pub total: u64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RefundView {
        pub payment_id: Uuid,
        pub registration_id: Option<Uuid>,
        pub amount_minor: i64,
        pub currency: Currency,
        pub ledger_entry_id: Uuid,
    }
}

pub mod wallet {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum WalletTxKind {
        DebitPayment,
        CreditRefund,
        CreditTopup,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TopUpNew {
        /// Must be > 0.
        pub amount_minor: i64,
        pub currency: Option<Currency>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Balance {
        pub currency: Currency,
        pub balance_minor: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct WalletEntryView {
        pub id: Uuid,
        pub kind: WalletTxKind,
        pub amount_minor: i64,
        pub currency: Currency,
        pub reference: String,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct WalletResponse {
        pub balances: Vec<Balance>,
        pub entries: Vec<WalletEntryView>,
        pub page: u64,
        pub limit: u64,
        pub total: u64,
    }
}

pub mod webhook {
    use super::*;

    /// Body returned to the gateway for every accepted delivery.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct WebhookAck {
        pub received: bool,
    }
}

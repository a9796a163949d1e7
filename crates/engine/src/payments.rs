//! Payment records.
//!
//! A [`Payment`] is one attempt to move money for a [`PaymentPurpose`]. Card
//! payments start `Pending` and are settled by the webhook reconciler; wallet
//! payments are written already `Succeeded` because they settle inside the
//! same unit of work that debits the ledger.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Currency, EngineError, Money, ResultEngine,
    util::{parse_optional_uuid, parse_uuid},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    Wallet,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Card => "CARD",
            Self::Wallet => "WALLET",
        }
    }
}

impl TryFrom<&str> for PaymentMethod {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "CARD" => Ok(Self::Card),
            "WALLET" => Ok(Self::Wallet),
            other => Err(EngineError::InconsistentState(format!(
                "invalid payment method: {other}"
            ))),
        }
    }
}

/// What a payment is for; each purpose has its own post-settlement effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentPurpose {
    /// Confirms a registration.
    EventPayment,
    /// Credits the payer's wallet.
    WalletTopup,
    /// Marks a vendor application paid.
    VendorFee,
}

impl PaymentPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EventPayment => "EVENT_PAYMENT",
            Self::WalletTopup => "WALLET_TOPUP",
            Self::VendorFee => "VENDOR_FEE",
        }
    }
}

impl TryFrom<&str> for PaymentPurpose {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "EVENT_PAYMENT" => Ok(Self::EventPayment),
            "WALLET_TOPUP" => Ok(Self::WalletTopup),
            "VENDOR_FEE" => Ok(Self::VendorFee),
            other => Err(EngineError::InconsistentState(format!(
                "invalid payment purpose: {other}"
            ))),
        }
    }
}

/// Settlement state shared by payments and the `payment_status` of a
/// registration.
///
/// `Refunded` is reserved for money that was settled and then given back;
/// `Failed` means it never settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Money has moved for this payment (it may have been refunded since).
    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Succeeded | Self::Refunded)
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(EngineError::InconsistentState(format!(
                "invalid payment status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: String,
    pub registration_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub vendor_application_id: Option<Uuid>,
    pub method: PaymentMethod,
    pub purpose: PaymentPurpose,
    pub status: PaymentStatus,
    pub amount_minor: i64,
    pub currency: Currency,
    /// Gateway correlation id; unique, anchors webhook idempotency.
    pub external_intent_id: Option<String>,
    /// Opaque card handshake token handed back to the client.
    pub client_secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a new payment row for `purpose`.
    ///
    /// Targets (registration/event/vendor application) are attached by the
    /// caller with the `for_*` helpers.
    pub fn new(
        user_id: impl Into<String>,
        method: PaymentMethod,
        purpose: PaymentPurpose,
        status: PaymentStatus,
        amount: Money,
        now: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if amount.amount_minor <= 0 {
            return Err(EngineError::InvalidAmount(
                "amount_minor must be > 0".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            registration_id: None,
            event_id: None,
            vendor_application_id: None,
            method,
            purpose,
            status,
            amount_minor: amount.amount_minor,
            currency: amount.currency,
            external_intent_id: None,
            client_secret: None,
            created_at: now,
            updated_at: now,
        })
    }

    #[must_use]
    pub fn for_registration(mut self, registration_id: Uuid, event_id: Uuid) -> Self {
        self.registration_id = Some(registration_id);
        self.event_id = Some(event_id);
        self
    }

    #[must_use]
    pub fn for_vendor_application(mut self, application_id: Uuid) -> Self {
        self.vendor_application_id = Some(application_id);
        self
    }

    #[must_use]
    pub fn with_intent(mut self, intent_id: String, client_secret: String) -> Self {
        self.external_intent_id = Some(intent_id);
        self.client_secret = Some(client_secret);
        self
    }

    #[must_use]
    pub fn amount(&self) -> Money {
        Money::new(self.amount_minor, self.currency)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub registration_id: Option<String>,
    pub event_id: Option<String>,
    pub vendor_application_id: Option<String>,
    pub method: String,
    pub purpose: String,
    pub status: String,
    pub amount_minor: i64,
    pub currency: String,
    #[sea_orm(unique)]
    pub external_intent_id: Option<String>,
    pub client_secret: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::registrations::Entity",
        from = "Column::RegistrationId",
        to = "super::registrations::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Registrations,
}

impl Related<super::registrations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Registrations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Payment> for ActiveModel {
    fn from(value: &Payment) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            user_id: ActiveValue::Set(value.user_id.clone()),
            registration_id: ActiveValue::Set(value.registration_id.map(|id| id.to_string())),
            event_id: ActiveValue::Set(value.event_id.map(|id| id.to_string())),
            vendor_application_id: ActiveValue::Set(
                value.vendor_application_id.map(|id| id.to_string()),
            ),
            method: ActiveValue::Set(value.method.as_str().to_string()),
            purpose: ActiveValue::Set(value.purpose.as_str().to_string()),
            status: ActiveValue::Set(value.status.as_str().to_string()),
            amount_minor: ActiveValue::Set(value.amount_minor),
            currency: ActiveValue::Set(value.currency.code().to_string()),
            external_intent_id: ActiveValue::Set(value.external_intent_id.clone()),
            client_secret: ActiveValue::Set(value.client_secret.clone()),
            created_at: ActiveValue::Set(value.created_at),
            updated_at: ActiveValue::Set(value.updated_at),
        }
    }
}

impl TryFrom<Model> for Payment {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: parse_uuid(&model.id, "payment")?,
            user_id: model.user_id,
            registration_id: parse_optional_uuid(model.registration_id.as_deref(), "registration")?,
            event_id: parse_optional_uuid(model.event_id.as_deref(), "event")?,
            vendor_application_id: parse_optional_uuid(
                model.vendor_application_id.as_deref(),
                "vendor application",
            )?,
            method: PaymentMethod::try_from(model.method.as_str())?,
            purpose: PaymentPurpose::try_from(model.purpose.as_str())?,
            status: PaymentStatus::try_from(model.status.as_str())?,
            amount_minor: model.amount_minor,
            currency: Currency::try_from(model.currency.as_str())?,
            external_intent_id: model.external_intent_id,
            client_secret: model.client_secret,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn new_rejects_non_positive_amounts() {
        let now = Utc.timestamp_opt(0, 0).unwrap();
        let err = Payment::new(
            "alice",
            PaymentMethod::Card,
            PaymentPurpose::WalletTopup,
            PaymentStatus::Pending,
            Money::zero(Currency::Eur),
            now,
        )
        .unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidAmount("amount_minor must be > 0".to_string())
        );
    }

    #[test]
    fn refunded_counts_as_settled() {
        assert!(PaymentStatus::Succeeded.is_settled());
        assert!(PaymentStatus::Refunded.is_settled());
        assert!(!PaymentStatus::Pending.is_settled());
        assert!(!PaymentStatus::Failed.is_settled());
    }
}

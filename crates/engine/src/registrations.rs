//! Registrations: one reservation row per (user, event).
//!
//! A registration is created `Pending` with a `hold_until` timestamp by the
//! hold manager, flips to `Confirmed` once paid, and ends `Cancelled` on
//! refund or voluntary cancellation. Rows are never deleted; `is_active`
//! carries the soft lifecycle.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError, PaymentStatus, ResultEngine, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl RegistrationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl TryFrom<&str> for RegistrationStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(EngineError::InconsistentState(format!(
                "invalid registration status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    pub user_id: String,
    pub event_id: Uuid,
    pub status: RegistrationStatus,
    pub payment_status: PaymentStatus,
    pub payment_amount_minor: i64,
    pub currency: Currency,
    pub hold_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub registered_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Registration {
    /// `true` while the row is `Pending` and its hold has not passed `now`.
    ///
    /// Expiry is lazy: nothing rewrites the row when the hold lapses, every
    /// reader compares against its own `now`.
    #[must_use]
    pub fn has_live_hold(&self, now: DateTime<Utc>) -> bool {
        self.status == RegistrationStatus::Pending
            && self.hold_until.is_some_and(|until| until > now)
    }

    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.status == RegistrationStatus::Confirmed && self.is_active
    }

    /// Whether this row takes one seat of the event capacity at `now`.
    #[must_use]
    pub fn occupies_capacity(&self, now: DateTime<Utc>) -> bool {
        self.is_confirmed() || (self.is_active && self.has_live_hold(now))
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "registrations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub event_id: String,
    pub status: String,
    pub payment_status: String,
    pub payment_amount_minor: i64,
    pub currency: String,
    pub hold_until: Option<DateTimeUtc>,
    pub is_active: bool,
    pub registered_at: DateTimeUtc,
    pub cancelled_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::payments::Entity")]
    Payments,
}

impl Related<super::payments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Registration> for ActiveModel {
    fn from(value: &Registration) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            user_id: ActiveValue::Set(value.user_id.clone()),
            event_id: ActiveValue::Set(value.event_id.to_string()),
            status: ActiveValue::Set(value.status.as_str().to_string()),
            payment_status: ActiveValue::Set(value.payment_status.as_str().to_string()),
            payment_amount_minor: ActiveValue::Set(value.payment_amount_minor),
            currency: ActiveValue::Set(value.currency.code().to_string()),
            hold_until: ActiveValue::Set(value.hold_until),
            is_active: ActiveValue::Set(value.is_active),
            registered_at: ActiveValue::Set(value.registered_at),
            cancelled_at: ActiveValue::Set(value.cancelled_at),
        }
    }
}

impl TryFrom<Model> for Registration {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: parse_uuid(&model.id, "registration")?,
            user_id: model.user_id,
            event_id: parse_uuid(&model.event_id, "event")?,
            status: RegistrationStatus::try_from(model.status.as_str())?,
            payment_status: PaymentStatus::try_from(model.payment_status.as_str())?,
            payment_amount_minor: model.payment_amount_minor,
            currency: Currency::try_from(model.currency.as_str())?,
            hold_until: model.hold_until,
            is_active: model.is_active,
            registered_at: model.registered_at,
            cancelled_at: model.cancelled_at,
        })
    }
}

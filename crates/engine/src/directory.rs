//! Read-side collaborators of the payment engine.
//!
//! Events, users and vendor applications are owned by other parts of the
//! platform. The engine only needs the narrow views below, injected as trait
//! objects through [`EngineBuilder`](crate::EngineBuilder). [`SqlDirectory`]
//! serves all three from the shared database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, DatabaseConnection, DatabaseTransaction, QueryFilter, prelude::*,
    sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Currency, EngineError, Money, ResultEngine, events, users, util::parse_uuid,
    vendor_applications,
};

/// The slice of an event the payment engine reasons about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub capacity: i64,
    pub price: Money,
    pub start_date: DateTime<Utc>,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_archived: bool,
}

impl Event {
    /// Rejects events that cannot take new registrations at `now`.
    pub fn ensure_open(&self, now: DateTime<Utc>) -> ResultEngine<()> {
        if !self.is_active || self.is_archived {
            return Err(EngineError::EventClosed(format!(
                "event {} is not active",
                self.id
            )));
        }
        if self.start_date <= now {
            return Err(EngineError::EventClosed(format!(
                "event {} has already started",
                self.id
            )));
        }
        if self.registration_deadline.is_some_and(|deadline| deadline < now) {
            return Err(EngineError::EventClosed(format!(
                "registration deadline for event {} has passed",
                self.id
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        self.price.amount_minor == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub email: String,
    pub display_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VendorPaymentStatus {
    Unpaid,
    Paid,
    PaymentFailed,
}

impl VendorPaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unpaid => "UNPAID",
            Self::Paid => "PAID",
            Self::PaymentFailed => "PAYMENT_FAILED",
        }
    }
}

impl TryFrom<&str> for VendorPaymentStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "UNPAID" => Ok(Self::Unpaid),
            "PAID" => Ok(Self::Paid),
            "PAYMENT_FAILED" => Ok(Self::PaymentFailed),
            other => Err(EngineError::InconsistentState(format!(
                "invalid vendor payment status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorApplication {
    pub id: Uuid,
    pub user_id: String,
    pub business_name: String,
    pub fee: Money,
    pub payment_status: VendorPaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait EventDirectory: Send + Sync {
    async fn find_event(&self, event_id: Uuid) -> ResultEngine<Option<Event>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: &str) -> ResultEngine<Option<UserProfile>>;
}

/// Vendor-application store.
///
/// The two mutations run inside the engine's open unit of work so the vendor
/// row moves together with the payment row.
#[async_trait]
pub trait VendorApplications: Send + Sync {
    async fn find_application(
        &self,
        application_id: Uuid,
    ) -> ResultEngine<Option<VendorApplication>>;

    async fn mark_paid(
        &self,
        db_tx: &DatabaseTransaction,
        application_id: Uuid,
        when: DateTime<Utc>,
    ) -> ResultEngine<()>;

    async fn fail_payment(
        &self,
        db_tx: &DatabaseTransaction,
        application_id: Uuid,
    ) -> ResultEngine<()>;
}

/// Directory backed by the `events`, `users` and `vendor_applications` tables.
#[derive(Clone, Debug)]
pub struct SqlDirectory {
    database: DatabaseConnection,
}

impl SqlDirectory {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }
}

impl TryFrom<events::Model> for Event {
    type Error = EngineError;

    fn try_from(model: events::Model) -> ResultEngine<Self> {
        let currency = Currency::try_from(model.currency.as_str())?;
        Ok(Self {
            id: parse_uuid(&model.id, "event")?,
            title: model.title,
            capacity: model.capacity,
            price: Money::new(model.price_minor, currency),
            start_date: model.start_date,
            registration_deadline: model.registration_deadline,
            is_active: model.is_active,
            is_archived: model.is_archived,
        })
    }
}

impl TryFrom<vendor_applications::Model> for VendorApplication {
    type Error = EngineError;

    fn try_from(model: vendor_applications::Model) -> ResultEngine<Self> {
        let currency = Currency::try_from(model.currency.as_str())?;
        Ok(Self {
            id: parse_uuid(&model.id, "vendor application")?,
            user_id: model.user_id,
            business_name: model.business_name,
            fee: Money::new(model.fee_minor, currency),
            payment_status: VendorPaymentStatus::try_from(model.payment_status.as_str())?,
            paid_at: model.paid_at,
        })
    }
}

#[async_trait]
impl EventDirectory for SqlDirectory {
    async fn find_event(&self, event_id: Uuid) -> ResultEngine<Option<Event>> {
        events::Entity::find_by_id(event_id.to_string())
            .one(&self.database)
            .await?
            .map(Event::try_from)
            .transpose()
    }
}

#[async_trait]
impl UserDirectory for SqlDirectory {
    async fn find_user(&self, user_id: &str) -> ResultEngine<Option<UserProfile>> {
        let model = users::Entity::find_by_id(user_id.to_string())
            .one(&self.database)
            .await?;
        Ok(model.map(|m| UserProfile {
            username: m.username,
            email: m.email,
            display_name: m.display_name,
        }))
    }
}

#[async_trait]
impl VendorApplications for SqlDirectory {
    async fn find_application(
        &self,
        application_id: Uuid,
    ) -> ResultEngine<Option<VendorApplication>> {
        vendor_applications::Entity::find_by_id(application_id.to_string())
            .one(&self.database)
            .await?
            .map(VendorApplication::try_from)
            .transpose()
    }

    async fn mark_paid(
        &self,
        db_tx: &DatabaseTransaction,
        application_id: Uuid,
        when: DateTime<Utc>,
    ) -> ResultEngine<()> {
        let exists = vendor_applications::Entity::find_by_id(application_id.to_string())
            .one(db_tx)
            .await?
            .is_some();
        if !exists {
            return Err(EngineError::KeyNotFound(
                "vendor application not exists".to_string(),
            ));
        }

        let active = vendor_applications::ActiveModel {
            id: ActiveValue::Set(application_id.to_string()),
            payment_status: ActiveValue::Set(VendorPaymentStatus::Paid.as_str().to_string()),
            paid_at: ActiveValue::Set(Some(when)),
            ..Default::default()
        };
        active.update(db_tx).await?;
        Ok(())
    }

    async fn fail_payment(
        &self,
        db_tx: &DatabaseTransaction,
        application_id: Uuid,
    ) -> ResultEngine<()> {
        // A paid application never goes back to failed.
        vendor_applications::Entity::update_many()
            .col_expr(
                vendor_applications::Column::PaymentStatus,
                Expr::value(VendorPaymentStatus::PaymentFailed.as_str()),
            )
            .filter(vendor_applications::Column::Id.eq(application_id.to_string()))
            .filter(
                vendor_applications::Column::PaymentStatus
                    .ne(VendorPaymentStatus::Paid.as_str()),
            )
            .exec(db_tx)
            .await?;
        Ok(())
    }
}

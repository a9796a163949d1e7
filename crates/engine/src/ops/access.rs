use sea_orm::{ConnectionTrait, QueryFilter, prelude::*};
use uuid::Uuid;

use crate::{
    EngineError, Event, Payment, PaymentPurpose, PaymentStatus, Registration, ResultEngine,
    UserProfile, payments, registrations,
};

use super::Engine;

impl Engine {
    pub(super) async fn require_event(&self, event_id: Uuid) -> ResultEngine<Event> {
        self.events
            .find_event(event_id)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("event not exists".to_string()))
    }

    pub(super) async fn require_user(&self, user_id: &str) -> ResultEngine<UserProfile> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("user not exists".to_string()))
    }

    pub(super) async fn require_registration<C: ConnectionTrait>(
        &self,
        db: &C,
        registration_id: Uuid,
    ) -> ResultEngine<Registration> {
        let model = registrations::Entity::find_by_id(registration_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("registration not exists".to_string()))?;
        Registration::try_from(model)
    }

    /// Loads a registration and checks it belongs to `user_id`.
    pub(super) async fn require_owned_registration<C: ConnectionTrait>(
        &self,
        db: &C,
        registration_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<Registration> {
        let registration = self.require_registration(db, registration_id).await?;
        if registration.user_id != user_id {
            return Err(EngineError::Forbidden(
                "registration belongs to another user".to_string(),
            ));
        }
        Ok(registration)
    }

    pub(super) async fn require_payment<C: ConnectionTrait>(
        &self,
        db: &C,
        payment_id: Uuid,
    ) -> ResultEngine<Payment> {
        let model = payments::Entity::find_by_id(payment_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("payment not exists".to_string()))?;
        Payment::try_from(model)
    }

    pub(super) async fn require_owned_payment<C: ConnectionTrait>(
        &self,
        db: &C,
        payment_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<Payment> {
        let payment = self.require_payment(db, payment_id).await?;
        if payment.user_id != user_id {
            return Err(EngineError::Forbidden(
                "payment belongs to another user".to_string(),
            ));
        }
        Ok(payment)
    }

    /// Event payments recorded for a registration, newest first.
    pub(super) async fn event_payments_for<C: ConnectionTrait>(
        &self,
        db: &C,
        registration_id: Uuid,
    ) -> ResultEngine<Vec<Payment>> {
        let models = payments::Entity::find()
            .filter(payments::Column::RegistrationId.eq(registration_id.to_string()))
            .filter(payments::Column::Purpose.eq(PaymentPurpose::EventPayment.as_str()))
            .all(db)
            .await?;
        let mut out = models
            .into_iter()
            .map(Payment::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    /// The settled event payment of a registration, if any.
    pub(super) async fn succeeded_event_payment<C: ConnectionTrait>(
        &self,
        db: &C,
        registration_id: Uuid,
    ) -> ResultEngine<Option<Payment>> {
        Ok(self
            .event_payments_for(db, registration_id)
            .await?
            .into_iter()
            .find(|p| p.status == PaymentStatus::Succeeded))
    }
}

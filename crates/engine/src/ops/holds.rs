use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, QueryFilter, SqlErr, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    EngineError, Event, PaymentStatus, Registration, RegistrationStatus, ReserveCmd, ResultEngine,
    registrations,
};

use super::{Engine, with_tx};

/// Which registrations take a seat when counting occupancy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum SeatCount {
    /// Confirmed rows plus live holds; used to admit new holds.
    HoldsAndConfirmed,
    /// Confirmed rows only; used when a hold is converted into a seat.
    ConfirmedOnly,
}

impl Engine {
    /// Place a hold on one seat of `cmd.event_id` for `cmd.user_id`.
    ///
    /// Zero-price events skip the hold and confirm straight away. An expired
    /// or cancelled row for the same pair is revived in place, unless money
    /// was already captured for it.
    pub async fn reserve(&self, cmd: ReserveCmd, now: DateTime<Utc>) -> ResultEngine<Registration> {
        let event = self.require_event(cmd.event_id).await?;
        event.ensure_open(now)?;

        let registration = with_tx!(self, |db_tx| {
            let existing = registrations::Entity::find()
                .filter(registrations::Column::UserId.eq(cmd.user_id.clone()))
                .filter(registrations::Column::EventId.eq(event.id.to_string()))
                .one(&db_tx)
                .await?
                .map(Registration::try_from)
                .transpose()?;

            if let Some(existing) = &existing {
                if existing.is_confirmed() {
                    return Err(EngineError::AlreadyRegistered(format!(
                        "user {} is already registered for event {}",
                        cmd.user_id, event.id
                    )));
                }
                if existing.is_active && existing.has_live_hold(now) {
                    return Err(EngineError::HoldActive(format!(
                        "registration {} is held until {}",
                        existing.id,
                        existing.hold_until.unwrap_or(now).to_rfc3339()
                    )));
                }
                let captured = existing.payment_status == PaymentStatus::Succeeded
                    || self.succeeded_event_payment(&db_tx, existing.id).await?.is_some();
                if captured {
                    return Err(EngineError::InconsistentState(format!(
                        "registration {} has a settled payment and cannot be held again",
                        existing.id
                    )));
                }
            }

            let excluded = existing.as_ref().map(|r| r.id);
            let occupied = self
                .occupied_seats(&db_tx, event.id, now, excluded, SeatCount::HoldsAndConfirmed)
                .await?;
            if occupied >= event.capacity {
                return Err(EngineError::CapacityExceeded(format!(
                    "event {} has no seats left",
                    event.id
                )));
            }

            let hold_until = self.policy.hold_until(now);
            let registration = new_registration(&cmd.user_id, &event, excluded, now, hold_until);
            let model = registrations::ActiveModel::from(&registration);
            if existing.is_some() {
                model.update(&db_tx).await?;
            } else {
                model.insert(&db_tx).await.map_err(|err| match err.sql_err() {
                    Some(SqlErr::UniqueConstraintViolation(_)) => EngineError::AlreadyRegistered(
                        format!("user {} already has a registration for event {}", cmd.user_id, event.id),
                    ),
                    _ => EngineError::Database(err),
                })?;
            }
            Ok(registration)
        })?;

        tracing::info!(
            registration_id = %registration.id,
            user_id = %registration.user_id,
            event_id = %registration.event_id,
            status = registration.status.as_str(),
            "registration reserved"
        );
        Ok(registration)
    }

    /// Number of seats of `event_id` taken at `now`, ignoring `exclude`.
    pub(super) async fn occupied_seats<C: ConnectionTrait>(
        &self,
        db: &C,
        event_id: Uuid,
        now: DateTime<Utc>,
        exclude: Option<Uuid>,
        count: SeatCount,
    ) -> ResultEngine<i64> {
        let models = registrations::Entity::find()
            .filter(registrations::Column::EventId.eq(event_id.to_string()))
            .filter(registrations::Column::IsActive.eq(true))
            .filter(registrations::Column::Status.is_in([
                RegistrationStatus::Pending.as_str(),
                RegistrationStatus::Confirmed.as_str(),
            ]))
            .all(db)
            .await?;

        let mut occupied = 0;
        for model in models {
            let registration = Registration::try_from(model)?;
            if Some(registration.id) == exclude {
                continue;
            }
            let takes_seat = match count {
                SeatCount::HoldsAndConfirmed => registration.occupies_capacity(now),
                SeatCount::ConfirmedOnly => registration.is_confirmed(),
            };
            if takes_seat {
                occupied += 1;
            }
        }
        Ok(occupied)
    }

    /// Re-check, inside a unit of work, that `registration` can still become
    /// a confirmed seat.
    pub(super) async fn ensure_seat_available<C: ConnectionTrait>(
        &self,
        db: &C,
        event: &Event,
        registration: &Registration,
        now: DateTime<Utc>,
    ) -> ResultEngine<()> {
        if !registration.is_active || !registration.has_live_hold(now) {
            return Err(EngineError::HoldExpired(format!(
                "hold of registration {} has expired",
                registration.id
            )));
        }
        let confirmed = self
            .occupied_seats(
                db,
                event.id,
                now,
                Some(registration.id),
                SeatCount::ConfirmedOnly,
            )
            .await?;
        if confirmed >= event.capacity {
            return Err(EngineError::CapacityExceeded(format!(
                "event {} sold out while the hold was pending",
                event.id
            )));
        }
        Ok(())
    }
}

fn new_registration(
    user_id: &str,
    event: &Event,
    revived_id: Option<Uuid>,
    now: DateTime<Utc>,
    hold_until: DateTime<Utc>,
) -> Registration {
    let (status, payment_status, hold_until) = if event.is_free() {
        (RegistrationStatus::Confirmed, PaymentStatus::Succeeded, None)
    } else {
        (
            RegistrationStatus::Pending,
            PaymentStatus::Pending,
            Some(hold_until),
        )
    };
    Registration {
        id: revived_id.unwrap_or_else(Uuid::new_v4),
        user_id: user_id.to_string(),
        event_id: event.id,
        status,
        payment_status,
        payment_amount_minor: event.price.amount_minor,
        currency: event.price.currency,
        hold_until,
        is_active: true,
        registered_at: now,
        cancelled_at: None,
    }
}

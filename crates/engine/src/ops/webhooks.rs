use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DatabaseTransaction, QueryFilter, TransactionTrait, prelude::*};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    EngineError, Event, GatewayEvent, GatewayEventKind, Payment, PaymentPurpose, PaymentStatus,
    ReceiptKind, RegistrationStatus, ResultEngine, WalletTxKind,
    commands::ConfirmRegistrationCommand, payments,
};

use super::{Engine, settlement::receipt, with_tx};

/// How an inbound gateway event was applied.
///
/// The webhook endpoint acknowledges every outcome; the variants only feed
/// logs and tests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Payment settled and its purpose-specific effect applied.
    Applied,
    /// Payment recorded as failed.
    Failed,
    /// The event was already applied.
    Duplicate,
    /// Money captured but the hold lapsed (or the seats ran out) before the
    /// callback arrived; the registration stays unconfirmed.
    SettledUnconfirmed,
    /// The registration was already paid by another payment; the capture
    /// went to the wallet instead.
    CreditedToWallet,
    /// Unknown intent or an event kind that carries no state change.
    Ignored,
    /// Applying the event failed; the cause is logged.
    Rejected(String),
}

impl Engine {
    /// Apply one verified gateway event. Never fails: errors are logged and
    /// reported as [`WebhookOutcome::Rejected`] so the gateway stops
    /// retrying.
    pub async fn handle_gateway_webhook(
        &self,
        event: GatewayEvent,
        now: DateTime<Utc>,
    ) -> WebhookOutcome {
        let applied = match &event.kind {
            GatewayEventKind::Succeeded => self.apply_success(&event, now).await,
            kind if kind.is_failure() => self.apply_failure(&event, now).await,
            GatewayEventKind::Other(name) => {
                tracing::debug!(intent_id = %event.intent_id, kind = %name, "gateway event ignored");
                Ok(WebhookOutcome::Ignored)
            }
            _ => Ok(WebhookOutcome::Ignored),
        };

        match applied {
            Ok(outcome) => {
                tracing::info!(
                    intent_id = %event.intent_id,
                    kind = ?event.kind,
                    outcome = ?outcome,
                    "gateway event handled"
                );
                outcome
            }
            Err(err) => {
                tracing::warn!(
                    intent_id = %event.intent_id,
                    kind = ?event.kind,
                    "gateway event rejected: {err}"
                );
                WebhookOutcome::Rejected(err.to_string())
            }
        }
    }

    async fn apply_failure(
        &self,
        event: &GatewayEvent,
        now: DateTime<Utc>,
    ) -> ResultEngine<WebhookOutcome> {
        with_tx!(self, |db_tx| {
            self.record_failure(&db_tx, event, now).await
        })
    }

    async fn record_failure(
        &self,
        db_tx: &DatabaseTransaction,
        event: &GatewayEvent,
        now: DateTime<Utc>,
    ) -> ResultEngine<WebhookOutcome> {
        let Some(payment) = self.find_webhook_payment(db_tx, event).await? else {
            tracing::info!(intent_id = %event.intent_id, "failure for unknown intent");
            return Ok(WebhookOutcome::Ignored);
        };
        let failed = self
            .transition_payment(
                db_tx,
                payment.id,
                &[PaymentStatus::Pending],
                PaymentStatus::Failed,
                now,
            )
            .await?;
        if !failed {
            return Ok(WebhookOutcome::Duplicate);
        }

        match payment.purpose {
            PaymentPurpose::EventPayment => {
                if let Some(registration_id) = payment.registration_id {
                    self.mark_registration_payment_failed(db_tx, registration_id)
                        .await?;
                }
            }
            PaymentPurpose::VendorFee => {
                if let Some(application_id) = payment.vendor_application_id {
                    self.vendors.fail_payment(db_tx, application_id).await?;
                }
            }
            PaymentPurpose::WalletTopup => {}
        }
        Ok(WebhookOutcome::Failed)
    }

    async fn apply_success(
        &self,
        event: &GatewayEvent,
        now: DateTime<Utc>,
    ) -> ResultEngine<WebhookOutcome> {
        let Some(found) = self.find_webhook_payment(&self.database, event).await? else {
            tracing::warn!(intent_id = %event.intent_id, "success for unknown intent");
            return Ok(WebhookOutcome::Ignored);
        };
        if found.status.is_settled() {
            return Ok(WebhookOutcome::Duplicate);
        }
        if let Some(received) = event.amount {
            if received.currency != found.currency {
                return Err(EngineError::CurrencyMismatch(format!(
                    "payment {} is in {}, gateway captured {}",
                    found.id, found.currency, received.currency
                )));
            }
            if received.amount_minor < found.amount_minor {
                return Err(EngineError::InvalidAmount(format!(
                    "payment {} expects {}, gateway captured {received}",
                    found.id,
                    found.amount()
                )));
            }
        }

        // Directory lookups own their connection, so they run before the
        // unit of work opens.
        let catalog_event = match (found.purpose, found.event_id) {
            (PaymentPurpose::EventPayment, Some(event_id)) => {
                self.events.find_event(event_id).await?
            }
            _ => None,
        };

        let (outcome, payment) = with_tx!(self, |db_tx| {
            self.settle_success(&db_tx, found.id, catalog_event.as_ref(), now)
                .await
        })?;

        let subject = match (payment.purpose, &catalog_event) {
            (PaymentPurpose::EventPayment, Some(event)) => event.title.clone(),
            (PaymentPurpose::EventPayment, None) => "Event registration".to_string(),
            (PaymentPurpose::WalletTopup, _) => "Wallet top-up".to_string(),
            (PaymentPurpose::VendorFee, _) => "Vendor application fee".to_string(),
        };
        match outcome {
            WebhookOutcome::Applied | WebhookOutcome::SettledUnconfirmed => {
                self.send_receipt(
                    &payment.user_id,
                    receipt(ReceiptKind::Payment, &payment, subject, now),
                )
                .await;
            }
            WebhookOutcome::CreditedToWallet => {
                self.send_receipt(
                    &payment.user_id,
                    receipt(ReceiptKind::Refund, &payment, subject, now),
                )
                .await;
            }
            _ => {}
        }
        Ok(outcome)
    }

    async fn settle_success(
        &self,
        db_tx: &DatabaseTransaction,
        payment_id: Uuid,
        catalog_event: Option<&Event>,
        now: DateTime<Utc>,
    ) -> ResultEngine<(WebhookOutcome, Payment)> {
        let payment = self.require_payment(db_tx, payment_id).await?;
        // Concurrent deliveries of the same event race here; only one of
        // them moves the row.
        let settled = self
            .transition_payment(
                db_tx,
                payment.id,
                &[PaymentStatus::Pending, PaymentStatus::Failed],
                PaymentStatus::Succeeded,
                now,
            )
            .await?;
        if !settled {
            return Ok((WebhookOutcome::Duplicate, payment));
        }

        let outcome = match payment.purpose {
            PaymentPurpose::WalletTopup => {
                self.append_ledger(
                    db_tx,
                    &payment.user_id,
                    WalletTxKind::CreditTopup,
                    payment.amount(),
                    payment.id.to_string(),
                    now,
                )
                .await?;
                WebhookOutcome::Applied
            }
            PaymentPurpose::VendorFee => {
                let application_id = payment.vendor_application_id.ok_or_else(|| {
                    EngineError::InconsistentState(format!(
                        "vendor fee payment {} has no application",
                        payment.id
                    ))
                })?;
                self.vendors.mark_paid(db_tx, application_id, now).await?;
                WebhookOutcome::Applied
            }
            PaymentPurpose::EventPayment => {
                self.settle_event_payment(db_tx, &payment, catalog_event, now)
                    .await?
            }
        };

        let mut payment = payment;
        payment.status = match outcome {
            WebhookOutcome::CreditedToWallet => PaymentStatus::Refunded,
            _ => PaymentStatus::Succeeded,
        };
        payment.updated_at = now;
        Ok((outcome, payment))
    }

    async fn settle_event_payment(
        &self,
        db_tx: &DatabaseTransaction,
        payment: &Payment,
        catalog_event: Option<&Event>,
        now: DateTime<Utc>,
    ) -> ResultEngine<WebhookOutcome> {
        let registration_id = payment.registration_id.ok_or_else(|| {
            EngineError::InconsistentState(format!(
                "event payment {} has no registration",
                payment.id
            ))
        })?;

        let paid_elsewhere = self
            .event_payments_for(db_tx, registration_id)
            .await?
            .iter()
            .any(|p| p.id != payment.id && p.status == PaymentStatus::Succeeded);
        if paid_elsewhere {
            self.credit_capture_to_wallet(db_tx, payment, now).await?;
            tracing::warn!(
                payment_id = %payment.id,
                %registration_id,
                "registration already paid, capture credited to wallet"
            );
            return Ok(WebhookOutcome::CreditedToWallet);
        }

        let registration = self.require_registration(db_tx, registration_id).await?;
        if registration.status == RegistrationStatus::Cancelled || !registration.is_active {
            self.credit_capture_to_wallet(db_tx, payment, now).await?;
            tracing::warn!(
                payment_id = %payment.id,
                %registration_id,
                "registration cancelled before capture, credited to wallet"
            );
            return Ok(WebhookOutcome::CreditedToWallet);
        }

        let Some(event) = catalog_event else {
            tracing::warn!(payment_id = %payment.id, "event of settled payment not found");
            return Ok(WebhookOutcome::SettledUnconfirmed);
        };
        match self
            .ensure_seat_available(db_tx, event, &registration, now)
            .await
        {
            Ok(()) => {
                self.confirm_registration(db_tx, ConfirmRegistrationCommand::paid(registration_id))
                    .await?;
                self.supersede_card_payments(db_tx, registration_id, now)
                    .await?;
                Ok(WebhookOutcome::Applied)
            }
            Err(err @ (EngineError::HoldExpired(_) | EngineError::CapacityExceeded(_))) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    %registration_id,
                    "payment settled but registration left unconfirmed: {err}"
                );
                Ok(WebhookOutcome::SettledUnconfirmed)
            }
            Err(err) => Err(err),
        }
    }

    /// Resolve the local payment of a gateway event: the payment id carried
    /// in the metadata first, then the intent id.
    async fn find_webhook_payment<C: ConnectionTrait>(
        &self,
        db: &C,
        event: &GatewayEvent,
    ) -> ResultEngine<Option<Payment>> {
        if let Some(payment_id) = event.metadata.payment_id {
            let by_id = payments::Entity::find_by_id(payment_id.to_string())
                .one(db)
                .await?
                .map(Payment::try_from)
                .transpose()?;
            if let Some(payment) = by_id {
                if payment.external_intent_id.as_deref() == Some(event.intent_id.as_str()) {
                    return Ok(Some(payment));
                }
            }
        }

        payments::Entity::find()
            .filter(payments::Column::ExternalIntentId.eq(event.intent_id.clone()))
            .one(db)
            .await?
            .map(Payment::try_from)
            .transpose()
    }
}

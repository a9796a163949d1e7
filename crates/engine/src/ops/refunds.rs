use chrono::{DateTime, Utc};
use sea_orm::{DatabaseTransaction, TransactionTrait};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    CancelCmd, EngineError, Money, Payment, PaymentPurpose, PaymentStatus, ReceiptKind, RefundCmd,
    RegistrationStatus, ResultEngine, WalletTxKind,
};

use super::{Engine, settlement::receipt, with_tx};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RefundReceipt {
    pub payment_id: Uuid,
    pub registration_id: Option<Uuid>,
    pub refunded: Money,
    /// The `CREDIT_REFUND` ledger entry.
    pub ledger_entry_id: Uuid,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The settled payment went back to the wallet.
    Refunded(RefundReceipt),
    /// Nothing was captured; the registration was only cancelled.
    Cancelled { registration_id: Uuid },
}

fn ensure_refundable(payment: &Payment) -> ResultEngine<()> {
    match payment.status {
        PaymentStatus::Succeeded => {}
        PaymentStatus::Refunded => {
            return Err(EngineError::AlreadyRefunded(format!(
                "payment {} is already refunded",
                payment.id
            )));
        }
        other => {
            return Err(EngineError::InconsistentState(format!(
                "payment {} is {} and cannot be refunded",
                payment.id,
                other.as_str()
            )));
        }
    }
    if payment.purpose != PaymentPurpose::EventPayment {
        return Err(EngineError::InconsistentState(format!(
            "only event payments can be refunded, payment {} is {}",
            payment.id,
            payment.purpose.as_str()
        )));
    }
    Ok(())
}

impl Engine {
    /// Refund a settled event payment into the payer's wallet and cancel its
    /// registration.
    ///
    /// Only allowed while the event is at least the policy's refund window
    /// away.
    pub async fn refund_to_wallet(
        &self,
        cmd: RefundCmd,
        now: DateTime<Utc>,
    ) -> ResultEngine<RefundReceipt> {
        let payment = self
            .require_owned_payment(&self.database, cmd.payment_id, &cmd.user_id)
            .await?;
        ensure_refundable(&payment)?;
        let event_id = payment.event_id.ok_or_else(|| {
            EngineError::InconsistentState(format!("payment {} has no event", payment.id))
        })?;
        let event = self.require_event(event_id).await?;
        self.policy.ensure_refundable(event.start_date, now)?;

        let refund = with_tx!(self, |db_tx| {
            self.refund_in_tx(&db_tx, payment.id, now).await
        })?;

        tracing::info!(
            payment_id = %refund.payment_id,
            amount = %refund.refunded,
            "payment refunded to wallet"
        );
        self.send_receipt(
            &payment.user_id,
            receipt(ReceiptKind::Refund, &payment, event.title.as_str(), now),
        )
        .await;
        Ok(refund)
    }

    /// Cancel a registration. A settled payment is refunded to the wallet;
    /// otherwise the registration is simply closed.
    ///
    /// Which of the two happens is decided inside the unit of work, against
    /// the rows as they are when it runs.
    pub async fn cancel_with_refund(
        &self,
        cmd: CancelCmd,
        now: DateTime<Utc>,
    ) -> ResultEngine<CancelOutcome> {
        let registration = self
            .require_owned_registration(&self.database, cmd.registration_id, &cmd.user_id)
            .await?;
        if registration.status == RegistrationStatus::Cancelled {
            return Err(EngineError::InconsistentState(format!(
                "registration {} is already cancelled",
                registration.id
            )));
        }
        let event = self.require_event(registration.event_id).await?;
        self.policy.ensure_refundable(event.start_date, now)?;

        let (outcome, refunded) = with_tx!(self, |db_tx| {
            self.cancel_in_tx(&db_tx, registration.id, now).await
        })?;

        match refunded {
            Some(payment) => {
                tracing::info!(
                    registration_id = %registration.id,
                    amount = %payment.amount(),
                    "registration cancelled with refund"
                );
                self.send_receipt(
                    &payment.user_id,
                    receipt(ReceiptKind::Refund, &payment, event.title.as_str(), now),
                )
                .await;
            }
            None => tracing::info!(registration_id = %registration.id, "registration cancelled"),
        }
        Ok(outcome)
    }

    async fn cancel_in_tx(
        &self,
        db_tx: &DatabaseTransaction,
        registration_id: Uuid,
        now: DateTime<Utc>,
    ) -> ResultEngine<(CancelOutcome, Option<Payment>)> {
        let registration = self.require_registration(db_tx, registration_id).await?;
        if registration.status == RegistrationStatus::Cancelled {
            return Err(EngineError::InconsistentState(format!(
                "registration {} is already cancelled",
                registration.id
            )));
        }

        let settled = self
            .succeeded_event_payment(db_tx, registration.id)
            .await?
            .filter(|payment| payment.amount_minor > 0);
        if let Some(payment) = settled {
            let refund = self.refund_in_tx(db_tx, payment.id, now).await?;
            return Ok((CancelOutcome::Refunded(refund), Some(payment)));
        }

        self.cancel_registration(db_tx, &registration, registration.payment_status, now)
            .await?;
        self.supersede_card_payments(db_tx, registration.id, now)
            .await?;
        Ok((
            CancelOutcome::Cancelled {
                registration_id: registration.id,
            },
            None,
        ))
    }

    async fn refund_in_tx(
        &self,
        db_tx: &DatabaseTransaction,
        payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> ResultEngine<RefundReceipt> {
        let payment = self.require_payment(db_tx, payment_id).await?;
        ensure_refundable(&payment)?;
        let refunded = self
            .transition_payment(
                db_tx,
                payment.id,
                &[PaymentStatus::Succeeded],
                PaymentStatus::Refunded,
                now,
            )
            .await?;
        if !refunded {
            return Err(EngineError::AlreadyRefunded(format!(
                "payment {} is already refunded",
                payment.id
            )));
        }

        if let Some(registration_id) = payment.registration_id {
            // A capture that landed after a plain cancellation still has to
            // reach the wallet; the registration is closed already.
            let registration = self.require_registration(db_tx, registration_id).await?;
            if registration.status != RegistrationStatus::Cancelled {
                self.cancel_registration(db_tx, &registration, PaymentStatus::Refunded, now)
                    .await?;
            }
            self.supersede_card_payments(db_tx, registration_id, now)
                .await?;
        }
        let entry = self
            .append_ledger(
                db_tx,
                &payment.user_id,
                WalletTxKind::CreditRefund,
                payment.amount(),
                payment.id.to_string(),
                now,
            )
            .await?;

        Ok(RefundReceipt {
            payment_id: payment.id,
            registration_id: payment.registration_id,
            refunded: payment.amount(),
            ledger_entry_id: entry.id,
        })
    }
}

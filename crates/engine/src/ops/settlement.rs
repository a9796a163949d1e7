//! Write helpers shared by the payment, webhook and refund flows.
//!
//! Every helper takes the open transaction. Status changes are conditional
//! updates guarded on the expected current status, so two units of work
//! racing on the same row cannot both apply the transition.

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseTransaction, QueryFilter, prelude::*, sea_query::Expr};
use uuid::Uuid;

use crate::{
    EngineError, Money, Payment, PaymentMethod, PaymentPurpose, PaymentStatus, Receipt,
    ReceiptKind, Registration, RegistrationStatus, ResultEngine, WalletTransaction, WalletTxKind,
    commands::ConfirmRegistrationCommand, payments, registrations, wallet_transactions,
};

use super::Engine;

impl Engine {
    pub(super) async fn insert_payment(
        &self,
        db_tx: &DatabaseTransaction,
        payment: &Payment,
    ) -> ResultEngine<()> {
        payments::ActiveModel::from(payment).insert(db_tx).await?;
        Ok(())
    }

    /// Append one ledger entry. Entries are never updated afterwards.
    pub(super) async fn append_ledger(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: &str,
        kind: WalletTxKind,
        amount: Money,
        reference: String,
        now: DateTime<Utc>,
    ) -> ResultEngine<WalletTransaction> {
        let entry = WalletTransaction::new(user_id, kind, amount, reference, now)?;
        wallet_transactions::ActiveModel::from(&entry)
            .insert(db_tx)
            .await?;
        Ok(entry)
    }

    /// Move a payment to `to` if it is currently in one of `from`.
    ///
    /// Returns `false` when another writer got there first.
    pub(super) async fn transition_payment(
        &self,
        db_tx: &DatabaseTransaction,
        payment_id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
        now: DateTime<Utc>,
    ) -> ResultEngine<bool> {
        let result = payments::Entity::update_many()
            .col_expr(payments::Column::Status, Expr::value(to.as_str()))
            .col_expr(payments::Column::UpdatedAt, Expr::value(now))
            .filter(payments::Column::Id.eq(payment_id.to_string()))
            .filter(payments::Column::Status.is_in(from.iter().map(|s| s.as_str())))
            .exec(db_tx)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Confirm a pending registration.
    pub(super) async fn confirm_registration(
        &self,
        db_tx: &DatabaseTransaction,
        cmd: ConfirmRegistrationCommand,
    ) -> ResultEngine<()> {
        let result = registrations::Entity::update_many()
            .col_expr(
                registrations::Column::Status,
                Expr::value(RegistrationStatus::Confirmed.as_str()),
            )
            .col_expr(
                registrations::Column::PaymentStatus,
                Expr::value(cmd.payment_status.as_str()),
            )
            .col_expr(
                registrations::Column::HoldUntil,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .filter(registrations::Column::Id.eq(cmd.registration_id.to_string()))
            .filter(registrations::Column::Status.eq(RegistrationStatus::Pending.as_str()))
            .filter(registrations::Column::IsActive.eq(true))
            .exec(db_tx)
            .await?;
        if result.rows_affected != 1 {
            return Err(EngineError::InconsistentState(format!(
                "registration {} is no longer pending",
                cmd.registration_id
            )));
        }
        Ok(())
    }

    /// Cancel `expected`, recording `payment_status` for it.
    ///
    /// The update only applies while the row still has the status, payment
    /// status and activity it was read with.
    pub(super) async fn cancel_registration(
        &self,
        db_tx: &DatabaseTransaction,
        expected: &Registration,
        payment_status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> ResultEngine<()> {
        if expected.status == RegistrationStatus::Cancelled {
            return Err(EngineError::InconsistentState(format!(
                "registration {} is already cancelled",
                expected.id
            )));
        }
        let result = registrations::Entity::update_many()
            .col_expr(
                registrations::Column::Status,
                Expr::value(RegistrationStatus::Cancelled.as_str()),
            )
            .col_expr(
                registrations::Column::PaymentStatus,
                Expr::value(payment_status.as_str()),
            )
            .col_expr(registrations::Column::IsActive, Expr::value(false))
            .col_expr(
                registrations::Column::HoldUntil,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(registrations::Column::CancelledAt, Expr::value(Some(now)))
            .filter(registrations::Column::Id.eq(expected.id.to_string()))
            .filter(registrations::Column::Status.eq(expected.status.as_str()))
            .filter(registrations::Column::PaymentStatus.eq(expected.payment_status.as_str()))
            .filter(registrations::Column::IsActive.eq(expected.is_active))
            .exec(db_tx)
            .await?;
        if result.rows_affected != 1 {
            return Err(EngineError::InconsistentState(format!(
                "registration {} changed while it was being cancelled",
                expected.id
            )));
        }
        Ok(())
    }

    /// Send a capture that can no longer pay for its registration to the
    /// payer's wallet and mark the payment refunded.
    pub(super) async fn credit_capture_to_wallet(
        &self,
        db_tx: &DatabaseTransaction,
        payment: &Payment,
        now: DateTime<Utc>,
    ) -> ResultEngine<()> {
        self.append_ledger(
            db_tx,
            &payment.user_id,
            WalletTxKind::CreditRefund,
            payment.amount(),
            payment.id.to_string(),
            now,
        )
        .await?;
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
            return Err(EngineError::InconsistentState(format!(
                "payment {} left SUCCEEDED before it could be credited",
                payment.id
            )));
        }
        Ok(())
    }

    /// Record a failed card attempt on a registration that is still waiting
    /// for its money.
    pub(super) async fn mark_registration_payment_failed(
        &self,
        db_tx: &DatabaseTransaction,
        registration_id: Uuid,
    ) -> ResultEngine<()> {
        registrations::Entity::update_many()
            .col_expr(
                registrations::Column::PaymentStatus,
                Expr::value(PaymentStatus::Failed.as_str()),
            )
            .filter(registrations::Column::Id.eq(registration_id.to_string()))
            .filter(registrations::Column::Status.eq(RegistrationStatus::Pending.as_str()))
            .filter(registrations::Column::PaymentStatus.eq(PaymentStatus::Pending.as_str()))
            .exec(db_tx)
            .await?;
        Ok(())
    }

    /// Fail every pending card attempt of a registration; used when the
    /// registration is settled or closed some other way.
    pub(super) async fn supersede_card_payments(
        &self,
        db_tx: &DatabaseTransaction,
        registration_id: Uuid,
        now: DateTime<Utc>,
    ) -> ResultEngine<u64> {
        let result = payments::Entity::update_many()
            .col_expr(
                payments::Column::Status,
                Expr::value(PaymentStatus::Failed.as_str()),
            )
            .col_expr(payments::Column::UpdatedAt, Expr::value(now))
            .filter(payments::Column::RegistrationId.eq(registration_id.to_string()))
            .filter(payments::Column::Purpose.eq(PaymentPurpose::EventPayment.as_str()))
            .filter(payments::Column::Method.eq(PaymentMethod::Card.as_str()))
            .filter(payments::Column::Status.eq(PaymentStatus::Pending.as_str()))
            .exec(db_tx)
            .await?;
        Ok(result.rows_affected)
    }
}

/// Receipt for `payment`; the recipient name is filled in on dispatch.
pub(super) fn receipt(
    kind: ReceiptKind,
    payment: &Payment,
    subject: impl Into<String>,
    issued_at: DateTime<Utc>,
) -> Receipt {
    Receipt {
        kind,
        payment_id: payment.id,
        purpose: payment.purpose,
        amount: payment.amount(),
        subject: subject.into(),
        recipient_name: String::new(),
        issued_at,
    }
}

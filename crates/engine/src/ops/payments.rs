use chrono::{DateTime, Utc};
use sea_orm::{QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    CardPaymentCmd, Currency, EngineError, IntentMetadata, IntentRequest, Money, Payment,
    PaymentMethod, PaymentPurpose, PaymentStatus, ReceiptKind, RegistrationStatus, ResultEngine,
    TopUpCmd, VendorFeeCmd, VendorPaymentStatus, WalletPaymentCmd, WalletTxKind,
    commands::ConfirmRegistrationCommand, payments, util::normalize_page,
};

use super::{Engine, Page, settlement::receipt, with_tx};

/// What a client needs to finish a card payment with the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CardPaymentInit {
    pub payment_id: Uuid,
    pub client_secret: String,
    pub amount_minor: i64,
    pub currency: Currency,
}

impl From<(&Payment, String)> for CardPaymentInit {
    fn from((payment, client_secret): (&Payment, String)) -> Self {
        Self {
            payment_id: payment.id,
            client_secret,
            amount_minor: payment.amount_minor,
            currency: payment.currency,
        }
    }
}

impl Engine {
    /// Start the card payment of a held registration.
    ///
    /// Re-entry while the hold is live hands back the pending intent instead
    /// of opening a second one. Pending attempts of an expired hold are
    /// failed before the call is rejected with [`EngineError::HoldExpired`].
    pub async fn init_card_payment(
        &self,
        cmd: CardPaymentCmd,
        now: DateTime<Utc>,
    ) -> ResultEngine<CardPaymentInit> {
        let registration = self
            .require_owned_registration(&self.database, cmd.registration_id, &cmd.user_id)
            .await?;
        let event = self.require_event(registration.event_id).await?;
        if registration.is_confirmed() {
            return Err(EngineError::AlreadyPaid(format!(
                "registration {} is already confirmed",
                registration.id
            )));
        }
        if registration.status == RegistrationStatus::Cancelled || !registration.is_active {
            return Err(EngineError::InconsistentState(format!(
                "registration {} is cancelled",
                registration.id
            )));
        }

        let live = registration.has_live_hold(now);
        let pending = with_tx!(self, |db_tx| {
            let prior = self.event_payments_for(&db_tx, registration.id).await?;
            if prior.iter().any(|p| p.status == PaymentStatus::Succeeded) {
                return Err(EngineError::AlreadyPaid(format!(
                    "registration {} already has a settled payment",
                    registration.id
                )));
            }

            let mut reusable = None;
            for payment in prior
                .into_iter()
                .filter(|p| p.status == PaymentStatus::Pending && p.method == PaymentMethod::Card)
            {
                if live {
                    if reusable.is_none() && payment.client_secret.is_some() {
                        reusable = Some(payment);
                    }
                } else {
                    self.transition_payment(
                        &db_tx,
                        payment.id,
                        &[PaymentStatus::Pending],
                        PaymentStatus::Failed,
                        now,
                    )
                    .await?;
                    tracing::info!(payment_id = %payment.id, "stale card payment failed");
                }
            }
            Ok(reusable)
        })?;

        if let Some(payment) = pending {
            let secret = payment.client_secret.clone().unwrap_or_default();
            tracing::debug!(payment_id = %payment.id, "reusing pending card payment");
            return Ok(CardPaymentInit::from((&payment, secret)));
        }
        if !live {
            return Err(EngineError::HoldExpired(format!(
                "hold of registration {} has expired, reserve again",
                registration.id
            )));
        }

        let payment = Payment::new(
            cmd.user_id.as_str(),
            PaymentMethod::Card,
            PaymentPurpose::EventPayment,
            PaymentStatus::Pending,
            Money::new(registration.payment_amount_minor, registration.currency),
            now,
        )?
        .for_registration(registration.id, event.id);
        let metadata = IntentMetadata {
            user_id: cmd.user_id.clone(),
            purpose: Some(PaymentPurpose::EventPayment),
            payment_id: Some(payment.id),
            registration_id: Some(registration.id),
            event_id: Some(event.id),
            vendor_application_id: None,
        };
        self.open_card_payment(payment, metadata).await
    }

    /// Pay a held registration from the wallet and confirm it in one unit of
    /// work.
    pub async fn pay_with_wallet(
        &self,
        cmd: WalletPaymentCmd,
        now: DateTime<Utc>,
    ) -> ResultEngine<Payment> {
        // Fast-fail checks; all of them are repeated inside the transaction.
        let registration = self
            .require_owned_registration(&self.database, cmd.registration_id, &cmd.user_id)
            .await?;
        let event = self.require_event(registration.event_id).await?;
        self.require_user(&cmd.user_id).await?;
        if registration.is_confirmed() || registration.payment_status == PaymentStatus::Succeeded
        {
            return Err(EngineError::AlreadyPaid(format!(
                "registration {} is already paid",
                registration.id
            )));
        }
        let amount = Money::new(registration.payment_amount_minor, registration.currency);
        let balance = self
            .ledger_balance(&self.database, &cmd.user_id, amount.currency)
            .await?;
        if balance.amount_minor < amount.amount_minor {
            return Err(EngineError::InsufficientFunds(format!(
                "wallet balance {balance} is below {amount}"
            )));
        }

        let payment = with_tx!(self, |db_tx| {
            let registration = self
                .require_owned_registration(&db_tx, cmd.registration_id, &cmd.user_id)
                .await?;
            if registration.is_confirmed() {
                return Err(EngineError::AlreadyPaid(format!(
                    "registration {} is already paid",
                    registration.id
                )));
            }
            self.ensure_seat_available(&db_tx, &event, &registration, now)
                .await?;

            let balance = self
                .ledger_balance(&db_tx, &cmd.user_id, amount.currency)
                .await?;
            if balance.amount_minor < amount.amount_minor {
                return Err(EngineError::InsufficientFunds(format!(
                    "wallet balance {balance} is below {amount}"
                )));
            }

            let payment = Payment::new(
                cmd.user_id.as_str(),
                PaymentMethod::Wallet,
                PaymentPurpose::EventPayment,
                PaymentStatus::Succeeded,
                amount,
                now,
            )?
            .for_registration(registration.id, event.id);
            self.insert_payment(&db_tx, &payment).await?;
            self.append_ledger(
                &db_tx,
                &cmd.user_id,
                WalletTxKind::DebitPayment,
                amount,
                payment.id.to_string(),
                now,
            )
            .await?;
            self.confirm_registration(&db_tx, ConfirmRegistrationCommand::paid(registration.id))
                .await?;
            let superseded = self
                .supersede_card_payments(&db_tx, registration.id, now)
                .await?;
            if superseded > 0 {
                tracing::debug!(
                    registration_id = %registration.id,
                    superseded,
                    "pending card payments failed by wallet payment"
                );
            }
            Ok(payment)
        })?;

        tracing::info!(
            payment_id = %payment.id,
            registration_id = %cmd.registration_id,
            amount = %payment.amount(),
            "registration paid from wallet"
        );
        self.send_receipt(
            &cmd.user_id,
            receipt(ReceiptKind::Payment, &payment, event.title.as_str(), now),
        )
        .await;
        Ok(payment)
    }

    /// Open a card payment that credits the wallet once settled.
    pub async fn init_wallet_top_up(
        &self,
        cmd: TopUpCmd,
        now: DateTime<Utc>,
    ) -> ResultEngine<CardPaymentInit> {
        if cmd.amount_minor <= 0 {
            return Err(EngineError::InvalidAmount(
                "top-up amount_minor must be > 0".to_string(),
            ));
        }
        self.require_user(&cmd.user_id).await?;

        let payment = Payment::new(
            cmd.user_id.as_str(),
            PaymentMethod::Card,
            PaymentPurpose::WalletTopup,
            PaymentStatus::Pending,
            cmd.amount(),
            now,
        )?;
        let metadata = IntentMetadata {
            user_id: cmd.user_id.clone(),
            purpose: Some(PaymentPurpose::WalletTopup),
            payment_id: Some(payment.id),
            ..IntentMetadata::default()
        };
        self.open_card_payment(payment, metadata).await
    }

    /// Open (or resume) the card payment of a vendor application fee.
    pub async fn init_vendor_fee_payment(
        &self,
        cmd: VendorFeeCmd,
        now: DateTime<Utc>,
    ) -> ResultEngine<CardPaymentInit> {
        let application = self
            .vendors
            .find_application(cmd.application_id)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("vendor application not exists".to_string()))?;
        if application.user_id != cmd.user_id {
            return Err(EngineError::Forbidden(
                "vendor application belongs to another user".to_string(),
            ));
        }
        if application.payment_status == VendorPaymentStatus::Paid {
            return Err(EngineError::AlreadyPaid(format!(
                "vendor application {} is already paid",
                application.id
            )));
        }

        let pending = payments::Entity::find()
            .filter(payments::Column::VendorApplicationId.eq(application.id.to_string()))
            .filter(payments::Column::Purpose.eq(PaymentPurpose::VendorFee.as_str()))
            .filter(payments::Column::Status.eq(PaymentStatus::Pending.as_str()))
            .order_by_desc(payments::Column::CreatedAt)
            .one(&self.database)
            .await?
            .map(Payment::try_from)
            .transpose()?;
        if let Some(payment) = pending {
            if let Some(secret) = payment.client_secret.clone() {
                return Ok(CardPaymentInit::from((&payment, secret)));
            }
        }

        let payment = Payment::new(
            cmd.user_id.as_str(),
            PaymentMethod::Card,
            PaymentPurpose::VendorFee,
            PaymentStatus::Pending,
            application.fee,
            now,
        )?
        .for_vendor_application(application.id);
        let metadata = IntentMetadata {
            user_id: cmd.user_id.clone(),
            purpose: Some(PaymentPurpose::VendorFee),
            payment_id: Some(payment.id),
            vendor_application_id: Some(application.id),
            ..IntentMetadata::default()
        };
        self.open_card_payment(payment, metadata).await
    }

    /// Payments of `user_id`, newest first.
    pub async fn my_payments(
        &self,
        user_id: &str,
        page: u64,
        limit: u64,
    ) -> ResultEngine<Page<Payment>> {
        let (zero_based, limit) = normalize_page(page, limit);
        let query = payments::Entity::find()
            .filter(payments::Column::UserId.eq(user_id.to_string()));
        let total = query.clone().count(&self.database).await?;
        let items = query
            .order_by_desc(payments::Column::CreatedAt)
            .order_by_desc(payments::Column::Id)
            .offset(zero_based * limit)
            .limit(limit)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Payment::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;
        Ok(Page {
            items,
            page: zero_based + 1,
            limit,
            total,
        })
    }

    /// Ask the gateway for an intent, then persist the pending payment.
    ///
    /// The gateway call happens before the unit of work opens; if it fails
    /// nothing is written.
    async fn open_card_payment(
        &self,
        payment: Payment,
        metadata: IntentMetadata,
    ) -> ResultEngine<CardPaymentInit> {
        let intent = self
            .gateway
            .create_intent(IntentRequest {
                amount: payment.amount(),
                metadata,
            })
            .await?;
        let payment = payment.with_intent(intent.id, intent.client_secret.clone());

        with_tx!(self, |db_tx| {
            self.insert_payment(&db_tx, &payment).await?;
            Ok(())
        })?;

        tracing::info!(
            payment_id = %payment.id,
            purpose = payment.purpose.as_str(),
            amount = %payment.amount(),
            "card payment initialised"
        );
        Ok(CardPaymentInit::from((&payment, intent.client_secret)))
    }
}

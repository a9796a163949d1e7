//! Wallet ledger entries.
//!
//! The ledger is append-only: entries are inserted and never updated or
//! deleted. A wallet balance is always the fold `Σ credits − Σ debits` over a
//! user's entries in one currency; there is no stored balance to race on.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError, Money, ResultEngine, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletTxKind {
    DebitPayment,
    CreditRefund,
    CreditTopup,
}

impl WalletTxKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DebitPayment => "DEBIT_PAYMENT",
            Self::CreditRefund => "CREDIT_REFUND",
            Self::CreditTopup => "CREDIT_TOPUP",
        }
    }

    /// Sign applied to the (always positive) entry amount when folding.
    pub fn sign(self) -> i64 {
        match self {
            Self::DebitPayment => -1,
            Self::CreditRefund | Self::CreditTopup => 1,
        }
    }
}

impl TryFrom<&str> for WalletTxKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "DEBIT_PAYMENT" => Ok(Self::DebitPayment),
            "CREDIT_REFUND" => Ok(Self::CreditRefund),
            "CREDIT_TOPUP" => Ok(Self::CreditTopup),
            other => Err(EngineError::InconsistentState(format!(
                "invalid wallet transaction kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub user_id: String,
    pub kind: WalletTxKind,
    pub amount_minor: i64,
    pub currency: Currency,
    /// Payment id, registration id or a free-text note.
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn new(
        user_id: impl Into<String>,
        kind: WalletTxKind,
        amount: Money,
        reference: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if amount.amount_minor <= 0 {
            return Err(EngineError::InvalidAmount(
                "ledger amount_minor must be > 0".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            kind,
            amount_minor: amount.amount_minor,
            currency: amount.currency,
            reference: reference.into(),
            created_at,
        })
    }

    /// Signed contribution of this entry to the balance.
    #[must_use]
    pub fn signed_amount(&self) -> i64 {
        self.kind.sign() * self.amount_minor
    }
}

/// Folds ledger entries of a single currency into a balance.
pub fn fold_balance<'a>(
    currency: Currency,
    entries: impl IntoIterator<Item = &'a WalletTransaction>,
) -> ResultEngine<Money> {
    let mut total: i64 = 0;
    for entry in entries {
        if entry.currency != currency {
            continue;
        }
        total = total.checked_add(entry.signed_amount()).ok_or_else(|| {
            EngineError::InvalidAmount("wallet balance overflow".to_string())
        })?;
    }
    Ok(Money::new(total, currency))
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "wallet_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub amount_minor: i64,
    pub currency: String,
    pub reference: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&WalletTransaction> for ActiveModel {
    fn from(value: &WalletTransaction) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            user_id: ActiveValue::Set(value.user_id.clone()),
            kind: ActiveValue::Set(value.kind.as_str().to_string()),
            amount_minor: ActiveValue::Set(value.amount_minor),
            currency: ActiveValue::Set(value.currency.code().to_string()),
            reference: ActiveValue::Set(value.reference.clone()),
            created_at: ActiveValue::Set(value.created_at),
        }
    }
}

impl TryFrom<Model> for WalletTransaction {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: parse_uuid(&model.id, "wallet transaction")?,
            user_id: model.user_id,
            kind: WalletTxKind::try_from(model.kind.as_str())?,
            amount_minor: model.amount_minor,
            currency: Currency::try_from(model.currency.as_str())?,
            reference: model.reference,
            created_at: model.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn entry(kind: WalletTxKind, amount_minor: i64, currency: Currency) -> WalletTransaction {
        WalletTransaction::new(
            "alice",
            kind,
            Money::new(amount_minor, currency),
            "note",
            Utc.timestamp_opt(0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn balance_is_credits_minus_debits() {
        let entries = vec![
            entry(WalletTxKind::CreditTopup, 5000, Currency::Eur),
            entry(WalletTxKind::DebitPayment, 1200, Currency::Eur),
            entry(WalletTxKind::CreditRefund, 1200, Currency::Eur),
            entry(WalletTxKind::DebitPayment, 300, Currency::Eur),
        ];

        let balance = fold_balance(Currency::Eur, &entries).unwrap();
        assert_eq!(balance, Money::new(4700, Currency::Eur));
    }

    #[test]
    fn balance_ignores_other_currencies() {
        let entries = vec![
            entry(WalletTxKind::CreditTopup, 5000, Currency::Eur),
            entry(WalletTxKind::CreditTopup, 700, Currency::Usd),
        ];

        assert_eq!(
            fold_balance(Currency::Usd, &entries).unwrap(),
            Money::new(700, Currency::Usd)
        );
    }

    #[test]
    fn entries_must_be_positive() {
        let err = WalletTransaction::new(
            "alice",
            WalletTxKind::CreditTopup,
            Money::new(-1, Currency::Eur),
            "note",
            Utc.timestamp_opt(0, 0).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)));
    }
}

use std::collections::BTreeMap;

use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder, QuerySelect, prelude::*};
use serde::Serialize;

use crate::{
    Currency, Money, ResultEngine, WalletTransaction, fold_balance, util::normalize_page,
    wallet_transactions,
};

use super::{Engine, Page};

/// Wallet balances per currency plus one page of the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WalletView {
    pub balances: Vec<Money>,
    pub entries: Page<WalletTransaction>,
}

impl Engine {
    /// Current wallet balance of `user_id` in `currency`.
    pub async fn wallet_balance(&self, user_id: &str, currency: Currency) -> ResultEngine<Money> {
        self.ledger_balance(&self.database, user_id, currency).await
    }

    /// Wallet overview: one balance per currency the user ever held, newest
    /// ledger entries first.
    pub async fn wallet(&self, user_id: &str, page: u64, limit: u64) -> ResultEngine<WalletView> {
        let entries = self.ledger_entries(&self.database, user_id).await?;

        let mut per_currency: BTreeMap<Currency, Vec<&WalletTransaction>> = BTreeMap::new();
        for entry in &entries {
            per_currency.entry(entry.currency).or_default().push(entry);
        }
        let balances = per_currency
            .into_iter()
            .map(|(currency, entries)| fold_balance(currency, entries))
            .collect::<ResultEngine<Vec<_>>>()?;

        let (zero_based, limit) = normalize_page(page, limit);
        let query = wallet_transactions::Entity::find()
            .filter(wallet_transactions::Column::UserId.eq(user_id.to_string()));
        let total = query.clone().count(&self.database).await?;
        let items = query
            .order_by_desc(wallet_transactions::Column::CreatedAt)
            .order_by_desc(wallet_transactions::Column::Id)
            .offset(zero_based * limit)
            .limit(limit)
            .all(&self.database)
            .await?
            .into_iter()
            .map(WalletTransaction::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;

        Ok(WalletView {
            balances,
            entries: Page {
                items,
                page: zero_based + 1,
                limit,
                total,
            },
        })
    }

    pub(super) async fn ledger_balance<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: &str,
        currency: Currency,
    ) -> ResultEngine<Money> {
        let entries = wallet_transactions::Entity::find()
            .filter(wallet_transactions::Column::UserId.eq(user_id.to_string()))
            .filter(wallet_transactions::Column::Currency.eq(currency.code()))
            .all(db)
            .await?
            .into_iter()
            .map(WalletTransaction::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;
        fold_balance(currency, &entries)
    }

    async fn ledger_entries<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: &str,
    ) -> ResultEngine<Vec<WalletTransaction>> {
        wallet_transactions::Entity::find()
            .filter(wallet_transactions::Column::UserId.eq(user_id.to_string()))
            .all(db)
            .await?
            .into_iter()
            .map(WalletTransaction::try_from)
            .collect()
    }
}

mod common;

use chrono::Duration;
use engine::{
    CancelCmd, Currency, Money, TopUpCmd, WalletPaymentCmd, WalletTransaction, WalletTxKind,
    fold_balance,
};

use common::{ALICE, BOB, EventSeed, fund_wallet, harness, now, reserve, seed_event, success_for};

/// Sum of credits minus sum of debits, computed independently of the engine.
fn expected(entries: &[WalletTransaction], currency: Currency) -> i64 {
    let credits: i64 = entries
        .iter()
        .filter(|e| e.currency == currency)
        .filter(|e| matches!(e.kind, WalletTxKind::CreditRefund | WalletTxKind::CreditTopup))
        .map(|e| e.amount_minor)
        .sum();
    let debits: i64 = entries
        .iter()
        .filter(|e| e.currency == currency)
        .filter(|e| e.kind == WalletTxKind::DebitPayment)
        .map(|e| e.amount_minor)
        .sum();
    credits - debits
}

#[tokio::test]
async fn balance_is_always_the_ledger_fold() {
    let h = harness().await;
    fund_wallet(&h, ALICE, 10_000).await;

    let mut registrations = Vec::new();
    for price in [1500, 2500, 999] {
        let event_id = seed_event(&h.db, EventSeed::priced(price, 5)).await;
        let registration = reserve(&h, ALICE, event_id).await;
        h.engine
            .pay_with_wallet(WalletPaymentCmd::new(ALICE, registration.id), now())
            .await
            .unwrap();
        registrations.push(registration.id);

        let view = h.engine.wallet(ALICE, 1, 100).await.unwrap();
        let balance = h.engine.wallet_balance(ALICE, Currency::Eur).await.unwrap();
        assert_eq!(balance.amount_minor, expected(&view.entries.items, Currency::Eur));
        assert_eq!(
            fold_balance(Currency::Eur, &view.entries.items).unwrap(),
            balance
        );
    }

    h.engine
        .cancel_with_refund(CancelCmd::new(ALICE, registrations[1]), now())
        .await
        .unwrap();

    let view = h.engine.wallet(ALICE, 1, 100).await.unwrap();
    assert_eq!(view.entries.total, 5);
    assert_eq!(
        view.balances,
        vec![Money::new(10_000 - 1500 - 999, Currency::Eur)]
    );
    assert_eq!(
        view.balances[0].amount_minor,
        expected(&view.entries.items, Currency::Eur)
    );
}

#[tokio::test]
async fn balances_are_kept_per_currency_and_user() {
    let h = harness().await;
    fund_wallet(&h, ALICE, 4000).await;
    fund_wallet(&h, BOB, 100).await;
    let usd = h
        .engine
        .init_wallet_top_up(TopUpCmd::new(ALICE, 250).currency(Currency::Usd), now())
        .await
        .unwrap();
    h.engine
        .handle_gateway_webhook(success_for(&h, usd.payment_id), now())
        .await;

    let view = h.engine.wallet(ALICE, 1, 10).await.unwrap();
    assert_eq!(
        view.balances,
        vec![
            Money::new(4000, Currency::Eur),
            Money::new(250, Currency::Usd)
        ]
    );
    assert_eq!(
        h.engine.wallet_balance(BOB, Currency::Eur).await.unwrap(),
        Money::new(100, Currency::Eur)
    );
    assert_eq!(
        h.engine.wallet_balance(BOB, Currency::Gbp).await.unwrap(),
        Money::zero(Currency::Gbp)
    );
}

#[tokio::test]
async fn wallet_entries_page_newest_first() {
    let h = harness().await;
    for i in 0..5_i64 {
        let init = h
            .engine
            .init_wallet_top_up(TopUpCmd::new(ALICE, 100 * (i + 1)), now())
            .await
            .unwrap();
        h.engine
            .handle_gateway_webhook(success_for(&h, init.payment_id), now() + Duration::minutes(i))
            .await;
    }

    let page = h.engine.wallet(ALICE, 2, 2).await.unwrap();
    assert_eq!(page.entries.total, 5);
    assert_eq!(page.entries.page, 2);
    let amounts: Vec<i64> = page.entries.items.iter().map(|e| e.amount_minor).collect();
    assert_eq!(amounts, vec![300, 200]);
    assert_eq!(page.balances, vec![Money::new(1500, Currency::Eur)]);
}

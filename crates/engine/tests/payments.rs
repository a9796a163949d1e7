mod common;

use chrono::Duration;
use engine::{
    CardPaymentCmd, Currency, EngineError, Money, PaymentMethod, PaymentPurpose, PaymentStatus,
    ReceiptKind, RegistrationStatus, TopUpCmd, WalletPaymentCmd,
};
use sea_orm::{ConnectionTrait, Statement};

use common::{
    ALICE, BOB, EventSeed, fund_wallet, harness, now, payment, registration_row, reserve,
    seed_event,
};

#[tokio::test]
async fn card_init_opens_one_intent_and_reuses_it() {
    let h = harness().await;
    let event_id = seed_event(&h.db, EventSeed::priced(2500, 10)).await;
    let registration = reserve(&h, ALICE, event_id).await;

    let first = h
        .engine
        .init_card_payment(CardPaymentCmd::new(ALICE, registration.id), now())
        .await
        .unwrap();
    assert_eq!(first.amount_minor, 2500);
    assert_eq!(first.currency, Currency::Eur);

    let request = h.gateway.request_for(first.payment_id);
    assert_eq!(request.amount, Money::new(2500, Currency::Eur));
    assert_eq!(request.metadata.user_id, ALICE);
    assert_eq!(request.metadata.purpose, Some(PaymentPurpose::EventPayment));
    assert_eq!(request.metadata.registration_id, Some(registration.id));
    assert_eq!(request.metadata.event_id, Some(event_id));

    let again = h
        .engine
        .init_card_payment(
            CardPaymentCmd::new(ALICE, registration.id),
            now() + Duration::minutes(5),
        )
        .await
        .unwrap();
    assert_eq!(again, first);
    assert_eq!(h.gateway.calls(), 1);

    let stored = payment(&h, ALICE, first.payment_id).await;
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert_eq!(stored.method, PaymentMethod::Card);
    assert_eq!(stored.external_intent_id, Some("pi_1".to_string()));
}

#[tokio::test]
async fn card_init_after_expiry_fails_stale_attempt() {
    let h = harness().await;
    let event_id = seed_event(&h.db, EventSeed::priced(2500, 10)).await;
    let registration = reserve(&h, ALICE, event_id).await;
    let first = h
        .engine
        .init_card_payment(CardPaymentCmd::new(ALICE, registration.id), now())
        .await
        .unwrap();

    let err = h
        .engine
        .init_card_payment(
            CardPaymentCmd::new(ALICE, registration.id),
            now() + Duration::minutes(16),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::HoldExpired(_)));
    assert_eq!(
        payment(&h, ALICE, first.payment_id).await.status,
        PaymentStatus::Failed
    );

    // A fresh hold gets a fresh intent.
    let later = now() + Duration::minutes(17);
    h.engine
        .reserve(engine::ReserveCmd::new(ALICE, event_id), later)
        .await
        .unwrap();
    let second = h
        .engine
        .init_card_payment(CardPaymentCmd::new(ALICE, registration.id), later)
        .await
        .unwrap();
    assert_ne!(second.payment_id, first.payment_id);
    assert_eq!(h.gateway.calls(), 2);
}

#[tokio::test]
async fn card_init_checks_ownership() {
    let h = harness().await;
    let event_id = seed_event(&h.db, EventSeed::priced(2500, 10)).await;
    let registration = reserve(&h, ALICE, event_id).await;

    let err = h
        .engine
        .init_card_payment(CardPaymentCmd::new(BOB, registration.id), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn gateway_failure_writes_nothing() {
    let h = harness().await;
    let event_id = seed_event(&h.db, EventSeed::priced(2500, 10)).await;
    let registration = reserve(&h, ALICE, event_id).await;
    *h.gateway.fail.lock().unwrap() = true;

    let err = h
        .engine
        .init_card_payment(CardPaymentCmd::new(ALICE, registration.id), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Gateway(_)));
    assert_eq!(h.engine.my_payments(ALICE, 1, 10).await.unwrap().total, 0);
}

#[tokio::test]
async fn wallet_payment_confirms_and_debits() {
    let h = harness().await;
    fund_wallet(&h, ALICE, 5000).await;
    let event_id = seed_event(&h.db, EventSeed::priced(1200, 10)).await;
    let registration = reserve(&h, ALICE, event_id).await;

    let paid = h
        .engine
        .pay_with_wallet(WalletPaymentCmd::new(ALICE, registration.id), now())
        .await
        .unwrap();

    assert_eq!(paid.status, PaymentStatus::Succeeded);
    assert_eq!(paid.method, PaymentMethod::Wallet);
    assert_eq!(
        h.engine.wallet_balance(ALICE, Currency::Eur).await.unwrap(),
        Money::new(3800, Currency::Eur)
    );
    assert_eq!(
        registration_row(&h.db, registration.id).await,
        ("CONFIRMED".to_string(), "SUCCEEDED".to_string(), true)
    );

    let receipts = h.notifier.receipts();
    let (email, receipt) = receipts.last().unwrap();
    assert_eq!(email, "alice@example.com");
    assert_eq!(receipt.kind, ReceiptKind::Payment);
    assert_eq!(receipt.payment_id, paid.id);
    assert_eq!(receipt.recipient_name, "ALICE");
    assert_eq!(receipt.amount.to_string(), "12.00 EUR");

    let err = h
        .engine
        .pay_with_wallet(WalletPaymentCmd::new(ALICE, registration.id), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyPaid(_)));
}

#[tokio::test]
async fn wallet_payment_needs_enough_balance() {
    let h = harness().await;
    fund_wallet(&h, ALICE, 1000).await;
    let event_id = seed_event(&h.db, EventSeed::priced(1200, 10)).await;
    let registration = reserve(&h, ALICE, event_id).await;

    let err = h
        .engine
        .pay_with_wallet(WalletPaymentCmd::new(ALICE, registration.id), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));
    assert_eq!(common::ledger_len(&h.db, ALICE).await, 1);
}

#[tokio::test]
async fn wallet_payment_balance_is_per_currency() {
    let h = harness().await;
    let usd = h
        .engine
        .init_wallet_top_up(TopUpCmd::new(ALICE, 9000).currency(Currency::Usd), now())
        .await
        .unwrap();
    h.engine
        .handle_gateway_webhook(common::success_for(&h, usd.payment_id), now())
        .await;
    let event_id = seed_event(&h.db, EventSeed::priced(1200, 10)).await;
    let registration = reserve(&h, ALICE, event_id).await;

    let err = h
        .engine
        .pay_with_wallet(WalletPaymentCmd::new(ALICE, registration.id), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));
}

#[tokio::test]
async fn wallet_payment_after_expiry_changes_nothing() {
    let h = harness().await;
    fund_wallet(&h, ALICE, 5000).await;
    let event_id = seed_event(&h.db, EventSeed::priced(1200, 10)).await;
    let registration = reserve(&h, ALICE, event_id).await;

    let err = h
        .engine
        .pay_with_wallet(
            WalletPaymentCmd::new(ALICE, registration.id),
            now() + Duration::minutes(15),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::HoldExpired(_)));
    assert_eq!(
        h.engine.wallet_balance(ALICE, Currency::Eur).await.unwrap(),
        Money::new(5000, Currency::Eur)
    );
    assert_eq!(
        registration_row(&h.db, registration.id).await.0,
        "PENDING".to_string()
    );
}

#[tokio::test]
async fn wallet_payment_supersedes_pending_card_attempt() {
    let h = harness().await;
    fund_wallet(&h, ALICE, 5000).await;
    let event_id = seed_event(&h.db, EventSeed::priced(1200, 10)).await;
    let registration = reserve(&h, ALICE, event_id).await;
    let card = h
        .engine
        .init_card_payment(CardPaymentCmd::new(ALICE, registration.id), now())
        .await
        .unwrap();

    h.engine
        .pay_with_wallet(WalletPaymentCmd::new(ALICE, registration.id), now())
        .await
        .unwrap();

    assert_eq!(
        payment(&h, ALICE, card.payment_id).await.status,
        PaymentStatus::Failed
    );
}

/// Two users hold the last seat at the same time (the advisory count let
/// both in); only one wallet payment may confirm.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_wallet_payments_fill_capacity_once() {
    let h = harness().await;
    fund_wallet(&h, ALICE, 5000).await;
    fund_wallet(&h, BOB, 5000).await;
    let event_id = seed_event(&h.db, EventSeed::priced(1200, 1)).await;

    let alice = reserve(&h, ALICE, event_id).await;
    // Bob's hold is written behind the admission check, as a racing
    // reservation would have done.
    let bob_id = uuid::Uuid::new_v4();
    let backend = h.db.get_database_backend();
    h.db.execute(Statement::from_sql_and_values(
        backend,
        "INSERT INTO registrations (id, user_id, event_id, status, payment_status, \
         payment_amount_minor, currency, hold_until, is_active, registered_at) \
         VALUES (?, ?, ?, 'PENDING', 'PENDING', 1200, 'EUR', ?, ?, ?)",
        vec![
            bob_id.to_string().into(),
            BOB.into(),
            event_id.to_string().into(),
            (now() + Duration::minutes(15)).into(),
            true.into(),
            now().into(),
        ],
    ))
    .await
    .unwrap();

    let (a, b) = tokio::join!(
        h.engine
            .pay_with_wallet(WalletPaymentCmd::new(ALICE, alice.id), now()),
        h.engine
            .pay_with_wallet(WalletPaymentCmd::new(BOB, bob_id), now()),
    );

    let results = [a, b];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let capacity_errors = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::CapacityExceeded(_))))
        .count();
    assert_eq!(ok, 1);
    assert_eq!(capacity_errors, 1);

    let confirmed = [
        registration_row(&h.db, alice.id).await.0,
        registration_row(&h.db, bob_id).await.0,
    ]
    .into_iter()
    .filter(|status| status == RegistrationStatus::Confirmed.as_str())
    .count();
    assert_eq!(confirmed, 1);

    // The loser's wallet is untouched.
    let total = h.engine.wallet_balance(ALICE, Currency::Eur).await.unwrap().amount_minor
        + h.engine.wallet_balance(BOB, Currency::Eur).await.unwrap().amount_minor;
    assert_eq!(total, 10_000 - 1200);
}

#[tokio::test]
async fn top_up_rejects_non_positive_amounts() {
    let h = harness().await;

    for amount in [0, -100] {
        let err = h
            .engine
            .init_wallet_top_up(TopUpCmd::new(ALICE, amount), now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)));
    }
    assert_eq!(h.gateway.calls(), 0);
}

#[tokio::test]
async fn my_payments_pages_newest_first() {
    let h = harness().await;
    for (i, amount) in [100, 200, 300].into_iter().enumerate() {
        h.engine
            .init_wallet_top_up(
                TopUpCmd::new(ALICE, amount),
                now() + Duration::minutes(i as i64),
            )
            .await
            .unwrap();
    }
    h.engine
        .init_wallet_top_up(TopUpCmd::new(BOB, 999), now())
        .await
        .unwrap();

    let first = h.engine.my_payments(ALICE, 1, 2).await.unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(first.page, 1);
    let amounts: Vec<i64> = first.items.iter().map(|p| p.amount_minor).collect();
    assert_eq!(amounts, vec![300, 200]);

    let second = h.engine.my_payments(ALICE, 2, 2).await.unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].amount_minor, 100);

    let clamped = h.engine.my_payments(ALICE, 0, 1_000).await.unwrap();
    assert_eq!(clamped.page, 1);
    assert_eq!(clamped.limit, 100);
}

mod common;

use chrono::Duration;
use engine::{
    CancelCmd, CancelOutcome, CardPaymentCmd, Currency, EngineError, Money, PaymentStatus,
    RefundCmd, TopUpCmd, WalletPaymentCmd, WalletTxKind,
};
use sea_orm::{ConnectionTrait, Statement};

use common::{
    ALICE, BOB, EventSeed, fund_wallet, harness, ledger_len, now, payment, registration_row,
    reserve, seed_event, success_for,
};

#[tokio::test]
async fn refund_inside_window_is_rejected() {
    let h = harness().await;
    fund_wallet(&h, ALICE, 5000).await;
    let mut seed = EventSeed::priced(1200, 10);
    seed.start_date = now() + Duration::days(10);
    let event_id = seed_event(&h.db, seed).await;
    let registration = reserve(&h, ALICE, event_id).await;
    let paid = h
        .engine
        .pay_with_wallet(WalletPaymentCmd::new(ALICE, registration.id), now())
        .await
        .unwrap();
    let entries_before = ledger_len(&h.db, ALICE).await;

    let err = h
        .engine
        .refund_to_wallet(RefundCmd::new(ALICE, paid.id), now())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::RefundWindowClosed(_)));
    assert_eq!(ledger_len(&h.db, ALICE).await, entries_before);
    assert_eq!(
        payment(&h, ALICE, paid.id).await.status,
        PaymentStatus::Succeeded
    );
}

#[tokio::test]
async fn wallet_payment_then_cancel_restores_balance() {
    let h = harness().await;
    fund_wallet(&h, ALICE, 5000).await;
    let before = h.engine.wallet_balance(ALICE, Currency::Eur).await.unwrap();
    let event_id = seed_event(&h.db, EventSeed::priced(1234, 10)).await;
    let registration = reserve(&h, ALICE, event_id).await;
    let paid = h
        .engine
        .pay_with_wallet(WalletPaymentCmd::new(ALICE, registration.id), now())
        .await
        .unwrap();

    let outcome = h
        .engine
        .cancel_with_refund(CancelCmd::new(ALICE, registration.id), now())
        .await
        .unwrap();

    let CancelOutcome::Refunded(refund) = outcome else {
        panic!("expected a refund, got {outcome:?}");
    };
    assert_eq!(refund.payment_id, paid.id);
    assert_eq!(refund.refunded, Money::new(1234, Currency::Eur));
    assert_eq!(
        h.engine.wallet_balance(ALICE, Currency::Eur).await.unwrap(),
        before
    );
    assert_eq!(
        registration_row(&h.db, registration.id).await,
        ("CANCELLED".to_string(), "REFUNDED".to_string(), false)
    );
    assert_eq!(
        payment(&h, ALICE, paid.id).await.status,
        PaymentStatus::Refunded
    );

    let wallet = h.engine.wallet(ALICE, 1, 1).await.unwrap();
    assert_eq!(wallet.entries.items[0].kind, WalletTxKind::CreditRefund);
    assert_eq!(wallet.entries.items[0].id, refund.ledger_entry_id);
}

#[tokio::test]
async fn card_payment_refunds_into_wallet() {
    let h = harness().await;
    let event_id = seed_event(&h.db, EventSeed::priced(2500, 10)).await;
    let registration = reserve(&h, ALICE, event_id).await;
    let init = h
        .engine
        .init_card_payment(CardPaymentCmd::new(ALICE, registration.id), now())
        .await
        .unwrap();
    h.engine
        .handle_gateway_webhook(success_for(&h, init.payment_id), now())
        .await;

    let refund = h
        .engine
        .refund_to_wallet(RefundCmd::new(ALICE, init.payment_id), now())
        .await
        .unwrap();

    assert_eq!(refund.registration_id, Some(registration.id));
    assert_eq!(
        h.engine.wallet_balance(ALICE, Currency::Eur).await.unwrap(),
        Money::new(2500, Currency::Eur)
    );

    let err = h
        .engine
        .refund_to_wallet(RefundCmd::new(ALICE, init.payment_id), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyRefunded(_)));
    assert_eq!(ledger_len(&h.db, ALICE).await, 1);

    // The seat is free again and the user may hold it anew.
    let again = reserve(&h, ALICE, event_id).await;
    assert_eq!(again.id, registration.id);
}

#[tokio::test]
async fn refund_checks_owner_status_and_purpose() {
    let h = harness().await;
    let top_up = fund_wallet(&h, ALICE, 5000).await;
    let event_id = seed_event(&h.db, EventSeed::priced(1200, 10)).await;
    let registration = reserve(&h, ALICE, event_id).await;
    let paid = h
        .engine
        .pay_with_wallet(WalletPaymentCmd::new(ALICE, registration.id), now())
        .await
        .unwrap();

    let err = h
        .engine
        .refund_to_wallet(RefundCmd::new(BOB, paid.id), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let err = h
        .engine
        .refund_to_wallet(RefundCmd::new(ALICE, top_up.payment_id), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InconsistentState(_)));

    let pending = h
        .engine
        .init_wallet_top_up(TopUpCmd::new(ALICE, 100), now())
        .await
        .unwrap();
    let err = h
        .engine
        .refund_to_wallet(RefundCmd::new(ALICE, pending.payment_id), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InconsistentState(_)));

    let err = h
        .engine
        .refund_to_wallet(RefundCmd::new(ALICE, uuid::Uuid::new_v4()), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
}

#[tokio::test]
async fn cancel_without_payment_only_closes_registration() {
    let h = harness().await;
    let event_id = seed_event(&h.db, EventSeed::priced(2500, 10)).await;
    let registration = reserve(&h, ALICE, event_id).await;
    let card = h
        .engine
        .init_card_payment(CardPaymentCmd::new(ALICE, registration.id), now())
        .await
        .unwrap();

    let outcome = h
        .engine
        .cancel_with_refund(CancelCmd::new(ALICE, registration.id), now())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        CancelOutcome::Cancelled {
            registration_id: registration.id
        }
    );
    assert_eq!(
        registration_row(&h.db, registration.id).await,
        ("CANCELLED".to_string(), "PENDING".to_string(), false)
    );
    assert_eq!(
        payment(&h, ALICE, card.payment_id).await.status,
        PaymentStatus::Failed
    );
    assert_eq!(ledger_len(&h.db, ALICE).await, 0);

    let err = h
        .engine
        .cancel_with_refund(CancelCmd::new(ALICE, registration.id), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InconsistentState(_)));
}

#[tokio::test]
async fn free_registration_cancels_without_ledger_entry() {
    let h = harness().await;
    let event_id = seed_event(&h.db, EventSeed::priced(0, 10)).await;
    let registration = reserve(&h, ALICE, event_id).await;

    let outcome = h
        .engine
        .cancel_with_refund(CancelCmd::new(ALICE, registration.id), now())
        .await
        .unwrap();

    assert!(matches!(outcome, CancelOutcome::Cancelled { .. }));
    assert_eq!(ledger_len(&h.db, ALICE).await, 0);
}

#[tokio::test]
async fn cancel_respects_refund_window() {
    let h = harness().await;
    let mut seed = EventSeed::priced(0, 10);
    seed.start_date = now() + Duration::days(3);
    let event_id = seed_event(&h.db, seed).await;
    let registration = reserve(&h, ALICE, event_id).await;

    let err = h
        .engine
        .cancel_with_refund(CancelCmd::new(ALICE, registration.id), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RefundWindowClosed(_)));

    let err = h
        .engine
        .cancel_with_refund(CancelCmd::new(BOB, registration.id), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

/// Cancelling while a wallet payment is in flight either refunds it or keeps
/// it from happening; the wallet always ends where it started.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_racing_wallet_payment_never_loses_money() {
    let h = harness().await;
    fund_wallet(&h, ALICE, 50_000).await;

    for _ in 0..25 {
        let before = h.engine.wallet_balance(ALICE, Currency::Eur).await.unwrap();
        let event_id = seed_event(&h.db, EventSeed::priced(1200, 10)).await;
        let registration = reserve(&h, ALICE, event_id).await;

        let (paid, cancelled) = tokio::join!(
            h.engine
                .pay_with_wallet(WalletPaymentCmd::new(ALICE, registration.id), now()),
            h.engine
                .cancel_with_refund(CancelCmd::new(ALICE, registration.id), now()),
        );

        let cancelled = cancelled.unwrap();
        match &paid {
            Ok(payment) => {
                let CancelOutcome::Refunded(refund) = &cancelled else {
                    panic!("paid registration cancelled without refund: {cancelled:?}");
                };
                assert_eq!(refund.payment_id, payment.id);
                assert_eq!(
                    common::payment(&h, ALICE, payment.id).await.status,
                    PaymentStatus::Refunded
                );
            }
            Err(err) => {
                assert!(
                    matches!(
                        err,
                        EngineError::HoldExpired(_) | EngineError::InconsistentState(_)
                    ),
                    "unexpected payment error {err:?}"
                );
                assert!(matches!(cancelled, CancelOutcome::Cancelled { .. }));
            }
        }
        assert_eq!(registration_row(&h.db, registration.id).await.0, "CANCELLED");
        assert_eq!(
            h.engine.wallet_balance(ALICE, Currency::Eur).await.unwrap(),
            before
        );
    }
}

#[tokio::test]
async fn settled_payment_of_cancelled_registration_is_refundable() {
    let h = harness().await;
    let event_id = seed_event(&h.db, EventSeed::priced(2500, 10)).await;
    let registration = reserve(&h, ALICE, event_id).await;
    let card = h
        .engine
        .init_card_payment(CardPaymentCmd::new(ALICE, registration.id), now())
        .await
        .unwrap();
    h.engine
        .cancel_with_refund(CancelCmd::new(ALICE, registration.id), now())
        .await
        .unwrap();
    // A capture recorded against the closed registration.
    let backend = h.db.get_database_backend();
    h.db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE payments SET status = 'SUCCEEDED' WHERE id = ?",
        vec![card.payment_id.to_string().into()],
    ))
    .await
    .unwrap();

    let refund = h
        .engine
        .refund_to_wallet(RefundCmd::new(ALICE, card.payment_id), now())
        .await
        .unwrap();

    assert_eq!(refund.refunded, Money::new(2500, Currency::Eur));
    assert_eq!(
        h.engine.wallet_balance(ALICE, Currency::Eur).await.unwrap(),
        Money::new(2500, Currency::Eur)
    );
    assert_eq!(
        registration_row(&h.db, registration.id).await,
        ("CANCELLED".to_string(), "PENDING".to_string(), false)
    );
    assert_eq!(
        payment(&h, ALICE, card.payment_id).await.status,
        PaymentStatus::Refunded
    );
}

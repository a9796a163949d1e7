#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use uuid::Uuid;

use engine::{
    CardPaymentInit, Currency, Engine, GatewayError, GatewayEvent, GatewayEventKind,
    IntentMetadata, IntentRequest, Money, Notifier, NotifyError, Payment, PaymentGateway,
    PaymentIntent, Receipt, ReserveCmd, TopUpCmd,
};
use migration::MigratorTrait;

pub const ALICE: &str = "alice";
pub const BOB: &str = "bob";

/// Fixed wall clock used by every test; events start a month later.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
}

/// Gateway that hands out sequential intents and remembers every request.
#[derive(Default)]
pub struct MockGateway {
    counter: AtomicUsize,
    pub requests: Mutex<Vec<(IntentRequest, PaymentIntent)>>,
    pub fail: Mutex<bool>,
}

impl MockGateway {
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn intent_for(&self, payment_id: Uuid) -> PaymentIntent {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|(req, _)| req.metadata.payment_id == Some(payment_id))
            .map(|(_, intent)| intent.clone())
            .expect("no intent for payment")
    }

    pub fn request_for(&self, payment_id: Uuid) -> IntentRequest {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|(req, _)| req.metadata.payment_id == Some(payment_id))
            .map(|(req, _)| req.clone())
            .expect("no request for payment")
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_intent(&self, request: IntentRequest) -> Result<PaymentIntent, GatewayError> {
        if *self.fail.lock().unwrap() {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let intent = PaymentIntent {
            id: format!("pi_{n}"),
            client_secret: format!("pi_{n}_secret_{}", Uuid::new_v4().simple()),
        };
        self.requests
            .lock()
            .unwrap()
            .push((request, intent.clone()));
        Ok(intent)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, Receipt)>>,
}

impl RecordingNotifier {
    pub fn receipts(&self) -> Vec<(String, Receipt)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_receipt(&self, email: &str, receipt: &Receipt) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((email.to_string(), receipt.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub engine: Engine,
    pub db: DatabaseConnection,
    pub gateway: Arc<MockGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

pub async fn harness() -> Harness {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    for user in [ALICE, BOB] {
        seed_user(&db, user).await;
    }

    let gateway = Arc::new(MockGateway::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = Engine::builder()
        .database(db.clone())
        .gateway(gateway.clone())
        .notifier(notifier.clone())
        .build()
        .await
        .unwrap();

    Harness {
        engine,
        db,
        gateway,
        notifier,
    }
}

pub async fn seed_user(db: &DatabaseConnection, username: &str) {
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "INSERT INTO users (username, password, email, display_name) VALUES (?, ?, ?, ?)",
        vec![
            username.into(),
            "password".into(),
            format!("{username}@example.com").into(),
            username.to_uppercase().into(),
        ],
    ))
    .await
    .unwrap();
}

pub struct EventSeed {
    pub price_minor: i64,
    pub currency: Currency,
    pub capacity: i64,
    pub start_date: DateTime<Utc>,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_archived: bool,
}

impl EventSeed {
    pub fn priced(price_minor: i64, capacity: i64) -> Self {
        Self {
            price_minor,
            currency: Currency::Eur,
            capacity,
            start_date: now() + Duration::days(30),
            registration_deadline: None,
            is_active: true,
            is_archived: false,
        }
    }
}

pub async fn seed_event(db: &DatabaseConnection, seed: EventSeed) -> Uuid {
    let id = Uuid::new_v4();
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "INSERT INTO events (id, title, capacity, price_minor, currency, start_date, \
         registration_deadline, is_active, is_archived) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        vec![
            id.to_string().into(),
            "RustLab".into(),
            seed.capacity.into(),
            seed.price_minor.into(),
            seed.currency.code().into(),
            seed.start_date.into(),
            seed.registration_deadline.into(),
            seed.is_active.into(),
            seed.is_archived.into(),
        ],
    ))
    .await
    .unwrap();
    id
}

pub async fn seed_vendor_application(db: &DatabaseConnection, user_id: &str, fee_minor: i64) -> Uuid {
    let id = Uuid::new_v4();
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "INSERT INTO vendor_applications (id, user_id, business_name, fee_minor, currency, \
         payment_status) VALUES (?, ?, ?, ?, ?, ?)",
        vec![
            id.to_string().into(),
            user_id.into(),
            "Crab Shack".into(),
            fee_minor.into(),
            "EUR".into(),
            "UNPAID".into(),
        ],
    ))
    .await
    .unwrap();
    id
}

/// Success event exactly as the gateway would send it for `payment_id`.
pub fn success_for(h: &Harness, payment_id: Uuid) -> GatewayEvent {
    event_for(h, payment_id, GatewayEventKind::Succeeded)
}

pub fn event_for(h: &Harness, payment_id: Uuid, kind: GatewayEventKind) -> GatewayEvent {
    let request = h.gateway.request_for(payment_id);
    let intent = h.gateway.intent_for(payment_id);
    GatewayEvent {
        kind,
        intent_id: intent.id,
        amount: Some(request.amount),
        metadata: request.metadata,
    }
}

/// Bare event without metadata, matched by intent id only.
pub fn success_by_intent(intent_id: &str, amount: Money) -> GatewayEvent {
    GatewayEvent {
        kind: GatewayEventKind::Succeeded,
        intent_id: intent_id.to_string(),
        amount: Some(amount),
        metadata: IntentMetadata::default(),
    }
}

/// Fund a wallet through a settled card top-up.
pub async fn fund_wallet(h: &Harness, user_id: &str, amount_minor: i64) -> CardPaymentInit {
    let init = h
        .engine
        .init_wallet_top_up(TopUpCmd::new(user_id, amount_minor), now())
        .await
        .unwrap();
    let outcome = h
        .engine
        .handle_gateway_webhook(success_for(h, init.payment_id), now())
        .await;
    assert_eq!(outcome, engine::WebhookOutcome::Applied);
    init
}

pub async fn reserve(h: &Harness, user_id: &str, event_id: Uuid) -> engine::Registration {
    h.engine
        .reserve(ReserveCmd::new(user_id, event_id), now())
        .await
        .unwrap()
}

pub async fn payment(h: &Harness, user_id: &str, payment_id: Uuid) -> Payment {
    h.engine
        .my_payments(user_id, 1, 100)
        .await
        .unwrap()
        .items
        .into_iter()
        .find(|p| p.id == payment_id)
        .expect("payment not listed")
}

pub async fn registration_row(db: &DatabaseConnection, registration_id: Uuid) -> (String, String, bool) {
    let backend = db.get_database_backend();
    let row = db
        .query_one(Statement::from_sql_and_values(
            backend,
            "SELECT status, payment_status, is_active FROM registrations WHERE id = ?",
            vec![registration_id.to_string().into()],
        ))
        .await
        .unwrap()
        .expect("registration row");
    (
        row.try_get("", "status").unwrap(),
        row.try_get("", "payment_status").unwrap(),
        row.try_get("", "is_active").unwrap(),
    )
}

pub async fn ledger_len(db: &DatabaseConnection, user_id: &str) -> i64 {
    let backend = db.get_database_backend();
    let row = db
        .query_one(Statement::from_sql_and_values(
            backend,
            "SELECT COUNT(*) AS n FROM wallet_transactions WHERE user_id = ?",
            vec![user_id.into()],
        ))
        .await
        .unwrap()
        .expect("count row");
    row.try_get("", "n").unwrap()
}

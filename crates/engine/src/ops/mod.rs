use std::{fmt, sync::Arc};

use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, DbErr, IsolationLevel, RuntimeErr};
use serde::Serialize;

use crate::{
    EngineError, EventDirectory, Notifier, PaymentGateway, PaymentPolicy, Receipt, ResultEngine,
    SqlDirectory, TracingNotifier, UserDirectory, VendorApplications,
};

mod access;
mod holds;
mod ledger;
mod payments;
mod refunds;
mod settlement;
mod webhooks;

pub use ledger::WalletView;
pub use payments::CardPaymentInit;
pub use refunds::{CancelOutcome, RefundReceipt};
pub use webhooks::WebhookOutcome;

/// Run a block inside a serializable DB transaction, committing on success and
/// rolling back on error.
///
/// `?`/`return` inside the block end the attempt with that result. Attempts
/// aborted by a concurrent writer (serialization failure, deadlock, busy
/// database) are replayed from scratch, up to [`MAX_TX_ATTEMPTS`] times, so
/// the replay's own checks report the domain error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let mut attempt: u32 = 1;
        loop {
            let $tx = match $self
                .database
                .begin_with_config($crate::ops::isolation_level(&$self.database), None)
                .await
            {
                Ok(tx) => tx,
                Err(err) => break Err($crate::EngineError::from(err)),
            };
            let result: $crate::ResultEngine<_> = async {
                let out: $crate::ResultEngine<_> = $body;
                out
            }
            .await;
            let result = match result {
                Ok(value) => $tx
                    .commit()
                    .await
                    .map(|()| value)
                    .map_err($crate::EngineError::from),
                Err(err) => {
                    if let Err(rollback_err) = $tx.rollback().await {
                        tracing::warn!("rollback failed: {rollback_err}");
                    }
                    Err(err)
                }
            };
            match result {
                Err(err)
                    if attempt < $crate::ops::MAX_TX_ATTEMPTS
                        && $crate::ops::is_write_conflict(&err) =>
                {
                    tracing::debug!(attempt, "unit of work aborted by a concurrent writer: {err}");
                    attempt += 1;
                }
                other => break other,
            }
        }
    }};
}

pub(crate) use with_tx;

/// Attempts of one unit of work before a write conflict is reported.
pub(crate) const MAX_TX_ATTEMPTS: u32 = 5;

/// SQLSTATEs (Postgres) and result codes (SQLite) of aborts a replay can fix.
const WRITE_CONFLICT_CODES: [&str; 4] = ["40001", "40P01", "5", "517"];

fn is_write_conflict_code(code: &str) -> bool {
    WRITE_CONFLICT_CODES.contains(&code)
}

/// Whether `err` is a transaction the database aborted because of a
/// concurrent writer rather than a problem with the work itself.
pub(crate) fn is_write_conflict(err: &EngineError) -> bool {
    let EngineError::Database(db_err) = err else {
        return false;
    };
    let runtime = match db_err {
        DbErr::Exec(runtime) | DbErr::Query(runtime) | DbErr::Conn(runtime) => runtime,
        _ => return false,
    };
    match runtime {
        RuntimeErr::SqlxError(sqlx_err) => sqlx_err
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| is_write_conflict_code(&code)),
        _ => false,
    }
}

/// SQLite serializes writers on its own and has no per-transaction isolation
/// level; every other backend runs units of work as `SERIALIZABLE`.
pub(crate) fn isolation_level(database: &DatabaseConnection) -> Option<IsolationLevel> {
    match database.get_database_backend() {
        DbBackend::Sqlite => None,
        _ => Some(IsolationLevel::Serializable),
    }
}

/// One page of a list query. `page` is 1-based.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
}

pub struct Engine {
    database: DatabaseConnection,
    events: Arc<dyn EventDirectory>,
    users: Arc<dyn UserDirectory>,
    vendors: Arc<dyn VendorApplications>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    policy: PaymentPolicy,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("database", &self.database)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    #[must_use]
    pub fn policy(&self) -> PaymentPolicy {
        self.policy
    }

    /// Dispatch a receipt to the user's email. Only ever called after
    /// commit; failures are logged.
    async fn send_receipt(&self, user_id: &str, mut receipt: Receipt) {
        let profile = match self.users.find_user(user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::warn!(user_id, "receipt not sent: user not found");
                return;
            }
            Err(err) => {
                tracing::warn!(user_id, "receipt not sent: {err}");
                return;
            }
        };
        receipt.recipient_name = profile.display_name;
        if let Err(err) = self.notifier.send_receipt(&profile.email, &receipt).await {
            tracing::warn!(
                user_id,
                payment_id = %receipt.payment_id,
                "failed to send receipt: {err}"
            );
        }
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: Option<DatabaseConnection>,
    events: Option<Arc<dyn EventDirectory>>,
    users: Option<Arc<dyn UserDirectory>>,
    vendors: Option<Arc<dyn VendorApplications>>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    notifier: Option<Arc<dyn Notifier>>,
    policy: PaymentPolicy,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = Some(db);
        self
    }

    /// Pass the required card gateway
    pub fn gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> EngineBuilder {
        self.gateway = Some(gateway);
        self
    }

    pub fn event_directory(mut self, events: Arc<dyn EventDirectory>) -> EngineBuilder {
        self.events = Some(events);
        self
    }

    pub fn user_directory(mut self, users: Arc<dyn UserDirectory>) -> EngineBuilder {
        self.users = Some(users);
        self
    }

    pub fn vendor_applications(mut self, vendors: Arc<dyn VendorApplications>) -> EngineBuilder {
        self.vendors = Some(vendors);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> EngineBuilder {
        self.notifier = Some(notifier);
        self
    }

    pub fn policy(mut self, policy: PaymentPolicy) -> EngineBuilder {
        self.policy = policy;
        self
    }

    /// Construct `Engine`
    ///
    /// Directories not set explicitly are served from the engine database;
    /// receipts default to the log.
    pub async fn build(self) -> ResultEngine<Engine> {
        let database = self
            .database
            .ok_or_else(|| EngineError::Configuration("database is required".to_string()))?;
        let gateway = self
            .gateway
            .ok_or_else(|| EngineError::Configuration("payment gateway is required".to_string()))?;

        let sql = Arc::new(SqlDirectory::new(database.clone()));
        Ok(Engine {
            events: self
                .events
                .unwrap_or_else(|| sql.clone() as Arc<dyn EventDirectory>),
            users: self
                .users
                .unwrap_or_else(|| sql.clone() as Arc<dyn UserDirectory>),
            vendors: self
                .vendors
                .unwrap_or_else(|| sql as Arc<dyn VendorApplications>),
            notifier: self
                .notifier
                .unwrap_or_else(|| Arc::new(TracingNotifier) as Arc<dyn Notifier>),
            gateway,
            database,
            policy: self.policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_and_deadlock_codes_are_replayed() {
        for code in ["40001", "40P01", "5", "517"] {
            assert!(is_write_conflict_code(code), "{code}");
        }
        // unique_violation, foreign_key_violation, SQLITE_CONSTRAINT
        for code in ["23505", "23503", "19", "2067"] {
            assert!(!is_write_conflict_code(code), "{code}");
        }
    }

    #[test]
    fn domain_and_non_sql_errors_are_not_replayed() {
        assert!(!is_write_conflict(&EngineError::CapacityExceeded(
            "sold out".to_string()
        )));
        assert!(!is_write_conflict(&EngineError::Database(DbErr::Custom(
            "40001".to_string()
        ))));
        assert!(!is_write_conflict(&EngineError::Database(DbErr::RecordNotFound(
            "payment".to_string()
        ))));
        assert!(!is_write_conflict(&EngineError::Database(DbErr::Exec(
            RuntimeErr::Internal("40001".to_string())
        ))));
    }
}

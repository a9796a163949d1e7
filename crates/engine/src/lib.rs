//! Payment, registration-hold and wallet-ledger engine.
//!
//! The [`Engine`] owns the money-moving rules of the registration platform:
//! seat holds, card and wallet payments, webhook reconciliation, refunds to
//! the wallet and the append-only wallet ledger. Events, users, vendor
//! applications, the card gateway and receipt delivery are collaborators
//! injected through [`EngineBuilder`].

pub use commands::{
    CancelCmd, CardPaymentCmd, RefundCmd, ReserveCmd, TopUpCmd, VendorFeeCmd, WalletPaymentCmd,
};
pub use currency::Currency;
pub use directory::{
    Event, EventDirectory, SqlDirectory, UserDirectory, UserProfile, VendorApplication,
    VendorApplications, VendorPaymentStatus,
};
pub use error::EngineError;
pub use gateway::{
    GatewayError, GatewayEvent, GatewayEventKind, IntentMetadata, IntentRequest, PaymentGateway,
    PaymentIntent,
};
pub use money::Money;
pub use notify::{Notifier, NotifyError, Receipt, ReceiptKind, TracingNotifier};
pub use ops::{
    CancelOutcome, CardPaymentInit, Engine, EngineBuilder, Page, RefundReceipt, WalletView,
    WebhookOutcome,
};
pub use payments::{Payment, PaymentMethod, PaymentPurpose, PaymentStatus};
pub use policy::PaymentPolicy;
pub use registrations::{Registration, RegistrationStatus};
pub use wallet_transactions::{WalletTransaction, WalletTxKind, fold_balance};

mod commands;
mod currency;
mod directory;
mod error;
mod events;
mod gateway;
mod money;
mod notify;
mod ops;
mod payments;
mod policy;
mod registrations;
mod users;
mod util;
mod vendor_applications;
mod wallet_transactions;

type ResultEngine<T> = Result<T, EngineError>;

//! Command structs for engine operations.
//!
//! These types group the parameters of write operations
//! (reserve/pay/top-up/refund/cancel), keeping call sites readable and
//! avoiding long argument lists.

use uuid::Uuid;

use crate::{Currency, Money, PaymentStatus};

/// Place a hold on one seat of an event.
#[derive(Clone, Debug)]
pub struct ReserveCmd {
    pub user_id: String,
    pub event_id: Uuid,
}

impl ReserveCmd {
    #[must_use]
    pub fn new(user_id: impl Into<String>, event_id: Uuid) -> Self {
        Self {
            user_id: user_id.into(),
            event_id,
        }
    }
}

/// Start (or resume) the card payment of a registration.
#[derive(Clone, Debug)]
pub struct CardPaymentCmd {
    pub user_id: String,
    pub registration_id: Uuid,
}

impl CardPaymentCmd {
    #[must_use]
    pub fn new(user_id: impl Into<String>, registration_id: Uuid) -> Self {
        Self {
            user_id: user_id.into(),
            registration_id,
        }
    }
}

/// Pay a registration from the wallet balance.
#[derive(Clone, Debug)]
pub struct WalletPaymentCmd {
    pub user_id: String,
    pub registration_id: Uuid,
}

impl WalletPaymentCmd {
    #[must_use]
    pub fn new(user_id: impl Into<String>, registration_id: Uuid) -> Self {
        Self {
            user_id: user_id.into(),
            registration_id,
        }
    }
}

/// Top up the wallet by card.
#[derive(Clone, Debug)]
pub struct TopUpCmd {
    pub user_id: String,
    pub amount_minor: i64,
    pub currency: Currency,
}

impl TopUpCmd {
    #[must_use]
    pub fn new(user_id: impl Into<String>, amount_minor: i64) -> Self {
        Self {
            user_id: user_id.into(),
            amount_minor,
            currency: Currency::default(),
        }
    }

    #[must_use]
    pub fn currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    #[must_use]
    pub fn amount(&self) -> Money {
        Money::new(self.amount_minor, self.currency)
    }
}

/// Pay the fee of a vendor application by card.
#[derive(Clone, Debug)]
pub struct VendorFeeCmd {
    pub user_id: String,
    pub application_id: Uuid,
}

impl VendorFeeCmd {
    #[must_use]
    pub fn new(user_id: impl Into<String>, application_id: Uuid) -> Self {
        Self {
            user_id: user_id.into(),
            application_id,
        }
    }
}

/// Refund a settled event payment into the wallet.
#[derive(Clone, Debug)]
pub struct RefundCmd {
    pub user_id: String,
    pub payment_id: Uuid,
}

impl RefundCmd {
    #[must_use]
    pub fn new(user_id: impl Into<String>, payment_id: Uuid) -> Self {
        Self {
            user_id: user_id.into(),
            payment_id,
        }
    }
}

/// Cancel a registration, refunding it when it was paid.
#[derive(Clone, Debug)]
pub struct CancelCmd {
    pub user_id: String,
    pub registration_id: Uuid,
}

impl CancelCmd {
    #[must_use]
    pub fn new(user_id: impl Into<String>, registration_id: Uuid) -> Self {
        Self {
            user_id: user_id.into(),
            registration_id,
        }
    }
}

/// Internal: flip a pending registration to confirmed once a payment settled.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ConfirmRegistrationCommand {
    pub registration_id: Uuid,
    pub payment_status: PaymentStatus,
}

impl ConfirmRegistrationCommand {
    pub(crate) fn paid(registration_id: Uuid) -> Self {
        Self {
            registration_id,
            payment_status: PaymentStatus::Succeeded,
        }
    }
}

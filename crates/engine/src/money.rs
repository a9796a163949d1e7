use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Currency;

/// An amount of **minor units** tagged with its currency.
///
/// The engine never uses floating point for money: wallet balances, prices and
/// ledger entries are all `i64` minor units. `Money` only adds the currency so
/// that balances can be reported per currency and receipts can print major
/// units.
///
/// # Examples
///
/// ```rust
/// use engine::{Currency, Money};
///
/// let amount = Money::new(12_34, Currency::Eur);
/// assert_eq!(amount.to_major_string(), "12.34");
/// assert_eq!(amount.to_string(), "12.34 EUR");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub amount_minor: i64,
    pub currency: Currency,
}

impl Money {
    #[must_use]
    pub const fn new(amount_minor: i64, currency: Currency) -> Self {
        Self {
            amount_minor,
            currency,
        }
    }

    #[must_use]
    pub const fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.amount_minor == 0
    }

    /// Checked addition (returns `None` on overflow or currency mismatch).
    #[must_use]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        if self.currency != rhs.currency {
            return None;
        }
        self.amount_minor
            .checked_add(rhs.amount_minor)
            .map(|amount_minor| Money::new(amount_minor, self.currency))
    }

    /// Checked subtraction (returns `None` on overflow or currency mismatch).
    #[must_use]
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        if self.currency != rhs.currency {
            return None;
        }
        self.amount_minor
            .checked_sub(rhs.amount_minor)
            .map(|amount_minor| Money::new(amount_minor, self.currency))
    }

    /// Formats the amount in major units without the currency code.
    #[must_use]
    pub fn to_major_string(self) -> String {
        let digits = u32::from(self.currency.minor_units());
        let sign = if self.amount_minor < 0 { "-" } else { "" };
        let abs = self.amount_minor.unsigned_abs();
        if digits == 0 {
            return format!("{sign}{abs}");
        }
        let scale = 10u64.pow(digits);
        let whole = abs / scale;
        let frac = abs % scale;
        format!("{sign}{whole}.{frac:0width$}", width = digits as usize)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_major_string(), self.currency)
    }
}

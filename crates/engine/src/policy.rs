use chrono::{DateTime, Duration, Utc};

use crate::{EngineError, ResultEngine};

/// Tunables of the hold and refund rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaymentPolicy {
    /// How long a pending registration keeps its seat.
    pub hold_duration: Duration,
    /// Minimum number of days between a refund and the event start.
    pub refund_window_days: i64,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self {
            hold_duration: Duration::minutes(15),
            refund_window_days: 14,
        }
    }
}

impl PaymentPolicy {
    pub fn new(hold_minutes: i64, refund_window_days: i64) -> ResultEngine<Self> {
        if hold_minutes <= 0 {
            return Err(EngineError::Configuration(
                "hold minutes must be > 0".to_string(),
            ));
        }
        if refund_window_days < 0 {
            return Err(EngineError::Configuration(
                "refund window days must be >= 0".to_string(),
            ));
        }
        Ok(Self {
            hold_duration: Duration::minutes(hold_minutes),
            refund_window_days,
        })
    }

    #[must_use]
    pub fn hold_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.hold_duration
    }

    /// Refunds are allowed while the event is at least `refund_window_days`
    /// away.
    pub fn ensure_refundable(
        &self,
        event_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ResultEngine<()> {
        if event_start - now < Duration::days(self.refund_window_days) {
            return Err(EngineError::RefundWindowClosed(format!(
                "refunds close {} days before the event",
                self.refund_window_days
            )));
        }
        Ok(())
    }
}

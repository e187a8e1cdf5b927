//! Quota arithmetic
//!
//! Pure functions over a subscription's quota counter. Stores call
//! [`Quota::consume`] inside their atomic read-modify-write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::error::EntitlementError;

/// Quota counter stored on a subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quota {
    /// Allowance for the period; `0` means unlimited
    pub limit: u32,

    /// Actions counted since `counted_since`
    #[serde(default)]
    pub consumed: u32,

    /// Instant the counter was last reset
    pub counted_since: DateTime<Utc>,
}

impl Quota {
    /// Fresh counter for a period starting at `period_start`
    pub fn new(limit: u32, period_start: DateTime<Utc>) -> Self {
        Self {
            limit,
            consumed: 0,
            counted_since: period_start,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit == 0
    }

    /// Consumption that counts against a period starting at `period_start`
    ///
    /// A counter last reset before the period began belongs to an earlier
    /// period and counts as zero.
    pub fn consumed_since(&self, period_start: DateTime<Utc>) -> u32 {
        if self.counted_since < period_start {
            0
        } else {
            self.consumed
        }
    }

    /// Remaining allowance within a period starting at `period_start`
    pub fn remaining_since(&self, period_start: DateTime<Utc>) -> Remaining {
        if self.is_unlimited() {
            return Remaining::Unlimited;
        }
        Remaining::Limited(self.limit.saturating_sub(self.consumed_since(period_start)))
    }

    /// Returns the counter after consuming `amount`, or the rejection
    ///
    /// Resets the counter first when it predates `period_start`.
    pub fn consume(
        &self,
        amount: u32,
        period_start: DateTime<Utc>,
    ) -> Result<Quota, QuotaExceeded> {
        let (current, counted_since) = if self.counted_since < period_start {
            (0, period_start)
        } else {
            (self.consumed, self.counted_since)
        };

        let exceeded = QuotaExceeded {
            limit: self.limit,
            consumed: current,
        };

        let Some(next) = current.checked_add(amount) else {
            return Err(exceeded);
        };

        if !self.is_unlimited() && next > self.limit {
            return Err(exceeded);
        }

        Ok(Quota {
            limit: self.limit,
            consumed: next,
            counted_since,
        })
    }
}

/// Rejected consumption, carrying the numbers for user-facing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaExceeded {
    pub limit: u32,
    pub consumed: u32,
}

impl From<QuotaExceeded> for EntitlementError {
    fn from(e: QuotaExceeded) -> Self {
        EntitlementError::QuotaExceeded {
            limit: e.limit,
            consumed: e.consumed,
        }
    }
}

/// Remaining allowance
///
/// Deliberately not an integer: `Unlimited` cannot be compared numerically.
/// Serializes as the string `"unlimited"` or a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Unlimited,
    Limited(u32),
}

impl Remaining {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// Whether at least `amount` more actions are allowed
    pub fn allows(&self, amount: u32) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(left) => *left >= amount,
        }
    }

    /// Remaining after one successful consumption of `amount`
    pub fn after(self, amount: u32) -> Self {
        match self {
            Self::Unlimited => Self::Unlimited,
            Self::Limited(left) => Self::Limited(left.saturating_sub(amount)),
        }
    }
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str("unlimited"),
            Self::Limited(left) => write!(f, "{}", left),
        }
    }
}

impl Serialize for Remaining {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unlimited => serializer.serialize_str("unlimited"),
            Self::Limited(left) => serializer.serialize_u32(*left),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_zero_limit_is_unlimited() {
        let start = Utc::now();
        let mut quota = Quota::new(0, start);
        quota.consumed = 1_000_000;

        assert_eq!(quota.remaining_since(start), Remaining::Unlimited);
        assert_eq!(quota.consume(5, start).unwrap().consumed, 1_000_005);
    }

    #[test]
    fn test_bounded_remaining() {
        let start = Utc::now();
        let mut quota = Quota::new(5, start);
        quota.consumed = 3;

        assert_eq!(quota.remaining_since(start), Remaining::Limited(2));

        quota.consumed = 9;
        assert_eq!(quota.remaining_since(start), Remaining::Limited(0));
    }

    #[test]
    fn test_consume_rejects_past_limit() {
        let start = Utc::now();
        let mut quota = Quota::new(5, start);
        quota.consumed = 5;

        let err = quota.consume(1, start).unwrap_err();
        assert_eq!(err, QuotaExceeded { limit: 5, consumed: 5 });
    }

    #[test]
    fn test_counter_from_previous_period_does_not_count() {
        let old_start = Utc::now() - Duration::days(60);
        let new_start = Utc::now();
        let mut quota = Quota::new(5, old_start);
        quota.consumed = 5;

        assert_eq!(quota.remaining_since(new_start), Remaining::Limited(5));

        let next = quota.consume(1, new_start).unwrap();
        assert_eq!(next.consumed, 1);
        assert_eq!(next.counted_since, new_start);
    }

    #[test]
    fn test_remaining_serialization() {
        assert_eq!(serde_json::to_string(&Remaining::Unlimited).unwrap(), "\"unlimited\"");
        assert_eq!(serde_json::to_string(&Remaining::Limited(3)).unwrap(), "3");
        assert!(Remaining::Limited(1).allows(1));
        assert!(!Remaining::Limited(0).allows(1));
        assert_eq!(Remaining::Limited(1).after(1), Remaining::Limited(0));
    }
}

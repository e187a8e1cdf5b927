//! Quota tracking with bounded conflict retry

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::ledger::Remaining;
use crate::engine::MetricsCollector;
use crate::error::{EntitlementError, Result};
use crate::store::SubscriptionStore;
use crate::types::Subscription;

/// Default number of store attempts per consumption
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Computes remaining allowance and performs atomic consumption
///
/// Consumption is a single store-level check-and-increment. A separate
/// "check" call followed by a later "increment" call would let concurrent
/// requests both pass the check and jointly overrun the limit.
pub struct QuotaTracker {
    store: Arc<dyn SubscriptionStore>,
    max_attempts: u32,
    metrics: Option<Arc<MetricsCollector>>,
}

impl QuotaTracker {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            metrics: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Remaining allowance counting only consumption since `consumed_since`
    pub fn remaining(subscription: &Subscription, consumed_since: DateTime<Utc>) -> Remaining {
        subscription.quota.remaining_since(consumed_since)
    }

    /// Remaining allowance within the subscription's own period
    pub fn remaining_in_period(subscription: &Subscription) -> Remaining {
        Self::remaining(subscription, subscription.start_date)
    }

    /// Atomically consume `amount` from a subscription's quota
    ///
    /// Returns the new consumption count. The store refuses records that
    /// are not effectively active at `now` with `SubscriptionInactive`,
    /// which is never retried. Store conflicts are retried up to the
    /// configured number of attempts; when they are exhausted the request
    /// is refused with `QuotaExceeded` rather than risking an overrun.
    pub async fn try_consume(
        &self,
        subscription_id: &str,
        amount: u32,
        now: DateTime<Utc>,
    ) -> Result<u32> {
        for attempt in 1..=self.max_attempts {
            match self.store.consume_quota(subscription_id, amount, now).await {
                Ok(consumed) => {
                    debug!(
                        "Consumed {} from {} (now {}, attempt {})",
                        amount, subscription_id, consumed, attempt
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_quota_consumed();
                    }
                    return Ok(consumed);
                }
                Err(e) if e.is_retryable() => {
                    debug!(
                        "Quota update conflict on {} (attempt {}/{}): {}",
                        subscription_id, attempt, self.max_attempts, e
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_conflict();
                    }
                }
                Err(e @ EntitlementError::QuotaExceeded { .. }) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_quota_exceeded();
                    }
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            "Giving up on quota update for {} after {} conflicting attempts",
            subscription_id, self.max_attempts
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_quota_exceeded();
        }

        let current = self.store.get_subscription(subscription_id).await?;
        if !current.is_effectively_active(now) {
            return Err(EntitlementError::SubscriptionInactive(subscription_id.to_string()));
        }
        Err(EntitlementError::QuotaExceeded {
            limit: current.quota.limit,
            consumed: current.quota.consumed_since(current.start_date),
        })
    }
}

//! Subscription record store

use crate::error::{EntitlementError, Result};
use crate::types::{Principal, PrincipalId, Subscription, SubscriptionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresSubscriptionStore;

/// Partial update of a subscription record
///
/// Only the active flag is externally mutable; quota consumption goes
/// through [`SubscriptionStore::consume_quota`].
#[derive(Debug, Clone, Default)]
pub struct SubscriptionPatch {
    pub is_active: Option<bool>,
}

impl SubscriptionPatch {
    pub fn deactivate() -> Self {
        Self {
            is_active: Some(false),
        }
    }

    fn apply(&self, subscription: &mut Subscription) {
        if let Some(is_active) = self.is_active {
            subscription.is_active = is_active;
        }
    }
}

/// Subscription store trait
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Get a principal by ID
    async fn get_principal(&self, id: &str) -> Result<Principal>;

    /// List a principal's subscriptions in stored order
    async fn get_subscriptions(&self, principal_id: &str) -> Result<Vec<Subscription>>;

    /// Get one subscription by ID
    async fn get_subscription(&self, id: &str) -> Result<Subscription>;

    /// Apply a partial update to a subscription
    async fn update_subscription(&self, id: &str, patch: SubscriptionPatch) -> Result<()>;

    /// Deactivate every active record of the subscription's principal and
    /// append the new record, as one atomic step
    ///
    /// Returns the IDs of the records that were deactivated.
    async fn activate_subscription(&self, subscription: Subscription) -> Result<Vec<SubscriptionId>>;

    /// Atomically check and increment a subscription's quota counter
    ///
    /// The activity check, the check against the limit and the increment
    /// must be one indivisible operation scoped to the record. Returns the
    /// new consumption count, `SubscriptionInactive` when the record is
    /// superseded or past its end date at `now`, `QuotaExceeded` when the
    /// increment would pass the limit, or `ConcurrentUpdateConflict` when
    /// the store lost a race and the caller may try again.
    async fn consume_quota(&self, id: &str, amount: u32, now: DateTime<Utc>) -> Result<u32>;
}

#[derive(Default)]
struct MemoryState {
    principals: HashMap<PrincipalId, Principal>,
    /// Subscriptions per principal, in stored order
    subscriptions: HashMap<PrincipalId, Vec<Subscription>>,
}

impl MemoryState {
    fn find_mut(&mut self, id: &str) -> Option<&mut Subscription> {
        self.subscriptions
            .values_mut()
            .flat_map(|subs| subs.iter_mut())
            .find(|s| s.id == id)
    }
}

/// In-memory subscription store implementation
///
/// Every mutation runs under one write lock, so read-modify-write
/// operations are atomic per store.
pub struct InMemorySubscriptionStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemorySubscriptionStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
        }
    }

    /// Register a principal
    pub async fn put_principal(&self, principal: Principal) {
        let mut state = self.state.write().await;
        state.subscriptions.entry(principal.id.clone()).or_default();
        state.principals.insert(principal.id.clone(), principal);
    }

    /// Append a subscription record as-is, without superseding anything
    ///
    /// Used to load existing data, which may hold overlapping records.
    pub async fn insert_subscription(&self, subscription: Subscription) -> Result<()> {
        subscription.validate()?;
        let mut state = self.state.write().await;
        if !state.principals.contains_key(&subscription.principal_id) {
            return Err(EntitlementError::NotFound(format!(
                "Principal {}",
                subscription.principal_id
            )));
        }
        state
            .subscriptions
            .entry(subscription.principal_id.clone())
            .or_default()
            .push(subscription);
        Ok(())
    }
}

impl Default for InMemorySubscriptionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn get_principal(&self, id: &str) -> Result<Principal> {
        let state = self.state.read().await;
        state
            .principals
            .get(id)
            .cloned()
            .ok_or_else(|| EntitlementError::NotFound(format!("Principal {}", id)))
    }

    async fn get_subscriptions(&self, principal_id: &str) -> Result<Vec<Subscription>> {
        let state = self.state.read().await;
        if !state.principals.contains_key(principal_id) {
            return Err(EntitlementError::NotFound(format!("Principal {}", principal_id)));
        }
        Ok(state
            .subscriptions
            .get(principal_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_subscription(&self, id: &str) -> Result<Subscription> {
        let state = self.state.read().await;
        state
            .subscriptions
            .values()
            .flat_map(|subs| subs.iter())
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| EntitlementError::NotFound(format!("Subscription {}", id)))
    }

    async fn update_subscription(&self, id: &str, patch: SubscriptionPatch) -> Result<()> {
        let mut state = self.state.write().await;
        let subscription = state
            .find_mut(id)
            .ok_or_else(|| EntitlementError::NotFound(format!("Subscription {}", id)))?;
        patch.apply(subscription);
        subscription.version += 1;
        Ok(())
    }

    async fn activate_subscription(&self, subscription: Subscription) -> Result<Vec<SubscriptionId>> {
        subscription.validate()?;
        let mut state = self.state.write().await;
        if !state.principals.contains_key(&subscription.principal_id) {
            return Err(EntitlementError::NotFound(format!(
                "Principal {}",
                subscription.principal_id
            )));
        }

        let records = state
            .subscriptions
            .entry(subscription.principal_id.clone())
            .or_default();

        let mut deactivated = Vec::new();
        for record in records.iter_mut().filter(|r| r.is_active) {
            SubscriptionPatch::deactivate().apply(record);
            record.version += 1;
            deactivated.push(record.id.clone());
        }

        debug!(
            "Activating subscription {} for {} (superseded {})",
            subscription.id,
            subscription.principal_id,
            deactivated.len()
        );
        records.push(subscription);

        Ok(deactivated)
    }

    async fn consume_quota(&self, id: &str, amount: u32, now: DateTime<Utc>) -> Result<u32> {
        let mut state = self.state.write().await;
        let subscription = state
            .find_mut(id)
            .ok_or_else(|| EntitlementError::NotFound(format!("Subscription {}", id)))?;

        if !subscription.is_effectively_active(now) {
            return Err(EntitlementError::SubscriptionInactive(format!(
                "{} is {:?}",
                id,
                subscription.state(now)
            )));
        }

        let next = subscription.quota.consume(amount, subscription.start_date)?;
        subscription.quota = next;
        subscription.version += 1;

        Ok(subscription.quota.consumed)
    }
}

//! Caller-facing entitlement API
//!
//! Every call names the principal explicitly; there is no ambient session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::ResourceCatalog;
use crate::clock::{Clock, SystemClock};
use crate::engine::{Decision, DenyReason, EngineConfig, EntitlementEngine, MetricsCollector};
use crate::error::{EntitlementError, Result};
use crate::plans::PlanCatalog;
use crate::quota::{QuotaTracker, Remaining};
use crate::scope::{ResourceScope, ScopeFilter};
use crate::store::SubscriptionStore;
use crate::subscription::SubscriptionResolver;
use crate::types::{PlanId, PrincipalSnapshot, QuotaAction, Subscription, SubscriptionId};

/// Result of an access check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
}

impl From<Decision> for AccessResponse {
    fn from(decision: Decision) -> Self {
        Self {
            allowed: decision.is_allowed(),
            reason: decision.reason(),
        }
    }
}

/// Result of an authoring check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthoringResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    /// Scope the content must be written with, locked levels filled in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<ResourceScope>,
}

/// Result of a quota check-and-consume
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaResponse {
    pub allowed: bool,
    pub remaining: Remaining,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<QuotaDenial>,
}

/// Why a quota request was refused
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuotaDenial {
    /// No active subscription: the free tier has no quota-limited actions
    NoSubscription,
    /// The period's allowance is used up
    QuotaExceeded { limit: u32, consumed: u32 },
    /// The resolved subscription expired or was superseded before it was charged
    SubscriptionInactive,
}

/// Checkout request for a new subscription period
#[derive(Debug, Clone, Deserialize)]
pub struct ActivationRequest {
    pub principal_id: String,
    pub plan_id: PlanId,
    #[serde(default)]
    pub scope: ScopeFilter,
    /// Falls back to the plan's default duration
    #[serde(default)]
    pub duration_days: Option<u32>,
}

/// Outcome of an activation
#[derive(Debug, Clone, Serialize)]
pub struct ActivationResponse {
    pub subscription: Subscription,
    pub superseded: Vec<SubscriptionId>,
}

/// Resolved entitlements of one principal
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementSummary {
    pub principal_id: String,
    /// `None` means free tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<ActiveEntitlement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
}

/// Details of the active subscription
#[derive(Debug, Clone, Serialize)]
pub struct ActiveEntitlement {
    pub subscription_id: SubscriptionId,
    pub plan_id: PlanId,
    pub scope: ScopeFilter,
    pub features: Vec<String>,
    pub remaining: Remaining,
    pub expires_at: DateTime<Utc>,
}

/// Entitlement service composing store, catalog, plans, clock and engine
pub struct EntitlementService {
    store: Arc<dyn SubscriptionStore>,
    catalog: Arc<dyn ResourceCatalog>,
    plans: PlanCatalog,
    engine: EntitlementEngine,
    quota: QuotaTracker,
    clock: Arc<dyn Clock>,
}

impl EntitlementService {
    /// Create a service using the system clock
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn SubscriptionStore>,
        catalog: Arc<dyn ResourceCatalog>,
        plans: PlanCatalog,
    ) -> Self {
        Self::with_clock(config, store, catalog, plans, Arc::new(SystemClock))
    }

    /// Create a service with an injected clock
    pub fn with_clock(
        config: EngineConfig,
        store: Arc<dyn SubscriptionStore>,
        catalog: Arc<dyn ResourceCatalog>,
        plans: PlanCatalog,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let max_attempts = config.max_consume_attempts;
        let engine = EntitlementEngine::new(config);

        let mut quota = QuotaTracker::new(store.clone()).with_max_attempts(max_attempts);
        if let Some(metrics) = engine.metrics() {
            quota = quota.with_metrics(metrics);
        }

        info!(
            "EntitlementService initialized with {} plans, max_consume_attempts={}",
            plans.len(),
            max_attempts
        );

        Self {
            store,
            catalog,
            plans,
            engine,
            quota,
            clock,
        }
    }

    pub fn engine(&self) -> &EntitlementEngine {
        &self.engine
    }

    pub fn metrics(&self) -> Option<Arc<MetricsCollector>> {
        self.engine.metrics()
    }

    /// Load the principal and its subscriptions in stored order
    pub async fn snapshot(&self, principal_id: &str) -> Result<PrincipalSnapshot> {
        let (principal, subscriptions) = futures::try_join!(
            self.store.get_principal(principal_id),
            self.store.get_subscriptions(principal_id),
        )?;
        Ok(PrincipalSnapshot::new(principal, subscriptions))
    }

    /// May the principal open this resource?
    pub async fn check_access(&self, principal_id: &str, resource_id: &str) -> Result<AccessResponse> {
        let resource = self.catalog.get_resource(resource_id).await?;
        let snapshot = self.snapshot(principal_id).await?;
        let decision = self
            .engine
            .can_access_resource(&snapshot, &resource, self.clock.now());
        Ok(decision.into())
    }

    /// May the principal create content in this scope?
    ///
    /// On allow the response carries the scope to write, with the
    /// subscription's locked levels filled in.
    pub async fn check_authoring(&self, principal_id: &str, target: &ResourceScope) -> Result<AuthoringResponse> {
        let snapshot = self.snapshot(principal_id).await?;
        let response = match self.engine.authoring_scope(&snapshot, target, self.clock.now()) {
            Ok(scope) => AuthoringResponse {
                allowed: true,
                reason: None,
                scope: Some(scope),
            },
            Err(reason) => AuthoringResponse {
                allowed: false,
                reason: Some(reason),
                scope: None,
            },
        };
        Ok(response)
    }

    /// Is the named feature unlocked for the principal?
    pub async fn check_feature(&self, principal_id: &str, feature: &str) -> Result<bool> {
        let snapshot = self.snapshot(principal_id).await?;
        Ok(self.engine.has_feature(&snapshot, feature, self.clock.now()))
    }

    /// Atomically check and consume one unit of the principal's quota
    pub async fn check_and_consume_quota(
        &self,
        principal_id: &str,
        action: QuotaAction,
    ) -> Result<QuotaResponse> {
        let snapshot = self.snapshot(principal_id).await?;
        if !action.permitted_for(snapshot.principal.role) {
            return Err(EntitlementError::InvalidInput(format!(
                "Action {} is not available to a {}",
                action, snapshot.principal.role
            )));
        }

        let now = self.clock.now();
        let Ok(subscription) = self.engine.resolve(&snapshot, now) else {
            debug!("Quota request from {} on free tier", principal_id);
            return Ok(QuotaResponse {
                allowed: false,
                remaining: Remaining::Limited(0),
                reason: Some(QuotaDenial::NoSubscription),
            });
        };

        match self.quota.try_consume(&subscription.id, 1, now).await {
            Ok(consumed) => {
                let remaining = if subscription.quota.is_unlimited() {
                    Remaining::Unlimited
                } else {
                    Remaining::Limited(subscription.quota.limit.saturating_sub(consumed))
                };
                debug!(
                    "Quota consumed: principal={}, action={}, remaining={}",
                    principal_id, action, remaining
                );
                Ok(QuotaResponse {
                    allowed: true,
                    remaining,
                    reason: None,
                })
            }
            Err(EntitlementError::QuotaExceeded { limit, consumed }) => {
                debug!(
                    "Quota exceeded: principal={}, action={}, {}/{}",
                    principal_id, action, consumed, limit
                );
                Ok(QuotaResponse {
                    allowed: false,
                    remaining: Remaining::Limited(limit.saturating_sub(consumed)),
                    reason: Some(QuotaDenial::QuotaExceeded { limit, consumed }),
                })
            }
            Err(EntitlementError::SubscriptionInactive(detail)) => {
                debug!(
                    "Quota refused: principal={}, action={}, {}",
                    principal_id, action, detail
                );
                Ok(QuotaResponse {
                    allowed: false,
                    remaining: Remaining::Limited(0),
                    reason: Some(QuotaDenial::SubscriptionInactive),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Remaining allowance for the principal's active subscription
    pub async fn remaining_quota(&self, principal_id: &str) -> Result<Remaining> {
        let snapshot = self.snapshot(principal_id).await?;
        Ok(self
            .engine
            .resolve(&snapshot, self.clock.now())
            .map(QuotaTracker::remaining_in_period)
            .unwrap_or(Remaining::Limited(0)))
    }

    /// Everything the principal is entitled to right now
    pub async fn entitlement_summary(&self, principal_id: &str) -> Result<EntitlementSummary> {
        let snapshot = self.snapshot(principal_id).await?;
        let summary = match self.engine.resolve(&snapshot, self.clock.now()) {
            Ok(subscription) => EntitlementSummary {
                principal_id: principal_id.to_string(),
                active: Some(ActiveEntitlement {
                    subscription_id: subscription.id.clone(),
                    plan_id: subscription.plan_id.clone(),
                    scope: subscription.scope.clone(),
                    features: subscription.features.clone(),
                    remaining: QuotaTracker::remaining_in_period(subscription),
                    expires_at: subscription.end_date,
                }),
                reason: None,
            },
            Err(reason) => EntitlementSummary {
                principal_id: principal_id.to_string(),
                active: None,
                reason: Some(reason),
            },
        };
        Ok(summary)
    }

    /// Checkout entry point: start a new subscription period
    ///
    /// Any previously active record of the principal is deactivated in the
    /// same store operation that writes the new one.
    pub async fn activate_subscription(&self, request: ActivationRequest) -> Result<ActivationResponse> {
        let principal = self.store.get_principal(&request.principal_id).await?;
        let plan = self.plans.get(&request.plan_id)?;
        let duration_days = request.duration_days.unwrap_or(plan.default_duration_days);

        let subscription = SubscriptionResolver::new_period(
            &principal,
            plan,
            request.scope,
            duration_days,
            self.clock.now(),
        )?;

        let superseded = self.store.activate_subscription(subscription.clone()).await?;

        if let Some(metrics) = self.engine.metrics() {
            metrics.record_activation();
        }

        info!(
            "Activated plan {} for {} ({} days), superseded {:?}",
            plan.id, principal.id, duration_days, superseded
        );

        Ok(ActivationResponse {
            subscription,
            superseded,
        })
    }
}

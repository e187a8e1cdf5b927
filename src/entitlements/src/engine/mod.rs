//! Entitlement engine
//!
//! Composes scope matching and subscription resolution to answer access,
//! authoring and feature questions for one principal snapshot.

pub mod decision;
pub mod metrics;

pub use decision::{Decision, DenyReason};
pub use metrics::{EngineMetrics, MetricsCollector};

use crate::quota::DEFAULT_MAX_ATTEMPTS;
use crate::scope::{ResourceScope, ScopeMatcher};
use crate::subscription::SubscriptionResolver;
use crate::types::{PrincipalSnapshot, Resource, Subscription};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_true() -> bool {
    true
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Store attempts per quota consumption before refusing
    #[serde(default = "default_max_attempts")]
    pub max_consume_attempts: u32,

    /// Enable metrics collection
    #[serde(default = "default_true")]
    pub enable_metrics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_consume_attempts: DEFAULT_MAX_ATTEMPTS,
            enable_metrics: true,
        }
    }
}

/// Entitlement engine
///
/// # Architecture
///
/// ```text
/// PrincipalSnapshot → SubscriptionResolver → ScopeMatcher → Decision
///                             ↓                               ↓
///                      absence reason                    [Metrics]
/// ```
///
/// Every query is pure given the snapshot and `now`; the engine holds no
/// per-principal state and may be shared freely between request handlers.
pub struct EntitlementEngine {
    /// Metrics collector
    metrics: Option<Arc<MetricsCollector>>,

    /// Engine configuration
    config: EngineConfig,
}

impl EntitlementEngine {
    /// Create a new engine with the given configuration
    pub fn new(config: EngineConfig) -> Self {
        let metrics = if config.enable_metrics {
            Some(Arc::new(MetricsCollector::new()))
        } else {
            None
        };

        Self { metrics, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared metrics collector, when enabled
    pub fn metrics(&self) -> Option<Arc<MetricsCollector>> {
        self.metrics.clone()
    }

    /// Get engine metrics
    pub fn get_metrics(&self) -> Option<EngineMetrics> {
        self.metrics.as_ref().map(|m| m.get_metrics())
    }

    /// Decide whether the principal may open a resource
    ///
    /// Demo resources are open to everyone. Otherwise the active
    /// subscription's scope must match the resource's classification.
    pub fn can_access_resource(
        &self,
        snapshot: &PrincipalSnapshot,
        resource: &Resource,
        now: DateTime<Utc>,
    ) -> Decision {
        let decision = if resource.is_demo {
            Decision::Allow
        } else {
            match self.resolve(snapshot, now) {
                Err(reason) => Decision::Deny(reason),
                Ok(subscription) => match ScopeMatcher::first_mismatch(&subscription.scope, &resource.scope) {
                    None => Decision::Allow,
                    Some(level) => Decision::Deny(DenyReason::ScopeMismatch { level }),
                },
            }
        };

        debug!(
            "Access decision: principal={}, resource={}, demo={}, {}",
            snapshot.principal.id, resource.id, resource.is_demo, decision
        );
        self.record(decision)
    }

    /// Decide whether the principal may create content in `target`
    ///
    /// Concrete levels of the subscription's scope lock the target to that
    /// exact value; wildcard levels leave the author free. The decision
    /// applies to the scope returned by [`Self::authoring_scope`], never to
    /// a target with locked levels left unset.
    pub fn can_author_in(
        &self,
        snapshot: &PrincipalSnapshot,
        target: &ResourceScope,
        now: DateTime<Utc>,
    ) -> Decision {
        match self.authoring_scope(snapshot, target, now) {
            Ok(_) => Decision::Allow,
            Err(reason) => Decision::Deny(reason),
        }
    }

    /// Scope the new content must be written with
    ///
    /// On allow, every locked level is set to the subscription's value.
    pub fn authoring_scope(
        &self,
        snapshot: &PrincipalSnapshot,
        target: &ResourceScope,
        now: DateTime<Utc>,
    ) -> std::result::Result<ResourceScope, DenyReason> {
        let outcome = if !snapshot.principal.role.can_author() {
            Err(DenyReason::RoleNotPermitted)
        } else {
            self.resolve(snapshot, now).and_then(|subscription| {
                match ScopeMatcher::locked_mismatch(&subscription.scope, target) {
                    None => Ok(ScopeMatcher::apply_locks(&subscription.scope, target)),
                    Some(level) => Err(DenyReason::ScopeMismatch { level }),
                }
            })
        };

        let decision = match &outcome {
            Ok(_) => Decision::Allow,
            Err(reason) => Decision::Deny(*reason),
        };
        debug!(
            "Authoring decision: principal={}, target={:?}, {}",
            snapshot.principal.id, target, decision
        );
        self.record(decision);

        outcome
    }

    /// Whether the active subscription unlocks `feature` (case-sensitive)
    pub fn has_feature(&self, snapshot: &PrincipalSnapshot, feature: &str, now: DateTime<Utc>) -> bool {
        if let Some(metrics) = &self.metrics {
            metrics.record_feature_check();
        }

        let enabled = self
            .resolve(snapshot, now)
            .map(|subscription| subscription.has_feature(feature))
            .unwrap_or(false);

        debug!(
            "Feature check: principal={}, feature={}, enabled={}",
            snapshot.principal.id, feature, enabled
        );
        enabled
    }

    /// Active subscription, or the reason there is none
    pub fn resolve<'a>(
        &self,
        snapshot: &'a PrincipalSnapshot,
        now: DateTime<Utc>,
    ) -> std::result::Result<&'a Subscription, DenyReason> {
        SubscriptionResolver::resolve_snapshot(snapshot, now)
            .ok_or_else(|| SubscriptionResolver::absence_reason(&snapshot.subscriptions, now))
    }

    fn record(&self, decision: Decision) -> Decision {
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(decision.is_allowed());
        }
        decision
    }
}

impl Default for EntitlementEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{ScopeFilter, ScopeLevel};
    use crate::types::Principal;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn physics_subscription(principal: &str) -> Subscription {
        Subscription::new(
            principal,
            "physics",
            ScopeFilter::unrestricted()
                .with_main_category("entrance")
                .with_subject("Physics"),
            now() - Duration::days(1),
            now() + Duration::days(29),
            5,
        )
        .unwrap()
        .with_features(["bulk_upload"])
    }

    #[test]
    fn test_engine_creation() {
        let engine = EntitlementEngine::default();
        assert!(engine.metrics.is_some());
        assert_eq!(engine.config().max_consume_attempts, 3);

        let quiet = EntitlementEngine::new(EngineConfig {
            enable_metrics: false,
            ..EngineConfig::default()
        });
        assert!(quiet.get_metrics().is_none());
    }

    #[test]
    fn test_scope_mismatch_reports_level() {
        let engine = EntitlementEngine::default();
        let snapshot = PrincipalSnapshot::new(Principal::student("s1"), vec![physics_subscription("s1")]);
        let chemistry = Resource::new(
            "test-1",
            ResourceScope::new().with_main_category("entrance").with_subject("Chemistry"),
        );

        assert_eq!(
            engine.can_access_resource(&snapshot, &chemistry, now()),
            Decision::Deny(DenyReason::ScopeMismatch {
                level: ScopeLevel::Subject
            })
        );
    }

    #[test]
    fn test_students_cannot_author() {
        let engine = EntitlementEngine::default();
        let snapshot = PrincipalSnapshot::new(Principal::student("s1"), vec![physics_subscription("s1")]);

        assert_eq!(
            engine.can_author_in(&snapshot, &ResourceScope::new(), now()),
            Decision::Deny(DenyReason::RoleNotPermitted)
        );
    }

    #[test]
    fn test_authoring_scope_fills_locked_levels() {
        let engine = EntitlementEngine::default();
        let snapshot = PrincipalSnapshot::new(Principal::teacher("t1"), vec![physics_subscription("t1")]);
        let untagged = ResourceScope::new().with_exam_type("JEE");

        let scope = engine.authoring_scope(&snapshot, &untagged, now()).unwrap();
        assert_eq!(scope.main_category.as_deref(), Some("entrance"));
        assert_eq!(scope.exam_type.as_deref(), Some("JEE"));
        assert_eq!(scope.subject.as_deref(), Some("Physics"));
        assert_eq!(scope.subcategory, None);

        // The written test is not visible to a subscriber of another subject
        let chemistry = Subscription::new(
            "s1",
            "chemistry",
            ScopeFilter::unrestricted().with_subject("Chemistry"),
            now() - Duration::days(1),
            now() + Duration::days(1),
            0,
        )
        .unwrap();
        let student = PrincipalSnapshot::new(Principal::student("s1"), vec![chemistry]);
        let written = Resource::new("written", scope);
        assert!(!engine.can_access_resource(&student, &written, now()).is_allowed());
        assert_eq!(
            engine.authoring_scope(&snapshot, &ResourceScope::new().with_subject("Biology"), now()),
            Err(DenyReason::ScopeMismatch { level: ScopeLevel::Subject })
        );
    }

    #[test]
    fn test_feature_requires_active_subscription() {
        let engine = EntitlementEngine::default();
        let active = PrincipalSnapshot::new(Principal::teacher("t1"), vec![physics_subscription("t1")]);
        let lapsed = PrincipalSnapshot::new(
            Principal::teacher("t1"),
            vec![physics_subscription("t1").deactivated()],
        );

        assert!(engine.has_feature(&active, "bulk_upload", now()));
        assert!(!engine.has_feature(&active, "BULK_UPLOAD", now()));
        assert!(!engine.has_feature(&lapsed, "bulk_upload", now()));
        assert_eq!(engine.get_metrics().unwrap().feature_checks, 3);
    }

    #[test]
    fn test_decisions_are_counted() {
        let engine = EntitlementEngine::default();
        let snapshot = PrincipalSnapshot::new(Principal::student("s1"), vec![]);
        let open = Resource::new("demo", ResourceScope::new()).demo();
        let closed = Resource::new("paid", ResourceScope::new());

        assert!(engine.can_access_resource(&snapshot, &open, now()).is_allowed());
        assert!(!engine.can_access_resource(&snapshot, &closed, now()).is_allowed());

        let metrics = engine.get_metrics().unwrap();
        assert_eq!(metrics.allowed_decisions, 1);
        assert_eq!(metrics.denied_decisions, 1);
    }
}

//! Prometheus-style counters for entitlement decisions and quota activity

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of the engine counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineMetrics {
    /// Allowed access and authoring decisions
    pub allowed_decisions: u64,

    /// Denied access and authoring decisions
    pub denied_decisions: u64,

    /// Feature checks answered
    pub feature_checks: u64,

    /// Successful quota consumptions
    pub quota_consumed: u64,

    /// Rejected quota consumptions
    pub quota_exceeded: u64,

    /// Store conflicts retried during consumption
    pub conflicts_retried: u64,

    /// Subscriptions activated through checkout
    pub activations: u64,
}

impl EngineMetrics {
    /// Calculate allow rate
    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed_decisions + self.denied_decisions;
        if total == 0 {
            0.0
        } else {
            self.allowed_decisions as f64 / total as f64
        }
    }
}

/// Lock-free metrics collector
///
/// Safe to share between request handlers; every counter is independent.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    allowed: AtomicU64,
    denied: AtomicU64,
    feature_checks: AtomicU64,
    quota_consumed: AtomicU64,
    quota_exceeded: AtomicU64,
    conflicts: AtomicU64,
    activations: AtomicU64,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an access or authoring decision
    pub fn record_decision(&self, allowed: bool) {
        if allowed {
            self.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_feature_check(&self) {
        self.feature_checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_quota_consumed(&self) {
        self.quota_consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_quota_exceeded(&self) {
        self.quota_exceeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_activation(&self) {
        self.activations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn get_metrics(&self) -> EngineMetrics {
        EngineMetrics {
            allowed_decisions: self.allowed.load(Ordering::Relaxed),
            denied_decisions: self.denied.load(Ordering::Relaxed),
            feature_checks: self.feature_checks.load(Ordering::Relaxed),
            quota_consumed: self.quota_consumed.load(Ordering::Relaxed),
            quota_exceeded: self.quota_exceeded.load(Ordering::Relaxed),
            conflicts_retried: self.conflicts.load(Ordering::Relaxed),
            activations: self.activations.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let metrics = self.get_metrics();

        format!(
            r#"# HELP entitlements_allowed_total Number of allowed decisions
# TYPE entitlements_allowed_total counter
entitlements_allowed_total {}

# HELP entitlements_denied_total Number of denied decisions
# TYPE entitlements_denied_total counter
entitlements_denied_total {}

# HELP entitlements_feature_checks_total Feature checks answered
# TYPE entitlements_feature_checks_total counter
entitlements_feature_checks_total {}

# HELP entitlements_quota_consumed_total Successful quota consumptions
# TYPE entitlements_quota_consumed_total counter
entitlements_quota_consumed_total {}

# HELP entitlements_quota_exceeded_total Rejected quota consumptions
# TYPE entitlements_quota_exceeded_total counter
entitlements_quota_exceeded_total {}

# HELP entitlements_conflicts_retried_total Store conflicts retried
# TYPE entitlements_conflicts_retried_total counter
entitlements_conflicts_retried_total {}

# HELP entitlements_activations_total Subscriptions activated
# TYPE entitlements_activations_total counter
entitlements_activations_total {}
"#,
            metrics.allowed_decisions,
            metrics.denied_decisions,
            metrics.feature_checks,
            metrics.quota_consumed,
            metrics.quota_exceeded,
            metrics.conflicts_retried,
            metrics.activations,
        )
    }
}

//! Entitlement decision types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scope::ScopeLevel;

/// Why a request was denied
///
/// Enumerated so callers can branch on the cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DenyReason {
    /// No subscription record is effectively active
    NoSubscription,

    /// The most recent active record has passed its end date
    Expired,

    /// The resource or authoring target lies outside the subscription's scope
    ScopeMismatch { level: ScopeLevel },

    /// The principal's role cannot perform the operation
    RoleNotPermitted,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoSubscription => "no_subscription",
            Self::Expired => "expired",
            Self::ScopeMismatch { .. } => "scope_mismatch",
            Self::RoleNotPermitted => "role_not_permitted",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSubscription => f.write_str("no active subscription"),
            Self::Expired => f.write_str("subscription expired"),
            Self::ScopeMismatch { level } => write!(f, "scope mismatch at {}", level),
            Self::RoleNotPermitted => f.write_str("role not permitted"),
        }
    }
}

/// Access or authoring decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allow => None,
            Self::Deny(reason) => Some(*reason),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("ALLOW"),
            Self::Deny(reason) => write!(f, "DENY ({})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_decision() {
        let decision = Decision::Allow;
        assert!(decision.is_allowed());
        assert_eq!(decision.reason(), None);
    }

    #[test]
    fn test_deny_decision() {
        let decision = Decision::Deny(DenyReason::ScopeMismatch {
            level: ScopeLevel::Subject,
        });

        assert!(!decision.is_allowed());
        assert_eq!(decision.reason().unwrap().code(), "scope_mismatch");
        assert_eq!(decision.to_string(), "DENY (scope mismatch at subject)");
    }

    #[test]
    fn test_decision_serialization() {
        let json = serde_json::to_value(Decision::Deny(DenyReason::Expired)).unwrap();
        assert_eq!(json["decision"], "deny");
        assert_eq!(json["reason"]["type"], "expired");
    }
}

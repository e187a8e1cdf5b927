//! Core entitlement types

use crate::error::{EntitlementError, Result};
use crate::quota::Quota;
use crate::scope::{ResourceScope, ScopeFilter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique principal identifier
pub type PrincipalId = String;

/// Unique subscription identifier
pub type SubscriptionId = String;

/// Unique plan identifier
pub type PlanId = String;

/// Unique catalog resource identifier
pub type ResourceId = String;

/// Role of a principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Administrator,
}

/// How a principal's subscription records are organized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotModel {
    /// Ordered list; the first effectively active record wins
    OrderedList,
    /// One mutable slot; at most one record is effectively active
    SingleSlot,
}

impl Role {
    pub fn slot_model(&self) -> SlotModel {
        match self {
            Self::Student => SlotModel::OrderedList,
            Self::Teacher | Self::Administrator => SlotModel::SingleSlot,
        }
    }

    /// Whether the role may create categories and tests
    pub fn can_author(&self) -> bool {
        !matches!(self, Self::Student)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Administrator => "administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = EntitlementError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "administrator" | "admin" => Ok(Self::Administrator),
            other => Err(EntitlementError::InvalidInput(format!("Unknown role: {}", other))),
        }
    }
}

/// Principal (student, teacher or administrator)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal identifier
    pub id: PrincipalId,

    /// Principal role
    pub role: Role,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn student(id: impl Into<String>) -> Self {
        Self::new(id, Role::Student)
    }

    pub fn teacher(id: impl Into<String>) -> Self {
        Self::new(id, Role::Teacher)
    }
}

/// Lifecycle state of a subscription at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Flagged active and not yet past its end date
    Active,
    /// Flagged active but `now >= end_date`
    Expired,
    /// Deactivated by a later purchase
    Superseded,
}

/// Subscription record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Subscription identifier
    pub id: SubscriptionId,

    /// Owning principal
    pub principal_id: PrincipalId,

    /// Purchased plan
    pub plan_id: PlanId,

    /// Content the subscription unlocks
    #[serde(default)]
    pub scope: ScopeFilter,

    /// Start of the quota period
    pub start_date: DateTime<Utc>,

    /// End of the quota period (exclusive)
    pub end_date: DateTime<Utc>,

    /// Cleared when superseded by a later purchase
    pub is_active: bool,

    /// Quota-limited allowance for the period
    pub quota: Quota,

    /// Named features unlocked by the plan
    #[serde(default)]
    pub features: Vec<String>,

    /// Record version, bumped by every store write
    #[serde(default)]
    pub version: u64,
}

impl Subscription {
    /// Create a new active subscription covering `[start_date, end_date)`
    pub fn new(
        principal_id: impl Into<String>,
        plan_id: impl Into<String>,
        scope: ScopeFilter,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        quota_limit: u32,
    ) -> Result<Self> {
        let subscription = Self {
            id: uuid::Uuid::new_v4().to_string(),
            principal_id: principal_id.into(),
            plan_id: plan_id.into(),
            scope,
            start_date,
            end_date,
            is_active: true,
            quota: Quota::new(quota_limit, start_date),
            features: Vec::new(),
            version: 0,
        };
        subscription.validate()?;
        Ok(subscription)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_consumed(mut self, consumed: u32) -> Self {
        self.quota.consumed = consumed;
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Checks record invariants
    pub fn validate(&self) -> Result<()> {
        if self.end_date <= self.start_date {
            return Err(EntitlementError::InvalidInput(format!(
                "Subscription {} must end after it starts",
                self.id
            )));
        }
        Ok(())
    }

    /// Active flag set and end date not yet reached
    pub fn is_effectively_active(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.end_date
    }

    pub fn state(&self, now: DateTime<Utc>) -> SubscriptionState {
        if !self.is_active {
            SubscriptionState::Superseded
        } else if now >= self.end_date {
            SubscriptionState::Expired
        } else {
            SubscriptionState::Active
        }
    }

    /// Case-sensitive feature membership
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

/// Catalog resource (test, category, study material)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Resource identifier
    pub id: ResourceId,

    /// Classification of the resource
    #[serde(default)]
    pub scope: ResourceScope,

    /// Open-access resources bypass entitlement
    #[serde(default)]
    pub is_demo: bool,
}

impl Resource {
    pub fn new(id: impl Into<String>, scope: ResourceScope) -> Self {
        Self {
            id: id.into(),
            scope,
            is_demo: false,
        }
    }

    pub fn demo(mut self) -> Self {
        self.is_demo = true;
        self
    }
}

/// Principal together with its subscription records in stored order
#[derive(Debug, Clone)]
pub struct PrincipalSnapshot {
    pub principal: Principal,
    pub subscriptions: Vec<Subscription>,
}

impl PrincipalSnapshot {
    pub fn new(principal: Principal, subscriptions: Vec<Subscription>) -> Self {
        Self {
            principal,
            subscriptions,
        }
    }
}

/// Quota-limited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaAction {
    /// A teacher uploads or creates a test
    CreateTest,
    /// A student starts a test attempt
    AttemptTest,
}

impl QuotaAction {
    pub fn permitted_for(&self, role: Role) -> bool {
        match (self, role) {
            (_, Role::Administrator) => true,
            (Self::CreateTest, Role::Teacher) => true,
            (Self::AttemptTest, Role::Student) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateTest => "create_test",
            Self::AttemptTest => "attempt_test",
        }
    }
}

impl fmt::Display for QuotaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

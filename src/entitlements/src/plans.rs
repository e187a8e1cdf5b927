//! Subscription plan catalog

use crate::error::{EntitlementError, Result};
use crate::types::PlanId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_duration_days() -> u32 {
    30
}

/// Purchasable plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier
    pub id: PlanId,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Quota allowance per period; `0` means unlimited
    #[serde(default)]
    pub quota_limit: u32,

    /// Features unlocked by the plan
    #[serde(default)]
    pub features: Vec<String>,

    /// Period length used when checkout does not specify one
    #[serde(default = "default_duration_days")]
    pub default_duration_days: u32,
}

impl Plan {
    pub fn new(id: impl Into<String>, quota_limit: u32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            quota_limit,
            features: Vec::new(),
            default_duration_days: default_duration_days(),
        }
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }
}

/// Plans by ID
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    plans: HashMap<PlanId, Plan>,
}

impl PlanCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog, rejecting duplicate IDs
    pub fn from_plans(plans: impl IntoIterator<Item = Plan>) -> Result<Self> {
        let mut catalog = Self::new();
        for plan in plans {
            if catalog.plans.contains_key(&plan.id) {
                return Err(EntitlementError::Config(format!("Duplicate plan id: {}", plan.id)));
            }
            catalog.plans.insert(plan.id.clone(), plan);
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, plan: Plan) {
        self.plans.insert(plan.id.clone(), plan);
    }

    pub fn get(&self, id: &str) -> Result<&Plan> {
        self.plans
            .get(id)
            .ok_or_else(|| EntitlementError::NotFound(format!("Plan {}", id)))
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

//! Configuration loading and validation

use crate::catalog::{CatalogRecord, InMemoryResourceCatalog};
use crate::engine::EngineConfig;
use crate::error::{EntitlementError, Result};
use crate::plans::{Plan, PlanCatalog};
use crate::store::InMemorySubscriptionStore;
use crate::types::{Principal, Subscription};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EntitlementConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub plans: Vec<Plan>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            metrics_port: default_metrics_port(),
        }
    }
}

/// Record store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Connection string for the postgres backend
    #[serde(default)]
    pub database_url: Option<String>,
    /// JSON seed data for the memory backend
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
}

fn default_port() -> u16 { 8080 }
fn default_metrics_port() -> u16 { 9090 }

impl EntitlementConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| EntitlementError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Apply `PORT`, `METRICS_PORT` and `DATABASE_URL` overrides
    pub fn apply_env(mut self) -> Self {
        if let Some(port) = std::env::var("PORT").ok().and_then(|s| s.parse().ok()) {
            self.server.port = port;
        }
        if let Some(port) = std::env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok()) {
            self.server.metrics_port = port;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.store.database_url = Some(url);
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_consume_attempts == 0 {
            return Err(EntitlementError::Config(
                "engine.max_consume_attempts must be at least 1".to_string(),
            ));
        }

        if self.store.backend == StoreBackend::Postgres && self.store.database_url.is_none() {
            return Err(EntitlementError::Config(
                "store.database_url is required for the postgres backend".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for plan in &self.plans {
            if !seen.insert(plan.id.as_str()) {
                return Err(EntitlementError::Config(format!("Duplicate plan id: {}", plan.id)));
            }
            if plan.default_duration_days == 0 {
                return Err(EntitlementError::Config(format!(
                    "Plan {} must have a positive default_duration_days",
                    plan.id
                )));
            }
        }

        Ok(())
    }

    /// Build the plan catalog
    pub fn plan_catalog(&self) -> Result<PlanCatalog> {
        PlanCatalog::from_plans(self.plans.iter().cloned())
    }
}

/// Seed data for the in-memory backend
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SeedData {
    #[serde(default)]
    pub principals: Vec<Principal>,
    /// Loaded in file order, which is the stored order
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    #[serde(default)]
    pub resources: Vec<CatalogRecord>,
}

impl SeedData {
    /// Load seed data from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&contents)
            .map_err(|e| EntitlementError::Config(format!("Failed to parse seed data: {}", e)))
    }

    /// Populate an in-memory store and catalog
    pub async fn apply(
        self,
        store: &InMemorySubscriptionStore,
        catalog: &InMemoryResourceCatalog,
    ) -> Result<()> {
        for principal in self.principals {
            store.put_principal(principal).await;
        }
        for subscription in self.subscriptions {
            store.insert_subscription(subscription).await?;
        }
        for record in self.resources {
            catalog.put_record(record);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SubscriptionStore;
    use std::io::Write;

    const SAMPLE: &str = r#"
[engine]
max_consume_attempts = 5

[server]
port = 3000

[[plans]]
id = "teacher-basic"
name = "Teacher Basic"
quota_limit = 5
features = ["bulk_upload"]

[[plans]]
id = "student-unlimited"
quota_limit = 0
default_duration_days = 365
"#;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = EntitlementConfig::load(file.path()).unwrap();
        assert_eq!(config.engine.max_consume_attempts, 5);
        assert!(config.engine.enable_metrics);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.metrics_port, 9090);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.plans.len(), 2);
        assert_eq!(config.plans[0].default_duration_days, 30);
        config.validate().unwrap();

        let plans = config.plan_catalog().unwrap();
        assert_eq!(plans.get("student-unlimited").unwrap().default_duration_days, 365);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EntitlementConfig::from_toml("").unwrap();
        assert_eq!(config.engine.max_consume_attempts, 3);
        assert_eq!(config.server.port, 8080);
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_errors() {
        let zero_attempts = EntitlementConfig::from_toml("[engine]\nmax_consume_attempts = 0").unwrap();
        assert!(matches!(zero_attempts.validate(), Err(EntitlementError::Config(_))));

        let postgres = EntitlementConfig::from_toml("[store]\nbackend = \"postgres\"").unwrap();
        assert!(matches!(postgres.validate(), Err(EntitlementError::Config(_))));

        let duplicate = EntitlementConfig::from_toml(
            "[[plans]]\nid = \"a\"\n[[plans]]\nid = \"a\"",
        )
        .unwrap();
        assert!(matches!(duplicate.validate(), Err(EntitlementError::Config(_))));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            EntitlementConfig::from_toml("[engine"),
            Err(EntitlementError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_seed_data() {
        let seed = r#"{
            "principals": [{"id": "s1", "role": "student"}],
            "subscriptions": [{
                "id": "sub-1",
                "principalId": "s1",
                "planId": "student-basic",
                "scope": {"mainCategory": "entrance", "subject": "Physics"},
                "startDate": "2024-01-01T00:00:00Z",
                "endDate": "2024-02-01T00:00:00Z",
                "isActive": true,
                "quota": {"limit": 10, "consumed": 2, "countedSince": "2024-01-01T00:00:00Z"},
                "features": ["analytics"]
            }],
            "resources": [{"id": "t1", "mainCategory": "entrance", "subject": {"name": "Physics"}}]
        }"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(seed.as_bytes()).unwrap();

        let store = InMemorySubscriptionStore::new();
        let catalog = InMemoryResourceCatalog::new();
        SeedData::load(file.path()).unwrap().apply(&store, &catalog).await.unwrap();

        let subs = store.get_subscriptions("s1").await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].quota.consumed, 2);
        assert_eq!(subs[0].scope.subject.as_concrete(), Some("Physics"));
        assert_eq!(catalog.len(), 1);
    }
}

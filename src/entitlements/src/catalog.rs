//! Resource catalog and record normalization
//!
//! Catalog records store a subject either as a plain name or as a
//! structured object with subcategories. Both shapes are normalized here,
//! before anything reaches the engine.

use crate::error::{EntitlementError, Result};
use crate::scope::ResourceScope;
use crate::types::{Resource, ResourceId};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Subject as stored, in either the legacy or the current shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubjectRecord {
    /// Legacy: just the subject name
    Name(String),
    /// Current: name plus its subcategories
    Structured {
        name: String,
        #[serde(default)]
        subcategories: Vec<String>,
    },
}

/// Canonical subject shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    pub subcategories: Vec<String>,
}

impl From<SubjectRecord> for Subject {
    fn from(record: SubjectRecord) -> Self {
        match record {
            SubjectRecord::Name(name) => Self {
                name: name.trim().to_string(),
                subcategories: Vec::new(),
            },
            SubjectRecord::Structured { name, subcategories } => Self {
                name: name.trim().to_string(),
                subcategories: subcategories
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
        }
    }
}

/// Normalize a list of stored subjects, dropping blank names
pub fn normalize_subjects(records: impl IntoIterator<Item = SubjectRecord>) -> Vec<Subject> {
    records
        .into_iter()
        .map(Subject::from)
        .filter(|s| !s.name.is_empty())
        .collect()
}

/// Catalog item as stored (test, category, study material)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRecord {
    pub id: ResourceId,

    #[serde(default)]
    pub main_category: Option<String>,

    #[serde(default, alias = "categoryType")]
    pub exam_type: Option<String>,

    #[serde(default)]
    pub subject: Option<SubjectRecord>,

    #[serde(default)]
    pub subcategory: Option<String>,

    #[serde(default)]
    pub is_demo: bool,
}

impl CatalogRecord {
    /// Normalize into the engine's resource shape
    ///
    /// A structured subject with exactly one subcategory supplies the
    /// subcategory when the record does not declare one itself.
    pub fn into_resource(self) -> Resource {
        let subject = self.subject.map(Subject::from);

        let subcategory = self.subcategory.or_else(|| match &subject {
            Some(Subject { subcategories, .. }) if subcategories.len() == 1 => {
                subcategories.first().cloned()
            }
            _ => None,
        });

        Resource {
            id: self.id,
            scope: ResourceScope {
                main_category: self.main_category,
                exam_type: self.exam_type,
                subject: subject.map(|s| s.name).filter(|n| !n.is_empty()),
                subcategory,
            },
            is_demo: self.is_demo,
        }
    }
}

/// Read-only view of the resource catalog
#[async_trait]
pub trait ResourceCatalog: Send + Sync {
    /// Get a resource by ID
    async fn get_resource(&self, id: &str) -> Result<Resource>;
}

/// In-memory resource catalog
pub struct InMemoryResourceCatalog {
    resources: Arc<DashMap<ResourceId, Resource>>,
}

impl InMemoryResourceCatalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self {
            resources: Arc::new(DashMap::new()),
        }
    }

    /// Add or replace a resource
    pub fn put(&self, resource: Resource) {
        self.resources.insert(resource.id.clone(), resource);
    }

    /// Normalize and add a stored record
    pub fn put_record(&self, record: CatalogRecord) {
        self.put(record.into_resource());
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl Default for InMemoryResourceCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceCatalog for InMemoryResourceCatalog {
    async fn get_resource(&self, id: &str) -> Result<Resource> {
        self.resources
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EntitlementError::NotFound(format!("Resource {}", id)))
    }
}

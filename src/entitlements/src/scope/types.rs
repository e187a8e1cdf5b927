/// Scope type definitions
///
/// A scope is the four-level classification shared by subscriptions
/// (as a filter) and catalog resources (as a concrete target).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel stored in subscription records meaning "all values at this level"
pub const WILDCARD: &str = "All";

/// The four classification levels, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeLevel {
    MainCategory,
    ExamType,
    Subject,
    Subcategory,
}

impl ScopeLevel {
    /// All levels in evaluation order
    pub const ALL: [ScopeLevel; 4] = [
        ScopeLevel::MainCategory,
        ScopeLevel::ExamType,
        ScopeLevel::Subject,
        ScopeLevel::Subcategory,
    ];

    /// Field name as stored in records
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MainCategory => "mainCategory",
            Self::ExamType => "examType",
            Self::Subject => "subject",
            Self::Subcategory => "subcategory",
        }
    }
}

impl fmt::Display for ScopeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of one filter level
///
/// Serialized as the raw string: `"All"` for [`ScopeValue::Wildcard`],
/// the value itself otherwise. Blank strings parse as wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScopeValue {
    /// Unrestricted at this level
    #[default]
    Wildcard,
    /// Restricted to exactly this value
    Concrete(String),
}

impl ScopeValue {
    /// Parse a stored level value
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(WILDCARD) {
            Self::Wildcard
        } else {
            Self::Concrete(trimmed.to_string())
        }
    }

    /// Concrete value builder
    pub fn concrete(value: impl Into<String>) -> Self {
        Self::parse(&value.into())
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }

    /// The concrete value, if any
    pub fn as_concrete(&self) -> Option<&str> {
        match self {
            Self::Wildcard => None,
            Self::Concrete(value) => Some(value),
        }
    }
}

impl From<String> for ScopeValue {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for ScopeValue {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<ScopeValue> for String {
    fn from(value: ScopeValue) -> Self {
        match value {
            ScopeValue::Wildcard => WILDCARD.to_string(),
            ScopeValue::Concrete(value) => value,
        }
    }
}

impl fmt::Display for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => f.write_str(WILDCARD),
            Self::Concrete(value) => f.write_str(value),
        }
    }
}

/// Scope filter carried by a subscription
///
/// A level missing from the stored record deserializes as wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeFilter {
    #[serde(default)]
    pub main_category: ScopeValue,

    #[serde(default, alias = "categoryType")]
    pub exam_type: ScopeValue,

    #[serde(default)]
    pub subject: ScopeValue,

    #[serde(default)]
    pub subcategory: ScopeValue,
}

impl ScopeFilter {
    /// Filter matching every resource
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn with_main_category(mut self, value: impl Into<ScopeValue>) -> Self {
        self.main_category = value.into();
        self
    }

    pub fn with_exam_type(mut self, value: impl Into<ScopeValue>) -> Self {
        self.exam_type = value.into();
        self
    }

    pub fn with_subject(mut self, value: impl Into<ScopeValue>) -> Self {
        self.subject = value.into();
        self
    }

    pub fn with_subcategory(mut self, value: impl Into<ScopeValue>) -> Self {
        self.subcategory = value.into();
        self
    }

    /// Value at one level
    pub fn level(&self, level: ScopeLevel) -> &ScopeValue {
        match level {
            ScopeLevel::MainCategory => &self.main_category,
            ScopeLevel::ExamType => &self.exam_type,
            ScopeLevel::Subject => &self.subject,
            ScopeLevel::Subcategory => &self.subcategory,
        }
    }

    /// Whether every level is wildcard
    pub fn is_unrestricted(&self) -> bool {
        ScopeLevel::ALL.iter().all(|level| self.level(*level).is_wildcard())
    }
}

/// Classification declared by a resource or an authoring target
///
/// Absent levels are `None`; blank strings are treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_category: Option<String>,

    #[serde(default, alias = "categoryType", skip_serializing_if = "Option::is_none")]
    pub exam_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
}

impl ResourceScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_main_category(mut self, value: impl Into<String>) -> Self {
        self.main_category = Some(value.into());
        self
    }

    pub fn with_exam_type(mut self, value: impl Into<String>) -> Self {
        self.exam_type = Some(value.into());
        self
    }

    pub fn with_subject(mut self, value: impl Into<String>) -> Self {
        self.subject = Some(value.into());
        self
    }

    pub fn with_subcategory(mut self, value: impl Into<String>) -> Self {
        self.subcategory = Some(value.into());
        self
    }

    /// Trimmed value at one level, `None` when absent or blank
    pub fn level(&self, level: ScopeLevel) -> Option<&str> {
        let value = match level {
            ScopeLevel::MainCategory => self.main_category.as_deref(),
            ScopeLevel::ExamType => self.exam_type.as_deref(),
            ScopeLevel::Subject => self.subject.as_deref(),
            ScopeLevel::Subcategory => self.subcategory.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    pub(crate) fn set_level(&mut self, level: ScopeLevel, value: String) {
        let slot = match level {
            ScopeLevel::MainCategory => &mut self.main_category,
            ScopeLevel::ExamType => &mut self.exam_type,
            ScopeLevel::Subject => &mut self.subject,
            ScopeLevel::Subcategory => &mut self.subcategory,
        };
        *slot = Some(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_value_parsing() {
        assert_eq!(ScopeValue::parse("All"), ScopeValue::Wildcard);
        assert_eq!(ScopeValue::parse(" all "), ScopeValue::Wildcard);
        assert_eq!(ScopeValue::parse(""), ScopeValue::Wildcard);
        assert_eq!(
            ScopeValue::parse(" Physics "),
            ScopeValue::Concrete("Physics".to_string())
        );
    }

    #[test]
    fn test_filter_missing_levels_are_wildcard() {
        let filter: ScopeFilter =
            serde_json::from_str(r#"{"mainCategory": "entrance"}"#).unwrap();

        assert_eq!(filter.main_category.as_concrete(), Some("entrance"));
        assert!(filter.exam_type.is_wildcard());
        assert!(filter.subject.is_wildcard());
        assert!(filter.subcategory.is_wildcard());
    }

    #[test]
    fn test_filter_accepts_category_type_alias() {
        let filter: ScopeFilter =
            serde_json::from_str(r#"{"categoryType": "JEE"}"#).unwrap();
        assert_eq!(filter.exam_type.as_concrete(), Some("JEE"));
    }

    #[test]
    fn test_filter_serializes_wildcard_sentinel() {
        let filter = ScopeFilter::unrestricted().with_subject("Physics");
        let json = serde_json::to_value(&filter).unwrap();

        assert_eq!(json["mainCategory"], "All");
        assert_eq!(json["subject"], "Physics");
    }

    #[test]
    fn test_resource_scope_blank_is_absent() {
        let scope = ResourceScope::new().with_subject("  ");
        assert_eq!(scope.level(ScopeLevel::Subject), None);
        assert!(ScopeFilter::unrestricted().is_unrestricted());
    }
}

/// Scope matching and authoring locks
///
/// Levels are evaluated independently. A wildcard at a parent level does
/// not relax a concrete child level, and a concrete parent does not
/// constrain a wildcard child.

use super::types::{ResourceScope, ScopeFilter, ScopeLevel, ScopeValue};

/// Stateless scope matcher
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeMatcher;

impl ScopeMatcher {
    /// Checks whether a resource falls inside a subscription's filter
    ///
    /// A level passes when the filter is wildcard, when the resource does
    /// not declare that level, or when both values are equal ignoring
    /// case and surrounding whitespace. All four levels must pass.
    pub fn matches(filter: &ScopeFilter, target: &ResourceScope) -> bool {
        Self::first_mismatch(filter, target).is_none()
    }

    /// Returns the first level (in order) that fails to match
    pub fn first_mismatch(filter: &ScopeFilter, target: &ResourceScope) -> Option<ScopeLevel> {
        ScopeLevel::ALL
            .into_iter()
            .find(|level| !Self::level_matches(filter.level(*level), target.level(*level)))
    }

    fn level_matches(filter: &ScopeValue, target: Option<&str>) -> bool {
        match (filter, target) {
            (ScopeValue::Wildcard, _) => true,
            (_, None) => true,
            (ScopeValue::Concrete(expected), Some(actual)) => {
                expected.trim().to_lowercase() == actual.to_lowercase()
            }
        }
    }

    /// Checks an authoring target against a subscription's filter
    ///
    /// A concrete filter level locks the target: the target must carry
    /// exactly that value (after trimming) or leave the level unset, in
    /// which case [`ScopeMatcher::apply_locks`] fills it in. Wildcard
    /// levels are free.
    pub fn locked_mismatch(filter: &ScopeFilter, target: &ResourceScope) -> Option<ScopeLevel> {
        ScopeLevel::ALL.into_iter().find(|level| {
            match (filter.level(*level).as_concrete(), target.level(*level)) {
                (Some(locked), Some(chosen)) => locked.trim() != chosen,
                _ => false,
            }
        })
    }

    /// Levels the subscription fixes for authoring
    pub fn locked_levels(filter: &ScopeFilter) -> Vec<ScopeLevel> {
        ScopeLevel::ALL
            .into_iter()
            .filter(|level| !filter.level(*level).is_wildcard())
            .collect()
    }

    /// Returns the target with every locked level set to the filter's value
    pub fn apply_locks(filter: &ScopeFilter, target: &ResourceScope) -> ResourceScope {
        let mut locked = target.clone();
        for level in ScopeLevel::ALL {
            if let Some(value) = filter.level(level).as_concrete() {
                locked.set_level(level, value.trim().to_string());
            }
        }
        locked
    }
}

/// Four-level scope filtering
///
/// Subscriptions carry a [`ScopeFilter`]; resources and authoring targets
/// carry a [`ResourceScope`]. [`ScopeMatcher`] compares the two level by
/// level.
///
/// # Examples
///
/// ```
/// use exampass_entitlements::scope::{ResourceScope, ScopeFilter, ScopeMatcher};
///
/// let filter = ScopeFilter::unrestricted()
///     .with_main_category("entrance")
///     .with_subject("Physics");
/// let test = ResourceScope::new()
///     .with_main_category("Entrance")
///     .with_subject("physics ")
///     .with_subcategory("Optics");
///
/// assert!(ScopeMatcher::matches(&filter, &test));
/// ```

mod types;
mod matcher;


pub use types::{ResourceScope, ScopeFilter, ScopeLevel, ScopeValue, WILDCARD};
pub use matcher::ScopeMatcher;

//! # ExamPass Entitlement Engine
//!
//! Decides, for a student or teacher at a given instant, which content they
//! may open or author, which features are unlocked, and how many more
//! quota-limited actions they may perform in the current subscription
//! period.
//!
//! ## Features
//!
//! - **Four-level scope matching** with per-level wildcards
//! - **Time-computed expiry**: the active flag alone never grants access
//! - **First-match resolution** for students, single-slot for teachers
//! - **Atomic quota consumption** with bounded conflict retry
//! - **Pluggable record store** (in-memory, PostgreSQL)
//!
//! ## Example
//!
//! ```rust
//! use exampass_entitlements::{
//!     EntitlementEngine, Principal, PrincipalSnapshot, Resource, Subscription,
//!     scope::{ResourceScope, ScopeFilter},
//! };
//! use chrono::{Duration, Utc};
//!
//! let now = Utc::now();
//! let subscription = Subscription::new(
//!     "teacher-1",
//!     "physics-pro",
//!     ScopeFilter::unrestricted().with_subject("Physics"),
//!     now - Duration::days(1),
//!     now + Duration::days(30),
//!     5,
//! ).unwrap();
//!
//! let snapshot = PrincipalSnapshot::new(Principal::teacher("teacher-1"), vec![subscription]);
//! let test = Resource::new("test-42", ResourceScope::new().with_subject("physics"));
//!
//! let engine = EntitlementEngine::default();
//! assert!(engine.can_access_resource(&snapshot, &test, now).is_allowed());
//! ```

pub mod types;
pub mod error;
pub mod scope;
pub mod subscription;
pub mod quota;
pub mod engine;
pub mod store;
pub mod catalog;
pub mod plans;
pub mod clock;
pub mod config;
pub mod service;

// Re-export commonly used types
pub use types::{
    Principal, PrincipalSnapshot, QuotaAction, Resource, Role, Subscription, SubscriptionState,
};
pub use engine::{Decision, DenyReason, EngineConfig, EntitlementEngine};
pub use error::{EntitlementError, Result};
pub use quota::{Quota, QuotaTracker, Remaining};
pub use scope::{ResourceScope, ScopeFilter, ScopeMatcher};
pub use service::EntitlementService;
pub use store::{InMemorySubscriptionStore, SubscriptionStore};
pub use subscription::SubscriptionResolver;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

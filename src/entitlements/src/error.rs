//! Error types for the entitlement engine

use thiserror::Error;

/// Entitlement engine errors
///
/// Access denials are not errors; they are returned as
/// [`Decision::Deny`](crate::engine::Decision::Deny).
#[derive(Debug, Error)]
pub enum EntitlementError {
    /// Principal, subscription, plan or resource record missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Consumption would take the quota past its limit
    #[error("Quota exceeded: {consumed} of {limit} already used")]
    QuotaExceeded {
        /// Quota limit of the subscription period
        limit: u32,
        /// Consumption at the time of the rejected request
        consumed: u32,
    },

    /// The charged record was superseded or has passed its end date
    #[error("Subscription not active: {0}")]
    SubscriptionInactive(String),

    /// The store's atomic read-modify-write lost a race
    #[error("Concurrent update conflict: {0}")]
    ConcurrentUpdateConflict(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EntitlementError {
    /// Whether the failed operation may succeed if attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentUpdateConflict(_))
    }
}

/// Result type for entitlement operations
pub type Result<T> = std::result::Result<T, EntitlementError>;

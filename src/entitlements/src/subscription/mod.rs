//! Subscription resolution
//!
//! Students hold an ordered list of records where the first effectively
//! active one wins. Teachers and administrators hold a single slot that a
//! new purchase supersedes.

mod resolver;

pub use resolver::SubscriptionResolver;

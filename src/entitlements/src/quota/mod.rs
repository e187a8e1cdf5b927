//! Quota ledger and tracker
//!
//! The ledger is a counter maintained on each subscription record, reset
//! when a new period begins. The tracker drives the store's atomic
//! check-and-increment and retries lost races a bounded number of times.

mod ledger;
mod tracker;

pub use ledger::{Quota, QuotaExceeded, Remaining};
pub use tracker::{QuotaTracker, DEFAULT_MAX_ATTEMPTS};

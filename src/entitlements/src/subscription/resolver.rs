//! Active subscription resolution
//!
//! Expiry is recomputed from the wall clock on every call; the stored
//! `is_active` flag alone is never authoritative.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::engine::DenyReason;
use crate::error::{EntitlementError, Result};
use crate::plans::Plan;
use crate::scope::ScopeFilter;
use crate::types::{Principal, PrincipalSnapshot, SlotModel, Subscription};

/// Selects the single subscription granting entitlement right now
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriptionResolver;

impl SubscriptionResolver {
    /// Resolve the active subscription for a principal
    ///
    /// Returns `None` when nothing is effectively active; callers treat
    /// that as the free tier, never as an error.
    pub fn resolve_active<'a>(
        principal: &Principal,
        subscriptions: &'a [Subscription],
        now: DateTime<Utc>,
    ) -> Option<&'a Subscription> {
        match principal.role.slot_model() {
            SlotModel::OrderedList => Self::first_active(subscriptions, now),
            SlotModel::SingleSlot => Self::slot_active(principal, subscriptions, now),
        }
    }

    /// Resolve from a snapshot
    pub fn resolve_snapshot(snapshot: &PrincipalSnapshot, now: DateTime<Utc>) -> Option<&Subscription> {
        Self::resolve_active(&snapshot.principal, &snapshot.subscriptions, now)
    }

    /// First record in stored order that is effectively active
    pub fn first_active(subscriptions: &[Subscription], now: DateTime<Utc>) -> Option<&Subscription> {
        subscriptions.iter().find(|s| s.is_effectively_active(now))
    }

    fn slot_active<'a>(
        principal: &Principal,
        subscriptions: &'a [Subscription],
        now: DateTime<Utc>,
    ) -> Option<&'a Subscription> {
        let mut active = subscriptions.iter().filter(|s| s.is_effectively_active(now));
        let slot = active.next()?;

        let extra = active.count();
        if extra > 0 {
            warn!(
                "Principal {} ({}) has {} effectively active subscriptions, using {}",
                principal.id,
                principal.role,
                extra + 1,
                slot.id
            );
        }

        Some(slot)
    }

    /// Why nothing resolved
    ///
    /// `Expired` when some record is still flagged active but past its end
    /// date, `NoSubscription` otherwise (including superseded records).
    pub fn absence_reason(subscriptions: &[Subscription], now: DateTime<Utc>) -> DenyReason {
        if subscriptions
            .iter()
            .any(|s| s.is_active && now >= s.end_date)
        {
            DenyReason::Expired
        } else {
            DenyReason::NoSubscription
        }
    }

    /// Build the record written by a purchase of `plan`
    ///
    /// The period is `[now, now + duration_days)`. Superseding prior
    /// records is left to the store so it happens atomically with the
    /// insert.
    pub fn new_period(
        principal: &Principal,
        plan: &Plan,
        scope: ScopeFilter,
        duration_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Subscription> {
        if duration_days == 0 {
            return Err(EntitlementError::InvalidInput(
                "Subscription duration must be at least one day".to_string(),
            ));
        }

        let end = now + Duration::days(i64::from(duration_days));
        let subscription = Subscription::new(&principal.id, &plan.id, scope, now, end, plan.quota_limit)?
            .with_features(plan.features.iter().cloned());

        debug!(
            "New {} period for {}: {} until {}",
            plan.id, principal.id, subscription.start_date, subscription.end_date
        );

        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubscriptionState;

    fn at(days: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap() + Duration::days(days)
    }

    fn sub(id: &str, start: i64, end: i64) -> Subscription {
        Subscription::new("p", "plan", ScopeFilter::default(), at(start), at(end), 5)
            .unwrap()
            .with_id(id)
    }

    #[test]
    fn test_student_first_active_wins() {
        let student = Principal::student("s1");
        let subs = vec![sub("first", 0, 30), sub("second", 0, 60)];

        let active = SubscriptionResolver::resolve_active(&student, &subs, at(10)).unwrap();
        assert_eq!(active.id, "first");
    }

    #[test]
    fn test_student_order_is_significant() {
        let student = Principal::student("s1");
        let subs = vec![sub("second", 0, 60), sub("first", 0, 30)];

        let active = SubscriptionResolver::resolve_active(&student, &subs, at(10)).unwrap();
        assert_eq!(active.id, "second");
    }

    #[test]
    fn test_student_skips_expired_and_inactive() {
        let student = Principal::student("s1");
        let subs = vec![
            sub("expired", 0, 5),
            sub("superseded", 0, 60).deactivated(),
            sub("current", 0, 60),
        ];

        let active = SubscriptionResolver::resolve_active(&student, &subs, at(10)).unwrap();
        assert_eq!(active.id, "current");
    }

    #[test]
    fn test_expiry_is_time_computed() {
        let teacher = Principal::teacher("t1");
        let subs = vec![sub("slot", 0, 30)];

        assert!(SubscriptionResolver::resolve_active(&teacher, &subs, at(29)).is_some());
        // Flag still set, but the end date has passed
        assert!(subs[0].is_active);
        assert_eq!(subs[0].state(at(30)), SubscriptionState::Expired);
        assert!(SubscriptionResolver::resolve_active(&teacher, &subs, at(30)).is_none());
    }

    #[test]
    fn test_no_records_resolves_to_none() {
        let teacher = Principal::teacher("t1");
        assert!(SubscriptionResolver::resolve_active(&teacher, &[], at(0)).is_none());
        assert_eq!(
            SubscriptionResolver::absence_reason(&[], at(0)),
            DenyReason::NoSubscription
        );
    }

    #[test]
    fn test_absence_reasons() {
        let expired = vec![sub("old", 0, 5)];
        assert_eq!(
            SubscriptionResolver::absence_reason(&expired, at(10)),
            DenyReason::Expired
        );

        let superseded = vec![sub("old", 0, 60).deactivated()];
        assert_eq!(
            SubscriptionResolver::absence_reason(&superseded, at(10)),
            DenyReason::NoSubscription
        );
    }

    #[test]
    fn test_new_period_from_plan() {
        let plan = Plan::new("pro", 25).with_features(["analytics"]);
        let teacher = Principal::teacher("t1");

        let subscription =
            SubscriptionResolver::new_period(&teacher, &plan, ScopeFilter::default(), 30, at(0)).unwrap();
        assert_eq!(subscription.end_date, at(30));
        assert_eq!(subscription.quota.limit, 25);
        assert_eq!(subscription.quota.counted_since, at(0));
        assert!(subscription.has_feature("analytics"));

        assert!(SubscriptionResolver::new_period(&teacher, &plan, ScopeFilter::default(), 0, at(0)).is_err());
    }
}

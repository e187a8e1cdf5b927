//! Entitlement decision tests
//!
//! Covers the full decision path:
//! Subscription resolution → Scope matching → Decision

use chrono::{Duration, TimeZone, Utc};
use exampass_entitlements::{
    scope::ScopeLevel, Decision, DenyReason, EntitlementEngine, EntitlementError,
    InMemorySubscriptionStore, Principal, PrincipalSnapshot, QuotaTracker, Resource,
    ResourceScope, Role, ScopeFilter, Subscription, SubscriptionStore,
};
use std::sync::Arc;

fn physics_scope() -> ScopeFilter {
    ScopeFilter::unrestricted()
        .with_main_category("entrance")
        .with_exam_type("All")
        .with_subject("Physics")
        .with_subcategory("All")
}

fn period() -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (start, start + Duration::days(30))
}

// ============================================================================
// WORKED SCENARIO
// ============================================================================

#[tokio::test]
async fn test_teacher_authors_in_scope_but_quota_is_spent() {
    let (start, end) = period();
    let now = start + Duration::days(3);

    let subscription = Subscription::new("t1", "teacher-basic", physics_scope(), start, end, 5)
        .unwrap()
        .with_id("sub-1")
        .with_consumed(5);

    let store = InMemorySubscriptionStore::new();
    store.put_principal(Principal::teacher("t1")).await;
    store.insert_subscription(subscription.clone()).await.unwrap();

    let engine = EntitlementEngine::default();
    let snapshot = PrincipalSnapshot::new(Principal::teacher("t1"), vec![subscription]);

    let target = ResourceScope::new()
        .with_main_category("entrance")
        .with_subject("Physics");
    assert_eq!(engine.can_author_in(&snapshot, &target, now), Decision::Allow);

    let tracker = QuotaTracker::new(Arc::new(store));
    let result = tracker.try_consume("sub-1", 1, now).await;
    assert!(matches!(
        result,
        Err(EntitlementError::QuotaExceeded { limit: 5, consumed: 5 })
    ));
}

// ============================================================================
// ACCESS DECISIONS
// ============================================================================

#[test]
fn test_demo_resource_open_without_subscription() {
    let (start, _) = period();
    let engine = EntitlementEngine::default();
    let snapshot = PrincipalSnapshot::new(Principal::student("s1"), vec![]);

    let demo = Resource::new("demo-1", ResourceScope::new().with_subject("Chemistry")).demo();
    assert_eq!(engine.can_access_resource(&snapshot, &demo, start), Decision::Allow);
}

#[test]
fn test_no_subscription_denies_everything() {
    let (start, _) = period();
    let engine = EntitlementEngine::default();
    let snapshot = PrincipalSnapshot::new(Principal::student("s1"), vec![]);

    let resource = Resource::new("t1", ResourceScope::new());
    assert_eq!(
        engine.can_access_resource(&snapshot, &resource, start),
        Decision::Deny(DenyReason::NoSubscription)
    );
    assert!(!engine.has_feature(&snapshot, "analytics", start));
}

#[test]
fn test_expired_subscription_denies_with_expired() {
    let (start, end) = period();
    let engine = EntitlementEngine::default();
    let subscription = Subscription::new("s1", "basic", ScopeFilter::unrestricted(), start, end, 0).unwrap();
    let snapshot = PrincipalSnapshot::new(Principal::student("s1"), vec![subscription]);

    let resource = Resource::new("t1", ResourceScope::new());
    assert_eq!(engine.can_access_resource(&snapshot, &resource, end - Duration::seconds(1)), Decision::Allow);
    assert_eq!(
        engine.can_access_resource(&snapshot, &resource, end),
        Decision::Deny(DenyReason::Expired)
    );
}

#[test]
fn test_scope_mismatch_names_level() {
    let (start, end) = period();
    let engine = EntitlementEngine::default();
    let subscription = Subscription::new("s1", "basic", physics_scope(), start, end, 0).unwrap();
    let snapshot = PrincipalSnapshot::new(Principal::student("s1"), vec![subscription]);

    let chemistry = Resource::new(
        "t2",
        ResourceScope::new()
            .with_main_category("ENTRANCE ")
            .with_subject("Chemistry"),
    );
    assert_eq!(
        engine.can_access_resource(&snapshot, &chemistry, start),
        Decision::Deny(DenyReason::ScopeMismatch { level: ScopeLevel::Subject })
    );

    let physics = Resource::new(
        "t3",
        ResourceScope::new()
            .with_main_category("Entrance")
            .with_exam_type("JEE")
            .with_subject(" physics")
            .with_subcategory("Optics"),
    );
    assert_eq!(engine.can_access_resource(&snapshot, &physics, start), Decision::Allow);
}

#[test]
fn test_first_active_student_record_wins() {
    let (start, end) = period();
    let engine = EntitlementEngine::default();

    let lapsed = Subscription::new("s1", "old", ScopeFilter::unrestricted(), start, end, 0)
        .unwrap()
        .deactivated();
    let physics = Subscription::new("s1", "physics", physics_scope(), start, end, 0)
        .unwrap()
        .with_features(["analytics"]);
    let everything = Subscription::new("s1", "all", ScopeFilter::unrestricted(), start, end, 0)
        .unwrap()
        .with_features(["analytics", "mentor"]);

    let snapshot = PrincipalSnapshot::new(
        Principal::student("s1"),
        vec![lapsed, physics, everything],
    );

    let chemistry = Resource::new("t1", ResourceScope::new().with_subject("Chemistry"));
    assert!(!engine.can_access_resource(&snapshot, &chemistry, start).is_allowed());
    assert!(engine.has_feature(&snapshot, "analytics", start));
    assert!(!engine.has_feature(&snapshot, "mentor", start));
    assert!(!engine.has_feature(&snapshot, "Analytics", start));
}

// ============================================================================
// AUTHORING DECISIONS
// ============================================================================

#[test]
fn test_authoring_locks_concrete_levels() {
    let (start, end) = period();
    let engine = EntitlementEngine::default();
    let subscription = Subscription::new("t1", "basic", physics_scope(), start, end, 5).unwrap();
    let snapshot = PrincipalSnapshot::new(Principal::teacher("t1"), vec![subscription]);

    let other_subject = ResourceScope::new()
        .with_main_category("entrance")
        .with_subject("Biology");
    assert_eq!(
        engine.can_author_in(&snapshot, &other_subject, start),
        Decision::Deny(DenyReason::ScopeMismatch { level: ScopeLevel::Subject })
    );

    let free_subcategory = ResourceScope::new()
        .with_main_category("entrance")
        .with_exam_type("NEET")
        .with_subject("Physics")
        .with_subcategory("Mechanics");
    assert!(engine.can_author_in(&snapshot, &free_subcategory, start).is_allowed());
}

#[test]
fn test_students_cannot_author() {
    let (start, end) = period();
    let engine = EntitlementEngine::default();
    let subscription = Subscription::new("s1", "basic", ScopeFilter::unrestricted(), start, end, 0).unwrap();
    let snapshot = PrincipalSnapshot::new(Principal::new("s1", Role::Student), vec![subscription]);

    assert_eq!(
        engine.can_author_in(&snapshot, &ResourceScope::new(), start),
        Decision::Deny(DenyReason::RoleNotPermitted)
    );
}

#[test]
fn test_teacher_single_slot_without_active_record() {
    let (start, end) = period();
    let engine = EntitlementEngine::default();
    let superseded = Subscription::new("t1", "basic", ScopeFilter::unrestricted(), start, end, 5)
        .unwrap()
        .deactivated();
    let snapshot = PrincipalSnapshot::new(Principal::teacher("t1"), vec![superseded]);

    assert_eq!(
        engine.can_author_in(&snapshot, &ResourceScope::new(), start),
        Decision::Deny(DenyReason::NoSubscription)
    );
}

#[test]
fn test_metrics_count_decisions() {
    let (start, _) = period();
    let engine = EntitlementEngine::default();
    let snapshot = PrincipalSnapshot::new(Principal::student("s1"), vec![]);

    let demo = Resource::new("demo", ResourceScope::new()).demo();
    let locked = Resource::new("locked", ResourceScope::new());
    engine.can_access_resource(&snapshot, &demo, start);
    engine.can_access_resource(&snapshot, &locked, start);

    let metrics = engine.get_metrics().unwrap();
    assert_eq!(metrics.allowed_decisions, 1);
    assert_eq!(metrics.denied_decisions, 1);
    assert!((metrics.allow_rate() - 0.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_store_backed_snapshot_preserves_order() {
    let (start, end) = period();
    let store = InMemorySubscriptionStore::new();
    store.put_principal(Principal::student("s1")).await;

    let first = Subscription::new("s1", "physics", physics_scope(), start, end, 0)
        .unwrap()
        .with_id("a");
    let second = Subscription::new("s1", "all", ScopeFilter::unrestricted(), start, end, 0)
        .unwrap()
        .with_id("b");
    store.insert_subscription(first).await.unwrap();
    store.insert_subscription(second).await.unwrap();

    let subscriptions = store.get_subscriptions("s1").await.unwrap();
    let ids: Vec<_> = subscriptions.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

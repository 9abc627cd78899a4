use reconcile_framework::{ReconcileAction, ReconcileError, Reconciler, ResourceAction, ResourceId};
use reconcile_sample::model::ConfigEntry;
use reconcile_sample::reconciler::{MirrorContext, MirrorReconciler};
use std::collections::BTreeMap;
use std::time::Duration;

fn cm(name: &str) -> ResourceId {
    ResourceId::namespaced("ConfigMap", "test", name)
}

fn entry(name: &str, pairs: &[(&str, &str)]) -> ConfigEntry {
    let data = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>();
    ConfigEntry::new(cm(name), data)
}

#[tokio::test]
async fn test_copies_desired_entry_into_mirror() {
    let ctx = MirrorContext::default();
    ctx.desired.upsert(entry("app", &[("A", "1")]));

    let result = MirrorReconciler::new(0)
        .reconcile(&cm("app"), ResourceAction::Added, &ctx)
        .await;

    assert_eq!(result, Ok(ReconcileAction::Done));
    assert_eq!(ctx.mirror.get(&cm("app")), ctx.desired.get(&cm("app")));
}

#[tokio::test]
async fn test_missing_desired_entry_removes_mirror_copy() {
    let ctx = MirrorContext::default();
    ctx.mirror.upsert(entry("gone", &[("A", "1")]));

    // The action does not matter: desired state is the source of truth.
    let result = MirrorReconciler::new(0)
        .reconcile(&cm("gone"), ResourceAction::Generic, &ctx)
        .await;

    assert_eq!(result, Ok(ReconcileAction::Done));
    assert!(ctx.mirror.is_empty());
}

#[tokio::test]
async fn test_invalid_key_is_permanent() {
    let ctx = MirrorContext::default();
    ctx.desired.upsert(entry("bad", &[("has space", "x")]));

    let result = MirrorReconciler::new(0)
        .reconcile(&cm("bad"), ResourceAction::Updated, &ctx)
        .await;

    assert!(matches!(result, Err(ReconcileError::Permanent(_))));
    assert!(ctx.mirror.is_empty());
}

#[tokio::test]
async fn test_flaky_target_fails_transiently_then_recovers() {
    let ctx = MirrorContext::default();
    ctx.desired.upsert(entry("flaky-db", &[("POOL", "4")]));
    let reconciler = MirrorReconciler::new(2);

    for _ in 0..2 {
        let result = reconciler
            .reconcile(&cm("flaky-db"), ResourceAction::Added, &ctx)
            .await;
        assert!(matches!(result, Err(ReconcileError::Transient(_))));
    }
    let result = reconciler
        .reconcile(&cm("flaky-db"), ResourceAction::Added, &ctx)
        .await;
    assert_eq!(result, Ok(ReconcileAction::Done));
    assert!(ctx.mirror.contains(&cm("flaky-db")));
}

#[tokio::test]
async fn test_newer_mirror_generation_is_left_alone() {
    let ctx = MirrorContext::default();
    ctx.desired.upsert(entry("app", &[("A", "1")]));
    let mut newer = entry("app", &[("A", "2")]);
    newer.generation = 5;
    ctx.mirror.upsert(newer.clone());

    MirrorReconciler::new(0)
        .reconcile(&cm("app"), ResourceAction::Generic, &ctx)
        .await
        .unwrap();

    assert_eq!(ctx.mirror.get(&cm("app")), Some(newer));
}

#[tokio::test]
async fn test_refresh_interval_requests_requeue() {
    let ctx = MirrorContext::default();
    ctx.desired
        .upsert(entry("cache", &[("TTL", "60")]).with_refresh(Duration::from_secs(30)));

    let result = MirrorReconciler::new(0)
        .reconcile(&cm("cache"), ResourceAction::Added, &ctx)
        .await;

    assert_eq!(
        result,
        Ok(ReconcileAction::RequeueAfter(Duration::from_secs(30)))
    );
}

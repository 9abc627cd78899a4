use futures::StreamExt;
use reconcile_framework::mock::RecordingReporter;
use reconcile_framework::{
    BufferClient, Completion, DispatchError, EventBuffer, ExponentialBackoff, ItemState, Outcome,
    ResourceAction, ResourceEvent, ResourceId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn node(name: &str) -> ResourceId {
    ResourceId::cluster_scoped("Node", name)
}

fn spawn_buffer(max_pending: Option<usize>) -> (BufferClient, RecordingReporter) {
    let reporter = RecordingReporter::new();
    let retry = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60), 2);
    let (buffer, client) =
        EventBuffer::new(max_pending, Arc::new(retry), Arc::new(reporter.clone()));
    tokio::spawn(buffer.run());
    (client, reporter)
}

#[tokio::test(start_paused = true)]
async fn test_ready_items_streams_coalesced_work() {
    let (client, _) = spawn_buffer(None);
    client.notify(ResourceEvent::added(node("n1"))).unwrap();
    client.notify(ResourceEvent::updated(node("n1"))).unwrap();
    client.notify(ResourceEvent::deleted(node("n2"))).unwrap();

    let items: Vec<_> = client.ready_items().take(2).collect().await;
    let mut seen: Vec<_> = items.iter().map(|item| (item.id.clone(), item.action)).collect();
    seen.sort_by(|a, b| a.0.name.cmp(&b.0.name));
    assert_eq!(
        seen,
        vec![
            (node("n1"), ResourceAction::Updated),
            (node("n2"), ResourceAction::Deleted),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_next_ready_waits_for_requeue_delay() {
    let (client, _) = spawn_buffer(None);
    client.notify(ResourceEvent::added(node("n1"))).unwrap();
    let item = client.next_ready().await.unwrap();

    let completion = client
        .complete(item.id.clone(), Outcome::Requeue(Duration::from_secs(10)))
        .await
        .unwrap();
    assert_eq!(
        completion,
        Completion::Requeued {
            action: ResourceAction::Added,
            delay: Duration::from_secs(10)
        }
    );

    assert!(timeout(Duration::from_secs(5), client.next_ready()).await.is_err());
    let again = timeout(Duration::from_secs(10), client.next_ready())
        .await
        .expect("item becomes eligible after its delay")
        .unwrap();
    assert_eq!(again.id, node("n1"));
    assert_eq!(again.action, ResourceAction::Added);
}

#[tokio::test(start_paused = true)]
async fn test_give_up_is_reported_through_reporter() {
    let (client, reporter) = spawn_buffer(None);
    let id = node("n3");
    client.notify(ResourceEvent::updated(id.clone())).unwrap();

    for _ in 0..2 {
        let item = client.next_ready().await.unwrap();
        client
            .complete(item.id, Outcome::Failure("timeout".into()))
            .await
            .unwrap();
    }

    let records = reporter.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, id);
    assert_eq!(records[0].attempts, 2);
    assert!(matches!(
        client.state_of(id).await.unwrap(),
        ItemState::GivenUp(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_drain_releases_waiting_workers() {
    let (client, _) = spawn_buffer(None);
    let waiting = tokio::spawn({
        let client = client.clone();
        async move { client.next_ready().await }
    });
    tokio::task::yield_now().await;

    client.drain().await.unwrap();
    assert!(matches!(waiting.await.unwrap(), Err(DispatchError::Draining)));
    assert!(matches!(client.next_ready().await, Err(DispatchError::Draining)));

    // Events are still accepted while draining.
    client.notify(ResourceEvent::added(node("late"))).unwrap();
    let stats = client.shutdown().await.unwrap();
    assert_eq!(stats.pending, 1);
}

#[tokio::test]
async fn test_closed_buffer_rejects_requests() {
    let (client, _) = spawn_buffer(None);
    client.shutdown().await.unwrap();
    tokio::task::yield_now().await;

    assert!(matches!(
        client.notify(ResourceEvent::added(node("n1"))),
        Err(DispatchError::BufferClosed)
    ));
    assert!(client.stats().await.is_err());
}

#[tokio::test]
async fn test_overflow_is_visible_through_add() {
    let (client, _) = spawn_buffer(Some(1));
    client.add(ResourceEvent::added(node("a"))).await.unwrap();

    let rejected = client.add(ResourceEvent::generic(node("b"))).await;
    assert!(matches!(
        rejected,
        Err(DispatchError::BufferOverflow { action: ResourceAction::Generic, .. })
    ));
    assert_eq!(client.stats().await.unwrap().rejected, 1);
}

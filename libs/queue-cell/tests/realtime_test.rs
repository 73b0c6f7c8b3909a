use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tokio::sync::broadcast::error::TryRecvError;
use uuid::Uuid;

use queue_cell::*;

fn event_for(queue: &DailyQueue) -> QueueEvent {
    QueueEvent {
        kind: QueueEventKind::Snapshot,
        queue_id: queue.id,
        token: None,
        board: queue.board(),
        timestamp: Utc::now(),
    }
}

fn queue() -> DailyQueue {
    let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
    DailyQueue::new(Uuid::new_v4(), Uuid::new_v4(), date, Utc::now())
}

#[tokio::test]
async fn test_events_reach_only_their_queue() {
    let hub = QueueEventHub::new();
    let first = queue();
    let second = queue();

    let mut rx_first = hub.subscribe(first.id).await;
    let mut rx_second = hub.subscribe(second.id).await;

    assert_eq!(hub.publish(&event_for(&first)).await, 1);

    let raw = rx_first.try_recv().unwrap();
    let value: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["type"], "snapshot");
    assert_eq!(value["queue_id"], first.id.to_string());

    assert_matches::assert_matches!(rx_second.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn test_publish_without_subscribers() {
    let hub = QueueEventHub::new();
    assert_eq!(hub.publish(&event_for(&queue())).await, 0);
}

#[tokio::test]
async fn test_global_feed_wraps_events() {
    let hub = QueueEventHub::new();
    let queue = queue();
    let mut global = hub.subscribe_global();

    hub.publish(&event_for(&queue)).await;

    let value: Value = serde_json::from_str(&global.try_recv().unwrap()).unwrap();
    assert_eq!(value["type"], "queue_update");
    assert_eq!(value["data"]["type"], "snapshot");
}

#[tokio::test]
async fn test_prune_idle_channels() {
    let hub = QueueEventHub::new();
    let kept = queue();
    let dropped = queue();

    let _rx = hub.subscribe(kept.id).await;
    drop(hub.subscribe(dropped.id).await);

    assert_eq!(hub.active_channels().await.len(), 2);
    assert_eq!(hub.subscriber_count(kept.id).await, 1);
    assert_eq!(hub.subscriber_count(dropped.id).await, 0);

    assert_eq!(hub.prune_idle().await, 1);
    assert_eq!(hub.active_channels().await, vec![kept.id]);
}

#[tokio::test]
async fn test_slow_subscriber_lags() {
    let hub = QueueEventHub::new();
    let queue = queue();
    let mut rx = hub.subscribe(queue.id).await;

    for _ in 0..150 {
        hub.publish(&event_for(&queue)).await;
    }

    assert_matches::assert_matches!(rx.try_recv(), Err(TryRecvError::Lagged(50)));
}

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::init_tracing;
use sdk_batch_rust::config::BatchOverrideConfiguration;
use sdk_batch_rust::queue::{
    InMemoryQueueClient, QueueAttributes, QueueBatchManager, QueueOperation, ReceiveMessageRequest,
    RequestOverride, SendMessageRequest,
};
use sdk_batch_rust::Error;
use tokio::time::{sleep, Instant};

fn manager(client: &Arc<InMemoryQueueClient>, config: BatchOverrideConfiguration) -> QueueBatchManager {
    QueueBatchManager::builder()
        .with_client(client.clone())
        .with_scheduled_executor(tokio::runtime::Handle::current())
        .with_override_configuration(config)
        .build()
        .unwrap()
}

async fn seed(manager: &QueueBatchManager, url: &str, bodies: &[&str]) {
    let pending: Vec<_> = bodies
        .iter()
        .map(|b| manager.send_message(SendMessageRequest::new(url, *b)))
        .collect();
    for sent in futures::future::join_all(pending).await {
        sent.unwrap();
    }
}

fn assert_waited(started: Instant, expected: Duration) {
    let waited = started.elapsed();
    assert!(
        waited >= expected && waited < expected + Duration::from_millis(20),
        "waited {:?}, expected {:?}",
        waited,
        expected
    );
}

fn bodies(response: &sdk_batch_rust::queue::ReceiveMessageResponse) -> Vec<&str> {
    response.messages.iter().map(|m| m.body.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn callers_are_served_in_arrival_order() {
    init_tracing();
    let client = Arc::new(InMemoryQueueClient::new());
    let url = client.create_queue("fifo", QueueAttributes::default());
    let manager = manager(&client, BatchOverrideConfiguration::default());
    seed(&manager, &url, &["m0", "m1", "m2", "m3", "m4"]).await;

    let request = |n| ReceiveMessageRequest::new(url.clone()).with_max_number_of_messages(n);
    assert_eq!(bodies(&manager.receive_message(request(2)).await.unwrap()), ["m0", "m1"]);
    assert_eq!(bodies(&manager.receive_message(request(2)).await.unwrap()), ["m2", "m3"]);
    assert_eq!(bodies(&manager.receive_message(request(2)).await.unwrap()), ["m4"]);
}

#[tokio::test(start_paused = true)]
async fn adaptive_prefetching_sizes_receives_to_demand() {
    let client = Arc::new(InMemoryQueueClient::new());
    let url = client.create_queue("adaptive", QueueAttributes::default());
    let config = BatchOverrideConfiguration::builder()
        .with_adaptive_prefetching(true)
        .build()
        .unwrap();
    let manager = manager(&client, config);

    let response = manager
        .receive_message(ReceiveMessageRequest::new(url.clone()).with_max_number_of_messages(1))
        .await
        .unwrap();
    assert!(response.messages.is_empty());
    assert_eq!(client.call_counts().receive_message, 1);
}

#[tokio::test(start_paused = true)]
async fn prefetch_is_bounded_by_done_batches() {
    let client = Arc::new(InMemoryQueueClient::new());
    let url = client.create_queue("bounded", QueueAttributes::default());
    let config = BatchOverrideConfiguration::builder()
        .with_max_done_receive_batches(2)
        .build()
        .unwrap();
    let manager = manager(&client, config);

    manager
        .receive_message(ReceiveMessageRequest::new(url.clone()))
        .await
        .unwrap();
    assert_eq!(client.call_counts().receive_message, 2);
    let snapshot = manager.snapshot();
    let snap = &snapshot.receive[&url];
    assert_eq!(snap.inflight_receives, 2);
    assert_eq!(snap.waiting_callers, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_receive_reaches_one_caller() {
    let client = Arc::new(InMemoryQueueClient::new());
    let url = client.create_queue("flaky", QueueAttributes::default());
    let config = BatchOverrideConfiguration::builder()
        .with_max_done_receive_batches(1)
        .build()
        .unwrap();
    let manager = manager(&client, config);
    seed(&manager, &url, &["only"]).await;
    client.fail_next(QueueOperation::ReceiveMessage, Error::transport("reset"));

    let request = ReceiveMessageRequest::new(url.clone()).with_wait_time(Duration::from_secs(1));
    let (first, second) = tokio::join!(
        manager.receive_message(request.clone()),
        manager.receive_message(request)
    );
    let (failed, served): (Vec<_>, Vec<_>) = [first, second].into_iter().partition(|r| r.is_err());
    assert_eq!(failed.len(), 1);
    assert!(matches!(failed[0], Err(Error::Transport { .. })));
    assert_eq!(bodies(served[0].as_ref().unwrap()), ["only"]);
}

#[tokio::test(start_paused = true)]
async fn elapsed_wait_returns_empty() {
    let client = Arc::new(InMemoryQueueClient::new());
    let url = client.create_queue("empty", QueueAttributes::default());
    let manager = manager(&client, BatchOverrideConfiguration::default());

    let started = Instant::now();
    let response = manager
        .receive_message(ReceiveMessageRequest::new(url).with_wait_time(Duration::from_secs(1)))
        .await
        .unwrap();
    assert!(response.messages.is_empty());
    assert_waited(started, Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn zero_queue_wait_falls_back_to_min_wait() {
    let client = Arc::new(InMemoryQueueClient::new());
    let short = client.create_queue("short", QueueAttributes::default());
    let long = client.create_queue(
        "long",
        QueueAttributes {
            receive_message_wait_time: Duration::from_secs(2),
            ..QueueAttributes::default()
        },
    );
    let config = BatchOverrideConfiguration::builder()
        .with_min_receive_wait_time(Duration::from_millis(300))
        .build()
        .unwrap();
    let manager = manager(&client, config);

    let started = Instant::now();
    manager.receive_message(ReceiveMessageRequest::new(short)).await.unwrap();
    assert_waited(started, Duration::from_millis(300));

    let started = Instant::now();
    manager.receive_message(ReceiveMessageRequest::new(long)).await.unwrap();
    assert_waited(started, Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn expired_prefetched_messages_are_not_served() {
    let client = Arc::new(InMemoryQueueClient::new());
    let url = client.create_queue("expiry", QueueAttributes::default());
    let config = BatchOverrideConfiguration::builder()
        .with_visibility_timeout(Duration::from_secs(1))
        .with_max_done_receive_batches(1)
        .with_receive_message_system_attribute_names(["ApproximateReceiveCount"])
        .build()
        .unwrap();
    let manager = manager(&client, config);
    seed(&manager, &url, &["a", "b"]).await;

    let request = ReceiveMessageRequest::new(url.clone()).with_max_number_of_messages(1);
    let first = manager.receive_message(request.clone()).await.unwrap();
    assert_eq!(bodies(&first), ["a"]);

    sleep(Duration::from_secs(2)).await;
    let second = manager.receive_message(request).await.unwrap();
    assert_eq!(second.messages.len(), 1);
    let message = &second.messages[0];
    // Either message may come back, but only from a fresh receive call.
    assert_eq!(message.attributes["ApproximateReceiveCount"], "2");
}

#[tokio::test(start_paused = true)]
async fn close_fails_waiters_and_releases_messages() {
    let client = Arc::new(InMemoryQueueClient::new());
    let url = client.create_queue("release", QueueAttributes::default());
    let config = BatchOverrideConfiguration::builder()
        .with_max_done_receive_batches(1)
        .build()
        .unwrap();
    let manager = manager(&client, config);
    seed(&manager, &url, &["m0", "m1", "m2"]).await;

    let first = manager
        .receive_message(ReceiveMessageRequest::new(url.clone()).with_max_number_of_messages(1))
        .await
        .unwrap();
    assert_eq!(bodies(&first), ["m0"]);
    assert_eq!(client.visible_message_count(&url), 0);

    manager.close().await;
    assert_eq!(client.visible_message_count(&url), 2);
    assert_eq!(client.call_counts().change_message_visibility_batch, 1);
    assert!(matches!(
        manager.receive_message(ReceiveMessageRequest::new(url)).await,
        Err(Error::Closed)
    ));
}

#[tokio::test(start_paused = true)]
async fn close_wakes_pending_receiver() {
    let client = Arc::new(InMemoryQueueClient::new());
    let url = client.create_queue("idle", QueueAttributes::default());
    let manager = manager(&client, BatchOverrideConfiguration::default());

    let (received, ()) = tokio::join!(
        manager.receive_message(
            ReceiveMessageRequest::new(url).with_wait_time(Duration::from_secs(10))
        ),
        async {
            sleep(Duration::from_millis(10)).await;
            manager.close().await;
        }
    );
    assert!(matches!(received, Err(Error::Closed)));
}

#[tokio::test(start_paused = true)]
async fn incompatible_requests_bypass_the_buffer() {
    let client = Arc::new(InMemoryQueueClient::new());
    let url = client.create_queue("bypass", QueueAttributes::default());
    let config = BatchOverrideConfiguration::builder()
        .with_receive_message_attribute_names(["color"])
        .build()
        .unwrap();
    let manager = manager(&client, config);
    seed(&manager, &url, &["x"]).await;

    let bypassing = [
        ReceiveMessageRequest::new(url.clone()).with_visibility_timeout(Duration::from_secs(5)),
        ReceiveMessageRequest::new(url.clone()).with_message_attribute_names(["shape"]),
        ReceiveMessageRequest {
            override_config: Some(RequestOverride::new().with_header("x-trace", "1")),
            ..ReceiveMessageRequest::new(url.clone())
        },
    ];
    for request in bypassing {
        manager.receive_message(request).await.unwrap();
        assert!(manager.snapshot().receive.is_empty());
    }
    assert_eq!(client.call_counts().receive_message, 3);

    manager
        .receive_message(ReceiveMessageRequest::new(url.clone()).with_message_attribute_names(["color"]))
        .await
        .unwrap();
    assert!(manager.snapshot().receive.contains_key(&url));
}

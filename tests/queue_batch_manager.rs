mod common;

use std::sync::Arc;
use std::time::Duration;

use common::init_tracing;
use sdk_batch_rust::config::BatchOverrideConfiguration;
use sdk_batch_rust::error_code::StandardErrorCode;
use sdk_batch_rust::queue::{
    ChangeMessageVisibilityRequest, DeleteMessageRequest, InMemoryQueueClient, QueueAttributes,
    QueueBatchManager, QueueClient, QueueOperation, ReceiveMessageRequest, RequestOverride,
    SendMessageRequest,
};
use sdk_batch_rust::Error;

fn manager(client: &Arc<InMemoryQueueClient>) -> QueueBatchManager {
    QueueBatchManager::builder()
        .with_client(client.clone())
        .with_scheduled_executor(tokio::runtime::Handle::current())
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn sends_are_packed_into_full_batches() {
    init_tracing();
    let client = Arc::new(InMemoryQueueClient::new());
    let url = client.create_queue("jobs", QueueAttributes::default());
    let manager = manager(&client);

    let pending: Vec<_> = (0..25)
        .map(|i| manager.send_message(SendMessageRequest::new(url.clone(), format!("job-{i}"))))
        .collect();
    // Two full batches leave inline; the remainder waits for the window.
    assert_eq!(client.send_batch_sizes(), vec![10, 10]);

    let sent = futures::future::join_all(pending).await;
    assert!(sent.iter().all(|r| r.as_ref().map_or(false, |s| !s.message_id.is_empty())));
    assert_eq!(client.send_batch_sizes(), vec![10, 10, 5]);
    assert_eq!(client.message_count(&url), 25);
}

#[tokio::test(start_paused = true)]
async fn rejected_entry_fails_alone() {
    let client = Arc::new(InMemoryQueueClient::new());
    let url = client.create_queue("jobs", QueueAttributes::default());
    client.reject_bodies_containing("poison");
    let manager = manager(&client);

    let good = manager.send_message(SendMessageRequest::new(url.clone(), "fine"));
    let bad = manager.send_message(SendMessageRequest::new(url.clone(), "poison pill"));
    assert!(good.await.is_ok());
    let err = bad.await.unwrap_err();
    assert!(matches!(
        &err,
        Error::Remote { code, sender_fault: true, .. } if code == "InvalidMessageContents"
    ));
    assert_eq!(err.code(), StandardErrorCode::EntryRejected);
    assert_eq!(client.call_counts().send_message_batch, 1);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_fails_the_whole_batch() {
    let client = Arc::new(InMemoryQueueClient::new());
    let url = client.create_queue("jobs", QueueAttributes::default());
    client.fail_next(QueueOperation::SendMessageBatch, Error::transport("connection reset"));
    let manager = manager(&client);

    let a = manager.send_message(SendMessageRequest::new(url.clone(), "a"));
    let b = manager.send_message(SendMessageRequest::new(url.clone(), "b"));
    for result in [a.await, b.await] {
        let err = result.unwrap_err();
        assert!(matches!(err, Error::BatchFailed { .. }));
        assert!(err.is_retryable());
    }
}

#[tokio::test(start_paused = true)]
async fn received_messages_can_be_deleted_in_batches() {
    let client = Arc::new(InMemoryQueueClient::new());
    let url = client.create_queue("jobs", QueueAttributes::default());
    let manager = manager(&client);

    let sends: Vec<_> = (0..4)
        .map(|i| manager.send_message(SendMessageRequest::new(url.clone(), format!("m{i}"))))
        .collect();
    futures::future::join_all(sends).await;

    let received = manager
        .receive_message(ReceiveMessageRequest::new(url.clone()).with_max_number_of_messages(10))
        .await
        .unwrap();
    assert_eq!(received.messages.len(), 4);

    let deletes: Vec<_> = received
        .messages
        .iter()
        .map(|m| DeleteMessageRequest::new(url.clone(), m.receipt_handle.clone()))
        .map(|request| manager.delete_message(request))
        .collect();
    for deleted in futures::future::join_all(deletes).await {
        deleted.unwrap();
    }
    assert_eq!(client.call_counts().delete_message_batch, 1);
    assert_eq!(client.message_count(&url), 0);

    let stale = manager
        .delete_message(DeleteMessageRequest::new(url.clone(), "stale-receipt"))
        .await;
    assert!(matches!(stale, Err(Error::Remote { sender_fault: true, .. })));
}

#[tokio::test(start_paused = true)]
async fn visibility_change_makes_message_receivable_again() {
    let client = Arc::new(InMemoryQueueClient::new());
    let url = client.create_queue("jobs", QueueAttributes::default());
    let manager = manager(&client);
    manager
        .send_message(SendMessageRequest::new(url.clone(), "retry me"))
        .await
        .unwrap();

    // Straight from the client so no prefetching receive competes for the message.
    let received = client
        .receive_message(ReceiveMessageRequest::new(url.clone()))
        .await
        .unwrap();
    assert_eq!(client.visible_message_count(&url), 0);

    manager
        .change_message_visibility(ChangeMessageVisibilityRequest::new(
            url.clone(),
            received.messages[0].receipt_handle.clone(),
            Duration::ZERO,
        ))
        .await
        .unwrap();
    assert_eq!(client.visible_message_count(&url), 1);
}

#[tokio::test(start_paused = true)]
async fn overrides_split_batches() {
    let client = Arc::new(InMemoryQueueClient::new());
    let url = client.create_queue("jobs", QueueAttributes::default());
    let manager = manager(&client);

    let plain = manager.send_message(SendMessageRequest::new(url.clone(), "plain"));
    let traced = manager.send_message(
        SendMessageRequest::new(url.clone(), "traced")
            .with_override(RequestOverride::new().with_header("x-trace", "abc")),
    );
    assert_eq!(manager.snapshot().send.batch_keys, 2);

    plain.await.unwrap();
    traced.await.unwrap();
    assert_eq!(client.send_batch_sizes(), vec![1, 1]);
}

#[tokio::test]
async fn oversized_batches_are_rejected_at_build() {
    let client = Arc::new(InMemoryQueueClient::new());
    let result = QueueBatchManager::builder()
        .with_client(client)
        .with_scheduled_executor(tokio::runtime::Handle::current())
        .with_override_configuration(
            BatchOverrideConfiguration::builder()
                .with_max_batch_items(11)
                .build()
                .unwrap(),
        )
        .build();
    match result {
        Err(err @ Error::Configuration { .. }) => {
            assert_eq!(err.context().and_then(|c| c.field_path.as_deref()), Some("max_batch_items"));
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("expected a configuration error"),
    }
}

#[tokio::test]
async fn builder_requires_a_client() {
    let result = QueueBatchManager::builder()
        .with_scheduled_executor(tokio::runtime::Handle::current())
        .build();
    assert!(matches!(result, Err(Error::Configuration { .. })));
}

#[tokio::test(start_paused = true)]
async fn close_fails_buffered_sends() {
    let client = Arc::new(InMemoryQueueClient::new());
    let url = client.create_queue("jobs", QueueAttributes::default());
    let manager = manager(&client);

    let pending = manager.send_message(SendMessageRequest::new(url.clone(), "late"));
    manager.close().await;
    assert!(matches!(pending.await, Err(Error::Closed)));
    assert!(matches!(
        manager.send_message(SendMessageRequest::new(url.clone(), "later")).await,
        Err(Error::Closed)
    ));
    assert_eq!(client.call_counts().send_message_batch, 0);
    assert!(manager.snapshot().send.closed);
}

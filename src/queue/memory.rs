//! In-memory queue service.
//!
//! Implements [`QueueClient`] with long polling, visibility timeouts and
//! per-entry failures so the batching layer can run without a network. Call
//! counters and failure injection make it usable as a test double.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::client::QueueClient;
use super::model::*;
use crate::error::{Error, ErrorContext};
use crate::Result;

struct StoredMessage {
    message_id: String,
    body: String,
    message_attributes: BTreeMap<String, String>,
    visible_at: Instant,
    receipt_handle: Option<String>,
    receive_count: u32,
    sent_at_ms: u128,
}

struct QueueState {
    attributes: QueueAttributes,
    messages: Vec<StoredMessage>,
}

/// Per-operation call counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub send_message_batch: u64,
    pub delete_message_batch: u64,
    pub change_message_visibility_batch: u64,
    pub receive_message: u64,
    pub get_queue_attributes: u64,
}

#[derive(Default)]
struct Counters {
    send_message_batch: AtomicU64,
    delete_message_batch: AtomicU64,
    change_message_visibility_batch: AtomicU64,
    receive_message: AtomicU64,
    get_queue_attributes: AtomicU64,
}

#[derive(Default)]
struct Failures {
    send_message_batch: Option<Error>,
    delete_message_batch: Option<Error>,
    change_message_visibility_batch: Option<Error>,
    receive_message: Option<Error>,
    get_queue_attributes: Option<Error>,
    rejected_body_marker: Option<String>,
}

/// Which call a scripted failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOperation {
    SendMessageBatch,
    DeleteMessageBatch,
    ChangeMessageVisibilityBatch,
    ReceiveMessage,
    GetQueueAttributes,
}

#[derive(Default)]
pub struct InMemoryQueueClient {
    queues: Mutex<HashMap<String, QueueState>>,
    arrivals: Notify,
    counters: Counters,
    failures: Mutex<Failures>,
    send_batch_sizes: Mutex<Vec<usize>>,
}

impl InMemoryQueueClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reset) a queue and return its URL.
    pub fn create_queue(&self, name: &str, attributes: QueueAttributes) -> String {
        let url = format!("memory://queues/{}", name);
        self.queues.lock().insert(
            url.clone(),
            QueueState {
                attributes,
                messages: Vec::new(),
            },
        );
        url
    }

    /// Fail the next call of `operation` with `error`.
    pub fn fail_next(&self, operation: QueueOperation, error: Error) {
        let mut f = self.failures.lock();
        let slot = match operation {
            QueueOperation::SendMessageBatch => &mut f.send_message_batch,
            QueueOperation::DeleteMessageBatch => &mut f.delete_message_batch,
            QueueOperation::ChangeMessageVisibilityBatch => &mut f.change_message_visibility_batch,
            QueueOperation::ReceiveMessage => &mut f.receive_message,
            QueueOperation::GetQueueAttributes => &mut f.get_queue_attributes,
        };
        *slot = Some(error);
    }

    /// Reject send entries whose body contains `marker` as a sender fault.
    pub fn reject_bodies_containing(&self, marker: impl Into<String>) {
        self.failures.lock().rejected_body_marker = Some(marker.into());
    }

    pub fn call_counts(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            send_message_batch: c.send_message_batch.load(Ordering::SeqCst),
            delete_message_batch: c.delete_message_batch.load(Ordering::SeqCst),
            change_message_visibility_batch: c.change_message_visibility_batch.load(Ordering::SeqCst),
            receive_message: c.receive_message.load(Ordering::SeqCst),
            get_queue_attributes: c.get_queue_attributes.load(Ordering::SeqCst),
        }
    }

    /// Entry counts of every send batch call, in call order.
    pub fn send_batch_sizes(&self) -> Vec<usize> {
        self.send_batch_sizes.lock().clone()
    }

    /// Messages stored in the queue, visible or not.
    pub fn message_count(&self, queue_url: &str) -> usize {
        self.queues
            .lock()
            .get(queue_url)
            .map_or(0, |q| q.messages.len())
    }

    /// Messages a receive call could return right now.
    pub fn visible_message_count(&self, queue_url: &str) -> usize {
        let now = Instant::now();
        self.queues.lock().get(queue_url).map_or(0, |q| {
            q.messages.iter().filter(|m| m.visible_at <= now).count()
        })
    }

    fn take_failure(&self, operation: QueueOperation) -> Option<Error> {
        let mut f = self.failures.lock();
        match operation {
            QueueOperation::SendMessageBatch => f.send_message_batch.take(),
            QueueOperation::DeleteMessageBatch => f.delete_message_batch.take(),
            QueueOperation::ChangeMessageVisibilityBatch => f.change_message_visibility_batch.take(),
            QueueOperation::ReceiveMessage => f.receive_message.take(),
            QueueOperation::GetQueueAttributes => f.get_queue_attributes.take(),
        }
    }

    fn with_queue<T>(&self, queue_url: &str, f: impl FnOnce(&mut QueueState) -> T) -> Result<T> {
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(queue_url).ok_or_else(|| Error::Remote {
            code: "QueueDoesNotExist".into(),
            message: format!("queue {} does not exist", queue_url),
            sender_fault: true,
        })?;
        Ok(f(queue))
    }

    /// Take up to `max` visible messages, or report when the next one becomes visible.
    fn try_receive(
        &self,
        request: &ReceiveMessageRequest,
        now: Instant,
    ) -> Result<(Vec<Message>, Option<Instant>)> {
        let max = request.max_number_of_messages.unwrap_or(1).clamp(1, 10);
        self.with_queue(&request.queue_url, |queue| {
            let visibility = request
                .visibility_timeout
                .unwrap_or(queue.attributes.visibility_timeout);
            let mut picked = Vec::new();
            for stored in queue.messages.iter_mut() {
                if picked.len() == max {
                    break;
                }
                if stored.visible_at > now {
                    continue;
                }
                let receipt = Uuid::new_v4().to_string();
                stored.receipt_handle = Some(receipt.clone());
                stored.visible_at = now + visibility;
                stored.receive_count += 1;
                picked.push(to_message(stored, receipt, request));
            }
            let next_visible = queue
                .messages
                .iter()
                .map(|m| m.visible_at)
                .filter(|at| *at > now)
                .min();
            (picked, next_visible)
        })
    }
}

fn to_message(stored: &StoredMessage, receipt_handle: String, request: &ReceiveMessageRequest) -> Message {
    fn wants(names: &[String], name: &str) -> bool {
        names.iter().any(|n| n == name || n == "All")
    }
    let mut attributes = BTreeMap::new();
    if wants(&request.message_system_attribute_names, "ApproximateReceiveCount") {
        attributes.insert(
            "ApproximateReceiveCount".to_string(),
            stored.receive_count.to_string(),
        );
    }
    if wants(&request.message_system_attribute_names, "SentTimestamp") {
        attributes.insert("SentTimestamp".to_string(), stored.sent_at_ms.to_string());
    }
    let message_attributes = stored
        .message_attributes
        .iter()
        .filter(|(k, _)| wants(&request.message_attribute_names, k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Message {
        message_id: stored.message_id.clone(),
        receipt_handle,
        body: stored.body.clone(),
        attributes,
        message_attributes,
    }
}

fn invalid_receipt(id: String) -> BatchResultErrorEntry {
    BatchResultErrorEntry {
        id,
        code: "ReceiptHandleIsInvalid".into(),
        message: "receipt handle is not current".into(),
        sender_fault: true,
    }
}

fn check_batch_size(len: usize) -> Result<()> {
    if len == 0 || len > 10 {
        return Err(Error::Remote {
            code: if len == 0 {
                "EmptyBatchRequest".into()
            } else {
                "TooManyEntriesInBatchRequest".into()
            },
            message: format!("batch holds {} entries", len),
            sender_fault: true,
        });
    }
    Ok(())
}

#[async_trait]
impl QueueClient for InMemoryQueueClient {
    async fn send_message_batch(
        &self,
        request: SendMessageBatchRequest,
    ) -> Result<SendMessageBatchResponse> {
        self.counters.send_message_batch.fetch_add(1, Ordering::SeqCst);
        self.send_batch_sizes.lock().push(request.entries.len());
        if let Some(err) = self.take_failure(QueueOperation::SendMessageBatch) {
            return Err(err);
        }
        check_batch_size(request.entries.len())?;
        let marker = self.failures.lock().rejected_body_marker.clone();
        let now = Instant::now();
        let sent_at_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        let response = self.with_queue(&request.queue_url, |queue| {
            let mut response = SendMessageBatchResponse::default();
            for entry in request.entries {
                if marker.as_deref().map_or(false, |m| entry.message_body.contains(m)) {
                    response.failed.push(BatchResultErrorEntry {
                        id: entry.id,
                        code: "InvalidMessageContents".into(),
                        message: "message body rejected".into(),
                        sender_fault: true,
                    });
                    continue;
                }
                let message_id = Uuid::new_v4().to_string();
                queue.messages.push(StoredMessage {
                    message_id: message_id.clone(),
                    body: entry.message_body,
                    message_attributes: entry.message_attributes,
                    visible_at: now + entry.delay.unwrap_or(Duration::ZERO),
                    receipt_handle: None,
                    receive_count: 0,
                    sent_at_ms,
                });
                response.successful.push(SendMessageBatchResultEntry {
                    id: entry.id,
                    message_id,
                    sequence_number: None,
                });
            }
            response
        })?;
        self.arrivals.notify_waiters();
        Ok(response)
    }

    async fn delete_message_batch(
        &self,
        request: DeleteMessageBatchRequest,
    ) -> Result<DeleteMessageBatchResponse> {
        self.counters.delete_message_batch.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure(QueueOperation::DeleteMessageBatch) {
            return Err(err);
        }
        check_batch_size(request.entries.len())?;
        self.with_queue(&request.queue_url, |queue| {
            let mut response = DeleteMessageBatchResponse::default();
            for entry in request.entries {
                let before = queue.messages.len();
                queue
                    .messages
                    .retain(|m| m.receipt_handle.as_deref() != Some(entry.receipt_handle.as_str()));
                if queue.messages.len() < before {
                    response.successful.push(DeleteMessageBatchResultEntry { id: entry.id });
                } else {
                    response.failed.push(invalid_receipt(entry.id));
                }
            }
            response
        })
    }

    async fn change_message_visibility_batch(
        &self,
        request: ChangeMessageVisibilityBatchRequest,
    ) -> Result<ChangeMessageVisibilityBatchResponse> {
        self.counters
            .change_message_visibility_batch
            .fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure(QueueOperation::ChangeMessageVisibilityBatch) {
            return Err(err);
        }
        check_batch_size(request.entries.len())?;
        let now = Instant::now();
        let response = self.with_queue(&request.queue_url, |queue| {
            let mut response = ChangeMessageVisibilityBatchResponse::default();
            for entry in request.entries {
                let target = queue
                    .messages
                    .iter_mut()
                    .find(|m| m.receipt_handle.as_deref() == Some(entry.receipt_handle.as_str()));
                match target {
                    Some(m) => {
                        m.visible_at = now + entry.visibility_timeout;
                        response
                            .successful
                            .push(ChangeMessageVisibilityBatchResultEntry { id: entry.id });
                    }
                    None => response.failed.push(invalid_receipt(entry.id)),
                }
            }
            response
        })?;
        self.arrivals.notify_waiters();
        Ok(response)
    }

    async fn receive_message(&self, request: ReceiveMessageRequest) -> Result<ReceiveMessageResponse> {
        self.counters.receive_message.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure(QueueOperation::ReceiveMessage) {
            return Err(err);
        }
        let wait = request.wait_time.unwrap_or(Duration::ZERO);
        let deadline = Instant::now() + wait;
        loop {
            // Registered before checking so a send between check and wait still wakes us.
            let arrival = self.arrivals.notified();
            let now = Instant::now();
            let (messages, next_visible) = self.try_receive(&request, now)?;
            if !messages.is_empty() || now >= deadline {
                return Ok(ReceiveMessageResponse { messages });
            }
            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = arrival => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn get_queue_attributes(&self, queue_url: &str) -> Result<QueueAttributes> {
        self.counters.get_queue_attributes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure(QueueOperation::GetQueueAttributes) {
            return Err(err);
        }
        self.with_queue(queue_url, |queue| queue.attributes)
            .map_err(|e| match e {
                Error::Remote { message, .. } => Error::transport_with_context(
                    message,
                    ErrorContext::new()
                        .with_field_path("queue_url")
                        .with_source("in_memory_queue"),
                ),
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send_batch(url: &str, bodies: &[&str]) -> SendMessageBatchRequest {
        SendMessageBatchRequest {
            queue_url: url.to_string(),
            entries: bodies
                .iter()
                .enumerate()
                .map(|(i, b)| SendMessageBatchRequestEntry {
                    id: i.to_string(),
                    message_body: b.to_string(),
                    ..Default::default()
                })
                .collect(),
            override_config: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn received_messages_stay_hidden_until_visibility_expires() {
        let client = InMemoryQueueClient::new();
        let url = client.create_queue("q", QueueAttributes::default());
        client.send_message_batch(send_batch(&url, &["a", "b"])).await.unwrap();

        let request = ReceiveMessageRequest::new(url.clone())
            .with_max_number_of_messages(10)
            .with_visibility_timeout(Duration::from_secs(5));
        let first = client.receive_message(request.clone()).await.unwrap();
        assert_eq!(first.messages.len(), 2);
        assert_eq!(client.visible_message_count(&url), 0);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(client.visible_message_count(&url), 2);
        let again = client.receive_message(request).await.unwrap();
        assert_ne!(again.messages[0].receipt_handle, first.messages[0].receipt_handle);
    }

    #[tokio::test(start_paused = true)]
    async fn long_poll_wakes_on_send() {
        let client = std::sync::Arc::new(InMemoryQueueClient::new());
        let url = client.create_queue("q", QueueAttributes::default());
        let poller = {
            let client = std::sync::Arc::clone(&client);
            let url = url.clone();
            tokio::spawn(async move {
                client
                    .receive_message(
                        ReceiveMessageRequest::new(url).with_wait_time(Duration::from_secs(20)),
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        client.send_message_batch(send_batch(&url, &["hello"])).await.unwrap();
        let response = poller.await.unwrap().unwrap();
        assert_eq!(response.messages.len(), 1);
        assert_eq!(response.messages[0].body, "hello");
    }

    #[tokio::test]
    async fn delete_requires_current_receipt() {
        let client = InMemoryQueueClient::new();
        let url = client.create_queue("q", QueueAttributes::default());
        client.send_message_batch(send_batch(&url, &["a"])).await.unwrap();
        let msg = client
            .receive_message(ReceiveMessageRequest::new(url.clone()))
            .await
            .unwrap()
            .messages
            .remove(0);

        let response = client
            .delete_message_batch(DeleteMessageBatchRequest {
                queue_url: url.clone(),
                entries: vec![
                    DeleteMessageBatchRequestEntry {
                        id: "0".into(),
                        receipt_handle: msg.receipt_handle,
                    },
                    DeleteMessageBatchRequestEntry {
                        id: "1".into(),
                        receipt_handle: "stale".into(),
                    },
                ],
                override_config: None,
            })
            .await
            .unwrap();
        assert_eq!(response.successful.len(), 1);
        assert_eq!(response.failed[0].id, "1");
        assert_eq!(client.message_count(&url), 0);
    }

    #[tokio::test]
    async fn scripted_failure_applies_once() {
        let client = InMemoryQueueClient::new();
        let url = client.create_queue("q", QueueAttributes::default());
        client.fail_next(QueueOperation::SendMessageBatch, Error::transport("reset"));
        assert!(client.send_message_batch(send_batch(&url, &["a"])).await.is_err());
        assert!(client.send_message_batch(send_batch(&url, &["a"])).await.is_ok());
        assert_eq!(client.call_counts().send_message_batch, 2);
    }
}

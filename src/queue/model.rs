//! Queue operation models.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Per-request settings that prevent sharing a wire call with requests that
/// carry different ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RequestOverride {
    pub api_call_timeout_ms: Option<u64>,
    pub headers: BTreeMap<String, String>,
}

impl RequestOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_call_timeout(mut self, timeout: Duration) -> Self {
        self.api_call_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Stable 16 hex digit digest of the canonical JSON form.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// A single-message request that the outbound managers batch by queue.
pub trait QueueRequest {
    fn queue_url(&self) -> &str;
    fn override_config(&self) -> Option<&RequestOverride>;
}

macro_rules! queue_request {
    ($($t:ty),+ $(,)?) => {$(
        impl QueueRequest for $t {
            fn queue_url(&self) -> &str {
                &self.queue_url
            }
            fn override_config(&self) -> Option<&RequestOverride> {
                self.override_config.as_ref()
            }
        }
    )+};
}

queue_request!(
    SendMessageRequest,
    DeleteMessageRequest,
    ChangeMessageVisibilityRequest,
    ReceiveMessageRequest,
);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SendMessageRequest {
    pub queue_url: String,
    pub message_body: String,
    pub delay: Option<Duration>,
    pub message_attributes: BTreeMap<String, String>,
    pub message_group_id: Option<String>,
    pub message_deduplication_id: Option<String>,
    pub override_config: Option<RequestOverride>,
}

impl SendMessageRequest {
    pub fn new(queue_url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            message_body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_message_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.message_attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_override(mut self, o: RequestOverride) -> Self {
        self.override_config = Some(o);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SendMessageResponse {
    pub message_id: String,
    pub sequence_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SendMessageBatchRequestEntry {
    pub id: String,
    pub message_body: String,
    pub delay: Option<Duration>,
    pub message_attributes: BTreeMap<String, String>,
    pub message_group_id: Option<String>,
    pub message_deduplication_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SendMessageBatchRequest {
    pub queue_url: String,
    pub entries: Vec<SendMessageBatchRequestEntry>,
    pub override_config: Option<RequestOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SendMessageBatchResultEntry {
    pub id: String,
    pub message_id: String,
    pub sequence_number: Option<String>,
}

/// A per-entry failure inside an otherwise successful batch call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchResultErrorEntry {
    pub id: String,
    pub code: String,
    pub message: String,
    pub sender_fault: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SendMessageBatchResponse {
    pub successful: Vec<SendMessageBatchResultEntry>,
    pub failed: Vec<BatchResultErrorEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteMessageRequest {
    pub queue_url: String,
    pub receipt_handle: String,
    pub override_config: Option<RequestOverride>,
}

impl DeleteMessageRequest {
    pub fn new(queue_url: impl Into<String>, receipt_handle: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            receipt_handle: receipt_handle.into(),
            override_config: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteMessageResponse;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteMessageBatchRequestEntry {
    pub id: String,
    pub receipt_handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteMessageBatchRequest {
    pub queue_url: String,
    pub entries: Vec<DeleteMessageBatchRequestEntry>,
    pub override_config: Option<RequestOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteMessageBatchResultEntry {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteMessageBatchResponse {
    pub successful: Vec<DeleteMessageBatchResultEntry>,
    pub failed: Vec<BatchResultErrorEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeMessageVisibilityRequest {
    pub queue_url: String,
    pub receipt_handle: String,
    pub visibility_timeout: Duration,
    pub override_config: Option<RequestOverride>,
}

impl ChangeMessageVisibilityRequest {
    pub fn new(
        queue_url: impl Into<String>,
        receipt_handle: impl Into<String>,
        visibility_timeout: Duration,
    ) -> Self {
        Self {
            queue_url: queue_url.into(),
            receipt_handle: receipt_handle.into(),
            visibility_timeout,
            override_config: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeMessageVisibilityResponse;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeMessageVisibilityBatchRequestEntry {
    pub id: String,
    pub receipt_handle: String,
    pub visibility_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeMessageVisibilityBatchRequest {
    pub queue_url: String,
    pub entries: Vec<ChangeMessageVisibilityBatchRequestEntry>,
    pub override_config: Option<RequestOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeMessageVisibilityBatchResultEntry {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeMessageVisibilityBatchResponse {
    pub successful: Vec<ChangeMessageVisibilityBatchResultEntry>,
    pub failed: Vec<BatchResultErrorEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReceiveMessageRequest {
    pub queue_url: String,
    pub max_number_of_messages: Option<usize>,
    pub wait_time: Option<Duration>,
    pub visibility_timeout: Option<Duration>,
    pub message_attribute_names: Vec<String>,
    pub message_system_attribute_names: Vec<String>,
    pub override_config: Option<RequestOverride>,
}

impl ReceiveMessageRequest {
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            ..Default::default()
        }
    }

    pub fn with_max_number_of_messages(mut self, n: usize) -> Self {
        self.max_number_of_messages = Some(n);
        self
    }

    pub fn with_wait_time(mut self, wait: Duration) -> Self {
        self.wait_time = Some(wait);
        self
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = Some(timeout);
        self
    }

    pub fn with_message_attribute_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.message_attribute_names = names.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    /// System attributes such as `ApproximateReceiveCount`.
    pub attributes: BTreeMap<String, String>,
    pub message_attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReceiveMessageResponse {
    pub messages: Vec<Message>,
}

/// Server-side queue settings the receive path depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueAttributes {
    pub visibility_timeout: Duration,
    pub receive_message_wait_time: Duration,
}

impl Default for QueueAttributes {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            receive_message_wait_time: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let a = RequestOverride::new().with_header("x-trace", "1");
        let b = RequestOverride::new().with_header("x-trace", "1");
        let c = RequestOverride::new().with_header("x-trace", "2");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);
    }

    #[test]
    fn requests_expose_queue_url() {
        let r = SendMessageRequest::new("q1", "body").with_override(RequestOverride::new());
        assert_eq!(r.queue_url(), "q1");
        assert!(r.override_config().is_some());
        assert!(DeleteMessageRequest::new("q1", "rh").override_config().is_none());
    }
}

//! Queue service seam.

use async_trait::async_trait;

use super::model::{
    ChangeMessageVisibilityBatchRequest, ChangeMessageVisibilityBatchResponse,
    DeleteMessageBatchRequest, DeleteMessageBatchResponse, QueueAttributes,
    ReceiveMessageRequest, ReceiveMessageResponse, SendMessageBatchRequest,
    SendMessageBatchResponse,
};
use crate::Result;

/// The wire calls the batching layer issues against a queue service.
///
/// Implementations report whole-call failures as `Err` and per-entry failures
/// in the `failed` list of the batch response.
#[async_trait]
pub trait QueueClient: Send + Sync {
    async fn send_message_batch(
        &self,
        request: SendMessageBatchRequest,
    ) -> Result<SendMessageBatchResponse>;

    async fn delete_message_batch(
        &self,
        request: DeleteMessageBatchRequest,
    ) -> Result<DeleteMessageBatchResponse>;

    async fn change_message_visibility_batch(
        &self,
        request: ChangeMessageVisibilityBatchRequest,
    ) -> Result<ChangeMessageVisibilityBatchResponse>;

    async fn receive_message(&self, request: ReceiveMessageRequest)
        -> Result<ReceiveMessageResponse>;

    async fn get_queue_attributes(&self, queue_url: &str) -> Result<QueueAttributes>;
}

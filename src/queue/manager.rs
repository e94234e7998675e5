//! Queue batch manager facade.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::info;

use super::attributes::QueueAttributesManager;
use super::client::QueueClient;
use super::functions::{
    change_visibility_batch_function, change_visibility_response_mapper,
    delete_message_batch_function, delete_message_response_mapper, queue_batch_key,
    send_message_batch_function, send_message_response_mapper,
};
use super::model::*;
use super::receive::{ReceiveBufferSnapshot, MAX_QUEUE_BATCH_ENTRIES};
use super::receive_manager::ReceiveBatchManager;
use crate::batch::{BatchManager, BatchManagerSnapshot, BatchMode, PendingResponse};
use crate::config::{BatchOverrideConfiguration, ResponseBatchConfiguration};
use crate::error::{Error, ErrorContext};
use crate::Result;

type SendManager = BatchManager<SendMessageRequest, SendMessageResponse, SendMessageBatchResponse>;
type DeleteManager =
    BatchManager<DeleteMessageRequest, DeleteMessageResponse, DeleteMessageBatchResponse>;
type VisibilityManager = BatchManager<
    ChangeMessageVisibilityRequest,
    ChangeMessageVisibilityResponse,
    ChangeMessageVisibilityBatchResponse,
>;

/// Snapshot of every manager behind a [`QueueBatchManager`].
#[derive(Debug, Clone, Default)]
pub struct QueueBatchSnapshot {
    pub send: BatchManagerSnapshot,
    pub delete: BatchManagerSnapshot,
    pub change_visibility: BatchManagerSnapshot,
    pub receive: std::collections::HashMap<String, ReceiveBufferSnapshot>,
}

/// Client-shaped entry point that batches sends, deletes and visibility
/// changes per queue and serves receives from a prefetch buffer.
pub struct QueueBatchManager {
    send: SendManager,
    delete: DeleteManager,
    change_visibility: VisibilityManager,
    receive: ReceiveBatchManager,
    attributes: Arc<QueueAttributesManager>,
}

impl QueueBatchManager {
    pub fn builder() -> QueueBatchManagerBuilder {
        QueueBatchManagerBuilder::default()
    }

    pub fn send_message(&self, request: SendMessageRequest) -> PendingResponse<SendMessageResponse> {
        self.send.submit(request)
    }

    pub fn delete_message(
        &self,
        request: DeleteMessageRequest,
    ) -> PendingResponse<DeleteMessageResponse> {
        self.delete.submit(request)
    }

    pub fn change_message_visibility(
        &self,
        request: ChangeMessageVisibilityRequest,
    ) -> PendingResponse<ChangeMessageVisibilityResponse> {
        self.change_visibility.submit(request)
    }

    pub async fn receive_message(
        &self,
        request: ReceiveMessageRequest,
    ) -> Result<ReceiveMessageResponse> {
        self.receive.receive_message(request).await
    }

    pub fn attributes(&self) -> &QueueAttributesManager {
        &self.attributes
    }

    pub fn snapshot(&self) -> QueueBatchSnapshot {
        QueueBatchSnapshot {
            send: self.send.snapshot(),
            delete: self.delete.snapshot(),
            change_visibility: self.change_visibility.snapshot(),
            receive: self.receive.snapshot(),
        }
    }

    /// Close every underlying manager; buffered outbound entries fail with
    /// [`Error::Closed`] and prefetched messages are released.
    pub async fn close(&self) {
        self.send.close();
        self.delete.close();
        self.change_visibility.close();
        self.receive.close().await;
        info!("queue batch manager closed");
    }
}

#[derive(Default)]
pub struct QueueBatchManagerBuilder {
    client: Option<Arc<dyn QueueClient>>,
    scheduled_executor: Option<Handle>,
    override_configuration: Option<BatchOverrideConfiguration>,
}

impl QueueBatchManagerBuilder {
    pub fn with_client(mut self, client: Arc<dyn QueueClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_scheduled_executor(mut self, handle: Handle) -> Self {
        self.scheduled_executor = Some(handle);
        self
    }

    pub fn with_override_configuration(mut self, config: BatchOverrideConfiguration) -> Self {
        self.override_configuration = Some(config);
        self
    }

    pub fn build(self) -> Result<QueueBatchManager> {
        const SOURCE: &str = "queue_batch_manager_builder";
        let client = self
            .client
            .ok_or_else(|| Error::missing_field("client", SOURCE))?;
        let executor = self
            .scheduled_executor
            .ok_or_else(|| Error::missing_field("scheduled_executor", SOURCE))?;
        let overrides = self.override_configuration;
        if let Some(n) = overrides.as_ref().and_then(|o| o.max_batch_items) {
            if n > MAX_QUEUE_BATCH_ENTRIES {
                return Err(Error::configuration_with_context(
                    format!(
                        "max_batch_items must not exceed {} for queue batches",
                        MAX_QUEUE_BATCH_ENTRIES
                    ),
                    ErrorContext::new()
                        .with_field_path("max_batch_items")
                        .with_details(format!("got {}", n))
                        .with_source(SOURCE),
                ));
            }
        }

        let attributes = Arc::new(QueueAttributesManager::new(Arc::clone(&client)));

        let send = SendManager::builder()
            .with_batch_function(send_message_batch_function(Arc::clone(&client)))
            .with_response_mapper(send_message_response_mapper)
            .with_batch_key_mapper(queue_batch_key::<SendMessageRequest>)
            .with_scheduled_executor(executor.clone())
            .with_mode(BatchMode::Request);
        let delete = DeleteManager::builder()
            .with_batch_function(delete_message_batch_function(Arc::clone(&client)))
            .with_response_mapper(delete_message_response_mapper)
            .with_batch_key_mapper(queue_batch_key::<DeleteMessageRequest>)
            .with_scheduled_executor(executor.clone())
            .with_mode(BatchMode::Request);
        let change_visibility = VisibilityManager::builder()
            .with_batch_function(change_visibility_batch_function(Arc::clone(&client)))
            .with_response_mapper(change_visibility_response_mapper)
            .with_batch_key_mapper(queue_batch_key::<ChangeMessageVisibilityRequest>)
            .with_scheduled_executor(executor.clone())
            .with_mode(BatchMode::Request);
        let (send, delete, change_visibility) = match &overrides {
            Some(o) => (
                send.with_override_configuration(o.clone()),
                delete.with_override_configuration(o.clone()),
                change_visibility.with_override_configuration(o.clone()),
            ),
            None => (send, delete, change_visibility),
        };

        let receive = ReceiveBatchManager::new(
            Arc::clone(&client),
            Arc::clone(&attributes),
            ResponseBatchConfiguration::from_override(overrides.as_ref()),
            executor,
        );

        Ok(QueueBatchManager {
            send: send.build()?,
            delete: delete.build()?,
            change_visibility: change_visibility.build()?,
            receive,
            attributes,
        })
    }
}

//! Receive batch manager: one prefetching buffer per queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tracing::{debug, info};

use super::attributes::QueueAttributesManager;
use super::client::QueueClient;
use super::model::{ReceiveMessageRequest, ReceiveMessageResponse};
use super::receive::{ReceiveBufferSnapshot, ReceiveQueueBuffer};
use crate::config::ResponseBatchConfiguration;
use crate::error::Error;
use crate::Result;

pub struct ReceiveBatchManager {
    client: Arc<dyn QueueClient>,
    attributes: Arc<QueueAttributesManager>,
    config: ResponseBatchConfiguration,
    executor: Handle,
    buffers: DashMap<String, ReceiveQueueBuffer>,
    closed: AtomicBool,
}

impl ReceiveBatchManager {
    pub fn new(
        client: Arc<dyn QueueClient>,
        attributes: Arc<QueueAttributesManager>,
        config: ResponseBatchConfiguration,
        executor: Handle,
    ) -> Self {
        Self {
            client,
            attributes,
            config,
            executor,
            buffers: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ResponseBatchConfiguration {
        &self.config
    }

    pub async fn receive_message(
        &self,
        request: ReceiveMessageRequest,
    ) -> Result<ReceiveMessageResponse> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        if !self.can_be_buffered(&request) {
            debug!(queue_url = %request.queue_url, "receive bypasses the prefetch buffer");
            return self.client.receive_message(request).await;
        }

        let wait = self
            .attributes
            .receive_message_timeout(
                &request.queue_url,
                request.wait_time,
                self.config.min_receive_wait_time,
            )
            .await?;
        let max_messages = request
            .max_number_of_messages
            .unwrap_or(self.config.max_batch_items)
            .min(self.config.max_batch_items);
        let buffer = self
            .buffers
            .entry(request.queue_url.clone())
            .or_insert_with(|| {
                ReceiveQueueBuffer::new(
                    request.queue_url.clone(),
                    Arc::clone(&self.client),
                    Arc::clone(&self.attributes),
                    self.config.clone(),
                    self.executor.clone(),
                )
            })
            .clone();
        if self.closed.load(Ordering::Acquire) {
            // close() ran while we were resolving attributes
            buffer.shutdown().await;
            return Err(Error::Closed);
        }
        buffer.receive(max_messages, wait).await
    }

    /// Requests the shared pool cannot serve: own overrides, a visibility
    /// timeout other than the configured one, or attributes outside the
    /// configured allow-lists.
    fn can_be_buffered(&self, request: &ReceiveMessageRequest) -> bool {
        if request.override_config.is_some() {
            return false;
        }
        if request.visibility_timeout.is_some()
            && request.visibility_timeout != self.config.visibility_timeout
        {
            return false;
        }
        fn allowed(names: &[String], allow: &[String]) -> bool {
            names.iter().all(|n| allow.contains(n))
        }
        allowed(
            &request.message_attribute_names,
            &self.config.receive_message_attribute_names,
        ) && allowed(
            &request.message_system_attribute_names,
            &self.config.receive_message_system_attribute_names,
        )
    }

    /// Shut every queue buffer down. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let buffers: Vec<ReceiveQueueBuffer> =
            self.buffers.iter().map(|e| e.value().clone()).collect();
        info!(queues = buffers.len(), "closing receive batch manager");
        for buffer in buffers {
            buffer.shutdown().await;
        }
    }

    pub fn snapshot(&self) -> HashMap<String, ReceiveBufferSnapshot> {
        self.buffers
            .iter()
            .map(|e| (e.key().clone(), e.value().snapshot()))
            .collect()
    }
}

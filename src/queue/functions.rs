//! Batch functions, key mappers and response mappers for queue operations.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use super::client::QueueClient;
use super::model::*;
use crate::batch::IdentifiableMessage;
use crate::error::{Error, ErrorContext};
use crate::Result;

/// Requests share a batch only with requests for the same queue and the same overrides.
pub fn queue_batch_key<R: QueueRequest>(request: &R) -> String {
    match request.override_config() {
        Some(o) => format!("{}#{}", request.queue_url(), o.fingerprint()),
        None => request.queue_url().to_string(),
    }
}

fn batch_target<R: QueueRequest>(
    entries: &[IdentifiableMessage<R>],
    batch_key: &str,
) -> Result<(String, Option<RequestOverride>)> {
    // Entries of one batch share queue and overrides, so the first one speaks for all.
    let first = entries.first().ok_or_else(|| {
        Error::internal_with_context(
            "empty batch",
            ErrorContext::new()
                .with_details(format!("batch key {}", batch_key))
                .with_source("queue_batch_function"),
        )
    })?;
    Ok((
        first.message.queue_url().to_string(),
        first.message.override_config().cloned(),
    ))
}

fn entry_error<T>(e: BatchResultErrorEntry) -> IdentifiableMessage<Result<T>> {
    IdentifiableMessage::new(
        e.id,
        Err(Error::Remote {
            code: e.code,
            message: e.message,
            sender_fault: e.sender_fault,
        }),
    )
}

pub fn send_message_batch_function(
    client: Arc<dyn QueueClient>,
) -> impl Fn(
    Vec<IdentifiableMessage<SendMessageRequest>>,
    String,
) -> BoxFuture<'static, Result<SendMessageBatchResponse>>
       + Send
       + Sync
       + 'static {
    move |entries: Vec<IdentifiableMessage<SendMessageRequest>>, batch_key: String| {
        let client = Arc::clone(&client);
        async move {
            let (queue_url, override_config) = batch_target(&entries, &batch_key)?;
            let entries = entries
                .into_iter()
                .map(|e| SendMessageBatchRequestEntry {
                    id: e.id,
                    message_body: e.message.message_body,
                    delay: e.message.delay,
                    message_attributes: e.message.message_attributes,
                    message_group_id: e.message.message_group_id,
                    message_deduplication_id: e.message.message_deduplication_id,
                })
                .collect();
            client
                .send_message_batch(SendMessageBatchRequest {
                    queue_url,
                    entries,
                    override_config,
                })
                .await
        }
        .boxed()
    }
}

pub fn send_message_response_mapper(
    response: SendMessageBatchResponse,
) -> Vec<IdentifiableMessage<Result<SendMessageResponse>>> {
    let mut mapped = Vec::with_capacity(response.successful.len() + response.failed.len());
    for ok in response.successful {
        mapped.push(IdentifiableMessage::new(
            ok.id,
            Ok(SendMessageResponse {
                message_id: ok.message_id,
                sequence_number: ok.sequence_number,
            }),
        ));
    }
    mapped.extend(response.failed.into_iter().map(entry_error));
    mapped
}

pub fn delete_message_batch_function(
    client: Arc<dyn QueueClient>,
) -> impl Fn(
    Vec<IdentifiableMessage<DeleteMessageRequest>>,
    String,
) -> BoxFuture<'static, Result<DeleteMessageBatchResponse>>
       + Send
       + Sync
       + 'static {
    move |entries: Vec<IdentifiableMessage<DeleteMessageRequest>>, batch_key: String| {
        let client = Arc::clone(&client);
        async move {
            let (queue_url, override_config) = batch_target(&entries, &batch_key)?;
            let entries = entries
                .into_iter()
                .map(|e| DeleteMessageBatchRequestEntry {
                    id: e.id,
                    receipt_handle: e.message.receipt_handle,
                })
                .collect();
            client
                .delete_message_batch(DeleteMessageBatchRequest {
                    queue_url,
                    entries,
                    override_config,
                })
                .await
        }
        .boxed()
    }
}

pub fn delete_message_response_mapper(
    response: DeleteMessageBatchResponse,
) -> Vec<IdentifiableMessage<Result<DeleteMessageResponse>>> {
    response
        .successful
        .into_iter()
        .map(|ok| IdentifiableMessage::new(ok.id, Ok(DeleteMessageResponse)))
        .chain(response.failed.into_iter().map(entry_error))
        .collect()
}

pub fn change_visibility_batch_function(
    client: Arc<dyn QueueClient>,
) -> impl Fn(
    Vec<IdentifiableMessage<ChangeMessageVisibilityRequest>>,
    String,
) -> BoxFuture<'static, Result<ChangeMessageVisibilityBatchResponse>>
       + Send
       + Sync
       + 'static {
    move |entries: Vec<IdentifiableMessage<ChangeMessageVisibilityRequest>>,
          batch_key: String| {
        let client = Arc::clone(&client);
        async move {
            let (queue_url, override_config) = batch_target(&entries, &batch_key)?;
            let entries = entries
                .into_iter()
                .map(|e| ChangeMessageVisibilityBatchRequestEntry {
                    id: e.id,
                    receipt_handle: e.message.receipt_handle,
                    visibility_timeout: e.message.visibility_timeout,
                })
                .collect();
            client
                .change_message_visibility_batch(ChangeMessageVisibilityBatchRequest {
                    queue_url,
                    entries,
                    override_config,
                })
                .await
        }
        .boxed()
    }
}

pub fn change_visibility_response_mapper(
    response: ChangeMessageVisibilityBatchResponse,
) -> Vec<IdentifiableMessage<Result<ChangeMessageVisibilityResponse>>> {
    response
        .successful
        .into_iter()
        .map(|ok| IdentifiableMessage::new(ok.id, Ok(ChangeMessageVisibilityResponse)))
        .chain(response.failed.into_iter().map(entry_error))
        .collect()
}

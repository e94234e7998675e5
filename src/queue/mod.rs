//! 消息队列集成模块：为发送、删除、修改可见性操作提供批处理函数，并为接收操作提供预取缓冲。
//!
//! # Queue Integration
//!
//! Wires the generic [`crate::batch`] runtime to a message-queue service.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`QueueBatchManager`] | Client-shaped facade over all queue managers |
//! | [`QueueClient`] | Async seam for the underlying wire calls |
//! | [`ReceiveBatchManager`] / [`ReceiveQueueBuffer`] | Per-queue receive prefetching |
//! | [`QueueAttributesManager`] | Single-flight cache of queue attributes |
//! | [`InMemoryQueueClient`] | Network-free queue service for tests and local runs (`in-memory` feature) |
//!
//! ## Batching rules
//!
//! - Outbound requests share a batch when they target the same queue with the
//!   same per-request override (see [`queue_batch_key`]).
//! - A queue batch holds at most [`MAX_QUEUE_BATCH_ENTRIES`] entries.
//! - Entries the service rejects individually fail with [`crate::Error::Remote`];
//!   the rest of their batch still succeeds.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sdk_batch_rust::queue::{
//!     InMemoryQueueClient, QueueAttributes, QueueBatchManager, SendMessageRequest,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> sdk_batch_rust::Result<()> {
//! let client = Arc::new(InMemoryQueueClient::new());
//! let url = client.create_queue("orders", QueueAttributes::default());
//! let manager = QueueBatchManager::builder()
//!     .with_client(client.clone())
//!     .with_scheduled_executor(tokio::runtime::Handle::current())
//!     .build()?;
//!
//! let sent = manager.send_message(SendMessageRequest::new(url.clone(), "hello")).await?;
//! assert!(!sent.message_id.is_empty());
//! manager.close().await;
//! # Ok(())
//! # }
//! ```

mod attributes;
mod client;
mod functions;
mod manager;
#[cfg(feature = "in-memory")]
mod memory;
mod model;
mod receive;
mod receive_manager;

pub use attributes::QueueAttributesManager;
pub use client::QueueClient;
pub use functions::{
    change_visibility_batch_function, change_visibility_response_mapper,
    delete_message_batch_function, delete_message_response_mapper, queue_batch_key,
    send_message_batch_function, send_message_response_mapper,
};
pub use manager::{QueueBatchManager, QueueBatchManagerBuilder, QueueBatchSnapshot};
#[cfg(feature = "in-memory")]
pub use memory::{CallCounts, InMemoryQueueClient, QueueOperation};
pub use model::*;
pub use receive::{ReceiveBufferSnapshot, ReceiveQueueBuffer, MAX_QUEUE_BATCH_ENTRIES};
pub use receive_manager::ReceiveBatchManager;

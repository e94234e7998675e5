//! 请求批处理模块：按批次键缓冲单个请求，按数量或时间窗口触发批量发送，并将结果逐条分发回调用方。
//!
//! # Request Batching Module
//!
//! This module turns many independently issued, fine-grained operations into
//! fewer, larger wire calls while still giving every caller its own result.
//!
//! ## Overview
//!
//! A request travels through these stages:
//!
//! 1. the batch key mapper picks the buffer (`queue_url`, tenant, ...)
//! 2. [`BatchBuffer::put`] appends it in FIFO order, or rejects it when full
//! 3. a size trigger (inline) or a time trigger (timer) takes the oldest entries
//! 4. the batch function performs one wire call for the taken entries
//! 5. the response mapper splits the reply back into per-entry results
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchManager`] | Orchestrates buffers, timers and demultiplexing |
//! | [`BatchBuffer`] | Per-key bounded FIFO with its own flush-scheduling state |
//! | [`PendingResponse`] | Caller-side future resolving with one entry's result |
//! | [`BatchAndSend`], [`BatchResponseMapper`], [`BatchKeyMapper`] | Injected collaborators |
//! | [`BatchMode`] | Selects the request or response configuration profile |
//!
//! ## Example
//!
//! ```rust
//! use futures::FutureExt;
//! use sdk_batch_rust::batch::{BatchManager, BatchMode, IdentifiableMessage};
//!
//! # #[tokio::main]
//! # async fn main() -> sdk_batch_rust::Result<()> {
//! let manager =
//!     BatchManager::<String, usize, Vec<IdentifiableMessage<String>>>::builder()
//!         .with_batch_function(|entries, _key| {
//!             async move { Ok::<_, sdk_batch_rust::Error>(entries) }.boxed()
//!         })
//!         .with_response_mapper(|entries: Vec<IdentifiableMessage<String>>| {
//!             entries
//!                 .into_iter()
//!                 .map(|e| IdentifiableMessage::new(e.id, Ok(e.message.len())))
//!                 .collect()
//!         })
//!         .with_batch_key_mapper(|_req: &String| "default".to_string())
//!         .with_scheduled_executor(tokio::runtime::Handle::current())
//!         .with_mode(BatchMode::Request)
//!         .build()?;
//!
//! let len = manager.submit("hello".to_string()).await?;
//! assert_eq!(len, 5);
//! manager.close();
//! # Ok(())
//! # }
//! ```

mod buffer;
mod context;
mod functions;
mod manager;

pub use buffer::{BatchBuffer, FlushToken};
pub use context::{
    BatchingExecutionContext, EntryId, IdentifiableMessage, PendingResponse, ResponseHandle,
};
pub use functions::{BatchAndSend, BatchKeyMapper, BatchMode, BatchResponseMapper};
pub use manager::{BatchManager, BatchManagerBuilder, BatchManagerSnapshot, FlushSettings};

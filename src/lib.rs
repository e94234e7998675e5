//! # sdk-batch-rust
//!
//! 这是 SDK 客户端自动请求批处理运行时：将大量细粒度调用聚合为更少、更大的批量请求，并逐条返回结果。
//!
//! Automatic request batching runtime for cloud-service SDKs. Many independently
//! issued operations ("send one message", "delete one message") are buffered per
//! batch key and flushed as fewer, larger wire calls, while every caller still
//! receives its own result.
//!
//! ## Core Philosophy
//!
//! - **Per-item results**: one caller, one future, one result, even inside a partially failed batch
//! - **Bounded**: per-key buffer capacity and a cap on distinct keys fail fast instead of growing
//! - **Exactly once**: a buffered entry is sent in exactly one batch, whichever trigger wins
//! - **Pluggable**: batch, response-mapping and key-mapping functions are injected
//!
//! ## Key Features
//!
//! - **Outbound batching**: [`batch::BatchManager`] with size and time triggers
//! - **Receive prefetching**: [`queue::ReceiveBatchManager`] keeps a pool of received messages
//! - **Dynamic attributes**: [`attributes::AttributesResolver`] single-flight lookup cache
//! - **Queue integration**: [`queue::QueueBatchManager`] facade over a [`queue::QueueClient`]
//! - **Configuration**: [`config::BatchOverrideConfiguration`] from code, env, YAML or JSON
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sdk_batch_rust::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> sdk_batch_rust::Result<()> {
//!     let client = Arc::new(InMemoryQueueClient::new());
//!     let url = client.create_queue("jobs", QueueAttributes::default());
//!
//!     let manager = QueueBatchManager::builder()
//!         .with_client(client)
//!         .with_scheduled_executor(tokio::runtime::Handle::current())
//!         .with_override_configuration(BatchOverrideConfiguration::from_env()?)
//!         .build()?;
//!
//!     let pending: Vec<_> = (0..25)
//!         .map(|i| manager.send_message(SendMessageRequest::new(url.clone(), format!("job-{i}"))))
//!         .collect();
//!     for sent in futures::future::join_all(pending).await {
//!         println!("sent {}", sent?.message_id);
//!     }
//!
//!     manager.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`batch`] | Batch buffers, manager, pending responses |
//! | [`attributes`] | Single-flight dynamic attribute resolution |
//! | [`config`] | Override configuration and resolved defaults |
//! | [`queue`] | Queue models, client seam, receive prefetching, in-memory service |
//! | [`error`] / [`error_code`] | Error taxonomy and stable error codes |

pub mod attributes;
pub mod batch;
pub mod config;
pub mod error_code;
pub mod prelude;
pub mod queue;

// Re-export main types for convenience
pub use batch::{BatchManager, BatchManagerBuilder, BatchMode, PendingResponse};
pub use config::BatchOverrideConfiguration;
pub use queue::{QueueBatchManager, QueueClient};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

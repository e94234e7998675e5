//! Minimal prelude for application code.
//!
//! Goal: reduce import noise without hiding important concepts.

pub use crate::batch::{BatchManager, BatchMode, IdentifiableMessage, PendingResponse};
pub use crate::config::BatchOverrideConfiguration;
pub use crate::queue::{
    ChangeMessageVisibilityRequest, DeleteMessageRequest, QueueAttributes, QueueBatchManager,
    QueueClient, ReceiveMessageRequest, SendMessageRequest,
};
#[cfg(feature = "in-memory")]
pub use crate::queue::InMemoryQueueClient;
pub use crate::{Error, Result};

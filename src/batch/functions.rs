//! Pluggable collaborators of a batch manager.

use std::sync::Arc;

use futures::future::BoxFuture;

use super::context::IdentifiableMessage;
use crate::Result;

/// Sends one batch: the ordered identified requests and their shared batch key.
pub type BatchAndSend<Req, B> =
    Arc<dyn Fn(Vec<IdentifiableMessage<Req>>, String) -> BoxFuture<'static, Result<B>> + Send + Sync>;

/// Splits a batch response into per-entry results keyed by entry id.
pub type BatchResponseMapper<B, Resp> =
    Arc<dyn Fn(B) -> Vec<IdentifiableMessage<Result<Resp>>> + Send + Sync>;

/// Routes a request to its batch; requests with equal keys may share a wire call.
pub type BatchKeyMapper<Req> = Arc<dyn Fn(&Req) -> String + Send + Sync>;

/// Which configuration profile a generic manager runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchMode {
    /// Outbound operations (send, delete, change visibility).
    Request,
    /// Receive-style demands, held at most the minimum receive wait.
    Response,
}

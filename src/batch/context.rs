//! Buffered entries and their pending result handles.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{Error, ErrorContext};
use crate::Result;

/// Per-buffer entry identifier, rendered as a decimal string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse::<u64>().map(EntryId)
    }
}

/// A payload tagged with the batch entry id it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifiableMessage<T> {
    pub id: String,
    pub message: T,
}

impl<T> IdentifiableMessage<T> {
    pub fn new(id: impl Into<String>, message: T) -> Self {
        Self {
            id: id.into(),
            message,
        }
    }
}

/// Write side of a caller's pending result. Completes at most once.
pub struct ResponseHandle<T> {
    sender: Arc<Mutex<Option<oneshot::Sender<Result<T>>>>>,
}

impl<T> Clone for ResponseHandle<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T> fmt::Debug for ResponseHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl<T> ResponseHandle<T> {
    /// A connected handle/future pair.
    pub fn channel() -> (Self, PendingResponse<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            PendingResponse::waiting(rx),
        )
    }

    /// Deliver a result. Returns `false` if already completed; a caller that
    /// dropped its future counts as delivered.
    pub fn complete(&self, result: Result<T>) -> bool {
        match self.sender.lock().take() {
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    pub fn fail(&self, error: Error) -> bool {
        self.complete(Err(error))
    }

    pub fn is_completed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// One caller request together with the handle that resolves it.
#[derive(Debug)]
pub struct BatchingExecutionContext<Req, Resp> {
    pub request: Req,
    pub response: ResponseHandle<Resp>,
}

impl<Req, Resp> BatchingExecutionContext<Req, Resp> {
    pub fn new(request: Req, response: ResponseHandle<Resp>) -> Self {
        Self { request, response }
    }
}

enum PendingState<T> {
    Waiting(oneshot::Receiver<Result<T>>),
    Failed(Option<Error>),
}

/// Future returned to a caller; resolves with that caller's own result.
///
/// Dropping it does not withdraw the request: the entry is still flushed and
/// its result is discarded.
pub struct PendingResponse<T> {
    state: PendingState<T>,
}

impl<T> PendingResponse<T> {
    fn waiting(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            state: PendingState::Waiting(rx),
        }
    }

    /// A future that is already failed (used for synchronous rejections).
    pub fn failed(error: Error) -> Self {
        Self {
            state: PendingState::Failed(Some(error)),
        }
    }
}

impl<T> fmt::Debug for PendingResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            PendingState::Waiting(_) => "waiting",
            PendingState::Failed(_) => "failed",
        };
        f.debug_struct("PendingResponse").field("state", &state).finish()
    }
}

impl<T> Future for PendingResponse<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Neither state holds self-references.
        let this = self.get_mut();
        match &mut this.state {
            PendingState::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(_)) => Poll::Ready(Err(Error::internal_with_context(
                    "response handle dropped without a result",
                    ErrorContext::new().with_source("pending_response"),
                ))),
                Poll::Pending => Poll::Pending,
            },
            PendingState::Failed(err) => Poll::Ready(Err(err.take().unwrap_or(Error::Closed))),
        }
    }
}

impl<T> Unpin for PendingResponse<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn entry_id_round_trips_through_text() {
        let id = EntryId(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!("42".parse::<EntryId>().unwrap(), id);
        assert!("x".parse::<EntryId>().is_err());
    }

    #[test]
    fn handle_completes_once() {
        let (handle, pending) = ResponseHandle::<u32>::channel();
        let mut fut = task::spawn(pending);
        assert_pending!(fut.poll());

        assert!(handle.complete(Ok(7)));
        assert!(!handle.fail(Error::Closed));
        assert!(handle.is_completed());
        assert!(fut.is_woken());
        assert_eq!(assert_ready!(fut.poll()).unwrap(), 7);
    }

    #[test]
    fn dropped_future_still_counts_as_delivered() {
        let (handle, pending) = ResponseHandle::<u32>::channel();
        drop(pending);
        assert!(handle.complete(Ok(1)));
    }

    #[tokio::test]
    async fn dropped_handle_surfaces_internal_error() {
        let (handle, pending) = ResponseHandle::<u32>::channel();
        drop(handle);
        assert!(matches!(pending.await, Err(Error::Internal { .. })));
    }

    #[tokio::test]
    async fn failed_future_resolves_immediately() {
        let pending = PendingResponse::<()>::failed(Error::TooManyBatchKeys { max_batch_keys: 1 });
        assert!(matches!(
            pending.await,
            Err(Error::TooManyBatchKeys { max_batch_keys: 1 })
        ));
    }
}

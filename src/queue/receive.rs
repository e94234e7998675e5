//! Receive queue buffer: prefetches receive batches for one queue and hands
//! them to waiting callers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::attributes::QueueAttributesManager;
use super::client::QueueClient;
use super::model::{
    ChangeMessageVisibilityBatchRequest, ChangeMessageVisibilityBatchRequestEntry, Message,
    ReceiveMessageRequest, ReceiveMessageResponse,
};
use crate::config::ResponseBatchConfiguration;
use crate::error::Error;
use crate::Result;

/// Largest number of entries a queue batch call accepts.
pub const MAX_QUEUE_BATCH_ENTRIES: usize = 10;

struct Waiter {
    requested: usize,
    tx: oneshot::Sender<Result<Vec<Message>>>,
}

struct FinishedBatch {
    messages: VecDeque<Message>,
    error: Option<Error>,
    expires_at: Option<Instant>,
}

impl FinishedBatch {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }

    fn is_spent(&self) -> bool {
        self.error.is_none() && self.messages.is_empty()
    }
}

#[derive(Default)]
struct State {
    waiters: VecDeque<Waiter>,
    finished: VecDeque<FinishedBatch>,
    inflight: usize,
    shutdown: bool,
}

/// Facts about one queue's receive buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveBufferSnapshot {
    pub waiting_callers: usize,
    pub finished_batches: usize,
    pub buffered_messages: usize,
    pub inflight_receives: usize,
    pub shutdown: bool,
}

struct Shared {
    queue_url: String,
    client: Arc<dyn QueueClient>,
    attributes: Arc<QueueAttributesManager>,
    config: ResponseBatchConfiguration,
    executor: Handle,
    state: Mutex<State>,
}

/// Keeps a pool of finished receive batches for one queue, refilled by
/// background long-poll receive calls, and serves callers FIFO from it.
#[derive(Clone)]
pub struct ReceiveQueueBuffer {
    shared: Arc<Shared>,
}

impl ReceiveQueueBuffer {
    pub fn new(
        queue_url: impl Into<String>,
        client: Arc<dyn QueueClient>,
        attributes: Arc<QueueAttributesManager>,
        config: ResponseBatchConfiguration,
        executor: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue_url: queue_url.into(),
                client,
                attributes,
                config,
                executor,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn queue_url(&self) -> &str {
        &self.shared.queue_url
    }

    /// Wait up to `wait` for at most `max_messages` messages.
    ///
    /// An elapsed wait yields an empty response rather than an error.
    pub async fn receive(&self, max_messages: usize, wait: Duration) -> Result<ReceiveMessageResponse> {
        let (tx, rx) = oneshot::channel();
        {
            let mut st = self.shared.state.lock();
            if st.shutdown {
                return Err(Error::Closed);
            }
            st.waiters.push_back(Waiter {
                requested: max_messages.clamp(1, self.shared.config.max_batch_items.max(1)),
                tx,
            });
        }
        Shared::pump(&self.shared);

        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(result)) => result.map(|messages| ReceiveMessageResponse { messages }),
            Ok(Err(_)) => Err(Error::Closed),
            Err(_elapsed) => {
                // Our waiter is pruned on the next pump; anything sent meanwhile is returned to the pool.
                Shared::pump(&self.shared);
                Ok(ReceiveMessageResponse::default())
            }
        }
    }

    /// Fail waiting callers with [`Error::Closed`] and release unpicked
    /// messages back to the queue. Idempotent.
    pub async fn shutdown(&self) {
        let (waiters, messages) = {
            let mut st = self.shared.state.lock();
            if st.shutdown {
                return;
            }
            st.shutdown = true;
            let now = Instant::now();
            let waiters: Vec<Waiter> = st.waiters.drain(..).collect();
            let messages: Vec<Message> = st
                .finished
                .drain(..)
                .filter(|b| !b.is_expired(now))
                .flat_map(|b| b.messages)
                .collect();
            (waiters, messages)
        };
        debug!(
            queue_url = %self.shared.queue_url,
            waiters = waiters.len(),
            unpicked = messages.len(),
            "shutting down receive buffer"
        );
        for waiter in waiters {
            let _ = waiter.tx.send(Err(Error::Closed));
        }
        self.shared.release(messages).await;
    }

    pub fn snapshot(&self) -> ReceiveBufferSnapshot {
        let st = self.shared.state.lock();
        ReceiveBufferSnapshot {
            waiting_callers: st.waiters.iter().filter(|w| !w.tx.is_closed()).count(),
            finished_batches: st.finished.len(),
            buffered_messages: st.finished.iter().map(|b| b.messages.len()).sum(),
            inflight_receives: st.inflight,
            shutdown: st.shutdown,
        }
    }
}

impl Shared {
    /// Serve waiters from finished batches, then start receive calls if the pool needs refilling.
    fn pump(this: &Arc<Self>) {
        let to_spawn = {
            let mut st = this.state.lock();
            this.satisfy_waiters(&mut st);
            let n = this.receives_to_start(&st);
            st.inflight += n;
            n
        };
        for _ in 0..to_spawn {
            this.executor.spawn(Self::receive_batch(Arc::clone(this)));
        }
    }

    fn satisfy_waiters(&self, st: &mut State) {
        let now = Instant::now();
        st.finished.retain(|b| !b.is_expired(now) && !b.is_spent());

        while let Some(waiter) = st.waiters.pop_front() {
            if waiter.tx.is_closed() {
                continue;
            }
            let Some(batch) = st.finished.front_mut() else {
                st.waiters.push_front(waiter);
                break;
            };

            if let Some(err) = batch.error.take() {
                st.finished.pop_front();
                if let Err(Err(err)) = waiter.tx.send(Err(err)) {
                    // Caller left; the failure goes to the next one.
                    st.finished.push_front(FinishedBatch {
                        messages: VecDeque::new(),
                        error: Some(err),
                        expires_at: None,
                    });
                }
                continue;
            }

            let expires_at = batch.expires_at;
            let n = waiter.requested.min(batch.messages.len());
            let picked: Vec<Message> = batch.messages.drain(..n).collect();
            if batch.messages.is_empty() {
                st.finished.pop_front();
            }
            if let Err(Ok(returned)) = waiter.tx.send(Ok(picked)) {
                warn!(
                    queue_url = %self.queue_url,
                    messages = returned.len(),
                    "receiver left before delivery; returning messages to the pool"
                );
                match st.finished.front_mut() {
                    Some(front) if front.error.is_none() && front.expires_at == expires_at => {
                        for m in returned.into_iter().rev() {
                            front.messages.push_front(m);
                        }
                    }
                    _ => st.finished.push_front(FinishedBatch {
                        messages: returned.into(),
                        error: None,
                        expires_at,
                    }),
                }
            }
        }
    }

    fn desired_batches(&self, st: &State) -> usize {
        let desired = self.config.max_done_receive_batches.max(1);
        if !self.config.adaptive_prefetching {
            return desired;
        }
        let requested = st
            .waiters
            .iter()
            .filter(|w| !w.tx.is_closed())
            .fold(0usize, |sum, w| sum.saturating_add(w.requested));
        let per_batch = self.config.max_batch_items.max(1);
        desired.min(requested.div_ceil(per_batch))
    }

    fn receives_to_start(&self, st: &State) -> usize {
        if st.shutdown {
            return 0;
        }
        // Finished plus in-flight batches never exceed the done-batch limit.
        let desired = self.desired_batches(st);
        let room = desired.saturating_sub(st.finished.len() + st.inflight);
        let max_inflight = desired.min(self.config.max_inflight_receive_batches);
        room.min(max_inflight.saturating_sub(st.inflight))
    }

    fn receive_batch(this: Arc<Self>) -> BoxFuture<'static, ()> {
        async move {
            let outcome = this.fetch().await;
            let released = {
                let mut st = this.state.lock();
                st.inflight = st.inflight.saturating_sub(1);
                match outcome {
                    Ok(batch) if st.shutdown => batch.messages.into_iter().collect(),
                    Ok(batch) => {
                        if !batch.messages.is_empty() {
                            st.finished.push_back(batch);
                        }
                        Vec::new()
                    }
                    Err(_) if st.shutdown => Vec::new(),
                    Err(err) => {
                        warn!(queue_url = %this.queue_url, error = %err, "receive call failed");
                        st.finished.push_back(FinishedBatch {
                            messages: VecDeque::new(),
                            error: Some(err),
                            expires_at: None,
                        });
                        Vec::new()
                    }
                }
            };
            if released.is_empty() {
                Self::pump(&this);
            } else {
                this.release(released).await;
            }
        }
        .boxed()
    }

    async fn fetch(&self) -> Result<FinishedBatch> {
        let visibility = match self.config.visibility_timeout {
            Some(v) => v,
            None => self.attributes.visibility_timeout(&self.queue_url).await?,
        };
        let request = ReceiveMessageRequest {
            queue_url: self.queue_url.clone(),
            max_number_of_messages: Some(self.config.max_batch_items),
            wait_time: Some(self.config.long_poll_wait_timeout),
            visibility_timeout: Some(visibility),
            message_attribute_names: self.config.receive_message_attribute_names.clone(),
            message_system_attribute_names: self
                .config
                .receive_message_system_attribute_names
                .clone(),
            override_config: None,
        };
        let issued_at = Instant::now();
        let response = self.client.receive_message(request).await?;
        Ok(FinishedBatch {
            messages: response.messages.into(),
            error: None,
            expires_at: Some(issued_at + visibility),
        })
    }

    /// Make messages visible again right away. Failures are logged, not surfaced.
    async fn release(&self, messages: Vec<Message>) {
        for chunk in messages.chunks(MAX_QUEUE_BATCH_ENTRIES) {
            let entries = chunk
                .iter()
                .enumerate()
                .map(|(i, m)| ChangeMessageVisibilityBatchRequestEntry {
                    id: i.to_string(),
                    receipt_handle: m.receipt_handle.clone(),
                    visibility_timeout: Duration::ZERO,
                })
                .collect();
            let request = ChangeMessageVisibilityBatchRequest {
                queue_url: self.queue_url.clone(),
                entries,
                override_config: None,
            };
            match self.client.change_message_visibility_batch(request).await {
                Ok(response) if response.failed.is_empty() => {}
                Ok(response) => error!(
                    queue_url = %self.queue_url,
                    failed = response.failed.len(),
                    "could not change visibility for queue {}", self.queue_url
                ),
                Err(err) => error!(
                    queue_url = %self.queue_url,
                    error = %err,
                    "could not change visibility for queue {}", self.queue_url
                ),
            }
        }
    }
}

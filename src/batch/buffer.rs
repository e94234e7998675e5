//! Per-key batch buffer.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tokio::task::AbortHandle;

use super::context::{BatchingExecutionContext, EntryId, ResponseHandle};
use crate::error::Error;
use crate::Result;

/// Identifies one scheduled flush of one buffer.
///
/// A timer only flushes if its token is still the buffer's current one, so a
/// replaced or cancelled timer that wakes up late finds nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushToken(u64);

struct ScheduledFlush {
    token: FlushToken,
    handle: AbortHandle,
}

struct BufferState<Req, Resp> {
    entries: BTreeMap<EntryId, BatchingExecutionContext<Req, Resp>>,
    next_id: u64,
    next_token: u64,
    scheduled: Option<ScheduledFlush>,
}

impl<Req, Resp> BufferState<Req, Resp> {
    fn cancel_scheduled(&mut self) {
        if let Some(s) = self.scheduled.take() {
            s.handle.abort();
        }
    }

    fn take_oldest(&mut self, n: usize) -> BTreeMap<EntryId, BatchingExecutionContext<Req, Resp>> {
        if n >= self.entries.len() {
            return std::mem::take(&mut self.entries);
        }
        let split_at = match self.entries.keys().nth(n) {
            Some(id) => *id,
            None => return std::mem::take(&mut self.entries),
        };
        let rest = self.entries.split_off(&split_at);
        std::mem::replace(&mut self.entries, rest)
    }

    fn install(&mut self, spawn: impl FnOnce(FlushToken) -> AbortHandle) -> FlushToken {
        let token = FlushToken(self.next_token);
        self.next_token += 1;
        let handle = spawn(token);
        self.cancel_scheduled();
        self.scheduled = Some(ScheduledFlush { token, handle });
        token
    }
}

/// Size-bounded FIFO of pending entries for one batch key, plus that key's
/// flush-scheduling state. All operations are atomic with respect to each other.
pub struct BatchBuffer<Req, Resp> {
    batch_key: String,
    max_buffer_size: usize,
    state: Mutex<BufferState<Req, Resp>>,
}

impl<Req, Resp> BatchBuffer<Req, Resp> {
    pub fn new(batch_key: impl Into<String>, max_buffer_size: usize) -> Self {
        Self {
            batch_key: batch_key.into(),
            max_buffer_size,
            state: Mutex::new(BufferState {
                entries: BTreeMap::new(),
                next_id: 0,
                next_token: 0,
                scheduled: None,
            }),
        }
    }

    pub fn batch_key(&self) -> &str {
        &self.batch_key
    }

    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    /// Append an entry. Fails without touching the buffer when it is full.
    pub fn put(&self, request: Req, response: ResponseHandle<Resp>) -> Result<EntryId> {
        let mut st = self.state.lock();
        if st.entries.len() >= self.max_buffer_size {
            return Err(Error::BufferFull {
                batch_key: self.batch_key.clone(),
                max_buffer_size: self.max_buffer_size,
            });
        }
        let id = EntryId(st.next_id);
        st.next_id += 1;
        st.entries
            .insert(id, BatchingExecutionContext::new(request, response));
        Ok(id)
    }

    /// Size trigger: exactly the `max_batch_items` oldest entries, or nothing.
    ///
    /// Emptying the buffer cancels its scheduled flush in the same critical section.
    pub fn flushable_requests(
        &self,
        max_batch_items: usize,
    ) -> BTreeMap<EntryId, BatchingExecutionContext<Req, Resp>> {
        let mut st = self.state.lock();
        if max_batch_items == 0 || st.entries.len() < max_batch_items {
            return BTreeMap::new();
        }
        let taken = st.take_oldest(max_batch_items);
        if st.entries.is_empty() {
            st.cancel_scheduled();
        }
        taken
    }

    /// Timer trigger: up to `max_batch_items` oldest entries, only for the current token.
    pub fn flushable_scheduled_requests(
        &self,
        token: FlushToken,
        max_batch_items: usize,
    ) -> BTreeMap<EntryId, BatchingExecutionContext<Req, Resp>> {
        let mut st = self.state.lock();
        match &st.scheduled {
            Some(s) if s.token == token => {}
            _ => return BTreeMap::new(),
        }
        // The firing timer is the task calling us; drop its handle without aborting.
        st.scheduled = None;
        st.take_oldest(max_batch_items)
    }

    /// Install a scheduled flush, aborting any previous one.
    pub fn put_scheduled_flush(&self, spawn: impl FnOnce(FlushToken) -> AbortHandle) -> FlushToken {
        self.state.lock().install(spawn)
    }

    /// Install a scheduled flush only when entries are waiting and none is scheduled.
    pub fn schedule_flush_if_idle(
        &self,
        spawn: impl FnOnce(FlushToken) -> AbortHandle,
    ) -> Option<FlushToken> {
        let mut st = self.state.lock();
        if st.entries.is_empty() || st.scheduled.is_some() {
            return None;
        }
        Some(st.install(spawn))
    }

    pub fn cancel_scheduled_flush(&self) {
        self.state.lock().cancel_scheduled();
    }

    pub fn has_scheduled_flush(&self) -> bool {
        self.state.lock().scheduled.is_some()
    }

    /// Handles of every entry still buffered, oldest first.
    pub fn responses(&self) -> Vec<ResponseHandle<Resp>> {
        self.state
            .lock()
            .entries
            .values()
            .map(|ctx| ctx.response.clone())
            .collect()
    }

    /// Drop every entry without resolving it.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

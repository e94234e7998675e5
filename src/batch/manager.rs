//! Batch manager: routes single requests into per-key buffers and flushes them.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use super::buffer::{BatchBuffer, FlushToken};
use super::context::{
    BatchingExecutionContext, EntryId, IdentifiableMessage, PendingResponse, ResponseHandle,
};
use super::functions::{BatchAndSend, BatchKeyMapper, BatchMode, BatchResponseMapper};
use crate::config::{
    BatchOverrideConfiguration, RequestBatchConfiguration, ResponseBatchConfiguration,
};
use crate::error::{Error, ErrorContext};
use crate::Result;

/// Flush tunables a manager runs with once its mode and overrides are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushSettings {
    pub max_batch_items: usize,
    pub max_batch_keys: usize,
    pub max_buffer_size: usize,
    pub max_batch_open: Duration,
}

impl FlushSettings {
    pub fn resolve(mode: BatchMode, overrides: Option<&BatchOverrideConfiguration>) -> Self {
        let request = RequestBatchConfiguration::from_override(overrides);
        match mode {
            BatchMode::Request => Self {
                max_batch_items: request.max_batch_items,
                max_batch_keys: request.max_batch_keys,
                max_buffer_size: request.max_buffer_size,
                max_batch_open: request.max_batch_open,
            },
            BatchMode::Response => {
                let response = ResponseBatchConfiguration::from_override(overrides);
                Self {
                    max_batch_items: response.max_batch_items,
                    max_batch_keys: request.max_batch_keys,
                    max_buffer_size: request.max_buffer_size,
                    max_batch_open: response.min_receive_wait_time,
                }
            }
        }
    }
}

/// Facts about a manager at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchManagerSnapshot {
    pub batch_keys: usize,
    pub pending_entries: usize,
    pub scheduled_flushes: usize,
    pub closed: bool,
}

type Buffer<Req, Resp> = Arc<BatchBuffer<Req, Resp>>;

struct Inner<Req, Resp, B> {
    settings: FlushSettings,
    mode: BatchMode,
    buffers: DashMap<String, Buffer<Req, Resp>>,
    key_count: AtomicUsize,
    closed: AtomicBool,
    batch_function: BatchAndSend<Req, B>,
    response_mapper: BatchResponseMapper<B, Resp>,
    batch_key_mapper: BatchKeyMapper<Req>,
    executor: Handle,
}

/// Accepts one request at a time and resolves it from a batched wire call.
///
/// A buffer flushes when it holds `max_batch_items` entries (inline, from the
/// submitting thread) or when `max_batch_open` has elapsed since its oldest
/// unflushed entry arrived (from a timer on the scheduled executor).
///
/// Cloning is cheap; clones share the same buffers.
pub struct BatchManager<Req, Resp, B> {
    inner: Arc<Inner<Req, Resp, B>>,
}

impl<Req, Resp, B> Clone for BatchManager<Req, Resp, B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Req, Resp, B> std::fmt::Debug for BatchManager<Req, Resp, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchManager")
            .field("mode", &self.inner.mode)
            .field("settings", &self.inner.settings)
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl<Req, Resp, B> BatchManager<Req, Resp, B>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    B: Send + 'static,
{
    pub fn builder() -> BatchManagerBuilder<Req, Resp, B> {
        BatchManagerBuilder::default()
    }

    /// Submit a request; capacity and shutdown errors surface on the returned future.
    pub fn submit(&self, request: Req) -> PendingResponse<Resp> {
        self.try_submit(request)
            .unwrap_or_else(PendingResponse::failed)
    }

    /// Submit a request; capacity and shutdown errors are returned synchronously.
    ///
    /// Never blocks on I/O. When this call completes a batch, the batch function
    /// is invoked before returning and awaited on the scheduled executor.
    pub fn try_submit(&self, request: Req) -> Result<PendingResponse<Resp>> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let batch_key = (inner.batch_key_mapper)(&request);
        let buffer = inner.buffer_for(&batch_key)?;
        let (handle, pending) = ResponseHandle::channel();
        buffer.put(request, handle.clone())?;

        if inner.closed.load(Ordering::Acquire) {
            // close() may have drained this buffer before our entry landed
            handle.fail(Error::Closed);
            return Ok(pending);
        }

        Inner::flush_full_batches(inner, &buffer);
        Inner::schedule(inner, &buffer);
        Ok(pending)
    }

    /// Stop accepting requests and fail everything still buffered with [`Error::Closed`].
    ///
    /// Batches already handed to the batch function complete normally. Idempotent.
    pub fn close(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let buffers: Vec<Buffer<Req, Resp>> = inner
            .buffers
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        let mut failed = 0usize;
        for buffer in &buffers {
            buffer.cancel_scheduled_flush();
            for handle in buffer.responses() {
                if handle.fail(Error::Closed) {
                    failed += 1;
                }
            }
            buffer.clear();
        }
        inner.buffers.clear();
        inner.key_count.store(0, Ordering::Release);
        info!(
            mode = ?inner.mode,
            batch_keys = buffers.len(),
            failed_entries = failed,
            "batch manager closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> &FlushSettings {
        &self.inner.settings
    }

    pub fn mode(&self) -> BatchMode {
        self.inner.mode
    }

    pub fn snapshot(&self) -> BatchManagerSnapshot {
        let mut snap = BatchManagerSnapshot {
            closed: self.is_closed(),
            ..Default::default()
        };
        for entry in self.inner.buffers.iter() {
            snap.batch_keys += 1;
            snap.pending_entries += entry.value().len();
            if entry.value().has_scheduled_flush() {
                snap.scheduled_flushes += 1;
            }
        }
        snap
    }
}

impl<Req, Resp, B> Inner<Req, Resp, B>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    B: Send + 'static,
{
    fn buffer_for(&self, batch_key: &str) -> Result<Buffer<Req, Resp>> {
        if let Some(existing) = self.buffers.get(batch_key) {
            return Ok(Arc::clone(existing.value()));
        }
        match self.buffers.entry(batch_key.to_string()) {
            Entry::Occupied(e) => Ok(Arc::clone(e.get())),
            Entry::Vacant(v) => {
                let max = self.settings.max_batch_keys;
                self.key_count
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < max).then_some(n + 1)
                    })
                    .map_err(|_| Error::TooManyBatchKeys {
                        max_batch_keys: max,
                    })?;
                let buffer = Arc::new(BatchBuffer::new(batch_key, self.settings.max_buffer_size));
                v.insert(Arc::clone(&buffer));
                Ok(buffer)
            }
        }
    }

    fn flush_full_batches(self: &Arc<Self>, buffer: &Buffer<Req, Resp>) {
        loop {
            let batch = buffer.flushable_requests(self.settings.max_batch_items);
            if batch.is_empty() {
                break;
            }
            self.dispatch(buffer.batch_key(), batch);
        }
    }

    fn schedule(self: &Arc<Self>, buffer: &Buffer<Req, Resp>) {
        buffer.schedule_flush_if_idle(|token| {
            let inner = Arc::clone(self);
            let target = Arc::clone(buffer);
            self.executor
                .spawn(async move { inner.run_scheduled_flush(target, token).await })
                .abort_handle()
        });
    }

    async fn run_scheduled_flush(self: Arc<Self>, buffer: Buffer<Req, Resp>, token: FlushToken) {
        tokio::time::sleep(self.settings.max_batch_open).await;
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let batch = buffer.flushable_scheduled_requests(token, self.settings.max_batch_items);
        if batch.is_empty() {
            return;
        }
        debug!(
            batch_key = buffer.batch_key(),
            batch_size = batch.len(),
            "batch window elapsed"
        );
        self.dispatch(buffer.batch_key(), batch);
        Self::schedule(&self, &buffer);
    }

    fn dispatch(
        self: &Arc<Self>,
        batch_key: &str,
        batch: BTreeMap<EntryId, BatchingExecutionContext<Req, Resp>>,
    ) {
        let mut requests = Vec::with_capacity(batch.len());
        let mut handles = HashMap::with_capacity(batch.len());
        for (id, ctx) in batch {
            let id = id.to_string();
            requests.push(IdentifiableMessage::new(id.clone(), ctx.request));
            handles.insert(id, ctx.response);
        }
        debug!(batch_key, batch_size = requests.len(), "dispatching batch");

        let sent: BoxFuture<'static, Result<B>> =
            (self.batch_function)(requests, batch_key.to_string());
        let mapper = Arc::clone(&self.response_mapper);
        let batch_key = batch_key.to_string();
        self.executor.spawn(async move {
            match sent.await {
                Ok(response) => demultiplex(&batch_key, mapper(response), handles),
                Err(cause) => {
                    warn!(batch_key = %batch_key, error = %cause, "batch call failed");
                    let err = Error::batch_failed(batch_key, cause);
                    for handle in handles.values() {
                        handle.fail(err.clone());
                    }
                }
            }
        });
    }
}

fn demultiplex<Resp>(
    batch_key: &str,
    results: Vec<IdentifiableMessage<Result<Resp>>>,
    mut handles: HashMap<String, ResponseHandle<Resp>>,
) {
    for result in results {
        match handles.remove(&result.id) {
            Some(handle) => {
                handle.complete(result.message);
            }
            None => warn!(batch_key, entry_id = %result.id, "response for unknown entry id"),
        }
    }
    for (id, handle) in handles {
        error!(batch_key, entry_id = %id, "batch response has no result for entry");
        handle.fail(Error::internal_with_context(
            "batch response did not include this entry",
            ErrorContext::new()
                .with_field_path(format!("entries[{}]", id))
                .with_details(format!("batch key {}", batch_key))
                .with_source("batch_response_mapper"),
        ));
    }
}

/// Builder for [`BatchManager`]; every collaborator is required.
pub struct BatchManagerBuilder<Req, Resp, B> {
    batch_function: Option<BatchAndSend<Req, B>>,
    response_mapper: Option<BatchResponseMapper<B, Resp>>,
    batch_key_mapper: Option<BatchKeyMapper<Req>>,
    scheduled_executor: Option<Handle>,
    mode: Option<BatchMode>,
    override_configuration: Option<BatchOverrideConfiguration>,
}

impl<Req, Resp, B> Default for BatchManagerBuilder<Req, Resp, B> {
    fn default() -> Self {
        Self {
            batch_function: None,
            response_mapper: None,
            batch_key_mapper: None,
            scheduled_executor: None,
            mode: None,
            override_configuration: None,
        }
    }
}

impl<Req, Resp, B> BatchManagerBuilder<Req, Resp, B>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    B: Send + 'static,
{
    pub fn with_batch_function<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<IdentifiableMessage<Req>>, String) -> BoxFuture<'static, Result<B>>
            + Send
            + Sync
            + 'static,
    {
        self.batch_function = Some(Arc::new(f));
        self
    }

    pub fn with_response_mapper<F>(mut self, f: F) -> Self
    where
        F: Fn(B) -> Vec<IdentifiableMessage<Result<Resp>>> + Send + Sync + 'static,
    {
        self.response_mapper = Some(Arc::new(f));
        self
    }

    pub fn with_batch_key_mapper<F>(mut self, f: F) -> Self
    where
        F: Fn(&Req) -> String + Send + Sync + 'static,
    {
        self.batch_key_mapper = Some(Arc::new(f));
        self
    }

    pub fn with_scheduled_executor(mut self, handle: Handle) -> Self {
        self.scheduled_executor = Some(handle);
        self
    }

    pub fn with_mode(mut self, mode: BatchMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_override_configuration(mut self, config: BatchOverrideConfiguration) -> Self {
        self.override_configuration = Some(config);
        self
    }

    pub fn build(self) -> Result<BatchManager<Req, Resp, B>> {
        const SOURCE: &str = "batch_manager_builder";
        let batch_function = self
            .batch_function
            .ok_or_else(|| Error::missing_field("batch_function", SOURCE))?;
        let response_mapper = self
            .response_mapper
            .ok_or_else(|| Error::missing_field("response_mapper", SOURCE))?;
        let batch_key_mapper = self
            .batch_key_mapper
            .ok_or_else(|| Error::missing_field("batch_key_mapper", SOURCE))?;
        let executor = self
            .scheduled_executor
            .ok_or_else(|| Error::missing_field("scheduled_executor", SOURCE))?;
        let mode = self
            .mode
            .ok_or_else(|| Error::missing_field("mode", SOURCE))?;

        let settings = FlushSettings::resolve(mode, self.override_configuration.as_ref());
        debug!(?mode, ?settings, "batch manager created");
        Ok(BatchManager {
            inner: Arc::new(Inner {
                settings,
                mode,
                buffers: DashMap::new(),
                key_count: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                batch_function,
                response_mapper,
                batch_key_mapper,
                executor,
            }),
        })
    }
}

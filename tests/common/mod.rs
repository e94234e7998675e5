//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use futures::FutureExt;
use sdk_batch_rust::batch::{BatchManager, BatchMode, IdentifiableMessage};
use sdk_batch_rust::config::BatchOverrideConfiguration;
use sdk_batch_rust::Error;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub type Echo = Vec<IdentifiableMessage<u32>>;
pub type DoublingManager = BatchManager<u32, u32, Echo>;

/// Every batch call: (batch key, requests in order).
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<(String, Vec<u32>)>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<(String, Vec<u32>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn batches(&self) -> Vec<Vec<u32>> {
        self.calls().into_iter().map(|(_, reqs)| reqs).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

/// A manager whose batch function echoes the requests and whose mapper doubles them.
pub fn doubling_manager(
    overrides: BatchOverrideConfiguration,
    recorder: Arc<Recorder>,
    key_of: fn(&u32) -> String,
) -> DoublingManager {
    DoublingManager::builder()
        .with_batch_function(move |entries: Vec<IdentifiableMessage<u32>>, key| {
            recorder
                .calls
                .lock()
                .unwrap()
                .push((key, entries.iter().map(|e| e.message).collect()));
            async move { Ok::<_, Error>(entries) }.boxed()
        })
        .with_response_mapper(|entries: Echo| {
            entries
                .into_iter()
                .map(|e| IdentifiableMessage::new(e.id, Ok(e.message * 2)))
                .collect()
        })
        .with_batch_key_mapper(key_of)
        .with_scheduled_executor(tokio::runtime::Handle::current())
        .with_mode(BatchMode::Request)
        .with_override_configuration(overrides)
        .build()
        .expect("valid manager")
}

pub fn single_key(_: &u32) -> String {
    "single".to_string()
}

//! Resolved batching configuration.

use std::time::Duration;

use super::BatchOverrideConfiguration;

pub const DEFAULT_MAX_BATCH_ITEMS: usize = 10;
pub const DEFAULT_MAX_BATCH_KEYS: usize = 1000;
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 500;
pub const DEFAULT_MAX_BATCH_OPEN: Duration = Duration::from_millis(200);
pub const DEFAULT_LONG_POLL_WAIT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_MIN_RECEIVE_WAIT_TIME: Duration = Duration::from_millis(50);
pub const DEFAULT_MAX_INFLIGHT_RECEIVE_BATCHES: usize = 10;
pub const DEFAULT_MAX_DONE_RECEIVE_BATCHES: usize = 10;

/// Outbound (request) batching values with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBatchConfiguration {
    pub max_batch_items: usize,
    pub max_batch_keys: usize,
    pub max_buffer_size: usize,
    pub max_batch_open: Duration,
}

impl Default for RequestBatchConfiguration {
    fn default() -> Self {
        Self {
            max_batch_items: DEFAULT_MAX_BATCH_ITEMS,
            max_batch_keys: DEFAULT_MAX_BATCH_KEYS,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_batch_open: DEFAULT_MAX_BATCH_OPEN,
        }
    }
}

impl RequestBatchConfiguration {
    pub fn from_override(o: Option<&BatchOverrideConfiguration>) -> Self {
        let d = Self::default();
        let Some(o) = o else { return d };
        Self {
            max_batch_items: o.max_batch_items.unwrap_or(d.max_batch_items),
            max_batch_keys: o.max_batch_keys.unwrap_or(d.max_batch_keys),
            max_buffer_size: o.max_buffer_size.unwrap_or(d.max_buffer_size),
            max_batch_open: o.max_batch_open.unwrap_or(d.max_batch_open),
        }
    }
}

/// Inbound (receive / prefetch) batching values with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBatchConfiguration {
    pub max_batch_items: usize,
    /// `None` means use the queue's own visibility timeout attribute.
    pub visibility_timeout: Option<Duration>,
    pub long_poll_wait_timeout: Duration,
    pub min_receive_wait_time: Duration,
    pub adaptive_prefetching: bool,
    pub max_inflight_receive_batches: usize,
    pub max_done_receive_batches: usize,
    pub receive_message_attribute_names: Vec<String>,
    pub receive_message_system_attribute_names: Vec<String>,
}

impl Default for ResponseBatchConfiguration {
    fn default() -> Self {
        Self {
            max_batch_items: DEFAULT_MAX_BATCH_ITEMS,
            visibility_timeout: None,
            long_poll_wait_timeout: DEFAULT_LONG_POLL_WAIT_TIMEOUT,
            min_receive_wait_time: DEFAULT_MIN_RECEIVE_WAIT_TIME,
            adaptive_prefetching: false,
            max_inflight_receive_batches: DEFAULT_MAX_INFLIGHT_RECEIVE_BATCHES,
            max_done_receive_batches: DEFAULT_MAX_DONE_RECEIVE_BATCHES,
            receive_message_attribute_names: Vec::new(),
            receive_message_system_attribute_names: Vec::new(),
        }
    }
}

impl ResponseBatchConfiguration {
    pub fn from_override(o: Option<&BatchOverrideConfiguration>) -> Self {
        let d = Self::default();
        let Some(o) = o else { return d };
        Self {
            max_batch_items: o.max_batch_items.unwrap_or(d.max_batch_items),
            visibility_timeout: o.visibility_timeout,
            long_poll_wait_timeout: o.long_poll_wait_timeout.unwrap_or(d.long_poll_wait_timeout),
            min_receive_wait_time: o.min_receive_wait_time.unwrap_or(d.min_receive_wait_time),
            adaptive_prefetching: o.adaptive_prefetching.unwrap_or(d.adaptive_prefetching),
            max_inflight_receive_batches: o
                .max_inflight_receive_batches
                .unwrap_or(d.max_inflight_receive_batches),
            max_done_receive_batches: o
                .max_done_receive_batches
                .unwrap_or(d.max_done_receive_batches),
            receive_message_attribute_names: o
                .receive_message_attribute_names
                .clone()
                .unwrap_or_default(),
            receive_message_system_attribute_names: o
                .receive_message_system_attribute_names
                .clone()
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_override() {
        let r = RequestBatchConfiguration::from_override(None);
        assert_eq!(r.max_batch_items, 10);
        assert_eq!(r.max_batch_keys, 1000);
        assert_eq!(r.max_buffer_size, 500);
        assert_eq!(r.max_batch_open, Duration::from_millis(200));

        let s = ResponseBatchConfiguration::from_override(None);
        assert_eq!(s.long_poll_wait_timeout, Duration::from_secs(20));
        assert_eq!(s.min_receive_wait_time, Duration::from_millis(50));
        assert!(!s.adaptive_prefetching);
        assert!(s.visibility_timeout.is_none());
    }

    #[test]
    fn override_fields_win() {
        let o = BatchOverrideConfiguration::builder()
            .with_max_batch_items(3)
            .with_adaptive_prefetching(true)
            .with_visibility_timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let r = RequestBatchConfiguration::from_override(Some(&o));
        assert_eq!(r.max_batch_items, 3);
        assert_eq!(r.max_buffer_size, DEFAULT_MAX_BUFFER_SIZE);

        let s = ResponseBatchConfiguration::from_override(Some(&o));
        assert_eq!(s.max_batch_items, 3);
        assert!(s.adaptive_prefetching);
        assert_eq!(s.visibility_timeout, Some(Duration::from_secs(5)));
    }
}

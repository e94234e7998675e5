//! 批处理配置模块：可选覆盖参数、校验构建器以及环境变量/YAML/JSON 加载。
//!
//! # Batch Configuration
//!
//! [`BatchOverrideConfiguration`] is an immutable value object whose fields are all
//! optional; an absent field means "use the library default". Managers resolve it
//! into concrete values through [`RequestBatchConfiguration`] and
//! [`ResponseBatchConfiguration`].
//!
//! | Source | Entry point |
//! |--------|-------------|
//! | Code | [`BatchOverrideConfiguration::builder`] |
//! | Environment (`SDK_BATCH_*`) | [`BatchOverrideConfiguration::from_env`] |
//! | YAML / JSON documents | [`BatchOverrideConfiguration::from_yaml_str`], [`BatchOverrideConfiguration::from_json_str`] |
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use sdk_batch_rust::config::BatchOverrideConfiguration;
//!
//! let config = BatchOverrideConfiguration::builder()
//!     .with_max_batch_items(5)
//!     .with_max_batch_open(Duration::from_millis(50))
//!     .build()
//!     .unwrap();
//! assert_eq!(config.max_batch_items, Some(5));
//! assert_eq!(config.max_buffer_size, None);
//! ```

mod resolved;

pub use resolved::{RequestBatchConfiguration, ResponseBatchConfiguration};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, ErrorContext};
use crate::Result;

const ENV_PREFIX: &str = "SDK_BATCH_";

/// Optional batching tunables.
///
/// Instances only come out of [`BatchOverrideConfigurationBuilder::build`] or the
/// loaders, all of which validate; fields are public for reading.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchOverrideConfiguration {
    pub max_batch_items: Option<usize>,
    pub max_batch_keys: Option<usize>,
    pub max_buffer_size: Option<usize>,
    #[serde(with = "duration_ms", rename = "max_batch_open_ms")]
    pub max_batch_open: Option<Duration>,
    #[serde(with = "duration_ms", rename = "visibility_timeout_ms")]
    pub visibility_timeout: Option<Duration>,
    #[serde(with = "duration_ms", rename = "long_poll_wait_timeout_ms")]
    pub long_poll_wait_timeout: Option<Duration>,
    #[serde(with = "duration_ms", rename = "min_receive_wait_time_ms")]
    pub min_receive_wait_time: Option<Duration>,
    pub adaptive_prefetching: Option<bool>,
    pub max_inflight_receive_batches: Option<usize>,
    pub max_done_receive_batches: Option<usize>,
    pub receive_message_attribute_names: Option<Vec<String>>,
    pub receive_message_system_attribute_names: Option<Vec<String>>,
}

impl BatchOverrideConfiguration {
    pub fn builder() -> BatchOverrideConfigurationBuilder {
        BatchOverrideConfigurationBuilder::default()
    }

    /// A builder pre-filled with this configuration's values.
    pub fn to_builder(&self) -> BatchOverrideConfigurationBuilder {
        BatchOverrideConfigurationBuilder {
            inner: self.clone(),
        }
    }

    /// Load from `SDK_BATCH_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Layer `SDK_BATCH_*` environment variables over this configuration.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Layer variables from an arbitrary lookup (names include the `SDK_BATCH_` prefix).
    pub fn with_overrides_from<F>(self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let name = format!("{}{}", ENV_PREFIX, suffix);
            lookup(&name).map(|v| (name, v.trim().to_string()))
        };
        let mut b = self.to_builder();
        if let Some((n, v)) = var("MAX_BATCH_ITEMS") {
            b.inner.max_batch_items = Some(parse_env(&n, &v)?);
        }
        if let Some((n, v)) = var("MAX_BATCH_KEYS") {
            b.inner.max_batch_keys = Some(parse_env(&n, &v)?);
        }
        if let Some((n, v)) = var("MAX_BUFFER_SIZE") {
            b.inner.max_buffer_size = Some(parse_env(&n, &v)?);
        }
        if let Some((n, v)) = var("MAX_BATCH_OPEN_MS") {
            b.inner.max_batch_open = Some(Duration::from_millis(parse_env(&n, &v)?));
        }
        if let Some((n, v)) = var("VISIBILITY_TIMEOUT_MS") {
            b.inner.visibility_timeout = Some(Duration::from_millis(parse_env(&n, &v)?));
        }
        if let Some((n, v)) = var("LONG_POLL_WAIT_MS") {
            b.inner.long_poll_wait_timeout = Some(Duration::from_millis(parse_env(&n, &v)?));
        }
        if let Some((n, v)) = var("MIN_RECEIVE_WAIT_MS") {
            b.inner.min_receive_wait_time = Some(Duration::from_millis(parse_env(&n, &v)?));
        }
        if let Some((n, v)) = var("ADAPTIVE_PREFETCHING") {
            b.inner.adaptive_prefetching = Some(parse_env(&n, &v.to_ascii_lowercase())?);
        }
        if let Some((n, v)) = var("MAX_INFLIGHT_RECEIVE_BATCHES") {
            b.inner.max_inflight_receive_batches = Some(parse_env(&n, &v)?);
        }
        if let Some((n, v)) = var("MAX_DONE_RECEIVE_BATCHES") {
            b.inner.max_done_receive_batches = Some(parse_env(&n, &v)?);
        }
        b.build()
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let parsed: Self = serde_yaml::from_str(s).map_err(|e| {
            Error::configuration_with_context(
                "invalid YAML batch configuration",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("config_loader"),
            )
        })?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let parsed: Self = serde_json::from_str(s).map_err(|e| {
            Error::configuration_with_context(
                "invalid JSON batch configuration",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("config_loader"),
            )
        })?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        positive_count("max_batch_items", self.max_batch_items)?;
        positive_count("max_batch_keys", self.max_batch_keys)?;
        positive_count("max_buffer_size", self.max_buffer_size)?;
        positive_count(
            "max_inflight_receive_batches",
            self.max_inflight_receive_batches,
        )?;
        positive_count("max_done_receive_batches", self.max_done_receive_batches)?;
        positive_duration("max_batch_open", self.max_batch_open)?;
        positive_duration("visibility_timeout", self.visibility_timeout)?;
        positive_duration("long_poll_wait_timeout", self.long_poll_wait_timeout)?;
        positive_duration("min_receive_wait_time", self.min_receive_wait_time)?;
        Ok(())
    }
}

/// Builder for [`BatchOverrideConfiguration`].
#[derive(Debug, Clone, Default)]
pub struct BatchOverrideConfigurationBuilder {
    inner: BatchOverrideConfiguration,
}

impl BatchOverrideConfigurationBuilder {
    pub fn with_max_batch_items(mut self, n: usize) -> Self {
        self.inner.max_batch_items = Some(n);
        self
    }
    pub fn with_max_batch_keys(mut self, n: usize) -> Self {
        self.inner.max_batch_keys = Some(n);
        self
    }
    pub fn with_max_buffer_size(mut self, n: usize) -> Self {
        self.inner.max_buffer_size = Some(n);
        self
    }
    pub fn with_max_batch_open(mut self, d: Duration) -> Self {
        self.inner.max_batch_open = Some(d);
        self
    }
    pub fn with_visibility_timeout(mut self, d: Duration) -> Self {
        self.inner.visibility_timeout = Some(d);
        self
    }
    pub fn with_long_poll_wait_timeout(mut self, d: Duration) -> Self {
        self.inner.long_poll_wait_timeout = Some(d);
        self
    }
    pub fn with_min_receive_wait_time(mut self, d: Duration) -> Self {
        self.inner.min_receive_wait_time = Some(d);
        self
    }
    pub fn with_adaptive_prefetching(mut self, enabled: bool) -> Self {
        self.inner.adaptive_prefetching = Some(enabled);
        self
    }
    pub fn with_max_inflight_receive_batches(mut self, n: usize) -> Self {
        self.inner.max_inflight_receive_batches = Some(n);
        self
    }
    pub fn with_max_done_receive_batches(mut self, n: usize) -> Self {
        self.inner.max_done_receive_batches = Some(n);
        self
    }
    pub fn with_receive_message_attribute_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.receive_message_attribute_names =
            Some(names.into_iter().map(Into::into).collect());
        self
    }
    pub fn with_receive_message_system_attribute_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.receive_message_system_attribute_names =
            Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Validate and produce an independent configuration value.
    ///
    /// The builder stays usable; later mutations never reach configurations
    /// already built from it.
    pub fn build(&self) -> Result<BatchOverrideConfiguration> {
        let config = self.inner.clone();
        config.validate()?;
        Ok(config)
    }
}

fn positive_count(field: &str, value: Option<usize>) -> Result<()> {
    match value {
        Some(0) => Err(Error::configuration_with_context(
            format!("{} must be positive", field),
            ErrorContext::new()
                .with_field_path(field)
                .with_details("got 0")
                .with_source("batch_override_configuration"),
        )),
        _ => Ok(()),
    }
}

fn positive_duration(field: &str, value: Option<Duration>) -> Result<()> {
    match value {
        Some(d) if d.is_zero() => Err(Error::configuration_with_context(
            format!("{} must be positive", field),
            ErrorContext::new()
                .with_field_path(field)
                .with_details("got 0ms")
                .with_source("batch_override_configuration"),
        )),
        _ => Ok(()),
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse::<T>().map_err(|_| {
        Error::configuration_with_context(
            format!("cannot parse environment variable {}", name),
            ErrorContext::new()
                .with_field_path(name)
                .with_details(format!("value: {:?}", value))
                .with_source("env"),
        )
    })
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashMap;
    use std::hash::{Hash, Hasher};

    fn hash_of(c: &BatchOverrideConfiguration) -> u64 {
        let mut h = DefaultHasher::new();
        c.hash(&mut h);
        h.finish()
    }

    #[test]
    fn built_config_is_isolated_from_builder() {
        let builder = BatchOverrideConfiguration::builder()
            .with_max_batch_items(5)
            .with_receive_message_attribute_names(["a"]);
        let first = builder.build().unwrap();
        let builder = builder
            .with_max_batch_items(7)
            .with_receive_message_attribute_names(["a", "b"]);
        let second = builder.build().unwrap();

        assert_eq!(first.max_batch_items, Some(5));
        assert_eq!(
            first.receive_message_attribute_names,
            Some(vec!["a".to_string()])
        );
        assert_eq!(second.max_batch_items, Some(7));
    }

    #[test]
    fn structural_equality_and_hash() {
        let a = BatchOverrideConfiguration::builder()
            .with_max_batch_open(Duration::from_millis(10))
            .build()
            .unwrap();
        let b = a.to_builder().build().unwrap();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let c = a.to_builder().with_max_buffer_size(3).build().unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn rejects_non_positive_values() {
        let err = BatchOverrideConfiguration::builder()
            .with_max_batch_items(0)
            .build()
            .unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("max_batch_items")
        );

        assert!(BatchOverrideConfiguration::builder()
            .with_min_receive_wait_time(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn env_overrides_layer_on_top() {
        let vars: HashMap<&str, &str> = [
            ("SDK_BATCH_MAX_BATCH_ITEMS", "4"),
            ("SDK_BATCH_MAX_BATCH_OPEN_MS", "75"),
            ("SDK_BATCH_ADAPTIVE_PREFETCHING", "TRUE"),
        ]
        .into_iter()
        .collect();
        let base = BatchOverrideConfiguration::builder()
            .with_max_buffer_size(9)
            .build()
            .unwrap();
        let config = base
            .with_overrides_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.max_batch_items, Some(4));
        assert_eq!(config.max_buffer_size, Some(9));
        assert_eq!(config.max_batch_open, Some(Duration::from_millis(75)));
        assert_eq!(config.adaptive_prefetching, Some(true));
    }

    #[test]
    fn env_parse_failure_names_variable() {
        let err = BatchOverrideConfiguration::default()
            .with_overrides_from(|k| (k == "SDK_BATCH_MAX_BATCH_KEYS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("SDK_BATCH_MAX_BATCH_KEYS"));
    }

    #[test]
    fn loads_yaml_and_json() {
        let yaml = "max_batch_items: 3\nmax_batch_open_ms: 20\nreceive_message_attribute_names: [trace]\n";
        let from_yaml = BatchOverrideConfiguration::from_yaml_str(yaml).unwrap();
        assert_eq!(from_yaml.max_batch_items, Some(3));
        assert_eq!(from_yaml.max_batch_open, Some(Duration::from_millis(20)));

        let json = serde_json::to_string(&from_yaml).unwrap();
        let from_json = BatchOverrideConfiguration::from_json_str(&json).unwrap();
        assert_eq!(from_yaml, from_json);
    }

    #[test]
    fn loader_validates() {
        assert!(BatchOverrideConfiguration::from_json_str(r#"{"max_buffer_size": 0}"#).is_err());
        assert!(BatchOverrideConfiguration::from_yaml_str("max_batch_items: [").is_err());
    }
}

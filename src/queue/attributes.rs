//! Queue attributes manager.

use std::sync::Arc;
use std::time::Duration;

use futures::future::FutureExt;

use super::client::QueueClient;
use super::model::QueueAttributes;
use crate::attributes::{AttributesResolver, ResolverStats};
use crate::Result;

/// Resolves and caches the queue attributes the receive path needs, one
/// lookup per queue no matter how many receivers ask at once.
pub struct QueueAttributesManager {
    resolver: AttributesResolver<QueueAttributes>,
}

impl QueueAttributesManager {
    pub fn new(client: Arc<dyn QueueClient>) -> Self {
        let resolver = AttributesResolver::new(move |queue_url: String| {
            let client = Arc::clone(&client);
            async move { client.get_queue_attributes(&queue_url).await }.boxed()
        });
        Self { resolver }
    }

    pub async fn queue_attributes(&self, queue_url: &str) -> Result<QueueAttributes> {
        self.resolver.resolve(queue_url).await
    }

    pub async fn visibility_timeout(&self, queue_url: &str) -> Result<Duration> {
        Ok(self.queue_attributes(queue_url).await?.visibility_timeout)
    }

    /// How long a receive caller waits: its own wait time, else the queue's
    /// default receive wait, else `min_wait` when the queue default is zero.
    pub async fn receive_message_timeout(
        &self,
        queue_url: &str,
        request_wait: Option<Duration>,
        min_wait: Duration,
    ) -> Result<Duration> {
        if let Some(wait) = request_wait {
            return Ok(wait);
        }
        let queue_wait = self.queue_attributes(queue_url).await?.receive_message_wait_time;
        Ok(if queue_wait.is_zero() { min_wait } else { queue_wait })
    }

    pub fn invalidate(&self, queue_url: &str) -> bool {
        self.resolver.invalidate(queue_url)
    }

    pub fn stats(&self) -> ResolverStats {
        self.resolver.stats()
    }
}

//! 动态属性解析模块：按键惰性解析服务端配置，同一键并发请求只触发一次查询。
//!
//! # Dynamic Attributes
//!
//! Some batching decisions depend on server-side settings (a queue's visibility
//! timeout or default receive wait time). [`AttributesResolver`] fetches them on
//! first use, shares one in-flight lookup between concurrent callers of the same
//! key and caches successful results. Failures reach every waiter and are not
//! cached.
//!
//! ## Example
//!
//! ```rust
//! use futures::FutureExt;
//! use sdk_batch_rust::attributes::AttributesResolver;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let resolver = AttributesResolver::<usize>::new(|key: String| {
//!     async move { Ok::<_, sdk_batch_rust::Error>(key.len()) }.boxed()
//! });
//! assert_eq!(resolver.resolve("queue-a").await.unwrap(), 7);
//! assert_eq!(resolver.cached("queue-a"), Some(7));
//! # }
//! ```

mod resolver;

pub use resolver::{AttributeLookup, AttributesResolver, ResolverStats};

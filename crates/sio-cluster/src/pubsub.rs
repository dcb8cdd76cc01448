//! The pub/sub collaborator the cluster adapter is built against. Ships no production
//! backend — `sio-testkit` provides an in-memory implementation for tests and the
//! demonstration binary; a real deployment would plug in Redis, NATS, or similar.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ClusterError;

/// Invoked once per published payload, at most once per subscriber process.
pub type PubSubHandler = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

#[async_trait]
pub trait PubSub: Send + Sync {
    /// Best-effort, at-most-once publish.
    async fn publish(&self, channel: &str, bytes: Vec<u8>) -> Result<(), ClusterError>;
    async fn subscribe(&self, channel: &str, handler: PubSubHandler) -> Result<(), ClusterError>;
}

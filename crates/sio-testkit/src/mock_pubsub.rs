//! An in-process `sio_cluster::PubSub`. Grounded on `rt-test-utils::MockWsServer`'s
//! in-process accept loop, simplified from a real `TcpListener` to direct handler
//! invocation — `publish` calls every subscribed handler in the same task rather than
//! round-tripping through a broker, so several `ClusterAdapter`s sharing one `MockPubSub`
//! behave like servers on the same channel without a real pub/sub backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use sio_cluster::{ClusterError, PubSub, PubSubHandler};

#[derive(Default, Clone)]
pub struct MockPubSub {
    subscribers: Arc<Mutex<HashMap<String, Vec<PubSubHandler>>>>,
}

impl MockPubSub {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PubSub for MockPubSub {
    async fn publish(&self, channel: &str, bytes: Vec<u8>) -> Result<(), ClusterError> {
        let subscribers = self.subscribers.lock().await;
        if let Some(handlers) = subscribers.get(channel) {
            for handler in handlers {
                (handler.as_ref())(bytes.clone());
            }
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str, handler: PubSubHandler) -> Result<(), ClusterError> {
        self.subscribers.lock().await.entry(channel.to_owned()).or_default().push(handler);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn publish_invokes_every_subscriber_on_the_channel() {
        let bus = MockPubSub::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = count.clone();
        bus.subscribe("chan", Arc::new(move |_bytes| { c1.fetch_add(1, Ordering::SeqCst); })).await.unwrap();
        let c2 = count.clone();
        bus.subscribe("chan", Arc::new(move |_bytes| { c2.fetch_add(1, Ordering::SeqCst); })).await.unwrap();

        bus.publish("chan", vec![1, 2, 3]).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn publish_on_an_unsubscribed_channel_is_a_no_op() {
        let bus = MockPubSub::new();
        bus.publish("nobody-home", vec![1]).await.unwrap();
    }
}

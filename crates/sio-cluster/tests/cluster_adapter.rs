//! End-to-end cluster adapter scenarios: two `ClusterAdapter`s sharing an in-process
//! pub/sub bus, each owning its own `Namespace` with real `Socket`s, proving peer
//! discovery, failure credit, and cross-server broadcast-with-ack counting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex as TokioMutex;

use sio_cluster::{ClusterAdapter, ClusterConfig, ClusterError, PubSub, PubSubHandler};
use sio_core::{Adapter, BroadcastOptions, Namespace, ReadyState, Transport, TransportError};
use sio_protocol::{Buffer, Packet, Value};

#[derive(Default, Clone)]
struct LoopbackPubSub {
    subscribers: Arc<TokioMutex<HashMap<String, Vec<PubSubHandler>>>>,
}

#[async_trait]
impl PubSub for LoopbackPubSub {
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

struct FakeTransport {
    id: String,
    written: Mutex<Vec<Vec<Buffer>>>,
}

impl FakeTransport {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(FakeTransport { id: id.to_owned(), written: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn write(&self, bufs: Vec<Buffer>) -> Result<(), TransportError> {
        self.written.lock().unwrap().push(bufs);
        Ok(())
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::Open
    }

    fn protocol(&self) -> u8 {
        4
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn close(&self, _discard: bool) {}
}

fn test_config() -> ClusterConfig {
    ClusterConfig {
        peer_timeout: Duration::from_millis(100),
        heartbeat_interval: Duration::from_secs(30),
        request_timeout: Duration::from_millis(500),
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

#[tokio::test]
async fn two_servers_discover_each_other_and_count_broadcast_recipients() {
    let bus = LoopbackPubSub::default();

    let adapter_a = ClusterAdapter::new("/", Arc::new(bus.clone()), test_config()).await.unwrap();
    let ns_a = Namespace::new("/", adapter_a.clone(), None, false);
    adapter_a.bind_registry(&ns_a);
    settle().await;

    let adapter_b = ClusterAdapter::new("/", Arc::new(bus.clone()), test_config()).await.unwrap();
    let ns_b = Namespace::new("/", adapter_b.clone(), None, false);
    adapter_b.bind_registry(&ns_b);
    settle().await;

    assert_eq!(adapter_a.server_count(), 2);
    assert_eq!(adapter_b.server_count(), 2);

    ns_a.add(FakeTransport::new("t-a"), Value::Null, None).await.unwrap();
    ns_b.add(FakeTransport::new("t-b"), Value::Null, None).await.unwrap();

    let packet = Packet::event("/", "msg", vec![]).unwrap();
    let ack_id = adapter_a.next_broadcast_ack_id();
    let sent = adapter_a
        .broadcast_with_ack(ack_id, &packet, vec![], BroadcastOptions::new(), ns_a.as_ref(), Box::new(|_resp| {}))
        .await;

    assert_eq!(sent, 2, "one local recipient on each of the two servers");
}

#[tokio::test]
async fn peer_disappearance_is_credited_instead_of_hanging_server_side_emit() {
    let bus = LoopbackPubSub::default();

    let adapter_a = ClusterAdapter::new("/", Arc::new(bus.clone()), test_config()).await.unwrap();
    let ns_a = Namespace::new("/", adapter_a.clone(), None, false);
    adapter_a.bind_registry(&ns_a);
    settle().await;

    let adapter_b = ClusterAdapter::new("/", Arc::new(bus.clone()), test_config()).await.unwrap();
    let ns_b = Namespace::new("/", adapter_b.clone(), None, false);
    adapter_b.bind_registry(&ns_b);
    settle().await;
    assert_eq!(adapter_a.server_count(), 2);

    adapter_b.shutdown().await;
    settle().await;
    assert_eq!(adapter_a.server_count(), 1);

    // With no peers left, a server-side emit requiring acks resolves immediately with an
    // empty reply set rather than waiting out the request timeout.
    let started = tokio::time::Instant::now();
    let replies = adapter_a.server_side_emit("ping", vec![], true).await.unwrap();
    assert!(replies.is_empty());
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[tokio::test]
async fn fetch_sockets_merges_local_and_remote_results() {
    let bus = LoopbackPubSub::default();

    let adapter_a = ClusterAdapter::new("/", Arc::new(bus.clone()), test_config()).await.unwrap();
    let ns_a = Namespace::new("/", adapter_a.clone(), None, false);
    adapter_a.bind_registry(&ns_a);
    settle().await;

    let adapter_b = ClusterAdapter::new("/", Arc::new(bus.clone()), test_config()).await.unwrap();
    let ns_b = Namespace::new("/", adapter_b.clone(), None, false);
    adapter_b.bind_registry(&ns_b);
    settle().await;

    ns_a.add(FakeTransport::new("t-a"), Value::Null, None).await.unwrap();
    ns_b.add(FakeTransport::new("t-b"), Value::Null, None).await.unwrap();

    let details = adapter_a.fetch_sockets(BroadcastOptions::new(), ns_a.as_ref()).await;
    assert_eq!(details.len(), 2, "one socket on each server in the cluster");
}

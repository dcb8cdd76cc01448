//! The cluster adapter: wraps a `LocalAdapter` behind an explicit pointer, composition
//! rather than inheritance, and propagates selector-based operations to every other server
//! sharing this pub/sub channel. Grounded on
//! `examples/iwismer-rusty-timer/services/forwarder/src/local_fanout.rs`'s `FanoutServer`
//! broadcast-to-many-consumers shape for the local fan-out half, combined with
//! `crate::requests::RequestTracker` for the cross-server half.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock, RwLock as StdRwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use sio_core::{
    Adapter, AckResponse, BroadcastOptions, LocalAdapter, Namespace, Offset, PrivateSessionId,
    RestoredSession, Room, ServerId, Session, SocketDetails, SocketId, SocketRegistry,
};
use sio_protocol::{Buffer, Decoder, Input, Packet, Value};

use crate::error::ClusterError;
use crate::heartbeat::{HeartbeatTimer, Membership};
use crate::message::{bufs_to_wire, wire_to_bufs, ClusterEnvelope, ClusterMessage, WireOptions, WireSocketDetails};
use crate::pubsub::{PubSub, PubSubHandler};
use crate::requests::RequestTracker;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A handler registered locally to answer peers' `SERVER_SIDE_EMIT`. Synchronous: the
/// reference server's own server-side-emit handlers are thin dispatch shims over
/// already-computed local state, not another round of I/O.
pub type ServerSideEmitHandler = Arc<dyn Fn(&str, &[Value]) -> Vec<Value> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub peer_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            peer_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(1),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// One adapter per namespace, same as `LocalAdapter` — `nsp` scopes both the pub/sub
/// channel name and the envelope field peers use to route a message to the right
/// namespace's adapter.
pub struct ClusterAdapter {
    uid: ServerId,
    nsp: String,
    channel: String,
    local: Arc<LocalAdapter>,
    pubsub: Arc<dyn PubSub>,
    registry: OnceLock<Weak<Namespace>>,
    membership: Arc<Membership>,
    heartbeat_timer: Arc<HeartbeatTimer>,
    peer_count: AtomicU64,
    request_timeout: Duration,
    pending_on_response: StdMutex<HashMap<String, Arc<dyn Fn(AckResponse) + Send + Sync>>>,
    pending_client_counts: RequestTracker<u64>,
    pending_fetch: RequestTracker<Vec<WireSocketDetails>>,
    pending_server_emit: RequestTracker<Vec<serde_json::Value>>,
    server_side_emit_handler: StdRwLock<Option<ServerSideEmitHandler>>,
}

impl ClusterAdapter {
    pub async fn new(nsp: impl Into<String>, pubsub: Arc<dyn PubSub>, config: ClusterConfig) -> Result<Arc<Self>, ClusterError> {
        let nsp = nsp.into();
        let channel = format!("sio-cluster#{nsp}");
        let adapter = Arc::new(ClusterAdapter {
            uid: ServerId::new(),
            nsp,
            channel: channel.clone(),
            local: Arc::new(LocalAdapter::new()),
            pubsub,
            registry: OnceLock::new(),
            membership: Arc::new(Membership::new(config.peer_timeout)),
            heartbeat_timer: Arc::new(HeartbeatTimer::new(config.heartbeat_interval)),
            peer_count: AtomicU64::new(0),
            request_timeout: config.request_timeout,
            pending_on_response: StdMutex::new(HashMap::new()),
            pending_client_counts: RequestTracker::new(),
            pending_fetch: RequestTracker::new(),
            pending_server_emit: RequestTracker::new(),
            server_side_emit_handler: StdRwLock::new(None),
        });

        let handler_adapter = adapter.clone();
        adapter
            .pubsub
            .subscribe(
                &channel,
                Arc::new(move |bytes| {
                    let adapter = handler_adapter.clone();
                    tokio::spawn(async move { adapter.handle_incoming(bytes).await });
                }),
            )
            .await?;

        adapter.publish(ClusterMessage::InitialHeartbeat).await;
        Ok(adapter)
    }

    /// Bind the `Namespace` this adapter belongs to, so inbound peer operations can apply
    /// themselves against its socket map. Two-phase because `Namespace::new` needs an
    /// already-constructed `Arc<dyn Adapter>` — the same `Weak`-back-pointer pattern
    /// `Socket` uses to reach its own owning namespace.
    pub fn bind_registry(&self, ns: &Arc<Namespace>) {
        let _ = self.registry.set(Arc::downgrade(ns));
    }

    pub fn uid(&self) -> &ServerId {
        &self.uid
    }

    pub fn on_server_side_emit(&self, handler: impl Fn(&str, &[Value]) -> Vec<Value> + Send + Sync + 'static) {
        *self.server_side_emit_handler.write().unwrap() = Some(Arc::new(handler));
    }

    /// Spawn the periodic heartbeat-publish-if-quiet-plus-membership-sweep loop (spec.md
    /// §4.9 "a periodic HEARTBEAT is scheduled any time this server publishes anything").
    pub fn spawn_heartbeat_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let adapter = self.clone();
        let period = adapter.heartbeat_timer.interval_for_ticking();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if adapter.heartbeat_timer.should_fire().await {
                    adapter.publish(ClusterMessage::Heartbeat).await;
                }
                let expired = adapter.membership.sweep_expired().await;
                if !expired.is_empty() {
                    for uid in &expired {
                        adapter.pending_client_counts.credit_peer_as_missing(uid);
                        adapter.pending_fetch.credit_peer_as_missing(uid);
                        adapter.pending_server_emit.credit_peer_as_missing(uid);
                    }
                    adapter.peer_count.store(adapter.membership.peer_count().await, Ordering::SeqCst);
                }
            }
        })
    }

    pub async fn shutdown(&self) {
        self.publish(ClusterMessage::AdapterClose).await;
    }

    async fn publish(&self, message: ClusterMessage) {
        self.heartbeat_timer.refresh().await;
        let envelope = ClusterEnvelope {
            uid: self.uid.0.clone(),
            nsp: self.nsp.clone(),
            message,
        };
        match envelope.encode() {
            Ok(bytes) => {
                if let Err(e) = self.pubsub.publish(&self.channel, bytes).await {
                    warn!(error = %e, "cluster publish failed");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode cluster envelope"),
        }
    }

    fn registry(&self) -> Option<Arc<Namespace>> {
        self.registry.get()?.upgrade()
    }

    async fn record_peer(&self, uid: &str) {
        self.membership.record(uid).await;
        self.peer_count.store(self.membership.peer_count().await, Ordering::SeqCst);
    }

    async fn handle_incoming(&self, bytes: Vec<u8>) {
        let envelope = match ClusterEnvelope::decode(&bytes) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "dropping malformed cluster envelope");
                return;
            }
        };
        if envelope.uid == self.uid.0 || envelope.nsp != self.nsp {
            return;
        }
        self.record_peer(&envelope.uid).await;

        // Only the operations that touch the local socket map need the namespace back
        // pointer; membership gossip and request/response correlation work before
        // `bind_registry` has run (there is a real window, during `ClusterAdapter::new`'s
        // own initial heartbeat exchange, before the caller can bind it).
        macro_rules! need_registry {
            () => {
                match self.registry() {
                    Some(ns) => ns,
                    None => {
                        debug!("cluster message needs the bound namespace before registry is set, dropping");
                        return;
                    }
                }
            };
        }

        match envelope.message {
            ClusterMessage::InitialHeartbeat => self.publish(ClusterMessage::Heartbeat).await,
            ClusterMessage::Heartbeat => {}
            ClusterMessage::AdapterClose => {
                self.membership.forget(&envelope.uid).await;
                self.pending_client_counts.credit_peer_as_missing(&envelope.uid);
                self.pending_fetch.credit_peer_as_missing(&envelope.uid);
                self.pending_server_emit.credit_peer_as_missing(&envelope.uid);
                self.peer_count.store(self.membership.peer_count().await, Ordering::SeqCst);
            }
            ClusterMessage::Broadcast { request_id, opts, packet, with_ack } => {
                let ns = need_registry!();
                self.apply_remote_broadcast(ns.as_ref(), request_id, opts, packet, with_ack).await;
            }
            ClusterMessage::BroadcastAck { request_id, socket_id, args } => {
                let callback = self.pending_on_response.lock().unwrap().get(&request_id).cloned();
                if let Some(callback) = callback {
                    (callback.as_ref())(AckResponse {
                        socket_id: SocketId(socket_id),
                        args: args.into_iter().map(Value::from_json).collect(),
                    });
                }
            }
            ClusterMessage::BroadcastClientCount { request_id, client_count } => {
                self.pending_client_counts.record_response(&request_id, &envelope.uid, client_count);
            }
            ClusterMessage::SocketsJoin { opts, rooms } => {
                let ns = need_registry!();
                self.local
                    .add_sockets(BroadcastOptions::from(opts), rooms.into_iter().map(Room::new).collect(), ns.as_ref())
                    .await;
            }
            ClusterMessage::SocketsLeave { opts, rooms } => {
                let ns = need_registry!();
                self.local
                    .del_sockets(BroadcastOptions::from(opts), rooms.into_iter().map(Room::new).collect(), ns.as_ref())
                    .await;
            }
            ClusterMessage::DisconnectSockets { opts, close } => {
                let ns = need_registry!();
                self.local.disconnect_sockets(BroadcastOptions::from(opts), close, ns.as_ref()).await;
            }
            ClusterMessage::FetchSockets { request_id, opts } => {
                let ns = need_registry!();
                let details = self.local.fetch_sockets(BroadcastOptions::from(opts), ns.as_ref()).await;
                let wire: Vec<WireSocketDetails> = details.iter().map(WireSocketDetails::from).collect();
                self.publish(ClusterMessage::FetchSocketsResponse { request_id, sockets: wire }).await;
            }
            ClusterMessage::FetchSocketsResponse { request_id, sockets } => {
                self.pending_fetch.record_response(&request_id, &envelope.uid, sockets);
            }
            ClusterMessage::ServerSideEmit { request_id, event, args } => {
                let values: Vec<Value> = args.into_iter().map(Value::from_json).collect();
                let result = self
                    .server_side_emit_handler
                    .read()
                    .unwrap()
                    .as_ref()
                    .map(|h| (h.as_ref())(&event, &values))
                    .unwrap_or_default();
                if let Some(request_id) = request_id {
                    let reply: Vec<serde_json::Value> = result.into_iter().map(Value::into_json).collect();
                    self.publish(ClusterMessage::ServerSideEmitResponse { request_id, args: reply }).await;
                }
            }
            ClusterMessage::ServerSideEmitResponse { request_id, args } => {
                self.pending_server_emit.record_response(&request_id, &envelope.uid, args);
            }
        }
    }

    async fn apply_remote_broadcast(&self, registry: &dyn SocketRegistry, request_id: Option<String>, opts: WireOptions, packet: Vec<crate::message::WireBuffer>, with_ack: bool) {
        let bufs = wire_to_bufs(packet);
        let decoded = match decode_bufs(&bufs) {
            Some(p) => p,
            None => {
                warn!("dropping cluster broadcast with undecodable packet");
                return;
            }
        };
        let opts = BroadcastOptions::from(opts);
        if !with_ack {
            self.local.broadcast(&decoded, bufs, opts, registry).await;
            return;
        }
        let Some(request_id) = request_id else {
            self.local.broadcast(&decoded, bufs, opts, registry).await;
            return;
        };
        let channel = self.channel.clone();
        let pubsub = self.pubsub.clone();
        let uid = self.uid.0.clone();
        let nsp = self.nsp.clone();
        let ack_request_id = request_id.clone();
        let local_ack_id = self.local.next_broadcast_ack_id();
        let sent = self
            .local
            .broadcast_with_ack(
                local_ack_id,
                &decoded,
                bufs,
                opts,
                registry,
                Box::new(move |resp| {
                    let envelope = ClusterEnvelope {
                        uid: uid.clone(),
                        nsp: nsp.clone(),
                        message: ClusterMessage::BroadcastAck {
                            request_id: ack_request_id.clone(),
                            socket_id: resp.socket_id.0.clone(),
                            args: resp.args.into_iter().map(Value::into_json).collect(),
                        },
                    };
                    let pubsub = pubsub.clone();
                    let channel = channel.clone();
                    tokio::spawn(async move {
                        if let Ok(bytes) = envelope.encode() {
                            let _ = pubsub.publish(&channel, bytes).await;
                        }
                    });
                }),
            )
            .await;
        self.publish(ClusterMessage::BroadcastClientCount {
            request_id,
            client_count: sent,
        })
        .await;
    }

    /// Dispatch `event`/`args` to every peer's `on_server_side_emit` handler, optionally
    /// waiting for each to answer.
    pub async fn server_side_emit(&self, event: &str, args: Vec<Value>, want_ack: bool) -> Result<Vec<Value>, ClusterError> {
        let known_peers = self.membership.known_peers().await;
        let wire_args: Vec<serde_json::Value> = args.into_iter().map(Value::into_json).collect();
        if !want_ack {
            self.publish(ClusterMessage::ServerSideEmit { request_id: None, event: event.to_owned(), args: wire_args }).await;
            return Ok(Vec::new());
        }
        let expected = known_peers.len();
        let request_id = self.pending_server_emit.next_request_id();
        let rx = self.pending_server_emit.begin(request_id.clone(), known_peers);
        self.publish(ClusterMessage::ServerSideEmit { request_id: Some(request_id), event: event.to_owned(), args: wire_args }).await;
        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(replies)) => Ok(replies.into_iter().flatten().map(Value::from_json).collect()),
            _ => Err(ClusterError::MissingResponses { request_id: "server-side-emit".into(), expected, missing: expected }),
        }
    }
}

fn decode_bufs(bufs: &[Buffer]) -> Option<Packet> {
    let mut decoder = Decoder::new();
    let mut result = None;
    for buf in bufs {
        let input = match buf {
            Buffer::Text(s) => Input::Text(s.clone()),
            Buffer::Binary(b) => Input::Binary(b.clone()),
        };
        match decoder.feed(input).ok()? {
            Some(packet) => result = Some(packet),
            None => continue,
        }
    }
    result
}

#[async_trait]
impl Adapter for ClusterAdapter {
    async fn add_all(&self, id: SocketId, rooms: Vec<Room>) {
        self.local.add_all(id, rooms).await;
    }

    async fn del(&self, id: &SocketId, room: &Room) {
        self.local.del(id, room).await;
    }

    async fn del_all(&self, id: &SocketId) {
        self.local.del_all(id).await;
    }

    fn rooms_of(&self, id: &SocketId) -> Vec<Room> {
        self.local.rooms_of(id)
    }

    fn next_broadcast_ack_id(&self) -> u64 {
        self.local.next_broadcast_ack_id()
    }

    async fn broadcast(&self, packet: &Packet, bufs: Vec<Buffer>, opts: BroadcastOptions, registry: &dyn SocketRegistry) {
        self.local.broadcast(packet, bufs.clone(), opts.clone(), registry).await;
        if !opts.flags.local {
            self.publish(ClusterMessage::Broadcast {
                request_id: None,
                opts: WireOptions::from(&opts),
                packet: bufs_to_wire(&bufs),
                with_ack: false,
            })
            .await;
        }
    }

    async fn broadcast_with_ack(
        &self,
        ack_id: u64,
        packet: &Packet,
        bufs: Vec<Buffer>,
        opts: BroadcastOptions,
        registry: &dyn SocketRegistry,
        on_response: Box<dyn Fn(AckResponse) + Send + Sync>,
    ) -> u64 {
        let on_response: Arc<dyn Fn(AckResponse) + Send + Sync> = Arc::from(on_response);
        let forward = on_response.clone();
        let local_sent = self
            .local
            .broadcast_with_ack(ack_id, packet, bufs.clone(), opts.clone(), registry, Box::new(move |resp| (forward.as_ref())(resp)))
            .await;

        if opts.flags.local {
            return local_sent;
        }

        let known_peers = self.membership.known_peers().await;
        if known_peers.is_empty() {
            return local_sent;
        }

        let request_id = ack_id.to_string();
        self.pending_on_response.lock().unwrap().insert(request_id.clone(), on_response);
        let client_count_rx = self.pending_client_counts.begin(request_id.clone(), known_peers);
        self.publish(ClusterMessage::Broadcast {
            request_id: Some(request_id.clone()),
            opts: WireOptions::from(&opts),
            packet: bufs_to_wire(&bufs),
            with_ack: true,
        })
        .await;

        let wait_bound = opts.flags.timeout.unwrap_or(self.request_timeout);
        let remote_clients: u64 = match tokio::time::timeout(wait_bound, client_count_rx).await {
            Ok(Ok(counts)) => counts.into_iter().sum(),
            _ => 0,
        };
        self.pending_on_response.lock().unwrap().remove(&request_id);
        local_sent + remote_clients
    }

    async fn resolve_broadcast_ack(&self, ack_id: u64, response: AckResponse) {
        self.local.resolve_broadcast_ack(ack_id, response).await;
    }

    async fn fetch_sockets(&self, opts: BroadcastOptions, registry: &dyn SocketRegistry) -> Vec<SocketDetails> {
        let mut results = self.local.fetch_sockets(opts.clone(), registry).await;
        if opts.flags.local {
            return results;
        }
        let known_peers = self.membership.known_peers().await;
        if known_peers.is_empty() {
            return results;
        }
        let request_id = self.pending_fetch.next_request_id();
        let rx = self.pending_fetch.begin(request_id.clone(), known_peers);
        self.publish(ClusterMessage::FetchSockets { request_id, opts: WireOptions::from(&opts) }).await;
        if let Ok(Ok(batches)) = tokio::time::timeout(self.request_timeout, rx).await {
            for batch in batches {
                results.extend(batch.into_iter().map(SocketDetails::from));
            }
        }
        results
    }

    async fn add_sockets(&self, opts: BroadcastOptions, rooms: Vec<Room>, registry: &dyn SocketRegistry) {
        self.local.add_sockets(opts.clone(), rooms.clone(), registry).await;
        if !opts.flags.local {
            self.publish(ClusterMessage::SocketsJoin { opts: WireOptions::from(&opts), rooms: rooms.into_iter().map(|r| r.0).collect() }).await;
        }
    }

    async fn del_sockets(&self, opts: BroadcastOptions, rooms: Vec<Room>, registry: &dyn SocketRegistry) {
        self.local.del_sockets(opts.clone(), rooms.clone(), registry).await;
        if !opts.flags.local {
            self.publish(ClusterMessage::SocketsLeave { opts: WireOptions::from(&opts), rooms: rooms.into_iter().map(|r| r.0).collect() }).await;
        }
    }

    async fn disconnect_sockets(&self, opts: BroadcastOptions, close: bool, registry: &dyn SocketRegistry) {
        self.local.disconnect_sockets(opts.clone(), close, registry).await;
        if !opts.flags.local {
            self.publish(ClusterMessage::DisconnectSockets { opts: WireOptions::from(&opts), close }).await;
        }
    }

    fn server_count(&self) -> u64 {
        1 + self.peer_count.load(Ordering::SeqCst)
    }

    async fn persist_session(&self, _session: Session) {}

    async fn restore_session(&self, _pid: &PrivateSessionId, _offset: Option<&Offset>) -> Option<RestoredSession> {
        None
    }
}

impl HeartbeatTimer {
    /// Tick granularity for the sweep loop: a fraction of the configured interval so a
    /// quiet period is detected promptly without busy-waiting.
    pub(crate) fn interval_for_ticking(&self) -> Duration {
        Duration::from_millis(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex as TokioMutex;

    /// An in-process, same-task pub/sub double: `publish` invokes every subscribed
    /// handler directly rather than round-tripping through a broker, so two
    /// `ClusterAdapter`s built over the same `LoopbackPubSub` behave like two servers on
    /// the same channel.
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

    fn test_config() -> ClusterConfig {
        ClusterConfig {
            peer_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            request_timeout: Duration::from_millis(500),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn peers_discover_each_other_via_initial_heartbeat() {
        let bus = LoopbackPubSub::default();
        let a = ClusterAdapter::new("/", Arc::new(bus.clone()), test_config()).await.unwrap();
        settle().await;
        let b = ClusterAdapter::new("/", Arc::new(bus.clone()), test_config()).await.unwrap();
        settle().await;

        assert_eq!(a.server_count(), 2);
        assert_eq!(b.server_count(), 2);
    }

    #[tokio::test]
    async fn self_originated_messages_are_discarded() {
        let bus = LoopbackPubSub::default();
        let a = ClusterAdapter::new("/", Arc::new(bus.clone()), test_config()).await.unwrap();
        settle().await;
        // Only the adapter itself subscribed; its own InitialHeartbeat must not register
        // itself as a peer.
        assert_eq!(a.server_count(), 1);
    }

    #[tokio::test]
    async fn adapter_close_removes_peer_and_credits_pending_requests() {
        let bus = LoopbackPubSub::default();
        let a = ClusterAdapter::new("/", Arc::new(bus.clone()), test_config()).await.unwrap();
        settle().await;
        let b = ClusterAdapter::new("/", Arc::new(bus.clone()), test_config()).await.unwrap();
        settle().await;
        assert_eq!(a.server_count(), 2);

        b.shutdown().await;
        settle().await;
        assert_eq!(a.server_count(), 1);
    }

    #[tokio::test]
    async fn server_side_emit_without_ack_does_not_block() {
        let bus = LoopbackPubSub::default();
        let a = ClusterAdapter::new("/", Arc::new(bus.clone()), test_config()).await.unwrap();
        settle().await;
        let b = ClusterAdapter::new("/", Arc::new(bus.clone()), test_config()).await.unwrap();
        settle().await;

        let received = Arc::new(StdMutex::new(Vec::new()));
        let received2 = received.clone();
        b.on_server_side_emit(move |event, _args| {
            received2.lock().unwrap().push(event.to_owned());
            vec![]
        });

        a.server_side_emit("ping", vec![], false).await.unwrap();
        settle().await;
        assert_eq!(received.lock().unwrap().as_slice(), ["ping"]);
    }

    #[tokio::test]
    async fn server_side_emit_with_ack_collects_peer_replies() {
        let bus = LoopbackPubSub::default();
        let a = ClusterAdapter::new("/", Arc::new(bus.clone()), test_config()).await.unwrap();
        settle().await;
        let b = ClusterAdapter::new("/", Arc::new(bus.clone()), test_config()).await.unwrap();
        settle().await;

        b.on_server_side_emit(|_event, _args| vec![Value::string("pong")]);

        let replies = a.server_side_emit("ping", vec![], true).await.unwrap();
        assert_eq!(replies, vec![Value::string("pong")]);
    }

    #[tokio::test]
    async fn server_side_emit_with_ack_times_out_on_silent_peer() {
        let bus = LoopbackPubSub::default();
        let a = ClusterAdapter::new("/", Arc::new(bus.clone()), test_config()).await.unwrap();
        settle().await;

        // A peer that announces itself once and then never answers anything again — unlike
        // a real `ClusterAdapter` it isn't subscribed to the channel at all, so it can never
        // send a `SERVER_SIDE_EMIT_RESPONSE`.
        let channel = "sio-cluster#/".to_owned();
        let hello = ClusterEnvelope {
            uid: "ghost-peer".to_owned(),
            nsp: "/".to_owned(),
            message: ClusterMessage::InitialHeartbeat,
        };
        bus.publish(&channel, hello.encode().unwrap()).await.unwrap();
        settle().await;
        assert_eq!(a.server_count(), 2);

        let result = a.server_side_emit("ping", vec![], true).await;
        assert!(matches!(result, Err(ClusterError::MissingResponses { .. })));
    }
}

//! Per-(connection, namespace) endpoint.
//!
//! Grounded on `examples/step-finance-socketioxide/socketioxide/src/socket.rs`'s
//! `ack_message`/`ack_counter`/`DisconnectReason` shape and on
//! `services/forwarder/src/uplink.rs`'s resend loop for the retry queue.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use sio_protocol::{encode, Buffer, Packet, Value};
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, warn};

use crate::adapter::{BroadcastTarget, SocketDetails};
use crate::broadcast::BroadcastOperator;
use crate::emitter::{EventEmitter, ListenerId};
use crate::error::{DisconnectError, DisconnectReason, RetryExhausted, SocketError, TimeoutError};
use crate::ids::{PrivateSessionId, Sid, SocketId};
use crate::namespace::Namespace;
use crate::room::Room;
use crate::session::Session;
use crate::transport::Transport;

pub type AckOutcome = Result<Vec<Value>, SocketError>;

/// A synchronous reply to an inbound, ack-requesting EVENT: a single registered-per-event
/// callback rather than an extractor-based handler, since listeners here are plain closures.
pub type AckResponder = Arc<dyn Fn(&[Value]) -> Vec<Value> + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_after: Duration,
}

struct QueuedItem {
    packet: Packet,
    ack_id: u64,
    tries: u32,
    user_ack: Option<oneshot::Sender<AckOutcome>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Connecting,
    Connected,
    Disconnected,
}

/// A per-(transport, namespace) endpoint. Holds a non-owning pointer back to its namespace
/// so namespace and socket can each be torn down without the other keeping it alive.
pub struct Socket {
    pub id: SocketId,
    pub sid: Sid,
    pub pid: Option<PrivateSessionId>,
    namespace: Weak<Namespace>,
    transport: Arc<dyn Transport>,
    emitter: EventEmitter,
    outgoing_emitter: EventEmitter,
    ack_message: Mutex<HashMap<u64, oneshot::Sender<AckOutcome>>>,
    ack_counter: AtomicU64,
    ack_responders: Mutex<HashMap<String, AckResponder>>,
    state: Mutex<ConnState>,
    pub data: RwLock<Option<Value>>,
    send_buffer: Mutex<Vec<Packet>>,
    retry_policy: Option<RetryPolicy>,
    retry_queue: Mutex<VecDeque<QueuedItem>>,
    self_weak: std::sync::OnceLock<Weak<Socket>>,
}

impl Socket {
    pub fn new(
        namespace: Weak<Namespace>,
        transport: Arc<dyn Transport>,
        retry_policy: Option<RetryPolicy>,
        recovery_enabled: bool,
    ) -> Arc<Self> {
        let id = SocketId::new();
        let socket = Arc::new(Socket {
            sid: Sid(id.0.clone()),
            pid: if recovery_enabled { Some(PrivateSessionId::new()) } else { None },
            id,
            namespace,
            transport,
            emitter: EventEmitter::new(),
            outgoing_emitter: EventEmitter::new(),
            ack_message: Mutex::new(HashMap::new()),
            ack_counter: AtomicU64::new(0),
            ack_responders: Mutex::new(HashMap::new()),
            state: Mutex::new(ConnState::Connecting),
            data: RwLock::new(None),
            send_buffer: Mutex::new(Vec::new()),
            retry_policy,
            retry_queue: Mutex::new(VecDeque::new()),
            self_weak: std::sync::OnceLock::new(),
        });
        let _ = socket.self_weak.set(Arc::downgrade(&socket));
        socket
    }

    pub fn is_connected(&self) -> bool {
        *self.state.lock().unwrap() == ConnState::Connected
    }

    fn namespace(&self) -> Option<Arc<Namespace>> {
        self.namespace.upgrade()
    }

    /// Called by `Namespace::add` once CONNECT has been written to the transport.
    pub async fn mark_connected(self: &Arc<Self>) {
        *self.state.lock().unwrap() = ConnState::Connected;
        let buffered: Vec<Packet> = std::mem::take(&mut *self.send_buffer.lock().unwrap());
        for packet in buffered {
            self.write_now(packet).await;
        }
    }

    pub fn on(&self, event: impl Into<String>, callback: impl Fn(&[Value]) + Send + Sync + 'static) -> ListenerId {
        self.emitter.on(event, callback)
    }

    pub fn once(&self, event: impl Into<String>, callback: impl Fn(&[Value]) + Send + Sync + 'static) -> ListenerId {
        self.emitter.once(event, callback)
    }

    /// Register the reply for an inbound, ack-requesting EVENT named `event`. Runs instead
    /// of the ordinary `on` listeners for that name whenever the peer's packet carries an
    /// ack id; ack-less emissions of the same name still reach `on`/`on_any`. At most one
    /// responder per event name; a later call replaces the prior.
    pub fn on_ack(&self, event: impl Into<String>, handler: impl Fn(&[Value]) -> Vec<Value> + Send + Sync + 'static) {
        self.ack_responders.lock().unwrap().insert(event.into(), Arc::new(handler));
    }

    pub fn off(&self, event: &str, id: ListenerId) {
        self.emitter.off(event, id);
    }

    pub fn on_any(&self, callback: impl Fn(&[Value]) + Send + Sync + 'static) -> ListenerId {
        self.emitter.on_any(callback)
    }

    pub fn off_any(&self, id: ListenerId) {
        self.emitter.off_any(id);
    }

    pub fn on_any_outgoing(&self, callback: impl Fn(&[Value]) + Send + Sync + 'static) -> ListenerId {
        self.outgoing_emitter.on_any(callback)
    }

    pub fn off_any_outgoing(&self, id: ListenerId) {
        self.outgoing_emitter.off_any(id);
    }

    pub async fn join(&self, rooms: Vec<Room>) {
        if let Some(ns) = self.namespace() {
            ns.adapter().add_all(self.id.clone(), rooms).await;
        }
    }

    pub async fn leave(&self, room: &Room) {
        if let Some(ns) = self.namespace() {
            ns.adapter().del(&self.id, room).await;
        }
    }

    /// Write an already-encoded buffer sequence straight to the transport, bypassing the
    /// send buffer/retry queue. Used by `Namespace::add` for the CONNECT ack and for
    /// replaying persisted packets on session recovery, both of which build their own
    /// `Packet` outside the normal `emit` path.
    pub(crate) async fn write_encoded(&self, bufs: Vec<Buffer>) -> Result<(), crate::transport::TransportError> {
        self.transport.write(bufs).await
    }

    pub fn rooms(&self) -> Vec<Room> {
        self.namespace()
            .map(|ns| ns.adapter().rooms_of(&self.id))
            .unwrap_or_default()
    }

    /// A broadcast operator pre-scoped to this socket's namespace, excluding this socket's
    /// own id-room unless `.broadcast()` is chained.
    pub fn to(&self, room: impl Into<Room>) -> BroadcastOperator {
        self.broadcast_operator().to(room.into())
    }

    pub fn except(&self, room: impl Into<Room>) -> BroadcastOperator {
        self.broadcast_operator().except(room.into())
    }

    pub fn volatile(&self) -> BroadcastOperator {
        self.broadcast_operator().volatile()
    }

    pub fn local(&self) -> BroadcastOperator {
        self.broadcast_operator().local()
    }

    pub fn timeout(&self, d: Duration) -> BroadcastOperator {
        self.broadcast_operator().timeout(d)
    }

    pub fn broadcast(&self) -> BroadcastOperator {
        self.broadcast_operator().broadcast()
    }

    fn broadcast_operator(&self) -> BroadcastOperator {
        let ns = self.namespace().expect("socket outlived its namespace");
        BroadcastOperator::new(ns).except(Room::new(self.id.0.clone()))
    }

    /// Fire-and-forget emit. Refuses reserved event names.
    pub async fn emit(self: &Arc<Self>, event: &str, args: Vec<Value>) -> Result<(), SocketError> {
        if sio_protocol::is_reserved_event(event) {
            return Err(SocketError::ReservedEvent(event.to_owned()));
        }
        let ns_name = self.namespace().map(|n| n.name().to_owned()).unwrap_or_else(|| "/".to_owned());
        let packet = Packet::event(ns_name, event, args).map_err(|e| SocketError::Protocol(e.into()))?;
        self.route(packet, None, None).await
    }

    /// Emit and wait for the peer's ack, or a `TimeoutError` if `timeout` elapses first.
    pub async fn emit_with_ack(
        self: &Arc<Self>,
        event: &str,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> Result<oneshot::Receiver<AckOutcome>, SocketError> {
        if sio_protocol::is_reserved_event(event) {
            return Err(SocketError::ReservedEvent(event.to_owned()));
        }
        let ack_id = self.ack_counter.fetch_add(1, Ordering::SeqCst);
        let ns_name = self.namespace().map(|n| n.name().to_owned()).unwrap_or_else(|| "/".to_owned());
        let packet = Packet::event_with_ack(ns_name, event, args, ack_id)
            .map_err(|e| SocketError::Protocol(e.into()))?;

        let (tx, rx) = oneshot::channel();
        self.route(packet.clone(), Some(ack_id), Some(tx)).await?;

        if let Some(dur) = timeout {
            let socket = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(dur).await;
                socket.fail_ack(ack_id, SocketError::Timeout(TimeoutError::Ack));
            });
        }
        Ok(rx)
    }

    /// Route a packet built by `emit`/`emit_with_ack`. With a retry policy configured, every
    /// such packet (not just ack-carrying ones) is enqueued for guaranteed delivery instead
    /// of being written directly; a fire-and-forget `emit()` gets a synthetic ack id for
    /// queue bookkeeping and a no-op ack slot, since there is no caller-side oneshot to
    /// resolve. Packets resent from the queue go straight through `write_now` and never
    /// re-enter `route`, so this can't re-enqueue its own retries.
    async fn route(
        self: &Arc<Self>,
        mut packet: Packet,
        ack_id: Option<u64>,
        user_ack: Option<oneshot::Sender<AckOutcome>>,
    ) -> Result<(), SocketError> {
        if let Some(policy) = self.retry_policy {
            let queue_id = ack_id.unwrap_or_else(|| self.ack_counter.fetch_add(1, Ordering::SeqCst));
            packet.ack_id = Some(queue_id);
            let was_empty = {
                let mut q = self.retry_queue.lock().unwrap();
                let was_empty = q.is_empty();
                q.push_back(QueuedItem {
                    packet,
                    ack_id: queue_id,
                    tries: 0,
                    user_ack,
                });
                was_empty
            };
            if was_empty {
                self.clone().send_retry_head(policy).await;
            }
            return Ok(());
        }

        if let (Some(id), Some(tx)) = (ack_id, user_ack) {
            self.ack_message.lock().unwrap().insert(id, tx);
        }

        if !self.is_connected() {
            self.send_buffer.lock().unwrap().push(packet);
            return Ok(());
        }

        self.write_now(packet).await;
        Ok(())
    }

    async fn write_now(&self, packet: Packet) {
        if let Some(name) = packet.event_name() {
            let args = match packet.payload.as_array() {
                Some(items) if items.len() > 1 => &items[1..],
                _ => &[][..],
            };
            self.outgoing_emitter.emit_outgoing(name, args);
        }
        match encode(&packet) {
            Ok(bufs) => {
                if let Err(e) = self.transport.write(bufs).await {
                    warn!(socket = %self.id, error = %e, "write failed");
                }
            }
            Err(e) => warn!(socket = %self.id, error = %e, "failed to encode outgoing packet"),
        }
    }

    fn send_retry_head(
        self: Arc<Self>,
        policy: RetryPolicy,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            let packet = {
                let q = self.retry_queue.lock().unwrap();
                q.front().map(|item| (item.packet.clone(), item.ack_id))
            };
            let Some((packet, ack_id)) = packet else {
                return;
            };
            self.write_now(packet).await;
            let socket = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(policy.retry_after).await;
                socket.retry_tick(ack_id, policy).await;
            });
        })
    }

    fn retry_tick(
        self: Arc<Self>,
        ack_id: u64,
        policy: RetryPolicy,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            let action = {
                let mut q = self.retry_queue.lock().unwrap();
                let head_matches = q.front().map(|item| item.ack_id) == Some(ack_id);
                if !head_matches {
                    RetryAction::AlreadyResolved
                } else {
                    let exceeded = {
                        let item = q.front_mut().unwrap();
                        item.tries += 1;
                        item.tries > policy.max_retries
                    };
                    if exceeded {
                        RetryAction::Discard(q.pop_front().unwrap().user_ack)
                    } else {
                        RetryAction::Resend
                    }
                }
            };
            match action {
                RetryAction::Resend => self.send_retry_head(policy).await,
                RetryAction::Discard(user_ack) => {
                    if let Some(tx) = user_ack {
                        let _ = tx.send(Err(SocketError::RetryExhausted(RetryExhausted)));
                    }
                    self.clone().send_retry_head(policy).await;
                }
                RetryAction::AlreadyResolved => {}
            }
        })
    }

    /// Invoked when an ACK/BINARY_ACK packet addressed to this socket arrives.
    pub fn handle_ack(self: &Arc<Self>, ack_id: u64, args: Vec<Value>) {
        let is_retry_head = {
            let mut q = self.retry_queue.lock().unwrap();
            let head_matches = q.front().map(|item| item.ack_id) == Some(ack_id);
            if head_matches {
                Some(q.pop_front().unwrap().user_ack)
            } else {
                None
            }
        };
        if let Some(user_ack) = is_retry_head {
            if let Some(tx) = user_ack {
                let _ = tx.send(Ok(args));
            }
            if let Some(policy) = self.retry_policy {
                let socket = self.clone();
                tokio::spawn(async move { socket.send_retry_head(policy).await });
            }
            return;
        }
        if let Some(tx) = self.ack_message.lock().unwrap().remove(&ack_id) {
            let _ = tx.send(Ok(args));
        } else if let Some(ns) = self.namespace() {
            let response = crate::adapter::AckResponse {
                socket_id: self.id.clone(),
                args,
            };
            let adapter = ns.adapter();
            tokio::spawn(async move {
                adapter.resolve_broadcast_ack(ack_id, response).await;
            });
        }
    }

    /// Route a packet decoded off this socket's transport to the right local handler,
    /// extending the emitter's delegation out to the wire boundary a transport-owning
    /// caller sits at. EVENT/BINARY_EVENT with no ack id, or naming an event with no
    /// registered `on_ack` responder, fan out to `on`/`onAny` listeners; one naming an event
    /// with a responder instead runs that responder and writes its return value back as
    /// ACK/BINARY_ACK. Inbound ACK/BINARY_ACK resolve a pending `emit_with_ack` or forward to
    /// the adapter for a broadcast ack; DISCONNECT runs local close handlers without touching
    /// the transport (the peer already closed its side).
    pub fn dispatch_incoming(self: &Arc<Self>, packet: Packet) {
        match packet.packet_type {
            sio_protocol::PacketType::Event | sio_protocol::PacketType::BinaryEvent => {
                let Value::Array(items) = &packet.payload else {
                    return;
                };
                let Some(name) = items.first().and_then(Value::as_str) else {
                    return;
                };
                let args = items[1..].to_vec();
                let responder = packet.ack_id.and_then(|_| self.ack_responders.lock().unwrap().get(name).cloned());
                match (responder, packet.ack_id) {
                    (Some(responder), Some(ack_id)) => {
                        let reply = (responder.as_ref())(&args);
                        let ns_name = self.namespace().map(|n| n.name().to_owned()).unwrap_or_else(|| "/".to_owned());
                        let socket = self.clone();
                        tokio::spawn(async move {
                            socket.write_now(Packet::ack(ns_name, ack_id, reply)).await;
                        });
                    }
                    _ => self.emitter.emit(name, &args),
                }
            }
            sio_protocol::PacketType::Ack | sio_protocol::PacketType::BinaryAck => {
                let Some(ack_id) = packet.ack_id else {
                    return;
                };
                let args = match packet.payload {
                    Value::Array(items) => items,
                    other => vec![other],
                };
                self.handle_ack(ack_id, args);
            }
            sio_protocol::PacketType::Disconnect => {
                let socket = self.clone();
                tokio::spawn(async move { socket.on_close(DisconnectReason::ClientNamespaceDisconnect).await });
            }
            sio_protocol::PacketType::Connect | sio_protocol::PacketType::ConnectError => {}
        }
    }

    fn fail_ack(&self, ack_id: u64, err: SocketError) {
        if let Some(tx) = self.ack_message.lock().unwrap().remove(&ack_id) {
            let _ = tx.send(Err(err));
        }
    }

    pub async fn disconnect(self: &Arc<Self>, close: bool, reason: DisconnectReason) {
        if close {
            self.transport.close(false).await;
        } else {
            self.write_now(Packet::disconnect(
                self.namespace().map(|n| n.name().to_owned()).unwrap_or_else(|| "/".to_owned()),
            ))
            .await;
        }
        self.on_close(reason).await;
    }

    /// Tear down: resolve every outstanding ack exactly once, leave every room, persist a
    /// session if recovery is enabled, and emit `disconnect` locally.
    pub async fn on_close(self: &Arc<Self>, reason: DisconnectReason) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == ConnState::Disconnected {
                return;
            }
            *state = ConnState::Disconnected;
        }

        let pending: Vec<oneshot::Sender<AckOutcome>> = self.ack_message.lock().unwrap().drain().map(|(_, v)| v).collect();
        for tx in pending {
            let _ = tx.send(Err(SocketError::Disconnected(DisconnectError { reason })));
        }
        let queued: Vec<QueuedItem> = self.retry_queue.lock().unwrap().drain(..).collect();
        for item in queued {
            if let Some(tx) = item.user_ack {
                let _ = tx.send(Err(SocketError::Disconnected(DisconnectError { reason })));
            }
        }

        if let Some(ns) = self.namespace() {
            let adapter = ns.adapter();
            if let Some(pid) = &self.pid {
                let session = Session {
                    sid: self.sid.clone(),
                    pid: pid.clone(),
                    rooms: adapter.rooms_of(&self.id),
                    data: self.data.read().await.clone(),
                };
                adapter.persist_session(session).await;
            }
            adapter.del_all(&self.id).await;
            ns.remove_socket(&self.id).await;
            self.emitter.emit("disconnecting", &[Value::string(reason.to_string())]);
        }
        debug!(socket = %self.id, reason = %reason, "socket closed");
        self.emitter.emit("disconnect", &[Value::string(reason.to_string())]);
    }
}

enum RetryAction {
    Resend,
    Discard(Option<oneshot::Sender<AckOutcome>>),
    AlreadyResolved,
}

#[async_trait]
impl BroadcastTarget for Socket {
    fn id(&self) -> &SocketId {
        &self.id
    }

    async fn deliver(&self, bufs: Arc<Vec<Buffer>>, volatile: bool) {
        if !self.is_connected() {
            return;
        }
        if volatile && !self.transport.is_writable() {
            debug!(socket = %self.id, "dropping volatile broadcast: transport not writable");
            return;
        }
        if let Err(e) = self.transport.write((*bufs).clone()).await {
            warn!(socket = %self.id, error = %e, "broadcast delivery failed");
        }
    }

    fn outgoing_emitter(&self) -> &EventEmitter {
        &self.outgoing_emitter
    }

    fn public_details(&self) -> SocketDetails {
        SocketDetails {
            id: self.id.clone(),
            rooms: self.rooms(),
            data: self.data.try_read().ok().and_then(|d| d.clone()),
        }
    }

    async fn close(&self, reason: DisconnectReason, close_transport: bool) {
        if let Some(strong) = self.self_weak.get().and_then(Weak::upgrade) {
            strong.disconnect(close_transport, reason).await;
        }
    }
}

//! The local, single-process adapter and the `Adapter` capability-set trait dispatched over
//! dynamically at runtime, so local, session-aware, and cluster adapters are interchangeable
//! behind one `Arc<dyn Adapter>`.
//!
//! The room↔socket maps live here, owned by the adapter; the actual `Socket` objects live
//! in the owning `Namespace`'s map, avoiding a cyclic ownership between the two. To deliver
//! a broadcast the adapter is handed a `&dyn SocketRegistry` by its caller rather than
//! owning the socket map itself, so this crate never has to choose between `Adapter` owning
//! `Socket` or `Socket` owning `Adapter`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sio_protocol::{Buffer, Packet, Value};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::emitter::EventEmitter;
use crate::error::DisconnectReason;
use crate::ids::{Offset, PrivateSessionId, SocketId};
use crate::room::{BroadcastOptions, Room};
use crate::session::{RestoredSession, Session};

/// The minimum a broadcast needs from a socket: where to write, and its outgoing-any
/// listener set. Implemented by `crate::socket::Socket`.
#[async_trait]
pub trait BroadcastTarget: Send + Sync {
    fn id(&self) -> &SocketId;
    /// `volatile` is `opts.flags.volatile` from the originating `BroadcastOptions`: if the
    /// underlying transport is backpressured or closed, a volatile delivery drops silently
    /// instead of attempting (and logging the failure of) the write.
    async fn deliver(&self, bufs: Arc<Vec<Buffer>>, volatile: bool);
    fn outgoing_emitter(&self) -> &EventEmitter;
    fn public_details(&self) -> SocketDetails;
    /// Force-disconnect, as from `disconnect_sockets`/`BroadcastOperator::disconnect`.
    async fn close(&self, reason: DisconnectReason, close_transport: bool);
}

/// Read access to a namespace's live socket map, without the adapter owning it.
pub trait SocketRegistry: Send + Sync {
    fn get(&self, id: &SocketId) -> Option<Arc<dyn BroadcastTarget>>;
    fn all_ids(&self) -> Vec<SocketId>;
}

/// The serialisable subset of a socket returned by `fetchSockets`.
#[derive(Debug, Clone)]
pub struct SocketDetails {
    pub id: SocketId,
    pub rooms: Vec<Room>,
    pub data: Option<Value>,
}

/// One reply collected by a `broadcast_with_ack` call.
#[derive(Debug, Clone)]
pub struct AckResponse {
    pub socket_id: SocketId,
    pub args: Vec<Value>,
}

struct PendingBroadcastAck {
    remaining: HashSet<SocketId>,
    on_response: Box<dyn Fn(AckResponse) + Send + Sync>,
}

/// The shared capability set: local, session-aware, and cluster adapters all implement this
/// one trait. Session-recovery and cluster-propagation hooks default to no-ops so
/// `LocalAdapter` does not need to know about them.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn add_all(&self, id: SocketId, rooms: Vec<Room>);
    async fn del(&self, id: &SocketId, room: &Room);
    async fn del_all(&self, id: &SocketId);
    fn rooms_of(&self, id: &SocketId) -> Vec<Room>;

    /// Allocate the next ack id for a fan-out `broadcast_with_ack` call.
    fn next_broadcast_ack_id(&self) -> u64;

    /// `packet` is the decoded packet (kept alongside the encoded `bufs` so a session-aware
    /// adapter can persist EVENT packets for later replay without re-decoding them).
    async fn broadcast(&self, packet: &Packet, bufs: Vec<Buffer>, opts: BroadcastOptions, registry: &dyn SocketRegistry);

    /// Register a fan-out ack: `on_response` is invoked once per responding socket, in
    /// arrival order; returns the number of sockets the packet was actually sent to so the
    /// caller can decide when all expected responses are in.
    #[allow(clippy::too_many_arguments)]
    async fn broadcast_with_ack(
        &self,
        ack_id: u64,
        packet: &Packet,
        bufs: Vec<Buffer>,
        opts: BroadcastOptions,
        registry: &dyn SocketRegistry,
        on_response: Box<dyn Fn(AckResponse) + Send + Sync>,
    ) -> u64;

    /// Route an inbound ACK/BINARY_ACK packet that did not match a socket's own
    /// single-target ack map to a pending fan-out ack, if any.
    async fn resolve_broadcast_ack(&self, ack_id: u64, response: AckResponse);

    async fn fetch_sockets(&self, opts: BroadcastOptions, registry: &dyn SocketRegistry) -> Vec<SocketDetails>;
    async fn add_sockets(&self, opts: BroadcastOptions, rooms: Vec<Room>, registry: &dyn SocketRegistry);
    async fn del_sockets(&self, opts: BroadcastOptions, rooms: Vec<Room>, registry: &dyn SocketRegistry);
    async fn disconnect_sockets(&self, opts: BroadcastOptions, close: bool, registry: &dyn SocketRegistry);

    fn server_count(&self) -> u64 {
        1
    }

    async fn persist_session(&self, _session: Session) {}
    async fn restore_session(
        &self,
        _pid: &PrivateSessionId,
        _offset: Option<&Offset>,
    ) -> Option<RestoredSession> {
        None
    }
}

/// The single-process adapter: the `rooms`/`sids` bidirectional index plus fan-out
/// delivery, with no cluster awareness.
#[derive(Default)]
pub struct LocalAdapter {
    rooms: RwLock<HashMap<Room, HashSet<SocketId>>>,
    sids: RwLock<HashMap<SocketId, HashSet<Room>>>,
    pending_acks: RwLock<HashMap<u64, PendingBroadcastAck>>,
    next_ack_id: AtomicU64,
}

impl LocalAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the set of target socket ids for `opts`: union of `opts.rooms` (or every
    /// known socket if `rooms` is empty) minus the union of `opts.except`.
    async fn targets(&self, opts: &BroadcastOptions, registry: &dyn SocketRegistry) -> HashSet<SocketId> {
        let rooms = self.rooms.read().await;
        let except_ids: HashSet<SocketId> = opts
            .except
            .iter()
            .flat_map(|r| rooms.get(r).cloned().unwrap_or_default())
            .collect();

        let included: HashSet<SocketId> = if opts.rooms.is_empty() {
            registry.all_ids().into_iter().collect()
        } else {
            opts.rooms
                .iter()
                .flat_map(|r| rooms.get(r).cloned().unwrap_or_default())
                .collect()
        };

        included.difference(&except_ids).cloned().collect()
    }
}

#[async_trait]
impl Adapter for LocalAdapter {
    async fn add_all(&self, id: SocketId, rooms_to_join: Vec<Room>) {
        let mut rooms = self.rooms.write().await;
        let mut sids = self.sids.write().await;
        let sid_rooms = sids.entry(id.clone()).or_default();
        for room in rooms_to_join {
            let members = rooms.entry(room.clone()).or_insert_with(|| {
                debug!(room = %room, "create-room");
                HashSet::new()
            });
            let first_add = members.insert(id.clone());
            if first_add {
                sid_rooms.insert(room.clone());
                trace!(socket = %id, room = %room, "join-room");
            }
        }
    }

    async fn del(&self, id: &SocketId, room: &Room) {
        let mut rooms = self.rooms.write().await;
        let mut sids = self.sids.write().await;
        let mut emptied = false;
        if let Some(members) = rooms.get_mut(room) {
            if members.remove(id) {
                trace!(socket = %id, room = %room, "leave-room");
            }
            emptied = members.is_empty();
        }
        if emptied {
            rooms.remove(room);
            debug!(room = %room, "delete-room");
        }
        if let Some(sid_rooms) = sids.get_mut(id) {
            sid_rooms.remove(room);
        }
    }

    async fn del_all(&self, id: &SocketId) {
        let room_list: Vec<Room> = self
            .sids
            .read()
            .await
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        for room in room_list {
            self.del(id, &room).await;
        }
        self.sids.write().await.remove(id);
    }

    fn rooms_of(&self, id: &SocketId) -> Vec<Room> {
        self.sids
            .try_read()
            .map(|sids| sids.get(id).map(|s| s.iter().cloned().collect()).unwrap_or_default())
            .unwrap_or_default()
    }

    fn next_broadcast_ack_id(&self) -> u64 {
        self.next_ack_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn broadcast(&self, _packet: &Packet, bufs: Vec<Buffer>, opts: BroadcastOptions, registry: &dyn SocketRegistry) {
        let targets = self.targets(&opts, registry).await;
        let bufs = Arc::new(bufs);
        for id in targets {
            if let Some(socket) = registry.get(&id) {
                socket.outgoing_emitter().emit_outgoing("broadcast", &[]);
                socket.deliver(bufs.clone(), opts.flags.volatile).await;
            }
        }
    }

    async fn broadcast_with_ack(
        &self,
        ack_id: u64,
        _packet: &Packet,
        bufs: Vec<Buffer>,
        opts: BroadcastOptions,
        registry: &dyn SocketRegistry,
        on_response: Box<dyn Fn(AckResponse) + Send + Sync>,
    ) -> u64 {
        let targets = self.targets(&opts, registry).await;
        self.pending_acks.write().await.insert(
            ack_id,
            PendingBroadcastAck {
                remaining: targets.clone(),
                on_response,
            },
        );
        let bufs = Arc::new(bufs);
        let mut sent = 0u64;
        for id in &targets {
            if let Some(socket) = registry.get(id) {
                socket.deliver(bufs.clone(), opts.flags.volatile).await;
                sent += 1;
            }
        }
        sent
    }

    async fn resolve_broadcast_ack(&self, ack_id: u64, response: AckResponse) {
        let mut pending = self.pending_acks.write().await;
        let done = if let Some(entry) = pending.get_mut(&ack_id) {
            entry.remaining.remove(&response.socket_id);
            (entry.on_response)(response);
            entry.remaining.is_empty()
        } else {
            false
        };
        if done {
            pending.remove(&ack_id);
        }
    }

    async fn fetch_sockets(&self, opts: BroadcastOptions, registry: &dyn SocketRegistry) -> Vec<SocketDetails> {
        let targets = self.targets(&opts, registry).await;
        targets
            .into_iter()
            .filter_map(|id| registry.get(&id).map(|s| s.public_details()))
            .collect()
    }

    async fn add_sockets(&self, opts: BroadcastOptions, rooms: Vec<Room>, registry: &dyn SocketRegistry) {
        let targets = self.targets(&opts, registry).await;
        for id in targets {
            self.add_all(id, rooms.clone()).await;
        }
    }

    async fn del_sockets(&self, opts: BroadcastOptions, rooms: Vec<Room>, registry: &dyn SocketRegistry) {
        let targets = self.targets(&opts, registry).await;
        for id in targets {
            for room in &rooms {
                self.del(&id, room).await;
            }
        }
    }

    async fn disconnect_sockets(&self, opts: BroadcastOptions, close: bool, registry: &dyn SocketRegistry) {
        let targets = self.targets(&opts, registry).await;
        for id in targets {
            if let Some(socket) = registry.get(&id) {
                socket.close(crate::error::DisconnectReason::IoServerDisconnect, close).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeSocket {
        id: SocketId,
        emitter: EventEmitter,
        received: Arc<Mutex<Vec<()>>>,
    }

    #[async_trait]
    impl BroadcastTarget for FakeSocket {
        fn id(&self) -> &SocketId {
            &self.id
        }
        async fn deliver(&self, _bufs: Arc<Vec<Buffer>>, _volatile: bool) {
            self.received.lock().unwrap().push(());
        }
        fn outgoing_emitter(&self) -> &EventEmitter {
            &self.emitter
        }
        fn public_details(&self) -> SocketDetails {
            SocketDetails {
                id: self.id.clone(),
                rooms: vec![],
                data: None,
            }
        }
        async fn close(&self, _reason: crate::error::DisconnectReason, _close_transport: bool) {}
    }

    struct FakeRegistry(HashMap<SocketId, Arc<dyn BroadcastTarget>>);

    impl SocketRegistry for FakeRegistry {
        fn get(&self, id: &SocketId) -> Option<Arc<dyn BroadcastTarget>> {
            self.0.get(id).cloned()
        }
        fn all_ids(&self) -> Vec<SocketId> {
            self.0.keys().cloned().collect()
        }
    }

    fn make_socket() -> (SocketId, Arc<FakeSocket>, Arc<Mutex<Vec<()>>>) {
        let id = SocketId::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let socket = Arc::new(FakeSocket {
            id: id.clone(),
            emitter: EventEmitter::new(),
            received: received.clone(),
        });
        (id, socket, received)
    }

    #[tokio::test]
    async fn index_consistency_holds_after_join_and_leave() {
        let adapter = LocalAdapter::new();
        let id = SocketId::new();
        adapter.add_all(id.clone(), vec![Room::new("r1"), Room::new("r2")]).await;
        assert_eq!(adapter.rooms_of(&id).len(), 2);
        assert!(adapter.rooms.read().await.get(&Room::new("r1")).unwrap().contains(&id));

        adapter.del(&id, &Room::new("r1")).await;
        assert!(!adapter.rooms.read().await.contains_key(&Room::new("r1")));
        assert!(!adapter.sids.read().await.get(&id).unwrap().contains(&Room::new("r1")));
    }

    #[tokio::test]
    async fn empty_room_is_purged() {
        let adapter = LocalAdapter::new();
        let id = SocketId::new();
        adapter.add_all(id.clone(), vec![Room::new("solo")]).await;
        adapter.del(&id, &Room::new("solo")).await;
        assert!(!adapter.rooms.read().await.contains_key(&Room::new("solo")));
    }

    #[tokio::test]
    async fn broadcast_delivers_to_room_members_only() {
        let adapter = LocalAdapter::new();
        let (id1, s1, r1) = make_socket();
        let (id2, s2, r2) = make_socket();
        let (id3, s3, r3) = make_socket();
        let mut map: HashMap<SocketId, Arc<dyn BroadcastTarget>> = HashMap::new();
        map.insert(id1.clone(), s1);
        map.insert(id2.clone(), s2);
        map.insert(id3.clone(), s3);
        let registry = FakeRegistry(map);

        adapter.add_all(id1.clone(), vec![Room::new("r")]).await;
        adapter.add_all(id2.clone(), vec![Room::new("r")]).await;

        let mut opts = BroadcastOptions::new();
        opts.rooms.insert(Room::new("r"));
        let packet = sio_protocol::Packet::event("/", "msg", vec![]).unwrap();
        adapter.broadcast(&packet, vec![], opts, &registry).await;

        assert_eq!(r1.lock().unwrap().len(), 1);
        assert_eq!(r2.lock().unwrap().len(), 1);
        assert_eq!(r3.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn broadcast_with_ack_resolves_per_responder() {
        let adapter = LocalAdapter::new();
        let (id1, s1, _) = make_socket();
        let mut map: HashMap<SocketId, Arc<dyn BroadcastTarget>> = HashMap::new();
        map.insert(id1.clone(), s1);
        let registry = FakeRegistry(map);

        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = received.clone();
        let ack_id = adapter.next_broadcast_ack_id();
        let packet = sio_protocol::Packet::event("/", "msg", vec![]).unwrap();
        let sent = adapter
            .broadcast_with_ack(
                ack_id,
                &packet,
                vec![],
                BroadcastOptions::new(),
                &registry,
                Box::new(move |resp| received2.lock().unwrap().push(resp.args)),
            )
            .await;
        assert_eq!(sent, 1);

        adapter
            .resolve_broadcast_ack(
                ack_id,
                AckResponse {
                    socket_id: id1,
                    args: vec![Value::string("ok")],
                },
            )
            .await;
        assert_eq!(received.lock().unwrap().len(), 1);
        assert!(adapter.pending_acks.read().await.is_empty());
    }
}

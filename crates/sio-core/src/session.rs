//! Connection-state recovery.
//!
//! `SessionStore` is the persistence layer; `SessionAwareAdapter` is the `Adapter`
//! implementation that layers it on top of a `LocalAdapter` by composition, holding an
//! explicit pointer back to the adapter it wraps rather than through inheritance.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sio_protocol::{Buffer, Packet, PacketType, Value};
use tokio::sync::RwLock;

use crate::adapter::{Adapter, AckResponse, SocketDetails, SocketRegistry};
use crate::ids::{Offset, OffsetGenerator, PrivateSessionId, Sid};
use crate::room::{BroadcastOptions, Room};

#[derive(Debug, Clone)]
pub struct Session {
    pub sid: Sid,
    pub pid: PrivateSessionId,
    pub rooms: Vec<Room>,
    pub data: Option<Value>,
}

/// A broadcast EVENT packet retained for replay, addressable by its opaque offset.
#[derive(Debug, Clone)]
pub struct PersistedPacket {
    pub offset: Offset,
    pub emitted_at: Instant,
    pub opts: BroadcastOptions,
    pub payload: Packet,
}

#[derive(Debug, Clone)]
pub struct RestoredSession {
    pub session: Session,
    pub missed_packets: Vec<PersistedPacket>,
}

struct StoredSession {
    session: Session,
    disconnected_at: Instant,
}

/// Persists sessions by private id and EVENT packets by offset, for replay-on-reconnect.
pub struct SessionStore {
    max_disconnection_duration: Duration,
    sessions: RwLock<HashMap<PrivateSessionId, StoredSession>>,
    persisted: RwLock<BTreeMap<Offset, PersistedPacket>>,
    offsets: OffsetGenerator,
}

impl SessionStore {
    pub fn new(max_disconnection_duration: Duration) -> Self {
        SessionStore {
            max_disconnection_duration,
            sessions: RwLock::new(HashMap::new()),
            persisted: RwLock::new(BTreeMap::new()),
            offsets: OffsetGenerator::new(),
        }
    }

    pub async fn persist_session(&self, session: Session) {
        self.sessions.write().await.insert(
            session.pid.clone(),
            StoredSession {
                session,
                disconnected_at: Instant::now(),
            },
        );
    }

    /// Record an EVENT packet for later replay; returns the offset it was stored under.
    pub async fn persist_packet(&self, opts: BroadcastOptions, payload: Packet) -> Offset {
        let offset = self.offsets.next();
        self.persisted.write().await.insert(
            offset.clone(),
            PersistedPacket {
                offset: offset.clone(),
                emitted_at: Instant::now(),
                opts,
                payload,
            },
        );
        offset
    }

    /// Returns the stored session plus every persisted packet with an offset strictly
    /// greater than `offset`, in ascending order, or `None` if `pid` is unknown or the
    /// session has expired.
    pub async fn restore_session(
        &self,
        pid: &PrivateSessionId,
        offset: Option<&Offset>,
    ) -> Option<RestoredSession> {
        let stored = {
            let sessions = self.sessions.read().await;
            let entry = sessions.get(pid)?;
            if entry.disconnected_at.elapsed() > self.max_disconnection_duration {
                return None;
            }
            entry.session.clone()
        };
        self.sessions.write().await.remove(pid);

        let persisted = self.persisted.read().await;
        let missed_packets = match offset {
            Some(offset) => persisted
                .range((
                    std::ops::Bound::Excluded(offset.clone()),
                    std::ops::Bound::Unbounded,
                ))
                .map(|(_, v)| v.clone())
                .collect(),
            None => persisted.values().cloned().collect(),
        };

        Some(RestoredSession {
            session: stored,
            missed_packets,
        })
    }

    /// Periodic sweep dropping sessions and persisted packets past the disconnection
    /// window.
    pub async fn sweep_expired(&self) {
        let max = self.max_disconnection_duration;
        self.sessions
            .write()
            .await
            .retain(|_, s| s.disconnected_at.elapsed() <= max);
        self.persisted
            .write()
            .await
            .retain(|_, p| p.emitted_at.elapsed() <= max);
    }
}

/// Wraps a `LocalAdapter` ("super" pointer) and a `SessionStore`, intercepting `broadcast`
/// to persist EVENT packets and adding `persist_session`/`restore_session`.
pub struct SessionAwareAdapter {
    inner: Arc<crate::adapter::LocalAdapter>,
    store: Arc<SessionStore>,
}

impl SessionAwareAdapter {
    pub fn new(inner: Arc<crate::adapter::LocalAdapter>, store: Arc<SessionStore>) -> Self {
        SessionAwareAdapter { inner, store }
    }
}

#[async_trait]
impl Adapter for SessionAwareAdapter {
    async fn add_all(&self, id: crate::ids::SocketId, rooms: Vec<Room>) {
        self.inner.add_all(id, rooms).await;
    }

    async fn del(&self, id: &crate::ids::SocketId, room: &Room) {
        self.inner.del(id, room).await;
    }

    async fn del_all(&self, id: &crate::ids::SocketId) {
        self.inner.del_all(id).await;
    }

    fn rooms_of(&self, id: &crate::ids::SocketId) -> Vec<Room> {
        self.inner.rooms_of(id)
    }

    fn next_broadcast_ack_id(&self) -> u64 {
        self.inner.next_broadcast_ack_id()
    }

    async fn broadcast(&self, packet: &Packet, bufs: Vec<Buffer>, opts: BroadcastOptions, registry: &dyn SocketRegistry) {
        if matches!(packet.packet_type, PacketType::Event | PacketType::BinaryEvent) {
            self.store.persist_packet(opts.clone(), packet.clone()).await;
        }
        self.inner.broadcast(packet, bufs, opts, registry).await;
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
        self.inner
            .broadcast_with_ack(ack_id, packet, bufs, opts, registry, on_response)
            .await
    }

    async fn resolve_broadcast_ack(&self, ack_id: u64, response: AckResponse) {
        self.inner.resolve_broadcast_ack(ack_id, response).await;
    }

    async fn fetch_sockets(&self, opts: BroadcastOptions, registry: &dyn SocketRegistry) -> Vec<SocketDetails> {
        self.inner.fetch_sockets(opts, registry).await
    }

    async fn add_sockets(&self, opts: BroadcastOptions, rooms: Vec<Room>, registry: &dyn SocketRegistry) {
        self.inner.add_sockets(opts, rooms, registry).await;
    }

    async fn del_sockets(&self, opts: BroadcastOptions, rooms: Vec<Room>, registry: &dyn SocketRegistry) {
        self.inner.del_sockets(opts, rooms, registry).await;
    }

    async fn disconnect_sockets(&self, opts: BroadcastOptions, close: bool, registry: &dyn SocketRegistry) {
        self.inner.disconnect_sockets(opts, close, registry).await;
    }

    fn server_count(&self) -> u64 {
        self.inner.server_count()
    }

    async fn persist_session(&self, session: Session) {
        self.store.persist_session(session).await;
    }

    async fn restore_session(&self, pid: &PrivateSessionId, offset: Option<&Offset>) -> Option<RestoredSession> {
        self.store.restore_session(pid, offset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session() -> Session {
        Session {
            sid: Sid::new(),
            pid: PrivateSessionId::new(),
            rooms: vec![Room::new("r1")],
            data: None,
        }
    }

    #[tokio::test]
    async fn restore_unknown_pid_returns_none() {
        let store = SessionStore::new(Duration::from_secs(60));
        assert!(store.restore_session(&PrivateSessionId::new(), None).await.is_none());
    }

    #[tokio::test]
    async fn restore_after_expiry_returns_none() {
        let store = SessionStore::new(Duration::from_millis(10));
        let session = make_session();
        let pid = session.pid.clone();
        store.persist_session(session).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.restore_session(&pid, None).await.is_none());
    }

    #[tokio::test]
    async fn restore_replays_packets_after_offset_in_ascending_order() {
        let store = SessionStore::new(Duration::from_secs(60));
        let session = make_session();
        let pid = session.pid.clone();

        let p1 = Packet::event("/", "a", vec![]).unwrap();
        let o1 = store.persist_packet(BroadcastOptions::new(), p1).await;
        let p2 = Packet::event("/", "b", vec![]).unwrap();
        store.persist_packet(BroadcastOptions::new(), p2).await;

        store.persist_session(session).await;
        let restored = store.restore_session(&pid, Some(&o1)).await.unwrap();
        assert_eq!(restored.missed_packets.len(), 1);
        assert_eq!(restored.missed_packets[0].payload.event_name(), Some("b"));
    }
}

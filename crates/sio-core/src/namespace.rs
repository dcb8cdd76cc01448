//! A named endpoint grouping sockets under one adapter. Grounded on
//! `examples/step-finance-socketioxide/socketioxide/src/ns.rs`'s `Arc<Namespace<A>>`
//! ownership shape: a namespace owns its adapter and socket map outright, while each
//! `Socket` only holds a `Weak` pointer back.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use sio_protocol::{encode, Packet, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::adapter::{Adapter, BroadcastTarget, SocketRegistry};
use crate::error::AdmissionError;
use crate::ids::{Offset, PrivateSessionId, SocketId};
use crate::room::Room;
use crate::socket::{RetryPolicy, Socket};
use crate::transport::Transport;

/// Runs during admission, before a socket is registered. Returning `Err` aborts the
/// connection with a CONNECT_ERROR carrying the error's message/data.
pub type Middleware = Arc<dyn Fn(Arc<Socket>, Value) -> BoxFuture<'static, Result<(), AdmissionError>> + Send + Sync>;

type ConnectionHandler = Arc<dyn Fn(Arc<Socket>) + Send + Sync>;

pub struct Namespace {
    name: String,
    adapter: Arc<dyn Adapter>,
    sockets: RwLock<HashMap<SocketId, Arc<Socket>>>,
    middlewares: RwLock<Vec<Middleware>>,
    connection_handlers: RwLock<Vec<ConnectionHandler>>,
    retry_policy: Option<RetryPolicy>,
    recovery_enabled: bool,
}

impl Namespace {
    pub fn new(name: impl Into<String>, adapter: Arc<dyn Adapter>, retry_policy: Option<RetryPolicy>, recovery_enabled: bool) -> Arc<Self> {
        Arc::new(Namespace {
            name: name.into(),
            adapter,
            sockets: RwLock::new(HashMap::new()),
            middlewares: RwLock::new(Vec::new()),
            connection_handlers: RwLock::new(Vec::new()),
            retry_policy,
            recovery_enabled,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn adapter(&self) -> Arc<dyn Adapter> {
        self.adapter.clone()
    }

    /// Register an admission middleware; run in registration order, first to reject wins.
    pub async fn r#use(&self, middleware: Middleware) {
        self.middlewares.write().await.push(middleware);
    }

    pub async fn on_connection(&self, handler: impl Fn(Arc<Socket>) + Send + Sync + 'static) {
        self.connection_handlers.write().await.push(Arc::new(handler));
    }

    /// The full admission flow: construct a socket, run middleware, join its implicit
    /// self-room, attempt session recovery if requested, write CONNECT, and fire
    /// `on_connection` handlers. On middleware rejection the socket is discarded and never
    /// registered or joined to any room.
    pub async fn add(
        self: &Arc<Self>,
        transport: Arc<dyn Transport>,
        auth: Value,
        recovery_pid: Option<(PrivateSessionId, Option<Offset>)>,
    ) -> Result<Arc<Socket>, AdmissionError> {
        let mut socket = Socket::new(Arc::downgrade(self), transport, self.retry_policy, self.recovery_enabled);

        // Resolve recovery before the socket is handed to middleware or registered, while
        // its Arc is still uniquely held, so the reconnecting client's former public sid can
        // be restored onto it rather than keeping the fresh one `Socket::new` assigned.
        let mut restored = None;
        if let Some((pid, offset)) = recovery_pid {
            if let Some(session) = self.adapter.restore_session(&pid, offset.as_ref()).await {
                if let Some(s) = Arc::get_mut(&mut socket) {
                    s.sid = session.session.sid.clone();
                }
                restored = Some(session);
            }
        }

        for middleware in self.middlewares.read().await.iter() {
            (middleware.as_ref())(socket.clone(), auth.clone()).await?;
        }

        self.adapter.add_all(socket.id.clone(), vec![Room::new(socket.id.0.clone())]).await;
        self.sockets.write().await.insert(socket.id.clone(), socket.clone());

        let mut connect_payload = vec![("sid".to_owned(), Value::string(socket.sid.0.clone()))];
        if let Some(pid) = &socket.pid {
            connect_payload.push(("pid".to_owned(), Value::string(pid.0.clone())));
        }

        if let Some(restored) = restored {
            self.adapter.add_all(socket.id.clone(), restored.session.rooms.clone()).await;
            *socket.data.write().await = restored.session.data;
            for missed in restored.missed_packets {
                if let Ok(bufs) = encode(&missed.payload) {
                    let _ = socket.write_encoded(bufs).await;
                }
            }
            info!(socket = %socket.id, pid = %restored.session.pid, "session recovered");
        }

        let payload = Value::Object(connect_payload.into_iter().collect());
        let connect_packet = Packet::connect(self.name.clone(), Some(payload));
        if let Ok(bufs) = encode(&connect_packet) {
            if socket.write_encoded(bufs).await.is_err() {
                warn!(socket = %socket.id, "failed to write CONNECT ack");
            }
        }
        socket.mark_connected().await;

        for handler in self.connection_handlers.read().await.iter() {
            (handler.as_ref())(socket.clone());
        }

        Ok(socket)
    }

    pub async fn remove_socket(&self, id: &SocketId) {
        self.sockets.write().await.remove(id);
    }

    pub async fn socket_count(&self) -> usize {
        self.sockets.read().await.len()
    }
}

impl SocketRegistry for Namespace {
    fn get(&self, id: &SocketId) -> Option<Arc<dyn BroadcastTarget>> {
        self.sockets
            .try_read()
            .ok()?
            .get(id)
            .cloned()
            .map(|s| s as Arc<dyn BroadcastTarget>)
    }

    fn all_ids(&self) -> Vec<SocketId> {
        self.sockets.try_read().map(|m| m.keys().cloned().collect()).unwrap_or_default()
    }
}

//! The transport-agnostic core of a Socket.IO-v4-compatible server: namespaces, rooms,
//! sockets, the local adapter, and connection-state recovery. Wire encoding/decoding lives
//! in `sio-protocol`; multi-process fan-out lives in `sio-cluster`.

pub mod adapter;
pub mod broadcast;
pub mod config;
pub mod emitter;
pub mod error;
pub mod ids;
pub mod namespace;
pub mod parent_namespace;
pub mod room;
pub mod server;
pub mod session;
pub mod socket;
pub mod transport;

pub use adapter::{Adapter, AckResponse, BroadcastTarget, LocalAdapter, SocketDetails, SocketRegistry};
pub use broadcast::{BroadcastOperator, RoomParam};
pub use config::{load_server_config, ConfigError, ServerConfigToml};
pub use emitter::{EventEmitter, ListenerId};
pub use error::{AdmissionError, DisconnectReason, ProtocolError, SocketError, TimeoutError};
pub use ids::{Offset, PrivateSessionId, ServerId, Sid, SocketId};
pub use namespace::{Middleware, Namespace};
pub use parent_namespace::ParentNamespace;
pub use room::{BroadcastFlags, BroadcastOptions, Room};
pub use server::{run_until_shutdown, ConnectAttempt, Server, ServerConfig, MIN_SUPPORTED_PROTOCOL_VERSION};
pub use session::{PersistedPacket, RestoredSession, Session, SessionAwareAdapter, SessionStore};
pub use socket::{RetryPolicy, Socket};
pub use transport::{ReadyState, Transport, TransportError};

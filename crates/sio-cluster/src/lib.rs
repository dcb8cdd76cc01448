//! Multi-process fan-out for `sio-core` namespaces: a `sio_core::Adapter` implementation
//! that propagates room/broadcast operations to every other server sharing a pub/sub
//! channel. Transport-agnostic over the `PubSub` collaborator; `sio-testkit` supplies an
//! in-memory implementation for tests.

pub mod adapter;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod pubsub;
pub mod requests;

pub use adapter::{ClusterAdapter, ClusterConfig, ServerSideEmitHandler};
pub use config::{load_cluster_config, ClusterConfigToml, ConfigError};
pub use error::ClusterError;
pub use heartbeat::{HeartbeatTimer, Membership};
pub use message::{ClusterEnvelope, ClusterMessage, WireBuffer, WireOptions, WireSocketDetails};
pub use pubsub::{PubSub, PubSubHandler};
pub use requests::RequestTracker;

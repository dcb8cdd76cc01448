//! In-memory test doubles for exercising `sio-core`/`sio-cluster` without a real network
//! transport or pub/sub backend.

pub mod mock_pubsub;
pub mod mock_transport;

pub use mock_pubsub::MockPubSub;
pub use mock_transport::MockTransport;

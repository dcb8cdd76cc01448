//! The lower-level transport collaborator.
//!
//! Handshake, upgrade, ping/pong, and byte framing are explicitly out of scope; the core
//! only needs something it can hand encoded buffers to and ask whether it is still open.
//! `async_trait` is used so a `Server` can hold a heterogeneous collection of
//! `Arc<dyn Transport>` behind one concrete type, matching the same reasoning the pack's
//! other socket-service adapter traits use for their own `dyn`-safe async traits.

use async_trait::async_trait;
use thiserror::Error;

use sio_protocol::Buffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Opening,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not writable")]
    NotWritable,
    #[error("transport closed: {0}")]
    Closed(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Write a complete packet's buffers (header plus any binary attachments) in order.
    async fn write(&self, bufs: Vec<Buffer>) -> Result<(), TransportError>;

    fn is_writable(&self) -> bool;

    fn ready_state(&self) -> ReadyState;

    /// The protocol version the connecting client declared.
    fn protocol(&self) -> u8;

    fn id(&self) -> &str;

    async fn close(&self, discard: bool);
}

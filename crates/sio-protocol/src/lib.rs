//! Packet model and wire codec for the Socket.IO-style protocol.
//!
//! This crate is transport-agnostic: it knows how to turn a [`Packet`] into a sequence of
//! [`Buffer`]s and back, and nothing about how those buffers reach the wire.

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod packet;
pub mod placeholder;
pub mod value;

pub use decoder::{Decoder, Input};
pub use encoder::{encode, Buffer};
pub use error::CodecError;
pub use packet::{is_reserved_event, Packet, PacketType, DEFAULT_NAMESPACE, RESERVED_EVENTS};
pub use value::Value;

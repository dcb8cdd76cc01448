//! The chainable fan-out builder returned by `Namespace::to`/`Socket::to` and friends.
//! Grounded on
//! `examples/step-finance-socketioxide/socketioxide/src/operators.rs`'s `RoomParam`
//! trait and builder-method shape.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sio_protocol::{encode, is_reserved_event, Packet, Value};
use tokio::sync::mpsc;

use crate::adapter::{AckResponse, SocketDetails};
use crate::error::SocketError;
use crate::namespace::Namespace;
use crate::room::{BroadcastFlags, BroadcastOptions, Room};

/// Anything that can be turned into one or more target/except rooms: a single room name,
/// or a collection of them.
pub trait RoomParam {
    fn into_rooms(self) -> Vec<Room>;
}

impl RoomParam for &str {
    fn into_rooms(self) -> Vec<Room> {
        vec![Room::from(self)]
    }
}

impl RoomParam for String {
    fn into_rooms(self) -> Vec<Room> {
        vec![Room::from(self)]
    }
}

impl RoomParam for Room {
    fn into_rooms(self) -> Vec<Room> {
        vec![self]
    }
}

impl<T: Into<Room>> RoomParam for Vec<T> {
    fn into_rooms(self) -> Vec<Room> {
        self.into_iter().map(Into::into).collect()
    }
}

/// An immutable, chainable selector over a namespace's sockets. Each builder method
/// consumes and returns `Self` rather than mutating in place, so `ns.to("a").except("b")`
/// reads as a pipeline instead of requiring a `mut` binding at the call site.
#[derive(Clone)]
pub struct BroadcastOperator {
    namespace: Arc<Namespace>,
    rooms: HashSet<Room>,
    except: HashSet<Room>,
    flags: BroadcastFlags,
}

impl BroadcastOperator {
    pub fn new(namespace: Arc<Namespace>) -> Self {
        BroadcastOperator {
            namespace,
            rooms: HashSet::new(),
            except: HashSet::new(),
            flags: BroadcastFlags::default(),
        }
    }

    pub fn to(mut self, rooms: impl RoomParam) -> Self {
        self.rooms.extend(rooms.into_rooms());
        self
    }

    pub fn r#in(self, rooms: impl RoomParam) -> Self {
        self.to(rooms)
    }

    pub fn except(mut self, rooms: impl RoomParam) -> Self {
        self.except.extend(rooms.into_rooms());
        self
    }

    pub fn volatile(mut self) -> Self {
        self.flags.volatile = true;
        self
    }

    pub fn local(mut self) -> Self {
        self.flags.local = true;
        self
    }

    pub fn compress(mut self) -> Self {
        self.flags.compress = true;
        self
    }

    pub fn broadcast(mut self) -> Self {
        self.flags.broadcast = true;
        self
    }

    pub fn timeout(mut self, d: Duration) -> Self {
        self.flags.timeout = Some(d);
        self
    }

    fn opts(&self) -> BroadcastOptions {
        BroadcastOptions {
            rooms: self.rooms.clone(),
            except: self.except.clone(),
            flags: self.flags.clone(),
        }
    }

    /// Fire-and-forget emission to every socket the selector resolves to.
    pub async fn emit(&self, event: &str, args: Vec<Value>) -> Result<(), SocketError> {
        if is_reserved_event(event) {
            return Err(SocketError::ReservedEvent(event.to_owned()));
        }
        let packet = Packet::event(self.namespace.name(), event, args).map_err(|e| SocketError::Protocol(e.into()))?;
        let bufs = encode(&packet).map_err(|e| SocketError::Protocol(e.into()))?;
        self.namespace
            .adapter()
            .broadcast(&packet, bufs, self.opts(), self.namespace.as_ref())
            .await;
        Ok(())
    }

    /// Emit and collect one `AckResponse` per responding socket, up to `flags.timeout` (or
    /// indefinitely if unset), bounded by however many sockets the adapter reports it sent
    /// to. Cross-server expected/actual client counting is the cluster adapter's concern;
    /// this is the single-process expectation.
    pub async fn emit_with_ack(&self, event: &str, args: Vec<Value>) -> Result<Vec<AckResponse>, SocketError> {
        if is_reserved_event(event) {
            return Err(SocketError::ReservedEvent(event.to_owned()));
        }
        let adapter = self.namespace.adapter();
        let ack_id = adapter.next_broadcast_ack_id();
        let packet = Packet::event_with_ack(self.namespace.name(), event, args, ack_id)
            .map_err(|e| SocketError::Protocol(e.into()))?;
        let bufs = encode(&packet).map_err(|e| SocketError::Protocol(e.into()))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sent = adapter
            .broadcast_with_ack(
                ack_id,
                &packet,
                bufs,
                self.opts(),
                self.namespace.as_ref(),
                Box::new(move |resp| {
                    let _ = tx.send(resp);
                }),
            )
            .await;

        let mut responses = Vec::with_capacity(sent as usize);
        let collect = async {
            for _ in 0..sent {
                match rx.recv().await {
                    Some(resp) => responses.push(resp),
                    None => break,
                }
            }
        };
        match self.flags.timeout {
            Some(d) => {
                let _ = tokio::time::timeout(d, collect).await;
            }
            None => collect.await,
        }
        Ok(responses)
    }

    pub async fn fetch_sockets(&self) -> Vec<SocketDetails> {
        self.namespace.adapter().fetch_sockets(self.opts(), self.namespace.as_ref()).await
    }

    pub async fn socket_ids(&self) -> Vec<crate::ids::SocketId> {
        self.fetch_sockets().await.into_iter().map(|d| d.id).collect()
    }

    pub async fn disconnect(&self, close: bool) {
        self.namespace.adapter().disconnect_sockets(self.opts(), close, self.namespace.as_ref()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_param_collects_single_and_vec() {
        assert_eq!(Room::from("a").into_rooms(), vec![Room::from("a")]);
        let rooms: Vec<Room> = vec!["a", "b"].into_rooms();
        assert_eq!(rooms, vec![Room::from("a"), Room::from("b")]);
    }
}

//! An in-memory `sio_core::Transport`. Grounded on `rt-test-utils::MockWsClient`'s
//! send/recv pair, simplified from a real `TcpStream` to a `tokio::sync::mpsc` channel
//! pair since the handshake/upgrade layer itself is out of scope for a test double.

use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::mpsc;

use sio_core::{ReadyState, Transport, TransportError};
use sio_protocol::Buffer;

/// The server's end of a mock connection: every `write` call forwards the packet's buffers
/// down an unbounded channel instead of onto a socket, so a test can drain
/// `MockTransport::outbox` and assert on exactly what the server sent.
pub struct MockTransport {
    id: String,
    protocol: u8,
    outbox: mpsc::UnboundedSender<Vec<Buffer>>,
    state: RwLock<ReadyState>,
}

impl MockTransport {
    /// Build a connected mock transport plus the receiving half of its outbox.
    pub fn new(id: impl Into<String>, protocol: u8) -> (Self, mpsc::UnboundedReceiver<Vec<Buffer>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MockTransport {
                id: id.into(),
                protocol,
                outbox: tx,
                state: RwLock::new(ReadyState::Open),
            },
            rx,
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&self, bufs: Vec<Buffer>) -> Result<(), TransportError> {
        if !self.is_writable() {
            return Err(TransportError::NotWritable);
        }
        self.outbox.send(bufs).map_err(|_| TransportError::Closed("receiver dropped".to_owned()))
    }

    fn is_writable(&self) -> bool {
        *self.state.read().unwrap() == ReadyState::Open
    }

    fn ready_state(&self) -> ReadyState {
        *self.state.read().unwrap()
    }

    fn protocol(&self) -> u8 {
        self.protocol
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn close(&self, _discard: bool) {
        *self.state.write().unwrap() = ReadyState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_after_close_fails() {
        let (transport, _rx) = MockTransport::new("t1", 4);
        transport.close(false).await;
        let result = transport.write(vec![Buffer::Text("2/".to_owned())]).await;
        assert!(matches!(result, Err(TransportError::NotWritable)));
    }

    #[tokio::test]
    async fn written_buffers_arrive_on_the_outbox() {
        let (transport, mut rx) = MockTransport::new("t1", 4);
        transport.write(vec![Buffer::Text("2/".to_owned())]).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received, vec![Buffer::Text("2/".to_owned())]);
    }
}

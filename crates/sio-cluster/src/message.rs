//! Cluster wire envelope and message types. Grounded on
//! `examples/iwismer-rusty-timer/crates/rt-protocol/src/lib.rs`'s `#[serde(tag = "kind")]`
//! discriminated-union shape, adapted from the forwarder/receiver message set to the
//! dozen message types a cluster adapter exchanges with its peers.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sio_core::{BroadcastFlags, BroadcastOptions, Room, SocketDetails, SocketId};
use sio_protocol::{Buffer, Value};

/// A wire-safe mirror of `sio_protocol::Buffer`, which does not itself derive `Serialize`
/// since the codec crate has no reason to depend on `serde` for its own internal use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireBuffer {
    Text(String),
    Binary(Vec<u8>),
}

impl From<&Buffer> for WireBuffer {
    fn from(b: &Buffer) -> Self {
        match b {
            Buffer::Text(s) => WireBuffer::Text(s.clone()),
            Buffer::Binary(v) => WireBuffer::Binary(v.clone()),
        }
    }
}

impl From<WireBuffer> for Buffer {
    fn from(b: WireBuffer) -> Self {
        match b {
            WireBuffer::Text(s) => Buffer::Text(s),
            WireBuffer::Binary(v) => Buffer::Binary(v),
        }
    }
}

pub fn bufs_to_wire(bufs: &[Buffer]) -> Vec<WireBuffer> {
    bufs.iter().map(WireBuffer::from).collect()
}

pub fn wire_to_bufs(bufs: Vec<WireBuffer>) -> Vec<Buffer> {
    bufs.into_iter().map(Buffer::from).collect()
}

/// `BroadcastOptions`/`BroadcastFlags` mirror, since those carry a `HashSet<Room>` the
/// derive macro handles directly (`Room` is a plain `String` newtype) but the
/// `Option<Duration>` timeout needs to survive JSON as milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WireOptions {
    pub rooms: HashSet<String>,
    pub except: HashSet<String>,
    pub volatile: bool,
    pub local: bool,
    pub compress: bool,
    pub broadcast: bool,
    pub timeout_ms: Option<u64>,
}

impl From<&BroadcastOptions> for WireOptions {
    fn from(o: &BroadcastOptions) -> Self {
        WireOptions {
            rooms: o.rooms.iter().map(|r| r.0.clone()).collect(),
            except: o.except.iter().map(|r| r.0.clone()).collect(),
            volatile: o.flags.volatile,
            local: o.flags.local,
            compress: o.flags.compress,
            broadcast: o.flags.broadcast,
            timeout_ms: o.flags.timeout.map(|d| d.as_millis() as u64),
        }
    }
}

impl From<WireOptions> for BroadcastOptions {
    fn from(w: WireOptions) -> Self {
        BroadcastOptions {
            rooms: w.rooms.into_iter().map(Room::new).collect(),
            except: w.except.into_iter().map(Room::new).collect(),
            flags: BroadcastFlags {
                volatile: w.volatile,
                local: w.local,
                compress: w.compress,
                broadcast: w.broadcast,
                binary: false,
                timeout: w.timeout_ms.map(Duration::from_millis),
                expect_single_response: false,
            },
        }
    }
}

/// The serialisable subset of a socket returned by a peer's FETCH_SOCKETS_RESPONSE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSocketDetails {
    pub id: String,
    pub rooms: Vec<String>,
    pub data: Option<serde_json::Value>,
}

impl From<&SocketDetails> for WireSocketDetails {
    fn from(d: &SocketDetails) -> Self {
        WireSocketDetails {
            id: d.id.0.clone(),
            rooms: d.rooms.iter().map(|r| r.0.clone()).collect(),
            data: d.data.clone().map(Value::into_json),
        }
    }
}

impl From<WireSocketDetails> for SocketDetails {
    fn from(d: WireSocketDetails) -> Self {
        SocketDetails {
            id: SocketId(d.id),
            rooms: d.rooms.into_iter().map(Room::new).collect(),
            data: d.data.map(Value::from_json),
        }
    }
}

/// The type-specific payload of a cluster envelope. Tagged on `type` so the envelope
/// round-trips as one flat JSON object, the same `#[serde(tag = "...")]` discriminated-union
/// shape used elsewhere in this codebase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClusterMessage {
    InitialHeartbeat,
    Heartbeat,
    Broadcast {
        request_id: Option<String>,
        opts: WireOptions,
        packet: Vec<WireBuffer>,
        with_ack: bool,
    },
    BroadcastAck {
        request_id: String,
        socket_id: String,
        args: Vec<serde_json::Value>,
    },
    BroadcastClientCount {
        request_id: String,
        client_count: u64,
    },
    SocketsJoin {
        opts: WireOptions,
        rooms: Vec<String>,
    },
    SocketsLeave {
        opts: WireOptions,
        rooms: Vec<String>,
    },
    DisconnectSockets {
        opts: WireOptions,
        close: bool,
    },
    FetchSockets {
        request_id: String,
        opts: WireOptions,
    },
    FetchSocketsResponse {
        request_id: String,
        sockets: Vec<WireSocketDetails>,
    },
    ServerSideEmit {
        request_id: Option<String>,
        event: String,
        args: Vec<serde_json::Value>,
    },
    ServerSideEmitResponse {
        request_id: String,
        args: Vec<serde_json::Value>,
    },
    AdapterClose,
}

/// Every message transported through the pub/sub substrate carries this envelope. `uid`
/// identifies the originating server so self-originated messages can be discarded and
/// peer membership tracked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEnvelope {
    pub uid: String,
    pub nsp: String,
    #[serde(flatten)]
    pub message: ClusterMessage,
}

impl ClusterEnvelope {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

use crate::error::CodecError;
use crate::value::Value;

pub const DEFAULT_NAMESPACE: &str = "/";

/// Event names that must not originate from user code. Listeners may still
/// subscribe to these to observe lifecycle events; only emission is guarded.
pub const RESERVED_EVENTS: &[&str] = &[
    "connect",
    "connect_error",
    "disconnect",
    "disconnecting",
    "newListener",
    "removeListener",
];

pub fn is_reserved_event(name: &str) -> bool {
    RESERVED_EVENTS.contains(&name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Connect = 0,
    Disconnect = 1,
    Event = 2,
    Ack = 3,
    ConnectError = 4,
    BinaryEvent = 5,
    BinaryAck = 6,
}

impl PacketType {
    pub fn from_digit(d: u8) -> Result<Self, CodecError> {
        match d {
            0 => Ok(PacketType::Connect),
            1 => Ok(PacketType::Disconnect),
            2 => Ok(PacketType::Event),
            3 => Ok(PacketType::Ack),
            4 => Ok(PacketType::ConnectError),
            5 => Ok(PacketType::BinaryEvent),
            6 => Ok(PacketType::BinaryAck),
            other => Err(CodecError::UnknownPacketType(other)),
        }
    }

    pub fn to_digit(self) -> u8 {
        self as u8
    }

    pub fn is_binary(self) -> bool {
        matches!(self, PacketType::BinaryEvent | PacketType::BinaryAck)
    }

    /// The non-binary counterpart used before a payload's binary content is discovered
    /// during encoding: once a Buffer turns up, a packet's type is upgraded to
    /// BINARY_EVENT / BINARY_ACK.
    pub fn upgrade_to_binary(self) -> PacketType {
        match self {
            PacketType::Event => PacketType::BinaryEvent,
            PacketType::Ack => PacketType::BinaryAck,
            other => other,
        }
    }
}

/// A single Socket.IO packet: a type tag, target namespace, optional ack id and
/// attachment count, and a decoded payload tree. Payload shape varies by packet type.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub namespace: String,
    pub ack_id: Option<u64>,
    pub attachments: Option<u64>,
    pub payload: Value,
}

impl Packet {
    pub fn new(packet_type: PacketType, namespace: impl Into<String>, payload: Value) -> Self {
        Packet {
            packet_type,
            namespace: namespace.into(),
            ack_id: None,
            attachments: None,
            payload,
        }
    }

    pub fn connect(namespace: impl Into<String>, auth: Option<Value>) -> Self {
        Packet::new(PacketType::Connect, namespace, auth.unwrap_or(Value::Null))
    }

    pub fn disconnect(namespace: impl Into<String>) -> Self {
        Packet::new(PacketType::Disconnect, namespace, Value::Null)
    }

    /// Build an EVENT packet. `event` must not be reserved; `args` follow the event name.
    pub fn event(
        namespace: impl Into<String>,
        event: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<Self, CodecError> {
        let event = event.into();
        if is_reserved_event(&event) {
            return Err(CodecError::ReservedEventName(event));
        }
        let mut items = Vec::with_capacity(args.len() + 1);
        items.push(Value::String(event));
        items.extend(args);
        Ok(Packet::new(PacketType::Event, namespace, Value::Array(items)))
    }

    pub fn event_with_ack(
        namespace: impl Into<String>,
        event: impl Into<String>,
        args: Vec<Value>,
        ack_id: u64,
    ) -> Result<Self, CodecError> {
        let mut packet = Packet::event(namespace, event, args)?;
        packet.ack_id = Some(ack_id);
        Ok(packet)
    }

    pub fn ack(namespace: impl Into<String>, ack_id: u64, args: Vec<Value>) -> Self {
        let mut packet = Packet::new(PacketType::Ack, namespace, Value::Array(args));
        packet.ack_id = Some(ack_id);
        packet
    }

    pub fn connect_error(namespace: impl Into<String>, data: Value) -> Self {
        Packet::new(PacketType::ConnectError, namespace, data)
    }

    /// First payload element for EVENT/BINARY_EVENT packets, i.e. the event name.
    pub fn event_name(&self) -> Option<&str> {
        match &self.payload {
            Value::Array(items) => items.first().and_then(Value::as_str),
            _ => None,
        }
    }

    /// Validate that the payload shape matches what the packet type requires.
    /// Called after decode and before a packet is emitted.
    pub fn validate(&self) -> Result<(), CodecError> {
        match self.packet_type {
            PacketType::Connect | PacketType::Disconnect => Ok(()),
            PacketType::Event | PacketType::BinaryEvent => match &self.payload {
                Value::Array(items) if !items.is_empty() => {
                    let name = items[0]
                        .as_str()
                        .ok_or(CodecError::InvalidPayloadShape)?;
                    if is_reserved_event(name) {
                        return Err(CodecError::ReservedEventName(name.to_owned()));
                    }
                    Ok(())
                }
                _ => Err(CodecError::InvalidPayloadShape),
            },
            PacketType::Ack | PacketType::BinaryAck => match &self.payload {
                Value::Array(_) => Ok(()),
                _ => Err(CodecError::InvalidPayloadShape),
            },
            PacketType::ConnectError => match &self.payload {
                Value::Object(_) | Value::String(_) => Ok(()),
                _ => Err(CodecError::InvalidPayloadShape),
            },
        }
    }
}

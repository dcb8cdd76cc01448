use crate::error::CodecError;
use crate::packet::{Packet, DEFAULT_NAMESPACE};
use crate::placeholder;
use crate::value::Value;

/// One unit of an encoded packet: the textual header, or one binary attachment in
/// arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    Text(String),
    Binary(Vec<u8>),
}

/// Encode `packet` into its header buffer followed by its binary attachments, in order.
///
/// If the payload contains any `Value::Bytes` leaf the packet type is upgraded to its
/// binary counterpart (EVENT → BINARY_EVENT, ACK → BINARY_ACK) regardless of what
/// `packet.packet_type` already says; a packet already constructed as a binary type with
/// zero bytes in its payload stays binary, so a decoded zero-attachment BINARY_EVENT
/// round-trips as BINARY_EVENT, not EVENT.
pub fn encode(packet: &Packet) -> Result<Vec<Buffer>, CodecError> {
    packet.validate()?;
    let (rewritten, binaries) = placeholder::extract(packet.payload.clone());

    let effective_type = if !binaries.is_empty() || packet.packet_type.is_binary() {
        packet.packet_type.upgrade_to_binary()
    } else {
        packet.packet_type
    };

    let mut header = String::new();
    header.push((b'0' + effective_type.to_digit()) as char);

    if effective_type.is_binary() {
        header.push_str(&binaries.len().to_string());
        header.push('-');
    }

    if packet.namespace != DEFAULT_NAMESPACE {
        header.push('/');
        header.push_str(&packet.namespace);
        header.push(',');
    }

    if let Some(id) = packet.ack_id {
        header.push_str(&id.to_string());
    }

    if rewritten != Value::Null {
        let json = serde_json::to_string(&rewritten.into_json())
            .map_err(|e| CodecError::InvalidJson(e.to_string()))?;
        header.push_str(&json);
    }

    let mut out = Vec::with_capacity(1 + binaries.len());
    out.push(Buffer::Text(header));
    out.extend(binaries.into_iter().map(Buffer::Binary));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;

    #[test]
    fn encodes_plain_event() {
        let packet = Packet::event("/", "msg", vec![Value::string("hi")]).unwrap();
        let bufs = encode(&packet).unwrap();
        assert_eq!(bufs, vec![Buffer::Text(r#"2["msg","hi"]"#.to_string())]);
    }

    #[test]
    fn encodes_binary_upgrade() {
        let packet = Packet::event("/", "upload", vec![Value::Bytes(vec![0x01, 0x02])]).unwrap();
        let bufs = encode(&packet).unwrap();
        assert_eq!(
            bufs,
            vec![
                Buffer::Text(r#"51-["upload",{"_placeholder":true,"num":0}]"#.to_string()),
                Buffer::Binary(vec![0x01, 0x02]),
            ]
        );
    }

    #[test]
    fn encodes_namespace_and_ack_id() {
        let packet = Packet::event_with_ack("/chat", "msg", vec![Value::string("hi")], 17).unwrap();
        let bufs = encode(&packet).unwrap();
        assert_eq!(bufs, vec![Buffer::Text(r#"2/chat,17["msg","hi"]"#.to_string())]);
    }

    #[test]
    fn encodes_disconnect_without_payload() {
        let packet = Packet::disconnect("/chat");
        let bufs = encode(&packet).unwrap();
        assert_eq!(bufs, vec![Buffer::Text("1/chat,".to_string())]);
    }

    #[test]
    fn zero_attachment_binary_event_stays_binary() {
        let packet = Packet::new(PacketType::BinaryEvent, "/", Value::Array(vec![Value::string("x")]));
        let bufs = encode(&packet).unwrap();
        assert_eq!(bufs, vec![Buffer::Text(r#"50-["x"]"#.to_string())]);
    }
}

use crate::error::CodecError;
use crate::packet::{Packet, PacketType, DEFAULT_NAMESPACE};
use crate::placeholder;
use crate::value::Value;

/// One unit fed into the decoder: a text header or a binary attachment.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Text(String),
    Binary(Vec<u8>),
}

enum State {
    Idle,
    Reconstructing {
        packet: Packet,
        expected: u64,
        buffers: Vec<Vec<u8>>,
    },
}

/// Streaming decoder implementing an Idle/Reconstructing state machine.
///
/// One `Decoder` belongs to one byte stream (one transport connection). Feeding it out of
/// order — binary while Idle, or text while Reconstructing — is a protocol error, not a
/// panic: the caller (the owning [`crate::packet`] consumer) is expected to close the
/// connection on such an error.
pub struct Decoder {
    state: State,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Decoder { state: State::Idle }
    }

    pub fn is_reconstructing(&self) -> bool {
        matches!(self.state, State::Reconstructing { .. })
    }

    /// Discard any partially-reconstructed packet without emitting it: destroying the
    /// decoder mid-reconstruction drops whatever partial state it was holding.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }

    pub fn feed(&mut self, input: Input) -> Result<Option<Packet>, CodecError> {
        match input {
            Input::Text(text) => self.feed_text(&text),
            Input::Binary(data) => self.feed_binary(data),
        }
    }

    /// Convenience for transports that hand back raw bytes for a text frame.
    pub fn feed_text_bytes(&mut self, bytes: &[u8]) -> Result<Option<Packet>, CodecError> {
        let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
        self.feed_text(text)
    }

    fn feed_text(&mut self, text: &str) -> Result<Option<Packet>, CodecError> {
        if self.is_reconstructing() {
            return Err(CodecError::UnexpectedTextWhileReconstructing);
        }
        let packet = parse_header(text)?;
        packet.validate()?;

        let expected = packet.attachments.unwrap_or(0);
        if !packet.packet_type.is_binary() || expected == 0 {
            return Ok(Some(packet));
        }

        self.state = State::Reconstructing {
            packet,
            expected,
            buffers: Vec::new(),
        };
        Ok(None)
    }

    fn feed_binary(&mut self, data: Vec<u8>) -> Result<Option<Packet>, CodecError> {
        let State::Reconstructing { expected, buffers, .. } = &mut self.state else {
            return Err(CodecError::UnexpectedBinaryWhileIdle);
        };

        buffers.push(data);
        if (buffers.len() as u64) < *expected {
            return Ok(None);
        }

        let State::Reconstructing {
            packet, buffers, ..
        } = std::mem::replace(&mut self.state, State::Idle)
        else {
            unreachable!("state checked above")
        };
        let payload = placeholder::reconstruct(packet.payload, &buffers)?;
        let mut resolved = Packet {
            payload,
            ..packet
        };
        resolved.attachments = Some(buffers.len() as u64);
        Ok(Some(resolved))
    }
}

/// Parse a textual header per the grammar:
/// `<type-digit> [<attachments> '-'] ['/' <namespace> ','] [<ack-id>] [<json-payload>]`
fn parse_header(text: &str) -> Result<Packet, CodecError> {
    let mut chars = text.chars();
    let type_digit = chars.next().ok_or(CodecError::UnknownPacketType(0))?;
    let digit = type_digit
        .to_digit(10)
        .ok_or_else(|| CodecError::UnknownPacketType(type_digit as u8))?;
    let packet_type = PacketType::from_digit(digit as u8)?;
    let mut rest = chars.as_str();

    let mut attachments = None;
    if packet_type.is_binary() {
        let dash = rest.find('-').ok_or(CodecError::MalformedAttachmentPrefix)?;
        let digits = &rest[..dash];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CodecError::MalformedAttachmentPrefix);
        }
        attachments = Some(
            digits
                .parse::<u64>()
                .map_err(|_| CodecError::MalformedAttachmentPrefix)?,
        );
        rest = &rest[dash + 1..];
    }

    let mut namespace = DEFAULT_NAMESPACE.to_owned();
    if let Some(stripped) = rest.strip_prefix('/') {
        let comma = stripped.find(',').ok_or(CodecError::InvalidPayloadShape)?;
        namespace = format!("/{}", &stripped[..comma]);
        rest = &stripped[comma + 1..];
    }

    let digit_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let mut ack_id = None;
    if digit_end > 0 {
        ack_id = Some(
            rest[..digit_end]
                .parse::<u64>()
                .map_err(|_| CodecError::InvalidAckId)?,
        );
    }
    rest = &rest[digit_end..];

    let payload = if rest.is_empty() {
        Value::Null
    } else {
        let json: serde_json::Value =
            serde_json::from_str(rest).map_err(|e| CodecError::InvalidJson(e.to_string()))?;
        Value::from_json(json)
    };

    if let Some(expected) = attachments {
        let found = placeholder::count_placeholders(&payload);
        if found != expected {
            return Err(CodecError::AttachmentCountMismatch {
                declared: expected,
                found,
            });
        }
    }

    Ok(Packet {
        packet_type,
        namespace,
        ack_id,
        attachments,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_event() {
        let mut decoder = Decoder::new();
        let packet = decoder
            .feed(Input::Text(r#"2["msg","hi"]"#.to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(packet.packet_type, PacketType::Event);
        assert_eq!(packet.event_name(), Some("msg"));
    }

    #[test]
    fn decodes_namespace_and_ack_id() {
        let mut decoder = Decoder::new();
        let packet = decoder
            .feed(Input::Text(r#"2/chat,17["msg","hi"]"#.to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(packet.namespace, "/chat");
        assert_eq!(packet.ack_id, Some(17));
    }

    #[test]
    fn reconstructs_binary_event_after_attachment_arrives() {
        let mut decoder = Decoder::new();
        let mid = decoder
            .feed(Input::Text(
                r#"51-["upload",{"_placeholder":true,"num":0}]"#.to_string(),
            ))
            .unwrap();
        assert!(mid.is_none());
        assert!(decoder.is_reconstructing());

        let packet = decoder
            .feed(Input::Binary(vec![0x01, 0x02]))
            .unwrap()
            .unwrap();
        assert_eq!(packet.packet_type, PacketType::BinaryEvent);
        match &packet.payload {
            Value::Array(items) => assert_eq!(items[1], Value::Bytes(vec![0x01, 0x02])),
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(!decoder.is_reconstructing());
    }

    #[test]
    fn text_while_reconstructing_is_an_error() {
        let mut decoder = Decoder::new();
        decoder
            .feed(Input::Text(r#"51-["x",{"_placeholder":true,"num":0}]"#.to_string()))
            .unwrap();
        let err = decoder.feed(Input::Text("2[\"y\"]".to_string())).unwrap_err();
        assert_eq!(err, CodecError::UnexpectedTextWhileReconstructing);
    }

    #[test]
    fn binary_while_idle_is_an_error() {
        let mut decoder = Decoder::new();
        let err = decoder.feed(Input::Binary(vec![1])).unwrap_err();
        assert_eq!(err, CodecError::UnexpectedBinaryWhileIdle);
    }

    #[test]
    fn reset_discards_partial_reconstruction() {
        let mut decoder = Decoder::new();
        decoder
            .feed(Input::Text(r#"51-["x",{"_placeholder":true,"num":0}]"#.to_string()))
            .unwrap();
        decoder.reset();
        assert!(!decoder.is_reconstructing());
    }

    #[test]
    fn unknown_type_digit_is_rejected() {
        let mut decoder = Decoder::new();
        let err = decoder.feed(Input::Text("9[]".to_string())).unwrap_err();
        assert_eq!(err, CodecError::UnknownPacketType(9));
    }

    #[test]
    fn reserved_event_name_is_rejected() {
        let mut decoder = Decoder::new();
        let err = decoder
            .feed(Input::Text(r#"2["disconnect"]"#.to_string()))
            .unwrap_err();
        assert_eq!(err, CodecError::ReservedEventName("disconnect".to_string()));
    }

    #[test]
    fn attachment_count_mismatch_is_rejected() {
        let mut decoder = Decoder::new();
        let err = decoder
            .feed(Input::Text(r#"52-["x",{"_placeholder":true,"num":0}]"#.to_string()))
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::AttachmentCountMismatch { declared: 2, found: 1 }
        );
    }
}

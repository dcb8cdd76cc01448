use thiserror::Error;

/// Every way a header buffer, binary buffer, or decoded payload can fail to become a
/// valid [`crate::packet::Packet`]. Distinguished by kind, not just message, per the
/// decoder's requirement that parsing failures are not merely "valid but unexpected".
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("unknown packet type digit: {0}")]
    UnknownPacketType(u8),

    #[error("header buffer is not valid utf-8")]
    InvalidUtf8,

    #[error("malformed attachment count prefix")]
    MalformedAttachmentPrefix,

    #[error("invalid json payload: {0}")]
    InvalidJson(String),

    #[error("payload is missing or has the wrong shape for packet type")]
    InvalidPayloadShape,

    #[error("ack id is not a valid unsigned integer")]
    InvalidAckId,

    #[error("got plaintext data when reconstructing a packet")]
    UnexpectedTextWhileReconstructing,

    #[error("got binary data while not reconstructing a packet")]
    UnexpectedBinaryWhileIdle,

    #[error("placeholder index {0} is out of range for {1} attachments")]
    PlaceholderOutOfRange(u64, u64),

    #[error("attachment count mismatch: header declared {declared}, payload contains {found} placeholders")]
    AttachmentCountMismatch { declared: u64, found: u64 },

    #[error("event name '{0}' is reserved and must not originate from user code")]
    ReservedEventName(String),
}

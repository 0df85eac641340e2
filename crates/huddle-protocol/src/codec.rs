//! Codec for encoding and decoding Huddle events.
//!
//! Two wire formats are supported:
//!
//! - **JSON** over WebSocket text frames, one event per frame.
//! - **MessagePack** over binary frames with a 4-byte big-endian length
//!   prefix, so several events may share one frame or span several.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Maximum encoded event size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Not enough data to decode frame.
    #[error("Incomplete frame: need {0} more bytes")]
    Incomplete(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Unknown wire format name.
    #[error("Unknown wire format: {0}")]
    UnknownFormat(String),
}

/// Encoding used on a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// JSON text frames.
    #[default]
    Json,
    /// Length-prefixed MessagePack binary frames.
    #[serde(alias = "messagepack")]
    Msgpack,
}

impl FromStr for WireFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(WireFormat::Json),
            "msgpack" | "messagepack" => Ok(WireFormat::Msgpack),
            _ => Err(ProtocolError::UnknownFormat(s.to_string())),
        }
    }
}

/// An encoded event ready to be written to a WebSocket.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    /// Send as a text frame.
    Text(String),
    /// Send as a binary frame.
    Binary(Bytes),
}

impl Encoded {
    /// Encoded size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Encoded::Text(text) => text.len(),
            Encoded::Binary(data) => data.len(),
        }
    }

    /// Whether the encoding is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encode an event in the given wire format.
///
/// # Errors
///
/// Returns an error if the event is too large or serialization fails.
pub fn encode<T: Serialize>(event: &T, format: WireFormat) -> Result<Encoded, ProtocolError> {
    match format {
        WireFormat::Json => encode_json(event).map(Encoded::Text),
        WireFormat::Msgpack => encode_binary(event).map(Encoded::Binary),
    }
}

/// Encode an event as a JSON string.
///
/// # Errors
///
/// Returns an error if the event is too large or serialization fails.
pub fn encode_json<T: Serialize>(event: &T) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(event)?;

    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(text)
}

/// Decode an event from a JSON string.
///
/// # Errors
///
/// Returns an error if the text is too large or not a valid event.
pub fn decode_json<T: DeserializeOwned>(text: &str) -> Result<T, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(serde_json::from_str(text)?)
}

/// Encode an event as a length-prefixed MessagePack frame.
///
/// The encoded format is:
/// - 4 bytes: Big-endian length prefix
/// - N bytes: MessagePack-encoded event
///
/// # Errors
///
/// Returns an error if the event is too large or encoding fails.
pub fn encode_binary<T: Serialize>(event: &T) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_into(event, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode an event into an existing buffer.
///
/// # Errors
///
/// Returns an error if the event is too large or encoding fails.
pub fn encode_into<T: Serialize>(event: &T, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let payload = rmp_serde::to_vec_named(event)?;

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    buf.reserve(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);

    Ok(())
}

/// Decode a single length-prefixed MessagePack event.
///
/// # Errors
///
/// Returns an error if the data is incomplete, too large, or invalid.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::Incomplete(LENGTH_PREFIX_SIZE - data.len()));
    }

    let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    let total_size = LENGTH_PREFIX_SIZE + length;
    if data.len() < total_size {
        return Err(ProtocolError::Incomplete(total_size - data.len()));
    }

    Ok(rmp_serde::from_slice(&data[LENGTH_PREFIX_SIZE..total_size])?)
}

/// Payload length announced by the prefix at the front of `buf`, if the
/// prefix has arrived.
#[must_use]
pub fn frame_len(buf: &[u8]) -> Option<usize> {
    let prefix: [u8; LENGTH_PREFIX_SIZE] = buf.get(..LENGTH_PREFIX_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix) as usize)
}

/// Try to decode an event from a buffer, advancing it if successful.
///
/// Returns `Ok(Some(event))` if a complete event was decoded,
/// `Ok(None)` if more data is needed, or `Err` on protocol error.
///
/// # Errors
///
/// Returns an error if the frame is too large or invalid.
pub fn decode_from<T: DeserializeOwned>(buf: &mut BytesMut) -> Result<Option<T>, ProtocolError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let Some(length) = frame_len(buf) else {
        return Ok(None);
    };

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    let total_size = LENGTH_PREFIX_SIZE + length;
    if buf.len() < total_size {
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let payload = buf.split_to(length);

    Ok(Some(rmp_serde::from_slice(&payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ClientEvent, ServerEvent, Signal};
    use serde_json::json;

    #[test]
    fn test_json_decode_client_event() {
        let text = r#"{"event":"send-message","data":{"roomId":"r1","message":"hi"}}"#;
        let event: ClientEvent = decode_json(text).unwrap();

        assert_eq!(
            event,
            ClientEvent::SendMessage {
                room_id: "r1".into(),
                message: "hi".into(),
            }
        );
    }

    #[test]
    fn test_json_unknown_event_is_rejected() {
        let text = r#"{"event":"self-destruct","data":{}}"#;
        assert!(matches!(
            decode_json::<ClientEvent>(text),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_msgpack_carries_opaque_payload() {
        let event = ClientEvent::Offer(Signal {
            payload: json!({"type": "offer", "sdp": "v=0"}),
            to: "conn_b".into(),
        });

        let encoded = encode_binary(&event).unwrap();
        let decoded: ClientEvent = decode(&encoded).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_decode_incomplete() {
        let encoded = encode_binary(&ServerEvent::error("boom")).unwrap();

        match decode::<ServerEvent>(&encoded[..5]) {
            Err(ProtocolError::Incomplete(_)) => {}
            other => panic!("Expected Incomplete error, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_too_large() {
        let event = ClientEvent::SendMessage {
            room_id: "r1".into(),
            message: "a".repeat(MAX_FRAME_SIZE + 1),
        };

        match encode(&event, WireFormat::Msgpack) {
            Err(ProtocolError::FrameTooLarge(_)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_len_reads_prefix() {
        let encoded = encode_binary(&ClientEvent::join("r1", "p1", "Alice")).unwrap();

        assert_eq!(frame_len(&encoded[..3]), None);
        assert_eq!(frame_len(&encoded), Some(encoded.len() - LENGTH_PREFIX_SIZE));
    }

    #[test]
    fn test_streaming_decode() {
        let first = ClientEvent::join("r1", "p1", "Alice");
        let second = ClientEvent::LeaveRoom {
            room_id: "r1".into(),
        };

        let mut buf = BytesMut::new();
        encode_into(&first, &mut buf).unwrap();
        encode_into(&second, &mut buf).unwrap();

        // Split mid-frame: nothing decodes until the rest arrives.
        let mut partial = buf.split_to(3);
        assert!(decode_from::<ClientEvent>(&mut partial).unwrap().is_none());
        partial.unsplit(buf);

        assert_eq!(decode_from::<ClientEvent>(&mut partial).unwrap(), Some(first));
        assert_eq!(decode_from::<ClientEvent>(&mut partial).unwrap(), Some(second));
        assert!(partial.is_empty());
    }

    #[test]
    fn test_wire_format_parsing() {
        assert_eq!("json".parse::<WireFormat>().unwrap(), WireFormat::Json);
        assert_eq!("MsgPack".parse::<WireFormat>().unwrap(), WireFormat::Msgpack);
        assert!("xml".parse::<WireFormat>().is_err());
    }

    #[test]
    fn test_encode_picks_frame_kind() {
        let event = ServerEvent::error("nope");

        assert!(matches!(encode(&event, WireFormat::Json).unwrap(), Encoded::Text(_)));
        assert!(matches!(
            encode(&event, WireFormat::Msgpack).unwrap(),
            Encoded::Binary(_)
        ));
    }
}

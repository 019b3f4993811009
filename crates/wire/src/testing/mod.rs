//! Test doubles for the wire layer.

mod memory;

pub use memory::MemoryTransport;

use bytes::BytesMut;
use serde_json::Value;
use tokio_util::codec::Encoder;

use crate::codec::{Framing, MessageCodec};
use crate::message::Message;

/// Encode JSON values exactly as a peer using `framing` would put them on
/// the wire. Values that are not valid messages fall back to a bare frame so
/// that decode errors can be exercised too.
///
/// ```
/// use wire::{Framing, testing::encode_frames};
/// use serde_json::json;
///
/// let bytes = encode_frames(Framing::ContentLength, &[json!({"id": 1, "result": "pong"})]);
/// assert!(bytes.starts_with(b"Content-Length: "));
/// ```
pub fn encode_frames(framing: Framing, values: &[Value]) -> Vec<u8> {
    let mut codec = MessageCodec::new(framing);
    let mut buf = BytesMut::new();

    for value in values {
        let encoded = serde_json::from_value::<Message>(value.clone())
            .ok()
            .is_some_and(|message| codec.encode(message, &mut buf).is_ok());
        if encoded {
            continue;
        }

        let body = value.to_string();
        match framing {
            Framing::ContentLength => {
                buf.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
                buf.extend_from_slice(body.as_bytes());
            }
            Framing::Lines => {
                buf.extend_from_slice(body.as_bytes());
                buf.extend_from_slice(b"\n");
            }
        }
    }

    buf.to_vec()
}

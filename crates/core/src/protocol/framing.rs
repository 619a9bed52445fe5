//! Binary framing for the auxiliary data channel
//!
//! Each frame is `[prefix][payload]`. The only prefix in use is
//! [`FILE_CHUNK_PREFIX`]; the payload cap leaves room for the prefix byte
//! inside a 64 KiB SCTP message.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::Result;

/// Frame prefix marking a file chunk body
pub const FILE_CHUNK_PREFIX: u8 = 0x01;

/// Maximum payload bytes per frame (64 KiB minus the prefix byte)
pub const MAX_CHUNK_PAYLOAD: usize = 64 * 1024 - 1;

/// A decoded aux-channel frame
#[derive(Debug, Clone, PartialEq)]
pub enum AuxFrame {
    /// File chunk body at the sender's current offset
    FileChunk(Bytes),
}

/// Frame a file chunk for the aux channel.
///
/// Payloads of exactly [`MAX_CHUNK_PAYLOAD`] bytes are accepted; one byte
/// more is rejected before anything reaches the channel.
pub fn encode_file_chunk(payload: &[u8]) -> Result<Bytes> {
    if payload.len() > MAX_CHUNK_PAYLOAD {
        return Err(Error::FrameTooLarge {
            len: payload.len(),
            max: MAX_CHUNK_PAYLOAD,
        });
    }
    let mut frame = BytesMut::with_capacity(payload.len() + 1);
    frame.put_u8(FILE_CHUNK_PREFIX);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Decode an aux-channel frame.
pub fn decode_frame(frame: &[u8]) -> Result<AuxFrame> {
    let (&prefix, payload) = frame
        .split_first()
        .ok_or_else(|| Error::InvalidFrame("empty frame".into()))?;
    match prefix {
        FILE_CHUNK_PREFIX => Ok(AuxFrame::FileChunk(Bytes::copy_from_slice(payload))),
        other => Err(Error::InvalidFrame(format!("unknown prefix 0x{other:02x}"))),
    }
}

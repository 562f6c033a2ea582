//! Length-prefixed JSON framing.
//!
//! One message per frame: a 4-byte big-endian length followed by a JSON
//! body. The server and client are shipped together, so the body encoding
//! can stay human-readable.

use std::io::{Read, Write};

use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Hard cap on a single frame body.
pub const MAX_FRAME_BYTES: usize = 1 << 20;

/// Transport and encoding errors.
#[derive(Debug, Error)]
pub enum WireError {
    /// Underlying socket or pipe failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame announced or produced more than [`MAX_FRAME_BYTES`] bytes.
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_BYTES} byte cap")]
    Oversized(usize),

    /// The frame body was not a valid message.
    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Encodes `message` and writes it as one frame.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), WireError> {
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(WireError::Oversized(body.len()));
    }
    let mut frame = BytesMut::with_capacity(4 + body.len());
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Reads one frame and decodes its body.
///
/// A clean end-of-stream before the length prefix surfaces as
/// `WireError::Io` with [`std::io::ErrorKind::UnexpectedEof`].
pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, WireError> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(WireError::Oversized(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body)?)
}

//! Packing N conversation buffers into one channel message and back.
//!
//! Client → server, per conversation in order:
//!
//! ```text
//! [done:u8][len:u32 LE][len bytes]
//! ```
//!
//! Server → client, per conversation in order:
//!
//! ```text
//! [len:u32 LE][len bytes]
//! ```
//!
//! There is no overall length prefix; the channel message boundary ends the
//! frame list.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use zeroize::Zeroizing;

use crate::error::{AuthError, Result};

/// One conversation's contribution to an outbound message.
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    pub done: bool,
    pub payload: &'a [u8],
}

/// Encode client segments in conversation order.
///
/// The result can carry credentials (PLAIN sends the password), so it is
/// wiped when dropped.
pub fn encode_client_payload<'a, I>(segments: I) -> Result<Zeroizing<Vec<u8>>>
where
    I: IntoIterator<Item = Segment<'a>>,
{
    let mut buf = Zeroizing::new(Vec::new());
    for (i, seg) in segments.into_iter().enumerate() {
        let len = frame_len(i, seg.payload.len())?;
        buf.reserve(5 + seg.payload.len());
        buf.put_u8(u8::from(seg.done));
        buf.put_u32_le(len);
        buf.put_slice(seg.payload);
    }
    Ok(buf)
}

/// Decode exactly `count` server segments, each at most `max_len` bytes.
///
/// Segments are zero-copy slices of `payload`.
pub fn decode_server_payload(payload: Bytes, count: usize, max_len: usize) -> Result<Vec<Bytes>> {
    let mut b = payload;
    let mut out = Vec::with_capacity(count);

    for i in 0..count {
        if b.remaining() < 4 {
            return Err(AuthError::Framing(format!(
                "server payload truncated in length of conversation {i}"
            )));
        }
        let len = b.get_u32_le() as usize;
        if len > max_len {
            return Err(AuthError::Framing(format!(
                "conversation {i} payload of {len} bytes exceeds limit of {max_len}"
            )));
        }
        if b.remaining() < len {
            return Err(AuthError::Framing(format!(
                "conversation {i} payload truncated: {} of {len} bytes",
                b.remaining()
            )));
        }
        out.push(b.split_to(len));
    }

    if b.has_remaining() {
        return Err(AuthError::Framing(format!(
            "{} trailing bytes after {count} conversations",
            b.remaining()
        )));
    }

    Ok(out)
}

/// Decode a client message. Not used by the client itself; handy for
/// inspecting traffic and for scripted servers in tests.
pub fn decode_client_payload(payload: Bytes, count: usize) -> Result<Vec<(bool, Bytes)>> {
    let mut b = payload;
    let mut out = Vec::with_capacity(count);

    for i in 0..count {
        if b.remaining() < 5 {
            return Err(AuthError::Framing(format!(
                "client payload truncated in header of conversation {i}"
            )));
        }
        let done = b.get_u8() != 0;
        let len = b.get_u32_le() as usize;
        if b.remaining() < len {
            return Err(AuthError::Framing(format!(
                "conversation {i} payload truncated: {} of {len} bytes",
                b.remaining()
            )));
        }
        out.push((done, b.split_to(len)));
    }

    if b.has_remaining() {
        return Err(AuthError::Framing(format!(
            "{} trailing bytes after {count} conversations",
            b.remaining()
        )));
    }

    Ok(out)
}

/// Encode server segments. The inverse of [`decode_server_payload`].
pub fn encode_server_payload<'a, I>(segments: I) -> Result<Bytes>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut buf = BytesMut::new();
    for (i, seg) in segments.into_iter().enumerate() {
        buf.put_u32_le(frame_len(i, seg.len())?);
        buf.put_slice(seg);
    }
    Ok(buf.freeze())
}

/// Wire length prefix for conversation `i`.
fn frame_len(i: usize, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        AuthError::Framing(format!(
            "conversation {i} payload of {len} bytes does not fit a 32-bit length"
        ))
    })
}

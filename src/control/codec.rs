//! Length-prefixed bincode framing for the control channel.

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{ControlError, ControlResult};

/// Upper bound on a single frame. State snapshots carry the whole
/// graph, so the limit is generous.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Append one frame (u32 big-endian length + bincode body) to `buf`.
pub fn encode_frame<T: Serialize>(message: &T, buf: &mut BytesMut) -> ControlResult<()> {
    let body = bincode::serialize(message)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(ControlError::Oversized(body.len()));
    }
    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);
    Ok(())
}

/// Try to decode one frame from `buf`. Returns `Ok(None)` when the
/// buffer does not yet hold a complete frame.
pub fn decode_frame<T: DeserializeOwned>(buf: &mut BytesMut) -> ControlResult<Option<T>> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ControlError::Oversized(len));
    }
    if buf.len() < 4 + len {
        return Ok(None);
    }
    buf.advance(4);
    let body = buf.split_to(len);
    Ok(Some(bincode::deserialize(&body)?))
}

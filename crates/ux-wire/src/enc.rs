//! Shared binary encoding primitives.
//!
//! All multi-byte integers are little-endian. Variable-length fields are
//! prefixed with a u32 length; optional fields with a one-byte flag.

use crate::{WireError, WireResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Sanity cap on decoded collection lengths, to bound allocations from
/// hostile length prefixes before the frame-size check applies.
pub(crate) const MAX_DECODED_ITEMS: usize = 1 << 20;

pub(crate) fn need(buf: &Bytes, n: usize, what: &str) -> WireResult<()> {
    if buf.remaining() < n {
        return Err(WireError::Decode(format!(
            "truncated {}: need {} bytes, have {}",
            what,
            n,
            buf.remaining()
        )));
    }
    Ok(())
}

pub(crate) fn get_u8(buf: &mut Bytes, what: &str) -> WireResult<u8> {
    need(buf, 1, what)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_u16(buf: &mut Bytes, what: &str) -> WireResult<u16> {
    need(buf, 2, what)?;
    Ok(buf.get_u16_le())
}

pub(crate) fn get_u32(buf: &mut Bytes, what: &str) -> WireResult<u32> {
    need(buf, 4, what)?;
    Ok(buf.get_u32_le())
}

pub(crate) fn get_u64(buf: &mut Bytes, what: &str) -> WireResult<u64> {
    need(buf, 8, what)?;
    Ok(buf.get_u64_le())
}

/// Decode a u32 count prefix, rejecting absurd values.
pub(crate) fn get_count(buf: &mut Bytes, what: &str) -> WireResult<usize> {
    let count = get_u32(buf, what)? as usize;
    if count > MAX_DECODED_ITEMS {
        return Err(WireError::Decode(format!(
            "implausible {} count: {}",
            what, count
        )));
    }
    Ok(count)
}

pub(crate) fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32_le(bytes.len() as u32);
    buf.put_slice(bytes);
}

pub(crate) fn get_bytes(buf: &mut Bytes, what: &str) -> WireResult<Vec<u8>> {
    let len = get_count(buf, what)?;
    need(buf, len, what)?;
    Ok(buf.copy_to_bytes(len).to_vec())
}

pub(crate) fn put_string(buf: &mut BytesMut, s: &str) {
    put_bytes(buf, s.as_bytes());
}

pub(crate) fn get_string(buf: &mut Bytes, what: &str) -> WireResult<String> {
    let bytes = get_bytes(buf, what)?;
    String::from_utf8(bytes).map_err(|_| WireError::Decode(format!("{} is not UTF-8", what)))
}

/// Read a fixed-width byte array (no length prefix).
pub(crate) fn get_array<const N: usize>(buf: &mut Bytes, what: &str) -> WireResult<[u8; N]> {
    need(buf, N, what)?;
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

pub(crate) fn put_option<T, F: FnOnce(&mut BytesMut, &T)>(
    buf: &mut BytesMut,
    value: &Option<T>,
    put: F,
) {
    match value {
        Some(v) => {
            buf.put_u8(1);
            put(buf, v);
        }
        None => buf.put_u8(0),
    }
}

pub(crate) fn get_option<T, F: FnOnce(&mut Bytes) -> WireResult<T>>(
    buf: &mut Bytes,
    what: &str,
    get: F,
) -> WireResult<Option<T>> {
    match get_u8(buf, what)? {
        0 => Ok(None),
        1 => Ok(Some(get(buf)?)),
        other => Err(WireError::Decode(format!(
            "bad option flag for {}: {}",
            what, other
        ))),
    }
}

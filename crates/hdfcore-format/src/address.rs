//! File address codec.
//!
//! Addresses are little-endian unsigned offsets whose on-disk width is fixed
//! per file. A width of all `0xFF` bytes is the undefined address.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::error::FormatError;

/// In-memory value of the undefined address.
pub const UNDEFINED_ADDR: u64 = u64::MAX;

/// Widest address the codec accepts on disk.
pub const MAX_ADDRESS_WIDTH: usize = 16;

const MEM_WIDTH: usize = core::mem::size_of::<u64>();

fn check_width(width: usize) -> Result<(), FormatError> {
    if width == 0 || width > MAX_ADDRESS_WIDTH {
        return Err(FormatError::InvalidAddressWidth(width));
    }
    Ok(())
}

/// True if `addr` is the undefined sentinel.
pub fn is_undefined(addr: u64) -> bool {
    addr == UNDEFINED_ADDR
}

/// Encode `addr` into exactly `out.len()` bytes.
///
/// The undefined address is written as all `0xFF`. A defined address that
/// needs more bytes than the width offers is rejected, as is a defined
/// address whose encoding would collide with the sentinel.
pub fn encode_into(addr: u64, out: &mut [u8]) -> Result<(), FormatError> {
    let width = out.len();
    check_width(width)?;
    if is_undefined(addr) {
        out.fill(0xFF);
        return Ok(());
    }
    if width < MEM_WIDTH && addr >> (width * 8) != 0 {
        return Err(FormatError::AddressOverflow {
            address: addr,
            width,
        });
    }
    if width < MEM_WIDTH && addr == (1u64 << (width * 8)) - 1 {
        return Err(FormatError::AddressOverflow {
            address: addr,
            width,
        });
    }
    let bytes = addr.to_le_bytes();
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = if i < MEM_WIDTH { bytes[i] } else { 0 };
    }
    Ok(())
}

/// Append the encoding of `addr` with the given width to `buf`.
pub fn encode(addr: u64, width: usize, buf: &mut Vec<u8>) -> Result<(), FormatError> {
    check_width(width)?;
    let start = buf.len();
    buf.resize(start + width, 0);
    if let Err(e) = encode_into(addr, &mut buf[start..]) {
        buf.truncate(start);
        return Err(e);
    }
    Ok(())
}

/// Decode an address of `data.len()` bytes.
///
/// All `0xFF` yields [`UNDEFINED_ADDR`]. Bytes beyond the 64-bit in-memory
/// width must be zero.
pub fn decode(data: &[u8]) -> Result<u64, FormatError> {
    let width = data.len();
    check_width(width)?;
    if data.iter().all(|&b| b == 0xFF) {
        return Ok(UNDEFINED_ADDR);
    }
    if width > MEM_WIDTH && data[MEM_WIDTH..].iter().any(|&b| b != 0) {
        return Err(FormatError::AddressHighBytes);
    }
    let mut bytes = [0u8; MEM_WIDTH];
    let n = width.min(MEM_WIDTH);
    bytes[..n].copy_from_slice(&data[..n]);
    Ok(u64::from_le_bytes(bytes))
}

/// Decode an address of `width` bytes at `pos`, returning the new position.
pub fn decode_at(data: &[u8], pos: usize, width: usize) -> Result<(u64, usize), FormatError> {
    check_width(width)?;
    let end = pos.checked_add(width).ok_or(FormatError::UnexpectedEof {
        expected: usize::MAX,
        available: data.len(),
    })?;
    if end > data.len() {
        return Err(FormatError::UnexpectedEof {
            expected: end,
            available: data.len(),
        });
    }
    Ok((decode(&data[pos..end])?, end))
}

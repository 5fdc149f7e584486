//! Format signature: the eight magic bytes that open every container.
//!
//! A container may carry a user block in front of the superblock, so the
//! signature is looked for at offset 0 and then at 512, 1024, 2048, ...

use crate::error::FormatError;

pub const SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1A, b'\n'];

/// Whether `bytes` starts with the signature.
pub fn is_signature(bytes: &[u8]) -> bool {
    bytes.get(..SIGNATURE.len()) == Some(&SIGNATURE[..])
}

/// Offsets the superblock may sit at within a store of `len` bytes.
pub fn candidate_offsets(len: u64) -> impl Iterator<Item = u64> {
    core::iter::once(0)
        .chain(core::iter::successors(Some(512u64), |o| o.checked_mul(2)))
        .take_while(move |o| o.saturating_add(SIGNATURE.len() as u64) <= len)
}

/// Offset of the first signature in `data`.
pub fn find_signature(data: &[u8]) -> Result<usize, FormatError> {
    candidate_offsets(data.len() as u64)
        .map(|o| o as usize)
        .find(|&o| is_signature(&data[o..]))
        .ok_or(FormatError::SignatureNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_double_after_the_first_block() {
        let offsets: Vec<u64> = candidate_offsets(5000).collect();
        assert_eq!(offsets, [0, 512, 1024, 2048, 4096]);
        assert_eq!(candidate_offsets(4).count(), 0);
    }

    #[test]
    fn found_behind_a_user_block() {
        let mut data = vec![0u8; 2048];
        data[1024..1032].copy_from_slice(&SIGNATURE);
        assert_eq!(find_signature(&data), Ok(1024));
        assert!(!is_signature(&data));
        assert!(is_signature(&data[1024..]));
    }

    #[test]
    fn short_or_blank_input() {
        assert!(!is_signature(&SIGNATURE[..7]));
        assert_eq!(find_signature(&[0u8; 600]), Err(FormatError::SignatureNotFound));
    }
}

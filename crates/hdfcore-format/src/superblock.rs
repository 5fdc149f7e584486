//! Superblock root record, versions 2 and 3.
//!
//! Layout: signature(8), version(1), offset size(1), length size(1),
//! status flags(1), base address, extension address, end-of-file address,
//! root object address (each `offset size` bytes), lookup3 checksum(4).

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use byteorder::{ByteOrder, LittleEndian};

use crate::address;
use crate::checksum;
use crate::error::FormatError;
use crate::signature::{is_signature, SIGNATURE};

/// File opened for writing.
pub const STATUS_WRITE_ACCESS: u8 = 0x01;
/// File closed cleanly. Unused by the core but preserved on rewrite.
pub const STATUS_FILE_OK: u8 = 0x02;
/// File opened by a single-writer/multiple-reader writer.
pub const STATUS_SWMR_WRITE_ACCESS: u8 = 0x04;

/// Oldest superblock version this crate writes.
pub const MIN_VERSION: u8 = 2;
/// Version that persists access status flags.
pub const STATUS_FLAGS_VERSION: u8 = 3;

/// The file's root record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Superblock version (2 or 3).
    pub version: u8,
    /// Size of file addresses in bytes.
    pub offset_size: u8,
    /// Size of lengths in bytes.
    pub length_size: u8,
    /// Access status flags (version 3 only, zero otherwise).
    pub status_flags: u8,
    /// Base address for all relative addresses.
    pub base_address: u64,
    /// Superblock extension address, undefined when absent.
    pub extension_address: u64,
    /// End-of-file address: the end of allocated space.
    pub eof_address: u64,
    /// Address of the root group's object header.
    pub root_address: u64,
}

fn validate_sizes(offset_size: u8, length_size: u8) -> Result<(), FormatError> {
    if !matches!(offset_size, 2 | 4 | 8) {
        return Err(FormatError::InvalidOffsetSize(offset_size));
    }
    if !matches!(length_size, 2 | 4 | 8) {
        return Err(FormatError::InvalidLengthSize(length_size));
    }
    Ok(())
}

impl Superblock {
    /// A fresh superblock with undefined addresses.
    pub fn new(version: u8, offset_size: u8, length_size: u8) -> Self {
        Self {
            version,
            offset_size,
            length_size,
            status_flags: 0,
            base_address: 0,
            extension_address: address::UNDEFINED_ADDR,
            eof_address: 0,
            root_address: address::UNDEFINED_ADDR,
        }
    }

    /// Encoded size for the given address width.
    pub fn encoded_len(offset_size: u8) -> usize {
        12 + 4 * offset_size as usize + 4
    }

    /// Bytes needed to learn the address width: signature through sizes.
    pub const PREFIX_LEN: usize = 11;

    /// Serialize with a trailing checksum.
    pub fn encode(&self) -> Result<Vec<u8>, FormatError> {
        validate_sizes(self.offset_size, self.length_size)?;
        if !(MIN_VERSION..=STATUS_FLAGS_VERSION).contains(&self.version) {
            return Err(FormatError::UnsupportedVersion(self.version));
        }
        let os = self.offset_size as usize;
        let mut buf = Vec::with_capacity(Self::encoded_len(self.offset_size));
        buf.extend_from_slice(&SIGNATURE);
        buf.push(self.version);
        buf.push(self.offset_size);
        buf.push(self.length_size);
        buf.push(if self.version >= STATUS_FLAGS_VERSION {
            self.status_flags
        } else {
            0
        });
        for addr in [
            self.base_address,
            self.extension_address,
            self.eof_address,
            self.root_address,
        ] {
            address::encode(addr, os, &mut buf)?;
        }
        let sum = checksum::lookup3(&buf);
        buf.extend_from_slice(&sum.to_le_bytes());
        Ok(buf)
    }

    /// Parse a superblock at the start of `d`, verifying its checksum.
    pub fn decode(d: &[u8]) -> Result<Superblock, FormatError> {
        if d.len() < 12 {
            return Err(FormatError::UnexpectedEof {
                expected: 12,
                available: d.len(),
            });
        }
        if !is_signature(d) {
            return Err(FormatError::SignatureNotFound);
        }
        let version = d[8];
        if !(MIN_VERSION..=STATUS_FLAGS_VERSION).contains(&version) {
            return Err(FormatError::UnsupportedVersion(version));
        }
        let offset_size = d[9];
        let length_size = d[10];
        validate_sizes(offset_size, length_size)?;
        let status_flags = d[11];

        let os = offset_size as usize;
        let total = Self::encoded_len(offset_size);
        if d.len() < total {
            return Err(FormatError::UnexpectedEof {
                expected: total,
                available: d.len(),
            });
        }
        let mut pos = 12;
        let mut addrs = [0u64; 4];
        for slot in addrs.iter_mut() {
            let (a, next) = address::decode_at(d, pos, os)?;
            *slot = a;
            pos = next;
        }
        let stored = LittleEndian::read_u32(&d[pos..pos + 4]);
        checksum::verify(&d[..pos], stored)?;

        Ok(Superblock {
            version,
            offset_size,
            length_size,
            status_flags: if version >= STATUS_FLAGS_VERSION {
                status_flags
            } else {
                0
            },
            base_address: addrs[0],
            extension_address: addrs[1],
            eof_address: addrs[2],
            root_address: addrs[3],
        })
    }

    /// Whether any writer has stamped this superblock.
    pub fn write_stamped(&self) -> bool {
        self.status_flags & (STATUS_WRITE_ACCESS | STATUS_SWMR_WRITE_ACCESS) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(version: u8, os: u8) -> Superblock {
        let mut sb = Superblock::new(version, os, 8);
        sb.eof_address = 4096;
        sb.root_address = 48;
        sb
    }

    #[test]
    fn v2_round_trip() {
        let sb = sample(2, 8);
        let bytes = sb.encode().unwrap();
        assert_eq!(bytes.len(), Superblock::encoded_len(8));
        assert_eq!(Superblock::decode(&bytes).unwrap(), sb);
    }

    #[test]
    fn v3_keeps_status_flags() {
        let mut sb = sample(3, 4);
        sb.status_flags = STATUS_WRITE_ACCESS | STATUS_SWMR_WRITE_ACCESS;
        let bytes = sb.encode().unwrap();
        let back = Superblock::decode(&bytes).unwrap();
        assert!(back.write_stamped());
        assert_eq!(back.status_flags, 0x05);
    }

    #[test]
    fn v2_drops_status_flags() {
        let mut sb = sample(2, 8);
        sb.status_flags = STATUS_WRITE_ACCESS;
        let back = Superblock::decode(&sb.encode().unwrap()).unwrap();
        assert_eq!(back.status_flags, 0);
    }

    #[test]
    fn corrupted_checksum() {
        let mut bytes = sample(2, 8).encode().unwrap();
        bytes[20] ^= 0xFF;
        assert!(matches!(
            Superblock::decode(&bytes),
            Err(FormatError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn truncated() {
        let bytes = sample(3, 8).encode().unwrap();
        assert!(Superblock::decode(&bytes[..bytes.len() - 1])
            .unwrap_err()
            .is_overflow());
    }

    #[test]
    fn bad_version() {
        let mut bytes = sample(2, 8).encode().unwrap();
        bytes[8] = 7;
        assert_eq!(
            Superblock::decode(&bytes),
            Err(FormatError::UnsupportedVersion(7))
        );
    }
}

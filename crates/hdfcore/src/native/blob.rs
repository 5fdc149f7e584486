//! Blobs: raw byte runs addressed by `address(8) length(8)` little-endian.

use hdfcore_format::UNDEFINED_ADDR;
use tracing::trace;

use super::{file_top, NativeConnector};
use crate::error::{Category, Error, ErrorKind, Result};
use crate::file::alloc::AllocKind;
use crate::vol::{BlobClass, BlobId, BlobSpecific, BlobSpecificOut, CallCtx, VolObject};

fn encode_id(addr: u64, len: u64) -> BlobId {
    let mut id = [0u8; 16];
    id[..8].copy_from_slice(&addr.to_le_bytes());
    id[8..].copy_from_slice(&len.to_le_bytes());
    BlobId(id)
}

fn decode_id(id: &BlobId) -> (u64, u64) {
    let mut a = [0u8; 8];
    let mut l = [0u8; 8];
    a.copy_from_slice(&id.0[..8]);
    l.copy_from_slice(&id.0[8..]);
    (u64::from_le_bytes(a), u64::from_le_bytes(l))
}

impl BlobClass for NativeConnector {
    fn put(&self, _cx: &mut CallCtx, file: &VolObject, data: &[u8]) -> Result<BlobId> {
        let top = file_top(file, Category::Blob)?;
        if data.is_empty() {
            return Ok(encode_id(UNDEFINED_ADDR, 0));
        }
        let len = data.len() as u64;
        let addr = top.with_shared(|s| {
            let addr = s.allocate(AllocKind::Raw, len)?;
            s.raw_write(addr, data)?;
            Ok(addr)
        })?;
        trace!(addr, len, "blob stored");
        Ok(encode_id(addr, len))
    }

    fn get(&self, _cx: &mut CallCtx, file: &VolObject, id: &BlobId) -> Result<Vec<u8>> {
        let (addr, len) = decode_id(id);
        if addr == UNDEFINED_ADDR {
            return Ok(Vec::new());
        }
        let len = usize::try_from(len)
            .map_err(|_| Error::new(Category::Blob, ErrorKind::Overflow, "blob too large"))?;
        let top = file_top(file, Category::Blob)?;
        let mut buf = vec![0u8; len];
        top.with_shared(|s| s.raw_read(addr, &mut buf))?;
        Ok(buf)
    }

    fn specific(
        &self,
        _cx: &mut CallCtx,
        file: &VolObject,
        op: BlobSpecific<'_>,
    ) -> Result<BlobSpecificOut> {
        match op {
            BlobSpecific::Size(id) => Ok(BlobSpecificOut::Size(decode_id(id).1)),
            BlobSpecific::IsNull(id) => Ok(BlobSpecificOut::Bool(decode_id(id).0 == UNDEFINED_ADDR)),
            BlobSpecific::Delete(id) => {
                let (addr, len) = decode_id(id);
                if addr != UNDEFINED_ADDR {
                    file_top(file, Category::Blob)?.with_shared(|s| s.free(addr, len))?;
                }
                Ok(BlobSpecificOut::Done)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_layout() {
        let id = encode_id(0x40, 5);
        assert_eq!(id.0[0], 0x40);
        assert_eq!(id.0[8], 5);
        assert_eq!(decode_id(&id), (0x40, 5));
    }
}

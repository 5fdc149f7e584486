//! File space allocation.
//!
//! Space is handed out from the end of allocation (EOA). Small metadata
//! allocations come from an aggregation block so they cluster together;
//! the unused tail of the block goes back when the file closes. Freed
//! ranges go on a free list and are merged with their neighbors; a free
//! range that reaches EOA shrinks it.

use std::collections::BTreeMap;

use crate::error::{Category, Error, ErrorKind, Result};

fn align_up(addr: u64, align: u64) -> u64 {
    match addr % align {
        0 => addr,
        r => addr + (align - r),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AllocKind {
    Meta,
    Raw,
}

#[derive(Debug)]
pub(crate) struct Allocator {
    eoa: u64,
    max_addr: u64,
    /// Unused part of the metadata block: `[next, end)`.
    meta_block: Option<(u64, u64)>,
    meta_block_size: u64,
    align_threshold: u64,
    alignment: u64,
    free: BTreeMap<u64, u64>,
}

impl Allocator {
    pub fn new(eoa: u64, max_addr: u64, meta_block_size: u64, align_threshold: u64, alignment: u64) -> Self {
        Self {
            eoa,
            max_addr,
            meta_block: None,
            meta_block_size,
            align_threshold,
            alignment: alignment.max(1),
            free: BTreeMap::new(),
        }
    }

    pub fn eoa(&self) -> u64 {
        self.eoa
    }

    /// Bytes on the free list plus the unused part of the metadata block.
    pub fn free_space(&self) -> u64 {
        let block = self.meta_block.map_or(0, |(next, end)| end - next);
        self.free.values().sum::<u64>() + block
    }

    fn extend(&mut self, size: u64) -> Result<u64> {
        let addr = self.eoa;
        let end = addr.checked_add(size).filter(|e| *e <= self.max_addr).ok_or_else(|| {
            Error::new(
                Category::Resource,
                ErrorKind::ResourceExhausted,
                format!("allocating {size} bytes at {addr} exceeds the address space"),
            )
        })?;
        self.eoa = end;
        Ok(addr)
    }

    fn from_free_list(&mut self, size: u64, align: u64) -> Option<u64> {
        let (start, len, addr) = self.free.iter().find_map(|(&start, &len)| {
            let addr = align_up(start, align);
            (addr + size <= start + len).then_some((start, len, addr))
        })?;
        self.free.remove(&start);
        if addr > start {
            self.free.insert(start, addr - start);
        }
        let tail = start + len - (addr + size);
        if tail > 0 {
            self.free.insert(addr + size, tail);
        }
        Some(addr)
    }

    pub fn allocate(&mut self, kind: AllocKind, size: u64) -> Result<u64> {
        if size == 0 {
            return Err(Error::args(Category::Resource, "zero-size allocation"));
        }
        let align = match kind {
            AllocKind::Raw if size >= self.align_threshold => self.alignment,
            _ => 1,
        };
        if let Some(addr) = self.from_free_list(size, align) {
            return Ok(addr);
        }
        match kind {
            AllocKind::Meta => self.allocate_meta(size),
            AllocKind::Raw => {
                let aligned = align_up(self.eoa, align);
                if aligned > self.eoa {
                    let gap = aligned - self.eoa;
                    let start = self.extend(gap)?;
                    self.free_range(start, gap);
                    self.eoa = aligned;
                }
                self.extend(size)
            }
        }
    }

    fn allocate_meta(&mut self, size: u64) -> Result<u64> {
        if let Some((next, end)) = self.meta_block {
            if next + size <= end {
                self.meta_block = Some((next + size, end));
                return Ok(next);
            }
        }
        if self.meta_block_size == 0 || size >= self.meta_block_size {
            return self.extend(size);
        }
        if let Some((next, end)) = self.meta_block.take() {
            if end == self.eoa {
                // The old block is at the tail; grow it in place.
                self.eoa = next;
            } else if end > next {
                self.free_range(next, end - next);
            }
        }
        let start = self.extend(self.meta_block_size)?;
        self.meta_block = Some((start + size, start + self.meta_block_size));
        Ok(start)
    }

    fn free_range(&mut self, addr: u64, size: u64) {
        let mut start = addr;
        let mut len = size;
        if let Some((&prev, &plen)) = self.free.range(..start).next_back() {
            if prev + plen == start {
                self.free.remove(&prev);
                start = prev;
                len += plen;
            }
        }
        if let Some(&next_len) = self.free.get(&(start + len)) {
            self.free.remove(&(start + len));
            len += next_len;
        }
        self.free.insert(start, len);
    }

    /// Return `[addr, addr + size)` to the free list.
    pub fn free(&mut self, addr: u64, size: u64) {
        if size == 0 {
            return;
        }
        self.free_range(addr, size);
        self.shrink_tail();
    }

    fn shrink_tail(&mut self) {
        while let Some((&start, &len)) = self.free.iter().next_back() {
            if start + len != self.eoa {
                break;
            }
            self.free.remove(&start);
            self.eoa = start;
        }
    }

    /// Give back the unused part of the metadata block so EOA matches the
    /// end of written data.
    pub fn release_aggregators(&mut self) {
        if let Some((next, end)) = self.meta_block.take() {
            if end == self.eoa {
                self.eoa = next;
            } else if end > next {
                self.free_range(next, end - next);
            }
        }
        self.shrink_tail();
    }

    pub fn clear_free_list(&mut self) {
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc() -> Allocator {
        Allocator::new(64, u64::MAX, 256, 1024, 512)
    }

    #[test]
    fn metadata_comes_from_block() {
        let mut a = alloc();
        let x = a.allocate(AllocKind::Meta, 40).unwrap();
        let y = a.allocate(AllocKind::Meta, 40).unwrap();
        assert_eq!((x, y), (64, 104));
        assert_eq!(a.eoa(), 64 + 256);
        a.release_aggregators();
        assert_eq!(a.eoa(), 144);
        assert_eq!(a.free_space(), 0);
    }

    #[test]
    fn large_raw_is_aligned() {
        let mut a = alloc();
        let r = a.allocate(AllocKind::Raw, 2048).unwrap();
        assert_eq!(r, 512);
        assert_eq!(a.free_space(), 512 - 64);
        let small = a.allocate(AllocKind::Raw, 100).unwrap();
        assert_eq!(small, 64);
    }

    #[test]
    fn free_merges_and_shrinks() {
        let mut a = Allocator::new(0, u64::MAX, 0, 1, 1);
        let x = a.allocate(AllocKind::Raw, 10).unwrap();
        let y = a.allocate(AllocKind::Raw, 10).unwrap();
        let z = a.allocate(AllocKind::Raw, 10).unwrap();
        a.free(x, 10);
        a.free(y, 10);
        assert_eq!(a.free_space(), 20);
        assert_eq!(a.allocate(AllocKind::Raw, 15).unwrap(), 0);
        a.free(z, 10);
        assert_eq!(a.eoa(), 15);
    }

    #[test]
    fn address_space_limit() {
        let mut a = Allocator::new(0, 100, 0, 1, 1);
        assert!(a.allocate(AllocKind::Raw, 101).is_err());
        assert!(a.allocate(AllocKind::Raw, 0).is_err());
    }
}

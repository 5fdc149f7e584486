//! Metadata cache.
//!
//! Holds encoded metadata images keyed by file address. Entries are written
//! back in address order on flush. When the cache grows past its byte
//! budget, the least recently used clean, unpinned entries are evicted
//! first.

use std::collections::BTreeMap;

use hdfcore_io::MemType;
use tracing::{debug, warn};

use crate::error::Result;

struct Entry {
    image: Vec<u8>,
    ty: MemType,
    dirty: bool,
    pinned: bool,
    last_access: u64,
}

/// Counters for cache activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub writes: u64,
    /// Images held when the counters were read.
    pub entries: usize,
    pub bytes: usize,
}

pub(crate) struct MetadataCache {
    entries: BTreeMap<u64, Entry>,
    budget: usize,
    bytes: usize,
    tick: u64,
    stats: CacheStats,
}

impl MetadataCache {
    pub fn new(budget: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            budget,
            bytes: 0,
            tick: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            bytes: self.bytes(),
            ..self.stats
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn get(&mut self, addr: u64) -> Option<&[u8]> {
        self.tick += 1;
        let tick = self.tick;
        match self.entries.get_mut(&addr) {
            Some(e) => {
                self.stats.hits += 1;
                e.last_access = tick;
                Some(&e.image)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Insert or replace the image at `addr`. A replaced entry keeps its pin.
    pub fn insert(&mut self, addr: u64, ty: MemType, image: Vec<u8>, dirty: bool) {
        self.tick += 1;
        let len = image.len();
        let pinned = match self.entries.remove(&addr) {
            Some(old) => {
                self.bytes -= old.image.len();
                old.pinned
            }
            None => false,
        };
        self.bytes += len;
        self.entries.insert(
            addr,
            Entry {
                image,
                ty,
                dirty,
                pinned,
                last_access: self.tick,
            },
        );
    }

    pub fn pin(&mut self, addr: u64) {
        if let Some(e) = self.entries.get_mut(&addr) {
            e.pinned = true;
        }
    }

    /// Drop an entry whatever its state. Used when the space is freed.
    pub fn remove(&mut self, addr: u64) -> bool {
        match self.entries.remove(&addr) {
            Some(e) => {
                self.bytes -= e.image.len();
                true
            }
            None => false,
        }
    }

    pub fn over_budget(&self) -> bool {
        self.bytes > self.budget
    }

    /// Evict clean, unpinned entries oldest first until within budget.
    pub fn evict_lru_clean(&mut self) -> usize {
        if !self.over_budget() {
            return 0;
        }
        let mut candidates: Vec<(u64, u64)> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.dirty && !e.pinned)
            .map(|(a, e)| (e.last_access, *a))
            .collect();
        candidates.sort_unstable();
        let mut evicted = 0;
        for (_, addr) in candidates {
            if !self.over_budget() {
                break;
            }
            self.remove(addr);
            evicted += 1;
        }
        self.stats.evictions += evicted as u64;
        evicted
    }

    /// Evict one clean, unpinned entry if present.
    pub fn evict_if_clean(&mut self, addr: u64) -> bool {
        match self.entries.get(&addr) {
            Some(e) if !e.dirty && !e.pinned => {
                self.remove(addr);
                self.stats.evictions += 1;
                true
            }
            _ => false,
        }
    }

    /// Evict every clean, unpinned entry.
    pub fn evict_clean(&mut self) -> usize {
        let addrs: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.dirty && !e.pinned)
            .map(|(a, _)| *a)
            .collect();
        for &a in &addrs {
            self.remove(a);
        }
        self.stats.evictions += addrs.len() as u64;
        addrs.len()
    }

    /// Write every dirty entry through `write`, in address order.
    pub fn flush(&mut self, mut write: impl FnMut(MemType, u64, &[u8]) -> Result<()>) -> Result<usize> {
        let mut written = 0;
        for (addr, e) in self.entries.iter_mut() {
            if e.dirty {
                write(e.ty, *addr, &e.image)?;
                e.dirty = false;
                written += 1;
            }
        }
        self.stats.writes += written as u64;
        if written > 0 {
            debug!(written, "metadata cache flushed");
        }
        Ok(written)
    }

    /// Get ready for the file to close. Cache images are not written.
    pub fn prepare_for_close(&mut self, image_requested: bool) {
        if image_requested {
            warn!(entries = self.entries.len(), "cache image requested but not supported; skipping");
        }
        for e in self.entries.values_mut() {
            e.pinned = false;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_evicts_clean_only() {
        let mut c = MetadataCache::new(10);
        c.insert(0, MemType::Superblock, vec![0; 4], false);
        c.insert(8, MemType::ObjectHeader, vec![0; 4], true);
        c.insert(16, MemType::ObjectHeader, vec![0; 4], false);
        c.get(0);
        assert!(c.over_budget());
        assert_eq!(c.evict_lru_clean(), 1);
        assert!(c.get(16).is_none());
        assert!(c.get(0).is_some());
        assert_eq!(c.flush(|_, addr, _| {
            assert_eq!(addr, 8);
            Ok(())
        }).unwrap(), 1);
    }

    #[test]
    fn flush_in_address_order() {
        let mut c = MetadataCache::new(1 << 20);
        c.insert(40, MemType::ObjectHeader, vec![4], true);
        c.insert(0, MemType::Superblock, vec![0], true);
        c.insert(20, MemType::Heap, vec![2], false);
        let mut order = Vec::new();
        let n = c
            .flush(|_, addr, _| {
                order.push(addr);
                Ok(())
            })
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(order, vec![0, 40]);
        assert_eq!(c.flush(|_, _, _| Ok(())).unwrap(), 0);
    }

    #[test]
    fn pinned_entries_survive_evict_clean() {
        let mut c = MetadataCache::new(1 << 20);
        c.insert(0, MemType::Superblock, vec![1; 8], false);
        c.pin(0);
        c.insert(8, MemType::ObjectHeader, vec![1; 8], false);
        assert_eq!(c.evict_clean(), 1);
        assert_eq!(c.len(), 1);
        c.insert(0, MemType::Superblock, vec![2; 8], true);
        c.prepare_for_close(false);
        c.flush(|_, _, _| Ok(())).unwrap();
        assert_eq!(c.evict_clean(), 1);
        assert_eq!(c.bytes(), 0);
    }

    #[test]
    fn stats_report_current_size() {
        let mut c = MetadataCache::new(1 << 20);
        c.insert(0, MemType::Superblock, vec![0; 12], true);
        c.insert(12, MemType::ObjectHeader, vec![0; 20], false);
        c.get(12);
        c.get(99);
        let s = c.stats();
        assert_eq!((s.entries, s.bytes), (2, 32));
        assert_eq!((s.hits, s.misses), (1, 1));
        c.remove(12);
        assert_eq!(c.stats().bytes, 12);
    }
}

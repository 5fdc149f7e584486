//! Page buffer between the core and a driver.
//!
//! Reads and writes go through fixed-size pages kept in memory with
//! least-recently-used eviction. Writes are held back until the page is
//! evicted or the buffer is flushed.

use std::collections::HashMap;

use tracing::trace;

use crate::driver::FileDriver;
use crate::error::Result;
use crate::flags::MemType;

struct Page {
    data: Vec<u8>,
    dirty: bool,
    last_access: u64,
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageBufferStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub writebacks: u64,
}

pub struct PageBuffer {
    page_size: u64,
    max_pages: usize,
    pages: HashMap<u64, Page>,
    tick: u64,
    stats: PageBufferStats,
}

impl PageBuffer {
    /// A buffer of `total_bytes` split into `page_size` pages. At least one
    /// page is always kept.
    pub fn new(page_size: u64, total_bytes: u64) -> Self {
        let page_size = page_size.max(1);
        let max_pages = (total_bytes / page_size).max(1) as usize;
        Self {
            page_size,
            max_pages,
            pages: HashMap::new(),
            tick: 0,
            stats: PageBufferStats::default(),
        }
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn stats(&self) -> PageBufferStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn dirty_pages(&self) -> usize {
        self.pages.values().filter(|p| p.dirty).count()
    }

    fn write_back(drv: &mut dyn FileDriver, page_size: u64, index: u64, page: &Page) -> Result<()> {
        let start = index * page_size;
        let eoa = drv.eoa(MemType::Other);
        if start >= eoa {
            return Ok(());
        }
        let len = (eoa - start).min(page_size) as usize;
        drv.write(MemType::Other, start, &page.data[..len])
    }

    fn evict_one(&mut self, drv: &mut dyn FileDriver) -> Result<()> {
        let victim = self
            .pages
            .iter()
            .min_by_key(|(_, p)| p.last_access)
            .map(|(&k, _)| k);
        if let Some(index) = victim {
            if let Some(page) = self.pages.remove(&index) {
                if page.dirty {
                    Self::write_back(drv, self.page_size, index, &page)?;
                    self.stats.writebacks += 1;
                }
                self.stats.evictions += 1;
                trace!(index, dirty = page.dirty, "page evicted");
            }
        }
        Ok(())
    }

    fn page_mut(&mut self, drv: &mut dyn FileDriver, index: u64) -> Result<&mut Page> {
        self.tick += 1;
        let tick = self.tick;
        if self.pages.contains_key(&index) {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
            while self.pages.len() >= self.max_pages {
                self.evict_one(drv)?;
            }
            let start = index * self.page_size;
            let mut data = vec![0u8; self.page_size as usize];
            let eoa = drv.eoa(MemType::Other);
            if start < eoa {
                let len = (eoa - start).min(self.page_size) as usize;
                drv.read(MemType::Other, start, &mut data[..len])?;
            }
            self.pages.insert(
                index,
                Page {
                    data,
                    dirty: false,
                    last_access: tick,
                },
            );
        }
        let page = self
            .pages
            .get_mut(&index)
            .ok_or(crate::error::DriverError::Unsupported("page lookup"))?;
        page.last_access = tick;
        Ok(page)
    }

    /// Read through the buffer.
    pub fn read(&mut self, drv: &mut dyn FileDriver, ty: MemType, addr: u64, buf: &mut [u8]) -> Result<()> {
        if ty == MemType::Raw && buf.len() as u64 >= self.page_size {
            // Large raw reads bypass the buffer, but must see dirty pages.
            self.flush(drv)?;
            return drv.read(ty, addr, buf);
        }
        let mut done = 0usize;
        while done < buf.len() {
            let pos = addr + done as u64;
            let index = pos / self.page_size;
            let within = (pos % self.page_size) as usize;
            let n = (self.page_size as usize - within).min(buf.len() - done);
            let page = self.page_mut(drv, index)?;
            buf[done..done + n].copy_from_slice(&page.data[within..within + n]);
            done += n;
        }
        Ok(())
    }

    /// Write through the buffer; pages stay dirty until flushed or evicted.
    pub fn write(&mut self, drv: &mut dyn FileDriver, ty: MemType, addr: u64, buf: &[u8]) -> Result<()> {
        let end = addr + buf.len() as u64;
        if end > drv.eoa(ty) {
            // Let the driver produce the range error.
            return drv.write(ty, addr, buf);
        }
        if ty == MemType::Raw && buf.len() as u64 >= self.page_size {
            self.invalidate_range(addr, end);
            return drv.write(ty, addr, buf);
        }
        let mut done = 0usize;
        while done < buf.len() {
            let pos = addr + done as u64;
            let index = pos / self.page_size;
            let within = (pos % self.page_size) as usize;
            let n = (self.page_size as usize - within).min(buf.len() - done);
            let page = self.page_mut(drv, index)?;
            page.data[within..within + n].copy_from_slice(&buf[done..done + n]);
            page.dirty = true;
            done += n;
        }
        Ok(())
    }

    fn invalidate_range(&mut self, start: u64, end: u64) {
        let first = start / self.page_size;
        let last = (end.saturating_sub(1)) / self.page_size;
        self.pages.retain(|&i, _| i < first || i > last);
    }

    /// Write every dirty page back in address order.
    pub fn flush(&mut self, drv: &mut dyn FileDriver) -> Result<()> {
        let mut dirty: Vec<u64> = self
            .pages
            .iter()
            .filter(|(_, p)| p.dirty)
            .map(|(&i, _)| i)
            .collect();
        dirty.sort_unstable();
        for index in dirty {
            if let Some(page) = self.pages.get_mut(&index) {
                Self::write_back(drv, self.page_size, index, page)?;
                page.dirty = false;
                self.stats.writebacks += 1;
            }
        }
        Ok(())
    }

    /// Drop every page. Dirty data is lost; flush first.
    pub fn clear(&mut self) {
        self.pages.clear();
    }
}

impl std::fmt::Debug for PageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageBuffer")
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .field("pages", &self.pages.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverClass;
    use crate::flags::AccessFlags;
    use crate::memory::MemoryClass;

    fn driver(class: &MemoryClass) -> Box<dyn FileDriver> {
        let mut d = class
            .open("pb", AccessFlags::RDWR | AccessFlags::CREATE, u64::MAX)
            .unwrap();
        d.set_eoa(MemType::Other, 1024).unwrap();
        d
    }

    #[test]
    fn writes_held_until_flush() {
        let class = MemoryClass::new();
        let mut drv = driver(&class);
        let mut pb = PageBuffer::new(64, 256);
        pb.write(drv.as_mut(), MemType::Other, 60, b"spanning").unwrap();
        assert_eq!(class.image("pb").unwrap().len(), 0);
        assert_eq!(pb.dirty_pages(), 2);

        let mut back = [0u8; 8];
        pb.read(drv.as_mut(), MemType::Other, 60, &mut back).unwrap();
        assert_eq!(&back, b"spanning");

        pb.flush(drv.as_mut()).unwrap();
        let image = class.image("pb").unwrap();
        assert_eq!(&image[60..68], b"spanning");
        assert_eq!(pb.dirty_pages(), 0);
    }

    #[test]
    fn eviction_writes_back_dirty_page() {
        let class = MemoryClass::new();
        let mut drv = driver(&class);
        let mut pb = PageBuffer::new(64, 128);
        pb.write(drv.as_mut(), MemType::Other, 0, b"first").unwrap();
        pb.write(drv.as_mut(), MemType::Other, 64, b"second").unwrap();
        pb.write(drv.as_mut(), MemType::Other, 128, b"third").unwrap();
        assert_eq!(pb.len(), 2);
        assert_eq!(pb.stats().evictions, 1);
        assert_eq!(&class.image("pb").unwrap()[..5], b"first");
    }

    #[test]
    fn large_raw_write_bypasses() {
        let class = MemoryClass::new();
        let mut drv = driver(&class);
        let mut pb = PageBuffer::new(64, 256);
        let mut small = [0u8; 4];
        pb.read(drv.as_mut(), MemType::Other, 0, &mut small).unwrap();
        let big = vec![7u8; 128];
        pb.write(drv.as_mut(), MemType::Raw, 0, &big).unwrap();
        assert!(pb.is_empty());
        pb.read(drv.as_mut(), MemType::Other, 0, &mut small).unwrap();
        assert_eq!(small, [7u8; 4]);
    }
}

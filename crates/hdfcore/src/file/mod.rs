//! File objects and their lifecycle.
//!
//! An open file is two objects. A [`SharedFile`] holds the state of one
//! backing store: the driver handle, metadata cache, allocator and
//! superblock. Every open call gets its own [`FileTop`] pointing at a
//! shared file; a second open of a store that is already open joins the
//! existing shared file instead of opening the driver again.
//!
//! Locks are taken top handle first, then shared state, and never held
//! across a connector dispatch.

pub(crate) mod accounting;
pub(crate) mod alloc;
pub(crate) mod close;
pub(crate) mod efc;
pub(crate) mod intent;
pub(crate) mod mount;
pub(crate) mod open;
pub(crate) mod prefix;
pub(crate) mod registry;
pub(crate) mod swmr;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use byteorder::{ByteOrder, LittleEndian};
use hdfcore_format::{checksum, DecodeOptions, EncodeOptions, FormatError, Superblock};
use hdfcore_io::{AccessFlags, CloseDegree, FileDriver, FileIdentity, MemType, PageBuffer};
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::cache::MetadataCache;
use crate::error::{Category, Error, ErrorKind, Result};
use crate::plist::{FileAccessProps, FileCreateProps};
use crate::vol::ConnectorRef;

use alloc::{AllocKind, Allocator};
use efc::ExternalFileCache;

pub use prefix::{SearchAttempt, PREFIX_SEPARATOR};

/// Lifecycle of a shared file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Init,
    Live,
    Closing,
    Gone,
}

/// Driver handle plus the optional page buffer in front of it.
pub(crate) struct BlockIo {
    pub driver: Box<dyn FileDriver>,
    pub pb: Option<PageBuffer>,
}

impl BlockIo {
    fn read(&mut self, ty: MemType, addr: u64, buf: &mut [u8]) -> Result<()> {
        match self.pb.as_mut() {
            Some(pb) => pb.read(self.driver.as_mut(), ty, addr, buf)?,
            None => self.driver.read(ty, addr, buf)?,
        }
        Ok(())
    }

    fn write(&mut self, ty: MemType, addr: u64, buf: &[u8]) -> Result<()> {
        match self.pb.as_mut() {
            Some(pb) => pb.write(self.driver.as_mut(), ty, addr, buf)?,
            None => self.driver.write(ty, addr, buf)?,
        }
        Ok(())
    }

    fn flush(&mut self, closing: bool) -> Result<()> {
        if let Some(pb) = self.pb.as_mut() {
            pb.flush(self.driver.as_mut())?;
        }
        self.driver.flush(closing)?;
        Ok(())
    }
}

/// Histogram of metadata read retries, binned by decimal order of the
/// retry count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Retries {
    bins: Vec<u32>,
}

fn decimal_order(mut n: u32) -> usize {
    let mut order = 0;
    while n >= 10 {
        n /= 10;
        order += 1;
    }
    order
}

impl Retries {
    pub fn new(read_attempts: u32) -> Self {
        let max_retries = read_attempts.saturating_sub(1);
        let nbins = if max_retries == 0 {
            0
        } else {
            decimal_order(max_retries) + 1
        };
        Self {
            bins: vec![0; nbins],
        }
    }

    pub fn record(&mut self, retries: u32) {
        if retries == 0 || self.bins.is_empty() {
            return;
        }
        let bin = decimal_order(retries).min(self.bins.len() - 1);
        self.bins[bin] += 1;
    }

    pub fn bins(&self) -> &[u32] {
        &self.bins
    }
}

/// Open count of one object in a shared file.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct OpenEntry {
    pub count: u32,
    /// Unlinked while open; freed when the last handle closes.
    pub deleted: bool,
}

/// Append a lookup3 checksum of `buf` to it.
pub(crate) fn seal(buf: &mut Vec<u8>) {
    let sum = checksum::lookup3(buf);
    buf.extend_from_slice(&sum.to_le_bytes());
}

/// Verify the trailing checksum written by [`seal`].
pub(crate) fn check_sealed(buf: &[u8]) -> std::result::Result<(), FormatError> {
    if buf.len() < 4 {
        return Err(FormatError::UnexpectedEof {
            expected: 4,
            available: buf.len(),
        });
    }
    let (body, tail) = buf.split_at(buf.len() - 4);
    checksum::verify(body, LittleEndian::read_u32(tail))
}

/// Largest address representable with `offset_size` bytes, leaving room for
/// the undefined-address sentinel.
pub(crate) fn max_addr(offset_size: u8) -> u64 {
    match offset_size {
        0..=7 => (1u64 << (8 * offset_size as u32)) - 2,
        _ => u64::MAX - 1,
    }
}

/// State of one open backing store.
pub(crate) struct SharedState {
    pub name: String,
    pub nrefs: u32,
    pub lifecycle: Lifecycle,
    pub flags: AccessFlags,
    pub io: Option<BlockIo>,
    pub cache: MetadataCache,
    pub alloc: Allocator,
    pub superblock: Superblock,
    pub fcpl: FileCreateProps,
    pub fapl: FileAccessProps,
    /// Resolved at first open; never `Default`.
    pub close_degree: CloseDegree,
    pub read_attempts: u32,
    pub retries: Retries,
    pub efc: ExternalFileCache,
    pub open_objects: BTreeMap<u64, OpenEntry>,
    /// Directory of the file, used to resolve external references.
    pub extpath: Option<PathBuf>,
    /// Name after symlink resolution.
    pub actual_name: String,
    pub locked: bool,
    pub connector: Option<ConnectorRef>,
    /// Persist write-access status flags in the superblock.
    pub stamp_status: bool,
    /// Set while handles are detached during the SWMR transition.
    pub holding_closes: bool,
}

fn no_driver() -> Error {
    Error::internal(Category::File, "file has no driver")
}

impl SharedState {
    pub fn is_writable(&self) -> bool {
        self.flags.is_writable()
    }

    pub fn offset_size(&self) -> u8 {
        self.superblock.offset_size
    }

    pub fn root_addr(&self) -> u64 {
        self.superblock.root_address
    }

    fn io(&mut self) -> Result<&mut BlockIo> {
        self.io.as_mut().ok_or_else(no_driver)
    }

    pub fn driver(&self) -> Option<&dyn FileDriver> {
        self.io.as_ref().map(|io| io.driver.as_ref())
    }

    pub fn require_writable(&self) -> Result<()> {
        if !self.is_writable() {
            return Err(Error::new(
                Category::File,
                ErrorKind::Permission,
                format!("{} is opened read-only", self.name),
            ));
        }
        Ok(())
    }

    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions::bounds(
            self.fapl.low_bound.datatype_version(),
            self.fapl.high_bound.max_datatype_version(),
        )
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            preserve_version: false,
            relaxed_integrity: self.fapl.relaxed_integrity,
        }
    }

    /// Read a checksummed metadata image, through the cache. A checksum
    /// failure is retried up to the file's read-attempt count.
    pub fn meta_read(&mut self, ty: MemType, addr: u64, len: usize) -> Result<Vec<u8>> {
        if let Some(image) = self.cache.get(addr) {
            if image.len() == len {
                return Ok(image.to_vec());
            }
        }
        let attempts = self.read_attempts.max(1);
        let mut buf = vec![0u8; len];
        let mut retries = 0;
        loop {
            self.io()?.read(ty, addr, &mut buf)?;
            match check_sealed(&buf) {
                Ok(()) => break,
                Err(e) if retries + 1 >= attempts => return Err(e.into()),
                Err(_) => {
                    retries += 1;
                    trace!(addr, retries, "metadata checksum failed; retrying");
                }
            }
        }
        self.retries.record(retries);
        self.cache.insert(addr, ty, buf.clone(), false);
        if self.cache.over_budget() {
            self.cache.evict_lru_clean();
        }
        Ok(buf)
    }

    /// Replace the image at `addr`; it is written back on flush.
    pub fn meta_write(&mut self, ty: MemType, addr: u64, image: Vec<u8>) -> Result<()> {
        self.require_writable()?;
        self.cache.insert(addr, ty, image, true);
        if self.cache.over_budget() && self.cache.evict_lru_clean() == 0 {
            self.flush()?;
            self.cache.evict_lru_clean();
        }
        Ok(())
    }

    pub fn raw_read(&mut self, addr: u64, buf: &mut [u8]) -> Result<()> {
        self.io()?.read(MemType::Raw, addr, buf)
    }

    pub fn raw_write(&mut self, addr: u64, buf: &[u8]) -> Result<()> {
        self.require_writable()?;
        self.io()?.write(MemType::Raw, addr, buf)
    }

    pub fn allocate(&mut self, kind: AllocKind, size: u64) -> Result<u64> {
        self.require_writable()?;
        let addr = self.alloc.allocate(kind, size)?;
        let eoa = self.alloc.eoa();
        self.io()?.driver.set_eoa(MemType::Other, eoa)?;
        Ok(addr)
    }

    pub fn free(&mut self, addr: u64, size: u64) -> Result<()> {
        self.cache.remove(addr);
        self.alloc.free(addr, size);
        let eoa = self.alloc.eoa();
        self.io()?.driver.set_eoa(MemType::Other, eoa)?;
        Ok(())
    }

    pub fn is_open(&self, addr: u64) -> bool {
        self.open_objects.get(&addr).is_some_and(|e| e.count > 0)
    }

    pub fn mark_deleted(&mut self, addr: u64) {
        if let Some(e) = self.open_objects.get_mut(&addr) {
            e.deleted = true;
        }
    }

    /// Drop one open count. Returns true when the object was unlinked
    /// while open and this was its last handle.
    pub fn object_closed(&mut self, addr: u64) -> bool {
        match self.open_objects.get_mut(&addr) {
            Some(e) if e.count > 1 => {
                e.count -= 1;
                false
            }
            Some(_) => self
                .open_objects
                .remove(&addr)
                .is_some_and(|e| e.deleted),
            None => {
                warn!(addr, "closing an object that is not open");
                false
            }
        }
    }

    /// Re-encode the superblock into the cache when it changed.
    pub fn sync_superblock(&mut self) -> Result<()> {
        self.superblock.eof_address = self.alloc.eoa();
        let image = self.superblock.encode()?;
        if self.cache.get(0).map_or(true, |cur| cur != image.as_slice()) {
            self.cache.insert(0, MemType::Superblock, image, true);
            self.cache.pin(0);
        }
        Ok(())
    }

    /// Write back every dirty metadata image.
    pub fn flush(&mut self) -> Result<()> {
        if !self.is_writable() {
            return Ok(());
        }
        self.sync_superblock()?;
        let io = self.io.as_mut().ok_or_else(no_driver)?;
        self.cache.flush(|ty, addr, image| io.write(ty, addr, image))?;
        Ok(())
    }

    /// Flush metadata, the page buffer and the driver.
    pub fn flush_all(&mut self) -> Result<()> {
        self.flush()?;
        self.io()?.flush(false)
    }

    fn release_aggregators(&mut self) -> Result<()> {
        self.alloc.release_aggregators();
        let eoa = self.alloc.eoa();
        self.io()?.driver.set_eoa(MemType::Other, eoa)?;
        Ok(())
    }

    /// Final write-back of a writer: clear status flags, flush, truncate
    /// to the end of allocation, flush again.
    fn flush_for_close(&mut self) -> Result<()> {
        if self.stamp_status {
            self.superblock.status_flags &= !(hdfcore_format::superblock::STATUS_WRITE_ACCESS
                | hdfcore_format::superblock::STATUS_SWMR_WRITE_ACCESS);
        }
        self.flush()?;
        self.io()?.driver.truncate(true)?;
        self.flush()?;
        self.io()?.flush(true)
    }

    pub fn ensure_live(&self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Live => Ok(()),
            other => Err(Error::args(
                Category::File,
                format!("{} is not open ({other:?})", self.name),
            )),
        }
    }
}

/// One backing store shared by every handle that opened it.
pub(crate) struct SharedFile {
    pub identity: Option<FileIdentity>,
    pub state: Mutex<SharedState>,
}

/// A child file mounted at a group.
pub(crate) struct Mount {
    pub group_addr: u64,
    pub child: Arc<FileTop>,
}

#[derive(Default)]
pub(crate) struct TopState {
    /// Objects opened through this handle and still open.
    pub nopen_objs: usize,
    /// A user identifier names this handle.
    pub id_exists: bool,
    pub closing: bool,
    pub closed: bool,
    /// Set while a strong close force-closes dependents.
    pub forcing: bool,
    pub parent: Option<Weak<FileTop>>,
    pub mounts: Vec<Mount>,
    /// Held by a parent's mount table.
    pub mount_refs: u32,
    /// Held by an external file cache.
    pub efc_holds: u32,
}

/// One open of a file.
pub(crate) struct FileTop {
    pub shared: Arc<SharedFile>,
    pub open_name: String,
    pub state: Mutex<TopState>,
}

impl FileTop {
    pub fn new(shared: Arc<SharedFile>, open_name: &str) -> Arc<FileTop> {
        Arc::new(FileTop {
            shared,
            open_name: open_name.to_string(),
            state: Mutex::new(TopState::default()),
        })
    }

    pub fn is_live(&self) -> bool {
        let t = self.state.lock();
        !t.closing && !t.closed
    }

    /// Run `f` on the shared state of a live handle.
    pub fn with_shared<R>(&self, f: impl FnOnce(&mut SharedState) -> Result<R>) -> Result<R> {
        if !self.is_live() {
            return Err(Error::args(
                Category::File,
                format!("{} is closing", self.open_name),
            ));
        }
        let mut s = self.shared.state.lock();
        s.ensure_live()?;
        f(&mut s)
    }

    pub fn root(self: &Arc<Self>) -> Result<ObjectLoc> {
        let addr = self.with_shared(|s| Ok(s.root_addr()))?;
        Ok(ObjectLoc {
            top: self.clone(),
            addr,
        })
    }

    pub fn parent(&self) -> Option<Arc<FileTop>> {
        self.state.lock().parent.as_ref().and_then(Weak::upgrade)
    }

    /// Root of the mount hierarchy this handle belongs to.
    pub fn topmost(self: &Arc<Self>) -> Arc<FileTop> {
        let mut cur = self.clone();
        while let Some(p) = cur.parent() {
            cur = p;
        }
        cur
    }

    pub fn mounted_at(&self, group_addr: u64) -> Option<Arc<FileTop>> {
        self.state
            .lock()
            .mounts
            .iter()
            .find(|m| m.group_addr == group_addr)
            .map(|m| m.child.clone())
    }
}

/// True when `top` is `root` or mounted somewhere below it.
pub(crate) fn is_within(top: &Arc<FileTop>, root: &Arc<FileTop>) -> bool {
    let mut cur = Some(top.clone());
    while let Some(t) = cur {
        if Arc::ptr_eq(&t, root) {
            return true;
        }
        cur = t.parent();
    }
    false
}

/// Open objects reachable through `top`, including its mounted children.
pub(crate) fn reachable_open(top: &Arc<FileTop>) -> usize {
    let (own, children) = {
        let t = top.state.lock();
        let children: Vec<Arc<FileTop>> = t.mounts.iter().map(|m| m.child.clone()).collect();
        (t.nopen_objs, children)
    };
    own + children.iter().map(reachable_open).sum::<usize>()
}

/// Location of an object: the handle it was opened through and the
/// address of its header.
#[derive(Clone)]
pub(crate) struct ObjectLoc {
    pub top: Arc<FileTop>,
    pub addr: u64,
}

impl ObjectLoc {
    pub fn same_object(&self, other: &ObjectLoc) -> bool {
        Arc::ptr_eq(&self.top.shared, &other.top.shared) && self.addr == other.addr
    }
}

/// Count an object as open through `top`.
pub(crate) fn object_opened(top: &Arc<FileTop>, addr: u64) -> Result<()> {
    {
        let mut t = top.state.lock();
        if t.closing || t.closed {
            return Err(Error::args(
                Category::File,
                format!("{} is closing", top.open_name),
            ));
        }
        t.nopen_objs += 1;
    }
    top.shared
        .state
        .lock()
        .open_objects
        .entry(addr)
        .or_default()
        .count += 1;
    Ok(())
}

/// An object opened through `top` went away. A handle whose identifier was
/// already released may now be able to finish closing.
pub(crate) fn top_released(cx: &mut crate::vol::CallCtx, top: &Arc<FileTop>) -> Result<()> {
    let forcing = {
        let mut t = top.state.lock();
        t.nopen_objs = t.nopen_objs.saturating_sub(1);
        t.forcing
    };
    let holding = top.shared.state.lock().holding_closes;
    if forcing || holding {
        return Ok(());
    }
    let mut cur = Some(top.clone());
    while let Some(t) = cur {
        close::try_close(cx, &t)?;
        cur = t.parent();
    }
    Ok(())
}

/// Keeps the first failure of a sequence that must run to the end.
#[derive(Default)]
pub(crate) struct FirstError(Option<Error>);

impl FirstError {
    pub fn note<T, E: Into<Error>>(&mut self, step: &str, r: std::result::Result<T, E>) {
        if let Err(e) = r {
            let e = e.into();
            warn!(step, error = %e, "close step failed; continuing");
            self.0.get_or_insert(e);
        }
    }

    pub fn into_result(self) -> Result<()> {
        self.0.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_bins_by_magnitude() {
        let mut r = Retries::new(100);
        assert_eq!(r.bins().len(), 2);
        r.record(0);
        r.record(3);
        r.record(42);
        r.record(1000);
        assert_eq!(r.bins(), &[1, 2]);
        assert!(Retries::new(1).bins().is_empty());
    }

    #[test]
    fn sealed_images_verify() {
        let mut buf = b"OHDR-payload".to_vec();
        seal(&mut buf);
        assert!(check_sealed(&buf).is_ok());
        buf[2] ^= 1;
        assert!(check_sealed(&buf).is_err());
        assert!(check_sealed(&[1, 2]).is_err());
    }

    #[test]
    fn address_limits() {
        assert_eq!(max_addr(4), 0xFFFF_FFFE);
        assert_eq!(max_addr(8), u64::MAX - 1);
        assert_eq!(max_addr(2), 0xFFFE);
    }
}

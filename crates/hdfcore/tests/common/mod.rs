#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hdfcore::hdfcore_format::datatype::ByteOrder;
use hdfcore::hdfcore_io::{
    DriverFeatures, DriverError, FileDriver, FileIdentity, MemType, Sec2Class,
};
use hdfcore::{
    AccessFlags, CloseDegree, Datatype, DriverClass, FileAccessProps, FileCreateProps, Hid,
    Library, LibraryConfig,
};
use tracing_subscriber::EnvFilter;

/// Route library events to the test output; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn lib() -> Library {
    init_tracing();
    Library::with_config(LibraryConfig::default())
}

pub fn int32() -> Datatype {
    Datatype::integer(4, true, ByteOrder::LittleEndian)
}

pub fn path_in(dir: &Path, name: &str) -> String {
    dir.join(name).to_string_lossy().into_owned()
}

/// Create an empty container and close it again.
pub fn make_file(lib: &Library, name: &str) {
    let fid = lib
        .file_create(name, AccessFlags::TRUNC, &FileCreateProps::default(), &FileAccessProps::default())
        .unwrap();
    lib.close(fid).unwrap();
}

pub fn create_rw(lib: &Library, name: &str, fapl: &FileAccessProps) -> Hid {
    lib.file_create(name, AccessFlags::TRUNC, &FileCreateProps::default(), fapl)
        .unwrap()
}

/// Driver opens and closes seen by a [`CountingClass`].
#[derive(Debug, Default)]
pub struct Counts {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
}

impl Counts {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Sec2 driver class that counts the handles it opens and closes.
#[derive(Debug, Default)]
pub struct CountingClass {
    inner: Sec2Class,
    pub counts: Arc<Counts>,
}

/// Access properties using a fresh [`CountingClass`], and its counters.
pub fn counting_fapl() -> (FileAccessProps, Arc<Counts>) {
    let class = CountingClass::default();
    let counts = class.counts.clone();
    (FileAccessProps::default().driver(Arc::new(class)), counts)
}

#[derive(Debug)]
struct CountingDriver {
    inner: Box<dyn FileDriver>,
    counts: Arc<Counts>,
}

impl DriverClass for CountingClass {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn features(&self) -> DriverFeatures {
        self.inner.features()
    }

    fn supports_identity(&self) -> bool {
        self.inner.supports_identity()
    }

    fn supports_locking(&self) -> bool {
        self.inner.supports_locking()
    }

    fn default_close_degree(&self) -> CloseDegree {
        self.inner.default_close_degree()
    }

    fn probe(&self, name: &str) -> Result<Option<FileIdentity>, DriverError> {
        self.inner.probe(name)
    }

    fn open(&self, name: &str, flags: AccessFlags, maxaddr: u64) -> Result<Box<dyn FileDriver>, DriverError> {
        let inner = self.inner.open(name, flags, maxaddr)?;
        self.counts.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingDriver {
            inner,
            counts: self.counts.clone(),
        }))
    }

    fn delete(&self, name: &str) -> Result<(), DriverError> {
        self.inner.delete(name)
    }
}

impl FileDriver for CountingDriver {
    fn class_name(&self) -> &'static str {
        "counting"
    }

    fn features(&self) -> DriverFeatures {
        self.inner.features()
    }

    fn identity(&self) -> Option<FileIdentity> {
        self.inner.identity()
    }

    fn eoa(&self, ty: MemType) -> u64 {
        self.inner.eoa(ty)
    }

    fn set_eoa(&mut self, ty: MemType, addr: u64) -> Result<(), DriverError> {
        self.inner.set_eoa(ty, addr)
    }

    fn eof(&self, ty: MemType) -> u64 {
        self.inner.eof(ty)
    }

    fn read(&mut self, ty: MemType, addr: u64, buf: &mut [u8]) -> Result<(), DriverError> {
        self.inner.read(ty, addr, buf)
    }

    fn write(&mut self, ty: MemType, addr: u64, buf: &[u8]) -> Result<(), DriverError> {
        self.inner.write(ty, addr, buf)
    }

    fn truncate(&mut self, closing: bool) -> Result<(), DriverError> {
        self.inner.truncate(closing)
    }

    fn flush(&mut self, closing: bool) -> Result<(), DriverError> {
        self.inner.flush(closing)
    }

    fn lock(&mut self, exclusive: bool) -> Result<(), DriverError> {
        self.inner.lock(exclusive)
    }

    fn unlock(&mut self) -> Result<(), DriverError> {
        self.inner.unlock()
    }

    fn posix_path(&self) -> Option<&Path> {
        self.inner.posix_path()
    }

    fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.counts.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}

//! Driver traits.
//!
//! The core talks to storage through two seams: a [`DriverClass`] that can
//! probe and open stores by name, and the [`FileDriver`] handle it returns.
//! All addresses are relative to the start of the store.

use std::fmt;
use std::path::Path;

use crate::error::Result;
use crate::flags::{AccessFlags, CloseDegree, DriverFeatures, MemType};

/// Driver-defined identity of one physical store. Two handles with equal
/// identities refer to the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileIdentity {
    pub driver: &'static str,
    pub device: u64,
    pub inode: u64,
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.driver, self.device, self.inode)
    }
}

/// Factory for driver handles.
pub trait DriverClass: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn features(&self) -> DriverFeatures;

    /// Whether handles from this class can report a [`FileIdentity`].
    /// Classes without identity are never deduplicated.
    fn supports_identity(&self) -> bool {
        false
    }

    /// Whether handles from this class implement advisory locking.
    fn supports_locking(&self) -> bool {
        false
    }

    /// Close policy used when the caller asks for [`CloseDegree::Default`].
    fn default_close_degree(&self) -> CloseDegree {
        CloseDegree::Weak
    }

    /// Identity of the store `name` names, without opening it.
    ///
    /// Returns `Ok(None)` when the class has no identity hook or the store
    /// does not exist yet.
    fn probe(&self, _name: &str) -> Result<Option<FileIdentity>> {
        Ok(None)
    }

    /// Open a store. `maxaddr` bounds every address the handle will accept.
    fn open(&self, name: &str, flags: AccessFlags, maxaddr: u64) -> Result<Box<dyn FileDriver>>;

    /// Remove a store by name.
    fn delete(&self, name: &str) -> Result<()>;
}

/// An open store.
pub trait FileDriver: Send + fmt::Debug {
    /// Name of the class that opened this handle.
    fn class_name(&self) -> &'static str;

    fn features(&self) -> DriverFeatures;

    fn identity(&self) -> Option<FileIdentity> {
        None
    }

    /// End of allocated address space.
    fn eoa(&self, ty: MemType) -> u64;

    fn set_eoa(&mut self, ty: MemType, addr: u64) -> Result<()>;

    /// Current physical end of the store.
    fn eof(&self, ty: MemType) -> u64;

    /// Fill `buf` from `addr`. Bytes past the end of file read as zero;
    /// reads past the end of allocation fail.
    fn read(&mut self, ty: MemType, addr: u64, buf: &mut [u8]) -> Result<()>;

    fn write(&mut self, ty: MemType, addr: u64, buf: &[u8]) -> Result<()>;

    /// Make the physical size equal the end of allocation.
    fn truncate(&mut self, closing: bool) -> Result<()>;

    fn flush(&mut self, closing: bool) -> Result<()>;

    fn lock(&mut self, _exclusive: bool) -> Result<()> {
        Err(crate::error::DriverError::Unsupported("locking"))
    }

    fn unlock(&mut self) -> Result<()> {
        Ok(())
    }

    /// Resolved filesystem path, for drivers with a POSIX-compatible handle.
    fn posix_path(&self) -> Option<&Path> {
        None
    }

    /// Release the handle. Any lock is dropped first.
    fn close(self: Box<Self>) -> Result<()>;
}

//! POSIX file driver.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::driver::{DriverClass, FileDriver, FileIdentity};
use crate::error::{DriverError, Result};
use crate::flags::{AccessFlags, CloseDegree, DriverFeatures, MemType};

const CLASS_NAME: &str = "sec2";

/// Plain files through `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sec2Class;

impl Sec2Class {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
fn identity_of(meta: &std::fs::Metadata) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some(FileIdentity {
        driver: CLASS_NAME,
        device: meta.dev(),
        inode: meta.ino(),
    })
}

#[cfg(not(unix))]
fn identity_of(_meta: &std::fs::Metadata) -> Option<FileIdentity> {
    None
}

impl DriverClass for Sec2Class {
    fn name(&self) -> &'static str {
        CLASS_NAME
    }

    fn features(&self) -> DriverFeatures {
        DriverFeatures::SUPPORTS_SWMR
            | DriverFeatures::AGGREGATE_METADATA
            | DriverFeatures::ACCUMULATE_METADATA
            | DriverFeatures::POSIX_COMPAT_HANDLE
    }

    fn supports_identity(&self) -> bool {
        cfg!(unix)
    }

    fn supports_locking(&self) -> bool {
        cfg!(unix)
    }

    fn default_close_degree(&self) -> CloseDegree {
        CloseDegree::Weak
    }

    fn probe(&self, name: &str) -> Result<Option<FileIdentity>> {
        match std::fs::metadata(name) {
            Ok(meta) => Ok(identity_of(&meta)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DriverError::from_io(name, e)),
        }
    }

    fn open(&self, name: &str, flags: AccessFlags, maxaddr: u64) -> Result<Box<dyn FileDriver>> {
        let writable = flags.is_writable();
        let mut opts = OpenOptions::new();
        opts.read(true).write(writable);
        if writable {
            if flags.contains(AccessFlags::EXCL) {
                opts.create_new(true);
            } else if flags.contains(AccessFlags::CREATE) {
                opts.create(true);
            }
            if flags.contains(AccessFlags::TRUNC) {
                opts.truncate(true);
            }
        }
        let file = opts.open(name).map_err(|e| DriverError::from_io(name, e))?;
        let meta = file.metadata().map_err(|e| DriverError::from_io(name, e))?;
        let resolved = std::fs::canonicalize(name).unwrap_or_else(|_| PathBuf::from(name));
        debug!(name, len = meta.len(), writable, "sec2 open");
        Ok(Box::new(Sec2Driver {
            name: name.to_string(),
            resolved,
            identity: identity_of(&meta),
            eof: meta.len(),
            eoa: 0,
            maxaddr,
            writable,
            locked: false,
            file,
        }))
    }

    fn delete(&self, name: &str) -> Result<()> {
        std::fs::remove_file(name).map_err(|e| DriverError::from_io(name, e))
    }
}

/// An open POSIX file.
#[derive(Debug)]
pub struct Sec2Driver {
    name: String,
    resolved: PathBuf,
    identity: Option<FileIdentity>,
    eof: u64,
    eoa: u64,
    maxaddr: u64,
    writable: bool,
    locked: bool,
    file: File,
}

impl Sec2Driver {
    fn check_range(&self, addr: u64, len: usize) -> Result<()> {
        let end = addr.checked_add(len as u64).ok_or(DriverError::AddressTooLarge {
            addr,
            max: self.maxaddr,
        })?;
        if end > self.maxaddr {
            return Err(DriverError::AddressTooLarge {
                addr: end,
                max: self.maxaddr,
            });
        }
        if end > self.eoa {
            return Err(DriverError::PastEoa {
                addr,
                len: len as u64,
                eoa: self.eoa,
            });
        }
        Ok(())
    }

    fn io_err(&self, e: std::io::Error) -> DriverError {
        DriverError::from_io(&self.name, e)
    }

    #[cfg(unix)]
    fn flock(&self, op: libc::c_int) -> Result<()> {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the descriptor is owned by `self.file` and stays open for
        // the duration of the call.
        let rc = unsafe { libc::flock(self.file.as_raw_fd(), op | libc::LOCK_NB) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EWOULDBLOCK) => Err(DriverError::Locked(self.name.clone())),
            Some(libc::ENOSYS) | Some(libc::ENOLCK) | Some(libc::EOPNOTSUPP) => {
                Err(DriverError::LockUnsupported)
            }
            _ => Err(self.io_err(err)),
        }
    }
}

impl FileDriver for Sec2Driver {
    fn class_name(&self) -> &'static str {
        CLASS_NAME
    }

    fn features(&self) -> DriverFeatures {
        Sec2Class.features()
    }

    fn identity(&self) -> Option<FileIdentity> {
        self.identity.clone()
    }

    fn eoa(&self, _ty: MemType) -> u64 {
        self.eoa
    }

    fn set_eoa(&mut self, _ty: MemType, addr: u64) -> Result<()> {
        if addr > self.maxaddr {
            return Err(DriverError::AddressTooLarge {
                addr,
                max: self.maxaddr,
            });
        }
        self.eoa = addr;
        Ok(())
    }

    fn eof(&self, _ty: MemType) -> u64 {
        self.eof
    }

    fn read(&mut self, _ty: MemType, addr: u64, buf: &mut [u8]) -> Result<()> {
        self.check_range(addr, buf.len())?;
        let avail = self.eof.saturating_sub(addr).min(buf.len() as u64) as usize;
        if avail > 0 {
            self.file
                .seek(SeekFrom::Start(addr))
                .map_err(|e| self.io_err(e))?;
            let (head, _) = buf.split_at_mut(avail);
            self.file.read_exact(head).map_err(|e| self.io_err(e))?;
        }
        buf[avail..].fill(0);
        Ok(())
    }

    fn write(&mut self, _ty: MemType, addr: u64, buf: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(DriverError::ReadOnly(self.name.clone()));
        }
        self.check_range(addr, buf.len())?;
        self.file
            .seek(SeekFrom::Start(addr))
            .map_err(|e| self.io_err(e))?;
        self.file.write_all(buf).map_err(|e| self.io_err(e))?;
        self.eof = self.eof.max(addr + buf.len() as u64);
        Ok(())
    }

    fn truncate(&mut self, _closing: bool) -> Result<()> {
        if !self.writable || self.eof == self.eoa {
            return Ok(());
        }
        self.file.set_len(self.eoa).map_err(|e| self.io_err(e))?;
        self.eof = self.eoa;
        Ok(())
    }

    fn flush(&mut self, _closing: bool) -> Result<()> {
        if self.writable {
            self.file.flush().map_err(|e| self.io_err(e))?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn lock(&mut self, exclusive: bool) -> Result<()> {
        let op = if exclusive { libc::LOCK_EX } else { libc::LOCK_SH };
        self.flock(op)?;
        self.locked = true;
        debug!(name = %self.name, exclusive, "sec2 lock");
        Ok(())
    }

    #[cfg(unix)]
    fn unlock(&mut self) -> Result<()> {
        if self.locked {
            self.flock(libc::LOCK_UN)?;
            self.locked = false;
            debug!(name = %self.name, "sec2 unlock");
        }
        Ok(())
    }

    fn posix_path(&self) -> Option<&Path> {
        Some(&self.resolved)
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        if self.locked {
            if let Err(e) = self.unlock() {
                warn!(name = %self.name, error = %e, "unlock on close failed");
            }
        }
        if self.writable {
            self.file.sync_data().map_err(|e| self.io_err(e))?;
        }
        debug!(name = %self.name, "sec2 close");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdfcore_format::UNDEFINED_ADDR;

    #[test]
    fn create_write_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.h5");
        let name = path.to_str().unwrap();
        let class = Sec2Class::new();
        assert_eq!(class.probe(name).unwrap(), None);

        let mut drv = class
            .open(name, AccessFlags::RDWR | AccessFlags::CREATE, UNDEFINED_ADDR)
            .unwrap();
        drv.set_eoa(MemType::Raw, 64).unwrap();
        drv.write(MemType::Raw, 8, b"payload").unwrap();
        let mut buf = [0xEEu8; 20];
        drv.read(MemType::Raw, 8, &mut buf).unwrap();
        assert_eq!(&buf[..7], b"payload");
        assert!(buf[7..].iter().all(|&b| b == 0));
        drv.truncate(true).unwrap();
        assert_eq!(drv.eof(MemType::Raw), 64);
        drv.close().unwrap();

        assert!(class.probe(name).unwrap().is_some());
    }

    #[test]
    fn past_eoa_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.h5");
        let name = path.to_str().unwrap();
        let mut drv = Sec2Class
            .open(name, AccessFlags::RDWR | AccessFlags::CREATE, UNDEFINED_ADDR)
            .unwrap();
        drv.set_eoa(MemType::Raw, 4).unwrap();
        assert!(matches!(
            drv.write(MemType::Raw, 2, b"xyz"),
            Err(DriverError::PastEoa { .. })
        ));
    }

    #[test]
    fn read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.h5");
        std::fs::write(&path, [1u8; 16]).unwrap();
        let name = path.to_str().unwrap();
        let mut drv = Sec2Class.open(name, AccessFlags::RDONLY, UNDEFINED_ADDR).unwrap();
        drv.set_eoa(MemType::Raw, 16).unwrap();
        assert!(matches!(
            drv.write(MemType::Raw, 0, b"x"),
            Err(DriverError::ReadOnly(_))
        ));
    }

    #[test]
    fn exclusive_create_of_existing_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.h5");
        std::fs::write(&path, b"").unwrap();
        let err = Sec2Class
            .open(
                path.to_str().unwrap(),
                AccessFlags::RDWR | AccessFlags::CREATE | AccessFlags::EXCL,
                UNDEFINED_ADDR,
            )
            .unwrap_err();
        assert!(matches!(err, DriverError::AlreadyExists(_)));
    }

    #[test]
    fn missing_file_not_found() {
        let err = Sec2Class
            .open("/nonexistent/dir/x.h5", AccessFlags::RDONLY, UNDEFINED_ADDR)
            .unwrap_err();
        assert!(matches!(err, DriverError::NotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn identity_matches_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e.h5");
        std::fs::write(&path, b"").unwrap();
        let name = path.to_str().unwrap();
        let a = Sec2Class.open(name, AccessFlags::RDONLY, UNDEFINED_ADDR).unwrap();
        let probed = Sec2Class.probe(name).unwrap();
        assert_eq!(a.identity(), probed);
    }
}

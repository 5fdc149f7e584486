//! In-memory driver.
//!
//! Images live in the class, keyed by name, so a store can be closed and
//! opened again within one process. The class has no identity hook: two
//! opens of the same name get independent handles onto one shared image and
//! the core does not deduplicate them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::driver::{DriverClass, FileDriver};
use crate::error::{DriverError, Result};
use crate::flags::{AccessFlags, CloseDegree, DriverFeatures, MemType};

const CLASS_NAME: &str = "memory";

type Image = Arc<Mutex<Vec<u8>>>;

#[derive(Debug, Default, Clone)]
pub struct MemoryClass {
    images: Arc<Mutex<HashMap<String, Image>>>,
}

impl MemoryClass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an image, replacing any existing one.
    pub fn insert_image(&self, name: &str, bytes: Vec<u8>) {
        self.images
            .lock()
            .insert(name.to_string(), Arc::new(Mutex::new(bytes)));
    }

    /// Copy of an image's bytes.
    pub fn image(&self, name: &str) -> Option<Vec<u8>> {
        self.images.lock().get(name).map(|img| img.lock().clone())
    }
}

impl DriverClass for MemoryClass {
    fn name(&self) -> &'static str {
        CLASS_NAME
    }

    fn features(&self) -> DriverFeatures {
        DriverFeatures::AGGREGATE_METADATA | DriverFeatures::ACCUMULATE_METADATA
    }

    fn default_close_degree(&self) -> CloseDegree {
        CloseDegree::Weak
    }

    fn open(&self, name: &str, flags: AccessFlags, maxaddr: u64) -> Result<Box<dyn FileDriver>> {
        let mut images = self.images.lock();
        let writable = flags.is_writable();
        let existing = images.get(name).cloned();
        let image = match existing {
            Some(_) if writable && flags.contains(AccessFlags::EXCL) => {
                return Err(DriverError::AlreadyExists(name.to_string()))
            }
            Some(img) => {
                if writable && flags.contains(AccessFlags::TRUNC) {
                    img.lock().clear();
                }
                img
            }
            None if writable && flags.contains(AccessFlags::CREATE) => {
                let img: Image = Arc::new(Mutex::new(Vec::new()));
                images.insert(name.to_string(), Arc::clone(&img));
                img
            }
            None => return Err(DriverError::NotFound(name.to_string())),
        };
        debug!(name, writable, "memory open");
        Ok(Box::new(MemoryDriver {
            name: name.to_string(),
            image,
            eoa: 0,
            maxaddr,
            writable,
        }))
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.images
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DriverError::NotFound(name.to_string()))
    }
}

#[derive(Debug)]
pub struct MemoryDriver {
    name: String,
    image: Image,
    eoa: u64,
    maxaddr: u64,
    writable: bool,
}

impl MemoryDriver {
    fn check_range(&self, addr: u64, len: usize) -> Result<usize> {
        let end = addr
            .checked_add(len as u64)
            .filter(|&e| e <= self.maxaddr)
            .ok_or(DriverError::AddressTooLarge {
                addr,
                max: self.maxaddr,
            })?;
        if end > self.eoa {
            return Err(DriverError::PastEoa {
                addr,
                len: len as u64,
                eoa: self.eoa,
            });
        }
        usize::try_from(addr).map_err(|_| DriverError::AddressTooLarge {
            addr,
            max: usize::MAX as u64,
        })
    }
}

impl FileDriver for MemoryDriver {
    fn class_name(&self) -> &'static str {
        CLASS_NAME
    }

    fn features(&self) -> DriverFeatures {
        DriverFeatures::AGGREGATE_METADATA | DriverFeatures::ACCUMULATE_METADATA
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
        self.image.lock().len() as u64
    }

    fn read(&mut self, _ty: MemType, addr: u64, buf: &mut [u8]) -> Result<()> {
        let start = self.check_range(addr, buf.len())?;
        let image = self.image.lock();
        let avail = image.len().saturating_sub(start).min(buf.len());
        if avail > 0 {
            buf[..avail].copy_from_slice(&image[start..start + avail]);
        }
        buf[avail..].fill(0);
        Ok(())
    }

    fn write(&mut self, _ty: MemType, addr: u64, buf: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(DriverError::ReadOnly(self.name.clone()));
        }
        let start = self.check_range(addr, buf.len())?;
        let mut image = self.image.lock();
        let end = start + buf.len();
        if image.len() < end {
            image.resize(end, 0);
        }
        image[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn truncate(&mut self, _closing: bool) -> Result<()> {
        if self.writable {
            let eoa = usize::try_from(self.eoa).map_err(|_| DriverError::AddressTooLarge {
                addr: self.eoa,
                max: usize::MAX as u64,
            })?;
            self.image.lock().resize(eoa, 0);
        }
        Ok(())
    }

    fn flush(&mut self, _closing: bool) -> Result<()> {
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        debug!(name = %self.name, "memory close");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdfcore_format::UNDEFINED_ADDR;

    #[test]
    fn image_survives_close() {
        let class = MemoryClass::new();
        let mut drv = class
            .open("m", AccessFlags::RDWR | AccessFlags::CREATE, UNDEFINED_ADDR)
            .unwrap();
        drv.set_eoa(MemType::Raw, 16).unwrap();
        drv.write(MemType::Raw, 4, b"abcd").unwrap();
        drv.close().unwrap();

        let mut again = class.open("m", AccessFlags::RDONLY, UNDEFINED_ADDR).unwrap();
        assert_eq!(again.eof(MemType::Raw), 8);
        again.set_eoa(MemType::Raw, 8).unwrap();
        let mut buf = [0u8; 4];
        again.read(MemType::Raw, 4, &mut buf).unwrap();
        assert_eq!(&buf, b"abcd");
        assert!(again.identity().is_none());
    }

    #[test]
    fn open_flags_respected() {
        let class = MemoryClass::new();
        assert!(matches!(
            class.open("x", AccessFlags::RDONLY, UNDEFINED_ADDR),
            Err(DriverError::NotFound(_))
        ));
        class.insert_image("x", vec![1, 2, 3]);
        assert!(matches!(
            class.open(
                "x",
                AccessFlags::RDWR | AccessFlags::CREATE | AccessFlags::EXCL,
                UNDEFINED_ADDR
            ),
            Err(DriverError::AlreadyExists(_))
        ));
        let drv = class
            .open("x", AccessFlags::RDWR | AccessFlags::TRUNC, UNDEFINED_ADDR)
            .unwrap();
        assert_eq!(drv.eof(MemType::Raw), 0);
        class.delete("x").unwrap();
        assert!(class.image("x").is_none());
    }
}

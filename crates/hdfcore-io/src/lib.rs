//! Block I/O drivers for the hdfcore container.
//!
//! A driver class ([`DriverClass`]) opens backing stores and hands back
//! driver handles ([`FileDriver`]) that the container core reads and writes
//! by address. Two classes ship here:
//!
//! - [`Sec2Class`]: plain POSIX files with device/inode identity and
//!   advisory locking.
//! - [`MemoryClass`]: named in-memory images with no identity hook, so the
//!   core never deduplicates opens of them.
//!
//! [`PageBuffer`] sits between the core and a driver and caches whole
//! pages with write-back.

pub mod driver;
pub mod error;
pub mod flags;
pub mod memory;
pub mod page_buffer;
pub mod sec2;

pub use hdfcore_format;

pub use driver::{DriverClass, FileDriver, FileIdentity};
pub use error::{DriverError, Result};
pub use flags::{AccessFlags, CloseDegree, DriverFeatures, MemType};
pub use memory::{MemoryClass, MemoryDriver};
pub use page_buffer::{PageBuffer, PageBufferStats};
pub use sec2::{Sec2Class, Sec2Driver};

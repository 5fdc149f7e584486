use std::io;

/// Errors raised by drivers.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("I/O error on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("no such file: {0}")]
    NotFound(String),

    #[error("file already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("file is locked by another opener: {0}")]
    Locked(String),

    #[error("file locking is not available on this filesystem")]
    LockUnsupported,

    #[error("access of {len} bytes at {addr:#x} crosses end of allocation {eoa:#x}")]
    PastEoa { addr: u64, len: u64, eoa: u64 },

    #[error("address {addr:#x} exceeds driver maximum {max:#x}")]
    AddressTooLarge { addr: u64, max: u64 },

    #[error("write to a file opened read-only: {0}")]
    ReadOnly(String),

    #[error("driver does not support {0}")]
    Unsupported(&'static str),
}

impl DriverError {
    pub(crate) fn from_io(name: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => DriverError::NotFound(name.to_string()),
            io::ErrorKind::AlreadyExists => DriverError::AlreadyExists(name.to_string()),
            io::ErrorKind::PermissionDenied => DriverError::PermissionDenied(name.to_string()),
            _ => DriverError::Io {
                name: name.to_string(),
                source,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;

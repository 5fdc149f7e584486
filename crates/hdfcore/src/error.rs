use std::fmt;

use hdfcore_format::FormatError;
use hdfcore_io::DriverError;

/// Subsystem an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    File,
    Group,
    Dataset,
    Datatype,
    Dataspace,
    Attribute,
    Link,
    Object,
    Connector,
    Request,
    Blob,
    Token,
    Id,
    Resource,
    Plugin,
    Cache,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::File => "file",
            Category::Group => "group",
            Category::Dataset => "dataset",
            Category::Datatype => "datatype",
            Category::Dataspace => "dataspace",
            Category::Attribute => "attribute",
            Category::Link => "link",
            Category::Object => "object",
            Category::Connector => "connector",
            Category::Request => "request",
            Category::Blob => "blob",
            Category::Token => "token",
            Category::Id => "id",
            Category::Resource => "resource",
            Category::Plugin => "plugin",
            Category::Cache => "cache",
        };
        f.write_str(s)
    }
}

/// Cause of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ArgsInvalid,
    ResourceExhausted,
    NotSupported,
    NotFound,
    AlreadyExists,
    Permission,
    /// Intent, close-degree or format-version mismatch.
    Conflict,
    DecodeMalformed,
    Overflow,
    Io,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ArgsInvalid => "invalid arguments",
            ErrorKind::ResourceExhausted => "resource exhausted",
            ErrorKind::NotSupported => "not supported",
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::Permission => "permission denied",
            ErrorKind::Conflict => "conflict",
            ErrorKind::DecodeMalformed => "malformed data",
            ErrorKind::Overflow => "overflow",
            ErrorKind::Io => "I/O error",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(s)
    }
}

/// Lower-level error carried as the source of an [`Error`].
#[derive(Debug, thiserror::Error)]
pub enum ErrorSource {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Error returned by every fallible library operation.
#[derive(Debug, thiserror::Error)]
#[error("{category}: {kind}: {message}")]
pub struct Error {
    pub category: Category,
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<ErrorSource>,
}

impl Error {
    pub fn new(category: Category, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            category,
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn args(category: Category, message: impl Into<String>) -> Self {
        Self::new(category, ErrorKind::ArgsInvalid, message)
    }

    pub fn not_found(category: Category, message: impl Into<String>) -> Self {
        Self::new(category, ErrorKind::NotFound, message)
    }

    pub fn conflict(category: Category, message: impl Into<String>) -> Self {
        Self::new(category, ErrorKind::Conflict, message)
    }

    pub fn unsupported(category: Category, message: impl Into<String>) -> Self {
        Self::new(category, ErrorKind::NotSupported, message)
    }

    pub fn internal(category: Category, message: impl Into<String>) -> Self {
        Self::new(category, ErrorKind::Internal, message)
    }

    /// Retag the subsystem, keeping cause and message.
    pub fn in_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self {
        let (category, kind) = match &e {
            FormatError::SignatureNotFound
            | FormatError::UnsupportedVersion(_)
            | FormatError::InvalidOffsetSize(_)
            | FormatError::InvalidLengthSize(_)
            | FormatError::ChecksumMismatch { .. } => (Category::File, ErrorKind::DecodeMalformed),
            FormatError::VersionOutOfBounds { .. } => (Category::Datatype, ErrorKind::Conflict),
            FormatError::InvalidAddressWidth(_)
            | FormatError::AddressOverflow { .. }
            | FormatError::AddressHighBytes => (Category::File, ErrorKind::Overflow),
            other if other.is_overflow() => (Category::Datatype, ErrorKind::Overflow),
            _ => (Category::Datatype, ErrorKind::DecodeMalformed),
        };
        Self {
            category,
            kind,
            message: e.to_string(),
            source: Some(ErrorSource::Format(e)),
        }
    }
}

impl From<DriverError> for Error {
    fn from(e: DriverError) -> Self {
        let kind = match &e {
            DriverError::NotFound(_) => ErrorKind::NotFound,
            DriverError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            DriverError::PermissionDenied(_) | DriverError::ReadOnly(_) => ErrorKind::Permission,
            DriverError::Locked(_) => ErrorKind::Conflict,
            DriverError::PastEoa { .. } | DriverError::AddressTooLarge { .. } => ErrorKind::Overflow,
            DriverError::LockUnsupported | DriverError::Unsupported(_) => ErrorKind::NotSupported,
            DriverError::Io { .. } => ErrorKind::Io,
        };
        Self {
            category: Category::File,
            kind,
            message: e.to_string(),
            source: Some(ErrorSource::Driver(e)),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(Category::Resource, ErrorKind::Io, e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn driver_errors_keep_source() {
        let e: Error = DriverError::Locked("f.h5".into()).into();
        assert_eq!(e.kind, ErrorKind::Conflict);
        assert!(e.source().is_some());
        assert!(e.to_string().starts_with("file: conflict"));
    }

    #[test]
    fn format_overflow_maps_to_overflow() {
        let e: Error = FormatError::BodyOverflow {
            needed: 4,
            remaining: 1,
        }
        .into();
        assert_eq!(e.kind, ErrorKind::Overflow);
        assert_eq!(e.category, Category::Datatype);
    }
}

//! Container core: file lifecycle, shared-file registry and connector
//! dispatch.
//!
//! A [`Library`] is the root of everything. It owns the identifier tables
//! that name open objects, the registry of connectors and the registry of
//! open backing stores. Public operations are methods on [`Library`] that
//! take and return [`Hid`]s:
//!
//! ```no_run
//! use hdfcore::{Library, AccessFlags, FileAccessProps, FileCreateProps};
//!
//! # fn main() -> hdfcore::Result<()> {
//! let lib = Library::new();
//! let fapl = FileAccessProps::default();
//! let file = lib.file_create("data.h5", AccessFlags::TRUNC, &FileCreateProps::default(), &fapl)?;
//! let grp = lib.group_create(file, "results")?;
//! lib.close(grp)?;
//! lib.close(file)?;
//! # Ok(())
//! # }
//! ```
//!
//! Every operation is routed through a connector ([`vol::Connector`]). The
//! built-in [`NativeConnector`] stores objects in a single file through a
//! block driver from `hdfcore-io`; [`PassThrough`] shows how connectors
//! stack.

mod api;
mod cache;
pub mod config;
pub mod dataspace;
pub mod error;
pub mod errstack;
mod file;
pub mod ids;
mod library;
pub mod native;
pub mod plist;
pub mod vol;

pub use hdfcore_format;
pub use hdfcore_io;

pub use hdfcore_format::Datatype;
pub use hdfcore_io::{AccessFlags, CloseDegree, DriverClass, MemoryClass, Sec2Class};

pub use cache::CacheStats;
pub use config::{LibraryConfig, LockingPolicy};
pub use dataspace::{Dataspace, UNLIMITED};
pub use error::{Category, Error, ErrorKind, Result};
pub use errstack::{clear_error_stack, error_stack, ErrorRecord};
pub use file::{SearchAttempt, PREFIX_SEPARATOR};
pub use ids::{Hid, IdKind};
pub use library::Library;
pub use native::{NativeConnector, NATIVE_NAME, NATIVE_VALUE};
pub use plist::{
    DatasetAccessProps, DatasetCreateProps, FileAccessProps, FileCreateProps, FsStrategy,
    LibVersion, LinkAccessProps, ObjectFlushCallback, TransferProps,
};
pub use vol::{
    BlobId, CapFlags, ConnectorLevel, ConnectorRef, LinkInfo, LinkKind, ObjTypes, ObjectKind,
    ObjectToken, OptionalArgs, PassThrough, RequestStatus, Subclass,
};

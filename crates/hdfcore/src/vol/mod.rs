//! Connector layer.
//!
//! Every operation on a file, group, dataset, attribute, committed datatype,
//! link, object, blob, token or request is routed through a [`Connector`].
//! A connector exposes one table per subclass; each table is optional, and
//! each method defaults to a "no such method" failure, so a connector only
//! implements what it supports. Callers discover support with
//! [`IntrospectClass::opt_query`].
//!
//! Connectors may stack: a pass-through holds an inner connector and wraps
//! the inner connector's objects in its own. The [`WrapClass`] table lets
//! the library unwrap objects down to the terminal connector and re-wrap
//! objects it creates internally. Dispatch lives in [`dispatch`].

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use hdfcore_format::Datatype;
use hdfcore_io::AccessFlags;

use crate::dataspace::Dataspace;
use crate::error::{Category, Error, ErrorKind, Result};
use crate::ids::{Hid, IdKind};
use crate::library::Library;
use crate::plist::{
    DatasetAccessProps, DatasetCreateProps, FileAccessProps, FileCreateProps, ObjectFlushCallback,
    TransferProps,
};

pub mod dispatch;
pub mod passthru;
pub(crate) mod registry;

pub use passthru::PassThrough;

/// Type-erased connector object.
#[derive(Clone)]
pub struct VolObject(Arc<dyn Any + Send + Sync>);

impl VolObject {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        VolObject(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        VolObject(value)
    }

    /// The object as a `T`, if it is one.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }

    pub fn ptr_eq(&self, other: &VolObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for VolObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VolObject({:p})", Arc::as_ptr(&self.0))
    }
}

pub type ConnectorRef = Arc<dyn Connector>;

/// A connector object together with the connector that owns it.
#[derive(Clone)]
pub struct IdObject {
    pub connector: ConnectorRef,
    pub data: VolObject,
}

impl IdObject {
    pub fn new(connector: ConnectorRef, data: VolObject) -> Self {
        Self { connector, data }
    }
}

impl fmt::Debug for IdObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdObject")
            .field("connector", &self.connector.name())
            .field("data", &self.data)
            .finish()
    }
}

/// Kind of object a connector hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    File,
    Group,
    Dataset,
    Datatype,
    Attr,
}

impl From<ObjectKind> for IdKind {
    fn from(kind: ObjectKind) -> IdKind {
        match kind {
            ObjectKind::File => IdKind::File,
            ObjectKind::Group => IdKind::Group,
            ObjectKind::Dataset => IdKind::Dataset,
            ObjectKind::Datatype => IdKind::Datatype,
            ObjectKind::Attr => IdKind::Attr,
        }
    }
}

hdfcore_io::flag_set! {
    /// Features a connector advertises.
    CapFlags {
        FILE_BASIC = 0x0001,
        GROUP_BASIC = 0x0002,
        DATASET_BASIC = 0x0004,
        ATTR_BASIC = 0x0008,
        DATATYPE_BASIC = 0x0010,
        LINK_BASIC = 0x0020,
        OBJECT_BASIC = 0x0040,
        BLOBS = 0x0080,
        TOKENS = 0x0100,
        ASYNC = 0x0200,
        MOUNT = 0x0400,
        SWMR = 0x0800,
        EXTERNAL_LINKS = 0x1000,
        SOFT_LINKS = 0x2000,
        STACKABLE = 0x4000,
    }
}

hdfcore_io::flag_set! {
    /// Object kinds to count or list in a file.
    ObjTypes {
        FILE = 0x01,
        DATASET = 0x02,
        GROUP = 0x04,
        DATATYPE = 0x08,
        ATTR = 0x10,
        /// Only objects opened through this file handle, not through other
        /// handles sharing the same store.
        LOCAL = 0x20,
    }
}

impl ObjTypes {
    pub const ALL: Self = Self(0x1f);
}

/// Table a method belongs to, for support queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subclass {
    None,
    File,
    Group,
    Dataset,
    Attr,
    Datatype,
    Link,
    Object,
    Request,
    Blob,
    Token,
}

/// Opaque optional operation: a numeric opcode with byte arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionalArgs {
    pub opcode: u32,
    pub input: Vec<u8>,
    pub output: Vec<u8>,
}

impl OptionalArgs {
    pub fn new(opcode: u32) -> Self {
        Self {
            opcode,
            ..Self::default()
        }
    }

    pub fn with_input(mut self, input: Vec<u8>) -> Self {
        self.input = input;
        self
    }
}

/// Opaque, connector-defined object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectToken(pub [u8; 16]);

/// Reference to a stored blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlobId(pub [u8; 16]);

/// State of an asynchronous operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    InProgress,
    Succeeded,
    Failed,
    Canceled,
}

impl RequestStatus {
    pub fn is_final(self) -> bool {
        self != RequestStatus::InProgress
    }
}

/// Callback run when a request reaches a final state.
pub type RequestNotify = Box<dyn FnOnce(RequestStatus) + Send>;

/// Which connector an introspection call asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorLevel {
    /// The connector the object belongs to.
    Current,
    /// The innermost connector below any pass-throughs.
    Terminal,
}

/// State carried through one top-level operation and every connector call
/// it makes.
pub struct CallCtx {
    pub(crate) lib: Library,
    pub dxpl: TransferProps,
    pub(crate) wrap: Option<WrapState>,
    want_request: bool,
    request: Option<VolObject>,
}

/// Wrap context of the outermost connector of the current operation.
pub(crate) struct WrapState {
    pub connector: ConnectorRef,
    pub ctx: VolObject,
}

impl CallCtx {
    pub(crate) fn new(lib: Library, dxpl: TransferProps) -> Self {
        Self {
            lib,
            dxpl,
            wrap: None,
            want_request: false,
            request: None,
        }
    }

    pub fn library(&self) -> &Library {
        &self.lib
    }

    /// Whether the caller asked for a request token instead of completion.
    pub fn wants_request(&self) -> bool {
        self.want_request
    }

    pub(crate) fn set_want_request(&mut self, want: bool) {
        self.want_request = want;
    }

    /// Hand back a request token for the current operation.
    pub fn set_request(&mut self, token: VolObject) {
        self.request = Some(token);
    }

    pub fn take_request(&mut self) -> Option<VolObject> {
        self.request.take()
    }
}

pub(crate) fn no_such_method(category: Category, method: &str) -> Error {
    Error::new(
        category,
        ErrorKind::NotSupported,
        format!("connector has no {method} method"),
    )
}

// ---- Argument and result types ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileGet {
    Intent,
    /// Name the file was opened with.
    Name,
    /// Name after symlink resolution.
    ActualName,
    /// Directory used to resolve relative external references.
    ExtPath,
    ObjCount(ObjTypes),
    ObjIds(ObjTypes, Option<usize>),
    CreateProps,
    AccessProps,
}

pub enum FileGetOut {
    Intent(AccessFlags),
    Name(String),
    MaybeName(Option<String>),
    Count(usize),
    Ids(Vec<Hid>),
    CreateProps(FileCreateProps),
    AccessProps(Box<FileAccessProps>),
}

pub enum FileSpecific<'a> {
    Flush { global: bool },
    Reopen,
    IsAccessible {
        name: &'a str,
        fapl: &'a FileAccessProps,
    },
    Delete {
        name: &'a str,
        fapl: &'a FileAccessProps,
    },
    IsEqual(&'a VolObject),
}

pub enum FileSpecificOut {
    Done,
    Bool(bool),
    Object(VolObject),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupGet {
    NumLinks,
}

pub enum GroupSpecific<'a> {
    Mount { name: &'a str, child: &'a VolObject },
    Unmount { name: &'a str },
    Flush,
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetGet {
    Space,
    Type,
    CreateProps,
    StorageSize,
}

pub enum DatasetGetOut {
    Space(Dataspace),
    Type(Datatype),
    CreateProps(DatasetCreateProps),
    StorageSize(u64),
}

pub enum DatasetSpecific<'a> {
    SetExtent(&'a [u64]),
    Flush,
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrGet {
    Space,
    Type,
    Name,
}

pub enum AttrGetOut {
    Space(Dataspace),
    Type(Datatype),
    Name(String),
}

pub enum AttrSpecific<'a> {
    Delete(&'a str),
    Exists(&'a str),
    Rename { from: &'a str, to: &'a str },
    Names,
}

pub enum AttrSpecificOut {
    Done,
    Bool(bool),
    Names(Vec<String>),
}

pub enum DatatypeSpecific {
    Flush,
    Refresh,
}

/// What a new link points at.
pub enum LinkTarget<'a> {
    /// The object at `path` relative to `loc`.
    Hard { loc: &'a VolObject, path: &'a str },
    Soft(&'a str),
    External { file: &'a str, path: &'a str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    Hard,
    Soft,
    External,
}

/// Description of one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub kind: LinkKind,
    /// Target object of a hard link.
    pub token: Option<ObjectToken>,
    /// Target path of a soft link, or `file:path` of an external link.
    pub value: Option<String>,
}

pub type LinkVisitor<'a> = dyn FnMut(&str, &LinkInfo) -> ControlFlow<()> + 'a;

pub enum LinkSpecific<'a> {
    Delete(&'a str),
    Exists(&'a str),
    /// Visit links in name order; the result reports whether the visitor
    /// stopped early.
    Iterate(&'a mut LinkVisitor<'a>),
}

pub enum LinkSpecificOut {
    Done,
    Bool(bool),
}

pub enum ObjectLocator<'a> {
    ByName(&'a str),
    ByToken(ObjectToken),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectGet<'a> {
    Token(&'a str),
    Kind(&'a str),
    FileName,
}

pub enum ObjectGetOut {
    Token(ObjectToken),
    Kind(ObjectKind),
    Name(String),
}

pub enum ObjectSpecific<'a> {
    Exists(&'a str),
    Flush,
    Refresh,
}

pub enum ObjectSpecificOut {
    Bool(bool),
    /// Flush completed; carries the file's object flush callback.
    Flushed(Option<ObjectFlushCallback>),
    Done,
}

pub enum BlobSpecific<'a> {
    Size(&'a BlobId),
    IsNull(&'a BlobId),
    Delete(&'a BlobId),
}

pub enum BlobSpecificOut {
    Size(u64),
    Bool(bool),
    Done,
}

// ---- Subclass tables ----

macro_rules! unsupported {
    ($cat:expr, $name:literal) => {
        Err(no_such_method($cat, $name))
    };
}

pub trait FileClass: Send + Sync {
    fn create(
        &self,
        _cx: &mut CallCtx,
        _name: &str,
        _flags: AccessFlags,
        _fcpl: &FileCreateProps,
        _fapl: &FileAccessProps,
    ) -> Result<VolObject> {
        unsupported!(Category::File, "file create")
    }

    fn open(
        &self,
        _cx: &mut CallCtx,
        _name: &str,
        _flags: AccessFlags,
        _fapl: &FileAccessProps,
    ) -> Result<VolObject> {
        unsupported!(Category::File, "file open")
    }

    fn get(&self, _cx: &mut CallCtx, _obj: &VolObject, _what: FileGet) -> Result<FileGetOut> {
        unsupported!(Category::File, "file get")
    }

    /// `obj` is `None` for operations that act on a name.
    fn specific(
        &self,
        _cx: &mut CallCtx,
        _obj: Option<&VolObject>,
        _op: FileSpecific<'_>,
    ) -> Result<FileSpecificOut> {
        unsupported!(Category::File, "file specific")
    }

    fn optional(&self, _cx: &mut CallCtx, _obj: &VolObject, _args: &mut OptionalArgs) -> Result<()> {
        unsupported!(Category::File, "file optional")
    }

    fn close(&self, _cx: &mut CallCtx, _obj: &VolObject) -> Result<()> {
        unsupported!(Category::File, "file close")
    }
}

pub trait GroupClass: Send + Sync {
    fn create(&self, _cx: &mut CallCtx, _loc: &VolObject, _name: &str) -> Result<VolObject> {
        unsupported!(Category::Group, "group create")
    }

    fn open(&self, _cx: &mut CallCtx, _loc: &VolObject, _name: &str) -> Result<VolObject> {
        unsupported!(Category::Group, "group open")
    }

    fn get(&self, _cx: &mut CallCtx, _obj: &VolObject, _what: GroupGet) -> Result<u64> {
        unsupported!(Category::Group, "group get")
    }

    fn specific(&self, _cx: &mut CallCtx, _obj: &VolObject, _op: GroupSpecific<'_>) -> Result<()> {
        unsupported!(Category::Group, "group specific")
    }

    fn optional(&self, _cx: &mut CallCtx, _obj: &VolObject, _args: &mut OptionalArgs) -> Result<()> {
        unsupported!(Category::Group, "group optional")
    }

    fn close(&self, _cx: &mut CallCtx, _obj: &VolObject) -> Result<()> {
        unsupported!(Category::Group, "group close")
    }
}

pub trait DatasetClass: Send + Sync {
    fn create(
        &self,
        _cx: &mut CallCtx,
        _loc: &VolObject,
        _name: &str,
        _dtype: &Datatype,
        _space: &Dataspace,
        _dcpl: &DatasetCreateProps,
    ) -> Result<VolObject> {
        unsupported!(Category::Dataset, "dataset create")
    }

    fn open(
        &self,
        _cx: &mut CallCtx,
        _loc: &VolObject,
        _name: &str,
        _dapl: &DatasetAccessProps,
    ) -> Result<VolObject> {
        unsupported!(Category::Dataset, "dataset open")
    }

    /// Read several datasets at once; `mem_types` and `bufs` pair up with
    /// `dsets`.
    fn read(
        &self,
        _cx: &mut CallCtx,
        _dsets: &[VolObject],
        _mem_types: &[Datatype],
        _bufs: &mut [&mut [u8]],
    ) -> Result<()> {
        unsupported!(Category::Dataset, "dataset read")
    }

    fn write(
        &self,
        _cx: &mut CallCtx,
        _dsets: &[VolObject],
        _mem_types: &[Datatype],
        _bufs: &[&[u8]],
    ) -> Result<()> {
        unsupported!(Category::Dataset, "dataset write")
    }

    fn get(&self, _cx: &mut CallCtx, _obj: &VolObject, _what: DatasetGet) -> Result<DatasetGetOut> {
        unsupported!(Category::Dataset, "dataset get")
    }

    fn specific(
        &self,
        _cx: &mut CallCtx,
        _obj: &VolObject,
        _op: DatasetSpecific<'_>,
    ) -> Result<()> {
        unsupported!(Category::Dataset, "dataset specific")
    }

    fn optional(&self, _cx: &mut CallCtx, _obj: &VolObject, _args: &mut OptionalArgs) -> Result<()> {
        unsupported!(Category::Dataset, "dataset optional")
    }

    fn close(&self, _cx: &mut CallCtx, _obj: &VolObject) -> Result<()> {
        unsupported!(Category::Dataset, "dataset close")
    }
}

pub trait AttrClass: Send + Sync {
    fn create(
        &self,
        _cx: &mut CallCtx,
        _obj: &VolObject,
        _name: &str,
        _dtype: &Datatype,
        _space: &Dataspace,
    ) -> Result<VolObject> {
        unsupported!(Category::Attribute, "attribute create")
    }

    fn open(&self, _cx: &mut CallCtx, _obj: &VolObject, _name: &str) -> Result<VolObject> {
        unsupported!(Category::Attribute, "attribute open")
    }

    fn read(
        &self,
        _cx: &mut CallCtx,
        _attr: &VolObject,
        _mem_type: &Datatype,
        _buf: &mut [u8],
    ) -> Result<()> {
        unsupported!(Category::Attribute, "attribute read")
    }

    fn write(
        &self,
        _cx: &mut CallCtx,
        _attr: &VolObject,
        _mem_type: &Datatype,
        _buf: &[u8],
    ) -> Result<()> {
        unsupported!(Category::Attribute, "attribute write")
    }

    fn get(&self, _cx: &mut CallCtx, _attr: &VolObject, _what: AttrGet) -> Result<AttrGetOut> {
        unsupported!(Category::Attribute, "attribute get")
    }

    fn specific(
        &self,
        _cx: &mut CallCtx,
        _obj: &VolObject,
        _op: AttrSpecific<'_>,
    ) -> Result<AttrSpecificOut> {
        unsupported!(Category::Attribute, "attribute specific")
    }

    fn optional(&self, _cx: &mut CallCtx, _obj: &VolObject, _args: &mut OptionalArgs) -> Result<()> {
        unsupported!(Category::Attribute, "attribute optional")
    }

    fn close(&self, _cx: &mut CallCtx, _attr: &VolObject) -> Result<()> {
        unsupported!(Category::Attribute, "attribute close")
    }
}

pub trait DatatypeClass: Send + Sync {
    fn commit(
        &self,
        _cx: &mut CallCtx,
        _loc: &VolObject,
        _name: &str,
        _dtype: &Datatype,
    ) -> Result<VolObject> {
        unsupported!(Category::Datatype, "datatype commit")
    }

    fn open(&self, _cx: &mut CallCtx, _loc: &VolObject, _name: &str) -> Result<VolObject> {
        unsupported!(Category::Datatype, "datatype open")
    }

    fn get(&self, _cx: &mut CallCtx, _obj: &VolObject) -> Result<Datatype> {
        unsupported!(Category::Datatype, "datatype get")
    }

    fn specific(&self, _cx: &mut CallCtx, _obj: &VolObject, _op: DatatypeSpecific) -> Result<()> {
        unsupported!(Category::Datatype, "datatype specific")
    }

    fn optional(&self, _cx: &mut CallCtx, _obj: &VolObject, _args: &mut OptionalArgs) -> Result<()> {
        unsupported!(Category::Datatype, "datatype optional")
    }

    fn close(&self, _cx: &mut CallCtx, _obj: &VolObject) -> Result<()> {
        unsupported!(Category::Datatype, "datatype close")
    }
}

pub trait LinkClass: Send + Sync {
    fn create(
        &self,
        _cx: &mut CallCtx,
        _loc: &VolObject,
        _name: &str,
        _target: LinkTarget<'_>,
    ) -> Result<()> {
        unsupported!(Category::Link, "link create")
    }

    fn copy(
        &self,
        _cx: &mut CallCtx,
        _src: &VolObject,
        _src_name: &str,
        _dst: &VolObject,
        _dst_name: &str,
    ) -> Result<()> {
        unsupported!(Category::Link, "link copy")
    }

    fn move_link(
        &self,
        _cx: &mut CallCtx,
        _src: &VolObject,
        _src_name: &str,
        _dst: &VolObject,
        _dst_name: &str,
    ) -> Result<()> {
        unsupported!(Category::Link, "link move")
    }

    fn get(&self, _cx: &mut CallCtx, _loc: &VolObject, _name: &str) -> Result<LinkInfo> {
        unsupported!(Category::Link, "link get")
    }

    fn specific(
        &self,
        _cx: &mut CallCtx,
        _loc: &VolObject,
        _op: LinkSpecific<'_>,
    ) -> Result<LinkSpecificOut> {
        unsupported!(Category::Link, "link specific")
    }

    fn optional(&self, _cx: &mut CallCtx, _loc: &VolObject, _args: &mut OptionalArgs) -> Result<()> {
        unsupported!(Category::Link, "link optional")
    }
}

pub trait ObjectClass: Send + Sync {
    fn open(
        &self,
        _cx: &mut CallCtx,
        _loc: &VolObject,
        _at: ObjectLocator<'_>,
    ) -> Result<(VolObject, ObjectKind)> {
        unsupported!(Category::Object, "object open")
    }

    fn copy(
        &self,
        _cx: &mut CallCtx,
        _src: &VolObject,
        _src_name: &str,
        _dst: &VolObject,
        _dst_name: &str,
    ) -> Result<()> {
        unsupported!(Category::Object, "object copy")
    }

    fn get(&self, _cx: &mut CallCtx, _loc: &VolObject, _what: ObjectGet<'_>) -> Result<ObjectGetOut> {
        unsupported!(Category::Object, "object get")
    }

    fn specific(
        &self,
        _cx: &mut CallCtx,
        _loc: &VolObject,
        _op: ObjectSpecific<'_>,
    ) -> Result<ObjectSpecificOut> {
        unsupported!(Category::Object, "object specific")
    }

    fn optional(&self, _cx: &mut CallCtx, _loc: &VolObject, _args: &mut OptionalArgs) -> Result<()> {
        unsupported!(Category::Object, "object optional")
    }
}

pub trait RequestClass: Send + Sync {
    /// Wait up to `timeout`; a zero timeout only tests.
    fn wait(&self, _cx: &mut CallCtx, _req: &VolObject, _timeout: Duration) -> Result<RequestStatus> {
        unsupported!(Category::Request, "request wait")
    }

    fn notify(&self, _cx: &mut CallCtx, _req: &VolObject, _cb: RequestNotify) -> Result<()> {
        unsupported!(Category::Request, "request notify")
    }

    fn cancel(&self, _cx: &mut CallCtx, _req: &VolObject) -> Result<RequestStatus> {
        unsupported!(Category::Request, "request cancel")
    }

    fn optional(&self, _cx: &mut CallCtx, _req: &VolObject, _args: &mut OptionalArgs) -> Result<()> {
        unsupported!(Category::Request, "request optional")
    }

    fn free(&self, _cx: &mut CallCtx, _req: &VolObject) -> Result<()> {
        unsupported!(Category::Request, "request free")
    }
}

pub trait BlobClass: Send + Sync {
    fn put(&self, _cx: &mut CallCtx, _file: &VolObject, _data: &[u8]) -> Result<BlobId> {
        unsupported!(Category::Blob, "blob put")
    }

    fn get(&self, _cx: &mut CallCtx, _file: &VolObject, _id: &BlobId) -> Result<Vec<u8>> {
        unsupported!(Category::Blob, "blob get")
    }

    fn specific(
        &self,
        _cx: &mut CallCtx,
        _file: &VolObject,
        _op: BlobSpecific<'_>,
    ) -> Result<BlobSpecificOut> {
        unsupported!(Category::Blob, "blob specific")
    }

    fn optional(&self, _cx: &mut CallCtx, _file: &VolObject, _args: &mut OptionalArgs) -> Result<()> {
        unsupported!(Category::Blob, "blob optional")
    }
}

pub trait TokenClass: Send + Sync {
    fn compare(
        &self,
        _cx: &mut CallCtx,
        _obj: &VolObject,
        _a: &ObjectToken,
        _b: &ObjectToken,
    ) -> Result<Ordering> {
        unsupported!(Category::Token, "token compare")
    }

    fn to_string(&self, _cx: &mut CallCtx, _obj: &VolObject, _token: &ObjectToken) -> Result<String> {
        unsupported!(Category::Token, "token to-string")
    }

    fn from_string(&self, _cx: &mut CallCtx, _obj: &VolObject, _s: &str) -> Result<ObjectToken> {
        unsupported!(Category::Token, "token from-string")
    }
}

pub trait IntrospectClass: Send + Sync {
    /// `Ok(None)` names the connector being asked.
    fn get_conn_cls(
        &self,
        _cx: &mut CallCtx,
        _obj: &VolObject,
        _level: ConnectorLevel,
    ) -> Result<Option<ConnectorRef>> {
        Ok(None)
    }

    fn get_cap_flags(&self) -> CapFlags;

    fn opt_query(
        &self,
        _cx: &mut CallCtx,
        _obj: &VolObject,
        _subclass: Subclass,
        _opcode: u32,
    ) -> Result<bool> {
        Ok(false)
    }
}

/// Object wrapping for stacked connectors.
pub trait WrapClass: Send + Sync {
    /// Connector and object one layer down, if `obj` is a wrapper.
    fn get_object(&self, obj: &VolObject) -> Option<IdObject>;

    fn get_wrap_ctx(&self, obj: &VolObject) -> Result<VolObject>;

    fn wrap_object(&self, obj: VolObject, kind: ObjectKind, ctx: &VolObject) -> Result<VolObject>;

    fn unwrap_object(&self, obj: &VolObject) -> Result<VolObject>;

    fn free_wrap_ctx(&self, ctx: VolObject) -> Result<()>;
}

/// A pluggable implementation of the operation surface.
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;

    /// Numeric identity; two objects from connectors with the same value
    /// may take part in one operation.
    fn value(&self) -> u32;

    fn capabilities(&self) -> CapFlags {
        self.introspect()
            .map(|i| i.get_cap_flags())
            .unwrap_or_default()
    }

    fn file(&self) -> Option<&dyn FileClass> {
        None
    }

    fn group(&self) -> Option<&dyn GroupClass> {
        None
    }

    fn dataset(&self) -> Option<&dyn DatasetClass> {
        None
    }

    fn attr(&self) -> Option<&dyn AttrClass> {
        None
    }

    fn datatype(&self) -> Option<&dyn DatatypeClass> {
        None
    }

    fn link(&self) -> Option<&dyn LinkClass> {
        None
    }

    fn object(&self) -> Option<&dyn ObjectClass> {
        None
    }

    fn request(&self) -> Option<&dyn RequestClass> {
        None
    }

    fn blob(&self) -> Option<&dyn BlobClass> {
        None
    }

    fn token(&self) -> Option<&dyn TokenClass> {
        None
    }

    fn introspect(&self) -> Option<&dyn IntrospectClass> {
        None
    }

    fn wrap(&self) -> Option<&dyn WrapClass> {
        None
    }

    /// Catch-all for operations outside every subclass.
    fn optional(&self, _cx: &mut CallCtx, _obj: &VolObject, _args: &mut OptionalArgs) -> Result<()> {
        Err(no_such_method(Category::Connector, "generic optional"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    impl Connector for Bare {
        fn name(&self) -> &str {
            "bare"
        }

        fn value(&self) -> u32 {
            900
        }
    }

    #[test]
    fn downcast_checks_type() {
        let obj = VolObject::new(5u64);
        assert_eq!(obj.downcast::<u64>().as_deref(), Some(&5));
        assert!(obj.downcast::<u32>().is_none());
        assert!(obj.ptr_eq(&obj.clone()));
    }

    #[test]
    fn bare_connector_has_no_tables() {
        let c = Bare;
        assert!(c.file().is_none());
        assert!(c.capabilities().is_empty());
    }

    #[test]
    fn obj_types_all_excludes_local() {
        assert!(ObjTypes::ALL.contains(ObjTypes::ATTR));
        assert!(!ObjTypes::ALL.contains(ObjTypes::LOCAL));
    }
}

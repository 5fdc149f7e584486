//! The native connector: objects stored in the container format itself.

mod attr;
mod blob;
mod dataset;
mod datatype;
mod file;
mod group;
pub(crate) mod header;
mod link;
mod object;
pub(crate) mod path;
mod request;
mod token;

use std::sync::Arc;

use tracing::trace;

use self::header::{HeaderKind, Link, LinkValue, Message};
use crate::error::{Category, Error, ErrorKind, Result};
use crate::file::{self as fl, FileTop, FirstError, Lifecycle, ObjectLoc};
use crate::plist::LinkAccessProps;
use crate::vol::{
    CallCtx, CapFlags, Connector, FileClass, GroupClass, DatasetClass, AttrClass, DatatypeClass,
    LinkClass, ObjectClass, RequestClass, BlobClass, TokenClass, IntrospectClass, Subclass,
    VolObject,
};

pub use request::NativeRequest;

/// Value the native connector registers under.
pub const NATIVE_VALUE: u32 = 0;
pub const NATIVE_NAME: &str = "native";

/// Optional file operations understood by the native connector.
pub mod opcodes {
    /// Output: end of allocation, u64 little-endian.
    pub const GET_EOA: u32 = 1;
    /// Output: bytes on the free list, u64 little-endian.
    pub const GET_FREE_SPACE: u32 = 2;
    /// Output: bin count then each bin, u32 little-endian.
    pub const GET_RETRIES: u32 = 3;
    pub const START_SWMR_WRITE: u32 = 4;
    pub const CLEAR_EFC: u32 = 5;
}

/// Terminal connector that reads and writes the container format.
#[derive(Debug, Default)]
pub struct NativeConnector {
    _private: (),
}

impl NativeConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Object handed out by the native connector.
pub(crate) enum NativeObject {
    File(Arc<FileTop>),
    Group(ObjectLoc),
    Dataset(ObjectLoc),
    Datatype(ObjectLoc),
    Attr(AttrHandle),
}

/// An open attribute: the object it is attached to and its name.
pub(crate) struct AttrHandle {
    pub parent: ObjectLoc,
    pub name: String,
}

impl NativeObject {
    /// File handle the object was opened through.
    pub fn top(&self) -> &Arc<FileTop> {
        match self {
            NativeObject::File(t) => t,
            NativeObject::Group(l) | NativeObject::Dataset(l) | NativeObject::Datatype(l) => &l.top,
            NativeObject::Attr(a) => &a.parent.top,
        }
    }

    /// Location of a group, dataset or committed datatype.
    pub fn loc(&self) -> Option<ObjectLoc> {
        match self {
            NativeObject::Group(l) | NativeObject::Dataset(l) | NativeObject::Datatype(l) => {
                Some(l.clone())
            }
            _ => None,
        }
    }

    /// Where relative paths start: a file's root group or the object.
    pub fn location(&self) -> Result<ObjectLoc> {
        match self {
            NativeObject::File(t) => t.root(),
            NativeObject::Group(l) | NativeObject::Dataset(l) | NativeObject::Datatype(l) => {
                Ok(l.clone())
            }
            NativeObject::Attr(_) => Err(Error::args(
                Category::Attribute,
                "an attribute is not a location",
            )),
        }
    }
}

pub(crate) fn native(obj: &VolObject, category: Category) -> Result<Arc<NativeObject>> {
    obj.downcast::<NativeObject>().ok_or_else(|| {
        Error::args(category, "object does not belong to the native connector")
    })
}

pub(crate) fn location(obj: &VolObject, category: Category) -> Result<ObjectLoc> {
    native(obj, category)?.location()
}

pub(crate) fn file_top(obj: &VolObject, category: Category) -> Result<Arc<FileTop>> {
    Ok(native(obj, category)?.top().clone())
}

/// Location of an open group, dataset or committed datatype.
pub(crate) fn object_loc(obj: &VolObject, category: Category) -> Result<ObjectLoc> {
    native(obj, category)?
        .loc()
        .ok_or_else(|| Error::args(category, "not a group, dataset or datatype"))
}

pub(crate) fn kind_at(loc: &ObjectLoc) -> Result<HeaderKind> {
    loc.top.with_shared(|s| Ok(header::load(s, loc.addr)?.kind))
}

/// Write a new object of `kind` and link it as `name` in the group at
/// `parent`.
pub(crate) fn insert_new(
    parent: &ObjectLoc,
    name: &str,
    kind: HeaderKind,
    messages: Vec<Message>,
) -> Result<ObjectLoc> {
    let addr = parent.top.with_shared(|s| {
        s.require_writable()?;
        let mut hdr = header::load(s, parent.addr)?;
        if hdr.kind != HeaderKind::Group {
            return Err(Error::args(Category::Link, "parent is not a group"));
        }
        if hdr.find_link(name).is_some() {
            return Err(Error::new(
                Category::Link,
                ErrorKind::AlreadyExists,
                format!("name '{name}' already exists"),
            ));
        }
        let addr = header::create(s, kind, messages)?;
        hdr.add_link(Link {
            name: name.to_string(),
            value: LinkValue::Hard(addr),
        })?;
        header::store(s, parent.addr, &mut hdr)?;
        Ok(addr)
    })?;
    Ok(ObjectLoc {
        top: parent.top.clone(),
        addr,
    })
}

/// Resolve `name` from `obj` and open it, which must be a `want`.
pub(crate) fn open_named(
    cx: &mut CallCtx,
    obj: &VolObject,
    name: &str,
    want: HeaderKind,
    category: Category,
    make: fn(ObjectLoc) -> NativeObject,
) -> Result<VolObject> {
    let start = location(obj, category)?;
    path::with_target(cx, &start, name, &LinkAccessProps::default(), |loc| {
        let kind = kind_at(loc)?;
        if kind != want {
            return Err(Error::args(
                category,
                format!("'{name}' is a {kind:?}, not a {want:?}"),
            ));
        }
        opened(loc.clone(), make)
    })
}

/// Count a newly opened object and wrap it.
pub(crate) fn opened(loc: ObjectLoc, make: fn(ObjectLoc) -> NativeObject) -> Result<VolObject> {
    fl::object_opened(&loc.top, loc.addr)?;
    Ok(VolObject::new(make(loc)))
}

/// The handle on the object at `loc` went away.
pub(crate) fn release(cx: &mut CallCtx, loc: &ObjectLoc) -> Result<()> {
    let mut errs = FirstError::default();
    {
        let mut s = loc.top.shared.state.lock();
        if s.lifecycle == Lifecycle::Live {
            if s.object_closed(loc.addr) {
                errs.note("free unlinked object", header::free_deleted(&mut s, loc.addr));
            } else if s.fapl.evict_on_close && !s.is_open(loc.addr) {
                errs.note("flush before evict", s.flush());
                for addr in header::image_addrs(&mut s, loc.addr) {
                    s.cache.evict_if_clean(addr);
                }
                trace!(addr = loc.addr, "object evicted on close");
            }
        }
    }
    errs.note("release file", fl::top_released(cx, &loc.top));
    errs.into_result()
}

pub(crate) fn flush_object(loc: &ObjectLoc) -> Result<()> {
    loc.top.with_shared(|s| s.flush())
}

/// Drop the cached images of the object at `loc` so the next access reads
/// the store.
pub(crate) fn refresh_object(loc: &ObjectLoc) -> Result<()> {
    loc.top.with_shared(|s| {
        s.flush()?;
        for addr in header::image_addrs(s, loc.addr) {
            s.cache.evict_if_clean(addr);
        }
        trace!(addr = loc.addr, "object refreshed");
        Ok(())
    })
}

const CAPS: CapFlags = CapFlags::FILE_BASIC
    .union(CapFlags::GROUP_BASIC)
    .union(CapFlags::DATASET_BASIC)
    .union(CapFlags::ATTR_BASIC)
    .union(CapFlags::DATATYPE_BASIC)
    .union(CapFlags::LINK_BASIC)
    .union(CapFlags::OBJECT_BASIC)
    .union(CapFlags::BLOBS)
    .union(CapFlags::TOKENS)
    .union(CapFlags::ASYNC)
    .union(CapFlags::MOUNT)
    .union(CapFlags::SWMR)
    .union(CapFlags::EXTERNAL_LINKS)
    .union(CapFlags::SOFT_LINKS);

impl IntrospectClass for NativeConnector {
    fn get_cap_flags(&self) -> CapFlags {
        CAPS
    }

    fn opt_query(
        &self,
        _cx: &mut CallCtx,
        _obj: &VolObject,
        subclass: Subclass,
        opcode: u32,
    ) -> Result<bool> {
        Ok(subclass == Subclass::File && (opcodes::GET_EOA..=opcodes::CLEAR_EFC).contains(&opcode))
    }
}

impl Connector for NativeConnector {
    fn name(&self) -> &str {
        NATIVE_NAME
    }

    fn value(&self) -> u32 {
        NATIVE_VALUE
    }

    fn file(&self) -> Option<&dyn FileClass> {
        Some(self)
    }

    fn group(&self) -> Option<&dyn GroupClass> {
        Some(self)
    }

    fn dataset(&self) -> Option<&dyn DatasetClass> {
        Some(self)
    }

    fn attr(&self) -> Option<&dyn AttrClass> {
        Some(self)
    }

    fn datatype(&self) -> Option<&dyn DatatypeClass> {
        Some(self)
    }

    fn link(&self) -> Option<&dyn LinkClass> {
        Some(self)
    }

    fn object(&self) -> Option<&dyn ObjectClass> {
        Some(self)
    }

    fn request(&self) -> Option<&dyn RequestClass> {
        Some(self)
    }

    fn blob(&self) -> Option<&dyn BlobClass> {
        Some(self)
    }

    fn token(&self) -> Option<&dyn TokenClass> {
        Some(self)
    }

    fn introspect(&self) -> Option<&dyn IntrospectClass> {
        Some(self)
    }
}

//! A pass-through connector that forwards every call to an inner connector.
//!
//! Objects handed out are wrappers around the inner connector's objects.
//! Each forwarded call is logged and, when set, reported to an observer:
//! close calls once the inner close returns, everything else before it is
//! forwarded.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use hdfcore_format::Datatype;
use hdfcore_io::AccessFlags;
use tracing::debug;

use super::dispatch;
use super::{
    AttrClass, AttrGet, AttrGetOut, AttrSpecific, AttrSpecificOut, BlobClass, BlobId,
    BlobSpecific, BlobSpecificOut, CallCtx, CapFlags, Connector, ConnectorLevel, ConnectorRef,
    DatasetClass, DatasetGet, DatasetGetOut, DatasetSpecific, DatatypeClass, DatatypeSpecific,
    FileClass, FileGet, FileGetOut, FileSpecific, FileSpecificOut, GroupClass, GroupGet,
    GroupSpecific, IdObject, IntrospectClass, LinkClass, LinkInfo, LinkSpecific, LinkSpecificOut,
    LinkTarget, ObjectClass, ObjectGet, ObjectGetOut, ObjectKind, ObjectLocator, ObjectSpecific,
    ObjectSpecificOut, ObjectToken, OptionalArgs, RequestClass, RequestNotify, RequestStatus,
    Subclass, TokenClass, VolObject, WrapClass,
};
use crate::dataspace::Dataspace;
use crate::error::{Category, Error, Result};
use crate::errstack::CallbackGuard;
use crate::plist::{DatasetAccessProps, DatasetCreateProps, FileAccessProps, FileCreateProps};

/// Called with the name of each forwarded operation.
pub type Observer = Arc<dyn Fn(&str) + Send + Sync>;

struct PtObject {
    under: ConnectorRef,
    inner: VolObject,
}

struct PtWrapCtx {
    under: ConnectorRef,
    under_ctx: Option<VolObject>,
}

pub struct PassThrough {
    name: String,
    value: u32,
    under: ConnectorRef,
    observer: Option<Observer>,
}

impl PassThrough {
    pub fn new(name: impl Into<String>, value: u32, under: ConnectorRef) -> Self {
        Self {
            name: name.into(),
            value,
            under,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn under(&self) -> &ConnectorRef {
        &self.under
    }

    fn note(&self, op: &str) {
        debug!(connector = %self.name, op, "forwarding");
        if let Some(observer) = &self.observer {
            let _guard = CallbackGuard::new();
            observer(op);
        }
    }

    fn inner(&self, obj: &VolObject) -> Result<IdObject> {
        let pt = obj.downcast::<PtObject>().ok_or_else(|| {
            Error::args(
                Category::Connector,
                format!("object does not belong to connector {}", self.name),
            )
        })?;
        Ok(IdObject::new(pt.under.clone(), pt.inner.clone()))
    }

    fn wrap_new(&self, inner: VolObject) -> VolObject {
        VolObject::new(PtObject {
            under: self.under.clone(),
            inner,
        })
    }

    fn rewrap_request(&self, cx: &mut CallCtx) {
        if let Some(req) = cx.take_request() {
            let wrapped = self.wrap_new(req);
            cx.set_request(wrapped);
        }
    }
}

impl Connector for PassThrough {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> u32 {
        self.value
    }

    fn file(&self) -> Option<&dyn FileClass> {
        self.under.file().map(|_| self as &dyn FileClass)
    }

    fn group(&self) -> Option<&dyn GroupClass> {
        self.under.group().map(|_| self as &dyn GroupClass)
    }

    fn dataset(&self) -> Option<&dyn DatasetClass> {
        self.under.dataset().map(|_| self as &dyn DatasetClass)
    }

    fn attr(&self) -> Option<&dyn AttrClass> {
        self.under.attr().map(|_| self as &dyn AttrClass)
    }

    fn datatype(&self) -> Option<&dyn DatatypeClass> {
        self.under.datatype().map(|_| self as &dyn DatatypeClass)
    }

    fn link(&self) -> Option<&dyn LinkClass> {
        self.under.link().map(|_| self as &dyn LinkClass)
    }

    fn object(&self) -> Option<&dyn ObjectClass> {
        self.under.object().map(|_| self as &dyn ObjectClass)
    }

    fn request(&self) -> Option<&dyn RequestClass> {
        self.under.request().map(|_| self as &dyn RequestClass)
    }

    fn blob(&self) -> Option<&dyn BlobClass> {
        self.under.blob().map(|_| self as &dyn BlobClass)
    }

    fn token(&self) -> Option<&dyn TokenClass> {
        self.under.token().map(|_| self as &dyn TokenClass)
    }

    fn introspect(&self) -> Option<&dyn IntrospectClass> {
        Some(self)
    }

    fn wrap(&self) -> Option<&dyn WrapClass> {
        Some(self)
    }

    fn optional(&self, cx: &mut CallCtx, obj: &VolObject, args: &mut OptionalArgs) -> Result<()> {
        self.note("optional");
        dispatch::optional(cx, &self.inner(obj)?, args)
    }
}

impl FileClass for PassThrough {
    fn create(
        &self,
        cx: &mut CallCtx,
        name: &str,
        flags: AccessFlags,
        fcpl: &FileCreateProps,
        fapl: &FileAccessProps,
    ) -> Result<VolObject> {
        self.note("file create");
        let obj = dispatch::file_create(cx, &self.under, name, flags, fcpl, fapl)?;
        Ok(self.wrap_new(obj))
    }

    fn open(
        &self,
        cx: &mut CallCtx,
        name: &str,
        flags: AccessFlags,
        fapl: &FileAccessProps,
    ) -> Result<VolObject> {
        self.note("file open");
        let obj = dispatch::file_open(cx, &self.under, name, flags, fapl)?;
        Ok(self.wrap_new(obj))
    }

    fn get(&self, cx: &mut CallCtx, obj: &VolObject, what: FileGet) -> Result<FileGetOut> {
        self.note("file get");
        dispatch::file_get(cx, &self.inner(obj)?, what)
    }

    fn specific(
        &self,
        cx: &mut CallCtx,
        obj: Option<&VolObject>,
        op: FileSpecific<'_>,
    ) -> Result<FileSpecificOut> {
        self.note("file specific");
        let inner = obj.map(|o| self.inner(o)).transpose()?;
        let other = match &op {
            FileSpecific::IsEqual(o) => Some(self.inner(o)?),
            _ => None,
        };
        let op = match (op, &other) {
            (FileSpecific::IsEqual(_), Some(o)) => FileSpecific::IsEqual(&o.data),
            (op, _) => op,
        };
        let out = dispatch::file_specific(cx, &self.under, inner.as_ref().map(|i| &i.data), op)?;
        Ok(match out {
            FileSpecificOut::Object(o) => FileSpecificOut::Object(self.wrap_new(o)),
            other => other,
        })
    }

    fn optional(&self, cx: &mut CallCtx, obj: &VolObject, args: &mut OptionalArgs) -> Result<()> {
        self.note("file optional");
        dispatch::file_optional(cx, &self.inner(obj)?, args)
    }

    fn close(&self, cx: &mut CallCtx, obj: &VolObject) -> Result<()> {
        let result = dispatch::file_close(cx, &self.inner(obj)?);
        self.note("file close");
        result
    }
}

impl GroupClass for PassThrough {
    fn create(&self, cx: &mut CallCtx, loc: &VolObject, name: &str) -> Result<VolObject> {
        self.note("group create");
        let obj = dispatch::group_create(cx, &self.inner(loc)?, name)?;
        self.rewrap_request(cx);
        Ok(self.wrap_new(obj))
    }

    fn open(&self, cx: &mut CallCtx, loc: &VolObject, name: &str) -> Result<VolObject> {
        self.note("group open");
        let obj = dispatch::group_open(cx, &self.inner(loc)?, name)?;
        Ok(self.wrap_new(obj))
    }

    fn get(&self, cx: &mut CallCtx, obj: &VolObject, what: GroupGet) -> Result<u64> {
        self.note("group get");
        dispatch::group_get(cx, &self.inner(obj)?, what)
    }

    fn specific(&self, cx: &mut CallCtx, obj: &VolObject, op: GroupSpecific<'_>) -> Result<()> {
        self.note("group specific");
        let inner = self.inner(obj)?;
        match op {
            GroupSpecific::Mount { name, child } => {
                let child = self.inner(child)?;
                dispatch::group_specific(
                    cx,
                    &inner,
                    GroupSpecific::Mount {
                        name,
                        child: &child.data,
                    },
                )
            }
            op => dispatch::group_specific(cx, &inner, op),
        }
    }

    fn optional(&self, cx: &mut CallCtx, obj: &VolObject, args: &mut OptionalArgs) -> Result<()> {
        self.note("group optional");
        dispatch::group_optional(cx, &self.inner(obj)?, args)
    }

    fn close(&self, cx: &mut CallCtx, obj: &VolObject) -> Result<()> {
        let result = dispatch::group_close(cx, &self.inner(obj)?);
        self.note("group close");
        result
    }
}

impl DatasetClass for PassThrough {
    fn create(
        &self,
        cx: &mut CallCtx,
        loc: &VolObject,
        name: &str,
        dtype: &Datatype,
        space: &Dataspace,
        dcpl: &DatasetCreateProps,
    ) -> Result<VolObject> {
        self.note("dataset create");
        let obj = dispatch::dataset_create(cx, &self.inner(loc)?, name, dtype, space, dcpl)?;
        self.rewrap_request(cx);
        Ok(self.wrap_new(obj))
    }

    fn open(
        &self,
        cx: &mut CallCtx,
        loc: &VolObject,
        name: &str,
        dapl: &DatasetAccessProps,
    ) -> Result<VolObject> {
        self.note("dataset open");
        let obj = dispatch::dataset_open(cx, &self.inner(loc)?, name, dapl)?;
        Ok(self.wrap_new(obj))
    }

    fn read(
        &self,
        cx: &mut CallCtx,
        dsets: &[VolObject],
        mem_types: &[Datatype],
        bufs: &mut [&mut [u8]],
    ) -> Result<()> {
        self.note("dataset read");
        let inner = dsets
            .iter()
            .map(|d| self.inner(d))
            .collect::<Result<Vec<_>>>()?;
        dispatch::dataset_read(cx, &inner, mem_types, bufs)?;
        self.rewrap_request(cx);
        Ok(())
    }

    fn write(
        &self,
        cx: &mut CallCtx,
        dsets: &[VolObject],
        mem_types: &[Datatype],
        bufs: &[&[u8]],
    ) -> Result<()> {
        self.note("dataset write");
        let inner = dsets
            .iter()
            .map(|d| self.inner(d))
            .collect::<Result<Vec<_>>>()?;
        dispatch::dataset_write(cx, &inner, mem_types, bufs)?;
        self.rewrap_request(cx);
        Ok(())
    }

    fn get(&self, cx: &mut CallCtx, obj: &VolObject, what: DatasetGet) -> Result<DatasetGetOut> {
        self.note("dataset get");
        dispatch::dataset_get(cx, &self.inner(obj)?, what)
    }

    fn specific(&self, cx: &mut CallCtx, obj: &VolObject, op: DatasetSpecific<'_>) -> Result<()> {
        self.note("dataset specific");
        dispatch::dataset_specific(cx, &self.inner(obj)?, op)
    }

    fn optional(&self, cx: &mut CallCtx, obj: &VolObject, args: &mut OptionalArgs) -> Result<()> {
        self.note("dataset optional");
        dispatch::dataset_optional(cx, &self.inner(obj)?, args)
    }

    fn close(&self, cx: &mut CallCtx, obj: &VolObject) -> Result<()> {
        let result = dispatch::dataset_close(cx, &self.inner(obj)?);
        self.note("dataset close");
        result
    }
}

impl AttrClass for PassThrough {
    fn create(
        &self,
        cx: &mut CallCtx,
        obj: &VolObject,
        name: &str,
        dtype: &Datatype,
        space: &Dataspace,
    ) -> Result<VolObject> {
        self.note("attribute create");
        let attr = dispatch::attr_create(cx, &self.inner(obj)?, name, dtype, space)?;
        Ok(self.wrap_new(attr))
    }

    fn open(&self, cx: &mut CallCtx, obj: &VolObject, name: &str) -> Result<VolObject> {
        self.note("attribute open");
        let attr = dispatch::attr_open(cx, &self.inner(obj)?, name)?;
        Ok(self.wrap_new(attr))
    }

    fn read(
        &self,
        cx: &mut CallCtx,
        attr: &VolObject,
        mem_type: &Datatype,
        buf: &mut [u8],
    ) -> Result<()> {
        self.note("attribute read");
        dispatch::attr_read(cx, &self.inner(attr)?, mem_type, buf)
    }

    fn write(&self, cx: &mut CallCtx, attr: &VolObject, mem_type: &Datatype, buf: &[u8]) -> Result<()> {
        self.note("attribute write");
        dispatch::attr_write(cx, &self.inner(attr)?, mem_type, buf)
    }

    fn get(&self, cx: &mut CallCtx, attr: &VolObject, what: AttrGet) -> Result<AttrGetOut> {
        self.note("attribute get");
        dispatch::attr_get(cx, &self.inner(attr)?, what)
    }

    fn specific(
        &self,
        cx: &mut CallCtx,
        obj: &VolObject,
        op: AttrSpecific<'_>,
    ) -> Result<AttrSpecificOut> {
        self.note("attribute specific");
        dispatch::attr_specific(cx, &self.inner(obj)?, op)
    }

    fn optional(&self, cx: &mut CallCtx, obj: &VolObject, args: &mut OptionalArgs) -> Result<()> {
        self.note("attribute optional");
        dispatch::attr_optional(cx, &self.inner(obj)?, args)
    }

    fn close(&self, cx: &mut CallCtx, attr: &VolObject) -> Result<()> {
        let result = dispatch::attr_close(cx, &self.inner(attr)?);
        self.note("attribute close");
        result
    }
}

impl DatatypeClass for PassThrough {
    fn commit(
        &self,
        cx: &mut CallCtx,
        loc: &VolObject,
        name: &str,
        dtype: &Datatype,
    ) -> Result<VolObject> {
        self.note("datatype commit");
        let obj = dispatch::datatype_commit(cx, &self.inner(loc)?, name, dtype)?;
        Ok(self.wrap_new(obj))
    }

    fn open(&self, cx: &mut CallCtx, loc: &VolObject, name: &str) -> Result<VolObject> {
        self.note("datatype open");
        let obj = dispatch::datatype_open(cx, &self.inner(loc)?, name)?;
        Ok(self.wrap_new(obj))
    }

    fn get(&self, cx: &mut CallCtx, obj: &VolObject) -> Result<Datatype> {
        self.note("datatype get");
        dispatch::datatype_get(cx, &self.inner(obj)?)
    }

    fn specific(&self, cx: &mut CallCtx, obj: &VolObject, op: DatatypeSpecific) -> Result<()> {
        self.note("datatype specific");
        dispatch::datatype_specific(cx, &self.inner(obj)?, op)
    }

    fn optional(&self, cx: &mut CallCtx, obj: &VolObject, args: &mut OptionalArgs) -> Result<()> {
        self.note("datatype optional");
        dispatch::datatype_optional(cx, &self.inner(obj)?, args)
    }

    fn close(&self, cx: &mut CallCtx, obj: &VolObject) -> Result<()> {
        let result = dispatch::datatype_close(cx, &self.inner(obj)?);
        self.note("datatype close");
        result
    }
}

impl LinkClass for PassThrough {
    fn create(
        &self,
        cx: &mut CallCtx,
        loc: &VolObject,
        name: &str,
        target: LinkTarget<'_>,
    ) -> Result<()> {
        self.note("link create");
        let inner = self.inner(loc)?;
        match target {
            LinkTarget::Hard { loc: target, path } => {
                let target = self.inner(target)?;
                dispatch::link_create_hard(cx, &target, path, &inner, name)
            }
            other => dispatch::link_create(cx, &inner, name, other),
        }
    }

    fn copy(
        &self,
        cx: &mut CallCtx,
        src: &VolObject,
        src_name: &str,
        dst: &VolObject,
        dst_name: &str,
    ) -> Result<()> {
        self.note("link copy");
        dispatch::link_copy(cx, &self.inner(src)?, src_name, &self.inner(dst)?, dst_name)
    }

    fn move_link(
        &self,
        cx: &mut CallCtx,
        src: &VolObject,
        src_name: &str,
        dst: &VolObject,
        dst_name: &str,
    ) -> Result<()> {
        self.note("link move");
        dispatch::link_move(cx, &self.inner(src)?, src_name, &self.inner(dst)?, dst_name)
    }

    fn get(&self, cx: &mut CallCtx, loc: &VolObject, name: &str) -> Result<LinkInfo> {
        self.note("link get");
        dispatch::link_get(cx, &self.inner(loc)?, name)
    }

    fn specific(
        &self,
        cx: &mut CallCtx,
        loc: &VolObject,
        op: LinkSpecific<'_>,
    ) -> Result<LinkSpecificOut> {
        self.note("link specific");
        dispatch::link_specific(cx, &self.inner(loc)?, op)
    }

    fn optional(&self, cx: &mut CallCtx, loc: &VolObject, args: &mut OptionalArgs) -> Result<()> {
        self.note("link optional");
        dispatch::link_optional(cx, &self.inner(loc)?, args)
    }
}

impl ObjectClass for PassThrough {
    fn open(
        &self,
        cx: &mut CallCtx,
        loc: &VolObject,
        at: ObjectLocator<'_>,
    ) -> Result<(VolObject, ObjectKind)> {
        self.note("object open");
        let (obj, kind) = dispatch::object_open(cx, &self.inner(loc)?, at)?;
        Ok((self.wrap_new(obj), kind))
    }

    fn copy(
        &self,
        cx: &mut CallCtx,
        src: &VolObject,
        src_name: &str,
        dst: &VolObject,
        dst_name: &str,
    ) -> Result<()> {
        self.note("object copy");
        dispatch::object_copy(cx, &self.inner(src)?, src_name, &self.inner(dst)?, dst_name)
    }

    fn get(&self, cx: &mut CallCtx, loc: &VolObject, what: ObjectGet<'_>) -> Result<ObjectGetOut> {
        self.note("object get");
        dispatch::object_get(cx, &self.inner(loc)?, what)
    }

    fn specific(
        &self,
        cx: &mut CallCtx,
        loc: &VolObject,
        op: ObjectSpecific<'_>,
    ) -> Result<ObjectSpecificOut> {
        self.note("object specific");
        dispatch::object_specific(cx, &self.inner(loc)?, op)
    }

    fn optional(&self, cx: &mut CallCtx, loc: &VolObject, args: &mut OptionalArgs) -> Result<()> {
        self.note("object optional");
        dispatch::object_optional(cx, &self.inner(loc)?, args)
    }
}

impl RequestClass for PassThrough {
    fn wait(&self, cx: &mut CallCtx, req: &VolObject, timeout: Duration) -> Result<RequestStatus> {
        self.note("request wait");
        dispatch::request_wait(cx, &self.inner(req)?, timeout)
    }

    fn notify(&self, cx: &mut CallCtx, req: &VolObject, cb: RequestNotify) -> Result<()> {
        self.note("request notify");
        dispatch::request_notify(cx, &self.inner(req)?, cb)
    }

    fn cancel(&self, cx: &mut CallCtx, req: &VolObject) -> Result<RequestStatus> {
        self.note("request cancel");
        dispatch::request_cancel(cx, &self.inner(req)?)
    }

    fn optional(&self, cx: &mut CallCtx, req: &VolObject, args: &mut OptionalArgs) -> Result<()> {
        self.note("request optional");
        dispatch::request_optional(cx, &self.inner(req)?, args)
    }

    fn free(&self, cx: &mut CallCtx, req: &VolObject) -> Result<()> {
        self.note("request free");
        dispatch::request_free(cx, &self.inner(req)?)
    }
}

impl BlobClass for PassThrough {
    fn put(&self, cx: &mut CallCtx, file: &VolObject, data: &[u8]) -> Result<BlobId> {
        self.note("blob put");
        dispatch::blob_put(cx, &self.inner(file)?, data)
    }

    fn get(&self, cx: &mut CallCtx, file: &VolObject, id: &BlobId) -> Result<Vec<u8>> {
        self.note("blob get");
        dispatch::blob_get(cx, &self.inner(file)?, id)
    }

    fn specific(
        &self,
        cx: &mut CallCtx,
        file: &VolObject,
        op: BlobSpecific<'_>,
    ) -> Result<BlobSpecificOut> {
        self.note("blob specific");
        dispatch::blob_specific(cx, &self.inner(file)?, op)
    }

    fn optional(&self, cx: &mut CallCtx, file: &VolObject, args: &mut OptionalArgs) -> Result<()> {
        self.note("blob optional");
        dispatch::blob_optional(cx, &self.inner(file)?, args)
    }
}

impl TokenClass for PassThrough {
    fn compare(
        &self,
        cx: &mut CallCtx,
        obj: &VolObject,
        a: &ObjectToken,
        b: &ObjectToken,
    ) -> Result<Ordering> {
        self.note("token compare");
        dispatch::token_cmp(cx, &self.inner(obj)?, a, b)
    }

    fn to_string(&self, cx: &mut CallCtx, obj: &VolObject, token: &ObjectToken) -> Result<String> {
        self.note("token to-string");
        dispatch::token_to_string(cx, &self.inner(obj)?, token)
    }

    fn from_string(&self, cx: &mut CallCtx, obj: &VolObject, s: &str) -> Result<ObjectToken> {
        self.note("token from-string");
        dispatch::token_from_string(cx, &self.inner(obj)?, s)
    }
}

impl IntrospectClass for PassThrough {
    fn get_conn_cls(
        &self,
        cx: &mut CallCtx,
        obj: &VolObject,
        level: ConnectorLevel,
    ) -> Result<Option<ConnectorRef>> {
        match level {
            ConnectorLevel::Current => Ok(None),
            ConnectorLevel::Terminal => {
                let inner = self.inner(obj)?;
                dispatch::get_conn_cls(cx, &inner, ConnectorLevel::Terminal).map(Some)
            }
        }
    }

    fn get_cap_flags(&self) -> CapFlags {
        self.under.capabilities() | CapFlags::STACKABLE
    }

    fn opt_query(
        &self,
        cx: &mut CallCtx,
        obj: &VolObject,
        subclass: Subclass,
        opcode: u32,
    ) -> Result<bool> {
        dispatch::opt_query(cx, &self.inner(obj)?, subclass, opcode)
    }
}

impl WrapClass for PassThrough {
    fn get_object(&self, obj: &VolObject) -> Option<IdObject> {
        obj.downcast::<PtObject>()
            .map(|pt| IdObject::new(pt.under.clone(), pt.inner.clone()))
    }

    fn get_wrap_ctx(&self, obj: &VolObject) -> Result<VolObject> {
        let inner = self.inner(obj)?;
        let under_ctx = match inner.connector.wrap() {
            Some(w) => Some(w.get_wrap_ctx(&inner.data)?),
            None => None,
        };
        Ok(VolObject::new(PtWrapCtx {
            under: inner.connector,
            under_ctx,
        }))
    }

    fn wrap_object(&self, obj: VolObject, kind: ObjectKind, ctx: &VolObject) -> Result<VolObject> {
        let ctx = ctx.downcast::<PtWrapCtx>().ok_or_else(|| {
            Error::args(Category::Connector, "wrap context from another connector")
        })?;
        let inner = match (&ctx.under_ctx, ctx.under.wrap()) {
            (Some(under_ctx), Some(w)) => w.wrap_object(obj, kind, under_ctx)?,
            _ => obj,
        };
        debug!(connector = %self.name, ?kind, "wrapping object");
        Ok(VolObject::new(PtObject {
            under: ctx.under.clone(),
            inner,
        }))
    }

    fn unwrap_object(&self, obj: &VolObject) -> Result<VolObject> {
        let inner = self.inner(obj)?;
        match inner.connector.wrap() {
            Some(w) => w.unwrap_object(&inner.data),
            None => Ok(inner.data),
        }
    }

    fn free_wrap_ctx(&self, ctx: VolObject) -> Result<()> {
        let ctx = ctx.downcast::<PtWrapCtx>().ok_or_else(|| {
            Error::args(Category::Connector, "wrap context from another connector")
        })?;
        match (&ctx.under_ctx, ctx.under.wrap()) {
            (Some(under_ctx), Some(w)) => w.free_wrap_ctx(under_ctx.clone()),
            _ => Ok(()),
        }
    }
}

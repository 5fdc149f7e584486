//! Routing of operations through connector tables.
//!
//! Every function here looks up the subclass table on the object's
//! connector, fails with "no such method" when it is absent, and runs the
//! connector call under a [`CallbackGuard`]. The outermost call of an
//! operation also fetches the connector's wrap context and frees it when
//! the call returns; nested calls reuse it. Operations over two objects
//! reject objects from different connectors.

use std::cmp::Ordering;
use std::time::Duration;

use hdfcore_format::Datatype;
use hdfcore_io::AccessFlags;
use tracing::{trace, warn};

use super::{
    no_such_method, AttrGet, AttrGetOut, AttrSpecific, AttrSpecificOut, BlobId, BlobSpecific,
    BlobSpecificOut, CallCtx, CapFlags, ConnectorLevel, ConnectorRef, DatasetGet, DatasetGetOut,
    DatasetSpecific, DatatypeSpecific, FileGet, FileGetOut, FileSpecific, FileSpecificOut,
    GroupGet, GroupSpecific, IdObject, LinkInfo, LinkSpecific, LinkSpecificOut, LinkTarget,
    ObjectGet, ObjectGetOut, ObjectKind, ObjectLocator, ObjectSpecific, ObjectSpecificOut,
    ObjectToken, OptionalArgs, RequestNotify, RequestStatus, Subclass, VolObject, WrapState,
};
use crate::dataspace::Dataspace;
use crate::error::{Category, Error, Result};
use crate::errstack::CallbackGuard;
use crate::plist::{DatasetAccessProps, DatasetCreateProps, FileAccessProps, FileCreateProps};

fn slot<'a, T: ?Sized>(table: Option<&'a T>, category: Category, name: &str) -> Result<&'a T> {
    table.ok_or_else(|| no_such_method(category, name))
}

/// Run `f` against `conn`, setting up the wrap context when this is the
/// outermost connector call of the operation.
fn with_wrap<R>(
    cx: &mut CallCtx,
    conn: &ConnectorRef,
    obj: Option<&VolObject>,
    op: &'static str,
    f: impl FnOnce(&mut CallCtx) -> Result<R>,
) -> Result<R> {
    trace!(connector = conn.name(), op, "dispatch");
    let outermost = cx.wrap.is_none();
    if outermost {
        if let (Some(wrap), Some(obj)) = (conn.wrap(), obj) {
            let ctx = {
                let _guard = CallbackGuard::new();
                wrap.get_wrap_ctx(obj)?
            };
            cx.wrap = Some(WrapState {
                connector: conn.clone(),
                ctx,
            });
        }
    }
    let result = {
        let _guard = CallbackGuard::new();
        f(cx)
    };
    if outermost {
        if let Some(state) = cx.wrap.take() {
            if let Some(wrap) = state.connector.wrap() {
                let _guard = CallbackGuard::new();
                if let Err(e) = wrap.free_wrap_ctx(state.ctx) {
                    warn!(connector = state.connector.name(), error = %e, "failed to free wrap context");
                }
            }
        }
    }
    result
}

fn same_connector(a: &IdObject, b: &IdObject, category: Category) -> Result<()> {
    if a.connector.value() != b.connector.value() {
        return Err(Error::args(
            category,
            format!(
                "objects belong to different connectors ({} and {})",
                a.connector.name(),
                b.connector.name()
            ),
        ));
    }
    Ok(())
}

// ---- Wrapping ----

/// Unwrap through every pass-through layer down to the terminal connector.
pub fn terminal(obj: &IdObject) -> IdObject {
    let mut cur = obj.clone();
    while let Some(inner) = cur.connector.wrap().and_then(|w| w.get_object(&cur.data)) {
        cur = inner;
    }
    cur
}

/// Wrap an object created below the outermost connector so it can be handed
/// to the caller. Without a wrap context the object is returned unchanged.
pub fn wrap_object(cx: &CallCtx, kind: ObjectKind, obj: VolObject) -> Result<VolObject> {
    match &cx.wrap {
        Some(state) => {
            let wrap = slot(state.connector.wrap(), Category::Connector, "wrap")?;
            let _guard = CallbackGuard::new();
            wrap.wrap_object(obj, kind, &state.ctx)
        }
        None => Ok(obj),
    }
}

/// Wrap `obj`, which came from the terminal connector below `like`, in the
/// same layers as `like`. Used for objects the library creates outside a
/// dispatched call.
pub fn wrap_as(like: &IdObject, kind: ObjectKind, obj: VolObject) -> Result<VolObject> {
    let Some(wrap) = like.connector.wrap() else {
        return Ok(obj);
    };
    let _guard = CallbackGuard::new();
    let ctx = wrap.get_wrap_ctx(&like.data)?;
    let wrapped = wrap.wrap_object(obj, kind, &ctx);
    if let Err(e) = wrap.free_wrap_ctx(ctx) {
        warn!(connector = like.connector.name(), error = %e, "failed to free wrap context");
    }
    wrapped
}

/// Peel one wrapper off `obj` through its connector.
pub fn unwrap_object(obj: &IdObject) -> Result<VolObject> {
    let wrap = slot(obj.connector.wrap(), Category::Connector, "wrap")?;
    let _guard = CallbackGuard::new();
    wrap.unwrap_object(&obj.data)
}

// ---- File ----

pub fn file_create(
    cx: &mut CallCtx,
    conn: &ConnectorRef,
    name: &str,
    flags: AccessFlags,
    fcpl: &FileCreateProps,
    fapl: &FileAccessProps,
) -> Result<VolObject> {
    with_wrap(cx, conn, None, "file create", |cx| {
        slot(conn.file(), Category::File, "file")?.create(cx, name, flags, fcpl, fapl)
    })
}

pub fn file_open(
    cx: &mut CallCtx,
    conn: &ConnectorRef,
    name: &str,
    flags: AccessFlags,
    fapl: &FileAccessProps,
) -> Result<VolObject> {
    with_wrap(cx, conn, None, "file open", |cx| {
        slot(conn.file(), Category::File, "file")?.open(cx, name, flags, fapl)
    })
}

pub fn file_get(cx: &mut CallCtx, file: &IdObject, what: FileGet) -> Result<FileGetOut> {
    with_wrap(cx, &file.connector, Some(&file.data), "file get", |cx| {
        slot(file.connector.file(), Category::File, "file")?.get(cx, &file.data, what)
    })
}

pub fn file_specific(
    cx: &mut CallCtx,
    conn: &ConnectorRef,
    obj: Option<&VolObject>,
    op: FileSpecific<'_>,
) -> Result<FileSpecificOut> {
    with_wrap(cx, conn, obj, "file specific", |cx| {
        slot(conn.file(), Category::File, "file")?.specific(cx, obj, op)
    })
}

pub fn file_optional(cx: &mut CallCtx, file: &IdObject, args: &mut OptionalArgs) -> Result<()> {
    with_wrap(cx, &file.connector, Some(&file.data), "file optional", |cx| {
        slot(file.connector.file(), Category::File, "file")?.optional(cx, &file.data, args)
    })
}

pub fn file_close(cx: &mut CallCtx, file: &IdObject) -> Result<()> {
    with_wrap(cx, &file.connector, Some(&file.data), "file close", |cx| {
        slot(file.connector.file(), Category::File, "file")?.close(cx, &file.data)
    })
}

// ---- Group ----

pub fn group_create(cx: &mut CallCtx, loc: &IdObject, name: &str) -> Result<VolObject> {
    with_wrap(cx, &loc.connector, Some(&loc.data), "group create", |cx| {
        slot(loc.connector.group(), Category::Group, "group")?.create(cx, &loc.data, name)
    })
}

pub fn group_open(cx: &mut CallCtx, loc: &IdObject, name: &str) -> Result<VolObject> {
    with_wrap(cx, &loc.connector, Some(&loc.data), "group open", |cx| {
        slot(loc.connector.group(), Category::Group, "group")?.open(cx, &loc.data, name)
    })
}

pub fn group_get(cx: &mut CallCtx, grp: &IdObject, what: GroupGet) -> Result<u64> {
    with_wrap(cx, &grp.connector, Some(&grp.data), "group get", |cx| {
        slot(grp.connector.group(), Category::Group, "group")?.get(cx, &grp.data, what)
    })
}

pub fn group_specific(cx: &mut CallCtx, grp: &IdObject, op: GroupSpecific<'_>) -> Result<()> {
    with_wrap(cx, &grp.connector, Some(&grp.data), "group specific", |cx| {
        slot(grp.connector.group(), Category::Group, "group")?.specific(cx, &grp.data, op)
    })
}

/// Mount `child` at `name` below `loc`; both must use the same connector.
pub fn group_mount(cx: &mut CallCtx, loc: &IdObject, name: &str, child: &IdObject) -> Result<()> {
    same_connector(loc, child, Category::File)?;
    group_specific(
        cx,
        loc,
        GroupSpecific::Mount {
            name,
            child: &child.data,
        },
    )
}

pub fn group_optional(cx: &mut CallCtx, grp: &IdObject, args: &mut OptionalArgs) -> Result<()> {
    with_wrap(cx, &grp.connector, Some(&grp.data), "group optional", |cx| {
        slot(grp.connector.group(), Category::Group, "group")?.optional(cx, &grp.data, args)
    })
}

pub fn group_close(cx: &mut CallCtx, grp: &IdObject) -> Result<()> {
    with_wrap(cx, &grp.connector, Some(&grp.data), "group close", |cx| {
        slot(grp.connector.group(), Category::Group, "group")?.close(cx, &grp.data)
    })
}

// ---- Dataset ----

pub fn dataset_create(
    cx: &mut CallCtx,
    loc: &IdObject,
    name: &str,
    dtype: &Datatype,
    space: &Dataspace,
    dcpl: &DatasetCreateProps,
) -> Result<VolObject> {
    with_wrap(cx, &loc.connector, Some(&loc.data), "dataset create", |cx| {
        slot(loc.connector.dataset(), Category::Dataset, "dataset")?
            .create(cx, &loc.data, name, dtype, space, dcpl)
    })
}

pub fn dataset_open(
    cx: &mut CallCtx,
    loc: &IdObject,
    name: &str,
    dapl: &DatasetAccessProps,
) -> Result<VolObject> {
    with_wrap(cx, &loc.connector, Some(&loc.data), "dataset open", |cx| {
        slot(loc.connector.dataset(), Category::Dataset, "dataset")?.open(cx, &loc.data, name, dapl)
    })
}

fn vector_args(dsets: &[IdObject], mem_types: usize, bufs: usize) -> Result<Vec<VolObject>> {
    let first = dsets
        .first()
        .ok_or_else(|| Error::args(Category::Dataset, "no datasets given"))?;
    if mem_types != dsets.len() || bufs != dsets.len() {
        return Err(Error::args(
            Category::Dataset,
            "datasets, memory types and buffers differ in count",
        ));
    }
    for d in &dsets[1..] {
        same_connector(first, d, Category::Dataset)?;
    }
    Ok(dsets.iter().map(|d| d.data.clone()).collect())
}

pub fn dataset_read(
    cx: &mut CallCtx,
    dsets: &[IdObject],
    mem_types: &[Datatype],
    bufs: &mut [&mut [u8]],
) -> Result<()> {
    let objs = vector_args(dsets, mem_types.len(), bufs.len())?;
    let first = &dsets[0];
    with_wrap(cx, &first.connector, Some(&first.data), "dataset read", |cx| {
        slot(first.connector.dataset(), Category::Dataset, "dataset")?
            .read(cx, &objs, mem_types, bufs)
    })
}

pub fn dataset_write(
    cx: &mut CallCtx,
    dsets: &[IdObject],
    mem_types: &[Datatype],
    bufs: &[&[u8]],
) -> Result<()> {
    let objs = vector_args(dsets, mem_types.len(), bufs.len())?;
    let first = &dsets[0];
    with_wrap(cx, &first.connector, Some(&first.data), "dataset write", |cx| {
        slot(first.connector.dataset(), Category::Dataset, "dataset")?
            .write(cx, &objs, mem_types, bufs)
    })
}

pub fn dataset_get(cx: &mut CallCtx, dset: &IdObject, what: DatasetGet) -> Result<DatasetGetOut> {
    with_wrap(cx, &dset.connector, Some(&dset.data), "dataset get", |cx| {
        slot(dset.connector.dataset(), Category::Dataset, "dataset")?.get(cx, &dset.data, what)
    })
}

pub fn dataset_specific(
    cx: &mut CallCtx,
    dset: &IdObject,
    op: DatasetSpecific<'_>,
) -> Result<()> {
    with_wrap(cx, &dset.connector, Some(&dset.data), "dataset specific", |cx| {
        slot(dset.connector.dataset(), Category::Dataset, "dataset")?.specific(cx, &dset.data, op)
    })
}

pub fn dataset_optional(cx: &mut CallCtx, dset: &IdObject, args: &mut OptionalArgs) -> Result<()> {
    with_wrap(cx, &dset.connector, Some(&dset.data), "dataset optional", |cx| {
        slot(dset.connector.dataset(), Category::Dataset, "dataset")?.optional(cx, &dset.data, args)
    })
}

pub fn dataset_close(cx: &mut CallCtx, dset: &IdObject) -> Result<()> {
    with_wrap(cx, &dset.connector, Some(&dset.data), "dataset close", |cx| {
        slot(dset.connector.dataset(), Category::Dataset, "dataset")?.close(cx, &dset.data)
    })
}

// ---- Attribute ----

pub fn attr_create(
    cx: &mut CallCtx,
    obj: &IdObject,
    name: &str,
    dtype: &Datatype,
    space: &Dataspace,
) -> Result<VolObject> {
    with_wrap(cx, &obj.connector, Some(&obj.data), "attribute create", |cx| {
        slot(obj.connector.attr(), Category::Attribute, "attribute")?
            .create(cx, &obj.data, name, dtype, space)
    })
}

pub fn attr_open(cx: &mut CallCtx, obj: &IdObject, name: &str) -> Result<VolObject> {
    with_wrap(cx, &obj.connector, Some(&obj.data), "attribute open", |cx| {
        slot(obj.connector.attr(), Category::Attribute, "attribute")?.open(cx, &obj.data, name)
    })
}

pub fn attr_read(
    cx: &mut CallCtx,
    attr: &IdObject,
    mem_type: &Datatype,
    buf: &mut [u8],
) -> Result<()> {
    with_wrap(cx, &attr.connector, Some(&attr.data), "attribute read", |cx| {
        slot(attr.connector.attr(), Category::Attribute, "attribute")?
            .read(cx, &attr.data, mem_type, buf)
    })
}

pub fn attr_write(cx: &mut CallCtx, attr: &IdObject, mem_type: &Datatype, buf: &[u8]) -> Result<()> {
    with_wrap(cx, &attr.connector, Some(&attr.data), "attribute write", |cx| {
        slot(attr.connector.attr(), Category::Attribute, "attribute")?
            .write(cx, &attr.data, mem_type, buf)
    })
}

pub fn attr_get(cx: &mut CallCtx, attr: &IdObject, what: AttrGet) -> Result<AttrGetOut> {
    with_wrap(cx, &attr.connector, Some(&attr.data), "attribute get", |cx| {
        slot(attr.connector.attr(), Category::Attribute, "attribute")?.get(cx, &attr.data, what)
    })
}

pub fn attr_specific(
    cx: &mut CallCtx,
    obj: &IdObject,
    op: AttrSpecific<'_>,
) -> Result<AttrSpecificOut> {
    with_wrap(cx, &obj.connector, Some(&obj.data), "attribute specific", |cx| {
        slot(obj.connector.attr(), Category::Attribute, "attribute")?.specific(cx, &obj.data, op)
    })
}

pub fn attr_optional(cx: &mut CallCtx, obj: &IdObject, args: &mut OptionalArgs) -> Result<()> {
    with_wrap(cx, &obj.connector, Some(&obj.data), "attribute optional", |cx| {
        slot(obj.connector.attr(), Category::Attribute, "attribute")?.optional(cx, &obj.data, args)
    })
}

pub fn attr_close(cx: &mut CallCtx, attr: &IdObject) -> Result<()> {
    with_wrap(cx, &attr.connector, Some(&attr.data), "attribute close", |cx| {
        slot(attr.connector.attr(), Category::Attribute, "attribute")?.close(cx, &attr.data)
    })
}

// ---- Committed datatype ----

pub fn datatype_commit(
    cx: &mut CallCtx,
    loc: &IdObject,
    name: &str,
    dtype: &Datatype,
) -> Result<VolObject> {
    with_wrap(cx, &loc.connector, Some(&loc.data), "datatype commit", |cx| {
        slot(loc.connector.datatype(), Category::Datatype, "datatype")?
            .commit(cx, &loc.data, name, dtype)
    })
}

pub fn datatype_open(cx: &mut CallCtx, loc: &IdObject, name: &str) -> Result<VolObject> {
    with_wrap(cx, &loc.connector, Some(&loc.data), "datatype open", |cx| {
        slot(loc.connector.datatype(), Category::Datatype, "datatype")?.open(cx, &loc.data, name)
    })
}

pub fn datatype_get(cx: &mut CallCtx, dt: &IdObject) -> Result<Datatype> {
    with_wrap(cx, &dt.connector, Some(&dt.data), "datatype get", |cx| {
        slot(dt.connector.datatype(), Category::Datatype, "datatype")?.get(cx, &dt.data)
    })
}

pub fn datatype_specific(cx: &mut CallCtx, dt: &IdObject, op: DatatypeSpecific) -> Result<()> {
    with_wrap(cx, &dt.connector, Some(&dt.data), "datatype specific", |cx| {
        slot(dt.connector.datatype(), Category::Datatype, "datatype")?.specific(cx, &dt.data, op)
    })
}

pub fn datatype_optional(cx: &mut CallCtx, dt: &IdObject, args: &mut OptionalArgs) -> Result<()> {
    with_wrap(cx, &dt.connector, Some(&dt.data), "datatype optional", |cx| {
        slot(dt.connector.datatype(), Category::Datatype, "datatype")?.optional(cx, &dt.data, args)
    })
}

pub fn datatype_close(cx: &mut CallCtx, dt: &IdObject) -> Result<()> {
    with_wrap(cx, &dt.connector, Some(&dt.data), "datatype close", |cx| {
        slot(dt.connector.datatype(), Category::Datatype, "datatype")?.close(cx, &dt.data)
    })
}

// ---- Link ----

pub fn link_create(
    cx: &mut CallCtx,
    loc: &IdObject,
    name: &str,
    target: LinkTarget<'_>,
) -> Result<()> {
    with_wrap(cx, &loc.connector, Some(&loc.data), "link create", |cx| {
        slot(loc.connector.link(), Category::Link, "link")?.create(cx, &loc.data, name, target)
    })
}

/// Hard link at `loc/name` to the object at `target/path`.
pub fn link_create_hard(
    cx: &mut CallCtx,
    target: &IdObject,
    path: &str,
    loc: &IdObject,
    name: &str,
) -> Result<()> {
    same_connector(target, loc, Category::Link)?;
    link_create(
        cx,
        loc,
        name,
        LinkTarget::Hard {
            loc: &target.data,
            path,
        },
    )
}

pub fn link_copy(
    cx: &mut CallCtx,
    src: &IdObject,
    src_name: &str,
    dst: &IdObject,
    dst_name: &str,
) -> Result<()> {
    same_connector(src, dst, Category::Link)?;
    with_wrap(cx, &src.connector, Some(&src.data), "link copy", |cx| {
        slot(src.connector.link(), Category::Link, "link")?
            .copy(cx, &src.data, src_name, &dst.data, dst_name)
    })
}

pub fn link_move(
    cx: &mut CallCtx,
    src: &IdObject,
    src_name: &str,
    dst: &IdObject,
    dst_name: &str,
) -> Result<()> {
    same_connector(src, dst, Category::Link)?;
    with_wrap(cx, &src.connector, Some(&src.data), "link move", |cx| {
        slot(src.connector.link(), Category::Link, "link")?
            .move_link(cx, &src.data, src_name, &dst.data, dst_name)
    })
}

pub fn link_get(cx: &mut CallCtx, loc: &IdObject, name: &str) -> Result<LinkInfo> {
    with_wrap(cx, &loc.connector, Some(&loc.data), "link get", |cx| {
        slot(loc.connector.link(), Category::Link, "link")?.get(cx, &loc.data, name)
    })
}

pub fn link_specific(
    cx: &mut CallCtx,
    loc: &IdObject,
    op: LinkSpecific<'_>,
) -> Result<LinkSpecificOut> {
    with_wrap(cx, &loc.connector, Some(&loc.data), "link specific", |cx| {
        slot(loc.connector.link(), Category::Link, "link")?.specific(cx, &loc.data, op)
    })
}

pub fn link_optional(cx: &mut CallCtx, loc: &IdObject, args: &mut OptionalArgs) -> Result<()> {
    with_wrap(cx, &loc.connector, Some(&loc.data), "link optional", |cx| {
        slot(loc.connector.link(), Category::Link, "link")?.optional(cx, &loc.data, args)
    })
}

// ---- Object ----

pub fn object_open(
    cx: &mut CallCtx,
    loc: &IdObject,
    at: ObjectLocator<'_>,
) -> Result<(VolObject, ObjectKind)> {
    with_wrap(cx, &loc.connector, Some(&loc.data), "object open", |cx| {
        slot(loc.connector.object(), Category::Object, "object")?.open(cx, &loc.data, at)
    })
}

pub fn object_copy(
    cx: &mut CallCtx,
    src: &IdObject,
    src_name: &str,
    dst: &IdObject,
    dst_name: &str,
) -> Result<()> {
    same_connector(src, dst, Category::Object)?;
    with_wrap(cx, &src.connector, Some(&src.data), "object copy", |cx| {
        slot(src.connector.object(), Category::Object, "object")?
            .copy(cx, &src.data, src_name, &dst.data, dst_name)
    })
}

pub fn object_get(cx: &mut CallCtx, loc: &IdObject, what: ObjectGet<'_>) -> Result<ObjectGetOut> {
    with_wrap(cx, &loc.connector, Some(&loc.data), "object get", |cx| {
        slot(loc.connector.object(), Category::Object, "object")?.get(cx, &loc.data, what)
    })
}

pub fn object_specific(
    cx: &mut CallCtx,
    loc: &IdObject,
    op: ObjectSpecific<'_>,
) -> Result<ObjectSpecificOut> {
    with_wrap(cx, &loc.connector, Some(&loc.data), "object specific", |cx| {
        slot(loc.connector.object(), Category::Object, "object")?.specific(cx, &loc.data, op)
    })
}

pub fn object_optional(cx: &mut CallCtx, loc: &IdObject, args: &mut OptionalArgs) -> Result<()> {
    with_wrap(cx, &loc.connector, Some(&loc.data), "object optional", |cx| {
        slot(loc.connector.object(), Category::Object, "object")?.optional(cx, &loc.data, args)
    })
}

// ---- Request ----

pub fn request_wait(cx: &mut CallCtx, req: &IdObject, timeout: Duration) -> Result<RequestStatus> {
    with_wrap(cx, &req.connector, Some(&req.data), "request wait", |cx| {
        slot(req.connector.request(), Category::Request, "request")?.wait(cx, &req.data, timeout)
    })
}

pub fn request_notify(cx: &mut CallCtx, req: &IdObject, cb: RequestNotify) -> Result<()> {
    with_wrap(cx, &req.connector, Some(&req.data), "request notify", |cx| {
        slot(req.connector.request(), Category::Request, "request")?.notify(cx, &req.data, cb)
    })
}

pub fn request_cancel(cx: &mut CallCtx, req: &IdObject) -> Result<RequestStatus> {
    with_wrap(cx, &req.connector, Some(&req.data), "request cancel", |cx| {
        slot(req.connector.request(), Category::Request, "request")?.cancel(cx, &req.data)
    })
}

pub fn request_optional(cx: &mut CallCtx, req: &IdObject, args: &mut OptionalArgs) -> Result<()> {
    with_wrap(cx, &req.connector, Some(&req.data), "request optional", |cx| {
        slot(req.connector.request(), Category::Request, "request")?.optional(cx, &req.data, args)
    })
}

pub fn request_free(cx: &mut CallCtx, req: &IdObject) -> Result<()> {
    with_wrap(cx, &req.connector, Some(&req.data), "request free", |cx| {
        slot(req.connector.request(), Category::Request, "request")?.free(cx, &req.data)
    })
}

// ---- Blob ----

pub fn blob_put(cx: &mut CallCtx, file: &IdObject, data: &[u8]) -> Result<BlobId> {
    with_wrap(cx, &file.connector, Some(&file.data), "blob put", |cx| {
        slot(file.connector.blob(), Category::Blob, "blob")?.put(cx, &file.data, data)
    })
}

pub fn blob_get(cx: &mut CallCtx, file: &IdObject, id: &BlobId) -> Result<Vec<u8>> {
    with_wrap(cx, &file.connector, Some(&file.data), "blob get", |cx| {
        slot(file.connector.blob(), Category::Blob, "blob")?.get(cx, &file.data, id)
    })
}

pub fn blob_specific(
    cx: &mut CallCtx,
    file: &IdObject,
    op: BlobSpecific<'_>,
) -> Result<BlobSpecificOut> {
    with_wrap(cx, &file.connector, Some(&file.data), "blob specific", |cx| {
        slot(file.connector.blob(), Category::Blob, "blob")?.specific(cx, &file.data, op)
    })
}

pub fn blob_optional(cx: &mut CallCtx, file: &IdObject, args: &mut OptionalArgs) -> Result<()> {
    with_wrap(cx, &file.connector, Some(&file.data), "blob optional", |cx| {
        slot(file.connector.blob(), Category::Blob, "blob")?.optional(cx, &file.data, args)
    })
}

// ---- Token ----

pub fn token_cmp(
    cx: &mut CallCtx,
    obj: &IdObject,
    a: &ObjectToken,
    b: &ObjectToken,
) -> Result<Ordering> {
    with_wrap(cx, &obj.connector, Some(&obj.data), "token compare", |cx| {
        slot(obj.connector.token(), Category::Token, "token")?.compare(cx, &obj.data, a, b)
    })
}

pub fn token_to_string(cx: &mut CallCtx, obj: &IdObject, token: &ObjectToken) -> Result<String> {
    with_wrap(cx, &obj.connector, Some(&obj.data), "token to-string", |cx| {
        slot(obj.connector.token(), Category::Token, "token")?.to_string(cx, &obj.data, token)
    })
}

pub fn token_from_string(cx: &mut CallCtx, obj: &IdObject, s: &str) -> Result<ObjectToken> {
    with_wrap(cx, &obj.connector, Some(&obj.data), "token from-string", |cx| {
        slot(obj.connector.token(), Category::Token, "token")?.from_string(cx, &obj.data, s)
    })
}

// ---- Introspection ----

pub fn get_conn_cls(cx: &mut CallCtx, obj: &IdObject, level: ConnectorLevel) -> Result<ConnectorRef> {
    let found = with_wrap(cx, &obj.connector, Some(&obj.data), "get connector class", |cx| {
        slot(obj.connector.introspect(), Category::Connector, "introspect")?
            .get_conn_cls(cx, &obj.data, level)
    })?;
    Ok(found.unwrap_or_else(|| obj.connector.clone()))
}

pub fn get_cap_flags(conn: &ConnectorRef) -> Result<CapFlags> {
    let class = slot(conn.introspect(), Category::Connector, "introspect")?;
    let _guard = CallbackGuard::new();
    Ok(class.get_cap_flags())
}

pub fn opt_query(cx: &mut CallCtx, obj: &IdObject, subclass: Subclass, opcode: u32) -> Result<bool> {
    with_wrap(cx, &obj.connector, Some(&obj.data), "optional query", |cx| {
        slot(obj.connector.introspect(), Category::Connector, "introspect")?
            .opt_query(cx, &obj.data, subclass, opcode)
    })
}

// ---- Catch-all ----

pub fn optional(cx: &mut CallCtx, obj: &IdObject, args: &mut OptionalArgs) -> Result<()> {
    with_wrap(cx, &obj.connector, Some(&obj.data), "optional", |cx| {
        obj.connector.optional(cx, &obj.data, args)
    })
}

/// Close an object of any kind.
pub fn close(cx: &mut CallCtx, kind: ObjectKind, obj: &IdObject) -> Result<()> {
    match kind {
        ObjectKind::File => file_close(cx, obj),
        ObjectKind::Group => group_close(cx, obj),
        ObjectKind::Dataset => dataset_close(cx, obj),
        ObjectKind::Datatype => datatype_close(cx, obj),
        ObjectKind::Attr => attr_close(cx, obj),
    }
}

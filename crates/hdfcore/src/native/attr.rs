use hdfcore_format::Datatype;
use tracing::debug;

use super::header::{self, Attribute, Message, ObjectHeader};
use super::{location, native, release, AttrHandle, NativeConnector, NativeObject};
use crate::dataspace::Dataspace;
use crate::error::{Category, Error, ErrorKind, Result};
use crate::file::{self as fl, ObjectLoc};
use crate::vol::{
    AttrClass, AttrGet, AttrGetOut, AttrSpecific, AttrSpecificOut, CallCtx, VolObject,
};

fn handle(obj: &VolObject) -> Result<(ObjectLoc, String)> {
    match &*native(obj, Category::Attribute)? {
        NativeObject::Attr(a) => Ok((a.parent.clone(), a.name.clone())),
        _ => Err(Error::args(Category::Attribute, "not an attribute")),
    }
}

fn not_found(name: &str) -> Error {
    Error::not_found(Category::Attribute, format!("attribute '{name}' doesn't exist"))
}

fn find<'h>(hdr: &'h ObjectHeader, name: &str) -> Result<&'h Attribute> {
    hdr.find_attr(name).ok_or_else(|| not_found(name))
}

fn check_buffer(attr: &Attribute, mem_type: &Datatype, len: usize) -> Result<()> {
    if !mem_type.equivalent(&attr.dtype) {
        return Err(Error::new(
            Category::Attribute,
            ErrorKind::NotSupported,
            "memory type differs from the stored type; conversion is not supported",
        ));
    }
    if len != attr.data.len() {
        return Err(Error::args(
            Category::Attribute,
            format!("buffer holds {len} bytes, attribute holds {}", attr.data.len()),
        ));
    }
    Ok(())
}

fn open_handle(parent: ObjectLoc, name: &str) -> Result<VolObject> {
    fl::object_opened(&parent.top, parent.addr)?;
    Ok(VolObject::new(NativeObject::Attr(AttrHandle {
        parent,
        name: name.to_string(),
    })))
}

impl AttrClass for NativeConnector {
    fn create(
        &self,
        _cx: &mut CallCtx,
        obj: &VolObject,
        name: &str,
        dtype: &Datatype,
        space: &Dataspace,
    ) -> Result<VolObject> {
        let parent = location(obj, Category::Attribute)?;
        let len = space
            .npoints()?
            .checked_mul(dtype.size as u64)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Error::new(Category::Attribute, ErrorKind::Overflow, "attribute too large"))?;
        parent.top.with_shared(|s| {
            s.require_writable()?;
            dtype.validate(s.fapl.relaxed_integrity)?;
            let mut hdr = header::load(s, parent.addr)?;
            if hdr.find_attr(name).is_some() {
                return Err(Error::new(
                    Category::Attribute,
                    ErrorKind::AlreadyExists,
                    format!("attribute '{name}' already exists"),
                ));
            }
            hdr.messages.push(Message::Attribute(Attribute {
                name: name.to_string(),
                dtype: dtype.clone(),
                space: space.clone(),
                data: vec![0u8; len],
            }));
            header::store(s, parent.addr, &mut hdr)
        })?;
        debug!(name, object = parent.addr, "attribute created");
        open_handle(parent, name)
    }

    fn open(&self, _cx: &mut CallCtx, obj: &VolObject, name: &str) -> Result<VolObject> {
        let parent = location(obj, Category::Attribute)?;
        parent.top.with_shared(|s| {
            let hdr = header::load(s, parent.addr)?;
            find(&hdr, name).map(|_| ())
        })?;
        open_handle(parent, name)
    }

    fn read(
        &self,
        _cx: &mut CallCtx,
        attr: &VolObject,
        mem_type: &Datatype,
        buf: &mut [u8],
    ) -> Result<()> {
        let (parent, name) = handle(attr)?;
        parent.top.with_shared(|s| {
            let hdr = header::load(s, parent.addr)?;
            let a = find(&hdr, &name)?;
            check_buffer(a, mem_type, buf.len())?;
            buf.copy_from_slice(&a.data);
            Ok(())
        })
    }

    fn write(
        &self,
        _cx: &mut CallCtx,
        attr: &VolObject,
        mem_type: &Datatype,
        buf: &[u8],
    ) -> Result<()> {
        let (parent, name) = handle(attr)?;
        parent.top.with_shared(|s| {
            s.require_writable()?;
            let mut hdr = header::load(s, parent.addr)?;
            let a = hdr.find_attr_mut(&name).ok_or_else(|| not_found(&name))?;
            check_buffer(a, mem_type, buf.len())?;
            a.data.copy_from_slice(buf);
            header::store(s, parent.addr, &mut hdr)
        })
    }

    fn get(&self, _cx: &mut CallCtx, attr: &VolObject, what: AttrGet) -> Result<AttrGetOut> {
        let (parent, name) = handle(attr)?;
        if what == AttrGet::Name {
            return Ok(AttrGetOut::Name(name));
        }
        let a = parent.top.with_shared(|s| {
            let hdr = header::load(s, parent.addr)?;
            find(&hdr, &name).cloned()
        })?;
        Ok(match what {
            AttrGet::Space => AttrGetOut::Space(a.space),
            AttrGet::Type => AttrGetOut::Type(a.dtype),
            AttrGet::Name => AttrGetOut::Name(a.name),
        })
    }

    fn specific(
        &self,
        _cx: &mut CallCtx,
        obj: &VolObject,
        op: AttrSpecific<'_>,
    ) -> Result<AttrSpecificOut> {
        let loc = location(obj, Category::Attribute)?;
        loc.top.with_shared(|s| match op {
            AttrSpecific::Delete(name) => {
                s.require_writable()?;
                let mut hdr = header::load(s, loc.addr)?;
                hdr.remove_attr(name).ok_or_else(|| not_found(name))?;
                header::store(s, loc.addr, &mut hdr)?;
                debug!(name, object = loc.addr, "attribute deleted");
                Ok(AttrSpecificOut::Done)
            }
            AttrSpecific::Exists(name) => {
                let hdr = header::load(s, loc.addr)?;
                Ok(AttrSpecificOut::Bool(hdr.find_attr(name).is_some()))
            }
            AttrSpecific::Rename { from, to } => {
                s.require_writable()?;
                let mut hdr = header::load(s, loc.addr)?;
                if hdr.find_attr(to).is_some() {
                    return Err(Error::new(
                        Category::Attribute,
                        ErrorKind::AlreadyExists,
                        format!("attribute '{to}' already exists"),
                    ));
                }
                hdr.find_attr_mut(from)
                    .ok_or_else(|| not_found(from))?
                    .name = to.to_string();
                header::store(s, loc.addr, &mut hdr)?;
                Ok(AttrSpecificOut::Done)
            }
            AttrSpecific::Names => {
                let hdr = header::load(s, loc.addr)?;
                Ok(AttrSpecificOut::Names(
                    hdr.attributes().map(|a| a.name.clone()).collect(),
                ))
            }
        })
    }

    fn close(&self, cx: &mut CallCtx, attr: &VolObject) -> Result<()> {
        let (parent, _) = handle(attr)?;
        release(cx, &parent)
    }
}

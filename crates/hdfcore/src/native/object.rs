//! Generic object access: open by name or token, deep copy, and queries
//! that work on any object kind.

use std::collections::HashMap;
use std::sync::Arc;

use hdfcore_format::UNDEFINED_ADDR;
use tracing::debug;

use super::header::{self, HeaderKind, Layout, Link, LinkValue, Message};
use super::token::{addr_of, token_for};
use super::{
    flush_object, kind_at, location, native, opened, path, refresh_object, NativeConnector,
    NativeObject,
};
use crate::error::{Category, Error, ErrorKind, Result};
use crate::file::alloc::AllocKind;
use crate::file::{FileTop, ObjectLoc};
use crate::plist::LinkAccessProps;
use crate::vol::{
    CallCtx, ObjectClass, ObjectGet, ObjectGetOut, ObjectKind, ObjectLocator, ObjectSpecific,
    ObjectSpecificOut, VolObject,
};

fn object_kind(kind: HeaderKind) -> ObjectKind {
    match kind {
        HeaderKind::Group => ObjectKind::Group,
        HeaderKind::Dataset => ObjectKind::Dataset,
        HeaderKind::Datatype => ObjectKind::Datatype,
    }
}

fn open_at(loc: ObjectLoc) -> Result<(VolObject, ObjectKind)> {
    let kind = kind_at(&loc)?;
    let make = match kind {
        HeaderKind::Group => NativeObject::Group,
        HeaderKind::Dataset => NativeObject::Dataset,
        HeaderKind::Datatype => NativeObject::Datatype,
    };
    Ok((opened(loc, make)?, object_kind(kind)))
}

/// Copies objects into one destination file, remembering what was already
/// copied so shared targets and cycles are copied once.
struct Copier {
    dst: Arc<FileTop>,
    done: HashMap<u64, u64>,
}

impl Copier {
    fn copy(&mut self, src: &ObjectLoc) -> Result<u64> {
        if let Some(&addr) = self.done.get(&src.addr) {
            self.dst.with_shared(|s| header::link(s, addr))?;
            return Ok(addr);
        }
        let (hdr, raw) = src.top.with_shared(|s| {
            let hdr = header::load(s, src.addr)?;
            let raw = match hdr.layout() {
                Some(l) if l.size > 0 => {
                    let mut buf = vec![0u8; l.size as usize];
                    s.raw_read(l.addr, &mut buf)?;
                    Some(buf)
                }
                _ => None,
            };
            Ok((hdr, raw))
        })?;

        let mut links = Vec::new();
        let mut messages = Vec::new();
        for msg in hdr.messages {
            match msg {
                Message::Link(l) => links.push(l),
                Message::Layout(_) => {}
                other => messages.push(other),
            }
        }
        let addr = self.dst.with_shared(|s| {
            if let Some(data) = &raw {
                let size = data.len() as u64;
                let at = s.allocate(AllocKind::Raw, size)?;
                s.raw_write(at, data)?;
                messages.push(Message::Layout(Layout { addr: at, size }));
            } else if hdr.kind == HeaderKind::Dataset {
                messages.push(Message::Layout(Layout {
                    addr: UNDEFINED_ADDR,
                    size: 0,
                }));
            }
            header::create(s, hdr.kind, messages)
        })?;
        self.done.insert(src.addr, addr);

        let mut copied = Vec::with_capacity(links.len());
        for link in links {
            let value = match link.value {
                LinkValue::Hard(child) => LinkValue::Hard(self.copy(&ObjectLoc {
                    top: src.top.clone(),
                    addr: child,
                })?),
                other => other,
            };
            copied.push(Link {
                name: link.name,
                value,
            });
        }
        if !copied.is_empty() {
            self.dst.with_shared(|s| {
                let mut hdr = header::load(s, addr)?;
                for link in copied {
                    hdr.add_link(link)?;
                }
                header::store(s, addr, &mut hdr)
            })?;
        }
        Ok(addr)
    }
}

impl ObjectClass for NativeConnector {
    fn open(
        &self,
        cx: &mut CallCtx,
        loc: &VolObject,
        at: ObjectLocator<'_>,
    ) -> Result<(VolObject, ObjectKind)> {
        let start = location(loc, Category::Object)?;
        match at {
            ObjectLocator::ByName(name) => {
                path::with_target(cx, &start, name, &LinkAccessProps::default(), |t| {
                    open_at(t.clone())
                })
            }
            ObjectLocator::ByToken(token) => open_at(ObjectLoc {
                top: start.top,
                addr: addr_of(&token),
            }),
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
        let lapl = LinkAccessProps::default();
        let src_start = location(src, Category::Object)?;
        let dst_start = location(dst, Category::Object)?;
        let source = path::with_target(cx, &src_start, src_name, &lapl, |t| Ok(t.clone()))?;
        path::with_parent(cx, &dst_start, dst_name, &lapl, |parent, last| {
            let exists = parent
                .top
                .with_shared(|s| Ok(header::load(s, parent.addr)?.find_link(last).is_some()))?;
            if exists {
                return Err(Error::new(
                    Category::Object,
                    ErrorKind::AlreadyExists,
                    format!("name '{last}' already exists"),
                ));
            }
            let mut copier = Copier {
                dst: parent.top.clone(),
                done: HashMap::new(),
            };
            let addr = copier.copy(&source)?;
            parent.top.with_shared(|s| {
                let mut hdr = header::load(s, parent.addr)?;
                hdr.add_link(Link {
                    name: last.to_string(),
                    value: LinkValue::Hard(addr),
                })?;
                header::store(s, parent.addr, &mut hdr)
            })?;
            debug!(from = src_name, to = dst_name, objects = copier.done.len(), "object copied");
            Ok(())
        })
    }

    fn get(&self, cx: &mut CallCtx, loc: &VolObject, what: ObjectGet<'_>) -> Result<ObjectGetOut> {
        let lapl = LinkAccessProps::default();
        match what {
            ObjectGet::Token(name) => {
                let start = location(loc, Category::Object)?;
                let addr = path::with_target(cx, &start, name, &lapl, |t| Ok(t.addr))?;
                Ok(ObjectGetOut::Token(token_for(addr)))
            }
            ObjectGet::Kind(name) => {
                let start = location(loc, Category::Object)?;
                let kind = path::with_target(cx, &start, name, &lapl, kind_at)?;
                Ok(ObjectGetOut::Kind(object_kind(kind)))
            }
            ObjectGet::FileName => {
                let obj = native(loc, Category::Object)?;
                Ok(ObjectGetOut::Name(obj.top().open_name.clone()))
            }
        }
    }

    fn specific(
        &self,
        cx: &mut CallCtx,
        loc: &VolObject,
        op: ObjectSpecific<'_>,
    ) -> Result<ObjectSpecificOut> {
        let start = location(loc, Category::Object)?;
        match op {
            ObjectSpecific::Exists(name) => {
                match path::with_target(cx, &start, name, &LinkAccessProps::default(), kind_at) {
                    Ok(_) => Ok(ObjectSpecificOut::Bool(true)),
                    Err(e) if e.is(ErrorKind::NotFound) => Ok(ObjectSpecificOut::Bool(false)),
                    Err(e) => Err(e),
                }
            }
            ObjectSpecific::Flush => {
                flush_object(&start)?;
                let cb = start.top.with_shared(|s| Ok(s.fapl.object_flush_cb.clone()))?;
                Ok(ObjectSpecificOut::Flushed(cb))
            }
            ObjectSpecific::Refresh => {
                refresh_object(&start)?;
                Ok(ObjectSpecificOut::Done)
            }
        }
    }
}

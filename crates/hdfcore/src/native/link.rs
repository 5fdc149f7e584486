//! Hard, soft and external links.

use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::debug;

use super::header::{self, HeaderKind, Link, LinkValue};
use super::token::token_for;
use super::{location, path, NativeConnector};
use crate::error::{Category, Error, Result};
use crate::file::ObjectLoc;
use crate::plist::LinkAccessProps;
use crate::vol::{CallCtx, LinkClass, LinkInfo, LinkKind, LinkSpecific, LinkSpecificOut, LinkTarget, VolObject};

pub(crate) fn info(link: &Link) -> LinkInfo {
    match &link.value {
        LinkValue::Hard(addr) => LinkInfo {
            kind: LinkKind::Hard,
            token: Some(token_for(*addr)),
            value: None,
        },
        LinkValue::Soft(target) => LinkInfo {
            kind: LinkKind::Soft,
            token: None,
            value: Some(target.clone()),
        },
        LinkValue::External { file, path } => LinkInfo {
            kind: LinkKind::External,
            token: None,
            value: Some(format!("{file}:{path}")),
        },
    }
}

fn same_file(a: &ObjectLoc, b: &ObjectLoc) -> Result<()> {
    if Arc::ptr_eq(&a.top.shared, &b.top.shared) {
        Ok(())
    } else {
        Err(Error::args(Category::Link, "hard links cannot cross files"))
    }
}

/// Add `value` as `name` in the group at `parent`. A hard link also counts
/// against its target when `count` is set.
fn insert(parent: &ObjectLoc, name: &str, value: LinkValue, count: bool) -> Result<()> {
    parent.top.with_shared(|s| {
        s.require_writable()?;
        let hdr = header::load(s, parent.addr)?;
        if hdr.kind != HeaderKind::Group {
            return Err(Error::args(Category::Link, "parent is not a group"));
        }
        if hdr.find_link(name).is_some() {
            return Err(Error::new(
                Category::Link,
                crate::error::ErrorKind::AlreadyExists,
                format!("name '{name}' already exists"),
            ));
        }
        if let (LinkValue::Hard(target), true) = (&value, count) {
            header::link(s, *target)?;
        }
        // Reload: the target may be the parent itself.
        let mut hdr = header::load(s, parent.addr)?;
        hdr.add_link(Link {
            name: name.to_string(),
            value,
        })?;
        header::store(s, parent.addr, &mut hdr)
    })
}

/// Remove `name` from the group at `parent`, dropping the hard link count
/// of its target when `count` is set.
fn remove(parent: &ObjectLoc, name: &str, count: bool) -> Result<Link> {
    parent.top.with_shared(|s| {
        s.require_writable()?;
        let mut hdr = header::load(s, parent.addr)?;
        let link = hdr.remove_link(name).ok_or_else(|| {
            Error::not_found(Category::Link, format!("link '{name}' doesn't exist"))
        })?;
        header::store(s, parent.addr, &mut hdr)?;
        if let (LinkValue::Hard(target), true) = (&link.value, count) {
            header::unlink(s, *target)?;
        }
        Ok(link)
    })
}

/// The link `name` resolves to, with the group holding it.
fn resolve_link(
    cx: &mut CallCtx,
    start: &ObjectLoc,
    name: &str,
    lapl: &LinkAccessProps,
) -> Result<(ObjectLoc, Link)> {
    path::with_parent(cx, start, name, lapl, |parent, last| {
        Ok((parent.clone(), path::lookup(parent, last)?))
    })
}

impl LinkClass for NativeConnector {
    fn create(
        &self,
        cx: &mut CallCtx,
        loc: &VolObject,
        name: &str,
        target: LinkTarget<'_>,
    ) -> Result<()> {
        let start = location(loc, Category::Link)?;
        let lapl = LinkAccessProps::default();
        match target {
            LinkTarget::Hard { loc: tloc, path: tpath } => {
                let tstart = location(tloc, Category::Link)?;
                let target = path::with_target(cx, &tstart, tpath, &lapl, |t| Ok(t.clone()))?;
                path::with_parent(cx, &start, name, &lapl, |parent, last| {
                    same_file(parent, &target)?;
                    insert(parent, last, LinkValue::Hard(target.addr), true)
                })?;
            }
            LinkTarget::Soft(to) => {
                path::with_parent(cx, &start, name, &lapl, |parent, last| {
                    insert(parent, last, LinkValue::Soft(to.to_string()), false)
                })?;
            }
            LinkTarget::External { file, path: to } => {
                path::with_parent(cx, &start, name, &lapl, |parent, last| {
                    let value = LinkValue::External {
                        file: file.to_string(),
                        path: to.to_string(),
                    };
                    insert(parent, last, value, false)
                })?;
            }
        }
        debug!(name, "link created");
        Ok(())
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
        let (src_parent, link) = resolve_link(cx, &location(src, Category::Link)?, src_name, &lapl)?;
        let dst_start = location(dst, Category::Link)?;
        path::with_parent(cx, &dst_start, dst_name, &lapl, |parent, last| {
            if matches!(link.value, LinkValue::Hard(_)) {
                same_file(parent, &src_parent)?;
            }
            insert(parent, last, link.value, true)
        })
    }

    fn move_link(
        &self,
        cx: &mut CallCtx,
        src: &VolObject,
        src_name: &str,
        dst: &VolObject,
        dst_name: &str,
    ) -> Result<()> {
        let lapl = LinkAccessProps::default();
        let (src_parent, link) = resolve_link(cx, &location(src, Category::Link)?, src_name, &lapl)?;
        let dst_start = location(dst, Category::Link)?;
        path::with_parent(cx, &dst_start, dst_name, &lapl, |parent, last| {
            if matches!(link.value, LinkValue::Hard(_)) {
                same_file(parent, &src_parent)?;
            }
            if parent.same_object(&src_parent) && last == link.name {
                return Ok(());
            }
            insert(parent, last, link.value.clone(), false)?;
            remove(&src_parent, &link.name, false).map(|_| ())
        })?;
        debug!(from = src_name, to = dst_name, "link moved");
        Ok(())
    }

    fn get(&self, cx: &mut CallCtx, loc: &VolObject, name: &str) -> Result<LinkInfo> {
        let start = location(loc, Category::Link)?;
        let (_, link) = resolve_link(cx, &start, name, &LinkAccessProps::default())?;
        Ok(info(&link))
    }

    fn specific(
        &self,
        cx: &mut CallCtx,
        loc: &VolObject,
        op: LinkSpecific<'_>,
    ) -> Result<LinkSpecificOut> {
        let start = location(loc, Category::Link)?;
        let lapl = LinkAccessProps::default();
        match op {
            LinkSpecific::Delete(name) => {
                path::with_parent(cx, &start, name, &lapl, |parent, last| {
                    remove(parent, last, true)
                })?;
                debug!(name, "link deleted");
                Ok(LinkSpecificOut::Done)
            }
            LinkSpecific::Exists(name) => {
                let found = path::with_parent(cx, &start, name, &lapl, |parent, last| {
                    parent
                        .top
                        .with_shared(|s| Ok(header::load(s, parent.addr)?.find_link(last).is_some()))
                })?;
                Ok(LinkSpecificOut::Bool(found))
            }
            LinkSpecific::Iterate(visit) => {
                let mut links = path::with_target(cx, &start, ".", &lapl, |g| {
                    g.top.with_shared(|s| {
                        let hdr = header::load(s, g.addr)?;
                        if hdr.kind != HeaderKind::Group {
                            return Err(Error::args(Category::Link, "not a group"));
                        }
                        Ok(hdr.links().cloned().collect::<Vec<_>>())
                    })
                })?;
                links.sort_by(|a, b| a.name.cmp(&b.name));
                for link in &links {
                    if visit(&link.name, &info(link)) == ControlFlow::Break(()) {
                        return Ok(LinkSpecificOut::Bool(true));
                    }
                }
                Ok(LinkSpecificOut::Bool(false))
            }
        }
    }
}

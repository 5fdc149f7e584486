use tracing::debug;

use super::header::{self, HeaderKind};
use super::path;
use super::{
    flush_object, insert_new, location, native, object_loc, open_named, opened, refresh_object,
    release, NativeConnector, NativeObject,
};
use super::request::complete;
use crate::error::{Category, Error, Result};
use crate::file::mount;
use crate::vol::{CallCtx, GroupClass, GroupGet, GroupSpecific, VolObject};

impl GroupClass for NativeConnector {
    fn create(&self, cx: &mut CallCtx, loc: &VolObject, name: &str) -> Result<VolObject> {
        let start = location(loc, Category::Group)?;
        let lapl = Default::default();
        let new = path::with_parent(cx, &start, name, &lapl, |parent, last| {
            insert_new(parent, last, HeaderKind::Group, Vec::new())
        })?;
        debug!(name, addr = new.addr, "group created");
        let obj = opened(new, NativeObject::Group)?;
        complete(cx);
        Ok(obj)
    }

    fn open(&self, cx: &mut CallCtx, loc: &VolObject, name: &str) -> Result<VolObject> {
        open_named(cx, loc, name, HeaderKind::Group, Category::Group, NativeObject::Group)
    }

    fn get(&self, _cx: &mut CallCtx, obj: &VolObject, what: GroupGet) -> Result<u64> {
        let loc = location(obj, Category::Group)?;
        match what {
            GroupGet::NumLinks => loc
                .top
                .with_shared(|s| Ok(header::load(s, loc.addr)?.links().count() as u64)),
        }
    }

    fn specific(&self, cx: &mut CallCtx, obj: &VolObject, op: GroupSpecific<'_>) -> Result<()> {
        let loc = location(obj, Category::Group)?;
        match op {
            GroupSpecific::Mount { name, child } => {
                let child = match &*native(child, Category::File)? {
                    NativeObject::File(top) => top.clone(),
                    _ => return Err(Error::args(Category::File, "only a file can be mounted")),
                };
                path::with_mount_point(cx, &loc, name, |mp| {
                    if super::kind_at(mp)? != HeaderKind::Group {
                        return Err(Error::args(Category::Group, "mount point is not a group"));
                    }
                    mount::mount(&mp.top, mp.addr, &child)
                })
            }
            GroupSpecific::Unmount { name } => {
                let mp = path::with_mount_point(cx, &loc, name, |mp| Ok(mp.clone()))?;
                mount::unmount(cx, &mp.top, mp.addr)
            }
            GroupSpecific::Flush => flush_object(&loc),
            GroupSpecific::Refresh => refresh_object(&loc),
        }
    }

    fn close(&self, cx: &mut CallCtx, obj: &VolObject) -> Result<()> {
        let loc = object_loc(obj, Category::Group)?;
        release(cx, &loc)
    }
}

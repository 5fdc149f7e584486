use hdfcore_format::Datatype;
use tracing::debug;

use super::header::{self, HeaderKind, Message};
use super::{
    flush_object, insert_new, location, object_loc, open_named, opened, path, refresh_object,
    release, NativeConnector, NativeObject,
};
use crate::error::{Category, Error, ErrorKind, Result};
use crate::vol::{CallCtx, DatatypeClass, DatatypeSpecific, VolObject};

impl DatatypeClass for NativeConnector {
    fn commit(
        &self,
        cx: &mut CallCtx,
        loc: &VolObject,
        name: &str,
        dtype: &Datatype,
    ) -> Result<VolObject> {
        let start = location(loc, Category::Datatype)?;
        let lapl = Default::default();
        let new = path::with_parent(cx, &start, name, &lapl, |parent, last| {
            let relaxed = parent.top.with_shared(|s| Ok(s.fapl.relaxed_integrity))?;
            dtype.validate(relaxed)?;
            insert_new(parent, last, HeaderKind::Datatype, vec![Message::Datatype(dtype.clone())])
        })?;
        debug!(name, addr = new.addr, "datatype committed");
        opened(new, NativeObject::Datatype)
    }

    fn open(&self, cx: &mut CallCtx, loc: &VolObject, name: &str) -> Result<VolObject> {
        open_named(cx, loc, name, HeaderKind::Datatype, Category::Datatype, NativeObject::Datatype)
    }

    fn get(&self, _cx: &mut CallCtx, obj: &VolObject) -> Result<Datatype> {
        let loc = object_loc(obj, Category::Datatype)?;
        loc.top.with_shared(|s| {
            header::load(s, loc.addr)?.datatype().cloned().ok_or_else(|| {
                Error::new(
                    Category::Datatype,
                    ErrorKind::DecodeMalformed,
                    format!("committed datatype at {} has no descriptor", loc.addr),
                )
            })
        })
    }

    fn specific(&self, _cx: &mut CallCtx, obj: &VolObject, op: DatatypeSpecific) -> Result<()> {
        let loc = object_loc(obj, Category::Datatype)?;
        match op {
            DatatypeSpecific::Flush => flush_object(&loc),
            DatatypeSpecific::Refresh => refresh_object(&loc),
        }
    }

    fn close(&self, cx: &mut CallCtx, obj: &VolObject) -> Result<()> {
        let loc = object_loc(obj, Category::Datatype)?;
        release(cx, &loc)
    }
}

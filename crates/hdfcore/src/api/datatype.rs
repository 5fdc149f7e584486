use hdfcore_format::Datatype;

use crate::error::Result;
use crate::ids::{Hid, IdKind};
use crate::library::Library;
use crate::vol::{dispatch, DatatypeSpecific, ObjectKind, OptionalArgs};

impl Library {
    /// Store `dtype` in the file as the named datatype `name`.
    pub fn datatype_commit(&self, loc: Hid, name: &str, dtype: &Datatype) -> Result<Hid> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            let obj = dispatch::datatype_commit(cx, &loc, name, dtype)?;
            Ok(self.register(ObjectKind::Datatype, loc.connector, obj))
        })
    }

    pub fn datatype_open(&self, loc: Hid, name: &str) -> Result<Hid> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            let obj = dispatch::datatype_open(cx, &loc, name)?;
            Ok(self.register(ObjectKind::Datatype, loc.connector, obj))
        })
    }

    /// The descriptor stored in a committed datatype.
    pub fn datatype_get(&self, dt: Hid) -> Result<Datatype> {
        self.api(|cx| {
            let dt = self.object(dt, &[IdKind::Datatype])?;
            dispatch::datatype_get(cx, &dt)
        })
    }

    pub fn datatype_flush(&self, dt: Hid) -> Result<()> {
        self.api(|cx| {
            let dt = self.object(dt, &[IdKind::Datatype])?;
            dispatch::datatype_specific(cx, &dt, DatatypeSpecific::Flush)
        })
    }

    pub fn datatype_refresh(&self, dt: Hid) -> Result<()> {
        self.api(|cx| {
            let dt = self.object(dt, &[IdKind::Datatype])?;
            dispatch::datatype_specific(cx, &dt, DatatypeSpecific::Refresh)
        })
    }

    pub fn datatype_optional(&self, dt: Hid, args: &mut OptionalArgs) -> Result<()> {
        self.api(|cx| {
            let dt = self.object(dt, &[IdKind::Datatype])?;
            dispatch::datatype_optional(cx, &dt, args)
        })
    }
}

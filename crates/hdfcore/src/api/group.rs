use crate::error::Result;
use crate::ids::{Hid, IdKind};
use crate::library::Library;
use crate::vol::{dispatch, GroupGet, GroupSpecific, ObjectKind, OptionalArgs};

impl Library {
    /// Create the group `name` below `loc`.
    pub fn group_create(&self, loc: Hid, name: &str) -> Result<Hid> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            let obj = dispatch::group_create(cx, &loc, name)?;
            Ok(self.register(ObjectKind::Group, loc.connector, obj))
        })
    }

    /// Like [`Library::group_create`], also returning the request token
    /// the connector hands back, if any.
    pub fn group_create_async(&self, loc: Hid, name: &str) -> Result<(Hid, Option<Hid>)> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            let (obj, req) = self.with_request(cx, &loc.connector, |cx| {
                dispatch::group_create(cx, &loc, name)
            })?;
            Ok((self.register(ObjectKind::Group, loc.connector, obj), req))
        })
    }

    pub fn group_open(&self, loc: Hid, name: &str) -> Result<Hid> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            let obj = dispatch::group_open(cx, &loc, name)?;
            Ok(self.register(ObjectKind::Group, loc.connector, obj))
        })
    }

    /// Number of links in the group, or in the root group of a file.
    pub fn group_num_links(&self, grp: Hid) -> Result<u64> {
        self.api(|cx| {
            let grp = self.object(grp, &[IdKind::Group, IdKind::File])?;
            dispatch::group_get(cx, &grp, GroupGet::NumLinks)
        })
    }

    pub fn group_flush(&self, grp: Hid) -> Result<()> {
        self.api(|cx| {
            let grp = self.object(grp, &[IdKind::Group])?;
            dispatch::group_specific(cx, &grp, GroupSpecific::Flush)
        })
    }

    /// Drop cached metadata of the group so the next access rereads it.
    pub fn group_refresh(&self, grp: Hid) -> Result<()> {
        self.api(|cx| {
            let grp = self.object(grp, &[IdKind::Group])?;
            dispatch::group_specific(cx, &grp, GroupSpecific::Refresh)
        })
    }

    pub fn group_optional(&self, grp: Hid, args: &mut OptionalArgs) -> Result<()> {
        self.api(|cx| {
            let grp = self.object(grp, &[IdKind::Group])?;
            dispatch::group_optional(cx, &grp, args)
        })
    }
}

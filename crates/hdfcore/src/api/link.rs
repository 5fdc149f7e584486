use std::ops::ControlFlow;

use crate::error::{Category, Error, Result};
use crate::ids::Hid;
use crate::library::Library;
use crate::vol::{dispatch, LinkInfo, LinkSpecific, LinkSpecificOut, LinkTarget, OptionalArgs};

fn unexpected() -> Error {
    Error::internal(Category::Link, "connector returned an unexpected result")
}

impl Library {
    fn link_specific(&self, loc: Hid, op: LinkSpecific<'_>) -> Result<LinkSpecificOut> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            dispatch::link_specific(cx, &loc, op)
        })
    }

    /// Link `loc/name` to the object at `target/path`.
    pub fn link_create_hard(&self, target: Hid, path: &str, loc: Hid, name: &str) -> Result<()> {
        self.api(|cx| {
            let target = self.location(target)?;
            let loc = self.location(loc)?;
            dispatch::link_create_hard(cx, &target, path, &loc, name)
        })
    }

    /// Link `loc/name` to the path `to`, resolved when the link is
    /// traversed.
    pub fn link_create_soft(&self, to: &str, loc: Hid, name: &str) -> Result<()> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            dispatch::link_create(cx, &loc, name, LinkTarget::Soft(to))
        })
    }

    /// Link `loc/name` to `path` inside the file `file`, found by the
    /// external-link search when traversed.
    pub fn link_create_external(&self, file: &str, path: &str, loc: Hid, name: &str) -> Result<()> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            dispatch::link_create(cx, &loc, name, LinkTarget::External { file, path })
        })
    }

    pub fn link_copy(&self, src: Hid, src_name: &str, dst: Hid, dst_name: &str) -> Result<()> {
        self.api(|cx| {
            let src = self.location(src)?;
            let dst = self.location(dst)?;
            dispatch::link_copy(cx, &src, src_name, &dst, dst_name)
        })
    }

    pub fn link_move(&self, src: Hid, src_name: &str, dst: Hid, dst_name: &str) -> Result<()> {
        self.api(|cx| {
            let src = self.location(src)?;
            let dst = self.location(dst)?;
            dispatch::link_move(cx, &src, src_name, &dst, dst_name)
        })
    }

    pub fn link_info(&self, loc: Hid, name: &str) -> Result<LinkInfo> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            dispatch::link_get(cx, &loc, name)
        })
    }

    /// Remove the link `name`. The object it pointed at is freed once no
    /// link and no open identifier refers to it.
    pub fn link_delete(&self, loc: Hid, name: &str) -> Result<()> {
        self.link_specific(loc, LinkSpecific::Delete(name)).map(|_| ())
    }

    pub fn link_exists(&self, loc: Hid, name: &str) -> Result<bool> {
        match self.link_specific(loc, LinkSpecific::Exists(name))? {
            LinkSpecificOut::Bool(b) => Ok(b),
            _ => Err(unexpected()),
        }
    }

    /// Visit the links of the group `loc` in name order. Returns whether
    /// the visitor stopped early.
    pub fn link_iterate<F>(&self, loc: Hid, mut visit: F) -> Result<bool>
    where
        F: FnMut(&str, &LinkInfo) -> ControlFlow<()>,
    {
        let mut guarded = |name: &str, info: &LinkInfo| {
            let _guard = crate::errstack::CallbackGuard::new();
            visit(name, info)
        };
        match self.link_specific(loc, LinkSpecific::Iterate(&mut guarded))? {
            LinkSpecificOut::Bool(stopped) => Ok(stopped),
            _ => Err(unexpected()),
        }
    }

    /// Names of the links in the group `loc`, in name order.
    pub fn link_names(&self, loc: Hid) -> Result<Vec<String>> {
        let mut names = Vec::new();
        self.link_iterate(loc, |name, _| {
            names.push(name.to_string());
            ControlFlow::Continue(())
        })?;
        Ok(names)
    }

    pub fn link_optional(&self, loc: Hid, args: &mut OptionalArgs) -> Result<()> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            dispatch::link_optional(cx, &loc, args)
        })
    }
}

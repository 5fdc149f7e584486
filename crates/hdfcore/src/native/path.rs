//! Path traversal.
//!
//! Paths are `/`-separated link names. An absolute path starts at the root
//! of the topmost file of the mount hierarchy; a relative one at the given
//! location. Mount points are crossed into the mounted file's root. Soft
//! links resolve relative to the group holding them; external links open
//! their target file through the prefix search and the referencing file's
//! external file cache. Both spend from the link-traversal budget.

use std::sync::Arc;

use hdfcore_io::AccessFlags;
use tracing::debug;

use super::header::{self, HeaderKind, Link, LinkValue};
use crate::error::{Category, Error, ErrorKind, Result};
use crate::file::prefix::{self, SearchAttempt, SearchPaths};
use crate::file::{close, efc, open, FileTop, FirstError, ObjectLoc, SharedFile};
use crate::plist::{FileAccessProps, FileCreateProps, LinkAccessProps};
use crate::vol::CallCtx;

/// An external file held for the length of a traversal.
pub(crate) struct ExternalUse {
    parent: Arc<SharedFile>,
    pub top: Arc<FileTop>,
    cached: bool,
}

impl ExternalUse {
    /// Done with the file. A cached file stays in its cache; an uncached
    /// one closes unless an object opened through it is still open.
    pub fn finish(self, cx: &mut CallCtx) -> Result<()> {
        if self.cached {
            self.parent.state.lock().efc.release(&self.top);
            Ok(())
        } else {
            close::try_close(cx, &self.top)
        }
    }
}

struct Walker<'a> {
    lapl: &'a LinkAccessProps,
    budget: u32,
    externals: Vec<ExternalUse>,
}

fn cross_mounts(mut loc: ObjectLoc) -> Result<ObjectLoc> {
    while let Some(child) = loc.top.mounted_at(loc.addr) {
        loc = child.root()?;
    }
    Ok(loc)
}

impl Walker<'_> {
    fn spend(&mut self) -> Result<()> {
        if self.budget == 0 {
            return Err(Error::new(
                Category::Link,
                ErrorKind::ResourceExhausted,
                "too many links traversed",
            ));
        }
        self.budget -= 1;
        Ok(())
    }

    fn walk(&mut self, cx: &mut CallCtx, start: ObjectLoc, path: &str, cross_last: bool) -> Result<ObjectLoc> {
        let mut cur = if path.starts_with('/') {
            start.top.topmost().root()?
        } else {
            start
        };
        for comp in path.split('/').filter(|c| !c.is_empty() && *c != ".") {
            cur = cross_mounts(cur)?;
            let link = lookup(&cur, comp)?;
            cur = self.follow(cx, cur, link)?;
        }
        if cross_last {
            cur = cross_mounts(cur)?;
        }
        Ok(cur)
    }

    fn follow(&mut self, cx: &mut CallCtx, group: ObjectLoc, link: Link) -> Result<ObjectLoc> {
        match link.value {
            LinkValue::Hard(addr) => Ok(ObjectLoc {
                top: group.top,
                addr,
            }),
            LinkValue::Soft(target) => {
                self.spend()?;
                self.walk(cx, group, &target, true)
            }
            LinkValue::External { file, path } => {
                self.spend()?;
                let ext = open_external(cx, &group.top, &file, self.lapl)?;
                let root = ext.top.root();
                self.externals.push(ext);
                self.walk(cx, root?, &path, true)
            }
        }
    }

    fn finish(self, cx: &mut CallCtx) -> Result<()> {
        let mut errs = FirstError::default();
        for ext in self.externals {
            errs.note("release external file", ext.finish(cx));
        }
        errs.into_result()
    }
}

/// The link named `name` in the group at `group`.
pub(crate) fn lookup(group: &ObjectLoc, name: &str) -> Result<Link> {
    group.top.with_shared(|s| {
        let hdr = header::load(s, group.addr)?;
        if hdr.kind != HeaderKind::Group {
            return Err(Error::args(
                Category::Link,
                format!("cannot look up '{name}': not a group"),
            ));
        }
        hdr.find_link(name).cloned().ok_or_else(|| {
            Error::not_found(Category::Link, format!("object '{name}' doesn't exist"))
        })
    })
}

/// Resolve `path` from `start` and run `f` on the object it names. External
/// files opened on the way are released after `f` returns; an object `f`
/// opens keeps its file open.
pub(crate) fn with_target<R>(
    cx: &mut CallCtx,
    start: &ObjectLoc,
    path: &str,
    lapl: &LinkAccessProps,
    f: impl FnOnce(&ObjectLoc) -> Result<R>,
) -> Result<R> {
    traverse(cx, start, path, lapl, true, f)
}

/// Like [`with_target`] but stops on a mount point instead of entering the
/// mounted file.
pub(crate) fn with_mount_point<R>(
    cx: &mut CallCtx,
    start: &ObjectLoc,
    path: &str,
    f: impl FnOnce(&ObjectLoc) -> Result<R>,
) -> Result<R> {
    traverse(cx, start, path, &LinkAccessProps::default(), false, f)
}

fn traverse<R>(
    cx: &mut CallCtx,
    start: &ObjectLoc,
    path: &str,
    lapl: &LinkAccessProps,
    cross_last: bool,
    f: impl FnOnce(&ObjectLoc) -> Result<R>,
) -> Result<R> {
    let mut walker = Walker {
        lapl,
        budget: lapl.max_soft_links,
        externals: Vec::new(),
    };
    let result = walker
        .walk(cx, start.clone(), path, cross_last)
        .and_then(|loc| f(&loc));
    let finished = walker.finish(cx);
    let value = result?;
    finished?;
    Ok(value)
}

/// Split `path` into its parent path and last component.
pub(crate) fn split_last(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    let (parent, last) = match trimmed.rfind('/') {
        Some(0) => ("/", &trimmed[1..]),
        Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
        None => (".", trimmed),
    };
    if last.is_empty() || last == "." {
        return Err(Error::args(
            Category::Link,
            format!("'{path}' does not name a link"),
        ));
    }
    Ok((parent, last))
}

/// Resolve the group that holds the last component of `path`, and run `f`
/// with it and the component.
pub(crate) fn with_parent<R>(
    cx: &mut CallCtx,
    start: &ObjectLoc,
    path: &str,
    lapl: &LinkAccessProps,
    f: impl FnOnce(&ObjectLoc, &str) -> Result<R>,
) -> Result<R> {
    let (parent, last) = split_last(path)?;
    with_target(cx, start, parent, lapl, |loc| f(loc, last))
}

/// Open `name` as referenced from `parent`.
pub(crate) fn open_external(
    cx: &mut CallCtx,
    parent: &Arc<FileTop>,
    name: &str,
    lapl: &LinkAccessProps,
) -> Result<ExternalUse> {
    search_external(cx, parent, name, lapl)?.0
}

/// Try each search candidate for `name` as referenced from `parent`. The
/// inner result says whether a candidate opened; the candidates tried are
/// returned either way.
pub(crate) fn search_external(
    cx: &mut CallCtx,
    parent: &Arc<FileTop>,
    name: &str,
    lapl: &LinkAccessProps,
) -> Result<(Result<ExternalUse>, Vec<SearchAttempt>)> {
    let shared = parent.shared.clone();
    let cached = parent.with_shared(|s| Ok(s.efc.lookup(name)))?;
    if let Some(top) = cached {
        debug!(name, "external file cache hit");
        return Ok((
            Ok(ExternalUse {
                parent: shared,
                top,
                cached: true,
            }),
            Vec::new(),
        ));
    }

    let (flags, extpath, actual, driver) = parent.with_shared(|s| {
        Ok((
            s.flags.tentative().without(AccessFlags::SWMR_WRITE),
            s.extpath.clone(),
            s.actual_name.clone(),
            s.fapl.driver.clone(),
        ))
    })?;
    let fapl = lapl.ext_fapl.clone().unwrap_or_else(|| FileAccessProps {
        driver,
        ..FileAccessProps::default()
    });
    let env_prefix = cx.library().config().ext_prefix.clone();
    let paths = SearchPaths {
        env_prefix: env_prefix.as_deref(),
        plist_prefix: lapl.ext_prefix.as_deref(),
        extpath: extpath.as_deref(),
        actual_name: Some(&actual),
    };
    let cands = prefix::candidates(name, &paths);
    let fcpl = FileCreateProps::default();
    let (found, attempts, last_err) = prefix::search(&cands, |cand| {
        open::open_file(cx, cand, flags, &fcpl, &fapl)
    });
    let Some(top) = found else {
        let detail = last_err.map(|e| e.to_string()).unwrap_or_default();
        let err = Error::not_found(
            Category::Link,
            format!("unable to open external file '{name}': {detail}"),
        );
        return Ok((Err(err), attempts));
    };

    let inserted = shared.state.lock().efc.insert(name, top.clone());
    match inserted {
        Ok(evicted) => {
            top.state.lock().efc_holds += 1;
            let mut errs = FirstError::default();
            for t in evicted {
                errs.note("evict external file", efc::release_top(cx, &t));
            }
            errs.into_result()?;
            Ok((
                Ok(ExternalUse {
                    parent: shared,
                    top,
                    cached: true,
                }),
                attempts,
            ))
        }
        Err(top) => Ok((
            Ok(ExternalUse {
                parent: shared,
                top,
                cached: false,
            }),
            attempts,
        )),
    }
}

//! Closing files.
//!
//! Closing an identifier applies the file's close degree. A weak close
//! defers until the last object opened through the handle goes away. A
//! semi close refuses while objects are open. A strong close closes them
//! first. Once a handle has no identifier, open objects, mount or cache
//! holds, it unmounts its children and drops its reference on the shared
//! file; the last reference tears the shared file down.

use std::sync::Arc;

use hdfcore_io::CloseDegree;
use tracing::{debug, error, info};

use super::{efc, is_within, reachable_open, FileTop, FirstError, Lifecycle, SharedFile};
use crate::error::{Category, Error, Result};
use crate::ids::IdKind;
use crate::native::NativeObject;
use crate::vol::{dispatch, CallCtx, ObjectKind};

/// The identifier naming `top` is going away.
pub(crate) fn close_handle(cx: &mut CallCtx, top: &Arc<FileTop>) -> Result<()> {
    let degree = top.shared.state.lock().close_degree;
    let open = reachable_open(top);
    match degree {
        CloseDegree::Semi if open > 0 => {
            return Err(Error::conflict(
                Category::File,
                format!("{} has {open} open objects", top.open_name),
            ));
        }
        CloseDegree::Strong if open > 0 => {
            top.state.lock().id_exists = false;
            force_close_objects(cx, top)?;
        }
        _ => {}
    }
    top.state.lock().id_exists = false;
    if open > 0 && degree == CloseDegree::Weak {
        debug!(name = %top.open_name, open, "file close deferred");
    }
    try_close(cx, top)
}

/// Close every identifier whose object lives under `top`: datasets, groups
/// and attributes first, committed datatypes last.
fn force_close_objects(cx: &mut CallCtx, top: &Arc<FileTop>) -> Result<()> {
    top.state.lock().forcing = true;
    let lib = cx.library().clone();
    let mut errs = FirstError::default();
    let passes: [&[(IdKind, ObjectKind)]; 2] = [
        &[
            (IdKind::Dataset, ObjectKind::Dataset),
            (IdKind::Group, ObjectKind::Group),
            (IdKind::Attr, ObjectKind::Attr),
        ],
        &[(IdKind::Datatype, ObjectKind::Datatype)],
    ];
    for pass in passes {
        for &(id_kind, kind) in pass {
            for (hid, obj) in lib.ids().snapshot(id_kind) {
                let owner = dispatch::terminal(&obj)
                    .data
                    .downcast::<NativeObject>()
                    .map(|n| n.top().clone());
                if !owner.is_some_and(|t| is_within(&t, top)) {
                    continue;
                }
                if lib.ids().remove(hid).is_some() {
                    debug!(?hid, ?kind, "force-closing object");
                    errs.note("force close", dispatch::close(cx, kind, &obj));
                }
            }
        }
    }
    top.state.lock().forcing = false;
    errs.into_result()
}

/// Finish closing `top` if nothing holds it open any more.
pub(crate) fn try_close(cx: &mut CallCtx, top: &Arc<FileTop>) -> Result<()> {
    {
        let t = top.state.lock();
        if t.closing
            || t.closed
            || t.forcing
            || t.id_exists
            || t.mount_refs > 0
            || t.efc_holds > 0
        {
            return Ok(());
        }
    }
    if reachable_open(top) > 0 {
        return Ok(());
    }
    let children = {
        let mut t = top.state.lock();
        if t.closing {
            return Ok(());
        }
        t.closing = true;
        std::mem::take(&mut t.mounts)
    };
    let mut errs = FirstError::default();
    for m in children {
        {
            let mut c = m.child.state.lock();
            c.mount_refs = c.mount_refs.saturating_sub(1);
            c.parent = None;
        }
        errs.note("close mounted file", try_close(cx, &m.child));
    }
    errs.note("release shared file", release_shared(cx, &top.shared));
    top.state.lock().closed = true;
    debug!(name = %top.open_name, "file handle closed");
    errs.into_result()
}

/// Drop one reference to `shared`, tearing it down at zero.
fn release_shared(cx: &mut CallCtx, shared: &Arc<SharedFile>) -> Result<()> {
    let nrefs = shared.state.lock().nrefs;
    if nrefs > 1 && efc::only_cycles(shared) {
        debug!("breaking external file cache cycle");
        let held = shared.state.lock().efc.take_all();
        for t in held {
            efc::release_top(cx, &t)?;
        }
    }
    {
        let mut s = shared.state.lock();
        if s.nrefs == 0 {
            error!(name = %s.name, "shared file reference count underflow");
            return Err(Error::internal(Category::File, "reference count underflow"));
        }
        s.nrefs -= 1;
        if s.nrefs > 0 {
            debug!(name = %s.name, nrefs = s.nrefs, "shared file still referenced");
            return Ok(());
        }
        if s.lifecycle != Lifecycle::Live {
            return Ok(());
        }
        s.lifecycle = Lifecycle::Closing;
    }
    teardown(cx, shared)
}

/// Tear down a shared file. Every step runs; the first failure is
/// reported.
fn teardown(cx: &mut CallCtx, shared: &Arc<SharedFile>) -> Result<()> {
    let mut errs = FirstError::default();
    let held = {
        let mut s = shared.state.lock();
        errs.note("release aggregators", s.release_aggregators());
        let image = s.fapl.cache_image;
        s.cache.prepare_for_close(image);
        if s.is_writable() {
            errs.note("flush", s.flush_for_close());
        }
        s.efc.take_all()
    };
    for t in held {
        errs.note("release external file", efc::release_top(cx, &t));
    }
    let name = {
        let mut s = shared.state.lock();
        s.cache.clear();
        s.open_objects.clear();
        s.alloc.clear_free_list();
        s.retries = super::Retries::default();
        s.connector = None;
        if let Some(mut io) = s.io.take() {
            if s.locked {
                errs.note("unlock", io.driver.unlock());
                s.locked = false;
            }
            errs.note("driver close", io.driver.close());
        }
        s.lifecycle = Lifecycle::Gone;
        s.name.clone()
    };
    if let Some(id) = &shared.identity {
        cx.library().files().remove(id);
    }
    info!(name = %name, "file closed");
    errs.into_result()
}

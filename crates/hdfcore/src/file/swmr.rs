//! Switching an open writer into single-writer/multiple-reader mode.

use std::sync::Arc;

use hdfcore_format::superblock::{STATUS_FLAGS_VERSION, STATUS_SWMR_WRITE_ACCESS, STATUS_WRITE_ACCESS};
use hdfcore_io::{AccessFlags, DriverFeatures};
use tracing::{debug, info, warn};

use super::open::SWMR_READ_ATTEMPTS;
use super::{accounting, object_opened, FileTop, ObjectLoc, Retries, SharedState};
use crate::error::{Category, Error, Result};
use crate::ids::{Hid, IdKind};
use crate::native::NativeObject;
use crate::plist::LibVersion;
use crate::vol::{dispatch, CallCtx, IdObject, ObjTypes, ObjectKind, VolObject};

fn check_preconditions(s: &SharedState) -> Result<()> {
    if !s.is_writable() {
        return Err(Error::args(Category::File, "file is not opened for writing"));
    }
    if s.flags.contains(AccessFlags::SWMR_WRITE) {
        return Err(Error::args(Category::File, "file is already in SWMR writing mode"));
    }
    if s.superblock.version < STATUS_FLAGS_VERSION {
        return Err(Error::conflict(
            Category::File,
            format!(
                "superblock version {} does not support SWMR writing",
                s.superblock.version
            ),
        ));
    }
    if s.fapl.low_bound < LibVersion::V110 {
        return Err(Error::conflict(
            Category::File,
            "library format bounds are too low for SWMR writing",
        ));
    }
    // Open objects below SWMR_MIN_HEADER_VERSION cannot exist: headers of any
    // other version are rejected on load, checked at compile time in header.rs.
    if s.fapl.cache_image {
        return Err(Error::unsupported(
            Category::File,
            "SWMR writing is not compatible with a metadata cache image",
        ));
    }
    let swmr = s
        .driver()
        .is_some_and(|d| d.features().contains(DriverFeatures::SUPPORTS_SWMR));
    if !swmr {
        return Err(Error::unsupported(
            Category::File,
            "file driver does not support SWMR writing",
        ));
    }
    Ok(())
}

struct Detached {
    hid: Hid,
    obj: IdObject,
    kind: ObjectKind,
    loc: ObjectLoc,
}

/// Flip the write-access mode of a store, re-stamp the superblock and
/// reopen every group and dataset handle so they observe the new mode.
pub(crate) fn start_swmr_write(cx: &mut CallCtx, top: &Arc<FileTop>) -> Result<()> {
    top.with_shared(|s| check_preconditions(s))?;
    let lib = cx.library().clone();
    let blocking = accounting::open_count(&lib, top, ObjTypes::DATATYPE | ObjTypes::ATTR);
    if blocking > 0 {
        return Err(Error::conflict(
            Category::File,
            format!("{blocking} committed datatypes or attributes are open"),
        ));
    }
    top.with_shared(|s| s.flush_all())?;

    let mut detached = Vec::new();
    for (id_kind, kind) in [(IdKind::Group, ObjectKind::Group), (IdKind::Dataset, ObjectKind::Dataset)] {
        for (hid, obj) in lib.ids().snapshot(id_kind) {
            let Some(native) = dispatch::terminal(&obj).data.downcast::<NativeObject>() else {
                continue;
            };
            let Some(loc) = native.loc() else {
                continue;
            };
            if Arc::ptr_eq(&loc.top.shared, &top.shared) {
                detached.push(Detached { hid, obj, kind, loc });
            }
        }
    }

    top.shared.state.lock().holding_closes = true;
    let mut result = Ok(());
    let mut closed = 0;
    for d in &detached {
        if let Err(e) = dispatch::close(cx, d.kind, &d.obj) {
            result = Err(e);
            break;
        }
        closed += 1;
    }
    if result.is_ok() {
        result = top.with_shared(switch_mode);
    }

    // Handles past the failed close still hold their original objects.
    detached.truncate(closed);
    for d in detached {
        if let Err(e) = reattach(cx, &lib, d) {
            warn!(error = %e, "failed to reopen object after SWMR transition");
            if result.is_ok() {
                result = Err(e);
            }
        }
    }
    top.shared.state.lock().holding_closes = false;
    if result.is_ok() {
        info!(name = %top.open_name, "file switched to SWMR writing");
    }
    result
}

fn switch_mode(s: &mut SharedState) -> Result<()> {
    let saved = (s.flags, s.read_attempts, s.retries.clone(), s.superblock.status_flags);
    s.flags.insert(AccessFlags::SWMR_WRITE);
    s.read_attempts = s.fapl.read_attempts.unwrap_or(SWMR_READ_ATTEMPTS);
    s.retries = Retries::new(s.read_attempts);
    let result = (|| -> Result<()> {
        if s.locked {
            let io = s.io.as_mut().ok_or_else(super::no_driver)?;
            io.driver.unlock()?;
            io.driver.lock(true)?;
            debug!(name = %s.name, "lock re-taken for SWMR writing");
        }
        s.superblock.status_flags |= STATUS_WRITE_ACCESS | STATUS_SWMR_WRITE_ACCESS;
        s.flush_all()?;
        s.cache.evict_clean();
        Ok(())
    })();
    if result.is_err() {
        s.flags = saved.0;
        s.read_attempts = saved.1;
        s.retries = saved.2;
        s.superblock.status_flags = saved.3;
    }
    result
}

fn reattach(cx: &mut CallCtx, lib: &crate::library::Library, d: Detached) -> Result<()> {
    object_opened(&d.loc.top, d.loc.addr)?;
    let native = match d.kind {
        ObjectKind::Dataset => NativeObject::Dataset(d.loc),
        _ => NativeObject::Group(d.loc),
    };
    let wrapped = dispatch::wrap_object(cx, d.kind, VolObject::new(native))?;
    lib.ids().replace(d.hid, IdObject::new(d.obj.connector.clone(), wrapped))
}

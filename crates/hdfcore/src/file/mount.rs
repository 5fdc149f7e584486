//! Mount tables.

use std::sync::Arc;

use tracing::debug;

use super::{close, is_within, FileTop, Mount};
use crate::error::{Category, Error, Result};
use crate::vol::CallCtx;

/// Mount `child` on the group at `group_addr` in `parent`.
pub(crate) fn mount(parent: &Arc<FileTop>, group_addr: u64, child: &Arc<FileTop>) -> Result<()> {
    if Arc::ptr_eq(&parent.shared, &child.shared) || is_within(parent, child) {
        return Err(Error::args(
            Category::File,
            "mount would introduce a cycle",
        ));
    }
    if !child.is_live() {
        return Err(Error::args(Category::File, "file to mount is closing"));
    }
    {
        let mut c = child.state.lock();
        if c.parent.is_some() {
            return Err(Error::conflict(Category::File, "file is already mounted"));
        }
        c.mount_refs += 1;
        c.parent = Some(Arc::downgrade(parent));
    }
    let mut p = parent.state.lock();
    if p.mounts.iter().any(|m| m.group_addr == group_addr) {
        drop(p);
        let mut c = child.state.lock();
        c.mount_refs -= 1;
        c.parent = None;
        return Err(Error::conflict(Category::Group, "mount point is already in use"));
    }
    p.mounts.push(Mount {
        group_addr,
        child: child.clone(),
    });
    debug!(parent = %parent.open_name, child = %child.open_name, group_addr, "file mounted");
    Ok(())
}

/// Remove the mount at `group_addr`; the child closes if nothing else
/// holds it.
pub(crate) fn unmount(cx: &mut CallCtx, parent: &Arc<FileTop>, group_addr: u64) -> Result<()> {
    let child = {
        let mut p = parent.state.lock();
        let idx = p
            .mounts
            .iter()
            .position(|m| m.group_addr == group_addr)
            .ok_or_else(|| Error::not_found(Category::Group, "no file is mounted there"))?;
        p.mounts.remove(idx).child
    };
    {
        let mut c = child.state.lock();
        c.mount_refs = c.mount_refs.saturating_sub(1);
        c.parent = None;
    }
    debug!(parent = %parent.open_name, child = %child.open_name, "file unmounted");
    close::try_close(cx, &child)
}

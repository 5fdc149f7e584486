//! Opening and creating files.
//!
//! A store the driver can identify is first looked up in the shared-file
//! registry. A hit joins the existing shared file after the intent and
//! close-degree checks; a miss opens the driver, takes the advisory lock,
//! then reads or initializes the superblock.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hdfcore_format::superblock::{
    STATUS_FLAGS_VERSION, STATUS_SWMR_WRITE_ACCESS, STATUS_WRITE_ACCESS,
};
use hdfcore_format::Superblock;
use hdfcore_io::{AccessFlags, CloseDegree, DriverError, FileIdentity, MemType, PageBuffer};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::alloc::{AllocKind, Allocator};
use super::efc::ExternalFileCache;
use super::intent::{check_join, Mode};
use super::{max_addr, BlockIo, FileTop, Lifecycle, Retries, SharedFile, SharedState};
use crate::cache::MetadataCache;
use crate::config::LockingPolicy;
use crate::error::{Category, Error, ErrorKind, Result};
use crate::plist::{FileAccessProps, FileCreateProps, LibVersion};
use crate::vol::CallCtx;

/// Read attempts for metadata under SWMR when none are configured.
pub(crate) const SWMR_READ_ATTEMPTS: u32 = 100;

/// Open or create `name`, joining an already open store when the driver
/// can identify it.
pub(crate) fn open_file(
    cx: &CallCtx,
    name: &str,
    flags: AccessFlags,
    fcpl: &FileCreateProps,
    fapl: &FileAccessProps,
) -> Result<Arc<FileTop>> {
    Mode::of(flags)?;
    let class = &fapl.driver;
    let identity = if class.supports_identity() {
        class.probe(name).unwrap_or_else(|e| {
            debug!(name, error = %e, "identity probe failed");
            None
        })
    } else {
        None
    };
    if let Some(id) = &identity {
        if let Some(shared) = cx.library().files().search(id) {
            return join(shared, name, flags, fapl);
        }
    }
    first_open(cx, name, flags, fcpl, fapl, identity)
}

fn join(
    shared: Arc<SharedFile>,
    name: &str,
    flags: AccessFlags,
    fapl: &FileAccessProps,
) -> Result<Arc<FileTop>> {
    {
        let mut s = shared.state.lock();
        if s.lifecycle != Lifecycle::Live {
            return Err(Error::conflict(
                Category::File,
                format!("{} is being closed", s.name),
            ));
        }
        check_join(flags, s.flags)?;
        if fapl.close_degree != CloseDegree::Default && fapl.close_degree != s.close_degree {
            return Err(Error::conflict(
                Category::File,
                format!(
                    "file close degree {} doesn't match {} of the open file",
                    fapl.close_degree, s.close_degree
                ),
            ));
        }
        s.nrefs += 1;
        debug!(name, nrefs = s.nrefs, "joined open file");
    }
    Ok(FileTop::new(shared, name))
}

fn absolute_dir(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    abs.parent().map(Path::to_path_buf)
}

fn first_open(
    cx: &CallCtx,
    name: &str,
    flags: AccessFlags,
    fcpl: &FileCreateProps,
    fapl: &FileAccessProps,
    probed: Option<FileIdentity>,
) -> Result<Arc<FileTop>> {
    let class = fapl.driver.clone();
    let creating = flags.intersects(AccessFlags::CREATE | AccessFlags::TRUNC);
    let maxaddr = if creating {
        max_addr(fcpl.offset_size)
    } else {
        max_addr(8)
    };
    let mut driver = class.open(name, flags, maxaddr)?;

    let policy = cx.library().config().effective_locking(fapl.locking_policy());
    let mut locked = false;
    if policy != LockingPolicy::Disabled && class.supports_locking() {
        match driver.lock(flags.is_writable()) {
            Ok(()) => locked = true,
            Err(DriverError::LockUnsupported) if policy == LockingPolicy::BestEffort => {
                warn!(name, "file locking disabled on this filesystem; continuing unlocked");
            }
            Err(e) => {
                if let Err(close_err) = driver.close() {
                    warn!(name, error = %close_err, "close after failed lock");
                }
                return Err(e.into());
            }
        }
    }

    let identity = probed.or_else(|| driver.identity());
    let actual_name = driver
        .posix_path()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let read_attempts = fapl.read_attempts.unwrap_or(
        if flags.intersects(AccessFlags::SWMR_READ | AccessFlags::SWMR_WRITE) {
            SWMR_READ_ATTEMPTS
        } else {
            1
        },
    );
    let pb = (fapl.page_buffer_bytes > 0)
        .then(|| PageBuffer::new(fcpl.page_size.max(512), fapl.page_buffer_bytes));
    let close_degree = match fapl.close_degree {
        CloseDegree::Default => class.default_close_degree(),
        d => d,
    };
    let eof = driver.eof(MemType::Superblock);

    let mut state = SharedState {
        name: name.to_string(),
        nrefs: 1,
        lifecycle: Lifecycle::Init,
        flags,
        io: Some(BlockIo { driver, pb }),
        cache: MetadataCache::new(fapl.mdc_bytes),
        alloc: Allocator::new(0, maxaddr, 0, 1, 1),
        superblock: Superblock::new(STATUS_FLAGS_VERSION, fcpl.offset_size, fcpl.length_size),
        fcpl: fcpl.clone(),
        fapl: fapl.clone(),
        close_degree,
        read_attempts,
        retries: Retries::new(read_attempts),
        efc: ExternalFileCache::new(fapl.efc_size),
        open_objects: BTreeMap::new(),
        extpath: absolute_dir(name),
        actual_name,
        locked,
        connector: Some(cx.library().native()),
        stamp_status: class.supports_locking(),
        holding_closes: false,
    };

    let init = if eof == 0 {
        initialize(&mut state)
    } else {
        read_superblock(&mut state, eof)
    }
    .and_then(|()| stamp(&mut state));
    if let Err(e) = init {
        abandon(state);
        return Err(e);
    }
    state.lifecycle = Lifecycle::Live;
    info!(
        name,
        flags = ?flags,
        version = state.superblock.version,
        degree = %state.close_degree,
        "file opened"
    );

    let shared = Arc::new(SharedFile {
        identity: identity.clone(),
        state: Mutex::new(state),
    });
    if let Some(id) = identity {
        cx.library().files().add(id, &shared);
    }
    Ok(FileTop::new(shared, name))
}

/// Release the driver of a file that failed to open.
fn abandon(mut state: SharedState) {
    if let Some(mut io) = state.io.take() {
        if state.locked {
            if let Err(e) = io.driver.unlock() {
                warn!(name = %state.name, error = %e, "unlock after failed open");
            }
        }
        if let Err(e) = io.driver.close() {
            warn!(name = %state.name, error = %e, "close after failed open");
        }
    }
}

fn allocator_for(s: &SharedState, eoa: u64) -> Allocator {
    Allocator::new(
        eoa,
        max_addr(s.superblock.offset_size),
        s.fapl.meta_block_size,
        s.fapl.alignment_threshold,
        s.fapl.alignment,
    )
}

/// Lay out a new file: superblock at zero, then an empty root group.
fn initialize(s: &mut SharedState) -> Result<()> {
    if !s.is_writable() {
        return Err(Error::new(
            Category::File,
            ErrorKind::DecodeMalformed,
            format!("{} is empty", s.name),
        ));
    }
    let version = if s.fapl.low_bound >= LibVersion::V110 || s.flags.contains(AccessFlags::SWMR_WRITE) {
        STATUS_FLAGS_VERSION
    } else {
        hdfcore_format::superblock::MIN_VERSION
    };
    s.superblock = Superblock::new(version, s.fcpl.offset_size, s.fcpl.length_size);
    // Rejects unsupported address and length sizes.
    s.superblock.encode()?;
    s.alloc = allocator_for(s, 0);
    let sb_len = Superblock::encoded_len(s.fcpl.offset_size) as u64;
    let at = s.allocate(AllocKind::Meta, sb_len)?;
    if at != 0 {
        return Err(Error::internal(
            Category::File,
            format!("superblock allocated at {at}"),
        ));
    }
    s.superblock.root_address = crate::native::header::create_group(s)?;
    s.sync_superblock()?;
    debug!(name = %s.name, version, "new file initialized");
    Ok(())
}

fn read_superblock(s: &mut SharedState, eof: u64) -> Result<()> {
    let io = s.io.as_mut().ok_or_else(super::no_driver)?;
    io.driver.set_eoa(MemType::Superblock, eof)?;
    let mut prefix = [0u8; Superblock::PREFIX_LEN];
    if eof < prefix.len() as u64 {
        return Err(Error::new(
            Category::File,
            ErrorKind::DecodeMalformed,
            format!("{} is too small to hold a superblock", s.name),
        ));
    }
    io.read(MemType::Superblock, 0, &mut prefix)?;
    let len = Superblock::encoded_len(prefix[Superblock::PREFIX_LEN - 2]);
    if len as u64 > eof {
        return Err(Error::new(
            Category::File,
            ErrorKind::DecodeMalformed,
            format!("{} is too small to hold a superblock", s.name),
        ));
    }
    let mut image = vec![0u8; len];
    io.read(MemType::Superblock, 0, &mut image)?;
    let sb = Superblock::decode(&image)?;
    if eof < sb.eof_address {
        return Err(Error::new(
            Category::File,
            ErrorKind::DecodeMalformed,
            format!(
                "truncated file: eof = {eof}, stored eof = {}",
                sb.eof_address
            ),
        ));
    }
    io.driver.set_eoa(MemType::Superblock, sb.eof_address)?;
    s.fcpl.offset_size = sb.offset_size;
    s.fcpl.length_size = sb.length_size;
    s.superblock = sb;
    s.alloc = allocator_for(s, s.superblock.eof_address);
    s.cache.insert(0, MemType::Superblock, image, false);
    s.cache.pin(0);
    Ok(())
}

/// Check and persist write-access status flags for stores that carry them.
fn stamp(s: &mut SharedState) -> Result<()> {
    if s.superblock.version < STATUS_FLAGS_VERSION || !s.stamp_status {
        return Ok(());
    }
    let stamped = s.superblock.write_stamped();
    match Mode::of(s.flags)? {
        mode @ (Mode::Write | Mode::SwmrWrite) => {
            if stamped {
                return Err(Error::conflict(
                    Category::File,
                    format!(
                        "{} is already open for write (the status flags can be cleared with a recovery tool)",
                        s.name
                    ),
                ));
            }
            s.superblock.status_flags |= STATUS_WRITE_ACCESS;
            if mode == Mode::SwmrWrite {
                s.superblock.status_flags |= STATUS_SWMR_WRITE_ACCESS;
            }
            s.flush_all()
        }
        Mode::SwmrRead => {
            let flags = s.superblock.status_flags;
            if flags & STATUS_WRITE_ACCESS != 0 && flags & STATUS_SWMR_WRITE_ACCESS == 0 {
                return Err(Error::conflict(
                    Category::File,
                    format!("{} is open for write but not for SWMR writing", s.name),
                ));
            }
            Ok(())
        }
        Mode::Read => {
            if stamped {
                return Err(Error::conflict(
                    Category::File,
                    format!("{} is already open for write", s.name),
                ));
            }
            Ok(())
        }
    }
}

/// A new handle on the store behind `top`.
pub(crate) fn reopen(top: &Arc<FileTop>) -> Result<Arc<FileTop>> {
    let shared = top.shared.clone();
    {
        let mut s = shared.state.lock();
        s.ensure_live()?;
        s.nrefs += 1;
        debug!(name = %s.name, nrefs = s.nrefs, "file reopened");
    }
    Ok(FileTop::new(shared, &top.open_name))
}

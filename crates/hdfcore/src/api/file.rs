use std::sync::Arc;

use hdfcore_io::AccessFlags;
use tracing::{debug, info};

use super::LOCATIONS;
use crate::cache::CacheStats;
use crate::error::{Category, Error, ErrorKind, Result};
use crate::errstack::PauseGuard;
use crate::file::{open, FileTop, SearchAttempt};
use crate::ids::{Hid, IdKind};
use crate::library::Library;
use crate::native::path::search_external;
use crate::native::{opcodes, NativeObject};
use crate::plist::{FileAccessProps, FileCreateProps, LinkAccessProps};
use crate::vol::{
    dispatch, CallCtx, ConnectorRef, FileGet, FileGetOut, FileSpecific, FileSpecificOut, GroupSpecific,
    IdObject, ObjTypes, ObjectKind, OptionalArgs, VolObject,
};

fn unexpected() -> Error {
    Error::internal(Category::File, "connector returned an unexpected result")
}

fn le_u64(out: &[u8]) -> Result<u64> {
    out.get(..8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| Error::new(Category::File, ErrorKind::DecodeMalformed, "short optional output"))
}

/// The native file handle behind `obj`, below any pass-through layers.
fn native_top(obj: &IdObject) -> Result<Arc<FileTop>> {
    let terminal = dispatch::terminal(obj);
    match terminal.data.downcast::<NativeObject>() {
        Some(native) => Ok(native.top().clone()),
        None => Err(Error::new(
            Category::File,
            ErrorKind::NotSupported,
            "object is not stored by the native connector",
        )),
    }
}

impl Library {
    fn file_connector(&self, fapl: &FileAccessProps) -> ConnectorRef {
        fapl.connector.clone().unwrap_or_else(|| self.native())
    }

    fn file_get(&self, file: Hid, what: FileGet) -> Result<FileGetOut> {
        self.api(|cx| {
            let obj = self.object(file, &[IdKind::File])?;
            dispatch::file_get(cx, &obj, what)
        })
    }

    fn file_op(&self, file: Hid, opcode: u32) -> Result<Vec<u8>> {
        let mut args = OptionalArgs::new(opcode);
        self.file_optional(file, &mut args)?;
        Ok(args.output)
    }

    /// Create `name`, or open it for truncation with [`AccessFlags::TRUNC`].
    pub fn file_create(
        &self,
        name: &str,
        flags: AccessFlags,
        fcpl: &FileCreateProps,
        fapl: &FileAccessProps,
    ) -> Result<Hid> {
        self.api(|cx| {
            if flags.contains(AccessFlags::TRUNC) && flags.contains(AccessFlags::EXCL) {
                return Err(Error::args(
                    Category::File,
                    "truncate and exclusive cannot both be requested",
                ));
            }
            let conn = self.file_connector(fapl);
            let obj = dispatch::file_create(cx, &conn, name, flags, fcpl, fapl)?;
            info!(name, connector = conn.name(), "file created");
            Ok(self.register(ObjectKind::File, conn, obj))
        })
    }

    /// Open an existing file. When no connector is named in `fapl` and the
    /// native connector cannot open it, each registered connector that
    /// reports the file accessible is tried in registration order.
    pub fn file_open(&self, name: &str, flags: AccessFlags, fapl: &FileAccessProps) -> Result<Hid> {
        self.api(|cx| {
            if flags.intersects(AccessFlags::TRUNC.union(AccessFlags::EXCL).union(AccessFlags::CREATE)) {
                return Err(Error::args(
                    Category::File,
                    "open does not take create, truncate or exclusive flags",
                ));
            }
            let conn = self.file_connector(fapl);
            let first = match dispatch::file_open(cx, &conn, name, flags, fapl) {
                Ok(obj) => return Ok(self.register(ObjectKind::File, conn, obj)),
                Err(e) => e,
            };
            if fapl.connector.is_some() {
                return Err(first);
            }
            match self.open_with_fallback(cx, name, flags, fapl, conn.value())? {
                Some((conn, obj)) => {
                    info!(name, connector = conn.name(), "file opened through fallback connector");
                    Ok(self.register(ObjectKind::File, conn, obj))
                }
                None => Err(first),
            }
        })
    }

    fn open_with_fallback(
        &self,
        cx: &mut CallCtx,
        name: &str,
        flags: AccessFlags,
        fapl: &FileAccessProps,
        tried: u32,
    ) -> Result<Option<(ConnectorRef, VolObject)>> {
        for conn in self.connectors().snapshot() {
            if conn.value() == tried {
                continue;
            }
            let accessible = {
                let _pause = PauseGuard::new();
                dispatch::file_specific(cx, &conn, None, FileSpecific::IsAccessible { name, fapl })
            };
            if !matches!(accessible, Ok(FileSpecificOut::Bool(true))) {
                debug!(name, connector = conn.name(), "connector declined file");
                continue;
            }
            let obj = dispatch::file_open(cx, &conn, name, flags, fapl)?;
            return Ok(Some((conn, obj)));
        }
        Ok(None)
    }

    /// A new identifier for the file behind `file`, sharing its store.
    pub fn file_reopen(&self, file: Hid) -> Result<Hid> {
        self.api(|cx| {
            let obj = self.object(file, &[IdKind::File])?;
            match dispatch::file_specific(cx, &obj.connector, Some(&obj.data), FileSpecific::Reopen)? {
                FileSpecificOut::Object(data) => Ok(self.register(ObjectKind::File, obj.connector, data)),
                _ => Err(unexpected()),
            }
        })
    }

    /// Flush the file `file`, or with `global` every file in its mount
    /// hierarchy.
    pub fn file_flush(&self, file: Hid, global: bool) -> Result<()> {
        self.api(|cx| {
            let obj = self.object(file, &[IdKind::File])?;
            dispatch::file_specific(cx, &obj.connector, Some(&obj.data), FileSpecific::Flush { global })
                .map(|_| ())
        })
    }

    pub fn file_is_accessible(&self, name: &str, fapl: &FileAccessProps) -> Result<bool> {
        self.api(|cx| {
            let conn = self.file_connector(fapl);
            match dispatch::file_specific(cx, &conn, None, FileSpecific::IsAccessible { name, fapl })? {
                FileSpecificOut::Bool(b) => Ok(b),
                _ => Err(unexpected()),
            }
        })
    }

    /// Remove a stored container.
    pub fn file_delete(&self, name: &str, fapl: &FileAccessProps) -> Result<()> {
        self.api(|cx| {
            let conn = self.file_connector(fapl);
            dispatch::file_specific(cx, &conn, None, FileSpecific::Delete { name, fapl }).map(|_| ())
        })
    }

    /// Whether two file identifiers share one store.
    pub fn file_is_equal(&self, a: Hid, b: Hid) -> Result<bool> {
        self.api(|cx| {
            let a = self.object(a, &[IdKind::File])?;
            let b = self.object(b, &[IdKind::File])?;
            if a.connector.value() != b.connector.value() {
                return Ok(false);
            }
            match dispatch::file_specific(cx, &a.connector, Some(&a.data), FileSpecific::IsEqual(&b.data))? {
                FileSpecificOut::Bool(eq) => Ok(eq),
                _ => Err(unexpected()),
            }
        })
    }

    pub fn file_intent(&self, file: Hid) -> Result<AccessFlags> {
        match self.file_get(file, FileGet::Intent)? {
            FileGetOut::Intent(flags) => Ok(flags),
            _ => Err(unexpected()),
        }
    }

    /// Name the file was opened with.
    pub fn file_name(&self, file: Hid) -> Result<String> {
        match self.file_get(file, FileGet::Name)? {
            FileGetOut::Name(name) => Ok(name),
            _ => Err(unexpected()),
        }
    }

    /// Name after symlink resolution.
    pub fn file_actual_name(&self, file: Hid) -> Result<Option<String>> {
        match self.file_get(file, FileGet::ActualName)? {
            FileGetOut::MaybeName(name) => Ok(name),
            _ => Err(unexpected()),
        }
    }

    /// Directory relative external references are resolved against.
    pub fn file_ext_path(&self, file: Hid) -> Result<Option<String>> {
        match self.file_get(file, FileGet::ExtPath)? {
            FileGetOut::MaybeName(path) => Ok(path),
            _ => Err(unexpected()),
        }
    }

    /// Number of open identifiers of `types` in the file's store.
    pub fn file_obj_count(&self, file: Hid, types: ObjTypes) -> Result<usize> {
        match self.file_get(file, FileGet::ObjCount(types))? {
            FileGetOut::Count(n) => Ok(n),
            _ => Err(unexpected()),
        }
    }

    pub fn file_obj_ids(&self, file: Hid, types: ObjTypes, max: Option<usize>) -> Result<Vec<Hid>> {
        match self.file_get(file, FileGet::ObjIds(types, max))? {
            FileGetOut::Ids(ids) => Ok(ids),
            _ => Err(unexpected()),
        }
    }

    pub fn file_create_props(&self, file: Hid) -> Result<FileCreateProps> {
        match self.file_get(file, FileGet::CreateProps)? {
            FileGetOut::CreateProps(p) => Ok(p),
            _ => Err(unexpected()),
        }
    }

    pub fn file_access_props(&self, file: Hid) -> Result<FileAccessProps> {
        match self.file_get(file, FileGet::AccessProps)? {
            FileGetOut::AccessProps(p) => Ok(*p),
            _ => Err(unexpected()),
        }
    }

    pub fn file_optional(&self, file: Hid, args: &mut OptionalArgs) -> Result<()> {
        self.api(|cx| {
            let obj = self.object(file, &[IdKind::File])?;
            dispatch::file_optional(cx, &obj, args)
        })
    }

    /// End of the allocated address space.
    pub fn file_eoa(&self, file: Hid) -> Result<u64> {
        le_u64(&self.file_op(file, opcodes::GET_EOA)?)
    }

    /// Bytes on the free list.
    pub fn file_free_space(&self, file: Hid) -> Result<u64> {
        le_u64(&self.file_op(file, opcodes::GET_FREE_SPACE)?)
    }

    /// Histogram of metadata read retries, one bin per decimal order.
    pub fn file_read_retries(&self, file: Hid) -> Result<Vec<u32>> {
        let out = self.file_op(file, opcodes::GET_RETRIES)?;
        let mut words = out
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]));
        let count = words.next().unwrap_or(0) as usize;
        let bins: Vec<u32> = words.take(count).collect();
        if bins.len() != count {
            return Err(Error::new(
                Category::File,
                ErrorKind::DecodeMalformed,
                "short retries histogram",
            ));
        }
        Ok(bins)
    }

    /// Metadata cache counters of the store behind a native file.
    pub fn file_cache_stats(&self, file: Hid) -> Result<CacheStats> {
        self.api(|_| {
            let obj = self.object(file, &[IdKind::File])?;
            native_top(&obj)?.with_shared(|s| Ok(s.cache.stats()))
        })
    }

    /// Switch a writer to single-writer/multiple-reader mode without
    /// closing it.
    pub fn file_start_swmr_write(&self, file: Hid) -> Result<()> {
        self.file_op(file, opcodes::START_SWMR_WRITE).map(|_| ())
    }

    /// Close every unused file in the external file cache.
    pub fn file_clear_external_cache(&self, file: Hid) -> Result<()> {
        self.file_op(file, opcodes::CLEAR_EFC).map(|_| ())
    }

    /// Graft `child` onto the group `name` below `loc`.
    pub fn file_mount(&self, loc: Hid, name: &str, child: Hid) -> Result<()> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            let child = self.object(child, &[IdKind::File])?;
            dispatch::group_mount(cx, &loc, name, &child)
        })
    }

    pub fn file_unmount(&self, loc: Hid, name: &str) -> Result<()> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            dispatch::group_specific(cx, &loc, GroupSpecific::Unmount { name })
        })
    }

    /// Open a file referenced from `parent` by `name`, searching the same
    /// places an external link would. Returns the new identifier and every
    /// candidate tried. With `try_open`, a file that cannot be found yields
    /// `None` instead of an error.
    pub fn file_open_external(
        &self,
        parent: Hid,
        name: &str,
        lapl: &LinkAccessProps,
        try_open: bool,
    ) -> Result<(Option<Hid>, Vec<SearchAttempt>)> {
        self.api(|cx| {
            let parent = self.object(parent, LOCATIONS)?;
            let top = native_top(&parent)?;
            let (found, attempts) = search_external(cx, &top, name, lapl)?;
            let ext = match found {
                Ok(ext) => ext,
                Err(e) if try_open && e.is(ErrorKind::NotFound) => {
                    debug!(name, tried = attempts.len(), "external file not found");
                    return Ok((None, attempts));
                }
                Err(e) => return Err(e),
            };
            let reopened = open::reopen(&ext.top);
            ext.finish(cx)?;
            let top = reopened?;
            top.state.lock().id_exists = true;
            let data = dispatch::wrap_as(&parent, ObjectKind::File, VolObject::new(NativeObject::File(top)))?;
            Ok((Some(self.register(ObjectKind::File, parent.connector, data)), attempts))
        })
    }
}

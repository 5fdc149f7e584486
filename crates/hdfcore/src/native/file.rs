use std::sync::Arc;

use hdfcore_format::signature::{is_signature, SIGNATURE};
use hdfcore_io::{AccessFlags, DriverError, MemType};
use tracing::debug;

use super::{file_top, native, opcodes, NativeConnector, NativeObject};
use crate::error::{Category, Error, ErrorKind, Result};
use crate::file::{accounting, close, efc, open, swmr, FileTop};
use crate::plist::{FileAccessProps, FileCreateProps};
use crate::vol::{
    CallCtx, FileClass, FileGet, FileGetOut, FileSpecific, FileSpecificOut, OptionalArgs,
    VolObject,
};

fn handle(top: Arc<FileTop>) -> VolObject {
    top.state.lock().id_exists = true;
    VolObject::new(NativeObject::File(top))
}

fn file_of(obj: &VolObject) -> Result<Arc<FileTop>> {
    match &*native(obj, Category::File)? {
        NativeObject::File(top) => Ok(top.clone()),
        _ => Err(Error::args(Category::File, "not a file")),
    }
}

/// Every handle in the mount hierarchy below `top`, including `top`.
fn hierarchy(top: &Arc<FileTop>) -> Vec<Arc<FileTop>> {
    let mut out = vec![top.clone()];
    let mut i = 0;
    while i < out.len() {
        let children: Vec<Arc<FileTop>> = out[i]
            .state
            .lock()
            .mounts
            .iter()
            .map(|m| m.child.clone())
            .collect();
        out.extend(children);
        i += 1;
    }
    out
}

/// Whether `name` holds a container the driver can open.
fn is_accessible(name: &str, fapl: &FileAccessProps) -> Result<bool> {
    let mut driver = match fapl.driver.open(name, AccessFlags::RDONLY, u64::MAX - 1) {
        Ok(d) => d,
        Err(DriverError::NotFound(_)) => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    let eof = driver.eof(MemType::Superblock);
    let mut sig = [0u8; SIGNATURE.len()];
    let found = if eof >= sig.len() as u64 {
        driver.set_eoa(MemType::Superblock, eof)?;
        driver.read(MemType::Superblock, 0, &mut sig)?;
        is_signature(&sig)
    } else {
        false
    };
    driver.close()?;
    Ok(found)
}

impl FileClass for NativeConnector {
    fn create(
        &self,
        cx: &mut CallCtx,
        name: &str,
        flags: AccessFlags,
        fcpl: &FileCreateProps,
        fapl: &FileAccessProps,
    ) -> Result<VolObject> {
        let flags = flags | AccessFlags::RDWR | AccessFlags::CREATE;
        let top = open::open_file(cx, name, flags, fcpl, fapl)?;
        Ok(handle(top))
    }

    fn open(
        &self,
        cx: &mut CallCtx,
        name: &str,
        flags: AccessFlags,
        fapl: &FileAccessProps,
    ) -> Result<VolObject> {
        let top = open::open_file(
            cx,
            name,
            flags.tentative(),
            &FileCreateProps::default(),
            fapl,
        )?;
        Ok(handle(top))
    }

    fn get(&self, cx: &mut CallCtx, obj: &VolObject, what: FileGet) -> Result<FileGetOut> {
        let top = file_top(obj, Category::File)?;
        let out = match what {
            FileGet::Intent => {
                FileGetOut::Intent(top.with_shared(|s| Ok(s.flags.tentative()))?)
            }
            FileGet::Name => FileGetOut::Name(top.open_name.clone()),
            FileGet::ActualName => {
                FileGetOut::MaybeName(Some(top.with_shared(|s| Ok(s.actual_name.clone()))?))
            }
            FileGet::ExtPath => FileGetOut::MaybeName(top.with_shared(|s| {
                Ok(s.extpath.as_ref().map(|p| p.to_string_lossy().into_owned()))
            })?),
            FileGet::ObjCount(types) => {
                FileGetOut::Count(accounting::open_count(cx.library(), &top, types))
            }
            FileGet::ObjIds(types, max) => {
                FileGetOut::Ids(accounting::open_ids(cx.library(), &top, types, max))
            }
            FileGet::CreateProps => FileGetOut::CreateProps(top.with_shared(|s| Ok(s.fcpl.clone()))?),
            FileGet::AccessProps => {
                FileGetOut::AccessProps(Box::new(top.with_shared(|s| Ok(s.fapl.clone()))?))
            }
        };
        Ok(out)
    }

    fn specific(
        &self,
        _cx: &mut CallCtx,
        obj: Option<&VolObject>,
        op: FileSpecific<'_>,
    ) -> Result<FileSpecificOut> {
        let need = || {
            obj.ok_or_else(|| Error::args(Category::File, "operation needs an open file"))
                .and_then(file_of)
        };
        match op {
            FileSpecific::Flush { global } => {
                let top = need()?;
                let tops = if global {
                    hierarchy(&top.topmost())
                } else {
                    vec![top]
                };
                for t in tops {
                    t.with_shared(|s| s.flush_all())?;
                }
                Ok(FileSpecificOut::Done)
            }
            FileSpecific::Reopen => {
                let top = need()?;
                Ok(FileSpecificOut::Object(handle(open::reopen(&top)?)))
            }
            FileSpecific::IsAccessible { name, fapl } => {
                Ok(FileSpecificOut::Bool(is_accessible(name, fapl)?))
            }
            FileSpecific::Delete { name, fapl } => {
                if !is_accessible(name, fapl)? {
                    return Err(Error::not_found(
                        Category::File,
                        format!("{name} is not an accessible container"),
                    ));
                }
                fapl.driver.delete(name)?;
                debug!(name, "file deleted");
                Ok(FileSpecificOut::Done)
            }
            FileSpecific::IsEqual(other) => {
                let a = need()?;
                let b = file_of(other)?;
                Ok(FileSpecificOut::Bool(Arc::ptr_eq(&a.shared, &b.shared)))
            }
        }
    }

    fn optional(&self, cx: &mut CallCtx, obj: &VolObject, args: &mut OptionalArgs) -> Result<()> {
        let top = file_of(obj)?;
        match args.opcode {
            opcodes::GET_EOA => {
                let eoa = top.with_shared(|s| Ok(s.alloc.eoa()))?;
                args.output = eoa.to_le_bytes().to_vec();
            }
            opcodes::GET_FREE_SPACE => {
                let free = top.with_shared(|s| Ok(s.alloc.free_space()))?;
                args.output = free.to_le_bytes().to_vec();
            }
            opcodes::GET_RETRIES => {
                let bins = top.with_shared(|s| Ok(s.retries.bins().to_vec()))?;
                let mut out = (bins.len() as u32).to_le_bytes().to_vec();
                for b in bins {
                    out.extend_from_slice(&b.to_le_bytes());
                }
                args.output = out;
            }
            opcodes::START_SWMR_WRITE => swmr::start_swmr_write(cx, &top)?,
            opcodes::CLEAR_EFC => efc::clear(cx, &top.shared)?,
            other => {
                return Err(Error::new(
                    Category::File,
                    ErrorKind::NotSupported,
                    format!("unknown file optional operation {other}"),
                ))
            }
        }
        Ok(())
    }

    fn close(&self, cx: &mut CallCtx, obj: &VolObject) -> Result<()> {
        let top = file_of(obj)?;
        close::close_handle(cx, &top)
    }
}

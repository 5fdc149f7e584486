//! Datasets with contiguous storage. Raw data is read and written as a
//! whole; the memory type must match the stored type.

use hdfcore_format::{Datatype, UNDEFINED_ADDR};
use tracing::{debug, warn};

use super::header::{self, HeaderKind, Layout, Message};
use super::{
    flush_object, insert_new, location, object_loc, open_named, opened, path, refresh_object,
    release, NativeConnector, NativeObject,
};
use super::request::complete;
use crate::dataspace::Dataspace;
use crate::error::{Category, Error, ErrorKind, Result};
use crate::file::alloc::AllocKind;
use crate::file::{ObjectLoc, SharedState};
use crate::plist::{DatasetAccessProps, DatasetCreateProps};
use crate::vol::{CallCtx, DatasetClass, DatasetGet, DatasetGetOut, DatasetSpecific, VolObject};

fn storage_bytes(dtype: &Datatype, space: &Dataspace) -> Result<u64> {
    space
        .npoints()?
        .checked_mul(dtype.size as u64)
        .ok_or_else(|| Error::new(Category::Dataset, ErrorKind::Overflow, "dataset too large"))
}

/// Allocate zero-filled storage of `bytes`.
fn allocate_storage(s: &mut SharedState, bytes: u64) -> Result<Layout> {
    if bytes == 0 {
        return Ok(Layout {
            addr: UNDEFINED_ADDR,
            size: 0,
        });
    }
    let len = usize::try_from(bytes)
        .map_err(|_| Error::new(Category::Dataset, ErrorKind::Overflow, "dataset too large"))?;
    let addr = s.allocate(AllocKind::Raw, bytes)?;
    s.raw_write(addr, &vec![0u8; len])?;
    Ok(Layout { addr, size: bytes })
}

/// Copy the elements inside both extents from `old` to `new`, both in
/// row-major order.
fn copy_overlap(old: &[u8], old_dims: &[u64], new: &mut [u8], new_dims: &[u64], elem: usize) {
    let rank = old_dims.len();
    if rank == 0 {
        new[..elem].copy_from_slice(&old[..elem]);
        return;
    }
    let common: Vec<u64> = old_dims.iter().zip(new_dims).map(|(a, b)| *a.min(b)).collect();
    if common.iter().any(|&c| c == 0) {
        return;
    }
    let row = common[rank - 1] as usize * elem;
    let mut idx = vec![0u64; rank - 1];
    let offset = |idx: &[u64], dims: &[u64]| -> usize {
        let lead = idx.iter().zip(dims).fold(0u64, |o, (i, d)| o * d + i);
        (lead * dims[rank - 1]) as usize * elem
    };
    loop {
        let (from, to) = (offset(&idx, old_dims), offset(&idx, new_dims));
        new[to..to + row].copy_from_slice(&old[from..from + row]);
        let mut axis = idx.len();
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            idx[axis] += 1;
            if idx[axis] < common[axis] {
                break;
            }
            idx[axis] = 0;
        }
    }
}

struct Stored {
    dtype: Datatype,
    space: Dataspace,
    layout: Layout,
}

fn stored(s: &mut SharedState, addr: u64) -> Result<Stored> {
    let hdr = header::load(s, addr)?;
    let missing = |what: &str| {
        Error::new(
            Category::Dataset,
            ErrorKind::DecodeMalformed,
            format!("dataset at {addr} has no {what}"),
        )
    };
    Ok(Stored {
        dtype: hdr.datatype().cloned().ok_or_else(|| missing("datatype"))?,
        space: hdr.dataspace().cloned().ok_or_else(|| missing("dataspace"))?,
        layout: hdr.layout().ok_or_else(|| missing("layout"))?,
    })
}

fn check_transfer(d: &Stored, mem_type: &Datatype, len: usize) -> Result<()> {
    if !mem_type.equivalent(&d.dtype) {
        return Err(Error::new(
            Category::Dataset,
            ErrorKind::NotSupported,
            "memory type differs from the stored type; conversion is not supported",
        ));
    }
    if len as u64 != d.layout.size {
        return Err(Error::args(
            Category::Dataset,
            format!("buffer holds {len} bytes, dataset holds {}", d.layout.size),
        ));
    }
    Ok(())
}

fn set_extent(s: &mut SharedState, addr: u64, dims: &[u64]) -> Result<()> {
    s.require_writable()?;
    let d = stored(s, addr)?;
    let mut space = d.space.clone();
    space.set_extent(dims)?;
    let bytes = storage_bytes(&d.dtype, &space)?;
    if bytes == d.layout.size {
        let mut hdr = header::load(s, addr)?;
        hdr.set(Message::Dataspace(space));
        return header::store(s, addr, &mut hdr);
    }
    let mut old = vec![0u8; d.layout.size as usize];
    if d.layout.size > 0 {
        s.raw_read(d.layout.addr, &mut old)?;
    }
    let layout = allocate_storage(s, bytes)?;
    let mut new = vec![0u8; bytes as usize];
    if d.layout.size > 0 && bytes > 0 {
        copy_overlap(&old, d.space.dims(), &mut new, space.dims(), d.dtype.size as usize);
        s.raw_write(layout.addr, &new)?;
    }
    if d.layout.size > 0 {
        s.free(d.layout.addr, d.layout.size)?;
    }
    let mut hdr = header::load(s, addr)?;
    hdr.set(Message::Dataspace(space));
    hdr.set(Message::Layout(layout));
    header::store(s, addr, &mut hdr)?;
    debug!(addr, ?dims, bytes, "dataset extent changed");
    Ok(())
}

impl DatasetClass for NativeConnector {
    fn create(
        &self,
        cx: &mut CallCtx,
        loc: &VolObject,
        name: &str,
        dtype: &Datatype,
        space: &Dataspace,
        dcpl: &DatasetCreateProps,
    ) -> Result<VolObject> {
        let start = location(loc, Category::Dataset)?;
        let space = match &dcpl.max_dims {
            Some(max) => Dataspace::with_max(space.dims(), max)?,
            None => space.clone(),
        };
        let bytes = storage_bytes(dtype, &space)?;
        let lapl = Default::default();
        let new = path::with_parent(cx, &start, name, &lapl, |parent, last| {
            let relaxed = parent.top.with_shared(|s| Ok(s.fapl.relaxed_integrity))?;
            dtype.validate(relaxed)?;
            let layout = parent.top.with_shared(|s| allocate_storage(s, bytes))?;
            let messages = vec![
                Message::Datatype(dtype.clone()),
                Message::Dataspace(space.clone()),
                Message::Layout(layout),
            ];
            let result = insert_new(parent, last, HeaderKind::Dataset, messages);
            if result.is_err() && layout.size > 0 {
                if let Err(e) = parent.top.with_shared(|s| s.free(layout.addr, layout.size)) {
                    warn!(error = %e, "releasing storage of a failed dataset create");
                }
            }
            result
        })?;
        debug!(name, addr = new.addr, bytes, "dataset created");
        let obj = opened(new, NativeObject::Dataset)?;
        complete(cx);
        Ok(obj)
    }

    fn open(
        &self,
        cx: &mut CallCtx,
        loc: &VolObject,
        name: &str,
        _dapl: &DatasetAccessProps,
    ) -> Result<VolObject> {
        open_named(cx, loc, name, HeaderKind::Dataset, Category::Dataset, NativeObject::Dataset)
    }

    fn read(
        &self,
        cx: &mut CallCtx,
        dsets: &[VolObject],
        mem_types: &[Datatype],
        bufs: &mut [&mut [u8]],
    ) -> Result<()> {
        for ((dset, mem_type), buf) in dsets.iter().zip(mem_types).zip(bufs.iter_mut()) {
            let loc = object_loc(dset, Category::Dataset)?;
            loc.top.with_shared(|s| {
                let d = stored(s, loc.addr)?;
                check_transfer(&d, mem_type, buf.len())?;
                if d.layout.size > 0 {
                    s.raw_read(d.layout.addr, &mut buf[..])?;
                }
                Ok(())
            })?;
        }
        complete(cx);
        Ok(())
    }

    fn write(
        &self,
        cx: &mut CallCtx,
        dsets: &[VolObject],
        mem_types: &[Datatype],
        bufs: &[&[u8]],
    ) -> Result<()> {
        for ((dset, mem_type), buf) in dsets.iter().zip(mem_types).zip(bufs) {
            let loc = object_loc(dset, Category::Dataset)?;
            loc.top.with_shared(|s| {
                s.require_writable()?;
                let d = stored(s, loc.addr)?;
                check_transfer(&d, mem_type, buf.len())?;
                if d.layout.size > 0 {
                    s.raw_write(d.layout.addr, buf)?;
                }
                Ok(())
            })?;
        }
        complete(cx);
        Ok(())
    }

    fn get(&self, _cx: &mut CallCtx, obj: &VolObject, what: DatasetGet) -> Result<DatasetGetOut> {
        let loc = object_loc(obj, Category::Dataset)?;
        let d = loc.top.with_shared(|s| stored(s, loc.addr))?;
        Ok(match what {
            DatasetGet::Space => DatasetGetOut::Space(d.space),
            DatasetGet::Type => DatasetGetOut::Type(d.dtype),
            DatasetGet::CreateProps => DatasetGetOut::CreateProps(DatasetCreateProps {
                max_dims: (d.space.max_dims() != d.space.dims()).then(|| d.space.max_dims().to_vec()),
            }),
            DatasetGet::StorageSize => DatasetGetOut::StorageSize(d.layout.size),
        })
    }

    fn specific(&self, _cx: &mut CallCtx, obj: &VolObject, op: DatasetSpecific<'_>) -> Result<()> {
        let loc: ObjectLoc = object_loc(obj, Category::Dataset)?;
        match op {
            DatasetSpecific::SetExtent(dims) => loc.top.with_shared(|s| set_extent(s, loc.addr, dims)),
            DatasetSpecific::Flush => flush_object(&loc),
            DatasetSpecific::Refresh => refresh_object(&loc),
        }
    }

    fn close(&self, cx: &mut CallCtx, obj: &VolObject) -> Result<()> {
        let loc = object_loc(obj, Category::Dataset)?;
        release(cx, &loc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_keeps_rows_in_place() {
        // 2x3 grown to 3x4: each old row lands at the start of a new row.
        let old: Vec<u8> = (1..=6).collect();
        let mut new = vec![0u8; 12];
        copy_overlap(&old, &[2, 3], &mut new, &[3, 4], 1);
        assert_eq!(new, vec![1, 2, 3, 0, 4, 5, 6, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn overlap_shrinks() {
        let old: Vec<u8> = (0..8).collect();
        let mut new = vec![0u8; 4];
        copy_overlap(&old, &[4], &mut new, &[2], 2);
        assert_eq!(new, vec![0, 1, 2, 3]);
    }

    #[test]
    fn overlap_of_scalar() {
        let mut new = vec![0u8; 4];
        copy_overlap(&[9, 8, 7, 6], &[], &mut new, &[], 4);
        assert_eq!(new, vec![9, 8, 7, 6]);
    }
}

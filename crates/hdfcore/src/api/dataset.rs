use hdfcore_format::Datatype;

use crate::dataspace::Dataspace;
use crate::error::{Category, Error, Result};
use crate::ids::{Hid, IdKind};
use crate::library::Library;
use crate::plist::{DatasetAccessProps, DatasetCreateProps, TransferProps};
use crate::vol::{
    dispatch, DatasetGet, DatasetGetOut, DatasetSpecific, IdObject, ObjectKind, OptionalArgs,
};

fn unexpected() -> Error {
    Error::internal(Category::Dataset, "connector returned an unexpected result")
}

impl Library {
    fn datasets(&self, dsets: &[Hid]) -> Result<Vec<IdObject>> {
        dsets
            .iter()
            .map(|&d| self.object(d, &[IdKind::Dataset]))
            .collect()
    }

    fn dataset_get(&self, dset: Hid, what: DatasetGet) -> Result<DatasetGetOut> {
        self.api(|cx| {
            let dset = self.object(dset, &[IdKind::Dataset])?;
            dispatch::dataset_get(cx, &dset, what)
        })
    }

    pub fn dataset_create(
        &self,
        loc: Hid,
        name: &str,
        dtype: &Datatype,
        space: &Dataspace,
        dcpl: &DatasetCreateProps,
    ) -> Result<Hid> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            let obj = dispatch::dataset_create(cx, &loc, name, dtype, space, dcpl)?;
            Ok(self.register(ObjectKind::Dataset, loc.connector, obj))
        })
    }

    pub fn dataset_open(&self, loc: Hid, name: &str, dapl: &DatasetAccessProps) -> Result<Hid> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            let mut dapl = dapl.clone();
            if dapl.vds_prefix.is_none() {
                dapl.vds_prefix = self.config().vds_prefix.clone();
            }
            let obj = dispatch::dataset_open(cx, &loc, name, &dapl)?;
            Ok(self.register(ObjectKind::Dataset, loc.connector, obj))
        })
    }

    /// Read the whole of `dset` into `buf`, laid out as `mem_type`.
    pub fn dataset_read(&self, dset: Hid, mem_type: &Datatype, buf: &mut [u8]) -> Result<()> {
        self.dataset_read_multi(&[dset], std::slice::from_ref(mem_type), &mut [buf], &TransferProps::default())
    }

    /// Read several datasets of one connector in a single call.
    pub fn dataset_read_multi(
        &self,
        dsets: &[Hid],
        mem_types: &[Datatype],
        bufs: &mut [&mut [u8]],
        dxpl: &TransferProps,
    ) -> Result<()> {
        self.api_with(dxpl.clone(), |cx| {
            let dsets = self.datasets(dsets)?;
            dispatch::dataset_read(cx, &dsets, mem_types, bufs)
        })
    }

    /// Read `dset`, also returning the request token the connector hands
    /// back, if any.
    pub fn dataset_read_async(
        &self,
        dset: Hid,
        mem_type: &Datatype,
        buf: &mut [u8],
    ) -> Result<Option<Hid>> {
        self.api(|cx| {
            let dsets = self.datasets(&[dset])?;
            let owner = dsets[0].connector.clone();
            let ((), req) = self.with_request(cx, &owner, |cx| {
                dispatch::dataset_read(cx, &dsets, std::slice::from_ref(mem_type), &mut [buf])
            })?;
            Ok(req)
        })
    }

    pub fn dataset_write(&self, dset: Hid, mem_type: &Datatype, buf: &[u8]) -> Result<()> {
        self.dataset_write_multi(&[dset], std::slice::from_ref(mem_type), &[buf], &TransferProps::default())
    }

    pub fn dataset_write_multi(
        &self,
        dsets: &[Hid],
        mem_types: &[Datatype],
        bufs: &[&[u8]],
        dxpl: &TransferProps,
    ) -> Result<()> {
        self.api_with(dxpl.clone(), |cx| {
            let dsets = self.datasets(dsets)?;
            dispatch::dataset_write(cx, &dsets, mem_types, bufs)
        })
    }

    pub fn dataset_write_async(&self, dset: Hid, mem_type: &Datatype, buf: &[u8]) -> Result<Option<Hid>> {
        self.api(|cx| {
            let dsets = self.datasets(&[dset])?;
            let owner = dsets[0].connector.clone();
            let ((), req) = self.with_request(cx, &owner, |cx| {
                dispatch::dataset_write(cx, &dsets, std::slice::from_ref(mem_type), &[buf])
            })?;
            Ok(req)
        })
    }

    pub fn dataset_space(&self, dset: Hid) -> Result<Dataspace> {
        match self.dataset_get(dset, DatasetGet::Space)? {
            DatasetGetOut::Space(space) => Ok(space),
            _ => Err(unexpected()),
        }
    }

    pub fn dataset_type(&self, dset: Hid) -> Result<Datatype> {
        match self.dataset_get(dset, DatasetGet::Type)? {
            DatasetGetOut::Type(dtype) => Ok(dtype),
            _ => Err(unexpected()),
        }
    }

    pub fn dataset_create_props(&self, dset: Hid) -> Result<DatasetCreateProps> {
        match self.dataset_get(dset, DatasetGet::CreateProps)? {
            DatasetGetOut::CreateProps(dcpl) => Ok(dcpl),
            _ => Err(unexpected()),
        }
    }

    /// Bytes of raw data storage allocated to the dataset.
    pub fn dataset_storage_size(&self, dset: Hid) -> Result<u64> {
        match self.dataset_get(dset, DatasetGet::StorageSize)? {
            DatasetGetOut::StorageSize(n) => Ok(n),
            _ => Err(unexpected()),
        }
    }

    /// Change the current dimensions, within the maximum dimensions.
    /// Elements inside both the old and the new extent keep their values.
    pub fn dataset_set_extent(&self, dset: Hid, dims: &[u64]) -> Result<()> {
        self.dataset_specific(dset, DatasetSpecific::SetExtent(dims))
    }

    pub fn dataset_flush(&self, dset: Hid) -> Result<()> {
        self.dataset_specific(dset, DatasetSpecific::Flush)
    }

    pub fn dataset_refresh(&self, dset: Hid) -> Result<()> {
        self.dataset_specific(dset, DatasetSpecific::Refresh)
    }

    fn dataset_specific(&self, dset: Hid, op: DatasetSpecific<'_>) -> Result<()> {
        self.api(|cx| {
            let dset = self.object(dset, &[IdKind::Dataset])?;
            dispatch::dataset_specific(cx, &dset, op)
        })
    }

    pub fn dataset_optional(&self, dset: Hid, args: &mut OptionalArgs) -> Result<()> {
        self.api(|cx| {
            let dset = self.object(dset, &[IdKind::Dataset])?;
            dispatch::dataset_optional(cx, &dset, args)
        })
    }
}

use crate::error::{Category, Error, Result};
use crate::ids::{Hid, IdKind};
use crate::library::Library;
use crate::vol::{dispatch, BlobId, BlobSpecific, BlobSpecificOut, OptionalArgs};

fn unexpected() -> Error {
    Error::internal(Category::Blob, "connector returned an unexpected result")
}

impl Library {
    fn blob_specific(&self, file: Hid, op: BlobSpecific<'_>) -> Result<BlobSpecificOut> {
        self.api(|cx| {
            let file = self.object(file, &[IdKind::File])?;
            dispatch::blob_specific(cx, &file, op)
        })
    }

    /// Store `data` as a blob in `file`. An empty slice yields the null id.
    pub fn blob_put(&self, file: Hid, data: &[u8]) -> Result<BlobId> {
        self.api(|cx| {
            let file = self.object(file, &[IdKind::File])?;
            dispatch::blob_put(cx, &file, data)
        })
    }

    pub fn blob_get(&self, file: Hid, id: &BlobId) -> Result<Vec<u8>> {
        self.api(|cx| {
            let file = self.object(file, &[IdKind::File])?;
            dispatch::blob_get(cx, &file, id)
        })
    }

    pub fn blob_size(&self, file: Hid, id: &BlobId) -> Result<u64> {
        match self.blob_specific(file, BlobSpecific::Size(id))? {
            BlobSpecificOut::Size(n) => Ok(n),
            _ => Err(unexpected()),
        }
    }

    pub fn blob_is_null(&self, file: Hid, id: &BlobId) -> Result<bool> {
        match self.blob_specific(file, BlobSpecific::IsNull(id))? {
            BlobSpecificOut::Bool(b) => Ok(b),
            _ => Err(unexpected()),
        }
    }

    pub fn blob_delete(&self, file: Hid, id: &BlobId) -> Result<()> {
        self.blob_specific(file, BlobSpecific::Delete(id)).map(|_| ())
    }

    pub fn blob_optional(&self, file: Hid, args: &mut OptionalArgs) -> Result<()> {
        self.api(|cx| {
            let file = self.object(file, &[IdKind::File])?;
            dispatch::blob_optional(cx, &file, args)
        })
    }
}

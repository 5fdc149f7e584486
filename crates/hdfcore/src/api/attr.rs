use hdfcore_format::Datatype;

use super::ATTR_HOLDERS;
use crate::dataspace::Dataspace;
use crate::error::{Category, Error, Result};
use crate::ids::{Hid, IdKind};
use crate::library::Library;
use crate::vol::{
    dispatch, AttrGet, AttrGetOut, AttrSpecific, AttrSpecificOut, ObjectKind, OptionalArgs,
};

fn unexpected() -> Error {
    Error::internal(Category::Attribute, "connector returned an unexpected result")
}

impl Library {
    fn attr_get(&self, attr: Hid, what: AttrGet) -> Result<AttrGetOut> {
        self.api(|cx| {
            let attr = self.object(attr, &[IdKind::Attr])?;
            dispatch::attr_get(cx, &attr, what)
        })
    }

    fn attr_specific(&self, obj: Hid, op: AttrSpecific<'_>) -> Result<AttrSpecificOut> {
        self.api(|cx| {
            let obj = self.object(obj, ATTR_HOLDERS)?;
            dispatch::attr_specific(cx, &obj, op)
        })
    }

    /// Attach a zero-filled attribute `name` to `obj`.
    pub fn attr_create(&self, obj: Hid, name: &str, dtype: &Datatype, space: &Dataspace) -> Result<Hid> {
        self.api(|cx| {
            let obj = self.object(obj, ATTR_HOLDERS)?;
            let attr = dispatch::attr_create(cx, &obj, name, dtype, space)?;
            Ok(self.register(ObjectKind::Attr, obj.connector, attr))
        })
    }

    pub fn attr_open(&self, obj: Hid, name: &str) -> Result<Hid> {
        self.api(|cx| {
            let obj = self.object(obj, ATTR_HOLDERS)?;
            let attr = dispatch::attr_open(cx, &obj, name)?;
            Ok(self.register(ObjectKind::Attr, obj.connector, attr))
        })
    }

    pub fn attr_read(&self, attr: Hid, mem_type: &Datatype, buf: &mut [u8]) -> Result<()> {
        self.api(|cx| {
            let attr = self.object(attr, &[IdKind::Attr])?;
            dispatch::attr_read(cx, &attr, mem_type, buf)
        })
    }

    pub fn attr_write(&self, attr: Hid, mem_type: &Datatype, buf: &[u8]) -> Result<()> {
        self.api(|cx| {
            let attr = self.object(attr, &[IdKind::Attr])?;
            dispatch::attr_write(cx, &attr, mem_type, buf)
        })
    }

    pub fn attr_space(&self, attr: Hid) -> Result<Dataspace> {
        match self.attr_get(attr, AttrGet::Space)? {
            AttrGetOut::Space(space) => Ok(space),
            _ => Err(unexpected()),
        }
    }

    pub fn attr_type(&self, attr: Hid) -> Result<Datatype> {
        match self.attr_get(attr, AttrGet::Type)? {
            AttrGetOut::Type(dtype) => Ok(dtype),
            _ => Err(unexpected()),
        }
    }

    pub fn attr_name(&self, attr: Hid) -> Result<String> {
        match self.attr_get(attr, AttrGet::Name)? {
            AttrGetOut::Name(name) => Ok(name),
            _ => Err(unexpected()),
        }
    }

    pub fn attr_exists(&self, obj: Hid, name: &str) -> Result<bool> {
        match self.attr_specific(obj, AttrSpecific::Exists(name))? {
            AttrSpecificOut::Bool(b) => Ok(b),
            _ => Err(unexpected()),
        }
    }

    pub fn attr_delete(&self, obj: Hid, name: &str) -> Result<()> {
        self.attr_specific(obj, AttrSpecific::Delete(name)).map(|_| ())
    }

    pub fn attr_rename(&self, obj: Hid, from: &str, to: &str) -> Result<()> {
        self.attr_specific(obj, AttrSpecific::Rename { from, to }).map(|_| ())
    }

    /// Names of the attributes on `obj`, in creation order.
    pub fn attr_names(&self, obj: Hid) -> Result<Vec<String>> {
        match self.attr_specific(obj, AttrSpecific::Names)? {
            AttrSpecificOut::Names(names) => Ok(names),
            _ => Err(unexpected()),
        }
    }

    pub fn attr_optional(&self, obj: Hid, args: &mut OptionalArgs) -> Result<()> {
        self.api(|cx| {
            let obj = self.object(obj, &[IdKind::Attr])?;
            dispatch::attr_optional(cx, &obj, args)
        })
    }
}

use crate::error::{Category, Error, Result};
use crate::errstack::CallbackGuard;
use crate::ids::Hid;
use crate::library::Library;
use crate::vol::{
    dispatch, ObjectGet, ObjectGetOut, ObjectKind, ObjectLocator, ObjectSpecific,
    ObjectSpecificOut, ObjectToken, OptionalArgs,
};

fn unexpected() -> Error {
    Error::internal(Category::Object, "connector returned an unexpected result")
}

impl Library {
    fn object_get(&self, loc: Hid, what: ObjectGet<'_>) -> Result<ObjectGetOut> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            dispatch::object_get(cx, &loc, what)
        })
    }

    fn object_open_at(&self, loc: Hid, at: ObjectLocator<'_>) -> Result<Hid> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            let (obj, kind) = dispatch::object_open(cx, &loc, at)?;
            Ok(self.register(kind, loc.connector, obj))
        })
    }

    /// Open whatever object `name` refers to. The identifier's kind follows
    /// the object's kind.
    pub fn object_open(&self, loc: Hid, name: &str) -> Result<Hid> {
        self.object_open_at(loc, ObjectLocator::ByName(name))
    }

    pub fn object_open_by_token(&self, loc: Hid, token: ObjectToken) -> Result<Hid> {
        self.object_open_at(loc, ObjectLocator::ByToken(token))
    }

    /// Copy the object `src_name` and everything below it to `dst/dst_name`.
    pub fn object_copy(&self, src: Hid, src_name: &str, dst: Hid, dst_name: &str) -> Result<()> {
        self.api(|cx| {
            let src = self.location(src)?;
            let dst = self.location(dst)?;
            dispatch::object_copy(cx, &src, src_name, &dst, dst_name)
        })
    }

    pub fn object_token(&self, loc: Hid, name: &str) -> Result<ObjectToken> {
        match self.object_get(loc, ObjectGet::Token(name))? {
            ObjectGetOut::Token(t) => Ok(t),
            _ => Err(unexpected()),
        }
    }

    pub fn object_kind(&self, loc: Hid, name: &str) -> Result<ObjectKind> {
        match self.object_get(loc, ObjectGet::Kind(name))? {
            ObjectGetOut::Kind(k) => Ok(k),
            _ => Err(unexpected()),
        }
    }

    /// Name of the file holding `obj`.
    pub fn object_file_name(&self, obj: Hid) -> Result<String> {
        match self.object_get(obj, ObjectGet::FileName)? {
            ObjectGetOut::Name(n) => Ok(n),
            _ => Err(unexpected()),
        }
    }

    pub fn object_exists(&self, loc: Hid, name: &str) -> Result<bool> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            match dispatch::object_specific(cx, &loc, ObjectSpecific::Exists(name))? {
                ObjectSpecificOut::Bool(b) => Ok(b),
                _ => Err(unexpected()),
            }
        })
    }

    /// Flush the object's metadata, then run the file's object-flush
    /// callback with `obj`. A callback returning `false` fails the call.
    pub fn object_flush(&self, obj: Hid) -> Result<()> {
        self.api(|cx| {
            let target = self.location(obj)?;
            let cb = match dispatch::object_specific(cx, &target, ObjectSpecific::Flush)? {
                ObjectSpecificOut::Flushed(cb) => cb,
                _ => return Err(unexpected()),
            };
            if let Some(cb) = cb {
                let ok = {
                    let _guard = CallbackGuard::new();
                    cb(obj)
                };
                if !ok {
                    return Err(Error::internal(Category::Object, "object flush callback failed"));
                }
            }
            Ok(())
        })
    }

    pub fn object_refresh(&self, obj: Hid) -> Result<()> {
        self.api(|cx| {
            let target = self.location(obj)?;
            dispatch::object_specific(cx, &target, ObjectSpecific::Refresh).map(|_| ())
        })
    }

    pub fn object_optional(&self, loc: Hid, args: &mut OptionalArgs) -> Result<()> {
        self.api(|cx| {
            let loc = self.location(loc)?;
            dispatch::object_optional(cx, &loc, args)
        })
    }
}

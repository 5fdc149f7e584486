//! Identifier-based public operations.
//!
//! Every method here is one public operation: it enters an API context,
//! runs against a fresh [`CallCtx`], and records a failure on the calling
//! thread's error stack before returning it. Objects are named by [`Hid`]s
//! registered in the library's identifier tables; closing the last
//! reference routes the close through the object's connector.

mod attr;
mod blob;
mod connector;
mod dataset;
mod datatype;
mod file;
mod group;
mod link;
mod object;
mod request;

use tracing::debug;

use crate::error::{Category, Error, Result};
use crate::errstack::{self, ApiContext};
use crate::ids::{Hid, IdKind};
use crate::library::Library;
use crate::plist::TransferProps;
use crate::vol::{dispatch, CallCtx, ConnectorRef, IdObject, ObjectKind, VolObject};

/// Identifier kinds that can start a path lookup.
const LOCATIONS: &[IdKind] = &[IdKind::File, IdKind::Group, IdKind::Dataset, IdKind::Datatype];

/// Identifier kinds that can carry attributes.
const ATTR_HOLDERS: &[IdKind] = LOCATIONS;

fn object_kind(kind: IdKind) -> Option<ObjectKind> {
    match kind {
        IdKind::File => Some(ObjectKind::File),
        IdKind::Group => Some(ObjectKind::Group),
        IdKind::Dataset => Some(ObjectKind::Dataset),
        IdKind::Datatype => Some(ObjectKind::Datatype),
        IdKind::Attr => Some(ObjectKind::Attr),
        IdKind::Request | IdKind::Connector => None,
    }
}

impl Library {
    /// Run one public operation with default transfer properties.
    pub(crate) fn api<R>(&self, f: impl FnOnce(&mut CallCtx) -> Result<R>) -> Result<R> {
        self.api_with(TransferProps::default(), f)
    }

    pub(crate) fn api_with<R>(
        &self,
        dxpl: TransferProps,
        f: impl FnOnce(&mut CallCtx) -> Result<R>,
    ) -> Result<R> {
        let _api = ApiContext::enter();
        let mut cx = CallCtx::new(self.clone(), dxpl);
        let result = f(&mut cx);
        if let Err(e) = &result {
            errstack::push(e);
        }
        result
    }

    fn object(&self, hid: Hid, kinds: &[IdKind]) -> Result<IdObject> {
        self.ids().get_as(hid, kinds)
    }

    fn location(&self, hid: Hid) -> Result<IdObject> {
        self.object(hid, LOCATIONS)
    }

    fn register(&self, kind: ObjectKind, connector: ConnectorRef, data: VolObject) -> Hid {
        let hid = self.ids().register(kind.into(), IdObject::new(connector, data));
        debug!(?hid, "identifier registered");
        hid
    }

    /// Run `f` asking the connector for a request token, and register the
    /// token it leaves behind. A connector that completes the operation
    /// without one yields `None`.
    fn with_request<R>(
        &self,
        cx: &mut CallCtx,
        owner: &ConnectorRef,
        f: impl FnOnce(&mut CallCtx) -> Result<R>,
    ) -> Result<(R, Option<Hid>)> {
        cx.set_want_request(true);
        let result = f(cx);
        cx.set_want_request(false);
        let value = result?;
        let req = cx
            .take_request()
            .map(|req| self.ids().register(IdKind::Request, IdObject::new(owner.clone(), req)));
        Ok((value, req))
    }

    /// Whether `hid` names an open object of this library.
    pub fn is_valid(&self, hid: Hid) -> bool {
        self.ids().contains(hid)
    }

    pub fn inc_ref(&self, hid: Hid) -> Result<u32> {
        self.api(|_| self.ids().inc_ref(hid))
    }

    pub fn ref_count(&self, hid: Hid) -> Result<u32> {
        self.api(|_| self.ids().ref_count(hid))
    }

    /// Number of open identifiers of `kind`.
    pub fn id_count(&self, kind: IdKind) -> usize {
        self.ids().count(kind)
    }

    /// Drop one reference to `hid`. The last reference closes the object
    /// through its connector; if that close fails the identifier stays
    /// valid.
    pub fn close(&self, hid: Hid) -> Result<()> {
        self.api(|cx| self.close_in(cx, hid))
    }

    fn close_in(&self, cx: &mut CallCtx, hid: Hid) -> Result<()> {
        let ids = self.ids();
        if ids.ref_count(hid)? > 1 {
            ids.dec_ref(hid)?;
            return Ok(());
        }
        let kind = hid
            .kind()
            .ok_or_else(|| Error::args(Category::Id, format!("invalid identifier {hid:?}")))?;
        let obj = ids.get(hid)?;
        match (kind, object_kind(kind)) {
            (_, Some(okind)) => dispatch::close(cx, okind, &obj)?,
            (IdKind::Request, None) => dispatch::request_free(cx, &obj)?,
            (_, None) => {
                if hid == self.native_connector_id() {
                    return Err(Error::args(
                        Category::Connector,
                        "the native connector cannot be unregistered",
                    ));
                }
                self.connectors().remove(hid);
            }
        }
        ids.remove(hid);
        debug!(?hid, "identifier closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryConfig;
    use crate::error::ErrorKind;

    #[test]
    fn failures_land_on_the_error_stack() {
        let lib = Library::with_config(LibraryConfig::default());
        let err = lib.close(Hid::from_raw(12345)).unwrap_err();
        assert_eq!(err.category, Category::Id);
        let stack = errstack::error_stack();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack[0].kind, ErrorKind::ArgsInvalid);

        // The next operation starts with a clean stack.
        assert!(lib.is_valid(lib.native_connector_id()));
        lib.ref_count(lib.native_connector_id()).unwrap();
        assert!(errstack::error_stack().is_empty());
    }

    #[test]
    fn native_connector_stays_registered() {
        let lib = Library::with_config(LibraryConfig::default());
        let native = lib.native_connector_id();
        assert!(lib.close(native).is_err());
        assert!(lib.is_valid(native));
    }
}

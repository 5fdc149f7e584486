mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{create_rw, lib, make_file, path_in};
use hdfcore::native::opcodes;
use hdfcore::vol::{
    AttrClass, BlobClass, CallCtx, Connector, DatasetClass, DatatypeClass, FileClass,
    FileSpecific, FileSpecificOut, GroupClass, IdObject, IntrospectClass, LinkClass, ObjectClass,
    RequestClass, TokenClass, VolObject, WrapClass,
};
use hdfcore::{
    AccessFlags, CapFlags, ConnectorLevel, ConnectorRef, Error, ErrorKind, FileAccessProps,
    ObjectKind, PassThrough, RequestStatus, Subclass, NATIVE_NAME,
};

/// Claims any file whose name ends in `.claim`.
struct Claims;

impl FileClass for Claims {
    fn open(
        &self,
        _cx: &mut CallCtx,
        name: &str,
        _flags: AccessFlags,
        _fapl: &FileAccessProps,
    ) -> hdfcore::Result<VolObject> {
        Ok(VolObject::new(name.to_string()))
    }

    fn specific(
        &self,
        _cx: &mut CallCtx,
        _obj: Option<&VolObject>,
        op: FileSpecific<'_>,
    ) -> hdfcore::Result<FileSpecificOut> {
        match op {
            FileSpecific::IsAccessible { name, .. } => {
                Ok(FileSpecificOut::Bool(name.ends_with(".claim")))
            }
            _ => Err(Error::unsupported(hdfcore::Category::File, "claims specific")),
        }
    }

    fn close(&self, _cx: &mut CallCtx, _obj: &VolObject) -> hdfcore::Result<()> {
        Ok(())
    }
}

impl IntrospectClass for Claims {
    fn get_cap_flags(&self) -> CapFlags {
        CapFlags::FILE_BASIC
    }
}

impl Connector for Claims {
    fn name(&self) -> &str {
        "claims"
    }

    fn value(&self) -> u32 {
        777
    }

    fn file(&self) -> Option<&dyn FileClass> {
        Some(self)
    }

    fn introspect(&self) -> Option<&dyn IntrospectClass> {
        Some(self)
    }
}

fn observer(lib: &hdfcore::Library, name: &str, value: u32) -> (ConnectorRef, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let native = lib.connector(lib.native_connector_id()).unwrap();
    let pt: ConnectorRef = Arc::new(
        PassThrough::new(name, value, native)
            .with_observer(move |op| sink.lock().unwrap().push(op.to_string())),
    );
    (pt, log)
}

#[test]
fn pass_through_forwards_every_call() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "stacked.h5");
    let lib = lib();
    let (pt, log) = observer(&lib, "observer", 505);
    let fapl = FileAccessProps::default().connector(pt);

    let fid = create_rw(&lib, &name, &fapl);
    let g = lib.group_create(fid, "g").unwrap();
    assert_eq!(lib.connector_of(g, ConnectorLevel::Current).unwrap().name(), "observer");
    assert_eq!(lib.connector_of(g, ConnectorLevel::Terminal).unwrap().name(), NATIVE_NAME);
    lib.close(g).unwrap();
    lib.close(fid).unwrap();

    let ops = log.lock().unwrap().clone();
    assert_eq!(ops, ["file create", "group create", "group close", "file close"]);

    // The store is an ordinary native file underneath.
    let plain = lib.file_open(&name, AccessFlags::RDONLY, &FileAccessProps::default()).unwrap();
    assert!(lib.link_exists(plain, "g").unwrap());
    lib.close(plain).unwrap();
}

#[test]
fn mixing_connectors_in_one_call_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let (pt, _log) = observer(&lib, "observer", 505);
    let a = create_rw(&lib, &path_in(dir.path(), "a.h5"), &FileAccessProps::default());
    let b = create_rw(&lib, &path_in(dir.path(), "b.h5"), &FileAccessProps::default().connector(pt));
    let g = lib.group_create(a, "g").unwrap();
    lib.close(g).unwrap();

    let err = lib.link_copy(a, "g", b, "g").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ArgsInvalid);
    lib.close(a).unwrap();
    lib.close(b).unwrap();
}

#[test]
fn registration_is_counted_by_name() {
    let lib = lib();
    let (pt, _log) = observer(&lib, "observer", 505);

    let id = lib.register_connector(pt.clone()).unwrap();
    assert_eq!(lib.register_connector(pt).unwrap(), id);
    assert_eq!(lib.ref_count(id).unwrap(), 2);
    assert!(lib.is_connector_registered("observer"));

    let by_value = lib.connector_by_value(505).unwrap();
    assert_eq!(by_value, id);
    lib.close(by_value).unwrap();
    lib.close(id).unwrap();
    assert!(lib.is_connector_registered("observer"));
    lib.close(id).unwrap();
    assert!(!lib.is_connector_registered("observer"));
    assert!(!lib.is_valid(id));
}

#[test]
fn a_taken_value_is_refused() {
    let lib = lib();
    let (first, _) = observer(&lib, "first", 600);
    let (second, _) = observer(&lib, "second", 600);
    lib.register_connector(first).unwrap();
    let err = lib.register_connector(second).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
}

#[test]
fn lookups() {
    let lib = lib();
    let native = lib.connector_by_name(NATIVE_NAME).unwrap();
    assert_eq!(native, lib.native_connector_id());
    assert_eq!(lib.ref_count(native).unwrap(), 2);
    lib.close(native).unwrap();
    assert_eq!(lib.ref_count(native).unwrap(), 1);

    assert_eq!(lib.connector_by_name("nobody").unwrap_err().kind, ErrorKind::NotFound);
    assert_eq!(lib.connector_by_value(4242).unwrap_err().kind, ErrorKind::NotFound);
    let caps = lib.cap_flags(lib.native_connector_id()).unwrap();
    assert!(caps.contains(CapFlags::FILE_BASIC | CapFlags::LINK_BASIC));
    assert!(!caps.contains(CapFlags::STACKABLE));
}

#[test]
fn optional_support_can_be_queried() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fid = create_rw(&lib, &path_in(dir.path(), "q.h5"), &FileAccessProps::default());
    assert!(lib.opt_query(fid, Subclass::File, opcodes::GET_EOA).unwrap());
    assert!(!lib.opt_query(fid, Subclass::Group, opcodes::GET_EOA).unwrap());
    assert!(!lib.opt_query(fid, Subclass::File, 9999).unwrap());

    let mut args = hdfcore::OptionalArgs::new(9999);
    assert!(lib.file_optional(fid, &mut args).is_err());
    lib.close(fid).unwrap();
}

#[test]
fn open_falls_back_to_a_willing_connector() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "foreign.claim");
    std::fs::write(&name, b"this is somebody else's format").unwrap();
    let lib = lib();
    lib.register_connector(Arc::new(Claims)).unwrap();

    let fid = lib.file_open(&name, AccessFlags::RDONLY, &FileAccessProps::default()).unwrap();
    assert_eq!(lib.connector_of(fid, ConnectorLevel::Current).unwrap().name(), "claims");
    lib.close(fid).unwrap();

    // A connector named explicitly gets no fallback.
    let native = lib.connector(lib.native_connector_id()).unwrap();
    let fapl = FileAccessProps::default().connector(native);
    assert!(lib.file_open(&name, AccessFlags::RDONLY, &fapl).is_err());
}

#[test]
fn no_fallback_when_nobody_claims_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "junk.bin");
    std::fs::write(&name, b"junk junk junk junk junk junk").unwrap();
    let lib = lib();
    lib.register_connector(Arc::new(Claims)).unwrap();
    assert!(lib.file_open(&name, AccessFlags::RDONLY, &FileAccessProps::default()).is_err());
}

#[test]
fn tokens_name_objects() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "tokens.h5");
    let lib = lib();
    make_file(&lib, &name);
    let fid = lib.file_open(&name, AccessFlags::RDWR, &FileAccessProps::default()).unwrap();
    let g = lib.group_create(fid, "g").unwrap();
    let h = lib.group_create(fid, "h").unwrap();

    let tg = lib.object_token(fid, "g").unwrap();
    let th = lib.object_token(fid, "h").unwrap();
    assert_ne!(tg, th);
    assert_eq!(lib.token_cmp(fid, &tg, &tg).unwrap(), std::cmp::Ordering::Equal);
    let s = lib.token_to_string(fid, &tg).unwrap();
    assert_eq!(lib.token_from_string(fid, &s).unwrap(), tg);
    assert!(lib.token_from_string(fid, "zz").is_err());

    let again = lib.object_open_by_token(fid, tg).unwrap();
    assert_eq!(again.kind(), Some(hdfcore::IdKind::Group));
    for id in [again, g, h, fid] {
        lib.close(id).unwrap();
    }
}

/// A pass-through stack that counts the wrap contexts made for it.
struct WrapCounter {
    inner: PassThrough,
    made: AtomicUsize,
    freed: AtomicUsize,
}

impl Connector for WrapCounter {
    fn name(&self) -> &str {
        "wrap-counter"
    }

    fn value(&self) -> u32 {
        507
    }

    fn file(&self) -> Option<&dyn FileClass> {
        self.inner.file()
    }

    fn group(&self) -> Option<&dyn GroupClass> {
        self.inner.group()
    }

    fn dataset(&self) -> Option<&dyn DatasetClass> {
        self.inner.dataset()
    }

    fn attr(&self) -> Option<&dyn AttrClass> {
        self.inner.attr()
    }

    fn datatype(&self) -> Option<&dyn DatatypeClass> {
        self.inner.datatype()
    }

    fn link(&self) -> Option<&dyn LinkClass> {
        self.inner.link()
    }

    fn object(&self) -> Option<&dyn ObjectClass> {
        self.inner.object()
    }

    fn request(&self) -> Option<&dyn RequestClass> {
        self.inner.request()
    }

    fn blob(&self) -> Option<&dyn BlobClass> {
        self.inner.blob()
    }

    fn token(&self) -> Option<&dyn TokenClass> {
        self.inner.token()
    }

    fn introspect(&self) -> Option<&dyn IntrospectClass> {
        self.inner.introspect()
    }

    fn wrap(&self) -> Option<&dyn WrapClass> {
        Some(self)
    }
}

impl WrapClass for WrapCounter {
    fn get_object(&self, obj: &VolObject) -> Option<IdObject> {
        WrapClass::get_object(&self.inner, obj)
    }

    fn get_wrap_ctx(&self, obj: &VolObject) -> hdfcore::Result<VolObject> {
        self.made.fetch_add(1, Ordering::SeqCst);
        WrapClass::get_wrap_ctx(&self.inner, obj)
    }

    fn wrap_object(
        &self,
        obj: VolObject,
        kind: ObjectKind,
        ctx: &VolObject,
    ) -> hdfcore::Result<VolObject> {
        WrapClass::wrap_object(&self.inner, obj, kind, ctx)
    }

    fn unwrap_object(&self, obj: &VolObject) -> hdfcore::Result<VolObject> {
        WrapClass::unwrap_object(&self.inner, obj)
    }

    fn free_wrap_ctx(&self, ctx: VolObject) -> hdfcore::Result<()> {
        self.freed.fetch_add(1, Ordering::SeqCst);
        WrapClass::free_wrap_ctx(&self.inner, ctx)
    }
}

#[test]
fn requests_and_tokens_run_under_a_wrap_context() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let native = lib.connector(lib.native_connector_id()).unwrap();
    let counter = Arc::new(WrapCounter {
        inner: PassThrough::new("pass", 505, native),
        made: AtomicUsize::new(0),
        freed: AtomicUsize::new(0),
    });
    let fapl = FileAccessProps::default().connector(counter.clone());
    let fid = create_rw(&lib, &path_in(dir.path(), "wrapped.h5"), &fapl);
    let (g, req) = lib.group_create_async(fid, "g").unwrap();
    let req = req.unwrap();

    let made = || counter.made.load(Ordering::SeqCst);
    let before = made();
    assert_eq!(lib.request_wait(req, Duration::ZERO).unwrap(), RequestStatus::Succeeded);
    assert_eq!(lib.request_cancel(req).unwrap(), RequestStatus::Succeeded);
    lib.close(req).unwrap();
    assert_eq!(made(), before + 3);

    let before = made();
    let tok = lib.object_token(fid, "g").unwrap();
    let after_lookup = made();
    let s = lib.token_to_string(fid, &tok).unwrap();
    assert_eq!(lib.token_from_string(fid, &s).unwrap(), tok);
    assert_eq!(lib.token_cmp(fid, &tok, &tok).unwrap(), std::cmp::Ordering::Equal);
    assert!(after_lookup > before);
    assert_eq!(made(), after_lookup + 3);

    lib.close(g).unwrap();
    lib.close(fid).unwrap();
    assert_eq!(made(), counter.freed.load(Ordering::SeqCst));
}

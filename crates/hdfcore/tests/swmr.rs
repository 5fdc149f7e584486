mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{counting_fapl, create_rw, int32, lib, path_in};
use hdfcore::vol::{
    AttrClass, BlobClass, CallCtx, Connector, DatasetClass, DatatypeClass, FileClass, GroupClass,
    GroupGet, GroupSpecific, IntrospectClass, LinkClass, ObjectClass, RequestClass, TokenClass,
    VolObject, WrapClass,
};
use hdfcore::{
    AccessFlags, Category, ConnectorRef, Dataspace, Error, ErrorKind, FileAccessProps, LibVersion,
    ObjTypes, OptionalArgs, PassThrough,
};

/// Forwards to a pass-through stack but refuses the second group close.
struct SecondCloseFails {
    inner: PassThrough,
    closes: AtomicUsize,
}

impl Connector for SecondCloseFails {
    fn name(&self) -> &str {
        "second-close-fails"
    }

    fn value(&self) -> u32 {
        506
    }

    fn file(&self) -> Option<&dyn FileClass> {
        self.inner.file()
    }

    fn group(&self) -> Option<&dyn GroupClass> {
        Some(self)
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
        self.inner.wrap()
    }
}

impl GroupClass for SecondCloseFails {
    fn create(&self, cx: &mut CallCtx, loc: &VolObject, name: &str) -> hdfcore::Result<VolObject> {
        GroupClass::create(&self.inner, cx, loc, name)
    }

    fn open(&self, cx: &mut CallCtx, loc: &VolObject, name: &str) -> hdfcore::Result<VolObject> {
        GroupClass::open(&self.inner, cx, loc, name)
    }

    fn get(&self, cx: &mut CallCtx, obj: &VolObject, what: GroupGet) -> hdfcore::Result<u64> {
        GroupClass::get(&self.inner, cx, obj, what)
    }

    fn specific(
        &self,
        cx: &mut CallCtx,
        obj: &VolObject,
        op: GroupSpecific<'_>,
    ) -> hdfcore::Result<()> {
        GroupClass::specific(&self.inner, cx, obj, op)
    }

    fn optional(
        &self,
        cx: &mut CallCtx,
        obj: &VolObject,
        args: &mut OptionalArgs,
    ) -> hdfcore::Result<()> {
        GroupClass::optional(&self.inner, cx, obj, args)
    }

    fn close(&self, cx: &mut CallCtx, obj: &VolObject) -> hdfcore::Result<()> {
        if self.closes.fetch_add(1, Ordering::SeqCst) == 1 {
            return Err(Error::new(Category::Group, ErrorKind::Io, "close refused"));
        }
        GroupClass::close(&self.inner, cx, obj)
    }
}

#[test]
fn writer_switches_to_swmr_with_objects_open() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fapl = FileAccessProps::default().libver_bounds(LibVersion::V110, LibVersion::LATEST);
    let fid = create_rw(&lib, &path_in(dir.path(), "swmr.h5"), &fapl);
    let g = lib.group_create(fid, "g").unwrap();

    lib.file_start_swmr_write(fid).unwrap();
    assert!(lib.file_intent(fid).unwrap().contains(AccessFlags::SWMR_WRITE));

    // Handles opened before the switch keep working.
    let sub = lib.group_create(g, "sub").unwrap();
    lib.close(sub).unwrap();
    assert_eq!(lib.group_num_links(g).unwrap(), 1);

    let again = lib.file_start_swmr_write(fid).unwrap_err();
    assert_eq!(again.kind, ErrorKind::ArgsInvalid);
    lib.close(g).unwrap();
    lib.close(fid).unwrap();
}

#[test]
fn default_format_bounds_cannot_switch() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fid = create_rw(&lib, &path_in(dir.path(), "old.h5"), &FileAccessProps::default());
    let err = lib.file_start_swmr_write(fid).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    lib.close(fid).unwrap();
}

#[test]
fn open_attributes_block_the_switch() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fapl = FileAccessProps::default().libver_bounds(LibVersion::V110, LibVersion::LATEST);
    let fid = create_rw(&lib, &path_in(dir.path(), "attr.h5"), &fapl);
    let g = lib.group_create(fid, "g").unwrap();
    let a = lib.attr_create(g, "a", &int32(), &Dataspace::scalar()).unwrap();

    let err = lib.file_start_swmr_write(fid).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    lib.close(a).unwrap();
    lib.file_start_swmr_write(fid).unwrap();
    lib.close(g).unwrap();
    lib.close(fid).unwrap();
}

#[test]
fn failed_switch_leaves_open_objects_as_they_were() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "rollback.h5");
    let lib = lib();
    let native = lib.connector(lib.native_connector_id()).unwrap();
    let conn: ConnectorRef = Arc::new(SecondCloseFails {
        inner: PassThrough::new("pass", 505, native),
        closes: AtomicUsize::new(0),
    });
    let (fapl, counts) = counting_fapl();
    let fapl = fapl
        .libver_bounds(LibVersion::V110, LibVersion::LATEST)
        .connector(conn);
    let fid = create_rw(&lib, &name, &fapl);
    let groups: Vec<_> = ["g1", "g2", "g3"]
        .iter()
        .map(|n| lib.group_create(fid, n).unwrap())
        .collect();
    assert_eq!(lib.file_obj_count(fid, ObjTypes::GROUP).unwrap(), 3);

    assert!(lib.file_start_swmr_write(fid).is_err());
    assert!(!lib.file_intent(fid).unwrap().contains(AccessFlags::SWMR_WRITE));
    assert_eq!(lib.file_obj_count(fid, ObjTypes::GROUP).unwrap(), 3);
    for g in &groups {
        assert_eq!(lib.group_num_links(*g).unwrap(), 0);
    }

    for g in groups {
        lib.close(g).unwrap();
    }
    assert_eq!(lib.file_obj_count(fid, ObjTypes::GROUP).unwrap(), 0);
    lib.close(fid).unwrap();

    // Nothing is left holding the store open.
    assert_eq!(counts.opens(), 1);
    assert_eq!(counts.closes(), 1);
}

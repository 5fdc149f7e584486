mod common;

use common::{create_rw, lib, path_in};
use hdfcore::{ErrorKind, FileAccessProps, IdKind};

#[test]
fn mounted_file_is_reachable_until_unmounted() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let parent = create_rw(&lib, &path_in(dir.path(), "parent.h5"), &FileAccessProps::default());
    let mnt = lib.group_create(parent, "mnt").unwrap();
    lib.close(mnt).unwrap();

    let child = create_rw(&lib, &path_in(dir.path(), "child.h5"), &FileAccessProps::default());
    let inner = lib.group_create(child, "inner").unwrap();
    lib.close(inner).unwrap();

    lib.file_mount(parent, "mnt", child).unwrap();
    let err = lib.file_mount(parent, "mnt", child).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);

    // The mount keeps the child alive after its own handle goes away.
    lib.close(child).unwrap();
    let g = lib.group_open(parent, "mnt/inner").unwrap();
    lib.close(g).unwrap();
    assert!(lib.link_exists(parent, "mnt/inner").unwrap());

    lib.file_unmount(parent, "mnt").unwrap();
    assert!(lib.group_open(parent, "mnt/inner").is_err());
    assert!(lib.file_unmount(parent, "mnt").is_err());
    lib.close(parent).unwrap();
    assert_eq!(lib.id_count(IdKind::File), 0);
    assert_eq!(lib.open_store_count(), 0);
}

#[test]
fn a_file_cannot_be_mounted_on_itself() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fid = create_rw(&lib, &path_in(dir.path(), "self.h5"), &FileAccessProps::default());
    let g = lib.group_create(fid, "g").unwrap();
    lib.close(g).unwrap();
    assert!(lib.file_mount(fid, "g", fid).is_err());
    lib.close(fid).unwrap();
}

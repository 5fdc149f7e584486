mod common;

use common::{counting_fapl, create_rw, lib, make_file, path_in};
use hdfcore::{AccessFlags, ErrorKind, FileAccessProps, FileCreateProps, IdKind, ObjTypes};

#[test]
fn double_open_shares_one_driver_handle() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "a.h5");
    let lib = lib();
    make_file(&lib, &name);

    let (fapl, counts) = counting_fapl();
    let t1 = lib.file_open(&name, AccessFlags::RDONLY, &fapl).unwrap();
    let t2 = lib.file_open(&name, AccessFlags::RDONLY, &fapl).unwrap();
    assert_ne!(t1, t2);
    assert_eq!(lib.open_store_count(), 1);
    assert_eq!(counts.opens(), 1);

    lib.close(t1).unwrap();
    assert_eq!(counts.closes(), 0);
    assert_eq!(lib.open_store_count(), 1);

    lib.close(t2).unwrap();
    assert_eq!(counts.opens(), 1);
    assert_eq!(counts.closes(), 1);
    assert_eq!(lib.open_store_count(), 0);
}

#[test]
fn joined_handles_see_each_others_objects() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "shared.h5");
    let lib = lib();
    let fapl = FileAccessProps::default();
    let w1 = create_rw(&lib, &name, &fapl);
    let w2 = lib.file_open(&name, AccessFlags::RDWR, &fapl).unwrap();

    let g = lib.group_create(w1, "from_first").unwrap();
    lib.close(g).unwrap();
    assert!(lib.link_exists(w2, "from_first").unwrap());
    assert!(lib.file_is_equal(w1, w2).unwrap());

    lib.close(w1).unwrap();
    lib.close(w2).unwrap();
}

#[test]
fn write_open_after_read_only_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "ro.h5");
    let lib = lib();
    make_file(&lib, &name);
    let fapl = FileAccessProps::default();

    let r1 = lib.file_open(&name, AccessFlags::RDONLY, &fapl).unwrap();
    let r2 = lib.file_open(&name, AccessFlags::RDONLY, &fapl).unwrap();
    let err = lib.file_open(&name, AccessFlags::RDWR, &fapl).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);

    lib.close(r1).unwrap();
    lib.close(r2).unwrap();
}

#[test]
fn truncating_an_open_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "busy.h5");
    let lib = lib();
    let fapl = FileAccessProps::default();
    let fid = create_rw(&lib, &name, &fapl);

    let err = lib
        .file_create(&name, AccessFlags::TRUNC, &FileCreateProps::default(), &fapl)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert!(lib.is_valid(fid));
    lib.close(fid).unwrap();
}

#[test]
fn exclusive_create_of_existing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "exists.h5");
    let lib = lib();
    make_file(&lib, &name);

    let err = lib
        .file_create(&name, AccessFlags::EXCL, &FileCreateProps::default(), &FileAccessProps::default())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyExists);
}

#[test]
fn open_rejects_create_flags() {
    let lib = lib();
    let err = lib
        .file_open("whatever.h5", AccessFlags::RDWR | AccessFlags::TRUNC, &FileAccessProps::default())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ArgsInvalid);
}

#[test]
fn reopen_gives_a_second_handle_on_the_same_store() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "reopen.h5");
    let lib = lib();
    let (fapl, counts) = counting_fapl();
    let fid = create_rw(&lib, &name, &fapl);

    let again = lib.file_reopen(fid).unwrap();
    assert!(lib.file_is_equal(fid, again).unwrap());
    lib.close(fid).unwrap();
    let g = lib.group_create(again, "still_open").unwrap();
    lib.close(g).unwrap();
    lib.close(again).unwrap();
    assert_eq!(counts.opens(), 1);
    assert_eq!(counts.closes(), 1);
}

#[test]
fn accessible_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "gone.h5");
    let plain = path_in(dir.path(), "plain.txt");
    std::fs::write(&plain, b"not a container at all").unwrap();
    let lib = lib();
    let fapl = FileAccessProps::default();
    make_file(&lib, &name);

    assert!(lib.file_is_accessible(&name, &fapl).unwrap());
    assert!(!lib.file_is_accessible(&plain, &fapl).unwrap());
    assert!(!lib.file_is_accessible(&path_in(dir.path(), "nope.h5"), &fapl).unwrap());

    lib.file_delete(&name, &fapl).unwrap();
    assert!(!std::path::Path::new(&name).exists());
}

#[test]
fn file_queries() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "query.h5");
    let lib = lib();
    let fid = create_rw(&lib, &name, &FileAccessProps::default());

    assert!(lib.file_intent(fid).unwrap().contains(AccessFlags::RDWR));
    assert_eq!(lib.file_name(fid).unwrap(), name);
    assert!(lib.file_eoa(fid).unwrap() > 0);

    let g = lib.group_create(fid, "g").unwrap();
    let d = lib
        .dataset_create(
            g,
            "d",
            &common::int32(),
            &hdfcore::Dataspace::simple(&[4]).unwrap(),
            &hdfcore::DatasetCreateProps::default(),
        )
        .unwrap();
    assert_eq!(lib.file_obj_count(fid, ObjTypes::GROUP).unwrap(), 1);
    assert_eq!(lib.file_obj_count(fid, ObjTypes::DATASET).unwrap(), 1);
    assert_eq!(lib.file_obj_count(fid, ObjTypes::ALL).unwrap(), 3);
    let ids = lib.file_obj_ids(fid, ObjTypes::DATASET, None).unwrap();
    assert_eq!(ids, vec![d]);
    assert_eq!(lib.file_obj_ids(fid, ObjTypes::ALL, Some(1)).unwrap().len(), 1);
    let stats = lib.file_cache_stats(fid).unwrap();
    assert!(stats.entries > 0);
    assert!(stats.bytes >= stats.entries);

    lib.close(d).unwrap();
    lib.close(g).unwrap();
    lib.close(fid).unwrap();
    assert_eq!(lib.id_count(IdKind::File), 0);
}

#[test]
fn open_and_close_leaves_an_untouched_file_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "still.h5");
    let lib = lib();
    make_file(&lib, &name);
    let before = std::fs::read(&name).unwrap();

    for flags in [AccessFlags::RDONLY, AccessFlags::RDWR] {
        let fid = lib.file_open(&name, flags, &FileAccessProps::default()).unwrap();
        lib.close(fid).unwrap();
        let after = std::fs::read(&name).unwrap();
        assert_eq!(after.len(), before.len(), "{flags:?} grew the file");
        assert_eq!(after, before, "{flags:?} rewrote the file");
    }
}

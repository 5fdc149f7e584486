mod common;

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{create_rw, int32, lib, path_in};
use hdfcore::{
    DatasetAccessProps, DatasetCreateProps, Dataspace, ErrorKind, FileAccessProps, Hid, IdKind,
    LinkKind, ObjectKind, RequestStatus, UNLIMITED,
};

fn ints(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn read_ints(lib: &hdfcore::Library, dset: Hid, n: usize) -> Vec<i32> {
    let mut buf = vec![0u8; n * 4];
    lib.dataset_read(dset, &int32(), &mut buf).unwrap();
    buf.chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[test]
fn dataset_data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "data.h5");
    let lib = lib();
    let fid = create_rw(&lib, &name, &FileAccessProps::default());
    let space = Dataspace::simple(&[2, 3]).unwrap();
    let d = lib
        .dataset_create(fid, "values", &int32(), &space, &DatasetCreateProps::default())
        .unwrap();
    lib.dataset_write(d, &int32(), &ints(&[1, 2, 3, 4, 5, 6])).unwrap();
    assert_eq!(lib.dataset_storage_size(d).unwrap(), 24);
    lib.close(d).unwrap();
    lib.close(fid).unwrap();

    let fid = lib
        .file_open(&name, hdfcore::AccessFlags::RDONLY, &FileAccessProps::default())
        .unwrap();
    let d = lib.dataset_open(fid, "values", &DatasetAccessProps::default()).unwrap();
    assert_eq!(lib.dataset_space(d).unwrap().dims(), &[2, 3]);
    assert!(lib.dataset_type(d).unwrap().equivalent(&int32()));
    assert_eq!(read_ints(&lib, d, 6), vec![1, 2, 3, 4, 5, 6]);

    let err = lib.dataset_write(d, &int32(), &ints(&[0; 6])).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Permission);
    lib.close(d).unwrap();
    lib.close(fid).unwrap();
}

#[test]
fn wrong_buffer_size_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fid = create_rw(&lib, &path_in(dir.path(), "size.h5"), &FileAccessProps::default());
    let d = lib
        .dataset_create(fid, "d", &int32(), &Dataspace::simple(&[4]).unwrap(), &DatasetCreateProps::default())
        .unwrap();
    let err = lib.dataset_write(d, &int32(), &ints(&[1, 2, 3])).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ArgsInvalid);
    lib.close(d).unwrap();
    lib.close(fid).unwrap();
}

#[test]
fn extent_changes_keep_overlapping_elements() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fid = create_rw(&lib, &path_in(dir.path(), "extent.h5"), &FileAccessProps::default());
    let dcpl = DatasetCreateProps::new().max_dims(&[UNLIMITED, 3]);
    let d = lib
        .dataset_create(fid, "grow", &int32(), &Dataspace::simple(&[2, 3]).unwrap(), &dcpl)
        .unwrap();
    lib.dataset_write(d, &int32(), &ints(&[1, 2, 3, 4, 5, 6])).unwrap();

    lib.dataset_set_extent(d, &[4, 3]).unwrap();
    assert_eq!(read_ints(&lib, d, 12), vec![1, 2, 3, 4, 5, 6, 0, 0, 0, 0, 0, 0]);

    lib.dataset_set_extent(d, &[1, 3]).unwrap();
    assert_eq!(read_ints(&lib, d, 3), vec![1, 2, 3]);

    assert!(lib.dataset_set_extent(d, &[1, 4]).is_err());
    lib.close(d).unwrap();
    lib.close(fid).unwrap();
}

#[test]
fn multi_dataset_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fid = create_rw(&lib, &path_in(dir.path(), "multi.h5"), &FileAccessProps::default());
    let space = Dataspace::simple(&[2]).unwrap();
    let a = lib.dataset_create(fid, "a", &int32(), &space, &DatasetCreateProps::default()).unwrap();
    let b = lib.dataset_create(fid, "b", &int32(), &space, &DatasetCreateProps::default()).unwrap();
    let types = [int32(), int32()];
    let (wa, wb) = (ints(&[1, 2]), ints(&[3, 4]));
    lib.dataset_write_multi(&[a, b], &types, &[wa.as_slice(), wb.as_slice()], &Default::default())
        .unwrap();

    let (mut ra, mut rb) = (vec![0u8; 8], vec![0u8; 8]);
    lib.dataset_read_multi(
        &[a, b],
        &types,
        &mut [ra.as_mut_slice(), rb.as_mut_slice()],
        &Default::default(),
    )
        .unwrap();
    assert_eq!((ra, rb), (wa, wb));
    for id in [a, b, fid] {
        lib.close(id).unwrap();
    }
}

#[test]
fn attributes() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fid = create_rw(&lib, &path_in(dir.path(), "attrs.h5"), &FileAccessProps::default());
    let g = lib.group_create(fid, "g").unwrap();

    let a = lib.attr_create(g, "units", &int32(), &Dataspace::scalar()).unwrap();
    let mut buf = [0xffu8; 4];
    lib.attr_read(a, &int32(), &mut buf).unwrap();
    assert_eq!(buf, [0; 4]);
    lib.attr_write(a, &int32(), &7i32.to_le_bytes()).unwrap();
    assert_eq!(lib.attr_name(a).unwrap(), "units");
    lib.close(a).unwrap();

    let b = lib.attr_create(g, "scale", &int32(), &Dataspace::simple(&[2]).unwrap()).unwrap();
    lib.close(b).unwrap();
    assert!(lib.attr_create(g, "units", &int32(), &Dataspace::scalar()).is_err());

    assert_eq!(lib.attr_names(g).unwrap(), ["units", "scale"]);
    lib.attr_rename(g, "scale", "factor").unwrap();
    assert!(lib.attr_exists(g, "factor").unwrap());
    assert!(!lib.attr_exists(g, "scale").unwrap());

    let a = lib.attr_open(g, "units").unwrap();
    let mut buf = [0u8; 4];
    lib.attr_read(a, &int32(), &mut buf).unwrap();
    assert_eq!(i32::from_le_bytes(buf), 7);
    assert_eq!(lib.attr_space(a).unwrap().npoints().unwrap(), 1);
    lib.close(a).unwrap();

    lib.attr_delete(g, "units").unwrap();
    assert_eq!(lib.attr_names(g).unwrap(), ["factor"]);
    lib.close(g).unwrap();
    lib.close(fid).unwrap();
}

#[test]
fn hard_and_soft_links() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fid = create_rw(&lib, &path_in(dir.path(), "links.h5"), &FileAccessProps::default());
    let g = lib.group_create(fid, "g").unwrap();
    lib.close(g).unwrap();

    lib.link_create_hard(fid, "g", fid, "alias").unwrap();
    lib.link_create_soft("/g", fid, "soft").unwrap();
    assert_eq!(lib.link_info(fid, "alias").unwrap().kind, LinkKind::Hard);
    assert_eq!(
        lib.link_info(fid, "alias").unwrap().token,
        Some(lib.object_token(fid, "g").unwrap())
    );
    let soft = lib.link_info(fid, "soft").unwrap();
    assert_eq!(soft.kind, LinkKind::Soft);
    assert_eq!(soft.value.as_deref(), Some("/g"));

    let via_soft = lib.group_create(fid, "soft/child").unwrap();
    lib.close(via_soft).unwrap();
    assert!(lib.link_exists(fid, "g/child").unwrap());
    assert!(lib.link_exists(fid, "alias/child").unwrap());

    assert_eq!(lib.link_names(fid).unwrap(), ["alias", "g", "soft"]);
    let mut seen = Vec::new();
    let stopped = lib
        .link_iterate(fid, |name, _| {
            seen.push(name.to_string());
            if name == "g" {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
    assert!(stopped);
    assert_eq!(seen, ["alias", "g"]);

    lib.link_create_soft("/nowhere", fid, "dangling").unwrap();
    assert!(lib.link_exists(fid, "dangling").unwrap());
    assert!(lib.group_open(fid, "dangling").is_err());
    lib.close(fid).unwrap();
}

#[test]
fn move_there_and_back_restores_links() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fid = create_rw(&lib, &path_in(dir.path(), "move.h5"), &FileAccessProps::default());
    let a = lib.group_create(fid, "a").unwrap();
    let b = lib.group_create(fid, "b").unwrap();
    let token = lib.object_token(fid, "a").unwrap();

    lib.link_move(fid, "a", b, "moved").unwrap();
    assert!(!lib.link_exists(fid, "a").unwrap());
    assert_eq!(lib.object_token(fid, "b/moved").unwrap(), token);
    lib.link_move(b, "moved", fid, "a").unwrap();
    assert_eq!(lib.link_names(fid).unwrap(), ["a", "b"]);
    assert_eq!(lib.group_num_links(b).unwrap(), 0);
    assert_eq!(lib.object_token(fid, "a").unwrap(), token);

    lib.link_copy(fid, "a", fid, "copy").unwrap();
    assert_eq!(lib.object_token(fid, "copy").unwrap(), token);
    assert_eq!(
        lib.link_create_hard(fid, "a", fid, "b").unwrap_err().kind,
        ErrorKind::AlreadyExists
    );
    for id in [a, b, fid] {
        lib.close(id).unwrap();
    }
}

#[test]
fn unlinked_open_dataset_stays_readable() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fid = create_rw(&lib, &path_in(dir.path(), "unlink.h5"), &FileAccessProps::default());
    let d = lib
        .dataset_create(fid, "d", &int32(), &Dataspace::simple(&[2]).unwrap(), &DatasetCreateProps::default())
        .unwrap();
    lib.dataset_write(d, &int32(), &ints(&[9, 8])).unwrap();

    lib.link_delete(fid, "d").unwrap();
    assert!(!lib.link_exists(fid, "d").unwrap());
    assert_eq!(read_ints(&lib, d, 2), vec![9, 8]);
    lib.close(d).unwrap();
    assert!(lib.object_exists(fid, "d").is_ok_and(|e| !e));
    lib.close(fid).unwrap();
}

#[test]
fn objects_by_name_and_copy() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fid = create_rw(&lib, &path_in(dir.path(), "objects.h5"), &FileAccessProps::default());
    let g = lib.group_create(fid, "src").unwrap();
    let d = lib
        .dataset_create(g, "d", &int32(), &Dataspace::simple(&[3]).unwrap(), &DatasetCreateProps::default())
        .unwrap();
    lib.dataset_write(d, &int32(), &ints(&[4, 5, 6])).unwrap();
    lib.close(d).unwrap();
    lib.close(g).unwrap();

    assert_eq!(lib.object_kind(fid, "src").unwrap(), ObjectKind::Group);
    assert_eq!(lib.object_kind(fid, "src/d").unwrap(), ObjectKind::Dataset);
    let any = lib.object_open(fid, "src/d").unwrap();
    assert_eq!(any.kind(), Some(IdKind::Dataset));
    assert_eq!(read_ints(&lib, any, 3), vec![4, 5, 6]);
    lib.close(any).unwrap();

    lib.object_copy(fid, "src", fid, "dst").unwrap();
    assert_ne!(
        lib.object_token(fid, "src/d").unwrap(),
        lib.object_token(fid, "dst/d").unwrap()
    );
    let copy = lib.dataset_open(fid, "dst/d", &DatasetAccessProps::default()).unwrap();
    assert_eq!(read_ints(&lib, copy, 3), vec![4, 5, 6]);
    lib.close(copy).unwrap();

    assert!(lib.object_exists(fid, "dst").unwrap());
    assert!(!lib.object_exists(fid, "elsewhere").unwrap());
    assert_eq!(lib.object_file_name(fid).unwrap(), lib.file_name(fid).unwrap());
    lib.close(fid).unwrap();
}

#[test]
fn committed_datatypes() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fid = create_rw(&lib, &path_in(dir.path(), "types.h5"), &FileAccessProps::default());
    let t = lib.datatype_commit(fid, "int", &int32()).unwrap();
    assert_eq!(t.kind(), Some(IdKind::Datatype));
    lib.close(t).unwrap();

    assert_eq!(lib.object_kind(fid, "int").unwrap(), ObjectKind::Datatype);
    let t = lib.datatype_open(fid, "int").unwrap();
    assert!(lib.datatype_get(t).unwrap().equivalent(&int32()));
    lib.datatype_flush(t).unwrap();
    lib.close(t).unwrap();
    assert!(lib.datatype_open(fid, "missing").is_err());
    lib.close(fid).unwrap();
}

#[test]
fn blobs() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fid = create_rw(&lib, &path_in(dir.path(), "blobs.h5"), &FileAccessProps::default());

    let id = lib.blob_put(fid, b"variable length payload").unwrap();
    assert!(!lib.blob_is_null(fid, &id).unwrap());
    assert_eq!(lib.blob_size(fid, &id).unwrap(), 23);
    assert_eq!(lib.blob_get(fid, &id).unwrap(), b"variable length payload");

    let empty = lib.blob_put(fid, &[]).unwrap();
    assert!(lib.blob_is_null(fid, &empty).unwrap());
    assert!(lib.blob_get(fid, &empty).unwrap().is_empty());

    lib.blob_delete(fid, &id).unwrap();
    lib.close(fid).unwrap();
}

#[test]
fn requests_for_finished_operations() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fid = create_rw(&lib, &path_in(dir.path(), "async.h5"), &FileAccessProps::default());

    let (g, req) = lib.group_create_async(fid, "g").unwrap();
    let req = req.unwrap();
    assert_eq!(req.kind(), Some(IdKind::Request));
    assert_eq!(lib.request_wait(req, Duration::ZERO).unwrap(), RequestStatus::Succeeded);

    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    lib.request_notify(req, Box::new(move |st| *sink.lock().unwrap() = Some(st)))
        .unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(RequestStatus::Succeeded));
    lib.close(req).unwrap();
    assert!(!lib.is_valid(req));
    assert_eq!(lib.id_count(IdKind::Request), 0);

    let d = lib
        .dataset_create(g, "d", &int32(), &Dataspace::simple(&[1]).unwrap(), &DatasetCreateProps::default())
        .unwrap();
    let wreq = lib.dataset_write_async(d, &int32(), &ints(&[5])).unwrap().unwrap();
    assert_eq!(lib.request_cancel(wreq).unwrap(), RequestStatus::Succeeded);
    lib.close(wreq).unwrap();
    assert_eq!(read_ints(&lib, d, 1), vec![5]);

    for id in [d, g, fid] {
        lib.close(id).unwrap();
    }
}

#[test]
fn object_flush_runs_the_file_callback() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let flushed = Arc::new(Mutex::new(Vec::new()));
    let sink = flushed.clone();
    let fapl = FileAccessProps::default().object_flush_cb(Arc::new(move |hid| {
        sink.lock().unwrap().push(hid);
        true
    }));
    let fid = create_rw(&lib, &path_in(dir.path(), "flush.h5"), &fapl);
    let g = lib.group_create(fid, "g").unwrap();

    lib.object_flush(g).unwrap();
    lib.group_flush(g).unwrap();
    lib.object_refresh(g).unwrap();
    assert_eq!(*flushed.lock().unwrap(), vec![g]);
    lib.close(g).unwrap();
    lib.close(fid).unwrap();
}

#[test]
fn failing_flush_callback_fails_the_flush() {
    let dir = tempfile::tempdir().unwrap();
    let lib = lib();
    let fapl = FileAccessProps::default().object_flush_cb(Arc::new(|_| false));
    let fid = create_rw(&lib, &path_in(dir.path(), "badflush.h5"), &fapl);
    let g = lib.group_create(fid, "g").unwrap();
    assert!(lib.object_flush(g).is_err());
    lib.close(g).unwrap();
    lib.close(fid).unwrap();
}

mod common;

use std::sync::{Arc, Mutex};

use common::{create_rw, int32, lib, path_in};
use hdfcore::{
    CloseDegree, ConnectorRef, DatasetCreateProps, Dataspace, ErrorKind, FileAccessProps, IdKind,
    Library, PassThrough,
};

fn observed(lib: &Library) -> (ConnectorRef, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let native = lib.connector(lib.native_connector_id()).unwrap();
    let pt: ConnectorRef = Arc::new(
        PassThrough::new("observer", 505, native)
            .with_observer(move |op| sink.lock().unwrap().push(op.to_string())),
    );
    (pt, log)
}

#[test]
fn strong_close_shuts_children_down_first() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "strong.h5");
    let lib = lib();
    let (pt, log) = observed(&lib);
    let fapl = FileAccessProps::default()
        .close_degree(CloseDegree::Strong)
        .connector(pt);

    let fid = create_rw(&lib, &name, &fapl);
    let g = lib.group_create(fid, "g").unwrap();
    let d = lib
        .dataset_create(g, "d", &int32(), &Dataspace::simple(&[3]).unwrap(), &DatasetCreateProps::default())
        .unwrap();
    log.lock().unwrap().clear();

    lib.close(fid).unwrap();

    let ops = log.lock().unwrap().clone();
    let pos = |op: &str| ops.iter().position(|o| o == op).unwrap();
    assert!(pos("dataset close") < pos("file close"));
    assert!(pos("group close") < pos("file close"));
    assert!(!lib.is_valid(g));
    assert!(!lib.is_valid(d));
    assert_eq!(lib.id_count(IdKind::Group), 0);
    assert_eq!(lib.id_count(IdKind::Dataset), 0);
    assert_eq!(lib.open_store_count(), 0);
}

#[test]
fn semi_close_refuses_while_children_are_open() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "semi.h5");
    let lib = lib();
    let fapl = FileAccessProps::default().close_degree(CloseDegree::Semi);

    let fid = create_rw(&lib, &name, &fapl);
    let g = lib.group_create(fid, "g").unwrap();
    let d = lib
        .dataset_create(g, "d", &int32(), &Dataspace::simple(&[2]).unwrap(), &DatasetCreateProps::default())
        .unwrap();

    let err = lib.close(fid).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert!(lib.is_valid(fid));

    lib.dataset_write(d, &int32(), &[1, 0, 0, 0, 2, 0, 0, 0]).unwrap();
    assert_eq!(lib.group_num_links(g).unwrap(), 1);

    lib.close(d).unwrap();
    lib.close(g).unwrap();
    lib.close(fid).unwrap();
    assert_eq!(lib.open_store_count(), 0);
}

#[test]
fn weak_close_waits_for_the_last_object() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "weak.h5");
    let lib = lib();
    let fapl = FileAccessProps::default().close_degree(CloseDegree::Weak);

    let fid = create_rw(&lib, &name, &fapl);
    let g = lib.group_create(fid, "g").unwrap();
    lib.close(fid).unwrap();
    assert!(!lib.is_valid(fid));
    assert_eq!(lib.open_store_count(), 1);

    let inner = lib.group_create(g, "inner").unwrap();
    lib.close(inner).unwrap();
    lib.close(g).unwrap();
    assert_eq!(lib.open_store_count(), 0);
}

#[test]
fn joining_with_another_degree_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let name = path_in(dir.path(), "degrees.h5");
    let lib = lib();
    let fid = create_rw(&lib, &name, &FileAccessProps::default().close_degree(CloseDegree::Semi));

    let strong = FileAccessProps::default().close_degree(CloseDegree::Strong);
    let err = lib.file_open(&name, hdfcore::AccessFlags::RDWR, &strong).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);

    let any = lib
        .file_open(&name, hdfcore::AccessFlags::RDWR, &FileAccessProps::default())
        .unwrap();
    lib.close(any).unwrap();
    lib.close(fid).unwrap();
}

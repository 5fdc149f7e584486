use hdfcore_io::hdfcore_format::UNDEFINED_ADDR;
use hdfcore_io::{AccessFlags, DriverClass, DriverError, MemType, MemoryClass, Sec2Class};

#[cfg(unix)]
#[test]
fn exclusive_lock_blocks_second_opener() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locked.h5");
    let name = path.to_str().unwrap();

    let mut writer = Sec2Class
        .open(name, AccessFlags::RDWR | AccessFlags::CREATE, UNDEFINED_ADDR)
        .unwrap();
    writer.lock(true).unwrap();

    let mut reader = Sec2Class.open(name, AccessFlags::RDONLY, UNDEFINED_ADDR).unwrap();
    match reader.lock(false) {
        Err(DriverError::Locked(_)) | Err(DriverError::LockUnsupported) => {}
        other => panic!("expected lock conflict, got {other:?}"),
    }

    writer.unlock().unwrap();
    writer.close().unwrap();
    // Released on close; a shared lock now succeeds unless locking is
    // unavailable on this filesystem.
    match reader.lock(false) {
        Ok(()) | Err(DriverError::LockUnsupported) => {}
        other => panic!("unexpected {other:?}"),
    }
    reader.close().unwrap();
}

#[test]
fn shared_locks_coexist() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.h5");
    std::fs::write(&path, [0u8; 8]).unwrap();
    let name = path.to_str().unwrap();
    let mut a = Sec2Class.open(name, AccessFlags::RDONLY, UNDEFINED_ADDR).unwrap();
    let mut b = Sec2Class.open(name, AccessFlags::RDONLY, UNDEFINED_ADDR).unwrap();
    for d in [&mut a, &mut b] {
        match d.lock(false) {
            Ok(()) | Err(DriverError::LockUnsupported) => {}
            Err(DriverError::Unsupported(_)) if !cfg!(unix) => {}
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn memory_class_has_no_identity() {
    let class = MemoryClass::new();
    assert!(!class.supports_identity());
    class.insert_image("img", vec![0; 4]);
    assert_eq!(class.probe("img").unwrap(), None);
    let d = class.open("img", AccessFlags::RDONLY, UNDEFINED_ADDR).unwrap();
    assert_eq!(d.eof(MemType::Raw), 4);
}

#[test]
fn posix_path_is_resolved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p.h5");
    std::fs::write(&path, b"").unwrap();
    let d = Sec2Class
        .open(path.to_str().unwrap(), AccessFlags::RDONLY, UNDEFINED_ADDR)
        .unwrap();
    let resolved = d.posix_path().unwrap();
    assert!(resolved.is_absolute());
    assert!(resolved.ends_with("p.h5"));
}

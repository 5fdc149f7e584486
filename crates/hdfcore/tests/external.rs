mod common;

use std::collections::HashMap;

use common::{create_rw, make_file, path_in};
use hdfcore::{
    AccessFlags, Category, ErrorKind, FileAccessProps, Library, LibraryConfig, LinkAccessProps,
    LinkKind, PREFIX_SEPARATOR,
};

fn lib_with_prefix(prefix: &str) -> Library {
    common::init_tracing();
    let env: HashMap<&str, String> = [("HDF5_EXT_PREFIX", prefix.to_string())].into();
    Library::with_config(LibraryConfig::from_lookup(|k| env.get(k).cloned()))
}

struct Dirs {
    a: tempfile::TempDir,
    b: tempfile::TempDir,
    home: tempfile::TempDir,
}

impl Dirs {
    fn new() -> Self {
        Self {
            a: tempfile::tempdir().unwrap(),
            b: tempfile::tempdir().unwrap(),
            home: tempfile::tempdir().unwrap(),
        }
    }

    fn prefix(&self) -> String {
        format!(
            "{}{PREFIX_SEPARATOR}{}",
            self.a.path().display(),
            self.b.path().display()
        )
    }
}

#[test]
fn prefix_list_is_searched_in_order() {
    let dirs = Dirs::new();
    let lib = lib_with_prefix(&dirs.prefix());
    make_file(&lib, &path_in(dirs.b.path(), "child.h5"));
    let parent = create_rw(&lib, &path_in(dirs.home.path(), "parent.h5"), &FileAccessProps::default());

    let (found, attempts) = lib
        .file_open_external(parent, "child.h5", &LinkAccessProps::default(), false)
        .unwrap();
    let child = found.unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].path, dirs.a.path().join("child.h5"));
    assert!(!attempts[0].ok);
    assert_eq!(attempts[1].path, dirs.b.path().join("child.h5"));
    assert!(attempts[1].ok);

    // The external file inherits the parent's write intent.
    assert!(lib.file_intent(child).unwrap().contains(AccessFlags::RDWR));
    lib.close(child).unwrap();
    lib.close(parent).unwrap();
}

#[test]
fn missing_external_file() {
    let dirs = Dirs::new();
    let lib = lib_with_prefix(&dirs.prefix());
    let parent = create_rw(&lib, &path_in(dirs.home.path(), "parent.h5"), &FileAccessProps::default());

    let (found, attempts) = lib
        .file_open_external(parent, "absent.h5", &LinkAccessProps::default(), true)
        .unwrap();
    assert!(found.is_none());
    assert!(attempts.len() >= 3);
    assert!(attempts.iter().all(|a| !a.ok));

    let err = lib
        .file_open_external(parent, "absent.h5", &LinkAccessProps::default(), false)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.category, Category::Link);
    lib.close(parent).unwrap();
}

#[test]
fn property_prefix_is_used_without_the_environment() {
    let dirs = Dirs::new();
    let lib = common::lib();
    make_file(&lib, &path_in(dirs.b.path(), "child.h5"));
    let parent = create_rw(&lib, &path_in(dirs.home.path(), "parent.h5"), &FileAccessProps::default());

    let lapl = LinkAccessProps::new().ext_prefix(&dirs.b.path().display().to_string());
    let (found, attempts) = lib.file_open_external(parent, "child.h5", &lapl, false).unwrap();
    assert_eq!(attempts.len(), 1);
    lib.close(found.unwrap()).unwrap();
    lib.close(parent).unwrap();
}

#[test]
fn external_links_are_traversed() {
    let dirs = Dirs::new();
    let lib = lib_with_prefix(&dirs.prefix());
    let child = create_rw(&lib, &path_in(dirs.b.path(), "child.h5"), &FileAccessProps::default());
    let inner = lib.group_create(child, "inner").unwrap();
    lib.close(inner).unwrap();
    lib.close(child).unwrap();

    let parent = create_rw(&lib, &path_in(dirs.home.path(), "parent.h5"), &FileAccessProps::default());
    lib.link_create_external("child.h5", "/inner", parent, "ext").unwrap();
    let info = lib.link_info(parent, "ext").unwrap();
    assert_eq!(info.kind, LinkKind::External);

    let g = lib.group_open(parent, "ext").unwrap();
    let leaf = lib.group_create(g, "leaf").unwrap();
    lib.close(leaf).unwrap();
    lib.close(g).unwrap();
    lib.file_clear_external_cache(parent).unwrap();
    lib.close(parent).unwrap();

    let child = lib
        .file_open(&path_in(dirs.b.path(), "child.h5"), AccessFlags::RDONLY, &FileAccessProps::default())
        .unwrap();
    assert!(lib.link_exists(child, "inner/leaf").unwrap());
    lib.close(child).unwrap();
}

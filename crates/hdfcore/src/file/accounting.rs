//! Counting and listing the open identifiers of a file.

use std::ops::ControlFlow;
use std::sync::Arc;

use super::FileTop;
use crate::ids::{Hid, IdKind};
use crate::library::Library;
use crate::native::NativeObject;
use crate::vol::{dispatch, ObjTypes};

const KINDS: [(ObjTypes, IdKind); 5] = [
    (ObjTypes::FILE, IdKind::File),
    (ObjTypes::DATASET, IdKind::Dataset),
    (ObjTypes::GROUP, IdKind::Group),
    (ObjTypes::DATATYPE, IdKind::Datatype),
    (ObjTypes::ATTR, IdKind::Attr),
];

/// Identifiers of the requested kinds whose objects live in `top`'s store,
/// or only under `top` itself with [`ObjTypes::LOCAL`]. Stops after `max`.
pub(crate) fn open_ids(lib: &Library, top: &Arc<FileTop>, types: ObjTypes, max: Option<usize>) -> Vec<Hid> {
    let local = types.contains(ObjTypes::LOCAL);
    let limit = max.unwrap_or(usize::MAX);
    let mut out = Vec::new();
    for (flag, kind) in KINDS {
        if !types.contains(flag) {
            continue;
        }
        let full = lib.ids().iterate(kind, |hid, obj| {
            if out.len() >= limit {
                return ControlFlow::Break(());
            }
            if let Some(native) = dispatch::terminal(obj).data.downcast::<NativeObject>() {
                let owner = native.top();
                let matches = if local {
                    Arc::ptr_eq(owner, top)
                } else {
                    Arc::ptr_eq(&owner.shared, &top.shared)
                };
                if matches {
                    out.push(hid);
                }
            }
            ControlFlow::Continue(())
        });
        if full.is_some() {
            break;
        }
    }
    out
}

pub(crate) fn open_count(lib: &Library, top: &Arc<FileTop>, types: ObjTypes) -> usize {
    open_ids(lib, top, types, None).len()
}

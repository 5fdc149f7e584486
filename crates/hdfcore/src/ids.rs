//! Identifier tables.
//!
//! Every user-visible handle is an [`Hid`]: a serial number with the object
//! kind in its top byte. Each kind has its own table mapping identifiers to
//! the connector-level object and a reference count. Iteration works on a
//! snapshot, so callbacks may open or close identifiers freely.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::ControlFlow;

use parking_lot::Mutex;
use tracing::error;

use crate::error::{Category, Error, Result};
use crate::vol::IdObject;

const KIND_SHIFT: u32 = 56;
const SERIAL_MASK: u64 = (1 << KIND_SHIFT) - 1;

/// Kind of object an identifier names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdKind {
    File = 1,
    Group = 2,
    Dataset = 3,
    Datatype = 4,
    Attr = 5,
    Request = 6,
    Connector = 7,
}

impl IdKind {
    pub const ALL: [IdKind; 7] = [
        IdKind::File,
        IdKind::Group,
        IdKind::Dataset,
        IdKind::Datatype,
        IdKind::Attr,
        IdKind::Request,
        IdKind::Connector,
    ];

    fn from_code(code: u64) -> Option<Self> {
        IdKind::ALL.into_iter().find(|k| *k as u64 == code)
    }
}

/// Identifier of an open object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hid(u64);

impl Hid {
    pub const INVALID: Hid = Hid(0);

    fn new(kind: IdKind, serial: u64) -> Self {
        Hid(((kind as u64) << KIND_SHIFT) | (serial & SERIAL_MASK))
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        Hid(raw)
    }

    pub fn kind(self) -> Option<IdKind> {
        IdKind::from_code(self.0 >> KIND_SHIFT)
    }
}

impl fmt::Debug for Hid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "Hid({kind:?}#{})", self.0 & SERIAL_MASK),
            None => write!(f, "Hid(invalid {:#x})", self.0),
        }
    }
}

struct Entry {
    object: IdObject,
    refcount: u32,
}

#[derive(Default)]
struct Tables {
    next_serial: u64,
    by_kind: HashMap<IdKind, BTreeMap<Hid, Entry>>,
}

#[derive(Default)]
pub(crate) struct IdTables {
    inner: Mutex<Tables>,
}

fn bad_id(hid: Hid) -> Error {
    Error::args(Category::Id, format!("invalid identifier {hid:?}"))
}

impl IdTables {
    pub fn register(&self, kind: IdKind, object: IdObject) -> Hid {
        let mut t = self.inner.lock();
        t.next_serial += 1;
        let hid = Hid::new(kind, t.next_serial);
        t.by_kind
            .entry(kind)
            .or_default()
            .insert(hid, Entry { object, refcount: 1 });
        hid
    }

    pub fn get(&self, hid: Hid) -> Result<IdObject> {
        let kind = hid.kind().ok_or_else(|| bad_id(hid))?;
        let t = self.inner.lock();
        t.by_kind
            .get(&kind)
            .and_then(|m| m.get(&hid))
            .map(|e| e.object.clone())
            .ok_or_else(|| bad_id(hid))
    }

    /// Look up an identifier that must be of one of `kinds`.
    pub fn get_as(&self, hid: Hid, kinds: &[IdKind]) -> Result<IdObject> {
        match hid.kind() {
            Some(k) if kinds.contains(&k) => self.get(hid),
            _ => Err(Error::args(
                Category::Id,
                format!("{hid:?} is not one of {kinds:?}"),
            )),
        }
    }

    pub fn contains(&self, hid: Hid) -> bool {
        self.get(hid).is_ok()
    }

    pub fn ref_count(&self, hid: Hid) -> Result<u32> {
        let kind = hid.kind().ok_or_else(|| bad_id(hid))?;
        let t = self.inner.lock();
        t.by_kind
            .get(&kind)
            .and_then(|m| m.get(&hid))
            .map(|e| e.refcount)
            .ok_or_else(|| bad_id(hid))
    }

    pub fn inc_ref(&self, hid: Hid) -> Result<u32> {
        let kind = hid.kind().ok_or_else(|| bad_id(hid))?;
        let mut t = self.inner.lock();
        let entry = t
            .by_kind
            .get_mut(&kind)
            .and_then(|m| m.get_mut(&hid))
            .ok_or_else(|| bad_id(hid))?;
        entry.refcount += 1;
        Ok(entry.refcount)
    }

    /// Drop one reference. When the count reaches zero the entry is removed
    /// and its object returned for closing.
    pub fn dec_ref(&self, hid: Hid) -> Result<(u32, Option<IdObject>)> {
        let kind = hid.kind().ok_or_else(|| bad_id(hid))?;
        let mut t = self.inner.lock();
        let map = t.by_kind.get_mut(&kind).ok_or_else(|| bad_id(hid))?;
        let entry = map.get_mut(&hid).ok_or_else(|| bad_id(hid))?;
        if entry.refcount == 0 {
            error!(?hid, "identifier reference count underflow");
            return Err(Error::internal(Category::Id, "reference count underflow"));
        }
        entry.refcount -= 1;
        if entry.refcount > 0 {
            return Ok((entry.refcount, None));
        }
        Ok((0, map.remove(&hid).map(|e| e.object)))
    }

    /// Remove regardless of the reference count.
    pub fn remove(&self, hid: Hid) -> Option<IdObject> {
        let kind = hid.kind()?;
        let mut t = self.inner.lock();
        t.by_kind.get_mut(&kind)?.remove(&hid).map(|e| e.object)
    }

    /// Point an existing identifier at a new object, keeping its count.
    pub fn replace(&self, hid: Hid, object: IdObject) -> Result<()> {
        let kind = hid.kind().ok_or_else(|| bad_id(hid))?;
        let mut t = self.inner.lock();
        let entry = t
            .by_kind
            .get_mut(&kind)
            .and_then(|m| m.get_mut(&hid))
            .ok_or_else(|| bad_id(hid))?;
        entry.object = object;
        Ok(())
    }

    pub fn snapshot(&self, kind: IdKind) -> Vec<(Hid, IdObject)> {
        let t = self.inner.lock();
        t.by_kind
            .get(&kind)
            .map(|m| m.iter().map(|(h, e)| (*h, e.object.clone())).collect())
            .unwrap_or_default()
    }

    /// Visit every identifier of `kind` until the callback breaks.
    pub fn iterate<B>(
        &self,
        kind: IdKind,
        mut f: impl FnMut(Hid, &IdObject) -> ControlFlow<B>,
    ) -> Option<B> {
        for (hid, obj) in self.snapshot(kind) {
            if let ControlFlow::Break(b) = f(hid, &obj) {
                return Some(b);
            }
        }
        None
    }

    pub fn count(&self, kind: IdKind) -> usize {
        self.inner.lock().by_kind.get(&kind).map_or(0, |m| m.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::NativeConnector;
    use crate::vol::VolObject;
    use std::sync::Arc;

    fn obj() -> IdObject {
        IdObject {
            connector: Arc::new(NativeConnector::new()),
            data: VolObject::new(7u32),
        }
    }

    #[test]
    fn kind_in_high_bits() {
        let ids = IdTables::default();
        let h = ids.register(IdKind::Dataset, obj());
        assert_eq!(h.kind(), Some(IdKind::Dataset));
        assert!(ids.get_as(h, &[IdKind::Group]).is_err());
        assert!(ids.get_as(h, &[IdKind::Dataset]).is_ok());
        assert_eq!(Hid::INVALID.kind(), None);
    }

    #[test]
    fn refcounts() {
        let ids = IdTables::default();
        let h = ids.register(IdKind::Group, obj());
        assert_eq!(ids.inc_ref(h).unwrap(), 2);
        let (n, gone) = ids.dec_ref(h).unwrap();
        assert_eq!(n, 1);
        assert!(gone.is_none());
        let (n, gone) = ids.dec_ref(h).unwrap();
        assert_eq!(n, 0);
        assert!(gone.is_some());
        assert!(!ids.contains(h));
        assert!(ids.dec_ref(h).is_err());
    }

    #[test]
    fn iteration_tolerates_mutation() {
        let ids = IdTables::default();
        for _ in 0..4 {
            ids.register(IdKind::Attr, obj());
        }
        let mut seen = 0;
        let stopped = ids.iterate(IdKind::Attr, |hid, _| {
            ids.remove(hid);
            seen += 1;
            if seen == 3 {
                ControlFlow::Break(hid)
            } else {
                ControlFlow::Continue(())
            }
        });
        assert!(stopped.is_some());
        assert_eq!(ids.count(IdKind::Attr), 1);
    }
}

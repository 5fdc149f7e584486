//! External file cache.
//!
//! Each shared file keeps the handles of files it reached through external
//! links, keyed by the name in the link, so repeated traversals skip the
//! open. Entries hold a handle; releasing the entry lets the handle close.
//! Caches can reference each other in a cycle, which a plain reference
//! count never unwinds; [`only_cycles`] finds the case where the only
//! remaining references to a file come from such caches.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{close, FileTop, SharedFile};
use crate::error::Result;
use crate::vol::CallCtx;

struct Entry {
    name: String,
    top: Arc<FileTop>,
    last_use: u64,
    /// Traversals currently using the entry.
    nopen: u32,
}

pub(crate) struct ExternalFileCache {
    max: usize,
    entries: Vec<Entry>,
    tick: u64,
}

impl ExternalFileCache {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            entries: Vec::new(),
            tick: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.max
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn lookup(&mut self, name: &str) -> Option<Arc<FileTop>> {
        self.tick += 1;
        let tick = self.tick;
        let e = self.entries.iter_mut().find(|e| e.name == name)?;
        e.last_use = tick;
        e.nopen += 1;
        Some(e.top.clone())
    }

    /// Cache `top` under `name`, in use by the caller. Returns the handles
    /// evicted to make room, or gives `top` back when the cache is full of
    /// entries in use.
    pub fn insert(
        &mut self,
        name: &str,
        top: Arc<FileTop>,
    ) -> std::result::Result<Vec<Arc<FileTop>>, Arc<FileTop>> {
        if self.capacity() == 0 {
            return Err(top);
        }
        let mut evicted = Vec::new();
        while self.len() >= self.capacity() {
            let victim = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.nopen == 0)
                .min_by_key(|(_, e)| e.last_use)
                .map(|(i, _)| i);
            match victim {
                Some(i) => {
                    let e = self.entries.swap_remove(i);
                    debug!(name = %e.name, "external file evicted");
                    evicted.push(e.top);
                }
                None => return Err(top),
            }
        }
        self.tick += 1;
        self.entries.push(Entry {
            name: name.to_string(),
            top,
            last_use: self.tick,
            nopen: 1,
        });
        debug!(name, cached = self.len(), capacity = self.capacity(), "external file cached");
        Ok(evicted)
    }

    /// A traversal is done with `top`.
    pub fn release(&mut self, top: &Arc<FileTop>) {
        if let Some(e) = self.entries.iter_mut().find(|e| Arc::ptr_eq(&e.top, top)) {
            e.nopen = e.nopen.saturating_sub(1);
        }
    }

    /// Remove every entry not in use.
    pub fn take_unused(&mut self) -> Vec<Arc<FileTop>> {
        let (unused, kept): (Vec<Entry>, Vec<Entry>) =
            std::mem::take(&mut self.entries).into_iter().partition(|e| e.nopen == 0);
        self.entries = kept;
        unused.into_iter().map(|e| e.top).collect()
    }

    pub fn take_all(&mut self) -> Vec<Arc<FileTop>> {
        std::mem::take(&mut self.entries).into_iter().map(|e| e.top).collect()
    }

    fn shared_targets(&self) -> Vec<Arc<SharedFile>> {
        self.entries.iter().map(|e| e.top.shared.clone()).collect()
    }
}

/// Drop a cache's hold on `top` and let it close if nothing else needs it.
pub(crate) fn release_top(cx: &mut CallCtx, top: &Arc<FileTop>) -> Result<()> {
    {
        let mut t = top.state.lock();
        t.efc_holds = t.efc_holds.saturating_sub(1);
    }
    close::try_close(cx, top)
}

/// True when every reference to `root` except one, and every reference to
/// each file reachable from its cache, comes from a cache entry inside that
/// reachable set.
pub(crate) fn only_cycles(root: &Arc<SharedFile>) -> bool {
    let key = |s: &Arc<SharedFile>| Arc::as_ptr(s) as usize;
    let mut nodes: HashMap<usize, Arc<SharedFile>> = HashMap::new();
    let mut held: HashMap<usize, u32> = HashMap::new();
    let mut queue = vec![root.clone()];
    nodes.insert(key(root), root.clone());
    while let Some(node) = queue.pop() {
        let targets = node.state.lock().efc.shared_targets();
        for t in targets {
            *held.entry(key(&t)).or_insert(0) += 1;
            if !nodes.contains_key(&key(&t)) {
                nodes.insert(key(&t), t.clone());
                queue.push(t);
            }
        }
    }
    if nodes.len() == 1 && held.is_empty() {
        return false;
    }
    nodes.iter().all(|(k, node)| {
        let nrefs = node.state.lock().nrefs;
        let held = held.get(k).copied().unwrap_or(0);
        if *k == key(root) {
            held + 1 == nrefs
        } else {
            held == nrefs
        }
    })
}

/// Release the cache entries of `shared` that no traversal is using.
pub(crate) fn clear(cx: &mut CallCtx, shared: &Arc<SharedFile>) -> Result<()> {
    let unused = shared.state.lock().efc.take_unused();
    let mut errs = super::FirstError::default();
    for t in unused {
        errs.note("release external file", release_top(cx, &t));
    }
    errs.into_result()
}

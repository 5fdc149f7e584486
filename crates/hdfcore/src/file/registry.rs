//! Shared-file registry: store identity to live shared state.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use hdfcore_io::FileIdentity;
use parking_lot::Mutex;
use tracing::{debug, error};

use super::SharedFile;

#[derive(Default)]
pub(crate) struct SharedRegistry {
    entries: Mutex<HashMap<FileIdentity, Weak<SharedFile>>>,
}

impl SharedRegistry {
    pub fn search(&self, identity: &FileIdentity) -> Option<Arc<SharedFile>> {
        let mut entries = self.entries.lock();
        match entries.get(identity).map(Weak::upgrade) {
            Some(Some(shared)) => Some(shared),
            Some(None) => {
                entries.remove(identity);
                None
            }
            None => None,
        }
    }

    pub fn add(&self, identity: FileIdentity, shared: &Arc<SharedFile>) {
        let mut entries = self.entries.lock();
        if entries.get(&identity).and_then(Weak::upgrade).is_some() {
            error!(%identity, "store registered twice");
        }
        debug!(%identity, "shared file registered");
        entries.insert(identity, Arc::downgrade(shared));
    }

    pub fn remove(&self, identity: &FileIdentity) {
        if self.entries.lock().remove(identity).is_some() {
            debug!(%identity, "shared file unregistered");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

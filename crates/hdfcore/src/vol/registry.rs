//! Registered connectors, reference counted by name.

use parking_lot::Mutex;
use tracing::{debug, info};

use super::ConnectorRef;
use crate::ids::Hid;

struct Registered {
    connector: ConnectorRef,
    hid: Hid,
}

#[derive(Default)]
pub(crate) struct ConnectorRegistry {
    entries: Mutex<Vec<Registered>>,
}

impl ConnectorRegistry {
    /// Identifier of an already registered connector with this name.
    pub fn find_name(&self, name: &str) -> Option<(Hid, ConnectorRef)> {
        self.entries
            .lock()
            .iter()
            .find(|r| r.connector.name() == name)
            .map(|r| (r.hid, r.connector.clone()))
    }

    pub fn find_value(&self, value: u32) -> Option<(Hid, ConnectorRef)> {
        self.entries
            .lock()
            .iter()
            .find(|r| r.connector.value() == value)
            .map(|r| (r.hid, r.connector.clone()))
    }

    pub fn add(&self, connector: ConnectorRef, hid: Hid) {
        info!(name = connector.name(), value = connector.value(), "connector registered");
        self.entries.lock().push(Registered { connector, hid });
    }

    pub fn remove(&self, hid: Hid) -> Option<ConnectorRef> {
        let mut entries = self.entries.lock();
        let pos = entries.iter().position(|r| r.hid == hid)?;
        let r = entries.remove(pos);
        debug!(name = r.connector.name(), "connector unregistered");
        Some(r.connector)
    }

    /// Registered connectors in registration order.
    pub fn snapshot(&self) -> Vec<ConnectorRef> {
        self.entries.lock().iter().map(|r| r.connector.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

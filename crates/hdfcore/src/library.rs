//! The library context.
//!
//! Everything process-wide lives here: the identifier tables, the
//! registered connectors, the shared-file registry and the configuration
//! read from the environment. A [`Library`] is a cheap handle; clones share
//! one context. Independent contexts do not see each other's files.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::LibraryConfig;
use crate::file::registry::SharedRegistry;
use crate::ids::{Hid, IdKind, IdTables};
use crate::native::NativeConnector;
use crate::vol::registry::ConnectorRegistry;
use crate::vol::{ConnectorRef, IdObject, VolObject};

struct LibraryInner {
    config: LibraryConfig,
    ids: IdTables,
    connectors: ConnectorRegistry,
    files: SharedRegistry,
    native: ConnectorRef,
    native_id: Hid,
}

#[derive(Clone)]
pub struct Library(Arc<LibraryInner>);

impl Library {
    /// A context configured from the process environment.
    pub fn new() -> Self {
        Self::with_config(LibraryConfig::from_env())
    }

    pub fn with_config(config: LibraryConfig) -> Self {
        let ids = IdTables::default();
        let connectors = ConnectorRegistry::default();
        let native: ConnectorRef = Arc::new(NativeConnector::new());
        let native_id = ids.register(
            IdKind::Connector,
            IdObject::new(native.clone(), VolObject::new(())),
        );
        connectors.add(native.clone(), native_id);
        debug!(?config, "library context created");
        Library(Arc::new(LibraryInner {
            config,
            ids,
            connectors,
            files: SharedRegistry::default(),
            native,
            native_id,
        }))
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.0.config
    }

    /// Identifier of the built-in native connector.
    pub fn native_connector_id(&self) -> Hid {
        self.0.native_id
    }

    pub(crate) fn native(&self) -> ConnectorRef {
        self.0.native.clone()
    }

    pub(crate) fn ids(&self) -> &IdTables {
        &self.0.ids
    }

    pub(crate) fn connectors(&self) -> &ConnectorRegistry {
        &self.0.connectors
    }

    pub(crate) fn files(&self) -> &SharedRegistry {
        &self.0.files
    }

    /// Number of distinct backing stores currently open.
    pub fn open_store_count(&self) -> usize {
        self.0.files.len()
    }

    pub fn ptr_eq(&self, other: &Library) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Library {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("config", &self.0.config)
            .field("connectors", &self.0.connectors.len())
            .field("open_stores", &self.0.files.len())
            .finish()
    }
}

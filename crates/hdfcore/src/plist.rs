//! Property lists for configuring file creation, file access, links and
//! datasets.
//!
//! Each list is a plain struct with public fields, a `Default`, and chained
//! setters.

use std::fmt;
use std::sync::Arc;

use hdfcore_io::{CloseDegree, DriverClass, Sec2Class};

use crate::config::LockingPolicy;
use crate::ids::Hid;
use crate::vol::ConnectorRef;

/// Library format versions, used as lower/upper bounds on what a file may
/// contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LibVersion {
    Earliest,
    V18,
    V110,
    V112,
    V114,
    V200,
}

impl LibVersion {
    pub const LATEST: LibVersion = LibVersion::V200;

    /// Lowest datatype descriptor version files at this bound are written
    /// with.
    pub fn datatype_version(self) -> u8 {
        match self {
            LibVersion::Earliest => 1,
            LibVersion::V18 | LibVersion::V110 | LibVersion::V112 | LibVersion::V114 => 3,
            LibVersion::V200 => 5,
        }
    }

    /// Highest datatype descriptor version files at this bound may contain.
    pub fn max_datatype_version(self) -> u8 {
        match self {
            LibVersion::Earliest => 1,
            LibVersion::V18 | LibVersion::V110 => 3,
            LibVersion::V112 | LibVersion::V114 => 4,
            LibVersion::V200 => 5,
        }
    }
}

/// Free-space management strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FsStrategy {
    #[default]
    FsmAggregators,
    Page,
    Aggregators,
    None,
}

/// File creation properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCreateProps {
    /// Size of file addresses (2, 4 or 8).
    pub offset_size: u8,
    /// Size of lengths (2, 4 or 8).
    pub length_size: u8,
    /// Number of shared object header message indexes.
    pub shared_msg_indexes: u8,
    pub fs_strategy: FsStrategy,
    /// File space page size for paged aggregation.
    pub page_size: u64,
}

impl Default for FileCreateProps {
    fn default() -> Self {
        Self {
            offset_size: 8,
            length_size: 8,
            shared_msg_indexes: 0,
            fs_strategy: FsStrategy::default(),
            page_size: 4096,
        }
    }
}

impl FileCreateProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sizes(mut self, offset_size: u8, length_size: u8) -> Self {
        self.offset_size = offset_size;
        self.length_size = length_size;
        self
    }

    pub fn shared_msg_indexes(mut self, n: u8) -> Self {
        self.shared_msg_indexes = n;
        self
    }

    pub fn fs_strategy(mut self, strategy: FsStrategy, page_size: u64) -> Self {
        self.fs_strategy = strategy;
        self.page_size = page_size;
        self
    }
}

/// Callback run when an object is flushed.
pub type ObjectFlushCallback = Arc<dyn Fn(Hid) -> bool + Send + Sync>;

/// File access properties.
#[derive(Clone)]
pub struct FileAccessProps {
    pub driver: Arc<dyn DriverClass>,
    /// Connector to open the file through; the native connector when unset.
    pub connector: Option<ConnectorRef>,
    /// Metadata cache budget in bytes.
    pub mdc_bytes: usize,
    /// Size of the metadata aggregation block.
    pub meta_block_size: u64,
    /// Allocations of at least `alignment_threshold` bytes start on a
    /// multiple of `alignment`.
    pub alignment_threshold: u64,
    pub alignment: u64,
    /// Metadata read attempts; `None` picks 1, or 100 under SWMR.
    pub read_attempts: Option<u32>,
    pub low_bound: LibVersion,
    pub high_bound: LibVersion,
    pub close_degree: CloseDegree,
    pub use_file_locking: bool,
    pub ignore_disabled_locks: bool,
    /// Page buffer size in bytes; zero disables page buffering.
    pub page_buffer_bytes: u64,
    pub evict_on_close: bool,
    /// Ask for a metadata cache image to be written at close.
    pub cache_image: bool,
    /// Accept numeric types with unusual unused-bit layouts.
    pub relaxed_integrity: bool,
    /// Maximum number of files held open by the external file cache.
    pub efc_size: usize,
    pub object_flush_cb: Option<ObjectFlushCallback>,
}

impl Default for FileAccessProps {
    fn default() -> Self {
        Self {
            driver: Arc::new(Sec2Class::new()),
            connector: None,
            mdc_bytes: 2 * 1024 * 1024,
            meta_block_size: 2048,
            alignment_threshold: 1,
            alignment: 1,
            read_attempts: None,
            low_bound: LibVersion::Earliest,
            high_bound: LibVersion::LATEST,
            close_degree: CloseDegree::Default,
            use_file_locking: true,
            ignore_disabled_locks: true,
            page_buffer_bytes: 0,
            evict_on_close: false,
            cache_image: false,
            relaxed_integrity: false,
            efc_size: 16,
            object_flush_cb: None,
        }
    }
}

impl FileAccessProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driver(mut self, driver: Arc<dyn DriverClass>) -> Self {
        self.driver = driver;
        self
    }

    pub fn connector(mut self, connector: ConnectorRef) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn close_degree(mut self, degree: CloseDegree) -> Self {
        self.close_degree = degree;
        self
    }

    pub fn libver_bounds(mut self, low: LibVersion, high: LibVersion) -> Self {
        self.low_bound = low;
        self.high_bound = high;
        self
    }

    pub fn file_locking(mut self, use_locking: bool, ignore_when_disabled: bool) -> Self {
        self.use_file_locking = use_locking;
        self.ignore_disabled_locks = ignore_when_disabled;
        self
    }

    pub fn locking_policy(&self) -> LockingPolicy {
        LockingPolicy::from_props(self.use_file_locking, self.ignore_disabled_locks)
    }

    pub fn mdc_bytes(mut self, bytes: usize) -> Self {
        self.mdc_bytes = bytes;
        self
    }

    pub fn meta_block_size(mut self, size: u64) -> Self {
        self.meta_block_size = size;
        self
    }

    pub fn alignment(mut self, threshold: u64, alignment: u64) -> Self {
        self.alignment_threshold = threshold;
        self.alignment = alignment.max(1);
        self
    }

    pub fn read_attempts(mut self, attempts: u32) -> Self {
        self.read_attempts = Some(attempts.max(1));
        self
    }

    pub fn page_buffer(mut self, bytes: u64) -> Self {
        self.page_buffer_bytes = bytes;
        self
    }

    pub fn evict_on_close(mut self, evict: bool) -> Self {
        self.evict_on_close = evict;
        self
    }

    pub fn cache_image(mut self, enabled: bool) -> Self {
        self.cache_image = enabled;
        self
    }

    pub fn relaxed_integrity(mut self, relaxed: bool) -> Self {
        self.relaxed_integrity = relaxed;
        self
    }

    pub fn efc_size(mut self, size: usize) -> Self {
        self.efc_size = size;
        self
    }

    pub fn object_flush_cb(mut self, cb: ObjectFlushCallback) -> Self {
        self.object_flush_cb = Some(cb);
        self
    }
}

impl fmt::Debug for FileAccessProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileAccessProps")
            .field("driver", &self.driver.name())
            .field("connector", &self.connector.as_ref().map(|c| c.name().to_string()))
            .field("low_bound", &self.low_bound)
            .field("high_bound", &self.high_bound)
            .field("close_degree", &self.close_degree)
            .field("use_file_locking", &self.use_file_locking)
            .field("page_buffer_bytes", &self.page_buffer_bytes)
            .field("evict_on_close", &self.evict_on_close)
            .finish_non_exhaustive()
    }
}

/// Link access properties.
#[derive(Debug, Clone)]
pub struct LinkAccessProps {
    /// Prefix tried when resolving external-link targets.
    pub ext_prefix: Option<String>,
    /// Soft-link traversals allowed in one lookup.
    pub max_soft_links: u32,
    /// Access properties for external-link targets; inherits the parent
    /// file's driver when unset.
    pub ext_fapl: Option<FileAccessProps>,
}

impl Default for LinkAccessProps {
    fn default() -> Self {
        Self {
            ext_prefix: None,
            max_soft_links: 16,
            ext_fapl: None,
        }
    }
}

impl LinkAccessProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ext_prefix(mut self, prefix: &str) -> Self {
        self.ext_prefix = Some(prefix.to_string());
        self
    }

    pub fn max_soft_links(mut self, n: u32) -> Self {
        self.max_soft_links = n;
        self
    }

    pub fn ext_fapl(mut self, fapl: FileAccessProps) -> Self {
        self.ext_fapl = Some(fapl);
        self
    }
}

/// Dataset access properties.
#[derive(Debug, Clone, Default)]
pub struct DatasetAccessProps {
    /// Prefix tried when resolving virtual-dataset source files.
    pub vds_prefix: Option<String>,
}

/// Dataset creation properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetCreateProps {
    /// Maximum dimensions; defaults to the creation dimensions.
    pub max_dims: Option<Vec<u64>>,
}

impl DatasetCreateProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_dims(mut self, dims: &[u64]) -> Self {
        self.max_dims = Some(dims.to_vec());
        self
    }
}

/// Transfer properties passed through every dispatched call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferProps {
    /// Opaque connector-specific settings.
    pub settings: Vec<(String, String)>,
}

impl TransferProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.settings.push((key.to_string(), value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.settings
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_order() {
        assert!(LibVersion::Earliest < LibVersion::V110);
        assert_eq!(LibVersion::LATEST, LibVersion::V200);
        assert_eq!(LibVersion::V18.datatype_version(), 3);
    }

    #[test]
    fn fapl_chaining() {
        let fapl = FileAccessProps::new()
            .close_degree(CloseDegree::Strong)
            .file_locking(true, false)
            .alignment(1024, 0);
        assert_eq!(fapl.close_degree, CloseDegree::Strong);
        assert_eq!(fapl.locking_policy(), LockingPolicy::Strict);
        assert_eq!(fapl.alignment, 1);
    }

    #[test]
    fn transfer_settings_last_wins() {
        let dxpl = TransferProps::new().set("k", "1").set("k", "2");
        assert_eq!(dxpl.get("k"), Some("2"));
        assert_eq!(dxpl.get("missing"), None);
    }
}

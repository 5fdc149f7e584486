//! Library configuration read from the environment.

use tracing::warn;

pub const ENV_FILE_LOCKING: &str = "HDF5_USE_FILE_LOCKING";
pub const ENV_EXT_PREFIX: &str = "HDF5_EXT_PREFIX";
pub const ENV_VDS_PREFIX: &str = "HDF5_VDS_PREFIX";

/// File locking behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockingPolicy {
    Disabled,
    /// Lock and fail when the filesystem cannot lock.
    Strict,
    /// Lock, but carry on when the filesystem has locking disabled.
    BestEffort,
}

impl LockingPolicy {
    /// Policy from the per-file access properties.
    pub fn from_props(use_locking: bool, ignore_when_disabled: bool) -> Self {
        match (use_locking, ignore_when_disabled) {
            (false, _) => LockingPolicy::Disabled,
            (true, false) => LockingPolicy::Strict,
            (true, true) => LockingPolicy::BestEffort,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "FALSE" | "0" => Some(LockingPolicy::Disabled),
            "TRUE" | "1" => Some(LockingPolicy::Strict),
            "BEST_EFFORT" => Some(LockingPolicy::BestEffort),
            _ => None,
        }
    }
}

/// Process-level settings, captured once when a library context is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryConfig {
    /// Locking override; `None` defers to each file's access properties.
    pub file_locking: Option<LockingPolicy>,
    /// Search path for external-link targets.
    pub ext_prefix: Option<String>,
    /// Search path for virtual-dataset source files.
    pub vds_prefix: Option<String>,
}

impl LibraryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let file_locking = lookup(ENV_FILE_LOCKING).and_then(|v| {
            let parsed = LockingPolicy::parse(&v);
            if parsed.is_none() {
                warn!(value = %v, "ignoring unrecognized {ENV_FILE_LOCKING}");
            }
            parsed
        });
        Self {
            file_locking,
            ext_prefix: lookup(ENV_EXT_PREFIX).filter(|v| !v.is_empty()),
            vds_prefix: lookup(ENV_VDS_PREFIX).filter(|v| !v.is_empty()),
        }
    }

    /// Effective locking for one open: the environment beats the property.
    pub fn effective_locking(&self, from_props: LockingPolicy) -> LockingPolicy {
        self.file_locking.unwrap_or(from_props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> LibraryConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LibraryConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn locking_values() {
        assert_eq!(
            lookup(&[(ENV_FILE_LOCKING, "FALSE")]).file_locking,
            Some(LockingPolicy::Disabled)
        );
        assert_eq!(
            lookup(&[(ENV_FILE_LOCKING, "1")]).file_locking,
            Some(LockingPolicy::Strict)
        );
        assert_eq!(
            lookup(&[(ENV_FILE_LOCKING, "BEST_EFFORT")]).file_locking,
            Some(LockingPolicy::BestEffort)
        );
        assert_eq!(lookup(&[(ENV_FILE_LOCKING, "maybe")]).file_locking, None);
    }

    #[test]
    fn env_beats_props() {
        let cfg = lookup(&[(ENV_FILE_LOCKING, "0")]);
        assert_eq!(
            cfg.effective_locking(LockingPolicy::Strict),
            LockingPolicy::Disabled
        );
        let cfg = lookup(&[]);
        assert_eq!(
            cfg.effective_locking(LockingPolicy::BestEffort),
            LockingPolicy::BestEffort
        );
    }

    #[test]
    fn prefixes() {
        let cfg = lookup(&[(ENV_EXT_PREFIX, "/tmp/a:/tmp/b"), (ENV_VDS_PREFIX, "")]);
        assert_eq!(cfg.ext_prefix.as_deref(), Some("/tmp/a:/tmp/b"));
        assert_eq!(cfg.vds_prefix, None);
    }
}

//! Open intent, driver capability and close-policy types shared by drivers
//! and the container core.

use std::fmt;

/// Declares a `u32` flag set with the usual set operations.
#[macro_export]
macro_rules! flag_set {
    ($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $flag:ident = $bit:expr,)* }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(u32);

        impl $name {
            $($(#[$fmeta])* pub const $flag: Self = Self($bit);)*

            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn bits(self) -> u32 {
                self.0
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            pub const fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }

            /// A copy with the bits of `other` cleared.
            pub const fn without(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }
        }

        impl ::core::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl ::core::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl ::core::ops::BitAnd for $name {
            type Output = Self;
            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                let mut set = f.debug_set();
                $(if self.0 & $bit != 0 {
                    set.entry(&stringify!($flag));
                })*
                set.finish()
            }
        }
    };
}

flag_set! {
    /// Intent flags passed to open.
    AccessFlags {
        /// Read-write; absent means read-only.
        RDWR = 0x0001,
        /// Truncate an existing store to zero length.
        TRUNC = 0x0002,
        /// Fail if the store already exists.
        EXCL = 0x0004,
        /// Create the store if it does not exist.
        CREATE = 0x0010,
        /// Single writer in a single-writer/multiple-reader pairing.
        SWMR_WRITE = 0x0020,
        /// Reader in a single-writer/multiple-reader pairing.
        SWMR_READ = 0x0040,
    }
}

impl AccessFlags {
    pub const RDONLY: Self = Self(0);

    /// Flags with the side-effecting bits (create, truncate, exclusive) removed.
    pub const fn tentative(self) -> Self {
        self.without(Self(Self::CREATE.0 | Self::TRUNC.0 | Self::EXCL.0))
    }

    pub const fn is_writable(self) -> bool {
        self.contains(Self::RDWR)
    }
}

flag_set! {
    /// Capabilities a driver advertises.
    DriverFeatures {
        /// Safe for single-writer/multiple-reader access.
        SUPPORTS_SWMR = 0x0001,
        /// Designed for parallel I/O.
        HAS_MPI = 0x0002,
        /// Metadata allocations should be aggregated into blocks.
        AGGREGATE_METADATA = 0x0004,
        /// Supports paged aggregation of file space.
        PAGED_AGGREGATION = 0x0008,
        /// Exposes a POSIX-compatible handle and resolved path.
        POSIX_COMPAT_HANDLE = 0x0010,
        /// Small metadata writes should be accumulated.
        ACCUMULATE_METADATA = 0x0020,
    }
}

/// Kind of data an access touches. Drivers may place or cache kinds
/// differently; the bundled drivers treat them alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemType {
    Superblock,
    ObjectHeader,
    Heap,
    Raw,
    Other,
}

/// How a file close treats objects still open through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CloseDegree {
    /// Use the driver's preference.
    #[default]
    Default,
    /// Defer the close until the last open object goes away.
    Weak,
    /// Refuse to close while objects are open.
    Semi,
    /// Close every open object first.
    Strong,
}

impl fmt::Display for CloseDegree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseDegree::Default => "default",
            CloseDegree::Weak => "weak",
            CloseDegree::Semi => "semi",
            CloseDegree::Strong => "strong",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tentative_strips_side_effects() {
        let f = AccessFlags::RDWR | AccessFlags::CREATE | AccessFlags::TRUNC;
        assert_eq!(f.tentative(), AccessFlags::RDWR);
        assert!(f.is_writable());
        assert!(!AccessFlags::RDONLY.is_writable());
    }

    #[test]
    fn debug_lists_names() {
        let f = AccessFlags::RDWR | AccessFlags::SWMR_WRITE;
        let s = format!("{f:?}");
        assert!(s.contains("RDWR") && s.contains("SWMR_WRITE"));
    }

    #[test]
    fn contains_and_remove() {
        let mut f = DriverFeatures::SUPPORTS_SWMR | DriverFeatures::POSIX_COMPAT_HANDLE;
        assert!(f.contains(DriverFeatures::SUPPORTS_SWMR));
        f.remove(DriverFeatures::SUPPORTS_SWMR);
        assert!(!f.intersects(DriverFeatures::SUPPORTS_SWMR));
        assert!(!f.is_empty());
    }
}

//! Error types for the on-disk codecs.

use core::fmt;

#[cfg(not(feature = "std"))]
use alloc::string::String;

/// Errors raised while encoding or decoding on-disk structures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The container signature was not found at any valid offset.
    SignatureNotFound,
    /// The superblock version is not supported.
    UnsupportedVersion(u8),
    /// Reading would run past the end of the input.
    UnexpectedEof {
        /// Absolute position the read needed to reach.
        expected: usize,
        /// Number of bytes actually available.
        available: usize,
    },
    /// Invalid offset size (must be 2, 4, or 8).
    InvalidOffsetSize(u8),
    /// Invalid length size (must be 2, 4, or 8).
    InvalidLengthSize(u8),
    /// Address width of zero or wider than the codec supports.
    InvalidAddressWidth(usize),
    /// A defined address does not fit in the requested width.
    AddressOverflow {
        /// The address being encoded.
        address: u64,
        /// Target width in bytes.
        width: usize,
    },
    /// Decoded address has non-zero bytes above the in-memory width.
    AddressHighBytes,
    /// Metadata checksum mismatch.
    ChecksumMismatch {
        /// The checksum stored in the file.
        expected: u32,
        /// The checksum we computed.
        computed: u32,
    },
    /// Datatype class code outside 0..=11.
    InvalidDatatypeClass(u8),
    /// Datatype version outside the accepted range for its class.
    InvalidDatatypeVersion {
        /// Class code.
        class: u8,
        /// Version found.
        version: u8,
    },
    /// A bounded decode would move past the declared remaining size.
    BodyOverflow {
        /// Bytes the decoder needed.
        needed: usize,
        /// Bytes that were left.
        remaining: usize,
    },
    /// A datatype field is outside its valid range.
    FieldOutOfRange {
        /// Which field.
        field: &'static str,
        /// The offending value.
        value: u64,
    },
    /// Two compound members share a name.
    DuplicateMemberName(String),
    /// A compound member has a zero-sized datatype.
    ZeroSizeMember(String),
    /// Two compound members overlap, or a member runs past the compound.
    MemberOverlap(String),
    /// Enumeration size differs from its base type size.
    EnumSizeMismatch {
        /// Size of the enumeration.
        enum_size: u32,
        /// Size of the base type.
        base_size: u32,
    },
    /// Unsupported reference subtype or reference encoding version.
    UnsupportedReference(u8),
    /// Unsupported complex number form.
    UnsupportedComplex(u32),
    /// Numeric type with an unusual number of unused bits.
    UnusualUnusedBits {
        /// Type size in bytes.
        size: u32,
        /// Precision in bits.
        precision: u16,
    },
    /// The descriptor needs a newer version than the caller allows.
    VersionOutOfBounds {
        /// Version required by the payload.
        required: u8,
        /// Highest version permitted.
        allowed: u8,
    },
}

impl FormatError {
    /// True for errors caused by input that is too short.
    pub fn is_overflow(&self) -> bool {
        matches!(
            self,
            FormatError::UnexpectedEof { .. }
                | FormatError::BodyOverflow { .. }
                | FormatError::AddressOverflow { .. }
        )
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::SignatureNotFound => {
                write!(f, "container signature not found at any valid offset")
            }
            FormatError::UnsupportedVersion(v) => {
                write!(f, "unsupported superblock version: {v}")
            }
            FormatError::UnexpectedEof {
                expected,
                available,
            } => {
                write!(f, "unexpected EOF: need {expected} bytes, have {available}")
            }
            FormatError::InvalidOffsetSize(s) => {
                write!(f, "invalid offset size: {s} (must be 2, 4, or 8)")
            }
            FormatError::InvalidLengthSize(s) => {
                write!(f, "invalid length size: {s} (must be 2, 4, or 8)")
            }
            FormatError::InvalidAddressWidth(w) => write!(f, "invalid address width: {w}"),
            FormatError::AddressOverflow { address, width } => {
                write!(f, "address {address:#x} does not fit in {width} bytes")
            }
            FormatError::AddressHighBytes => {
                write!(f, "address has non-zero bytes beyond 64 bits")
            }
            FormatError::ChecksumMismatch { expected, computed } => {
                write!(
                    f,
                    "checksum mismatch: expected {expected:#010x}, computed {computed:#010x}"
                )
            }
            FormatError::InvalidDatatypeClass(c) => write!(f, "invalid datatype class: {c}"),
            FormatError::InvalidDatatypeVersion { class, version } => {
                write!(f, "invalid version {version} for datatype class {class}")
            }
            FormatError::BodyOverflow { needed, remaining } => {
                write!(
                    f,
                    "datatype body overflow: need {needed} bytes, {remaining} remaining"
                )
            }
            FormatError::FieldOutOfRange { field, value } => {
                write!(f, "datatype field `{field}` out of range: {value}")
            }
            FormatError::DuplicateMemberName(n) => {
                write!(f, "duplicate compound member name `{n}`")
            }
            FormatError::ZeroSizeMember(n) => write!(f, "compound member `{n}` has zero size"),
            FormatError::MemberOverlap(n) => {
                write!(f, "compound member `{n}` overlaps or exceeds the compound")
            }
            FormatError::EnumSizeMismatch {
                enum_size,
                base_size,
            } => {
                write!(
                    f,
                    "enumeration size {enum_size} does not match base type size {base_size}"
                )
            }
            FormatError::UnsupportedReference(r) => {
                write!(f, "unsupported reference encoding: {r:#04x}")
            }
            FormatError::UnsupportedComplex(flags) => {
                write!(f, "unsupported complex number flags: {flags:#x}")
            }
            FormatError::UnusualUnusedBits { size, precision } => {
                write!(
                    f,
                    "numeric type of {size} bytes has unusual precision {precision}"
                )
            }
            FormatError::VersionOutOfBounds { required, allowed } => {
                write!(
                    f,
                    "datatype needs version {required}, but at most {allowed} is allowed"
                )
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FormatError {}

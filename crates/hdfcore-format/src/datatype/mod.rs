//! Datatype descriptors and their binary codec.
//!
//! A descriptor is a tree: compound and enum nodes own named members, while
//! vlen, array, enum and complex nodes own exactly one base type. Every
//! node carries the version it was decoded at (or requested for encoding);
//! the codec keeps `version >= max(child versions)` and promotes as needed.

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, string::String, vec, vec::Vec};

use crate::error::FormatError;

mod builders;
mod decode;
mod encode;

pub use builders::{CompoundBuilder, EnumBuilder};
pub use decode::{decode, DecodeOptions, SIZE_UNBOUNDED};
pub use encode::EncodeOptions;

/// Newest descriptor version understood by the codec.
pub const LATEST_VERSION: u8 = 5;

/// Opaque tag limit, in bytes. The padded tag length is stored in the
/// class flags masked by `OPAQUE_TAG_MAX - 1`.
pub const OPAQUE_TAG_MAX: usize = 256;

/// Longest padded tag the length field can carry.
pub(crate) const OPAQUE_TAG_PADDED_MAX: usize = (OPAQUE_TAG_MAX - 1) & !7;

/// Largest array rank.
pub const MAX_ARRAY_RANK: usize = 32;

/// Largest rank of the inline array dimensions in version-1 compounds.
pub const V1_MAX_INLINE_RANK: usize = 4;

/// Encoding version carried by the newer reference subtypes.
pub const REFERENCE_ENCODE_VERSION: u8 = 1;

/// Datatype class, with its on-disk class code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    Integer,
    Float,
    Time,
    String,
    Bitfield,
    Opaque,
    Compound,
    Reference,
    Enum,
    Vlen,
    Array,
    Complex,
}

impl TypeClass {
    /// The 4-bit class code written in the header.
    pub fn code(self) -> u8 {
        match self {
            TypeClass::Integer => 0,
            TypeClass::Float => 1,
            TypeClass::Time => 2,
            TypeClass::String => 3,
            TypeClass::Bitfield => 4,
            TypeClass::Opaque => 5,
            TypeClass::Compound => 6,
            TypeClass::Reference => 7,
            TypeClass::Enum => 8,
            TypeClass::Vlen => 9,
            TypeClass::Array => 10,
            TypeClass::Complex => 11,
        }
    }

    /// Map a class code back to a class.
    pub fn from_code(code: u8) -> Result<Self, FormatError> {
        Ok(match code {
            0 => TypeClass::Integer,
            1 => TypeClass::Float,
            2 => TypeClass::Time,
            3 => TypeClass::String,
            4 => TypeClass::Bitfield,
            5 => TypeClass::Opaque,
            6 => TypeClass::Compound,
            7 => TypeClass::Reference,
            8 => TypeClass::Enum,
            9 => TypeClass::Vlen,
            10 => TypeClass::Array,
            11 => TypeClass::Complex,
            c => return Err(FormatError::InvalidDatatypeClass(c)),
        })
    }
}

/// Byte order of numeric data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
    /// VAX mixed-endian floating point.
    Vax,
}

/// Layout of an integer or bitfield.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegerInfo {
    pub order: ByteOrder,
    /// Two's complement when set. Always false for bitfields.
    pub signed: bool,
    /// Bit offset of the first significant bit.
    pub offset: u16,
    /// Number of significant bits.
    pub precision: u16,
    /// Fill value of bits below `offset`.
    pub low_pad: bool,
    /// Fill value of bits above `offset + precision`.
    pub high_pad: bool,
}

/// Mantissa normalization of a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MantissaNorm {
    None,
    MsbSet,
    Implied,
}

/// Layout of a floating-point number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatInfo {
    pub order: ByteOrder,
    pub offset: u16,
    pub precision: u16,
    pub sign_pos: u8,
    pub exp_pos: u8,
    pub exp_size: u8,
    pub mant_pos: u8,
    pub mant_size: u8,
    pub exp_bias: u32,
    pub low_pad: bool,
    pub high_pad: bool,
    pub internal_pad: bool,
    pub norm: MantissaNorm,
}

/// String padding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringPad {
    NullTerminate,
    NullPad,
    SpacePad,
    /// Values the format reserves for future use; preserved verbatim.
    Reserved(u8),
}

impl StringPad {
    pub(crate) fn code(self) -> u8 {
        match self {
            StringPad::NullTerminate => 0,
            StringPad::NullPad => 1,
            StringPad::SpacePad => 2,
            StringPad::Reserved(v) => v & 0x0F,
        }
    }

    pub(crate) fn from_code(v: u8) -> Self {
        match v {
            0 => StringPad::NullTerminate,
            1 => StringPad::NullPad,
            2 => StringPad::SpacePad,
            v => StringPad::Reserved(v),
        }
    }
}

/// Character set of string data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharSet {
    Ascii,
    Utf8,
    /// Reserved character set codes; preserved verbatim.
    Reserved(u8),
}

impl CharSet {
    pub(crate) fn code(self) -> u8 {
        match self {
            CharSet::Ascii => 0,
            CharSet::Utf8 => 1,
            CharSet::Reserved(v) => v & 0x0F,
        }
    }

    pub(crate) fn from_code(v: u8) -> Self {
        match v {
            0 => CharSet::Ascii,
            1 => CharSet::Utf8,
            v => CharSet::Reserved(v),
        }
    }
}

/// Reference subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Object1,
    DatasetRegion1,
    Object2,
    DatasetRegion2,
    Attribute,
}

impl RefKind {
    pub(crate) fn code(self) -> u8 {
        match self {
            RefKind::Object1 => 0,
            RefKind::DatasetRegion1 => 1,
            RefKind::Object2 => 2,
            RefKind::DatasetRegion2 => 3,
            RefKind::Attribute => 4,
        }
    }

    /// Subtypes at or above the opaque boundary carry an encoding version.
    pub fn is_versioned(self) -> bool {
        self.code() >= RefKind::Object2.code()
    }
}

/// Named member of a compound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundMember {
    pub name: String,
    /// Byte offset within the compound.
    pub offset: u32,
    pub datatype: Datatype,
}

/// Named value of an enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    pub name: String,
    /// Raw value bytes, `base.size` long.
    pub value: Vec<u8>,
}

/// Variable-length flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VlenKind {
    Sequence,
    String { pad: StringPad, cset: CharSet },
}

/// Where variable-length data lives. Decoded types start `Undefined` and
/// the caller must set a location before performing I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VlenLocation {
    Undefined,
    Memory,
    Disk,
}

/// Complex number representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexForm {
    Rectangular,
    Polar,
    Exponential,
}

/// Class-specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Integer(IntegerInfo),
    Float(FloatInfo),
    Time { order: ByteOrder, precision: u16 },
    String { pad: StringPad, cset: CharSet },
    Bitfield(IntegerInfo),
    Opaque { tag: String },
    Compound { members: Vec<CompoundMember> },
    Reference(RefKind),
    Enum { base: Box<Datatype>, members: Vec<EnumMember> },
    Vlen { kind: VlenKind, base: Box<Datatype>, location: VlenLocation },
    Array { dims: Vec<u32>, base: Box<Datatype> },
    Complex { form: ComplexForm, base: Box<Datatype> },
}

/// A datatype descriptor node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datatype {
    /// Descriptor version, 1..=[`LATEST_VERSION`].
    pub version: u8,
    /// Element size in bytes.
    pub size: u32,
    pub kind: TypeKind,
}

impl Datatype {
    /// Class of this node.
    pub fn class(&self) -> TypeClass {
        match &self.kind {
            TypeKind::Integer(_) => TypeClass::Integer,
            TypeKind::Float(_) => TypeClass::Float,
            TypeKind::Time { .. } => TypeClass::Time,
            TypeKind::String { .. } => TypeClass::String,
            TypeKind::Bitfield(_) => TypeClass::Bitfield,
            TypeKind::Opaque { .. } => TypeClass::Opaque,
            TypeKind::Compound { .. } => TypeClass::Compound,
            TypeKind::Reference(_) => TypeClass::Reference,
            TypeKind::Enum { .. } => TypeClass::Enum,
            TypeKind::Vlen { .. } => TypeClass::Vlen,
            TypeKind::Array { .. } => TypeClass::Array,
            TypeKind::Complex { .. } => TypeClass::Complex,
        }
    }

    /// Direct children: compound members, or the single base type.
    pub fn children(&self) -> Vec<&Datatype> {
        match &self.kind {
            TypeKind::Compound { members } => members.iter().map(|m| &m.datatype).collect(),
            TypeKind::Enum { base, .. }
            | TypeKind::Vlen { base, .. }
            | TypeKind::Array { base, .. }
            | TypeKind::Complex { base, .. } => vec![base.as_ref()],
            _ => Vec::new(),
        }
    }

    /// Smallest version able to express this node's own payload.
    pub fn payload_min_version(&self) -> u8 {
        match &self.kind {
            TypeKind::Float(f) if f.order == ByteOrder::Vax => 3,
            TypeKind::Array { .. } => 2,
            TypeKind::Reference(r) if r.is_versioned() => 4,
            TypeKind::Complex { .. } => 5,
            _ => 1,
        }
    }

    /// Smallest version for this node and all of its descendants.
    pub fn required_version(&self) -> u8 {
        self.children()
            .into_iter()
            .map(Datatype::required_version)
            .fold(self.payload_min_version(), u8::max)
    }

    /// Highest version found among direct children.
    pub fn max_child_version(&self) -> u8 {
        self.children()
            .into_iter()
            .map(|c| c.version)
            .max()
            .unwrap_or(0)
    }

    /// Whether this is a numeric leaf whose unused bits are suspicious:
    /// a multi-byte type leaving at least one whole byte unused.
    pub fn has_unusual_unused_bits(&self) -> bool {
        let precision = match &self.kind {
            TypeKind::Integer(i) | TypeKind::Bitfield(i) => i.precision,
            TypeKind::Float(f) => f.precision,
            _ => return false,
        };
        let bits = self.size as u64 * 8;
        self.size > 1 && bits > precision as u64 && bits - precision as u64 >= 8
    }

    /// Validate this node only (children are assumed already checked).
    pub fn check_node(&self, relaxed_integrity: bool) -> Result<(), FormatError> {
        let bits = self.size as u64 * 8;
        match &self.kind {
            TypeKind::Integer(info) | TypeKind::Bitfield(info) => {
                check_bit_range(info.offset, info.precision, bits)?;
                if info.order == ByteOrder::Vax {
                    return Err(FormatError::FieldOutOfRange {
                        field: "byte order",
                        value: 2,
                    });
                }
            }
            TypeKind::Float(f) => {
                check_bit_range(f.offset, f.precision, bits)?;
                if f.exp_size == 0 {
                    return Err(FormatError::FieldOutOfRange {
                        field: "exponent size",
                        value: 0,
                    });
                }
                if f.mant_size == 0 {
                    return Err(FormatError::FieldOutOfRange {
                        field: "mantissa size",
                        value: 0,
                    });
                }
                let ranges = [
                    ("sign position", f.sign_pos as u64, 1u64),
                    ("exponent position", f.exp_pos as u64, f.exp_size as u64),
                    ("mantissa position", f.mant_pos as u64, f.mant_size as u64),
                ];
                for (field, start, len) in ranges {
                    if start + len > bits {
                        return Err(FormatError::FieldOutOfRange {
                            field,
                            value: start,
                        });
                    }
                }
                for i in 0..ranges.len() {
                    for j in i + 1..ranges.len() {
                        let (_, a, alen) = ranges[i];
                        let (field, b, blen) = ranges[j];
                        if a < b + blen && b < a + alen {
                            return Err(FormatError::FieldOutOfRange { field, value: b });
                        }
                    }
                }
            }
            TypeKind::Time { .. } | TypeKind::String { .. } | TypeKind::Reference(_) => {}
            TypeKind::Opaque { tag } => {
                if tag.as_bytes().contains(&0) {
                    return Err(FormatError::FieldOutOfRange {
                        field: "opaque tag",
                        value: 0,
                    });
                }
                let padded = padded_tag_len(tag.len());
                if padded > OPAQUE_TAG_PADDED_MAX {
                    return Err(FormatError::FieldOutOfRange {
                        field: "opaque tag length",
                        value: padded as u64,
                    });
                }
            }
            TypeKind::Compound { members } => check_compound(self.size, members)?,
            TypeKind::Enum { base, members } => {
                if base.size != self.size {
                    return Err(FormatError::EnumSizeMismatch {
                        enum_size: self.size,
                        base_size: base.size,
                    });
                }
                if members.len() > u16::MAX as usize {
                    return Err(FormatError::FieldOutOfRange {
                        field: "enum member count",
                        value: members.len() as u64,
                    });
                }
                for (i, m) in members.iter().enumerate() {
                    if m.name.is_empty() {
                        return Err(FormatError::FieldOutOfRange {
                            field: "enum member name",
                            value: i as u64,
                        });
                    }
                    if m.value.len() != base.size as usize {
                        return Err(FormatError::FieldOutOfRange {
                            field: "enum value length",
                            value: m.value.len() as u64,
                        });
                    }
                }
            }
            TypeKind::Vlen { .. } => {}
            TypeKind::Array { dims, base } => {
                if dims.is_empty() || dims.len() > MAX_ARRAY_RANK {
                    return Err(FormatError::FieldOutOfRange {
                        field: "array rank",
                        value: dims.len() as u64,
                    });
                }
                if let Some(pos) = dims.iter().position(|&d| d == 0) {
                    return Err(FormatError::FieldOutOfRange {
                        field: "array dimension",
                        value: pos as u64,
                    });
                }
                let expected = dims
                    .iter()
                    .try_fold(base.size as u64, |acc, &d| acc.checked_mul(d as u64));
                if expected != Some(self.size as u64) {
                    return Err(FormatError::FieldOutOfRange {
                        field: "array size",
                        value: self.size as u64,
                    });
                }
            }
            TypeKind::Complex { form, base } => {
                if *form != ComplexForm::Rectangular {
                    return Err(FormatError::UnsupportedComplex(encode::complex_flags(*form)));
                }
                if base.class() != TypeClass::Float {
                    return Err(FormatError::FieldOutOfRange {
                        field: "complex base class",
                        value: base.class().code() as u64,
                    });
                }
                if base.size as u64 * 2 != self.size as u64 {
                    return Err(FormatError::FieldOutOfRange {
                        field: "complex size",
                        value: self.size as u64,
                    });
                }
            }
        }
        if !relaxed_integrity && self.has_unusual_unused_bits() {
            let precision = match &self.kind {
                TypeKind::Integer(i) | TypeKind::Bitfield(i) => i.precision,
                TypeKind::Float(f) => f.precision,
                _ => 0,
            };
            return Err(FormatError::UnusualUnusedBits {
                size: self.size,
                precision,
            });
        }
        Ok(())
    }

    /// Validate the whole tree, including the version invariant.
    pub fn validate(&self, relaxed_integrity: bool) -> Result<(), FormatError> {
        for child in self.children() {
            child.validate(relaxed_integrity)?;
        }
        self.check_node(relaxed_integrity)
    }

    /// A copy with versions zeroed and vlen locations reset, for comparing
    /// two descriptors by structure alone.
    pub fn normalized(&self) -> Datatype {
        let kind = match &self.kind {
            TypeKind::Compound { members } => TypeKind::Compound {
                members: members
                    .iter()
                    .map(|m| CompoundMember {
                        name: m.name.clone(),
                        offset: m.offset,
                        datatype: m.datatype.normalized(),
                    })
                    .collect(),
            },
            TypeKind::Enum { base, members } => TypeKind::Enum {
                base: Box::new(base.normalized()),
                members: members.clone(),
            },
            TypeKind::Vlen { kind, base, .. } => TypeKind::Vlen {
                kind: *kind,
                base: Box::new(base.normalized()),
                location: VlenLocation::Undefined,
            },
            TypeKind::Array { dims, base } => TypeKind::Array {
                dims: dims.clone(),
                base: Box::new(base.normalized()),
            },
            TypeKind::Complex { form, base } => TypeKind::Complex {
                form: *form,
                base: Box::new(base.normalized()),
            },
            other => other.clone(),
        };
        Datatype {
            version: 0,
            size: self.size,
            kind,
        }
    }

    /// Structural equality that ignores versions and vlen location.
    pub fn equivalent(&self, other: &Datatype) -> bool {
        self.normalized() == other.normalized()
    }

    /// Set the vlen location on this node and every nested vlen.
    pub fn set_vlen_location(&mut self, loc: VlenLocation) {
        match &mut self.kind {
            TypeKind::Vlen { base, location, .. } => {
                *location = loc;
                base.set_vlen_location(loc);
            }
            TypeKind::Compound { members } => {
                for m in members {
                    m.datatype.set_vlen_location(loc);
                }
            }
            TypeKind::Enum { base, .. }
            | TypeKind::Array { base, .. }
            | TypeKind::Complex { base, .. } => base.set_vlen_location(loc),
            _ => {}
        }
    }
}

pub(crate) fn padded_tag_len(len: usize) -> usize {
    (len + 7) & !7
}

fn check_bit_range(offset: u16, precision: u16, bits: u64) -> Result<(), FormatError> {
    if offset as u64 >= bits {
        return Err(FormatError::FieldOutOfRange {
            field: "bit offset",
            value: offset as u64,
        });
    }
    if precision == 0 {
        return Err(FormatError::FieldOutOfRange {
            field: "precision",
            value: 0,
        });
    }
    if offset as u64 + precision as u64 > bits {
        return Err(FormatError::FieldOutOfRange {
            field: "precision",
            value: precision as u64,
        });
    }
    Ok(())
}

fn check_compound(size: u32, members: &[CompoundMember]) -> Result<(), FormatError> {
    if members.is_empty() || members.len() > u16::MAX as usize {
        return Err(FormatError::FieldOutOfRange {
            field: "member count",
            value: members.len() as u64,
        });
    }
    let mut spans: Vec<(u64, u64, &str)> = Vec::with_capacity(members.len());
    for (i, m) in members.iter().enumerate() {
        if members[..i].iter().any(|prev| prev.name == m.name) {
            return Err(FormatError::DuplicateMemberName(m.name.clone()));
        }
        if m.datatype.size == 0 {
            return Err(FormatError::ZeroSizeMember(m.name.clone()));
        }
        let end = m.offset as u64 + m.datatype.size as u64;
        if end > size as u64 {
            return Err(FormatError::MemberOverlap(m.name.clone()));
        }
        spans.push((m.offset as u64, end, m.name.as_str()));
    }
    spans.sort_unstable_by_key(|s| s.0);
    for pair in spans.windows(2) {
        if pair[1].0 < pair[0].1 {
            return Err(FormatError::MemberOverlap(pair[1].2.into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_version_propagates() {
        let arr = Datatype::array(Datatype::native_i32(), &[3]).unwrap();
        assert_eq!(arr.required_version(), 2);
        let c = CompoundBuilder::new()
            .member("a", arr)
            .build()
            .unwrap();
        assert_eq!(c.required_version(), 2);
        assert!(c.version >= 2);
    }

    #[test]
    fn unusual_bits_detection() {
        let mut t = Datatype::native_i32();
        assert!(!t.has_unusual_unused_bits());
        if let TypeKind::Integer(ref mut i) = t.kind {
            i.precision = 24;
        }
        assert!(t.has_unusual_unused_bits());
        assert!(t.check_node(false).is_err());
        assert!(t.check_node(true).is_ok());
    }

    #[test]
    fn single_byte_never_unusual() {
        let mut t = Datatype::native_u8();
        if let TypeKind::Integer(ref mut i) = t.kind {
            i.precision = 1;
        }
        assert!(!t.has_unusual_unused_bits());
    }

    #[test]
    fn float_overlapping_fields() {
        let mut t = Datatype::native_f64();
        if let TypeKind::Float(ref mut f) = t.kind {
            f.exp_pos = 50;
        }
        assert!(matches!(
            t.check_node(false),
            Err(FormatError::FieldOutOfRange { .. })
        ));
    }

    #[test]
    fn equivalence_ignores_version() {
        let mut a = Datatype::native_f32();
        let b = Datatype::native_f32();
        a.version = 3;
        assert_ne!(a, b);
        assert!(a.equivalent(&b));
    }

    #[test]
    fn class_codes_round_trip() {
        for code in 0..12u8 {
            assert_eq!(TypeClass::from_code(code).unwrap().code(), code);
        }
        assert_eq!(
            TypeClass::from_code(12),
            Err(FormatError::InvalidDatatypeClass(12))
        );
    }
}

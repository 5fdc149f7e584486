//! Constructors for common datatypes and builders for compound and enum
//! descriptors.

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, string::String, vec::Vec};

use super::{
    ByteOrder, CharSet, ComplexForm, CompoundMember, Datatype, EnumMember, FloatInfo,
    IntegerInfo, MantissaNorm, RefKind, StringPad, TypeKind, VlenKind, VlenLocation,
};
use crate::error::FormatError;

/// In-memory size of a variable-length element (length + pointer).
pub const VLEN_ELEMENT_SIZE: u32 = 16;

fn with_version(size: u32, kind: TypeKind) -> Datatype {
    let mut dt = Datatype {
        version: 1,
        size,
        kind,
    };
    dt.version = dt.required_version();
    dt
}

impl Datatype {
    /// A full-precision integer of `size` bytes.
    pub fn integer(size: u32, signed: bool, order: ByteOrder) -> Datatype {
        with_version(
            size,
            TypeKind::Integer(IntegerInfo {
                order,
                signed,
                offset: 0,
                precision: (size * 8) as u16,
                low_pad: false,
                high_pad: false,
            }),
        )
    }

    pub fn native_i8() -> Datatype {
        Self::integer(1, true, ByteOrder::LittleEndian)
    }
    pub fn native_i16() -> Datatype {
        Self::integer(2, true, ByteOrder::LittleEndian)
    }
    pub fn native_i32() -> Datatype {
        Self::integer(4, true, ByteOrder::LittleEndian)
    }
    pub fn native_i64() -> Datatype {
        Self::integer(8, true, ByteOrder::LittleEndian)
    }
    pub fn native_u8() -> Datatype {
        Self::integer(1, false, ByteOrder::LittleEndian)
    }
    pub fn native_u16() -> Datatype {
        Self::integer(2, false, ByteOrder::LittleEndian)
    }
    pub fn native_u32() -> Datatype {
        Self::integer(4, false, ByteOrder::LittleEndian)
    }
    pub fn native_u64() -> Datatype {
        Self::integer(8, false, ByteOrder::LittleEndian)
    }

    fn ieee(size: u32, order: ByteOrder, exp_size: u8, mant_size: u8, bias: u32) -> Datatype {
        let bits = (size * 8) as u8;
        with_version(
            size,
            TypeKind::Float(FloatInfo {
                order,
                offset: 0,
                precision: bits as u16,
                sign_pos: bits - 1,
                exp_pos: mant_size,
                exp_size,
                mant_pos: 0,
                mant_size,
                exp_bias: bias,
                low_pad: false,
                high_pad: false,
                internal_pad: false,
                norm: MantissaNorm::Implied,
            }),
        )
    }

    /// IEEE 754 binary16.
    pub fn ieee_f16(order: ByteOrder) -> Datatype {
        Self::ieee(2, order, 5, 10, 15)
    }
    /// IEEE 754 binary32.
    pub fn ieee_f32(order: ByteOrder) -> Datatype {
        Self::ieee(4, order, 8, 23, 127)
    }
    /// IEEE 754 binary64.
    pub fn ieee_f64(order: ByteOrder) -> Datatype {
        Self::ieee(8, order, 11, 52, 1023)
    }
    pub fn native_f32() -> Datatype {
        Self::ieee_f32(ByteOrder::LittleEndian)
    }
    pub fn native_f64() -> Datatype {
        Self::ieee_f64(ByteOrder::LittleEndian)
    }

    /// Fixed-length string of `size` bytes.
    pub fn fixed_string(size: u32, pad: StringPad, cset: CharSet) -> Datatype {
        with_version(size, TypeKind::String { pad, cset })
    }

    /// Bitfield of `size` bytes with full precision.
    pub fn bitfield(size: u32, order: ByteOrder) -> Datatype {
        with_version(
            size,
            TypeKind::Bitfield(IntegerInfo {
                order,
                signed: false,
                offset: 0,
                precision: (size * 8) as u16,
                low_pad: false,
                high_pad: false,
            }),
        )
    }

    /// Time type of `size` bytes.
    pub fn time(size: u32, order: ByteOrder) -> Datatype {
        with_version(
            size,
            TypeKind::Time {
                order,
                precision: (size * 8) as u16,
            },
        )
    }

    /// Opaque blob with a descriptive tag.
    pub fn opaque(size: u32, tag: &str) -> Result<Datatype, FormatError> {
        let dt = with_version(size, TypeKind::Opaque { tag: tag.into() });
        dt.check_node(true)?;
        Ok(dt)
    }

    /// Reference of the given subtype.
    pub fn reference(kind: RefKind) -> Datatype {
        let size = match kind {
            RefKind::Object1 => 8,
            RefKind::DatasetRegion1 => 12,
            _ => 64,
        };
        with_version(size, TypeKind::Reference(kind))
    }

    /// Fixed-size array of `base`.
    pub fn array(base: Datatype, dims: &[u32]) -> Result<Datatype, FormatError> {
        let size = dims
            .iter()
            .try_fold(base.size, |acc, &d| acc.checked_mul(d))
            .ok_or(FormatError::FieldOutOfRange {
                field: "array size",
                value: u32::MAX as u64,
            })?;
        let dt = with_version(
            size,
            TypeKind::Array {
                dims: dims.to_vec(),
                base: Box::new(base),
            },
        );
        dt.check_node(true)?;
        Ok(dt)
    }

    /// Variable-length sequence of `base`.
    pub fn vlen_sequence(base: Datatype) -> Datatype {
        with_version(
            VLEN_ELEMENT_SIZE,
            TypeKind::Vlen {
                kind: VlenKind::Sequence,
                base: Box::new(base),
                location: VlenLocation::Undefined,
            },
        )
    }

    /// Variable-length string.
    pub fn vlen_string(pad: StringPad, cset: CharSet) -> Datatype {
        with_version(
            VLEN_ELEMENT_SIZE,
            TypeKind::Vlen {
                kind: VlenKind::String { pad, cset },
                base: Box::new(Datatype::native_u8()),
                location: VlenLocation::Undefined,
            },
        )
    }

    /// Rectangular complex number over a float base.
    pub fn complex(base: Datatype) -> Result<Datatype, FormatError> {
        let size = base.size.checked_mul(2).ok_or(FormatError::FieldOutOfRange {
            field: "complex size",
            value: base.size as u64,
        })?;
        let dt = with_version(
            size,
            TypeKind::Complex {
                form: ComplexForm::Rectangular,
                base: Box::new(base),
            },
        );
        dt.check_node(true)?;
        Ok(dt)
    }
}

/// Builder for compound datatypes.
///
/// Members added with [`member`](CompoundBuilder::member) are packed after
/// the previous one; [`member_at`](CompoundBuilder::member_at) places a
/// member explicitly.
#[derive(Debug, Default)]
pub struct CompoundBuilder {
    members: Vec<CompoundMember>,
    size: Option<u32>,
    version: u8,
    next_offset: u32,
}

impl CompoundBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a member at the next packed offset.
    pub fn member(mut self, name: &str, datatype: Datatype) -> Self {
        let offset = self.next_offset;
        self.next_offset = offset.saturating_add(datatype.size);
        self.members.push(CompoundMember {
            name: name.into(),
            offset,
            datatype,
        });
        self
    }

    /// Place a member at an explicit byte offset.
    pub fn member_at(mut self, name: &str, offset: u32, datatype: Datatype) -> Self {
        self.next_offset = self.next_offset.max(offset.saturating_add(datatype.size));
        self.members.push(CompoundMember {
            name: name.into(),
            offset,
            datatype,
        });
        self
    }

    /// Total size; defaults to the end of the last member.
    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Request a minimum descriptor version.
    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn build(self) -> Result<Datatype, FormatError> {
        let size = self.size.unwrap_or(self.next_offset);
        let mut dt = Datatype {
            version: 1,
            size,
            kind: TypeKind::Compound {
                members: self.members,
            },
        };
        dt.version = dt.required_version().max(self.version);
        dt.check_node(true)?;
        Ok(dt)
    }
}

/// Builder for enumeration datatypes.
#[derive(Debug)]
pub struct EnumBuilder {
    base: Datatype,
    members: Vec<EnumMember>,
}

impl EnumBuilder {
    /// Start an enumeration over an integer base type.
    pub fn new(base: Datatype) -> Self {
        Self {
            base,
            members: Vec::new(),
        }
    }

    /// Add a member with raw value bytes.
    pub fn value(mut self, name: &str, value: &[u8]) -> Self {
        self.members.push(EnumMember {
            name: String::from(name),
            value: value.to_vec(),
        });
        self
    }

    /// Add a member whose value is an `i64` truncated to the base size.
    pub fn value_i64(self, name: &str, value: i64) -> Self {
        let n = self.base.size as usize;
        let bytes = value.to_le_bytes();
        let mut raw = bytes[..n.min(8)].to_vec();
        raw.resize(n, if value < 0 { 0xFF } else { 0 });
        self.value(name, &raw)
    }

    pub fn build(self) -> Result<Datatype, FormatError> {
        let dt = with_version(
            self.base.size,
            TypeKind::Enum {
                base: Box::new(self.base),
                members: self.members,
            },
        );
        dt.check_node(true)?;
        Ok(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::TypeClass;

    #[test]
    fn packed_compound() {
        let c = CompoundBuilder::new()
            .member("x", Datatype::native_i32())
            .member("y", Datatype::native_f64())
            .build()
            .unwrap();
        assert_eq!(c.size, 12);
        assert_eq!(c.version, 1);
        match &c.kind {
            TypeKind::Compound { members } => {
                assert_eq!(members[1].offset, 4);
            }
            _ => panic!("expected compound"),
        }
    }

    #[test]
    fn duplicate_member_rejected() {
        let err = CompoundBuilder::new()
            .member("x", Datatype::native_i32())
            .member("x", Datatype::native_i32())
            .build()
            .unwrap_err();
        assert_eq!(err, FormatError::DuplicateMemberName("x".into()));
    }

    #[test]
    fn enum_values_sized() {
        let e = EnumBuilder::new(Datatype::native_i16())
            .value_i64("RED", 0)
            .value_i64("NEG", -1)
            .build()
            .unwrap();
        assert_eq!(e.class(), TypeClass::Enum);
        match &e.kind {
            TypeKind::Enum { members, .. } => assert_eq!(members[1].value, vec![0xFF, 0xFF]),
            _ => panic!("expected enum"),
        }
    }

    #[test]
    fn complex_requires_v5() {
        let c = Datatype::complex(Datatype::native_f32()).unwrap();
        assert_eq!(c.size, 8);
        assert_eq!(c.version, 5);
    }

    #[test]
    fn opaque_tag_limit() {
        let long: String = core::iter::repeat('t').take(256).collect();
        assert!(Datatype::opaque(4, &long).is_err());
        assert!(Datatype::opaque(4, &long[..255]).is_err());
        assert!(Datatype::opaque(4, &long[..249]).is_err());
        assert!(Datatype::opaque(4, &long[..248]).is_ok());
    }
}

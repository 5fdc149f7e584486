//! Datatype descriptor decoding.

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, string::String, vec::Vec};

use byteorder::{ByteOrder as _, LittleEndian};

use super::{
    ByteOrder, CharSet, ComplexForm, CompoundMember, Datatype, EnumMember, FloatInfo,
    IntegerInfo, MantissaNorm, RefKind, StringPad, TypeClass, TypeKind, VlenKind, VlenLocation,
    LATEST_VERSION, MAX_ARRAY_RANK, OPAQUE_TAG_MAX, REFERENCE_ENCODE_VERSION, V1_MAX_INLINE_RANK,
};
use crate::error::FormatError;

/// Pass as `size_remaining` when decoding a trusted blob with no known
/// length. Declared-size checks are skipped; the slice end still bounds
/// every read.
pub const SIZE_UNBOUNDED: usize = usize::MAX;

/// Decoder switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Keep the versions found on disk instead of promoting parents whose
    /// children need a newer version.
    pub preserve_version: bool,
    /// Accept numeric types with unusual numbers of unused bits.
    pub relaxed_integrity: bool,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    limit: usize,
    bounded: bool,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let end = self.pos.checked_add(n).unwrap_or(usize::MAX);
        if end > self.limit {
            return Err(if self.bounded {
                FormatError::BodyOverflow {
                    needed: n,
                    remaining: self.limit - self.pos,
                }
            } else {
                FormatError::UnexpectedEof {
                    expected: end,
                    available: self.data.len(),
                }
            });
        }
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> Result<(), FormatError> {
        self.take(n).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, FormatError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn u32(&mut self) -> Result<u32, FormatError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// Little-endian unsigned integer of 1..=4 bytes.
    fn uint(&mut self, nbytes: usize) -> Result<u32, FormatError> {
        let raw = self.take(nbytes)?;
        Ok(raw
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32))
    }

    /// Null-terminated name; versions below 3 pad it to a multiple of 8.
    fn name(&mut self, padded: bool) -> Result<String, FormatError> {
        let window = &self.data[self.pos..self.limit];
        let len = match window.iter().position(|&b| b == 0) {
            Some(len) => len,
            None => {
                self.take(window.len() + 1)?;
                return Err(FormatError::FieldOutOfRange {
                    field: "name",
                    value: window.len() as u64,
                });
            }
        };
        let text = core::str::from_utf8(&window[..len])
            .map_err(|_| FormatError::FieldOutOfRange {
                field: "name encoding",
                value: len as u64,
            })?
            .into();
        let consumed = if padded { (len + 1 + 7) & !7 } else { len + 1 };
        self.skip(consumed)?;
        Ok(text)
    }
}

/// Minimum number of bytes needed to encode values up to `size`.
pub(crate) fn offset_width(size: u32) -> usize {
    if size == 0 {
        return 1;
    }
    let log2 = 31 - size.leading_zeros() as usize;
    log2 / 8 + 1
}

/// Decode one descriptor from `buf`.
///
/// `size_remaining` is the declared length of the encoded descriptor; pass
/// [`SIZE_UNBOUNDED`] to skip that check. Returns the descriptor and the
/// number of bytes consumed. On failure nothing is returned and partial
/// subtrees are dropped.
pub fn decode(
    buf: &[u8],
    size_remaining: usize,
    opts: &DecodeOptions,
) -> Result<(Datatype, usize), FormatError> {
    let bounded = size_remaining != SIZE_UNBOUNDED;
    let mut cur = Cursor {
        data: buf,
        pos: 0,
        limit: if bounded {
            size_remaining.min(buf.len())
        } else {
            buf.len()
        },
        bounded,
    };
    let dt = decode_node(&mut cur, opts)?;
    Ok((dt, cur.pos))
}

impl Datatype {
    /// Decode with default options, bounded by the slice length.
    pub fn decode(buf: &[u8]) -> Result<(Datatype, usize), FormatError> {
        decode(buf, buf.len(), &DecodeOptions::default())
    }
}

fn bad_version(class: TypeClass, version: u8) -> FormatError {
    FormatError::InvalidDatatypeVersion {
        class: class.code(),
        version,
    }
}

fn order_bit(flags: u32) -> ByteOrder {
    if flags & 0x01 == 0 {
        ByteOrder::LittleEndian
    } else {
        ByteOrder::BigEndian
    }
}

fn decode_node(cur: &mut Cursor<'_>, opts: &DecodeOptions) -> Result<Datatype, FormatError> {
    let header = cur.take(4)?;
    let version = header[0] >> 4;
    let class = TypeClass::from_code(header[0] & 0x0F)?;
    let flags = header[1] as u32 | (header[2] as u32) << 8 | (header[3] as u32) << 16;
    if version == 0 || version > LATEST_VERSION {
        return Err(bad_version(class, version));
    }
    let size = cur.u32()?;

    let kind = match class {
        TypeClass::Integer | TypeClass::Bitfield => {
            let offset = cur.u16()?;
            let precision = cur.u16()?;
            let info = IntegerInfo {
                order: order_bit(flags),
                signed: class == TypeClass::Integer && flags & 0x08 != 0,
                offset,
                precision,
                low_pad: flags & 0x02 != 0,
                high_pad: flags & 0x04 != 0,
            };
            if class == TypeClass::Integer {
                TypeKind::Integer(info)
            } else {
                TypeKind::Bitfield(info)
            }
        }
        TypeClass::Float => {
            let order = match (flags & 0x40 != 0, flags & 0x01 != 0) {
                (false, false) => ByteOrder::LittleEndian,
                (false, true) => ByteOrder::BigEndian,
                (true, true) => {
                    if version < 3 {
                        return Err(bad_version(class, version));
                    }
                    ByteOrder::Vax
                }
                (true, false) => {
                    return Err(FormatError::FieldOutOfRange {
                        field: "byte order",
                        value: (flags & 0x41) as u64,
                    })
                }
            };
            let norm = match (flags >> 4) & 0x03 {
                0 => MantissaNorm::None,
                1 => MantissaNorm::MsbSet,
                2 => MantissaNorm::Implied,
                v => {
                    return Err(FormatError::FieldOutOfRange {
                        field: "mantissa normalization",
                        value: v as u64,
                    })
                }
            };
            let offset = cur.u16()?;
            let precision = cur.u16()?;
            let exp_pos = cur.u8()?;
            let exp_size = cur.u8()?;
            let mant_pos = cur.u8()?;
            let mant_size = cur.u8()?;
            let exp_bias = cur.u32()?;
            TypeKind::Float(FloatInfo {
                order,
                offset,
                precision,
                sign_pos: ((flags >> 8) & 0xFF) as u8,
                exp_pos,
                exp_size,
                mant_pos,
                mant_size,
                exp_bias,
                low_pad: flags & 0x02 != 0,
                high_pad: flags & 0x04 != 0,
                internal_pad: flags & 0x08 != 0,
                norm,
            })
        }
        TypeClass::Time => TypeKind::Time {
            order: order_bit(flags),
            precision: cur.u16()?,
        },
        TypeClass::String => TypeKind::String {
            pad: StringPad::from_code((flags & 0x0F) as u8),
            cset: CharSet::from_code(((flags >> 4) & 0x0F) as u8),
        },
        TypeClass::Opaque => {
            let tag_len = flags as usize & (OPAQUE_TAG_MAX - 1);
            if tag_len % 8 != 0 {
                return Err(FormatError::FieldOutOfRange {
                    field: "opaque tag length",
                    value: tag_len as u64,
                });
            }
            let raw = cur.take(tag_len)?;
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            let tag = core::str::from_utf8(&raw[..end])
                .map_err(|_| FormatError::FieldOutOfRange {
                    field: "opaque tag",
                    value: end as u64,
                })?
                .into();
            TypeKind::Opaque { tag }
        }
        TypeClass::Compound => decode_compound(cur, opts, version, size, flags)?,
        TypeClass::Reference => {
            let kind = match flags & 0x0F {
                0 => RefKind::Object1,
                1 => RefKind::DatasetRegion1,
                2 => RefKind::Object2,
                3 => RefKind::DatasetRegion2,
                4 => RefKind::Attribute,
                v => return Err(FormatError::UnsupportedReference(v as u8)),
            };
            if kind.is_versioned() {
                let enc = ((flags >> 4) & 0x0F) as u8;
                if enc != REFERENCE_ENCODE_VERSION {
                    return Err(FormatError::UnsupportedReference(enc));
                }
                if version < 4 {
                    return Err(bad_version(class, version));
                }
            }
            TypeKind::Reference(kind)
        }
        TypeClass::Enum => {
            let count = (flags & 0xFFFF) as usize;
            let base = decode_node(cur, opts)?;
            let mut names = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                names.push(cur.name(version < 3)?);
            }
            let vsize = base.size as usize;
            let mut members = Vec::with_capacity(names.len());
            for name in names {
                let value = cur.take(vsize)?.to_vec();
                members.push(EnumMember { name, value });
            }
            TypeKind::Enum {
                base: Box::new(base),
                members,
            }
        }
        TypeClass::Vlen => {
            let kind = match flags & 0x0F {
                0 => VlenKind::Sequence,
                1 => VlenKind::String {
                    pad: StringPad::from_code(((flags >> 4) & 0x0F) as u8),
                    cset: CharSet::from_code(((flags >> 8) & 0x0F) as u8),
                },
                v => {
                    return Err(FormatError::FieldOutOfRange {
                        field: "vlen kind",
                        value: v as u64,
                    })
                }
            };
            let base = decode_node(cur, opts)?;
            TypeKind::Vlen {
                kind,
                base: Box::new(base),
                location: VlenLocation::Undefined,
            }
        }
        TypeClass::Array => {
            if version < 2 {
                return Err(bad_version(class, version));
            }
            let rank = cur.u8()? as usize;
            if rank == 0 || rank > MAX_ARRAY_RANK {
                return Err(FormatError::FieldOutOfRange {
                    field: "array rank",
                    value: rank as u64,
                });
            }
            if version < 3 {
                cur.skip(3)?;
            }
            let mut dims = Vec::with_capacity(rank);
            for _ in 0..rank {
                dims.push(cur.u32()?);
            }
            if version < 3 {
                cur.skip(4 * rank)?;
            }
            let base = decode_node(cur, opts)?;
            TypeKind::Array {
                dims,
                base: Box::new(base),
            }
        }
        TypeClass::Complex => {
            if version < 5 {
                return Err(bad_version(class, version));
            }
            if flags & 0x01 == 0 || flags & !0x07 != 0 {
                return Err(FormatError::UnsupportedComplex(flags));
            }
            let form = match (flags >> 1) & 0x03 {
                0 => ComplexForm::Rectangular,
                1 => ComplexForm::Polar,
                2 => ComplexForm::Exponential,
                _ => return Err(FormatError::UnsupportedComplex(flags)),
            };
            let base = decode_node(cur, opts)?;
            TypeKind::Complex {
                form,
                base: Box::new(base),
            }
        }
    };

    let mut dt = Datatype {
        version,
        size,
        kind,
    };
    if !opts.preserve_version {
        dt.version = dt.version.max(dt.max_child_version());
    }
    dt.check_node(opts.relaxed_integrity)?;
    Ok(dt)
}

fn decode_compound(
    cur: &mut Cursor<'_>,
    opts: &DecodeOptions,
    version: u8,
    size: u32,
    flags: u32,
) -> Result<TypeKind, FormatError> {
    let count = (flags & 0xFFFF) as usize;
    if count == 0 {
        return Err(FormatError::FieldOutOfRange {
            field: "member count",
            value: 0,
        });
    }
    let mut members = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let name = cur.name(version < 3)?;
        let offset = if version >= 3 {
            cur.uint(offset_width(size))?
        } else {
            cur.u32()?
        };

        let mut inline_dims = Vec::new();
        if version == 1 {
            let rank = cur.u8()? as usize;
            if rank > V1_MAX_INLINE_RANK {
                return Err(FormatError::FieldOutOfRange {
                    field: "inline array rank",
                    value: rank as u64,
                });
            }
            // reserved(3), permutation(4), reserved(4)
            cur.skip(3 + 4 + 4)?;
            for i in 0..V1_MAX_INLINE_RANK {
                let d = cur.u32()?;
                if i < rank {
                    inline_dims.push(d);
                }
            }
        }

        let mut datatype = decode_node(cur, opts)?;
        if !inline_dims.is_empty() {
            datatype = promote_inline_array(datatype, inline_dims, opts)?;
        }
        members.push(CompoundMember {
            name,
            offset,
            datatype,
        });
    }
    Ok(TypeKind::Compound { members })
}

/// Version-1 compounds describe array members inline; turn that into an
/// explicit array node.
fn promote_inline_array(
    base: Datatype,
    dims: Vec<u32>,
    opts: &DecodeOptions,
) -> Result<Datatype, FormatError> {
    let size = dims
        .iter()
        .try_fold(base.size, |acc, &d| acc.checked_mul(d))
        .ok_or(FormatError::FieldOutOfRange {
            field: "array size",
            value: u32::MAX as u64,
        })?;
    let version = base.version.max(2);
    let arr = Datatype {
        version,
        size,
        kind: TypeKind::Array {
            dims,
            base: Box::new(base),
        },
    };
    arr.check_node(opts.relaxed_integrity)?;
    Ok(arr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(class: u8, version: u8, flags: u32, size: u32) -> Vec<u8> {
        let mut buf = vec![(version << 4) | class];
        buf.extend_from_slice(&flags.to_le_bytes()[..3]);
        buf.extend_from_slice(&size.to_le_bytes());
        buf
    }

    fn int_bytes(size: u32, offset: u16, precision: u16) -> Vec<u8> {
        let mut buf = header(0, 1, 0x08, size);
        buf.extend_from_slice(&offset.to_le_bytes());
        buf.extend_from_slice(&precision.to_le_bytes());
        buf
    }

    #[test]
    fn test_integer_full_precision() {
        let data = int_bytes(4, 0, 32);
        let (dt, used) = Datatype::decode(&data).unwrap();
        assert_eq!(used, 12);
        assert_eq!(dt, Datatype::native_i32());
    }

    #[test]
    fn test_integer_offset_at_end_rejected() {
        let data = int_bytes(4, 32, 1);
        assert!(matches!(
            Datatype::decode(&data),
            Err(FormatError::FieldOutOfRange { field: "bit offset", .. })
        ));
    }

    #[test]
    fn test_integer_zero_precision_rejected() {
        let data = int_bytes(4, 0, 0);
        assert!(Datatype::decode(&data).is_err());
    }

    #[test]
    fn test_integer_unusual_bits_needs_relaxed() {
        let data = int_bytes(4, 0, 16);
        assert!(matches!(
            Datatype::decode(&data),
            Err(FormatError::UnusualUnusedBits { .. })
        ));
        let opts = DecodeOptions {
            relaxed_integrity: true,
            ..Default::default()
        };
        assert!(decode(&data, data.len(), &opts).is_ok());
    }

    #[test]
    fn test_bad_class_and_version() {
        let mut data = int_bytes(4, 0, 32);
        data[0] = (1 << 4) | 12;
        assert_eq!(
            Datatype::decode(&data),
            Err(FormatError::InvalidDatatypeClass(12))
        );
        data[0] = 6 << 4;
        assert!(matches!(
            Datatype::decode(&data),
            Err(FormatError::InvalidDatatypeVersion { version: 6, .. })
        ));
        data[0] = 0;
        assert!(Datatype::decode(&data).is_err());
    }

    #[test]
    fn test_opaque_empty_tag() {
        let data = header(5, 1, 0, 4);
        let (dt, used) = Datatype::decode(&data).unwrap();
        assert_eq!(used, 8);
        assert_eq!(dt.kind, TypeKind::Opaque { tag: String::new() });
    }

    #[test]
    fn test_opaque_tag_length_is_one_byte() {
        // Bits above the low byte are reserved; 0x108 is an 8-byte tag.
        let mut data = header(5, 1, 0x108, 4);
        data.extend_from_slice(b"TAG\0\0\0\0\0");
        let (dt, used) = Datatype::decode(&data).unwrap();
        assert_eq!(used, 16);
        assert_eq!(dt.kind, TypeKind::Opaque { tag: "TAG".into() });
    }

    #[test]
    fn test_opaque_tag_length_not_padded() {
        let mut data = header(5, 1, 0xFF, 4);
        data.extend_from_slice(&[b'x'; 255]);
        assert!(matches!(
            Datatype::decode(&data),
            Err(FormatError::FieldOutOfRange { field: "opaque tag length", .. })
        ));
    }

    #[test]
    fn test_opaque_unterminated_tag() {
        let mut data = header(5, 1, 8, 2);
        data.extend_from_slice(b"ABCDEFGH");
        let (dt, _) = Datatype::decode(&data).unwrap();
        assert_eq!(dt.kind, TypeKind::Opaque { tag: "ABCDEFGH".into() });
    }

    #[test]
    fn test_tight_buffer_and_one_short() {
        let data = int_bytes(2, 0, 16);
        assert!(decode(&data, data.len(), &DecodeOptions::default()).is_ok());
        let err = decode(&data, data.len() - 1, &DecodeOptions::default()).unwrap_err();
        assert!(matches!(err, FormatError::BodyOverflow { .. }));
        assert!(err.is_overflow());
    }

    #[test]
    fn test_unbounded_ignores_declared_size() {
        let mut data = int_bytes(2, 0, 16);
        data.extend_from_slice(&[0xAA; 5]);
        let (_, used) = decode(&data, SIZE_UNBOUNDED, &DecodeOptions::default()).unwrap();
        assert_eq!(used, 12);
        let short = &data[..10];
        assert!(matches!(
            decode(short, SIZE_UNBOUNDED, &DecodeOptions::default()),
            Err(FormatError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_v1_compound_inline_array_promotes() {
        let mut data = header(6, 1, 1, 12);
        data.extend_from_slice(b"arr\0\0\0\0\0");
        data.extend_from_slice(&0u32.to_le_bytes());
        data.push(1); // rank
        data.extend_from_slice(&[0u8; 3 + 4 + 4]);
        for d in [3u32, 0, 0, 0] {
            data.extend_from_slice(&d.to_le_bytes());
        }
        data.extend_from_slice(&int_bytes(4, 0, 32));
        let (dt, used) = Datatype::decode(&data).unwrap();
        assert_eq!(used, data.len());
        assert_eq!(dt.version, 2);
        match &dt.kind {
            TypeKind::Compound { members } => {
                assert_eq!(members[0].datatype.version, 2);
                assert!(matches!(
                    &members[0].datatype.kind,
                    TypeKind::Array { dims, .. } if dims == &vec![3]
                ));
            }
            _ => panic!("expected compound"),
        }

        let keep = DecodeOptions {
            preserve_version: true,
            ..Default::default()
        };
        let (dt, _) = decode(&data, data.len(), &keep).unwrap();
        assert_eq!(dt.version, 1);
    }

    #[test]
    fn test_compound_zero_members_rejected() {
        let data = header(6, 3, 0, 4);
        assert!(Datatype::decode(&data).is_err());
    }

    #[test]
    fn test_reference_versioned_subtype() {
        let data = header(7, 4, 0x12, 64);
        let (dt, _) = Datatype::decode(&data).unwrap();
        assert_eq!(dt.kind, TypeKind::Reference(RefKind::Object2));

        let data = header(7, 4, 0x22, 64);
        assert_eq!(
            Datatype::decode(&data),
            Err(FormatError::UnsupportedReference(2))
        );

        let data = header(7, 1, 0x00, 8);
        let (dt, _) = Datatype::decode(&data).unwrap();
        assert_eq!(dt.kind, TypeKind::Reference(RefKind::Object1));
    }

    #[test]
    fn test_complex_flags() {
        let mut data = header(11, 5, 0x01, 8);
        let mut f32_bytes = Datatype::native_f32().encode().unwrap();
        data.append(&mut f32_bytes.clone());
        let (dt, _) = Datatype::decode(&data).unwrap();
        assert_eq!(dt.version, 5);

        let mut polar = header(11, 5, 0x03, 8);
        polar.append(&mut f32_bytes);
        assert!(matches!(
            Datatype::decode(&polar),
            Err(FormatError::UnsupportedComplex(_))
        ));
    }

    #[test]
    fn test_offset_width() {
        assert_eq!(offset_width(0), 1);
        assert_eq!(offset_width(28), 1);
        assert_eq!(offset_width(255), 1);
        assert_eq!(offset_width(256), 2);
        assert_eq!(offset_width(65535), 2);
        assert_eq!(offset_width(65536), 3);
        assert_eq!(offset_width(1 << 24), 4);
    }
}

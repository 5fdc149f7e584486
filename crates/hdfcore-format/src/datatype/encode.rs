//! Datatype descriptor encoding.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use super::decode::offset_width;
use super::{
    padded_tag_len, ByteOrder, ComplexForm, Datatype, MantissaNorm, TypeKind, VlenKind,
    LATEST_VERSION, REFERENCE_ENCODE_VERSION,
};
use crate::error::FormatError;

/// Version bounds applied while encoding.
///
/// Each node is written at the highest of its own version, the version its
/// payload needs, the versions its children were written at, and
/// `min_version`. Exceeding `max_version` is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub min_version: u8,
    pub max_version: u8,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            min_version: 1,
            max_version: LATEST_VERSION,
        }
    }
}

impl EncodeOptions {
    /// Bounds with the given lower version and no upper restriction.
    pub fn at_least(min_version: u8) -> Self {
        Self {
            min_version,
            ..Self::default()
        }
    }

    pub fn bounds(min_version: u8, max_version: u8) -> Self {
        Self {
            min_version,
            max_version,
        }
    }
}

pub(crate) fn complex_flags(form: ComplexForm) -> u32 {
    let form_bits = match form {
        ComplexForm::Rectangular => 0,
        ComplexForm::Polar => 1,
        ComplexForm::Exponential => 2,
    };
    0x01 | (form_bits << 1)
}

fn order_flag(order: ByteOrder) -> u32 {
    match order {
        ByteOrder::LittleEndian => 0,
        ByteOrder::BigEndian => 0x01,
        ByteOrder::Vax => 0x41,
    }
}

fn put_name(out: &mut Vec<u8>, name: &str, padded: bool) {
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    if padded {
        let total = (name.len() + 1 + 7) & !7;
        out.resize(out.len() + total - name.len() - 1, 0);
    }
}

impl Datatype {
    /// Version this node would be written at under `opts`.
    pub fn emitted_version(&self, opts: &EncodeOptions) -> u8 {
        self.children()
            .into_iter()
            .map(|c| c.emitted_version(opts))
            .fold(
                self.version
                    .max(self.payload_min_version())
                    .max(opts.min_version),
                u8::max,
            )
    }

    /// Encode with the default version bounds.
    pub fn encode(&self) -> Result<Vec<u8>, FormatError> {
        self.encode_with(&EncodeOptions::default())
    }

    /// Encode under explicit version bounds.
    pub fn encode_with(&self, opts: &EncodeOptions) -> Result<Vec<u8>, FormatError> {
        let mut out = Vec::with_capacity(64);
        self.encode_into(&mut out, opts)?;
        Ok(out)
    }

    /// Encoded length in bytes under `opts`.
    pub fn encoded_len(&self, opts: &EncodeOptions) -> Result<usize, FormatError> {
        self.encode_with(opts).map(|v| v.len())
    }

    fn encode_into(&self, out: &mut Vec<u8>, opts: &EncodeOptions) -> Result<(), FormatError> {
        self.check_node(true)?;
        let version = self.emitted_version(opts);
        if version > opts.max_version || version > LATEST_VERSION {
            return Err(FormatError::VersionOutOfBounds {
                required: version,
                allowed: opts.max_version.min(LATEST_VERSION),
            });
        }

        let flags: u32 = match &self.kind {
            TypeKind::Integer(i) | TypeKind::Bitfield(i) => {
                order_flag(i.order)
                    | (i.low_pad as u32) << 1
                    | (i.high_pad as u32) << 2
                    | (i.signed as u32) << 3
            }
            TypeKind::Float(f) => {
                let norm = match f.norm {
                    MantissaNorm::None => 0,
                    MantissaNorm::MsbSet => 1,
                    MantissaNorm::Implied => 2,
                };
                order_flag(f.order)
                    | (f.low_pad as u32) << 1
                    | (f.high_pad as u32) << 2
                    | (f.internal_pad as u32) << 3
                    | norm << 4
                    | (f.sign_pos as u32) << 8
            }
            TypeKind::Time { order, .. } => order_flag(*order),
            TypeKind::String { pad, cset } => pad.code() as u32 | (cset.code() as u32) << 4,
            TypeKind::Opaque { tag } => padded_tag_len(tag.len()) as u32,
            TypeKind::Compound { members } => members.len() as u32,
            TypeKind::Reference(kind) => {
                let mut flags = kind.code() as u32;
                if kind.is_versioned() {
                    flags |= (REFERENCE_ENCODE_VERSION as u32) << 4;
                }
                flags
            }
            TypeKind::Enum { members, .. } => members.len() as u32,
            TypeKind::Vlen { kind, .. } => match kind {
                VlenKind::Sequence => 0,
                VlenKind::String { pad, cset } => {
                    1 | (pad.code() as u32) << 4 | (cset.code() as u32) << 8
                }
            },
            TypeKind::Array { .. } => 0,
            TypeKind::Complex { form, .. } => complex_flags(*form),
        };

        out.push((version << 4) | self.class().code());
        out.extend_from_slice(&flags.to_le_bytes()[..3]);
        out.extend_from_slice(&self.size.to_le_bytes());

        match &self.kind {
            TypeKind::Integer(i) | TypeKind::Bitfield(i) => {
                out.extend_from_slice(&i.offset.to_le_bytes());
                out.extend_from_slice(&i.precision.to_le_bytes());
            }
            TypeKind::Float(f) => {
                out.extend_from_slice(&f.offset.to_le_bytes());
                out.extend_from_slice(&f.precision.to_le_bytes());
                out.extend_from_slice(&[f.exp_pos, f.exp_size, f.mant_pos, f.mant_size]);
                out.extend_from_slice(&f.exp_bias.to_le_bytes());
            }
            TypeKind::Time { precision, .. } => {
                out.extend_from_slice(&precision.to_le_bytes());
            }
            TypeKind::String { .. } | TypeKind::Reference(_) => {}
            TypeKind::Opaque { tag } => {
                let start = out.len();
                out.extend_from_slice(tag.as_bytes());
                out.resize(start + padded_tag_len(tag.len()), 0);
            }
            TypeKind::Compound { members } => {
                let width = offset_width(self.size);
                for m in members {
                    put_name(out, &m.name, version < 3);
                    if version >= 3 {
                        out.extend_from_slice(&m.offset.to_le_bytes()[..width]);
                    } else {
                        out.extend_from_slice(&m.offset.to_le_bytes());
                    }
                    if version == 1 {
                        // rank 0, reserved, permutation, reserved, 4 dims
                        out.extend_from_slice(&[0u8; 1 + 3 + 4 + 4 + 16]);
                    }
                    m.datatype.encode_into(out, opts)?;
                }
            }
            TypeKind::Enum { base, members } => {
                base.encode_into(out, opts)?;
                for m in members {
                    put_name(out, &m.name, version < 3);
                }
                for m in members {
                    out.extend_from_slice(&m.value);
                }
            }
            TypeKind::Vlen { base, .. } | TypeKind::Complex { base, .. } => {
                base.encode_into(out, opts)?;
            }
            TypeKind::Array { dims, base } => {
                out.push(dims.len() as u8);
                if version < 3 {
                    out.extend_from_slice(&[0u8; 3]);
                }
                for d in dims {
                    out.extend_from_slice(&d.to_le_bytes());
                }
                if version < 3 {
                    for i in 0..dims.len() as u32 {
                        out.extend_from_slice(&i.to_le_bytes());
                    }
                }
                base.encode_into(out, opts)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::{decode, CompoundBuilder, DecodeOptions, RefKind};

    #[test]
    fn i32_layout() {
        let bytes = Datatype::native_i32().encode().unwrap();
        assert_eq!(bytes, vec![0x10, 0x08, 0, 0, 4, 0, 0, 0, 0, 0, 32, 0]);
    }

    #[test]
    fn f64_layout() {
        let bytes = Datatype::native_f64().encode().unwrap();
        assert_eq!(bytes.len(), 20);
        assert_eq!(bytes[0], 0x11);
        // implied normalization, sign at bit 63
        assert_eq!(bytes[1], 0x20);
        assert_eq!(bytes[2], 63);
        assert_eq!(&bytes[16..20], &1023u32.to_le_bytes());
    }

    #[test]
    fn compound_v3_uses_narrow_offsets() {
        let c = CompoundBuilder::new()
            .member("a", Datatype::native_u8())
            .member("b", Datatype::native_u8())
            .build()
            .unwrap();
        let bytes = c.encode_with(&EncodeOptions::at_least(3)).unwrap();
        // header(8) + "a\0" + 1-byte offset + member(12), twice
        assert_eq!(bytes.len(), 8 + 2 * (2 + 1 + 12));
        assert_eq!(bytes[0] >> 4, 3);
        let (back, used) = decode(&bytes, bytes.len(), &DecodeOptions::default()).unwrap();
        assert_eq!(used, bytes.len());
        assert!(back.equivalent(&c));
        assert_eq!(back.version, 3);
    }

    #[test]
    fn max_version_enforced() {
        let r = Datatype::reference(RefKind::Object2);
        assert_eq!(
            r.encode_with(&EncodeOptions::bounds(1, 3)),
            Err(FormatError::VersionOutOfBounds {
                required: 4,
                allowed: 3
            })
        );
        let bytes = r.encode().unwrap();
        assert_eq!(bytes[0] >> 4, 4);
        assert_eq!(bytes[1], 0x12);
    }

    #[test]
    fn opaque_tag_padded_without_forced_nul() {
        let t = Datatype::opaque(4, "ABCDEFGH").unwrap();
        let bytes = t.encode().unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[1], 8);
        assert_eq!(&bytes[8..], b"ABCDEFGH");
    }

    #[test]
    fn opaque_tag_length_fits_one_byte() {
        let tag: String = core::iter::repeat('q').take(248).collect();
        let bytes = Datatype::opaque(4, &tag).unwrap().encode().unwrap();
        assert_eq!(bytes[1], 248);
        assert_eq!(bytes[2], 0);
        let (back, _) = Datatype::decode(&bytes).unwrap();
        assert_eq!(back.kind, TypeKind::Opaque { tag });

        let oversized = Datatype {
            version: 1,
            size: 4,
            kind: TypeKind::Opaque {
                tag: core::iter::repeat('q').take(255).collect(),
            },
        };
        assert!(matches!(
            oversized.encode(),
            Err(FormatError::FieldOutOfRange { field: "opaque tag length", .. })
        ));
    }

    #[test]
    fn complex_flags_value() {
        assert_eq!(complex_flags(ComplexForm::Rectangular), 0x01);
        assert_eq!(complex_flags(ComplexForm::Polar), 0x03);
    }
}

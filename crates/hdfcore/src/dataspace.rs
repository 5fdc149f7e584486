//! Simple dataspaces: a rank, current dimensions and maximum dimensions.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Category, Error, Result};

/// Maximum dimension that may grow without bound.
pub const UNLIMITED: u64 = u64::MAX;

const MAX_RANK: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataspace {
    dims: Vec<u64>,
    max_dims: Vec<u64>,
}

impl Dataspace {
    /// A single element.
    pub fn scalar() -> Self {
        Self {
            dims: Vec::new(),
            max_dims: Vec::new(),
        }
    }

    /// Fixed-size dataspace.
    pub fn simple(dims: &[u64]) -> Result<Self> {
        Self::with_max(dims, dims)
    }

    pub fn with_max(dims: &[u64], max_dims: &[u64]) -> Result<Self> {
        if dims.len() > MAX_RANK {
            return Err(Error::args(
                Category::Dataspace,
                format!("rank {} exceeds {MAX_RANK}", dims.len()),
            ));
        }
        if dims.len() != max_dims.len() {
            return Err(Error::args(Category::Dataspace, "rank of max dims differs"));
        }
        if let Some(i) = dims.iter().zip(max_dims).position(|(d, m)| d > m) {
            return Err(Error::args(
                Category::Dataspace,
                format!("dimension {i} exceeds its maximum"),
            ));
        }
        Ok(Self {
            dims: dims.to_vec(),
            max_dims: max_dims.to_vec(),
        })
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    pub fn max_dims(&self) -> &[u64] {
        &self.max_dims
    }

    /// Number of elements.
    pub fn npoints(&self) -> Result<u64> {
        self.dims
            .iter()
            .try_fold(1u64, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| {
                Error::new(
                    Category::Dataspace,
                    crate::error::ErrorKind::Overflow,
                    "element count overflows",
                )
            })
    }

    /// Change the current dimensions within the maximums.
    pub fn set_extent(&mut self, dims: &[u64]) -> Result<()> {
        if dims.len() != self.dims.len() {
            return Err(Error::args(Category::Dataspace, "extent rank differs"));
        }
        if let Some(i) = dims.iter().zip(&self.max_dims).position(|(d, m)| d > m) {
            return Err(Error::args(
                Category::Dataspace,
                format!("dimension {i} exceeds its maximum"),
            ));
        }
        self.dims = dims.to_vec();
        Ok(())
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + 16 * self.dims.len());
        out.push(self.rank() as u8);
        let has_max = self.max_dims != self.dims;
        out.push(has_max as u8);
        for &d in &self.dims {
            // Writing to a Vec cannot fail.
            let _ = out.write_u64::<LittleEndian>(d);
        }
        if has_max {
            for &m in &self.max_dims {
                let _ = out.write_u64::<LittleEndian>(m);
            }
        }
        out
    }

    pub(crate) fn decode(data: &[u8]) -> Result<Self> {
        let malformed = |what: &str| {
            Error::new(
                Category::Dataspace,
                crate::error::ErrorKind::DecodeMalformed,
                format!("dataspace message: {what}"),
            )
        };
        let mut cur = Cursor::new(data);
        let rank = cur.read_u8().map_err(|_| malformed("truncated"))? as usize;
        if rank > MAX_RANK {
            return Err(malformed("rank out of range"));
        }
        let mut flags = [0u8; 1];
        cur.read_exact(&mut flags).map_err(|_| malformed("truncated"))?;
        let mut dims = Vec::with_capacity(rank);
        for _ in 0..rank {
            dims.push(cur.read_u64::<LittleEndian>().map_err(|_| malformed("truncated"))?);
        }
        let max_dims = if flags[0] & 1 != 0 {
            let mut m = Vec::with_capacity(rank);
            for _ in 0..rank {
                m.push(cur.read_u64::<LittleEndian>().map_err(|_| malformed("truncated"))?);
            }
            m
        } else {
            dims.clone()
        };
        Self::with_max(&dims, &max_dims).map_err(|_| malformed("dimension above maximum"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_has_one_point() {
        assert_eq!(Dataspace::scalar().npoints().unwrap(), 1);
    }

    #[test]
    fn extent_bounded_by_max() {
        let mut s = Dataspace::with_max(&[2, 3], &[UNLIMITED, 3]).unwrap();
        s.set_extent(&[10, 3]).unwrap();
        assert_eq!(s.npoints().unwrap(), 30);
        assert!(s.set_extent(&[10, 4]).is_err());
        assert!(s.set_extent(&[10]).is_err());
    }

    #[test]
    fn encoded_form_decodes() {
        let s = Dataspace::with_max(&[4], &[UNLIMITED]).unwrap();
        assert_eq!(Dataspace::decode(&s.encode()).unwrap(), s);
        let fixed = Dataspace::simple(&[5, 6]).unwrap();
        assert_eq!(fixed.encode().len(), 2 + 16);
        assert!(Dataspace::decode(&[1, 0, 9]).is_err());
    }
}

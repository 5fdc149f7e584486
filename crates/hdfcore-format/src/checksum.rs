//! Metadata checksum: Bob Jenkins' lookup3 `hashlittle`.

/// Checksum a metadata image.
pub fn lookup3(data: &[u8]) -> u32 {
    hash_little(data, 0)
}

/// Checksum `data` and compare against `stored`.
pub fn verify(data: &[u8], stored: u32) -> Result<(), crate::error::FormatError> {
    let computed = lookup3(data);
    if computed == stored {
        Ok(())
    } else {
        Err(crate::error::FormatError::ChecksumMismatch {
            expected: stored,
            computed,
        })
    }
}

#[inline]
fn word(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[inline]
fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    for (x, y, z, k) in [(0u8, 2u8, 1u8, 4u32), (1, 0, 2, 6), (2, 1, 0, 8), (0, 2, 1, 16), (1, 0, 2, 19), (2, 1, 0, 4)] {
        let mut v = [*a, *b, *c];
        v[x as usize] = v[x as usize].wrapping_sub(v[y as usize]);
        v[x as usize] ^= v[y as usize].rotate_left(k);
        v[y as usize] = v[y as usize].wrapping_add(v[z as usize]);
        *a = v[0];
        *b = v[1];
        *c = v[2];
    }
}

#[inline]
fn finish(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(14));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(11));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(25));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(16));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(4));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(14));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(24));
}

fn hash_little(data: &[u8], seed: u32) -> u32 {
    let init = 0xdead_beefu32
        .wrapping_add(data.len() as u32)
        .wrapping_add(seed);
    let (mut a, mut b, mut c) = (init, init, init);

    let mut rest = data;
    while rest.len() > 12 {
        a = a.wrapping_add(word(&rest[0..4]));
        b = b.wrapping_add(word(&rest[4..8]));
        c = c.wrapping_add(word(&rest[8..12]));
        mix(&mut a, &mut b, &mut c);
        rest = &rest[12..];
    }
    if rest.is_empty() {
        return c;
    }

    // Missing tail bytes contribute zero, so a zero-padded block is equivalent.
    let mut tail = [0u8; 12];
    tail[..rest.len()].copy_from_slice(rest);
    a = a.wrapping_add(word(&tail[0..4]));
    b = b.wrapping_add(word(&tail[4..8]));
    c = c.wrapping_add(word(&tail[8..12]));
    finish(&mut a, &mut b, &mut c);
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert_eq!(lookup3(&[]), 0xdeadbeef);
    }

    #[test]
    fn reference_vector() {
        // From lookup3.c driver5: hashlittle("Four score and seven years ago", 30, 0)
        assert_eq!(lookup3(b"Four score and seven years ago"), 0x17770551);
    }

    #[test]
    fn block_boundaries_differ() {
        let data: Vec<u8> = (0u8..40).collect();
        let mut seen = std::collections::BTreeSet::new();
        for n in 0..data.len() {
            assert!(seen.insert(lookup3(&data[..n])), "collision at length {n}");
        }
    }

    #[test]
    fn verify_reports_mismatch() {
        let sum = lookup3(b"abc");
        assert!(verify(b"abc", sum).is_ok());
        assert!(verify(b"abd", sum).is_err());
    }
}

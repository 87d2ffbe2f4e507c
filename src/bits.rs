//! Bit-field extraction over little-endian byte buffers

pub const BITS_PER_BYTE: usize = 8;
pub const BITS_PER_U64: usize = 64;

/// Mask covering the low `bit_width` bits
pub const fn field_mask(bit_width: usize) -> u64 {
    if bit_width >= BITS_PER_U64 {
        u64::MAX
    } else {
        (1_u64 << bit_width) - 1
    }
}

/// Number of whole bytes needed to hold `bits`
pub const fn bytes_for_bits(bits: usize) -> usize {
    (bits + BITS_PER_BYTE - 1) / BITS_PER_BYTE
}

/// Extract an unsigned `bit_width`-wide field located `bit_offset` bits past
/// `byte_offset` in `buf`.
///
/// Bytes past the end of `buf` read as zero, so this never panics. Callers are
/// expected to have checked that the whole structure containing the field is
/// present before relying on the value.
pub fn extract(buf: &[u8], byte_offset: usize, bit_offset: usize, bit_width: usize) -> u64 {
    let start = byte_offset.saturating_add(bit_offset / BITS_PER_BYTE);
    let shift = bit_offset % BITS_PER_BYTE;

    // A 64-bit field with a non-zero shift straddles 9 bytes
    let mut raw = [0_u8; 16];
    if let Some(avail) = buf.get(start..) {
        let len = avail.len().min(BITS_PER_U64 / BITS_PER_BYTE + 1);
        raw[..len].copy_from_slice(&avail[..len]);
    }
    let word = u128::from_le_bytes(raw) >> shift;
    (word as u64) & field_mask(bit_width)
}

/// Two's-complement widen a `bit_width`-wide field to 64 bits
pub const fn sign_extend(value: u64, bit_width: usize) -> u64 {
    if bit_width == 0 || bit_width >= BITS_PER_U64 {
        return value;
    }
    let mask = field_mask(bit_width);
    if value & (1_u64 << (bit_width - 1)) != 0 {
        value | !mask
    } else {
        value & mask
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Write the low `bit_width` bits of `value` into `buf` at `bit_offset`
    fn insert(buf: &mut [u8], bit_offset: usize, bit_width: usize, value: u64) {
        for bit in 0..bit_width {
            let pos = bit_offset + bit;
            let byte = &mut buf[pos / BITS_PER_BYTE];
            let mask = 1_u8 << (pos % BITS_PER_BYTE);
            if (value >> bit) & 1 == 1 {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
        }
    }

    #[test]
    fn masks() {
        assert_eq!(field_mask(1), 0x1);
        assert_eq!(field_mask(12), 0xFFF);
        assert_eq!(field_mask(63), u64::MAX >> 1);
        assert_eq!(field_mask(64), u64::MAX);
        assert_eq!(bytes_for_bits(0), 0);
        assert_eq!(bytes_for_bits(1), 1);
        assert_eq!(bytes_for_bits(64), 8);
        assert_eq!(bytes_for_bits(65), 9);
    }

    #[test]
    fn extract_aligned_and_unaligned() {
        let buf = 0x0123_4567_89AB_CDEF_u64.to_le_bytes();
        assert_eq!(extract(&buf, 0, 0, 64), 0x0123_4567_89AB_CDEF);
        assert_eq!(extract(&buf, 0, 0, 8), 0xEF);
        assert_eq!(extract(&buf, 0, 4, 8), 0xDE);
        assert_eq!(extract(&buf, 1, 0, 16), 0xABCD);
        assert_eq!(extract(&buf, 0, 60, 4), 0x0);
        assert_eq!(extract(&buf, 0, 56, 8), 0x01);
    }

    #[test]
    fn extract_past_end_reads_zero() {
        let buf = [0xFF_u8; 3];
        assert_eq!(extract(&buf, 0, 0, 32), 0x00FF_FFFF);
        assert_eq!(extract(&buf, 2, 4, 8), 0x0F);
        assert_eq!(extract(&buf, 8, 0, 64), 0);
        assert_eq!(extract(&buf, usize::MAX, 9, 8), 0);
    }

    #[test]
    fn extract_round_trip_all_widths_and_offsets() {
        let pattern = 0xA5C3_96F0_1E2D_3C4B_u64;
        for bit_width in 1..=64 {
            let value = pattern & field_mask(bit_width);
            for bit_offset in 0..64 {
                let mut buf = [0_u8; 24];
                insert(&mut buf, bit_offset, bit_width, value);
                let extracted = extract(&buf, 0, bit_offset, bit_width);
                assert_eq!(extracted, value, "width {bit_width} offset {bit_offset}");

                let mut fresh = [0_u8; 24];
                insert(&mut fresh, bit_offset, bit_width, extracted);
                assert_eq!(fresh, buf);
                assert_eq!(extract(&fresh, 0, bit_offset, bit_width), value);
            }
        }
    }

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend(0xFF, 8) as i64, -1);
        assert_eq!(sign_extend(0x80, 8) as i64, -128);
        assert_eq!(sign_extend(0x7F, 8) as i64, 127);
        assert_eq!(sign_extend(0x800, 12) as i64, 0x800 - (1 << 12));
        assert_eq!(sign_extend(0x1, 1) as i64, -1);
        assert_eq!(sign_extend(u64::MAX, 64), u64::MAX);
        for n in 1..64 {
            let stored = field_mask(n);
            let expected = i128::from(stored) - (1_i128 << n);
            assert_eq!(i128::from(sign_extend(stored, n) as i64), expected);
        }
    }
}

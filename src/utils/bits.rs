//! Bit manipulation utilities.

/// Count the number of set bits in a u64.
#[inline]
pub fn popcount_u64(x: u64) -> u32 {
    x.count_ones()
}

/// Compute Hamming distance between two u64 values.
#[inline]
pub fn hamming_distance_u64(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Mask selecting the live bits of the last word of a `len`-bit set.
#[inline]
pub fn tail_mask(len: usize) -> u64 {
    match len % 64 {
        0 => u64::MAX,
        r => (1u64 << r) - 1,
    }
}

/// Hamming distance between the first `len` bits of two LSB-first word
/// slices. Bits past `len` are ignored whatever their value.
pub fn hamming_distance_words(a: &[u64], b: &[u64], len: usize) -> u32 {
    let words = len.div_ceil(64);
    debug_assert!(a.len() >= words && b.len() >= words);
    if words == 0 {
        return 0;
    }
    let full: u32 = a[..words - 1]
        .iter()
        .zip(&b[..words - 1])
        .map(|(&x, &y)| hamming_distance_u64(x, y))
        .sum();
    let last = (a[words - 1] ^ b[words - 1]) & tail_mask(len);
    full + popcount_u64(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_popcount() {
        assert_eq!(popcount_u64(0xFFFF_FFFF_FFFF_FFFF), 64);
        assert_eq!(popcount_u64(0b1011), 3);
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance_u64(0xFF, 0x00), 8);
        assert_eq!(hamming_distance_u64(0xAA, 0x55), 8);
    }

    #[test]
    fn test_tail_mask() {
        assert_eq!(tail_mask(64), u64::MAX);
        assert_eq!(tail_mask(3), 0b111);
        assert_eq!(tail_mask(65), 1);
    }

    #[test]
    fn test_hamming_distance_words_ignores_dead_bits() {
        // 70 live bits: one full word plus 6 bits of the second
        let a = [u64::MAX, 0b11_0000_0000];
        let b = [0, 0];
        assert_eq!(hamming_distance_words(&a, &b, 70), 64);
        assert_eq!(hamming_distance_words(&a, &b, 0), 0);
        assert_eq!(hamming_distance_words(&[0b101], &[0b011], 3), 2);
    }
}

//! Signatures produced by encoding a vector against a hash family.
//!
//! Euclidean families yield a [`BucketSignature`] (one bucket index per
//! band); Angular families yield a [`BitSketch`] (one sign bit per
//! hyperplane). Signatures are only comparable when both came from the
//! same family.

use crate::error::{LshError, Result};
use crate::types::{BucketIndex, HashVariant};
use crate::utils::bits::hamming_distance_words;
use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Ordered bucket indices, one per Euclidean band.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketSignature(pub Vec<BucketIndex>);

impl BucketSignature {
    /// Number of bands.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bucket indices.
    #[inline]
    pub fn buckets(&self) -> &[BucketIndex] {
        &self.0
    }

    /// True iff every band agrees. Stops at the first mismatching band.
    #[inline]
    pub fn matches_all_bands(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a == b)
    }

    /// Number of bands that disagree.
    pub fn hamming(&self, other: &Self) -> usize {
        self.0.iter().zip(&other.0).filter(|(a, b)| a != b).count()
    }
}

/// K sign bits, bit i set iff the vector lies on the positive side of
/// hyperplane i.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitSketch(BitVec<u64, Lsb0>);

impl BitSketch {
    /// Create an all-zero sketch of `len` bits.
    pub fn zeros(len: usize) -> Self {
        Self(bitvec![u64, Lsb0; 0; len])
    }

    /// Build a sketch from individual bits.
    pub fn from_bools(bits: &[bool]) -> Self {
        Self(bits.iter().copied().collect())
    }

    /// Number of bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get bit `i`.
    #[inline]
    pub fn get(&self, i: usize) -> bool {
        self.0[i]
    }

    /// Set bit `i`.
    #[inline]
    pub fn set(&mut self, i: usize, value: bool) {
        self.0.set(i, value);
    }

    /// Borrow the underlying bits.
    #[inline]
    pub fn bits(&self) -> &BitSlice<u64, Lsb0> {
        &self.0
    }

    /// Number of differing bits (XOR + popcount).
    pub fn hamming(&self, other: &Self) -> usize {
        let len = self.len().min(other.len());
        hamming_distance_words(self.0.as_raw_slice(), other.0.as_raw_slice(), len) as usize
            + self.len().abs_diff(other.len())
    }

    /// Estimated cosine similarity to `other`.
    pub fn similarity(&self, other: &Self) -> f64 {
        estimated_similarity(self.hamming(other), self.len())
    }
}

/// Cosine similarity estimated from the Hamming distance of two K-bit
/// sketches: `cos(pi * hamming / K)`.
///
/// Two vectors disagree on a random hyperplane with probability
/// `angle / pi`, so `pi * hamming / K` estimates the angle. Returns 1.0
/// for `K = 0`, where every pair of sketches is identical.
#[inline]
pub fn estimated_similarity(hamming: usize, k: usize) -> f64 {
    if k == 0 {
        return 1.0;
    }
    (PI * hamming as f64 / k as f64).cos()
}

/// Inverse of [`estimated_similarity`]: the Hamming distance over `k` bits
/// whose estimate is closest to `similarity`.
pub fn hamming_for_similarity(similarity: f64, k: usize) -> usize {
    let h = similarity.clamp(-1.0, 1.0).acos() * k as f64 / PI;
    (h.round() as usize).min(k)
}

/// A vector's encoding against one hash family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signature {
    /// Euclidean bucket indices.
    Buckets(BucketSignature),
    /// Angular sign bits.
    Bits(BitSketch),
}

impl Signature {
    /// Variant of the family that produced this signature.
    pub fn variant(&self) -> HashVariant {
        match self {
            Signature::Buckets(_) => HashVariant::Euclidean,
            Signature::Bits(_) => HashVariant::Angular,
        }
    }

    /// Number of hash outputs K.
    pub fn len(&self) -> usize {
        match self {
            Signature::Buckets(b) => b.len(),
            Signature::Bits(s) => s.len(),
        }
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bucket signature, if Euclidean.
    pub fn as_buckets(&self) -> Option<&BucketSignature> {
        match self {
            Signature::Buckets(b) => Some(b),
            Signature::Bits(_) => None,
        }
    }

    /// Bit sketch, if Angular.
    pub fn as_bits(&self) -> Option<&BitSketch> {
        match self {
            Signature::Bits(s) => Some(s),
            Signature::Buckets(_) => None,
        }
    }

    /// Number of positions where the two signatures disagree.
    ///
    /// Fails with `ConfigMismatch` when the signatures come from different
    /// variants or lengths, since they cannot share a family.
    pub fn hamming(&self, other: &Signature) -> Result<usize> {
        self.check_comparable(other)?;
        Ok(match (self, other) {
            (Signature::Buckets(a), Signature::Buckets(b)) => a.hamming(b),
            (Signature::Bits(a), Signature::Bits(b)) => a.hamming(b),
            _ => unreachable!("variants checked above"),
        })
    }

    /// Fail unless both signatures have the same variant and length.
    pub fn check_comparable(&self, other: &Signature) -> Result<()> {
        if self.variant() != other.variant() || self.len() != other.len() {
            return Err(LshError::config_mismatch(format!(
                "cannot compare {} signature of length {} with {} signature of length {}",
                self.variant(),
                self.len(),
                other.variant(),
                other.len()
            )));
        }
        Ok(())
    }

    /// Parse the text form written by `Display`.
    ///
    /// Buckets are comma-separated integers; bits are a run of `0`/`1`.
    pub fn parse(text: &str, variant: HashVariant) -> Result<Self> {
        let text = text.trim();
        match variant {
            HashVariant::Euclidean => {
                if text.is_empty() {
                    return Ok(Signature::Buckets(BucketSignature(Vec::new())));
                }
                let buckets = text
                    .split(',')
                    .map(|t| {
                        t.trim().parse::<BucketIndex>().map_err(|_| {
                            LshError::parse(format!("`{t}` is not a bucket index"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Signature::Buckets(BucketSignature(buckets)))
            }
            HashVariant::Angular => {
                let bits = text
                    .chars()
                    .map(|c| match c {
                        '0' => Ok(false),
                        '1' => Ok(true),
                        other => Err(LshError::parse(format!("`{other}` is not a sketch bit"))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Signature::Bits(BitSketch::from_bools(&bits)))
            }
        }
    }
}

impl fmt::Display for BucketSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{b}")?;
        }
        Ok(())
    }
}

impl fmt::Display for BitSketch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.0.iter().by_vals() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signature::Buckets(b) => fmt::Display::fmt(b, f),
            Signature::Bits(s) => fmt::Display::fmt(s, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_endpoints() {
        assert_eq!(estimated_similarity(0, 8), 1.0);
        assert_eq!(estimated_similarity(8, 8), -1.0);
        assert!(estimated_similarity(4, 8).abs() < 1e-12);
        assert_eq!(estimated_similarity(0, 0), 1.0);
    }

    #[test]
    fn test_similarity_monotone() {
        let k = 15;
        let sims: Vec<f64> = (0..=k).map(|h| estimated_similarity(h, k)).collect();
        for pair in sims.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
    }

    #[test]
    fn test_hamming_for_similarity_inverts_estimate() {
        for k in [1, 8, 33] {
            for h in 0..=k {
                assert_eq!(hamming_for_similarity(estimated_similarity(h, k), k), h);
            }
        }
        assert_eq!(hamming_for_similarity(0.3, 0), 0);
    }

    #[test]
    fn test_sketch_hamming() {
        let a = BitSketch::from_bools(&[true, false, true, true]);
        let b = BitSketch::from_bools(&[true, true, false, true]);
        assert_eq!(a.hamming(&b), 2);
        assert_eq!(a.hamming(&a), 0);
        assert!((a.similarity(&b) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_sketch_hamming_past_one_word() {
        let mut a = BitSketch::zeros(100);
        let b = BitSketch::zeros(100);
        a.set(3, true);
        a.set(70, true);
        a.set(99, true);
        assert_eq!(a.hamming(&b), 3);
    }

    #[test]
    fn test_bucket_matching() {
        let q = BucketSignature(vec![1, -2, 3]);
        assert!(q.matches_all_bands(&BucketSignature(vec![1, -2, 3])));
        assert!(!q.matches_all_bands(&BucketSignature(vec![1, -2, 4])));
        assert_eq!(q.hamming(&BucketSignature(vec![0, -2, 4])), 2);
        // zero bands match vacuously
        assert!(BucketSignature(vec![]).matches_all_bands(&BucketSignature(vec![])));
    }

    #[test]
    fn test_display_and_parse() {
        let buckets = Signature::Buckets(BucketSignature(vec![1, -2, 30]));
        assert_eq!(buckets.to_string(), "1,-2,30");
        assert_eq!(
            Signature::parse("1,-2,30", HashVariant::Euclidean).unwrap(),
            buckets
        );

        let bits = Signature::Bits(BitSketch::from_bools(&[false, true, true]));
        assert_eq!(bits.to_string(), "011");
        assert_eq!(Signature::parse("011", HashVariant::Angular).unwrap(), bits);

        assert!(Signature::parse("1,x", HashVariant::Euclidean).is_err());
        assert!(Signature::parse("012", HashVariant::Angular).is_err());
    }

    #[test]
    fn test_incomparable_signatures() {
        let a = Signature::Buckets(BucketSignature(vec![1, 2]));
        let b = Signature::Bits(BitSketch::zeros(2));
        let c = Signature::Buckets(BucketSignature(vec![1, 2, 3]));
        assert!(a.hamming(&b).is_err());
        assert!(a.hamming(&c).is_err());
        assert_eq!(a.hamming(&a).unwrap(), 0);
    }
}

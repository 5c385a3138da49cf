//! Signature encoding.
//!
//! One encoder serves both variants and both vector representations:
//! the family decides bucket indices vs. sign bits, the vector decides
//! whether the dot product walks every dimension or only populated ones.

use super::family::{HashFamily, HashVector};
use super::signature::{BitSketch, BucketSignature, Signature};
use crate::data_format::Vector;
use crate::error::{LshError, Result};
use crate::types::{BucketIndex, HashVariant};

/// Encodes vectors against one hash family.
#[derive(Debug, Clone, Copy)]
pub struct SignatureEncoder<'a> {
    family: &'a HashFamily,
    bucket_width: Option<f64>,
}

impl<'a> SignatureEncoder<'a> {
    /// Create an encoder. Euclidean families need a positive bucket width;
    /// Angular families ignore it.
    pub fn new(family: &'a HashFamily, bucket_width: Option<f64>) -> Result<Self> {
        if family.variant() == HashVariant::Euclidean {
            match bucket_width {
                Some(w) if w.is_finite() && w > 0.0 => {}
                Some(w) => {
                    return Err(LshError::invalid_argument(format!(
                        "bucket width must be positive and finite, got {w}"
                    )))
                }
                None => {
                    return Err(LshError::invalid_argument(
                        "Euclidean hash family needs a bucket width",
                    ))
                }
            }
        }
        Ok(Self {
            family,
            bucket_width,
        })
    }

    /// The family this encoder hashes against.
    pub fn family(&self) -> &'a HashFamily {
        self.family
    }

    /// Encode `vector` into a signature of length K.
    ///
    /// Identical inputs always produce identical signatures.
    pub fn encode(&self, vector: &Vector) -> Result<Signature> {
        vector.check_dimension(self.family.dimension())?;
        match self.family.variant() {
            HashVariant::Euclidean => {
                let buckets = self
                    .projections(vector)
                    .collect::<Result<Vec<BucketIndex>>>()?;
                Ok(Signature::Buckets(BucketSignature(buckets)))
            }
            HashVariant::Angular => {
                let bits: Vec<bool> = self
                    .family
                    .vectors()
                    .iter()
                    .map(|h| match h {
                        HashVector::Angular(plane) => vector.signed_sum(plane) >= 0.0,
                        HashVector::Euclidean(_) => unreachable!("family variant validated"),
                    })
                    .collect();
                Ok(Signature::Bits(BitSketch::from_bools(&bits)))
            }
        }
    }

    /// True iff `vector` lands in the same bucket as `query` in every band.
    ///
    /// Bands are projected one at a time and the first mismatch returns
    /// `false` without touching the remaining bands.
    pub fn matches_buckets(&self, vector: &Vector, query: &BucketSignature) -> Result<bool> {
        vector.check_dimension(self.family.dimension())?;
        if query.len() != self.family.len() {
            return Err(LshError::config_mismatch(format!(
                "query has {} bands, hash family has {}",
                query.len(),
                self.family.len()
            )));
        }
        for (bucket, &expected) in self.projections(vector).zip(query.buckets()) {
            if bucket? != expected {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Lazily quantized projections of `vector`, one per band.
    fn projections<'v>(&self, vector: &'v Vector) -> impl Iterator<Item = Result<BucketIndex>> + 'v
    where
        'a: 'v,
    {
        let family: &'v HashFamily = self.family;
        let width = self.bucket_width.unwrap_or(1.0);
        family.vectors().iter().map(move |h| match h {
            HashVector::Euclidean(h) => bucket_of(vector.dot(h), width),
            HashVector::Angular(_) => Err(LshError::internal("angular plane in a Euclidean family")),
        })
    }
}

/// Quantize a projection with true floor division, so buckets are
/// symmetric around zero: `-0.5 / 1.0` lands in bucket `-1`.
///
/// A quotient outside the `i64` range is rejected rather than clamped.
#[inline]
pub fn bucket_of(scalar: f64, bucket_width: f64) -> Result<BucketIndex> {
    let bucket = (scalar / bucket_width).floor();
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    if bucket.is_finite() && bucket >= i64::MIN as f64 && bucket < i64::MAX as f64 {
        Ok(bucket as BucketIndex)
    } else {
        Err(LshError::invalid_argument(format!(
            "projection {scalar} over bucket width {bucket_width} overflows the bucket index"
        )))
    }
}

/// Encode `vector` against `family` in one call.
pub fn encode(vector: &Vector, family: &HashFamily, bucket_width: Option<f64>) -> Result<Signature> {
    SignatureEncoder::new(family, bucket_width)?.encode(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_format::{parse_dense, parse_sparse};
    use crate::hashes::HashFamilyGenerator;
    use bitvec::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_floor_not_truncation() {
        assert_eq!(bucket_of(-0.5, 1.0).unwrap(), -1);
        assert_eq!(bucket_of(0.5, 1.0).unwrap(), 0);
        assert_eq!(bucket_of(-20.0, 20.0).unwrap(), -1);
        assert_eq!(bucket_of(-20.1, 20.0).unwrap(), -2);
        assert_eq!(bucket_of(39.9, 20.0).unwrap(), 1);
    }

    #[test]
    fn test_bucket_overflow_is_rejected() {
        let err = bucket_of(1.0, f64::MIN_POSITIVE).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidArgument);
        assert!(bucket_of(-1e300, 1.0).is_err());
        assert!(bucket_of(9.3e18, 1.0).is_err());
        assert_eq!(bucket_of(-9.2e18, 1.0).unwrap(), -9_200_000_000_000_000_000);

        let family = HashFamily::from_euclidean(1, vec![vec![1.0]]).unwrap();
        assert!(encode(&Vector::dense(vec![1.0]), &family, Some(f64::MIN_POSITIVE)).is_err());
    }

    #[test]
    fn test_band_match_stops_at_first_mismatch() {
        // band 1 overflows for any input far from zero, so reaching it errors
        let family = HashFamily::from_euclidean(1, vec![vec![1.0], vec![1e300]]).unwrap();
        let encoder = SignatureEncoder::new(&family, Some(1.0)).unwrap();
        let query = BucketSignature(vec![0, 0]);
        assert_eq!(encode(&Vector::dense(vec![0.0]), &family, Some(1.0)).unwrap(), Signature::Buckets(query.clone()));

        let far = Vector::dense(vec![5.0]);
        assert!(encoder.encode(&far).is_err());
        assert!(!encoder.matches_buckets(&far, &query).unwrap());

        // band 0 agrees, so band 1 is evaluated and its overflow surfaces
        assert!(encoder.matches_buckets(&Vector::dense(vec![0.5]), &query).is_err());
        assert!(encoder.matches_buckets(&Vector::dense(vec![0.0]), &query).unwrap());
    }

    #[test]
    fn test_band_match_agrees_with_encode() {
        let mut rng = StdRng::seed_from_u64(5);
        let family = HashFamilyGenerator::new(3, 6, HashVariant::Euclidean)
            .generate(&mut rng)
            .unwrap();
        let encoder = SignatureEncoder::new(&family, Some(0.7)).unwrap();
        let query = match encoder.encode(&Vector::dense(vec![0.2, -0.1, 0.4])).unwrap() {
            Signature::Buckets(b) => b,
            Signature::Bits(_) => unreachable!(),
        };
        for i in 0..50 {
            let v = Vector::dense(vec![(i % 5) as f64 * 0.3 - 0.6, (i % 7) as f64 * 0.2 - 0.6, (i % 3) as f64 * 0.4]);
            let full = encoder.encode(&v).unwrap() == Signature::Buckets(query.clone());
            assert_eq!(encoder.matches_buckets(&v, &query).unwrap(), full);
        }
        assert_eq!(
            encoder.matches_buckets(&Vector::dense(vec![0.0; 3]), &BucketSignature(vec![0])).unwrap_err().code(),
            crate::error::ErrorCode::ConfigMismatch
        );
    }

    #[test]
    fn test_euclidean_buckets() {
        let family =
            HashFamily::from_euclidean(2, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]])
                .unwrap();
        let sig = encode(&Vector::dense(vec![5.0, -3.0]), &family, Some(2.0)).unwrap();
        assert_eq!(sig, Signature::Buckets(BucketSignature(vec![2, -2, -3])));
    }

    #[test]
    fn test_angular_bits() {
        let family = HashFamily::from_angular(
            3,
            vec![bitvec![u64, Lsb0; 1, 1, 1], bitvec![u64, Lsb0; 0, 0, 0], bitvec![u64, Lsb0; 1, 0, 0]],
        )
        .unwrap();
        let sig = encode(&Vector::dense(vec![1.0, 2.0, -3.0]), &family, None).unwrap();
        // sums: 0 -> set, 0 -> set, 1 - 2 + 3 = 2 -> set
        assert_eq!(sig.to_string(), "111");
        let sig = encode(&Vector::dense(vec![1.0, 2.0, 4.0]), &family, None).unwrap();
        assert_eq!(sig.to_string(), "100");
    }

    #[test]
    fn test_deterministic() {
        let mut rng = StdRng::seed_from_u64(11);
        let family = HashFamilyGenerator::new(8, 12, HashVariant::Euclidean)
            .generate(&mut rng)
            .unwrap();
        let v = parse_dense("1,2,3,4,5,6,7,8").unwrap();
        let a = encode(&v, &family, Some(0.5)).unwrap();
        let b = encode(&v, &family, Some(0.5)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn test_sparse_and_dense_agree() {
        let mut rng = StdRng::seed_from_u64(99);
        for variant in [HashVariant::Euclidean, HashVariant::Angular] {
            let family = HashFamilyGenerator::new(5, 16, variant).generate(&mut rng).unwrap();
            let sparse = parse_sparse("3:5.0\t1:2.0", 5).unwrap();
            let dense = parse_dense("2.0,0,5.0,0,0").unwrap();
            assert_eq!(
                encode(&sparse, &family, Some(0.25)).unwrap(),
                encode(&dense, &family, Some(0.25)).unwrap()
            );
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let family = HashFamily::from_euclidean(3, vec![vec![1.0, 0.0, 0.0]]).unwrap();
        let err = encode(&Vector::dense(vec![1.0, 2.0]), &family, Some(1.0)).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::DimensionMismatch);
    }

    #[test]
    fn test_missing_bucket_width() {
        let family = HashFamily::from_euclidean(1, vec![vec![1.0]]).unwrap();
        assert!(SignatureEncoder::new(&family, None).is_err());
        assert!(SignatureEncoder::new(&family, Some(-1.0)).is_err());
    }
}

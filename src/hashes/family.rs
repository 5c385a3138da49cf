//! Hash family generation.
//!
//! A [`HashFamily`] is K random hash vectors of dimension D. Euclidean
//! vectors are drawn uniformly in `[-0.5, 0.5)` per component, scaled to
//! unit length, then optionally multiplied by a constant. Angular vectors
//! are random hyperplane normals with ±1 components, stored one bit per
//! dimension.
//!
//! Generation is stateless: the caller supplies the random source, so a
//! seeded generator reproduces the same family.

use crate::config::LshConfig;
use crate::error::{LshError, Result};
use crate::types::HashVariant;
use crate::utils::random::draw_unit_vector;
use bitvec::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Bit-exact identity of a hash vector, used for duplicate rejection.
pub type HashKey = Vec<u64>;

/// Upper bound on rejected draws per requested hash vector before
/// `generate_unique` gives up.
pub const MAX_DRAWS_PER_HASH: usize = 64;

/// One hash function of the family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashVector {
    /// Projection direction for bucket hashing.
    Euclidean(Vec<f64>),
    /// Hyperplane normal; a set bit is +1, a clear bit is -1.
    Angular(BitVec<u64, Lsb0>),
}

impl HashVector {
    /// Dimensionality of this hash vector.
    pub fn dimension(&self) -> usize {
        match self {
            HashVector::Euclidean(v) => v.len(),
            HashVector::Angular(bits) => bits.len(),
        }
    }

    /// Variant of this hash vector.
    pub fn variant(&self) -> HashVariant {
        match self {
            HashVector::Euclidean(_) => HashVariant::Euclidean,
            HashVector::Angular(_) => HashVariant::Angular,
        }
    }

    /// Bit-exact key for duplicate detection.
    pub fn key(&self) -> HashKey {
        match self {
            HashVector::Euclidean(v) => v.iter().map(|x| x.to_bits()).collect(),
            HashVector::Angular(bits) => {
                let mut words = bits.as_raw_slice().to_vec();
                if let Some(last) = words.last_mut() {
                    *last &= crate::utils::bits::tail_mask(bits.len());
                }
                words
            }
        }
    }

    /// Euclidean norm (±1 components for Angular).
    pub fn norm(&self) -> f64 {
        match self {
            HashVector::Euclidean(v) => v.iter().map(|x| x * x).sum::<f64>().sqrt(),
            HashVector::Angular(bits) => (bits.len() as f64).sqrt(),
        }
    }
}

/// An ordered set of K hash vectors sharing one dimension and variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashFamily {
    variant: HashVariant,
    dimension: usize,
    vectors: Vec<HashVector>,
}

impl HashFamily {
    /// Assemble a family from explicit Euclidean projection vectors.
    pub fn from_euclidean(dimension: usize, vectors: Vec<Vec<f64>>) -> Result<Self> {
        let family = Self {
            variant: HashVariant::Euclidean,
            dimension,
            vectors: vectors.into_iter().map(HashVector::Euclidean).collect(),
        };
        family.validate()?;
        Ok(family)
    }

    /// Assemble a family from explicit hyperplane sign patterns.
    pub fn from_angular(dimension: usize, planes: Vec<BitVec<u64, Lsb0>>) -> Result<Self> {
        let family = Self {
            variant: HashVariant::Angular,
            dimension,
            vectors: planes.into_iter().map(HashVector::Angular).collect(),
        };
        family.validate()?;
        Ok(family)
    }

    /// Hash family variant.
    #[inline]
    pub fn variant(&self) -> HashVariant {
        self.variant
    }

    /// Dimensionality D every vector must have.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of hash vectors K.
    #[inline]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// The hash vectors, in order.
    #[inline]
    pub fn vectors(&self) -> &[HashVector] {
        &self.vectors
    }

    /// Check that every vector has the family's dimension and variant.
    ///
    /// A family that fails this check cannot have been written by this
    /// crate, so the failure is a `ConfigMismatch`.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(LshError::config_mismatch("hash family has dimension 0"));
        }
        for (i, v) in self.vectors.iter().enumerate() {
            if v.variant() != self.variant {
                return Err(LshError::config_mismatch(format!(
                    "hash vector {i} is {} in a {} family",
                    v.variant(),
                    self.variant
                )));
            }
            if v.dimension() != self.dimension {
                return Err(LshError::config_mismatch(format!(
                    "hash vector {i} has dimension {}, family has {}",
                    v.dimension(),
                    self.dimension
                )));
            }
        }
        Ok(())
    }
}

/// Draws hash families from a caller-supplied random source.
#[derive(Debug, Clone)]
pub struct HashFamilyGenerator {
    dimension: usize,
    count: usize,
    variant: HashVariant,
    multiplier: Option<f64>,
}

impl HashFamilyGenerator {
    /// Create a generator for `count` hash vectors of `dimension` components.
    pub fn new(dimension: usize, count: usize, variant: HashVariant) -> Self {
        Self {
            dimension,
            count,
            variant,
            multiplier: None,
        }
    }

    /// Create a generator matching a job configuration.
    pub fn from_config(config: &LshConfig) -> Self {
        Self {
            dimension: config.dimensionality,
            count: config.signature_length,
            variant: config.variant,
            multiplier: config.multiplier,
        }
    }

    /// Scale every Euclidean component by `multiplier` after normalization.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Draw a family. Duplicates are not checked.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<HashFamily> {
        self.check()?;
        let vectors = (0..self.count).map(|_| self.draw(rng)).collect();
        Ok(HashFamily {
            variant: self.variant,
            dimension: self.dimension,
            vectors,
        })
    }

    /// Draw a family, rejecting any vector already present in `used` and
    /// recording every accepted vector there.
    ///
    /// Sharing `used` across calls keeps successive families disjoint.
    pub fn generate_unique<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        used: &mut HashSet<HashKey>,
    ) -> Result<HashFamily> {
        self.check()?;
        let budget = self.count.saturating_mul(MAX_DRAWS_PER_HASH).max(MAX_DRAWS_PER_HASH);
        let mut vectors = Vec::with_capacity(self.count);
        let mut draws = 0usize;
        while vectors.len() < self.count {
            if draws == budget {
                return Err(LshError::invalid_argument(format!(
                    "could not draw {} distinct {} hash vectors of dimension {} in {budget} attempts",
                    self.count, self.variant, self.dimension
                )));
            }
            draws += 1;
            let candidate = self.draw(rng);
            if used.insert(candidate.key()) {
                vectors.push(candidate);
            }
        }
        tracing::debug!(
            variant = %self.variant,
            count = self.count,
            rejected = draws - self.count,
            "generated unique hash family"
        );
        Ok(HashFamily {
            variant: self.variant,
            dimension: self.dimension,
            vectors,
        })
    }

    fn check(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(LshError::invalid_argument("hash dimension must be positive"));
        }
        if let Some(m) = self.multiplier {
            if !m.is_finite() || m == 0.0 {
                return Err(LshError::invalid_argument(format!(
                    "multiplier must be finite and non-zero, got {m}"
                )));
            }
        }
        Ok(())
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> HashVector {
        match self.variant {
            HashVariant::Euclidean => {
                let mut v = draw_unit_vector(rng, self.dimension);
                if let Some(m) = self.multiplier {
                    v.iter_mut().for_each(|x| *x *= m);
                }
                HashVector::Euclidean(v)
            }
            HashVariant::Angular => {
                HashVector::Angular((0..self.dimension).map(|_| rng.gen::<bool>()).collect())
            }
        }
    }
}

//! Vector representation.
//!
//! A [`Vector`] is either dense (every dimension stored) or sparse (only
//! populated positions stored). Hashing only ever needs a dot product
//! against a dense hash vector or a sign plane, so both representations
//! expose those directly and sparse vectors never densify on the hot path.

use crate::error::{LshError, Result};
use crate::types::DimensionIndex;
use bitvec::prelude::*;

/// An owned input vector.
#[derive(Debug, Clone, PartialEq)]
pub enum Vector {
    /// All `D` components, positional index = array index.
    Dense(Vec<f64>),

    /// Populated positions only, sorted by position, 0-based.
    Sparse {
        /// Total dimensionality D.
        dimension: usize,
        /// `(position, value)` pairs.
        entries: Vec<(DimensionIndex, f64)>,
    },
}

impl Vector {
    /// Create a dense vector.
    pub fn dense(values: Vec<f64>) -> Self {
        Vector::Dense(values)
    }

    /// Create a sparse vector from 0-based entries.
    ///
    /// Entries are sorted by position; a repeated or out-of-range position
    /// is rejected.
    pub fn sparse(dimension: usize, mut entries: Vec<(DimensionIndex, f64)>) -> Result<Self> {
        entries.sort_by_key(|&(pos, _)| pos);
        for pair in entries.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(LshError::parse(format!(
                    "position {} appears more than once",
                    pair[0].0 + 1
                )));
            }
        }
        if let Some(&(pos, _)) = entries.last() {
            if pos >= dimension {
                return Err(LshError::parse(format!(
                    "position {} outside dimension {dimension}",
                    pos + 1
                )));
            }
        }
        Ok(Vector::Sparse { dimension, entries })
    }

    /// Total dimensionality.
    #[inline]
    pub fn dimension(&self) -> usize {
        match self {
            Vector::Dense(values) => values.len(),
            Vector::Sparse { dimension, .. } => *dimension,
        }
    }

    /// Number of stored components.
    #[inline]
    pub fn nnz(&self) -> usize {
        match self {
            Vector::Dense(values) => values.len(),
            Vector::Sparse { entries, .. } => entries.len(),
        }
    }

    /// Check if this vector is sparse.
    #[inline]
    pub fn is_sparse(&self) -> bool {
        matches!(self, Vector::Sparse { .. })
    }

    /// Get a component by 0-based position; absent sparse positions are zero.
    pub fn get(&self, pos: DimensionIndex) -> f64 {
        match self {
            Vector::Dense(values) => values.get(pos).copied().unwrap_or(0.0),
            Vector::Sparse { entries, .. } => entries
                .binary_search_by_key(&pos, |&(p, _)| p)
                .map(|idx| entries[idx].1)
                .unwrap_or(0.0),
        }
    }

    /// Fail with `DimensionMismatch` unless this vector has `expected` dimensions.
    pub fn check_dimension(&self, expected: usize) -> Result<()> {
        if self.dimension() != expected {
            return Err(LshError::dimension_mismatch(expected, self.dimension()));
        }
        Ok(())
    }

    /// Dot product with a dense vector of the same dimensionality.
    ///
    /// Sparse vectors only visit their populated positions.
    #[inline]
    pub fn dot(&self, other: &[f64]) -> f64 {
        match self {
            Vector::Dense(values) => values.iter().zip(other).map(|(a, b)| a * b).sum(),
            Vector::Sparse { entries, .. } => {
                entries.iter().map(|&(pos, val)| val * other[pos]).sum()
            }
        }
    }

    /// Dot product with a ±1 plane: set bits add the component, clear bits
    /// subtract it.
    #[inline]
    pub fn signed_sum(&self, plane: &BitSlice<u64, Lsb0>) -> f64 {
        match self {
            Vector::Dense(values) => values
                .iter()
                .zip(plane.iter().by_vals())
                .map(|(&v, positive)| if positive { v } else { -v })
                .sum(),
            Vector::Sparse { entries, .. } => entries
                .iter()
                .map(|&(pos, v)| if plane[pos] { v } else { -v })
                .sum(),
        }
    }

    /// Squared Euclidean norm.
    pub fn squared_l2_norm(&self) -> f64 {
        match self {
            Vector::Dense(values) => values.iter().map(|v| v * v).sum(),
            Vector::Sparse { entries, .. } => entries.iter().map(|(_, v)| v * v).sum(),
        }
    }

    /// Compute the L2 norm.
    pub fn l2_norm(&self) -> f64 {
        self.squared_l2_norm().sqrt()
    }

    /// Squared Euclidean distance to another vector of the same dimension.
    pub fn squared_l2(&self, other: &Vector) -> Result<f64> {
        other.check_dimension(self.dimension())?;
        let dist = match (self, other) {
            (Vector::Dense(a), Vector::Dense(b)) => {
                a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
            }
            (Vector::Sparse { entries: a, .. }, Vector::Sparse { entries: b, .. }) => {
                sparse_squared_l2(a, b)
            }
            (Vector::Dense(d), sparse) | (sparse, Vector::Dense(d)) => {
                // ||d - s||^2 = ||d||^2 - 2 d.s + ||s||^2
                let dense_norm: f64 = d.iter().map(|v| v * v).sum();
                dense_norm - 2.0 * sparse.dot(d) + sparse.squared_l2_norm()
            }
        };
        Ok(dist.max(0.0))
    }

    /// Convert to a dense component list.
    pub fn to_dense(&self) -> Vec<f64> {
        match self {
            Vector::Dense(values) => values.clone(),
            Vector::Sparse { dimension, entries } => {
                let mut values = vec![0.0; *dimension];
                for &(pos, val) in entries {
                    values[pos] = val;
                }
                values
            }
        }
    }
}

/// Merge-join over two position-sorted entry lists.
fn sparse_squared_l2(a: &[(DimensionIndex, f64)], b: &[(DimensionIndex, f64)]) -> f64 {
    let (mut i, mut j) = (0, 0);
    let mut sum = 0.0;
    while i < a.len() && j < b.len() {
        let (pa, va) = a[i];
        let (pb, vb) = b[j];
        if pa == pb {
            sum += (va - vb) * (va - vb);
            i += 1;
            j += 1;
        } else if pa < pb {
            sum += va * va;
            i += 1;
        } else {
            sum += vb * vb;
            j += 1;
        }
    }
    sum += a[i..].iter().map(|(_, v)| v * v).sum::<f64>();
    sum += b[j..].iter().map(|(_, v)| v * v).sum::<f64>();
    sum
}

impl From<Vec<f64>> for Vector {
    fn from(values: Vec<f64>) -> Self {
        Vector::Dense(values)
    }
}

//! Core type definitions shared across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position of a record in its input partition.
/// Used as the tie-break when two candidates share a distance.
pub type RecordOrdinal = usize;

/// Index of a dimension within a vector (0-based internally).
pub type DimensionIndex = usize;

/// Quantized projection bucket produced by the Euclidean hash.
pub type BucketIndex = i64;

/// Which hash family a job uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashVariant {
    /// Random projection with quantization into buckets.
    Euclidean,
    /// Random hyperplane sign sketches (SimHash).
    Angular,
}

impl HashVariant {
    /// Whether this variant needs a bucket width.
    #[inline]
    pub fn uses_buckets(self) -> bool {
        matches!(self, HashVariant::Euclidean)
    }
}

impl fmt::Display for HashVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashVariant::Euclidean => write!(f, "euclidean"),
            HashVariant::Angular => write!(f, "angular"),
        }
    }
}

impl FromStr for HashVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "euclidean" | "bucket" | "e2lsh" => Ok(Self::Euclidean),
            "angular" | "cosine" | "simhash" => Ok(Self::Angular),
            _ => Err(format!("unsupported hash variant: {s}")),
        }
    }
}

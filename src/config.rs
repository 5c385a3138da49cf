//! Configuration types for an LSH search job.
//!
//! One [`LshConfig`] carries every knob of the pipeline: signature length,
//! bucket width, dimensionality, multiplier, similarity threshold, and the
//! number of neighbors, plus the error-handling policies.

use crate::error::{LshError, Result};
use crate::types::HashVariant;
use serde::{Deserialize, Serialize};

/// What to do with a record that fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Abort the batch on the first malformed record.
    #[default]
    FailFast,
    /// Drop the record, count it, and keep going.
    Skip,
}

/// What to do when fewer than k candidates reach the reranker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortfallPolicy {
    /// Report `InsufficientCandidates`.
    #[default]
    Fail,
    /// Return every surviving candidate, fewer than k.
    ReturnAvailable,
}

/// Main configuration for an LSH search job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LshConfig {
    /// Number of hash functions (bands for Euclidean, bits for Angular).
    pub signature_length: usize,

    /// Quantization width of a Euclidean bucket.
    pub bucket_width: f64,

    /// Vector dimensionality D.
    pub dimensionality: usize,

    /// Optional scale applied to every Euclidean hash component.
    pub multiplier: Option<f64>,

    /// Minimum estimated cosine similarity for the Angular filter.
    pub similarity_threshold: f64,

    /// Number of neighbors to return.
    pub num_neighbors: usize,

    /// Hash family variant.
    pub variant: HashVariant,

    /// Malformed record handling.
    pub error_policy: ErrorPolicy,

    /// Behavior when fewer than `num_neighbors` candidates survive.
    pub shortfall_policy: ShortfallPolicy,

    /// Seed for hash family generation (`None` draws from entropy).
    pub seed: Option<u64>,

    /// Partitions smaller than this are filtered sequentially.
    pub parallel_threshold: usize,

    /// Drop repeated payloads in the passthrough aggregation.
    pub deduplicate: bool,
}

impl Default for LshConfig {
    fn default() -> Self {
        Self {
            signature_length: 20,
            bucket_width: 20.0,
            dimensionality: 0,
            multiplier: None,
            similarity_threshold: 0.5,
            num_neighbors: 20,
            variant: HashVariant::Euclidean,
            error_policy: ErrorPolicy::FailFast,
            shortfall_policy: ShortfallPolicy::Fail,
            seed: None,
            parallel_threshold: crate::utils::MIN_PARALLEL_SIZE,
            deduplicate: false,
        }
    }
}

impl LshConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Euclidean bucket hashing over `dimensionality` dimensions.
    pub fn euclidean(dimensionality: usize) -> Self {
        Self {
            dimensionality,
            variant: HashVariant::Euclidean,
            ..Default::default()
        }
    }

    /// Angular sign hashing over `dimensionality` dimensions.
    pub fn angular(dimensionality: usize) -> Self {
        Self {
            dimensionality,
            variant: HashVariant::Angular,
            signature_length: 15,
            ..Default::default()
        }
    }

    /// Set the signature length K.
    pub fn with_signature_length(mut self, k: usize) -> Self {
        self.signature_length = k;
        self
    }

    /// Set the bucket width.
    pub fn with_bucket_width(mut self, width: f64) -> Self {
        self.bucket_width = width;
        self
    }

    /// Set the dimensionality.
    pub fn with_dimensionality(mut self, dim: usize) -> Self {
        self.dimensionality = dim;
        self
    }

    /// Set the multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Set the similarity threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Set the number of neighbors to return.
    pub fn with_num_neighbors(mut self, k: usize) -> Self {
        self.num_neighbors = k;
        self
    }

    /// Set the hash variant.
    pub fn with_variant(mut self, variant: HashVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Set the malformed record policy.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Set the candidate shortfall policy.
    pub fn with_shortfall_policy(mut self, policy: ShortfallPolicy) -> Self {
        self.shortfall_policy = policy;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the sequential/parallel cutover.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Enable payload deduplication.
    pub fn with_deduplicate(mut self) -> Self {
        self.deduplicate = true;
        self
    }

    /// Bucket width if the variant uses one.
    pub fn effective_bucket_width(&self) -> Option<f64> {
        self.variant.uses_buckets().then_some(self.bucket_width)
    }

    /// Check that every value is in its domain.
    pub fn validate(&self) -> Result<()> {
        if self.dimensionality == 0 {
            return Err(LshError::invalid_argument("dimensionality must be positive"));
        }
        if self.variant.uses_buckets()
            && !(self.bucket_width.is_finite() && self.bucket_width > 0.0)
        {
            return Err(LshError::invalid_argument(format!(
                "bucket width must be positive and finite, got {}",
                self.bucket_width
            )));
        }
        if let Some(m) = self.multiplier {
            if !m.is_finite() || m == 0.0 {
                return Err(LshError::invalid_argument(format!(
                    "multiplier must be finite and non-zero, got {m}"
                )));
            }
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(LshError::invalid_argument(format!(
                "similarity threshold must lie in [-1, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.num_neighbors == 0 {
            return Err(LshError::invalid_argument("num_neighbors must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_default_config() {
        let config = LshConfig::default();
        assert_eq!(config.signature_length, 20);
        assert_eq!(config.bucket_width, 20.0);
        assert_eq!(config.variant, HashVariant::Euclidean);
        assert_eq!(config.error_policy, ErrorPolicy::FailFast);
        // dimensionality is unknown until a query is seen
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = LshConfig::angular(4000)
            .with_signature_length(32)
            .with_threshold(0.0)
            .with_num_neighbors(2)
            .with_seed(7);
        assert_eq!(config.variant, HashVariant::Angular);
        assert_eq!(config.signature_length, 32);
        assert_eq!(config.effective_bucket_width(), None);
        assert_eq!(config.seed, Some(7));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_domain() {
        let bad_threshold = LshConfig::angular(4).with_threshold(1.5);
        assert_eq!(bad_threshold.validate().unwrap_err().code(), ErrorCode::InvalidArgument);

        let bad_width = LshConfig::euclidean(4).with_bucket_width(0.0);
        assert!(bad_width.validate().is_err());

        // Angular ignores the bucket width entirely
        let angular = LshConfig::angular(4).with_bucket_width(0.0);
        assert!(angular.validate().is_ok());

        let bad_multiplier = LshConfig::euclidean(4).with_multiplier(f64::NAN);
        assert!(bad_multiplier.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = LshConfig::euclidean(128)
            .with_bucket_width(4.0)
            .with_multiplier(2.5)
            .with_error_policy(ErrorPolicy::Skip);

        let json = serde_json::to_string(&config).unwrap();
        let deserialized: LshConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.dimensionality, 128);
        assert_eq!(deserialized.bucket_width, 4.0);
        assert_eq!(deserialized.multiplier, Some(2.5));
        assert_eq!(deserialized.error_policy, ErrorPolicy::Skip);
        assert!(json.contains("\"skip\""));
    }
}

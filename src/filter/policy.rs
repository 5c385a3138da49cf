//! Candidate admission policies.

use crate::config::LshConfig;
use crate::error::{LshError, Result};
use crate::hashes::Signature;
use crate::types::HashVariant;
use serde::{Deserialize, Serialize};

/// How a record's signature is compared with the query's.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum FilterPolicy {
    /// AND over all bands: every bucket index must equal the query's.
    ExactBandMatch,
    /// Admit when the estimated cosine similarity of the bit sketches is
    /// at least `threshold`.
    HammingThreshold { threshold: f64 },
}

/// Outcome of comparing one signature with the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Not a candidate.
    Reject,
    /// A candidate, with its similarity when the policy computes one.
    Admit { score: Option<f64> },
}

impl Verdict {
    /// Whether the record was admitted.
    #[inline]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Verdict::Admit { .. })
    }
}

impl FilterPolicy {
    /// The natural policy for a config's variant: band matching for
    /// Euclidean, thresholded similarity for Angular.
    pub fn for_config(config: &LshConfig) -> Self {
        match config.variant {
            HashVariant::Euclidean => FilterPolicy::ExactBandMatch,
            HashVariant::Angular => FilterPolicy::HammingThreshold {
                threshold: config.similarity_threshold,
            },
        }
    }

    /// Check the policy can be applied to signatures of `variant`.
    pub fn validate_for(&self, variant: HashVariant) -> Result<()> {
        match *self {
            FilterPolicy::ExactBandMatch => Ok(()),
            FilterPolicy::HammingThreshold { threshold } => {
                if variant != HashVariant::Angular {
                    return Err(LshError::invalid_argument(format!(
                        "Hamming threshold filtering needs angular sketches, got {variant}"
                    )));
                }
                if !(-1.0..=1.0).contains(&threshold) {
                    return Err(LshError::invalid_argument(format!(
                        "similarity threshold {threshold} outside [-1, 1]"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Compare `signature` against the query's.
    pub fn admit(&self, signature: &Signature, query: &Signature) -> Result<Verdict> {
        signature.check_comparable(query)?;
        match (*self, signature, query) {
            (FilterPolicy::ExactBandMatch, Signature::Buckets(s), Signature::Buckets(q)) => {
                Ok(if s.matches_all_bands(q) {
                    Verdict::Admit { score: None }
                } else {
                    Verdict::Reject
                })
            }
            // identical sketches have estimated similarity 1
            (FilterPolicy::ExactBandMatch, s, q) => {
                Ok(if s == q { Verdict::Admit { score: Some(1.0) } } else { Verdict::Reject })
            }
            (FilterPolicy::HammingThreshold { threshold }, Signature::Bits(s), Signature::Bits(q)) => {
                let similarity = s.similarity(q);
                Ok(if similarity >= threshold {
                    Verdict::Admit { score: Some(similarity) }
                } else {
                    Verdict::Reject
                })
            }
            (FilterPolicy::HammingThreshold { .. }, s, _) => Err(LshError::invalid_argument(
                format!("Hamming threshold filtering needs angular sketches, got {}", s.variant()),
            )),
        }
    }
}

//! Exact reranking of filter survivors.

use super::result::RankedResult;
use super::top_k::TopK;
use crate::config::{LshConfig, ShortfallPolicy};
use crate::data_format::Vector;
use crate::error::{LshError, Result};
use crate::filter::CandidateRecord;
use crate::hashes::{estimated_similarity, Signature};
use crate::utils::parallel::{chunked_reduce, maybe_parallel_map_threshold};
use crate::utils::MIN_PARALLEL_SIZE;

/// Computes exact distances and keeps the k closest candidates.
///
/// Distances are computed in parallel for large candidate sets; each
/// rayon chunk keeps its own [`TopK`] and the partial heaps are merged.
#[derive(Debug, Clone, Copy)]
pub struct ExactReranker {
    shortfall_policy: ShortfallPolicy,
    parallel_threshold: usize,
}

impl Default for ExactReranker {
    fn default() -> Self {
        Self {
            shortfall_policy: ShortfallPolicy::Fail,
            parallel_threshold: MIN_PARALLEL_SIZE,
        }
    }
}

impl ExactReranker {
    /// Create a reranker that fails on shortfall.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take policies from a job config.
    pub fn from_config(config: &LshConfig) -> Self {
        Self {
            shortfall_policy: config.shortfall_policy,
            parallel_threshold: config.parallel_threshold,
        }
    }

    /// Set the shortfall policy.
    pub fn with_shortfall_policy(mut self, policy: ShortfallPolicy) -> Self {
        self.shortfall_policy = policy;
        self
    }

    /// Set the parallel threshold.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// The shortfall policy.
    pub fn shortfall_policy(&self) -> ShortfallPolicy {
        self.shortfall_policy
    }

    /// Parallel threshold.
    pub fn parallel_threshold(&self) -> usize {
        self.parallel_threshold
    }

    /// Rank by signature Hamming distance to the query.
    ///
    /// Angular results also carry the similarity their distance estimates.
    pub fn rerank(
        &self,
        candidates: &[CandidateRecord],
        query_signature: &Signature,
        k: usize,
    ) -> Result<Vec<RankedResult>> {
        let results = self.rerank_by(candidates, k, |c| {
            c.signature
                .hamming(query_signature)
                .map(|h| h as f64)
                .map_err(|e| e.at_record(c.ordinal))
        })?;
        Ok(match query_signature {
            Signature::Bits(_) => with_similarities(results, query_signature.len()),
            Signature::Buckets(_) => results,
        })
    }

    /// Rank by Euclidean distance between the payload vectors and `query`.
    pub fn rerank_vectors(
        &self,
        candidates: &[CandidateRecord],
        query: &Vector,
        k: usize,
    ) -> Result<Vec<RankedResult>> {
        let dimension = query.dimension();
        self.rerank_by(candidates, k, |c| {
            c.vector(Some(dimension))
                .and_then(|v| v.squared_l2(query))
                .map(f64::sqrt)
                .map_err(|e| e.at_record(c.ordinal))
        })
    }

    /// Rank with a caller-supplied exact distance.
    pub fn rerank_by<F>(&self, candidates: &[CandidateRecord], k: usize, distance: F) -> Result<Vec<RankedResult>>
    where
        F: Fn(&CandidateRecord) -> Result<f64> + Sync + Send,
    {
        self.check_shortfall(k, candidates.len())?;

        let distances = maybe_parallel_map_threshold(candidates, self.parallel_threshold, &distance);
        let mut keyed = Vec::with_capacity(candidates.len());
        for (slot, (candidate, d)) in candidates.iter().zip(distances).enumerate() {
            let d = d?;
            if d.is_nan() {
                return Err(LshError::internal(format!(
                    "record {}: distance is NaN",
                    candidate.ordinal
                )));
            }
            keyed.push((d, candidate.ordinal, slot));
        }

        let top = chunked_reduce(
            &keyed,
            self.parallel_threshold,
            || TopK::new(k),
            |top, &(d, ordinal, slot)| {
                top.push(d, ordinal, slot);
            },
            TopK::merge,
        );

        let results: Vec<_> = top
            .into_sorted()
            .into_iter()
            .map(|(d, ordinal, slot)| RankedResult::new(d, ordinal, candidates[slot].payload.clone()))
            .collect();
        tracing::info!(candidates = candidates.len(), returned = results.len(), "rerank complete");
        Ok(results)
    }

    /// Apply the shortfall policy for `available` candidates.
    pub fn check_shortfall(&self, k: usize, available: usize) -> Result<()> {
        if available >= k {
            return Ok(());
        }
        match self.shortfall_policy {
            ShortfallPolicy::Fail => Err(LshError::insufficient_candidates(k, available)),
            ShortfallPolicy::ReturnAvailable => {
                tracing::warn!(requested = k, available, "fewer candidates than neighbours requested");
                Ok(())
            }
        }
    }
}

/// Attach the similarity estimated by each result's Hamming distance over
/// `k` sign bits.
fn with_similarities(results: Vec<RankedResult>, k: usize) -> Vec<RankedResult> {
    results
        .into_iter()
        .map(|r| {
            let similarity = estimated_similarity(r.distance as usize, k);
            r.with_similarity(similarity)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::hashes::{BitSketch, BucketSignature};

    fn sketch(s: &str) -> Signature {
        Signature::Bits(BitSketch::from_bools(
            &s.chars().map(|c| c == '1').collect::<Vec<_>>(),
        ))
    }

    fn candidates() -> Vec<CandidateRecord> {
        vec![
            CandidateRecord::new(0, sketch("0000"), "far\t0"),
            CandidateRecord::new(1, sketch("1110"), "one_off\t1"),
            CandidateRecord::new(2, sketch("1111"), "exact\t2"),
            CandidateRecord::new(3, sketch("0111"), "one_off_late\t3"),
        ]
    }

    #[test]
    fn test_rerank_orders_by_distance_then_ordinal() {
        let out = ExactReranker::new().rerank(&candidates(), &sketch("1111"), 3).unwrap();
        assert_eq!(
            out.iter().map(|r| r.payload.as_str()).collect::<Vec<_>>(),
            vec!["exact\t2", "one_off\t1", "one_off_late\t3"]
        );
        assert_eq!(out[0].to_line(), "0\texact\t2");
        assert_eq!(out[1].distance, 1.0);
    }

    #[test]
    fn test_angular_results_carry_similarity() {
        let out = ExactReranker::new().rerank(&candidates(), &sketch("1111"), 4).unwrap();
        assert_eq!(out[0].similarity, Some(1.0));
        assert_eq!(out[0].to_scored_line(), "0\t1\texact\t2");
        assert!((out[1].similarity.unwrap() - (std::f64::consts::PI / 4.0).cos()).abs() < 1e-12);
        assert_eq!(out[3].similarity, Some(estimated_similarity(4, 4)));

        let buckets = vec![CandidateRecord::new(0, Signature::Buckets(BucketSignature(vec![1])), "a")];
        let out = ExactReranker::new()
            .rerank(&buckets, &Signature::Buckets(BucketSignature(vec![1])), 1)
            .unwrap();
        assert_eq!(out[0].similarity, None);
    }

    #[test]
    fn test_rerank_is_idempotent() {
        let r = ExactReranker::new();
        let a = r.rerank(&candidates(), &sketch("1010"), 4).unwrap();
        let b = r.rerank(&candidates(), &sketch("1010"), 4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shortfall_fails_by_default() {
        let err = ExactReranker::new().rerank(&candidates(), &sketch("1111"), 5).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientCandidates);
    }

    #[test]
    fn test_shortfall_return_available() {
        let out = ExactReranker::new()
            .with_shortfall_policy(ShortfallPolicy::ReturnAvailable)
            .rerank(&candidates(), &sketch("1111"), 10)
            .unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out.last().unwrap().payload, "far\t0");
    }

    #[test]
    fn test_zero_k() {
        assert!(ExactReranker::new().rerank(&candidates(), &sketch("1111"), 0).unwrap().is_empty());
    }

    #[test]
    fn test_incomparable_signature() {
        let query = Signature::Buckets(BucketSignature(vec![1, 1, 1, 1]));
        let err = ExactReranker::new().rerank(&candidates(), &query, 1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigMismatch);
    }

    #[test]
    fn test_rerank_vectors() {
        let sig = Signature::Buckets(BucketSignature(vec![]));
        let cands = vec![
            CandidateRecord::new(0, sig.clone(), "a\t3,4"),
            CandidateRecord::new(1, sig.clone(), "b\t1,0"),
            CandidateRecord::new(2, sig, "c\t2:1.0"),
        ];
        let out = ExactReranker::new()
            .rerank_vectors(&cands, &Vector::dense(vec![0.0, 0.0]), 3)
            .unwrap();
        assert_eq!(
            out.iter().map(|r| (r.ordinal, r.distance)).collect::<Vec<_>>(),
            vec![(1, 1.0), (2, 1.0), (0, 5.0)]
        );
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let cands: Vec<_> = (0..6000)
            .map(|i| {
                let s: String = (0..8).map(|b| if ((i * 31) >> b) & 1 == 1 { '1' } else { '0' }).collect();
                CandidateRecord::new(i, sketch(&s), format!("r{i}"))
            })
            .collect();
        let q = sketch("10110010");
        let seq = ExactReranker::new().with_parallel_threshold(usize::MAX).rerank(&cands, &q, 50).unwrap();
        let par = ExactReranker::new().with_parallel_threshold(0).rerank(&cands, &q, 50).unwrap();
        assert_eq!(seq, par);
        assert_eq!(seq.len(), 50);
    }
}

//! The data-parallel filter stage.
//!
//! Each record is handled independently against a shared, read-only
//! [`IndexArtifact`]: parse the vector, encode it, compare the signature
//! with the query's. A partition is evaluated with rayon once it is large
//! enough, and results are folded back in input order so the first error
//! reported under fail-fast is always the earliest malformed record.

use super::candidate::{CandidateRecord, FilterReport};
use super::policy::{FilterPolicy, Verdict};
use crate::artifact::IndexArtifact;
use crate::config::{ErrorPolicy, LshConfig};
use crate::data_format::Record;
use crate::error::{LshError, Result};
use crate::hashes::Signature;
use crate::utils::parallel::maybe_parallel_map_indexed;
use crate::utils::MIN_PARALLEL_SIZE;
use std::sync::Arc;

/// Per-run knobs of the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterOptions {
    /// Malformed record handling.
    pub error_policy: ErrorPolicy,
    /// Partition size at which evaluation goes parallel.
    pub parallel_threshold: usize,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::FailFast,
            parallel_threshold: MIN_PARALLEL_SIZE,
        }
    }
}

impl FilterOptions {
    /// Take the options from a job config.
    pub fn from_config(config: &LshConfig) -> Self {
        Self {
            error_policy: config.error_policy,
            parallel_threshold: config.parallel_threshold,
        }
    }

    /// Set the error policy.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Set the parallel threshold.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }
}

/// Decides, record by record, which records are candidates for the query.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    artifact: Arc<IndexArtifact>,
    policy: FilterPolicy,
    options: FilterOptions,
}

impl CandidateFilter {
    /// Create a filter over a shared artifact.
    pub fn new(artifact: Arc<IndexArtifact>, policy: FilterPolicy, options: FilterOptions) -> Result<Self> {
        policy.validate_for(artifact.variant())?;
        Ok(Self {
            artifact,
            policy,
            options,
        })
    }

    /// The shared artifact.
    pub fn artifact(&self) -> &Arc<IndexArtifact> {
        &self.artifact
    }

    /// The admission policy.
    pub fn policy(&self) -> FilterPolicy {
        self.policy
    }

    /// Run options.
    pub fn options(&self) -> FilterOptions {
        self.options
    }

    /// Decide a single record.
    ///
    /// Errors carry the record ordinal.
    pub fn evaluate(&self, record: &Record<'_>) -> Result<Option<CandidateRecord>> {
        self.evaluate_inner(record).map_err(|e| e.at_record(record.ordinal()))
    }

    fn evaluate_inner(&self, record: &Record<'_>) -> Result<Option<CandidateRecord>> {
        if let (FilterPolicy::ExactBandMatch, Signature::Buckets(query)) =
            (self.policy, self.artifact.query_signature())
        {
            let vector = record.vector(Some(self.artifact.dimension()))?;
            if !self.artifact.encoder()?.matches_buckets(&vector, query)? {
                return Ok(None);
            }
            // every band agreed, so the record's signature is the query's
            return Ok(Some(CandidateRecord::new(
                record.ordinal(),
                Signature::Buckets(query.clone()),
                record.line(),
            )));
        }
        let signature = self.signature_of(record)?;
        match self.policy.admit(&signature, self.artifact.query_signature())? {
            Verdict::Reject => Ok(None),
            Verdict::Admit { score } => Ok(Some(CandidateRecord {
                ordinal: record.ordinal(),
                signature,
                score,
                payload: record.line().to_string(),
            })),
        }
    }

    /// Encode a record without comparing it to the query.
    pub fn key(&self, record: &Record<'_>) -> Result<CandidateRecord> {
        self.signature_of(record)
            .map(|signature| CandidateRecord::new(record.ordinal(), signature, record.line()))
            .map_err(|e| e.at_record(record.ordinal()))
    }

    fn signature_of(&self, record: &Record<'_>) -> Result<Signature> {
        let vector = record.vector(Some(self.artifact.dimension()))?;
        self.artifact.encode(&vector)
    }

    /// Filter a whole partition of input lines.
    ///
    /// Blank lines are ignored. Line `i` has ordinal `i`.
    pub fn run<S: AsRef<str> + Sync>(&self, lines: &[S]) -> Result<FilterReport> {
        tracing::debug!(records = lines.len(), policy = ?self.policy, "filter pass started");
        let report = self.collect(lines, |record| self.evaluate(record))?;
        tracing::info!(
            scanned = report.scanned,
            candidates = report.len(),
            skipped = report.skipped,
            "filter pass complete"
        );
        Ok(report)
    }

    /// Re-key every record of a partition by its signature.
    ///
    /// This is the input of signature-keyed aggregation: nothing is
    /// compared with the query here.
    pub fn key_all<S: AsRef<str> + Sync>(&self, lines: &[S]) -> Result<FilterReport> {
        tracing::debug!(records = lines.len(), "keying pass started");
        let report = self.collect(lines, |record| self.key(record).map(Some))?;
        tracing::info!(
            scanned = report.scanned,
            keyed = report.len(),
            skipped = report.skipped,
            "keying pass complete"
        );
        Ok(report)
    }

    fn collect<S, F>(&self, lines: &[S], per_record: F) -> Result<FilterReport>
    where
        S: AsRef<str> + Sync,
        F: Fn(&Record<'_>) -> Result<Option<CandidateRecord>> + Sync + Send,
    {
        let outcomes = maybe_parallel_map_indexed(lines, self.options.parallel_threshold, |i, line| {
            let line = line.as_ref();
            if line.trim().is_empty() {
                return None;
            }
            Some(
                Record::parse(line, i)
                    .map_err(|e| e.at_record(i))
                    .and_then(|record| per_record(&record)),
            )
        });

        let mut report = FilterReport::default();
        for outcome in outcomes.into_iter().flatten() {
            report.scanned += 1;
            match outcome {
                Ok(Some(candidate)) => report.candidates.push(candidate),
                Ok(None) => {}
                Err(e) => self.handle_error(e, &mut report)?,
            }
        }
        Ok(report)
    }

    fn handle_error(&self, err: LshError, report: &mut FilterReport) -> Result<()> {
        if err.is_fatal() || self.options.error_policy == ErrorPolicy::FailFast {
            return Err(err);
        }
        tracing::warn!(error = %err, "skipping malformed record");
        report.skipped += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_format::Vector;
    use crate::error::ErrorCode;
    use crate::hashes::HashFamily;
    use bitvec::prelude::*;

    fn planes() -> Vec<BitVec<u64, Lsb0>> {
        // Each plane has an odd number of set bits, so +/-[1,1,1,1] never
        // sums to zero and opposite vectors differ on every bit.
        vec![
            bitvec![u64, Lsb0; 1, 0, 0, 0],
            bitvec![u64, Lsb0; 0, 1, 0, 0],
            bitvec![u64, Lsb0; 0, 0, 1, 0],
            bitvec![u64, Lsb0; 0, 0, 0, 1],
            bitvec![u64, Lsb0; 1, 1, 1, 0],
            bitvec![u64, Lsb0; 1, 1, 0, 1],
            bitvec![u64, Lsb0; 1, 0, 1, 1],
            bitvec![u64, Lsb0; 0, 1, 1, 1],
        ]
    }

    fn angular_filter(threshold: f64, options: FilterOptions) -> CandidateFilter {
        let family = HashFamily::from_angular(4, planes()).unwrap();
        let artifact =
            IndexArtifact::build(&Vector::dense(vec![1.0, 1.0, 1.0, 1.0]), family, None).unwrap();
        CandidateFilter::new(
            Arc::new(artifact),
            FilterPolicy::HammingThreshold { threshold },
            options,
        )
        .unwrap()
    }

    fn euclidean_filter(options: FilterOptions) -> CandidateFilter {
        let family = HashFamily::from_euclidean(
            2,
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        )
        .unwrap();
        let artifact = IndexArtifact::build(&Vector::dense(vec![0.5, 1.5]), family, Some(1.0)).unwrap();
        CandidateFilter::new(Arc::new(artifact), FilterPolicy::ExactBandMatch, options).unwrap()
    }

    #[test]
    fn test_angular_same_and_opposite() {
        let filter = angular_filter(0.0, FilterOptions::default());
        let lines = ["same\t1,1,1,1", "opposite\t-1,-1,-1,-1"];
        let report = filter.run(&lines).unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.len(), 1);
        let c = &report.candidates[0];
        assert_eq!(c.payload, "same\t1,1,1,1");
        assert_eq!(c.score, Some(1.0));
        assert_eq!(c.to_line(), "1\tsame\t1,1,1,1");
    }

    #[test]
    fn test_threshold_minus_one_passes_everything() {
        let filter = angular_filter(-1.0, FilterOptions::default());
        let lines = ["a\t1,1,1,1", "b\t-1,-1,-1,-1", "c\t3,-1,0,2"];
        assert_eq!(filter.run(&lines).unwrap().len(), 3);
    }

    #[test]
    fn test_band_match() {
        let filter = euclidean_filter(FilterOptions::default());
        // query buckets: floor(0.5)=0, floor(1.5)=1
        let lines = ["hit\t0.9,1.1", "miss_first\t-0.1,1.1", "miss_second\t0.2,2.0"];
        let report = filter.run(&lines).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report.candidates[0].ordinal, 0);
        assert_eq!(report.candidates[0].to_line(), "0,1\thit\t0.9,1.1");
    }

    #[test]
    fn test_band_mismatch_rejects_before_later_bands() {
        // band 1 overflows the bucket index for anything away from zero
        let family = HashFamily::from_euclidean(1, vec![vec![1.0], vec![1e300]]).unwrap();
        let artifact = IndexArtifact::build(&Vector::dense(vec![0.0]), family, Some(1.0)).unwrap();
        let filter =
            CandidateFilter::new(Arc::new(artifact), FilterPolicy::ExactBandMatch, FilterOptions::default())
                .unwrap();
        let report = filter.run(&["far\t5.0", "same\t0.0"]).unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.len(), 1);
        assert_eq!(report.candidates[0].to_line(), "0,0\tsame\t0.0");

        let err = filter.run(&["near\t0.5"]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_fail_fast_reports_first_bad_record() {
        let filter = euclidean_filter(FilterOptions::default());
        let lines = ["ok\t0.5,1.5", "bad\t0.5,x", "worse no tab"];
        let err = filter.run(&lines).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParseError);
        assert!(err.message().starts_with("record 1:"));
    }

    #[test]
    fn test_skip_policy_counts() {
        let filter = euclidean_filter(FilterOptions::default().with_error_policy(ErrorPolicy::Skip));
        let lines = ["ok\t0.5,1.5", "bad\t0.5,x", "", "no tab"];
        let report = filter.run(&lines).unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_is_fatal_even_when_skipping() {
        let filter = euclidean_filter(FilterOptions::default().with_error_policy(ErrorPolicy::Skip));
        let err = filter.run(&["short\t1.0,2.0,3.0"]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DimensionMismatch);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let lines: Vec<String> = (0..3000)
            .map(|i| format!("r{i}\t{},{}", (i % 7) as f64 * 0.3, (i % 5) as f64 * 0.4))
            .collect();
        let seq = euclidean_filter(FilterOptions::default().with_parallel_threshold(usize::MAX))
            .run(&lines)
            .unwrap();
        let par = euclidean_filter(FilterOptions::default().with_parallel_threshold(0))
            .run(&lines)
            .unwrap();
        assert_eq!(seq, par);
        assert!(!seq.is_empty());
    }

    #[test]
    fn test_key_all_keeps_everything() {
        let filter = euclidean_filter(FilterOptions::default());
        let report = filter.key_all(&["a\t0.5,1.5", "b\t-3.0,7.2"]).unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report.candidates[1].to_line(), "-3,7\tb\t-3.0,7.2");
    }

    #[test]
    fn test_threshold_policy_rejected_for_euclidean() {
        let family = HashFamily::from_euclidean(1, vec![vec![1.0]]).unwrap();
        let artifact = IndexArtifact::build(&Vector::dense(vec![1.0]), family, Some(1.0)).unwrap();
        let err = CandidateFilter::new(
            Arc::new(artifact),
            FilterPolicy::HammingThreshold { threshold: 0.5 },
            FilterOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }
}

//! Filter output records.

use crate::data_format::{Record, Vector};
use crate::error::{LshError, Result};
use crate::hashes::Signature;
use crate::types::{HashVariant, RecordOrdinal};
use std::fmt;

/// A record that survived the filter, with its signature.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    /// Position of the source record in its partition.
    pub ordinal: RecordOrdinal,
    /// Signature under the shared artifact.
    pub signature: Signature,
    /// Estimated similarity to the query, for threshold filtering.
    pub score: Option<f64>,
    /// The original input line.
    pub payload: String,
}

impl CandidateRecord {
    /// Create a candidate without a score.
    pub fn new(ordinal: RecordOrdinal, signature: Signature, payload: impl Into<String>) -> Self {
        Self {
            ordinal,
            signature,
            score: None,
            payload: payload.into(),
        }
    }

    /// Attach a similarity score.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Output line: `<score>\t<payload>` when scored, otherwise
    /// `<signature>\t<payload>`.
    pub fn to_line(&self) -> String {
        match self.score {
            Some(score) => format!("{score}\t{}", self.payload),
            None => self.to_signature_line(),
        }
    }

    /// Output line `<signature>\t<payload>`, regardless of any score.
    pub fn to_signature_line(&self) -> String {
        format!("{}\t{}", self.signature, self.payload)
    }

    /// Parse a `<signature>\t<payload>` line written by [`to_line`].
    ///
    /// [`to_line`]: CandidateRecord::to_line
    pub fn parse_line(line: &str, ordinal: RecordOrdinal, variant: HashVariant) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (signature, payload) = line
            .split_once('\t')
            .ok_or_else(|| LshError::parse("filter output has no TAB after the signature"))?;
        let signature = Signature::parse(signature, variant)?;
        Ok(Self::new(ordinal, signature, payload))
    }

    /// Decode the vector carried in the payload.
    pub fn vector(&self, dimension: Option<usize>) -> Result<Vector> {
        Record::parse(&self.payload, self.ordinal)?.vector(dimension)
    }
}

impl fmt::Display for CandidateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Result of one filter pass over a partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterReport {
    /// Admitted records, in input order.
    pub candidates: Vec<CandidateRecord>,
    /// Records examined.
    pub scanned: usize,
    /// Records dropped for being malformed.
    pub skipped: usize,
}

impl FilterReport {
    /// Number of admitted records.
    #[inline]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// True when nothing was admitted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Output lines for every candidate.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.candidates.iter().map(CandidateRecord::to_line)
    }

    /// Fold another partition's report into this one.
    ///
    /// The other partition's ordinals are shifted past every ordinal
    /// already held, so ties still resolve in partition order.
    pub fn merge(&mut self, other: FilterReport) {
        let offset = self
            .candidates
            .iter()
            .map(|c| c.ordinal + 1)
            .max()
            .unwrap_or(0)
            .max(self.scanned);
        self.candidates.extend(other.candidates.into_iter().map(|mut c| {
            c.ordinal += offset;
            c
        }));
        self.scanned += other.scanned;
        self.skipped += other.skipped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashes::BucketSignature;

    #[test]
    fn test_signature_line() {
        let c = CandidateRecord::new(
            3,
            Signature::Buckets(BucketSignature(vec![1, -2])),
            "a\t1,2",
        );
        assert_eq!(c.to_line(), "1,-2\ta\t1,2");
        let back = CandidateRecord::parse_line(&c.to_line(), 3, HashVariant::Euclidean).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_scored_line() {
        let c = CandidateRecord::new(0, Signature::Buckets(BucketSignature(vec![])), "a\t1")
            .with_score(0.5);
        assert_eq!(c.to_line(), "0.5\ta\t1");
    }

    #[test]
    fn test_payload_vector() {
        let c = CandidateRecord::new(0, Signature::Buckets(BucketSignature(vec![])), "a\t1:2.0")
            .with_score(0.5);
        assert_eq!(c.vector(Some(3)).unwrap().to_dense(), vec![2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_parse_line_without_tab() {
        let err = CandidateRecord::parse_line("1,2,3", 0, HashVariant::Euclidean).unwrap_err();
        assert!(err.message().contains("TAB"));
    }

    #[test]
    fn test_report_merge() {
        let mut a = FilterReport { candidates: vec![], scanned: 3, skipped: 1 };
        let b = FilterReport {
            candidates: vec![CandidateRecord::new(
                0,
                Signature::Buckets(BucketSignature(vec![1])),
                "x\t1",
            )],
            scanned: 2,
            skipped: 0,
        };
        a.merge(b);
        assert_eq!(a.len(), 1);
        assert_eq!(a.scanned, 5);
        assert_eq!(a.skipped, 1);
        assert_eq!(a.lines().collect::<Vec<_>>(), vec!["1\tx\t1".to_string()]);
        assert_eq!(a.candidates[0].ordinal, 3);
    }

    #[test]
    fn test_report_merge_keeps_ordinals_distinct() {
        let sig = || Signature::Buckets(BucketSignature(vec![0]));
        let part = |ordinals: &[usize]| FilterReport {
            candidates: ordinals.iter().map(|&o| CandidateRecord::new(o, sig(), format!("r{o}"))).collect(),
            scanned: 2,
            skipped: 0,
        };
        let mut merged = part(&[0, 1]);
        merged.merge(part(&[0, 1]));
        merged.merge(part(&[1]));
        let ordinals: Vec<_> = merged.candidates.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3, 5]);
    }
}

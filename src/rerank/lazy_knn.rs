//! Lazy KNN over persisted filter output.
//!
//! The reranker-side driver: load the artifact, scan filter output lines
//! from any number of partitions, accumulate a distance per line, then
//! sort once and emit the k nearest.
//!
//! ```text
//! LoadingArtifact --load--> Scanning --neighbours--> Sorted --> Emitted
//!                              ^  |
//!                              +--+ scan / scan_lines
//! ```

use super::reranker::ExactReranker;
use super::result::RankedResult;
use crate::artifact::IndexArtifact;
use crate::config::ErrorPolicy;
use crate::error::{LshError, Result};
use crate::filter::CandidateRecord;
use crate::hashes::{estimated_similarity, hamming_for_similarity, Signature};
use crate::types::{HashVariant, RecordOrdinal};
use crate::utils::parallel::maybe_parallel_map_threshold;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;

/// Where a [`LazyKnnSearch`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnnState {
    /// No artifact yet.
    LoadingArtifact,
    /// Accumulating distances.
    Scanning,
    /// Distances sorted; nothing emitted yet.
    Sorted,
    /// Neighbours returned at least once.
    Emitted,
}

/// Sequential-friendly KNN over candidates scored against one artifact.
#[derive(Debug)]
pub struct LazyKnnSearch {
    state: KnnState,
    artifact: Option<Arc<IndexArtifact>>,
    reranker: ExactReranker,
    error_policy: ErrorPolicy,
    entries: Vec<RankedResult>,
    next_ordinal: RecordOrdinal,
    skipped: usize,
}

impl Default for LazyKnnSearch {
    fn default() -> Self {
        Self::new(ExactReranker::default())
    }
}

impl LazyKnnSearch {
    /// Create a search waiting for its artifact.
    pub fn new(reranker: ExactReranker) -> Self {
        Self {
            state: KnnState::LoadingArtifact,
            artifact: None,
            reranker,
            error_policy: ErrorPolicy::FailFast,
            entries: Vec::new(),
            next_ordinal: 0,
            skipped: 0,
        }
    }

    /// Create a search already holding `artifact`.
    pub fn with_artifact(artifact: Arc<IndexArtifact>, reranker: ExactReranker) -> Result<Self> {
        let mut search = Self::new(reranker);
        search.set_artifact(artifact)?;
        Ok(search)
    }

    /// Set the policy for malformed filter lines.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Current state.
    pub fn state(&self) -> KnnState {
        self.state
    }

    /// Lines dropped as malformed under the skip policy.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Number of scored entries so far.
    pub fn scanned(&self) -> usize {
        self.entries.len()
    }

    /// Load the artifact from disk.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.expect_state(KnnState::LoadingArtifact, "load an artifact")?;
        let artifact = IndexArtifact::load(path)?;
        self.set_artifact(Arc::new(artifact))
    }

    /// Install an already loaded artifact.
    pub fn set_artifact(&mut self, artifact: Arc<IndexArtifact>) -> Result<()> {
        self.expect_state(KnnState::LoadingArtifact, "load an artifact")?;
        artifact.validate()?;
        self.artifact = Some(artifact);
        self.state = KnnState::Scanning;
        Ok(())
    }

    /// Score candidates against the query signature.
    ///
    /// Candidate ordinals are kept as the tie-break.
    pub fn scan(&mut self, candidates: &[CandidateRecord]) -> Result<usize> {
        self.expect_state(KnnState::Scanning, "scan")?;
        let artifact = Arc::clone(self.artifact()?);
        let query = artifact.query_signature();
        let scored = maybe_parallel_map_threshold(candidates, self.reranker.parallel_threshold(), |c| {
            c.signature
                .hamming(query)
                .map(|h| ranked(&artifact, h, c.ordinal, c.payload.clone()))
                .map_err(|e| e.at_record(c.ordinal))
        });
        let before = self.entries.len();
        for entry in scored {
            self.entries.push(entry?);
        }
        if let Some(max) = candidates.iter().map(|c| c.ordinal).max() {
            self.next_ordinal = self.next_ordinal.max(max + 1);
        }
        Ok(self.entries.len() - before)
    }

    /// Parse and score filter output lines.
    ///
    /// Euclidean lines are `<signature>\t<record>`. Angular lines usually
    /// carry the filter's similarity, `<similarity>\t<record>`, which maps
    /// back to a Hamming distance over the artifact's sketch length; a
    /// leading field of exactly K sign bits is read as a sketch instead.
    ///
    /// Lines get ordinals continuing from everything scanned before, so
    /// ties resolve in scan order across partitions.
    pub fn scan_lines<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<usize> {
        self.expect_state(KnnState::Scanning, "scan")?;
        let artifact = Arc::clone(self.artifact()?);
        let before = self.entries.len();
        for (i, line) in lines.iter().enumerate() {
            let line = line.as_ref();
            if line.trim().is_empty() {
                continue;
            }
            let ordinal = self.next_ordinal + i;
            match score_line(&artifact, line, ordinal) {
                Ok(entry) => self.entries.push(entry),
                Err(e) if !e.is_fatal() && self.error_policy == ErrorPolicy::Skip => {
                    tracing::warn!(error = %e.at_record(ordinal), "skipping malformed filter line");
                    self.skipped += 1;
                }
                Err(e) => return Err(e.at_record(ordinal)),
            }
        }
        self.next_ordinal += lines.len();
        Ok(self.entries.len() - before)
    }

    /// Sort everything scanned and return the k nearest.
    ///
    /// May be called again after emitting, with any k.
    pub fn neighbours(&mut self, k: usize) -> Result<Vec<RankedResult>> {
        match self.state {
            KnnState::Scanning => self.sort(),
            KnnState::Sorted | KnnState::Emitted => {}
            KnnState::LoadingArtifact => {
                return Err(LshError::invalid_argument("cannot emit neighbours before loading an artifact"))
            }
        }
        self.reranker.check_shortfall(k, self.entries.len())?;
        let out: Vec<_> = self.entries.iter().take(k).cloned().collect();
        self.state = KnnState::Emitted;
        tracing::info!(scanned = self.entries.len(), returned = out.len(), "lazy knn emitted");
        Ok(out)
    }

    fn sort(&mut self) {
        let key = |r: &RankedResult| (OrderedFloat(r.distance), r.ordinal);
        if self.entries.len() >= self.reranker.parallel_threshold() {
            self.entries.par_sort_unstable_by_key(key);
        } else {
            self.entries.sort_unstable_by_key(key);
        }
        self.state = KnnState::Sorted;
        tracing::debug!(entries = self.entries.len(), "sorted candidate distances");
    }

    fn artifact(&self) -> Result<&Arc<IndexArtifact>> {
        self.artifact
            .as_ref()
            .ok_or_else(|| LshError::internal("artifact missing in scanning state"))
    }

    fn expect_state(&self, expected: KnnState, action: &str) -> Result<()> {
        if self.state != expected {
            return Err(LshError::invalid_argument(format!(
                "cannot {action} in state {:?}",
                self.state
            )));
        }
        Ok(())
    }
}

/// Distance of one filter output line from the artifact's query.
fn score_line(artifact: &IndexArtifact, line: &str, ordinal: RecordOrdinal) -> Result<RankedResult> {
    match artifact.variant() {
        HashVariant::Euclidean => {
            let candidate = CandidateRecord::parse_line(line, ordinal, HashVariant::Euclidean)?;
            let distance = candidate.signature.hamming(artifact.query_signature())?;
            Ok(ranked(artifact, distance, ordinal, candidate.payload))
        }
        HashVariant::Angular => {
            let line = line.trim_end_matches(['\r', '\n']);
            let (head, payload) = line
                .split_once('\t')
                .ok_or_else(|| LshError::parse("filter output has no TAB after the similarity"))?;
            let k = artifact.signature_length();
            let distance = if is_sketch(head, k) {
                Signature::parse(head, HashVariant::Angular)?.hamming(artifact.query_signature())?
            } else {
                let similarity = head
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|s| (-1.0..=1.0).contains(s))
                    .ok_or_else(|| LshError::parse(format!("`{head}` is not a similarity in [-1, 1]")))?;
                hamming_for_similarity(similarity, k)
            };
            Ok(ranked(artifact, distance, ordinal, payload))
        }
    }
}

fn ranked(
    artifact: &IndexArtifact,
    hamming: usize,
    ordinal: RecordOrdinal,
    payload: impl Into<String>,
) -> RankedResult {
    let result = RankedResult::new(hamming as f64, ordinal, payload);
    match artifact.variant() {
        HashVariant::Angular => result.with_similarity(estimated_similarity(hamming, artifact.signature_length())),
        HashVariant::Euclidean => result,
    }
}

/// A field of exactly `k` sign bits. Similarities never print as a run of
/// two or more `0`/`1` digits, so only one-bit sketches are ambiguous, and
/// those read as similarities.
fn is_sketch(field: &str, k: usize) -> bool {
    k > 1 && field.len() == k && field.bytes().all(|b| b == b'0' || b == b'1')
}

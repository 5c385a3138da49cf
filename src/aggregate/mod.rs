//! Group-by-key aggregation between filtering and reranking.
//!
//! For signature-keyed retrieval the keyed filter output is grouped by
//! exact signature, and each group is checked once against the query.
//! For direct-filter retrieval the aggregator only passes candidates
//! through, optionally dropping repeated payloads.
//!
//! Both paths consume the complete filter output; this is the barrier
//! between the parallel filter and the reranker.

use crate::error::Result;
use crate::filter::{CandidateRecord, FilterPolicy, Verdict};
use crate::hashes::Signature;
use crate::utils::parallel::maybe_parallel_map_threshold;
use crate::utils::MIN_PARALLEL_SIZE;
use std::collections::{HashMap, HashSet};

/// Candidates sharing one signature.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureGroup {
    /// The shared signature.
    pub signature: Signature,
    /// Members in input order.
    pub members: Vec<CandidateRecord>,
}

/// All groups, ordered by the first appearance of each signature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignatureGroups {
    groups: Vec<SignatureGroup>,
}

impl SignatureGroups {
    /// Number of distinct signatures.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of grouped candidates.
    pub fn num_members(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum()
    }

    /// Iterate over groups.
    pub fn iter(&self) -> impl Iterator<Item = &SignatureGroup> {
        self.groups.iter()
    }

    /// Members of the group keyed by `signature`.
    pub fn get(&self, signature: &Signature) -> Option<&[CandidateRecord]> {
        self.groups
            .iter()
            .find(|g| &g.signature == signature)
            .map(|g| g.members.as_slice())
    }
}

/// The aggregation stage.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    parallel_threshold: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    /// Create an aggregator with the default parallel threshold.
    pub fn new() -> Self {
        Self {
            parallel_threshold: MIN_PARALLEL_SIZE,
        }
    }

    /// Number of groups at which `reduce` goes parallel.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Group keyed candidates by exact signature.
    pub fn group_by_signature(&self, candidates: Vec<CandidateRecord>) -> SignatureGroups {
        let mut index: HashMap<Signature, usize> = HashMap::new();
        let mut groups: Vec<SignatureGroup> = Vec::new();
        for candidate in candidates {
            match index.get(&candidate.signature) {
                Some(&slot) => groups[slot].members.push(candidate),
                None => {
                    index.insert(candidate.signature.clone(), groups.len());
                    groups.push(SignatureGroup {
                        signature: candidate.signature.clone(),
                        members: vec![candidate],
                    });
                }
            }
        }
        tracing::debug!(groups = groups.len(), "grouped candidates by signature");
        SignatureGroups { groups }
    }

    /// Apply `policy` once per group and forward the members of every
    /// admitted group, scored when the policy yields a similarity.
    ///
    /// Output is ordered by record ordinal.
    pub fn reduce(
        &self,
        groups: &SignatureGroups,
        query_signature: &Signature,
        policy: FilterPolicy,
    ) -> Result<Vec<CandidateRecord>> {
        let verdicts = maybe_parallel_map_threshold(&groups.groups, self.parallel_threshold, |g| {
            policy.admit(&g.signature, query_signature)
        });

        let mut out = Vec::new();
        for (group, verdict) in groups.groups.iter().zip(verdicts) {
            if let Verdict::Admit { score } = verdict? {
                out.extend(group.members.iter().cloned().map(|mut c| {
                    c.score = score;
                    c
                }));
            }
        }
        out.sort_by_key(|c| c.ordinal);
        tracing::info!(
            groups = groups.len(),
            forwarded = out.len(),
            "signature groups reduced"
        );
        Ok(out)
    }

    /// Forward direct-filter output, keeping the first occurrence of each
    /// payload when `dedup` is set.
    pub fn passthrough(&self, candidates: Vec<CandidateRecord>, dedup: bool) -> Vec<CandidateRecord> {
        if !dedup {
            return candidates;
        }
        let before = candidates.len();
        let mut seen = HashSet::new();
        let out: Vec<_> = candidates
            .into_iter()
            .filter(|c| seen.insert(c.payload.clone()))
            .collect();
        if out.len() < before {
            tracing::debug!(dropped = before - out.len(), "dropped duplicate candidates");
        }
        out
    }
}

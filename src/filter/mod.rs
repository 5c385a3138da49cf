//! Candidate filtering.
//!
//! The cheap, approximate half of retrieval: every stored record is
//! encoded against the shared artifact and kept only if its signature can
//! match the query's. Two policies are supported:
//!
//! - [`FilterPolicy::ExactBandMatch`]: AND over all Euclidean bands.
//! - [`FilterPolicy::HammingThreshold`]: SimHash similarity cutoff.

mod candidate;
mod candidate_filter;
mod policy;

pub use candidate::{CandidateRecord, FilterReport};
pub use candidate_filter::{CandidateFilter, FilterOptions};
pub use policy::{FilterPolicy, Verdict};

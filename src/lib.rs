//! # lsh-knn - Locality-Sensitive Hashing for k-nearest-neighbor search
//!
//! Approximate nearest-neighbor search built on two LSH families:
//!
//! - **Euclidean**: random unit projections quantized into buckets of a
//!   fixed width; records match when every band agrees with the query.
//! - **Angular**: random hyperplanes (SimHash); records match when the
//!   cosine similarity estimated from their bit sketches clears a threshold.
//!
//! ## Overview
//!
//! Retrieval is two-phase. A cheap, data-parallel filter discards records
//! whose signature cannot match the query, then an exact reranker orders
//! the survivors and keeps the k nearest:
//!
//! ```text
//! HashFamilyGenerator -> IndexArtifact -> CandidateFilter -> Aggregator -> ExactReranker
//!                         (shared, read-only)    (rayon)        (barrier)     (top-K)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use lsh_knn::prelude::*;
//!
//! let config = LshConfig::angular(4)
//!     .with_signature_length(16)
//!     .with_threshold(0.0)
//!     .with_num_neighbors(1);
//!
//! let pipeline = LshPipeline::builder(config)
//!     .query(Vector::dense(vec![1.0, 2.0, 3.0, 4.0]))
//!     .seed(7)
//!     .build()?;
//!
//! let outcome = pipeline.run(&["same\t1,2,3,4", "opposite\t-1,-2,-3,-4"])?;
//! assert_eq!(outcome.neighbours[0].payload, "same\t1,2,3,4");
//! # Ok::<(), lsh_knn::LshError>(())
//! ```
//!
//! ## Record Format
//!
//! Input records are lines `<label><TAB><vector>`. Dense vectors are
//! comma-separated; sparse vectors are `position:value` pairs separated by
//! tabs or commas, with positions counted from 1.
//!
//! ## Module Overview
//!
//! - [`data_format`]: vectors, their codecs, and input records
//! - [`hashes`]: hash families, signatures, and the signature encoder
//! - [`artifact`]: the persisted hash family plus query signature
//! - [`filter`]: the per-record candidate filter
//! - [`aggregate`]: signature grouping and passthrough deduplication
//! - [`rerank`]: exact top-K reranking and the lazy KNN driver
//! - [`pipeline`]: end-to-end orchestration
//! - [`utils`]: parallel helpers, bit operations, cancellation

#![allow(clippy::module_inception)]

pub mod aggregate;
pub mod artifact;
pub mod data_format;
pub mod filter;
pub mod hashes;
pub mod pipeline;
pub mod rerank;
pub mod utils;

mod config;
mod error;
mod types;

pub use config::{ErrorPolicy, LshConfig, ShortfallPolicy};
pub use error::{ErrorCode, LshError, Result};
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aggregate::{Aggregator, SignatureGroups};
    pub use crate::artifact::{HashFamilyFile, IndexArtifact, ARTIFACT_VERSION};
    pub use crate::config::{ErrorPolicy, LshConfig, ShortfallPolicy};
    pub use crate::data_format::{parse_dense, parse_sparse, parse_vector, Record, Vector};
    pub use crate::error::{ErrorCode, LshError, Result};
    pub use crate::filter::{CandidateFilter, CandidateRecord, FilterOptions, FilterPolicy, FilterReport};
    pub use crate::hashes::{
        estimated_similarity, BitSketch, BucketSignature, HashFamily, HashFamilyGenerator, Signature,
        SignatureEncoder,
    };
    pub use crate::pipeline::{LshPipeline, LshPipelineBuilder, RerankMetric, SearchMode, SearchOutcome};
    pub use crate::rerank::{ExactReranker, KnnState, LazyKnnSearch, RankedResult};
    pub use crate::types::*;
    pub use crate::utils::CancellationToken;
}

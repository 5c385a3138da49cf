//! End-to-end LSH search.
//!
//! [`LshPipeline`] wires the stages together for one query:
//!
//! 1. generate a hash family and freeze it with the query signature;
//! 2. filter every record against the shared artifact (parallel);
//! 3. aggregate the complete filter output (the barrier);
//! 4. rerank the survivors exactly and keep the k nearest.
//!
//! A [`CancellationToken`] is checked before every stage, so a cancelled
//! job never reranks partial filter output.

use crate::aggregate::Aggregator;
use crate::artifact::IndexArtifact;
use crate::config::LshConfig;
use crate::data_format::Vector;
use crate::error::{LshError, Result};
use crate::filter::{CandidateFilter, CandidateRecord, FilterOptions, FilterPolicy, FilterReport};
use crate::hashes::{HashFamily, HashFamilyGenerator};
use crate::rerank::{ExactReranker, RankedResult};
use crate::utils::{rng_from_seed, CancellationToken};
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::sync::Arc;

/// How candidates reach the reranker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Each record is compared with the query inside the filter.
    #[default]
    DirectFilter,
    /// Records are keyed by signature, grouped, and each group is
    /// compared with the query once.
    SignatureKeyed,
}

/// Distance used by the final ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RerankMetric {
    /// Hamming distance between signatures.
    #[default]
    SignatureHamming,
    /// Euclidean distance between the payload vectors and the query vector.
    VectorL2,
}

/// Result of one search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    /// The k nearest records, ascending by distance.
    pub neighbours: Vec<RankedResult>,
    /// Records examined by the filter.
    pub scanned: usize,
    /// Candidates handed to the reranker.
    pub candidates: usize,
    /// Malformed records dropped under the skip policy.
    pub skipped: usize,
}

impl SearchOutcome {
    /// Output lines `<distance>\t<record>`.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.neighbours.iter().map(RankedResult::to_line)
    }
}

/// A configured search for one query.
#[derive(Debug)]
pub struct LshPipeline {
    config: LshConfig,
    artifact: Arc<IndexArtifact>,
    query: Option<Vector>,
    mode: SearchMode,
    metric: RerankMetric,
    filter: CandidateFilter,
    aggregator: Aggregator,
    reranker: ExactReranker,
    cancel: CancellationToken,
}

impl LshPipeline {
    /// Start building a pipeline.
    pub fn builder(config: LshConfig) -> LshPipelineBuilder {
        LshPipelineBuilder::new(config)
    }

    /// The job configuration.
    pub fn config(&self) -> &LshConfig {
        &self.config
    }

    /// The frozen artifact shared by every stage.
    pub fn artifact(&self) -> &Arc<IndexArtifact> {
        &self.artifact
    }

    /// Retrieval mode.
    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Ranking metric.
    pub fn metric(&self) -> RerankMetric {
        self.metric
    }

    /// The filter stage.
    pub fn filter(&self) -> &CandidateFilter {
        &self.filter
    }

    /// Token that aborts the job between stages.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run every stage over one partition of input lines.
    pub fn run<S: AsRef<str> + Sync>(&self, lines: &[S]) -> Result<SearchOutcome> {
        self.cancel.check("filter")?;
        let (report, candidates) = match self.mode {
            SearchMode::DirectFilter => {
                let mut report = self.filter.run(lines)?;
                self.cancel.check("aggregate")?;
                let candidates = std::mem::take(&mut report.candidates);
                let candidates = self.aggregator.passthrough(candidates, self.config.deduplicate);
                (report, candidates)
            }
            SearchMode::SignatureKeyed => {
                let mut report = self.filter.key_all(lines)?;
                self.cancel.check("aggregate")?;
                let groups = self
                    .aggregator
                    .group_by_signature(std::mem::take(&mut report.candidates));
                let survivors =
                    self.aggregator
                        .reduce(&groups, self.artifact.query_signature(), self.filter.policy())?;
                let candidates = self.aggregator.passthrough(survivors, self.config.deduplicate);
                (report, candidates)
            }
        };

        self.cancel.check("rerank")?;
        let neighbours = self.rerank(&candidates)?;
        tracing::info!(
            scanned = report.scanned,
            candidates = candidates.len(),
            returned = neighbours.len(),
            "search complete"
        );
        Ok(SearchOutcome {
            neighbours,
            scanned: report.scanned,
            candidates: candidates.len(),
            skipped: report.skipped,
        })
    }

    /// Run only the filter stage.
    pub fn filter_only<S: AsRef<str> + Sync>(&self, lines: &[S]) -> Result<FilterReport> {
        self.cancel.check("filter")?;
        self.filter.run(lines)
    }

    fn rerank(&self, candidates: &[CandidateRecord]) -> Result<Vec<RankedResult>> {
        let k = self.config.num_neighbors;
        match self.metric {
            RerankMetric::SignatureHamming => {
                self.reranker.rerank(candidates, self.artifact.query_signature(), k)
            }
            RerankMetric::VectorL2 => {
                let query = self.query.as_ref().ok_or_else(|| {
                    LshError::invalid_argument("vector reranking needs the query vector")
                })?;
                self.reranker.rerank_vectors(candidates, query, k)
            }
        }
    }
}

/// Builder for [`LshPipeline`].
#[derive(Debug)]
pub struct LshPipelineBuilder {
    config: LshConfig,
    query: Option<Vector>,
    family: Option<HashFamily>,
    artifact: Option<Arc<IndexArtifact>>,
    rng: Option<StdRng>,
    mode: SearchMode,
    metric: RerankMetric,
    policy: Option<FilterPolicy>,
    cancel: CancellationToken,
}

impl LshPipelineBuilder {
    /// Create a builder for `config`.
    pub fn new(config: LshConfig) -> Self {
        Self {
            config,
            query: None,
            family: None,
            artifact: None,
            rng: None,
            mode: SearchMode::default(),
            metric: RerankMetric::default(),
            policy: None,
            cancel: CancellationToken::new(),
        }
    }

    /// The query vector.
    pub fn query(mut self, query: Vector) -> Self {
        self.query = Some(query);
        self
    }

    /// Seed the family generator.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = Some(rng_from_seed(Some(seed)));
        self
    }

    /// Draw the family from `rng`.
    pub fn rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    /// Use an explicit family instead of drawing one.
    pub fn family(mut self, family: HashFamily) -> Self {
        self.family = Some(family);
        self
    }

    /// Use a previously built artifact; the query vector becomes optional.
    pub fn artifact(mut self, artifact: Arc<IndexArtifact>) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Retrieval mode.
    pub fn mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Ranking metric.
    pub fn metric(mut self, metric: RerankMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Override the filter policy derived from the config.
    pub fn policy(mut self, policy: FilterPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Share an external cancellation token.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Build the pipeline.
    pub fn build(self) -> Result<LshPipeline> {
        let config = self.config;
        config.validate()?;
        if let Some(query) = &self.query {
            query.check_dimension(config.dimensionality)?;
        }

        let artifact = match (self.artifact, self.query.as_ref()) {
            (Some(artifact), _) => {
                artifact.validate()?;
                check_family(artifact.family(), &config)?;
                artifact
            }
            (None, Some(query)) => {
                let family = match self.family {
                    Some(family) => family,
                    None => {
                        let mut rng = self.rng.unwrap_or_else(|| rng_from_seed(config.seed));
                        HashFamilyGenerator::from_config(&config)
                            .generate_unique(&mut rng, &mut HashSet::new())?
                    }
                };
                check_family(&family, &config)?;
                Arc::new(IndexArtifact::build(query, family, config.effective_bucket_width())?)
            }
            (None, None) => {
                return Err(LshError::invalid_argument(
                    "a pipeline needs a query vector or a prebuilt artifact",
                ))
            }
        };

        let policy = self.policy.unwrap_or_else(|| FilterPolicy::for_config(&config));
        let filter = CandidateFilter::new(
            Arc::clone(&artifact),
            policy,
            FilterOptions::from_config(&config),
        )?;
        let aggregator = Aggregator::new().with_parallel_threshold(config.parallel_threshold);
        let reranker = ExactReranker::from_config(&config);
        tracing::debug!(
            variant = %artifact.variant(),
            signature_length = artifact.signature_length(),
            mode = ?self.mode,
            "pipeline ready"
        );

        Ok(LshPipeline {
            config,
            artifact,
            query: self.query,
            mode: self.mode,
            metric: self.metric,
            filter,
            aggregator,
            reranker,
            cancel: self.cancel,
        })
    }
}

fn check_family(family: &HashFamily, config: &LshConfig) -> Result<()> {
    if family.variant() != config.variant {
        return Err(LshError::config_mismatch(format!(
            "hash family is {}, config asks for {}",
            family.variant(),
            config.variant
        )));
    }
    if family.dimension() != config.dimensionality {
        return Err(LshError::dimension_mismatch(config.dimensionality, family.dimension()));
    }
    Ok(())
}

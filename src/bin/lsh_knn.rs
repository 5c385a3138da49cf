//! lsh-knn command-line driver
//!
//! Runs the LSH stages either one at a time over files, the way a batch
//! job would, or all in-process.
//!
//! ## Usage
//!
//! ```bash
//! # Draw a hash family and freeze it with the query signature
//! lsh-knn index --query query.txt --output artifact.json -s 20 -b 20 --seed 7
//!
//! # Filter a partition against the artifact
//! lsh-knn filter --artifact artifact.json --input part-0.txt --output candidates-0.txt
//!
//! # Rerank every filter partition and keep the 10 nearest
//! lsh-knn knn --artifact artifact.json --input candidates/ -k 10 --output knn.txt
//!
//! # Keep the family, then rerank for a different query against it
//! lsh-knn index --query query.txt --output artifact.json --family-output family.json
//! lsh-knn filter --artifact artifact.json --input part-0.txt --sketches -o candidates-0.txt
//! lsh-knn knn --artifact family.json --query other.txt --input candidates-0.txt -k 10
//!
//! # Everything at once
//! lsh-knn search --query query.txt --input data.txt --variant angular -k 5
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use lsh_knn::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Locality-sensitive hashing for approximate k-nearest-neighbor search
#[derive(Parser)]
#[command(name = "lsh-knn")]
#[command(about = "Approximate k-nearest-neighbor search with locality-sensitive hashing")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a hash family and write the index artifact
    Index {
        /// File whose first line is the query (`<label>\t<vector>` or a bare vector)
        #[arg(short, long)]
        query: PathBuf,

        /// Artifact output path
        #[arg(short, long)]
        output: PathBuf,

        /// Also write the hash family alone, for hashing later queries
        #[arg(long)]
        family_output: Option<PathBuf>,

        #[command(flatten)]
        hash: HashArgs,
    },

    /// Filter input records against an artifact
    Filter {
        /// Index artifact
        #[arg(short, long)]
        artifact: PathBuf,

        /// Input record files or directories
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Minimum estimated cosine similarity (angular artifacts)
        #[arg(long, default_value = "0.5")]
        threshold: f64,

        /// Group records by signature before comparing with the query
        #[arg(long)]
        keyed: bool,

        /// Write each candidate's signature even when it has a similarity score
        #[arg(long)]
        sketches: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Rerank filter output and keep the k nearest
    Knn {
        /// Index artifact, or a hash family file when --query is given
        #[arg(short, long)]
        artifact: PathBuf,

        /// Hash this query against the artifact's family instead of using its stored query
        #[arg(short, long)]
        query: Option<PathBuf>,

        /// Filter output files or directories
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of neighbours
        #[arg(short = 'k', long = "knn", default_value = "20")]
        k: usize,

        /// Write `<distance>\t<similarity>\t<record>` for angular results
        #[arg(long)]
        with_similarity: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Run index, filter, and rerank in one process
    Search {
        /// File whose first line is the query
        #[arg(short, long)]
        query: PathBuf,

        /// Input record files or directories
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of neighbours
        #[arg(short = 'k', long = "knn", default_value = "20")]
        k: usize,

        /// Write `<distance>\t<similarity>\t<record>` for angular results
        #[arg(long)]
        with_similarity: bool,

        /// Minimum estimated cosine similarity (angular variant)
        #[arg(long, default_value = "0.5")]
        threshold: f64,

        /// Retrieval mode
        #[arg(long, value_enum, default_value_t = ModeArg::Direct)]
        mode: ModeArg,

        /// Rank survivors by exact vector distance instead of signature distance
        #[arg(long)]
        exact: bool,

        /// Drop repeated records before reranking
        #[arg(long)]
        dedup: bool,

        #[command(flatten)]
        hash: HashArgs,

        #[command(flatten)]
        run: RunArgs,
    },
}

/// Hash family options.
#[derive(Args, Debug, Clone)]
struct HashArgs {
    /// Number of hash functions (bands or sketch bits)
    #[arg(short = 's', long = "signature-length", alias = "sig", default_value = "20")]
    signature_length: usize,

    /// Euclidean bucket width
    #[arg(short = 'b', long, default_value = "20")]
    bucket_width: f64,

    /// Hash family: euclidean or angular
    #[arg(long, default_value = "euclidean")]
    variant: HashVariant,

    /// Seed for the family generator
    #[arg(long)]
    seed: Option<u64>,

    /// Scale applied to Euclidean hash vectors
    #[arg(long)]
    multiplier: Option<f64>,

    /// Vector dimensionality (required for sparse queries)
    #[arg(short = 'd', long)]
    dimension: Option<usize>,
}

/// Options shared by every stage that reads records.
#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Skip malformed records instead of failing
    #[arg(long)]
    skip_malformed: bool,

    /// Return fewer than k results instead of failing
    #[arg(long)]
    return_available: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Direct,
    Keyed,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Direct => SearchMode::DirectFilter,
            ModeArg::Keyed => SearchMode::SignatureKeyed,
        }
    }
}

impl RunArgs {
    fn apply(&self, mut config: LshConfig) -> LshConfig {
        if self.skip_malformed {
            config = config.with_error_policy(ErrorPolicy::Skip);
        }
        if self.return_available {
            config = config.with_shortfall_policy(ShortfallPolicy::ReturnAvailable);
        }
        config
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(io::stderr))
        .init();

    match cli.command {
        Commands::Index {
            query,
            output,
            family_output,
            hash,
        } => cmd_index(&query, &output, family_output.as_deref(), &hash),
        Commands::Filter {
            artifact,
            input,
            output,
            threshold,
            keyed,
            sketches,
            run,
        } => cmd_filter(&artifact, &input, output.as_deref(), threshold, keyed, sketches, &run),
        Commands::Knn {
            artifact,
            query,
            input,
            output,
            k,
            with_similarity,
            run,
        } => cmd_knn(
            &artifact,
            query.as_deref(),
            &input,
            output.as_deref(),
            k,
            with_similarity,
            &run,
        ),
        Commands::Search {
            query,
            input,
            output,
            k,
            with_similarity,
            threshold,
            mode,
            exact,
            dedup,
            hash,
            run,
        } => {
            let (vector, dimension) = read_query(&query, hash.dimension)?;
            let mut config = run
                .apply(hash_config(&hash, dimension))
                .with_num_neighbors(k)
                .with_threshold(threshold);
            if dedup {
                config = config.with_deduplicate();
            }
            let mut builder = LshPipeline::builder(config)
                .query(vector)
                .mode(mode.into());
            if exact {
                builder = builder.metric(RerankMetric::VectorL2);
            }
            let pipeline = builder.build().context("failed to build search pipeline")?;
            let lines = read_lines(&input)?;
            let outcome = pipeline.run(&lines).context("search failed")?;
            write_results(output.as_deref(), &outcome.neighbours, with_similarity)
        }
    }
}

fn hash_config(hash: &HashArgs, dimension: usize) -> LshConfig {
    let mut config = LshConfig::default()
        .with_variant(hash.variant)
        .with_dimensionality(dimension)
        .with_signature_length(hash.signature_length)
        .with_bucket_width(hash.bucket_width);
    if let Some(m) = hash.multiplier {
        config = config.with_multiplier(m);
    }
    if let Some(seed) = hash.seed {
        config = config.with_seed(seed);
    }
    config
}

fn cmd_index(query: &Path, output: &Path, family_output: Option<&Path>, hash: &HashArgs) -> Result<()> {
    let (vector, dimension) = read_query(query, hash.dimension)?;
    let config = hash_config(hash, dimension);
    config.validate().context("invalid hash options")?;

    // Same draw as the in-process pipeline, so a seed reproduces `search`.
    let mut rng = lsh_knn::utils::rng_from_seed(hash.seed);
    let family = HashFamilyGenerator::from_config(&config)
        .generate_unique(&mut rng, &mut HashSet::new())
        .context("failed to generate hash family")?;
    let artifact = IndexArtifact::build(&vector, family, config.effective_bucket_width())
        .context("failed to encode query")?;
    artifact
        .save(output)
        .with_context(|| format!("failed to write artifact {}", output.display()))?;

    tracing::info!(
        path = %output.display(),
        variant = %artifact.variant(),
        dimension,
        signature = %artifact.query_signature(),
        "artifact written"
    );

    if let Some(path) = family_output {
        HashFamilyFile::from_artifact(&artifact)
            .save(path)
            .with_context(|| format!("failed to write hash family {}", path.display()))?;
        tracing::info!(path = %path.display(), "hash family written");
    }
    Ok(())
}

fn cmd_filter(
    artifact_path: &Path,
    input: &[PathBuf],
    output: Option<&Path>,
    threshold: f64,
    keyed: bool,
    sketches: bool,
    run: &RunArgs,
) -> Result<()> {
    let artifact = load_artifact(artifact_path)?;
    let policy = match artifact.variant() {
        HashVariant::Euclidean => FilterPolicy::ExactBandMatch,
        HashVariant::Angular => FilterPolicy::HammingThreshold { threshold },
    };
    let config = run.apply(LshConfig::default());
    let filter = CandidateFilter::new(Arc::clone(&artifact), policy, FilterOptions::from_config(&config))
        .context("invalid filter options")?;

    let lines = read_lines(input)?;
    let candidates = if keyed {
        let report = filter.key_all(&lines).context("keying pass failed")?;
        let aggregator = Aggregator::new();
        let groups = aggregator.group_by_signature(report.candidates);
        aggregator
            .reduce(&groups, artifact.query_signature(), policy)
            .context("group reduction failed")?
    } else {
        filter.run(&lines).context("filter pass failed")?.candidates
    };
    if sketches {
        write_lines(output, candidates.iter().map(CandidateRecord::to_signature_line))
    } else {
        write_lines(output, candidates.iter().map(CandidateRecord::to_line))
    }
}

fn cmd_knn(
    artifact_path: &Path,
    query: Option<&Path>,
    input: &[PathBuf],
    output: Option<&Path>,
    k: usize,
    with_similarity: bool,
    run: &RunArgs,
) -> Result<()> {
    let artifact = match query {
        Some(query) => {
            let family = HashFamilyFile::load(artifact_path)
                .with_context(|| format!("failed to load hash family {}", artifact_path.display()))?;
            let (vector, _) = read_query(query, Some(family.dimension()))?;
            let artifact = family.for_query(&vector).context("failed to encode query")?;
            if artifact.variant() == HashVariant::Angular {
                // similarity lines were scored against the indexed query
                tracing::warn!("angular rerank for a new query needs filter output written with --sketches");
            }
            Arc::new(artifact)
        }
        None => load_artifact(artifact_path)?,
    };
    let config = run.apply(LshConfig::default());
    let mut knn = LazyKnnSearch::with_artifact(artifact, ExactReranker::from_config(&config))?
        .with_error_policy(config.error_policy);

    for path in expand_inputs(input)? {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let lines: Vec<&str> = text.lines().collect();
        knn.scan_lines(&lines)
            .with_context(|| format!("failed to scan {}", path.display()))?;
    }

    let neighbours = knn.neighbours(k).context("reranking failed")?;
    write_results(output, &neighbours, with_similarity)
}

fn write_results(output: Option<&Path>, results: &[RankedResult], with_similarity: bool) -> Result<()> {
    if with_similarity {
        write_lines(output, results.iter().map(RankedResult::to_scored_line))
    } else {
        write_lines(output, results.iter().map(RankedResult::to_line))
    }
}

fn load_artifact(path: &Path) -> Result<Arc<IndexArtifact>> {
    let artifact = IndexArtifact::load(path)
        .with_context(|| format!("failed to load artifact {}", path.display()))?;
    Ok(Arc::new(artifact))
}

/// First non-empty line of `path`, as a vector.
fn read_query(path: &Path, dimension: Option<usize>) -> Result<(Vector, usize)> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read query {}", path.display()))?;
    let Some(line) = text.lines().find(|l| !l.trim().is_empty()) else {
        bail!("query file {} is empty", path.display());
    };
    let vector = if line.contains('\t') {
        Record::parse(line, 0)?.vector(dimension)?
    } else {
        parse_vector(line, dimension)?
    };
    if let Some(d) = dimension {
        vector.check_dimension(d)?;
    }
    let dimension = vector.dimension();
    Ok((vector, dimension))
}

/// Files named directly, plus every regular file inside named directories.
fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries = fs::read_dir(input)
                .with_context(|| format!("failed to list {}", input.display()))?
                .map(|e| e.map(|e| e.path()))
                .collect::<io::Result<Vec<_>>>()?;
            entries.retain(|p| p.is_file());
            entries.sort();
            files.extend(entries);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

fn read_lines(inputs: &[PathBuf]) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for path in expand_inputs(inputs)? {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        lines.extend(text.lines().map(str::to_owned));
    }
    tracing::debug!(records = lines.len(), "read input");
    Ok(lines)
}

fn write_lines(output: Option<&Path>, lines: impl Iterator<Item = String>) -> Result<()> {
    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(
            fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(sink);
    for line in lines {
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

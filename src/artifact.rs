//! The persisted index artifact.
//!
//! An [`IndexArtifact`] freezes everything a worker needs to hash records
//! consistently with the query: the hash family, the bucket width (for
//! the Euclidean variant), and the query's own signature. It is written
//! once, loaded once per worker, and shared read-only from then on.
//!
//! A [`HashFamilyFile`] is the same thing without a query: a frozen family
//! that any number of later queries can be hashed against.
//!
//! The on-disk form is JSON with a leading `version` tag. Anything that
//! does not decode into the current schema fails with `ConfigMismatch`.

use crate::data_format::Vector;
use crate::error::{LshError, Result};
use crate::hashes::{HashFamily, Signature, SignatureEncoder};
use crate::types::HashVariant;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Schema version written into every artifact.
pub const ARTIFACT_VERSION: u32 = 1;

/// Immutable hash family plus query signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexArtifact {
    version: u32,
    family: HashFamily,
    bucket_width: Option<f64>,
    query_signature: Signature,
}

impl IndexArtifact {
    /// Encode `query` against `family` and freeze the result.
    pub fn build(query: &Vector, family: HashFamily, bucket_width: Option<f64>) -> Result<Self> {
        family.validate()?;
        let bucket_width = bucket_width.filter(|_| family.variant().uses_buckets());
        let query_signature = SignatureEncoder::new(&family, bucket_width)?.encode(query)?;
        Ok(Self {
            version: ARTIFACT_VERSION,
            family,
            bucket_width,
            query_signature,
        })
    }

    /// Rebuild an artifact for a new query over this artifact's family.
    ///
    /// This is how the reranker side reuses a family persisted by the
    /// index builder.
    pub fn for_query(&self, query: &Vector) -> Result<Self> {
        Self::build(query, self.family.clone(), self.bucket_width)
    }

    /// Schema version.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The hash family.
    #[inline]
    pub fn family(&self) -> &HashFamily {
        &self.family
    }

    /// Bucket width, present iff the family is Euclidean.
    #[inline]
    pub fn bucket_width(&self) -> Option<f64> {
        self.bucket_width
    }

    /// The query's signature.
    #[inline]
    pub fn query_signature(&self) -> &Signature {
        &self.query_signature
    }

    /// Hash family variant.
    #[inline]
    pub fn variant(&self) -> HashVariant {
        self.family.variant()
    }

    /// Dimensionality every record must have.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.family.dimension()
    }

    /// Signature length K.
    #[inline]
    pub fn signature_length(&self) -> usize {
        self.family.len()
    }

    /// An encoder bound to this artifact's family and width.
    pub fn encoder(&self) -> Result<SignatureEncoder<'_>> {
        SignatureEncoder::new(&self.family, self.bucket_width)
    }

    /// Encode a record vector the same way the query was encoded.
    pub fn encode(&self, vector: &Vector) -> Result<Signature> {
        self.encoder()?.encode(vector)
    }

    /// Check every cross-field invariant of the schema.
    pub fn validate(&self) -> Result<()> {
        if self.version != ARTIFACT_VERSION {
            return Err(LshError::config_mismatch(format!(
                "artifact version {} is not supported (expected {ARTIFACT_VERSION})",
                self.version
            )));
        }
        self.family.validate()?;
        check_bucket_width(&self.family, self.bucket_width)?;
        if self.query_signature.variant() != self.family.variant()
            || self.query_signature.len() != self.family.len()
        {
            return Err(LshError::config_mismatch(format!(
                "query signature ({} x{}) does not match hash family ({} x{})",
                self.query_signature.variant(),
                self.query_signature.len(),
                self.family.variant(),
                self.family.len()
            )));
        }
        Ok(())
    }

    /// Serialize to a writer.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, self)
            .map_err(|e| LshError::internal(format!("artifact encode failed: {e}")))
    }

    /// Deserialize from a reader and validate.
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let artifact: IndexArtifact = serde_json::from_reader(reader)?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Write to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        tracing::debug!(path = %path.display(), variant = %self.variant(), "saved index artifact");
        Ok(())
    }

    /// Load from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let artifact = Self::read_from(BufReader::new(File::open(path)?))?;
        tracing::debug!(
            path = %path.display(),
            variant = %artifact.variant(),
            signature_length = artifact.signature_length(),
            "loaded index artifact"
        );
        Ok(artifact)
    }
}

fn check_bucket_width(family: &HashFamily, bucket_width: Option<f64>) -> Result<()> {
    match (family.variant(), bucket_width) {
        (HashVariant::Euclidean, Some(w)) if w.is_finite() && w > 0.0 => Ok(()),
        (HashVariant::Euclidean, w) => Err(LshError::config_mismatch(format!(
            "Euclidean artifact has invalid bucket width {w:?}"
        ))),
        (HashVariant::Angular, None) => Ok(()),
        (HashVariant::Angular, Some(_)) => Err(LshError::config_mismatch(
            "Angular artifact must not carry a bucket width",
        )),
    }
}

/// A persisted hash family with no query bound to it.
///
/// Decoding ignores unknown fields, so an [`IndexArtifact`] file also
/// loads as a `HashFamilyFile` (its query signature is dropped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashFamilyFile {
    version: u32,
    family: HashFamily,
    bucket_width: Option<f64>,
}

impl HashFamilyFile {
    /// Freeze `family` with its bucket width.
    pub fn new(family: HashFamily, bucket_width: Option<f64>) -> Result<Self> {
        let file = Self {
            version: ARTIFACT_VERSION,
            bucket_width: bucket_width.filter(|_| family.variant().uses_buckets()),
            family,
        };
        file.validate()?;
        Ok(file)
    }

    /// The family an artifact was built over.
    pub fn from_artifact(artifact: &IndexArtifact) -> Self {
        Self {
            version: artifact.version,
            family: artifact.family.clone(),
            bucket_width: artifact.bucket_width,
        }
    }

    /// Hash `query` and bind it to this family.
    pub fn for_query(&self, query: &Vector) -> Result<IndexArtifact> {
        IndexArtifact::build(query, self.family.clone(), self.bucket_width)
    }

    #[inline]
    pub fn family(&self) -> &HashFamily {
        &self.family
    }

    #[inline]
    pub fn bucket_width(&self) -> Option<f64> {
        self.bucket_width
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.family.dimension()
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != ARTIFACT_VERSION {
            return Err(LshError::config_mismatch(format!(
                "hash family version {} is not supported (expected {ARTIFACT_VERSION})",
                self.version
            )));
        }
        self.family.validate()?;
        check_bucket_width(&self.family, self.bucket_width)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, self)
            .map_err(|e| LshError::internal(format!("hash family encode failed: {e}")))
    }

    /// Deserialize from a reader and validate.
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let file: HashFamilyFile = serde_json::from_reader(reader)?;
        file.validate()?;
        Ok(file)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        tracing::debug!(path = %path.display(), variant = %self.family.variant(), "saved hash family");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = Self::read_from(BufReader::new(File::open(path)?))?;
        tracing::debug!(
            path = %path.display(),
            variant = %file.family.variant(),
            signature_length = file.family.len(),
            "loaded hash family"
        );
        Ok(file)
    }
}

//! Locality-sensitive hash families and signature encoding.
//!
//! - [`HashFamilyGenerator`] draws a [`HashFamily`] from an explicit RNG.
//! - [`SignatureEncoder`] turns a vector into a [`Signature`]: bucket
//!   indices for the Euclidean variant, sign bits for the Angular one.

mod encoder;
mod family;
mod signature;

pub use encoder::{bucket_of, encode, SignatureEncoder};
pub use family::{HashFamily, HashFamilyGenerator, HashKey, HashVector, MAX_DRAWS_PER_HASH};
pub use signature::{estimated_similarity, hamming_for_similarity, BitSketch, BucketSignature, Signature};

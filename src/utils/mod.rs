//! Utility functions and types.

pub mod bits;
mod cancel;
pub(crate) mod parallel;
pub(crate) mod random;

pub use cancel::CancellationToken;
pub use parallel::{chunked_reduce, maybe_parallel_map_threshold, MIN_PARALLEL_SIZE};
pub use random::{draw_unit_vector, rng_from_seed};

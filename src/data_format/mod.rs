//! Data format types.
//!
//! Vectors, their text codecs, and the `<label><TAB><vector>` record
//! framing shared by every pipeline stage.

mod codec;
mod record;
mod vector;

pub use codec::{format_vector, parse_dense, parse_sparse, parse_vector, SPARSE_DELIMITER};
pub use record::Record;
pub use vector::Vector;

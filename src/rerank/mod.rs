//! Exact reranking (Lazy KNN).
//!
//! The exactness backstop after filtering: compute a precise distance per
//! surviving candidate and order by `(distance, ordinal)`.

mod lazy_knn;
mod reranker;
mod result;
mod top_k;

pub use lazy_knn::{KnnState, LazyKnnSearch};
pub use reranker::ExactReranker;
pub use result::RankedResult;
pub use top_k::{TopK, TopKEntry};

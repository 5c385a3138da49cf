//! Final ranked output.

use crate::types::RecordOrdinal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One neighbour, ordered by `(distance, ordinal)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    /// Exact distance to the query.
    pub distance: f64,
    /// Input order of the record, the tie-break.
    pub ordinal: RecordOrdinal,
    /// The original record line.
    pub payload: String,
    /// Estimated cosine similarity, for results ranked by angular sketch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

impl RankedResult {
    /// Create a result.
    pub fn new(distance: f64, ordinal: RecordOrdinal, payload: impl Into<String>) -> Self {
        Self {
            distance,
            ordinal,
            payload: payload.into(),
            similarity: None,
        }
    }

    /// Attach an estimated similarity.
    pub fn with_similarity(mut self, similarity: f64) -> Self {
        self.similarity = Some(similarity);
        self
    }

    /// Output line `<distance>\t<record>`.
    pub fn to_line(&self) -> String {
        format!("{}\t{}", self.distance, self.payload)
    }

    /// Output line `<distance>\t<similarity>\t<record>`, or [`to_line`]
    /// when there is no similarity.
    ///
    /// [`to_line`]: RankedResult::to_line
    pub fn to_scored_line(&self) -> String {
        match self.similarity {
            Some(similarity) => format!("{}\t{similarity}\t{}", self.distance, self.payload),
            None => self.to_line(),
        }
    }
}

impl fmt::Display for RankedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.distance, self.payload)
    }
}

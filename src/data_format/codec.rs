//! Text codecs for vectors.
//!
//! Dense vectors are comma-separated decimals. Sparse vectors are
//! `position:value` pairs separated by tabs or commas, with positions
//! counted from 1: position `p` addresses dense slot `p - 1`.
//!
//! Parsing is all-or-nothing: a single bad token rejects the whole vector.

use super::vector::Vector;
use crate::error::{LshError, Result};

/// Separator between a sparse position and its value.
pub const SPARSE_DELIMITER: char = ':';

/// Parse a comma-separated dense vector.
pub fn parse_dense(text: &str) -> Result<Vector> {
    let text = text.trim();
    if text.is_empty() {
        return Err(LshError::parse("empty dense vector"));
    }
    let values = text
        .split(',')
        .enumerate()
        .map(|(i, token)| parse_value(token).map_err(|e| prefix(e, i)))
        .collect::<Result<Vec<f64>>>()?;
    Ok(Vector::Dense(values))
}

/// Parse a sparse `position:value` vector over `dimension` dimensions.
///
/// An empty string is the all-zero vector.
pub fn parse_sparse(text: &str, dimension: usize) -> Result<Vector> {
    let mut entries = Vec::new();
    for (i, token) in text
        .split(|c| c == '\t' || c == ',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .enumerate()
    {
        let (pos, val) = token.split_once(SPARSE_DELIMITER).ok_or_else(|| {
            LshError::parse(format!("token {i} `{token}` is missing the ':' delimiter"))
        })?;
        let pos: usize = pos
            .trim()
            .parse()
            .map_err(|_| LshError::parse(format!("token {i}: position `{pos}` is not an integer")))?;
        if pos == 0 || pos > dimension {
            return Err(LshError::parse(format!(
                "token {i}: position {pos} outside 1..={dimension}"
            )));
        }
        let val = parse_value(val).map_err(|e| prefix(e, i))?;
        entries.push((pos - 1, val));
    }
    Vector::sparse(dimension, entries)
}

/// Parse either representation; any `:` selects the sparse codec.
///
/// Sparse input needs the dimensionality up front since it cannot be
/// inferred from the populated positions.
pub fn parse_vector(text: &str, dimension: Option<usize>) -> Result<Vector> {
    if text.contains(SPARSE_DELIMITER) {
        let dimension = dimension.ok_or_else(|| {
            LshError::invalid_argument("sparse vectors need an explicit dimensionality")
        })?;
        parse_sparse(text, dimension)
    } else {
        parse_dense(text)
    }
}

/// Format a vector back into its text form.
pub fn format_vector(vector: &Vector) -> String {
    match vector {
        Vector::Dense(values) => values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(","),
        Vector::Sparse { entries, .. } => entries
            .iter()
            .map(|(pos, v)| format!("{}{SPARSE_DELIMITER}{v}", pos + 1))
            .collect::<Vec<_>>()
            .join("\t"),
    }
}

fn parse_value(token: &str) -> Result<f64> {
    let token = token.trim();
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(LshError::parse(format!("`{token}` is not a finite number"))),
    }
}

fn prefix(err: LshError, token: usize) -> LshError {
    LshError::parse(format!("token {token}: {}", err.message()))
}

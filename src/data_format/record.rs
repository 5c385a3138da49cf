//! Input records.
//!
//! A record is one line `<label><TAB><vector>`. The whole line is the
//! payload carried through filtering and reranking, so a [`Record`]
//! borrows the line and only remembers where the label ends.

use super::codec;
use super::vector::Vector;
use crate::error::{LshError, Result};
use crate::types::RecordOrdinal;

/// A borrowed view of one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    ordinal: RecordOrdinal,
    line: &'a str,
    tab: usize,
}

impl<'a> Record<'a> {
    /// Split `line` at its first tab.
    pub fn parse(line: &'a str, ordinal: RecordOrdinal) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let tab = line
            .find('\t')
            .ok_or_else(|| LshError::parse("record has no TAB between label and vector"))?;
        Ok(Self { ordinal, line, tab })
    }

    /// Position of this record in its partition.
    #[inline]
    pub fn ordinal(&self) -> RecordOrdinal {
        self.ordinal
    }

    /// The label before the first tab.
    #[inline]
    pub fn label(&self) -> &'a str {
        &self.line[..self.tab]
    }

    /// The vector text after the first tab.
    #[inline]
    pub fn vector_text(&self) -> &'a str {
        &self.line[self.tab + 1..]
    }

    /// The full original line.
    #[inline]
    pub fn line(&self) -> &'a str {
        self.line
    }

    /// Decode the vector part.
    pub fn vector(&self, dimension: Option<usize>) -> Result<Vector> {
        codec::parse_vector(self.vector_text(), dimension)
    }
}

//! Newline index: byte offsets of every record boundary.
//!
//! One sequential scan yields `record_count + 1` monotonically increasing
//! offsets. `offsets[0]` sits immediately after any byte-order mark and the
//! final entry is end-of-file, so `offsets[i]` is an O(1) seek target for
//! logical record `i` and adjacent entries bound one record's bytes.

use std::path::Path;

use anyhow::{Context, Result};
use log::debug;

use crate::encoding::{EncodedReader, TextEncoding};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewlineIndex {
    offsets: Vec<u64>,
}

impl NewlineIndex {
    /// Scans `path` once, recording the position after every line terminator.
    pub fn build(path: &Path, encoding: TextEncoding) -> Result<Self> {
        let mut reader = EncodedReader::open(path, encoding)
            .with_context(|| format!("Indexing newlines in {path:?}"))?;
        let mut offsets = vec![reader.pos()];
        let mut line = String::new();
        while reader.read_line(&mut line)? {
            offsets.push(reader.pos());
        }
        debug!(
            "Indexed {} record(s) in {path:?} ({} offset entries)",
            offsets.len() - 1,
            offsets.len()
        );
        Ok(Self { offsets })
    }

    /// Number of physical records (lines) in the file.
    pub fn record_count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Start-of-record byte position for logical record `i`.
    pub fn offset(&self, i: usize) -> u64 {
        self.offsets[i]
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }
}

//! Partition type and on-disk naming
//!
//! A partition's artifacts live next to the corpus:
//! - `<data_file>.part.<start>-<end>`: the byte range slice
//! - `<data_file>.part.<start>-<end>.table.bin`: its suffix table

use crate::table::{append_to_path, TABLE_SUFFIX};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Marker between the corpus name and the byte range in slice file names
const PART_MARKER: &str = ".part.";

/// A contiguous, possibly overlapping, byte range of the corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// First byte (inclusive)
    pub start: u64,
    /// Last byte (exclusive)
    pub end: u64,
    /// Range slice written by the partition builder
    pub source_range_file: PathBuf,
    /// Suffix table written by the partition builder
    pub table_file: PathBuf,
}

impl Partition {
    /// Create the partition `[start, end)` of `data_file`
    pub fn new(data_file: &Path, start: u64, end: u64) -> Self {
        let source_range_file = slice_path(data_file, start, end);
        let table_file = append_to_path(&source_range_file, TABLE_SUFFIX);
        Self {
            start,
            end,
            source_range_file,
            table_file,
        }
    }

    /// Recover a partition from its slice file name
    ///
    /// Returns `None` unless the name ends in `.part.<start>-<end>` with
    /// `start < end`.
    pub fn from_slice_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let (corpus_name, range) = name.rsplit_once(PART_MARKER)?;
        if corpus_name.is_empty() {
            return None;
        }

        let (start, end) = range.split_once('-')?;
        let start: u64 = start.parse().ok()?;
        let end: u64 = end.parse().ok()?;
        if start >= end {
            return None;
        }

        let data_file = path.with_file_name(corpus_name);
        Some(Self::new(&data_file, start, end))
    }

    /// Length in bytes
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Human-readable range, e.g. `100000-300000`
    pub fn label(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

/// Path of the range slice for `[start, end)` of `data_file`
pub fn slice_path(data_file: &Path, start: u64, end: u64) -> PathBuf {
    append_to_path(data_file, &format!("{PART_MARKER}{start}-{end}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_paths() {
        let p = Partition::new(Path::new("/data/corpus.bin"), 100, 300);
        assert_eq!(
            p.source_range_file,
            PathBuf::from("/data/corpus.bin.part.100-300")
        );
        assert_eq!(
            p.table_file,
            PathBuf::from("/data/corpus.bin.part.100-300.table.bin")
        );
        assert_eq!(p.len(), 200);
        assert_eq!(p.label(), "100-300");
    }

    #[test]
    fn test_from_slice_path() {
        let original = Partition::new(Path::new("/data/corpus.bin"), 0, 200_000);
        let parsed = Partition::from_slice_path(&original.source_range_file).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_from_slice_path_uses_last_marker() {
        // Corpus names may themselves contain ".part."
        let original = Partition::new(Path::new("/d/x.part.1-2"), 5, 9);
        let parsed = Partition::from_slice_path(&original.source_range_file).unwrap();
        assert_eq!(parsed.start, 5);
        assert_eq!(parsed.end, 9);
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_from_slice_path_rejects_garbage() {
        assert!(Partition::from_slice_path(Path::new("/d/corpus.bin")).is_none());
        assert!(Partition::from_slice_path(Path::new("/d/corpus.part.a-b")).is_none());
        assert!(Partition::from_slice_path(Path::new("/d/corpus.part.9-9")).is_none());
        assert!(Partition::from_slice_path(Path::new("/d/corpus.part.10-")).is_none());
        assert!(Partition::from_slice_path(Path::new("/d/.part.0-10")).is_none());
    }
}

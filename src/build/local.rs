//! In-process partition builder
//!
//! Builds one partition by:
//! 1. Copying the byte range out of the memory-mapped corpus into its slice file
//! 2. Sorting all suffix positions of the slice with divsufsort
//! 3. Writing the sorted positions as a fixed-width table
//!
//! Positions are local to the slice; the merger adds the partition offset.

use super::{BuildError, PartitionBuilder};
use crate::partition::Partition;
use crate::table::{index_width, TableWriter, TextPosition};
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Longest slice divsufsort can index (its positions are `i32`)
pub const MAX_PARTITION_LEN: usize = i32::MAX as usize;

/// Tables longer than this are widened to `TextPosition` with rayon
const PARALLEL_WIDEN_THRESHOLD: usize = 1 << 20;

/// Partition builder running in the coordinator process
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalPartitionBuilder;

impl LocalPartitionBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl PartitionBuilder for LocalPartitionBuilder {
    fn build(&self, data_file: &Path, partition: &Partition) -> Result<PathBuf, BuildError> {
        make_part(data_file, partition.start, partition.end)
    }
}

/// Build the slice and table for `[start, end)` of `data_file`
///
/// Output paths follow [`Partition::new`]. Existing files are overwritten, so
/// rebuilding a range produces byte-identical output.
pub fn make_part(data_file: &Path, start: u64, end: u64) -> Result<PathBuf, BuildError> {
    let file = File::open(data_file)?;
    let data_size = file.metadata()?.len();

    if start >= end || end > data_size {
        return Err(BuildError::Range {
            start,
            end,
            data_size,
        });
    }

    let partition = Partition::new(data_file, start, end);

    // Non-empty range checked above, so the map is never zero-length
    let mmap = unsafe { Mmap::map(&file)? };
    let text = &mmap[start as usize..end as usize];

    fs::write(&partition.source_range_file, text)?;

    let suffix_array = build_suffix_array(text)?;

    let mut writer = TableWriter::create(&partition.table_file, index_width(text.len() as u64))?;
    for &position in &suffix_array {
        writer.push(position)?;
    }
    writer.finish()?;

    log::debug!(
        "built partition {} ({} suffixes) -> {}",
        partition.label(),
        suffix_array.len(),
        partition.table_file.display()
    );

    Ok(partition.table_file)
}

/// Sort every suffix position of `text`
///
/// Uses divsufsort, so repetitive text costs no more than random text.
/// Fails for texts longer than [`MAX_PARTITION_LEN`].
pub fn build_suffix_array(text: &[u8]) -> Result<Vec<TextPosition>, BuildError> {
    let n = text.len();
    if n > MAX_PARTITION_LEN {
        return Err(BuildError::TooLarge {
            len: n as u64,
            max: MAX_PARTITION_LEN as u64,
        });
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut sa = vec![0i32; n];
    divsufsort::sort_in_place(text, &mut sa);

    let positions = if n > PARALLEL_WIDEN_THRESHOLD {
        sa.par_iter().map(|&p| p as TextPosition).collect()
    } else {
        sa.iter().map(|&p| p as TextPosition).collect()
    };
    Ok(positions)
}

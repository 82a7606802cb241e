//! In-process k-way merge
//!
//! Every partition's slice and table are memory-mapped. Each partition owns
//! the suffixes starting in `[start, next.start)` (the last one owns up to its
//! end); entries in the overlap tail are skipped because the following
//! partition owns them. Overlap bytes still serve as comparison context.
//!
//! For `threads > 1` the key space is cut at pivot suffixes sampled from the
//! largest table. Every table is split at the pivots by binary search, and each
//! segment is merged in parallel into its own `<output>.<k>` file next to the
//! output. The segment files are then joined in pivot order. Nothing but the
//! heap cursors is held in memory.

use super::{MergeError, Merger};
use crate::partition::Partition;
use crate::table::{append_to_path, index_width, TableReader, TableWriter};
use memmap2::Mmap;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// In-process merger
#[derive(Debug, Default, Clone, Copy)]
pub struct KWayMerger;

impl KWayMerger {
    pub fn new() -> Self {
        Self
    }
}

impl Merger for KWayMerger {
    fn merge(
        &self,
        partitions: &[Partition],
        output: &Path,
        threads: usize,
    ) -> Result<(), MergeError> {
        let owned = ownership(partitions)?;
        let data_size = partitions.last().map(|p| p.end).unwrap_or(0);
        let width = index_width(data_size);

        let sources = partitions
            .iter()
            .zip(owned)
            .map(|(partition, owned)| Source::open(partition, owned))
            .collect::<Result<Vec<_>, _>>()?;

        let segments = split_points(&sources, threads.max(1));
        log::debug!(
            "merging {} tables in {} segments, width {}",
            sources.len(),
            segments.len(),
            width
        );

        if segments.len() == 1 {
            let written = merge_segment(&sources, &segments[0], width, output)?;
            return check_count(written, data_size);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()
            .map_err(|e| MergeError::Input(format!("failed to start merge pool: {e}")))?;

        let segment_files: Vec<PathBuf> = (0..segments.len())
            .map(|k| segment_path(output, k))
            .collect();

        let written: io::Result<u64> = pool.install(|| {
            segments
                .par_iter()
                .zip(&segment_files)
                .map(|(ranges, path)| merge_segment(&sources, ranges, width, path))
                .collect::<Vec<_>>()
                .into_iter()
                .sum()
        });
        let outcome = written.and_then(|written| {
            join_segments(&segment_files, output)?;
            Ok(written)
        });

        // join_segments consumes the files it appends; anything left is from a failure
        for path in &segment_files {
            if path.exists() {
                let _ = fs::remove_file(path);
            }
        }

        check_count(outcome?, data_size)
    }
}

fn check_count(written: u64, data_size: u64) -> Result<(), MergeError> {
    if written != data_size {
        return Err(MergeError::Input(format!(
            "merged {} suffixes for a corpus of {} bytes",
            written, data_size
        )));
    }
    Ok(())
}

/// Scratch file for segment `k`, next to the output: `<output>.<k>`
fn segment_path(output: &Path, k: usize) -> PathBuf {
    append_to_path(output, &format!(".{k}"))
}

/// Concatenate segment files into `output` in order, removing each one
///
/// The first segment becomes the output by rename; the rest are appended.
fn join_segments(segment_files: &[PathBuf], output: &Path) -> io::Result<()> {
    let Some((first, rest)) = segment_files.split_first() else {
        return Ok(());
    };
    fs::rename(first, output)?;

    let mut out = BufWriter::new(OpenOptions::new().append(true).open(output)?);
    for path in rest {
        io::copy(&mut File::open(path)?, &mut out)?;
        fs::remove_file(path)?;
    }
    out.flush()
}

/// Merge the partitions named by their slice paths, in the given order
///
/// Offsets are recovered from the `.part.<start>-<end>` file names.
pub fn merge_slices(output: &Path, slices: &[PathBuf], threads: usize) -> Result<(), MergeError> {
    let partitions = slices
        .iter()
        .map(|path| {
            Partition::from_slice_path(path).ok_or_else(|| {
                MergeError::Input(format!("not a partition slice name: {}", path.display()))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    KWayMerger.merge(&partitions, output, threads)
}

/// Number of leading local positions each partition owns
///
/// Requires the partitions to start at 0, ascend strictly and leave no gaps.
fn ownership(partitions: &[Partition]) -> Result<Vec<u64>, MergeError> {
    let first = partitions
        .first()
        .ok_or_else(|| MergeError::Input("no partitions to merge".into()))?;
    if first.start != 0 {
        return Err(MergeError::Input(format!(
            "first partition starts at {}, not 0",
            first.start
        )));
    }

    let mut owned = Vec::with_capacity(partitions.len());
    for pair in partitions.windows(2) {
        let (current, next) = (&pair[0], &pair[1]);
        if next.start <= current.start {
            return Err(MergeError::Input(format!(
                "partitions out of order: {} before {}",
                current.label(),
                next.label()
            )));
        }
        if next.start > current.end {
            return Err(MergeError::Input(format!(
                "gap between partitions {} and {}",
                current.label(),
                next.label()
            )));
        }
        owned.push(next.start - current.start);
    }
    owned.push(partitions[partitions.len() - 1].len());

    Ok(owned)
}

/// One memory-mapped partition
struct Source {
    text: Mmap,
    table: TableReader,
    start: u64,
    owned: u64,
}

impl Source {
    fn open(partition: &Partition, owned: u64) -> Result<Self, MergeError> {
        let file = File::open(&partition.source_range_file)?;
        let len = file.metadata()?.len();
        if len != partition.len() {
            return Err(MergeError::Input(format!(
                "slice {} has {} bytes, expected {}",
                partition.source_range_file.display(),
                len,
                partition.len()
            )));
        }

        let text = unsafe { Mmap::map(&file)? };
        let table = TableReader::open(&partition.table_file, len)?;

        Ok(Self {
            text,
            table,
            start: partition.start,
            owned,
        })
    }

    #[inline]
    fn suffix(&self, entry: usize) -> &[u8] {
        self.text.get(self.table.get(entry) as usize..).unwrap_or(&[])
    }

    #[inline]
    fn owns(&self, entry: usize) -> bool {
        self.table.get(entry) < self.owned
    }

    /// First entry whose suffix is not less than `pivot`
    fn lower_bound(&self, pivot: &[u8]) -> usize {
        let mut lo = 0;
        let mut hi = self.table.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.suffix(mid) < pivot {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }
}

/// Per-segment entry ranges, one `(lo, hi)` per source
fn split_points(sources: &[Source], threads: usize) -> Vec<Vec<(usize, usize)>> {
    let whole = || sources.iter().map(|s| (0, s.table.len())).collect::<Vec<_>>();

    let reference = match sources.iter().max_by_key(|s| s.table.len()) {
        Some(source) if threads > 1 && source.table.len() >= threads => source,
        _ => return vec![whole()],
    };

    let step = reference.table.len() / threads;
    let pivots: Vec<&[u8]> = (1..threads).map(|k| reference.suffix(k * step)).collect();

    // bounds[s] = [0, cut_1, ..., cut_{threads-1}, len], kept non-decreasing
    let bounds: Vec<Vec<usize>> = sources
        .iter()
        .map(|source| {
            let mut cuts = Vec::with_capacity(threads + 1);
            cuts.push(0);
            for pivot in &pivots {
                let cut = source.lower_bound(pivot).max(cuts[cuts.len() - 1]);
                cuts.push(cut);
            }
            cuts.push(source.table.len());
            cuts
        })
        .collect();

    (0..threads)
        .map(|k| bounds.iter().map(|cuts| (cuts[k], cuts[k + 1])).collect())
        .collect()
}

/// Heap cursor over one source's entry range
struct Cursor<'a> {
    suffix: &'a [u8],
    source: usize,
    entry: usize,
    end: usize,
}

impl<'a> Cursor<'a> {
    fn new(sources: &'a [Source], source: usize, lo: usize, hi: usize) -> Option<Self> {
        let mut cursor = Cursor {
            suffix: &[],
            source,
            entry: lo,
            end: hi,
        };
        cursor.seek(&sources[source]).then_some(cursor)
    }

    /// Move to the first owned entry at or after the current one
    fn seek(&mut self, source: &'a Source) -> bool {
        while self.entry < self.end {
            if source.owns(self.entry) {
                self.suffix = source.suffix(self.entry);
                return true;
            }
            self.entry += 1;
        }
        false
    }

    fn advance(&mut self, source: &'a Source) -> bool {
        self.entry += 1;
        self.seek(source)
    }
}

// Reversed so that BinaryHeap pops the smallest suffix; ties go to the
// earlier partition
impl Ord for Cursor<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .suffix
            .cmp(self.suffix)
            .then_with(|| other.source.cmp(&self.source))
    }
}

impl PartialOrd for Cursor<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Cursor<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cursor<'_> {}

/// Merge one key range of every source into a table file at `path`
fn merge_segment(
    sources: &[Source],
    ranges: &[(usize, usize)],
    width: usize,
    path: &Path,
) -> io::Result<u64> {
    let mut writer = TableWriter::create(path, width)?;
    let mut heap = BinaryHeap::with_capacity(sources.len());

    for (source, &(lo, hi)) in ranges.iter().enumerate() {
        if let Some(cursor) = Cursor::new(sources, source, lo, hi) {
            heap.push(cursor);
        }
    }

    while let Some(mut cursor) = heap.pop() {
        let source = &sources[cursor.source];
        writer.push(source.start + source.table.get(cursor.entry))?;
        if cursor.advance(source) {
            heap.push(cursor);
        }
    }

    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{build_suffix_array, make_part};
    use crate::partition::PartitionPlan;
    use crate::table::TableReader;
    use std::fs;
    use tempfile::tempdir;

    fn random_bytes(len: usize, mut seed: u64) -> Vec<u8> {
        (0..len)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                (seed >> 24) as u8
            })
            .collect()
    }

    /// Write a corpus, build all its partitions, return them in order
    fn build_parts(dir: &Path, data: &[u8], jobs: usize, overlap: u64) -> Vec<Partition> {
        let corpus = dir.join("corpus.bin");
        fs::write(&corpus, data).unwrap();
        let parts = PartitionPlan::new(data.len() as u64, jobs, overlap).partitions(&corpus);
        for part in &parts {
            make_part(&corpus, part.start, part.end).unwrap();
        }
        parts
    }

    fn read_table(path: &Path, len: u64) -> Vec<u64> {
        let reader = TableReader::open(path, len).unwrap();
        (0..reader.len()).map(|i| reader.get(i)).collect()
    }

    #[test]
    fn test_merge_matches_full_suffix_array() {
        let dir = tempdir().unwrap();
        let data = random_bytes(3000, 0x9E37_79B9_7F4A_7C15);
        let parts = build_parts(dir.path(), &data, 3, 32);
        let output = dir.path().join("out.table.bin");

        KWayMerger.merge(&parts, &output, 1).unwrap();

        assert_eq!(fs::metadata(&output).unwrap().len(), 3000 * 2);
        assert_eq!(read_table(&output, 3000), build_suffix_array(&data).unwrap());
    }

    #[test]
    fn test_parallel_merge_matches_sequential() {
        let dir = tempdir().unwrap();
        let data = random_bytes(20_000, 42);
        let parts = build_parts(dir.path(), &data, 5, 64);

        let sequential = dir.path().join("seq.table.bin");
        let parallel = dir.path().join("par.table.bin");
        KWayMerger.merge(&parts, &sequential, 1).unwrap();
        KWayMerger.merge(&parts, &parallel, 4).unwrap();

        assert_eq!(fs::read(&sequential).unwrap(), fs::read(&parallel).unwrap());
        assert_eq!(read_table(&parallel, 20_000), build_suffix_array(&data).unwrap());
    }

    #[test]
    fn test_parallel_merge_leaves_only_output() {
        let dir = tempdir().unwrap();
        let data = random_bytes(12_000, 5);
        let parts = build_parts(dir.path(), &data, 4, 48);

        let scratch = dir.path().join("scratch");
        fs::create_dir(&scratch).unwrap();
        let output = scratch.join("out.table.bin");
        KWayMerger.merge(&parts, &output, 4).unwrap();

        let names: Vec<String> = fs::read_dir(&scratch)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["out.table.bin"]);
        assert_eq!(read_table(&output, 12_000), build_suffix_array(&data).unwrap());
    }

    #[test]
    fn test_join_segments_in_order() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.table.bin");
        let segments: Vec<PathBuf> = (0..3).map(|k| segment_path(&output, k)).collect();
        for (k, path) in segments.iter().enumerate() {
            fs::write(path, vec![k as u8; k + 1]).unwrap();
        }

        join_segments(&segments, &output).unwrap();

        assert_eq!(fs::read(&output).unwrap(), vec![0, 1, 1, 2, 2, 2]);
        assert!(segments.iter().all(|p| !p.exists()));
        assert_eq!(segments[2], dir.path().join("out.table.bin.2"));
    }

    #[test]
    fn test_overlap_suffixes_emitted_once() {
        let dir = tempdir().unwrap();
        let data = b"mississippi river banks".repeat(10);
        let parts = build_parts(dir.path(), &data, 4, 50);
        let output = dir.path().join("out.table.bin");

        KWayMerger.merge(&parts, &output, 2).unwrap();

        let mut positions = read_table(&output, data.len() as u64);
        positions.sort_unstable();
        let expected: Vec<u64> = (0..data.len() as u64).collect();
        assert_eq!(positions, expected);
    }

    #[test]
    fn test_single_partition() {
        let dir = tempdir().unwrap();
        let parts = build_parts(dir.path(), b"banana", 1, 0);
        let output = dir.path().join("out.table.bin");

        KWayMerger.merge(&parts, &output, 8).unwrap();
        assert_eq!(read_table(&output, 6), vec![5, 3, 1, 0, 4, 2]);
    }

    #[test]
    fn test_rejects_misordered_input() {
        let dir = tempdir().unwrap();
        let data = random_bytes(1000, 7);
        let mut parts = build_parts(dir.path(), &data, 4, 10);
        parts.swap(1, 2);

        let err = KWayMerger
            .merge(&parts, &dir.path().join("out.table.bin"), 1)
            .unwrap_err();
        assert!(matches!(err, MergeError::Input(_)));
    }

    #[test]
    fn test_rejects_missing_table() {
        let dir = tempdir().unwrap();
        let data = random_bytes(1000, 7);
        let parts = build_parts(dir.path(), &data, 2, 10);
        fs::remove_file(&parts[1].table_file).unwrap();

        let err = KWayMerger
            .merge(&parts, &dir.path().join("out.table.bin"), 1)
            .unwrap_err();
        assert!(matches!(err, MergeError::Io(_)));
    }

    #[test]
    fn test_ownership() {
        let corpus = Path::new("/d/c");
        let parts = vec![
            Partition::new(corpus, 0, 60),
            Partition::new(corpus, 50, 110),
            Partition::new(corpus, 100, 153),
        ];
        assert_eq!(ownership(&parts).unwrap(), vec![50, 50, 53]);

        let gap = vec![Partition::new(corpus, 0, 40), Partition::new(corpus, 50, 90)];
        assert!(ownership(&gap).is_err());

        let offset = vec![Partition::new(corpus, 10, 40)];
        assert!(ownership(&offset).is_err());

        assert!(ownership(&[]).is_err());
    }

    #[test]
    fn test_merge_slices_parses_offsets() {
        let dir = tempdir().unwrap();
        let data = random_bytes(2000, 99);
        let parts = build_parts(dir.path(), &data, 4, 40);
        let slices: Vec<PathBuf> = parts.iter().map(|p| p.source_range_file.clone()).collect();
        let output = dir.path().join("out.table.bin");

        merge_slices(&output, &slices, 2).unwrap();
        assert_eq!(read_table(&output, 2000), build_suffix_array(&data).unwrap());
    }

    #[test]
    fn test_merge_slices_rejects_bad_name() {
        let dir = tempdir().unwrap();
        let err = merge_slices(
            &dir.path().join("out.table.bin"),
            &[dir.path().join("corpus.bin")],
            1,
        )
        .unwrap_err();
        assert!(matches!(err, MergeError::Input(_)));
    }
}

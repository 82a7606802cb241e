//! Suffix table encoding
//!
//! A suffix table is a flat array of little-endian unsigned integers, one per
//! suffix, each `index_width` bytes wide. There is no header: the width is a
//! function of the text length, so a table for a text of `n` bytes is always
//! exactly `n * index_width(n)` bytes long. The finalizer relies on this when it
//! checks `len(table) % data_size == 0`.
//!
//! The width rule is versioned by [`TABLE_FORMAT_VERSION`] and recorded in the
//! `<table>.meta.json` sidecar next to every published table.

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Position of a suffix in its text
pub type TextPosition = u64;

/// Current table format version
pub const TABLE_FORMAT_VERSION: u32 = 1;

/// Suffix appended to a range slice (or corpus) path to name its table
pub const TABLE_SUFFIX: &str = ".table.bin";

/// Suffix appended to a published table path to name its metadata sidecar
pub const META_SUFFIX: &str = ".meta.json";

/// Widest supported index (a full u64)
pub const MAX_INDEX_WIDTH: usize = 8;

/// Number of bytes needed to store any position of a text of `text_len` bytes
///
/// This is the smallest width that can hold `text_len - 1`, never less than 1.
pub fn index_width(text_len: u64) -> usize {
    let max_position = text_len.saturating_sub(1);
    let bits = (u64::BITS - max_position.leading_zeros()) as usize;
    bits.div_ceil(8).max(1)
}

/// Append a literal suffix to a path without touching its extension
pub fn append_to_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Buffered writer for fixed-width tables
pub struct TableWriter<W: Write> {
    inner: BufWriter<W>,
    width: usize,
    buffer: Vec<u8>,
    count: u64,
}

impl TableWriter<File> {
    /// Create (or truncate) a table file
    pub fn create(path: &Path, width: usize) -> io::Result<Self> {
        Ok(Self::new(File::create(path)?, width))
    }
}

impl<W: Write> TableWriter<W> {
    const FLUSH_AT: usize = 64 * 1024;

    pub fn new(inner: W, width: usize) -> Self {
        assert!(
            (1..=MAX_INDEX_WIDTH).contains(&width),
            "index width must be 1..=8, got {width}"
        );
        Self {
            inner: BufWriter::with_capacity(Self::FLUSH_AT, inner),
            width,
            buffer: Vec::with_capacity(Self::FLUSH_AT),
            count: 0,
        }
    }

    /// Append one position
    pub fn push(&mut self, position: TextPosition) -> io::Result<()> {
        encode_into(&mut self.buffer, position, self.width);
        self.count += 1;
        if self.buffer.len() >= Self::FLUSH_AT {
            self.inner.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        Ok(())
    }

    /// Flush everything and return the number of entries written
    pub fn finish(mut self) -> io::Result<u64> {
        if !self.buffer.is_empty() {
            self.inner.write_all(&self.buffer)?;
        }
        self.inner.flush()?;
        Ok(self.count)
    }
}

/// Encode a position as `width` little-endian bytes
#[inline]
fn encode_into(buffer: &mut Vec<u8>, position: TextPosition, width: usize) {
    buffer.extend_from_slice(&position.to_le_bytes()[..width]);
}

/// Memory-mapped, read-only view of a table
pub struct TableReader {
    mmap: Mmap,
    width: usize,
    len: usize,
}

impl TableReader {
    /// Open the table of a text that is `text_len` bytes long
    ///
    /// Fails with `InvalidData` when the table size is not a whole multiple of
    /// the text length or implies an unsupported width.
    pub fn open(path: &Path, text_len: u64) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();

        if text_len == 0 || size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("empty table or text for '{}'", path.display()),
            ));
        }
        if size % text_len != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "table '{}' has {} bytes, not a multiple of text length {}",
                    path.display(),
                    size,
                    text_len
                ),
            ));
        }

        let width = (size / text_len) as usize;
        if width > MAX_INDEX_WIDTH {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("table '{}' implies unsupported width {}", path.display(), width),
            ));
        }

        let mmap = unsafe { Mmap::map(&file)? };

        Ok(Self {
            mmap,
            width,
            len: text_len as usize,
        })
    }

    /// Position stored at entry `i`
    #[inline]
    pub fn get(&self, i: usize) -> TextPosition {
        let offset = i * self.width;
        let mut bytes = [0u8; 8];
        bytes[..self.width].copy_from_slice(&self.mmap[offset..offset + self.width]);
        u64::from_le_bytes(bytes)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

/// Metadata sidecar written next to a published table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    /// Table format version (width rule and byte order)
    pub format_version: u32,
    /// Bytes per suffix index
    pub index_width: usize,
    /// Corpus length in bytes
    pub data_size: u64,
    /// Number of suffixes in the table
    pub suffix_count: u64,
    /// Number of partitions merged into the table
    pub partitions: usize,
    /// Seconds since the Unix epoch
    pub created_at: u64,
}

impl TableMeta {
    pub fn new(index_width: usize, data_size: u64, partitions: usize) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            format_version: TABLE_FORMAT_VERSION,
            index_width,
            data_size,
            suffix_count: data_size,
            partitions,
            created_at,
        }
    }

    /// Path of the sidecar for a table
    pub fn sidecar_path(table: &Path) -> PathBuf {
        append_to_path(table, META_SUFFIX)
    }

    /// Write the sidecar for `table`
    pub fn write(&self, table: &Path) -> io::Result<PathBuf> {
        let path = Self::sidecar_path(table);
        self.write_to(File::create(&path)?)?;
        Ok(path)
    }

    /// Serialize as pretty JSON into `writer`, flushing before returning
    pub fn write_to<W: Write>(&self, writer: W) -> io::Result<()> {
        let mut out = BufWriter::new(writer);
        serde_json::to_writer_pretty(&mut out, self)?;
        out.flush()
    }

    /// Read the sidecar of `table`
    pub fn read(table: &Path) -> io::Result<Self> {
        let file = File::open(Self::sidecar_path(table))?;
        Ok(serde_json::from_reader(file)?)
    }
}

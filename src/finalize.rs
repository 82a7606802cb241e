//! Publishing the merged table
//!
//! The scratch table is checked first, so a table with an inconsistent size
//! never appears under the final name: it is moved to `<output>.invalid`
//! instead. A valid table is renamed into place and checked again at its
//! final path. A file that fails the second check stays where it is and the
//! run fails.

use crate::error::PipelineError;
use crate::table::{append_to_path, MAX_INDEX_WIDTH};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Suffix for tables that failed validation
pub const INVALID_SUFFIX: &str = ".invalid";

/// Size rules a published table must satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCheck {
    pub data_size: u64,
    /// Required index width, if one was configured
    pub index_width: Option<usize>,
}

impl TableCheck {
    pub fn new(data_size: u64, index_width: Option<usize>) -> Self {
        Self {
            data_size,
            index_width,
        }
    }

    /// Validate the table at `path`, returning its index width
    pub fn check(&self, path: &Path) -> Result<usize, String> {
        let size = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return Err("not a regular file".into()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err("file does not exist".into());
            }
            Err(e) => return Err(format!("cannot stat: {e}")),
        };

        if self.data_size == 0 {
            return Err("corpus size is zero".into());
        }
        if size == 0 || size % self.data_size != 0 {
            return Err(format!(
                "size {} is not a positive multiple of the corpus size {}",
                size, self.data_size
            ));
        }

        let width = (size / self.data_size) as usize;
        if width > MAX_INDEX_WIDTH {
            return Err(format!("implied index width {width} exceeds {MAX_INDEX_WIDTH} bytes"));
        }
        if let Some(expected) = self.index_width {
            if width != expected {
                return Err(format!(
                    "index width is {width} bytes, expected {expected}"
                ));
            }
        }

        Ok(width)
    }
}

/// Where a table that failed validation is left
pub fn invalid_path(output: &Path) -> PathBuf {
    append_to_path(output, INVALID_SUFFIX)
}

/// Validate `scratch`, move it to `output`, and validate it there
///
/// Returns the index width of the published table.
pub fn finalize(scratch: &Path, output: &Path, check: &TableCheck) -> Result<usize, PipelineError> {
    if let Err(reason) = check.check(scratch) {
        let flagged = if scratch.exists() {
            let flagged = invalid_path(output);
            publish(scratch, &flagged).map_err(PipelineError::io(&flagged, "flag invalid table"))?;
            log::error!("invalid merged table kept at {}", flagged.display());
            flagged
        } else {
            scratch.to_path_buf()
        };
        return Err(PipelineError::FinalValidation {
            path: flagged,
            reason,
        });
    }

    publish(scratch, output).map_err(PipelineError::io(output, "publish table"))?;

    check
        .check(output)
        .map_err(|reason| PipelineError::FinalValidation {
            path: output.to_path_buf(),
            reason,
        })
}

/// Move `from` to `to`, atomically when both are on the same filesystem
///
/// Across devices the file is copied into a temporary file beside `to`, which
/// is then renamed over `to`.
pub fn publish(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            let parent = match to.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };
            let mut staged = tempfile::NamedTempFile::new_in(parent)?;
            io::copy(&mut fs::File::open(from)?, staged.as_file_mut())?;
            staged.as_file().sync_all()?;
            staged.persist(to).map_err(|e| e.error)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(_err: &io::Error) -> bool {
    false
}

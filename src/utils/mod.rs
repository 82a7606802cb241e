//! Shared helpers.
//!
//! - [`app_data`] - Application data directory and config file location
//! - [`progress`] - Wave progress bars (optional `progress` feature)

pub mod app_data;
pub mod progress;

pub use app_data::*;

/// Number of hardware threads, falling back to 4 when unknown
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Resolve a thread count where 0 means "all hardware threads"
pub fn resolve_threads(requested: usize) -> usize {
    if requested == 0 {
        num_cpus()
    } else {
        requested
    }
}

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Map `-q` / `-v` flags to a log level
///
/// Quiet shows only warnings and errors; otherwise phase narration (info) is
/// shown, and each `-v` adds one level of detail.
pub fn level_for(verbose: u8, quiet: bool) -> log::LevelFilter {
    if quiet {
        return log::LevelFilter::Warn;
    }
    match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

/// Initialize the logger with elapsed-time formatting.
///
/// Output format: [HH:MM:SS] LEVEL: message, written to stderr.
/// `RUST_LOG` is honoured for per-module filters.
pub fn init_logger(level: log::LevelFilter) {
    START_TIME.set(Instant::now()).ok();

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            let elapsed = START_TIME.get().map(|t| t.elapsed()).unwrap_or_default();
            let secs = elapsed.as_secs();

            writeln!(
                buf,
                "[{:02}:{:02}:{:02}] {}: {}",
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60,
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for() {
        assert_eq!(level_for(0, false), log::LevelFilter::Info);
        assert_eq!(level_for(1, false), log::LevelFilter::Debug);
        assert_eq!(level_for(5, false), log::LevelFilter::Trace);
        assert_eq!(level_for(2, true), log::LevelFilter::Warn);
    }
}

//! Structured logging with `tracing`.
//!
//! Log context (session ID, phase, block hashes) is attached as structured
//! fields at call sites; this module only wires up the subscriber. Two
//! flavors: stderr for interactive use, or an append-mode session log file.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with stderr output only.
///
/// Call once at application startup. Subsequent calls are no-ops.
///
/// # Arguments
///
/// * `level` - Minimum log level to display when `RUST_LOG` is unset.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // set_global_default is a no-op if already set
    let _ = subscriber.try_init();
}

/// Initialize the global tracing subscriber writing to a session log file.
///
/// The file is opened in append mode so successive sessions extend the same
/// log. ANSI codes are disabled. Call once at application startup; subsequent
/// calls are no-ops.
///
/// # Arguments
///
/// * `level` - Minimum log level to persist when `RUST_LOG` is unset.
/// * `path` - Log file location, e.g. `<state dir>/strata.log`.
pub fn init_file_subscriber(level: &str, path: &Path) -> std::io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(Arc::new(file))
        .compact();

    let _ = subscriber.try_init();
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_does_not_panic() {
        // Multiple calls should be safe (no-op after first)
        init_subscriber("warn");
        init_subscriber("debug");
    }

    #[test]
    fn init_file_subscriber_creates_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.log");
        init_file_subscriber("info", &path).unwrap();
        assert!(path.exists());
    }
}

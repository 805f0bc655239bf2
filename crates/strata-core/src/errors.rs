//! Engine error types.
//!
//! `EngineError` is reserved for faults the engine cannot absorb locally,
//! which in practice means durable-state reads and writes. Operational
//! conditions (empty input, trigger not exceeded, deferral, missing
//! compression capability, cooperative interruption) are cancellation
//! outcomes of a compaction round, not errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the engine's durable-state paths.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failed to read or write a state file.
    #[error("state file {path}: {source}")]
    Io {
        /// Path of the file being read or written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Failed to encode or decode persisted JSON.
    #[error("state serialization: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Wrap an I/O error with the path it occurred on.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display_includes_path() {
        let err = EngineError::io(
            "/tmp/cache.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        let text = err.to_string();
        assert!(text.contains("/tmp/cache.json"));
        assert!(text.contains("not found"));
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: EngineError = json_err.into();
        assert!(matches!(err, EngineError::Json(_)));
        assert!(err.to_string().contains("state serialization"));
    }
}

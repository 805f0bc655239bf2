//! Durable state under the engine's state directory.
//!
//! Layout:
//!
//! ```text
//! <state dir>/
//!   cache.json               compression cache, shared across sessions
//!   history-<session>.json   compaction ledger, one per session
//!   usage-stats.json         cumulative provider-call counters
//!   archive/raw/             verbatim block snapshots, named by hash
//!   archive/evicted/         evicted history entries, named by date+hash
//! ```
//!
//! JSON files are replaced atomically (write temp, rename); a reader never
//! sees a half-written file. Missing or corrupt files load as empty state so
//! the engine self-heals instead of refusing to start.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use strata_core::{EngineError, EngineResult, SessionId, content_hash};

use crate::cache::CompressionCache;
use crate::history::{CompactionHistory, HistoryEntry};

const CACHE_FILE: &str = "cache.json";
const USAGE_FILE: &str = "usage-stats.json";

// ─────────────────────────────────────────────────────────────────────────────
// Usage stats
// ─────────────────────────────────────────────────────────────────────────────

/// Cumulative provider-call counters, persisted across sessions.
///
/// Counters are grouped per model role; compression is the only role this
/// engine drives, but the file shape leaves room for siblings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageStats {
    /// Counters for the compression model.
    pub compression: ModelUsage,
}

/// Call and token counters for one model role.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelUsage {
    /// Number of provider calls made.
    pub calls: u64,
    /// Estimated tokens sent to the model.
    pub input_tokens: u64,
    /// Estimated tokens received from the model.
    pub output_tokens: u64,
}

impl UsageStats {
    /// Record one compression call.
    pub fn record_call(&mut self, input_tokens: u64, output_tokens: u64) {
        self.compression.calls += 1;
        self.compression.input_tokens += input_tokens;
        self.compression.output_tokens += output_tokens;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// Filesystem-backed state store for one engine instance.
#[derive(Debug)]
pub struct StateStore {
    root: PathBuf,
    session: SessionId,
}

impl StateStore {
    /// Open a store rooted at `root`, creating the directory tree.
    pub fn open(root: impl Into<PathBuf>, session: SessionId) -> EngineResult<Self> {
        let root = root.into();
        for dir in [
            root.clone(),
            root.join("archive").join("raw"),
            root.join("archive").join("evicted"),
        ] {
            fs::create_dir_all(&dir).map_err(|e| EngineError::io(dir.as_path(), e))?;
        }
        Ok(Self { root, session })
    }

    /// Root directory of this store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_path(&self) -> PathBuf {
        self.root.join(CACHE_FILE)
    }

    fn history_path(&self) -> PathBuf {
        self.root.join(format!("history-{}.json", self.session))
    }

    fn usage_path(&self) -> PathBuf {
        self.root.join(USAGE_FILE)
    }

    fn raw_archive_path(&self, hash: &str) -> PathBuf {
        self.root.join("archive").join("raw").join(format!("{hash}.txt"))
    }

    // ── loads ────────────────────────────────────────────────────────────

    /// Load the compression cache, treating absence or corruption as empty.
    #[must_use]
    pub fn load_cache(&self) -> CompressionCache {
        read_json_or_default(&self.cache_path())
    }

    /// Load this session's compaction history.
    #[must_use]
    pub fn load_history(&self) -> CompactionHistory {
        read_json_or_default(&self.history_path())
    }

    /// Load the cumulative usage counters.
    #[must_use]
    pub fn load_usage(&self) -> UsageStats {
        read_json_or_default(&self.usage_path())
    }

    // ── saves ────────────────────────────────────────────────────────────

    /// Persist the compression cache.
    pub fn save_cache(&self, cache: &CompressionCache) -> EngineResult<()> {
        write_atomic(&self.cache_path(), cache)
    }

    /// Persist this session's compaction history.
    pub fn save_history(&self, history: &CompactionHistory) -> EngineResult<()> {
        write_atomic(&self.history_path(), history)
    }

    /// Persist the cumulative usage counters.
    pub fn save_usage(&self, usage: &UsageStats) -> EngineResult<()> {
        write_atomic(&self.usage_path(), usage)
    }

    // ── archives ─────────────────────────────────────────────────────────

    /// Write a verbatim block snapshot named by its content hash.
    ///
    /// Idempotent: a file that already exists is left untouched, so archiving
    /// the same block on every turn costs one `exists` check.
    pub fn archive_raw(&self, hash: &str, text: &str) -> EngineResult<()> {
        let path = self.raw_archive_path(hash);
        if path.exists() {
            return Ok(());
        }
        fs::write(&path, text).map_err(|e| EngineError::io(path.as_path(), e))
    }

    /// Returns `true` if a raw snapshot exists for `hash`.
    #[must_use]
    pub fn has_raw_archive(&self, hash: &str) -> bool {
        self.raw_archive_path(hash).exists()
    }

    /// Archive an evicted history entry under a date-and-hash name.
    ///
    /// Idempotent for the same entry. Returns the archive path.
    pub fn archive_evicted(&self, entry: &HistoryEntry) -> EngineResult<PathBuf> {
        let name = format!(
            "{}-{}.md",
            entry.timestamp.format("%Y-%m-%d"),
            content_hash(&entry.compressed)
        );
        let path = self.root.join("archive").join("evicted").join(name);
        if path.exists() {
            return Ok(path);
        }
        let body = format!(
            "# Evicted compaction entry\n\n\
             - archived: {}\n\
             - tokensRaw: {}\n\
             - tokensCompressed: {}\n\n\
             {}\n",
            entry.timestamp.to_rfc3339(),
            entry.tokens_raw,
            entry.tokens_compressed,
            entry.compressed.trim_end()
        );
        fs::write(&path, body).map_err(|e| EngineError::io(path.as_path(), e))?;
        Ok(path)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File helpers
// ─────────────────────────────────────────────────────────────────────────────

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(error) => {
                warn!(path = %path.display(), %error, "corrupt state file, starting empty");
                T::default()
            }
        },
        Err(error) if error.kind() == ErrorKind::NotFound => T::default(),
        Err(error) => {
            warn!(path = %path.display(), %error, "unreadable state file, starting empty");
            T::default()
        }
    }
}

/// Serialize to a sibling temp file, then rename over the target.
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> EngineResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| EngineError::io(tmp.as_path(), e))?;
    fs::rename(&tmp, path).map_err(|e| EngineError::io(path, e))?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

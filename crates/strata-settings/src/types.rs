//! Settings types.
//!
//! Field names serialize in camelCase, matching the on-disk
//! `settings.json` (`compressTrigger`, `evictTrigger`, `blockSize`, …).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Engine configuration for one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemorySettings {
    /// Master switch; a disabled engine cancels every compaction round.
    pub enabled: bool,
    /// T: token total above which the host requests compaction.
    pub compress_trigger: u64,
    /// E: hard cap on tracked compaction history (must exceed `compress_trigger`).
    pub evict_trigger: u64,
    /// B: nominal token budget per block.
    pub block_size: u64,
    /// Blocks shorter than this many characters are cached as-is.
    pub min_compress_chars: usize,
    /// Blocks below this token estimate are not worth swapping.
    pub min_swap_tokens: u64,
    /// Maximum concurrent compression calls to the provider.
    pub max_concurrent_compressions: usize,
    /// Cache size cap; arbitrary excess entries are dropped beyond it.
    pub cache_max_entries: usize,
    /// Model identifier passed to the compression provider.
    pub compression_model: String,
    /// Chat-completions base URL for the compression provider.
    pub base_url: String,
    /// Durable state root. `None` resolves to `~/.strata`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            compress_trigger: 36_000,
            evict_trigger: 80_000,
            block_size: 4_000,
            min_compress_chars: 500,
            min_swap_tokens: 200,
            max_concurrent_compressions: 3,
            cache_max_entries: 2_048,
            compression_model: "anthropic/claude-haiku-4-5".to_owned(),
            base_url: "https://openrouter.ai/api/v1".to_owned(),
            state_dir: None,
        }
    }
}

impl MemorySettings {
    /// Resolve the durable state root, defaulting to `~/.strata`.
    #[must_use]
    pub fn resolve_state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
            PathBuf::from(home).join(".strata")
        })
    }

    /// Check cross-field constraints.
    ///
    /// The eviction cap must exceed the compaction trigger (it bounds what
    /// successful compactions accumulate) and the block budget must be
    /// non-zero.
    pub fn validate(&self) -> crate::errors::Result<()> {
        if self.block_size == 0 {
            return Err(crate::errors::SettingsError::InvalidValue(
                "blockSize must be greater than zero".to_owned(),
            ));
        }
        if self.evict_trigger <= self.compress_trigger {
            return Err(crate::errors::SettingsError::InvalidValue(format!(
                "evictTrigger ({}) must exceed compressTrigger ({})",
                self.evict_trigger, self.compress_trigger
            )));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = MemorySettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.compress_trigger, 36_000);
        assert_eq!(settings.evict_trigger, 80_000);
        assert_eq!(settings.block_size, 4_000);
        assert!(settings.enabled);
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(MemorySettings::default()).unwrap();
        assert!(value.get("compressTrigger").is_some());
        assert!(value.get("evictTrigger").is_some());
        assert!(value.get("blockSize").is_some());
        assert!(value.get("compressionModel").is_some());
        assert!(value.get("compress_trigger").is_none());
    }

    #[test]
    fn partial_file_fills_from_defaults() {
        let settings: MemorySettings =
            serde_json::from_str(r#"{"compressTrigger": 20000}"#).unwrap();
        assert_eq!(settings.compress_trigger, 20_000);
        assert_eq!(settings.evict_trigger, 80_000);
    }

    #[test]
    fn evict_must_exceed_compress_trigger() {
        let settings = MemorySettings {
            compress_trigger: 50_000,
            evict_trigger: 40_000,
            ..MemorySettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_block_size_is_invalid() {
        let settings = MemorySettings {
            block_size: 0,
            ..MemorySettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn state_dir_falls_back_to_home() {
        let settings = MemorySettings {
            state_dir: Some(PathBuf::from("/data/strata")),
            ..MemorySettings::default()
        };
        assert_eq!(settings.resolve_state_dir(), PathBuf::from("/data/strata"));

        let defaulted = MemorySettings::default();
        assert!(defaulted.resolve_state_dir().ends_with(".strata"));
    }
}

//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`MemorySettings::default()`]
//! 2. If `~/.strata/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::MemorySettings;

/// Resolve the path to the settings file (`~/.strata/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
    PathBuf::from(home).join(".strata").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<MemorySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or fails cross-field validation, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<MemorySettings> {
    let defaults = serde_json::to_value(MemorySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: MemorySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are silently ignored (fall back to file/default)
pub fn apply_env_overrides(settings: &mut MemorySettings) {
    if let Some(v) = read_env_bool("STRATA_ENABLED") {
        settings.enabled = v;
    }
    if let Some(v) = read_env_u64("STRATA_COMPRESS_TRIGGER", 1_000, 10_000_000) {
        settings.compress_trigger = v;
    }
    if let Some(v) = read_env_u64("STRATA_EVICT_TRIGGER", 1_000, 10_000_000) {
        settings.evict_trigger = v;
    }
    if let Some(v) = read_env_u64("STRATA_BLOCK_SIZE", 100, 1_000_000) {
        settings.block_size = v;
    }
    if let Some(v) = read_env_usize("STRATA_MIN_COMPRESS_CHARS", 0, 1_000_000) {
        settings.min_compress_chars = v;
    }
    if let Some(v) = read_env_u64("STRATA_MIN_SWAP_TOKENS", 0, 1_000_000) {
        settings.min_swap_tokens = v;
    }
    if let Some(v) = read_env_usize("STRATA_MAX_CONCURRENCY", 1, 64) {
        settings.max_concurrent_compressions = v;
    }
    if let Some(v) = read_env_usize("STRATA_CACHE_MAX_ENTRIES", 16, 1_000_000) {
        settings.cache_max_entries = v;
    }
    if let Some(v) = read_env_string("STRATA_COMPRESSION_MODEL") {
        settings.compression_model = v;
    }
    if let Some(v) = read_env_string("STRATA_BASE_URL") {
        settings.base_url = v;
    }
    if let Some(v) = read_env_string("STRATA_STATE_DIR") {
        settings.state_dir = Some(PathBuf::from(v));
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    // ── deep_merge ───────────────────────────────────────────────────────

    #[test]
    fn merge_overrides_scalars() {
        let target = json!({"a": 1, "b": 2});
        let source = json!({"b": 3});
        assert_eq!(deep_merge(target, source), json!({"a": 1, "b": 3}));
    }

    #[test]
    fn merge_skips_nulls() {
        let target = json!({"a": 1});
        let source = json!({"a": null});
        assert_eq!(deep_merge(target, source), json!({"a": 1}));
    }

    #[test]
    fn merge_recurses_into_objects() {
        let target = json!({"outer": {"a": 1, "b": 2}});
        let source = json!({"outer": {"b": 3}});
        assert_eq!(
            deep_merge(target, source),
            json!({"outer": {"a": 1, "b": 3}})
        );
    }

    #[test]
    fn merge_replaces_arrays() {
        let target = json!({"list": [1, 2, 3]});
        let source = json!({"list": [9]});
        assert_eq!(deep_merge(target, source), json!({"list": [9]}));
    }

    // ── parse helpers ────────────────────────────────────────────────────

    #[test]
    fn parse_bool_accepts_variants() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u64_enforces_range() {
        assert_eq!(parse_u64_range("5000", 1_000, 10_000), Some(5_000));
        assert_eq!(parse_u64_range("500", 1_000, 10_000), None);
        assert_eq!(parse_u64_range("abc", 0, 10), None);
    }

    #[test]
    fn parse_usize_enforces_range() {
        assert_eq!(parse_usize_range("4", 1, 64), Some(4));
        assert_eq!(parse_usize_range("0", 1, 64), None);
    }

    // ── file loading ─────────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, MemorySettings::default());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"compressTrigger": 24000, "blockSize": 2000}}"#).unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.compress_trigger, 24_000);
        assert_eq!(settings.block_size, 2_000);
        assert_eq!(settings.evict_trigger, 80_000);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn cross_field_validation_runs_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"evictTrigger": 10000}"#).unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"futureKnob": true}"#).unwrap();
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings, MemorySettings::default());
    }
}

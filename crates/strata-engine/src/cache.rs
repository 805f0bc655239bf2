//! Content-addressed compression cache and the size policy behind it.
//!
//! The cache maps block content hashes to their compressed forms. Because the
//! key is derived from the block text, a hit is always valid regardless of
//! which round (or which process) produced it, and a cached block is never
//! recompressed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strata_core::estimate_tokens;
use strata_llm::{Compressor, CompressorResult};
use strata_settings::MemorySettings;

/// A compressed candidate must shrink to at most this fraction of its input
/// to replace it; otherwise the raw text is kept.
const MAX_KEEP_RATIO: f64 = 0.9;

// ─────────────────────────────────────────────────────────────────────────────
// Cache entry
// ─────────────────────────────────────────────────────────────────────────────

/// Compressed form of one block, keyed externally by content hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Compressed text. For blocks the policy left alone this is the raw
    /// text verbatim.
    pub compressed: String,
    /// Token estimate of the source block.
    pub tokens_raw: u64,
    /// Token estimate of `compressed`.
    pub tokens_compressed: u64,
}

impl CacheEntry {
    /// Tokens saved by swapping the source block for this entry.
    #[must_use]
    pub fn savings(&self) -> u64 {
        self.tokens_raw.saturating_sub(self.tokens_compressed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory compression cache, persisted whole-file as `hash → entry`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompressionCache {
    entries: HashMap<String, CacheEntry>,
}

impl CompressionCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the compressed form of a block by content hash.
    #[must_use]
    pub fn get(&self, hash: &str) -> Option<&CacheEntry> {
        self.entries.get(hash)
    }

    /// Returns `true` if a compressed form exists for `hash`.
    #[must_use]
    pub fn contains(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    /// Insert or replace the entry for `hash`.
    pub fn insert(&mut self, hash: String, entry: CacheEntry) {
        let _ = self.entries.insert(hash, entry);
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop arbitrary entries until the cache holds at most `max_entries`.
    ///
    /// Victim choice does not matter for correctness: a dropped entry is
    /// recomputed from the block text on the next miss. Returns the number
    /// of entries dropped.
    pub fn enforce_cap(&mut self, max_entries: usize) -> usize {
        let mut dropped = 0;
        while self.entries.len() > max_entries {
            let Some(victim) = self.entries.keys().next().cloned() else {
                break;
            };
            let _ = self.entries.remove(&victim);
            dropped += 1;
        }
        dropped
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Compression policy
// ─────────────────────────────────────────────────────────────────────────────

/// Size guards applied around every compression call.
#[derive(Clone, Copy, Debug)]
pub struct CompressionPolicy {
    /// Blocks shorter than this many characters are cached verbatim without
    /// a provider call.
    pub min_compress_chars: usize,
}

impl CompressionPolicy {
    /// Whether `text` is too short to be worth a provider call.
    #[must_use]
    pub fn below_min_length(&self, text: &str) -> bool {
        text.len() < self.min_compress_chars
    }

    /// Whether a compressed candidate shrank enough to replace the raw text.
    #[must_use]
    pub fn shrank_enough(raw_len: usize, compressed_len: usize) -> bool {
        #[allow(clippy::cast_precision_loss)]
        let limit = raw_len as f64 * MAX_KEEP_RATIO;
        #[allow(clippy::cast_precision_loss)]
        let candidate = compressed_len as f64;
        candidate <= limit
    }
}

impl From<&MemorySettings> for CompressionPolicy {
    fn from(settings: &MemorySettings) -> Self {
        Self {
            min_compress_chars: settings.min_compress_chars,
        }
    }
}

/// Produce the cache entry for one block of text.
///
/// Short blocks are stored verbatim without calling the provider. A result
/// that failed to shrink past the keep ratio falls back to the raw text, so
/// a cached entry is never larger than its source. The returned flag reports
/// whether a provider call was made, for usage accounting.
pub(crate) async fn compress_text(
    compressor: &dyn Compressor,
    policy: CompressionPolicy,
    text: &str,
) -> CompressorResult<(CacheEntry, bool)> {
    let tokens_raw = estimate_tokens(text);
    if policy.below_min_length(text) {
        let entry = CacheEntry {
            compressed: text.to_owned(),
            tokens_raw,
            tokens_compressed: tokens_raw,
        };
        return Ok((entry, false));
    }

    let candidate = compressor.compress(text).await?;
    let entry = if CompressionPolicy::shrank_enough(text.len(), candidate.len()) {
        let tokens_compressed = estimate_tokens(&candidate);
        CacheEntry {
            compressed: candidate,
            tokens_raw,
            tokens_compressed,
        }
    } else {
        CacheEntry {
            compressed: text.to_owned(),
            tokens_raw,
            tokens_compressed: tokens_raw,
        }
    };
    Ok((entry, true))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedCompressor {
        output: String,
        calls: AtomicUsize,
    }

    impl FixedCompressor {
        fn new(output: impl Into<String>) -> Self {
            Self {
                output: output.into(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Compressor for FixedCompressor {
        fn model(&self) -> &str {
            "fixed"
        }

        async fn compress(&self, _text: &str) -> CompressorResult<String> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }

    fn policy(min_compress_chars: usize) -> CompressionPolicy {
        CompressionPolicy { min_compress_chars }
    }

    fn entry(compressed: &str, raw: u64) -> CacheEntry {
        CacheEntry {
            compressed: compressed.to_owned(),
            tokens_raw: raw,
            tokens_compressed: estimate_tokens(compressed),
        }
    }

    // ── cache ────────────────────────────────────────────────────────────

    #[test]
    fn insert_and_get_round_trip() {
        let mut cache = CompressionCache::new();
        cache.insert("abc123".to_owned(), entry("small", 100));
        assert!(cache.contains("abc123"));
        assert_eq!(cache.get("abc123").unwrap().compressed, "small");
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn cap_enforcement_drops_down_to_limit() {
        let mut cache = CompressionCache::new();
        for i in 0..10 {
            cache.insert(format!("hash{i}"), entry("c", 50));
        }
        let dropped = cache.enforce_cap(4);
        assert_eq!(dropped, 6);
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.enforce_cap(4), 0);
    }

    #[test]
    fn serializes_as_plain_object() {
        let mut cache = CompressionCache::new();
        cache.insert("deadbeef00000000".to_owned(), entry("gist", 200));
        let value = serde_json::to_value(&cache).unwrap();
        assert_eq!(value["deadbeef00000000"]["compressed"], "gist");
        assert_eq!(value["deadbeef00000000"]["tokensRaw"], 200);
    }

    #[test]
    fn savings_never_underflows() {
        let bigger = CacheEntry {
            compressed: "x".repeat(400),
            tokens_raw: 10,
            tokens_compressed: 100,
        };
        assert_eq!(bigger.savings(), 0);
    }

    // ── compression policy ───────────────────────────────────────────────

    #[tokio::test]
    async fn short_text_is_cached_verbatim_without_a_call() {
        let compressor = FixedCompressor::new("should never be used");
        let text = "tiny";
        let (entry, called) = compress_text(&compressor, policy(500), text).await.unwrap();
        assert!(!called);
        assert_eq!(entry.compressed, text);
        assert_eq!(entry.tokens_compressed, entry.tokens_raw);
        assert_eq!(compressor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shrinking_result_is_kept() {
        let compressor = FixedCompressor::new("the gist");
        let text = "x".repeat(1000);
        let (entry, called) = compress_text(&compressor, policy(10), &text).await.unwrap();
        assert!(called);
        assert_eq!(entry.compressed, "the gist");
        assert!(entry.tokens_compressed < entry.tokens_raw);
    }

    #[tokio::test]
    async fn non_shrinking_result_falls_back_to_raw() {
        let compressor = FixedCompressor::new("y".repeat(990));
        let text = "x".repeat(1000);
        let (entry, called) = compress_text(&compressor, policy(10), &text).await.unwrap();
        assert!(called);
        assert_eq!(entry.compressed, text);
        assert_eq!(entry.tokens_compressed, entry.tokens_raw);
    }

    #[tokio::test]
    async fn exact_keep_ratio_is_accepted() {
        let compressor = FixedCompressor::new("y".repeat(900));
        let text = "x".repeat(1000);
        let (entry, _) = compress_text(&compressor, policy(10), &text).await.unwrap();
        assert_eq!(entry.compressed.len(), 900);
    }
}

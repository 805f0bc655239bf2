//! End-to-end compaction flows against the public engine API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use strata_core::{Entry, SessionId};
use strata_engine::{
    CancelReason, CompactionOutcome, CompactionRequest, MemoryEngine, StateStore, segment,
};
use strata_llm::{Compressor, CompressorResult};
use strata_settings::MemorySettings;

/// Compresses any input to a short fixed-shape gist.
struct GistCompressor {
    calls: AtomicUsize,
}

impl GistCompressor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Compressor for GistCompressor {
    fn model(&self) -> &str {
        "gist"
    }

    async fn compress(&self, text: &str) -> CompressorResult<String> {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("[gist of {} chars]", text.len()))
    }
}

/// Returns its input unchanged, so every block falls back to raw text.
struct EchoCompressor;

#[async_trait]
impl Compressor for EchoCompressor {
    fn model(&self) -> &str {
        "echo"
    }

    async fn compress(&self, text: &str) -> CompressorResult<String> {
        Ok(text.to_owned())
    }
}

fn settings(dir: &tempfile::TempDir) -> MemorySettings {
    MemorySettings {
        compress_trigger: 1000,
        evict_trigger: 10_000,
        block_size: 200,
        min_compress_chars: 40,
        min_swap_tokens: 10,
        max_concurrent_compressions: 2,
        state_dir: Some(dir.path().to_path_buf()),
        ..MemorySettings::default()
    }
}

/// Alternating human/agent turns; at block size 200 each turn segments into
/// two single-entry blocks.
fn conversation(turns: usize) -> Vec<Entry> {
    let mut entries = Vec::new();
    for turn in 0..turns {
        entries.push(Entry::human(
            format!("h{turn}"),
            format!("turn {turn} question {}", "x".repeat(600)),
        ));
        entries.push(Entry::agent(
            format!("a{turn}"),
            format!("turn {turn} answer {}", "y".repeat(600)),
        ));
    }
    entries
}

async fn wait_for_cache(engine: &mut MemoryEngine, want: usize) {
    for _ in 0..200 {
        engine.poll_background();
        if engine.cache().len() >= want {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("cache never reached {want} entries");
}

#[tokio::test]
async fn compaction_round_swaps_and_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let session = SessionId::from("s-flow");
    let mut engine =
        MemoryEngine::new(session.clone(), settings(&dir), Some(GistCompressor::new() as _))
            .unwrap();

    let entries = conversation(6);
    let req = CompactionRequest {
        entries: entries.clone(),
        before_tokens: 1500,
    };
    let outcome = engine.compact(&req, &CancellationToken::new()).await.unwrap();
    let CompactionOutcome::Swapped(payload) = outcome else {
        panic!("expected a swap, got {outcome:?}");
    };
    assert!(payload.tokens_after < payload.tokens_before);
    assert!(payload.replacement_text.starts_with("[Compressed history"));

    // Every swapped block left a raw snapshot behind.
    let blocks = segment(&entries, 200);
    let store = StateStore::open(dir.path(), session.clone()).unwrap();
    for block in &blocks[..payload.swapped_blocks] {
        assert!(store.has_raw_archive(&block.hash), "missing raw {}", block.hash);
    }

    // A fresh engine over the same state directory sees the round.
    drop(engine);
    let mut engine =
        MemoryEngine::new(session, settings(&dir), Some(GistCompressor::new() as _)).unwrap();
    assert_eq!(engine.history().len(), 1);
    assert!(!engine.cache().is_empty());

    let outcome = engine
        .compact(
            &CompactionRequest {
                entries,
                before_tokens: 800,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CompactionOutcome::Cancelled(CancelReason::BelowTrigger)
    );
}

#[tokio::test]
async fn background_warmup_makes_the_round_a_cache_hit() {
    let dir = tempfile::tempdir().unwrap();
    let mock = GistCompressor::new();
    let mut engine = MemoryEngine::new(
        SessionId::from("s-flow"),
        settings(&dir),
        Some(Arc::clone(&mock) as _),
    )
    .unwrap();

    // Turns stream in one at a time; each gets queued as it completes.
    let entries = conversation(6);
    for turn in entries.chunks(2) {
        engine.record_turn(turn);
    }
    wait_for_cache(&mut engine, 12).await;
    let warmup_calls = mock.calls();
    assert_eq!(warmup_calls, 12);

    // The round itself needs no provider traffic at all.
    let outcome = engine
        .compact(
            &CompactionRequest {
                entries,
                before_tokens: 1500,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, CompactionOutcome::Swapped(_)));
    assert_eq!(mock.calls(), warmup_calls);
}

#[tokio::test]
async fn history_accumulates_across_rounds() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = MemoryEngine::new(
        SessionId::from("s-flow"),
        settings(&dir),
        Some(GistCompressor::new() as _),
    )
    .unwrap();

    let outcome = engine
        .compact(
            &CompactionRequest {
                entries: conversation(6),
                before_tokens: 1500,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, CompactionOutcome::Swapped(_)));

    let outcome = engine
        .compact(
            &CompactionRequest {
                entries: conversation(12),
                before_tokens: 1600,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let CompactionOutcome::Swapped(payload) = outcome else {
        panic!("expected a swap, got {outcome:?}");
    };

    // Both rounds render as dated sections, oldest first.
    assert_eq!(payload.replacement_text.matches("\n## ").count(), 2);
    assert_eq!(engine.history().len(), 2);
}

#[tokio::test]
async fn eviction_kicks_in_once_history_exceeds_its_cap() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = settings(&dir);
    cfg.evict_trigger = 2500;
    let mut engine = MemoryEngine::new(
        SessionId::from("s-flow"),
        cfg,
        Some(Arc::new(EchoCompressor) as _),
    )
    .unwrap();

    // Echo output never shrinks, so history entries stay near raw size and
    // two rounds are enough to cross the cap.
    let outcome = engine
        .compact(
            &CompactionRequest {
                entries: conversation(6),
                before_tokens: 1500,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, CompactionOutcome::Swapped(_)));
    assert_eq!(engine.history().len(), 1);

    let outcome = engine
        .compact(
            &CompactionRequest {
                entries: conversation(10),
                before_tokens: 1500,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let CompactionOutcome::Swapped(payload) = outcome else {
        panic!("expected a swap, got {outcome:?}");
    };

    // The first round was archived and popped; only the newest survives.
    assert_eq!(engine.history().len(), 1);
    assert!(engine.history().tracked_tokens() <= 2500);
    assert_eq!(payload.replacement_text.matches("\n## ").count(), 1);
    let archived: Vec<_> = std::fs::read_dir(dir.path().join("archive").join("evicted"))
        .unwrap()
        .collect();
    assert_eq!(archived.len(), 1);
}

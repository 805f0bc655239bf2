//! The per-session memory engine.
//!
//! [`MemoryEngine`] owns every moving part for one session: the compression
//! cache, the background pool, the compaction history, and the durable state
//! underneath them. The host drives it through two events:
//!
//! - [`MemoryEngine::record_turn`] on turn completion: segment the turn,
//!   archive raw snapshots, queue uncached blocks for background
//!   compression. Advisory and fail-silent.
//! - [`MemoryEngine::compact`] on a compaction request: plan a swap, resolve
//!   compressed forms, and either hand back a replacement payload or report
//!   why the round cancelled.
//!
//! A compaction round has three phases (segmentation and planning, swap
//! resolution, finalization) and checks the cancellation token at each phase
//! boundary. A cancelled round performs no durable writes; all persistence
//! happens in finalization, after the last check.
//!
//! The engine is the only mutator of its own state. Background workers
//! return results over a channel and those are folded in at the engine's
//! safe points, so no locking is involved anywhere.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use strata_core::{EngineResult, Entry, EntryId, SessionId, estimate_tokens};
use strata_llm::Compressor;
use strata_settings::MemorySettings;

use crate::cache::{CompressionCache, CompressionPolicy, compress_text};
use crate::history::{CompactionHistory, HistoryEntry};
use crate::planner::{SwapPlan, plan_swaps};
use crate::segmenter::{Block, segment};
use crate::store::{StateStore, UsageStats};
use crate::worker::CompressionPool;

// ─────────────────────────────────────────────────────────────────────────────
// Request and outcome types
// ─────────────────────────────────────────────────────────────────────────────

/// A compaction request forwarded by the host.
#[derive(Clone, Debug)]
pub struct CompactionRequest {
    /// The full entry log of the current context, oldest first.
    pub entries: Vec<Entry>,
    /// The host's token estimate for the current context.
    pub before_tokens: u64,
}

/// Why a compaction round ended without a swap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// The engine is disabled by configuration.
    Disabled,
    /// The entry log was empty or segmented into nothing.
    EmptyInput,
    /// The context did not exceed the compression trigger.
    BelowTrigger,
    /// No compression capability is configured.
    NoCompressor,
    /// The overflow cannot be resolved until the log segments into at least
    /// this many blocks.
    AwaitingGrowth {
        /// Minimum block count before a retry is worthwhile.
        min_blocks: usize,
    },
    /// The cancellation token fired at a phase boundary.
    Interrupted,
}

/// Replacement payload handed back after a successful round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactionPayload {
    /// The full retained history rendered as dated sections. The host swaps
    /// this in for everything before the resume marker.
    pub replacement_text: String,
    /// ID of the first entry that stays verbatim in the rebuilt context.
    pub resume_entry_id: EntryId,
    /// The host's token estimate before the round.
    pub tokens_before: u64,
    /// Estimated tokens after applying the swap. The host re-measures after
    /// rebuilding; this is the engine's accounting of the savings.
    pub tokens_after: u64,
    /// Number of blocks swapped for compressed forms.
    pub swapped_blocks: usize,
}

/// Result of a compaction round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// The round produced a swap.
    Swapped(CompactionPayload),
    /// The round ended without changing the context.
    Cancelled(CancelReason),
}

/// Compressed forms for the swapped prefix, assembled during resolution.
struct ResolvedPrefix {
    joined: String,
    joined_tokens: u64,
    swapped_blocks: usize,
    fallbacks: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Compression and eviction engine for a single session.
///
/// Create one per session; nothing is shared between instances except the
/// content-addressed cache file they converge on through persistence.
pub struct MemoryEngine {
    session: SessionId,
    settings: MemorySettings,
    compressor: Option<Arc<dyn Compressor>>,
    store: StateStore,
    cache: CompressionCache,
    history: CompactionHistory,
    usage: UsageStats,
    pool: Option<CompressionPool>,
    deferred_min_blocks: Option<usize>,
}

impl MemoryEngine {
    /// Create the engine for one session, loading durable state from the
    /// configured state directory.
    ///
    /// Must be called inside a Tokio runtime: the background compression
    /// pool spawns its dispatcher immediately. Passing `None` for the
    /// compressor leaves the engine able to archive and evict but causes
    /// every compaction round to cancel with [`CancelReason::NoCompressor`].
    pub fn new(
        session: SessionId,
        settings: MemorySettings,
        compressor: Option<Arc<dyn Compressor>>,
    ) -> EngineResult<Self> {
        let store = StateStore::open(settings.resolve_state_dir(), session.clone())?;
        let cache = store.load_cache();
        let history = store.load_history();
        let usage = store.load_usage();
        let policy = CompressionPolicy::from(&settings);
        let pool = compressor.as_ref().map(|compressor| {
            CompressionPool::new(
                Arc::clone(compressor),
                policy,
                settings.max_concurrent_compressions,
            )
        });
        info!(
            session = %session,
            state_dir = %store.root().display(),
            cache_entries = cache.len(),
            history_entries = history.len(),
            compressor = compressor.is_some(),
            "memory engine ready"
        );
        Ok(Self {
            session,
            settings,
            compressor,
            store,
            cache,
            history,
            usage,
            pool,
            deferred_min_blocks: None,
        })
    }

    /// The session this engine belongs to.
    #[must_use]
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// The settings this engine was created with.
    #[must_use]
    pub fn settings(&self) -> &MemorySettings {
        &self.settings
    }

    /// The in-memory compression cache.
    #[must_use]
    pub fn cache(&self) -> &CompressionCache {
        &self.cache
    }

    /// The accumulated compaction history.
    #[must_use]
    pub fn history(&self) -> &CompactionHistory {
        &self.history
    }

    /// Cumulative provider-call counters.
    #[must_use]
    pub fn usage(&self) -> &UsageStats {
        &self.usage
    }

    /// Number of background compressions queued or running.
    #[must_use]
    pub fn pending_compressions(&self) -> usize {
        self.pool.as_ref().map_or(0, CompressionPool::pending)
    }

    fn policy(&self) -> CompressionPolicy {
        CompressionPolicy::from(&self.settings)
    }

    // ── turn completion ──────────────────────────────────────────────────

    /// Handle a completed turn: archive raw snapshots and queue uncached
    /// blocks for background compression.
    ///
    /// This is the advisory hot path. It never blocks on provider calls and
    /// never raises; archive or persistence failures are logged and the
    /// turn proceeds.
    pub fn record_turn(&mut self, entries: &[Entry]) {
        if !self.settings.enabled || entries.is_empty() {
            return;
        }
        let blocks = segment(entries, self.settings.block_size);
        trace!(
            entries = entries.len(),
            blocks = blocks.len(),
            "completed turn segmented"
        );
        for block in &blocks {
            if let Err(error) = self.store.archive_raw(&block.hash, &block.text) {
                warn!(hash = %block.hash, %error, "failed to archive raw block");
            }
        }
        if self.deferred_min_blocks.take().is_some() {
            debug!("growth deferral reset by new entries");
        }
        if let Some(pool) = self.pool.as_mut() {
            for block in &blocks {
                if self.cache.contains(&block.hash) {
                    continue;
                }
                if pool.enqueue(&block.hash, &block.text) {
                    trace!(
                        hash = %block.hash,
                        tokens = block.tokens,
                        "block queued for background compression"
                    );
                }
            }
        }
        self.absorb_background_results(true);
    }

    /// Fold completed background compressions into the cache and persist it.
    ///
    /// [`record_turn`](Self::record_turn) and [`compact`](Self::compact) do
    /// this on their own; hosts may also call it at idle moments.
    pub fn poll_background(&mut self) {
        self.absorb_background_results(true);
    }

    fn absorb_background_results(&mut self, persist: bool) {
        let Some(pool) = self.pool.as_mut() else {
            return;
        };
        let outcomes = pool.drain();
        if outcomes.is_empty() {
            return;
        }
        let mut inserted = 0usize;
        for outcome in outcomes {
            let Some(entry) = outcome.entry else {
                continue;
            };
            if outcome.provider_called {
                self.usage
                    .record_call(entry.tokens_raw, entry.tokens_compressed);
            }
            debug!(
                hash = %outcome.hash,
                tokens_raw = entry.tokens_raw,
                tokens_compressed = entry.tokens_compressed,
                "background compression cached"
            );
            self.cache.insert(outcome.hash, entry);
            inserted += 1;
        }
        if inserted == 0 {
            return;
        }
        let dropped = self.cache.enforce_cap(self.settings.cache_max_entries);
        if dropped > 0 {
            debug!(dropped, "cache cap enforced");
        }
        if persist {
            if let Err(error) = self.store.save_cache(&self.cache) {
                warn!(%error, "failed to persist cache");
            }
            if let Err(error) = self.store.save_usage(&self.usage) {
                warn!(%error, "failed to persist usage stats");
            }
        }
    }

    // ── compaction ───────────────────────────────────────────────────────

    /// Run one compaction round.
    ///
    /// Returns [`CompactionOutcome::Swapped`] with the replacement payload,
    /// or [`CompactionOutcome::Cancelled`] naming why nothing changed.
    /// `Err` is reserved for durable-state failures during finalization.
    ///
    /// The cancellation token is honored at the three phase boundaries. A
    /// round that observes it performs no durable writes and leaves no
    /// partial state; compressed forms already computed stay in the
    /// in-memory cache for the next attempt.
    pub async fn compact(
        &mut self,
        request: &CompactionRequest,
        cancel: &CancellationToken,
    ) -> EngineResult<CompactionOutcome> {
        if !self.settings.enabled {
            info!("engine disabled, cancelling compaction");
            return Ok(CompactionOutcome::Cancelled(CancelReason::Disabled));
        }
        if request.entries.is_empty() {
            debug!("empty entry log, nothing to compact");
            return Ok(CompactionOutcome::Cancelled(CancelReason::EmptyInput));
        }
        let Some(compressor) = self.compressor.clone() else {
            warn!("no compression capability, cancelling compaction");
            return Ok(CompactionOutcome::Cancelled(CancelReason::NoCompressor));
        };
        let trigger = self.settings.compress_trigger;
        if request.before_tokens <= trigger {
            debug!(
                before = request.before_tokens,
                trigger, "context below compression trigger"
            );
            return Ok(CompactionOutcome::Cancelled(CancelReason::BelowTrigger));
        }
        let overflow = request.before_tokens - trigger;
        info!(
            session = %self.session,
            before = request.before_tokens,
            trigger,
            overflow,
            "compaction round started"
        );

        if cancel.is_cancelled() {
            info!("compaction interrupted before segmentation");
            return Ok(CompactionOutcome::Cancelled(CancelReason::Interrupted));
        }

        // Phase 1: segmentation and planning. Synchronous, no I/O.
        let blocks = segment(&request.entries, self.settings.block_size);
        if blocks.is_empty() {
            return Ok(CompactionOutcome::Cancelled(CancelReason::EmptyInput));
        }
        if let Some(min_blocks) = self.deferred_min_blocks {
            if blocks.len() < min_blocks {
                debug!(
                    blocks = blocks.len(),
                    min_blocks, "deferred until the log grows"
                );
                return Ok(CompactionOutcome::Cancelled(CancelReason::AwaitingGrowth {
                    min_blocks,
                }));
            }
        }

        self.absorb_background_results(false);

        let (boundary, estimated_savings, skipped) =
            match plan_swaps(&blocks, &self.cache, overflow, self.settings.min_swap_tokens) {
                SwapPlan::Swap {
                    boundary,
                    estimated_savings,
                    skipped,
                } => (boundary, estimated_savings, skipped),
                SwapPlan::NeedMoreBlocks { min_blocks } => {
                    self.deferred_min_blocks = Some(min_blocks);
                    info!(
                        blocks = blocks.len(),
                        min_blocks,
                        "overflow unresolvable without the most recent block, deferring"
                    );
                    return Ok(CompactionOutcome::Cancelled(CancelReason::AwaitingGrowth {
                        min_blocks,
                    }));
                }
            };
        info!(
            blocks = blocks.len(),
            boundary,
            estimated_savings,
            skipped = skipped.len(),
            "swap plan ready"
        );

        if cancel.is_cancelled() {
            info!("compaction interrupted before swap resolution");
            return Ok(CompactionOutcome::Cancelled(CancelReason::Interrupted));
        }

        // Phase 2: resolve compressed forms for the swapped prefix.
        let resolved = self
            .resolve_prefix(&blocks[..boundary], &skipped, &compressor)
            .await;

        if cancel.is_cancelled() {
            info!("compaction interrupted before finalization, discarding round");
            return Ok(CompactionOutcome::Cancelled(CancelReason::Interrupted));
        }

        let Some(resume_entry_id) = blocks[boundary].first_entry_id().cloned() else {
            warn!("block without entry IDs at the swap boundary, cancelling");
            return Ok(CompactionOutcome::Cancelled(CancelReason::EmptyInput));
        };

        // Phase 3: finalization. The only phase with durable writes.
        let payload = self.finalize(request, &blocks[..boundary], resolved, resume_entry_id)?;
        self.deferred_min_blocks = None;
        Ok(CompactionOutcome::Swapped(payload))
    }

    /// Gather compressed forms for the swapped prefix.
    ///
    /// Cache hits are taken as-is; misses are compressed on demand with
    /// bounded parallelism and cached. A block whose provider call fails
    /// keeps its raw text for this round and stays uncached so a later
    /// round retries it. Below-minimum blocks named by `skipped` ride
    /// along raw: too small to be worth a swap, but their content still
    /// belongs in the payload.
    async fn resolve_prefix(
        &mut self,
        prefix: &[Block],
        skipped: &[usize],
        compressor: &Arc<dyn Compressor>,
    ) -> ResolvedPrefix {
        let mut parts: Vec<Option<String>> = vec![None; prefix.len()];
        let mut misses = Vec::new();
        let mut hits = 0usize;
        for (index, block) in prefix.iter().enumerate() {
            if skipped.binary_search(&index).is_ok() {
                trace!(
                    hash = %block.hash,
                    tokens = block.tokens,
                    "below-minimum block kept raw in the payload"
                );
                parts[index] = Some(block.text.clone());
                continue;
            }
            if let Some(entry) = self.cache.get(&block.hash) {
                parts[index] = Some(entry.compressed.clone());
                hits += 1;
            } else {
                misses.push((index, block.hash.clone(), block.text.clone()));
            }
        }

        let mut fallbacks = 0usize;
        if !misses.is_empty() {
            debug!(hits, misses = misses.len(), "resolving uncached blocks");
            let policy = self.policy();
            let concurrency = self.settings.max_concurrent_compressions.max(1);
            let jobs = misses.into_iter().map(|(index, hash, text)| {
                let compressor = Arc::clone(compressor);
                async move {
                    let result = compress_text(compressor.as_ref(), policy, &text).await;
                    (index, hash, text, result)
                }
            });
            let results: Vec<_> = stream::iter(jobs).buffer_unordered(concurrency).collect().await;
            for (index, hash, text, result) in results {
                match result {
                    Ok((entry, provider_called)) => {
                        if provider_called {
                            self.usage
                                .record_call(entry.tokens_raw, entry.tokens_compressed);
                        }
                        debug!(
                            hash = %hash,
                            tokens_raw = entry.tokens_raw,
                            tokens_compressed = entry.tokens_compressed,
                            "on-demand compression cached"
                        );
                        parts[index] = Some(entry.compressed.clone());
                        self.cache.insert(hash, entry);
                    }
                    Err(error) => {
                        warn!(
                            hash = %hash,
                            category = error.category(),
                            error = %error,
                            "compression failed, keeping block raw this round"
                        );
                        parts[index] = Some(text);
                        fallbacks += 1;
                    }
                }
            }
            let _ = self.cache.enforce_cap(self.settings.cache_max_entries);
        }

        let mut joined = String::new();
        for part in parts.into_iter().flatten() {
            if !joined.is_empty() {
                joined.push_str("\n\n");
            }
            joined.push_str(part.trim_end());
        }
        let joined_tokens = estimate_tokens(&joined);
        ResolvedPrefix {
            joined,
            joined_tokens,
            swapped_blocks: prefix.len() - skipped.len(),
            fallbacks,
        }
    }

    /// Append the round to history, run the eviction check, and persist
    /// everything.
    fn finalize(
        &mut self,
        request: &CompactionRequest,
        prefix: &[Block],
        resolved: ResolvedPrefix,
        resume_entry_id: EntryId,
    ) -> EngineResult<CompactionPayload> {
        let prefix_raw_total: u64 = prefix.iter().map(|b| b.tokens).sum();
        let savings = prefix_raw_total.saturating_sub(resolved.joined_tokens);
        let tokens_after = request.before_tokens.saturating_sub(savings);

        self.history.push(HistoryEntry {
            compressed: resolved.joined,
            tokens_raw: prefix_raw_total,
            tokens_compressed: resolved.joined_tokens,
            timestamp: Utc::now(),
        });

        // Raw snapshots for everything leaving the live context.
        for block in prefix {
            if let Err(error) = self.store.archive_raw(&block.hash, &block.text) {
                warn!(hash = %block.hash, %error, "failed to archive raw block");
            }
        }

        let evicted = self.evict_history();

        self.store.save_cache(&self.cache)?;
        self.store.save_history(&self.history)?;
        self.store.save_usage(&self.usage)?;

        info!(
            swapped = resolved.swapped_blocks,
            fallbacks = resolved.fallbacks,
            evicted,
            tokens_before = request.before_tokens,
            tokens_after,
            history_entries = self.history.len(),
            "compaction round finalized"
        );
        Ok(CompactionPayload {
            replacement_text: self.history.render(),
            resume_entry_id,
            tokens_before: request.before_tokens,
            tokens_after,
            swapped_blocks: resolved.swapped_blocks,
        })
    }

    /// Pop and archive oldest history entries until the tracked total is
    /// back under the eviction trigger.
    ///
    /// Archival precedes removal, so a crash between the two leaves a
    /// duplicate archive file rather than a lost entry. An archive failure
    /// keeps the entry and stops the loop; the next round retries.
    fn evict_history(&mut self) -> usize {
        let cap = self.settings.evict_trigger;
        let mut evicted = 0usize;
        while self.history.tracked_tokens() > cap {
            let Some(oldest) = self.history.oldest() else {
                break;
            };
            match self.store.archive_evicted(oldest) {
                Ok(path) => {
                    info!(
                        path = %path.display(),
                        tracked = self.history.tracked_tokens(),
                        "evicting oldest history entry"
                    );
                    let _ = self.history.pop_oldest();
                    evicted += 1;
                }
                Err(error) => {
                    warn!(%error, "failed to archive history entry, keeping it");
                    break;
                }
            }
        }
        evicted
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! # strata-engine
//!
//! Context compression and eviction for long-running agent sessions.
//!
//! The engine keeps a session's context under its token budget without
//! discarding information. Instead of one lossy summary pass, it works in
//! small reversible steps:
//!
//! - [`segmenter`]: group entries into turns and pack them into
//!   token-bounded blocks with stable content-hash identities
//! - [`cache`]: the content-addressed cache of compressed block forms
//! - [`history`]: the append-only ledger of compaction rounds whose
//!   rendering is the replacement payload
//! - [`store`]: durable state with atomic writes and raw/evicted archives
//! - [`engine`]: [`MemoryEngine`], the per-session orchestrator
//!
//! Compression runs in the background between turns where possible, so a
//! compaction round is usually a cheap cache lookup plus a greedy plan over
//! precomputed sizes.

#![deny(unsafe_code)]

pub mod cache;
pub mod engine;
pub mod history;
mod planner;
pub mod segmenter;
pub mod store;
mod worker;

pub use cache::{CacheEntry, CompressionCache, CompressionPolicy};
pub use engine::{
    CancelReason, CompactionOutcome, CompactionPayload, CompactionRequest, MemoryEngine,
};
pub use history::{CompactionHistory, HistoryEntry};
pub use segmenter::{Block, segment};
pub use store::{ModelUsage, StateStore, UsageStats};

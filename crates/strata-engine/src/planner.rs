//! Greedy swap planning.
//!
//! Planning is a pure, synchronous walk over the segmented blocks: no I/O,
//! no provider calls, no cache mutation. The plan decides which oldest-first
//! prefix of blocks to swap for compressed forms; resolution of the actual
//! text happens afterwards.

use crate::cache::CompressionCache;
use crate::segmenter::Block;

/// Fraction of a block's raw tokens assumed to survive compression when no
/// cached entry exists yet. Deliberately conservative so a plan built on
/// estimates does not promise savings the real compression may miss.
const UNCACHED_COMPRESSION_RATIO: f64 = 0.5;

/// Outcome of the greedy walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SwapPlan {
    /// Swap blocks `0..boundary` for compressed forms; everything at and
    /// after `boundary` stays raw.
    Swap {
        /// Index of the first block that stays raw. Always at least 1 and
        /// strictly less than the block count, so the most recent block is
        /// never swapped.
        boundary: usize,
        /// Token savings the walk accumulated.
        estimated_savings: u64,
        /// Indices inside the prefix whose blocks fell below the minimum
        /// swap size and contribute no savings. Sorted ascending.
        skipped: Vec<usize>,
    },
    /// The overflow cannot be resolved while keeping the most recent block
    /// raw. The round should cancel and retry once the log has grown.
    NeedMoreBlocks {
        /// Minimum segmented block count before a retry is worthwhile.
        min_blocks: usize,
    },
}

/// Walk blocks oldest-first, accumulating estimated savings until they cover
/// `overflow`.
///
/// A cached block contributes its real savings; an uncached block contributes
/// the conservative estimate. Blocks under `min_swap_tokens` are stepped over
/// without contributing. The walk checks sufficiency before consuming each
/// block, so the boundary lands on the first block that does not need to be
/// swapped.
pub(crate) fn plan_swaps(
    blocks: &[Block],
    cache: &CompressionCache,
    overflow: u64,
    min_swap_tokens: u64,
) -> SwapPlan {
    let mut savings = 0u64;
    let mut skipped = Vec::new();
    for (index, block) in blocks.iter().enumerate() {
        if savings >= overflow {
            return SwapPlan::Swap {
                boundary: index,
                estimated_savings: savings,
                skipped,
            };
        }
        if block.tokens < min_swap_tokens {
            skipped.push(index);
            continue;
        }
        savings += estimated_savings_for(block, cache);
    }
    // Covering the overflow would take every block, including the most
    // recent one. Defer instead.
    SwapPlan::NeedMoreBlocks {
        min_blocks: blocks.len() + 1,
    }
}

fn estimated_savings_for(block: &Block, cache: &CompressionCache) -> u64 {
    if let Some(entry) = cache.get(&block.hash) {
        return entry.savings();
    }
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let estimated = (block.tokens as f64 * UNCACHED_COMPRESSION_RATIO) as u64;
    estimated
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

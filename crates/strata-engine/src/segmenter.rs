//! Turn grouping and block segmentation.
//!
//! The segmenter turns the ordered entry log into a list of [`Block`]s, the
//! units every other stage operates on. Segmentation is deterministic: the
//! same entry log always yields the same blocks with the same content hashes,
//! which is what lets the compression cache survive across rounds and
//! restarts.
//!
//! Entries are grouped into turns first (a turn starts at each human entry),
//! then each turn is packed greedily into blocks under the token budget.
//! Contiguous tool traffic moves as one atomic unit so an invocation is never
//! separated from its results, and a single oversized entry is hard-split at
//! character boundaries, preferring a nearby newline.

use strata_core::text::split_point;
use strata_core::tokens::tokens_to_chars;
use strata_core::{Entry, EntryId, content_hash, estimate_tokens};

/// Fraction of the fragment size searched backward for a newline when
/// hard-splitting an oversized entry.
const SPLIT_WINDOW_DIVISOR: usize = 8;

// ─────────────────────────────────────────────────────────────────────────────
// Block
// ─────────────────────────────────────────────────────────────────────────────

/// A contiguous span of rendered conversation, the unit of compression.
///
/// Blocks are identified by the content hash of their rendered text, so two
/// rounds that segment the same span produce the same block identity.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    /// IDs of the entries this block covers, in log order. A hard-split
    /// fragment repeats its source entry's ID.
    pub entry_ids: Vec<EntryId>,
    /// The rendered text of the span.
    pub text: String,
    /// Short content hash of `text`.
    pub hash: String,
    /// Estimated token count of `text`.
    pub tokens: u64,
}

impl Block {
    fn from_text(entry_ids: Vec<EntryId>, text: String) -> Self {
        let hash = content_hash(&text);
        let tokens = estimate_tokens(&text);
        Self {
            entry_ids,
            text,
            hash,
            tokens,
        }
    }

    /// ID of the first entry covered by this block.
    #[must_use]
    pub fn first_entry_id(&self) -> Option<&EntryId> {
        self.entry_ids.first()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Segmentation
// ─────────────────────────────────────────────────────────────────────────────

/// An entry paired with its rendering, computed once per segmentation pass.
struct RenderedEntry<'a> {
    entry: &'a Entry,
    text: String,
    tokens: u64,
}

impl<'a> RenderedEntry<'a> {
    fn new(entry: &'a Entry) -> Self {
        let text = entry.render();
        let tokens = estimate_tokens(&text);
        Self {
            entry,
            text,
            tokens,
        }
    }
}

/// Segment the entry log into blocks under `block_tokens`.
///
/// Concatenating the returned blocks' texts in order reproduces the rendered
/// log exactly; segmentation never reorders, drops, or rewrites content.
#[must_use]
pub fn segment(entries: &[Entry], block_tokens: u64) -> Vec<Block> {
    let rendered: Vec<RenderedEntry<'_>> = entries.iter().map(RenderedEntry::new).collect();
    let mut blocks = Vec::new();
    for (start, end) in turn_ranges(entries) {
        segment_turn(&rendered[start..end], block_tokens, &mut blocks);
    }
    blocks
}

/// Split the log into turn ranges.
///
/// A turn starts at each human entry; everything that follows up to the next
/// human entry belongs to it. Tool results carry their own role, so a result
/// answering a preceding invocation never opens a turn. A log that does not
/// begin with a human entry still gets a leading turn.
fn turn_ranges(entries: &[Entry]) -> Vec<(usize, usize)> {
    let mut starts = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        if index == 0 || entry.is_human() {
            starts.push(index);
        }
    }
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(entries.len());
            (start, end)
        })
        .collect()
}

/// Pack one turn into blocks.
///
/// A turn that fits the budget whole becomes a single block. Otherwise its
/// entries accumulate greedily, flushing before an append would exceed the
/// budget. Contiguous tool traffic is appended as one atomic unit; a unit
/// that alone exceeds the budget becomes its own oversized block rather than
/// being split. A single oversized non-tool entry is hard-split instead.
fn segment_turn(turn: &[RenderedEntry<'_>], block_tokens: u64, out: &mut Vec<Block>) {
    if turn.is_empty() {
        return;
    }
    let total: u64 = turn.iter().map(|r| r.tokens).sum();
    if total <= block_tokens {
        let items: Vec<&RenderedEntry<'_>> = turn.iter().collect();
        out.push(block_from_run(&items));
        return;
    }

    let mut run: Vec<&RenderedEntry<'_>> = Vec::new();
    let mut run_tokens = 0u64;
    let mut index = 0;
    while index < turn.len() {
        let item = &turn[index];
        if item.entry.is_tool_traffic() {
            let mut end = index;
            while end < turn.len() && turn[end].entry.is_tool_traffic() {
                end += 1;
            }
            let unit: Vec<&RenderedEntry<'_>> = turn[index..end].iter().collect();
            let unit_tokens: u64 = unit.iter().map(|r| r.tokens).sum();
            if unit_tokens > block_tokens {
                // Atomic unit larger than the budget: emit it whole.
                flush_run(&mut run, &mut run_tokens, out);
                out.push(block_from_run(&unit));
            } else {
                if run_tokens > 0 && run_tokens + unit_tokens > block_tokens {
                    flush_run(&mut run, &mut run_tokens, out);
                }
                run.extend(unit);
                run_tokens += unit_tokens;
            }
            index = end;
            continue;
        }

        if item.tokens > block_tokens {
            flush_run(&mut run, &mut run_tokens, out);
            hard_split(item, block_tokens, out);
            index += 1;
            continue;
        }

        if run_tokens > 0 && run_tokens + item.tokens > block_tokens {
            flush_run(&mut run, &mut run_tokens, out);
        }
        run.push(item);
        run_tokens += item.tokens;
        index += 1;
    }
    flush_run(&mut run, &mut run_tokens, out);
}

fn flush_run(run: &mut Vec<&RenderedEntry<'_>>, run_tokens: &mut u64, out: &mut Vec<Block>) {
    if run.is_empty() {
        return;
    }
    out.push(block_from_run(run));
    run.clear();
    *run_tokens = 0;
}

fn block_from_run(run: &[&RenderedEntry<'_>]) -> Block {
    let mut entry_ids = Vec::with_capacity(run.len());
    let mut text = String::new();
    for item in run {
        entry_ids.push(item.entry.id.clone());
        text.push_str(&item.text);
    }
    Block::from_text(entry_ids, text)
}

/// Split one oversized entry's rendering into budget-sized fragments.
///
/// Cuts land at char boundaries, preferring a newline within a trailing
/// window so fragments tend to break between lines. Every fragment carries
/// the source entry's ID.
fn hard_split(item: &RenderedEntry<'_>, block_tokens: u64, out: &mut Vec<Block>) {
    let fragment_bytes = tokens_to_chars(block_tokens).max(1);
    let window = fragment_bytes / SPLIT_WINDOW_DIVISOR;
    let mut rest = item.text.as_str();
    while !rest.is_empty() {
        if rest.len() <= fragment_bytes {
            out.push(Block::from_text(
                vec![item.entry.id.clone()],
                rest.to_owned(),
            ));
            break;
        }
        let cut = split_point(rest, fragment_bytes, window);
        out.push(Block::from_text(
            vec![item.entry.id.clone()],
            rest[..cut].to_owned(),
        ));
        rest = &rest[cut..];
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

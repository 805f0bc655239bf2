//! UTF-8–safe text truncation and splitting utilities.
//!
//! Rust `&str[..n]` panics when `n` falls inside a multi-byte character.
//! These helpers find safe boundaries, whether capping a string at a byte
//! budget or cutting an oversized message near an arbitrary offset.

/// Truncate a string to at most `max_bytes` bytes at a char boundary.
///
/// Returns the longest prefix of `s` whose byte length is ≤ `max_bytes`
/// and that does not split a multi-byte character.
#[inline]
#[must_use]
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    // `floor_char_boundary` is nightly-only, so implement it ourselves.
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Find a split offset at or near `target`, preferring a newline.
///
/// Searches backward from the char-boundary-clamped target by at most
/// `window` bytes for a `'\n'` and, when found, splits just after it so the
/// left fragment keeps the line ending. Falls back to the plain boundary cut
/// otherwise. Never returns `0` for a non-empty input, so a splitting loop
/// always makes progress.
#[must_use]
pub fn split_point(s: &str, target: usize, window: usize) -> usize {
    if target >= s.len() {
        return s.len();
    }
    let mut cut = target;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }

    let floor = cut.saturating_sub(window);
    if let Some(pos) = s[floor..cut].rfind('\n') {
        return floor + pos + 1;
    }

    if cut == 0 {
        // Target landed inside the first char; advance to its end instead.
        let mut end = target.max(1).min(s.len());
        while end < s.len() && !s.is_char_boundary(end) {
            end += 1;
        }
        return end;
    }
    cut
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

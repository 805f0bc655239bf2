//! Token estimation heuristics.
//!
//! The engine never sees real tokenizer output; every budget decision uses
//! the chars/4 approximation, which is what the host's own accounting uses.

/// Approximate characters per token.
pub const CHARS_PER_TOKEN: u64 = 4;

/// Estimate the token count of a text (`ceil(bytes / 4)`).
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(CHARS_PER_TOKEN)
}

/// Convert a token budget to a character budget.
#[must_use]
pub fn tokens_to_chars(tokens: u64) -> usize {
    usize::try_from(tokens.saturating_mul(CHARS_PER_TOKEN)).unwrap_or(usize::MAX)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn rounds_up() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn four_chars_per_token() {
        let text = "x".repeat(4000);
        assert_eq!(estimate_tokens(&text), 1000);
    }

    #[test]
    fn tokens_to_chars_inverts_the_ratio() {
        assert_eq!(tokens_to_chars(1000), 4000);
    }
}

//! The sole string-stitching primitive allowed anywhere in the pipeline.
//!
//! Centralizing overlap merging here means every continuation/extension
//! decision (finalization extension, forced-final recovery merge, partial
//! promotion) goes through one audited function instead of ad-hoc substring
//! tests scattered across engines.

/// Collapse runs of whitespace to single spaces and trim the ends.
///
/// All merge and word-relation comparisons operate on whitespace-collapsed
/// text, never on raw provider output.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Longest `k` such that the last `k` characters of `prev` equal the first
/// `k` characters of `cur`. Operates on whitespace-collapsed, case-sensitive
/// char sequences (not bytes, so multi-byte text never panics on a slice).
fn longest_suffix_prefix_overlap(prev: &[char], cur: &[char]) -> usize {
    let max_k = prev.len().min(cur.len());
    for k in (1..=max_k).rev() {
        if prev[prev.len() - k..] == cur[..k] {
            return k;
        }
    }
    0
}

/// Merge two overlapping hypotheses: `prev` (the authoritative predecessor)
/// and `cur` (a candidate continuation/extension).
///
/// Returns `prev + cur[k:]` where `k` is the longest suffix of `prev` that
/// is also a prefix of `cur`, provided that concatenation grows `prev` by at
/// least 3 characters and the overlap itself is at least 3 characters long.
/// Returns `None` when no sufficiently long overlap exists, or when `cur` is
/// entirely contained within `prev` (no forward progress).
pub fn merge_with_overlap(prev: &str, cur: &str) -> Option<String> {
    let prev = collapse_whitespace(prev);
    let cur = collapse_whitespace(cur);
    if prev.is_empty() || cur.is_empty() {
        return None;
    }

    let prev_chars: Vec<char> = prev.chars().collect();
    let cur_chars: Vec<char> = cur.chars().collect();

    let k = longest_suffix_prefix_overlap(&prev_chars, &cur_chars);
    if k < 3 {
        return None;
    }

    let growth = cur_chars.len() - k;
    if growth < 3 {
        return None;
    }

    let suffix: String = cur_chars[k..].iter().collect();
    Some(format!("{prev}{suffix}"))
}

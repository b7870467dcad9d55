//! The stem-aware word-relation predicate: the second centralized primitive
//! every cross-segment dedup and continuation decision is built from.

use crate::merge::collapse_whitespace;

/// Suffixes treated as inflection, not a different word.
const INFLECTION_SUFFIXES: &[&str] = &["s", "es", "d", "ed", "ing", "er", "ers", "ly"];

/// Lowercase a word and strip everything but alphanumerics, so punctuation
/// and casing never affect a relation judgement.
fn normalize_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn is_inflected_variant(shorter: &str, longer: &str) -> bool {
    if !longer.starts_with(shorter) {
        return false;
    }
    let suffix = &longer[shorter.len()..];
    INFLECTION_SUFFIXES.contains(&suffix)
}

/// Classic edit-distance, used only as a tiebreak once stem/prefix checks
/// have already failed.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut prev_diag = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            let new_val = (row[j] + 1).min(row[j - 1] + 1).min(prev_diag + cost);
            prev_diag = row[j];
            row[j] = new_val;
        }
    }
    row[b.len()]
}

/// Whether two words are "the same word" for continuation/dedup purposes:
/// exact match after normalization, an inflected variant of one another, or
/// within a 0.3 edit-distance ratio of each other.
pub fn words_related(a: &str, b: &str) -> bool {
    let na = normalize_word(a);
    let nb = normalize_word(b);
    if na.is_empty() || nb.is_empty() {
        return na == nb;
    }
    if na == nb {
        return true;
    }
    let (shorter, longer) = if na.len() <= nb.len() { (&na, &nb) } else { (&nb, &na) };
    if is_inflected_variant(shorter, longer) {
        return true;
    }
    let dist = levenshtein(&na, &nb);
    let max_len = na.chars().count().max(nb.chars().count());
    if max_len == 0 {
        return true;
    }
    (dist as f32 / max_len as f32) <= 0.3
}

/// Whether `haystack` starts with `needle`, tolerating minor trailing
/// divergence once the first 5 characters line up exactly. Used to compare
/// a partial snapshot against a finalization base that may have since picked
/// up small corrections.
pub fn prefix_matches_tolerant(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    if haystack.starts_with(needle) {
        return true;
    }
    let needle_chars: Vec<char> = needle.chars().collect();
    if needle_chars.len() < 5 {
        return false;
    }
    let haystack_chars: Vec<char> = haystack.chars().collect();
    if haystack_chars.len() < needle_chars.len() {
        return false;
    }
    if needle_chars[..5] != haystack_chars[..5] {
        return false;
    }
    let compare_len = needle_chars.len();
    let mismatches = needle_chars
        .iter()
        .zip(haystack_chars[..compare_len].iter())
        .filter(|(a, b)| a != b)
        .count();
    (mismatches as f32 / compare_len as f32) <= 0.2
}

/// Words in `extended` beyond the word count of `base`.
pub fn missing_words(base: &str, extended: &str) -> Vec<String> {
    let base_words: Vec<&str> = base.split_whitespace().collect();
    let ext_words: Vec<&str> = extended.split_whitespace().collect();
    if ext_words.len() <= base_words.len() {
        return Vec::new();
    }
    ext_words[base_words.len()..].iter().map(|s| s.to_string()).collect()
}

/// Longest `m` such that the last `m` words of `tail` are pairwise related
/// to the first `m` words of `head`, aligned position by position. The
/// word-level analogue of `merge_with_overlap`'s suffix/prefix search.
fn longest_related_word_overlap(tail: &[String], head: &[String]) -> usize {
    let max_m = tail.len().min(head.len());
    for m in (1..=max_m).rev() {
        let tail_suffix = &tail[tail.len() - m..];
        let head_prefix = &head[..m];
        if tail_suffix
            .iter()
            .zip(head_prefix.iter())
            .all(|(a, b)| words_related(a, b))
        {
            return m;
        }
    }
    0
}

/// Compare the trailing `max_check` words of `predecessor_text` against the
/// leading words of `candidate_words`, and return how many leading words of
/// `candidate_words` should be dropped as a duplicate of the predecessor's
/// tail.
pub fn trim_leading_related_words(
    predecessor_text: &str,
    candidate_words: &[String],
    max_check: usize,
) -> usize {
    let predecessor_words: Vec<String> = collapse_whitespace(predecessor_text)
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();
    if predecessor_words.is_empty() || candidate_words.is_empty() {
        return 0;
    }
    let tail_start = predecessor_words.len().saturating_sub(max_check);
    let tail = &predecessor_words[tail_start..];
    let head_len = max_check.min(candidate_words.len());
    let head = &candidate_words[..head_len];
    longest_related_word_overlap(tail, head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_words_are_related() {
        assert!(words_related("Hello", "hello"));
    }

    #[test]
    fn inflected_variants_are_related() {
        assert!(words_related("gather", "gathered"));
        assert!(words_related("run", "running"));
    }

    #[test]
    fn unrelated_words_are_not_related() {
        assert!(!words_related("apple", "orange"));
    }

    #[test]
    fn close_typo_is_related_by_edit_distance() {
        assert!(words_related("necessary", "neccessary"));
    }

    #[test]
    fn tolerant_prefix_allows_minor_trailing_divergence() {
        assert!(prefix_matches_tolerant("hello world!", "hello world."));
        assert!(!prefix_matches_tolerant("goodbye now", "hello world"));
    }

    #[test]
    fn missing_words_reports_only_the_extension() {
        let missing = missing_words("the quick brown", "the quick brown fox jumps");
        assert_eq!(missing, vec!["fox".to_string(), "jumps".to_string()]);
    }

    #[test]
    fn trims_duplicated_leading_words() {
        let predecessor = "we were gathered here today";
        let candidate: Vec<String> = "here today to celebrate"
            .split_whitespace()
            .map(|s| s.to_string())
            .collect();
        let trimmed = trim_leading_related_words(predecessor, &candidate, 10);
        assert_eq!(trimmed, 2);
    }

    #[test]
    fn no_overlap_trims_nothing() {
        let predecessor = "completely unrelated sentence";
        let candidate: Vec<String> = "brand new words entirely"
            .split_whitespace()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(trim_leading_related_words(predecessor, &candidate, 10), 0);
    }
}

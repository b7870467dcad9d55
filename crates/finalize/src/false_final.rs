//! Known incomplete-opening patterns used to flag a short, punctuated final
//! as suspicious rather than genuinely finished ("I've." almost never is).

const INCOMPLETE_OPENINGS: &[&str] = &[
    "i've", "i'm", "i'll", "i'd",
    "you're", "you've", "you'll", "you just",
    "we're", "we've", "we'll", "we have", "we just",
    "they're", "they've", "they'll",
    "it's", "it'll",
    "that's", "that'll",
    "there's", "there'll",
    "let's", "let me",
    "so i", "so we", "so you",
    "and i", "and we", "and you",
    "but i", "but we",
];

/// Whether `text` opens with a pattern that is almost never a complete
/// thought on its own (contractions and discourse connectives that
/// typically continue into the next clause).
pub fn is_false_final_opening(text: &str) -> bool {
    let normalized: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '\'')
        .collect::<String>()
        .to_lowercase();
    INCOMPLETE_OPENINGS.iter().any(|pattern| normalized.starts_with(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_contraction_openings() {
        assert!(is_false_final_opening("I've been thinking."));
        assert!(is_false_final_opening("You just need to."));
        assert!(is_false_final_opening("We have."));
    }

    #[test]
    fn complete_looking_sentences_are_not_flagged() {
        assert!(!is_false_final_opening("The meeting starts at noon."));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(is_false_final_opening("i'm not sure yet."));
    }
}

//! A small bounded cache of original-text -> corrected-text mappings,
//! applied longest-original-first so a cached correction for a full
//! sentence takes priority over one for a sub-phrase it contains.

use std::collections::VecDeque;

const DEFAULT_CAPACITY: usize = 20;

#[derive(Debug)]
pub struct GrammarCache {
    capacity: usize,
    // Insertion order, oldest first, for simple LRU eviction.
    order: VecDeque<String>,
    entries: std::collections::HashMap<String, String>,
}

impl Default for GrammarCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl GrammarCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, order: VecDeque::new(), entries: std::collections::HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, original: impl Into<String>, corrected: impl Into<String>) {
        let original = original.into();
        if self.entries.contains_key(&original) {
            self.order.retain(|k| k != &original);
        } else if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
        self.order.push_back(original.clone());
        self.entries.insert(original, corrected.into());
    }

    /// Apply every cached correction whose original substring still appears
    /// in `text`, longest original first so overlapping cache entries don't
    /// get applied out of priority order.
    pub fn apply(&self, text: &str) -> String {
        let mut originals: Vec<&String> = self.entries.keys().collect();
        originals.sort_by_key(|k| std::cmp::Reverse(k.chars().count()));

        let mut result = text.to_string();
        for original in originals {
            if result.contains(original.as_str()) {
                let corrected = &self.entries[original];
                result = result.replace(original.as_str(), corrected);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_a_single_cached_correction() {
        let mut cache = GrammarCache::new(20);
        cache.insert("theyre happy", "They're happy");
        assert_eq!(cache.apply("well, theyre happy today"), "well, They're happy today");
    }

    #[test]
    fn prefers_the_longest_matching_original() {
        let mut cache = GrammarCache::new(20);
        cache.insert("dont", "don't");
        cache.insert("dont worry about it", "Don't worry about it");
        assert_eq!(cache.apply("dont worry about it please"), "Don't worry about it please");
    }

    #[test]
    fn evicts_oldest_entry_once_capacity_is_exceeded() {
        let mut cache = GrammarCache::new(2);
        cache.insert("a", "A");
        cache.insert("b", "B");
        cache.insert("c", "C");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.apply("a b c"), "a B C");
    }

    #[test]
    fn reinserting_an_existing_key_refreshes_its_recency() {
        let mut cache = GrammarCache::new(2);
        cache.insert("a", "A");
        cache.insert("b", "B");
        cache.insert("a", "A2");
        cache.insert("c", "C");
        // "b" was the least recently touched, so it's evicted instead of "a".
        assert_eq!(cache.apply("a b c"), "A2 b C");
    }
}

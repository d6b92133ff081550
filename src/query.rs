//! Query preparation shared by book and corpus search

use crate::normalize::normalize_arabic_for_search;

/// Minimum number of words a query needs before any scan is attempted.
pub const MIN_QUERY_WORDS: usize = 2;

/// Normalize a user query: diacritics and case folded, whitespace collapsed.
pub fn normalize_query(text: &str) -> String {
    normalize_arabic_for_search(text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn count_query_words(text: &str) -> usize {
    normalize_arabic_for_search(text).split_whitespace().count()
}

pub fn has_minimum_query_words(text: &str, min_words: usize) -> bool {
    count_query_words(text) >= min_words
}

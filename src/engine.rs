//! In-memory search over the lines of one opened book part
//!
//! The engine keeps a token -> line index built from the normalized lines.
//! Token intersection only narrows the candidates; every candidate is then
//! confirmed with a normalized substring test, because a query may match
//! part of a token or span several tokens.

use crate::normalize::normalize_arabic_for_search;
use crate::query::{count_query_words, normalize_query, MIN_QUERY_WORDS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One searchable line of a parsed book part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEntry {
    pub line: String,
    pub normalized_line: String,
    pub page_index: usize,
    pub chapter_title: String,
    pub chapter_id: String,
}

impl LineEntry {
    pub fn new(
        line: impl Into<String>,
        page_index: usize,
        chapter_title: impl Into<String>,
        chapter_id: impl Into<String>,
    ) -> Self {
        let line = line.into();
        let normalized_line = normalize_arabic_for_search(&line);
        Self {
            line,
            normalized_line,
            page_index,
            chapter_title: chapter_title.into(),
            chapter_id: chapter_id.into(),
        }
    }
}

/// Result of a book search. `normalized_query` is empty when the query was
/// rejected as too short.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookSearchResults<'a> {
    pub normalized_query: String,
    pub matches: Vec<&'a LineEntry>,
}

impl BookSearchResults<'_> {
    fn rejected() -> Self {
        Self {
            normalized_query: String::new(),
            matches: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchEngine {
    entries: Vec<LineEntry>,
    // Entry indices per token, ascending and without duplicates.
    token_index: HashMap<String, Vec<usize>>,
    min_query_words: usize,
}

impl SearchEngine {
    pub fn new(entries: Vec<LineEntry>) -> Self {
        let mut token_index: HashMap<String, Vec<usize>> = HashMap::new();

        for (idx, entry) in entries.iter().enumerate() {
            for token in entry.normalized_line.split_whitespace() {
                let postings = token_index.entry(token.to_string()).or_default();
                if postings.last() != Some(&idx) {
                    postings.push(idx);
                }
            }
        }

        Self {
            entries,
            token_index,
            min_query_words: MIN_QUERY_WORDS,
        }
    }

    pub fn with_min_query_words(mut self, min_query_words: usize) -> Self {
        self.min_query_words = min_query_words.max(1);
        self
    }

    pub fn entries(&self) -> &[LineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.token_index.len()
    }

    /// Entries whose tokens can hold the query words in order, ascending.
    ///
    /// Inner words must be whole tokens. The first word may be the tail of a
    /// longer token and the last word its head; a lone word may sit anywhere
    /// inside a token.
    fn candidates(&self, tokens: &[&str]) -> Vec<usize> {
        let last = tokens.len().saturating_sub(1);
        let mut lists: Vec<Vec<usize>> = Vec::with_capacity(tokens.len());

        for (i, &token) in tokens.iter().enumerate() {
            let postings = match (i == 0, i == last) {
                (false, false) => self.token_index.get(token).cloned().unwrap_or_default(),
                (true, true) => self.postings_where(|indexed| indexed.contains(token)),
                (true, false) => self.postings_where(|indexed| indexed.ends_with(token)),
                (false, true) => self.postings_where(|indexed| indexed.starts_with(token)),
            };
            if postings.is_empty() {
                return Vec::new();
            }
            lists.push(postings);
        }
        lists.sort_by_key(|postings| postings.len());

        let Some((shortest, rest)) = lists.split_first() else {
            return Vec::new();
        };
        shortest
            .iter()
            .copied()
            .filter(|idx| rest.iter().all(|postings| postings.binary_search(idx).is_ok()))
            .collect()
    }

    // Union of the postings of every indexed token accepted by `accept`.
    fn postings_where(&self, accept: impl Fn(&str) -> bool) -> Vec<usize> {
        let mut merged: Vec<usize> = self
            .token_index
            .iter()
            .filter(|(indexed, _)| accept(indexed.as_str()))
            .flat_map(|(_, postings)| postings.iter().copied())
            .collect();
        merged.sort_unstable();
        merged.dedup();
        merged
    }

    pub fn search(&self, query: &str) -> BookSearchResults<'_> {
        if count_query_words(query) < self.min_query_words {
            return BookSearchResults::rejected();
        }

        let normalized_query = normalize_query(query);
        let tokens: Vec<&str> = normalized_query.split_whitespace().collect();

        let matches = self
            .candidates(&tokens)
            .into_iter()
            .map(|idx| &self.entries[idx])
            .filter(|entry| entry.normalized_line.contains(&normalized_query))
            .collect();

        BookSearchResults {
            normalized_query,
            matches,
        }
    }
}

/// Search a plain slice of entries without an index. Same results as
/// [`SearchEngine::search`] minus the token narrowing.
pub fn search_entries<'a>(entries: &'a [LineEntry], query: &str) -> BookSearchResults<'a> {
    if count_query_words(query) < MIN_QUERY_WORDS {
        return BookSearchResults::rejected();
    }

    let normalized_query = normalize_query(query);
    let matches = entries
        .iter()
        .filter(|entry| entry.normalized_line.contains(&normalized_query))
        .collect();

    BookSearchResults {
        normalized_query,
        matches,
    }
}

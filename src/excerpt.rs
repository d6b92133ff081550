//! Match excerpts and highlight ranges cut from the original text

use crate::normalize::{build_normalized_index_map, normalize_arabic_for_search};
use serde::Serialize;
use std::ops::Range;

pub const ELLIPSIS: char = '…';

/// Context kept on each side of a match, in normalized chars.
pub const DEFAULT_EXCERPT_RADIUS: usize = 120;

/// Build a bounded excerpt of `line` centred on the first occurrence of
/// `normalized_query`.
///
/// Lines of at most `2 * radius` chars (in NFC) are returned whole. A radius
/// of zero falls back to [`DEFAULT_EXCERPT_RADIUS`].
pub fn build_excerpt(line: &str, normalized_query: &str, radius: usize) -> String {
    let radius = if radius == 0 { DEFAULT_EXCERPT_RADIUS } else { radius };
    let line = line.trim();

    if line.is_empty() {
        return String::new();
    }

    let mapped = build_normalized_index_map(line);
    if mapped.source.chars().count() <= radius * 2 {
        return mapped.source;
    }

    let Some(query_pos) = mapped.find(normalized_query) else {
        let head: String = mapped.source.chars().take(radius * 2).collect();
        return format!("{}{}", head.trim(), ELLIPSIS);
    };

    let query_len = normalized_query.chars().count();
    let start = query_pos.saturating_sub(radius);
    let end = (query_pos + query_len + radius).min(mapped.len());

    let start_original = mapped.source_start(start).unwrap_or(0);
    let end_original = end
        .checked_sub(1)
        .and_then(|last| mapped.source_end(last))
        .unwrap_or(start_original);

    let mut excerpt = String::with_capacity(end_original - start_original + 8);
    if start_original > 0 {
        excerpt.push(ELLIPSIS);
    }
    excerpt.push_str(mapped.source[start_original..end_original].trim());
    if end_original < mapped.source.len() {
        excerpt.push(ELLIPSIS);
    }
    excerpt
}

/// Source text plus the byte ranges to highlight in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Highlighted {
    pub source: String,
    pub ranges: Vec<Range<usize>>,
}

/// Find every diacritic-insensitive occurrence of `query` in `text`.
///
/// Ranges are byte offsets into the NFC form of `text`, extended over the
/// marks that follow the last matched letter. Overlapping hits are dropped.
pub fn highlight_ranges(text: &str, query: &str) -> Highlighted {
    let query = normalize_arabic_for_search(query);
    let mapped = build_normalized_index_map(text);
    let mut ranges: Vec<Range<usize>> = Vec::new();

    let query_len = query.chars().count();
    if query_len == 0 {
        return Highlighted {
            source: mapped.source,
            ranges,
        };
    }

    let mut from = 0;
    let mut cursor = 0;
    while let Some(pos) = mapped.find_from(&query, from) {
        let (Some(start), Some(end)) = (
            mapped.source_start(pos),
            mapped.source_end(pos + query_len - 1),
        ) else {
            break;
        };
        if start >= cursor {
            ranges.push(start..end);
            cursor = end;
        }
        from = pos + 1;
    }

    Highlighted {
        source: mapped.source,
        ranges,
    }
}

//! Arabic-aware text normalization with original-offset recovery
//!
//! Comparison always happens on the normalized form: NFC, Arabic diacritics
//! removed, case folded, then recomposed. `NormalizedIndexMap` keeps the way
//! back to the source text so excerpts and highlights can be cut from the
//! original.

use unicode_normalization::char::{canonical_combining_class, compose};
use unicode_normalization::UnicodeNormalization;

/// True for the Arabic marks ignored by search (harakat, Quranic annotation
/// signs, superscript alef and the extended-Arabic tashkil block).
pub fn is_arabic_diacritic(c: char) -> bool {
    matches!(c,
        '\u{0610}'..='\u{061A}' |
        '\u{064B}'..='\u{065F}' |
        '\u{0670}' |
        '\u{06D6}'..='\u{06ED}' |
        '\u{08D4}'..='\u{08FF}'
    )
}

// Single-char case fold. Characters whose lowercase form expands to several
// chars are kept as-is so every normalized char maps to one source char.
fn fold_char(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

/// Normalize text for search comparison.
pub fn normalize_arabic_for_search(text: &str) -> String {
    let source: String = text.nfc().collect();
    normalized_chars(&source).into_iter().map(|(_, c)| c).collect()
}

// Kept chars of an NFC `source` with their byte offsets. Removing a mark can
// unblock a composition (or folding can enable one), so the kept chars are
// canonically recomposed; a composite keeps the offset of its starter.
fn normalized_chars(source: &str) -> Vec<(usize, char)> {
    let mut out: Vec<(usize, char)> = Vec::with_capacity(source.len());
    let mut starter: Option<usize> = None;
    // Combining class of the last mark kept after the starter.
    let mut last_class: Option<u8> = None;

    for (offset, c) in source.char_indices() {
        if is_arabic_diacritic(c) {
            continue;
        }
        let c = fold_char(c);
        let class = canonical_combining_class(c);

        if let Some(idx) = starter {
            let blocked = matches!(last_class, Some(last) if last == 0 || last >= class);
            if !blocked {
                if let Some(composed) = compose(out[idx].1, c) {
                    out[idx].1 = composed;
                    continue;
                }
            }
        }

        if class == 0 {
            starter = Some(out.len());
            last_class = None;
        } else {
            last_class = Some(class);
        }
        out.push((offset, c));
    }

    out
}

/// A normalized string together with the source offset of each of its chars.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedIndexMap {
    /// NFC form of the input, diacritics retained.
    pub source: String,
    /// Diacritic-free, case-folded form of `source`.
    pub normalized: String,
    /// For the i-th char of `normalized`, the byte offset of its char in `source`.
    pub index_map: Vec<usize>,
}

impl NormalizedIndexMap {
    /// Number of chars in the normalized form.
    pub fn len(&self) -> usize {
        self.index_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_map.is_empty()
    }

    /// Char position in `normalized` of the first occurrence of `needle`
    /// starting at char position `from`.
    pub fn find_from(&self, needle: &str, from: usize) -> Option<usize> {
        if from > self.len() {
            return None;
        }
        let start = self.byte_of_char(from);
        let found = self.normalized[start..].find(needle)?;
        Some(from + self.normalized[start..start + found].chars().count())
    }

    pub fn find(&self, needle: &str) -> Option<usize> {
        self.find_from(needle, 0)
    }

    /// Byte offset in `source` where the normalized char at `position` starts.
    pub fn source_start(&self, position: usize) -> Option<usize> {
        self.index_map.get(position).copied()
    }

    /// Byte offset in `source` just past the normalized char at `position`,
    /// including the marks removed or composed after it.
    pub fn source_end(&self, position: usize) -> Option<usize> {
        self.source_start(position)?;
        Some(
            self.index_map
                .get(position + 1)
                .copied()
                .unwrap_or(self.source.len()),
        )
    }

    fn byte_of_char(&self, position: usize) -> usize {
        self.normalized
            .char_indices()
            .nth(position)
            .map_or(self.normalized.len(), |(i, _)| i)
    }
}

/// Normalize `text` char by char, recording where each kept char came from.
pub fn build_normalized_index_map(text: &str) -> NormalizedIndexMap {
    let source: String = text.nfc().collect();
    let kept = normalized_chars(&source);

    let mut normalized = String::with_capacity(source.len());
    let mut index_map = Vec::with_capacity(kept.len());
    for (offset, c) in kept {
        normalized.push(c);
        index_map.push(offset);
    }

    NormalizedIndexMap {
        source,
        normalized,
        index_map,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strips_harakat() {
        assert_eq!(normalize_arabic_for_search("نصٌ تجريبيّ"), "نص تجريبي");
        assert_eq!(normalize_arabic_for_search("بِسْمِ اللَّهِ"), "بسم الله");
    }

    #[test]
    fn test_folds_case() {
        assert_eq!(normalize_arabic_for_search("Kitāb AL-Umm"), "kitāb al-umm");
    }

    #[test]
    fn test_all_diacritics_is_empty() {
        let mapped = build_normalized_index_map("\u{064E}\u{0651}\u{0670}");
        assert!(mapped.normalized.is_empty());
        assert!(mapped.index_map.is_empty());
        assert_eq!(normalize_arabic_for_search("\u{064E}\u{0651}"), "");
    }

    #[test]
    fn test_index_map_points_at_source_chars() {
        let mapped = build_normalized_index_map("كَتَبَ");
        assert_eq!(mapped.normalized, "كتب");
        assert_eq!(&mapped.source[mapped.source_start(1).unwrap()..mapped.source_end(1).unwrap()], "تَ");
        let recovered: String = (0..mapped.len())
            .map(|i| {
                let start = mapped.source_start(i).unwrap();
                let end = mapped.source_end(i).unwrap();
                mapped.source[start..end].to_string()
            })
            .collect();
        assert_eq!(recovered, mapped.source);
    }

    #[test]
    fn test_removed_mark_lets_latin_marks_compose() {
        let once = normalize_arabic_for_search("e\u{0610}\u{0301}");
        assert_eq!(once, "\u{00E9}");
        assert_eq!(normalize_arabic_for_search(&once), once);

        let mapped = build_normalized_index_map("e\u{0610}\u{0301}x");
        assert_eq!(mapped.normalized, "\u{00E9}x");
        assert_eq!(mapped.index_map, vec![0, 5]);
        assert_eq!(mapped.source_end(0), Some(5));
    }

    #[test]
    fn test_folding_then_composing() {
        // Only the lowercase base has a precomposed form with ring above.
        assert_eq!(normalize_arabic_for_search("Y\u{030A}"), "\u{1E99}");
    }

    #[test]
    fn test_find_reports_char_positions() {
        let mapped = build_normalized_index_map("قالَ الإمامُ");
        assert_eq!(mapped.find("الإمام"), Some(4));
        assert_eq!(mapped.find_from("ا", 2), Some(4));
        assert_eq!(mapped.find("غير"), None);
    }

    fn arabic_text() -> impl Strategy<Value = String> {
        proptest::collection::vec(
            prop_oneof![
                prop::char::range('\u{0621}', '\u{064A}'),
                prop::char::range('\u{064B}', '\u{065F}'),
                prop::char::range('\u{0610}', '\u{061A}'),
                Just('\u{0670}'),
                prop::char::range('a', 'z'),
                prop::char::range('A', 'Z'),
                prop::char::range('\u{0300}', '\u{036F}'),
                Just(' '),
            ],
            0..64,
        )
        .prop_map(|chars| chars.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(s in arabic_text()) {
            let once = normalize_arabic_for_search(&s);
            prop_assert_eq!(normalize_arabic_for_search(&once), once);
        }

        #[test]
        fn prop_index_map_matches_normalized(s in arabic_text()) {
            let mapped = build_normalized_index_map(&s);
            prop_assert_eq!(mapped.index_map.len(), mapped.normalized.chars().count());
            prop_assert!(mapped.index_map.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(&mapped.normalized, &normalize_arabic_for_search(&s));
        }
    }
}

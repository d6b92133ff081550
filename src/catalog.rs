//! Book catalog types, category filtering and match locations

use crate::error::{MaktabaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

/// Filter value selecting books without any category.
pub const UNCATEGORIZED_FILTER: &str = "__uncategorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Declared number of parts. Missing or zero means a single part.
    #[serde(default, alias = "partsCount", alias = "parts_count")]
    pub parts: Option<u32>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub author: Option<String>,
}

impl Book {
    pub fn new(id: impl Into<String>, title: impl Into<String>, parts: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            parts: Some(parts),
            categories: Vec::new(),
            author: None,
        }
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// Trimmed identifier, `None` when blank.
    pub fn book_id(&self) -> Option<&str> {
        let id = self.id.trim();
        (!id.is_empty()).then_some(id)
    }

    pub fn part_count(&self) -> usize {
        match self.parts {
            Some(parts) if parts > 0 => parts as usize,
            _ => 1,
        }
    }

    pub fn display_title(&self) -> &str {
        let title = self.title.trim();
        if title.is_empty() {
            self.id.trim()
        } else {
            title
        }
    }

    fn distinct_categories(&self) -> BTreeSet<&str> {
        self.categories
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect()
    }
}

/// Parse the catalog JSON (an array of books).
pub fn parse_catalog(json: &str) -> Result<Vec<Book>> {
    serde_json::from_str(json).map_err(|e| MaktabaError::Catalog(e.to_string()))
}

pub fn load_catalog(path: &Path) -> Result<Vec<Book>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| MaktabaError::Catalog(format!("{}: {}", path.display(), e)))?;
    parse_catalog(&content)
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CategoryFilter {
    #[default]
    All,
    Uncategorized,
    Named(String),
}

impl From<&str> for CategoryFilter {
    fn from(value: &str) -> Self {
        match value.trim() {
            "" | "all" => CategoryFilter::All,
            UNCATEGORIZED_FILTER => CategoryFilter::Uncategorized,
            name => CategoryFilter::Named(name.to_string()),
        }
    }
}

impl From<String> for CategoryFilter {
    fn from(value: String) -> Self {
        CategoryFilter::from(value.as_str())
    }
}

impl From<CategoryFilter> for String {
    fn from(filter: CategoryFilter) -> Self {
        match filter {
            CategoryFilter::All => "all".to_string(),
            CategoryFilter::Uncategorized => UNCATEGORIZED_FILTER.to_string(),
            CategoryFilter::Named(name) => name,
        }
    }
}

impl CategoryFilter {
    pub fn matches(&self, book: &Book) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Uncategorized => book.distinct_categories().is_empty(),
            CategoryFilter::Named(name) => book.categories.iter().any(|c| c.trim() == name.as_str()),
        }
    }
}

pub fn filter_books_by_category(books: &[Book], filter: &CategoryFilter) -> Vec<Book> {
    books
        .iter()
        .filter(|book| filter.matches(book))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CategoryStats {
    pub sorted_categories: Vec<String>,
    pub has_uncategorized_books: bool,
}

pub fn collect_category_stats(books: &[Book]) -> CategoryStats {
    let mut categories = BTreeSet::new();
    let mut has_uncategorized_books = false;

    for book in books {
        let own = book.distinct_categories();
        if own.is_empty() {
            has_uncategorized_books = true;
        }
        categories.extend(own.into_iter().map(str::to_string));
    }

    CategoryStats {
        sorted_categories: categories.into_iter().collect(),
        has_uncategorized_books,
    }
}

/// Where a match lives: enough to reopen the reader at that page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookLocator {
    pub book_id: String,
    pub part_index: usize,
    pub page_index: usize,
}

impl BookLocator {
    /// Reader link with 1-based part and page numbers.
    pub fn read_href(&self) -> String {
        format!(
            "read?book={}&part={}&page={}",
            encode_component(&self.book_id),
            self.part_index + 1,
            self.page_index + 1
        )
    }
}

impl fmt::Display for BookLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.read_href())
    }
}

fn encode_component(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// Render a number with Arabic-Indic digits.
pub fn to_arabic_indic_number(value: usize) -> String {
    value
        .to_string()
        .chars()
        .map(|d| match d.to_digit(10) {
            Some(n) => char::from_u32(0x0660 + n).unwrap_or(d),
            None => d,
        })
        .collect()
}

/// Human readable location of a match. The part is only named for
/// multi-part books.
pub fn location_label(parts: usize, part_index: usize, page_index: usize) -> String {
    let page_label = to_arabic_indic_number(page_index + 1);
    if parts > 1 {
        let part_label = to_arabic_indic_number(part_index + 1);
        format!("الموضع: الجزء {} - الصفحة {}", part_label, page_label)
    } else {
        format!("الموضع: الصفحة {}", page_label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn books() -> Vec<Book> {
        vec![
            Book::new("kafi", "الكافي", 8).with_categories(["حديث", "عقائد"]),
            Book::new("urwa", "العروة الوثقى", 2).with_categories(["فقه"]),
            Book::new("misc", "رسالة", 1),
            Book::new("tahdhib", "التهذيب", 10).with_categories([" حديث ", ""]),
        ]
    }

    #[test]
    fn test_part_count_defaults_to_one() {
        let mut book = Book::new("x", "x", 0);
        assert_eq!(book.part_count(), 1);
        book.parts = None;
        assert_eq!(book.part_count(), 1);
        book.parts = Some(4);
        assert_eq!(book.part_count(), 4);
    }

    #[test]
    fn test_blank_id_has_no_book_id() {
        assert_eq!(Book::new("  ", "t", 1).book_id(), None);
        assert_eq!(Book::new(" kafi ", "t", 1).book_id(), Some("kafi"));
    }

    #[test]
    fn test_category_filter() {
        let all = books();
        assert_eq!(filter_books_by_category(&all, &CategoryFilter::All).len(), 4);

        let hadith = filter_books_by_category(&all, &CategoryFilter::from("حديث"));
        let ids: Vec<&str> = hadith.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["kafi", "tahdhib"]);

        let none = filter_books_by_category(&all, &CategoryFilter::from(UNCATEGORIZED_FILTER));
        assert_eq!(none.len(), 1);
        assert_eq!(none[0].id, "misc");
    }

    #[test]
    fn test_category_stats() {
        let stats = collect_category_stats(&books());
        assert_eq!(stats.sorted_categories, vec!["حديث", "عقائد", "فقه"]);
        assert!(stats.has_uncategorized_books);
    }

    #[test]
    fn test_parse_catalog() {
        let json = r#"[{"id":"kafi","title":"الكافي","partsCount":8,"categories":["حديث"]},{"id":"x"}]"#;
        let books = parse_catalog(json).unwrap();
        assert_eq!(books[0].part_count(), 8);
        assert_eq!(books[1].part_count(), 1);
        assert_eq!(books[1].display_title(), "x");
        assert!(matches!(parse_catalog("{"), Err(MaktabaError::Catalog(_))));
    }

    #[test]
    fn test_location_label() {
        assert_eq!(location_label(3, 1, 2), "الموضع: الجزء ٢ - الصفحة ٣");
        assert_eq!(location_label(1, 0, 11), "الموضع: الصفحة ١٢");
    }

    #[test]
    fn test_read_href() {
        let locator = BookLocator {
            book_id: "كتاب 1".to_string(),
            part_index: 0,
            page_index: 4,
        };
        assert!(locator.read_href().starts_with("read?book=%D9%83"));
        assert!(locator.read_href().ends_with("%201&part=1&page=5"));
    }
}

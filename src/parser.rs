//! Book part parsing: pages, chapter headings and searchable lines

use crate::engine::LineEntry;
use serde::Serialize;

/// Marker separating pages inside a part's raw text.
pub const PAGE_SEPARATOR: &str = "PAGE_SEPARATOR";

/// Chapter title for lines before the first heading.
pub const DEFAULT_CHAPTER_TITLE: &str = "بداية الكتاب";

/// Lines parsed between two yields in [`parse_book_content_async`].
pub const DEFAULT_PARSE_CHUNK_LINES: usize = 700;

const HEADING_PREFIX: &str = "##";

/// Split a part's raw text into pages. Text without a separator is one page.
pub fn split_book_pages(text: &str) -> Vec<String> {
    text.split(PAGE_SEPARATOR).map(str::to_string).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Block {
    Heading { id: String, text: String },
    Paragraph { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chapter {
    pub title: String,
    pub id: String,
    pub page_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedContent {
    pub pages: Vec<String>,
    pub page_blocks: Vec<Vec<Block>>,
    pub chapters: Vec<Chapter>,
    pub line_entries: Vec<LineEntry>,
}

struct ContentParser {
    content: ParsedContent,
    chapter_index: usize,
    chapter_title: String,
    chapter_id: String,
}

impl ContentParser {
    fn new(text: &str) -> Self {
        Self {
            content: ParsedContent {
                pages: split_book_pages(text),
                ..ParsedContent::default()
            },
            chapter_index: 0,
            chapter_title: DEFAULT_CHAPTER_TITLE.to_string(),
            chapter_id: String::new(),
        }
    }

    fn parse_line(&mut self, line: &str, page_index: usize) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }

        let blocks = &mut self.content.page_blocks[page_index];

        if let Some(rest) = trimmed.strip_prefix(HEADING_PREFIX) {
            let title = rest.trim().to_string();
            let id = format!("chap-{}", self.chapter_index);
            blocks.push(Block::Heading {
                id: id.clone(),
                text: title.clone(),
            });
            self.content.chapters.push(Chapter {
                title: title.clone(),
                id: id.clone(),
                page_index,
            });
            self.chapter_index += 1;
            // An empty heading opens a chapter but keeps the previous title.
            if !title.is_empty() {
                self.chapter_title = title;
            }
            self.chapter_id = id;
            return;
        }

        blocks.push(Block::Paragraph {
            text: trimmed.to_string(),
        });
        self.content.line_entries.push(LineEntry::new(
            trimmed,
            page_index,
            self.chapter_title.clone(),
            self.chapter_id.clone(),
        ));
    }
}

pub fn parse_book_content(text: &str) -> ParsedContent {
    let mut parser = ContentParser::new(text);
    let pages = parser.content.pages.clone();

    for (page_index, page) in pages.iter().enumerate() {
        parser.content.page_blocks.push(Vec::new());
        for line in page.split('\n') {
            parser.parse_line(line, page_index);
        }
    }

    parser.content
}

/// Same as [`parse_book_content`], handing control back to the runtime every
/// `chunk_lines` lines so a large part does not starve other tasks.
pub async fn parse_book_content_async(text: &str, chunk_lines: usize) -> ParsedContent {
    let chunk_lines = if chunk_lines == 0 {
        DEFAULT_PARSE_CHUNK_LINES
    } else {
        chunk_lines
    };
    let mut parser = ContentParser::new(text);
    let pages = parser.content.pages.clone();
    let mut processed = 0usize;

    for (page_index, page) in pages.iter().enumerate() {
        parser.content.page_blocks.push(Vec::new());
        for line in page.split('\n') {
            parser.parse_line(line, page_index);
            processed += 1;
            if processed % chunk_lines == 0 {
                tokio::task::yield_now().await;
            }
        }
    }

    parser.content
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "مقدمة المحقق\n\n## باب العلم\nقال الشيخ\nPAGE_SEPARATOR\nتتمة الباب\n##\nسطر بعد عنوان فارغ";

    #[test]
    fn test_split_pages() {
        assert_eq!(split_book_pages("صفحة واحدة"), vec!["صفحة واحدة"]);
        assert_eq!(split_book_pages("أ PAGE_SEPARATOR ب").len(), 2);
        assert_eq!(split_book_pages(""), vec![""]);
    }

    #[test]
    fn test_parse_tracks_chapters() {
        let content = parse_book_content(SAMPLE);
        assert_eq!(content.pages.len(), 2);
        assert_eq!(content.page_blocks.len(), 2);
        assert_eq!(content.chapters.len(), 2);
        assert_eq!(content.chapters[0].title, "باب العلم");
        assert_eq!(content.chapters[1].page_index, 1);

        let entries = &content.line_entries;
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].chapter_title, DEFAULT_CHAPTER_TITLE);
        assert_eq!(entries[0].chapter_id, "");
        assert_eq!(entries[1].chapter_id, "chap-0");
        assert_eq!(entries[2].page_index, 1);
        // Empty heading keeps the title but moves the id.
        assert_eq!(entries[3].chapter_title, "باب العلم");
        assert_eq!(entries[3].chapter_id, "chap-1");
    }

    #[test]
    fn test_blank_lines_produce_no_blocks() {
        let content = parse_book_content("\n  \n\t\n");
        assert!(content.line_entries.is_empty());
        assert_eq!(content.page_blocks, vec![Vec::<Block>::new()]);
    }

    #[tokio::test]
    async fn test_async_parse_matches_sync() {
        let text = (0..50)
            .map(|i| format!("سطر رقم {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let expected = parse_book_content(&text);
        assert_eq!(parse_book_content_async(&text, 7).await, expected);
        assert_eq!(parse_book_content_async(&text, 0).await, expected);
    }
}

//! Single-book view: open a part, keep its parsed form, search inside it

use crate::cache::{ParsedContentCache, PartKey};
use crate::catalog::Book;
use crate::config::SearchConfig;
use crate::engine::{BookSearchResults, LineEntry, SearchEngine};
use crate::error::{MaktabaError, Result};
use crate::parser::{parse_book_content_async, Block, Chapter, ParsedContent};
use crate::source::{CachedSource, PartSource};
use std::sync::Arc;

/// A parsed part and the search engine over its lines.
#[derive(Debug)]
pub struct ParsedPart {
    pub pages: Vec<String>,
    pub page_blocks: Vec<Vec<Block>>,
    pub chapters: Vec<Chapter>,
    pub engine: SearchEngine,
}

impl ParsedPart {
    pub fn new(content: ParsedContent, min_query_words: usize) -> Self {
        let ParsedContent {
            pages,
            page_blocks,
            chapters,
            line_entries,
        } = content;
        Self {
            pages,
            page_blocks,
            chapters,
            engine: SearchEngine::new(line_entries).with_min_query_words(min_query_words),
        }
    }

    pub fn line_entries(&self) -> &[LineEntry] {
        self.engine.entries()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

#[derive(Debug, Clone)]
struct OpenedPart {
    book_id: String,
    part_index: usize,
    part: Arc<ParsedPart>,
}

pub struct BookView<S> {
    source: Arc<CachedSource<S>>,
    parsed: Arc<ParsedContentCache>,
    config: SearchConfig,
    current: Option<OpenedPart>,
}

impl<S: PartSource> BookView<S> {
    pub fn new(
        source: Arc<CachedSource<S>>,
        parsed: Arc<ParsedContentCache>,
        config: SearchConfig,
    ) -> Self {
        Self {
            source,
            parsed,
            config,
            current: None,
        }
    }

    pub fn current_book_id(&self) -> Option<&str> {
        self.current.as_ref().map(|opened| opened.book_id.as_str())
    }

    pub fn current_part_index(&self) -> Option<usize> {
        self.current.as_ref().map(|opened| opened.part_index)
    }

    pub fn current_part(&self) -> Option<&Arc<ParsedPart>> {
        self.current.as_ref().map(|opened| &opened.part)
    }

    /// Open `part_index` of `book`, clamped to the book's parts.
    ///
    /// Switching to another book first drops every cached part of the
    /// previous one.
    pub async fn open(&mut self, book: &Book, part_index: usize) -> Result<Arc<ParsedPart>> {
        let book_id = book
            .book_id()
            .ok_or_else(|| MaktabaError::NotFound("book has no id".to_string()))?
            .to_string();
        let part_index = part_index.min(book.part_count().saturating_sub(1));

        if let Some(previous) = self.current_book_id() {
            if previous != book_id {
                let previous = previous.to_string();
                self.release(&previous);
                self.current = None;
            }
        }

        let key = PartKey::new(&book_id, part_index);
        let part = match self.parsed.get(&key) {
            Some(part) => part,
            None => {
                let text = self
                    .source
                    .fetch(&book_id, part_index, false)
                    .await?
                    .ok_or_else(|| {
                        MaktabaError::NotFound(format!("{} part {}", book_id, part_index + 1))
                    })?;
                let content = parse_book_content_async(&text, self.config.parse_chunk_lines).await;
                let part = Arc::new(ParsedPart::new(content, self.config.min_query_words));
                self.parsed.put(key, Arc::clone(&part));
                part
            }
        };

        tracing::debug!(%book_id, part_index, lines = part.engine.len(), "opened book part");
        self.current = Some(OpenedPart {
            book_id,
            part_index,
            part: Arc::clone(&part),
        });
        Ok(part)
    }

    /// Search the open part.
    pub fn search(&self, query: &str) -> Result<BookSearchResults<'_>> {
        let opened = self
            .current
            .as_ref()
            .ok_or_else(|| MaktabaError::NotFound("no book part is open".to_string()))?;
        Ok(opened.part.engine.search(query))
    }

    /// Close the view and drop the current book's cached parts.
    pub fn close(&mut self) {
        if let Some(opened) = self.current.take() {
            self.release(&opened.book_id);
        }
    }

    fn release(&self, book_id: &str) {
        let parts = self.source.clear_book(book_id);
        let parsed = self.parsed.clear_book(book_id);
        tracing::trace!(%book_id, parts, parsed, "released book caches");
    }
}

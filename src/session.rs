//! Resumable corpus-wide scan
//!
//! A `ScanSession` walks books -> parts -> pages -> lines, fetching each part
//! on demand. Work is done in bounded chunks (a page count and a wall-clock
//! budget); after each chunk that touched a page the session yields to the
//! runtime. The cursor survives between calls, so asking for more matches
//! later continues exactly where the previous call stopped.
//!
//! Per-part fetch failures are counted and skipped. Anything else that goes
//! wrong inside a chunk ends the session with `error` set.

use crate::cancel::CancellationToken;
use crate::catalog::{location_label, Book, BookLocator};
use crate::config::SearchConfig;
use crate::error::{MaktabaError, Result};
use crate::excerpt::build_excerpt;
use crate::normalize::normalize_arabic_for_search;
use crate::source::PartSource;
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::time::Instant;

/// A render-ready corpus match. Never changes once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub book_id: String,
    pub title: String,
    pub locator: BookLocator,
    pub read_href: String,
    pub location_label: String,
    pub excerpt: String,
}

impl Match {
    pub fn build(
        book: &Book,
        book_id: &str,
        part_index: usize,
        page_index: usize,
        line: &str,
        normalized_query: &str,
        radius: usize,
    ) -> Option<Self> {
        let excerpt = build_excerpt(line, normalized_query, radius);
        if excerpt.is_empty() {
            return None;
        }

        let locator = BookLocator {
            book_id: book_id.to_string(),
            part_index,
            page_index,
        };
        Some(Self {
            book_id: book_id.to_string(),
            title: book.display_title().to_string(),
            read_href: locator.read_href(),
            locator,
            location_label: location_label(book.part_count(), part_index, page_index),
            excerpt,
        })
    }
}

/// Collaborators and limits for one fill call.
pub struct ScanDeps<'a, S: ?Sized> {
    pub source: &'a S,
    pub token: &'a CancellationToken,
    pub config: &'a SearchConfig,
}

impl<'a, S: PartSource + ?Sized> ScanDeps<'a, S> {
    pub fn new(source: &'a S, token: &'a CancellationToken, config: &'a SearchConfig) -> Self {
        Self {
            source,
            token,
            config,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Scanning,
    Completed,
    CompletedWithCap,
    CompletedWithError,
}

// The part currently being scanned.
#[derive(Debug)]
struct OpenPart {
    book_index: usize,
    book_id: String,
    part_index: usize,
    pages: Vec<String>,
    page_index: usize,
    // Next line of the current page; a chunk can stop mid-page.
    line_offset: usize,
}

#[derive(Debug, Default)]
struct ScanCursor {
    book_index: usize,
    part_index: usize,
    open: Option<OpenPart>,
}

impl ScanCursor {
    fn next_book(&mut self) {
        self.book_index += 1;
        self.part_index = 0;
    }
}

#[derive(Debug)]
pub struct ScanSession {
    books: Arc<[Book]>,
    normalized_query: String,
    matches: Vec<Match>,
    cursor: ScanCursor,
    loading: bool,
    started: bool,
    completed: bool,
    reached_match_cap: bool,
    partial_failures: usize,
    error: Option<MaktabaError>,
}

impl ScanSession {
    pub fn new(books: impl Into<Arc<[Book]>>, normalized_query: impl Into<String>) -> Self {
        Self {
            books: books.into(),
            normalized_query: normalized_query.into(),
            matches: Vec::new(),
            cursor: ScanCursor::default(),
            loading: false,
            started: false,
            completed: false,
            reached_match_cap: false,
            partial_failures: 0,
            error: None,
        }
    }

    pub fn books(&self) -> &[Book] {
        &self.books
    }

    pub fn normalized_query(&self) -> &str {
        &self.normalized_query
    }

    /// Matches in discovery order.
    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn reached_match_cap(&self) -> bool {
        self.reached_match_cap
    }

    /// Parts that could not be fetched and were skipped.
    pub fn partial_failures(&self) -> usize {
        self.partial_failures
    }

    pub fn error(&self) -> Option<&MaktabaError> {
        self.error.as_ref()
    }

    pub fn state(&self) -> SessionState {
        match (self.completed, self.started) {
            (false, false) => SessionState::Idle,
            (false, true) => SessionState::Scanning,
            (true, _) if self.error.is_some() => SessionState::CompletedWithError,
            (true, _) if self.reached_match_cap => SessionState::CompletedWithCap,
            (true, _) => SessionState::Completed,
        }
    }

    /// Scan until at least `target` matches are stored, the corpus is
    /// exhausted, the match cap is hit or `deps.token` is cancelled.
    ///
    /// Does nothing while another fill is running, after completion, or when
    /// enough matches are already stored.
    pub async fn fill_matches_until<S: PartSource + ?Sized>(
        &mut self,
        target: usize,
        deps: &ScanDeps<'_, S>,
    ) {
        if self.loading || self.completed || self.matches.len() >= target {
            return;
        }

        self.loading = true;
        self.started = true;
        let mut session = LoadingGuard(self);

        if let Err(e) = session.fill(target, deps).await {
            tracing::error!(query = %session.normalized_query, error = %e, "corpus scan aborted");
            session.error = Some(e);
            session.completed = true;
        }
    }

    async fn fill<S: PartSource + ?Sized>(
        &mut self,
        target: usize,
        deps: &ScanDeps<'_, S>,
    ) -> Result<()> {
        while deps.token.is_active() && !self.completed && self.matches.len() < target {
            self.scan_chunk(target, deps).await?;
        }
        Ok(())
    }

    async fn scan_chunk<S: PartSource + ?Sized>(
        &mut self,
        target: usize,
        deps: &ScanDeps<'_, S>,
    ) -> Result<()> {
        if self.normalized_query.is_empty() {
            return Err(MaktabaError::InvalidQuery("empty search query".to_string()));
        }

        let config = deps.config;
        let max_stored = config.max_stored_matches;
        let limit = target.min(max_stored);
        let frame_budget = config.frame_budget();
        let chunk_started = Instant::now();
        let mut pages_processed = 0usize;

        while deps.token.is_active() && !self.completed && self.matches.len() < limit {
            if pages_processed >= config.page_scan_chunk_size
                || chunk_started.elapsed() >= frame_budget
            {
                break;
            }

            if self.cursor.open.is_none() && !self.prepare_next_part(deps).await? {
                if deps.token.is_active() {
                    tracing::debug!(
                        query = %self.normalized_query,
                        matches = self.matches.len(),
                        partial_failures = self.partial_failures,
                        "corpus scan finished"
                    );
                    self.completed = true;
                }
                break;
            }

            let Some(open) = self.cursor.open.as_mut() else {
                continue;
            };
            if open.page_index >= open.pages.len() {
                self.cursor.open = None;
                continue;
            }

            let book = &self.books[open.book_index];
            let page_done = scan_page(
                open,
                book,
                &self.normalized_query,
                &mut self.matches,
                limit,
                config.excerpt_radius,
            );
            pages_processed += 1;

            if page_done {
                open.page_index += 1;
                open.line_offset = 0;
                if open.page_index >= open.pages.len() {
                    self.cursor.open = None;
                }
            }
        }

        if self.matches.len() >= max_stored {
            if !self.reached_match_cap {
                tracing::info!(query = %self.normalized_query, cap = max_stored, "match cap reached");
            }
            self.completed = true;
            self.reached_match_cap = true;
        }

        if pages_processed > 0 {
            tokio::task::yield_now().await;
        }

        Ok(())
    }

    /// Advance the cursor to the next part with content and open it.
    /// Returns `false` when the corpus is exhausted or the token went stale
    /// while fetching.
    async fn prepare_next_part<S: PartSource + ?Sized>(
        &mut self,
        deps: &ScanDeps<'_, S>,
    ) -> Result<bool> {
        while self.cursor.book_index < self.books.len() {
            let book_index = self.cursor.book_index;
            let book = &self.books[book_index];

            let Some(book_id) = book.book_id().map(str::to_string) else {
                self.cursor.next_book();
                continue;
            };

            if self.cursor.part_index >= book.part_count() {
                self.cursor.next_book();
                continue;
            }

            let part_index = self.cursor.part_index;
            let fetched = deps.source.fetch_part(&book_id, part_index).await;
            if !deps.token.is_active() {
                return Ok(false);
            }
            self.cursor.part_index += 1;

            let text = match fetched {
                Ok(Some(text)) => text,
                Ok(None) => {
                    // A book without its first part has no content at all;
                    // a later gap only means fewer parts than declared.
                    if part_index == 0 {
                        self.cursor.next_book();
                    }
                    continue;
                }
                Err(e) => {
                    tracing::warn!(%book_id, part_index, error = %e, "skipping unreadable part");
                    self.partial_failures += 1;
                    continue;
                }
            };

            let pages = deps.source.split_pages(&text)?;
            self.cursor.open = Some(OpenPart {
                book_index,
                book_id,
                part_index,
                pages,
                page_index: 0,
                line_offset: 0,
            });
            return Ok(true);
        }

        Ok(false)
    }
}

// Clears `loading` when a fill ends, also when its future is dropped while
// suspended on a fetch.
struct LoadingGuard<'a>(&'a mut ScanSession);

impl Deref for LoadingGuard<'_> {
    type Target = ScanSession;

    fn deref(&self) -> &ScanSession {
        self.0
    }
}

impl DerefMut for LoadingGuard<'_> {
    fn deref_mut(&mut self) -> &mut ScanSession {
        self.0
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.loading = false;
    }
}

/// Scan the open part's current page from its line offset. Returns `false`
/// when `limit` was reached before the end of the page.
fn scan_page(
    open: &mut OpenPart,
    book: &Book,
    normalized_query: &str,
    matches: &mut Vec<Match>,
    limit: usize,
    radius: usize,
) -> bool {
    let page = &open.pages[open.page_index];

    for (line_index, line) in page.split('\n').enumerate().skip(open.line_offset) {
        if matches.len() >= limit {
            open.line_offset = line_index;
            return false;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !normalize_arabic_for_search(trimmed).contains(normalized_query) {
            continue;
        }

        if let Some(found) = Match::build(
            book,
            &open.book_id,
            open.part_index,
            open.page_index,
            trimmed,
            normalized_query,
            radius,
        ) {
            matches.push(found);
        }
    }

    true
}

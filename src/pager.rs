//! Global search host: visible window over a growing scan
//!
//! `ResultPager` decides how many matches the caller should show and hands
//! out only the ones not shown yet. `GlobalSearch` ties a pager to the
//! current `ScanSession` and to the generation counter that supersedes it.

use crate::cancel::{CancellationToken, SearchGeneration};
use crate::catalog::{to_arabic_indic_number, Book};
use crate::config::SearchConfig;
use crate::query::{has_minimum_query_words, normalize_query};
use crate::session::{Match, ScanDeps, ScanSession};
use crate::source::PartSource;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

pub const EMPTY_SEARCH_MESSAGE: &str = "لا توجد نتائج مطابقة لكلمات البحث.";

const LOAD_MORE_LABEL: &str = "تحميل المزيد";
const LOADING_LABEL: &str = "جاري التحميل...";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchStatus {
    /// No search running: the query is blank or too short.
    Prompt,
    Searching { found: usize },
    Empty,
    Capped { found: usize },
    PartialFailures { found: usize, failed: usize },
    Complete { found: usize },
    Failed { message: String },
}

impl SearchStatus {
    pub fn of(session: &ScanSession) -> Self {
        if let Some(e) = session.error() {
            return Self::Failed {
                message: e.to_string(),
            };
        }

        let found = session.matches().len();
        if !session.is_completed() {
            return Self::Searching { found };
        }
        if found == 0 {
            return Self::Empty;
        }
        if session.reached_match_cap() {
            return Self::Capped { found };
        }
        if session.partial_failures() > 0 {
            return Self::PartialFailures {
                found,
                failed: session.partial_failures(),
            };
        }
        Self::Complete { found }
    }
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prompt => Ok(()),
            Self::Searching { found } => write!(
                f,
                "تم العثور على {} نتيجة حتى الآن...",
                to_arabic_indic_number(*found)
            ),
            Self::Empty => f.write_str(EMPTY_SEARCH_MESSAGE),
            Self::Capped { found } => write!(
                f,
                "تم عرض أول {} نتيجة حفاظًا على الأداء. ضيّق كلمات البحث لنتائج أدق.",
                to_arabic_indic_number(*found)
            ),
            Self::PartialFailures { found, failed } => write!(
                f,
                "تم العثور على {} نتيجة. تعذر فحص {} جزء.",
                to_arabic_indic_number(*found),
                to_arabic_indic_number(*failed)
            ),
            Self::Complete { found } => {
                write!(f, "تم العثور على {} نتيجة.", to_arabic_indic_number(*found))
            }
            Self::Failed { message } => write!(f, "تعذر استكمال البحث: {}", message),
        }
    }
}

/// State of the "load more" control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadControls {
    pub show: bool,
    pub blocked: bool,
    pub label: &'static str,
}

impl LoadControls {
    pub const HIDDEN: Self = Self {
        show: false,
        blocked: false,
        label: LOAD_MORE_LABEL,
    };
}

#[derive(Debug, Clone)]
pub struct ResultPager {
    visible: usize,
    rendered: usize,
    initial: usize,
    batch: usize,
    cap: usize,
}

impl ResultPager {
    pub fn new(initial: usize, batch: usize, cap: usize) -> Self {
        Self {
            visible: 0,
            rendered: 0,
            initial,
            batch,
            cap,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(
            config.initial_results,
            config.results_batch_size,
            config.max_stored_matches,
        )
    }

    /// Start a new search window.
    pub fn reset(&mut self) {
        self.visible = self.initial.min(self.cap);
        self.rendered = 0;
    }

    pub fn clear(&mut self) {
        self.visible = 0;
        self.rendered = 0;
    }

    pub fn visible(&self) -> usize {
        self.visible
    }

    pub fn rendered(&self) -> usize {
        self.rendered
    }

    /// Matches that became visible since the previous call.
    pub fn render<'m>(&mut self, matches: &'m [Match]) -> &'m [Match] {
        let target = self.visible.min(matches.len()).min(self.cap);
        let start = self.rendered.min(target);
        self.rendered = target;
        &matches[start..target]
    }

    fn has_buffered_results(&self, session: &ScanSession) -> bool {
        self.rendered < session.matches().len()
    }

    fn may_fetch_more(&self, session: &ScanSession) -> bool {
        !session.is_completed() && self.rendered > 0
    }

    pub fn can_load_more(&self, session: &ScanSession) -> bool {
        self.has_buffered_results(session) || self.may_fetch_more(session)
    }

    /// Widen the window by one batch, never past the match cap.
    pub fn grow(&mut self) {
        self.visible = (self.visible + self.batch).min(self.cap);
    }

    pub fn load_controls(&self, session: &ScanSession) -> LoadControls {
        if !self.can_load_more(session) {
            return LoadControls::HIDDEN;
        }
        let blocked = session.is_loading() && !self.has_buffered_results(session);
        LoadControls {
            show: true,
            blocked,
            label: if blocked { LOADING_LABEL } else { LOAD_MORE_LABEL },
        }
    }
}

/// What a caller needs after one start or load-more step.
#[derive(Debug, Clone, Serialize)]
pub struct SearchBatch {
    pub generation: u64,
    pub normalized_query: String,
    /// Matches to append to what was already shown.
    pub new_matches: Vec<Match>,
    pub rendered: usize,
    pub found: usize,
    pub status: SearchStatus,
    pub message: String,
    pub controls: LoadControls,
}

impl SearchBatch {
    fn prompt(generation: u64) -> Self {
        let status = SearchStatus::Prompt;
        Self {
            generation,
            normalized_query: String::new(),
            new_matches: Vec::new(),
            rendered: 0,
            found: 0,
            message: status.to_string(),
            status,
            controls: LoadControls::HIDDEN,
        }
    }
}

struct ActiveSearch {
    session: ScanSession,
    token: CancellationToken,
}

/// One caller's global search: at most one live session at a time.
pub struct GlobalSearch {
    config: SearchConfig,
    generation: SearchGeneration,
    active: Option<ActiveSearch>,
    pager: ResultPager,
}

impl GlobalSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self::with_generation(config, SearchGeneration::new())
    }

    /// Use a generation handle the caller can also bump from elsewhere.
    pub fn with_generation(config: SearchConfig, generation: SearchGeneration) -> Self {
        Self {
            pager: ResultPager::from_config(&config),
            config,
            generation,
            active: None,
        }
    }

    pub fn generation(&self) -> &SearchGeneration {
        &self.generation
    }

    pub fn session(&self) -> Option<&ScanSession> {
        self.active.as_ref().map(|active| &active.session)
    }

    pub fn pager(&self) -> &ResultPager {
        &self.pager
    }

    pub fn status(&self) -> SearchStatus {
        match &self.active {
            Some(active) => SearchStatus::of(&active.session),
            None => SearchStatus::Prompt,
        }
    }

    /// Drop the current session and stop any scan still holding its token.
    pub fn cancel(&mut self) {
        self.generation.cancel();
        self.active = None;
        self.pager.clear();
    }

    /// Start a search over `books`. Blank or too-short queries cancel the
    /// current search and answer with [`SearchStatus::Prompt`].
    ///
    /// Returns `None` if the search was superseded before it produced a batch.
    pub async fn start<S: PartSource + ?Sized>(
        &mut self,
        books: impl Into<Arc<[Book]>>,
        query: &str,
        source: &S,
    ) -> Option<SearchBatch> {
        let normalized_query = normalize_query(query);
        if normalized_query.is_empty()
            || !has_minimum_query_words(query, self.config.min_query_words)
        {
            self.cancel();
            return Some(SearchBatch::prompt(self.generation.current()));
        }

        let token = self.generation.begin();
        tracing::debug!(
            query = %normalized_query,
            generation = token.generation(),
            "starting corpus search"
        );
        self.active = Some(ActiveSearch {
            session: ScanSession::new(books, normalized_query),
            token,
        });
        self.pager.reset();

        self.ensure_visible(source).await
    }

    /// Reveal the next batch, scanning further if the buffer is short.
    pub async fn load_more<S: PartSource + ?Sized>(&mut self, source: &S) -> Option<SearchBatch> {
        let active = self.active.as_ref()?;
        if !active.token.is_active() {
            return None;
        }
        if self.pager.can_load_more(&active.session) {
            self.pager.grow();
        }
        self.ensure_visible(source).await
    }

    async fn ensure_visible<S: PartSource + ?Sized>(&mut self, source: &S) -> Option<SearchBatch> {
        let Self {
            config,
            active,
            pager,
            ..
        } = self;
        let ActiveSearch { session, token } = active.as_mut()?;
        if !token.is_active() {
            return None;
        }

        session
            .fill_matches_until(pager.visible(), &ScanDeps::new(source, token, config))
            .await;

        if !token.is_active() {
            tracing::debug!(generation = token.generation(), "discarding stale search batch");
            return None;
        }

        let new_matches = pager.render(session.matches()).to_vec();
        let status = SearchStatus::of(session);
        Some(SearchBatch {
            generation: token.generation(),
            normalized_query: session.normalized_query().to_string(),
            new_matches,
            rendered: pager.rendered(),
            found: session.matches().len(),
            message: status.to_string(),
            status,
            controls: pager.load_controls(session),
        })
    }
}

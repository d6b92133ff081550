//! Maktaba - Arabic text search over paginated book corpora
//!
//! Library providing normalization, single-book search and the resumable
//! corpus scan behind global search.

// Normalization is the base every other module compares with
pub mod normalize;
pub mod query;
pub mod excerpt;
pub mod engine;
pub mod parser;
pub mod catalog;
pub mod cache;
pub mod source;
pub mod cancel;
pub mod config;
pub mod error;
pub mod session;
pub mod pager;
pub mod reader;

pub use error::{MaktabaError, Result};
pub use normalize::{build_normalized_index_map, normalize_arabic_for_search, NormalizedIndexMap};
pub use query::{has_minimum_query_words, normalize_query, MIN_QUERY_WORDS};
pub use excerpt::{build_excerpt, highlight_ranges, Highlighted};
pub use engine::{search_entries, BookSearchResults, LineEntry, SearchEngine};
pub use parser::{parse_book_content, parse_book_content_async, split_book_pages, ParsedContent};
pub use catalog::{
    collect_category_stats, filter_books_by_category, load_catalog, location_label, Book,
    BookLocator, CategoryFilter, CategoryStats,
};
pub use cache::{ParsedContentCache, PartKey, PartTextCache, TtlLruCache};
pub use source::{CachedSource, DirectorySource, HttpSource, PartSource};
pub use cancel::{CancellationToken, SearchGeneration};
pub use config::{get_data_dir, SearchConfig, Settings};
pub use session::{Match, ScanDeps, ScanSession, SessionState};
pub use pager::{GlobalSearch, LoadControls, ResultPager, SearchBatch, SearchStatus};
pub use reader::{BookView, ParsedPart};

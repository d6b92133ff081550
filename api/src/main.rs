mod slots;

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use maktaba_lib::{
    collect_category_stats, filter_books_by_category, highlight_ranges, load_catalog, Book,
    BookView, CachedSource, CategoryFilter, CategoryStats, DirectorySource, Highlighted,
    HttpSource, MaktabaError, ParsedContentCache, PartSource, PartTextCache, SearchBatch,
    Settings,
};
use serde::{Deserialize, Serialize};
use slots::{SearchSlots, MAX_SEARCH_SLOTS};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

type SharedSource = CachedSource<Arc<dyn PartSource>>;

struct AppState {
    settings: Settings,
    books: Vec<Book>,
    source: Arc<SharedSource>,
    parsed: Arc<ParsedContentCache>,
    slots: SearchSlots,
    started_at: DateTime<Utc>,
}

impl AppState {
    fn new(settings: Settings, books: Vec<Book>, inner: Arc<dyn PartSource>) -> Self {
        let search = &settings.search;
        let parts = Arc::new(PartTextCache::new(
            search.part_cache_entries,
            search.part_cache_ttl(),
        ));
        let parsed = Arc::new(ParsedContentCache::new(
            search.parsed_cache_entries,
            search.parsed_cache_ttl(),
        ));
        let slots = SearchSlots::new(MAX_SEARCH_SLOTS, search.clone());

        Self {
            books,
            source: Arc::new(CachedSource::new(inner, parts)),
            parsed,
            slots,
            started_at: Utc::now(),
            settings,
        }
    }

    fn find_book(&self, id: &str) -> Option<&Book> {
        let id = id.trim();
        self.books.iter().find(|book| book.book_id() == Some(id))
    }
}

// === Request/Response types ===

#[derive(Deserialize)]
struct BooksQuery {
    #[serde(default)]
    category: CategoryFilter,
}

#[derive(Deserialize)]
struct BookSearchQuery {
    q: String,
    /// 1-based, like reader links.
    part: Option<usize>,
}

#[derive(Deserialize)]
struct StartSearchRequest {
    q: String,
    #[serde(default)]
    category: CategoryFilter,
    session: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    books: usize,
    search_slots: usize,
    part_cache: usize,
    parsed_cache: usize,
    started_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct BookHit {
    page_index: usize,
    chapter_title: String,
    chapter_id: String,
    text: Highlighted,
}

#[derive(Serialize)]
struct BookSearchResponse {
    book_id: String,
    part_index: usize,
    normalized_query: String,
    hits: Vec<BookHit>,
}

#[derive(Serialize)]
struct SearchResponse {
    session: String,
    #[serde(flatten)]
    batch: SearchBatch,
}

#[derive(Serialize)]
struct ClearCacheResponse {
    parts: usize,
    parsed: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: MaktabaError) -> ApiError {
    let status = match &err {
        MaktabaError::NotFound(_) => StatusCode::NOT_FOUND,
        MaktabaError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

fn superseded() -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(ErrorResponse {
            error: "search was superseded by a newer request".to_string(),
        }),
    )
}

// === Handlers ===

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        books: state.books.len(),
        search_slots: state.slots.len(),
        part_cache: state.source.cache().stats().0,
        parsed_cache: state.parsed.stats().0,
        started_at: state.started_at,
    })
}

async fn list_books(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BooksQuery>,
) -> Json<Vec<Book>> {
    Json(filter_books_by_category(&state.books, &params.category))
}

async fn list_categories(State(state): State<Arc<AppState>>) -> Json<CategoryStats> {
    Json(collect_category_stats(&state.books))
}

async fn search_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<BookSearchQuery>,
) -> Result<Json<BookSearchResponse>, ApiError> {
    let book = state
        .find_book(&id)
        .ok_or_else(|| api_error(MaktabaError::NotFound(format!("book {}", id))))?;

    let mut view = BookView::new(
        Arc::clone(&state.source),
        Arc::clone(&state.parsed),
        state.settings.search.clone(),
    );
    let part_index = params.part.unwrap_or(1).saturating_sub(1);
    view.open(book, part_index).await.map_err(api_error)?;
    let results = view.search(&params.q).map_err(api_error)?;

    let hits = results
        .matches
        .iter()
        .map(|entry| BookHit {
            page_index: entry.page_index,
            chapter_title: entry.chapter_title.clone(),
            chapter_id: entry.chapter_id.clone(),
            text: highlight_ranges(&entry.line, &results.normalized_query),
        })
        .collect();

    Ok(Json(BookSearchResponse {
        book_id: id.trim().to_string(),
        part_index: view.current_part_index().unwrap_or(part_index),
        normalized_query: results.normalized_query.clone(),
        hits,
    }))
}

async fn start_search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartSearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let books = filter_books_by_category(&state.books, &req.category);
    let (session, slot) = state.slots.get_or_create(req.session.as_deref());

    // Stop the scan holding the slot, if any, before queueing on its lock.
    slot.generation.cancel();
    let mut search = slot.search.lock().await;
    let batch = search
        .start(books, &req.q, state.source.as_ref())
        .await
        .ok_or_else(superseded)?;

    Ok(Json(SearchResponse { session, batch }))
}

async fn load_more(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> Result<Json<SearchResponse>, ApiError> {
    let slot = state
        .slots
        .get(&session)
        .ok_or_else(|| api_error(MaktabaError::NotFound(format!("search session {}", session))))?;

    let mut search = slot.search.lock().await;
    if search.session().is_none() {
        return Err(api_error(MaktabaError::NotFound(
            "no search is running in this session".to_string(),
        )));
    }
    let batch = search
        .load_more(state.source.as_ref())
        .await
        .ok_or_else(superseded)?;

    Ok(Json(SearchResponse { session, batch }))
}

async fn clear_book_cache(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<ClearCacheResponse> {
    let parts = state.source.clear_book(&id);
    let parsed = state.parsed.clear_book(&id);
    tracing::info!(book_id = %id, parts, parsed, "cleared book caches");
    Json(ClearCacheResponse { parts, parsed })
}

fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/books", get(list_books))
        .route("/categories", get(list_categories))
        .route("/books/:id/search", get(search_book))
        .route("/books/:id/cache", delete(clear_book_cache))
        .route("/search", post(start_search))
        .route("/search/:session/more", post(load_more))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load().context("loading settings")?;
    let books = load_catalog(&settings.catalog_path)
        .with_context(|| format!("loading catalog {}", settings.catalog_path.display()))?;

    let inner: Arc<dyn PartSource> = match &settings.remote_base_url {
        Some(base_url) => Arc::new(HttpSource::new(base_url.as_str())?),
        None => Arc::new(DirectorySource::new(&settings.books_dir)),
    };
    tracing::info!(books = books.len(), "catalog loaded");

    let bind_addr = settings.bind_addr.clone();
    let state = Arc::new(AppState::new(settings, books, inner));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", bind_addr);
    axum::serve(listener, app(state)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn corpus() -> (tempfile::TempDir, Arc<AppState>) {
        let dir = tempfile::tempdir().unwrap();
        let lines: Vec<String> = (0..25).map(|i| format!("قال الشيخ {}", i)).collect();
        let kafi = dir.path().join("kafi");
        std::fs::create_dir_all(&kafi).unwrap();
        std::fs::write(kafi.join("book.txt"), lines.join("\n")).unwrap();
        let urwa = dir.path().join("urwa");
        std::fs::create_dir_all(&urwa).unwrap();
        std::fs::write(urwa.join("book.txt"), "## باب\nقالَ الشيخُ هنا\nسطر").unwrap();

        let books = vec![
            Book::new("kafi", "الكافي", 1).with_categories(["حديث"]),
            Book::new("urwa", "العروة", 1).with_categories(["فقه"]),
        ];
        let settings = Settings {
            books_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let inner: Arc<dyn PartSource> = Arc::new(DirectorySource::new(dir.path()));
        (dir, Arc::new(AppState::new(settings, books, inner)))
    }

    async fn call(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app(Arc::clone(state)).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_books_filtered_by_category() {
        let (_dir, state) = corpus();
        let uri = format!("/books?category={}", "%D9%81%D9%82%D9%87");
        let (status, json) = call(&state, Request::get(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().map(Vec::len), Some(1));
        assert_eq!(json[0]["id"], "urwa");
    }

    #[tokio::test]
    async fn test_global_search_and_load_more() {
        let (_dir, state) = corpus();
        let (status, first) = call(
            &state,
            post_json("/search", serde_json::json!({ "q": "قال الشيخ" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["new_matches"].as_array().map(Vec::len), Some(20));
        assert_eq!(first["status"]["kind"], "searching");

        let session = first["session"].as_str().unwrap().to_string();
        let (status, more) = call(
            &state,
            post_json(&format!("/search/{}/more", session), serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(more["new_matches"].as_array().map(Vec::len), Some(6));
        assert_eq!(more["status"]["kind"], "complete");
        assert_eq!(more["new_matches"][5]["book_id"], "urwa");
    }

    #[tokio::test]
    async fn test_short_query_returns_prompt() {
        let (_dir, state) = corpus();
        let (status, json) = call(&state, post_json("/search", serde_json::json!({ "q": "قال" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"]["kind"], "prompt");
    }

    #[tokio::test]
    async fn test_book_search_highlights() {
        let (_dir, state) = corpus();
        let uri = "/books/urwa/search?q=%D9%82%D8%A7%D9%84%20%D8%A7%D9%84%D8%B4%D9%8A%D8%AE";
        let (status, json) = call(&state, Request::get(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["hits"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["hits"][0]["chapter_title"], "باب");
        assert_eq!(json["hits"][0]["text"]["ranges"][0]["start"], 0);

        let (status, _) = call(
            &state,
            Request::get("/books/missing/search?q=a%20b").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let (_dir, state) = corpus();
        let (status, _) = call(&state, post_json("/search/nope/more", serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

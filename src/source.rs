//! Part sources: where the raw text of a book part comes from
//!
//! A book's parts are stored as `book.txt`, `book2.txt`, `book3.txt`, ...
//! A missing part is `Ok(None)`, which is not an error: books may declare
//! more parts than they really have.

use crate::cache::{PartKey, PartTextCache};
use crate::error::{MaktabaError, Result};
use crate::parser::split_book_pages;
use futures_util::future::BoxFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// File name of a part inside its book directory.
pub fn part_file_name(part_index: usize) -> String {
    if part_index == 0 {
        "book.txt".to_string()
    } else {
        format!("book{}.txt", part_index + 1)
    }
}

pub trait PartSource: Send + Sync {
    /// Raw text of one part, `None` when the part does not exist.
    fn fetch_part<'a>(
        &'a self,
        book_id: &'a str,
        part_index: usize,
    ) -> BoxFuture<'a, Result<Option<Arc<str>>>>;

    /// Split fetched part text into pages.
    fn split_pages(&self, text: &str) -> Result<Vec<String>> {
        Ok(split_book_pages(text))
    }
}

impl<S: PartSource + ?Sized> PartSource for Arc<S> {
    fn fetch_part<'a>(
        &'a self,
        book_id: &'a str,
        part_index: usize,
    ) -> BoxFuture<'a, Result<Option<Arc<str>>>> {
        (**self).fetch_part(book_id, part_index)
    }

    fn split_pages(&self, text: &str) -> Result<Vec<String>> {
        (**self).split_pages(text)
    }
}

fn check_book_id(book_id: &str) -> Result<&str> {
    let id = book_id.trim();
    if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
        return Err(MaktabaError::Fetch(format!("invalid book id: {:?}", book_id)));
    }
    Ok(id)
}

/// Reads parts from `<root>/<book_id>/<part file>`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn part_path(&self, book_id: &str, part_index: usize) -> Result<PathBuf> {
        Ok(self
            .root
            .join(check_book_id(book_id)?)
            .join(part_file_name(part_index)))
    }
}

impl PartSource for DirectorySource {
    fn fetch_part<'a>(
        &'a self,
        book_id: &'a str,
        part_index: usize,
    ) -> BoxFuture<'a, Result<Option<Arc<str>>>> {
        Box::pin(async move {
            let path = self.part_path(book_id, part_index)?;
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let text = String::from_utf8(bytes)
                .map_err(|e| MaktabaError::Decode(format!("{}: {}", path.display(), e)))?;
            Ok(Some(Arc::from(text)))
        })
    }
}

/// Fetches parts over HTTP from `<base>/books/<book_id>/<part file>`.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn part_url(&self, book_id: &str, part_index: usize) -> Result<String> {
        Ok(format!(
            "{}/books/{}/{}",
            self.base_url,
            check_book_id(book_id)?,
            part_file_name(part_index)
        ))
    }
}

impl PartSource for HttpSource {
    fn fetch_part<'a>(
        &'a self,
        book_id: &'a str,
        part_index: usize,
    ) -> BoxFuture<'a, Result<Option<Arc<str>>>> {
        Box::pin(async move {
            let url = self.part_url(book_id, part_index)?;
            let response = self
                .client
                .get(&url)
                .header(
                    reqwest::header::ACCEPT,
                    "text/plain, text/*;q=0.9, */*;q=0.1",
                )
                .send()
                .await?;

            if !response.status().is_success() {
                tracing::debug!(%url, status = %response.status(), "part not available");
                return Ok(None);
            }

            let text = response.text().await?;
            Ok(Some(Arc::from(text)))
        })
    }
}

/// Wraps a source with the shared part-text cache.
///
/// Fetches for the same part share one in-flight request. A failed fetch is
/// dropped from the cache so the next caller retries.
pub struct CachedSource<S> {
    inner: S,
    cache: Arc<PartTextCache>,
}

impl<S: PartSource> CachedSource<S> {
    pub fn new(inner: S, cache: Arc<PartTextCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<PartTextCache> {
        &self.cache
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fetch through the cache. With `force` the cached entry is ignored and
    /// replaced by a fresh fetch.
    pub async fn fetch(
        &self,
        book_id: &str,
        part_index: usize,
        force: bool,
    ) -> Result<Option<Arc<str>>> {
        let key = PartKey::new(book_id, part_index);
        let slot = self.cache.slot(&key, force);

        let result = slot
            .get_or_try_init(|| self.inner.fetch_part(&key.book_id, part_index))
            .await;

        match result {
            Ok(text) => Ok(text.clone()),
            Err(e) => {
                self.cache.invalidate(&key, &slot);
                Err(e)
            }
        }
    }

    pub fn clear_book(&self, book_id: &str) -> usize {
        self.cache.clear_book(book_id)
    }
}

impl<S: PartSource> PartSource for CachedSource<S> {
    fn fetch_part<'a>(
        &'a self,
        book_id: &'a str,
        part_index: usize,
    ) -> BoxFuture<'a, Result<Option<Arc<str>>>> {
        Box::pin(self.fetch(book_id, part_index, false))
    }

    fn split_pages(&self, text: &str) -> Result<Vec<String>> {
        self.inner.split_pages(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_part_file_names() {
        assert_eq!(part_file_name(0), "book.txt");
        assert_eq!(part_file_name(1), "book2.txt");
        assert_eq!(part_file_name(9), "book10.txt");
    }

    #[tokio::test]
    async fn test_directory_source_reads_parts() {
        let dir = tempfile::tempdir().unwrap();
        let book_dir = dir.path().join("kafi");
        std::fs::create_dir_all(&book_dir).unwrap();
        std::fs::write(book_dir.join("book.txt"), "الجزء الأول").unwrap();
        std::fs::write(book_dir.join("book2.txt"), [0xff, 0xfe]).unwrap();

        let source = DirectorySource::new(dir.path());
        let first = source.fetch_part("kafi", 0).await.unwrap();
        assert_eq!(first.as_deref(), Some("الجزء الأول"));
        assert!(matches!(
            source.fetch_part("kafi", 1).await,
            Err(MaktabaError::Decode(_))
        ));
        assert_eq!(source.fetch_part("kafi", 2).await.unwrap(), None);
        assert_eq!(source.fetch_part("missing", 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_directory_source_rejects_path_ids() {
        let source = DirectorySource::new("/tmp");
        assert!(source.fetch_part("../etc", 0).await.is_err());
        assert!(source.fetch_part("  ", 0).await.is_err());
    }

    #[test]
    fn test_http_part_url() {
        let source = HttpSource::with_client(reqwest::Client::new(), "https://example.org/");
        assert_eq!(
            source.part_url("kafi", 2).unwrap(),
            "https://example.org/books/kafi/book3.txt"
        );
    }

    struct CountingSource {
        calls: AtomicUsize,
        fail_first: bool,
    }

    impl PartSource for CountingSource {
        fn fetch_part<'a>(
            &'a self,
            _book_id: &'a str,
            part_index: usize,
        ) -> BoxFuture<'a, Result<Option<Arc<str>>>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_first && call == 0 {
                    return Err(MaktabaError::Fetch("connection reset".into()));
                }
                Ok(Some(Arc::from(format!("part {part_index}"))))
            })
        }
    }

    #[tokio::test]
    async fn test_cached_source_fetches_once() {
        let source = CachedSource::new(
            CountingSource {
                calls: AtomicUsize::new(0),
                fail_first: false,
            },
            Arc::new(PartTextCache::default()),
        );
        let (a, b) = tokio::join!(source.fetch("kafi", 0, false), source.fetch("kafi", 0, false));
        assert_eq!(a.unwrap().as_deref(), Some("part 0"));
        assert_eq!(b.unwrap().as_deref(), Some("part 0"));
        assert_eq!(source.inner().calls.load(Ordering::SeqCst), 1);

        source.fetch("kafi", 0, true).await.unwrap();
        assert_eq!(source.inner().calls.load(Ordering::SeqCst), 2);

        assert_eq!(source.clear_book("kafi"), 1);
    }

    #[tokio::test]
    async fn test_cached_source_retries_after_failure() {
        let source = CachedSource::new(
            CountingSource {
                calls: AtomicUsize::new(0),
                fail_first: true,
            },
            Arc::new(PartTextCache::default()),
        );
        assert!(source.fetch("kafi", 0, false).await.is_err());
        assert_eq!(source.cache().stats().0, 0);
        assert_eq!(
            source.fetch("kafi", 0, false).await.unwrap().as_deref(),
            Some("part 0")
        );
    }
}

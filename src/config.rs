//! Search tunables and host settings
//!
//! Settings are layered with Figment: built-in defaults, then `maktaba.toml`,
//! then `maktaba.<env>.toml` (env from `MAKTABA_ENV`), then `MAKTABA_*`
//! environment variables with `__` separating nested keys
//! (`MAKTABA_SEARCH__EXCERPT_RADIUS=80`).

use crate::error::{MaktabaError, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Hard ceiling on matches stored by one corpus scan.
    pub max_stored_matches: usize,
    /// Matches requested when a corpus search starts.
    pub initial_results: usize,
    /// Matches added by each "load more".
    pub results_batch_size: usize,
    /// Pages scanned per chunk before yielding.
    pub page_scan_chunk_size: usize,
    /// Wall-clock budget of one scan chunk.
    pub scan_frame_budget_ms: u64,
    pub excerpt_radius: usize,
    pub min_query_words: usize,
    pub part_cache_entries: usize,
    pub part_cache_ttl_secs: u64,
    pub parsed_cache_entries: usize,
    pub parsed_cache_ttl_secs: u64,
    pub parse_chunk_lines: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_stored_matches: 500,
            initial_results: 20,
            results_batch_size: 20,
            page_scan_chunk_size: 24,
            scan_frame_budget_ms: 12,
            excerpt_radius: crate::excerpt::DEFAULT_EXCERPT_RADIUS,
            min_query_words: crate::query::MIN_QUERY_WORDS,
            part_cache_entries: crate::cache::MAX_PART_CACHE_ENTRIES,
            part_cache_ttl_secs: crate::cache::PART_CACHE_TTL.as_secs(),
            parsed_cache_entries: crate::cache::MAX_PARSED_CACHE_ENTRIES,
            parsed_cache_ttl_secs: crate::cache::PARSED_CACHE_TTL.as_secs(),
            parse_chunk_lines: crate::parser::DEFAULT_PARSE_CHUNK_LINES,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("max_stored_matches", self.max_stored_matches),
            ("initial_results", self.initial_results),
            ("results_batch_size", self.results_batch_size),
            ("page_scan_chunk_size", self.page_scan_chunk_size),
            ("excerpt_radius", self.excerpt_radius),
            ("min_query_words", self.min_query_words),
            ("part_cache_entries", self.part_cache_entries),
            ("parsed_cache_entries", self.parsed_cache_entries),
            ("parse_chunk_lines", self.parse_chunk_lines),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(MaktabaError::Config(format!("{name} must be positive")));
            }
        }
        if self.scan_frame_budget_ms == 0 {
            return Err(MaktabaError::Config(
                "scan_frame_budget_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn frame_budget(&self) -> Duration {
        Duration::from_millis(self.scan_frame_budget_ms)
    }

    pub fn part_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.part_cache_ttl_secs)
    }

    pub fn parsed_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.parsed_cache_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding one sub-directory of part files per book.
    pub books_dir: PathBuf,
    /// Catalog JSON listing the books.
    pub catalog_path: PathBuf,
    /// Fetch parts over HTTP from this base instead of `books_dir`.
    pub remote_base_url: Option<String>,
    pub bind_addr: String,
    pub search: SearchConfig,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = get_data_dir();
        Self {
            books_dir: data_dir.join("books"),
            catalog_path: data_dir.join("books.json"),
            remote_base_url: None,
            bind_addr: "127.0.0.1:3000".to_string(),
            search: SearchConfig::default(),
        }
    }
}

impl Settings {
    pub fn figment() -> Figment {
        let env_name = std::env::var("MAKTABA_ENV").unwrap_or_else(|_| "dev".to_string());
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("maktaba.toml"))
            .merge(Toml::file(format!("maktaba.{}.toml", env_name)))
            .merge(Env::prefixed("MAKTABA_").split("__"))
    }

    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Settings = figment
            .extract()
            .map_err(|e| MaktabaError::Config(e.to_string()))?;
        settings.search.validate()?;
        Ok(settings)
    }
}

/// Get the data directory
///
/// - `MAKTABA_DATA_DIR` when set
/// - `./data` or `data` next to the executable when it holds a catalog
/// - otherwise the platform data directory (`~/.local/share/Maktaba`, ...)
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MAKTABA_DATA_DIR") {
        return PathBuf::from(dir);
    }

    let local = PathBuf::from("data");
    if local.join("books.json").exists() {
        return local;
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let data_path = exe_dir.join("data");
            if data_path.join("books.json").exists() {
                return data_path;
            }
        }
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("Maktaba");
    }

    local
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_are_valid() {
        let config = SearchConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_stored_matches, 500);
        assert_eq!(config.frame_budget(), Duration::from_millis(12));
    }

    #[test]
    fn test_zero_radius_rejected() {
        let config = SearchConfig {
            excerpt_radius: 0,
            ..SearchConfig::default()
        };
        assert!(matches!(config.validate(), Err(MaktabaError::Config(_))));
    }

    #[test]
    fn test_layered_loading() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "maktaba.toml",
                r#"
                bind_addr = "0.0.0.0:8080"

                [search]
                max_stored_matches = 100
                "#,
            )?;
            jail.set_env("MAKTABA_SEARCH__EXCERPT_RADIUS", "40");

            let settings = Settings::load().expect("settings load");
            assert_eq!(settings.bind_addr, "0.0.0.0:8080");
            assert_eq!(settings.search.max_stored_matches, 100);
            assert_eq!(settings.search.excerpt_radius, 40);
            assert_eq!(settings.search.results_batch_size, 20);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_fail_loading() {
        Jail::expect_with(|jail| {
            jail.set_env("MAKTABA_SEARCH__PAGE_SCAN_CHUNK_SIZE", "0");
            assert!(Settings::load().is_err());
            Ok(())
        });
    }
}

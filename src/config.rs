//! Configuration Management
//!
//! Handles persistent configuration storage for cloudlist.

use crate::filter::{CompileMode, PropertyRegistry};
use crate::list::{CachePolicy, RollOptions, SortOrder, SortState, DEFAULT_PAGE_LIMIT};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when neither the CLI nor the config file
/// name an API endpoint
pub const BASE_URL_ENV: &str = "CLOUDLIST_BASE_URL";

const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_ROLL_MAX_RECORDS: u64 = 10_000;

/// User configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// API endpoint, e.g. `https://hcm.example.com`
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_page_limit")]
    pub page_limit: u64,
    /// Largest result set a full fetch may collect
    #[serde(default = "default_roll_max_records")]
    pub roll_max_records: u64,
    #[serde(default = "default_roll_concurrency")]
    pub roll_concurrency: usize,
    /// Lookup cache lifetime; absent keeps entries for the session
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
    #[serde(default = "default_sort")]
    pub default_sort: String,
    #[serde(default = "default_order")]
    pub default_order: SortOrder,
    /// Reject conditions on fields without a property definition
    #[serde(default)]
    pub strict_compile: bool,
    /// YAML or JSON property definitions
    #[serde(default)]
    pub properties_file: Option<PathBuf>,
}

fn default_page_limit() -> u64 {
    DEFAULT_PAGE_LIMIT
}

fn default_roll_max_records() -> u64 {
    DEFAULT_ROLL_MAX_RECORDS
}

fn default_roll_concurrency() -> usize {
    1
}

fn default_sort() -> String {
    "created_at".to_string()
}

fn default_order() -> SortOrder {
    SortOrder::Desc
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            page_limit: default_page_limit(),
            roll_max_records: default_roll_max_records(),
            roll_concurrency: default_roll_concurrency(),
            cache_ttl_secs: None,
            default_sort: default_sort(),
            default_order: default_order(),
            strict_compile: false,
            properties_file: None,
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cloudlist").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from `path`, falling back to defaults when it is missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get effective API endpoint (CLI > config > environment > localhost)
    pub fn effective_base_url(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.base_url.clone())
            .or_else(|| std::env::var(BASE_URL_ENV).ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    /// Get effective page size (CLI > config)
    pub fn effective_page_limit(&self, cli: Option<u64>) -> u64 {
        cli.unwrap_or(self.page_limit).max(1)
    }

    /// Get effective default sort (CLI > config)
    pub fn effective_sort(&self, field: Option<&str>, order: Option<SortOrder>) -> SortState {
        SortState::new(
            field.unwrap_or(&self.default_sort),
            order.unwrap_or(self.default_order),
        )
    }

    pub fn effective_compile_mode(&self, cli_strict: bool) -> CompileMode {
        if cli_strict || self.strict_compile {
            CompileMode::Strict
        } else {
            CompileMode::Permissive
        }
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            ttl: self.cache_ttl_secs.map(Duration::from_secs),
        }
    }

    /// Roll-fetch settings; `limit` is the page size used per request
    pub fn roll_options(&self, limit: u64) -> RollOptions {
        RollOptions::default()
            .with_limit(limit)
            .with_max_records(self.roll_max_records)
            .with_concurrency(self.roll_concurrency.max(1))
    }

    /// Load property definitions (CLI path > config path); none yields an
    /// empty registry
    pub fn load_properties(&self, cli: Option<&Path>) -> Result<PropertyRegistry> {
        match cli.or(self.properties_file.as_deref()) {
            Some(path) => PropertyRegistry::load(path)
                .with_context(|| format!("Failed to load properties from {}", path.display())),
            None => Ok(PropertyRegistry::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("cloudlist-test-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"page_limit": 20}"#).unwrap();
        assert_eq!(config.page_limit, 20);
        assert_eq!(config.roll_max_records, 10_000);
        assert_eq!(config.default_sort, "created_at");
        assert_eq!(config.default_order, SortOrder::Desc);
        assert!(!config.strict_compile);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let path = temp_path("config.json");
        let config = Config {
            base_url: Some("https://hcm.example.com".to_string()),
            cache_ttl_secs: Some(300),
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_or_invalid_file_falls_back() {
        let path = temp_path("config.json");
        assert_eq!(Config::load_from(&path), Config::default());

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_cli_overrides_config() {
        let config = Config {
            base_url: Some("https://config.example.com".to_string()),
            page_limit: 20,
            ..Config::default()
        };
        assert_eq!(
            config.effective_base_url(Some("http://cli.example.com")),
            "http://cli.example.com"
        );
        assert_eq!(config.effective_base_url(None), "https://config.example.com");
        assert_eq!(config.effective_page_limit(Some(5)), 5);
        assert_eq!(config.effective_page_limit(None), 20);
        assert_eq!(
            config.effective_sort(Some("name"), None),
            SortState::new("name", SortOrder::Desc)
        );
        assert_eq!(config.effective_compile_mode(true), CompileMode::Strict);
        assert_eq!(config.effective_compile_mode(false), CompileMode::Permissive);
    }

    #[test]
    fn test_cache_policy_from_ttl() {
        let mut config = Config::default();
        assert_eq!(config.cache_policy(), CachePolicy::session());
        config.cache_ttl_secs = Some(60);
        assert_eq!(config.cache_policy(), CachePolicy::ttl(Duration::from_secs(60)));
    }
}

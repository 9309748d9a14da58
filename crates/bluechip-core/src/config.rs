//! Configuration management for Bluechip.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. Provider endpoints, credentials and
//! quotas all live here; nothing downstream hard-codes them.

use crate::error::{ConfigError, ConfigResult};
use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration.
///
/// This is loaded from `~/.config/bluechip/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Companies House API and search site
    pub companies_house: CompaniesHouseConfig,
    /// Geocoding provider
    pub geocoding: GeocodingConfig,
    /// Retry behaviour for transient failures
    pub retry: RetryConfig,
    /// Advanced search filters
    pub search: SearchConfig,
    /// Postcode area discovery
    pub postcodes: PostcodeConfig,
    /// Validation cache file
    pub cache: CacheConfig,
    /// Company store
    pub store: StoreConfig,
}

impl AppConfig {
    /// Load configuration from the default path, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, falling back to defaults if absent.
    pub fn load_from(config_path: &Path) -> ConfigResult<Self> {
        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(config_path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `COMPANIES_HOUSE_API_KEY` or `BLUECHIP_COMPANIES_HOUSE_API_KEY`: API key
    /// - `OPENCAGE_API_KEY` or `BLUECHIP_GEOCODING_API_KEY`: geocoder key
    /// - `BLUECHIP_CACHE_PATH`: validation cache file
    /// - `BLUECHIP_DATABASE_PATH`: company store
    /// - `BLUECHIP_MAX_RETRIES`: retry ceiling
    pub fn load_with_env(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(key) = first_env(&["BLUECHIP_COMPANIES_HOUSE_API_KEY", "COMPANIES_HOUSE_API_KEY"])
        {
            self.companies_house.api_key = Some(key);
            tracing::debug!("Override companies_house.api_key from env");
        }

        if let Some(key) = first_env(&["BLUECHIP_GEOCODING_API_KEY", "OPENCAGE_API_KEY"]) {
            self.geocoding.api_key = Some(key);
            tracing::debug!("Override geocoding.api_key from env");
        }

        if let Ok(val) = std::env::var("BLUECHIP_CACHE_PATH") {
            tracing::debug!("Override cache.path from env: {}", val);
            self.cache.path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("BLUECHIP_DATABASE_PATH") {
            tracing::debug!("Override store.database_path from env: {}", val);
            self.store.database_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("BLUECHIP_MAX_RETRIES") {
            if let Ok(retries) = val.parse() {
                self.retry.max_retries = retries;
                tracing::debug!("Override retry.max_retries from env: {}", retries);
            }
        }
    }

    /// Reject values that would stall or misconfigure the pipeline.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.companies_house.rate_limit == 0 {
            return Err(invalid("companies_house.rate_limit", "must be at least 1"));
        }
        if self.companies_house.window_secs == 0 {
            return Err(invalid("companies_house.window_secs", "must be at least 1"));
        }
        if self.geocoding.daily_quota == 0 {
            return Err(invalid("geocoding.daily_quota", "must be at least 1"));
        }
        if self.retry.initial_backoff_ms == 0 {
            return Err(invalid("retry.initial_backoff_ms", "must be at least 1"));
        }
        if self.store.existence == ExistenceBackend::Http && self.store.existence_base_url.is_none()
        {
            return Err(invalid(
                "store.existence_base_url",
                "required when store.existence = \"http\"",
            ));
        }
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/bluechip/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("uk", "bluechip", "bluechip").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .filter(|v| !v.trim().is_empty())
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Companies House REST API and advanced search site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompaniesHouseConfig {
    /// REST API base URL
    pub api_base_url: String,
    /// Advanced search results page
    pub search_url: String,
    /// API key, sent as the basic-auth username
    pub api_key: Option<String>,
    /// Requests admitted per window
    pub rate_limit: usize,
    /// Window length in seconds
    pub window_secs: u64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CompaniesHouseConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.company-information.service.gov.uk".to_string(),
            search_url:
                "https://find-and-update.company-information.service.gov.uk/advanced-search/get-results"
                    .to_string(),
            api_key: None,
            rate_limit: 600,
            window_secs: 300,
            timeout_secs: 30,
        }
    }
}

/// Geocoding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    /// Forward geocoding endpoint
    pub base_url: String,
    /// API key
    pub api_key: Option<String>,
    /// Requests allowed per day; the per-second ceiling is derived from this
    pub daily_quota: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.opencagedata.com/geocode/v1/json".to_string(),
            api_key: None,
            daily_quota: 2500,
            timeout_secs: 30,
        }
    }
}

/// Retry behaviour for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff delay; doubled after every retry
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
        }
    }
}

/// Filters applied to the advanced company search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Only companies incorporated up to this date
    pub incorporated_before: NaiveDate,
    /// Company status filter
    pub company_status: String,
    /// Company type filter
    pub company_type: String,
    /// Hard stop for a single scan, if set
    pub max_pages: Option<u32>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            incorporated_before: NaiveDate::from_ymd_opt(2019, 1, 1).expect("valid date"),
            company_status: "active".to_string(),
            company_type: "ltd".to_string(),
            max_pages: None,
        }
    }
}

/// Postcode area discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostcodeConfig {
    /// Postcode areas to expand into districts (e.g. `SN`)
    pub areas: Vec<String>,
    /// Raw page listing the districts of an area; `{area}` is substituted
    pub source_url_template: String,
}

impl Default for PostcodeConfig {
    fn default() -> Self {
        Self {
            areas: vec!["SN".to_string()],
            source_url_template:
                "https://en.m.wikipedia.org/wiki/Template:Attached_KML/{area}_postcode_area?action=raw"
                    .to_string(),
        }
    }
}

/// Validation cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// JSON file mapping company number to verdict
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("companyCache.json"),
        }
    }
}

/// Where the existence check is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistenceBackend {
    /// Query the company store directly
    #[default]
    Database,
    /// Ask a companies REST endpoint (404 = absent)
    Http,
}

/// Company store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `SQLite` database file
    pub database_path: PathBuf,
    /// Existence check backend
    pub existence: ExistenceBackend,
    /// Base URL of the companies endpoint for the HTTP backend
    pub existence_base_url: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("bluechip.db"),
            existence: ExistenceBackend::Database,
            existence_base_url: None,
        }
    }
}

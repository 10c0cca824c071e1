//! Configuration management for ReviewScope
//!
//! Loads the TOML configuration file, applies profiles and environment
//! overrides, and validates the result before any job is started.

use crate::error::{Result, ScopeError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub apify: ApifyConfig,
    pub openai: OpenAiConfig,
    pub polling: PollingConfig,
    pub enrichment: EnrichmentConfig,
    pub search: SearchConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Listing search and review scrape job provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApifyConfig {
    pub api_key_env: String,
    pub base_url: String,
    pub discovery_actor: String,
    pub scrape_actor: String,
    pub language: String,
    pub request_timeout_secs: u64,
}

/// Text analysis service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key_env: String,
    pub base_url: String,
    pub model: String,
    pub aggregate_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub aggregate_max_tokens: u32,
    pub request_timeout_secs: u64,
}

/// Poll schedules for the two external jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub discovery_interval: String,
    pub discovery_max_attempts: u32,
    pub scrape_interval: String,
    pub scrape_max_attempts: u32,
}

/// Per-place and aggregate analysis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    pub batch_size: usize,
    pub sampling: bool,
    pub sample_per_polarity: usize,
    pub sample_char_limit: usize,
    pub place_review_limit: usize,
}

/// Defaults for listing discovery and review scraping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub location: String,
    pub max_places: u32,
    pub mode: String, // "balanced" or "aggressive"
    pub skip_closed: bool,
    pub max_reviews: u32,
}

/// Local storage for run history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub history_limit: usize,
    pub history_dedup_window: String,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_mode: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ScopeError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ScopeError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ScopeError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| ScopeError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(sampling) = overrides.sampling {
            self.enrichment.sampling = sampling;
        }
        if let Some(model) = overrides.model {
            self.openai.model = model;
        }
        if let Some(mode) = overrides.search_mode {
            self.search.mode = mode;
        }

        ConfigValidator::validate(self)
    }

    /// Apply environment variable overrides
    /// Environment variables in format: REVIEWSCOPE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("REVIEWSCOPE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "OPENAI__MODEL" => {
                self.openai.model = value.to_string();
            }
            "OPENAI__BASE_URL" => {
                self.openai.base_url = value.to_string();
            }
            "APIFY__BASE_URL" => {
                self.apify.base_url = value.to_string();
            }
            "ENRICHMENT__SAMPLING" => {
                self.enrichment.sampling = value
                    .parse()
                    .map_err(|_| invalid_value(path, value, "boolean"))?;
            }
            "ENRICHMENT__BATCH_SIZE" => {
                self.enrichment.batch_size = value
                    .parse()
                    .map_err(|_| invalid_value(path, value, "integer"))?;
            }
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Poll interval for the listing search job
    pub fn discovery_interval(&self) -> Duration {
        parse_duration(&self.polling.discovery_interval).unwrap_or(Duration::from_secs(2))
    }

    /// Poll interval for the review scrape job
    pub fn scrape_interval(&self) -> Duration {
        parse_duration(&self.polling.scrape_interval).unwrap_or(Duration::from_secs(3))
    }

    /// Window in which an identical query is not recorded twice in history
    pub fn history_dedup_window(&self) -> Duration {
        parse_duration(&self.storage.history_dedup_window).unwrap_or(Duration::from_secs(60))
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ScopeError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("reviewscope").join("config.toml"))
    }
}

fn invalid_value(path: &str, value: &str, kind: &str) -> ScopeError {
    ScopeError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}' as {}", value, kind),
    }
}

/// Parse duration strings like "500ms", "2s", "5m", "1h" (bare numbers are seconds)
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (number, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: u64 = number.parse().ok()?;

    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}

/// Expand a leading `~/` to the user's home directory
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ScopeError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| ScopeError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            "presale".to_string(),
            ProfileOverrides {
                sampling: Some(true),
                model: Some("gpt-4o-mini".to_string()),
                search_mode: None,
            },
        );
        profiles.insert(
            "full".to_string(),
            ProfileOverrides {
                sampling: Some(false),
                model: Some("gpt-4o".to_string()),
                search_mode: Some("aggressive".to_string()),
            },
        );

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            apify: ApifyConfig {
                api_key_env: "APIFY_API_KEY".to_string(),
                base_url: "https://api.apify.com/v2".to_string(),
                discovery_actor: "nwua9Gu5YrADL7ZDj".to_string(),
                scrape_actor: "compass~Google-Maps-Reviews-Scraper".to_string(),
                language: "it".to_string(),
                request_timeout_secs: 30,
            },
            openai: OpenAiConfig {
                api_key_env: "OPENAI_API_KEY".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                aggregate_model: "gpt-4o".to_string(),
                temperature: 0.7,
                max_tokens: 2000,
                aggregate_max_tokens: 2500,
                request_timeout_secs: 120,
            },
            polling: PollingConfig {
                discovery_interval: "2s".to_string(),
                discovery_max_attempts: 150,
                scrape_interval: "3s".to_string(),
                scrape_max_attempts: 200,
            },
            enrichment: EnrichmentConfig {
                batch_size: 3,
                sampling: true,
                sample_per_polarity: 20,
                sample_char_limit: 200,
                place_review_limit: 50,
            },
            search: SearchConfig {
                location: String::new(),
                max_places: 50,
                mode: "balanced".to_string(),
                skip_closed: false,
                max_reviews: 100,
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.reviewscope"),
                history_limit: 20,
                history_dedup_window: "60s".to_string(),
            },
            profiles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("2s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration("fast"), None);
        assert_eq!(parse_duration("3d"), None);
    }

    #[test]
    fn test_default_schedules() {
        let config = Config::default();
        assert_eq!(config.discovery_interval(), Duration::from_secs(2));
        assert_eq!(config.scrape_interval(), Duration::from_secs(3));
        assert_eq!(config.polling.discovery_max_attempts, 150);
        assert_eq!(config.polling.scrape_max_attempts, 200);
        assert_eq!(config.history_dedup_window(), Duration::from_secs(60));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.enrichment.batch_size = 5;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.enrichment.batch_size, 5);
        assert_eq!(loaded.apify.api_key_env, "APIFY_API_KEY");
    }

    #[test]
    fn test_apply_profile() {
        let mut config = Config::default();
        config.apply_profile("full").unwrap();
        assert!(!config.enrichment.sampling);
        assert_eq!(config.search.mode, "aggressive");

        assert!(config.apply_profile("missing").is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/reviewscope.toml"));
        assert!(matches!(result, Err(ScopeError::ConfigNotFound { .. })));
    }
}

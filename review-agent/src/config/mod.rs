//! Application configuration
//!
//! Values are resolved in order: built-in defaults, the TOML config file,
//! `.env`, then process environment variables.

pub mod db;
pub mod repository;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::resilience::{PagingConfig, ResilienceConfig, RetryConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub sync: SyncConfig,
    pub retry: RetrySettings,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://review-agent.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// `production` hides error details from HTTP responses and locks the
    /// cache-clear endpoint
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            environment: "development".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub reviews_base_url: String,
    pub business_info_base_url: String,
    pub account_management_base_url: String,
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            reviews_base_url: "https://mybusiness.googleapis.com/v4".to_string(),
            business_info_base_url: "https://mybusinessbusinessinformation.googleapis.com/v1"
                .to_string(),
            account_management_base_url: "https://mybusinessaccountmanagement.googleapis.com/v1"
                .to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum age of `last_synced_at` before a read triggers a refresh.
    /// Zero refreshes on every read.
    pub min_sync_interval_secs: u64,
    pub max_pages: u32,
    pub page_delay_ms: u64,
    /// Drop the cached analysis of a review whose content hash changed
    pub invalidate_stale_analysis: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_sync_interval_secs: 900,
            max_pages: 50,
            page_delay_ms: 100,
            invalidate_stale_analysis: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            backoff_multiplier: 2.0,
            max_delay_ms: 60_000,
            jitter: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub batch_delay_ms: u64,
    pub version: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.5-pro".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            batch_delay_ms: 100,
            version: "1.0".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit file, or the default location if
    /// it exists, then apply `.env` and environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                log::warn!("Failed to read .env file: {}", e);
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Apply environment-style overrides through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("REVIEW_AGENT_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(key) = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.analysis.api_key = Some(key);
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.analysis.model = model;
        }
        if let Some(bind) = lookup("REVIEW_AGENT_BIND") {
            self.server.bind = bind;
        }
        if let Some(env) = lookup("REVIEW_AGENT_ENV") {
            self.server.environment = env;
        }
        if let Some(secs) = lookup("REVIEW_AGENT_MIN_SYNC_INTERVAL_SECS") {
            self.sync.min_sync_interval_secs = secs.trim().parse().with_context(|| {
                format!("Invalid REVIEW_AGENT_MIN_SYNC_INTERVAL_SECS value: {}", secs)
            })?;
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.environment.eq_ignore_ascii_case("production")
    }

    pub fn min_sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.min_sync_interval_secs)
    }

    /// Resilience settings for the upstream clients
    pub fn resilience(&self) -> ResilienceConfig {
        ResilienceConfig::builder()
            .retry_config(RetryConfig {
                max_attempts: self.retry.max_attempts,
                base_delay: Duration::from_millis(self.retry.base_delay_ms),
                max_delay: Duration::from_millis(self.retry.max_delay_ms),
                backoff_multiplier: self.retry.backoff_multiplier,
                jitter: self.retry.jitter,
            })
            .request_timeout(Duration::from_secs(self.upstream.timeout_secs))
            .max_pages(self.sync.max_pages)
            .page_delay(Duration::from_millis(self.sync.page_delay_ms))
            .build()
    }

    pub fn paging(&self) -> PagingConfig {
        self.resilience().paging
    }
}

/// `$CONFIG_DIR/review-agent/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("review-agent").join("config.toml"))
}

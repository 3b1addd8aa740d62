//! Resilience configuration with builder pattern
//!
//! Provides a unified configuration for retry policies, request timeouts
//! and paging limits with sane defaults.

use super::retry::RetryConfig;
use std::time::Duration;

/// Resilience settings for upstream API calls
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    /// Per-request timeout for every upstream HTTP call
    pub request_timeout: Duration,
    pub paging: PagingConfig,
}

/// Limits for walking paginated listings
#[derive(Debug, Clone, PartialEq)]
pub struct PagingConfig {
    /// Hard cap on page requests per listing, even if the upstream keeps
    /// returning a next-page token
    pub max_pages: u32,
    /// Pause between consecutive page requests
    pub page_delay: Duration,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            page_delay: Duration::from_millis(100),
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
            paging: PagingConfig::default(),
        }
    }
}

impl ResilienceConfig {
    /// Create a new builder for ResilienceConfig
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }

    /// Disable retries and delays (for testing)
    pub fn disabled() -> Self {
        Self {
            retry: RetryConfig::disabled(),
            request_timeout: Duration::from_secs(30),
            paging: PagingConfig {
                max_pages: 50,
                page_delay: Duration::ZERO,
            },
        }
    }
}

/// Builder for ResilienceConfig
#[derive(Debug)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
        }
    }

    /// Configure retry behavior
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn max_pages(mut self, max_pages: u32) -> Self {
        self.config.paging.max_pages = max_pages;
        self
    }

    pub fn page_delay(mut self, delay: Duration) -> Self {
        self.config.paging.page_delay = delay;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}

impl Default for ResilienceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

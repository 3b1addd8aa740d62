//! Resilience features for upstream calls
//!
//! Provides retry policies, request timeouts and paging limits for the
//! Google Business Profile and generative-language clients.

pub mod config;
pub mod retry;

pub use config::{PagingConfig, ResilienceConfig};
pub use retry::{RetryConfig, RetryPolicy, parse_retry_after};

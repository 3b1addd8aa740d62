//! Cache staleness policy

use chrono::{DateTime, Utc};
use std::time::Duration;

/// TTL against a location's `last_synced_at`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    pub min_sync_interval: Duration,
}

impl StalenessPolicy {
    pub fn new(min_sync_interval: Duration) -> Self {
        Self { min_sync_interval }
    }

    pub fn should_refresh(
        &self,
        last_synced_at: Option<DateTime<Utc>>,
        force_refresh: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if force_refresh || self.min_sync_interval.is_zero() {
            return true;
        }
        let Some(last) = last_synced_at else {
            return true;
        };
        // a clock that moved backwards reads as stale
        match (now - last).to_std() {
            Ok(age) => age >= self.min_sync_interval,
            Err(_) => true,
        }
    }
}

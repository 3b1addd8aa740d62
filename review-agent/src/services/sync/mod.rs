//! Review synchronization
//!
//! Reconciles the upstream review listing of a location with the local
//! store: decides whether the cache is stale, walks the pages in cursor
//! order, upserts every review by natural key and serves pages from the
//! store.

pub mod normalize;
pub mod policy;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::api::auth::Credential;
use crate::api::models::{RawReview, ReplyAck, ReviewsPage};
use crate::api::provider::ReviewProvider;
use crate::api::resilience::PagingConfig;
use crate::config::repository::analysis::{self as analysis_cache, AnalysisStats};
use crate::config::repository::reviews::{self, ReviewListItem, StoredReview, UpsertOutcome};
use crate::config::repository::locations;
use crate::error::{SyncError, SyncResult};

pub use policy::StalenessPolicy;

/// Local and upstream identity of one location
#[derive(Debug, Clone, PartialEq)]
pub struct SyncScope {
    /// Bare upstream account id
    pub account_ext_id: String,
    /// Bare upstream location id
    pub location_ext_id: String,
    pub account_id: i64,
    pub location_id: i64,
}

impl SyncScope {
    fn validate(&self) -> SyncResult<()> {
        if self.account_id <= 0 || self.location_id <= 0 {
            return Err(SyncError::invalid(format!(
                "account and location ids must be positive (got {}, {})",
                self.account_id, self.location_id
            )));
        }
        if self.account_ext_id.trim().is_empty() || self.location_ext_id.trim().is_empty() {
            return Err(SyncError::invalid("account and location ids are required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewQuery {
    pub page: i64,
    pub limit: i64,
    pub force_refresh: bool,
}

impl Default for ReviewQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 50,
            force_refresh: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub pages_processed: u32,
    /// Reviews returned upstream, including skipped ones
    pub fetched: usize,
    pub synced: usize,
    pub skipped: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub upstream_total: u64,
    pub average_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPageResult {
    pub reviews: Vec<ReviewListItem>,
    pub total_count: i64,
    pub current_page: i64,
    pub total_pages: i64,
    pub has_next_page: bool,
    pub stats: AnalysisStats,
    /// Present when this read refreshed the cache
    pub sync: Option<SyncReport>,
}

/// Counts and ids produced by merging a batch of upstream reviews
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub review_ids: Vec<i64>,
    pub skipped: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

pub struct SyncOrchestrator {
    pool: SqlitePool,
    provider: Arc<dyn ReviewProvider>,
    paging: PagingConfig,
    staleness: StalenessPolicy,
    invalidate_stale_analysis: bool,
}

impl SyncOrchestrator {
    pub fn new(
        pool: SqlitePool,
        provider: Arc<dyn ReviewProvider>,
        paging: PagingConfig,
        staleness: StalenessPolicy,
        invalidate_stale_analysis: bool,
    ) -> Self {
        Self {
            pool,
            provider,
            paging,
            staleness,
            invalidate_stale_analysis,
        }
    }

    /// Serve a page of cached reviews, refreshing from upstream first when
    /// the cache is stale or a refresh is forced
    pub async fn get_reviews(
        &self,
        scope: &SyncScope,
        credential: &Credential,
        query: ReviewQuery,
    ) -> SyncResult<ReviewPageResult> {
        scope.validate()?;
        if query.page < 1 {
            return Err(SyncError::invalid(format!("page must be at least 1 (got {})", query.page)));
        }
        if query.limit < 1 {
            return Err(SyncError::invalid(format!("limit must be at least 1 (got {})", query.limit)));
        }

        let location = locations::find_by_id(&self.pool, scope.location_id)
            .await
            .map_err(SyncError::from_store)?
            .filter(|l| l.business_account_id == scope.account_id)
            .ok_or_else(|| {
                SyncError::NotFound(format!("business location {}", scope.location_ext_id))
            })?;

        let sync = if self
            .staleness
            .should_refresh(location.last_synced_at, query.force_refresh, Utc::now())
        {
            Some(self.run_sync(scope, credential).await?)
        } else {
            log::debug!(
                "Serving cached reviews for location {} (last synced {:?})",
                scope.location_ext_id,
                location.last_synced_at
            );
            None
        };

        let mut result = self.cached_page(scope, query.page, query.limit).await?;
        result.sync = sync;
        Ok(result)
    }

    /// One page of stored reviews with their analysis summaries, no upstream I/O
    pub async fn cached_page(
        &self,
        scope: &SyncScope,
        page_number: i64,
        limit: i64,
    ) -> SyncResult<ReviewPageResult> {
        scope.validate()?;
        if page_number < 1 {
            return Err(SyncError::invalid(format!("page must be at least 1 (got {})", page_number)));
        }

        let offset = (page_number - 1).saturating_mul(limit);
        let page = reviews::find_by_location(
            &self.pool,
            scope.account_id,
            scope.location_id,
            limit,
            offset,
        )
        .await
        .map_err(SyncError::from_store)?;
        let total_count = reviews::count(&self.pool, scope.account_id, scope.location_id)
            .await
            .map_err(SyncError::from_store)?;
        let stats = analysis_cache::stats(&self.pool, scope.account_id, scope.location_id)
            .await
            .map_err(SyncError::from_store)?;

        let has_next_page = offset.saturating_add(page.len() as i64) < total_count;
        let total_pages = if total_count == 0 {
            0
        } else {
            (total_count - 1) / limit + 1
        };
        Ok(ReviewPageResult {
            total_pages,
            current_page: page_number,
            has_next_page,
            total_count,
            reviews: page,
            stats,
            sync: None,
        })
    }

    /// Forced full resync of one location
    pub async fn refresh(&self, scope: &SyncScope, credential: &Credential) -> SyncResult<SyncReport> {
        scope.validate()?;
        locations::find_by_id(&self.pool, scope.location_id)
            .await
            .map_err(SyncError::from_store)?
            .filter(|l| l.business_account_id == scope.account_id)
            .ok_or_else(|| {
                SyncError::NotFound(format!("business location {}", scope.location_ext_id))
            })?;
        self.run_sync(scope, credential).await
    }

    async fn run_sync(&self, scope: &SyncScope, credential: &Credential) -> SyncResult<SyncReport> {
        log::info!(
            "Syncing reviews for account {} location {}",
            scope.account_ext_id,
            scope.location_ext_id
        );

        let mut report = SyncReport::default();
        let mut token: Option<String> = None;

        loop {
            report.pages_processed += 1;
            let page = match self
                .provider
                .fetch_reviews_page(
                    &scope.account_ext_id,
                    &scope.location_ext_id,
                    credential,
                    token.as_deref(),
                )
                .await
            {
                Ok(page) => page,
                Err(SyncError::NotFound(detail)) => {
                    log::info!(
                        "No reviews available for location {}: {}",
                        scope.location_ext_id,
                        detail
                    );
                    ReviewsPage::default()
                }
                Err(e) => return Err(e),
            };

            log::debug!(
                "Page {}: fetched {} reviews",
                report.pages_processed,
                page.reviews.len()
            );

            if page.total_review_count > 0 {
                report.upstream_total = page.total_review_count;
            }
            if page.average_rating > 0.0 {
                report.average_rating = page.average_rating;
            }
            report.fetched += page.reviews.len();

            let merged = self
                .merge_reviews(scope.account_id, scope.location_id, &page.reviews)
                .await?;
            report.synced += merged.review_ids.len();
            report.skipped += merged.skipped;
            report.inserted += merged.inserted;
            report.updated += merged.updated;
            report.unchanged += merged.unchanged;

            token = page.next_token().map(str::to_string);
            if token.is_none() {
                break;
            }
            if report.pages_processed >= self.paging.max_pages {
                log::warn!(
                    "Stopped after {} pages for location {}; remaining reviews were not fetched",
                    report.pages_processed,
                    scope.location_ext_id
                );
                break;
            }
            if !self.paging.page_delay.is_zero() {
                tokio::time::sleep(self.paging.page_delay).await;
            }
        }

        locations::mark_synced(&self.pool, scope.location_id, Utc::now())
            .await
            .map_err(SyncError::from_store)?;

        log::info!(
            "Synced {} reviews ({} new, {} changed, {} skipped) over {} page(s) for location {}",
            report.synced,
            report.inserted,
            report.updated,
            report.skipped,
            report.pages_processed,
            scope.location_ext_id
        );
        Ok(report)
    }

    /// Upsert upstream reviews in order. Items without an id are skipped; a
    /// store failure aborts the batch.
    pub async fn merge_reviews(
        &self,
        account_id: i64,
        location_id: i64,
        raw_reviews: &[RawReview],
    ) -> SyncResult<MergeOutcome> {
        if account_id <= 0 || location_id <= 0 {
            return Err(SyncError::invalid(format!(
                "account and location ids must be positive (got {}, {})",
                account_id, location_id
            )));
        }

        let now = Utc::now();
        let mut outcome = MergeOutcome::default();

        for raw in raw_reviews {
            let Some(record) = normalize::to_record(raw, account_id, location_id, now) else {
                log::warn!(
                    "Skipping review without an id for location {} (reviewer: {:?})",
                    location_id,
                    raw.reviewer.as_ref().and_then(|r| r.display_name.as_deref())
                );
                outcome.skipped += 1;
                continue;
            };

            let (id, result) = reviews::upsert(&self.pool, &record).await.map_err(|e| {
                log::error!("Failed to store review {}: {:#}", record.natural_key(), e);
                SyncError::from_store(e)
            })?;

            match result {
                UpsertOutcome::Inserted => outcome.inserted += 1,
                UpsertOutcome::Unchanged => outcome.unchanged += 1,
                UpsertOutcome::Updated => {
                    outcome.updated += 1;
                    if self.invalidate_stale_analysis
                        && analysis_cache::delete_for_review(&self.pool, id)
                            .await
                            .map_err(SyncError::from_store)?
                    {
                        log::debug!("Dropped stale analysis of review {}", record.natural_key());
                    }
                }
            }
            outcome.review_ids.push(id);
        }

        Ok(outcome)
    }

    /// Merge caller-supplied upstream reviews into a location and return
    /// them as stored, in input order
    pub async fn ingest(&self, scope: &SyncScope, raw_reviews: &[RawReview]) -> SyncResult<Vec<StoredReview>> {
        scope.validate()?;
        let merged = self
            .merge_reviews(scope.account_id, scope.location_id, raw_reviews)
            .await?;

        let mut stored = Vec::with_capacity(merged.review_ids.len());
        for id in merged.review_ids {
            if let Some(review) = reviews::find_by_id(&self.pool, id)
                .await
                .map_err(SyncError::from_store)?
            {
                stored.push(review);
            }
        }
        Ok(stored)
    }

    /// Post an owner reply upstream and mirror it locally
    pub async fn reply_to_review(
        &self,
        scope: &SyncScope,
        credential: &Credential,
        review_ext_id: &str,
        text: &str,
    ) -> SyncResult<ReplyAck> {
        scope.validate()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::invalid("reply text must not be empty"));
        }
        let review_ext_id = crate::api::models::resource_id(review_ext_id.trim());
        if review_ext_id.is_empty() {
            return Err(SyncError::invalid("review id is required"));
        }

        let ack = self
            .provider
            .post_reply(
                &scope.account_ext_id,
                &scope.location_ext_id,
                review_ext_id,
                text,
                credential,
            )
            .await?;

        let stored = reviews::find_by_natural_key(
            &self.pool,
            scope.account_id,
            scope.location_id,
            review_ext_id,
        )
        .await
        .map_err(SyncError::from_store)?;
        match stored {
            Some(review) => reviews::set_reply(&self.pool, review.id, text)
                .await
                .map_err(SyncError::from_store)?,
            None => log::warn!(
                "Reply posted for review {} which is not cached locally",
                review_ext_id
            ),
        }

        log::info!("Replied to review {}", review_ext_id);
        Ok(ack)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::api::models::{RawAccount, RawLocation, Reviewer, StarRating};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    pub fn raw_review(id: &str, rating: &str, comment: &str) -> RawReview {
        RawReview {
            review_id: Some(id.to_string()),
            reviewer: Some(Reviewer {
                display_name: Some("Jane".into()),
                profile_photo_url: None,
            }),
            star_rating: Some(StarRating::Text(rating.to_string())),
            comment: Some(comment.to_string()),
            create_time: Some("2024-03-01T10:00:00Z".into()),
            ..Default::default()
        }
    }

    pub fn reviews_page(prefix: &str, count: usize) -> ReviewsPage {
        ReviewsPage {
            reviews: (0..count)
                .map(|n| raw_review(&format!("{prefix}-{n}"), "FIVE", "Great"))
                .collect(),
            ..Default::default()
        }
    }

    /// In-memory provider. Pages are chained with `p{n}` cursors.
    #[derive(Default)]
    pub struct FakeProvider {
        pub pages: Mutex<Vec<ReviewsPage>>,
        pub endless: bool,
        pub error: Option<fn() -> SyncError>,
        pub calls: AtomicU32,
        pub replies: Mutex<Vec<(String, String)>>,
        pub accounts: Vec<RawAccount>,
        pub locations: HashMap<String, Vec<RawLocation>>,
    }

    impl FakeProvider {
        pub fn with_pages(pages: Vec<ReviewsPage>) -> Self {
            Self {
                pages: Mutex::new(pages),
                ..Default::default()
            }
        }

        pub fn endless() -> Self {
            Self {
                endless: true,
                ..Default::default()
            }
        }

        pub fn failing(error: fn() -> SyncError) -> Self {
            Self {
                error: Some(error),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReviewProvider for FakeProvider {
        async fn fetch_reviews_page(
            &self,
            _account_id: &str,
            _location_id: &str,
            _credential: &Credential,
            page_token: Option<&str>,
        ) -> SyncResult<ReviewsPage> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = self.error {
                return Err(error());
            }
            if self.endless {
                let mut page = reviews_page(&format!("e{call}"), 1);
                page.next_page_token = Some(format!("p{}", call + 1));
                return Ok(page);
            }

            let index: usize = page_token
                .and_then(|t| t.strip_prefix('p'))
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            let pages = self.pages.lock().unwrap();
            let mut page = pages.get(index).cloned().unwrap_or_default();
            if index + 1 < pages.len() {
                page.next_page_token = Some(format!("p{}", index + 1));
            }
            Ok(page)
        }

        async fn post_reply(
            &self,
            _account_id: &str,
            _location_id: &str,
            review_id: &str,
            text: &str,
            _credential: &Credential,
        ) -> SyncResult<ReplyAck> {
            if let Some(error) = self.error {
                return Err(error());
            }
            self.replies
                .lock()
                .unwrap()
                .push((review_id.to_string(), text.to_string()));
            Ok(ReplyAck {
                comment: Some(text.to_string()),
                update_time: Some("2024-03-05T00:00:00Z".into()),
            })
        }

        async fn list_accounts(&self, _credential: &Credential) -> SyncResult<Vec<RawAccount>> {
            if let Some(error) = self.error {
                return Err(error());
            }
            Ok(self.accounts.clone())
        }

        async fn list_locations(
            &self,
            account_id: &str,
            _credential: &Credential,
        ) -> SyncResult<Vec<RawLocation>> {
            self.locations
                .get(account_id)
                .cloned()
                .ok_or_else(|| SyncError::AccessForbidden(format!("account {account_id}")))
        }

        async fn get_location(
            &self,
            account_id: &str,
            location_id: &str,
            _credential: &Credential,
        ) -> SyncResult<Value> {
            if let Some(error) = self.error {
                return Err(error());
            }
            Ok(json!({ "name": format!("accounts/{account_id}/locations/{location_id}") }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::config::db::memory_pool;
    use crate::config::repository::analysis;
    use std::time::Duration;

    fn orchestrator(pool: &SqlitePool, provider: Arc<FakeProvider>, interval: Duration) -> SyncOrchestrator {
        SyncOrchestrator::new(
            pool.clone(),
            provider,
            PagingConfig {
                max_pages: 50,
                page_delay: Duration::ZERO,
            },
            StalenessPolicy::new(interval),
            true,
        )
    }

    async fn scope(pool: &SqlitePool) -> SyncScope {
        let (account_id, location_id) = locations::seed(pool, "g-1").await;
        SyncScope {
            account_ext_id: "111".into(),
            location_ext_id: "222".into(),
            account_id,
            location_id,
        }
    }

    fn credential() -> Credential {
        Credential::new("token")
    }

    #[tokio::test]
    async fn test_two_pages_are_merged() {
        let pool = memory_pool().await;
        let scope = scope(&pool).await;
        let provider = Arc::new(FakeProvider::with_pages(vec![
            reviews_page("a", 50),
            reviews_page("b", 30),
        ]));
        let sync = orchestrator(&pool, provider.clone(), Duration::from_secs(900));

        let report = sync.refresh(&scope, &credential()).await.unwrap();

        assert_eq!(report.pages_processed, 2);
        assert_eq!(report.synced, 80);
        assert_eq!(report.inserted, 80);
        assert_eq!(provider.calls(), 2);
        assert_eq!(
            reviews::count(&pool, scope.account_id, scope.location_id).await.unwrap(),
            80
        );

        let again = sync.refresh(&scope, &credential()).await.unwrap();
        assert_eq!(again.unchanged, 80);
        assert_eq!(again.inserted, 0);
    }

    #[tokio::test]
    async fn test_page_cap() {
        let pool = memory_pool().await;
        let scope = scope(&pool).await;
        let provider = Arc::new(FakeProvider::endless());
        let sync = orchestrator(&pool, provider.clone(), Duration::from_secs(900));

        let report = sync.refresh(&scope, &credential()).await.unwrap();

        assert_eq!(report.pages_processed, 50);
        assert_eq!(provider.calls(), 50);
        assert_eq!(report.synced, 50);
    }

    #[tokio::test]
    async fn test_reviews_without_id_are_skipped() {
        let pool = memory_pool().await;
        let scope = scope(&pool).await;
        let mut page = reviews_page("a", 2);
        page.reviews.insert(1, RawReview {
            review_id: Some("   ".into()),
            comment: Some("orphan".into()),
            ..Default::default()
        });
        let provider = Arc::new(FakeProvider::with_pages(vec![page]));
        let sync = orchestrator(&pool, provider, Duration::from_secs(900));

        let report = sync.refresh(&scope, &credential()).await.unwrap();
        assert_eq!(report.fetched, 3);
        assert_eq!(report.synced, 2);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_not_found_counts_as_empty() {
        let pool = memory_pool().await;
        let scope = scope(&pool).await;
        let provider = Arc::new(FakeProvider::failing(|| SyncError::NotFound("gone".into())));
        let sync = orchestrator(&pool, provider, Duration::from_secs(900));

        let report = sync.refresh(&scope, &credential()).await.unwrap();
        assert_eq!(report.pages_processed, 1);
        assert_eq!(report.synced, 0);

        let location = locations::find_by_id(&pool, scope.location_id).await.unwrap().unwrap();
        assert!(location.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn test_upstream_failures_propagate_without_stamping() {
        let pool = memory_pool().await;
        let scope = scope(&pool).await;
        let provider = Arc::new(FakeProvider::failing(|| {
            SyncError::AuthenticationFailed("expired".into())
        }));
        let sync = orchestrator(&pool, provider, Duration::from_secs(900));

        let err = sync.refresh(&scope, &credential()).await.unwrap_err();
        assert!(matches!(err, SyncError::AuthenticationFailed(_)));

        let location = locations::find_by_id(&pool, scope.location_id).await.unwrap().unwrap();
        assert!(location.last_synced_at.is_none());
    }

    #[tokio::test]
    async fn test_store_failure_aborts_batch() {
        let pool = memory_pool().await;
        let scope = scope(&pool).await;
        sqlx::query("DROP TABLE review_analysis").execute(&pool).await.unwrap();
        sqlx::query("DROP TABLE reviews").execute(&pool).await.unwrap();
        let provider = Arc::new(FakeProvider::with_pages(vec![reviews_page("a", 3)]));
        let sync = orchestrator(&pool, provider, Duration::from_secs(900));

        let err = sync.refresh(&scope, &credential()).await.unwrap_err();
        assert!(matches!(err, SyncError::PersistenceFailure(_)));

        let location = locations::find_by_id(&pool, scope.location_id).await.unwrap().unwrap();
        assert!(location.last_synced_at.is_none());
    }

    #[tokio::test]
    async fn test_get_reviews_respects_staleness() {
        let pool = memory_pool().await;
        let scope = scope(&pool).await;
        let provider = Arc::new(FakeProvider::with_pages(vec![reviews_page("a", 5)]));
        let sync = orchestrator(&pool, provider.clone(), Duration::from_secs(900));

        let first = sync
            .get_reviews(&scope, &credential(), ReviewQuery::default())
            .await
            .unwrap();
        assert!(first.sync.is_some());
        assert_eq!(first.total_count, 5);

        let second = sync
            .get_reviews(&scope, &credential(), ReviewQuery::default())
            .await
            .unwrap();
        assert!(second.sync.is_none());
        assert_eq!(provider.calls(), 1);

        let forced = sync
            .get_reviews(
                &scope,
                &credential(),
                ReviewQuery {
                    force_refresh: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(forced.sync.is_some());
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_interval_always_refreshes() {
        let pool = memory_pool().await;
        let scope = scope(&pool).await;
        let provider = Arc::new(FakeProvider::with_pages(vec![reviews_page("a", 1)]));
        let sync = orchestrator(&pool, provider.clone(), Duration::ZERO);

        for _ in 0..3 {
            sync.get_reviews(&scope, &credential(), ReviewQuery::default())
                .await
                .unwrap();
        }
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_pagination_math() {
        let pool = memory_pool().await;
        let scope = scope(&pool).await;
        let provider = Arc::new(FakeProvider::with_pages(vec![
            reviews_page("a", 50),
            reviews_page("b", 30),
        ]));
        let sync = orchestrator(&pool, provider, Duration::from_secs(900));

        let first = sync
            .get_reviews(&scope, &credential(), ReviewQuery::default())
            .await
            .unwrap();
        assert_eq!(first.reviews.len(), 50);
        assert_eq!(first.total_pages, 2);
        assert!(first.has_next_page);

        let second = sync
            .get_reviews(
                &scope,
                &credential(),
                ReviewQuery {
                    page: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(second.reviews.len(), 30);
        assert_eq!(second.current_page, 2);
        assert!(!second.has_next_page);
        assert_eq!(second.stats.total_reviews, 80);
    }

    #[tokio::test]
    async fn test_invalid_arguments_before_io() {
        let pool = memory_pool().await;
        let provider = Arc::new(FakeProvider::with_pages(vec![reviews_page("a", 1)]));
        let sync = orchestrator(&pool, provider.clone(), Duration::ZERO);
        let bad_scope = SyncScope {
            account_ext_id: "111".into(),
            location_ext_id: "222".into(),
            account_id: 0,
            location_id: 1,
        };

        let err = sync
            .get_reviews(&bad_scope, &credential(), ReviewQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));

        let scope = scope(&pool).await;
        let err = sync
            .get_reviews(
                &scope,
                &credential(),
                ReviewQuery {
                    page: 0,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_changed_review_drops_stale_analysis() {
        let pool = memory_pool().await;
        let scope = scope(&pool).await;
        let sync = orchestrator(&pool, Arc::new(FakeProvider::default()), Duration::ZERO);

        let original = raw_review("r1", "FIVE", "Great");
        let merged = sync
            .merge_reviews(scope.account_id, scope.location_id, &[original.clone()])
            .await
            .unwrap();
        let review_id = merged.review_ids[0];
        analysis::put(&pool, review_id, &analysis::sample("positive")).await.unwrap();

        sync.merge_reviews(scope.account_id, scope.location_id, &[original])
            .await
            .unwrap();
        assert!(analysis::get(&pool, review_id).await.unwrap().is_some());

        let edited = raw_review("r1", "TWO", "Actually meh");
        let merged = sync
            .merge_reviews(scope.account_id, scope.location_id, &[edited])
            .await
            .unwrap();
        assert_eq!(merged.updated, 1);
        assert!(analysis::get(&pool, review_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ingest_returns_stored_reviews_in_order() {
        let pool = memory_pool().await;
        let scope = scope(&pool).await;
        let sync = orchestrator(&pool, Arc::new(FakeProvider::default()), Duration::ZERO);

        let stored = sync
            .ingest(
                &scope,
                &[
                    raw_review("r2", "TWO", "Slow"),
                    RawReview::default(),
                    raw_review("r1", "FIVE", "Great"),
                ],
            )
            .await
            .unwrap();
        let ids: Vec<&str> = stored.iter().map(|r| r.google_review_id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r1"]);
        assert_eq!(stored[0].rating, 2);
    }

    #[tokio::test]
    async fn test_reply_is_posted_and_mirrored() {
        let pool = memory_pool().await;
        let scope = scope(&pool).await;
        let provider = Arc::new(FakeProvider::default());
        let sync = orchestrator(&pool, provider.clone(), Duration::ZERO);
        sync.merge_reviews(scope.account_id, scope.location_id, &[raw_review("r1", "FIVE", "Great")])
            .await
            .unwrap();

        let ack = sync
            .reply_to_review(&scope, &credential(), "accounts/111/locations/222/reviews/r1", " Thanks! ")
            .await
            .unwrap();
        assert_eq!(ack.comment.as_deref(), Some("Thanks!"));
        assert_eq!(
            provider.replies.lock().unwrap().as_slice(),
            &[("r1".to_string(), "Thanks!".to_string())]
        );

        let stored = reviews::find_by_natural_key(&pool, scope.account_id, scope.location_id, "r1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.reply_text, "Thanks!");

        let err = sync
            .reply_to_review(&scope, &credential(), "r1", "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_review_known_only_by_resource_name() {
        let pool = memory_pool().await;
        let scope = scope(&pool).await;
        let provider = Arc::new(FakeProvider::default());
        let sync = orchestrator(&pool, provider.clone(), Duration::ZERO);

        let mut by_name = raw_review("x", "FIVE", "Great");
        by_name.review_id = None;
        by_name.name = Some("accounts/111/locations/222/reviews/x".into());
        sync.merge_reviews(scope.account_id, scope.location_id, &[by_name])
            .await
            .unwrap();

        sync.reply_to_review(&scope, &credential(), "accounts/111/locations/222/reviews/x", "Thanks")
            .await
            .unwrap();
        let stored = reviews::find_by_natural_key(&pool, scope.account_id, scope.location_id, "x")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.reply_text, "Thanks");
        assert_eq!(
            provider.replies.lock().unwrap().as_slice(),
            &[("x".to_string(), "Thanks".to_string())]
        );
    }

    #[tokio::test]
    async fn test_dateless_review_keeps_first_sync_date() {
        let pool = memory_pool().await;
        let scope = scope(&pool).await;
        let sync = orchestrator(&pool, Arc::new(FakeProvider::default()), Duration::ZERO);

        let mut dateless = raw_review("r1", "FIVE", "Great");
        dateless.create_time = None;
        let first = sync
            .ingest(&scope, std::slice::from_ref(&dateless))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let merged = sync
            .merge_reviews(scope.account_id, scope.location_id, &[dateless])
            .await
            .unwrap();
        assert_eq!(merged.unchanged, 1);

        let second = reviews::find_by_id(&pool, first[0].id).await.unwrap().unwrap();
        assert_eq!(second.review_date, first[0].review_date);
    }

    #[tokio::test]
    async fn test_review_id_and_resource_name_share_one_row() {
        let pool = memory_pool().await;
        let scope = scope(&pool).await;
        let sync = orchestrator(&pool, Arc::new(FakeProvider::default()), Duration::ZERO);

        let by_id = raw_review("x", "FIVE", "Great");
        let mut by_name = by_id.clone();
        by_name.review_id = None;
        by_name.name = Some("accounts/111/locations/222/reviews/x".into());

        let first = sync
            .merge_reviews(scope.account_id, scope.location_id, &[by_id])
            .await
            .unwrap();
        let second = sync
            .merge_reviews(scope.account_id, scope.location_id, &[by_name])
            .await
            .unwrap();
        assert_eq!(first.review_ids, second.review_ids);
        assert_eq!(second.unchanged, 1);
        assert_eq!(
            reviews::count(&pool, scope.account_id, scope.location_id).await.unwrap(),
            1
        );
    }
}

//! Cached review analysis
//!
//! Each stored review is analyzed at most once: the cache is consulted
//! first, the analyzer only runs on a miss, and its result is stored before
//! moving on. A failing review is recorded and counted, never aborting the
//! rest of the batch.

pub mod parse;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::repository::analysis::{self as cache, AnalysisData, CacheLookup};
use crate::api::models::RawReview;
use crate::config::repository::reviews::StoredReview;
use crate::error::{SyncError, SyncResult};
use crate::services::sync::normalize::normalize_rating;

pub use parse::{ReviewAnalysisDraft, Sentiment, parse_analysis_response};

/// What the analyzer sees of a review
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisInput {
    pub text: String,
    pub reply: String,
    pub rating: i64,
}

impl From<&StoredReview> for AnalysisInput {
    fn from(review: &StoredReview) -> Self {
        Self {
            text: review.review_text.clone(),
            reply: review.reply_text.clone(),
            rating: review.rating,
        }
    }
}

impl From<&RawReview> for AnalysisInput {
    fn from(review: &RawReview) -> Self {
        Self {
            text: review.comment.clone().unwrap_or_default(),
            reply: review.reply_text().unwrap_or_default().to_string(),
            rating: normalize_rating(review.star_rating.as_ref()),
        }
    }
}

/// Most reviews analyzed by one [`AnalysisService::preview`] call
pub const PREVIEW_LIMIT: usize = 5;

#[async_trait]
pub trait ReviewAnalyzer: Send + Sync {
    /// Analyze one review. Unparseable output is not an error; it comes back
    /// as the fallback draft.
    async fn analyze(&self, input: &AnalysisInput) -> SyncResult<ReviewAnalysisDraft>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedReview {
    #[serde(flatten)]
    pub review: StoredReview,
    pub analysis: Option<AnalysisData>,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Uncached analysis of an upstream review
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewedReview {
    #[serde(flatten)]
    pub review: RawReview,
    pub analysis: Option<ReviewAnalysisDraft>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewAnalysis {
    pub analyzed_reviews: Vec<PreviewedReview>,
    pub total_tested: usize,
    pub original_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub total: usize,
    pub new_analysis: usize,
    pub cached: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAnalysis {
    pub analyzed_reviews: Vec<AnalyzedReview>,
    pub stats: BatchStats,
    pub errors: Vec<String>,
}

pub struct AnalysisService {
    pool: SqlitePool,
    analyzer: Arc<dyn ReviewAnalyzer>,
    version: String,
    batch_delay: Duration,
}

impl AnalysisService {
    pub fn new(
        pool: SqlitePool,
        analyzer: Arc<dyn ReviewAnalyzer>,
        version: impl Into<String>,
        batch_delay: Duration,
    ) -> Self {
        Self {
            pool,
            analyzer,
            version: version.into(),
            batch_delay,
        }
    }

    pub async fn analyze_batch(&self, reviews: &[StoredReview]) -> BatchAnalysis {
        let mut result = BatchAnalysis {
            stats: BatchStats {
                total: reviews.len(),
                ..Default::default()
            },
            ..Default::default()
        };

        for (index, review) in reviews.iter().enumerate() {
            match self.analyze_one(review).await {
                Ok((data, cached)) => {
                    if cached {
                        result.stats.cached += 1;
                    } else {
                        result.stats.new_analysis += 1;
                        if index + 1 < reviews.len() && !self.batch_delay.is_zero() {
                            tokio::time::sleep(self.batch_delay).await;
                        }
                    }
                    result.analyzed_reviews.push(AnalyzedReview {
                        review: review.clone(),
                        analysis: Some(data),
                        cached,
                        error: None,
                    });
                }
                Err(e) => {
                    let message =
                        format!("Failed to analyze review {}: {}", review.google_review_id, e);
                    log::warn!("{}", message);
                    result.errors.push(message);
                    result.analyzed_reviews.push(AnalyzedReview {
                        review: review.clone(),
                        analysis: None,
                        cached: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        result.stats.errors = result.errors.len();
        log::info!(
            "Analysis complete: {} new, {} cached, {} errors",
            result.stats.new_analysis,
            result.stats.cached,
            result.stats.errors
        );
        result
    }

    /// Analyze up to [`PREVIEW_LIMIT`] upstream reviews without touching
    /// the store
    pub async fn preview(&self, reviews: &[RawReview]) -> PreviewAnalysis {
        let mut analyzed_reviews = Vec::new();
        for review in reviews.iter().take(PREVIEW_LIMIT) {
            let (analysis, error) = match self.analyzer.analyze(&AnalysisInput::from(review)).await {
                Ok(draft) => (Some(draft), None),
                Err(e) => {
                    log::warn!("Preview analysis failed: {}", e);
                    (None, Some(e.to_string()))
                }
            };
            analyzed_reviews.push(PreviewedReview {
                review: review.clone(),
                analysis,
                error,
            });
        }

        PreviewAnalysis {
            total_tested: analyzed_reviews.len(),
            original_count: reviews.len(),
            analyzed_reviews,
        }
    }

    /// Run the analyzer once on a fixed sample review
    pub async fn check_connection(&self) -> SyncResult<ReviewAnalysisDraft> {
        let sample = AnalysisInput {
            text: "This is a test review to check AI connectivity.".into(),
            reply: String::new(),
            rating: 5,
        };
        self.analyzer.analyze(&sample).await
    }

    /// Cached or freshly computed analysis, and whether it came from cache
    async fn analyze_one(&self, review: &StoredReview) -> SyncResult<(AnalysisData, bool)> {
        match cache::lookup(&self.pool, review.id)
            .await
            .map_err(SyncError::from_store)?
        {
            CacheLookup::Hit(hit) => return Ok((hit.data, true)),
            CacheLookup::Failed { attempts, .. } => {
                log::debug!(
                    "Retrying analysis of review {} after {} failed attempt(s)",
                    review.id,
                    attempts
                );
            }
            CacheLookup::Miss => {}
        }

        let draft = match self.analyzer.analyze(&AnalysisInput::from(review)).await {
            Ok(draft) => draft,
            Err(e) => {
                if let Err(store_err) =
                    cache::record_failure(&self.pool, review.id, &e.to_string()).await
                {
                    log::error!(
                        "Failed to record analysis failure for review {}: {:#}",
                        review.id,
                        store_err
                    );
                }
                return Err(e);
            }
        };

        let data = AnalysisData {
            sentiment: draft.sentiment.as_str().to_string(),
            sentiment_score: draft.sentiment_score,
            summary: draft.summary,
            tags: draft.tags,
            suggested_reply: draft.suggested_reply,
            analysis_version: self.version.clone(),
        };
        cache::put(&self.pool, review.id, &data)
            .await
            .map_err(SyncError::from_store)?;
        Ok((data, false))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Analyzer that fails for texts in `failing` and counts its calls
    #[derive(Default)]
    pub struct FakeAnalyzer {
        pub failing: Mutex<HashSet<String>>,
        pub calls: AtomicUsize,
    }

    impl FakeAnalyzer {
        pub fn failing_on(text: &str) -> Self {
            let analyzer = Self::default();
            analyzer.failing.lock().unwrap().insert(text.to_string());
            analyzer
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReviewAnalyzer for FakeAnalyzer {
        async fn analyze(&self, input: &AnalysisInput) -> SyncResult<ReviewAnalysisDraft> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.lock().unwrap().contains(&input.text) {
                return Err(SyncError::UpstreamUnavailable("model overloaded".into()));
            }
            Ok(ReviewAnalysisDraft {
                summary: format!("summary of {}", input.text),
                sentiment: if input.rating >= 4 {
                    Sentiment::Positive
                } else {
                    Sentiment::Negative
                },
                sentiment_score: 0.8,
                tags: vec!["service".into()],
                suggested_reply: "Thank you".into(),
            })
        }
    }
}

//! Review analysis cache, at most one row per review
//!
//! A row is either `complete` (a usable analysis) or `failed` (the last
//! attempt's error and the attempt count). Only complete rows count as hits.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Analysis fields as produced by the analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisData {
    pub sentiment: String,
    pub sentiment_score: f64,
    pub summary: String,
    pub tags: Vec<String>,
    pub suggested_reply: String,
    pub analysis_version: String,
}

/// A completed analysis read back from the cache
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedAnalysis {
    pub review_id: i64,
    #[serde(flatten)]
    pub data: AnalysisData,
    pub analyzed_at: DateTime<Utc>,
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(CachedAnalysis),
    /// The last attempt failed; the review should be analyzed again
    Failed { error: String, attempts: i64 },
    Miss,
}

#[derive(sqlx::FromRow)]
struct AnalysisRow {
    review_id: i64,
    status: String,
    sentiment: String,
    sentiment_score: f64,
    summary: String,
    tags: String,
    suggested_reply: String,
    analysis_version: String,
    error_message: Option<String>,
    attempts: i64,
    analyzed_at: DateTime<Utc>,
}

impl AnalysisRow {
    fn into_lookup(self) -> CacheLookup {
        if self.status != "complete" {
            return CacheLookup::Failed {
                error: self.error_message.unwrap_or_default(),
                attempts: self.attempts,
            };
        }
        let tags = serde_json::from_str(&self.tags).unwrap_or_else(|e| {
            log::warn!("Discarding unreadable tags for review {}: {}", self.review_id, e);
            Vec::new()
        });
        CacheLookup::Hit(CachedAnalysis {
            review_id: self.review_id,
            data: AnalysisData {
                sentiment: self.sentiment,
                sentiment_score: self.sentiment_score,
                summary: self.summary,
                tags,
                suggested_reply: self.suggested_reply,
                analysis_version: self.analysis_version,
            },
            analyzed_at: self.analyzed_at,
        })
    }
}

/// Aggregate over the live reviews of a location
#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStats {
    pub total_reviews: i64,
    pub total_analyzed: i64,
    /// Mean of known ratings, `None` when no review carries one
    pub avg_rating: Option<f64>,
    pub positive_count: i64,
    pub negative_count: i64,
    pub neutral_count: i64,
}

pub async fn lookup(pool: &SqlitePool, review_id: i64) -> Result<CacheLookup> {
    let row: Option<AnalysisRow> = sqlx::query_as(
        "SELECT review_id, status, sentiment, sentiment_score, summary, tags, suggested_reply,
                analysis_version, error_message, attempts, analyzed_at
         FROM review_analysis WHERE review_id = ?",
    )
    .bind(review_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("Failed to read analysis for review {}", review_id))?;

    Ok(row.map_or(CacheLookup::Miss, AnalysisRow::into_lookup))
}

/// Completed analysis for a review, if any
pub async fn get(pool: &SqlitePool, review_id: i64) -> Result<Option<CachedAnalysis>> {
    match lookup(pool, review_id).await? {
        CacheLookup::Hit(analysis) => Ok(Some(analysis)),
        _ => Ok(None),
    }
}

/// Store a completed analysis, replacing whatever the review had
pub async fn put(pool: &SqlitePool, review_id: i64, data: &AnalysisData) -> Result<()> {
    let tags = serde_json::to_string(&data.tags).context("Failed to serialize analysis tags")?;

    sqlx::query(
        "INSERT INTO review_analysis (review_id, status, sentiment, sentiment_score, summary, tags,
             suggested_reply, analysis_version, error_message, attempts, analyzed_at)
         VALUES (?, 'complete', ?, ?, ?, ?, ?, ?, NULL, 1, ?)
         ON CONFLICT(review_id) DO UPDATE SET
             status = 'complete',
             sentiment = excluded.sentiment,
             sentiment_score = excluded.sentiment_score,
             summary = excluded.summary,
             tags = excluded.tags,
             suggested_reply = excluded.suggested_reply,
             analysis_version = excluded.analysis_version,
             error_message = NULL,
             attempts = review_analysis.attempts + 1,
             analyzed_at = excluded.analyzed_at",
    )
    .bind(review_id)
    .bind(&data.sentiment)
    .bind(data.sentiment_score)
    .bind(&data.summary)
    .bind(tags)
    .bind(&data.suggested_reply)
    .bind(&data.analysis_version)
    .bind(Utc::now())
    .execute(pool)
    .await
    .with_context(|| format!("Failed to store analysis for review {}", review_id))?;

    Ok(())
}

/// Record a failed attempt; never overwrites a completed analysis
pub async fn record_failure(pool: &SqlitePool, review_id: i64, error: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO review_analysis (review_id, status, error_message, attempts, analyzed_at)
         VALUES (?, 'failed', ?, 1, ?)
         ON CONFLICT(review_id) DO UPDATE SET
             error_message = excluded.error_message,
             attempts = review_analysis.attempts + 1,
             analyzed_at = excluded.analyzed_at
         WHERE review_analysis.status = 'failed'",
    )
    .bind(review_id)
    .bind(error)
    .bind(Utc::now())
    .execute(pool)
    .await
    .with_context(|| format!("Failed to record analysis failure for review {}", review_id))?;

    Ok(())
}

/// Drop the cached analysis of one review
pub async fn delete_for_review(pool: &SqlitePool, review_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM review_analysis WHERE review_id = ?")
        .bind(review_id)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to delete analysis for review {}", review_id))?;

    Ok(result.rows_affected() > 0)
}

/// Drop every cached analysis of a location; returns the number removed
pub async fn clear_for_location(
    pool: &SqlitePool,
    business_account_id: i64,
    location_id: i64,
) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM review_analysis WHERE review_id IN (
             SELECT id FROM reviews WHERE business_account_id = ? AND location_id = ?
         )",
    )
    .bind(business_account_id)
    .bind(location_id)
    .execute(pool)
    .await
    .context("Failed to clear analysis cache for location")?;

    Ok(result.rows_affected())
}

pub async fn stats(
    pool: &SqlitePool,
    business_account_id: i64,
    location_id: i64,
) -> Result<AnalysisStats> {
    sqlx::query_as(
        "SELECT
             COUNT(r.id) AS total_reviews,
             COUNT(ra.id) AS total_analyzed,
             AVG(NULLIF(r.rating, 0)) AS avg_rating,
             COALESCE(SUM(CASE WHEN ra.sentiment = 'positive' THEN 1 ELSE 0 END), 0) AS positive_count,
             COALESCE(SUM(CASE WHEN ra.sentiment = 'negative' THEN 1 ELSE 0 END), 0) AS negative_count,
             COALESCE(SUM(CASE WHEN ra.sentiment = 'neutral' THEN 1 ELSE 0 END), 0) AS neutral_count
         FROM reviews r
         LEFT JOIN review_analysis ra ON ra.review_id = r.id AND ra.status = 'complete'
         WHERE r.business_account_id = ? AND r.location_id = ? AND r.is_deleted = 0",
    )
    .bind(business_account_id)
    .bind(location_id)
    .fetch_one(pool)
    .await
    .context("Failed to compute analysis stats")
}

#[cfg(test)]
pub(crate) fn sample(sentiment: &str) -> AnalysisData {
    AnalysisData {
        sentiment: sentiment.to_string(),
        sentiment_score: 0.9,
        summary: "Great coffee".into(),
        tags: vec!["coffee".into(), "service".into()],
        suggested_reply: "Thank you!".into(),
        analysis_version: "1.0".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::db::memory_pool;
    use crate::config::repository::{locations, reviews};

    async fn seeded_review(pool: &SqlitePool) -> (i64, i64, i64) {
        let (account_id, location_id) = locations::seed(pool, "g-1").await;
        let (review_id, _) = reviews::upsert(
            pool,
            &reviews::record(account_id, location_id, "r1", "2024-03-01 10:00:00"),
        )
        .await
        .unwrap();
        (account_id, location_id, review_id)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let pool = memory_pool().await;
        let (_, _, review_id) = seeded_review(&pool).await;

        assert!(get(&pool, review_id).await.unwrap().is_none());
        put(&pool, review_id, &sample("positive")).await.unwrap();

        let cached = get(&pool, review_id).await.unwrap().unwrap();
        assert_eq!(cached.data, sample("positive"));

        let mut replacement = sample("negative");
        replacement.tags = vec!["price".into()];
        put(&pool, review_id, &replacement).await.unwrap();
        assert_eq!(get(&pool, review_id).await.unwrap().unwrap().data, replacement);

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM review_analysis")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_failures_are_misses_until_overwritten() {
        let pool = memory_pool().await;
        let (_, _, review_id) = seeded_review(&pool).await;

        record_failure(&pool, review_id, "quota exceeded").await.unwrap();
        record_failure(&pool, review_id, "quota exceeded").await.unwrap();
        assert_eq!(
            lookup(&pool, review_id).await.unwrap(),
            CacheLookup::Failed {
                error: "quota exceeded".into(),
                attempts: 2
            }
        );
        assert!(get(&pool, review_id).await.unwrap().is_none());

        put(&pool, review_id, &sample("neutral")).await.unwrap();
        assert!(matches!(lookup(&pool, review_id).await.unwrap(), CacheLookup::Hit(_)));

        // a late failure must not clobber the completed row
        record_failure(&pool, review_id, "late").await.unwrap();
        assert!(get(&pool, review_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let pool = memory_pool().await;
        let (account_id, location_id, review_id) = seeded_review(&pool).await;
        let mut second = reviews::record(account_id, location_id, "r2", "2024-03-02 10:00:00");
        second.rating = 0;
        let (second_id, _) = reviews::upsert(&pool, &second).await.unwrap();

        put(&pool, review_id, &sample("positive")).await.unwrap();
        record_failure(&pool, second_id, "boom").await.unwrap();

        let stats = stats(&pool, account_id, location_id).await.unwrap();
        assert_eq!(stats.total_reviews, 2);
        assert_eq!(stats.total_analyzed, 1);
        assert_eq!(stats.positive_count, 1);
        assert_eq!(stats.neutral_count, 0);
        assert_eq!(stats.avg_rating, Some(4.0));

        assert_eq!(clear_for_location(&pool, account_id, location_id).await.unwrap(), 2);
        assert!(!delete_for_review(&pool, review_id).await.unwrap());
    }
}

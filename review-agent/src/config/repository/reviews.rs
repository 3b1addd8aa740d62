//! Review store keyed by (account, location, external review id)

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::SyncError;

/// A normalized review ready to be written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewRecord {
    pub business_account_id: i64,
    pub location_id: i64,
    pub google_review_id: String,
    pub reviewer_name: String,
    pub reviewer_url: String,
    pub review_text: String,
    pub reply_text: String,
    /// 1-5, 0 when unknown
    pub rating: i64,
    /// Canonical `YYYY-MM-DD HH:MM:SS` UTC
    pub review_date: String,
    /// False when `review_date` is the sync time standing in for a missing
    /// upstream timestamp; an existing row then keeps its stored date
    pub date_from_upstream: bool,
    pub content_hash: String,
}

impl ReviewRecord {
    /// Natural key, for log lines
    pub fn natural_key(&self) -> String {
        format!(
            "({}, {}, {})",
            self.business_account_id, self.location_id, self.google_review_id
        )
    }
}

/// What an upsert did to the stored row, judged by content hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StoredReview {
    pub id: i64,
    pub business_account_id: i64,
    pub location_id: i64,
    pub google_review_id: String,
    pub reviewer_name: String,
    pub reviewer_url: String,
    pub review_text: String,
    pub reply_text: String,
    pub rating: i64,
    pub review_date: String,
    pub content_hash: String,
    pub is_deleted: bool,
}

/// A stored review with its completed analysis, if any
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewListItem {
    #[serde(flatten)]
    pub review: StoredReview,
    pub sentiment: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct ReviewListRow {
    #[sqlx(flatten)]
    review: StoredReview,
    sentiment: Option<String>,
    summary: Option<String>,
    tags: Option<String>,
}

impl From<ReviewListRow> for ReviewListItem {
    fn from(row: ReviewListRow) -> Self {
        let tags = row
            .tags
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        Self {
            review: row.review,
            sentiment: row.sentiment,
            summary: row.summary,
            tags,
        }
    }
}

const REVIEW_COLUMNS: &str = "id, business_account_id, location_id, google_review_id, \
     reviewer_name, reviewer_url, review_text, reply_text, rating, review_date, content_hash, \
     is_deleted";

fn validate_scope(business_account_id: i64, location_id: i64) -> Result<()> {
    if business_account_id <= 0 || location_id <= 0 {
        return Err(SyncError::invalid(format!(
            "account and location ids must be positive (got {}, {})",
            business_account_id, location_id
        ))
        .into());
    }
    Ok(())
}

/// Insert or overwrite the mutable fields of a review. The soft-delete flag
/// is left as stored.
pub async fn upsert(pool: &SqlitePool, review: &ReviewRecord) -> Result<(i64, UpsertOutcome)> {
    validate_scope(review.business_account_id, review.location_id)?;

    let previous_hash: Option<(String,)> = sqlx::query_as(
        "SELECT content_hash FROM reviews
         WHERE business_account_id = ? AND location_id = ? AND google_review_id = ?",
    )
    .bind(review.business_account_id)
    .bind(review.location_id)
    .bind(&review.google_review_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("Failed to look up review {}", review.natural_key()))?;

    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO reviews (business_account_id, location_id, google_review_id, reviewer_name,
             reviewer_url, review_text, reply_text, rating, review_date, content_hash)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(business_account_id, location_id, google_review_id) DO UPDATE SET
             reviewer_name = excluded.reviewer_name,
             reviewer_url = excluded.reviewer_url,
             review_text = excluded.review_text,
             reply_text = excluded.reply_text,
             rating = excluded.rating,
             review_date = CASE WHEN ? THEN excluded.review_date ELSE reviews.review_date END,
             content_hash = excluded.content_hash,
             updated_at = datetime('now')
         RETURNING id",
    )
    .bind(review.business_account_id)
    .bind(review.location_id)
    .bind(&review.google_review_id)
    .bind(&review.reviewer_name)
    .bind(&review.reviewer_url)
    .bind(&review.review_text)
    .bind(&review.reply_text)
    .bind(review.rating)
    .bind(&review.review_date)
    .bind(&review.content_hash)
    .bind(review.date_from_upstream)
    .fetch_one(pool)
    .await
    .with_context(|| format!("Failed to upsert review {}", review.natural_key()))?;

    let outcome = match previous_hash {
        None => UpsertOutcome::Inserted,
        Some((hash,)) if hash == review.content_hash => UpsertOutcome::Unchanged,
        Some(_) => UpsertOutcome::Updated,
    };
    Ok((id, outcome))
}

pub async fn find_by_natural_key(
    pool: &SqlitePool,
    business_account_id: i64,
    location_id: i64,
    google_review_id: &str,
) -> Result<Option<StoredReview>> {
    sqlx::query_as(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews
         WHERE business_account_id = ? AND location_id = ? AND google_review_id = ?"
    ))
    .bind(business_account_id)
    .bind(location_id)
    .bind(google_review_id)
    .fetch_optional(pool)
    .await
    .context("Failed to find review by natural key")
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<StoredReview>> {
    sqlx::query_as(&format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to find review by id")
}

/// One page of live reviews, newest first, with completed analyses joined in
pub async fn find_by_location(
    pool: &SqlitePool,
    business_account_id: i64,
    location_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<ReviewListItem>> {
    validate_scope(business_account_id, location_id)?;
    if limit < 1 {
        return Err(SyncError::invalid(format!("limit must be at least 1 (got {})", limit)).into());
    }
    if offset < 0 {
        return Err(SyncError::invalid(format!("offset must not be negative (got {})", offset)).into());
    }

    let rows: Vec<ReviewListRow> = sqlx::query_as(
        "SELECT r.id, r.business_account_id, r.location_id, r.google_review_id, r.reviewer_name,
                r.reviewer_url, r.review_text, r.reply_text, r.rating, r.review_date,
                r.content_hash, r.is_deleted, ra.sentiment, ra.summary, ra.tags
         FROM reviews r
         LEFT JOIN review_analysis ra ON ra.review_id = r.id AND ra.status = 'complete'
         WHERE r.business_account_id = ? AND r.location_id = ? AND r.is_deleted = 0
         ORDER BY r.review_date DESC, r.id DESC
         LIMIT ? OFFSET ?",
    )
    .bind(business_account_id)
    .bind(location_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .context("Failed to list reviews for location")?;

    Ok(rows.into_iter().map(ReviewListItem::from).collect())
}

/// Live review count, same predicate as [`find_by_location`]
pub async fn count(pool: &SqlitePool, business_account_id: i64, location_id: i64) -> Result<i64> {
    validate_scope(business_account_id, location_id)?;

    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM reviews
         WHERE business_account_id = ? AND location_id = ? AND is_deleted = 0",
    )
    .bind(business_account_id)
    .bind(location_id)
    .fetch_one(pool)
    .await
    .context("Failed to count reviews for location")?;

    Ok(count)
}

/// Soft-delete a review; returns whether a row was flagged
pub async fn mark_deleted(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE reviews SET is_deleted = 1, updated_at = datetime('now')
         WHERE id = ? AND is_deleted = 0",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to soft-delete review")?;

    Ok(result.rows_affected() > 0)
}

/// Record the reply text after it was posted upstream
pub async fn set_reply(pool: &SqlitePool, id: i64, reply_text: &str) -> Result<()> {
    sqlx::query("UPDATE reviews SET reply_text = ?, updated_at = datetime('now') WHERE id = ?")
        .bind(reply_text)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to store review reply")?;

    Ok(())
}

#[cfg(test)]
pub(crate) fn record(account_id: i64, location_id: i64, google_id: &str, date: &str) -> ReviewRecord {
    ReviewRecord {
        business_account_id: account_id,
        location_id,
        google_review_id: google_id.to_string(),
        reviewer_name: "Jane".into(),
        review_text: format!("review {google_id}"),
        rating: 4,
        review_date: date.to_string(),
        date_from_upstream: true,
        content_hash: format!("hash-{google_id}"),
        ..Default::default()
    }
}

//! Normalization of upstream reviews into store records

use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};

use crate::api::models::{RawReview, StarRating};
use crate::config::repository::reviews::ReviewRecord;

pub const REVIEW_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `ONE`..`FIVE` (any case) or a whole number 1-5; anything else is 0
pub fn normalize_rating(rating: Option<&StarRating>) -> i64 {
    match rating {
        Some(StarRating::Numeric(n)) if n.fract() == 0.0 && (1.0..=5.0).contains(n) => *n as i64,
        Some(StarRating::Text(s)) => match s.trim().to_ascii_uppercase().as_str() {
            "ONE" | "1" => 1,
            "TWO" | "2" => 2,
            "THREE" | "3" => 3,
            "FOUR" | "4" => 4,
            "FIVE" | "5" => 5,
            _ => 0,
        },
        _ => 0,
    }
}

fn parse_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// RFC 3339 timestamp to canonical UTC `YYYY-MM-DD HH:MM:SS`, `now` when
/// absent or unparseable
pub fn normalize_date(raw: Option<&str>, now: DateTime<Utc>) -> String {
    parse_date(raw)
        .unwrap_or(now)
        .format(REVIEW_DATE_FORMAT)
        .to_string()
}

/// SHA-1 hex over the raw text, reply, rating and date values, each
/// prefixed with its byte length
pub fn content_hash(text: &str, reply: &str, rating: &str, date: &str) -> String {
    let mut hasher = Sha1::new();
    for part in [text, reply, rating, date] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Store record for an upstream review, or `None` when it has no usable id
pub fn to_record(
    raw: &RawReview,
    business_account_id: i64,
    location_id: i64,
    now: DateTime<Utc>,
) -> Option<ReviewRecord> {
    let google_review_id = raw.external_id()?.to_string();

    let text = raw.comment.as_deref().unwrap_or("");
    let reply = raw.reply_text().unwrap_or("");
    let rating_raw = raw.star_rating.as_ref().map(StarRating::raw).unwrap_or_default();
    let date_raw = raw.timestamp().unwrap_or("");

    let reviewer = raw.reviewer.as_ref();
    let reviewer_name = reviewer
        .and_then(|r| r.display_name.as_deref())
        .filter(|n| !n.trim().is_empty())
        .unwrap_or("Anonymous")
        .to_string();
    let reviewer_url = reviewer
        .and_then(|r| r.profile_photo_url.clone())
        .unwrap_or_default();

    Some(ReviewRecord {
        business_account_id,
        location_id,
        google_review_id,
        reviewer_name,
        reviewer_url,
        review_text: text.to_string(),
        reply_text: reply.to_string(),
        rating: normalize_rating(raw.star_rating.as_ref()),
        review_date: normalize_date(raw.timestamp(), now),
        date_from_upstream: parse_date(raw.timestamp()).is_some(),
        content_hash: content_hash(text, reply, &rating_raw, date_raw),
    })
}

//! Upstream review provider seam

use async_trait::async_trait;
use serde_json::Value;

use super::auth::Credential;
use super::models::{RawAccount, RawLocation, ReplyAck, ReviewsPage};
use crate::error::SyncResult;

/// Source of business, location and review data.
///
/// Account and location ids are the bare provider ids (`123`, not
/// `accounts/123`).
#[async_trait]
pub trait ReviewProvider: Send + Sync {
    /// One page of reviews; `page_token` is the cursor returned by the
    /// previous page
    async fn fetch_reviews_page(
        &self,
        account_id: &str,
        location_id: &str,
        credential: &Credential,
        page_token: Option<&str>,
    ) -> SyncResult<ReviewsPage>;

    /// Publish or replace the owner reply to a review
    async fn post_reply(
        &self,
        account_id: &str,
        location_id: &str,
        review_id: &str,
        text: &str,
        credential: &Credential,
    ) -> SyncResult<ReplyAck>;

    async fn list_accounts(&self, credential: &Credential) -> SyncResult<Vec<RawAccount>>;

    async fn list_locations(
        &self,
        account_id: &str,
        credential: &Credential,
    ) -> SyncResult<Vec<RawLocation>>;

    /// Live location details, passed through as returned
    async fn get_location(
        &self,
        account_id: &str,
        location_id: &str,
        credential: &Credential,
    ) -> SyncResult<Value>;
}

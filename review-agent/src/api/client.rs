//! HTTP client for the Google Business Profile APIs

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

use super::auth::Credential;
use super::models::{AccountsPage, LocationsPage, RawAccount, RawLocation, ReplyAck, ReviewsPage};
use super::provider::ReviewProvider;
use super::resilience::{ResilienceConfig, RetryPolicy, parse_retry_after};
use crate::config::UpstreamConfig;
use crate::error::{SyncError, SyncResult};

const LOCATION_READ_MASK: &str = "name,title,storefrontAddress,phoneNumbers,websiteUri";

/// Client for the reviews (v4), business information and account
/// management APIs
#[derive(Clone)]
pub struct GoogleBusinessClient {
    http: Client,
    reviews_base_url: String,
    business_info_base_url: String,
    account_management_base_url: String,
    resilience: ResilienceConfig,
}

impl GoogleBusinessClient {
    pub fn new(upstream: &UpstreamConfig, resilience: ResilienceConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(resilience.request_timeout)
            .user_agent(concat!("review-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            reviews_base_url: trim_base(&upstream.reviews_base_url),
            business_info_base_url: trim_base(&upstream.business_info_base_url),
            account_management_base_url: trim_base(&upstream.account_management_base_url),
            resilience,
        })
    }

    fn reviews_url(&self, account_id: &str, location_id: &str) -> String {
        format!(
            "{}/accounts/{}/locations/{}/reviews",
            self.reviews_base_url,
            urlencoding::encode(account_id),
            urlencoding::encode(location_id)
        )
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        credential: &Credential,
    ) -> SyncResult<T> {
        let response = request
            .bearer_auth(credential.token())
            .send()
            .await
            .map_err(map_transport_error)?;

        let response = check_status(response).await?;
        let status = response.status();
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                map_transport_error(e)
            } else {
                SyncError::Upstream {
                    status: status.as_u16(),
                    message: format!("malformed response body: {}", e),
                    retry_after: None,
                }
            }
        })
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Timeouts and connection failures are transient
pub(crate) fn map_transport_error(err: reqwest::Error) -> SyncError {
    let err = err.without_url();
    if err.is_timeout() {
        SyncError::UpstreamUnavailable(format!("request timed out: {}", err))
    } else if err.is_connect() || err.is_request() {
        SyncError::UpstreamUnavailable(format!("unable to reach upstream: {}", err))
    } else {
        SyncError::UpstreamUnavailable(err.to_string())
    }
}

/// Map a non-success upstream status to the error taxonomy
pub(crate) fn map_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> SyncError {
    let detail = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("no details").to_string()
    } else {
        body.trim().chars().take(300).collect()
    };

    match status {
        StatusCode::UNAUTHORIZED => {
            SyncError::AuthenticationFailed(format!("token expired or invalid ({})", detail))
        }
        StatusCode::FORBIDDEN => SyncError::AccessForbidden(format!(
            "insufficient permissions for this resource ({})",
            detail
        )),
        StatusCode::NOT_FOUND => SyncError::NotFound(detail),
        _ => SyncError::Upstream {
            status: status.as_u16(),
            message: detail,
            retry_after,
        },
    }
}

async fn check_status(response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();
    Err(map_status(status, retry_after, &body))
}

/// Walk a paginated listing, merging items in cursor order
async fn collect_pages<T, P, F, Fut>(
    max_pages: u32,
    page_delay: Duration,
    mut fetch: F,
    split: fn(P) -> (Vec<T>, Option<String>),
) -> SyncResult<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: std::future::Future<Output = SyncResult<P>>,
{
    let mut items = Vec::new();
    let mut token: Option<String> = None;
    for page in 1..=max_pages.max(1) {
        let (batch, next) = split(fetch(token.take()).await?);
        items.extend(batch);
        match next.filter(|t| !t.is_empty()) {
            Some(next) => token = Some(next),
            None => break,
        }
        if page < max_pages && !page_delay.is_zero() {
            tokio::time::sleep(page_delay).await;
        }
    }
    Ok(items)
}

#[async_trait]
impl ReviewProvider for GoogleBusinessClient {
    async fn fetch_reviews_page(
        &self,
        account_id: &str,
        location_id: &str,
        credential: &Credential,
        page_token: Option<&str>,
    ) -> SyncResult<ReviewsPage> {
        let mut request = self.http.get(self.reviews_url(account_id, location_id));
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        self.send_json(request, credential).await
    }

    async fn post_reply(
        &self,
        account_id: &str,
        location_id: &str,
        review_id: &str,
        text: &str,
        credential: &Credential,
    ) -> SyncResult<ReplyAck> {
        let url = format!(
            "{}/{}/reply",
            self.reviews_url(account_id, location_id),
            urlencoding::encode(review_id)
        );
        let body = json!({ "comment": text });
        let policy = RetryPolicy::new(self.resilience.retry.clone());

        policy
            .execute("reply to review", |_| {
                let request = self.http.put(&url).json(&body);
                self.send_json::<ReplyAck>(request, credential)
            })
            .await
    }

    async fn list_accounts(&self, credential: &Credential) -> SyncResult<Vec<RawAccount>> {
        let url = format!("{}/accounts", self.account_management_base_url);
        collect_pages(
            self.resilience.paging.max_pages,
            self.resilience.paging.page_delay,
            |token| {
                let mut request = self.http.get(&url);
                if let Some(token) = token {
                    request = request.query(&[("pageToken", token)]);
                }
                self.send_json::<AccountsPage>(request, credential)
            },
            |page: AccountsPage| (page.accounts, page.next_page_token),
        )
        .await
    }

    async fn list_locations(
        &self,
        account_id: &str,
        credential: &Credential,
    ) -> SyncResult<Vec<RawLocation>> {
        let url = format!(
            "{}/accounts/{}/locations",
            self.business_info_base_url,
            urlencoding::encode(account_id)
        );
        collect_pages(
            self.resilience.paging.max_pages,
            self.resilience.paging.page_delay,
            |token| {
                let mut request = self
                    .http
                    .get(&url)
                    .query(&[("readMask", LOCATION_READ_MASK), ("pageSize", "100")]);
                if let Some(token) = token {
                    request = request.query(&[("pageToken", token)]);
                }
                self.send_json::<LocationsPage>(request, credential)
            },
            |page: LocationsPage| (page.locations, page.next_page_token),
        )
        .await
    }

    async fn get_location(
        &self,
        account_id: &str,
        location_id: &str,
        credential: &Credential,
    ) -> SyncResult<Value> {
        let url = format!(
            "{}/accounts/{}/locations/{}",
            self.reviews_base_url,
            urlencoding::encode(account_id),
            urlencoding::encode(location_id)
        );
        self.send_json(self.http.get(url), credential).await
    }
}

//! Upstream payload models for the Google Business Profile APIs
//!
//! Every field the upstream may omit is an `Option`; defaulting happens in
//! the sync normalizer, not here.

use serde::{Deserialize, Serialize};

/// Star rating as sent upstream: either the enum string (`"FIVE"`) or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StarRating {
    Numeric(f64),
    Text(String),
}

impl StarRating {
    /// Raw textual form, used as a content hash component
    pub fn raw(&self) -> String {
        match self {
            StarRating::Numeric(n) => n.to_string(),
            StarRating::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reviewer {
    pub display_name: Option<String>,
    pub profile_photo_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReply {
    pub comment: Option<String>,
    pub update_time: Option<String>,
}

/// A single review as returned by the reviews endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReview {
    pub review_id: Option<String>,
    /// Full resource name (`accounts/{a}/locations/{l}/reviews/{r}`)
    pub name: Option<String>,
    pub reviewer: Option<Reviewer>,
    pub star_rating: Option<StarRating>,
    pub comment: Option<String>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
    pub review_reply: Option<ReviewReply>,
}

impl RawReview {
    /// Bare external review id: `reviewId`, falling back to the last
    /// segment of the resource name. Blank values count as missing.
    pub fn external_id(&self) -> Option<&str> {
        [self.review_id.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .map(|s| resource_id(s.trim()).trim())
            .find(|s| !s.is_empty())
    }

    pub fn reply_text(&self) -> Option<&str> {
        self.review_reply.as_ref().and_then(|r| r.comment.as_deref())
    }

    /// Most recent timestamp the upstream reports for this review
    pub fn timestamp(&self) -> Option<&str> {
        self.update_time.as_deref().or(self.create_time.as_deref())
    }
}

/// One page of the reviews listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewsPage {
    #[serde(default)]
    pub reviews: Vec<RawReview>,
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub total_review_count: u64,
    #[serde(default)]
    pub average_rating: f64,
}

impl ReviewsPage {
    /// Next cursor, treating an empty token as the end of the listing
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAccount {
    /// Resource name (`accounts/{id}`)
    pub name: String,
    pub account_name: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsPage {
    #[serde(default)]
    pub accounts: Vec<RawAccount>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorefrontAddress {
    #[serde(default)]
    pub address_lines: Vec<String>,
    pub locality: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneNumbers {
    pub primary_phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLocation {
    /// Resource name (`locations/{id}` or `accounts/{a}/locations/{id}`)
    pub name: String,
    pub title: Option<String>,
    pub storefront_address: Option<StorefrontAddress>,
    pub phone_numbers: Option<PhoneNumbers>,
    pub primary_phone: Option<String>,
    pub website_uri: Option<String>,
}

impl RawLocation {
    /// Single-line address: address lines joined, then the locality
    pub fn address(&self) -> String {
        let Some(addr) = &self.storefront_address else {
            return String::new();
        };
        let mut parts: Vec<&str> = addr
            .address_lines
            .iter()
            .map(String::as_str)
            .filter(|l| !l.trim().is_empty())
            .collect();
        if let Some(locality) = addr.locality.as_deref().filter(|l| !l.trim().is_empty()) {
            parts.push(locality);
        }
        parts.join(", ")
    }

    pub fn phone(&self) -> String {
        self.phone_numbers
            .as_ref()
            .and_then(|p| p.primary_phone.clone())
            .or_else(|| self.primary_phone.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationsPage {
    #[serde(default)]
    pub locations: Vec<RawLocation>,
    pub next_page_token: Option<String>,
}

/// Acknowledgement returned after posting a reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyAck {
    pub comment: Option<String>,
    pub update_time: Option<String>,
}

/// Last path segment of a resource name (`accounts/12/locations/34` -> `34`)
pub fn resource_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

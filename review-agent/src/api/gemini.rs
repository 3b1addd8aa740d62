//! Review analyzer backed by the Gemini `generateContent` endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::client::{map_status, map_transport_error};
use super::resilience::parse_retry_after;
use crate::config::AnalysisConfig;
use crate::error::{SyncError, SyncResult};
use crate::services::analysis::{
    AnalysisInput, ReviewAnalysisDraft, ReviewAnalyzer, parse_analysis_response,
};

pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

impl GeminiClient {
    /// `None` when no API key is configured
    pub fn from_config(
        config: &AnalysisConfig,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Option<Self>> {
        let Some(api_key) = config.api_key.clone().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Some(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        }))
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(&self.model)
        )
    }
}

pub fn build_prompt(input: &AnalysisInput) -> String {
    let reply = if input.reply.trim().is_empty() {
        "No reply"
    } else {
        input.reply.as_str()
    };
    format!(
        r#"Analyze this Google Business review and return a structured JSON response.

Review details:
- Rating: {rating}/5 stars
- Review text: "{text}"
- Business reply: "{reply}"

Return a JSON object with exactly this structure:
{{
  "summary": "Brief 2-3 sentence summary of the review",
  "sentiment": "positive|negative|neutral",
  "sentimentScore": 0.0,
  "tags": ["tag1", "tag2", "tag3"],
  "suggestedReply": "A short, professional reply the business could post"
}}

Guidelines:
- sentimentScore is between 0.0 (very negative) and 1.0 (very positive)
- tags are 3-5 short keywords relevant to business operations (e.g. "service", "pricing", "staff")
- Return only the JSON object, no additional text."#,
        rating = input.rating,
        text = input.text,
        reply = reply,
    )
}

#[async_trait]
impl ReviewAnalyzer for GeminiClient {
    async fn analyze(&self, input: &AnalysisInput) -> SyncResult<ReviewAnalysisDraft> {
        let body = json!({
            "contents": [{ "parts": [{ "text": build_prompt(input) }] }]
        });

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let text = response.text().await.unwrap_or_default();
            return Err(map_status(status, retry_after, &text));
        }

        let generated: GenerateResponse = response.json().await.map_err(|e| SyncError::Upstream {
            status: status.as_u16(),
            message: format!("malformed generateContent response: {}", e),
            retry_after: None,
        })?;

        Ok(parse_analysis_response(&generated.text()))
    }
}

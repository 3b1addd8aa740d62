//! Parsing of generated analysis text

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// Case-insensitive; anything unrecognised is neutral
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

/// Structured analysis of one review, before it is versioned and stored
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAnalysisDraft {
    pub summary: String,
    pub sentiment: Sentiment,
    pub sentiment_score: f64,
    pub tags: Vec<String>,
    pub suggested_reply: String,
}

impl ReviewAnalysisDraft {
    /// Record used when the generated text cannot be understood
    pub fn fallback() -> Self {
        Self {
            summary: String::new(),
            sentiment: Sentiment::Neutral,
            sentiment_score: 0.5,
            tags: vec!["parsing-error".to_string()],
            suggested_reply: String::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDraft {
    summary: Option<String>,
    sentiment: Option<String>,
    sentiment_score: Option<f64>,
    #[serde(default)]
    tags: Value,
    suggested_reply: Option<String>,
}

/// Parse generated text into a draft. Never fails: unparseable text yields
/// [`ReviewAnalysisDraft::fallback`].
pub fn parse_analysis_response(text: &str) -> ReviewAnalysisDraft {
    match try_parse(text) {
        Ok(draft) => draft,
        Err(e) => {
            log::warn!("{}; storing fallback analysis", e);
            log::debug!("Unparseable analysis text: {}", text);
            ReviewAnalysisDraft::fallback()
        }
    }
}

fn try_parse(text: &str) -> Result<ReviewAnalysisDraft, SyncError> {
    let json = extract_json(text)
        .ok_or_else(|| SyncError::AnalysisParseFailure("no JSON object in response".into()))?;

    let raw: RawDraft = serde_json::from_str(json)
        .map_err(|e| SyncError::AnalysisParseFailure(format!("invalid JSON: {}", e)))?;

    let summary = raw
        .summary
        .ok_or_else(|| SyncError::AnalysisParseFailure("missing field: summary".into()))?;
    let sentiment = raw
        .sentiment
        .as_deref()
        .map(Sentiment::parse_lenient)
        .ok_or_else(|| SyncError::AnalysisParseFailure("missing field: sentiment".into()))?;

    let tags = match raw.tags {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    let sentiment_score = raw
        .sentiment_score
        .filter(|s| s.is_finite())
        .map(|s| s.clamp(0.0, 1.0))
        .unwrap_or(0.5);

    Ok(ReviewAnalysisDraft {
        summary: summary.trim().to_string(),
        sentiment,
        sentiment_score,
        tags,
        suggested_reply: raw.suggested_reply.unwrap_or_default().trim().to_string(),
    })
}

/// Strip markdown fences and surrounding prose down to the outermost object
fn extract_json(text: &str) -> Option<&str> {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = rest.strip_prefix("json").unwrap_or(rest);
        body = body.trim_end().strip_suffix("```").unwrap_or(body);
    }
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_fenced_response() {
        let text = "```json\n{\"summary\": \" Loved the latte. \", \"sentiment\": \"Positive\", \
                    \"sentimentScore\": 0.92, \"tags\": [\"coffee\", \"\", \"staff\"], \
                    \"suggestedReply\": \"Thanks for visiting!\"}\n```";
        let draft = parse_analysis_response(text);
        assert_eq!(draft.summary, "Loved the latte.");
        assert_eq!(draft.sentiment, Sentiment::Positive);
        assert_eq!(draft.sentiment_score, 0.92);
        assert_eq!(draft.tags, vec!["coffee", "staff"]);
        assert_eq!(draft.suggested_reply, "Thanks for visiting!");
    }

    #[test]
    fn test_lenient_fields() {
        let draft = parse_analysis_response(
            r#"Here you go: {"summary": "Slow", "sentiment": "furious", "tags": "service", "sentimentScore": 7}"#,
        );
        assert_eq!(draft.sentiment, Sentiment::Neutral);
        assert!(draft.tags.is_empty());
        assert_eq!(draft.sentiment_score, 1.0);
        assert_eq!(draft.suggested_reply, "");
    }

    #[test]
    fn test_garbage_yields_fallback() {
        for text in ["", "not json at all", "{\"sentiment\": \"positive\"}", "{broken"] {
            assert_eq!(parse_analysis_response(text), ReviewAnalysisDraft::fallback());
        }
        let fallback = ReviewAnalysisDraft::fallback();
        assert_eq!(fallback.tags, vec!["parsing-error"]);
        assert_eq!(fallback.sentiment.as_str(), "neutral");
    }
}

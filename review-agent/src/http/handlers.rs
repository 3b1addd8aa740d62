use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use super::response::{ApiError, ok};
use super::{AppState, UserId};
use crate::api::models::RawReview;
use crate::config::repository::{analysis as analysis_cache, preferences, users};
use crate::config::repository::preferences::UserPreferences;
use crate::error::{SyncError, SyncResult};
use crate::services::analysis::AnalysisService;
use crate::services::sync::ReviewQuery;

type HandlerResult = Result<Response, ApiError>;

fn fail(state: &AppState) -> impl Fn(SyncError) -> ApiError + '_ {
    move |err| ApiError::from_sync(err, state.config.is_production())
}

fn int_param(params: &HashMap<String, String>, key: &str, default: i64) -> SyncResult<i64> {
    match params.get(key).map(|v| v.trim()) {
        None | Some("") => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| SyncError::invalid(format!("{} must be an integer (got {})", key, raw))),
    }
}

fn bool_param(params: &HashMap<String, String>, key: &str) -> bool {
    params
        .get(key)
        .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyBody {
    #[serde(default)]
    pub reply_text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeBody {
    pub reviews: Option<Vec<RawReview>>,
}

pub async fn health() -> Response {
    ok(
        "Service is healthy",
        json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() }),
    )
}

/// Check the stored credential against the upstream accounts listing
pub async fn connection_check(State(state): State<AppState>, user: UserId) -> HandlerResult {
    let fail = fail(&state);
    let credential = state.credentials.credential_for(user.0).await.map_err(&fail)?;
    let accounts = state
        .catalog
        .check_connection(&credential)
        .await
        .map_err(&fail)?;

    Ok(ok("Connection successful", json!({ "accountsCount": accounts })))
}

pub async fn business_locations(State(state): State<AppState>, user: UserId) -> HandlerResult {
    let fail = fail(&state);
    let accounts = state.catalog.business_locations(user.0).await.map_err(&fail)?;
    Ok(ok(format!("Retrieved {} business accounts", accounts.len()), accounts))
}

pub async fn reviews(
    State(state): State<AppState>,
    user: UserId,
    Path((account, location)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> HandlerResult {
    let fail = fail(&state);
    let query = ReviewQuery {
        page: int_param(&params, "page", 1).map_err(&fail)?,
        limit: int_param(&params, "limit", 50).map_err(&fail)?,
        force_refresh: bool_param(&params, "forceRefresh"),
    };

    let scope = state
        .catalog
        .resolve_scope(user.0, &account, &location)
        .await
        .map_err(&fail)?
        .sync_scope();
    let credential = state.credentials.credential_for(user.0).await.map_err(&fail)?;
    let result = state
        .sync
        .get_reviews(&scope, &credential, query)
        .await
        .map_err(&fail)?;

    Ok(ok(format!("Retrieved {} reviews", result.reviews.len()), result))
}

pub async fn refresh(
    State(state): State<AppState>,
    user: UserId,
    Path((account, location)): Path<(String, String)>,
) -> HandlerResult {
    let fail = fail(&state);
    let scope = state
        .catalog
        .resolve_scope(user.0, &account, &location)
        .await
        .map_err(&fail)?
        .sync_scope();
    let credential = state.credentials.credential_for(user.0).await.map_err(&fail)?;
    let report = state.sync.refresh(&scope, &credential).await.map_err(&fail)?;

    Ok(ok(format!("Synced {} reviews", report.synced), report))
}

pub async fn location_info(
    State(state): State<AppState>,
    user: UserId,
    Path((account, location)): Path<(String, String)>,
) -> HandlerResult {
    let fail = fail(&state);
    let resolved = state
        .catalog
        .resolve_scope(user.0, &account, &location)
        .await
        .map_err(&fail)?;
    let credential = state.credentials.credential_for(user.0).await.map_err(&fail)?;
    let info = state.catalog.location_info(&resolved, &credential).await;

    Ok(ok("Retrieved location info", info))
}

pub async fn reply(
    State(state): State<AppState>,
    user: UserId,
    Path((account, location, review)): Path<(String, String, String)>,
    body: Option<Json<ReplyBody>>,
) -> HandlerResult {
    let fail = fail(&state);
    let Json(body) = body.ok_or_else(|| fail(SyncError::invalid("replyText is required")))?;

    let scope = state
        .catalog
        .resolve_scope(user.0, &account, &location)
        .await
        .map_err(&fail)?
        .sync_scope();
    let credential = state.credentials.credential_for(user.0).await.map_err(&fail)?;
    let ack = state
        .sync
        .reply_to_review(&scope, &credential, &review, &body.reply_text)
        .await
        .map_err(&fail)?;

    Ok(ok("Reply posted", ack))
}

/// Analyze the reviews in the body, or a page of stored reviews when the
/// body carries none
pub async fn analyze(
    State(state): State<AppState>,
    user: UserId,
    Path((account, location)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    body: Option<Json<AnalyzeBody>>,
) -> HandlerResult {
    let fail = fail(&state);
    let service = analysis_service(&state).map_err(&fail)?;

    let scope = state
        .catalog
        .resolve_scope(user.0, &account, &location)
        .await
        .map_err(&fail)?
        .sync_scope();

    let reviews = match body.and_then(|Json(b)| b.reviews) {
        Some(raw) => state.sync.ingest(&scope, &raw).await.map_err(&fail)?,
        None => {
            let page = int_param(&params, "page", 1).map_err(&fail)?;
            let limit = int_param(&params, "limit", 50).map_err(&fail)?;
            state
                .sync
                .cached_page(&scope, page, limit)
                .await
                .map_err(&fail)?
                .reviews
                .into_iter()
                .map(|item| item.review)
                .collect()
        }
    };

    let batch = service.analyze_batch(&reviews).await;
    let message = format!(
        "Analyzed {} new reviews, {} from cache",
        batch.stats.new_analysis, batch.stats.cached
    );
    Ok(ok(
        message,
        json!({
            "analyzedReviews": batch.analyzed_reviews,
            "stats": batch.stats,
            "errors": batch.errors,
            "accountId": scope.account_ext_id,
            "locationId": scope.location_ext_id,
        }),
    ))
}

fn analysis_service(state: &AppState) -> SyncResult<&AnalysisService> {
    state
        .analysis
        .as_ref()
        .ok_or_else(|| SyncError::UpstreamUnavailable("review analysis is not configured".into()))
}

pub async fn analysis_connection(State(state): State<AppState>) -> HandlerResult {
    let fail = fail(&state);
    let service = analysis_service(&state).map_err(&fail)?;
    let sample = service.check_connection().await.map_err(&fail)?;

    Ok(ok("AI service connection successful", json!({ "testAnalysis": sample })))
}

/// Analyze the body reviews without caching the results
pub async fn preview_analysis(
    State(state): State<AppState>,
    body: Option<Json<AnalyzeBody>>,
) -> HandlerResult {
    let fail = fail(&state);
    let service = analysis_service(&state).map_err(&fail)?;
    let reviews = body
        .and_then(|Json(b)| b.reviews)
        .ok_or_else(|| fail(SyncError::invalid("reviews array is required")))?;

    let preview = service.preview(&reviews).await;
    Ok(ok(
        format!("Test analysis completed for {} reviews", preview.total_tested),
        preview,
    ))
}

pub async fn analyzed_reviews(
    State(state): State<AppState>,
    user: UserId,
    Path((account, location)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> HandlerResult {
    let fail = fail(&state);
    let page = int_param(&params, "page", 1).map_err(&fail)?;
    let limit = int_param(&params, "limit", 50).map_err(&fail)?;

    let scope = state
        .catalog
        .resolve_scope(user.0, &account, &location)
        .await
        .map_err(&fail)?
        .sync_scope();
    let result = state
        .sync
        .cached_page(&scope, page, limit)
        .await
        .map_err(&fail)?;

    Ok(ok(format!("Retrieved {} analyzed reviews", result.reviews.len()), result))
}

pub async fn analysis_stats(
    State(state): State<AppState>,
    user: UserId,
    Path((account, location)): Path<(String, String)>,
) -> HandlerResult {
    let fail = fail(&state);
    let scope = state
        .catalog
        .resolve_scope(user.0, &account, &location)
        .await
        .map_err(&fail)?
        .sync_scope();
    let stats = analysis_cache::stats(&state.pool, scope.account_id, scope.location_id)
        .await
        .map_err(|e| fail(SyncError::from_store(e)))?;

    Ok(ok("Retrieved analysis stats", stats))
}

pub async fn clear_analysis_cache(
    State(state): State<AppState>,
    user: UserId,
    Path((account, location)): Path<(String, String)>,
) -> HandlerResult {
    if state.config.is_production() {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "Cache clearing is not allowed in production",
        ));
    }
    let fail = fail(&state);
    let scope = state
        .catalog
        .resolve_scope(user.0, &account, &location)
        .await
        .map_err(&fail)?
        .sync_scope();
    let cleared = analysis_cache::clear_for_location(&state.pool, scope.account_id, scope.location_id)
        .await
        .map_err(|e| fail(SyncError::from_store(e)))?;

    log::info!("Cleared {} cached analyses for location {}", cleared, scope.location_ext_id);
    Ok(ok(format!("Cleared {} cached analyses", cleared), json!({ "cleared": cleared })))
}

pub async fn sync_catalog(State(state): State<AppState>, user: UserId) -> HandlerResult {
    let fail = fail(&state);
    let credential = state.credentials.credential_for(user.0).await.map_err(&fail)?;
    let report = state
        .catalog
        .sync_catalog(user.0, &credential)
        .await
        .map_err(&fail)?;

    Ok(ok(
        format!("Synced {} accounts and {} locations", report.accounts, report.locations),
        report,
    ))
}

async fn require_user(state: &AppState, user_id: i64) -> SyncResult<()> {
    users::find_by_id(&state.pool, user_id)
        .await
        .map_err(SyncError::from_store)?
        .map(|_| ())
        .ok_or_else(|| SyncError::NotFound(format!("user {}", user_id)))
}

pub async fn get_preferences(State(state): State<AppState>, user: UserId) -> HandlerResult {
    let fail = fail(&state);
    require_user(&state, user.0).await.map_err(&fail)?;
    let prefs = preferences::find_by_user(&state.pool, user.0)
        .await
        .map_err(|e| fail(SyncError::from_store(e)))?
        .unwrap_or_default();

    Ok(ok("Retrieved preferences", prefs))
}

pub async fn put_preferences(
    State(state): State<AppState>,
    user: UserId,
    body: Option<Json<UserPreferences>>,
) -> HandlerResult {
    let fail = fail(&state);
    let Json(prefs) = body.ok_or_else(|| fail(SyncError::invalid("preferences body is required")))?;
    require_user(&state, user.0).await.map_err(&fail)?;
    preferences::upsert(&state.pool, user.0, &prefs)
        .await
        .map_err(|e| fail(SyncError::from_store(e)))?;

    Ok(ok("Preferences saved", prefs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params() {
        let params = HashMap::from([
            ("page".to_string(), "3".to_string()),
            ("limit".to_string(), " ".to_string()),
            ("forceRefresh".to_string(), "TRUE".to_string()),
            ("bad".to_string(), "x".to_string()),
        ]);
        assert_eq!(int_param(&params, "page", 1).unwrap(), 3);
        assert_eq!(int_param(&params, "limit", 50).unwrap(), 50);
        assert_eq!(int_param(&params, "missing", 7).unwrap(), 7);
        assert!(matches!(
            int_param(&params, "bad", 1),
            Err(SyncError::InvalidArgument(_))
        ));
        assert!(bool_param(&params, "forceRefresh"));
        assert!(!bool_param(&params, "missing"));
    }
}

//! HTTP surface over the sync, catalog and analysis services

pub mod handlers;
pub mod response;

use anyhow::{Context, Result};
use axum::Router;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::routing::{delete, get, post, put};
use std::sync::Arc;

use crate::context::AppContext;
use response::ApiError;

pub type AppState = Arc<AppContext>;

/// Internal user id taken from the `x-user-id` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub i64);

pub const USER_ID_HEADER: &str = "x-user-id";

#[async_trait]
impl FromRequestParts<AppState> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Authentication required"))?;

        match raw.parse::<i64>() {
            Ok(id) if id > 0 => Ok(UserId(id)),
            _ => Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                format!("Invalid {} header", USER_ID_HEADER),
            )),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let location = "/accounts/:account/locations/:location";

    let reviews = Router::new()
        .route("/test-connection", get(handlers::connection_check))
        .route("/business-locations", get(handlers::business_locations))
        .route(&format!("{location}/reviews"), get(handlers::reviews))
        .route(&format!("{location}/refresh"), post(handlers::refresh))
        .route(&format!("{location}/info"), get(handlers::location_info))
        .route(&format!("{location}/reviews/:review/reply"), put(handlers::reply));

    let analysis = Router::new()
        .route("/test", get(handlers::analysis_connection))
        .route("/test-analyze", post(handlers::preview_analysis))
        .route("/:account/:location", post(handlers::analyze))
        .route(&format!("{location}/reviews"), get(handlers::analyzed_reviews))
        .route(&format!("{location}/stats"), get(handlers::analysis_stats))
        .route(&format!("{location}/cache"), delete(handlers::clear_analysis_cache));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/reviews", reviews)
        .nest("/api/analysis", analysis)
        .route("/api/catalog/sync", post(handlers::sync_catalog))
        .route(
            "/api/preferences",
            get(handlers::get_preferences).put(handlers::put_preferences),
        )
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(state: AppState) -> Result<()> {
    let bind = state.config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    log::info!(
        "Listening on {} ({} mode)",
        bind,
        state.config.server.environment
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {}", e);
            }
            log::info!("Shutting down");
        })
        .await
        .context("HTTP server failed")
}

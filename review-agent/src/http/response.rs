//! JSON envelope and error mapping for the HTTP surface

use axum::Json;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::SyncError;

/// `{success, message, data?, code?, error?}`
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Stable error code, e.g. `NOT_FOUND`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    /// Detailed error text, outside production only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    (
        StatusCode::OK,
        Json(Envelope {
            success: true,
            message: message.into(),
            data: Some(data),
            code: None,
            error: None,
        }),
    )
        .into_response()
}

#[must_use]
pub fn error_status(err: &SyncError) -> StatusCode {
    match err {
        SyncError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
        SyncError::AccessForbidden(_) => StatusCode::FORBIDDEN,
        SyncError::NotFound(_) => StatusCode::NOT_FOUND,
        SyncError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        SyncError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SyncError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        SyncError::PersistenceFailure(_) | SyncError::AnalysisParseFailure(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Failed request. Internal details are dropped in production.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    code: Option<&'static str>,
    detail: Option<String>,
    retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: None,
            detail: None,
            retry_after: None,
        }
    }

    pub fn from_sync(err: SyncError, production: bool) -> Self {
        let status = error_status(&err);
        if status.is_server_error() {
            log::error!("Request failed: {:#}", err);
        } else {
            log::debug!("Request rejected: {}", err);
        }

        let message = match &err {
            SyncError::PersistenceFailure(_) => "Failed to access the review store".to_string(),
            other => other.to_string(),
        };
        let retry_after = match &err {
            SyncError::Upstream {
                retry_after: Some(delay),
                ..
            } => Some(delay.as_secs().max(1)),
            _ => None,
        };
        let detail = (!production).then(|| format!("{:#}", err));

        Self {
            status,
            message,
            code: Some(err.code()),
            detail,
            retry_after,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(Envelope::<()> {
            success: false,
            message: self.message,
            data: None,
            code: self.code,
            error: self.detail,
        });
        let mut resp = (self.status, body).into_response();
        if let Some(secs) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                resp.headers_mut().insert("retry-after", value);
            }
        }
        resp
    }
}

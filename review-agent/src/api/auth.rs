//! Upstream credentials

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::fmt;

use crate::config::repository::users;
use crate::error::{SyncError, SyncResult};

/// Bearer access token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current access credential of an internal user
    async fn credential_for(&self, user_id: i64) -> SyncResult<Credential>;
}

/// Reads the access token stored in the identity registry. An expired or
/// absent token is an authentication failure; refreshing it is left to the
/// sign-in flow.
#[derive(Clone)]
pub struct StoredCredentialProvider {
    pool: SqlitePool,
}

impl StoredCredentialProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialProvider for StoredCredentialProvider {
    async fn credential_for(&self, user_id: i64) -> SyncResult<Credential> {
        if user_id <= 0 {
            return Err(SyncError::invalid(format!(
                "user id must be positive (got {})",
                user_id
            )));
        }

        let user = users::find_by_id(&self.pool, user_id)
            .await
            .map_err(SyncError::from_store)?
            .ok_or_else(|| SyncError::AuthenticationFailed(format!("unknown user {}", user_id)))?;

        let token = user
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                SyncError::AuthenticationFailed("no access token stored; sign in again".into())
            })?;

        if let Some(expires_at) = user.token_expires_at {
            if expires_at <= Utc::now() {
                log::debug!("Access token of user {} expired at {}", user_id, expires_at);
                return Err(SyncError::AuthenticationFailed(
                    "access token expired; sign in again".into(),
                ));
            }
        }

        Ok(Credential::new(token))
    }
}

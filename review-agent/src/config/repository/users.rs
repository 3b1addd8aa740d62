//! Identity registry: external identity id -> internal user record

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub google_user_id: String,
    pub email: String,
    pub name: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// Identity and credentials received on authentication
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub google_user_id: &'a str,
    pub email: &'a str,
    pub name: &'a str,
    pub access_token: Option<&'a str>,
    pub refresh_token: Option<&'a str>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

const USER_COLUMNS: &str =
    "id, google_user_id, email, name, access_token, refresh_token, token_expires_at";

/// Insert or update a user keyed by external identity id. A missing refresh
/// token keeps the stored one.
pub async fn upsert(pool: &SqlitePool, user: &NewUser<'_>) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO users (google_user_id, email, name, access_token, refresh_token, token_expires_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(google_user_id) DO UPDATE SET
             email = excluded.email,
             name = excluded.name,
             access_token = excluded.access_token,
             refresh_token = COALESCE(excluded.refresh_token, users.refresh_token),
             token_expires_at = excluded.token_expires_at,
             updated_at = datetime('now')
         RETURNING id",
    )
    .bind(user.google_user_id)
    .bind(user.email)
    .bind(user.name)
    .bind(user.access_token)
    .bind(user.refresh_token)
    .bind(user.token_expires_at)
    .fetch_one(pool)
    .await
    .with_context(|| format!("Failed to upsert user {}", user.google_user_id))?;

    Ok(id)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to find user by id")
}

pub async fn find_by_google_id(pool: &SqlitePool, google_user_id: &str) -> Result<Option<User>> {
    sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE google_user_id = ?"
    ))
    .bind(google_user_id)
    .fetch_optional(pool)
    .await
    .context("Failed to find user by external id")
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to find user by email")
}

/// Store refreshed credentials
pub async fn update_tokens(
    pool: &SqlitePool,
    user_id: i64,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        "UPDATE users SET
             access_token = ?,
             refresh_token = COALESCE(?, refresh_token),
             token_expires_at = ?,
             updated_at = datetime('now')
         WHERE id = ?",
    )
    .bind(access_token)
    .bind(refresh_token)
    .bind(expires_at)
    .bind(user_id)
    .execute(pool)
    .await
    .context("Failed to update user tokens")?;

    Ok(())
}

#[cfg(test)]
pub(crate) async fn seed(pool: &SqlitePool, google_user_id: &str) -> i64 {
    upsert(
        pool,
        &NewUser {
            google_user_id,
            email: &format!("{google_user_id}@example.com"),
            name: "Owner",
            access_token: Some("access-token"),
            refresh_token: Some("refresh-token"),
            token_expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        },
    )
    .await
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::db::memory_pool;

    #[tokio::test]
    async fn test_upsert_is_keyed_by_external_id() {
        let pool = memory_pool().await;
        let first = seed(&pool, "g-1").await;

        let again = upsert(
            &pool,
            &NewUser {
                google_user_id: "g-1",
                email: "new@example.com",
                name: "Renamed",
                access_token: Some("fresh"),
                refresh_token: None,
                token_expires_at: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(first, again);

        let user = find_by_id(&pool, first).await.unwrap().unwrap();
        assert_eq!(user.email, "new@example.com");
        assert_eq!(user.access_token.as_deref(), Some("fresh"));
        assert_eq!(user.refresh_token.as_deref(), Some("refresh-token"));
    }

    #[tokio::test]
    async fn test_lookups_and_token_update() {
        let pool = memory_pool().await;
        let id = seed(&pool, "g-2").await;

        assert_eq!(find_by_google_id(&pool, "g-2").await.unwrap().unwrap().id, id);
        assert_eq!(
            find_by_email(&pool, "g-2@example.com").await.unwrap().unwrap().id,
            id
        );
        assert!(find_by_google_id(&pool, "nobody").await.unwrap().is_none());

        let expires = Utc::now() + chrono::Duration::minutes(5);
        update_tokens(&pool, id, "rotated", None, Some(expires))
            .await
            .unwrap();
        let user = find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(user.access_token.as_deref(), Some("rotated"));
        assert_eq!(user.refresh_token.as_deref(), Some("refresh-token"));
        assert!(user.token_expires_at.is_some());
    }
}

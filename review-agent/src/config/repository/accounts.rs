//! Business accounts owned by a user

use anyhow::{Context, Result};
use sqlx::SqlitePool;

#[derive(Debug, Clone, PartialEq, serde::Serialize, sqlx::FromRow)]
pub struct BusinessAccount {
    pub id: i64,
    pub user_id: i64,
    pub google_account_id: String,
    pub account_name: String,
    pub account_type: String,
    pub is_active: bool,
}

const ACCOUNT_COLUMNS: &str =
    "id, user_id, google_account_id, account_name, account_type, is_active";

/// Insert or update name/type in place, keyed by (user, external id)
pub async fn upsert(
    pool: &SqlitePool,
    user_id: i64,
    google_account_id: &str,
    account_name: &str,
    account_type: &str,
) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO business_accounts (user_id, google_account_id, account_name, account_type)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(user_id, google_account_id) DO UPDATE SET
             account_name = excluded.account_name,
             account_type = excluded.account_type,
             updated_at = datetime('now')
         RETURNING id",
    )
    .bind(user_id)
    .bind(google_account_id)
    .bind(account_name)
    .bind(account_type)
    .fetch_one(pool)
    .await
    .with_context(|| format!("Failed to upsert business account {}", google_account_id))?;

    Ok(id)
}

pub async fn find_by_google_id(
    pool: &SqlitePool,
    user_id: i64,
    google_account_id: &str,
) -> Result<Option<BusinessAccount>> {
    sqlx::query_as(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM business_accounts
         WHERE user_id = ? AND google_account_id = ?"
    ))
    .bind(user_id)
    .bind(google_account_id)
    .fetch_optional(pool)
    .await
    .context("Failed to find business account")
}

/// Active accounts of a user
pub async fn find_by_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<BusinessAccount>> {
    sqlx::query_as(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM business_accounts
         WHERE user_id = ? AND is_active = 1
         ORDER BY account_name"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list business accounts")
}

//! Business locations under an account

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

#[derive(Debug, Clone, PartialEq, serde::Serialize, sqlx::FromRow)]
pub struct BusinessLocation {
    pub id: i64,
    pub business_account_id: i64,
    pub google_location_id: String,
    pub location_name: String,
    pub address: String,
    pub phone: String,
    pub website: String,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Location details as listed upstream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationDetails {
    pub google_location_id: String,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub website: String,
}

const LOCATION_COLUMNS: &str = "id, business_account_id, google_location_id, location_name, \
     address, phone, website, last_synced_at, is_active";

/// Insert or update name/address/phone/website in place
pub async fn upsert(
    pool: &SqlitePool,
    business_account_id: i64,
    details: &LocationDetails,
) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO business_locations
             (business_account_id, google_location_id, location_name, address, phone, website)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(business_account_id, google_location_id) DO UPDATE SET
             location_name = excluded.location_name,
             address = excluded.address,
             phone = excluded.phone,
             website = excluded.website,
             updated_at = datetime('now')
         RETURNING id",
    )
    .bind(business_account_id)
    .bind(&details.google_location_id)
    .bind(&details.name)
    .bind(&details.address)
    .bind(&details.phone)
    .bind(&details.website)
    .fetch_one(pool)
    .await
    .with_context(|| {
        format!(
            "Failed to upsert business location {}",
            details.google_location_id
        )
    })?;

    Ok(id)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<BusinessLocation>> {
    sqlx::query_as(&format!(
        "SELECT {LOCATION_COLUMNS} FROM business_locations WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to find business location by id")
}

pub async fn find_by_google_id(
    pool: &SqlitePool,
    business_account_id: i64,
    google_location_id: &str,
) -> Result<Option<BusinessLocation>> {
    sqlx::query_as(&format!(
        "SELECT {LOCATION_COLUMNS} FROM business_locations
         WHERE business_account_id = ? AND google_location_id = ?"
    ))
    .bind(business_account_id)
    .bind(google_location_id)
    .fetch_optional(pool)
    .await
    .context("Failed to find business location")
}

/// Active locations of an account
pub async fn find_by_account(
    pool: &SqlitePool,
    business_account_id: i64,
) -> Result<Vec<BusinessLocation>> {
    sqlx::query_as(&format!(
        "SELECT {LOCATION_COLUMNS} FROM business_locations
         WHERE business_account_id = ? AND is_active = 1
         ORDER BY location_name"
    ))
    .bind(business_account_id)
    .fetch_all(pool)
    .await
    .context("Failed to list business locations")
}

pub async fn mark_synced(pool: &SqlitePool, location_id: i64, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE business_locations SET last_synced_at = ? WHERE id = ?")
        .bind(at)
        .bind(location_id)
        .execute(pool)
        .await
        .context("Failed to update last synced timestamp")?;

    Ok(())
}

#[cfg(test)]
pub(crate) async fn seed(pool: &SqlitePool, user_google_id: &str) -> (i64, i64) {
    use super::{accounts, users};

    let user_id = users::seed(pool, user_google_id).await;
    let account_id = accounts::upsert(pool, user_id, "111", "Cafe", "BUSINESS")
        .await
        .unwrap();
    let location_id = upsert(
        pool,
        account_id,
        &LocationDetails {
            google_location_id: "222".into(),
            name: "Main St".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    (account_id, location_id)
}

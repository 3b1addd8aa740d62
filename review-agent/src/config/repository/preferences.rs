//! Per-user dashboard preferences, last write wins

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferences {
    pub selected_account_id: Option<String>,
    pub selected_location_id: Option<String>,
    pub auto_reply_enabled: bool,
    pub notification_settings: Value,
    pub dashboard_layout: Value,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            selected_account_id: None,
            selected_location_id: None,
            auto_reply_enabled: false,
            notification_settings: Value::Object(Default::default()),
            dashboard_layout: Value::Object(Default::default()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct PreferencesRow {
    selected_account_id: Option<String>,
    selected_location_id: Option<String>,
    auto_reply_enabled: bool,
    notification_settings: String,
    dashboard_layout: String,
}

pub async fn find_by_user(pool: &SqlitePool, user_id: i64) -> Result<Option<UserPreferences>> {
    let row: Option<PreferencesRow> = sqlx::query_as(
        "SELECT selected_account_id, selected_location_id, auto_reply_enabled,
                notification_settings, dashboard_layout
         FROM user_preferences WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read user preferences")?;

    row.map(|row| {
        Ok(UserPreferences {
            selected_account_id: row.selected_account_id,
            selected_location_id: row.selected_location_id,
            auto_reply_enabled: row.auto_reply_enabled,
            notification_settings: serde_json::from_str(&row.notification_settings)
                .context("Stored notification settings are not valid JSON")?,
            dashboard_layout: serde_json::from_str(&row.dashboard_layout)
                .context("Stored dashboard layout is not valid JSON")?,
        })
    })
    .transpose()
}

pub async fn upsert(pool: &SqlitePool, user_id: i64, prefs: &UserPreferences) -> Result<()> {
    sqlx::query(
        "INSERT INTO user_preferences (user_id, selected_account_id, selected_location_id,
             auto_reply_enabled, notification_settings, dashboard_layout)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
             selected_account_id = excluded.selected_account_id,
             selected_location_id = excluded.selected_location_id,
             auto_reply_enabled = excluded.auto_reply_enabled,
             notification_settings = excluded.notification_settings,
             dashboard_layout = excluded.dashboard_layout,
             updated_at = datetime('now')",
    )
    .bind(user_id)
    .bind(&prefs.selected_account_id)
    .bind(&prefs.selected_location_id)
    .bind(prefs.auto_reply_enabled)
    .bind(prefs.notification_settings.to_string())
    .bind(prefs.dashboard_layout.to_string())
    .execute(pool)
    .await
    .context("Failed to save user preferences")?;

    Ok(())
}

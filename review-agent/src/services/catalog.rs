//! Business entity catalog: accounts and locations per user

use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::api::auth::Credential;
use crate::api::models::resource_id;
use crate::api::provider::ReviewProvider;
use crate::config::repository::accounts::{self, BusinessAccount};
use crate::config::repository::locations::{self, BusinessLocation, LocationDetails};
use crate::error::{SyncError, SyncResult};
use crate::services::sync::SyncScope;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogReport {
    pub accounts: usize,
    pub locations: usize,
    /// Accounts whose locations could not be listed
    pub failed_accounts: Vec<String>,
}

/// Stored account and location matched from caller-supplied ids
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedScope {
    pub account: BusinessAccount,
    pub location: BusinessLocation,
}

impl ResolvedScope {
    pub fn sync_scope(&self) -> SyncScope {
        SyncScope {
            account_ext_id: resource_id(&self.account.google_account_id).to_string(),
            location_ext_id: resource_id(&self.location.google_location_id).to_string(),
            account_id: self.account.id,
            location_id: self.location.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLocations {
    #[serde(flatten)]
    pub account: BusinessAccount,
    pub locations: Vec<BusinessLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationInfo {
    pub location: BusinessLocation,
    /// Live upstream details; `None` when the upstream call failed
    pub upstream: Option<Value>,
}

pub struct CatalogService {
    pool: SqlitePool,
    provider: Arc<dyn ReviewProvider>,
}

impl CatalogService {
    pub fn new(pool: SqlitePool, provider: Arc<dyn ReviewProvider>) -> Self {
        Self { pool, provider }
    }

    /// Pull the user's accounts and their locations into the catalog. One
    /// account failing to list its locations does not stop the others.
    pub async fn sync_catalog(&self, user_id: i64, credential: &Credential) -> SyncResult<CatalogReport> {
        if user_id <= 0 {
            return Err(SyncError::invalid(format!("user id must be positive (got {})", user_id)));
        }

        let upstream_accounts = self.provider.list_accounts(credential).await?;
        let mut report = CatalogReport::default();

        for raw in &upstream_accounts {
            let account_ext_id = resource_id(&raw.name);
            if account_ext_id.is_empty() {
                log::warn!("Skipping account without a resource name");
                continue;
            }
            let name = raw
                .account_name
                .as_deref()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(&raw.name);
            let account_type = raw
                .account_type
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or("BUSINESS");

            let account_id = accounts::upsert(&self.pool, user_id, account_ext_id, name, account_type)
                .await
                .map_err(SyncError::from_store)?;
            report.accounts += 1;

            let upstream_locations = match self.provider.list_locations(account_ext_id, credential).await {
                Ok(list) => list,
                Err(e) => {
                    log::warn!("Failed to list locations for account {}: {}", account_ext_id, e);
                    report.failed_accounts.push(account_ext_id.to_string());
                    continue;
                }
            };

            for loc in &upstream_locations {
                let details = LocationDetails {
                    google_location_id: resource_id(&loc.name).to_string(),
                    name: loc
                        .title
                        .clone()
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or_else(|| loc.name.clone()),
                    address: loc.address(),
                    phone: loc.phone(),
                    website: loc.website_uri.clone().unwrap_or_default(),
                };
                locations::upsert(&self.pool, account_id, &details)
                    .await
                    .map_err(SyncError::from_store)?;
                report.locations += 1;
            }
        }

        log::info!(
            "Catalog sync for user {}: {} accounts, {} locations",
            user_id,
            report.accounts,
            report.locations
        );
        Ok(report)
    }

    /// Match caller ids given bare (`123`) or as resource names
    /// (`accounts/123`, `accounts/123/locations/456`)
    pub async fn resolve_scope(
        &self,
        user_id: i64,
        account: &str,
        location: &str,
    ) -> SyncResult<ResolvedScope> {
        if user_id <= 0 {
            return Err(SyncError::invalid(format!("user id must be positive (got {})", user_id)));
        }
        let account_ext = resource_id(account.trim());
        let location_ext = resource_id(location.trim());
        if account_ext.is_empty() || location_ext.is_empty() {
            return Err(SyncError::invalid("account and location ids are required"));
        }

        let mut found_account = None;
        for candidate in [account_ext.to_string(), format!("accounts/{account_ext}")] {
            if let Some(hit) = accounts::find_by_google_id(&self.pool, user_id, &candidate)
                .await
                .map_err(SyncError::from_store)?
            {
                found_account = Some(hit);
                break;
            }
        }
        let account = found_account
            .ok_or_else(|| SyncError::NotFound(format!("business account {}", account_ext)))?;

        let mut found_location = None;
        for candidate in [
            location_ext.to_string(),
            format!("locations/{location_ext}"),
            format!("accounts/{account_ext}/locations/{location_ext}"),
        ] {
            if let Some(hit) = locations::find_by_google_id(&self.pool, account.id, &candidate)
                .await
                .map_err(SyncError::from_store)?
            {
                found_location = Some(hit);
                break;
            }
        }
        let location = found_location
            .ok_or_else(|| SyncError::NotFound(format!("business location {}", location_ext)))?;

        Ok(ResolvedScope { account, location })
    }

    /// Every active account of the user with its active locations
    pub async fn business_locations(&self, user_id: i64) -> SyncResult<Vec<AccountLocations>> {
        let mut result = Vec::new();
        for account in accounts::find_by_user(&self.pool, user_id)
            .await
            .map_err(SyncError::from_store)?
        {
            let locations = locations::find_by_account(&self.pool, account.id)
                .await
                .map_err(SyncError::from_store)?;
            result.push(AccountLocations { account, locations });
        }
        Ok(result)
    }

    /// Number of upstream accounts visible to the credential
    pub async fn check_connection(&self, credential: &Credential) -> SyncResult<usize> {
        let accounts = self.provider.list_accounts(credential).await?;
        Ok(accounts.len())
    }

    /// Stored location plus live upstream details
    pub async fn location_info(&self, scope: &ResolvedScope, credential: &Credential) -> LocationInfo {
        let ids = scope.sync_scope();
        let upstream = match self
            .provider
            .get_location(&ids.account_ext_id, &ids.location_ext_id, credential)
            .await
        {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Failed to fetch live details for location {}: {}", ids.location_ext_id, e);
                None
            }
        };
        LocationInfo {
            location: scope.location.clone(),
            upstream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{PhoneNumbers, RawAccount, RawLocation, StorefrontAddress};
    use crate::config::db::memory_pool;
    use crate::config::repository::users;
    use crate::services::sync::testing::FakeProvider;
    use std::collections::HashMap;

    fn provider() -> FakeProvider {
        FakeProvider {
            accounts: vec![
                RawAccount {
                    name: "accounts/111".into(),
                    account_name: Some("Cafe Group".into()),
                    account_type: None,
                },
                RawAccount {
                    name: "accounts/999".into(),
                    account_name: None,
                    account_type: Some("PERSONAL".into()),
                },
            ],
            locations: HashMap::from([(
                "111".to_string(),
                vec![RawLocation {
                    name: "locations/222".into(),
                    title: Some("Main St".into()),
                    storefront_address: Some(StorefrontAddress {
                        address_lines: vec!["1 Main St".into()],
                        locality: Some("Springfield".into()),
                    }),
                    phone_numbers: Some(PhoneNumbers {
                        primary_phone: Some("+1 555 0100".into()),
                    }),
                    website_uri: Some("https://cafe.example".into()),
                    ..Default::default()
                }],
            )]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sync_catalog_continues_past_failing_account() {
        let pool = memory_pool().await;
        let user_id = users::seed(&pool, "g-1").await;
        let catalog = CatalogService::new(pool.clone(), Arc::new(provider()));

        let report = catalog
            .sync_catalog(user_id, &Credential::new("t"))
            .await
            .unwrap();
        assert_eq!(report.accounts, 2);
        assert_eq!(report.locations, 1);
        assert_eq!(report.failed_accounts, vec!["999".to_string()]);

        let personal = accounts::find_by_google_id(&pool, user_id, "999").await.unwrap().unwrap();
        assert_eq!(personal.account_name, "accounts/999");
        assert_eq!(personal.account_type, "PERSONAL");

        let listing = catalog.business_locations(user_id).await.unwrap();
        let cafe = listing.iter().find(|a| a.account.google_account_id == "111").unwrap();
        assert_eq!(cafe.account.account_type, "BUSINESS");
        assert_eq!(cafe.locations[0].address, "1 Main St, Springfield");
        assert_eq!(cafe.locations[0].phone, "+1 555 0100");
    }

    #[tokio::test]
    async fn test_resolve_scope_accepts_both_id_forms() {
        let pool = memory_pool().await;
        let user_id = users::seed(&pool, "g-1").await;
        let catalog = CatalogService::new(pool.clone(), Arc::new(provider()));
        catalog.sync_catalog(user_id, &Credential::new("t")).await.unwrap();

        let bare = catalog.resolve_scope(user_id, "111", "222").await.unwrap();
        let named = catalog
            .resolve_scope(user_id, "accounts/111", "accounts/111/locations/222")
            .await
            .unwrap();
        assert_eq!(bare, named);

        let scope = bare.sync_scope();
        assert_eq!(scope.account_ext_id, "111");
        assert_eq!(scope.location_ext_id, "222");

        assert!(matches!(
            catalog.resolve_scope(user_id, "111", "333").await,
            Err(SyncError::NotFound(_))
        ));
        assert!(matches!(
            catalog.resolve_scope(user_id, "", "222").await,
            Err(SyncError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_location_info_tolerates_upstream_failure() {
        let pool = memory_pool().await;
        let (_, location_id) = locations::seed(&pool, "g-1").await;
        let user = users::find_by_google_id(&pool, "g-1").await.unwrap().unwrap();
        let scope = ResolvedScope {
            account: accounts::find_by_google_id(&pool, user.id, "111").await.unwrap().unwrap(),
            location: locations::find_by_id(&pool, location_id).await.unwrap().unwrap(),
        };

        let healthy = CatalogService::new(pool.clone(), Arc::new(FakeProvider::default()));
        let info = healthy.location_info(&scope, &Credential::new("t")).await;
        assert!(info.upstream.is_some());

        let broken = CatalogService::new(
            pool.clone(),
            Arc::new(FakeProvider::failing(|| SyncError::UpstreamUnavailable("down".into()))),
        );
        let info = broken.location_info(&scope, &Credential::new("t")).await;
        assert!(info.upstream.is_none());
        assert_eq!(info.location.id, location_id);
    }

    #[tokio::test]
    async fn test_check_connection_counts_accounts() {
        let pool = memory_pool().await;
        let catalog = CatalogService::new(pool.clone(), Arc::new(provider()));
        assert_eq!(catalog.check_connection(&Credential::new("t")).await.unwrap(), 2);

        let revoked = CatalogService::new(
            pool,
            Arc::new(FakeProvider::failing(|| SyncError::AuthenticationFailed("revoked".into()))),
        );
        assert!(matches!(
            revoked.check_connection(&Credential::new("t")).await,
            Err(SyncError::AuthenticationFailed(_))
        ));
    }
}

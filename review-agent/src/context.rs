//! Shared service handles, built once at startup

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::api::auth::{CredentialProvider, StoredCredentialProvider};
use crate::api::gemini::GeminiClient;
use crate::api::provider::ReviewProvider;
use crate::api::GoogleBusinessClient;
use crate::config::{Config, db};
use crate::services::analysis::{AnalysisService, ReviewAnalyzer};
use crate::services::catalog::CatalogService;
use crate::services::sync::{StalenessPolicy, SyncOrchestrator};

pub struct AppContext {
    pub config: Config,
    pub pool: SqlitePool,
    pub credentials: Arc<dyn CredentialProvider>,
    pub sync: SyncOrchestrator,
    pub catalog: CatalogService,
    /// `None` when no analysis API key is configured
    pub analysis: Option<AnalysisService>,
}

impl AppContext {
    /// Open the store and wire the upstream clients from configuration
    pub async fn initialize(config: Config) -> Result<Self> {
        let pool = db::connect(&config.database).await?;

        let provider = GoogleBusinessClient::new(&config.upstream, config.resilience())
            .context("Failed to build upstream client")?;
        let analyzer = GeminiClient::from_config(
            &config.analysis,
            Duration::from_secs(config.upstream.timeout_secs),
        )
        .context("Failed to build analysis client")?;
        if analyzer.is_none() {
            log::warn!("GEMINI_API_KEY is not set; review analysis is disabled");
        }

        let credentials = Arc::new(StoredCredentialProvider::new(pool.clone()));
        Ok(Self::from_parts(
            config,
            pool,
            Arc::new(provider),
            analyzer.map(|a| Arc::new(a) as Arc<dyn ReviewAnalyzer>),
            credentials,
        ))
    }

    pub fn from_parts(
        config: Config,
        pool: SqlitePool,
        provider: Arc<dyn ReviewProvider>,
        analyzer: Option<Arc<dyn ReviewAnalyzer>>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let sync = SyncOrchestrator::new(
            pool.clone(),
            provider.clone(),
            config.paging(),
            StalenessPolicy::new(config.min_sync_interval()),
            config.sync.invalidate_stale_analysis,
        );
        let catalog = CatalogService::new(pool.clone(), provider);
        let analysis = analyzer.map(|analyzer| {
            AnalysisService::new(
                pool.clone(),
                analyzer,
                config.analysis.version.clone(),
                Duration::from_millis(config.analysis.batch_delay_ms),
            )
        });

        Self {
            config,
            pool,
            credentials,
            sync,
            catalog,
            analysis,
        }
    }
}

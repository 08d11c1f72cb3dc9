use crate::cache::Cache;
use crate::config::Config;
use crate::database::{Database, Store};
use crate::fetch::FetchClient;
use crate::providers::*;
use crate::services::{DexService, TokenService};
use crate::sync::{SyncProviders, SyncService};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Every upstream the services talk to.
#[derive(Clone)]
pub struct Providers {
    pub primary: Arc<dyn TokenSource>,
    pub secondary: Option<Arc<dyn TokenSource>>,
    pub pairs: Arc<dyn PairSource>,
    pub traders: Arc<dyn TraderSource>,
    pub holders: Arc<dyn HolderSource>,
    pub dex: Arc<dyn DexSource>,
}

impl Providers {
    pub fn from_config(config: &Config) -> Result<Self> {
        let providers = &config.providers;
        let client = FetchClient::new(
            &providers.user_agent,
            Duration::from_secs(providers.http_timeout_secs),
        )?;

        let cmc = Arc::new(CoinMarketCapClient::new(client.clone(), providers));

        Ok(Self {
            primary: cmc.clone(),
            secondary: Some(Arc::new(CoinGeckoClient::new(client.clone(), providers))),
            pairs: Arc::new(GeckoTerminalClient::new(client.clone(), providers)),
            traders: Arc::new(BitQueryClient::new(client.clone(), providers)),
            holders: Arc::new(EtherscanClient::new(client, providers)),
            dex: cmc,
        })
    }

    pub fn for_sync(&self) -> SyncProviders {
        SyncProviders {
            primary: self.primary.clone(),
            secondary: self.secondary.clone(),
            pairs: self.pairs.clone(),
            traders: self.traders.clone(),
        }
    }
}

/// Shared services of one process.
#[derive(Clone)]
pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub cache: Cache,
    pub sync: Arc<SyncService>,
    pub tokens: Arc<TokenService>,
    pub dex: Arc<DexService>,
}

impl AppContext {
    /// Connects storage and cache, creates tables and wires the providers.
    pub async fn connect(config: Config) -> Result<Self> {
        let database = Database::connect(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(config.database.tx_timeout_secs),
        )
        .await?;
        database.create_tables().await?;
        info!("Database connected and tables created");

        let cache = Cache::connect(config.cache.redis_url.as_deref()).await?;
        let providers = Providers::from_config(&config)?;

        Ok(Self::from_parts(config, Arc::new(database), cache, providers))
    }

    pub fn from_parts(config: Config, store: Arc<dyn Store>, cache: Cache, providers: Providers) -> Self {
        let sync = Arc::new(SyncService::new(
            store.clone(),
            providers.for_sync(),
            config.sync.clone(),
            Duration::from_secs(config.locks.pair_sync_secs),
        ));

        let tokens = Arc::new(TokenService::new(
            store.clone(),
            sync.clone(),
            cache.clone(),
            providers.holders.clone(),
            providers.traders.clone(),
            &config,
        ));

        let dex = Arc::new(DexService::new(providers.dex.clone(), cache.clone(), config.cache.clone()));

        Self {
            config,
            store,
            cache,
            sync,
            tokens,
            dex,
        }
    }
}

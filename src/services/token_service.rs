use crate::cache::{fingerprint, keys, Cache};
use crate::config::{CacheConfig, Config};
use crate::database::Store;
use crate::error::{AppError, AppResult};
use crate::lock::KeyedLock;
use crate::providers::{HolderSource, TraderSource};
use crate::series::{merge_series, Point};
use crate::sync::SyncService;
use crate::types::*;
use chrono::{Duration as ChronoDuration, Utc};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct TokenService {
    store: Arc<dyn Store>,
    sync: Arc<SyncService>,
    cache: Cache,
    holder_source: Arc<dyn HolderSource>,
    trader_source: Arc<dyn TraderSource>,
    holders_lock: KeyedLock<Vec<Point>>,
    swaps_lock: KeyedLock<Vec<Point>>,
    cache_config: CacheConfig,
    pair_refresh: ChronoDuration,
    swaps_lookback_days: u32,
}

impl TokenService {
    pub fn new(
        store: Arc<dyn Store>,
        sync: Arc<SyncService>,
        cache: Cache,
        holder_source: Arc<dyn HolderSource>,
        trader_source: Arc<dyn TraderSource>,
        config: &Config,
    ) -> Self {
        let locks = &config.locks;
        Self {
            store,
            sync,
            cache,
            holder_source,
            trader_source,
            holders_lock: KeyedLock::new("holders", Duration::from_secs(locks.holders_secs)),
            swaps_lock: KeyedLock::new("swaps", Duration::from_secs(locks.swaps_secs)),
            cache_config: config.cache.clone(),
            pair_refresh: ChronoDuration::seconds(config.sync.pair_refresh_secs as i64),
            swaps_lookback_days: config.sync.swaps_lookback_days,
        }
    }

    pub async fn list(&self, query: &TokenListQuery) -> AppResult<TokenPage> {
        Ok(self.store.list_tokens(query).await?)
    }

    /// Looks a token up by internal id or, failing that, by its CMC slug.
    pub async fn resolve(&self, id_or_slug: &str) -> AppResult<TokenWithRecords> {
        let found = match Uuid::parse_str(id_or_slug) {
            Ok(id) => self.store.token_by_id(id).await?,
            Err(_) => self.store.token_by_slug(id_or_slug).await?,
        };
        found.ok_or_else(|| AppError::NotFound(format!("token {}", id_or_slug)))
    }

    /// Stored pairs of the token, resynced first when stale. A failed resync
    /// serves what is stored.
    pub async fn pairs(&self, id_or_slug: &str, limit: i64) -> AppResult<Vec<PairView>> {
        let item = self.resolve(id_or_slug).await?;
        let token_id = item.token.id;

        let stale = self
            .store
            .pair_freshness(token_id)
            .await?
            .map_or(true, |freshness| freshness.is_stale(Utc::now(), self.pair_refresh));

        if stale {
            match self.sync.sync_token_pairs(token_id).await {
                Ok(report) => info!(token = %item.token.symbol, ?report, "🔄 Pairs resynced on demand"),
                Err(e) => warn!(token = %item.token.symbol, "on-demand pair sync failed, serving stored pairs: {}", e),
            }
        }

        Ok(self.store.pairs_for_token(token_id, limit).await?)
    }

    /// Holder counts summed over the token's chains.
    pub async fn holders(&self, id_or_slug: &str) -> AppResult<Vec<Point>> {
        let item = self.resolve(id_or_slug).await?;
        let key = fingerprint(keys::HOLDERS, [format!("token={}", item.token.id)]);
        if let Some(hit) = self.cache.get_json::<Vec<Point>>(&key).await {
            return Ok(hit);
        }

        let source = self.holder_source.clone();
        let records = item.records.clone();
        let compute = series_job(
            self.cache.clone(),
            key.clone(),
            Duration::from_secs(self.cache_config.holders_ttl_secs),
            records,
            move |record| {
                let source = source.clone();
                async move { source.holders(&record.blockchain, &record.address).await }
            },
        );

        Ok(self.holders_lock.with_lock(&key, move || compute).await?)
    }

    /// Daily swap counts over the lookback window, summed over the token's
    /// chains.
    pub async fn swaps(&self, id_or_slug: &str) -> AppResult<Vec<Point>> {
        let item = self.resolve(id_or_slug).await?;
        let since = (Utc::now() - ChronoDuration::days(i64::from(self.swaps_lookback_days))).date_naive();
        let key = fingerprint(
            keys::SWAPS,
            [format!("token={}", item.token.id), format!("since={}", since)],
        );
        if let Some(hit) = self.cache.get_json::<Vec<Point>>(&key).await {
            return Ok(hit);
        }

        let source = self.trader_source.clone();
        let compute = series_job(
            self.cache.clone(),
            key.clone(),
            Duration::from_secs(self.cache_config.swaps_ttl_secs),
            item.records.clone(),
            move |record| {
                let source = source.clone();
                async move { source.daily_swaps(&record.blockchain, &record.address, since).await }
            },
        );

        Ok(self.swaps_lock.with_lock(&key, move || compute).await?)
    }
}

/// Fetches one series per record and merges them. Followers that queued
/// behind a finished leader find the result in the cache. The merged series
/// is only cached when every record answered.
fn series_job<F, Fut>(
    cache: Cache,
    key: String,
    ttl: Duration,
    records: Vec<TokenRecord>,
    fetch: F,
) -> impl std::future::Future<Output = anyhow::Result<Vec<Point>>> + Send + 'static
where
    F: Fn(TokenRecord) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<Vec<Point>, crate::error::FetchError>> + Send + 'static,
{
    async move {
        if let Some(hit) = cache.get_json::<Vec<Point>>(&key).await {
            return Ok(hit);
        }

        let labels: Vec<(String, String)> = records
            .iter()
            .map(|record| (record.blockchain.clone(), record.address.clone()))
            .collect();
        let results = join_all(records.into_iter().map(&fetch)).await;

        let mut complete = true;
        let mut series = Vec::with_capacity(results.len());
        for ((chain, address), result) in labels.into_iter().zip(results) {
            match result {
                Ok(points) => series.push(points),
                Err(e) => {
                    complete = false;
                    warn!(chain = %chain, address = %address, key = %key, "series source failed: {}", e);
                }
            }
        }

        let merged = merge_series(series);
        if complete {
            cache.set_json(&key, &merged, ttl).await;
        } else {
            debug!(key = %key, "partial series not cached");
        }
        Ok(merged)
    }
}

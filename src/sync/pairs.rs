use super::{SyncProviders, SyncService};
use crate::database::Store;
use crate::error::AppError;
use crate::providers::{PartialPair, PoolStats, UniqueTraders};
use crate::types::{PairUpsert, Token, TokenRecord, TokenWithRecords, UpsertReport};
use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use futures_util::future::join_all;
use futures_util::{stream, StreamExt};
use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

fn two_leg_regex() -> Result<&'static Regex, &'static regex::Error> {
    static TWO_LEG: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    TWO_LEG.get_or_init(|| Regex::new(r"^[^/]+ / [^/]+$")).as_ref()
}

/// `"PEPE / WETH"` names two tokens; `"A / B / C"` does not.
pub fn is_two_leg_pair(name: &str) -> bool {
    two_leg_regex().map_or(false, |pattern| pattern.is_match(name))
}

fn decimal(value: Option<f64>) -> Option<Decimal> {
    value.filter(|v| v.is_finite()).and_then(Decimal::from_f64)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairPassReport {
    pub tokens: usize,
    pub failed: usize,
    pub pairs: UpsertReport,
    pub purged: u64,
}

impl From<PairPassReport> for UpsertReport {
    fn from(report: PairPassReport) -> Self {
        UpsertReport {
            deleted: report.pairs.deleted + report.purged,
            ..report.pairs
        }
    }
}

impl SyncService {
    /// Refreshes the stalest tokens, then purges pairs nobody refreshed within
    /// the retention window.
    pub async fn sync_pairs(&self) -> Result<PairPassReport> {
        let refreshed_before = Utc::now() - Duration::seconds(self.config.pair_refresh_secs as i64);
        let batch = self
            .store
            .stale_tokens(refreshed_before, self.config.pairs_per_pass)
            .await?;
        info!(tokens = batch.len(), "📥 Pair batch selected");

        let results: Vec<(String, Result<UpsertReport>)> = stream::iter(batch)
            .map(|item| async move {
                let symbol = item.token.symbol.clone();
                (symbol, self.locked_refresh(item).await)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = PairPassReport::default();
        for (symbol, result) in results {
            report.tokens += 1;
            match result {
                Ok(written) => report.pairs += written,
                Err(e) => {
                    report.failed += 1;
                    error!(token = %symbol, "❌ Pair sync failed: {:#}", e);
                }
            }
        }

        let retention = Duration::hours(self.config.pair_retention_hours as i64);
        report.purged = self.store.purge_stale_pairs(Utc::now() - retention).await?;
        if report.purged > 0 {
            info!(purged = report.purged, "🧹 Stale pairs purged");
        }

        Ok(report)
    }

    /// Resyncs one token's pairs now, whatever its watermark says.
    pub async fn sync_token_pairs(&self, token_id: Uuid) -> Result<UpsertReport> {
        let item = self
            .store
            .token_by_id(token_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("token {}", token_id)))?;
        self.locked_refresh(item).await
    }

    /// Batch and on-demand resyncs of the same token share one run.
    async fn locked_refresh(&self, item: TokenWithRecords) -> Result<UpsertReport> {
        let refresher = PairRefresher {
            store: self.store.clone(),
            providers: self.providers.clone(),
        };
        let key = item.token.id.to_string();
        let report = self
            .pair_lock
            .with_lock(&key, move || async move { refresher.refresh(&item).await })
            .await?;
        Ok(report)
    }
}

/// Owned handles for one token's resync, so the run can outlive the caller
/// that started it.
struct PairRefresher {
    store: Arc<dyn Store>,
    providers: SyncProviders,
}

impl PairRefresher {
    async fn refresh(&self, item: &TokenWithRecords) -> Result<UpsertReport> {
        let yesterday = (Utc::now() - Duration::days(1)).date_naive();
        let per_record = join_all(
            item.records
                .iter()
                .map(|record| self.record_pairs(&item.token, record, yesterday)),
        )
        .await;

        let pairs: Vec<PairUpsert> = per_record.into_iter().flatten().collect();
        let written = self.store.apply_pair_sync(item.token.id, &pairs).await?;
        debug!(token = %item.token.symbol, pairs = pairs.len(), ?written, "pairs stored");
        Ok(written)
    }

    /// Pairs of one network. A failed listing yields nothing for this record
    /// and leaves the other networks untouched.
    async fn record_pairs(&self, token: &Token, record: &TokenRecord, date: NaiveDate) -> Vec<PairUpsert> {
        let listed = match self
            .providers
            .pairs
            .list_trading_pairs_for_token(&record.blockchain, &record.address)
            .await
        {
            Ok(listed) => listed,
            Err(e) => {
                let context = format!(
                    "pairs token={} chain={} address={}",
                    token.symbol, record.blockchain, record.address
                );
                warn!("{}", AppError::partial(context, e));
                return Vec::new();
            }
        };

        let candidates: Vec<PartialPair> = listed
            .into_iter()
            .filter(|pair| {
                let keep = is_two_leg_pair(&pair.name);
                if !keep {
                    debug!(pool = %pair.pool_address, name = %pair.name, "multi-leg pool skipped");
                }
                keep
            })
            .collect();

        join_all(
            candidates
                .into_iter()
                .map(|pair| self.enrich_pair(token, record, pair, date)),
        )
        .await
    }

    async fn enrich_pair(&self, token: &Token, record: &TokenRecord, pair: PartialPair, date: NaiveDate) -> PairUpsert {
        let is_base = pair.base_address == record.address;
        let base_index = if is_base { 0 } else { 1 };

        let (stats, traders) = tokio::join!(
            self.providers
                .pairs
                .pool_stats(&pair.chain, &pair.pool_address, base_index),
            self.providers
                .traders
                .unique_traders(&pair.chain, &pair.pool_address, &record.address, date),
        );

        let context = || format!("token={} chain={} pool={}", token.symbol, pair.chain, pair.pool_address);
        let stats = stats.unwrap_or_else(|e| {
            warn!("{}", AppError::partial(format!("pool stats {}", context()), e));
            PoolStats::default()
        });
        let traders: Option<UniqueTraders> = match traders {
            Ok(traders) => Some(traders),
            Err(e) => {
                warn!("{}", AppError::partial(format!("unique traders {}", context()), e));
                None
            }
        };

        let listed_price = if is_base { pair.base_price_usd } else { pair.quote_price_usd };

        PairUpsert {
            reserve_usd: decimal(stats.reserve_usd.or(pair.reserve_usd)),
            volume_usd: decimal(stats.volume_usd),
            price_usd: decimal(stats.price_usd.or(listed_price)),
            price_change_24h: stats.price_change_24h,
            trades_24h: stats.trades_24h,
            buys_24h: stats.buys_24h,
            sells_24h: stats.sells_24h,
            unique_buyers: traders.map(|t| t.buyers),
            unique_sellers: traders.map(|t| t.sellers),
            blockchain: pair.chain,
            pool_address: pair.pool_address,
            name: pair.name,
            dex_slug: pair.dex,
            base_address: pair.base_address,
            quote_address: pair.quote_address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_name_pattern_compiles() {
        assert!(two_leg_regex().is_ok());
    }

    #[test]
    fn test_pair_name_filter() {
        assert!(is_two_leg_pair("PEPE / WETH"));
        assert!(is_two_leg_pair("USD Coin / Tether USD"));
        assert!(!is_two_leg_pair("A / B / C"));
        assert!(!is_two_leg_pair("PEPE/WETH"));
        assert!(!is_two_leg_pair("PEPE"));
    }

    #[test]
    fn test_purged_pairs_count_as_deleted() {
        let report = PairPassReport {
            tokens: 3,
            failed: 1,
            pairs: UpsertReport { inserted: 4, updated: 2, deleted: 0 },
            purged: 7,
        };
        assert_eq!(
            UpsertReport::from(report),
            UpsertReport { inserted: 4, updated: 2, deleted: 7 }
        );
    }
}

use crate::cache::{fingerprint, keys, Cache};
use crate::chains;
use crate::config::CacheConfig;
use crate::error::AppResult;
use crate::lock::InFlightSet;
use crate::providers::{DexSource, DexTransaction, PairListEntry, PairRef};
use crate::series::floor_and_sort;
use crate::types::{PairsInfoRequest, TransactionsRequest};
use futures_util::future::join_all;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct DexService {
    source: Arc<dyn DexSource>,
    cache: Cache,
    pair_lists: InFlightSet,
    config: CacheConfig,
}

impl DexService {
    pub fn new(source: Arc<dyn DexSource>, cache: Cache, config: CacheConfig) -> Self {
        Self {
            source,
            cache,
            pair_lists: InFlightSet::new(),
            config,
        }
    }

    /// Pair info keyed by pool address. Cached only when every requested
    /// pair resolved.
    pub async fn pairs_info(&self, request: &PairsInfoRequest) -> AppResult<Map<String, Value>> {
        let key = fingerprint(
            keys::PAIRS_INFO,
            request
                .pairs
                .iter()
                .map(|pair| format!("pair={}", pair))
                .chain([format!("platform={}", request.platform)]),
        );
        if let Some(hit) = self.cache.get_json::<Map<String, Value>>(&key).await {
            return Ok(hit);
        }

        let lookups = request
            .pairs
            .iter()
            .map(|pair| self.source.pair_info(&request.platform, pair));
        let results = join_all(lookups).await;

        let mut resolved = Map::new();
        let mut complete = true;
        for (pair, result) in request.pairs.iter().zip(results) {
            match result {
                Ok(Some(data)) => {
                    let address = data
                        .get("address")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| pair.clone());
                    resolved.insert(address, data);
                }
                Ok(None) => {
                    complete = false;
                    debug!(pair = %pair, platform = %request.platform, "pair info missing");
                }
                Err(e) => {
                    complete = false;
                    warn!(pair = %pair, platform = %request.platform, "pair info failed: {}", e);
                }
            }
        }

        if complete {
            let ttl = Duration::from_secs(self.config.pairs_info_ttl_secs);
            self.cache.set_json(&key, &resolved, ttl).await;
        }
        Ok(resolved)
    }

    /// Pairs of `address` on one CMC platform, busiest first. A caller that
    /// arrives while the same list is being fetched gets an empty list.
    pub async fn pairs_list(&self, address: &str, platform_id: u32) -> Vec<PairListEntry> {
        let key = fingerprint(
            keys::PAIRS_LIST,
            [format!("address={}", address), format!("platform={}", platform_id)],
        );
        if let Some(hit) = self.cache.get_json::<Vec<PairListEntry>>(&key).await {
            return hit;
        }

        let Some(_guard) = self.pair_lists.try_acquire(&key) else {
            debug!(key = %key, "pair list already in flight");
            return Vec::new();
        };

        match self.source.pair_list(address, platform_id).await {
            Ok(entries) => {
                let mut entries: Vec<PairListEntry> = entries
                    .into_iter()
                    .filter(|entry| entry.platform.id == Some(i64::from(platform_id)))
                    .collect();
                entries.sort_by(|a, b| by_volume_desc(a.volume_24h, b.volume_24h));

                let ttl = Duration::from_secs(self.config.pairs_list_ttl_secs);
                self.cache.set_json(&key, &entries, ttl).await;
                info!(address, platform_id, count = entries.len(), "📥 Pair list fetched");
                entries
            }
            Err(e) => {
                warn!(address, platform_id, "pair list failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Newest-first transactions of the requested pairs, cut at the smallest
    /// of the lists' last timestamps. Pairs that fail are left out.
    pub async fn transactions(&self, request: &TransactionsRequest) -> AppResult<Vec<DexTransaction>> {
        let wanted = request
            .btc_pairs
            .iter()
            .map(|raw| (chains::BINANCE_SMART_CHAIN.cmc_platform_id, raw))
            .chain(
                request
                    .eth_pairs
                    .iter()
                    .map(|raw| (chains::ETHEREUM.cmc_platform_id, raw)),
            );

        let lookups = wanted.map(|(platform_id, raw)| async move {
            let pair: PairRef = raw.parse()?;
            self.source.transactions(platform_id, &pair).await
        });

        let lists = join_all(lookups)
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(list) => Some(list),
                Err(e) => {
                    warn!("pair transactions skipped: {}", e);
                    None
                }
            })
            .collect();

        Ok(floor_and_sort(lists))
    }
}

fn by_volume_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    let a = a.unwrap_or(f64::NEG_INFINITY);
    let b = b.unwrap_or(f64::NEG_INFINITY);
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_order_puts_missing_last() {
        let mut volumes = vec![Some(1.0), None, Some(10.0), Some(5.5)];
        volumes.sort_by(|a, b| by_volume_desc(*a, *b));
        assert_eq!(volumes, vec![Some(10.0), Some(5.5), Some(1.0), None]);
    }
}

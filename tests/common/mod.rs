#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use token_aggregator::cache::Cache;
use token_aggregator::config::*;
use token_aggregator::database::Store;
use token_aggregator::error::FetchError;
use token_aggregator::providers::*;
use token_aggregator::series::Point;
use token_aggregator::services::{AppContext, Providers};
use token_aggregator::types::*;
use uuid::Uuid;

pub const PEPE: &str = "0x6982508145454ce325ddbe47a25d4ec3d2311933";
pub const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
pub const USDT: &str = "0xdac17f958d2ee523a2206206994597c13d831ec7";
pub const PEPE_BSC: &str = "0x25d887ce7a35172c62febfd67a1856f20faebb00";

pub fn test_config() -> Config {
    Config {
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            tx_timeout_secs: 5,
        },
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        cache: CacheConfig {
            redis_url: None,
            holders_ttl_secs: 3600,
            swaps_ttl_secs: 3600,
            pairs_info_ttl_secs: 30 * 24 * 3600,
            pairs_list_ttl_secs: 24 * 3600,
        },
        providers: ProvidersConfig {
            cmc_api_key: None,
            coingecko_api_key: None,
            bitquery_api_key: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 5,
            cmc_stats: RateLimit::new(1, 1),
            cmc_dexer: RateLimit::new(1, 1),
            coingecko_markets: RateLimit::new(1, 1),
            geckoterminal: RateLimit::new(1, 1),
            bitquery: RateLimit::new(1, 1),
            etherscan: RateLimit::new(1, 1),
        },
        sync: SyncConfig {
            token_limit: 100,
            pairs_per_pass: 10,
            interval_secs: 3600,
            pair_refresh_secs: 900,
            pair_retention_hours: 72,
            concurrency: 2,
            swaps_lookback_days: 30,
            on_start: false,
        },
        locks: LockConfig {
            pair_sync_secs: 60,
            holders_secs: 30,
            swaps_secs: 60,
        },
        log_level: "debug".to_string(),
    }
}

// ---------------------------------------------------------------- store

#[derive(Debug, Clone)]
struct StoredPair {
    id: Uuid,
    base_record_id: Uuid,
    quote_record_id: Uuid,
    exchange_id: Uuid,
    data: PairUpsert,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    blockchains: Vec<Blockchain>,
    tokens: Vec<Token>,
    records: Vec<TokenRecord>,
    exchanges: Vec<Exchange>,
    pairs: Vec<StoredPair>,
}

impl State {
    fn records_of(&self, token_id: Uuid) -> Vec<TokenRecord> {
        let mut records: Vec<TokenRecord> = self
            .records
            .iter()
            .filter(|record| record.token_id == token_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| (&a.blockchain, &a.address).cmp(&(&b.blockchain, &b.address)));
        records
    }

    fn with_records(&self, token: &Token) -> TokenWithRecords {
        TokenWithRecords {
            token: token.clone(),
            records: self.records_of(token.id),
        }
    }

    fn drop_orphans(&mut self) {
        let tokens: HashSet<Uuid> = self.tokens.iter().map(|t| t.id).collect();
        self.records.retain(|record| tokens.contains(&record.token_id));
        let records: HashSet<Uuid> = self.records.iter().map(|r| r.id).collect();
        self.pairs
            .retain(|pair| records.contains(&pair.base_record_id) && records.contains(&pair.quote_record_id));
    }

    fn link_natives(&mut self) {
        for chain in self.blockchains.iter_mut() {
            if let Some(token) = self.tokens.iter().find(|t| t.cmc_id == chain.native_cmc_id) {
                chain.parent_token_id = Some(token.id);
            }
        }
    }
}

fn token_row(id: Uuid, upsert: &TokenUpsert, last_updated: Option<DateTime<Utc>>) -> Token {
    let stats = &upsert.stats;
    Token {
        id,
        cmc_id: upsert.cmc_id,
        cmc_slug: upsert.cmc_slug.clone(),
        coingecko_slug: upsert.coingecko_slug.clone(),
        symbol: upsert.symbol.clone(),
        name: upsert.name.clone(),
        image: upsert.image.clone(),
        rank: upsert.rank,
        price: stats.price,
        volume_24h: stats.volume_24h,
        volume_change_24h: stats.volume_change_24h,
        market_cap: stats.market_cap,
        fully_diluted_market_cap: stats.fully_diluted_market_cap,
        circulating_supply: stats.circulating_supply,
        total_supply: stats.total_supply,
        percent_change_1h: stats.percent_change_1h,
        percent_change_24h: stats.percent_change_24h,
        percent_change_7d: stats.percent_change_7d,
        last_updated,
    }
}

/// `Store` over plain vectors, following the same write rules as Postgres.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    pub pair_sync_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_count(&self) -> usize {
        self.state.lock().unwrap().tokens.len()
    }

    pub fn pair_count(&self) -> usize {
        self.state.lock().unwrap().pairs.len()
    }

    pub fn token(&self, cmc_id: i64) -> Option<TokenWithRecords> {
        let state = self.state.lock().unwrap();
        state
            .tokens
            .iter()
            .find(|t| t.cmc_id == cmc_id)
            .map(|t| state.with_records(t))
    }

    pub fn age_pairs(&self, by: chrono::Duration) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        for pair in state.pairs.iter_mut() {
            pair.updated_at = pair.updated_at - by;
        }
        for token in state.tokens.iter_mut() {
            token.last_updated = token.last_updated.map(|at| at - by);
        }
    }

    pub fn pair_sync_calls(&self) -> usize {
        self.pair_sync_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_blockchains(&self, chains: &[Blockchain]) -> Result<UpsertReport> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let mut report = UpsertReport::default();

        for chain in chains {
            match state.blockchains.iter_mut().find(|c| c.slug == chain.slug) {
                Some(existing) => {
                    let next = Blockchain {
                        parent_token_id: existing.parent_token_id,
                        ..chain.clone()
                    };
                    if *existing != next {
                        *existing = next;
                        report.updated += 1;
                    }
                }
                None => {
                    state.blockchains.push(chain.clone());
                    report.inserted += 1;
                }
            }
        }

        let keep: HashSet<&str> = chains.iter().map(|c| c.slug.as_str()).collect();
        let before = state.blockchains.len();
        state.blockchains.retain(|c| keep.contains(c.slug.as_str()));
        report.deleted = (before - state.blockchains.len()) as u64;
        state.link_natives();
        Ok(report)
    }

    async fn list_blockchains(&self) -> Result<Vec<Blockchain>> {
        Ok(self.state.lock().unwrap().blockchains.clone())
    }

    async fn apply_token_sync(&self, plan: &[TokenUpsert]) -> Result<TokenSyncReport> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let mut report = TokenSyncReport::default();

        let planned: HashSet<i64> = plan.iter().map(|t| t.cmc_id).collect();
        let parents: HashSet<Uuid> = state.blockchains.iter().filter_map(|c| c.parent_token_id).collect();
        let before = state.tokens.len();
        state
            .tokens
            .retain(|t| planned.contains(&t.cmc_id) || parents.contains(&t.id));
        report.tokens.deleted = (before - state.tokens.len()) as u64;
        state.drop_orphans();

        for upsert in plan {
            if let Some(slug) = &upsert.coingecko_slug {
                for other in state.tokens.iter_mut() {
                    if other.cmc_id != upsert.cmc_id && other.coingecko_slug.as_ref() == Some(slug) {
                        other.coingecko_slug = None;
                    }
                }
            }
        }

        for upsert in plan {
            match state.tokens.iter_mut().find(|t| t.cmc_id == upsert.cmc_id) {
                Some(existing) => {
                    let next = token_row(existing.id, upsert, existing.last_updated);
                    if *existing != next {
                        *existing = next;
                        report.tokens.updated += 1;
                    }
                }
                None => {
                    state.tokens.push(token_row(Uuid::new_v4(), upsert, None));
                    report.tokens.inserted += 1;
                }
            }
        }

        let chains: HashSet<String> = state.blockchains.iter().map(|c| c.slug.clone()).collect();
        let mut claimed: HashSet<(String, String)> = HashSet::new();
        let mut plan_ids = HashSet::new();
        for upsert in plan {
            let token_id = match state.tokens.iter().find(|t| t.cmc_id == upsert.cmc_id) {
                Some(token) => token.id,
                None => continue,
            };
            plan_ids.insert(token_id);

            for claim in &upsert.records {
                let key = (claim.blockchain.clone(), claim.address.clone());
                if !chains.contains(&claim.blockchain) || !claimed.insert(key) {
                    continue;
                }
                match state
                    .records
                    .iter_mut()
                    .find(|r| r.blockchain == claim.blockchain && r.address == claim.address)
                {
                    Some(record) if record.token_id == token_id => {}
                    Some(record) => {
                        record.token_id = token_id;
                        report.records.updated += 1;
                    }
                    None => {
                        state.records.push(TokenRecord {
                            id: Uuid::new_v4(),
                            token_id,
                            blockchain: claim.blockchain.clone(),
                            address: claim.address.clone(),
                        });
                        report.records.inserted += 1;
                    }
                }
            }
        }

        let before = state.records.len();
        state.records.retain(|r| {
            !plan_ids.contains(&r.token_id) || claimed.contains(&(r.blockchain.clone(), r.address.clone()))
        });
        report.records.deleted = (before - state.records.len()) as u64;
        state.drop_orphans();
        state.link_natives();

        Ok(report)
    }

    async fn upsert_exchanges(&self, exchanges: &[ExchangeUpsert]) -> Result<UpsertReport> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let mut report = UpsertReport::default();
        let chains: HashSet<String> = state.blockchains.iter().map(|c| c.slug.clone()).collect();

        for exchange in exchanges {
            if !chains.contains(&exchange.blockchain) {
                continue;
            }
            match state
                .exchanges
                .iter_mut()
                .find(|e| e.blockchain == exchange.blockchain && e.slug == exchange.slug)
            {
                Some(existing) if existing.name == exchange.name => {}
                Some(existing) => {
                    existing.name = exchange.name.clone();
                    report.updated += 1;
                }
                None => {
                    state.exchanges.push(Exchange {
                        id: Uuid::new_v4(),
                        blockchain: exchange.blockchain.clone(),
                        slug: exchange.slug.clone(),
                        name: exchange.name.clone(),
                    });
                    report.inserted += 1;
                }
            }
        }
        Ok(report)
    }

    async fn stale_tokens(&self, refreshed_before: DateTime<Utc>, limit: usize) -> Result<Vec<TokenWithRecords>> {
        let state = self.state.lock().unwrap();
        let mut stale: Vec<&Token> = state
            .tokens
            .iter()
            .filter(|t| t.last_updated.map_or(true, |at| at < refreshed_before))
            .collect();
        stale.sort_by_key(|t| (t.rank.is_none(), t.rank, t.cmc_id));
        Ok(stale.into_iter().take(limit).map(|t| state.with_records(t)).collect())
    }

    async fn apply_pair_sync(&self, token_id: Uuid, pairs: &[PairUpsert]) -> Result<UpsertReport> {
        self.pair_sync_calls.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let mut report = UpsertReport::default();
        let now = Utc::now();

        for pair in pairs {
            let find_record = |address: &str| {
                state
                    .records
                    .iter()
                    .find(|r| r.blockchain == pair.blockchain && r.address == address)
                    .map(|r| r.id)
            };
            let (Some(base), Some(quote)) = (find_record(&pair.base_address), find_record(&pair.quote_address)) else {
                continue;
            };
            let Some(exchange) = state
                .exchanges
                .iter()
                .find(|e| e.blockchain == pair.blockchain && e.slug == pair.dex_slug)
                .map(|e| e.id)
            else {
                continue;
            };

            match state
                .pairs
                .iter_mut()
                .find(|p| p.base_record_id == base && p.quote_record_id == quote && p.exchange_id == exchange)
            {
                Some(existing) => {
                    existing.data = pair.clone();
                    existing.updated_at = now;
                    report.updated += 1;
                }
                None => {
                    state.pairs.push(StoredPair {
                        id: Uuid::new_v4(),
                        base_record_id: base,
                        quote_record_id: quote,
                        exchange_id: exchange,
                        data: pair.clone(),
                        updated_at: now,
                    });
                    report.inserted += 1;
                }
            }
        }

        if let Some(token) = state.tokens.iter_mut().find(|t| t.id == token_id) {
            token.last_updated = Some(now);
        }
        Ok(report)
    }

    async fn purge_stale_pairs(&self, updated_before: DateTime<Utc>) -> Result<u64> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let before = state.pairs.len();
        state.pairs.retain(|p| p.updated_at >= updated_before);
        Ok((before - state.pairs.len()) as u64)
    }

    async fn list_tokens(&self, query: &TokenListQuery) -> Result<TokenPage> {
        let state = self.state.lock().unwrap();
        let needle = query.search.as_ref().map(|s| s.to_lowercase());

        let mut matches: Vec<&Token> = state
            .tokens
            .iter()
            .filter(|t| match &needle {
                Some(needle) => {
                    t.symbol.to_lowercase().contains(needle)
                        || t.name.to_lowercase().contains(needle)
                        || t.cmc_slug.to_lowercase().contains(needle)
                        || state.records_of(t.id).iter().any(|r| &r.address == needle)
                }
                None => true,
            })
            .filter(|t| {
                query.chains.is_empty()
                    || state
                        .records_of(t.id)
                        .iter()
                        .any(|r| query.chains.contains(&r.blockchain))
            })
            .collect();

        matches.sort_by(|a, b| {
            let order = match query.sort_by {
                SortField::Symbol => a.symbol.cmp(&b.symbol),
                SortField::Price => a.price.cmp(&b.price),
                SortField::Volume => a.volume_24h.cmp(&b.volume_24h),
                _ => a.market_cap.cmp(&b.market_cap),
            };
            match query.sort_order {
                SortOrder::Asc => order,
                SortOrder::Desc => order.reverse(),
            }
            .then(a.cmc_id.cmp(&b.cmc_id))
        });

        let total = matches.len() as i64;
        let tokens = matches
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|t| state.with_records(t))
            .collect();
        Ok(TokenPage { tokens, total })
    }

    async fn token_by_slug(&self, cmc_slug: &str) -> Result<Option<TokenWithRecords>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tokens
            .iter()
            .find(|t| t.cmc_slug == cmc_slug)
            .map(|t| state.with_records(t)))
    }

    async fn token_by_id(&self, id: Uuid) -> Result<Option<TokenWithRecords>> {
        let state = self.state.lock().unwrap();
        Ok(state.tokens.iter().find(|t| t.id == id).map(|t| state.with_records(t)))
    }

    async fn pair_freshness(&self, token_id: Uuid) -> Result<Option<PairFreshness>> {
        let state = self.state.lock().unwrap();
        let Some(token) = state.tokens.iter().find(|t| t.id == token_id) else {
            return Ok(None);
        };
        let records = state.records_of(token_id);
        let unpriced = records
            .iter()
            .filter(|r| {
                !state.pairs.iter().any(|p| {
                    (p.base_record_id == r.id || p.quote_record_id == r.id) && p.data.price_usd.is_some()
                })
            })
            .count();
        Ok(Some(PairFreshness {
            last_updated: token.last_updated,
            records: records.len() as i64,
            unpriced_records: unpriced as i64,
        }))
    }

    async fn pairs_for_token(&self, token_id: Uuid, limit: i64) -> Result<Vec<PairView>> {
        let state = self.state.lock().unwrap();
        let side = |record_id: Uuid| -> Option<PairToken> {
            let record = state.records.iter().find(|r| r.id == record_id)?;
            let token = state.tokens.iter().find(|t| t.id == record.token_id)?;
            Some(PairToken {
                id: token.id,
                cmc_slug: token.cmc_slug.clone(),
                cmc_id: token.cmc_id,
                symbol: token.symbol.clone(),
                address: record.address.clone(),
            })
        };

        let mut views: Vec<PairView> = state
            .pairs
            .iter()
            .filter_map(|p| {
                let base = side(p.base_record_id)?;
                let quote = side(p.quote_record_id)?;
                if base.id != token_id && quote.id != token_id {
                    return None;
                }
                let exchange = state.exchanges.iter().find(|e| e.id == p.exchange_id)?;
                let chain = state.blockchains.iter().find(|c| c.slug == p.data.blockchain)?;
                Some(PairView {
                    id: p.id,
                    pool_address: p.data.pool_address.clone(),
                    name: p.data.name.clone(),
                    base,
                    quote,
                    blockchain: chain.slug.clone(),
                    evm_chain_id: chain.evm_chain_id,
                    tx_url_format: chain.explorer_tx_url_format.clone(),
                    dex_slug: exchange.slug.clone(),
                    dex_name: exchange.name.clone(),
                    reserve_usd: p.data.reserve_usd,
                    volume_usd: p.data.volume_usd,
                    price_usd: p.data.price_usd,
                    price_change_24h: p.data.price_change_24h,
                    trades_24h: p.data.trades_24h,
                    buys_24h: p.data.buys_24h,
                    sells_24h: p.data.sells_24h,
                    unique_buyers: p.data.unique_buyers,
                    unique_sellers: p.data.unique_sellers,
                    updated_at: p.updated_at,
                })
            })
            .collect();

        views.sort_by(|a, b| b.volume_usd.cmp(&a.volume_usd));
        views.truncate(limit.max(0) as usize);
        Ok(views)
    }
}

// ---------------------------------------------------------------- providers

pub fn partial_token(id: &str, slug: &str, symbol: &str, rank: u32, contracts: &[&str]) -> PartialToken {
    PartialToken {
        provider_id: id.to_string(),
        slug: slug.to_string(),
        symbol: symbol.to_string(),
        name: symbol.to_string(),
        rank: Some(rank),
        active: true,
        contracts: contracts.iter().map(|a| ContractRef::new(None, a)).collect(),
    }
}

pub fn quote(price: f64, platform: Option<(&str, &str)>) -> QuoteStats {
    QuoteStats {
        price: Some(price),
        volume_24h: Some(1_000.0),
        volume_change_24h: Some(2.5),
        market_cap: Some(price * 1_000_000.0),
        fully_diluted_market_cap: None,
        circulating_supply: Some(1_000_000.0),
        total_supply: None,
        percent_change_1h: Some(0.5),
        percent_change_24h: Some(-1.5),
        percent_change_7d: None,
        rank: None,
        image: None,
        platform: platform.map(|(chain, address)| ContractRef::new(Some(chain), address)),
    }
}

#[derive(Default)]
pub struct FakeTokenSource {
    pub tokens: Mutex<Vec<PartialToken>>,
    pub stats: Mutex<HashMap<String, QuoteStats>>,
    pub fail_catalog: Mutex<bool>,
}

impl FakeTokenSource {
    pub fn new(tokens: Vec<PartialToken>, stats: Vec<(&str, QuoteStats)>) -> Self {
        Self {
            tokens: Mutex::new(tokens),
            stats: Mutex::new(stats.into_iter().map(|(id, s)| (id.to_string(), s)).collect()),
            fail_catalog: Mutex::new(false),
        }
    }
}

#[async_trait]
impl TokenSource for FakeTokenSource {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CoinMarketCap
    }

    async fn list_tokens(&self) -> Result<Vec<PartialToken>, FetchError> {
        if *self.fail_catalog.lock().unwrap() {
            return Err(FetchError::Provider("catalog down".to_string()));
        }
        Ok(self.tokens.lock().unwrap().clone())
    }

    async fn get_stats(&self, ids: &[String]) -> Result<HashMap<String, QuoteStats>, FetchError> {
        let stats = self.stats.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| stats.get(id).map(|s| (id.clone(), s.clone())))
            .collect())
    }
}

#[derive(Default)]
pub struct FakePairSource {
    pub pairs: HashMap<(String, String), Vec<PartialPair>>,
    pub exchanges: Vec<PartialExchange>,
    pub delay: Option<Duration>,
    pub listings: AtomicUsize,
    pub delisted: AtomicBool,
    /// `(chain, address)` listings that fail.
    pub failing: HashSet<(String, String)>,
    /// Pools whose stats fail.
    pub failing_pools: HashSet<String>,
}

#[async_trait]
impl PairSource for FakePairSource {
    async fn list_trading_pairs_for_token(&self, chain: &str, address: &str) -> Result<Vec<PartialPair>, FetchError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&(chain.to_string(), address.to_string())) {
            return Err(FetchError::Provider(format!("listing down for {}", address)));
        }
        if self.delisted.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(self
            .pairs
            .get(&(chain.to_string(), address.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_exchanges(&self, chain: &str) -> Result<Vec<PartialExchange>, FetchError> {
        Ok(self.exchanges.iter().filter(|e| e.chain == chain).cloned().collect())
    }

    async fn pool_stats(&self, _chain: &str, pool: &str, _base_index: u8) -> Result<PoolStats, FetchError> {
        if self.failing_pools.contains(pool) {
            return Err(FetchError::Provider(format!("no stats for {}", pool)));
        }
        Ok(PoolStats {
            trades_24h: Some(120),
            buys_24h: Some(70),
            sells_24h: Some(50),
            volume_usd: Some(50_000.0),
            ..PoolStats::default()
        })
    }
}

pub fn pool(name: &str, pool_address: &str, base: &str, quote: &str, price: f64) -> PartialPair {
    PartialPair {
        chain: "ethereum".to_string(),
        pool_address: pool_address.to_string(),
        name: name.to_string(),
        dex: "uniswap_v2".to_string(),
        base_address: base.to_string(),
        quote_address: quote.to_string(),
        reserve_usd: Some(1_000_000.0),
        base_price_usd: Some(price),
        quote_price_usd: Some(3_000.0),
    }
}

#[derive(Default)]
pub struct FakeTraderSource {
    pub swaps: HashMap<String, Vec<Point>>,
}

#[async_trait]
impl TraderSource for FakeTraderSource {
    async fn unique_traders(
        &self,
        _chain: &str,
        _pool: &str,
        _token: &str,
        _date: NaiveDate,
    ) -> Result<UniqueTraders, FetchError> {
        Ok(UniqueTraders { buyers: 11, sellers: 7 })
    }

    async fn daily_swaps(&self, chain: &str, _token: &str, _since: NaiveDate) -> Result<Vec<Point>, FetchError> {
        Ok(self.swaps.get(chain).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeHolderSource {
    pub series: HashMap<String, Vec<Point>>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl HolderSource for FakeHolderSource {
    async fn holders(&self, chain: &str, _address: &str) -> Result<Vec<Point>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.series
            .get(chain)
            .cloned()
            .ok_or_else(|| FetchError::Provider(format!("no chart for {}", chain)))
    }
}

#[derive(Default)]
pub struct FakeDexSource {
    pub info: Mutex<HashMap<String, Value>>,
    pub info_calls: AtomicUsize,
    pub lists: HashMap<u32, Vec<PairListEntry>>,
    pub list_delay: Option<Duration>,
    pub list_calls: AtomicUsize,
    pub transactions: HashMap<String, Vec<DexTransaction>>,
}

#[async_trait]
impl DexSource for FakeDexSource {
    async fn pair_info(&self, _platform: &str, address: &str) -> Result<Option<Value>, FetchError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.info.lock().unwrap().get(address).cloned())
    }

    async fn pair_list(&self, _address: &str, platform_id: u32) -> Result<Vec<PairListEntry>, FetchError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.lists.get(&platform_id).cloned().unwrap_or_default())
    }

    async fn transactions(&self, _platform_id: u32, pair: &PairRef) -> Result<Vec<DexTransaction>, FetchError> {
        self.transactions
            .get(&pair.pair_id)
            .cloned()
            .ok_or_else(|| FetchError::Provider(format!("unknown pair {}", pair.pair_id)))
    }
}

pub fn pair_list_entry(platform_id: i64, volume: f64) -> PairListEntry {
    serde_json::from_value(serde_json::json!({
        "platform": { "id": platform_id, "name": "x" },
        "volume24h": volume.to_string(),
        "pairContractAddress": format!("0x{}", volume as u64),
    }))
    .unwrap()
}

pub fn transaction(time: i64) -> DexTransaction {
    DexTransaction {
        pair_id: String::new(),
        exchange: String::new(),
        time,
        extra: Map::new(),
    }
}

// ---------------------------------------------------------------- fixtures

/// PEPE and WETH on ethereum, with WETH being the chain's native asset.
pub fn catalog() -> (Vec<PartialToken>, Vec<(&'static str, QuoteStats)>) {
    let tokens = vec![
        partial_token("1027", "ethereum", "ETH", 2, &[WETH]),
        partial_token("825", "tether", "USDT", 3, &[USDT]),
        partial_token("24478", "pepe", "PEPE", 40, &[PEPE]),
    ];
    let stats = vec![
        ("1027", quote(3_000.0, Some(("ethereum", WETH)))),
        ("825", quote(1.0, Some(("ethereum", USDT)))),
        ("24478", quote(0.0000012, Some(("ethereum", PEPE)))),
    ];
    (tokens, stats)
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub primary: Arc<FakeTokenSource>,
    pub pairs: Arc<FakePairSource>,
    pub holders: Arc<FakeHolderSource>,
    pub dex: Arc<FakeDexSource>,
    pub context: AppContext,
}

pub fn default_pairs() -> FakePairSource {
    let mut pairs = HashMap::new();
    pairs.insert(
        ("ethereum".to_string(), PEPE.to_string()),
        vec![
            pool("PEPE / WETH", "0xpool1", PEPE, WETH, 0.0000012),
            pool("PEPE / USDT / WETH", "0xpool2", PEPE, USDT, 0.0000012),
        ],
    );
    FakePairSource {
        pairs,
        exchanges: vec![PartialExchange {
            chain: "ethereum".to_string(),
            slug: "uniswap_v2".to_string(),
            name: "Uniswap V2".to_string(),
        }],
        ..FakePairSource::default()
    }
}

pub fn harness(pairs: FakePairSource, holders: FakeHolderSource, dex: FakeDexSource) -> Harness {
    let (tokens, stats) = catalog();
    harness_with(FakeTokenSource::new(tokens, stats), None, pairs, holders, dex)
}

/// PEPE on ethereum and BSC; the BSC contract reaches the records through a
/// secondary catalog that lists both.
pub fn two_chain_harness(pairs: FakePairSource) -> Harness {
    let (mut tokens, stats) = catalog();
    for token in tokens.iter_mut().filter(|token| token.provider_id == "24478") {
        token.contracts.push(ContractRef::new(None, PEPE_BSC));
    }
    let secondary = FakeTokenSource::new(
        vec![PartialToken {
            contracts: vec![
                ContractRef::new(Some("ethereum"), PEPE),
                ContractRef::new(Some("binance-smart-chain"), PEPE_BSC),
            ],
            ..partial_token("pepe", "pepe", "PEPE", 40, &[])
        }],
        Vec::new(),
    );
    harness_with(
        FakeTokenSource::new(tokens, stats),
        Some(secondary),
        pairs,
        FakeHolderSource::default(),
        FakeDexSource::default(),
    )
}

pub fn harness_with(
    primary: FakeTokenSource,
    secondary: Option<FakeTokenSource>,
    pairs: FakePairSource,
    holders: FakeHolderSource,
    dex: FakeDexSource,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let primary = Arc::new(primary);
    let pairs = Arc::new(pairs);
    let holders = Arc::new(holders);
    let dex = Arc::new(dex);

    let providers = Providers {
        primary: primary.clone(),
        secondary: secondary.map(|source| Arc::new(source) as Arc<dyn TokenSource>),
        pairs: pairs.clone(),
        traders: Arc::new(FakeTraderSource::default()),
        holders: holders.clone(),
        dex: dex.clone(),
    };
    let context = AppContext::from_parts(test_config(), store.clone(), Cache::in_memory(), providers);

    Harness {
        store,
        primary,
        pairs,
        holders,
        dex,
        context,
    }
}

impl Harness {
    /// Platforms, tokens and exchanges, without pairs.
    pub async fn seed(&self) {
        let sync = &self.context.sync;
        sync.sync_platforms().await.unwrap();
        sync.sync_tokens().await.unwrap();
        sync.sync_dexs().await.unwrap();
    }
}

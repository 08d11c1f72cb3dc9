use crate::chains::ChainSpec;
use crate::providers::{PartialExchange, ValidStats};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blockchain {
    pub slug: String,
    pub evm_chain_id: i64,
    pub name: String,
    pub image: String,
    pub explorer_url: String,
    pub explorer_address_url_format: String,
    pub explorer_token_url_format: String,
    pub explorer_tx_url_format: String,
    pub bq_slug: String,
    pub native_cmc_id: i64,
    pub cmc_platform_id: i64,
    /// The chain's native asset, once tokens are synced.
    pub parent_token_id: Option<Uuid>,
}

impl From<&ChainSpec> for Blockchain {
    fn from(spec: &ChainSpec) -> Self {
        Self {
            slug: spec.slug.to_string(),
            evm_chain_id: spec.evm_chain_id,
            name: spec.name.to_string(),
            image: spec.image.to_string(),
            explorer_url: spec.explorer_url.to_string(),
            explorer_address_url_format: spec.explorer_address_url_format.to_string(),
            explorer_token_url_format: spec.explorer_token_url_format.to_string(),
            explorer_tx_url_format: spec.explorer_tx_url_format.to_string(),
            bq_slug: spec.bitquery_network.to_string(),
            native_cmc_id: spec.native_cmc_id,
            cmc_platform_id: i64::from(spec.cmc_platform_id),
            parent_token_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: Uuid,
    pub cmc_id: i64,
    pub cmc_slug: String,
    pub coingecko_slug: Option<String>,
    pub symbol: String,
    pub name: String,
    pub image: Option<String>,
    pub rank: Option<i32>,
    pub price: Decimal,
    pub volume_24h: Decimal,
    pub volume_change_24h: Option<f64>,
    pub market_cap: Decimal,
    pub fully_diluted_market_cap: Option<Decimal>,
    pub circulating_supply: Decimal,
    pub total_supply: Option<Decimal>,
    pub percent_change_1h: f64,
    pub percent_change_24h: f64,
    pub percent_change_7d: Option<f64>,
    /// Pair watermark: when this token's pairs were last synced.
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: Uuid,
    pub token_id: Uuid,
    pub blockchain: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenWithRecords {
    pub token: Token,
    pub records: Vec<TokenRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordClaim {
    pub blockchain: String,
    pub address: String,
}

/// One reconciled token ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenUpsert {
    pub cmc_id: i64,
    pub cmc_slug: String,
    pub coingecko_slug: Option<String>,
    pub symbol: String,
    pub name: String,
    pub image: Option<String>,
    pub rank: Option<i32>,
    pub stats: ValidStats,
    pub records: Vec<RecordClaim>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub id: Uuid,
    pub blockchain: String,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeUpsert {
    pub blockchain: String,
    pub slug: String,
    pub name: String,
}

impl From<PartialExchange> for ExchangeUpsert {
    fn from(exchange: PartialExchange) -> Self {
        Self {
            blockchain: exchange.chain,
            slug: exchange.slug,
            name: exchange.name,
        }
    }
}

/// A pool to write, keyed by (chain, base address, quote address, dex).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairUpsert {
    pub blockchain: String,
    pub pool_address: String,
    pub name: String,
    pub dex_slug: String,
    pub base_address: String,
    pub quote_address: String,
    pub reserve_usd: Option<Decimal>,
    pub volume_usd: Option<Decimal>,
    pub price_usd: Option<Decimal>,
    pub price_change_24h: Option<f64>,
    pub trades_24h: Option<i64>,
    pub buys_24h: Option<i64>,
    pub sells_24h: Option<i64>,
    pub unique_buyers: Option<i64>,
    pub unique_sellers: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairToken {
    pub id: Uuid,
    pub cmc_slug: String,
    pub cmc_id: i64,
    pub symbol: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairView {
    pub id: Uuid,
    pub pool_address: String,
    pub name: String,
    pub base: PairToken,
    pub quote: PairToken,
    pub blockchain: String,
    pub evm_chain_id: i64,
    pub tx_url_format: String,
    pub dex_slug: String,
    pub dex_name: String,
    pub reserve_usd: Option<Decimal>,
    pub volume_usd: Option<Decimal>,
    pub price_usd: Option<Decimal>,
    pub price_change_24h: Option<f64>,
    pub trades_24h: Option<i64>,
    pub buys_24h: Option<i64>,
    pub sells_24h: Option<i64>,
    pub unique_buyers: Option<i64>,
    pub unique_sellers: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// Row counts written by one store call. All zero means nothing changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertReport {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

impl UpsertReport {
    pub fn is_unchanged(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0
    }
}

impl AddAssign for UpsertReport {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.deleted += other.deleted;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSyncReport {
    pub tokens: UpsertReport,
    pub records: UpsertReport,
}

impl TokenSyncReport {
    pub fn is_unchanged(&self) -> bool {
        self.tokens.is_unchanged() && self.records.is_unchanged()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairFreshness {
    pub last_updated: Option<DateTime<Utc>>,
    pub records: i64,
    /// Records that appear in no pair with a known price.
    pub unpriced_records: i64,
}

impl PairFreshness {
    /// Stale when the watermark is missing or older than `window`, or when
    /// some record has no priced pair yet.
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.last_updated {
            None => true,
            Some(at) if now - at > window => true,
            Some(_) => self.unpriced_records > 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortField {
    Symbol,
    Volume,
    VolumeChange24h,
    MarketCap,
    Liquidity,
    CirculatingSupply,
    Price,
    PriceChange1h,
    PriceChange24h,
}

impl SortField {
    /// Unknown names fall back to market cap.
    pub fn parse(name: &str) -> Self {
        match name {
            "symbol" => SortField::Symbol,
            "volume" => SortField::Volume,
            "volumeChangePercentage24h" => SortField::VolumeChange24h,
            "liquidity" => SortField::Liquidity,
            "circulatingSupply" => SortField::CirculatingSupply,
            "price" => SortField::Price,
            "priceChangePercentage1h" => SortField::PriceChange1h,
            "priceChangePercentage24h" => SortField::PriceChange24h,
            _ => SortField::MarketCap,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            SortField::Symbol => "symbol",
            SortField::Volume => "volume_24h",
            SortField::VolumeChange24h => "volume_change_24h",
            SortField::MarketCap => "market_cap",
            SortField::Liquidity => "fully_diluted_market_cap",
            SortField::CirculatingSupply => "circulating_supply",
            SortField::Price => "price",
            SortField::PriceChange1h => "percent_change_1h",
            SortField::PriceChange24h => "percent_change_24h",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "asc" => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenListQuery {
    pub search: Option<String>,
    pub chains: Vec<String>,
    pub limit: i64,
    pub offset: i64,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl Default for TokenListQuery {
    fn default() -> Self {
        Self {
            search: None,
            chains: Vec::new(),
            limit: 20,
            offset: 0,
            sort_by: SortField::MarketCap,
            sort_order: SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenPage {
    pub tokens: Vec<TokenWithRecords>,
    pub total: i64,
}

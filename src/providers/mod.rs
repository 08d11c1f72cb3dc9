pub mod bitquery;
pub mod coingecko;
pub mod coinmarketcap;
pub mod etherscan;
pub mod geckoterminal;

pub use bitquery::BitQueryClient;
pub use coingecko::CoinGeckoClient;
pub use coinmarketcap::{CoinMarketCapClient, DexTransaction, PairListEntry, PairRef};
pub use etherscan::EtherscanClient;
pub use geckoterminal::GeckoTerminalClient;

use crate::error::FetchError;
use crate::series::Point;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    CoinMarketCap,
    CoinGecko,
    GeckoTerminal,
    BitQuery,
    Etherscan,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::CoinMarketCap => "coinmarketcap",
            ProviderKind::CoinGecko => "coingecko",
            ProviderKind::GeckoTerminal => "geckoterminal",
            ProviderKind::BitQuery => "bitquery",
            ProviderKind::Etherscan => "etherscan",
        };
        f.write_str(name)
    }
}

/// A contract address, lower-cased. `chain` is unknown for catalogs that list
/// bare addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractRef {
    pub chain: Option<String>,
    pub address: String,
}

impl ContractRef {
    pub fn new(chain: Option<&str>, address: &str) -> Self {
        Self {
            chain: chain.map(str::to_string),
            address: address.trim().to_lowercase(),
        }
    }
}

/// Catalog entry in the provider's own identifier scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialToken {
    pub provider_id: String,
    pub slug: String,
    pub symbol: String,
    pub name: String,
    pub rank: Option<u32>,
    pub active: bool,
    pub contracts: Vec<ContractRef>,
}

/// Market quote for one token; every field may be missing upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteStats {
    pub price: Option<f64>,
    pub volume_24h: Option<f64>,
    pub volume_change_24h: Option<f64>,
    pub market_cap: Option<f64>,
    pub fully_diluted_market_cap: Option<f64>,
    pub circulating_supply: Option<f64>,
    pub total_supply: Option<f64>,
    pub percent_change_1h: Option<f64>,
    pub percent_change_24h: Option<f64>,
    pub percent_change_7d: Option<f64>,
    pub rank: Option<u32>,
    pub image: Option<String>,
    /// Contract on the chain the token is issued on, when the provider reports it.
    pub platform: Option<ContractRef>,
}

/// Quote that passed the validity predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidStats {
    pub price: Decimal,
    pub volume_24h: Decimal,
    pub market_cap: Decimal,
    pub circulating_supply: Decimal,
    pub percent_change_1h: f64,
    pub percent_change_24h: f64,
    pub fully_diluted_market_cap: Option<Decimal>,
    pub total_supply: Option<Decimal>,
    pub volume_change_24h: Option<f64>,
    pub percent_change_7d: Option<f64>,
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn decimal(value: Option<f64>) -> Option<Decimal> {
    finite(value).and_then(Decimal::from_f64)
}

impl QuoteStats {
    /// Copies fields this quote lacks from `other`.
    pub fn fill_missing(&mut self, other: &QuoteStats) {
        fn fill<T: Clone>(slot: &mut Option<T>, other: &Option<T>) {
            if slot.is_none() {
                *slot = other.clone();
            }
        }

        fill(&mut self.price, &other.price);
        fill(&mut self.volume_24h, &other.volume_24h);
        fill(&mut self.volume_change_24h, &other.volume_change_24h);
        fill(&mut self.market_cap, &other.market_cap);
        fill(&mut self.fully_diluted_market_cap, &other.fully_diluted_market_cap);
        fill(&mut self.circulating_supply, &other.circulating_supply);
        fill(&mut self.total_supply, &other.total_supply);
        fill(&mut self.percent_change_1h, &other.percent_change_1h);
        fill(&mut self.percent_change_24h, &other.percent_change_24h);
        fill(&mut self.percent_change_7d, &other.percent_change_7d);
        fill(&mut self.image, &other.image);
    }

    /// Requires price, 24h volume, market cap, circulating supply and the 1h
    /// and 24h changes. Missing values are never defaulted.
    pub fn validate(&self) -> Option<ValidStats> {
        Some(ValidStats {
            price: decimal(self.price)?,
            volume_24h: decimal(self.volume_24h)?,
            market_cap: decimal(self.market_cap)?,
            circulating_supply: decimal(self.circulating_supply)?,
            percent_change_1h: finite(self.percent_change_1h)?,
            percent_change_24h: finite(self.percent_change_24h)?,
            fully_diluted_market_cap: decimal(self.fully_diluted_market_cap),
            total_supply: decimal(self.total_supply),
            volume_change_24h: finite(self.volume_change_24h),
            percent_change_7d: finite(self.percent_change_7d),
        })
    }

    pub fn is_usable(&self) -> bool {
        self.validate().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialPair {
    pub chain: String,
    pub pool_address: String,
    pub name: String,
    pub dex: String,
    pub base_address: String,
    pub quote_address: String,
    pub reserve_usd: Option<f64>,
    pub base_price_usd: Option<f64>,
    pub quote_price_usd: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialExchange {
    pub chain: String,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub trades_24h: Option<i64>,
    pub buys_24h: Option<i64>,
    pub sells_24h: Option<i64>,
    pub volume_usd: Option<f64>,
    pub reserve_usd: Option<f64>,
    pub price_usd: Option<f64>,
    pub price_change_24h: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueTraders {
    pub buyers: i64,
    pub sellers: i64,
}

/// Market-data catalogs and quotes.
#[async_trait]
pub trait TokenSource: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn list_tokens(&self) -> Result<Vec<PartialToken>, FetchError>;

    /// Keyed by the ids passed in; ids the provider does not know are absent.
    async fn get_stats(&self, ids: &[String]) -> Result<HashMap<String, QuoteStats>, FetchError>;
}

/// DEX graph: pools per token, exchanges per chain, pool statistics.
#[async_trait]
pub trait PairSource: Send + Sync {
    async fn list_trading_pairs_for_token(
        &self,
        chain: &str,
        address: &str,
    ) -> Result<Vec<PartialPair>, FetchError>;

    async fn list_exchanges(&self, chain: &str) -> Result<Vec<PartialExchange>, FetchError>;

    /// `base_index` is 0 when the token of interest is the pool's base token.
    async fn pool_stats(&self, chain: &str, pool: &str, base_index: u8) -> Result<PoolStats, FetchError>;
}

/// On-chain trade analytics.
#[async_trait]
pub trait TraderSource: Send + Sync {
    async fn unique_traders(
        &self,
        chain: &str,
        pool: &str,
        token: &str,
        date: NaiveDate,
    ) -> Result<UniqueTraders, FetchError>;

    /// Daily swap counts, ascending.
    async fn daily_swaps(&self, chain: &str, token: &str, since: NaiveDate) -> Result<Vec<Point>, FetchError>;
}

#[async_trait]
pub trait HolderSource: Send + Sync {
    async fn holders(&self, chain: &str, address: &str) -> Result<Vec<Point>, FetchError>;
}

/// Pass-through DEX data served by the dexer endpoints.
#[async_trait]
pub trait DexSource: Send + Sync {
    async fn pair_info(&self, platform: &str, address: &str) -> Result<Option<serde_json::Value>, FetchError>;

    /// Every page for `address`, unfiltered.
    async fn pair_list(&self, address: &str, platform_id: u32) -> Result<Vec<PairListEntry>, FetchError>;

    async fn transactions(&self, platform_id: u32, pair: &PairRef) -> Result<Vec<DexTransaction>, FetchError>;
}

pub(crate) fn unsupported_chain(chain: &str) -> FetchError {
    FetchError::Provider(format!("unsupported chain {}", chain))
}

/// Lenient decoders for providers that mix numbers and numeric strings.
pub(crate) mod de {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn parse_number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
            _ => None,
        }
    }

    pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Value>::deserialize(deserializer)?
            .as_ref()
            .and_then(parse_number))
    }

    pub fn opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(opt_f64(deserializer)?.map(|v| v as i64))
    }

    pub fn i64_lenient<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        opt_i64(deserializer)?.ok_or_else(|| serde::de::Error::custom("expected a number"))
    }
}

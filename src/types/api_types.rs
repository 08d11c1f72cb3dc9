use super::models::*;
use crate::chains;
use crate::providers::PairListEntry;
use chrono::{DateTime, Utc};
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TOKEN_LIMIT: i64 = 20;
pub const MAX_TOKEN_LIMIT: i64 = 250;
pub const DEFAULT_PAIR_LIMIT: i64 = 50;
pub const MAX_PAIR_LIMIT: i64 = 250;
pub const PAIR_LIST_CAP: usize = 100;

fn to_f64(value: Option<Decimal>) -> Option<f64> {
    value.and_then(|v| v.to_f64())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenListParams {
    pub search: Option<String>,
    /// Comma separated chain slugs.
    pub chains: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl TokenListParams {
    pub fn into_query(self) -> TokenListQuery {
        let chains = self
            .chains
            .unwrap_or_default()
            .split(',')
            .map(|chain| chain.trim().to_lowercase())
            .filter(|chain| !chain.is_empty())
            .collect();

        TokenListQuery {
            search: self
                .search
                .map(|search| search.trim().to_string())
                .filter(|search| !search.is_empty()),
            chains,
            limit: self.limit.unwrap_or(DEFAULT_TOKEN_LIMIT).clamp(1, MAX_TOKEN_LIMIT),
            offset: self.offset.unwrap_or(0).max(0),
            sort_by: self
                .sort_by
                .as_deref()
                .map(SortField::parse)
                .unwrap_or(SortField::MarketCap),
            sort_order: self
                .sort_order
                .as_deref()
                .map(SortOrder::parse)
                .unwrap_or(SortOrder::Desc),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PairsParams {
    pub limit: Option<i64>,
}

impl PairsParams {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAIR_LIMIT).clamp(1, MAX_PAIR_LIMIT)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformBlockchain {
    pub slug: String,
    pub name: String,
    pub image: String,
    pub url: String,
    pub bq_slug: String,
    pub evm_chain_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPlatform {
    pub address: String,
    pub blockchain: PlatformBlockchain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub id: Uuid,
    pub slug: Option<String>,
    pub cmc_slug: String,
    pub cmc_id: i64,
    pub name: String,
    pub symbol: String,
    #[serde(rename = "logoURI")]
    pub logo_uri: String,
    pub liquidity: Option<f64>,
    pub volume: Option<f64>,
    pub volume_change_percentage_24h: Option<f64>,
    pub circulating_supply: Option<f64>,
    pub total_supply: Option<f64>,
    pub market_cap: Option<f64>,
    pub price: Option<f64>,
    pub price_change_percentage_1h: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
    pub price_change_percentage_7d: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
    pub platforms: Vec<TokenPlatform>,
}

impl From<&TokenWithRecords> for TokenResponse {
    fn from(item: &TokenWithRecords) -> Self {
        let token = &item.token;
        let platforms = item
            .records
            .iter()
            .filter_map(|record| {
                let spec = chains::by_slug(&record.blockchain)?;
                Some(TokenPlatform {
                    address: record.address.clone(),
                    blockchain: PlatformBlockchain {
                        slug: spec.slug.to_string(),
                        name: spec.name.to_string(),
                        image: spec.image.to_string(),
                        url: chains::token_url(spec.explorer_token_url_format, &record.address),
                        bq_slug: spec.bitquery_network.to_string(),
                        evm_chain_id: spec.evm_chain_id,
                    },
                })
            })
            .collect();

        Self {
            id: token.id,
            slug: token.coingecko_slug.clone(),
            cmc_slug: token.cmc_slug.clone(),
            cmc_id: token.cmc_id,
            name: token.name.clone(),
            symbol: token.symbol.to_uppercase(),
            logo_uri: token.image.clone().unwrap_or_default(),
            liquidity: to_f64(token.fully_diluted_market_cap),
            volume: token.volume_24h.to_f64(),
            volume_change_percentage_24h: token.volume_change_24h,
            circulating_supply: token.circulating_supply.to_f64(),
            total_supply: to_f64(token.total_supply),
            market_cap: token.market_cap.to_f64(),
            price: token.price.to_f64(),
            price_change_percentage_1h: Some(token.percent_change_1h),
            price_change_percentage_24h: Some(token.percent_change_24h),
            price_change_percentage_7d: token.percent_change_7d,
            last_updated: token.last_updated,
            platforms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenListResponse {
    pub tokens: Vec<TokenResponse>,
    pub tokens_count: i64,
}

impl From<TokenPage> for TokenListResponse {
    fn from(page: TokenPage) -> Self {
        Self {
            tokens: page.tokens.iter().map(TokenResponse::from).collect(),
            tokens_count: page.total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSide {
    pub id: Uuid,
    pub slug: String,
    pub cmc: i64,
    pub symbol: String,
    pub address: String,
}

impl From<&PairToken> for PairSide {
    fn from(token: &PairToken) -> Self {
        Self {
            id: token.id,
            slug: token.cmc_slug.clone(),
            cmc: token.cmc_id,
            symbol: token.symbol.to_uppercase(),
            address: token.address.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairPlatform {
    pub slug: String,
    pub chain_id: i64,
    pub tx_url_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairDex {
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairResponse {
    pub id: Uuid,
    pub address: String,
    pub name: String,
    pub base: PairSide,
    pub quote: PairSide,
    pub platform: PairPlatform,
    pub dex: PairDex,
    pub liquidity: Option<f64>,
    pub volume: Option<f64>,
    pub price: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
    pub trades_24h: Option<i64>,
    pub buys_24h: Option<i64>,
    pub sells_24h: Option<i64>,
    pub unique_buyers: Option<i64>,
    pub unique_sellers: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl From<&PairView> for PairResponse {
    fn from(pair: &PairView) -> Self {
        Self {
            id: pair.id,
            address: pair.pool_address.clone(),
            name: pair.name.clone(),
            base: PairSide::from(&pair.base),
            quote: PairSide::from(&pair.quote),
            platform: PairPlatform {
                slug: pair.blockchain.clone(),
                chain_id: pair.evm_chain_id,
                tx_url_format: pair.tx_url_format.clone(),
            },
            dex: PairDex {
                slug: pair.dex_slug.clone(),
                name: pair.dex_name.clone(),
            },
            liquidity: to_f64(pair.reserve_usd),
            volume: to_f64(pair.volume_usd),
            price: to_f64(pair.price_usd),
            price_change_percentage_24h: pair.price_change_24h,
            trades_24h: pair.trades_24h,
            buys_24h: pair.buys_24h,
            sells_24h: pair.sells_24h,
            unique_buyers: pair.unique_buyers,
            unique_sellers: pair.unique_sellers,
            updated_at: pair.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairsResponse {
    pub items: Vec<PairResponse>,
    pub count: usize,
}

impl From<Vec<PairView>> for PairsResponse {
    fn from(pairs: Vec<PairView>) -> Self {
        let items: Vec<PairResponse> = pairs.iter().map(PairResponse::from).collect();
        Self {
            count: items.len(),
            items,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairsInfoRequest {
    pub pairs: Vec<String>,
    pub platform: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairsListParams {
    pub eth_address: Option<String>,
    pub btc_address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairsListResponse {
    pub eth_pairs: Vec<PairListEntry>,
    pub btc_pairs: Vec<PairListEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsRequest {
    #[serde(default)]
    pub btc_pairs: Vec<String>,
    #[serde(default)]
    pub eth_pairs: Vec<String>,
}

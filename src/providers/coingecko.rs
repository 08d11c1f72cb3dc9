use super::{de, ContractRef, PartialToken, ProviderKind, QuoteStats, TokenSource};
use crate::config::ProvidersConfig;
use crate::error::FetchError;
use crate::fetch::{Envelope, FetchClient, FetchRequest, Throttle};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;

const API_URL: &str = "https://api.coingecko.com/api/v3";
const MARKETS_PER_PAGE: usize = 250;

#[derive(Debug, Deserialize)]
struct ErrorStatus {
    #[serde(default, deserialize_with = "de::opt_i64")]
    error_code: Option<i64>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    status: ErrorStatus,
}

/// CoinGecko answers rate limiting with a `status` object instead of the payload.
#[derive(Debug, Deserialize)]
#[serde(untagged, bound = "T: DeserializeOwned")]
enum Response<T> {
    Data(T),
    Error(ErrorBody),
}

impl<T: DeserializeOwned> Envelope for Response<T> {
    type Record = T;

    fn into_record(self) -> Result<T, FetchError> {
        match self {
            Response::Data(data) => Ok(data),
            Response::Error(ErrorBody { status }) => Err(FetchError::Provider(format!(
                "coingecko error {}: {}",
                status.error_code.unwrap_or_default(),
                status.error_message.unwrap_or_default()
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CoinListItem {
    id: String,
    symbol: String,
    name: String,
    #[serde(default)]
    platforms: HashMap<String, Option<String>>,
}

impl From<CoinListItem> for PartialToken {
    fn from(item: CoinListItem) -> Self {
        let mut contracts: Vec<ContractRef> = item
            .platforms
            .iter()
            .filter_map(|(chain, address)| {
                address
                    .as_deref()
                    .filter(|address| !address.is_empty())
                    .map(|address| ContractRef::new(Some(chain.as_str()), address))
            })
            .collect();
        contracts.sort_by(|a, b| a.chain.cmp(&b.chain));

        PartialToken {
            provider_id: item.id.clone(),
            slug: item.id,
            symbol: item.symbol,
            name: item.name,
            rank: None,
            active: true,
            contracts,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MarketItem {
    id: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    market_cap_rank: Option<u32>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    current_price: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    market_cap: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    fully_diluted_valuation: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    total_volume: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    circulating_supply: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    total_supply: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    price_change_percentage_1h_in_currency: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    price_change_percentage_24h_in_currency: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    price_change_percentage_7d_in_currency: Option<f64>,
}

impl From<MarketItem> for QuoteStats {
    fn from(item: MarketItem) -> Self {
        QuoteStats {
            price: item.current_price,
            volume_24h: item.total_volume,
            volume_change_24h: None,
            market_cap: item.market_cap,
            fully_diluted_market_cap: item.fully_diluted_valuation,
            circulating_supply: item.circulating_supply,
            total_supply: item.total_supply,
            percent_change_1h: item.price_change_percentage_1h_in_currency,
            percent_change_24h: item.price_change_percentage_24h_in_currency,
            percent_change_7d: item.price_change_percentage_7d_in_currency,
            rank: item.market_cap_rank,
            image: item.image,
            platform: None,
        }
    }
}

pub struct CoinGeckoClient {
    client: FetchClient,
    api_key: Option<String>,
    markets_throttle: Throttle,
}

impl CoinGeckoClient {
    pub fn new(client: FetchClient, config: &ProvidersConfig) -> Self {
        Self {
            client,
            api_key: config.coingecko_api_key.clone(),
            markets_throttle: Throttle::from_rate("coingecko-markets", config.coingecko_markets),
        }
    }

    fn request(&self, path: &str) -> FetchRequest {
        let request = FetchRequest::get(API_URL).path(path);
        match &self.api_key {
            Some(key) => request.header("x-cg-demo-api-key", key.clone()),
            None => request,
        }
    }
}

#[async_trait]
impl TokenSource for CoinGeckoClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CoinGecko
    }

    async fn list_tokens(&self) -> Result<Vec<PartialToken>, FetchError> {
        let request = self.request("/coins/list").query("include_platform", true);
        let coins = self
            .client
            .fetch_json::<Response<Vec<CoinListItem>>>(&request)
            .await?;
        Ok(coins.into_iter().map(PartialToken::from).collect())
    }

    async fn get_stats(&self, ids: &[String]) -> Result<HashMap<String, QuoteStats>, FetchError> {
        let pages = ids.chunks(MARKETS_PER_PAGE).map(|chunk| {
            let request = self
                .request("/coins/markets")
                .query("vs_currency", "usd")
                .query("ids", chunk.join(","))
                .query("per_page", MARKETS_PER_PAGE)
                .query("page", 1)
                .query("price_change_percentage", "1h,24h,7d");
            async move {
                self.client
                    .fetch_json_throttled::<Response<Vec<MarketItem>>>(&self.markets_throttle, &request)
                    .await
            }
        });

        Ok(try_join_all(pages)
            .await?
            .into_iter()
            .flatten()
            .map(|item| (item.id.clone(), QuoteStats::from(item)))
            .collect())
    }
}

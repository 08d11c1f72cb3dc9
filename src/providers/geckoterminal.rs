use super::{de, unsupported_chain, PairSource, PartialExchange, PartialPair, PoolStats};
use crate::chains::{self, ChainSpec};
use crate::config::ProvidersConfig;
use crate::error::FetchError;
use crate::fetch::{collect_pages, Envelope, FetchClient, FetchRequest, Pager, Throttle};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

const API_URL: &str = "https://api.geckoterminal.com/api/v2";
const APP_URL: &str = "https://app.geckoterminal.com/api/p1";
const MAX_DEX_PAGES: usize = 20;

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    title: Option<String>,
}

/// JSON:API document: either `data` or `errors`.
#[derive(Debug, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct Document<T> {
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

impl<T: DeserializeOwned> Envelope for Document<T> {
    type Record = T;

    fn into_record(self) -> Result<T, FetchError> {
        if let Some(error) = self.errors.first() {
            return Err(FetchError::Provider(
                error.title.clone().unwrap_or_else(|| "geckoterminal error".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| FetchError::Provider("geckoterminal response without data".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct Relation {
    data: RelationId,
}

#[derive(Debug, Deserialize)]
struct RelationId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PoolRelationships {
    dex: Relation,
    base_token: Relation,
    quote_token: Relation,
}

#[derive(Debug, Deserialize)]
struct PoolAttributes {
    address: String,
    name: String,
    #[serde(default, deserialize_with = "de::opt_f64")]
    reserve_in_usd: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    base_token_price_usd: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    quote_token_price_usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PoolResource {
    attributes: PoolAttributes,
    relationships: PoolRelationships,
}

/// Token ids look like `eth_0xabc...`.
fn strip_network(network: &str, id: &str) -> String {
    id.strip_prefix(network)
        .and_then(|rest| rest.strip_prefix('_'))
        .unwrap_or(id)
        .to_lowercase()
}

impl PoolResource {
    fn into_pair(self, chain: &ChainSpec) -> PartialPair {
        let network = chain.geckoterminal_network;
        PartialPair {
            chain: chain.slug.to_string(),
            pool_address: self.attributes.address.to_lowercase(),
            name: self.attributes.name,
            dex: self.relationships.dex.data.id,
            base_address: strip_network(network, &self.relationships.base_token.data.id),
            quote_address: strip_network(network, &self.relationships.quote_token.data.id),
            reserve_usd: self.attributes.reserve_in_usd,
            base_price_usd: self.attributes.base_token_price_usd,
            quote_price_usd: self.attributes.quote_token_price_usd,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DexAttributes {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DexResource {
    id: String,
    attributes: DexAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct Window {
    #[serde(default, deserialize_with = "de::opt_i64")]
    swaps_count: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    buy_swaps_count: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    sell_swaps_count: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    volume_in_usd: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoricalData {
    #[serde(default)]
    last_24h: Window,
}

#[derive(Debug, Default, Deserialize)]
struct PriceChanges {
    #[serde(default, deserialize_with = "de::opt_f64")]
    last_24h: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PoolDetailAttributes {
    #[serde(default)]
    historical_data: HistoricalData,
    #[serde(default, deserialize_with = "de::opt_f64")]
    reserve_in_usd: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    price_in_usd: Option<f64>,
    #[serde(default)]
    price_percent_changes: PriceChanges,
}

#[derive(Debug, Deserialize)]
struct PoolDetail {
    attributes: PoolDetailAttributes,
}

impl From<PoolDetail> for PoolStats {
    fn from(detail: PoolDetail) -> Self {
        let attributes = detail.attributes;
        let day = attributes.historical_data.last_24h;
        PoolStats {
            trades_24h: day.swaps_count,
            buys_24h: day.buy_swaps_count,
            sells_24h: day.sell_swaps_count,
            volume_usd: day.volume_in_usd,
            reserve_usd: attributes.reserve_in_usd,
            price_usd: attributes.price_in_usd,
            price_change_24h: attributes.price_percent_changes.last_24h,
        }
    }
}

pub struct GeckoTerminalClient {
    client: FetchClient,
    throttle: Throttle,
}

impl GeckoTerminalClient {
    pub fn new(client: FetchClient, config: &ProvidersConfig) -> Self {
        Self {
            client,
            throttle: Throttle::from_rate("geckoterminal", config.geckoterminal),
        }
    }

    fn chain(slug: &str) -> Result<&'static ChainSpec, FetchError> {
        chains::by_slug(slug).ok_or_else(|| unsupported_chain(slug))
    }

    async fn fetch<T: DeserializeOwned>(&self, request: FetchRequest) -> Result<T, FetchError> {
        self.client
            .fetch_json_throttled::<Document<T>>(&self.throttle, &request)
            .await
    }

    async fn dex_page(&self, chain: &ChainSpec, page: usize) -> Result<Vec<PartialExchange>, FetchError> {
        let request = FetchRequest::get(API_URL)
            .path(format!("/networks/{}/dexes", chain.geckoterminal_network))
            .query("page", page);

        let dexes: Vec<DexResource> = match self.fetch(request).await {
            Ok(dexes) => dexes,
            // past the last page the API answers with an empty document
            Err(FetchError::Provider(_)) => Vec::new(),
            Err(err) => return Err(err),
        };

        Ok(dexes
            .into_iter()
            .map(|dex| PartialExchange {
                chain: chain.slug.to_string(),
                slug: dex.id,
                name: dex.attributes.name,
            })
            .collect())
    }
}

#[async_trait]
impl PairSource for GeckoTerminalClient {
    async fn list_trading_pairs_for_token(
        &self,
        chain: &str,
        address: &str,
    ) -> Result<Vec<PartialPair>, FetchError> {
        let spec = Self::chain(chain)?;
        let request = FetchRequest::get(API_URL).path(format!(
            "/networks/{}/tokens/{}/pools",
            spec.geckoterminal_network, address
        ));

        let pools: Vec<PoolResource> = self.fetch(request).await?;
        Ok(pools.into_iter().map(|pool| pool.into_pair(spec)).collect())
    }

    async fn list_exchanges(&self, chain: &str) -> Result<Vec<PartialExchange>, FetchError> {
        let spec = Self::chain(chain)?;
        collect_pages(Pager::numbered(1).max_pages(MAX_DEX_PAGES), |cursor| {
            self.dex_page(spec, cursor.offset)
        })
        .await
    }

    async fn pool_stats(&self, chain: &str, pool: &str, base_index: u8) -> Result<PoolStats, FetchError> {
        let spec = Self::chain(chain)?;
        let request = FetchRequest::get(APP_URL)
            .path(format!("/{}/pools/{}", spec.geckoterminal_network, pool))
            .query("base_token", base_index);

        let detail: PoolDetail = self.fetch(request).await?;
        Ok(detail.into())
    }
}

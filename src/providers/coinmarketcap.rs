use super::{de, ContractRef, DexSource, PartialToken, ProviderKind, QuoteStats, TokenSource};
use crate::chains;
use crate::config::ProvidersConfig;
use crate::error::FetchError;
use crate::fetch::{collect_pages, Envelope, FetchClient, FetchRequest, Pager, Throttle};
use crate::series::Timed;
use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

const CATALOG_URL: &str = "https://s3.coinmarketcap.com/generated/core/crypto/cryptos.json";
const QUOTES_URL: &str = "https://pro-api.coinmarketcap.com/v1/cryptocurrency/quotes/latest";
const DEXER_URL: &str = "https://api.coinmarketcap.com";
const LOGO_URL: &str = "https://s2.coinmarketcap.com/static/img/coins/64x64";

pub const IDS_PER_REQUEST: usize = 500;
pub const PAIR_LIST_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    fields: Vec<String>,
    values: Vec<Vec<Value>>,
}

impl Envelope for CatalogResponse {
    type Record = Vec<PartialToken>;

    fn into_record(self) -> Result<Self::Record, FetchError> {
        let column = |name: &str| self.fields.iter().position(|field| field == name);
        let required = |name: &str| {
            column(name).ok_or_else(|| FetchError::Provider(format!("catalog lacks column {}", name)))
        };

        let id = required("id")?;
        let slug = required("slug")?;
        let symbol = required("symbol")?;
        let name = required("name")?;
        let active = column("is_active");
        let rank = column("rank");
        let address = column("address");

        let text = |row: &[Value], index: usize| row.get(index).and_then(Value::as_str).map(str::to_string);

        let tokens = self
            .values
            .iter()
            .filter_map(|row| {
                let provider_id = row.get(id).and_then(Value::as_i64)?.to_string();
                let contracts = address
                    .and_then(|index| row.get(index))
                    .and_then(Value::as_array)
                    .map(|addresses| {
                        addresses
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|address| ContractRef::new(None, address))
                            .collect()
                    })
                    .unwrap_or_default();

                Some(PartialToken {
                    provider_id,
                    slug: text(row, slug)?,
                    symbol: text(row, symbol)?,
                    name: text(row, name)?,
                    rank: rank
                        .and_then(|index| row.get(index))
                        .and_then(Value::as_u64)
                        .and_then(|rank| u32::try_from(rank).ok()),
                    active: active
                        .and_then(|index| row.get(index))
                        .and_then(Value::as_i64)
                        .is_some_and(|flag| flag != 0),
                    contracts,
                })
            })
            .collect();

        Ok(tokens)
    }
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default, deserialize_with = "de::opt_i64")]
    error_code: Option<i64>,
    #[serde(default)]
    error_message: Option<String>,
}

impl ApiStatus {
    fn check(&self) -> Result<(), FetchError> {
        match self.error_code {
            Some(code) if code != 0 => Err(FetchError::Provider(
                self.error_message
                    .clone()
                    .unwrap_or_else(|| format!("error code {}", code)),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UsdQuote {
    #[serde(default, deserialize_with = "de::opt_f64")]
    price: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    volume_24h: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    volume_change_24h: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    percent_change_1h: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    percent_change_24h: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    percent_change_7d: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    market_cap: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    fully_diluted_market_cap: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct QuotePlatform {
    id: i64,
    token_address: String,
}

#[derive(Debug, Deserialize)]
struct CryptoQuote {
    id: i64,
    #[serde(default)]
    cmc_rank: Option<u32>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    circulating_supply: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    total_supply: Option<f64>,
    #[serde(default)]
    platform: Option<QuotePlatform>,
    quote: HashMap<String, UsdQuote>,
}

impl CryptoQuote {
    fn into_stats(self) -> QuoteStats {
        let usd = self.quote.get("USD");
        let pick = |field: fn(&UsdQuote) -> Option<f64>| usd.and_then(field);

        QuoteStats {
            price: pick(|q| q.price),
            volume_24h: pick(|q| q.volume_24h),
            volume_change_24h: pick(|q| q.volume_change_24h),
            market_cap: pick(|q| q.market_cap),
            fully_diluted_market_cap: pick(|q| q.fully_diluted_market_cap),
            circulating_supply: self.circulating_supply,
            total_supply: self.total_supply,
            percent_change_1h: pick(|q| q.percent_change_1h),
            percent_change_24h: pick(|q| q.percent_change_24h),
            percent_change_7d: pick(|q| q.percent_change_7d),
            rank: self.cmc_rank,
            image: Some(format!("{}/{}.png", LOGO_URL, self.id)),
            platform: self.platform.as_ref().and_then(|platform| {
                chains::by_native_cmc_id(platform.id)
                    .map(|chain| ContractRef::new(Some(chain.slug), &platform.token_address))
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuotesResponse {
    status: ApiStatus,
    #[serde(default)]
    data: Option<HashMap<String, CryptoQuote>>,
}

impl Envelope for QuotesResponse {
    type Record = HashMap<String, QuoteStats>;

    fn into_record(self) -> Result<Self::Record, FetchError> {
        self.status.check()?;
        let data = self
            .data
            .ok_or_else(|| FetchError::Provider("quotes response without data".to_string()))?;

        Ok(data
            .into_iter()
            .map(|(id, quote)| (id, quote.into_stats()))
            .collect())
    }
}

/// `{data, status}` wrapper of the public dexer endpoints.
#[derive(Debug, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct DexerResponse<T> {
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    status: Option<ApiStatus>,
}

impl<T: DeserializeOwned> Envelope for DexerResponse<T> {
    type Record = Option<T>;

    fn into_record(self) -> Result<Self::Record, FetchError> {
        if let Some(status) = &self.status {
            status.check()?;
        }
        Ok(self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformRef {
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub id: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One row of the pair list, passed through with the fields we sort and
/// filter on decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairListEntry {
    pub platform: PlatformRef,
    #[serde(rename = "volume24h", default, deserialize_with = "de::opt_f64")]
    pub volume_24h: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DexTransaction {
    #[serde(rename = "pairId", default)]
    pub pair_id: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(deserialize_with = "de::i64_lenient")]
    pub time: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Timed for DexTransaction {
    fn time(&self) -> i64 {
        self.time
    }
}

#[derive(Debug, Default, Deserialize)]
struct TransactionsData {
    #[serde(default)]
    transactions: Vec<DexTransaction>,
}

/// `pairId_reverseOrder_from`, e.g. `12345_true_1690000000`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairRef {
    pub pair_id: String,
    pub reverse_order: bool,
    pub from: Option<String>,
}

impl FromStr for PairRef {
    type Err = FetchError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut parts = raw.split('_');
        let pair_id = parts
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| FetchError::Provider(format!("invalid pair reference {:?}", raw)))?;

        Ok(PairRef {
            pair_id: pair_id.to_string(),
            reverse_order: parts.next() == Some("true"),
            from: parts.next().filter(|from| !from.is_empty()).map(str::to_string),
        })
    }
}

pub struct CoinMarketCapClient {
    client: FetchClient,
    api_key: Option<String>,
    user_agent: String,
    stats_throttle: Throttle,
    dexer_throttle: Throttle,
}

impl CoinMarketCapClient {
    pub fn new(client: FetchClient, config: &ProvidersConfig) -> Self {
        Self {
            client,
            api_key: config.cmc_api_key.clone(),
            user_agent: config.user_agent.clone(),
            stats_throttle: Throttle::from_rate("cmc-stats", config.cmc_stats),
            dexer_throttle: Throttle::from_rate("cmc-dexer", config.cmc_dexer),
        }
    }

    fn dexer(&self, path: impl Into<String>) -> FetchRequest {
        FetchRequest::get(DEXER_URL)
            .path(path)
            .header("user-agent", self.user_agent.clone())
            .header("accept-encoding", "gzip, deflate, br")
    }

    async fn pair_list_page(
        &self,
        address: &str,
        platform_id: u32,
        start: usize,
        limit: usize,
    ) -> Result<Vec<PairListEntry>, FetchError> {
        let request = self
            .dexer("/dexer/v3/dexer/pair-list")
            .query("base-address", address)
            .query("start", start)
            .query("limit", limit)
            .query("platform-id", platform_id);

        let page = self
            .client
            .fetch_json_throttled::<DexerResponse<Vec<PairListEntry>>>(&self.dexer_throttle, &request)
            .await?;
        Ok(page.unwrap_or_default())
    }
}

#[async_trait]
impl TokenSource for CoinMarketCapClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CoinMarketCap
    }

    async fn list_tokens(&self) -> Result<Vec<PartialToken>, FetchError> {
        let request = FetchRequest::get(CATALOG_URL);
        self.client.fetch_json::<CatalogResponse>(&request).await
    }

    async fn get_stats(&self, ids: &[String]) -> Result<HashMap<String, QuoteStats>, FetchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FetchError::Provider("CMC_API_KEY is not configured".to_string()))?;

        let chunks = ids.chunks(IDS_PER_REQUEST).map(|chunk| {
            let request = FetchRequest::get(QUOTES_URL)
                .query("id", chunk.join(","))
                .header("X-CMC_PRO_API_KEY", api_key);
            async move {
                self.client
                    .fetch_json_throttled::<QuotesResponse>(&self.stats_throttle, &request)
                    .await
            }
        });

        let responses = try_join_all(chunks).await?;
        let stats: HashMap<String, QuoteStats> = responses.into_iter().flatten().collect();
        debug!(requested = ids.len(), received = stats.len(), "cmc quotes fetched");
        Ok(stats)
    }
}

#[async_trait]
impl DexSource for CoinMarketCapClient {
    async fn pair_info(&self, platform: &str, address: &str) -> Result<Option<Value>, FetchError> {
        let request = self
            .dexer("/dexer/v3/dexer/pair-info")
            .query("base", 0)
            .query("t", chrono::Utc::now().timestamp_millis())
            .query("dexer-platform-name", platform)
            .query("address", address);

        self.client
            .fetch_json_throttled::<DexerResponse<Value>>(&self.dexer_throttle, &request)
            .await
    }

    async fn pair_list(&self, address: &str, platform_id: u32) -> Result<Vec<PairListEntry>, FetchError> {
        collect_pages(Pager::offset(1, PAIR_LIST_PAGE_SIZE), |cursor| {
            self.pair_list_page(address, platform_id, cursor.offset, cursor.size)
        })
        .await
    }

    async fn transactions(&self, platform_id: u32, pair: &PairRef) -> Result<Vec<DexTransaction>, FetchError> {
        let mut request = self
            .dexer(format!("/kline/v3/k-line/transactions/{}/{}", platform_id, pair.pair_id))
            .query("reverse-order", pair.reverse_order);
        if let Some(from) = &pair.from {
            request = request.query("from", from);
        }

        let data = self
            .client
            .fetch_json_throttled::<DexerResponse<TransactionsData>>(&self.dexer_throttle, &request)
            .await?
            .unwrap_or_default();

        let exchange = chains::by_cmc_platform_id(platform_id)
            .map(|chain| chain.dex_label)
            .unwrap_or_default();

        Ok(data
            .transactions
            .into_iter()
            .map(|mut tx| {
                tx.pair_id = pair.pair_id.clone();
                tx.exchange = exchange.to_string();
                tx
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalog_decodes_by_field_position() {
        let body = json!({
            "fields": ["id", "name", "symbol", "slug", "is_active", "rank", "address"],
            "values": [
                [1027, "Ethereum", "ETH", "ethereum", 1, 2, []],
                [24478, "Pepe", "PEPE", "pepe", 1, 40, ["0x6982508145454Ce325dDbE47a25d4ec3d2311933"]],
                ["broken", "x", "X", "x", 1, 1, []]
            ]
        });

        let tokens = serde_json::from_value::<CatalogResponse>(body)
            .unwrap()
            .into_record()
            .unwrap();

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].provider_id, "24478");
        assert_eq!(tokens[1].rank, Some(40));
        assert!(tokens[1].active);
        assert_eq!(
            tokens[1].contracts,
            vec![ContractRef::new(None, "0x6982508145454ce325ddbe47a25d4ec3d2311933")]
        );
    }

    #[test]
    fn test_catalog_without_id_column_is_provider_error() {
        let body = json!({ "fields": ["name"], "values": [] });
        let result = serde_json::from_value::<CatalogResponse>(body).unwrap().into_record();
        assert!(matches!(result, Err(FetchError::Provider(_))));
    }

    #[test]
    fn test_quotes_envelope() {
        let body = json!({
            "status": { "error_code": 0, "error_message": null },
            "data": {
                "24478": {
                    "id": 24478,
                    "cmc_rank": 40,
                    "circulating_supply": 420690000000000.0,
                    "total_supply": 420690000000000.0,
                    "platform": { "id": 1027, "token_address": "0x6982508145454Ce325dDbE47a25d4ec3d2311933" },
                    "quote": { "USD": {
                        "price": 0.0000012,
                        "volume_24h": null,
                        "percent_change_1h": 0.1,
                        "percent_change_24h": 2.0,
                        "market_cap": 500000000.0
                    } }
                }
            }
        });

        let stats = serde_json::from_value::<QuotesResponse>(body)
            .unwrap()
            .into_record()
            .unwrap();
        let pepe = &stats["24478"];

        assert_eq!(pepe.volume_24h, None);
        assert!(!pepe.is_usable());
        assert_eq!(
            pepe.platform,
            Some(ContractRef::new(Some("ethereum"), "0x6982508145454ce325ddbe47a25d4ec3d2311933"))
        );
    }

    #[test]
    fn test_quotes_error_code_is_provider_error() {
        let body = json!({ "status": { "error_code": 1002, "error_message": "API key missing." } });
        let result = serde_json::from_value::<QuotesResponse>(body).unwrap().into_record();
        match result {
            Err(FetchError::Provider(message)) => assert_eq!(message, "API key missing."),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_dexer_status_string_code() {
        let body = json!({ "data": null, "status": { "error_code": "500", "error_message": "busy" } });
        let result = serde_json::from_value::<DexerResponse<Value>>(body).unwrap().into_record();
        assert!(result.is_err());

        let body = json!({ "data": { "address": "0xabc" }, "status": { "error_code": "0" } });
        let data = serde_json::from_value::<DexerResponse<Value>>(body).unwrap().into_record().unwrap();
        assert_eq!(data, Some(json!({ "address": "0xabc" })));
    }

    #[test]
    fn test_pair_ref_format() {
        let full: PairRef = "778_true_1690000000".parse().unwrap();
        assert_eq!(full.pair_id, "778");
        assert!(full.reverse_order);
        assert_eq!(full.from.as_deref(), Some("1690000000"));

        let bare: PairRef = "778".parse().unwrap();
        assert!(!bare.reverse_order);
        assert_eq!(bare.from, None);

        assert!("".parse::<PairRef>().is_err());
    }

    #[test]
    fn test_pair_list_entry_keeps_unknown_fields() {
        let entry: PairListEntry = serde_json::from_value(json!({
            "platform": { "id": 1, "name": "Ethereum" },
            "volume24h": "1234.5",
            "pairContractAddress": "0xpool"
        }))
        .unwrap();

        assert_eq!(entry.platform.id, Some(1));
        assert_eq!(entry.volume_24h, Some(1234.5));

        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back["pairContractAddress"], "0xpool");
        assert_eq!(back["platform"]["name"], "Ethereum");
    }

    #[test]
    fn test_transaction_time_accepts_strings() {
        let tx: DexTransaction = serde_json::from_value(json!({ "time": "1690000000", "txn": "0x1" })).unwrap();
        assert_eq!(tx.time, 1690000000);
        assert_eq!(tx.extra["txn"], "0x1");
    }
}

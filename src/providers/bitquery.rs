use super::{de, unsupported_chain, TraderSource, UniqueTraders};
use crate::chains;
use crate::config::ProvidersConfig;
use crate::error::FetchError;
use crate::fetch::{Envelope, FetchClient, FetchRequest, Throttle};
use crate::series::Point;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

const GRAPHQL_URL: &str = "https://graphql.bitquery.io/";
const DATE_FORMAT: &str = "%Y-%m-%d";

const UNIQUE_BUYERS_QUERY: &str = r#"query ($network: EthereumNetwork!, $dateFormat: String!, $address: String!, $currency: String!, $date: ISO8601DateTime!) {
  ethereum(network: $network) {
    dexTrades(options: {asc: "date.date"}, date: {is: $date}, smartContractAddress: {is: $address}, buyCurrency: {is: $currency}) {
      date: date { date(format: $dateFormat) }
      senders: countBigInt(uniq: senders)
    }
  }
}"#;

const UNIQUE_SELLERS_QUERY: &str = r#"query ($network: EthereumNetwork!, $dateFormat: String!, $address: String!, $currency: String!, $date: ISO8601DateTime!) {
  ethereum(network: $network) {
    dexTrades(options: {asc: "date.date"}, date: {is: $date}, smartContractAddress: {is: $address}, sellCurrency: {is: $currency}) {
      date: date { date(format: $dateFormat) }
      senders: countBigInt(uniq: senders)
    }
  }
}"#;

const DAILY_SWAPS_QUERY: &str = r#"query ($network: EthereumNetwork!, $dateFormat: String!, $currency: String!, $since: ISO8601DateTime!) {
  ethereum(network: $network) {
    dexTrades(options: {asc: "date.date"}, date: {since: $since}, baseCurrency: {is: $currency}) {
      date: date { date(format: $dateFormat) }
      trades: count
    }
  }
}"#;

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct GraphQlResponse<T> {
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

impl<T: DeserializeOwned> Envelope for GraphQlResponse<T> {
    type Record = T;

    fn into_record(self) -> Result<T, FetchError> {
        if !self.errors.is_empty() {
            let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(FetchError::Provider(messages.join("; ")));
        }
        self.data
            .ok_or_else(|| FetchError::Provider("graphql response without data".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct DayLabel {
    date: String,
}

#[derive(Debug, Deserialize)]
struct TradeRow {
    date: DayLabel,
    #[serde(default, deserialize_with = "de::opt_i64")]
    senders: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    trades: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct EthereumData {
    #[serde(rename = "dexTrades", default)]
    dex_trades: Option<Vec<TradeRow>>,
}

#[derive(Debug, Deserialize)]
struct TradesData {
    ethereum: EthereumData,
}

fn day_to_millis(label: &str) -> Option<i64> {
    let date = NaiveDate::parse_from_str(label, DATE_FORMAT).ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

fn rows_to_points(rows: Vec<TradeRow>) -> Vec<Point> {
    let mut points: Vec<Point> = rows
        .into_iter()
        .filter_map(|row| Some(Point::new(day_to_millis(&row.date.date)?, row.trades?)))
        .collect();
    points.sort_by_key(|point| point.t);
    points
}

pub struct BitQueryClient {
    client: FetchClient,
    api_key: Option<String>,
    throttle: Throttle,
}

impl BitQueryClient {
    pub fn new(client: FetchClient, config: &ProvidersConfig) -> Self {
        Self {
            client,
            api_key: config.bitquery_api_key.clone(),
            throttle: Throttle::from_rate("bitquery", config.bitquery),
        }
    }

    fn network(chain: &str) -> Result<&'static str, FetchError> {
        chains::by_slug(chain)
            .map(|spec| spec.bitquery_network)
            .ok_or_else(|| unsupported_chain(chain))
    }

    async fn query(&self, query: &str, variables: serde_json::Value) -> Result<Vec<TradeRow>, FetchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FetchError::Provider("BITQUERY_API_KEY is not configured".to_string()))?;

        let request = FetchRequest::post_json(GRAPHQL_URL, json!({ "query": query, "variables": variables }))
            .header("accept", "application/json")
            .header("x-api-key", api_key);

        let data = self
            .client
            .fetch_json_throttled::<GraphQlResponse<TradesData>>(&self.throttle, &request)
            .await?;
        Ok(data.ethereum.dex_trades.unwrap_or_default())
    }

    async fn unique_senders(
        &self,
        query: &str,
        network: &str,
        pool: &str,
        token: &str,
        date: NaiveDate,
    ) -> Result<i64, FetchError> {
        let rows = self
            .query(
                query,
                json!({
                    "network": network,
                    "address": pool,
                    "currency": token,
                    "date": date.format(DATE_FORMAT).to_string(),
                    "dateFormat": DATE_FORMAT,
                }),
            )
            .await?;
        Ok(rows.first().and_then(|row| row.senders).unwrap_or(0))
    }
}

#[async_trait]
impl TraderSource for BitQueryClient {
    async fn unique_traders(
        &self,
        chain: &str,
        pool: &str,
        token: &str,
        date: NaiveDate,
    ) -> Result<UniqueTraders, FetchError> {
        let network = Self::network(chain)?;
        let buyers = self
            .unique_senders(UNIQUE_BUYERS_QUERY, network, pool, token, date)
            .await?;
        let sellers = self
            .unique_senders(UNIQUE_SELLERS_QUERY, network, pool, token, date)
            .await?;
        Ok(UniqueTraders { buyers, sellers })
    }

    async fn daily_swaps(&self, chain: &str, token: &str, since: NaiveDate) -> Result<Vec<Point>, FetchError> {
        let network = Self::network(chain)?;
        let rows = self
            .query(
                DAILY_SWAPS_QUERY,
                json!({
                    "network": network,
                    "currency": token,
                    "since": since.format(DATE_FORMAT).to_string(),
                    "dateFormat": DATE_FORMAT,
                }),
            )
            .await?;
        Ok(rows_to_points(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphql_errors_are_provider_errors() {
        let body = json!({ "data": null, "errors": [{ "message": "Limit exceeded" }] });
        let result = serde_json::from_value::<GraphQlResponse<TradesData>>(body)
            .unwrap()
            .into_record();
        assert!(matches!(result, Err(FetchError::Provider(message)) if message == "Limit exceeded"));
    }

    #[test]
    fn test_sender_counts_are_strings() {
        let body = json!({ "data": { "ethereum": { "dexTrades": [
            { "date": { "date": "2024-03-01" }, "senders": "311" }
        ] } } });
        let data = serde_json::from_value::<GraphQlResponse<TradesData>>(body)
            .unwrap()
            .into_record()
            .unwrap();
        let rows = data.ethereum.dex_trades.unwrap();
        assert_eq!(rows[0].senders, Some(311));
    }

    #[test]
    fn test_daily_rows_become_sorted_points() {
        let rows: Vec<TradeRow> = serde_json::from_value(json!([
            { "date": { "date": "2024-03-02" }, "trades": 20 },
            { "date": { "date": "2024-03-01" }, "trades": 12 },
            { "date": { "date": "garbage" }, "trades": 1 }
        ]))
        .unwrap();

        let points = rows_to_points(rows);
        assert_eq!(
            points,
            vec![Point::new(1709251200000, 12), Point::new(1709337600000, 20)]
        );
    }

    #[test]
    fn test_empty_network_answer() {
        let body = json!({ "data": { "ethereum": { "dexTrades": null } } });
        let data = serde_json::from_value::<GraphQlResponse<TradesData>>(body)
            .unwrap()
            .into_record()
            .unwrap();
        assert!(data.ethereum.dex_trades.is_none());
    }
}

use super::{unsupported_chain, HolderSource};
use crate::chains;
use crate::config::ProvidersConfig;
use crate::error::FetchError;
use crate::fetch::{FetchClient, FetchRequest, Throttle};
use crate::series::Point;
use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

type Compiled = Result<Regex, regex::Error>;

fn compiled(pattern: &'static Compiled) -> Result<&'static Regex, FetchError> {
    pattern
        .as_ref()
        .map_err(|e| FetchError::Provider(format!("holders pattern: {}", e)))
}

fn plot_regex() -> Result<&'static Regex, FetchError> {
    static PLOT: OnceLock<Compiled> = OnceLock::new();
    compiled(PLOT.get_or_init(|| Regex::new(r"var holdersplotData = \[(.+?)\];")))
}

fn entry_regex() -> Result<&'static Regex, FetchError> {
    static ENTRY: OnceLock<Compiled> = OnceLock::new();
    compiled(ENTRY.get_or_init(|| {
        Regex::new(r"Date\.UTC\(\s*(\d{4})\s*,\s*(\d{1,2})\s*,\s*(\d{1,2})\s*\)[^}]*?\by\s*:\s*(\d+)")
    }))
}

/// Extracts the holder-count chart embedded in an explorer token page.
/// `Date.UTC` months are zero based; zero counts are skipped.
pub fn parse_holders_plot(page: &str) -> Result<Vec<Point>, FetchError> {
    let plot = plot_regex()?
        .captures(page)
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| FetchError::Provider("holders chart not found on explorer page".to_string()))?;

    let mut points: Vec<Point> = entry_regex()?
        .captures_iter(plot.as_str())
        .filter_map(|captures| {
            let year: i32 = captures[1].parse().ok()?;
            let month: u32 = captures[2].parse().ok()?;
            let day: u32 = captures[3].parse().ok()?;
            let holders: i64 = captures[4].parse().ok()?;

            let t = NaiveDate::from_ymd_opt(year, month + 1, day)?
                .and_hms_opt(0, 0, 0)?
                .and_utc()
                .timestamp_millis();
            (holders > 0).then_some(Point::new(t, holders))
        })
        .collect();

    points.sort_by_key(|point| point.t);
    Ok(points)
}

pub struct EtherscanClient {
    client: FetchClient,
    throttle: Throttle,
}

impl EtherscanClient {
    pub fn new(client: FetchClient, config: &ProvidersConfig) -> Self {
        Self {
            client,
            throttle: Throttle::from_rate("etherscan", config.etherscan),
        }
    }
}

#[async_trait]
impl HolderSource for EtherscanClient {
    async fn holders(&self, chain: &str, address: &str) -> Result<Vec<Point>, FetchError> {
        let spec = chains::by_slug(chain).ok_or_else(|| unsupported_chain(chain))?;
        let request = FetchRequest::get(spec.explorer_url).path(format!("/token/{}", address));

        let page = self.client.fetch_text_throttled(&self.throttle, &request).await?;
        parse_holders_plot(&page)
    }
}

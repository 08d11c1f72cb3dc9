use super::Throttle;
use crate::error::FetchError;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

const MIRROR_SUFFIX: &str = "translate.goog";

/// A provider response shape: decoded as-is, then validated into either a
/// usable record or a provider-reported error.
pub trait Envelope: DeserializeOwned {
    type Record;

    fn into_record(self) -> Result<Self::Record, FetchError>;
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub base: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub forced_url: Option<String>,
}

impl FetchRequest {
    pub fn get(base: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            base: base.into(),
            path: String::new(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            forced_url: None,
        }
    }

    pub fn post_json(base: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get(base)
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    pub fn forced_url(mut self, url: impl Into<String>) -> Self {
        self.forced_url = Some(url.into());
        self
    }

    /// The URL the first attempt goes to, without query parameters.
    pub fn target(&self) -> Result<Url, FetchError> {
        let raw = match &self.forced_url {
            Some(forced) => forced.clone(),
            None => format!("{}{}", self.base.trim_end_matches('/'), self.path),
        };
        Url::parse(&raw).map_err(|_| FetchError::InvalidUrl(raw))
    }
}

/// Rewrites `api.example.com` into `api-example-com.translate.goog`.
pub fn mirror_url(target: &Url) -> Result<Url, FetchError> {
    let host = target
        .host_str()
        .ok_or_else(|| FetchError::InvalidUrl(target.to_string()))?;
    if host.ends_with(MIRROR_SUFFIX) {
        return Err(FetchError::InvalidUrl(target.to_string()));
    }

    let mirrored = format!("{}.{}", host.replace('-', "--").replace('.', "-"), MIRROR_SUFFIX);
    let mut url = target.clone();
    url.set_host(Some(&mirrored))
        .map_err(|_| FetchError::InvalidUrl(target.to_string()))?;
    Ok(url)
}

fn parse_envelope<E: Envelope>(body: String) -> Result<E::Record, FetchError> {
    serde_json::from_str::<E>(&body)?.into_record()
}

fn loggable(url: &Url) -> String {
    format!("{}://{}{}", url.scheme(), url.host_str().unwrap_or_default(), url.path())
}

/// Maps a failed target to the URL of its single retry.
pub type MirrorFn = fn(&Url) -> Result<Url, FetchError>;

#[derive(Clone)]
pub struct FetchClient {
    http: reqwest::Client,
    mirror: MirrorFn,
}

impl FetchClient {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            http,
            mirror: mirror_url,
        })
    }

    /// Replaces the [`mirror_url`] rewrite.
    pub fn with_mirror_fn(mut self, mirror: MirrorFn) -> Self {
        self.mirror = mirror;
        self
    }

    pub async fn fetch_text(&self, request: &FetchRequest) -> Result<String, FetchError> {
        self.attempt(request, None, Ok).await
    }

    pub async fn fetch_json<E: Envelope>(&self, request: &FetchRequest) -> Result<E::Record, FetchError> {
        self.attempt(request, None, parse_envelope::<E>).await
    }

    /// Like [`fetch_text`](Self::fetch_text), with every attempt admitted by
    /// `throttle`.
    pub async fn fetch_text_throttled(
        &self,
        throttle: &Throttle,
        request: &FetchRequest,
    ) -> Result<String, FetchError> {
        self.attempt(request, Some(throttle), Ok).await
    }

    /// Like [`fetch_json`](Self::fetch_json), with every attempt admitted by
    /// `throttle`.
    pub async fn fetch_json_throttled<E: Envelope>(
        &self,
        throttle: &Throttle,
        request: &FetchRequest,
    ) -> Result<E::Record, FetchError> {
        self.attempt(request, Some(throttle), parse_envelope::<E>).await
    }

    /// One attempt against the target, then exactly one against its mirror.
    /// The mirror attempt takes its own admission.
    async fn attempt<T, P>(
        &self,
        request: &FetchRequest,
        throttle: Option<&Throttle>,
        parse: P,
    ) -> Result<T, FetchError>
    where
        P: Fn(String) -> Result<T, FetchError>,
    {
        let target = request.target()?;

        if let Some(throttle) = throttle {
            throttle.acquire().await;
        }
        let err = match self.send(request, target.clone()).await.and_then(&parse) {
            Ok(record) => return Ok(record),
            Err(err) => err,
        };

        let mirror = (self.mirror)(&target)?;
        debug!(error = %err, target = %loggable(&target), "mirror request");

        if let Some(throttle) = throttle {
            throttle.acquire().await;
        }
        self.send(request, mirror).await.and_then(parse)
    }

    async fn send(&self, request: &FetchRequest, url: Url) -> Result<String, FetchError> {
        let mut builder = self.http.request(request.method.clone(), url.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                target: loggable(&url),
            });
        }

        Ok(response.text().await?)
    }
}

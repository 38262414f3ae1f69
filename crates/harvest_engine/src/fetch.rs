use std::borrow::Cow;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use harvest_logging::{harvest_debug, harvest_warn};
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use url::Url;

use crate::cache::ResponseCache;
use crate::decode::decode_body;
use crate::retry::RetryPolicy;
use crate::{FailureKind, FetchError};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_bytes: u64,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            max_bytes: 20 * 1024 * 1024,
            user_agent: concat!("archive-index-harvester/", env!("CARGO_PKG_VERSION")).to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

impl RequestBody {
    fn content_type(&self) -> &'static str {
        match self {
            RequestBody::Json(_) => "application/json",
            RequestBody::Form(_) => "application/x-www-form-urlencoded",
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        match self {
            RequestBody::Json(value) => value.to_string().into_bytes(),
            RequestBody::Form(pairs) => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish()
                .into_bytes(),
        }
    }
}

/// One GET or POST, plus the cache partition its response belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub cache_namespace: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            body: None,
            cache_namespace: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            body: Some(RequestBody::Json(body)),
            ..Self::get(url)
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cache_namespace = Some(namespace.into());
        self
    }

    /// The request URL with the query pairs appended.
    pub fn full_url(&self) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }

    /// Content address of the request: hex SHA-256 over method, url, query and body.
    pub fn signature(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(match self.method {
            Method::Get => b"GET ".as_slice(),
            Method::Post => b"POST ".as_slice(),
        });
        hasher.update(self.url.as_bytes());
        for (key, value) in &self.query {
            hasher.update(b"\n");
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        if let Some(body) = &self.body {
            hasher.update(b"\n\n");
            hasher.update(body.to_bytes());
        }
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest.iter() {
            let _ = write!(&mut hex, "{byte:02x}");
        }
        hex
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub final_url: String,
    pub from_cache: bool,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> Cow<'_, str> {
        decode_body(&self.body, self.content_type.as_deref())
    }
}

/// Decides whether a successful response may be stored in the cache.
pub type CacheFilter = Arc<dyn Fn(&FetchResponse) -> bool + Send + Sync>;

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs the request, possibly answering from cache. Non-2xx statuses
    /// that survive the retry policy are errors.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;

    /// Drops any cached response for `request`.
    fn evict(&self, _request: &FetchRequest) -> Result<(), FetchError> {
        Ok(())
    }

    /// Drops every cached response in `namespace`.
    fn clear_namespace(&self, _namespace: &str) -> Result<(), FetchError> {
        Ok(())
    }
}

pub struct ReqwestFetcher {
    settings: FetchSettings,
    client: reqwest::Client,
    cache: Option<ResponseCache>,
    cache_filter: Option<CacheFilter>,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            settings,
            client,
            cache: None,
            cache_filter: None,
        })
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_cache_filter(mut self, filter: CacheFilter) -> Self {
        self.cache_filter = Some(filter);
        self
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    fn is_cacheable(&self, response: &FetchResponse) -> bool {
        response.is_success()
            && self
                .cache_filter
                .as_ref()
                .map_or(true, |filter| filter(response))
    }

    async fn send_once(&self, request: &FetchRequest, url: &Url) -> Result<FetchResponse, FetchError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let mut builder = self.client.request(method, url.clone());
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, body.content_type())
                .body(body.to_bytes());
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = body.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchResponse {
            status,
            body,
            content_type,
            final_url,
            from_cache: false,
        })
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.load(request)? {
                harvest_debug!("cache hit {}", request.url);
                return Ok(hit);
            }
        }

        let url = request.full_url()?;
        let retry = &self.settings.retry;
        let mut attempt = 1;
        loop {
            let outcome = self.send_once(request, &url).await;
            let retryable = match &outcome {
                Ok(response) if response.is_success() => false,
                Ok(response) => retry.should_retry_status(response.status),
                Err(err) => matches!(err.kind, FailureKind::Timeout | FailureKind::Network),
            };

            if retryable && attempt < retry.max_attempts.max(1) {
                let delay = retry.delay_for_attempt(attempt);
                harvest_warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    url,
                    attempt,
                    retry.max_attempts,
                    describe(&outcome),
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let response = outcome?;
            if !response.is_success() {
                return Err(FetchError::new(
                    FailureKind::HttpStatus(response.status),
                    format!("{} returned {}", url, response.status),
                ));
            }
            if let Some(cache) = &self.cache {
                if self.is_cacheable(&response) {
                    cache.store(request, &response)?;
                }
            }
            return Ok(response);
        }
    }

    fn evict(&self, request: &FetchRequest) -> Result<(), FetchError> {
        match &self.cache {
            Some(cache) => cache.evict(request),
            None => Ok(()),
        }
    }

    fn clear_namespace(&self, namespace: &str) -> Result<(), FetchError> {
        match &self.cache {
            Some(cache) => cache.clear_namespace(namespace),
            None => Ok(()),
        }
    }
}

fn describe(outcome: &Result<FetchResponse, FetchError>) -> String {
    match outcome {
        Ok(response) => format!("status {}", response.status),
        Err(err) => err.to_string(),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}

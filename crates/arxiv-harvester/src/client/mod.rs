//! HTTP client for the arXiv OAI-PMH and INSPIRE-HEP endpoints.
//!
//! Provides an async HTTP client with:
//! - Connection pooling via reqwest
//! - Request tracing middleware
//! - A shared `governor` rate limiter for citation lookups
//!
//! Status codes are handed back to the caller untouched: a 503 from arXiv is
//! a protocol message for the harvest cursor, not a transport failure.

mod middleware;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};

pub use middleware::RequestTracing;

use crate::config::{Config, api};
use crate::enrich::CitationSource;
use crate::error::{ClientError, ClientResult};
use crate::harvest::PageSource;

/// A response reduced to what the harvester inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl FetchedPage {
    /// Create a page from a status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Client shared by the harvest cursor and the citation workers.
#[derive(Clone)]
pub struct HarvestClient {
    /// HTTP client with middleware.
    client: ClientWithMiddleware,

    /// OAI-PMH base URL.
    oai_base_url: String,

    /// Citation search URL.
    citation_api_url: String,

    /// Citation results per request.
    citation_page_size: u32,

    /// Citation request budget, shared across clones.
    citation_limiter: Option<Arc<DefaultDirectRateLimiter>>,

    /// Reported in timeout errors.
    request_timeout: Duration,
}

impl HarvestClient {
    /// Create a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("arxiv-harvester/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(api::MAX_KEEPALIVE)
            .pool_idle_timeout(api::KEEPALIVE_EXPIRY)
            .gzip(true)
            .build()?;

        let client = ClientBuilder::new(client).with(RequestTracing).build();

        let citation_limiter = config
            .citation_rate_limit
            .map(|per_second| Arc::new(RateLimiter::direct(Quota::per_second(per_second))));

        Ok(Self {
            client,
            oai_base_url: config.oai_base_url.clone(),
            citation_api_url: config.citation_api_url.clone(),
            citation_page_size: config.citation_page_size,
            citation_limiter,
            request_timeout: config.request_timeout,
        })
    }

    /// Fetch one OAI-PMH page by its full URL.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure; HTTP error statuses are not errors.
    pub async fn get_page(&self, url: &str) -> ClientResult<FetchedPage> {
        let response = self.client.get(url).send().await.map_err(|e| self.classify(e))?;
        self.read_page(response).await
    }

    /// Fetch one window of citing records for an arXiv identifier.
    ///
    /// `start` is the 1-based offset of the first result.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure; HTTP error statuses are not errors.
    pub async fn search_citations(&self, arxiv_id: &str, start: u32) -> ClientResult<FetchedPage> {
        if let Some(limiter) = &self.citation_limiter {
            limiter.until_ready().await;
        }

        let params = [
            ("p", format!("refersto:arxiv:{arxiv_id}")),
            ("of", api::CITATION_FORMAT.to_string()),
            ("rg", self.citation_page_size.to_string()),
            ("jrec", start.to_string()),
        ];

        let response = self
            .client
            .get(&self.citation_api_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        self.read_page(response).await
    }

    async fn read_page(&self, response: reqwest::Response) -> ClientResult<FetchedPage> {
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.classify(e.into()))?;
        Ok(FetchedPage { status, body })
    }

    /// Surface timeouts as their own variant.
    fn classify(&self, err: reqwest_middleware::Error) -> ClientError {
        match err {
            reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => {
                ClientError::Timeout(self.request_timeout)
            }
            other => ClientError::from(other),
        }
    }
}

#[async_trait]
impl PageSource for HarvestClient {
    fn base_url(&self) -> &str {
        &self.oai_base_url
    }

    async fn fetch(&self, url: &str) -> ClientResult<FetchedPage> {
        self.get_page(url).await
    }
}

#[async_trait]
impl CitationSource for HarvestClient {
    fn page_size(&self) -> u32 {
        self.citation_page_size
    }

    async fn fetch_citations(&self, arxiv_id: &str, start: u32) -> ClientResult<FetchedPage> {
        self.search_citations(arxiv_id, start).await
    }
}

impl std::fmt::Debug for HarvestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarvestClient")
            .field("oai_base_url", &self.oai_base_url)
            .field("citation_api_url", &self.citation_api_url)
            .field("rate_limited", &self.citation_limiter.is_some())
            .finish()
    }
}

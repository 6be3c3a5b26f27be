//! Configuration for the arXiv harvester.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::Context;

/// API configuration constants.
pub mod api {
    use std::time::Duration;

    /// arXiv OAI-PMH endpoint.
    pub const OAI_BASE_URL: &str = "http://export.arxiv.org/oai2";

    /// OAI verb for record listing.
    pub const LIST_RECORDS: &str = "ListRecords";

    /// Metadata format requested from arXiv.
    pub const METADATA_PREFIX: &str = "arXiv";

    /// INSPIRE-HEP search endpoint used for citation lookups.
    pub const CITATION_API: &str = "https://old.inspirehep.net/search";

    /// Output format for citation searches (MARCXML, one `record` per hit).
    pub const CITATION_FORMAT: &str = "xm";

    /// Citation results per page (INSPIRE caps `rg` at 250).
    pub const CITATION_PAGE_SIZE: u32 = 250;

    /// Request timeout. arXiv pages of 1000 records can be slow to assemble.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Maximum idle connections per host.
    pub const MAX_KEEPALIVE: usize = 10;

    /// Keepalive expiry.
    pub const KEEPALIVE_EXPIRY: Duration = Duration::from_secs(30);

    /// Default number of citation workers.
    pub const DEFAULT_CONCURRENCY: usize = 4;
}

/// Record field names.
pub mod fields {
    /// Sentinel meaning "every field in [`TEMPLATE`]".
    pub const EVERYTHING: &str = "everything";

    /// Fields harvested when the sentinel is requested, in column order.
    pub const TEMPLATE: &[&str] = &[
        "id",
        "title",
        "abstract",
        "author",
        "setSpec",
        "categories",
        "created",
        "updated",
        "comments",
        "doi",
        "datestamp",
    ];

    /// Fields post-processing parses into timestamps.
    pub const TIMESTAMPS: &[&str] = &["created", "updated", "datestamp"];

    /// Identifier field used for citation lookups.
    pub const ID: &str = "id";

    /// Repeatable author field.
    pub const AUTHOR: &str = "author";

    /// Whitespace-separated category field.
    pub const CATEGORIES: &str = "categories";

    /// Derived author count column.
    pub const N_AUTHORS: &str = "n_authors";

    /// Derived citation count column.
    pub const N_CITATIONS: &str = "n_citations";

    /// Columns that only exist after post-processing or enrichment.
    pub const DERIVED: &[&str] = &[N_AUTHORS, N_CITATIONS];
}

/// Harvester configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// OAI-PMH endpoint (for testing with mock servers).
    pub oai_base_url: String,

    /// Citation search endpoint (for testing with mock servers).
    pub citation_api_url: String,

    /// Citation results requested per page.
    pub citation_page_size: u32,

    /// Shared request budget for citation workers, per second.
    pub citation_rate_limit: Option<NonZeroU32>,

    /// Pause between consecutive OAI page requests.
    pub page_delay: Duration,

    /// Request timeout.
    pub request_timeout: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,
}

impl Config {
    /// Create a configuration pointing at the public arXiv and INSPIRE endpoints.
    #[must_use]
    pub fn new() -> Self {
        Self {
            oai_base_url: api::OAI_BASE_URL.to_string(),
            citation_api_url: api::CITATION_API.to_string(),
            citation_page_size: api::CITATION_PAGE_SIZE,
            citation_rate_limit: NonZeroU32::new(5),
            page_delay: Duration::ZERO,
            request_timeout: api::REQUEST_TIMEOUT,
            connect_timeout: api::CONNECT_TIMEOUT,
        }
    }

    /// Create a test configuration with custom URLs for mock servers.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            oai_base_url: format!("{}/oai2", base_url),
            citation_api_url: format!("{}/search", base_url),
            citation_page_size: 2,
            citation_rate_limit: None, // No throttling in tests
            page_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Recognised: `ARXIV_OAI_URL`, `CITATION_API_URL`, `CITATION_PAGE_SIZE`,
    /// `CITATION_RATE_LIMIT` (0 disables throttling) and `PAGE_DELAY_SECS`.
    ///
    /// # Errors
    ///
    /// Returns error if a numeric variable does not parse, or if
    /// `CITATION_PAGE_SIZE` is 0.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::new();

        if let Ok(url) = std::env::var("ARXIV_OAI_URL") {
            config.oai_base_url = url;
        }
        if let Ok(url) = std::env::var("CITATION_API_URL") {
            config.citation_api_url = url;
        }
        if let Ok(size) = std::env::var("CITATION_PAGE_SIZE") {
            config.citation_page_size = parse_page_size(&size)?;
        }
        if let Ok(rate) = std::env::var("CITATION_RATE_LIMIT") {
            config.citation_rate_limit = NonZeroU32::new(rate.parse()?);
        }
        if let Ok(secs) = std::env::var("PAGE_DELAY_SECS") {
            config.page_delay = Duration::from_secs(secs.parse()?);
        }

        Ok(config)
    }
}

/// A citation page size of 0 would make the search fall back to its own window.
fn parse_page_size(raw: &str) -> anyhow::Result<u32> {
    let size: NonZeroU32 = raw
        .trim()
        .parse()
        .with_context(|| format!("CITATION_PAGE_SIZE must be a positive integer, got {raw:?}"))?;
    Ok(size.get())
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

//! arXiv Harvester
//!
//! Harvests bibliographic records from the arXiv OAI-PMH endpoint into a
//! table, optionally counts citations for each record through INSPIRE-HEP,
//! and persists the result as CSV.
//!
//! # Features
//!
//! - **Resumption-token cursor**: explicit state machine, one request in flight
//! - **Server-directed backoff**: `503` + `Retry after N seconds` is honored and retried
//! - **Cancellable**: a `CancellationToken` stops the harvest and keeps completed rows
//! - **Parallel enrichment**: citation lookups split over a bounded set of tasks
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use arxiv_harvester::{CitationEnricher, Config, HarvestClient, HarvestRequest, harvest};
//! use arxiv_harvester::models::FieldSchema;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let client = HarvestClient::new(&config)?;
//!     let request = HarvestRequest::parse(Some("2024-01-01"), None, "physics:hep-th", FieldSchema::everything())?;
//!
//!     let report = harvest(&client, &request, config.page_delay, CancellationToken::new()).await;
//!     let table = report.into_result()?;
//!
//!     let mut table = CitationEnricher::new(Arc::new(client)).enrich(table, 4).await?;
//!     table.post_process();
//!     table.serialize(request.default_file_name())?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod enrich;
pub mod error;
pub mod harvest;
pub mod markup;
pub mod models;
pub mod table;

pub use client::HarvestClient;
pub use config::Config;
pub use enrich::CitationEnricher;
pub use error::{ClientError, HarvestError, TableError};
pub use harvest::{HarvestCursor, HarvestOutcome, HarvestReport, harvest};
pub use models::HarvestRequest;
pub use table::RecordTable;

//! The harvest state machine.
//!
//! ```text
//! Idle -> FetchingPage -> ExtractingPage -> FetchingPage ... -> Done
//!              |   ^             |
//!              |   | 503         +--> Failed (malformed markup)
//!              +---+
//!              +--> Failed (transport, malformed hint) | Done (other status)
//! ```
//!
//! Any non-terminal state moves to `Cancelled` once the cancellation token
//! fires. Records appended before a terminal state are always kept.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use url::Url;

use super::backoff::parse_retry_after;
use super::extractor::RecordExtractor;
use super::PageSource;
use crate::config::api;
use crate::error::{ClientError, HarvestError, HarvestResult};
use crate::markup::{MarkupDocument, MarkupNode};
use crate::models::HarvestRequest;
use crate::table::RecordTable;

const SERVICE_UNAVAILABLE: u16 = 503;

/// The URL of the next page and whether there is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationCursor {
    url: Url,
    has_more: bool,
}

impl PaginationCursor {
    /// First page of a harvest: the full query.
    ///
    /// # Errors
    ///
    /// Returns error if `base` is not a valid URL.
    pub fn start(base: &str, request: &HarvestRequest) -> Result<Self, url::ParseError> {
        let url = Url::parse_with_params(
            base,
            &[
                ("verb", api::LIST_RECORDS.to_string()),
                ("from", request.from().to_string()),
                ("until", request.until().to_string()),
                ("metadataPrefix", api::METADATA_PREFIX.to_string()),
                ("set", request.set().to_string()),
            ],
        )?;
        Ok(Self { url, has_more: true })
    }

    /// Follow-up page: OAI-PMH forbids repeating the other arguments.
    ///
    /// # Errors
    ///
    /// Returns error if `base` is not a valid URL.
    pub fn resume(base: &str, token: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse_with_params(
            base,
            &[("verb", api::LIST_RECORDS), ("resumptionToken", token)],
        )?;
        Ok(Self { url, has_more: true })
    }

    /// URL of the page to fetch next.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// False once a page arrived without a resumption token.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.has_more
    }

    /// Mark the stream as exhausted.
    pub fn finish(&mut self) {
        self.has_more = false;
    }
}

/// Where a [`HarvestCursor`] is.
#[derive(Debug)]
pub enum CursorState {
    /// Created, nothing requested yet.
    Idle,
    /// The current URL is to be requested (again, after a backoff).
    FetchingPage,
    /// A page arrived and waits to be parsed.
    ExtractingPage {
        /// Raw response body
        body: String,
    },
    /// No more pages. `end_status` is set when a non-success status ended the stream.
    Done {
        /// Status of the response that ended the stream
        end_status: Option<u16>,
    },
    /// Abandoned; no further requests.
    Failed(HarvestError),
    /// Stopped by the cancellation token.
    Cancelled,
}

impl CursorState {
    /// Returns true when [`HarvestCursor::step`] can no longer make progress.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed(_) | Self::Cancelled)
    }
}

/// How a harvest ended.
#[derive(Debug)]
pub enum HarvestOutcome {
    /// The last page carried no resumption token.
    Completed,
    /// A non-success, non-503 status ended the stream.
    EndOfStream {
        /// The terminating HTTP status
        status: u16,
    },
    /// The harvest was abandoned.
    Failed(HarvestError),
    /// The caller cancelled the harvest.
    Cancelled,
}

/// Everything a harvest produced, including partial results.
#[derive(Debug)]
pub struct HarvestReport {
    /// Records appended before the harvest ended.
    pub table: RecordTable,
    /// Why it ended.
    pub outcome: HarvestOutcome,
    /// Pages whose body reached extraction.
    pub pages_fetched: usize,
    /// Requests sent, backoff retries included.
    pub requests_issued: usize,
}

impl HarvestReport {
    /// Returns true if the stream ran to its end.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.outcome, HarvestOutcome::Completed | HarvestOutcome::EndOfStream { .. })
    }

    /// The table, or the error that ended the harvest.
    ///
    /// # Errors
    ///
    /// Returns the failure, or [`HarvestError::Cancelled`]. Use the `table`
    /// field directly to keep partial results.
    pub fn into_result(self) -> HarvestResult<RecordTable> {
        match self.outcome {
            HarvestOutcome::Completed | HarvestOutcome::EndOfStream { .. } => Ok(self.table),
            HarvestOutcome::Failed(err) => Err(err),
            HarvestOutcome::Cancelled => Err(HarvestError::Cancelled),
        }
    }
}

/// Drives one resumption-token harvest, one request at a time.
pub struct HarvestCursor<'a, S: PageSource + ?Sized> {
    source: &'a S,
    extractor: RecordExtractor,
    cursor: PaginationCursor,
    state: CursorState,
    table: RecordTable,
    cancel: CancellationToken,
    page_delay: Duration,
    delay_next_fetch: bool,
    pages_fetched: usize,
    requests_issued: usize,
}

impl<'a, S: PageSource + ?Sized> HarvestCursor<'a, S> {
    /// Create a cursor in the `Idle` state.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::TransportFailure`] if the source's base URL is
    /// not a valid URL.
    pub fn new(source: &'a S, request: &HarvestRequest) -> HarvestResult<Self> {
        let cursor = PaginationCursor::start(source.base_url(), request).map_err(ClientError::from)?;

        let extractor = RecordExtractor::new(request.schema().clone());
        let table = RecordTable::new(extractor.schema());

        Ok(Self {
            source,
            extractor,
            cursor,
            state: CursorState::Idle,
            table,
            cancel: CancellationToken::new(),
            page_delay: Duration::ZERO,
            delay_next_fetch: false,
            pages_fetched: 0,
            requests_issued: 0,
        })
    }

    /// Observe a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Pause between a page and the request for the next one.
    #[must_use]
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &CursorState {
        &self.state
    }

    /// Current pagination position.
    #[must_use]
    pub const fn cursor(&self) -> &PaginationCursor {
        &self.cursor
    }

    /// Records appended so far.
    #[must_use]
    pub const fn table(&self) -> &RecordTable {
        &self.table
    }

    /// Perform one transition. Terminal states are left unchanged.
    pub async fn step(&mut self) -> &CursorState {
        if !self.state.is_terminal() && self.cancel.is_cancelled() {
            tracing::info!(records = self.table.len(), "Harvest cancelled");
            self.state = CursorState::Cancelled;
            return &self.state;
        }

        let state = std::mem::replace(&mut self.state, CursorState::Idle);
        self.state = match state {
            CursorState::Idle => {
                tracing::info!(url = %self.cursor.url(), "Starting harvest");
                CursorState::FetchingPage
            }
            CursorState::FetchingPage => self.fetch().await,
            CursorState::ExtractingPage { body } => self.extract(&body),
            terminal => terminal,
        };
        &self.state
    }

    /// Step until a terminal state and report.
    pub async fn run(mut self) -> HarvestReport {
        while !self.state.is_terminal() {
            self.step().await;
        }
        self.into_report()
    }

    /// Stop and report what has been harvested so far.
    pub fn into_report(self) -> HarvestReport {
        let outcome = match self.state {
            CursorState::Done { end_status: None } => HarvestOutcome::Completed,
            CursorState::Done { end_status: Some(status) } => HarvestOutcome::EndOfStream { status },
            CursorState::Failed(err) => HarvestOutcome::Failed(err),
            CursorState::Idle | CursorState::FetchingPage | CursorState::ExtractingPage { .. } => {
                HarvestOutcome::Cancelled
            }
            CursorState::Cancelled => HarvestOutcome::Cancelled,
        };

        tracing::info!(
            records = self.table.len(),
            pages = self.pages_fetched,
            requests = self.requests_issued,
            outcome = ?outcome,
            "Harvest finished"
        );

        HarvestReport {
            table: self.table,
            outcome,
            pages_fetched: self.pages_fetched,
            requests_issued: self.requests_issued,
        }
    }

    async fn fetch(&mut self) -> CursorState {
        if self.delay_next_fetch && !self.page_delay.is_zero() && !self.pause(self.page_delay).await {
            return CursorState::Cancelled;
        }
        self.delay_next_fetch = false;

        let url = self.cursor.url().as_str().to_owned();
        self.requests_issued += 1;

        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return CursorState::Cancelled,
            result = self.source.fetch(&url) => result,
        };

        match result {
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Page request failed");
                CursorState::Failed(e.into())
            }
            Ok(page) if page.status == SERVICE_UNAVAILABLE => match parse_retry_after(&page.body) {
                Ok(wait) => {
                    tracing::info!(url = %url, wait_secs = wait.as_secs(), "Server asked to back off");
                    if self.pause(wait).await {
                        CursorState::FetchingPage
                    } else {
                        CursorState::Cancelled
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %url, body = %page.body, "503 without a retry hint");
                    CursorState::Failed(e)
                }
            },
            Ok(page) if !page.is_success() => {
                tracing::warn!(url = %url, status = page.status, body = %page.body, "Unexpected status, ending harvest");
                CursorState::Done { end_status: Some(page.status) }
            }
            Ok(page) => {
                self.pages_fetched += 1;
                tracing::debug!(url = %url, bytes = page.body.len(), "Page received");
                CursorState::ExtractingPage { body: page.body }
            }
        }
    }

    fn extract(&mut self, body: &str) -> CursorState {
        let doc = match MarkupDocument::parse(body) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(url = %self.cursor.url(), error = %e, "Unparsable page");
                return CursorState::Failed(e);
            }
        };

        if let Some(err) = doc.find_first("error") {
            tracing::warn!(
                code = err.attribute("code").unwrap_or_default(),
                message = %err.text(),
                "OAI-PMH error response"
            );
        }

        let records = self.extractor.extract_page(&doc);
        let count = records.len();
        for record in records {
            if let Err(e) = self.table.append(record) {
                return CursorState::Failed(e.into());
            }
        }

        let token = doc
            .find_first(api::LIST_RECORDS)
            .and_then(|list| list.find_first("resumptionToken"))
            .map(|token| token.text())
            .filter(|token| !token.is_empty());

        tracing::info!(
            records = count,
            total = self.table.len(),
            token = token.as_deref().unwrap_or("none"),
            "Page extracted"
        );

        match token {
            Some(token) => match PaginationCursor::resume(self.source.base_url(), &token) {
                Ok(next) => {
                    self.cursor = next;
                    self.delay_next_fetch = true;
                    CursorState::FetchingPage
                }
                Err(e) => CursorState::Failed(ClientError::Url(e).into()),
            },
            None => {
                self.cursor.finish();
                CursorState::Done { end_status: None }
            }
        }
    }

    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }
}

impl<S: PageSource + ?Sized> std::fmt::Debug for HarvestCursor<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarvestCursor")
            .field("url", &self.cursor.url().as_str())
            .field("state", &self.state)
            .field("records", &self.table.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassificationSet, FieldSchema};
    use chrono::NaiveDate;

    fn request() -> HarvestRequest {
        HarvestRequest::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            ClassificationSet::HepTh,
            FieldSchema::everything(),
        )
    }

    #[test]
    fn test_first_page_url_carries_full_query() {
        let cursor = PaginationCursor::start("http://export.arxiv.org/oai2", &request()).unwrap();
        let pairs: Vec<(String, String)> = cursor.url().query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("verb".into(), "ListRecords".into()),
                ("from".into(), "2024-01-01".into()),
                ("until".into(), "2024-01-02".into()),
                ("metadataPrefix".into(), "arXiv".into()),
                ("set".into(), "physics:hep-th".into()),
            ]
        );
        assert!(cursor.has_more());
    }

    #[test]
    fn test_resumed_url_drops_other_arguments() {
        let mut cursor = PaginationCursor::resume("http://export.arxiv.org/oai2", "6960524|1001").unwrap();
        let pairs: Vec<(String, String)> = cursor.url().query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("verb".into(), "ListRecords".into()),
                ("resumptionToken".into(), "6960524|1001".into()),
            ]
        );

        cursor.finish();
        assert!(!cursor.has_more());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!CursorState::Idle.is_terminal());
        assert!(!CursorState::FetchingPage.is_terminal());
        assert!(!CursorState::ExtractingPage { body: String::new() }.is_terminal());
        assert!(CursorState::Done { end_status: None }.is_terminal());
        assert!(CursorState::Failed(HarvestError::Cancelled).is_terminal());
        assert!(CursorState::Cancelled.is_terminal());
    }

    #[test]
    fn test_into_result_keeps_table_only_on_success() {
        let table = RecordTable::new(&FieldSchema::everything());
        let report = |outcome| HarvestReport { table: table.clone(), outcome, pages_fetched: 0, requests_issued: 0 };

        assert!(report(HarvestOutcome::Completed).into_result().is_ok());
        assert!(report(HarvestOutcome::EndOfStream { status: 404 }).into_result().is_ok());
        assert!(matches!(
            report(HarvestOutcome::Cancelled).into_result(),
            Err(HarvestError::Cancelled)
        ));
        assert!(matches!(
            report(HarvestOutcome::Failed(HarvestError::MalformedMarkup("eof".into()))).into_result(),
            Err(HarvestError::MalformedMarkup(_))
        ));
    }
}

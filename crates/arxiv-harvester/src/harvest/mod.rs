//! Resumption-token harvesting of OAI-PMH `ListRecords` pages.

mod backoff;
mod cursor;
mod extractor;

pub use backoff::parse_retry_after;
pub use cursor::{CursorState, HarvestCursor, HarvestOutcome, HarvestReport, PaginationCursor};
pub use extractor::{RECORD_TAG, RecordExtractor};

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::client::FetchedPage;
use crate::error::ClientResult;
use crate::models::HarvestRequest;
use crate::table::RecordTable;

/// Something that can serve OAI-PMH pages.
///
/// Implemented by [`HarvestClient`](crate::client::HarvestClient); tests
/// substitute scripted sources.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Endpoint URL without query string.
    fn base_url(&self) -> &str;

    /// GET a full page URL. HTTP error statuses are returned, not raised.
    async fn fetch(&self, url: &str) -> ClientResult<FetchedPage>;
}

/// Run a complete harvest for `request`.
///
/// Never fails outright: errors end up in [`HarvestReport::outcome`] next to
/// whatever was harvested before them.
pub async fn harvest<S>(
    source: &S,
    request: &HarvestRequest,
    page_delay: Duration,
    cancel: CancellationToken,
) -> HarvestReport
where
    S: PageSource + ?Sized,
{
    match HarvestCursor::new(source, request) {
        Ok(cursor) => cursor.with_page_delay(page_delay).with_cancellation(cancel).run().await,
        Err(err) => {
            tracing::error!(base_url = source.base_url(), error = %err, "Cannot start harvest");
            HarvestReport {
                table: RecordTable::new(request.schema()),
                outcome: HarvestOutcome::Failed(err),
                pages_fetched: 0,
                requests_issued: 0,
            }
        }
    }
}

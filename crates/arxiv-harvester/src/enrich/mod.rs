//! Citation counts for harvested records.
//!
//! Rows are split into contiguous chunks, one tokio task per chunk. Each task
//! walks its rows in order and pages through the citation search for every
//! record; results are joined back in chunk order, so the new column does not
//! depend on task scheduling.

use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::client::FetchedPage;
use crate::config::fields;
use crate::error::{ClientResult, HarvestResult};
use crate::harvest::RECORD_TAG;
use crate::markup::MarkupDocument;
use crate::models::FieldValue;
use crate::table::RecordTable;

/// Something that can answer paged "who cites this arXiv id" queries.
#[async_trait]
pub trait CitationSource: Send + Sync + 'static {
    /// Results requested per page.
    fn page_size(&self) -> u32;

    /// One page of citing records, starting at the 1-based offset `start`.
    async fn fetch_citations(&self, arxiv_id: &str, start: u32) -> ClientResult<FetchedPage>;
}

/// Paging state of one record's citation lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationQuery {
    record_id: String,
    start: u32,
    count: u64,
    has_more: bool,
}

impl CitationQuery {
    /// Start at offset 1 with nothing counted.
    #[must_use]
    pub fn new(record_id: impl Into<String>) -> Self {
        Self { record_id: record_id.into(), start: 1, count: 0, has_more: true }
    }

    /// The arXiv identifier being looked up.
    #[must_use]
    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// Offset of the next page.
    #[must_use]
    pub const fn start(&self) -> u32 {
        self.start
    }

    /// Citations counted so far.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// False once a page came back empty or the lookup was abandoned.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.has_more
    }

    /// Account for one page holding `found` records.
    pub fn advance(&mut self, found: u64, page_size: u32) {
        if found == 0 {
            self.has_more = false;
        } else {
            self.count += found;
            self.start = self.start.saturating_add(page_size.max(1));
        }
    }

    /// Give up, keeping the partial count.
    pub fn abandon(&mut self) {
        self.has_more = false;
    }
}

/// Split `rows` into `workers` contiguous ranges.
///
/// `workers` is clamped to `1..=rows`. Sizes differ by at most one and the
/// larger ranges come first. No rows gives no ranges.
#[must_use]
pub fn partition(rows: usize, workers: usize) -> Vec<Range<usize>> {
    if rows == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, rows);
    let (base, extra) = (rows / workers, rows % workers);

    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0;
    for i in 0..workers {
        let len = base + usize::from(i < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Adds an `n_citations` column to a table.
pub struct CitationEnricher<S: CitationSource> {
    source: Arc<S>,
    cancel: CancellationToken,
}

impl<S: CitationSource> CitationEnricher<S> {
    /// Create an enricher over a shared source.
    #[must_use]
    pub fn new(source: Arc<S>) -> Self {
        Self { source, cancel: CancellationToken::new() }
    }

    /// Observe a cancellation token.
    ///
    /// Rows whose lookup was cut short by cancellation are left absent, so a
    /// partial count is never mistaken for a finished one.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Count citations for every row using up to `concurrency` tasks.
    ///
    /// Lookup failures are logged and leave a partial count for that row only.
    /// Rows not finished before cancellation, or lost to a failed worker, are
    /// [`FieldValue::Absent`].
    ///
    /// # Errors
    ///
    /// Returns error only if the new column cannot be added to the table.
    pub async fn enrich(&self, mut table: RecordTable, concurrency: usize) -> HarvestResult<RecordTable> {
        let ids: Vec<Option<String>> = match table.column(fields::ID) {
            Some(column) => column.into_iter().map(|v| v.as_scalar().map(str::to_string)).collect(),
            None => {
                tracing::warn!("Table has no id column, every citation count will be 0");
                vec![None; table.len()]
            }
        };

        let ranges = partition(ids.len(), concurrency);
        tracing::info!(rows = ids.len(), workers = ranges.len(), "Enriching with citation counts");

        let handles: Vec<_> = ranges
            .iter()
            .map(|range| {
                let chunk = ids[range.clone()].to_vec();
                let source = Arc::clone(&self.source);
                let cancel = self.cancel.clone();
                tokio::spawn(async move {
                    let mut counts = Vec::with_capacity(chunk.len());
                    for id in &chunk {
                        counts.push(count_citations(source.as_ref(), id.as_deref(), &cancel).await);
                    }
                    counts
                })
            })
            .collect();

        let mut values = Vec::with_capacity(ids.len());
        for (range, joined) in ranges.iter().zip(futures::future::join_all(handles).await) {
            match joined {
                Ok(counts) => values.extend(counts),
                Err(e) => {
                    tracing::error!(rows = ?range, error = %e, "Citation worker failed");
                    values.extend(std::iter::repeat_n(None, range.len()));
                }
            }
        }

        let unfinished = values.iter().filter(|count| count.is_none()).count();
        if unfinished > 0 {
            tracing::warn!(rows = unfinished, "Citation counts left empty for unfinished rows");
        }

        let values = values
            .into_iter()
            .map(|count| {
                count.map_or(FieldValue::Absent, |n| FieldValue::Integer(i64::try_from(n).unwrap_or(i64::MAX)))
            })
            .collect();
        table.add_column(fields::N_CITATIONS, values)?;
        Ok(table)
    }
}

impl<S: CitationSource> std::fmt::Debug for CitationEnricher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CitationEnricher")
            .field("page_size", &self.source.page_size())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Page through the citations of one record.
///
/// `None` when cancellation stopped the lookup before its last page.
async fn count_citations<S>(source: &S, record_id: Option<&str>, cancel: &CancellationToken) -> Option<u64>
where
    S: CitationSource + ?Sized,
{
    let Some(record_id) = record_id else {
        tracing::warn!("Record has no scalar id, counting 0 citations");
        return Some(0);
    };

    let page_size = source.page_size();
    let mut query = CitationQuery::new(record_id);

    while query.has_more() {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(id = query.record_id(), count = query.count(), "Citation lookup cancelled");
                return None;
            }
            result = source.fetch_citations(query.record_id(), query.start()) => result,
        };

        match result {
            Err(e) => {
                tracing::warn!(id = query.record_id(), start = query.start(), error = %e, "Citation request failed");
                query.abandon();
            }
            Ok(page) if !page.is_success() => {
                tracing::warn!(
                    id = query.record_id(),
                    start = query.start(),
                    status = page.status,
                    "Citation request rejected"
                );
                query.abandon();
            }
            Ok(page) => match count_records(&page.body) {
                Ok(found) => query.advance(found, page_size),
                Err(e) => {
                    tracing::warn!(id = query.record_id(), start = query.start(), error = %e, "Unparsable citation page");
                    query.abandon();
                }
            },
        }
    }

    tracing::debug!(id = query.record_id(), count = query.count(), "Citations counted");
    Some(query.count())
}

fn count_records(body: &str) -> HarvestResult<u64> {
    let doc = MarkupDocument::parse(body)?;
    Ok(doc.find_all(RECORD_TAG).len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(rows: usize, workers: usize) -> Vec<usize> {
        partition(rows, workers).iter().map(ExactSizeIterator::len).collect()
    }

    #[test]
    fn test_partition_sizes() {
        assert_eq!(sizes(10, 4), vec![3, 3, 2, 2]);
        assert_eq!(sizes(8, 4), vec![2, 2, 2, 2]);
        assert_eq!(sizes(3, 8), vec![1, 1, 1]);
        assert_eq!(sizes(5, 0), vec![5]);
        assert!(sizes(0, 4).is_empty());
    }

    #[test]
    fn test_partition_is_contiguous() {
        let ranges = partition(17, 5);
        assert_eq!(ranges.first().map(|r| r.start), Some(0));
        assert_eq!(ranges.last().map(|r| r.end), Some(17));
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_query_advances_by_page_size() {
        let mut query = CitationQuery::new("0704.0001");
        assert_eq!(query.record_id(), "0704.0001");
        assert_eq!((query.start(), query.count(), query.has_more()), (1, 0, true));

        query.advance(250, 250);
        assert_eq!((query.start(), query.count()), (251, 250));
        query.advance(17, 250);
        assert_eq!((query.start(), query.count()), (501, 267));

        query.advance(0, 250);
        assert!(!query.has_more());
        assert_eq!(query.count(), 267);
    }

    #[test]
    fn test_count_records() {
        let body = "<collection><record><controlfield>1</controlfield></record><record/></collection>";
        assert_eq!(count_records(body).unwrap(), 2);
        assert_eq!(count_records("<collection/>").unwrap(), 0);
        assert!(count_records("<html><body>").is_err());
    }
}

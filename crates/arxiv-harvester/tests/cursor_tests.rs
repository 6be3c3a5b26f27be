//! Harvest cursor tests against a scripted page source.
//!
//! The scripted source answers requests from a queue and records every URL,
//! so request counts and ordering can be asserted exactly. Backoff tests run
//! on paused tokio time.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use arxiv_harvester::client::FetchedPage;
use arxiv_harvester::error::{ClientError, ClientResult, HarvestError};
use arxiv_harvester::harvest::{CursorState, HarvestCursor, HarvestOutcome, PageSource, harvest};
use arxiv_harvester::models::{ClassificationSet, FieldSchema, FieldValue, HarvestRequest};

const BASE_URL: &str = "http://oai.test/oai2";

struct ScriptedSource {
    responses: Mutex<VecDeque<ClientResult<FetchedPage>>>,
    urls: Mutex<Vec<String>>,
}

impl ScriptedSource {
    fn new(responses: Vec<ClientResult<FetchedPage>>) -> Self {
        Self { responses: Mutex::new(responses.into()), urls: Mutex::new(Vec::new()) }
    }

    fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    fn base_url(&self) -> &str {
        BASE_URL
    }

    async fn fetch(&self, url: &str) -> ClientResult<FetchedPage> {
        self.urls.lock().unwrap().push(url.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(FetchedPage::new(500, "script exhausted")))
    }
}

fn ok(body: String) -> ClientResult<FetchedPage> {
    Ok(FetchedPage::new(200, body))
}

fn status(code: u16, body: &str) -> ClientResult<FetchedPage> {
    Ok(FetchedPage::new(code, body))
}

fn record(id: &str) -> String {
    format!(
        r#"<record>
  <header>
    <identifier>oai:arXiv.org:{id}</identifier>
    <datestamp>2024-01-02</datestamp>
    <setSpec>physics:hep-th</setSpec>
  </header>
  <metadata>
    <arXiv xmlns="http://arxiv.org/OAI/arXiv/">
      <id>{id}</id>
      <created>2024-01-01</created>
      <authors>
        <author><keyname>Doe</keyname><forenames>Jane</forenames></author>
        <author><keyname>Roe</keyname><forenames>R.</forenames></author>
      </authors>
      <title>Paper {id}</title>
      <categories>hep-th gr-qc</categories>
    </arXiv>
  </metadata>
</record>"#
    )
}

fn page(ids: &[&str], token: Option<&str>) -> String {
    let records: String = ids.iter().map(|id| record(id)).collect();
    let token = token
        .map(|t| format!(r#"<resumptionToken cursor="0" completeListSize="99">{t}</resumptionToken>"#))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
  <responseDate>2024-01-03T00:00:00Z</responseDate>
  <request verb="ListRecords">http://export.arxiv.org/oai2</request>
  <ListRecords>{records}{token}</ListRecords>
</OAI-PMH>"#
    )
}

fn request() -> HarvestRequest {
    HarvestRequest::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        ClassificationSet::HepTh,
        FieldSchema::everything(),
    )
}

fn ids(table: &arxiv_harvester::RecordTable) -> Vec<String> {
    table
        .column("id")
        .unwrap()
        .into_iter()
        .map(|v| v.as_scalar().unwrap().to_string())
        .collect()
}

async fn run(source: &ScriptedSource) -> arxiv_harvester::HarvestReport {
    harvest(source, &request(), Duration::ZERO, CancellationToken::new()).await
}

// =============================================================================
// Pagination
// =============================================================================

#[tokio::test]
async fn test_four_pages_four_requests_in_order() {
    let source = ScriptedSource::new(vec![
        ok(page(&["1", "2"], Some("tok-a"))),
        ok(page(&["3"], Some("tok-b"))),
        ok(page(&["4", "5"], Some("tok-c"))),
        ok(page(&["6"], None)),
    ]);

    let report = run(&source).await;

    assert!(matches!(report.outcome, HarvestOutcome::Completed));
    assert_eq!(report.pages_fetched, 4);
    assert_eq!(report.requests_issued, 4);
    assert_eq!(ids(&report.table), vec!["1", "2", "3", "4", "5", "6"]);

    let urls = source.urls();
    assert_eq!(urls.len(), 4);
    assert!(urls[0].contains("verb=ListRecords"));
    assert!(urls[0].contains("from=2024-01-01"));
    assert!(urls[0].contains("until=2024-01-02"));
    assert!(urls[0].contains("metadataPrefix=arXiv"));
    for (url, token) in urls[1..].iter().zip(["tok-a", "tok-b", "tok-c"]) {
        assert!(url.ends_with(&format!("resumptionToken={token}")), "{url}");
        assert!(!url.contains("from="));
        assert!(!url.contains("metadataPrefix="));
    }
}

#[tokio::test]
async fn test_empty_token_ends_harvest() {
    let body = page(&["1"], None).replace(
        "</ListRecords>",
        r#"<resumptionToken cursor="1" completeListSize="1"/></ListRecords>"#,
    );
    let source = ScriptedSource::new(vec![ok(body)]);

    let report = run(&source).await;

    assert!(matches!(report.outcome, HarvestOutcome::Completed));
    assert_eq!(source.urls().len(), 1);
    assert_eq!(report.table.len(), 1);
}

#[tokio::test]
async fn test_no_records_match_is_empty_completion() {
    let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
  <error code="noRecordsMatch">No records match</error>
</OAI-PMH>"#;
    let source = ScriptedSource::new(vec![ok(body.to_string())]);

    let report = run(&source).await;

    assert!(matches!(report.outcome, HarvestOutcome::Completed));
    assert!(report.table.is_empty());
    assert_eq!(report.table.columns(), FieldSchema::everything().names());
}

#[tokio::test]
async fn test_record_shape_follows_schema() {
    let schema = FieldSchema::from_names(["id", "author", "doi"]).unwrap();
    let request = HarvestRequest::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        ClassificationSet::HepTh,
        schema,
    );
    let source = ScriptedSource::new(vec![ok(page(&["0704.0001"], None))]);

    let report = harvest(&source, &request, Duration::ZERO, CancellationToken::new()).await;
    let row = &report.table.rows()[0];

    assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "author", "doi"]);
    assert_eq!(row.get("id"), Some(&FieldValue::from("0704.0001")));
    assert_eq!(
        row.get("author"),
        Some(&FieldValue::List(vec!["Doe Jane".into(), "Roe R.".into()]))
    );
    assert_eq!(row.get("doi"), Some(&FieldValue::Absent));
}

// =============================================================================
// Backoff
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_backoff_waits_then_repeats_same_url() {
    let source = ScriptedSource::new(vec![
        ok(page(&["1"], Some("tok-a"))),
        status(503, "<html><body>Retry after 5 seconds</body></html>"),
        ok(page(&["2"], None)),
    ]);

    let started = tokio::time::Instant::now();
    let report = run(&source).await;

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(matches!(report.outcome, HarvestOutcome::Completed));
    assert_eq!(report.requests_issued, 3);
    assert_eq!(report.pages_fetched, 2);
    assert_eq!(ids(&report.table), vec!["1", "2"]);

    let urls = source.urls();
    assert_eq!(urls[1], urls[2]);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_backoff_is_unbounded() {
    let mut script: Vec<_> = (0..10).map(|_| status(503, "Retry after 60 seconds")).collect();
    script.push(ok(page(&["1"], None)));
    let source = ScriptedSource::new(script);

    let started = tokio::time::Instant::now();
    let report = run(&source).await;

    assert!(started.elapsed() >= Duration::from_secs(600));
    assert!(matches!(report.outcome, HarvestOutcome::Completed));
    assert_eq!(report.requests_issued, 11);
    assert_eq!(report.table.len(), 1);
}

#[tokio::test]
async fn test_503_without_hint_fails_without_further_requests() {
    let source = ScriptedSource::new(vec![
        ok(page(&["1"], Some("tok-a"))),
        status(503, "Service Unavailable"),
        ok(page(&["2"], None)),
    ]);

    let report = run(&source).await;

    assert!(matches!(
        report.outcome,
        HarvestOutcome::Failed(HarvestError::MalformedBackoffHint { .. })
    ));
    assert_eq!(source.urls().len(), 2);
    assert_eq!(ids(&report.table), vec!["1"]);
}

// =============================================================================
// Failures keep earlier records
// =============================================================================

#[tokio::test]
async fn test_transport_failure_keeps_records() {
    let source = ScriptedSource::new(vec![
        ok(page(&["1", "2"], Some("tok-a"))),
        Err(ClientError::Timeout(Duration::from_secs(120))),
    ]);

    let report = run(&source).await;

    assert!(matches!(
        report.outcome,
        HarvestOutcome::Failed(HarvestError::TransportFailure(ClientError::Timeout(_)))
    ));
    assert_eq!(ids(&report.table), vec!["1", "2"]);
    assert_eq!(source.urls().len(), 2);
    assert!(!report.is_complete());
}

#[tokio::test]
async fn test_malformed_markup_keeps_records() {
    let source = ScriptedSource::new(vec![
        ok(page(&["1"], Some("tok-a"))),
        ok("<OAI-PMH><ListRecords><record>".to_string()),
        ok(page(&["2"], None)),
    ]);

    let report = run(&source).await;

    assert!(matches!(report.outcome, HarvestOutcome::Failed(HarvestError::MalformedMarkup(_))));
    assert_eq!(ids(&report.table), vec!["1"]);
    assert_eq!(source.urls().len(), 2);
}

#[tokio::test]
async fn test_other_status_is_end_of_stream() {
    let source = ScriptedSource::new(vec![
        ok(page(&["1"], Some("tok-a"))),
        status(404, "Not Found"),
    ]);

    let report = run(&source).await;

    assert!(matches!(report.outcome, HarvestOutcome::EndOfStream { status: 404 }));
    assert!(report.is_complete());
    assert_eq!(ids(&report.table), vec!["1"]);

    let table = report.into_result().unwrap();
    assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn test_invalid_base_url_fails_before_any_request() {
    struct NoBase;

    #[async_trait]
    impl PageSource for NoBase {
        fn base_url(&self) -> &str {
            "not a url"
        }

        async fn fetch(&self, _url: &str) -> ClientResult<FetchedPage> {
            panic!("no request expected");
        }
    }

    let report = harvest(&NoBase, &request(), Duration::ZERO, CancellationToken::new()).await;

    assert!(matches!(
        report.outcome,
        HarvestOutcome::Failed(HarvestError::TransportFailure(ClientError::Url(_)))
    ));
    assert_eq!(report.requests_issued, 0);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancelled_before_start_issues_no_request() {
    let source = ScriptedSource::new(vec![ok(page(&["1"], None))]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = harvest(&source, &request(), Duration::ZERO, cancel).await;

    assert!(matches!(report.outcome, HarvestOutcome::Cancelled));
    assert!(source.urls().is_empty());
    assert!(matches!(report.into_result(), Err(HarvestError::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_backoff_and_keeps_records() {
    let source = ScriptedSource::new(vec![
        ok(page(&["1", "2"], Some("tok-a"))),
        status(503, "Retry after 600 seconds"),
        ok(page(&["3"], None)),
    ]);
    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            cancel.cancel();
        }
    });

    let started = tokio::time::Instant::now();
    let report = harvest(&source, &request(), Duration::ZERO, cancel).await;

    assert!(started.elapsed() < Duration::from_secs(600));
    assert!(matches!(report.outcome, HarvestOutcome::Cancelled));
    assert_eq!(ids(&report.table), vec!["1", "2"]);
    assert_eq!(source.urls().len(), 2);
}

// =============================================================================
// Stepping
// =============================================================================

#[tokio::test]
async fn test_step_walks_the_state_machine() {
    let source = ScriptedSource::new(vec![ok(page(&["1"], Some("tok-a"))), ok(page(&["2"], None))]);
    let mut cursor = HarvestCursor::new(&source, &request()).unwrap();

    assert!(matches!(cursor.state(), CursorState::Idle));
    assert!(matches!(cursor.step().await, CursorState::FetchingPage));
    assert!(matches!(cursor.step().await, CursorState::ExtractingPage { .. }));
    assert!(matches!(cursor.step().await, CursorState::FetchingPage));
    assert_eq!(cursor.table().len(), 1);
    assert!(cursor.cursor().url().as_str().contains("resumptionToken=tok-a"));

    assert!(matches!(cursor.step().await, CursorState::ExtractingPage { .. }));
    assert!(matches!(cursor.step().await, CursorState::Done { end_status: None }));
    assert!(!cursor.cursor().has_more());

    // Terminal states are sticky.
    assert!(matches!(cursor.step().await, CursorState::Done { .. }));
    assert_eq!(source.urls().len(), 2);

    let report = cursor.into_report();
    assert_eq!(report.table.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_page_delay_between_pages() {
    let source = ScriptedSource::new(vec![
        ok(page(&["1"], Some("tok-a"))),
        ok(page(&["2"], Some("tok-b"))),
        ok(page(&["3"], None)),
    ]);

    let started = tokio::time::Instant::now();
    let report = harvest(&source, &request(), Duration::from_secs(3), CancellationToken::new()).await;

    assert!(started.elapsed() >= Duration::from_secs(6));
    assert!(started.elapsed() < Duration::from_secs(9));
    assert_eq!(report.table.len(), 3);
}

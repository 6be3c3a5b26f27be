#![no_main]

use arxiv_harvester::harvest::RecordExtractor;
use arxiv_harvester::markup::MarkupDocument;
use arxiv_harvester::models::FieldSchema;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = std::str::from_utf8(data) else {
        return;
    };
    // Malformed pages are an error, never a panic.
    if let Ok(doc) = MarkupDocument::parse(body) {
        let records = RecordExtractor::new(FieldSchema::everything()).extract_page(&doc);
        for record in &records {
            assert_eq!(record.len(), FieldSchema::everything().len());
        }
    }
});

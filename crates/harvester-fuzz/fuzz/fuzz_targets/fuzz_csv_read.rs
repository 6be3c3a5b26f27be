#![no_main]

use arxiv_harvester::table::RecordTable;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Anything that reads back must write out again.
    if let Ok(table) = RecordTable::read_csv(data) {
        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
    }
});

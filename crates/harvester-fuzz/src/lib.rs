//! Fuzzing library for arxiv-harvester.
//!
//! Targets cover everything that reads untrusted input: page markup and
//! record extraction, the 503 retry hint, and persisted CSV tables.
//!
//! # Usage
//!
//! ```bash
//! cd crates/harvester-fuzz
//! cargo +nightly fuzz run fuzz_markup_extract -- -max_total_time=60
//! ```

pub use arxiv_harvester::{harvest, markup, table};

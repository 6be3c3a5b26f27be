//! Data models for harvest requests and harvested records.

mod record;
mod request;

pub use record::{FieldValue, Record};
pub use request::{ClassificationSet, FieldSchema, HarvestRequest, days_back, parse_date};

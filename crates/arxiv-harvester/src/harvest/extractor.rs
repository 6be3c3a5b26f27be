//! Field extraction from record fragments.

use crate::markup::{MarkupDocument, MarkupNode};
use crate::models::{FieldSchema, FieldValue, Record};

/// Tag of one bibliographic record in a `ListRecords` page.
pub const RECORD_TAG: &str = "record";

/// Turns record elements into [`Record`]s with a fixed column set.
#[derive(Debug, Clone)]
pub struct RecordExtractor {
    schema: FieldSchema,
}

impl RecordExtractor {
    /// Create an extractor for a schema.
    #[must_use]
    pub fn new(schema: FieldSchema) -> Self {
        Self { schema }
    }

    /// The schema records are extracted with.
    #[must_use]
    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Extract one record.
    ///
    /// Each field is looked up by tag name anywhere inside `node`; the number
    /// of matches alone decides between absent, scalar and list.
    #[must_use]
    pub fn extract<N: MarkupNode>(&self, node: &N) -> Record {
        self.schema
            .names()
            .iter()
            .map(|field| {
                let texts = node.find_all(field).iter().map(MarkupNode::text).collect();
                (field.clone(), FieldValue::from_matches(texts))
            })
            .collect()
    }

    /// Extract every record element of a page, in document order.
    #[must_use]
    pub fn extract_page(&self, doc: &MarkupDocument<'_>) -> Vec<Record> {
        doc.find_all(RECORD_TAG).iter().map(|node| self.extract(node)).collect()
    }
}

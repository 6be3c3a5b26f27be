//! Ordered collection of harvested records and its CSV persistence.
//!
//! The CSV layout: the first column is a zero-based row index with an empty
//! header, then one column per table column. Absent values are empty cells,
//! lists are JSON arrays of strings, timestamps use `YYYY-MM-DD HH:MM:SS`.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::config::fields;
use crate::error::{TableError, TableResult};
use crate::models::{FieldSchema, FieldValue, Record};

/// Timestamp layout used in persisted cells.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Harvested rows sharing one set of columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTable {
    /// Requested fields, in order.
    schema: Vec<String>,

    /// Schema followed by derived columns, in the order they were added.
    columns: Vec<String>,

    rows: Vec<Record>,
}

impl RecordTable {
    /// Create an empty table for a field schema.
    #[must_use]
    pub fn new(schema: &FieldSchema) -> Self {
        let schema = schema.names().to_vec();
        Self { columns: schema.clone(), schema, rows: Vec::new() }
    }

    /// Append a record harvested with this table's columns.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::ColumnMismatch`] if the record's columns differ.
    pub fn append(&mut self, record: Record) -> TableResult<()> {
        if !record.has_columns(&self.columns) {
            return Err(TableError::ColumnMismatch {
                expected: self.columns.clone(),
                found: record.columns().map(str::to_string).collect(),
            });
        }
        self.rows.push(record);
        Ok(())
    }

    /// Add a derived column, or replace its values if it already exists.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::LengthMismatch`] unless there is one value per row.
    pub fn add_column(&mut self, name: &str, values: Vec<FieldValue>) -> TableResult<()> {
        if values.len() != self.rows.len() {
            return Err(TableError::LengthMismatch {
                column: name.to_string(),
                expected: self.rows.len(),
                found: values.len(),
            });
        }

        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.insert(name, value);
        }
        Ok(())
    }

    /// Best-effort typing of harvested text. Never fails.
    ///
    /// - `created`, `updated`, `datestamp` become timestamps where they parse
    /// - `n_authors` counts the `author` field (absent 0, scalar 1, list len)
    /// - `categories` is split on whitespace into a list
    ///
    /// Source columns missing from the table are skipped.
    pub fn post_process(&mut self) {
        for &name in fields::TIMESTAMPS {
            if !self.has_column(name) {
                tracing::debug!(column = name, "Column not harvested, skipping timestamp parsing");
                continue;
            }
            let mut unparsed = 0usize;
            for value in self.rows.iter_mut().filter_map(|r| r.get_mut(name)) {
                if let FieldValue::Scalar(text) = value {
                    match parse_timestamp(text) {
                        Some(ts) => *value = FieldValue::Timestamp(ts),
                        None => unparsed += 1,
                    }
                }
            }
            if unparsed > 0 {
                tracing::debug!(column = name, unparsed, "Some timestamps left as text");
            }
        }

        if self.has_column(fields::AUTHOR) {
            let counts = self
                .rows
                .iter()
                .map(|r| {
                    let n = r.get(fields::AUTHOR).map_or(0, FieldValue::cardinality);
                    FieldValue::Integer(i64::try_from(n).unwrap_or(i64::MAX))
                })
                .collect();
            // One value per row by construction.
            let _ = self.add_column(fields::N_AUTHORS, counts);
        } else {
            tracing::debug!(column = fields::AUTHOR, "Column not harvested, skipping author count");
        }

        if self.has_column(fields::CATEGORIES) {
            for value in self.rows.iter_mut().filter_map(|r| r.get_mut(fields::CATEGORIES)) {
                let split = match value {
                    FieldValue::Scalar(text) => {
                        text.split_whitespace().map(str::to_string).collect::<Vec<_>>()
                    }
                    FieldValue::List(items) => items
                        .iter()
                        .flat_map(|s| s.split_whitespace())
                        .map(str::to_string)
                        .collect(),
                    _ => continue,
                };
                *value = FieldValue::List(split);
            }
        } else {
            tracing::debug!(column = fields::CATEGORIES, "Column not harvested, skipping split");
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Requested field schema.
    #[must_use]
    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    /// All columns: the schema followed by derived columns.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Check if a column exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Rows in harvest order.
    #[must_use]
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// One column's values in row order.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<&FieldValue>> {
        if !self.has_column(name) {
            return None;
        }
        Some(self.rows.iter().filter_map(|r| r.get(name)).collect())
    }

    /// Write the table as CSV to `path`.
    ///
    /// # Errors
    ///
    /// Returns error on I/O or encoding failure.
    pub fn serialize(&self, path: impl AsRef<Path>) -> TableResult<()> {
        let path = path.as_ref();
        self.write_csv(File::create(path)?)?;
        tracing::info!(path = %path.display(), rows = self.len(), "Wrote table");
        Ok(())
    }

    /// Read a table written by [`RecordTable::serialize`].
    ///
    /// # Errors
    ///
    /// Returns error on I/O failure, malformed CSV or a bad row index.
    pub fn deserialize(path: impl AsRef<Path>) -> TableResult<Self> {
        let path = path.as_ref();
        let table = Self::read_csv(File::open(path)?)?;
        tracing::info!(path = %path.display(), rows = table.len(), "Read table");
        Ok(table)
    }

    /// Write the table as CSV.
    ///
    /// # Errors
    ///
    /// Returns error on I/O or encoding failure.
    pub fn write_csv<W: Write>(&self, writer: W) -> TableResult<()> {
        let mut out = csv::Writer::from_writer(writer);

        out.write_record(std::iter::once("").chain(self.columns.iter().map(String::as_str)))?;

        for (index, row) in self.rows.iter().enumerate() {
            let mut cells = Vec::with_capacity(self.columns.len() + 1);
            cells.push(index.to_string());
            for value in row.values() {
                cells.push(render_cell(value)?);
            }
            out.write_record(&cells)?;
        }

        out.flush()?;
        Ok(())
    }

    /// Read a table from CSV produced by [`RecordTable::write_csv`].
    ///
    /// Rows are ordered by the index column. Known derived columns are
    /// excluded from the reconstructed schema.
    ///
    /// Cells carry no type tag, so a scalar that looks like another kind is
    /// read back as that kind: an empty scalar becomes absent, a JSON array
    /// of strings becomes a list, and `YYYY-MM-DD HH:MM:SS` text in a
    /// timestamp column becomes a timestamp. The rendered text is unchanged.
    ///
    /// # Errors
    ///
    /// Returns error on malformed CSV or a missing or non-integer row index.
    pub fn read_csv<R: Read>(reader: R) -> TableResult<Self> {
        let mut input = csv::Reader::from_reader(reader);

        let columns: Vec<String> = input.headers()?.iter().skip(1).map(str::to_string).collect();
        let schema = columns
            .iter()
            .filter(|c| !fields::DERIVED.contains(&c.as_str()))
            .cloned()
            .collect();

        let mut indexed = Vec::new();
        for result in input.records() {
            let row = result?;
            let line = row.position().map_or(0, csv::Position::line);
            let raw_index = row.get(0).unwrap_or_default();
            let index: usize = raw_index
                .trim()
                .parse()
                .map_err(|_| TableError::InvalidIndex { line, value: raw_index.to_string() })?;

            let record = columns
                .iter()
                .zip(row.iter().skip(1))
                .map(|(name, cell)| (name.clone(), parse_cell(name, cell)))
                .collect::<Record>();
            indexed.push((index, record));
        }

        indexed.sort_by_key(|(index, _)| *index);

        Ok(Self { schema, columns, rows: indexed.into_iter().map(|(_, r)| r).collect() })
    }
}

/// Parse harvested date text. Date-only values get midnight.
fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S", TIMESTAMP_FORMAT]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn render_cell(value: &FieldValue) -> TableResult<String> {
    Ok(match value {
        FieldValue::Absent => String::new(),
        FieldValue::Scalar(text) => text.clone(),
        FieldValue::List(items) => serde_json::to_string(items)?,
        FieldValue::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        FieldValue::Integer(n) => n.to_string(),
    })
}

fn parse_cell(column: &str, cell: &str) -> FieldValue {
    if cell.is_empty() {
        return FieldValue::Absent;
    }
    if cell.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(cell) {
            return FieldValue::List(items);
        }
    }
    if fields::TIMESTAMPS.contains(&column) {
        if let Ok(ts) = NaiveDateTime::parse_from_str(cell, TIMESTAMP_FORMAT) {
            return FieldValue::Timestamp(ts);
        }
    }
    if fields::DERIVED.contains(&column) {
        if let Ok(n) = cell.parse() {
            return FieldValue::Integer(n);
        }
    }
    FieldValue::Scalar(cell.to_string())
}

//! Harvested record model.

use chrono::NaiveDateTime;

/// Value of one field in a [`Record`].
///
/// Cardinality is decided by how many matches extraction found, never by the
/// field name: no match is `Absent`, one is `Scalar`, more are `List`.
/// `Timestamp` and `Integer` only appear after post-processing or enrichment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldValue {
    /// No match in the source fragment.
    #[default]
    Absent,
    /// Exactly one match.
    Scalar(String),
    /// Two or more matches, in document order.
    List(Vec<String>),
    /// A parsed calendar timestamp.
    Timestamp(NaiveDateTime),
    /// A derived count.
    Integer(i64),
}

impl FieldValue {
    /// Collapse extracted texts by cardinality.
    #[must_use]
    pub fn from_matches(mut matches: Vec<String>) -> Self {
        match matches.len() {
            0 => Self::Absent,
            1 => Self::Scalar(matches.remove(0)),
            _ => Self::List(matches),
        }
    }

    /// Check if this value is absent.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Number of values held: 0 for absent, list length for lists, 1 otherwise.
    #[must_use]
    pub fn cardinality(&self) -> usize {
        match self {
            Self::Absent => 0,
            Self::List(items) => items.len(),
            _ => 1,
        }
    }

    /// Get the text if this is a scalar.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Get the count if this is an integer.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Scalar(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

/// One harvested entity: field names mapped to values, in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    cells: Vec<(String, FieldValue)>,
}

impl Record {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record with every column set to [`FieldValue::Absent`].
    #[must_use]
    pub fn with_columns<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            cells: columns.iter().map(|c| (c.as_ref().to_string(), FieldValue::Absent)).collect(),
        }
    }

    /// Set a field, replacing its value if present or appending a new column.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        match self.cells.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.cells.push((name, value)),
        }
    }

    /// Builder-style [`Record::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Get a field's value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.cells.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Get a mutable reference to a field's value.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldValue> {
        self.cells.iter_mut().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(n, _)| n.as_str())
    }

    /// Values in column order.
    pub fn values(&self) -> impl Iterator<Item = &FieldValue> {
        self.cells.iter().map(|(_, v)| v)
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the record has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Check if the columns equal `columns`, in order.
    #[must_use]
    pub fn has_columns(&self, columns: &[String]) -> bool {
        self.cells.len() == columns.len()
            && self.columns().zip(columns).all(|(a, b)| a == b.as_str())
    }
}

/// Collects cells in order. Repeated names are kept as given.
impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self { cells: iter.into_iter().collect() }
    }
}

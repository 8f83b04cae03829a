//! Normalized quote records and the snapshot that holds one batch of them.

use std::fmt;
use std::sync::Arc;

/// A projected column value: numeric where the upstream string parsed as a
/// number, text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// One instrument's projected row. Columns are shared across the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    columns: Arc<[String]>,
    id_position: usize,
    values: Vec<FieldValue>,
}

impl NormalizedRecord {
    /// `values` must line up with `columns`; `id_position` indexes both.
    pub fn new(columns: Arc<[String]>, id_position: usize, values: Vec<FieldValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        debug_assert!(id_position < columns.len());
        Self {
            columns,
            id_position,
            values,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.columns
            .iter()
            .position(|c| c == field)
            .and_then(|i| self.values.get(i))
    }

    /// Identifier as rendered text
    pub fn identifier(&self) -> String {
        self.values[self.id_position].to_string()
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Immutable result of one batch: shared columns plus records in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    columns: Arc<[String]>,
    id_position: usize,
    records: Vec<NormalizedRecord>,
}

impl Snapshot {
    pub fn new(columns: Arc<[String]>, id_position: usize, records: Vec<NormalizedRecord>) -> Self {
        Self {
            columns,
            id_position,
            records,
        }
    }

    /// Zero-row snapshot with a known schema
    pub fn empty(columns: Arc<[String]>, id_position: usize) -> Self {
        Self::new(columns, id_position, Vec::new())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn shared_columns(&self) -> Arc<[String]> {
        self.columns.clone()
    }

    pub fn id_position(&self) -> usize {
        self.id_position
    }

    pub fn has_column(&self, field: &str) -> bool {
        self.columns.iter().any(|c| c == field)
    }

    pub fn records(&self) -> &[NormalizedRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NormalizedRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty(Arc::from(Vec::<String>::new()), 0)
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a NormalizedRecord;
    type IntoIter = std::slice::Iter<'a, NormalizedRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

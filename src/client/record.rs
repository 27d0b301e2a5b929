//! Result records
//!
//! One row of a query response after the backend's tables have been
//! decoded, keyed by column name.

use crate::model::Value;
use crate::query::{QueryError, QueryResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A decoded response row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxRecord {
    /// Index of the response table the row belongs to
    pub table: usize,
    /// Cells keyed by column name
    pub values: BTreeMap<String, Value>,
}

impl FluxRecord {
    pub fn new(table: usize) -> Self {
        Self {
            table,
            values: BTreeMap::new(),
        }
    }

    /// Add a cell
    pub fn with_value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Remove a cell, returning its value
    pub fn take(&mut self, column: &str) -> Option<Value> {
        self.values.remove(column)
    }

    /// `_time` column
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.get("_time").and_then(Value::as_datetime)
    }

    /// `_measurement` column
    pub fn measurement(&self) -> Option<&str> {
        self.get("_measurement").and_then(Value::as_str)
    }

    /// `_value` column
    pub fn value(&self) -> Option<&Value> {
        self.get("_value")
    }
}

/// Maps a response row onto a caller type
pub trait FromRecord: Sized {
    fn from_record(record: FluxRecord) -> QueryResult<Self>;
}

impl FromRecord for FluxRecord {
    fn from_record(record: FluxRecord) -> QueryResult<Self> {
        Ok(record)
    }
}

/// The row's `_value` cell
impl FromRecord for Value {
    fn from_record(mut record: FluxRecord) -> QueryResult<Self> {
        record
            .take("_value")
            .ok_or_else(|| QueryError::Mapping(format!("record of table {} has no _value", record.table)))
    }
}

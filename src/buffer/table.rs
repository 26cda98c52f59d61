//! Accumulated table of committed rows

use super::Row;
use crate::Result;
use arrow_array::{ArrayRef, RecordBatch, RecordBatchOptions, StringArray};
use arrow_schema::{DataType, Field, Schema};
use indexmap::IndexSet;
use std::sync::Arc;

/// Rows committed across cycles, with the union of their columns.
///
/// Columns keep first-seen order. A row that lacks a column reads as null.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: IndexSet<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append committed rows, widening the column set as needed.
    pub fn append(&mut self, rows: Vec<Row>) {
        for row in &rows {
            for key in row.keys() {
                if !self.columns.contains(key) {
                    self.columns.insert(key.clone());
                }
            }
        }
        self.rows.extend(rows);
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Convert to a record batch of nullable UTF-8 columns.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect();
        let schema = Arc::new(Schema::new(fields));

        let arrays: Vec<ArrayRef> = self
            .columns
            .iter()
            .map(|name| {
                let values: StringArray = self
                    .rows
                    .iter()
                    .map(|row| row.get(name).and_then(|v| v.as_deref()))
                    .collect();
                Arc::new(values) as ArrayRef
            })
            .collect();

        let options = RecordBatchOptions::new().with_row_count(Some(self.rows.len()));
        Ok(RecordBatch::try_new_with_options(schema, arrays, &options)?)
    }
}

//! Row buffering and time alignment
//!
//! A [`RowBuffer`] collects the flattened `key -> cell` mapping of a single
//! collection cycle. [`RowBuffer::commit`] aligns it into rows: scalar cells
//! repeat on every row, series cells (range mode) contribute one element per
//! row and pad with null once exhausted. Committed rows accumulate in a
//! [`Table`].

mod table;

pub use table::Table;

use indexmap::IndexMap;

/// Column seeded into every row buffer with the cycle's start stamp.
pub const RUN_ID_COLUMN: &str = "run_id";

/// One output row: column name to optional value.
pub type Row = IndexMap<String, Option<String>>;

/// Value stored under one column key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    /// Single value, repeated on every committed row
    Scalar(String),
    /// Per-sample values, one per committed row
    Series(Vec<String>),
}

impl Cell {
    /// Number of rows this cell fills on its own.
    pub fn len(&self) -> usize {
        match self {
            Cell::Scalar(_) => 1,
            Cell::Series(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at row `index`, if any.
    pub fn at(&self, index: usize) -> Option<&str> {
        match self {
            Cell::Scalar(value) => Some(value.as_str()),
            Cell::Series(values) => values.get(index).map(String::as_str),
        }
    }
}

/// Flattened values of one collection cycle
#[derive(Debug, Clone, PartialEq)]
pub struct RowBuffer {
    cells: IndexMap<String, Cell>,
}

impl RowBuffer {
    /// Create a buffer seeded with `run_id`.
    pub fn new(run_id: impl Into<String>) -> Self {
        let mut buffer = Self {
            cells: IndexMap::new(),
        };
        buffer.reset(run_id);
        buffer
    }

    /// Drop every value and reseed `run_id`. Nothing carries over between cycles.
    pub fn reset(&mut self, run_id: impl Into<String>) {
        self.cells.clear();
        self.cells
            .insert(RUN_ID_COLUMN.to_string(), Cell::Scalar(run_id.into()));
    }

    /// Store a scalar, overwriting any previous value under `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.cells.insert(key.into(), Cell::Scalar(value.into()));
    }

    /// Append values to the series under `key`, creating it if needed.
    ///
    /// A scalar already stored under `key` becomes the first element.
    pub fn extend<I, S>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cell = self
            .cells
            .entry(key.into())
            .or_insert_with(|| Cell::Series(Vec::new()));
        if let Cell::Scalar(existing) = cell {
            let first = std::mem::take(existing);
            *cell = Cell::Series(vec![first]);
        }
        if let Cell::Series(series) = cell {
            series.extend(values.into_iter().map(Into::into));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Cell> {
        self.cells.get(key)
    }

    /// Column keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    /// Number of keys, `run_id` included.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Align the buffer into rows.
    ///
    /// Produces as many rows as the longest cell (at least one). Row `i`
    /// holds element `i` of every series cell, or null past its end, and the
    /// value of every scalar cell.
    pub fn commit(&self) -> Vec<Row> {
        let max_len = self.cells.values().map(Cell::len).max().unwrap_or(0).max(1);

        (0..max_len)
            .map(|i| {
                self.cells
                    .iter()
                    .map(|(key, cell)| (key.clone(), cell.at(i).map(str::to_string)))
                    .collect()
            })
            .collect()
    }
}

//! In-memory tables handed between pipeline stages
//!
//! A [`Table`] is an ordered list of rows over an ordered list of columns.
//! Every row holds exactly one [`Value`] per column. Stages never mutate a
//! table they received; they build a new one.

use std::collections::HashMap;

pub mod value;

pub use value::{infer_column_type, parse_cell, ColumnType, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given columns
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from rows; short rows are padded with nulls
    pub fn from_rows<C, R>(columns: C, rows: R) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        R: IntoIterator<Item = Vec<Value>>,
    {
        let mut table = Self::new(columns.into_iter().map(Into::into).collect());
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub(crate) fn push_row(&mut self, mut row: Vec<Value>) {
        debug_assert!(
            row.len() <= self.columns.len(),
            "row has {} cells for {} columns",
            row.len(),
            self.columns.len()
        );
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell at `row` in the named column
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// All cells of the named column, in row order
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    /// Same column set and same rows, regardless of column order
    pub fn same_content(&self, other: &Table) -> bool {
        if self.columns.len() != other.columns.len() || self.rows.len() != other.rows.len() {
            return false;
        }
        let mapping: Option<Vec<usize>> = self
            .columns
            .iter()
            .map(|c| other.column_index(c))
            .collect();
        let Some(mapping) = mapping else {
            return false;
        };
        self.rows.iter().zip(&other.rows).all(|(mine, theirs)| {
            mine.iter()
                .zip(&mapping)
                .all(|(value, &j)| *value == theirs[j])
        })
    }

    /// Count of rows per distinct non-null value of `column`
    pub fn key_counts(&self, column: &str) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        if let Some(cells) = self.column(column) {
            for cell in cells.filter(|c| !c.is_null()) {
                *counts.entry(cell.to_string()).or_insert(0) += 1;
            }
        }
        counts
    }
}

use std::sync::Mutex;

use log::warn;

use crate::errors::{Result, StemTissueError};

/// One labelled row of a `RegionTable`
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub label: String,
    pub values: Vec<f64>,
}

/// Ordered rows of named numeric columns.
///
/// Rows keep their insertion order; for distance profiles that order is the
/// class index, for tissue tables the fixed tissue order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegionTable {
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl RegionTable {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, label: impl Into<String>, values: Vec<f64>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(StemTissueError::InvalidParameter(format!(
                "row has {} values for {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        self.rows.push(TableRow {
            label: label.into(),
            values,
        });
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of a named column, in row order
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row.values[index]).collect())
    }

    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        let index = self.column_index(name)?;
        self.rows.get(row).map(|r| r.values[index])
    }

    /// Append a column computed from each row
    pub fn add_column<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&TableRow) -> f64,
    {
        let name = name.into();
        if self.column_index(&name).is_some() {
            warn!("Column {} already exists, appending a duplicate", name);
        }
        for row in &mut self.rows {
            let value = f(row);
            row.values.push(value);
        }
        self.columns.push(name);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Append-only table shared by every image of a batch
#[derive(Debug)]
pub struct SummaryTable {
    inner: Mutex<RegionTable>,
}

impl SummaryTable {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            inner: Mutex::new(RegionTable::new(columns)),
        }
    }

    /// Append one row; the lock is held for the append only
    pub fn append(&self, label: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let mut table = self
            .inner
            .lock()
            .map_err(|_| StemTissueError::Other("summary table lock poisoned".to_string()))?;
        table.push_row(label, values)
    }

    /// Copy of the table in its current state
    pub fn snapshot(&self) -> Result<RegionTable> {
        let table = self
            .inner
            .lock()
            .map_err(|_| StemTissueError::Other("summary table lock poisoned".to_string()))?;
        Ok(table.clone())
    }
}

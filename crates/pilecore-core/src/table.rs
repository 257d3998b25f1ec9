//! Tabular projections handed to reporting and plotting collaborators.

use std::fmt;

use serde::Serialize;

use crate::domain::{CoreError, CptId, PileTipLevel, Result};

/// One cell of a projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Number(f64),
    Int(i64),
    Text(String),
    Bool(bool),
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            Cell::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.filter(|v| v.is_finite()).map_or(Cell::Empty, Cell::Number)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::from(Some(value))
    }
}

impl From<usize> for Cell {
    fn from(value: usize) -> Self {
        Cell::Int(value as i64)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<PileTipLevel> for Cell {
    fn from(value: PileTipLevel) -> Self {
        Cell::Number(value.nap())
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => f.write_str("-"),
            Cell::Number(v) => write!(f, "{v:.2}"),
            Cell::Int(v) => write!(f, "{v}"),
            Cell::Text(s) => f.write_str(s),
            Cell::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A row-major table with named columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    name: &'static str,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub(crate) fn new(name: &'static str, columns: &[&str]) -> Self {
        Self {
            name,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub(crate) fn push_row(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn index_of(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| CoreError::UnknownColumn {
                table: self.name,
                column: column.to_string(),
            })
    }

    /// All cells of one column, in row order.
    ///
    /// # Errors
    ///
    /// `CoreError::UnknownColumn` when the table has no such column.
    pub fn column(&self, name: &str) -> Result<Vec<&Cell>> {
        let idx = self.index_of(name)?;
        Ok(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// A new table restricted to `names`, in the given order.
    ///
    /// # Errors
    ///
    /// `CoreError::UnknownColumn` for the first name not in the table.
    pub fn select(&self, names: &[&str]) -> Result<Table> {
        let indices = names
            .iter()
            .map(|n| self.index_of(n))
            .collect::<Result<Vec<_>>>()?;
        Ok(Table {
            name: self.name,
            columns: names.iter().map(|n| n.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        })
    }
}

/// One value column pivoted to levels (rows) × CPTs (columns).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotTable {
    pub column: String,
    pub levels: Vec<PileTipLevel>,
    pub keys: Vec<CptId>,
    /// `values[level][key]`
    pub values: Vec<Vec<Option<f64>>>,
}

impl PivotTable {
    pub fn get(&self, level: PileTipLevel, key: &CptId) -> Option<f64> {
        let row = self.levels.iter().position(|l| *l == level)?;
        let col = self.keys.iter().position(|k| k == key)?;
        self.values[row][col]
    }
}

impl fmt::Display for PivotTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>10}", self.column)?;
        for key in &self.keys {
            write!(f, " {:>14}", key.as_str())?;
        }
        writeln!(f)?;
        for (level, row) in self.levels.iter().zip(&self.values) {
            write!(f, "{:>10}", level.to_string())?;
            for value in row {
                match value {
                    Some(v) => write!(f, " {:>14.1}", v)?,
                    None => write!(f, " {:>14}", "-")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        let mut t = Table::new("example", &["test_id", "value", "validity"]);
        t.push_row(vec!["A".into(), 500.0.into(), true.into()]);
        t.push_row(vec!["B".into(), Cell::from(None::<f64>), false.into()]);
        t
    }

    #[test]
    fn test_column_by_name() {
        let t = table();
        let values: Vec<Option<f64>> = t
            .column("value")
            .unwrap()
            .iter()
            .map(|c| c.as_f64())
            .collect();
        assert_eq!(values, vec![Some(500.0), None]);
    }

    #[test]
    fn test_unknown_column_names_table() {
        let err = table().column("R_x").unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnknownColumn { table: "example", ref column } if column == "R_x"
        ));
    }

    #[test]
    fn test_select_reorders_columns() {
        let selected = table().select(&["validity", "test_id"]).unwrap();
        assert_eq!(selected.columns(), &["validity".to_string(), "test_id".to_string()]);
        assert_eq!(selected.rows()[0][1].as_str(), Some("A"));
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_nan_becomes_empty_and_serialises_as_null() {
        let cell = Cell::from(f64::NAN);
        assert_eq!(cell, Cell::Empty);
        assert_eq!(serde_json::to_string(&cell).unwrap(), "null");
    }
}

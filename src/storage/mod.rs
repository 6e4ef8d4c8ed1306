// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! Tabular persistence boundary
//!
//! The engine talks to table storage through the [`TableStore`] trait:
//! open a named store, list tables, read and write whole tables, run a
//! raw query. The workflow table form is stored through this seam, and
//! Import/Export modules may use it for their own data.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::errors::StatpipeResult;

/// Declared column affinity for a stored table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Text,
}

/// One table column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    pub kind: ColumnKind,
}

impl TableColumn {
    pub fn integer(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ColumnKind::Integer }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ColumnKind::Text }
    }
}

/// An in-memory table: named columns plus rows of cell strings
///
/// Cells travel as strings at this boundary; the column kind controls
/// the stored affinity.
#[derive(Debug, Clone, Default)]
pub struct TableData {
    pub name: String,
    pub columns: Vec<TableColumn>,
    pub rows: Vec<Vec<String>>,
}

impl TableData {
    pub fn new(name: impl Into<String>, columns: Vec<TableColumn>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Index of a column by name (case-insensitive)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Trait for tabular stores
pub trait TableStore: Send + Sync {
    /// Names of the tables present in the store
    fn table_names(&self) -> StatpipeResult<Vec<String>>;

    /// Whether a named table exists
    fn has_table(&self, name: &str) -> StatpipeResult<bool> {
        let needle = name.to_ascii_lowercase();
        Ok(self
            .table_names()?
            .iter()
            .any(|t| t.to_ascii_lowercase() == needle))
    }

    /// Read a whole named table
    fn read_table(&self, name: &str) -> StatpipeResult<TableData>;

    /// Write a whole table, replacing any existing table of that name
    fn write_table(&self, table: &TableData) -> StatpipeResult<()>;

    /// Execute a raw query and collect the result rows
    fn query(&self, sql: &str) -> StatpipeResult<TableData>;
}

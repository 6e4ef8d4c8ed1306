// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! SQLite-backed implementation of [`TableStore`]
//!
//! Uses a single `Mutex<Connection>`; one store per database file.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::errors::{StatpipeError, StatpipeResult};

use super::{ColumnKind, TableColumn, TableData, TableStore};

/// SQLite-backed table store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open an existing SQLite database at `path`
    pub fn open(path: &Path) -> StatpipeResult<Self> {
        if !path.exists() {
            return Err(StatpipeError::WorkflowNotFound { path: path.to_path_buf() });
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open or create a SQLite database at `path`
    pub fn create(path: &Path) -> StatpipeResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StatpipeResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock_conn(&self) -> StatpipeResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StatpipeError::Sqlite {
            message: "connection lock poisoned".to_string(),
        })
    }

    fn cell_to_string(value: ValueRef<'_>) -> String {
        match value {
            ValueRef::Null => String::new(),
            ValueRef::Integer(i) => i.to_string(),
            ValueRef::Real(r) => r.to_string(),
            ValueRef::Text(t) => String::from_utf8_lossy(t).to_string(),
            ValueRef::Blob(_) => String::new(),
        }
    }

    fn collect_rows(stmt: &mut rusqlite::Statement<'_>) -> StatpipeResult<TableData> {
        let columns: Vec<TableColumn> = stmt
            .column_names()
            .iter()
            .map(|name| TableColumn::text(*name))
            .collect();
        let column_count = columns.len();

        let mut table = TableData { name: String::new(), columns, rows: Vec::new() };

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(column_count);
            for i in 0..column_count {
                cells.push(Self::cell_to_string(row.get_ref(i)?));
            }
            table.rows.push(cells);
        }

        Ok(table)
    }

    fn quote_ident(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

impl TableStore for SqliteStore {
    fn table_names(&self) -> StatpipeResult<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn read_table(&self, name: &str) -> StatpipeResult<TableData> {
        let conn = self.lock_conn()?;
        let sql = format!("SELECT * FROM {}", Self::quote_ident(name));
        let mut stmt = conn.prepare(&sql)?;
        let mut table = Self::collect_rows(&mut stmt)?;
        table.name = name.to_string();
        Ok(table)
    }

    fn write_table(&self, table: &TableData) -> StatpipeResult<()> {
        if table.columns.is_empty() {
            return Err(StatpipeError::Sqlite {
                message: format!("table '{}' has no columns", table.name),
            });
        }

        let conn = self.lock_conn()?;

        let column_ddl: Vec<String> = table
            .columns
            .iter()
            .map(|c| {
                let affinity = match c.kind {
                    ColumnKind::Integer => "INTEGER",
                    ColumnKind::Text => "TEXT",
                };
                format!("{} {}", Self::quote_ident(&c.name), affinity)
            })
            .collect();

        let ident = Self::quote_ident(&table.name);
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {ident}; CREATE TABLE {ident} ({});",
            column_ddl.join(", ")
        ))?;

        let placeholders: Vec<String> =
            (1..=table.columns.len()).map(|i| format!("?{}", i)).collect();
        let insert_sql = format!("INSERT INTO {ident} VALUES ({})", placeholders.join(", "));

        let mut stmt = conn.prepare(&insert_sql)?;
        for row in &table.rows {
            if row.len() != table.columns.len() {
                return Err(StatpipeError::Sqlite {
                    message: format!(
                        "row width {} does not match {} columns in table '{}'",
                        row.len(),
                        table.columns.len(),
                        table.name
                    ),
                });
            }
            stmt.execute(rusqlite::params_from_iter(row.iter()))?;
        }

        Ok(())
    }

    fn query(&self, sql: &str) -> StatpipeResult<TableData> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(sql)?;
        Self::collect_rows(&mut stmt)
    }
}

//! `SQLite` Executor
//!
//! This module implements the [`Executor`] contract for `SQLite` databases.
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous driver, no async needed)
//! - The database is opened per statement and never created implicitly
//! - BLOB data is Base64-encoded for display
//! - `SQLite` reports no display size, so widths come from the values
//! - Engine errors keep `SQLite`'s own message text

use rusqlite::{Connection, OpenFlags, Row};
use std::path::{Path, PathBuf};

use crate::config::{ConnectionDefinition, Settings};
use crate::engine::{Executor, ResultSet};
use crate::error::{MiniError, Result};

/// `SQLite` executor bound to the active database file
///
/// With no database selected every statement fails with
/// `CONNECTION_FAILED`.
#[derive(Debug, Clone, Default)]
pub struct SqliteEngine {
    path: Option<PathBuf>,
}

impl SqliteEngine {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: Some(path.into()) }
    }

    /// Executor for the active database of a session
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut engine = Self::default();
        engine.configure(settings)?;
        Ok(engine)
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Executor for SqliteEngine {
    async fn execute(&self, sql: &str) -> Result<ResultSet> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| MiniError::connection_failed("No database selected"))?;
        let conn = open_connection(path)?;
        tracing::info!(database = %path.display(), "executing statement");
        execute_query(&conn, sql)
    }

    fn configure(&mut self, settings: &Settings) -> Result<()> {
        let database = settings.database.as_deref();
        let components =
            matches!(settings.connection.definition, ConnectionDefinition::Components { .. });

        // Component connections name the file through the active database
        self.path = if database.is_none() && components {
            None
        } else {
            Some(settings.connection.sqlite_path(database)?)
        };
        Ok(())
    }
}

/// Open an existing `SQLite` database for reading and writing
fn open_connection(path: &Path) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI;

    Connection::open_with_flags(path, flags).map_err(|e| {
        MiniError::connection_failed(format!(
            "Failed to open SQLite database {}: {e}",
            path.display()
        ))
    })
}

/// Execute a statement and collect its result set
fn execute_query(conn: &Connection, sql: &str) -> Result<ResultSet> {
    let mut stmt = conn.prepare(sql).map_err(|e| MiniError::driver_error(e.to_string()))?;

    let column_names: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();

    // Statements without result columns (INSERT, UPDATE, DELETE, DDL)
    if column_names.is_empty() {
        stmt.execute([]).map_err(|e| MiniError::driver_error(e.to_string()))?;
        return Ok(ResultSet::affected(conn.changes()));
    }

    let rows = stmt.query([]).map_err(|e| MiniError::driver_error(e.to_string()))?;
    let rows = rows
        .mapped(|row| row_to_values(column_names.len(), row))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| MiniError::driver_error(e.to_string()))?;

    Ok(ResultSet::new(column_names, rows))
}

fn row_to_values(
    width: usize,
    row: &Row,
) -> std::result::Result<Vec<serde_json::Value>, rusqlite::Error> {
    (0..width).map(|idx| sqlite_value_to_json(row, idx)).collect()
}

/// Convert `SQLite` value to a nullable scalar
fn sqlite_value_to_json(
    row: &Row,
    idx: usize,
) -> std::result::Result<serde_json::Value, rusqlite::Error> {
    use rusqlite::types::ValueRef;

    let value_ref = row.get_ref(idx)?;

    Ok(match value_ref {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number), // Handle NaN/Infinity as null
        ValueRef::Text(s) => {
            let text = std::str::from_utf8(s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            serde_json::Value::String(text.to_string())
        }
        ValueRef::Blob(b) => {
            use base64::Engine;
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
    })
}

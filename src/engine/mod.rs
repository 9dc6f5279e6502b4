//! Execution Contract and Result Sets
//!
//! This module defines the boundary between the query pipeline and a
//! relational engine: an [`Executor`] takes SQL text and returns a
//! [`ResultSet`] or a driver error carrying the engine's own diagnostic.
//!
//! # Engine Isolation
//! Each engine implementation is independent. Executors are stateless with
//! respect to the pipeline: connections are opened, used, and closed within
//! each call.

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::Result;
use crate::render::{cell_text, display_width};

// Engine-specific implementations
#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Rows returned by an engine
///
/// Values are nullable scalars aligned to `columns`; SQL NULL is
/// `serde_json::Value::Null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Column names in result set
    pub columns: Vec<String>,

    /// Driver-reported display width per column
    pub display_widths: Vec<usize>,

    /// Result rows
    pub rows: Vec<Vec<serde_json::Value>>,

    /// Number of rows affected (for INSERT/UPDATE/DELETE)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
}

impl ResultSet {
    /// Build a result set, deriving display widths from the values
    ///
    /// Use this for drivers that do not report a display size themselves.
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        let display_widths = (0..columns.len())
            .map(|col| {
                rows.iter()
                    .filter_map(|row| row.get(col))
                    .map(|value| display_width(&cell_text(value)))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        Self { columns, display_widths, rows, rows_affected: None }
    }

    /// Replace the display widths with the ones a driver reported
    #[must_use]
    pub fn with_display_widths(mut self, display_widths: Vec<usize>) -> Self {
        self.display_widths = display_widths;
        self
    }

    /// Outcome of a statement that returns no rows
    #[must_use]
    pub fn affected(rows_affected: u64) -> Self {
        Self { rows_affected: Some(rows_affected), ..Self::default() }
    }

    /// Whether the statement produced a row-returning result (even an empty one)
    #[must_use]
    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Executes SQL text against a database
///
/// Called once per classified query and awaited fully before rendering.
/// Failures reported by the engine are returned as
/// [`crate::MiniError::DriverError`] with the native text.
pub trait Executor {
    fn execute(&self, sql: &str) -> impl std::future::Future<Output = Result<ResultSet>> + Send;

    /// Pick up changed session settings (active database, credentials)
    fn configure(&mut self, _settings: &Settings) -> Result<()> {
        Ok(())
    }
}

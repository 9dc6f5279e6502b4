//! MINIQUERY - Terse Query Shell Core
//!
//! MINIQUERY lets a user query a relational database with short token
//! sequences instead of full SQL:
//!
//! ```text
//! users id=5 +name /name      ->  SELECT name FROM users WHERE id = 5 ORDER BY name
//! users age+=1 id=3           ->  UPDATE users SET age = age + 1 WHERE id = 3
//! ```
//!
//! # Pipeline
//! 1. [`classifier`] sorts tokens into a [`ClassifiedQuery`], using the
//!    two-scope [`options`] registry for `-flag` tokens
//! 2. [`deducer`] reconciles the command verb, flags and embedded operators
//!    into one [`QueryKind`], failing on contradiction
//! 3. [`synth`] turns the classified query into SQL text
//! 4. an [`engine`] executor runs it and returns a [`ResultSet`]
//! 5. [`render`] lays the rows out for the terminal
//!
//! [`session`] drives the pipeline and owns all per-session state.
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`options`] - Option registry with radio groups
//! - [`classifier`] - Token classification
//! - [`deducer`] - Query-kind inference
//! - [`config`] - Settings files and connection definitions
//! - [`engine`] - Execution contract and the `SQLite` executor
//! - [`synth`] - SQL synthesis
//! - [`render`] - Result rendering
//! - [`session`] - Session state and command dispatch

pub mod classifier;
pub mod config;
pub mod deducer;
pub mod engine;
pub mod error;
pub mod options;
pub mod render;
pub mod session;
pub mod synth;

// Re-export commonly used types for convenience
pub use classifier::{classify, ClassifiedQuery, Operator};
pub use config::{ConnectionDefinition, ConnectionSettings, RunMode, Settings};
pub use deducer::{assign_query_kind, deduce_query_type, QueryKind};
#[cfg(feature = "sqlite")]
pub use engine::sqlite::SqliteEngine;
pub use engine::{Executor, ResultSet};
pub use error::{MiniError, Result};
pub use options::{OptionGroup, OptionRegistry, OptionValue, Scope};
pub use render::{DisplayMode, Renderer, Rendering, TerminalWidth};
pub use session::{Outcome, Session};
pub use synth::{SqlSynthesizer, TqlSynthesizer};

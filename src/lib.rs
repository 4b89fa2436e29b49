//! dbcell — notebook cell commands for an embedded analytical database
//!
//! The crate is an in-process extension, not an executable: a notebook or
//! REPL host registers a [`CellDispatcher`] as its command handler and a
//! [`Completer`] as its keystroke hook, and supplies a [`Namespace`] as the
//! bridge to its own variable scope.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dbcell::{CellDispatcher, DuckDbEngine, Namespace};
//!
//! let mut cells = CellDispatcher::new(Arc::new(DuckDbEngine::new()));
//! let mut ns = Namespace::new();
//! let answer = cells.run_line("-o answer select 42 as val", &mut ns)?;
//! assert!(!answer.is_null());
//! # Ok::<(), dbcell::Error>(())
//! ```
pub mod autocomplete;
pub mod cli;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod engine;
pub mod engine_duckdb;
pub mod error;
pub mod explain;
pub mod format;
pub mod graph;
pub mod logging;
pub mod output;
pub mod sqlfmt;
pub mod template;
pub mod value;

pub use autocomplete::Completer;
pub use config::Config;
pub use connection::ConnectionManager;
pub use dispatch::CellDispatcher;
pub use engine::{Engine, EngineError, EngineSession, Relation, SessionHandle};
pub use engine_duckdb::DuckDbEngine;
pub use error::{Error, Result};
pub use explain::ExplainMode;
pub use graph::{DotRenderer, Graph, GraphRenderer};
pub use output::OutputFormat;
pub use value::{DataTable, Namespace, Value};

//! Engine abstraction layer
//!
//! The dispatcher never talks to the embedded database directly: it goes
//! through the [`Engine`] / [`EngineSession`] traits, which expose exactly the
//! narrow call surface the cell commands need. Swapping the engine (or
//! injecting a mock in tests) is a matter of handing the dispatcher a
//! different [`Engine`] implementation.
use std::fmt;
use std::sync::Arc;

use duckdb::arrow::record_batch::RecordBatch;
use thiserror::Error;

/// Errors reported by an engine implementation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The handle is no longer usable. The dispatcher reacts to this by
    /// resetting its current connection to absent before re-raising.
    #[error("connection is closed")]
    ConnectionClosed,

    #[error("failed to open '{target}': {message}")]
    Open { target: String, message: String },

    #[error("query error: {0}")]
    Query(String),

    #[error("metadata error: {0}")]
    Metadata(String),
}

/// Shape requested for a profiled execution plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileFormat {
    /// Human-readable query tree with per-operator timings.
    Tree,
    /// JSON document with per-operator timings and cardinalities.
    Json,
}

/// A scalar bound to a positional query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// The raw result of a query: column names plus Arrow record batches.
///
/// This is what the `relation` output tag hands back unmodified; every other
/// output format is a transform over it.
#[derive(Debug, Clone)]
pub struct Relation {
    pub columns: Vec<String>,
    pub batches: Vec<RecordBatch>,
}

impl Relation {
    pub fn row_count(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "relation [{}] ({} rows)",
            self.columns.join(", "),
            self.row_count()
        )
    }
}

/// A live handle to the engine. Cheap to clone, safe to store in the host
/// namespace and hand back out via `--get-connection`.
pub type SessionHandle = Arc<dyn EngineSession>;

/// Factory side of the engine: where handles come from.
pub trait Engine: Send + Sync {
    /// The process-wide default handle. Implementations return the same
    /// shared session on every call.
    fn default_session(&self) -> Result<SessionHandle, EngineError>;

    /// Open a new handle from a connection string (`:memory:` or a file path).
    fn open(&self, target: &str) -> Result<SessionHandle, EngineError>;
}

/// Operations on one engine handle.
pub trait EngineSession: Send + Sync {
    /// Execute a statement. `Ok(None)` means the statement produced no result
    /// shape at all (DDL); an empty relation is still `Some`.
    fn execute(&self, sql: &str, params: &[ParamValue]) -> Result<Option<Relation>, EngineError>;

    /// Names of the base tables referenced by `sql`, without executing it.
    fn referenced_tables(&self, sql: &str) -> Result<Vec<String>, EngineError>;

    /// All table names visible on this handle.
    fn table_names(&self) -> Result<Vec<String>, EngineError>;

    /// Column names of one table.
    fn column_names(&self, table: &str) -> Result<Vec<String>, EngineError>;

    /// Non-profiled execution plan as text.
    fn explain(&self, sql: &str) -> Result<String, EngineError>;

    /// Execute `sql` with profiling enabled and return the profiled plan in
    /// the requested shape.
    fn profiled_plan(&self, sql: &str, format: ProfileFormat) -> Result<String, EngineError>;

    /// Serialize the raw query text to the engine's AST JSON.
    fn ast_json(&self, sql: &str) -> Result<String, EngineError>;

    /// A short human-readable description of the handle (used by prompts and
    /// debug output).
    fn describe_target(&self) -> String;

    /// Close the handle. Idempotent; later calls on the session report
    /// [`EngineError::ConnectionClosed`].
    fn close(&self) -> Result<(), EngineError>;
}

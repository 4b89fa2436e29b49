//! DuckDB engine implementation
//!
//! The production [`Engine`]: an embedded DuckDB instance per handle, with
//! Arrow record batches as the result interchange. Profiling and AST
//! serialization go through the engine's own PRAGMA / `json_serialize_sql`
//! surface.
use std::sync::{Arc, Mutex};

use duckdb::Connection;
use duckdb::params_from_iter;
use duckdb::types::Value as DuckValue;
use duckdb::arrow::record_batch::RecordBatch;
use tracing::debug;

use crate::engine::{
    Engine, EngineError, EngineSession, ParamValue, ProfileFormat, Relation, SessionHandle,
};
use crate::value::DataTable;

/// Engine over embedded DuckDB. The default handle is one shared in-memory
/// session, created lazily on first use.
#[derive(Default)]
pub struct DuckDbEngine {
    default: Mutex<Option<SessionHandle>>,
}

impl DuckDbEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for DuckDbEngine {
    fn default_session(&self) -> Result<SessionHandle, EngineError> {
        let mut guard = self.default.lock().expect("default handle lock");
        if guard.is_none() {
            debug!("creating default in-memory session");
            *guard = Some(Arc::new(DuckDbSession::open(":memory:")?));
        }
        Ok(guard.as_ref().expect("just created").clone())
    }

    fn open(&self, target: &str) -> Result<SessionHandle, EngineError> {
        Ok(Arc::new(DuckDbSession::open(target)?))
    }
}

/// One DuckDB connection. Interior mutex because the raw connection is not
/// Sync; the dispatch model itself stays single-threaded.
pub struct DuckDbSession {
    conn: Mutex<Option<Connection>>,
    target: String,
}

impl DuckDbSession {
    pub fn open(target: &str) -> Result<Self, EngineError> {
        let conn = if target == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(target)
        }
        .map_err(|e| EngineError::Open {
            target: target.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            target: target.to_string(),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let guard = self.conn.lock().expect("connection lock");
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(EngineError::ConnectionClosed),
        }
    }

    fn pragma(&self, sql: &str) -> Result<(), EngineError> {
        self.with_conn(|conn| {
            conn.execute_batch(sql)
                .map_err(|e| EngineError::Query(e.to_string()))
        })
    }
}

fn to_duck_value(param: &ParamValue) -> DuckValue {
    match param {
        ParamValue::Null => DuckValue::Null,
        ParamValue::Bool(b) => DuckValue::Boolean(*b),
        ParamValue::Int(i) => DuckValue::BigInt(*i),
        ParamValue::Float(f) => DuckValue::Double(*f),
        ParamValue::Text(s) => DuckValue::Text(s.clone()),
    }
}

/// Join the last column of a result into one text blob, the shape EXPLAIN
/// variants come back in.
fn last_column_text(relation: Option<Relation>) -> String {
    match relation {
        Some(relation) => {
            let table = DataTable::from_relation(&relation);
            table
                .rows
                .iter()
                .filter_map(|row| row.last().cloned())
                .collect::<Vec<_>>()
                .join("\n")
        }
        None => String::new(),
    }
}

/// Collect base-table names from a serialized AST, depth first.
fn collect_base_tables(node: &serde_json::Value, out: &mut Vec<String>) {
    match node {
        serde_json::Value::Object(map) => {
            if map.get("type").and_then(|v| v.as_str()) == Some("BASE_TABLE") {
                if let Some(name) = map.get("table_name").and_then(|v| v.as_str()) {
                    if !name.is_empty() && !out.iter().any(|t| t == name) {
                        out.push(name.to_string());
                    }
                }
            }
            for child in map.values() {
                collect_base_tables(child, out);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_base_tables(item, out);
            }
        }
        _ => {}
    }
}

impl EngineSession for DuckDbSession {
    fn execute(&self, sql: &str, params: &[ParamValue]) -> Result<Option<Relation>, EngineError> {
        debug!(sql = %sql, params = params.len(), "executing");
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| EngineError::Query(e.to_string()))?;

            let batches: Vec<RecordBatch> = if params.is_empty() {
                stmt.query_arrow([])
                    .map_err(|e| EngineError::Query(e.to_string()))?
                    .collect()
            } else {
                let values: Vec<DuckValue> = params.iter().map(to_duck_value).collect();
                stmt.query_arrow(params_from_iter(values))
                    .map_err(|e| EngineError::Query(e.to_string()))?
                    .collect()
            };

            let columns: Vec<String> = match batches.first() {
                Some(batch) => batch
                    .schema()
                    .fields()
                    .iter()
                    .map(|f| f.name().clone())
                    .collect(),
                // Column metadata is only valid once the statement has run.
                None => (0..stmt.column_count())
                    .map(|i| {
                        stmt.column_name(i)
                            .map(|name| name.to_string())
                            .unwrap_or_else(|_| format!("col_{i}"))
                    })
                    .collect(),
            };

            if columns.is_empty() {
                // Statement with no result shape (DDL).
                return Ok(None);
            }
            Ok(Some(Relation { columns, batches }))
        })
    }

    fn referenced_tables(&self, sql: &str) -> Result<Vec<String>, EngineError> {
        let ast: serde_json::Value = serde_json::from_str(&self.ast_json(sql)?)
            .map_err(|e| EngineError::Metadata(format!("unparseable AST: {e}")))?;
        let mut tables = Vec::new();
        collect_base_tables(&ast, &mut tables);
        Ok(tables)
    }

    fn table_names(&self) -> Result<Vec<String>, EngineError> {
        let relation = self.execute("PRAGMA show_tables", &[])?;
        Ok(match relation {
            Some(relation) => DataTable::from_relation(&relation)
                .rows
                .into_iter()
                .filter_map(|row| row.into_iter().next())
                .collect(),
            None => vec![],
        })
    }

    fn column_names(&self, table: &str) -> Result<Vec<String>, EngineError> {
        let escaped = table.replace('\'', "''");
        let relation = self.execute(&format!("PRAGMA table_info('{escaped}')"), &[])?;
        Ok(match relation {
            Some(relation) => DataTable::from_relation(&relation)
                .rows
                .into_iter()
                .filter_map(|row| row.into_iter().nth(1))
                .collect(),
            None => vec![],
        })
    }

    fn explain(&self, sql: &str) -> Result<String, EngineError> {
        let relation = self.execute(&format!("EXPLAIN {sql}"), &[])?;
        Ok(last_column_text(relation))
    }

    fn profiled_plan(&self, sql: &str, format: ProfileFormat) -> Result<String, EngineError> {
        let pragma = match format {
            ProfileFormat::Tree => "PRAGMA enable_profiling='query_tree'",
            ProfileFormat::Json => "PRAGMA enable_profiling='json'",
        };
        self.pragma(pragma)?;
        let result = self.execute(&format!("EXPLAIN ANALYZE {sql}"), &[]);
        // Profiling is a session-level switch; always restore it.
        let _ = self.pragma("PRAGMA disable_profiling");
        Ok(last_column_text(result?))
    }

    fn ast_json(&self, sql: &str) -> Result<String, EngineError> {
        let relation = self.execute(
            "SELECT json_serialize_sql(?)",
            &[ParamValue::Text(sql.to_string())],
        )?;
        let relation = relation.ok_or_else(|| {
            EngineError::Metadata("AST serialization returned no result".to_string())
        })?;
        let table = DataTable::from_relation(&relation);
        table
            .rows
            .first()
            .and_then(|row| row.first())
            .cloned()
            .ok_or_else(|| EngineError::Metadata("AST serialization returned no rows".to_string()))
    }

    fn describe_target(&self) -> String {
        self.target.clone()
    }

    fn close(&self) -> Result<(), EngineError> {
        let mut guard = self.conn.lock().expect("connection lock");
        match guard.take() {
            Some(conn) => conn
                .close()
                .map_err(|(_, e)| EngineError::Query(e.to_string())),
            None => Ok(()),
        }
    }
}

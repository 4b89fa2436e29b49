//! Cell command dispatch
//!
//! The dispatcher is what the host environment registers as its command
//! handler: it parses the flag line, resolves the query text and the target
//! connection, routes execution through the output or introspection resolver,
//! and hands the produced value back (optionally binding it to a namespace
//! variable on the way out).
use std::fs;
use std::sync::Arc;

use tracing::debug;

use crate::cli::CellArgs;
use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::engine::{Engine, EngineError, ParamValue, SessionHandle};
use crate::error::{Error, Result};
use crate::explain::{self, ExplainMode};
use crate::graph::{DotRenderer, GraphRenderer};
use crate::output::{self, FormatArgs, OutputFormat};
use crate::sqlfmt::format_sql;
use crate::template;
use crate::value::{Namespace, Value};

pub struct CellDispatcher {
    connections: ConnectionManager,
    default_format: OutputFormat,
    renderer: Option<Arc<dyn GraphRenderer>>,
}

impl CellDispatcher {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            connections: ConnectionManager::new(engine),
            default_format: OutputFormat::default(),
            renderer: Some(Arc::new(DotRenderer)),
        }
    }

    pub fn from_config(engine: Arc<dyn Engine>, config: &Config) -> Self {
        let mut dispatcher = Self::new(engine);
        if let Ok(format) = OutputFormat::parse(&config.default_format) {
            dispatcher.default_format = format;
        }
        dispatcher
    }

    /// Replace (or remove) the graph renderer. Without one, graph
    /// introspection modes yield nothing.
    pub fn with_renderer(mut self, renderer: Option<Arc<dyn GraphRenderer>>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn default_format(&self) -> OutputFormat {
        self.default_format
    }

    /// Dispatch a single-line invocation.
    pub fn run_line(&mut self, line: &str, namespace: &mut Namespace) -> Result<Value> {
        self.run(line, "", namespace)
    }

    /// Dispatch a flag line plus a multi-line body.
    pub fn run_cell(&mut self, line: &str, body: &str, namespace: &mut Namespace) -> Result<Value> {
        self.run(line, body, namespace)
    }

    fn run(&mut self, line: &str, body: &str, namespace: &mut Namespace) -> Result<Value> {
        let args = CellArgs::parse_line(line)?;

        // Exactly one query text per invocation: a file wins over the
        // remainder + body.
        let query = match &args.read_file {
            Some(path) => fs::read_to_string(path).map_err(|e| Error::QueryFile {
                path: path.clone(),
                source: e,
            })?,
            None => {
                let mut q = args.remainder();
                if !body.trim().is_empty() {
                    q.push('\n');
                    q.push_str(body);
                }
                q
            }
        };
        let mut query = query.trim().to_string();

        if args.template {
            query = template::apply(&query, namespace)?;
        }

        if args.list_formats {
            return Ok(Value::Names(OutputFormat::names()));
        }
        if args.get_connection {
            return Ok(match self.connections.current() {
                Some(handle) => Value::Connection(handle.clone()),
                None => Value::Null,
            });
        }
        if args.format_sql {
            return Ok(Value::Text(format_sql(&query)));
        }

        if args.close {
            self.connections.close()?;
        }

        // Validate modes eagerly, before anything reaches the engine.
        let one_shot_format = args
            .output_format
            .as_deref()
            .map(OutputFormat::parse)
            .transpose()?;
        let explain_mode = args
            .explain_mode
            .as_deref()
            .map(ExplainMode::parse)
            .transpose()?;

        let mut format_args = FormatArgs::new();
        for (name, value) in args.format_arg_pairs() {
            format_args.insert(name, value);
        }

        // Connection selection: default, then named object, then connection
        // string; the last assignment wins.
        let mut pending: Option<SessionHandle> = None;
        if args.default_connection {
            pending = Some(self.connections.default_handle()?);
        }
        if let Some(name) = &args.connection_name {
            pending = Some(namespace.connection(name)?);
        }
        if let Some(target) = &args.connection_string {
            pending = Some(self.connections.open(target)?);
        }

        if query.is_empty() {
            // Flag-driven state changes still apply without a query.
            if let Some(format) = one_shot_format {
                debug!(format = %format, "sticky output format changed");
                self.default_format = format;
            }
            if let Some(handle) = pending {
                self.connections.set_current(handle);
            }
            debug!("nothing to execute");
            return Ok(Value::Null);
        }

        // A selection made together with a query is used for this invocation
        // only; the current connection is untouched.
        let session = match pending {
            Some(handle) => handle,
            None => self.connections.current_or_default()?,
        };

        if args.tables {
            return session
                .referenced_tables(&query)
                .map(Value::Names)
                .map_err(|e| self.engine_failure(e, &query));
        }

        let params: Vec<ParamValue> = args
            .params
            .iter()
            .map(|name| namespace.param(name))
            .collect::<Result<_>>()?;

        let value = if let Some(mode) = explain_mode {
            explain::run(&session, mode, &query, self.renderer.as_deref())
                .map_err(|e| self.engine_failure(e, &query))?
        } else {
            let format = one_shot_format.unwrap_or(self.default_format);
            let relation = session
                .execute(&query, &params)
                .map_err(|e| self.engine_failure(e, &query))?;
            output::apply(format, relation, &format_args)
        };

        if let Some(name) = &args.output_variable {
            namespace.set(name, value.clone());
        }
        Ok(value)
    }

    /// Wrap an engine failure with the offending query. The connection-broken
    /// signal additionally resets the current connection so the next call
    /// reconnects to the default handle.
    fn engine_failure(&mut self, error: EngineError, query: &str) -> Error {
        match error {
            EngineError::ConnectionClosed => {
                debug!("engine reported the connection broken, resetting");
                self.connections.reset();
                Error::ConnectionBroken
            }
            other => Error::Execution {
                query: query.to_string(),
                source: other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::engine::mock::{MockEngine, MockSession};
    use crate::engine_duckdb::DuckDbEngine;
    use crate::value::DataTable;

    fn mock_dispatcher() -> (Arc<MockEngine>, CellDispatcher) {
        let engine = MockEngine::new();
        let dispatcher = CellDispatcher::new(engine.clone());
        (engine, dispatcher)
    }

    #[test]
    fn sticky_format_changes_without_executing() {
        let (engine, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();

        let value = dispatcher.run_line("-t arrow", &mut ns).unwrap();
        assert!(value.is_null());
        assert_eq!(dispatcher.default_format(), OutputFormat::Arrow);
        assert!(engine.default.executed().is_empty());
        assert_eq!(engine.default_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invalid_format_fails_before_any_engine_call() {
        let (engine, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();

        let err = dispatcher.run_line("-t invalid_type select 1", &mut ns).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { .. }));
        assert!(engine.default.executed().is_empty());
        assert_eq!(engine.default_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invalid_explain_mode_fails_before_any_engine_call() {
        let (engine, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();

        let err = dispatcher
            .run_line("-e invalid_explain select 1", &mut ns)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidExplainMode { .. }));
        assert!(engine.default.executed().is_empty());
    }

    #[test]
    fn close_when_absent_is_a_noop() {
        let (_, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();
        dispatcher.run_line("--close", &mut ns).unwrap();
        assert!(dispatcher.connections().current().is_none());
    }

    #[test]
    fn close_then_query_reconnects_to_default() {
        let (engine, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();

        dispatcher.run_line("--cn other.db", &mut ns).unwrap();
        assert_eq!(
            dispatcher.connections().current().unwrap().describe_target(),
            "other.db"
        );

        dispatcher.run_line("--close", &mut ns).unwrap();
        assert!(dispatcher.connections().current().is_none());

        dispatcher.run_line("select 1", &mut ns).unwrap();
        assert_eq!(engine.default_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.default.executed(), vec!["select 1"]);
    }

    #[test]
    fn empty_query_commits_the_selected_connection() {
        let (engine, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();

        dispatcher.run_line("--cn file.db", &mut ns).unwrap();
        assert_eq!(engine.opened.lock().unwrap().as_slice(), ["file.db"]);
        assert_eq!(
            dispatcher.connections().current().unwrap().describe_target(),
            "file.db"
        );
    }

    #[test]
    fn selection_with_a_query_is_one_shot() {
        let (engine, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();

        dispatcher.run_line("--cn file.db select 1", &mut ns).unwrap();
        assert_eq!(engine.opened.lock().unwrap().as_slice(), ["file.db"]);
        assert!(dispatcher.connections().current().is_none());
        assert!(engine.default.executed().is_empty());
    }

    #[test]
    fn binding_by_name_reports_lookup_and_type_errors() {
        let (_, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();
        ns.set("not_a_connection", Value::Text("just a string".into()));

        let err = dispatcher
            .run_line("--co missing select 1", &mut ns)
            .unwrap_err();
        assert!(matches!(err, Error::NameNotFound(_)));

        let err = dispatcher
            .run_line("--co not_a_connection select 1", &mut ns)
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn binding_by_name_uses_the_stored_handle() {
        let (_, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();
        let stored = MockSession::new("stored.db");
        ns.set("con", Value::Connection(stored.clone()));

        dispatcher.run_line("--co con select 7", &mut ns).unwrap();
        assert_eq!(stored.executed(), vec!["select 7"]);
    }

    #[test]
    fn tables_flag_short_circuits_execution() {
        let (engine, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();

        let value = dispatcher
            .run_line("--tables select * from people", &mut ns)
            .unwrap();
        match value {
            Value::Names(names) => assert_eq!(names, vec!["people", "orders"]),
            other => panic!("expected names, got {other:?}"),
        }
        // The introspection call is the only engine traffic.
        assert_eq!(engine.default.executed(), vec!["select * from people"]);
    }

    #[test]
    fn broken_connection_resets_current_and_surfaces() {
        let (_, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();
        let broken = MockSession::failing("broken.db", || EngineError::ConnectionClosed);
        dispatcher.connections.set_current(broken);

        let err = dispatcher.run_line("select 1", &mut ns).unwrap_err();
        assert!(matches!(err, Error::ConnectionBroken));
        assert!(dispatcher.connections().current().is_none());
    }

    #[test]
    fn execution_errors_carry_the_query_text() {
        let (_, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();
        let failing = MockSession::failing("x", || EngineError::Query("boom".into()));
        dispatcher.connections.set_current(failing);

        let err = dispatcher
            .run_line("select * from nowhere", &mut ns)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("select * from nowhere"));
        assert!(message.contains("boom"));
        // A plain query error does not reset the connection.
        assert!(dispatcher.connections().current().is_some());
    }

    #[test]
    fn list_formats_and_get_connection_never_execute() {
        let (engine, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();

        match dispatcher.run_line("-l", &mut ns).unwrap() {
            Value::Names(names) => assert!(names.contains(&"table".to_string())),
            other => panic!("expected names, got {other:?}"),
        }
        assert!(dispatcher.run_line("-g", &mut ns).unwrap().is_null());

        dispatcher.run_line("-d", &mut ns).unwrap();
        match dispatcher.run_line("-g", &mut ns).unwrap() {
            Value::Connection(handle) => assert_eq!(handle.describe_target(), ":memory:"),
            other => panic!("expected connection, got {other:?}"),
        }
        assert!(engine.default.executed().is_empty());
    }

    #[test]
    fn format_sql_flag_beautifies_instead_of_executing() {
        let (engine, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();
        match dispatcher.run_line("-f select 1 as x", &mut ns).unwrap() {
            Value::Text(text) => assert!(text.contains("SELECT")),
            other => panic!("expected text, got {other:?}"),
        }
        assert!(engine.default.executed().is_empty());
    }

    #[test]
    fn body_is_appended_to_the_remainder() {
        let (engine, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();
        dispatcher
            .run_cell("select *", "from people", &mut ns)
            .unwrap();
        assert_eq!(engine.default.executed(), vec!["select *\nfrom people"]);
    }

    #[test]
    fn missing_query_file_is_reported() {
        let (_, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();
        let err = dispatcher
            .run_line("-r /nonexistent/query.sql", &mut ns)
            .unwrap_err();
        assert!(matches!(err, Error::QueryFile { .. }));
    }

    #[test]
    fn query_file_takes_precedence_over_remainder() {
        let (engine, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.sql");
        std::fs::write(&path, "select 99 as from_file").unwrap();

        dispatcher
            .run_line(&format!("-r {} select 1", path.display()), &mut ns)
            .unwrap();
        assert_eq!(engine.default.executed(), vec!["select 99 as from_file"]);
    }

    #[test]
    fn output_variable_binds_the_result() {
        let (_, mut dispatcher) = mock_dispatcher();
        let mut ns = Namespace::new();
        dispatcher
            .run_line("-o myvar select 42 as val", &mut ns)
            .unwrap();
        match ns.get("myvar").unwrap() {
            Value::Table(table) => assert_eq!(table.rows, vec![vec!["42"]]),
            other => panic!("expected table, got {other:?}"),
        }
    }

    // --- end-to-end against the embedded engine ---

    fn duckdb_dispatcher() -> CellDispatcher {
        CellDispatcher::new(Arc::new(DuckDbEngine::new()))
    }

    #[test]
    fn e2e_output_variable_holds_one_cell_table() {
        let mut dispatcher = duckdb_dispatcher();
        let mut ns = Namespace::new();

        let value = dispatcher
            .run_line("-o myvar select 42 as val", &mut ns)
            .unwrap();
        for value in [value, ns.get("myvar").unwrap().clone()] {
            match value {
                Value::Table(DataTable { columns, rows }) => {
                    assert_eq!(columns, vec!["val"]);
                    assert_eq!(rows, vec![vec!["42"]]);
                }
                other => panic!("expected table, got {other:?}"),
            }
        }
    }

    #[test]
    fn e2e_file_connection_shows_up_in_database_list() {
        let mut dispatcher = duckdb_dispatcher();
        let mut ns = Namespace::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells.db");

        dispatcher
            .run_line(&format!("--cn {}", path.display()), &mut ns)
            .unwrap();
        let value = dispatcher
            .run_line("PRAGMA database_list", &mut ns)
            .unwrap();
        match value {
            Value::Table(table) => {
                assert_eq!(table.rows.len(), 1);
                let file_cell = table.rows[0].last().unwrap();
                assert!(
                    file_cell.ends_with("cells.db"),
                    "unexpected file column: {file_cell}"
                );
            }
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn e2e_template_substitution_runs_the_rendered_query() {
        let mut dispatcher = duckdb_dispatcher();
        let mut ns = Namespace::new();
        ns.set("answer", Value::Scalar(serde_json::json!(42)));

        let value = dispatcher
            .run_line("-j select {{ answer }} as val", &mut ns)
            .unwrap();
        match value {
            Value::Table(table) => assert_eq!(table.rows, vec![vec!["42"]]),
            other => panic!("expected table, got {other:?}"),
        }

        let err = dispatcher
            .run_line("-j select {{ unbound }} as val", &mut ns)
            .unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }

    #[test]
    fn e2e_positional_parameters_come_from_the_namespace() {
        let mut dispatcher = duckdb_dispatcher();
        let mut ns = Namespace::new();
        ns.set("x", Value::Scalar(serde_json::json!(41)));

        let value = dispatcher
            .run_line("-p x select ?::BIGINT + 1 as n", &mut ns)
            .unwrap();
        match value {
            Value::Table(table) => assert_eq!(table.rows, vec![vec!["42"]]),
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn e2e_every_explain_mode_answers_on_a_scan() {
        let mut dispatcher = duckdb_dispatcher();
        let mut ns = Namespace::new();

        for mode in [
            "explain",
            "analyze_tree",
            "analyze_json",
            "analyze_graph",
            "ast_json",
            "ast_graph",
            "ast_tree",
        ] {
            let value = dispatcher
                .run_line(&format!("-e {mode} select * from range(10)"), &mut ns)
                .unwrap();
            assert!(!value.is_null(), "{mode} produced null");
        }
    }

    #[test]
    fn e2e_graph_modes_degrade_without_a_renderer() {
        let mut dispatcher = duckdb_dispatcher().with_renderer(None);
        let mut ns = Namespace::new();
        let value = dispatcher
            .run_line("-e analyze_graph select * from range(10)", &mut ns)
            .unwrap();
        assert!(value.is_null());
    }

    #[test]
    fn e2e_sticky_format_applies_to_later_queries() {
        let mut dispatcher = duckdb_dispatcher();
        let mut ns = Namespace::new();

        dispatcher.run_line("-t json", &mut ns).unwrap();
        let value = dispatcher.run_line("select 1 as one", &mut ns).unwrap();
        match value {
            Value::Json(serde_json::Value::Array(rows)) => {
                assert_eq!(rows[0]["one"], serde_json::json!(1));
            }
            other => panic!("expected json, got {other:?}"),
        }
    }
}

//! Editor autocompletion
//!
//! The host editor calls [`Completer::complete`] on keystrokes. Classification
//! of the cursor context is heuristic: a token ending in a period asks for the
//! qualified table's columns, a FROM/JOIN-family context asks for table names,
//! anything else gets the keyword vocabulary plus table names. A completer
//! must never raise into the editor, so every failure path degrades to an
//! empty suggestion list.
use std::panic::{AssertUnwindSafe, catch_unwind};

use regex::Regex;
use tracing::debug;

use crate::connection::ConnectionManager;
use crate::value::Namespace;

/// Phrases after which the next token is a table reference.
pub const SQL_EXPECTS_TABLE: &[&str] = &[
    "UNION",
    "UNION ALL",
    "UNION ALL BY NAME",
    "UNION BY NAME",
    "JOIN",
    "INNER JOIN",
    "LEFT JOIN",
    "RIGHT JOIN",
    "FULL JOIN",
    "LEFT OUTER JOIN",
    "RIGHT OUTER JOIN",
    "FROM",
    "INTO",
];

pub const SQL_PHRASES: &[&str] = &[
    "PRAGMA",
    "SELECT",
    "WHERE",
    "GROUP BY",
    "ORDER BY",
    "LIMIT",
    "INSERT",
    "UPDATE",
    "DELETE",
    "ALTER",
    "DROP",
    "TRUNCATE",
    "TABLE",
    "DATABASE",
    "INDEX",
    "VIEW",
    "FUNCTION",
    "PROCEDURE",
    "TRIGGER",
    "AND",
    "OR",
    "NOT",
    "BETWEEN",
    "LIKE",
    "IN",
    "NULL",
    "IS",
    "EXISTS",
    "COUNT",
    "SUM",
    "MIN",
    "MAX",
    "AVG",
    "DISTINCT",
    "AS",
    "CREATE TABLE",
    "CREATE OR REPLACE TABLE",
    "CREATE TABLE IF NOT EXISTS",
    "CREATE VIEW",
];

pub const PRAGMA_PHRASES: &[&str] = &[
    "PRAGMA version",
    "PRAGMA database_list",
    "PRAGMA database_size",
    "PRAGMA show_tables",
    "PRAGMA show_tables_expanded",
    "PRAGMA table_info('",
    "PRAGMA functions",
    "PRAGMA collations",
    "PRAGMA enable_progress_bar",
    "PRAGMA disable_progress_bar",
    "PRAGMA enable_profiling",
    "PRAGMA disable_profiling",
    "PRAGMA enable_optimizer",
    "PRAGMA disable_optimizer",
    "PRAGMA enable_verification",
    "PRAGMA disable_verification",
    "PRAGMA force_checkpoint",
];

pub struct Completer {
    command: String,
    expects_table: Regex,
}

impl Completer {
    /// `command` is the magic name the dispatcher is registered under in the
    /// host (without the percent prefix).
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            expects_table: Regex::new(r"(?is)\bfrom\b").expect("static pattern"),
        }
    }

    /// Suggestions for the current cursor position. `full_text` is the whole
    /// cell text so far, `token` the token immediately before the cursor.
    pub fn complete(
        &self,
        full_text: &str,
        token: &str,
        connections: &ConnectionManager,
        namespace: &Namespace,
    ) -> Vec<String> {
        catch_unwind(AssertUnwindSafe(|| {
            self.resolve(full_text, token, connections, namespace)
        }))
        .unwrap_or_else(|_| {
            debug!("completion panicked, returning no suggestions");
            Vec::new()
        })
    }

    fn resolve(
        &self,
        full_text: &str,
        token: &str,
        connections: &ConnectionManager,
        namespace: &Namespace,
    ) -> Vec<String> {
        let line_prefix = format!("%{}", self.command);
        let cell_prefix = format!("%%{}", self.command);
        let after_prefix = if let Some(rest) = full_text.strip_prefix(&cell_prefix) {
            rest
        } else if let Some(rest) = full_text.strip_prefix(&line_prefix) {
            rest
        } else {
            return Vec::new();
        };

        if let Some(table) = token.strip_suffix('.') {
            return self.column_suggestions(table, connections, namespace);
        }

        let tables = self.table_suggestions(connections, namespace);
        if self.expects_table.is_match(after_prefix) {
            return tables;
        }

        let mut phrases: Vec<String> = SQL_EXPECTS_TABLE
            .iter()
            .chain(SQL_PHRASES)
            .chain(PRAGMA_PHRASES)
            .map(|s| s.to_string())
            .collect();
        phrases.extend(tables);
        phrases
    }

    /// Column names for a qualifier. A namespace variable shadows an engine
    /// table of the same name; a non-tabular variable yields nothing.
    fn column_suggestions(
        &self,
        table: &str,
        connections: &ConnectionManager,
        namespace: &Namespace,
    ) -> Vec<String> {
        if let Some(value) = namespace.get(table) {
            return value.tabular_columns().unwrap_or_default();
        }
        match connections.current() {
            Some(session) => session.column_names(table).unwrap_or_else(|e| {
                debug!(table = %table, error = %e, "could not fetch columns");
                Vec::new()
            }),
            None => Vec::new(),
        }
    }

    /// Engine table names plus namespace variables bound to tabular objects.
    fn table_suggestions(
        &self,
        connections: &ConnectionManager,
        namespace: &Namespace,
    ) -> Vec<String> {
        let mut names = match connections.current() {
            Some(session) => session.table_names().unwrap_or_else(|e| {
                debug!(error = %e, "could not fetch table names");
                Vec::new()
            }),
            None => Vec::new(),
        };
        names.extend(namespace.tabular_names());
        names
    }
}

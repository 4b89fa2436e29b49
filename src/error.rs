//! Error taxonomy for cell dispatch
use std::path::PathBuf;
use thiserror::Error;

use crate::engine::EngineError;

/// Errors surfaced to the host environment by the dispatcher and resolvers.
///
/// Everything here propagates to the host's normal error-reporting path;
/// only the autocomplete resolver swallows failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown output format '{given}' (expected one of: {expected})")]
    InvalidFormat { given: String, expected: String },

    #[error("unknown introspection mode '{given}' (expected one of: {expected})")]
    InvalidExplainMode { given: String, expected: String },

    #[error("no variable named '{0}' in the session namespace")]
    NameNotFound(String),

    #[error("variable '{name}' is not {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
    },

    #[error("could not read query file '{}': {source}", path.display())]
    QueryFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error executing `{query}`: {source}")]
    Execution { query: String, source: EngineError },

    #[error("connection is no longer usable; it has been reset")]
    ConnectionBroken,

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type Result<T> = std::result::Result<T, Error>;

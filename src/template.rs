//! Query-text templating
//!
//! Applied before anything else touches the query text. Rendering is strict:
//! a placeholder with no matching namespace variable is an error, never a
//! silent empty substitution.
use minijinja::{Environment, UndefinedBehavior};

use crate::error::Result;
use crate::value::Namespace;

/// Substitute namespace scalars into the query text.
pub fn apply(sql: &str, namespace: &Namespace) -> Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    let rendered = env.render_str(sql, namespace.scalars())?;
    Ok(rendered)
}

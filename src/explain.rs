//! Plan and AST introspection
//!
//! An introspection mode replaces normal output resolution for one
//! invocation: instead of the query's rows, the cell yields the engine's
//! execution plan or parsed AST, optionally rendered as a directed graph.
use std::str::FromStr;

use strum::VariantNames;
use tracing::debug;

use crate::engine::{EngineError, ProfileFormat, SessionHandle};
use crate::error::Error;
use crate::graph::{GraphRenderer, ast_graph, ast_outline, plan_graph};
use crate::value::Value;

/// The recognized introspection modes. Mutually exclusive with output
/// formats; selected per invocation, never sticky.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::VariantNames,
)]
#[strum(serialize_all = "snake_case")]
pub enum ExplainMode {
    /// Non-profiled plan, as text.
    Explain,
    /// Profiled plan as a query tree, as text.
    AnalyzeTree,
    /// Profiled plan as a JSON structure.
    AnalyzeJson,
    /// Profiled plan rendered as a directed graph.
    #[strum(to_string = "analyze_graph", serialize = "analyze")]
    AnalyzeGraph,
    /// Parsed AST as a JSON structure.
    AstJson,
    /// Parsed AST rendered as a directed graph.
    AstGraph,
    /// Parsed AST as an indented outline.
    AstTree,
}

impl ExplainMode {
    /// Parse a mode name, reporting the full recognized set on failure.
    pub fn parse(name: &str) -> Result<Self, Error> {
        Self::from_str(name).map_err(|_| Error::InvalidExplainMode {
            given: name.to_string(),
            expected: Self::VARIANTS.join(", "),
        })
    }
}

/// Execute `sql` in the requested introspection mode.
///
/// Graph modes degrade to `Value::Null` when no renderer is configured.
pub fn run(
    session: &SessionHandle,
    mode: ExplainMode,
    sql: &str,
    renderer: Option<&dyn GraphRenderer>,
) -> Result<Value, EngineError> {
    debug!(mode = %mode, "running introspection");
    match mode {
        ExplainMode::Explain => {
            let text = session.explain(sql)?;
            println!("{text}");
            Ok(Value::Text(text))
        }
        ExplainMode::AnalyzeTree => {
            let text = session.profiled_plan(sql, ProfileFormat::Tree)?;
            println!("{text}");
            Ok(Value::Text(text))
        }
        ExplainMode::AnalyzeJson => Ok(Value::Json(profiled_json(session, sql)?)),
        ExplainMode::AnalyzeGraph => {
            let plan = profiled_json(session, sql)?;
            Ok(render(renderer, &plan_graph(&plan)))
        }
        ExplainMode::AstJson => Ok(Value::Json(ast_document(session, sql)?)),
        ExplainMode::AstGraph => {
            let ast = ast_document(session, sql)?;
            Ok(render(renderer, &ast_graph(&ast)))
        }
        ExplainMode::AstTree => {
            let ast = ast_document(session, sql)?;
            Ok(Value::Text(ast_outline(&ast)))
        }
    }
}

fn render(renderer: Option<&dyn GraphRenderer>, graph: &crate::graph::Graph) -> Value {
    match renderer {
        Some(renderer) => Value::Text(renderer.render(graph)),
        None => {
            debug!("no graph renderer configured, returning nothing");
            Value::Null
        }
    }
}

fn profiled_json(session: &SessionHandle, sql: &str) -> Result<serde_json::Value, EngineError> {
    let raw = session.profiled_plan(sql, ProfileFormat::Json)?;
    serde_json::from_str(&raw)
        .map_err(|e| EngineError::Query(format!("profiled plan is not valid JSON: {e}")))
}

fn ast_document(session: &SessionHandle, sql: &str) -> Result<serde_json::Value, EngineError> {
    let raw = session.ast_json(sql)?;
    serde_json::from_str(&raw)
        .map_err(|e| EngineError::Query(format!("serialized AST is not valid JSON: {e}")))
}

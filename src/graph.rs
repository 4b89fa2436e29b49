//! Directed-graph rendering of plans and ASTs
//!
//! Plan and AST introspection modes build a neutral node/edge graph from the
//! engine's JSON output. Turning that graph into something visible is the job
//! of an injected [`GraphRenderer`]; the built-in [`DotRenderer`] emits
//! Graphviz DOT source and leaves layout to external tooling. When no
//! renderer is configured the graph modes yield nothing rather than failing.
use serde_json::Value as JsonValue;

/// A node in a rendered graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: usize,
    pub name: String,
    /// Extra label lines shown under the node name.
    pub properties: Vec<String>,
    pub shape: &'static str,
}

/// A directed edge between two nodes.
#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub from: usize,
    pub to: usize,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    fn add_node(&mut self, name: String, properties: Vec<String>, shape: &'static str) -> usize {
        let id = self.nodes.len();
        self.nodes.push(GraphNode {
            id,
            name,
            properties,
            shape,
        });
        id
    }

    fn add_edge(&mut self, from: usize, to: usize, weight: Option<f64>) {
        self.edges.push(GraphEdge { from, to, weight });
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Graphviz DOT source for this graph, left-to-right rank direction.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph {\n  rankdir=\"LR\";\n");
        for node in &self.nodes {
            let mut label = escape_label(&node.name);
            for prop in &node.properties {
                label.push_str("\\n");
                label.push_str(&escape_label(prop));
            }
            out.push_str(&format!(
                "  n{} [label=\"{}\" shape={}];\n",
                node.id, label, node.shape
            ));
        }
        for edge in &self.edges {
            match edge.weight {
                Some(w) => out.push_str(&format!(
                    "  n{} -> n{} [weight=\"{w}\"];\n",
                    edge.from, edge.to
                )),
                None => out.push_str(&format!("  n{} -> n{};\n", edge.from, edge.to)),
            }
        }
        out.push_str("}\n");
        out
    }
}

fn escape_label(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Strategy for turning a graph into a displayable artifact.
pub trait GraphRenderer: Send + Sync {
    fn render(&self, graph: &Graph) -> String;
}

/// The built-in renderer: emits DOT source text.
pub struct DotRenderer;

impl GraphRenderer for DotRenderer {
    fn render(&self, graph: &Graph) -> String {
        graph.to_dot()
    }
}

/// Node shape by operator name; anything unlisted renders as an ellipse.
fn plan_shape(name: &str) -> &'static str {
    match name {
        "Query" => "tripleoctagon",
        "RESULT_COLLECTOR" | "EXPLAIN_ANALYZE" => "doubleoctagon",
        "PROJECTION" | "DELIM_JOIN" | "HASH_JOIN" => "rectangle",
        _ => "ellipse",
    }
}

/// JSON key lookup tolerant of both legacy and current profiling spellings.
fn plan_str<'a>(node: &'a JsonValue, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| node.get(k).and_then(|v| v.as_str()))
}

fn plan_f64(node: &JsonValue, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| node.get(k).and_then(|v| v.as_f64()))
}

fn plan_u64(node: &JsonValue, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| node.get(k).and_then(|v| v.as_u64()))
}

/// Build a graph from a profiled execution-plan JSON document.
///
/// Nodes carry cardinality, timing (with its share of the root timing) and
/// any extra operator info; edges are weighted by the child's timing.
pub fn plan_graph(plan: &JsonValue) -> Graph {
    let mut graph = Graph::default();
    let total_time = plan_f64(plan, &["timing", "operator_timing", "latency"]);
    plan_graph_node(plan, None, total_time, &mut graph);
    graph
}

fn plan_graph_node(
    node: &JsonValue,
    parent: Option<usize>,
    total_time: Option<f64>,
    graph: &mut Graph,
) {
    let name = plan_str(node, &["name", "operator_type", "query_name"])
        .unwrap_or("Query")
        .to_string();

    let mut properties = Vec::new();
    if let Some(cardinality) = plan_u64(node, &["cardinality", "operator_cardinality"]) {
        properties.push(format!("cardinality={cardinality}"));
    }

    let timing = plan_f64(node, &["timing", "operator_timing", "latency"]);
    if let Some(timing) = timing {
        let percent = match total_time {
            Some(total) if total > 0.0 => timing / total,
            _ => 0.0,
        };
        properties.push(format!("timing={timing:.2} ({:.0}%)", percent * 100.0));
    }

    match node.get("extra_info") {
        Some(JsonValue::String(info)) if !info.trim().is_empty() => {
            properties.push(info.trim().to_string());
        }
        Some(JsonValue::Object(map)) => {
            for (k, v) in map {
                let text = match v {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if !text.trim().is_empty() {
                    properties.push(format!("{k}={}", text.trim()));
                }
            }
        }
        _ => {}
    }

    let id = graph.add_node(name.clone(), properties, plan_shape(&name));
    if let Some(parent) = parent {
        graph.add_edge(parent, id, timing);
    }

    if let Some(JsonValue::Array(children)) = node.get("children") {
        for child in children {
            plan_graph_node(child, Some(id), total_time, graph);
        }
    }
}

/// One node of the parsed-AST tree shared by the graph and outline renderings.
#[derive(Debug, Clone)]
struct AstNode {
    name: String,
    properties: Vec<(String, String)>,
    children: Vec<usize>,
}

/// Flatten an AST JSON document into a node arena.
///
/// Objects become nodes carrying their `type`/`class` keys as properties and
/// every other key as a child subtree; lists flatten into repeated children of
/// the same parent; null, empty-string and empty-list values are pruned.
fn ast_tree_nodes(ast: &JsonValue) -> Vec<AstNode> {
    let mut nodes = Vec::new();
    let root = new_ast_node(&mut nodes, "Root");
    ast_process(ast, root, &mut nodes);
    nodes
}

fn new_ast_node(nodes: &mut Vec<AstNode>, name: &str) -> usize {
    nodes.push(AstNode {
        name: name.to_string(),
        properties: Vec::new(),
        children: Vec::new(),
    });
    nodes.len() - 1
}

fn ast_pruned(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn ast_append_value(node: &mut AstNode, text: String) {
    // Repeated scalar children of one key (e.g. column_names) collapse into a
    // single dot-joined property.
    match node.properties.iter_mut().find(|(k, _)| k == "value") {
        Some((_, existing)) => {
            existing.push('.');
            existing.push_str(&text);
        }
        None => node.properties.push(("value".into(), text)),
    }
}

fn ast_process(value: &JsonValue, node: usize, nodes: &mut Vec<AstNode>) {
    match value {
        JsonValue::Object(map) => {
            if let Some(ty) = map.get("type").and_then(|v| v.as_str()) {
                nodes[node].properties.push(("type".into(), ty.to_string()));
            }
            if let Some(class) = map.get("class").and_then(|v| v.as_str()) {
                if map.get("type").and_then(|v| v.as_str()) != Some(class) {
                    nodes[node]
                        .properties
                        .push(("class".into(), class.to_string()));
                }
            }
            for (key, child) in map {
                if key == "type" || key == "class" || ast_pruned(child) {
                    continue;
                }
                let child_id = new_ast_node(nodes, key);
                nodes[node].children.push(child_id);
                ast_process(child, child_id, nodes);
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                if !ast_pruned(item) {
                    ast_process(item, node, nodes);
                }
            }
        }
        JsonValue::String(s) => ast_append_value(&mut nodes[node], s.clone()),
        JsonValue::Number(n) => ast_append_value(&mut nodes[node], n.to_string()),
        JsonValue::Bool(b) => ast_append_value(&mut nodes[node], b.to_string()),
        JsonValue::Null => {}
    }
}

/// Build a directed graph from an AST JSON document.
pub fn ast_graph(ast: &JsonValue) -> Graph {
    let nodes = ast_tree_nodes(ast);
    let mut graph = Graph::default();
    for node in &nodes {
        let properties = node
            .properties
            .iter()
            .map(|(_, v)| v.clone())
            .collect::<Vec<_>>();
        graph.add_node(node.name.clone(), properties, "rectangle");
    }
    for (id, node) in nodes.iter().enumerate() {
        for &child in &node.children {
            graph.add_edge(id, child, None);
        }
    }
    graph
}

/// Render an AST JSON document as an indented outline, one line per node,
/// dashes indicating depth.
pub fn ast_outline(ast: &JsonValue) -> String {
    let nodes = ast_tree_nodes(ast);
    let mut lines = Vec::new();
    outline_node(&nodes, 0, 0, &mut lines);
    lines.join("\n")
}

fn outline_node(nodes: &[AstNode], id: usize, depth: usize, lines: &mut Vec<String>) {
    let node = &nodes[id];
    let props = node
        .properties
        .iter()
        .map(|(_, v)| v.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    lines.push(format!("{} | {}: {}", "-".repeat(depth), node.name, props));
    for &child in &node.children {
        outline_node(nodes, child, depth + 1, lines);
    }
}

//! Cell values and the host variable namespace
//!
//! A cell invocation evaluates to a [`Value`]; the host environment stores
//! values under names in a [`Namespace`] and the dispatcher reads connection
//! handles, query parameters and template variables back out of it.
use std::collections::BTreeMap;

use duckdb::arrow::array::{
    Array, BooleanArray, Date32Array, Decimal128Array, Float32Array, Float64Array, Int8Array,
    Int16Array, Int32Array, Int64Array, LargeStringArray, StringArray, StringViewArray,
    UInt8Array, UInt16Array, UInt32Array, UInt64Array,
};
use duckdb::arrow::datatypes::DataType;
use duckdb::arrow::record_batch::RecordBatch;
use serde::Serialize;

use crate::engine::{ParamValue, Relation, SessionHandle};
use crate::error::{Error, Result};

/// A fully materialized tabular result: header plus string cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn from_relation(relation: &Relation) -> Self {
        let mut rows = Vec::with_capacity(relation.row_count());
        for batch in &relation.batches {
            for row_idx in 0..batch.num_rows() {
                let row = (0..batch.num_columns())
                    .map(|col_idx| array_value_to_string(batch.column(col_idx).as_ref(), row_idx))
                    .collect();
                rows.push(row);
            }
        }
        Self {
            columns: relation.columns.clone(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Result of a cell invocation, and the kind of thing a namespace entry holds.
#[derive(Clone)]
pub enum Value {
    Null,
    /// A plain scalar (host-bound variables, coerced flag values).
    Scalar(serde_json::Value),
    Text(String),
    Table(DataTable),
    /// Columnar Arrow output, unconverted.
    Batches(Vec<RecordBatch>),
    Json(serde_json::Value),
    Names(Vec<String>),
    Relation(Relation),
    Connection(SessionHandle),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            Value::Text(v) => f.debug_tuple("Text").field(v).finish(),
            Value::Table(v) => f.debug_tuple("Table").field(v).finish(),
            Value::Batches(v) => write!(f, "Batches({} batches)", v.len()),
            Value::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Value::Names(v) => f.debug_tuple("Names").field(v).finish(),
            Value::Relation(v) => write!(f, "Relation({v})"),
            Value::Connection(c) => write!(f, "Connection({})", c.describe_target()),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Column names when this value is tabular, `None` otherwise.
    pub fn tabular_columns(&self) -> Option<Vec<String>> {
        match self {
            Value::Table(t) => Some(t.columns.clone()),
            Value::Relation(r) => Some(r.columns.clone()),
            Value::Batches(batches) => batches.first().map(|b| {
                b.schema()
                    .fields()
                    .iter()
                    .map(|f| f.name().clone())
                    .collect()
            }),
            _ => None,
        }
    }
}

/// The host environment's variable namespace.
///
/// The dispatcher only ever reads and writes through this map; it has no other
/// channel to the host.
#[derive(Default)]
pub struct Namespace {
    vars: BTreeMap<String, Value>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    /// Resolve a name to a connection handle. Missing names report
    /// `NameNotFound`; anything that is not a connection reports
    /// `TypeMismatch`.
    pub fn connection(&self, name: &str) -> Result<SessionHandle> {
        match self.vars.get(name) {
            None => Err(Error::NameNotFound(name.to_string())),
            Some(Value::Connection(handle)) => Ok(handle.clone()),
            Some(_) => Err(Error::TypeMismatch {
                name: name.to_string(),
                expected: "a connection handle",
            }),
        }
    }

    /// Resolve a name to a scalar query parameter.
    pub fn param(&self, name: &str) -> Result<ParamValue> {
        let mismatch = || Error::TypeMismatch {
            name: name.to_string(),
            expected: "a scalar",
        };
        match self.vars.get(name) {
            None => Err(Error::NameNotFound(name.to_string())),
            Some(Value::Null) => Ok(ParamValue::Null),
            Some(Value::Text(s)) => Ok(ParamValue::Text(s.clone())),
            Some(Value::Scalar(v)) => match v {
                serde_json::Value::Null => Ok(ParamValue::Null),
                serde_json::Value::Bool(b) => Ok(ParamValue::Bool(*b)),
                serde_json::Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Ok(ParamValue::Int(i))
                    } else if let Some(f) = n.as_f64() {
                        Ok(ParamValue::Float(f))
                    } else {
                        Err(mismatch())
                    }
                }
                serde_json::Value::String(s) => Ok(ParamValue::Text(s.clone())),
                _ => Err(mismatch()),
            },
            Some(_) => Err(mismatch()),
        }
    }

    /// Names bound to tabular objects, for completion.
    pub fn tabular_names(&self) -> Vec<String> {
        self.vars
            .iter()
            .filter(|(_, v)| v.tabular_columns().is_some())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Column names of a tabular variable, if `name` holds one.
    pub fn tabular_columns(&self, name: &str) -> Option<Vec<String>> {
        self.vars.get(name).and_then(Value::tabular_columns)
    }

    /// Scalar variables as JSON, the template rendering context.
    pub fn scalars(&self) -> BTreeMap<String, serde_json::Value> {
        self.vars
            .iter()
            .filter_map(|(k, v)| {
                let json = match v {
                    Value::Scalar(j) => j.clone(),
                    Value::Text(s) => serde_json::Value::String(s.clone()),
                    _ => return None,
                };
                Some((k.clone(), json))
            })
            .collect()
    }
}

/// Render one Arrow cell as text.
pub(crate) fn array_value_to_string(array: &dyn Array, row_idx: usize) -> String {
    macro_rules! downcast {
        ($ty:ty) => {
            array
                .as_any()
                .downcast_ref::<$ty>()
                .map(|a| a.value(row_idx).to_string())
                .unwrap_or_default()
        };
    }

    if array.is_null(row_idx) {
        return "NULL".to_string();
    }

    match array.data_type() {
        DataType::Int8 => downcast!(Int8Array),
        DataType::Int16 => downcast!(Int16Array),
        DataType::Int32 => downcast!(Int32Array),
        DataType::Int64 => downcast!(Int64Array),
        DataType::UInt8 => downcast!(UInt8Array),
        DataType::UInt16 => downcast!(UInt16Array),
        DataType::UInt32 => downcast!(UInt32Array),
        DataType::UInt64 => downcast!(UInt64Array),
        DataType::Float32 => downcast!(Float32Array),
        DataType::Float64 => downcast!(Float64Array),
        DataType::Boolean => downcast!(BooleanArray),
        DataType::Utf8 => downcast!(StringArray),
        DataType::LargeUtf8 => downcast!(LargeStringArray),
        DataType::Utf8View => downcast!(StringViewArray),
        DataType::Date32 => downcast!(Date32Array),
        DataType::Decimal128(_, _) => array
            .as_any()
            .downcast_ref::<Decimal128Array>()
            .map(|a| a.value_as_string(row_idx))
            .unwrap_or_default(),
        _ => format!("{array:?}"),
    }
}

/// Render one Arrow cell as a JSON value, keeping numbers and booleans typed.
pub(crate) fn array_value_to_json(array: &dyn Array, row_idx: usize) -> serde_json::Value {
    if array.is_null(row_idx) {
        return serde_json::Value::Null;
    }

    macro_rules! int {
        ($ty:ty) => {
            array
                .as_any()
                .downcast_ref::<$ty>()
                .map(|a| serde_json::json!(a.value(row_idx)))
        };
    }

    let typed = match array.data_type() {
        DataType::Int8 => int!(Int8Array),
        DataType::Int16 => int!(Int16Array),
        DataType::Int32 => int!(Int32Array),
        DataType::Int64 => int!(Int64Array),
        DataType::UInt8 => int!(UInt8Array),
        DataType::UInt16 => int!(UInt16Array),
        DataType::UInt32 => int!(UInt32Array),
        DataType::UInt64 => int!(UInt64Array),
        DataType::Float32 => int!(Float32Array),
        DataType::Float64 => int!(Float64Array),
        DataType::Boolean => int!(BooleanArray),
        _ => None,
    };

    typed.unwrap_or_else(|| serde_json::Value::String(array_value_to_string(array, row_idx)))
}


#[cfg(test)]
mod tests {
    use super::tests_support::int_relation;
    use super::*;
    use crate::engine::mock::MockSession;

    #[test]
    fn table_from_relation_renders_cells() {
        let table = DataTable::from_relation(&int_relation("val", &[42, 7]));
        assert_eq!(table.columns, vec!["val"]);
        assert_eq!(table.rows, vec![vec!["42"], vec!["7"]]);
    }

    #[test]
    fn connection_lookup_distinguishes_missing_and_mistyped() {
        let mut ns = Namespace::new();
        ns.set("not_a_connection", Value::Text("just a string".into()));

        assert!(matches!(
            ns.connection("missing"),
            Err(Error::NameNotFound(_))
        ));
        assert!(matches!(
            ns.connection("not_a_connection"),
            Err(Error::TypeMismatch { .. })
        ));

        ns.set("con", Value::Connection(MockSession::new(":memory:")));
        assert!(ns.connection("con").is_ok());
    }

    #[test]
    fn params_resolve_scalars_only() {
        let mut ns = Namespace::new();
        ns.set("n", Value::Scalar(serde_json::json!(3)));
        ns.set("f", Value::Scalar(serde_json::json!(1.5)));
        ns.set("s", Value::Text("abc".into()));
        ns.set("t", Value::Table(DataTable::default()));

        assert_eq!(ns.param("n").unwrap(), ParamValue::Int(3));
        assert_eq!(ns.param("f").unwrap(), ParamValue::Float(1.5));
        assert_eq!(ns.param("s").unwrap(), ParamValue::Text("abc".into()));
        assert!(matches!(ns.param("t"), Err(Error::TypeMismatch { .. })));
        assert!(matches!(ns.param("zz"), Err(Error::NameNotFound(_))));
    }

    #[test]
    fn tabular_names_cover_tables_and_relations() {
        let mut ns = Namespace::new();
        ns.set(
            "df",
            Value::Table(DataTable {
                columns: vec!["a".into()],
                rows: vec![],
            }),
        );
        ns.set("rel", Value::Relation(int_relation("x", &[1])));
        ns.set("scalar", Value::Scalar(serde_json::json!(1)));

        let mut names = ns.tabular_names();
        names.sort();
        assert_eq!(names, vec!["df", "rel"]);
        assert_eq!(ns.tabular_columns("df"), Some(vec!["a".to_string()]));
        assert_eq!(ns.tabular_columns("scalar"), None);
    }
}

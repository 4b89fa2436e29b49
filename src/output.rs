//! Output resolution
//!
//! Maps a requested output-format tag to a concrete transform of a raw query
//! result. The tag set is fixed and validated eagerly when the flag is
//! parsed, so an unknown name never reaches the engine.
use std::collections::BTreeMap;
use std::str::FromStr;

use strum::VariantNames;

use crate::engine::Relation;
use crate::error::Error;
use crate::format::{format_csv, format_markdown, format_preview};
use crate::value::{DataTable, Value, array_value_to_json};

/// The recognized output formats.
///
/// `table` is the sticky default until changed via the format flag.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[strum(serialize_all = "snake_case")]
pub enum OutputFormat {
    /// Materialized header + rows.
    #[default]
    Table,
    /// Markdown rendering of the table.
    Markdown,
    /// Columnar Arrow record batches, unconverted.
    Arrow,
    /// Row-oriented JSON (one object per row).
    Json,
    /// CSV text.
    Csv,
    /// Per-column summary statistics.
    Describe,
    /// Human-readable preview: prints, returns nothing.
    Show,
    /// The raw relation handle, bypassing every transform.
    Relation,
}

impl OutputFormat {
    /// Parse a tag, reporting the full recognized set on failure.
    pub fn parse(name: &str) -> Result<Self, Error> {
        Self::from_str(name).map_err(|_| Error::InvalidFormat {
            given: name.to_string(),
            expected: Self::VARIANTS.join(", "),
        })
    }

    /// The recognized tag names, for the list-formats flag.
    pub fn names() -> Vec<String> {
        Self::VARIANTS.iter().map(|v| v.to_string()).collect()
    }
}

/// Keyword parameters passed through to the transform (`--format-arg`).
pub type FormatArgs = BTreeMap<String, serde_json::Value>;

/// Apply an output format to an engine result.
///
/// A statement that produced no result yields `Value::Null` regardless of the
/// requested tag.
pub fn apply(format: OutputFormat, relation: Option<Relation>, args: &FormatArgs) -> Value {
    let Some(relation) = relation else {
        return Value::Null;
    };

    let limit = args.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize);

    match format {
        OutputFormat::Relation => Value::Relation(relation),
        OutputFormat::Arrow => Value::Batches(relation.batches),
        OutputFormat::Table => Value::Table(truncate(DataTable::from_relation(&relation), limit)),
        OutputFormat::Markdown => Value::Text(format_markdown(&truncate(
            DataTable::from_relation(&relation),
            limit,
        ))),
        OutputFormat::Csv => Value::Text(format_csv(&truncate(
            DataTable::from_relation(&relation),
            limit,
        ))),
        OutputFormat::Json => Value::Json(rows_as_json(&relation, limit)),
        OutputFormat::Describe => Value::Table(describe(&relation)),
        OutputFormat::Show => {
            let preview = format_preview(&truncate(DataTable::from_relation(&relation), limit));
            println!("{preview}");
            Value::Null
        }
    }
}

fn truncate(mut table: DataTable, limit: Option<usize>) -> DataTable {
    if let Some(limit) = limit {
        table.rows.truncate(limit);
    }
    table
}

fn rows_as_json(relation: &Relation, limit: Option<usize>) -> serde_json::Value {
    let mut rows = Vec::new();
    'outer: for batch in &relation.batches {
        for row_idx in 0..batch.num_rows() {
            if limit.is_some_and(|l| rows.len() >= l) {
                break 'outer;
            }
            let mut obj = serde_json::Map::new();
            for (col_idx, name) in relation.columns.iter().enumerate() {
                if col_idx < batch.num_columns() {
                    obj.insert(
                        name.clone(),
                        array_value_to_json(batch.column(col_idx).as_ref(), row_idx),
                    );
                }
            }
            rows.push(serde_json::Value::Object(obj));
        }
    }
    serde_json::Value::Array(rows)
}

/// Per-column type, value count and null count.
fn describe(relation: &Relation) -> DataTable {
    let mut rows = Vec::new();
    let field_types: Vec<String> = relation
        .batches
        .first()
        .map(|b| {
            b.schema()
                .fields()
                .iter()
                .map(|f| format!("{:?}", f.data_type()))
                .collect()
        })
        .unwrap_or_default();

    for (idx, name) in relation.columns.iter().enumerate() {
        let mut count = 0usize;
        let mut nulls = 0usize;
        for batch in &relation.batches {
            if idx < batch.num_columns() {
                let array = batch.column(idx);
                count += array.len() - array.null_count();
                nulls += array.null_count();
            }
        }
        rows.push(vec![
            name.clone(),
            field_types.get(idx).cloned().unwrap_or_default(),
            count.to_string(),
            nulls.to_string(),
        ]);
    }

    DataTable {
        columns: vec![
            "column".into(),
            "type".into(),
            "count".into(),
            "nulls".into(),
        ],
        rows,
    }
}

//! Cell flag schema
//!
//! One declarative clap schema covers the whole flag surface of a cell
//! invocation; there is no second, regex-driven parsing path. The flag line
//! is split shell-style before being handed to the parser, so quoted file
//! paths survive.
use std::path::PathBuf;

use clap::Parser;

use crate::error::Error;

/// Flags recognized on a cell's first line. Everything after the flags is
/// free SQL text.
#[derive(Parser, Debug, Default)]
#[command(name = "cell", no_binary_name = true, disable_version_flag = true)]
pub struct CellArgs {
    /// List the available output formats
    #[arg(short = 'l', long)]
    pub list_formats: bool,

    /// Return the current connection handle
    #[arg(short = 'g', long)]
    pub get_connection: bool,

    /// Use the process-wide default connection
    #[arg(short = 'd', long)]
    pub default_connection: bool,

    /// Reformat (beautify) the query text instead of executing it
    #[arg(short = 'f', long)]
    pub format_sql: bool,

    /// Open a connection from a connection string, such as ':memory:' or
    /// a database file path
    #[arg(long = "cn", value_name = "TARGET")]
    pub connection_string: Option<String>,

    /// Use a connection handle bound to a session variable
    #[arg(long = "co", value_name = "NAME")]
    pub connection_name: Option<String>,

    /// Read the query text from a file
    #[arg(short = 'r', long = "file", value_name = "PATH")]
    pub read_file: Option<PathBuf>,

    /// Set the sticky default output format
    #[arg(short = 't', long = "format", value_name = "FORMAT")]
    pub output_format: Option<String>,

    /// Bind the result to a session variable in addition to returning it
    #[arg(short = 'o', long = "output", value_name = "NAME")]
    pub output_variable: Option<String>,

    /// Return the engine's plan or AST instead of the query output
    #[arg(short = 'e', long = "explain", value_name = "MODE")]
    pub explain_mode: Option<String>,

    /// Render the query through the template engine before execution
    #[arg(short = 'j', long)]
    pub template: bool,

    /// Return the table names referenced by the query instead of executing it
    #[arg(long)]
    pub tables: bool,

    /// Close the current connection
    #[arg(long)]
    pub close: bool,

    /// Bind a positional query parameter from a session variable (repeatable)
    #[arg(short = 'p', long = "param", value_name = "NAME", action = clap::ArgAction::Append)]
    pub params: Vec<String>,

    /// Pass a name/value pair through to the output transform (repeatable)
    #[arg(
        long = "format-arg",
        num_args = 2,
        value_names = ["NAME", "VALUE"],
        action = clap::ArgAction::Append
    )]
    pub format_args: Vec<String>,

    /// Free SQL text
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<String>,
}

impl CellArgs {
    /// Parse one flag line.
    pub fn parse_line(line: &str) -> Result<Self, Error> {
        let words = shell_words::split(line)
            .map_err(|e| Error::Usage(format!("could not split flag line: {e}")))?;
        Self::try_parse_from(words).map_err(|e| Error::Usage(e.to_string()))
    }

    /// The free SQL text, words rejoined.
    pub fn remainder(&self) -> String {
        self.rest.join(" ")
    }

    /// The `--format-arg` pairs, with all-digit values coerced to integers.
    pub fn format_arg_pairs(&self) -> Vec<(String, serde_json::Value)> {
        self.format_args
            .chunks(2)
            .filter_map(|pair| match pair {
                [name, value] => {
                    let coerced = if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
                    {
                        serde_json::Value::Number(value.parse::<u64>().unwrap_or_default().into())
                    } else {
                        serde_json::Value::String(value.clone())
                    };
                    Some((name.clone(), coerced))
                }
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remainder_captures_free_sql() {
        let args = CellArgs::parse_line("-t arrow select * from people").unwrap();
        assert_eq!(args.output_format.as_deref(), Some("arrow"));
        assert_eq!(args.remainder(), "select * from people");
    }

    #[test]
    fn flags_are_order_insensitive_before_the_query() {
        let args = CellArgs::parse_line("--cn :memory: -o myvar select 1").unwrap();
        assert_eq!(args.connection_string.as_deref(), Some(":memory:"));
        assert_eq!(args.output_variable.as_deref(), Some("myvar"));
        assert_eq!(args.remainder(), "select 1");
    }

    #[test]
    fn quoted_paths_survive_splitting() {
        let args = CellArgs::parse_line(r#"-r "my queries.sql""#).unwrap();
        assert_eq!(args.read_file.as_deref().unwrap().to_str(), Some("my queries.sql"));
    }

    #[test]
    fn format_args_pair_up_and_coerce_digits() {
        let args =
            CellArgs::parse_line("--format-arg limit 10 --format-arg name value select 1").unwrap();
        let pairs = args.format_arg_pairs();
        assert_eq!(pairs[0], ("limit".to_string(), serde_json::json!(10)));
        assert_eq!(pairs[1], ("name".to_string(), serde_json::json!("value")));
    }

    #[test]
    fn params_accumulate() {
        let args = CellArgs::parse_line("-p a -p b select ?").unwrap();
        assert_eq!(args.params, vec!["a", "b"]);
    }

    #[test]
    fn negative_literals_stay_in_the_query() {
        let args = CellArgs::parse_line("select -1 as n").unwrap();
        assert_eq!(args.remainder(), "select -1 as n");
    }

    #[test]
    fn empty_line_parses_to_defaults() {
        let args = CellArgs::parse_line("").unwrap();
        assert!(args.remainder().is_empty());
        assert!(!args.close);
    }
}

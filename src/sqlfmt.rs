//! SQL beautifier for the format flag
use sqlformat::{FormatOptions, QueryParams};

/// Reformat the query text with uppercase keywords and standard indentation.
pub fn format_sql(sql: &str) -> String {
    let options = FormatOptions {
        uppercase: true,
        ..FormatOptions::default()
    };
    sqlformat::format(sql, &QueryParams::None, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uppercases_keywords_and_indents() {
        let formatted = format_sql("select a,b from t where a=1");
        assert!(formatted.contains("SELECT"));
        assert!(formatted.contains("FROM"));
        assert!(formatted.lines().count() > 1);
    }
}

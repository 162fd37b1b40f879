//! Rendering for `--output`.
//!
//! Lists become rounded tables, single records use a per-command detail
//! view. JSON and YAML always serialize the underlying data, never the
//! display rows, so scripts see full records.

use std::io::{self, IsTerminal, Write};

use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};

/// Table output for an empty list.
const EMPTY: &str = "(none)";

/// Whether ANSI color should be emitted on stdout.
///
/// `auto` honours `NO_COLOR` and only colors a terminal.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal(),
    }
}

/// Render records as a table of `to_row` rows, or one `key_fn` per line
/// for `plain`.
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    key_fn: impl Fn(&T) -> String,
) -> String
where
    T: Serialize,
    R: Tabled,
{
    if let Some(rendered) = structured(format, data) {
        return rendered;
    }
    match format {
        OutputFormat::Plain => data.iter().map(key_fn).collect::<Vec<_>>().join("\n"),
        _ if data.is_empty() => EMPTY.to_owned(),
        _ => Table::new(data.iter().map(to_row))
            .with(Style::rounded())
            .to_string(),
    }
}

/// Render one record through `detail_fn`, or its `key_fn` for `plain`.
pub fn render_single<T: Serialize>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    key_fn: impl Fn(&T) -> String,
) -> String {
    structured(format, data).unwrap_or_else(|| match format {
        OutputFormat::Plain => key_fn(data),
        _ => detail_fn(data),
    })
}

/// Write to stdout unless quiet. Empty output prints nothing.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let _ = writeln!(io::stdout().lock(), "{output}");
}

/// JSON / YAML rendering; `None` for the human formats.
fn structured<T: Serialize + ?Sized>(format: &OutputFormat, data: &T) -> Option<String> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(data).map_err(|e| e.to_string()),
        OutputFormat::JsonCompact => serde_json::to_string(data).map_err(|e| e.to_string()),
        OutputFormat::Yaml => serde_yaml::to_string(data).map_err(|e| e.to_string()),
        OutputFormat::Table | OutputFormat::Plain => return None,
    };
    Some(rendered.unwrap_or_else(|e| format!("error: serialization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Serialize, Tabled)]
    struct Row {
        id: u32,
        code: &'static str,
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { id: 1, code: "FIRE ALARM" },
            Row { id: 2, code: "BLUE CODE" },
        ]
    }

    fn list(format: &OutputFormat, data: &[Row]) -> String {
        render_list(format, data, Row::clone, |r| r.id.to_string())
    }

    #[test]
    fn plain_emits_one_key_per_line() {
        assert_eq!(list(&OutputFormat::Plain, &rows()), "1\n2");
    }

    #[test]
    fn compact_json_serializes_records() {
        assert_eq!(
            list(&OutputFormat::JsonCompact, &rows()),
            r#"[{"id":1,"code":"FIRE ALARM"},{"id":2,"code":"BLUE CODE"}]"#
        );
    }

    #[test]
    fn table_has_headers() {
        let out = list(&OutputFormat::Table, &rows());
        assert!(out.contains("code"));
        assert!(out.contains("BLUE CODE"));
    }

    #[test]
    fn empty_table_says_so() {
        assert_eq!(list(&OutputFormat::Table, &[]), EMPTY);
        assert_eq!(list(&OutputFormat::Json, &[]), "[]");
    }

    #[test]
    fn single_uses_detail_view() {
        let row = Row { id: 7, code: "RED CODE 1" };
        let out = render_single(&OutputFormat::Table, &row, |r| format!("alert {}", r.id), |r| {
            r.id.to_string()
        });
        assert_eq!(out, "alert 7");
        let yaml = render_single(&OutputFormat::Yaml, &row, |_| String::new(), |_| String::new());
        assert!(yaml.contains("code: RED CODE 1"));
    }
}

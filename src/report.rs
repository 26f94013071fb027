use crate::domain::{AnalysisResult, Dataset, Value};

pub const MAX_DISPLAY_ROWS: usize = 10;
const MAX_CELL_CHARS: usize = 50;
const TRUNCATED_CELL_CHARS: usize = 47;

/// Renders a successful result as a Markdown report.
pub fn render(question: &str, dataset: &Dataset, result: &AnalysisResult) -> String {
    let mut lines = vec![
        "## Data Analysis Result".to_string(),
        format!("**Question**: {}", question),
        String::new(),
        "### Generated SQL".to_string(),
        "```sql".to_string(),
        result.sql_query.clone(),
        "```".to_string(),
        String::new(),
        "### Data Overview".to_string(),
        format!("- **Rows**: {}", group_thousands(dataset.row_count as i64)),
        format!("- **Columns**: {}", dataset.columns.len()),
        format!("- **Column names**: {}", dataset.column_names().join(", ")),
        String::new(),
        format!(
            "### Query Result ({} rows)",
            group_thousands(result.row_count as i64)
        ),
    ];

    if result.row_count == 0 {
        lines.push("No matching data found.".to_string());
        return lines.join("\n");
    }

    lines.push(format!("| {} |", result.columns.join(" | ")));
    lines.push(format!(
        "| {} |",
        vec![":---"; result.columns.len()].join(" | ")
    ));

    for row in result.data.iter().take(MAX_DISPLAY_ROWS) {
        let cells: Vec<String> = result
            .columns
            .iter()
            .map(|column| row.get(column).map_or_else(|| "null".to_string(), format_cell))
            .collect();
        lines.push(format!("| {} |", cells.join(" | ")));
    }

    if result.row_count > MAX_DISPLAY_ROWS {
        lines.push(String::new());
        lines.push(format!(
            "*Showing first {} of {} rows*",
            MAX_DISPLAY_ROWS,
            group_thousands(result.row_count as i64)
        ));
    }

    lines.join("\n")
}

/// Single-line report for a failed analysis.
pub fn render_error(message: &str) -> String {
    format!("**Error**: {}", message)
}

pub fn format_cell(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Integer(v) => group_thousands(*v),
        Value::Float(v) => format!("{:.2}", v),
        Value::Boolean(v) => v.to_string(),
        Value::Temporal(_) => value.to_string(),
        Value::Text(text) => {
            let shown = if text.chars().count() > MAX_CELL_CHARS {
                let head: String = text.chars().take(TRUNCATED_CELL_CHARS).collect();
                format!("{}...", head)
            } else {
                text.clone()
            };
            shown.replace('|', "\\|").replace('\n', " ")
        }
    }
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::Utc;

    use super::*;
    use crate::catalog::DataFormat;
    use crate::domain::{ColumnSchema, Row, TypeTag};

    fn dataset() -> Dataset {
        Dataset {
            id: "ds_test".to_string(),
            session_id: "session".to_string(),
            filename: "orders.csv".to_string(),
            format: DataFormat::Csv,
            columns: vec![
                ColumnSchema {
                    name: "id".to_string(),
                    type_tag: TypeTag::Integer,
                    data_type: "Int64".to_string(),
                },
                ColumnSchema {
                    name: "amount".to_string(),
                    type_tag: TypeTag::Float,
                    data_type: "Float64".to_string(),
                },
            ],
            row_count: 12_345,
            preview: Vec::new(),
            source: Bytes::new(),
            created_at: Utc::now(),
        }
    }

    fn result_with_rows(count: usize) -> AnalysisResult {
        let data = (0..count)
            .map(|i| {
                let mut row = Row::default();
                row.insert("id", Value::Integer(i as i64 * 1000));
                row.insert("amount", Value::Float(i as f64 / 3.0));
                row
            })
            .collect();
        AnalysisResult {
            sql_query: "SELECT id, amount FROM data_table".to_string(),
            columns: vec!["id".to_string(), "amount".to_string()],
            data,
            row_count: count,
            error: None,
        }
    }

    fn table_rows(report: &str) -> usize {
        // header and separator are the first two pipe lines
        report.lines().filter(|l| l.starts_with('|')).count() - 2
    }

    #[test]
    fn eleven_rows_show_ten_with_caveat() {
        let report = render("list orders", &dataset(), &result_with_rows(11));
        assert_eq!(table_rows(&report), 10);
        assert!(report.contains("*Showing first 10 of 11 rows*"));
    }

    #[test]
    fn three_rows_have_no_caveat() {
        let report = render("list orders", &dataset(), &result_with_rows(3));
        assert_eq!(table_rows(&report), 3);
        assert!(!report.contains("Showing first"));
        assert!(report.contains("| 2,000 | 0.67 |"));
        assert!(report.contains("- **Rows**: 12,345"));
        assert!(report.contains("- **Column names**: id, amount"));
        assert!(report.contains("```sql\nSELECT id, amount FROM data_table\n```"));
    }

    #[test]
    fn zero_rows_render_fixed_line() {
        let report = render("anything?", &dataset(), &result_with_rows(0));
        assert!(report.contains("### Query Result (0 rows)"));
        assert!(report.ends_with("No matching data found."));
        assert!(!report.contains(":---"));
    }

    #[test]
    fn cells_follow_numeric_and_text_rules() {
        assert_eq!(format_cell(&Value::Integer(1_234_567)), "1,234,567");
        assert_eq!(format_cell(&Value::Integer(-1_000)), "-1,000");
        assert_eq!(format_cell(&Value::Integer(999)), "999");
        assert_eq!(format_cell(&Value::Float(2.0)), "2.00");
        assert_eq!(format_cell(&Value::Null), "null");

        let long = "x".repeat(60);
        let cell = format_cell(&Value::Text(long));
        assert_eq!(cell.len(), 50);
        assert!(cell.ends_with("..."));

        let exact = "y".repeat(50);
        assert_eq!(format_cell(&Value::Text(exact.clone())), exact);
    }

    #[test]
    fn pipes_do_not_count_toward_the_cell_limit() {
        let piped = format!("{}|{}|", "a".repeat(24), "b".repeat(23));
        assert_eq!(piped.chars().count(), 49);
        assert_eq!(
            format_cell(&Value::Text(piped)),
            format!("{}\\|{}\\|", "a".repeat(24), "b".repeat(23))
        );

        let long = format!("{}|{}", "c".repeat(46), "d".repeat(10));
        assert_eq!(
            format_cell(&Value::Text(long)),
            format!("{}\\|...", "c".repeat(46))
        );
    }

    #[test]
    fn error_report_is_one_line() {
        let report = render_error("Generated SQL contains forbidden keyword DROP");
        assert_eq!(report.lines().count(), 1);
    }
}

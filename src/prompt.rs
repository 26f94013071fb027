use std::fmt::Write;

use crate::catalog::RELATION_NAME;
use crate::domain::{ColumnSchema, Dataset, Row};

/// Context and user blocks sent to the generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub context: String,
    pub user: String,
}

impl Prompt {
    /// Single text payload: context block, blank line, user block.
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.context, self.user)
    }
}

pub fn build_prompt(dataset: &Dataset, question: &str) -> Prompt {
    Prompt {
        context: context_block(
            &dataset.filename,
            &dataset.columns,
            dataset.row_count,
            &dataset.preview,
        ),
        user: question.to_string(),
    }
}

fn context_block(filename: &str, columns: &[ColumnSchema], row_count: usize, preview: &[Row]) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "The file \"{}\" is loaded as the table {} ({} rows, {} columns).",
        filename,
        RELATION_NAME,
        row_count,
        columns.len()
    );

    out.push_str("\nSchema:\n");
    for column in columns {
        let _ = writeln!(
            out,
            "- {}: {} ({})",
            column.name,
            column.type_tag.as_str(),
            column.data_type
        );
    }

    let _ = writeln!(out, "\nFirst {} rows:", preview.len());
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let _ = writeln!(out, "| {} |", names.join(" | "));
    for row in preview {
        let cells: Vec<String> = names
            .iter()
            .map(|name| row.get(name).map(|v| v.to_string()).unwrap_or_default())
            .collect();
        let _ = writeln!(out, "| {} |", cells.join(" | "));
    }

    out.push_str("\nRules:\n");
    out.push_str("1. Respond with exactly one SQL statement and nothing else.\n");
    let _ = writeln!(out, "2. Query only the table {}.", RELATION_NAME);
    out.push_str(
        "3. Never use INSERT, UPDATE, DELETE, DROP, ALTER, CREATE or TRUNCATE.\n",
    );
    let _ = write!(
        out,
        "4. If the question cannot be answered with SQL, respond with SELECT * FROM {}.",
        RELATION_NAME
    );

    out
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::Utc;

    use super::*;
    use crate::catalog::DataFormat;
    use crate::domain::{TypeTag, Value};

    fn dataset() -> Dataset {
        let column = |name: &str, type_tag, data_type: &str| ColumnSchema {
            name: name.to_string(),
            type_tag,
            data_type: data_type.to_string(),
        };
        let preview = vec![
            vec![
                ("sku".to_string(), Value::Text("A-1".to_string())),
                ("qty".to_string(), Value::Integer(4)),
            ]
            .into_iter()
            .collect(),
            vec![
                ("sku".to_string(), Value::Text("B-2".to_string())),
                ("qty".to_string(), Value::Null),
            ]
            .into_iter()
            .collect(),
        ];

        Dataset {
            id: "ds_test".to_string(),
            session_id: "s1".to_string(),
            filename: "stock.csv".to_string(),
            format: DataFormat::Csv,
            columns: vec![
                column("sku", TypeTag::Text, "String"),
                column("qty", TypeTag::Integer, "Int64"),
            ],
            row_count: 2,
            preview,
            source: Bytes::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn context_carries_relation_schema_preview_and_rules() {
        let prompt = build_prompt(&dataset(), "which sku has the most stock?");

        assert!(prompt.context.contains("table data_table"));
        assert!(prompt.context.contains("- sku: text (String)\n- qty: integer (Int64)"));
        assert!(prompt.context.contains("| sku | qty |\n| A-1 | 4 |\n| B-2 | null |"));
        assert!(prompt.context.contains("exactly one SQL statement"));
        assert!(prompt.context.contains("Query only the table data_table"));
        assert!(prompt.context.contains("DROP"));
        assert!(prompt.context.contains("SELECT * FROM data_table"));
        assert!(!prompt.context.contains("which sku"));
    }

    #[test]
    fn user_block_is_the_raw_question() {
        let prompt = build_prompt(&dataset(), "  how many rows?  ");
        assert_eq!(prompt.user, "  how many rows?  ");
        assert!(prompt.render().ends_with("\n\n  how many rows?  "));
    }
}

use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use super::{unreadable, FormatLoader, LoadedTable};
use crate::catalog::DataFormat;
use crate::domain::Value;
use crate::error::FormatError;
use crate::rows::rows_to_batch;

/// Column names plus loosely typed rows, before Arrow conversion.
#[derive(Debug, Default, PartialEq)]
struct Records {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Records {
    /// Union of keys in first-seen order; missing keys become null.
    fn from_objects(objects: Vec<Map<String, JsonValue>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for object in &objects {
            for key in object.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = objects
            .into_iter()
            .map(|mut object| {
                columns
                    .iter()
                    .map(|column| object.remove(column).map(json_value).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.rows.is_empty()
    }
}

fn json_value(value: JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Boolean(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
        },
        JsonValue::String(s) => Value::Text(s),
        nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => Value::Text(nested.to_string()),
    }
}

fn into_object(value: JsonValue) -> Result<Map<String, JsonValue>, String> {
    match value {
        JsonValue::Object(object) => Ok(object),
        other => Err(format!("expected a JSON object, found {}", kind(&other))),
    }
}

fn kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

type Strategy = fn(&str) -> Result<Records, String>;

/// Tried in order; the first that yields a non-empty table wins.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("line-delimited", line_delimited),
    ("record-array", record_array),
    ("manual", manual_decode),
];

/// One JSON object per non-blank line.
fn line_delimited(text: &str) -> Result<Records, String> {
    let objects = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(idx, line)| {
            serde_json::from_str::<JsonValue>(line)
                .map_err(|e| format!("line {}: {}", idx + 1, e))
                .and_then(into_object)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Records::from_objects(objects))
}

/// A single JSON array whose items are all objects.
fn record_array(text: &str) -> Result<Records, String> {
    let items: Vec<JsonValue> = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let objects = items
        .into_iter()
        .map(into_object)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Records::from_objects(objects))
}

/// Lists become records, dicts of equal-length lists become columns, any other dict is one record.
fn manual_decode(text: &str) -> Result<Records, String> {
    match serde_json::from_str::<JsonValue>(text).map_err(|e| e.to_string())? {
        JsonValue::Array(items) => {
            if items.iter().all(JsonValue::is_object) {
                record_array(text)
            } else {
                Ok(Records {
                    columns: vec!["value".to_string()],
                    rows: items.into_iter().map(|item| vec![json_value(item)]).collect(),
                })
            }
        }
        JsonValue::Object(object) if !object.is_empty() && object.values().all(JsonValue::is_array) => {
            columnar(object)
        }
        JsonValue::Object(object) => Ok(Records::from_objects(vec![object])),
        other => Err(format!("unsupported top-level JSON {}", kind(&other))),
    }
}

fn columnar(object: Map<String, JsonValue>) -> Result<Records, String> {
    let columns: Vec<String> = object.keys().cloned().collect();
    let mut values: Vec<Vec<JsonValue>> = object
        .into_iter()
        .map(|(_, column)| match column {
            JsonValue::Array(items) => items,
            other => vec![other],
        })
        .collect();

    let height = values.first().map(Vec::len).unwrap_or(0);
    if values.iter().any(|column| column.len() != height) {
        return Err("all columnar arrays must have the same length".to_string());
    }

    let mut rows = vec![Vec::with_capacity(columns.len()); height];
    for column in values.iter_mut() {
        for (row, value) in rows.iter_mut().zip(column.drain(..)) {
            row.push(json_value(value));
        }
    }

    Ok(Records { columns, rows })
}

#[derive(Debug, Default)]
pub struct JsonLoader;

impl FormatLoader for JsonLoader {
    fn format(&self) -> DataFormat {
        DataFormat::Json
    }

    fn load(&self, bytes: &[u8]) -> Result<LoadedTable, FormatError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| unreadable(format!("JSON is not valid UTF-8: {}", e)))?;

        let mut failures = Vec::new();
        for (name, strategy) in STRATEGIES {
            match strategy(text) {
                Ok(records) if !records.is_empty() => {
                    debug!("JSON decoded with {} strategy", name);
                    let batch = rows_to_batch(&records.columns, &records.rows)
                        .map_err(|e| unreadable(format!("JSON: {}", e)))?;
                    return Ok(LoadedTable::new(batch.schema(), vec![batch]));
                }
                Ok(_) => failures.push(format!("{}: no rows", name)),
                Err(e) => failures.push(format!("{}: {}", name, e)),
            }
        }

        Err(unreadable(format!(
            "no JSON strategy produced rows ({})",
            failures.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(table: &LoadedTable) -> Vec<String> {
        table.column_names()
    }

    #[test]
    fn reads_line_delimited_records() {
        let input = b"{\"b\": 1, \"a\": \"x\"}\n\n{\"b\": 2, \"a\": \"y\", \"c\": true}\n";
        let table = JsonLoader.load(input).unwrap();
        assert_eq!(names(&table), vec!["b", "a", "c"]);
        assert_eq!(table.num_rows(), 2);
    }

    #[test]
    fn reads_pretty_printed_record_array() {
        let input = br#"[
            {"name": "ada", "age": 36},
            {"name": "alan", "age": 41},
            {"name": "grace", "age": 85}
        ]"#;
        let table = JsonLoader.load(input).unwrap();
        assert_eq!(names(&table), vec!["name", "age"]);
        assert_eq!(table.num_rows(), 3);
    }

    #[test]
    fn reads_columnar_object() {
        let input = br#"{
            "year": [2021, 2022, 2023, 2024],
            "revenue": [1.5, 2.0, 2.25, 3.0]
        }"#;
        let table = JsonLoader.load(input).unwrap();
        assert_eq!(names(&table), vec!["year", "revenue"]);
        assert_eq!(table.num_rows(), 4);
    }

    #[test]
    fn reads_single_object_as_one_record() {
        let input = br#"{
            "id": 7,
            "tags": ["a", "b"],
            "owner": "ops"
        }"#;
        let table = JsonLoader.load(input).unwrap();
        assert_eq!(names(&table), vec!["id", "tags", "owner"]);
        assert_eq!(table.num_rows(), 1);
    }

    #[test]
    fn scalar_list_becomes_value_column() {
        let records = manual_decode("[1, 2, 3]").unwrap();
        assert_eq!(records.columns, vec!["value"]);
        assert_eq!(records.rows.len(), 3);
    }

    #[test]
    fn ragged_columnar_object_is_rejected() {
        assert!(manual_decode(r#"{"a": [1, 2], "b": [1]}"#).is_err());
    }

    #[test]
    fn empty_structures_are_unreadable() {
        for input in [&b"[]"[..], b"{}", b"\"text\"", b"{not json"] {
            assert!(matches!(
                JsonLoader.load(input),
                Err(FormatError::EmptyOrUnreadable { .. })
            ));
        }
    }
}

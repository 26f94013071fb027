use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::catalog::DataFormat;

/// A single cell. Closed set of shapes every loader and query result is reduced to.
///
/// Serialises as a bare JSON scalar. Reading JSON back never produces `Temporal`:
/// strings stay `Text`. Storage that must keep temporal cells uses `TypedValue`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Temporal(NaiveDateTime),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Temporal(v) if v.time() == NaiveTime::MIN => {
                write!(f, "{}", v.format("%Y-%m-%d"))
            }
            Value::Temporal(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
            Value::Text(v) => write!(f, "{}", v),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("null, a boolean, a number or a string")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_none<E: de::Error>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
                Value::deserialize(deserializer)
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
                Ok(Value::Boolean(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
                Ok(Value::Integer(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
                Ok(i64::try_from(v)
                    .map(Value::Integer)
                    .unwrap_or(Value::Float(v as f64)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
                Ok(Value::Float(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
                Ok(Value::Text(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
                Ok(Value::Text(v))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

/// Externally tagged form of `Value` used where cells are persisted,
/// so temporal cells and date-like text both survive a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TypedValue {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Temporal(NaiveDateTime),
    Text(String),
}

impl From<&Value> for TypedValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => TypedValue::Null,
            Value::Integer(v) => TypedValue::Integer(*v),
            Value::Float(v) => TypedValue::Float(*v),
            Value::Boolean(v) => TypedValue::Boolean(*v),
            Value::Temporal(v) => TypedValue::Temporal(*v),
            Value::Text(v) => TypedValue::Text(v.clone()),
        }
    }
}

impl From<TypedValue> for Value {
    fn from(value: TypedValue) -> Self {
        match value {
            TypedValue::Null => Value::Null,
            TypedValue::Integer(v) => Value::Integer(v),
            TypedValue::Float(v) => Value::Float(v),
            TypedValue::Boolean(v) => Value::Boolean(v),
            TypedValue::Temporal(v) => Value::Temporal(v),
            TypedValue::Text(v) => Value::Text(v),
        }
    }
}

/// Ordered mapping from column name to value. Serialises as a JSON object in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, Value)>,
}

impl Row {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    /// Appends a cell, replacing the value if the column is already present.
    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        match self.cells.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = Row::default();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in &self.cells {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map of column names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Row, A::Error> {
                let mut row = Row::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((column, value)) = access.next_entry::<String, Value>()? {
                    row.insert(column, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Integer,
    Float,
    Text,
    Boolean,
    Temporal,
    Other,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Integer => "integer",
            TypeTag::Float => "float",
            TypeTag::Text => "text",
            TypeTag::Boolean => "boolean",
            TypeTag::Temporal => "temporal",
            TypeTag::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub type_tag: TypeTag,
    /// Engine-level type name, e.g. `Int64` or `Timestamp(Microsecond)`.
    pub data_type: String,
}

/// An uploaded table after profiling. Never mutated after registration.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: String,
    pub session_id: String,
    pub filename: String,
    pub format: DataFormat,
    pub columns: Vec<ColumnSchema>,
    pub row_count: usize,
    pub preview: Vec<Row>,
    pub source: Bytes,
    pub created_at: DateTime<Utc>,
}

impl Dataset {
    pub fn new_id() -> String {
        format!("ds_{}", Uuid::new_v4().simple())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            id: self.id.clone(),
            filename: self.filename.clone(),
            format: self.format,
            row_count: self.row_count,
            column_count: self.columns.len(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub id: String,
    pub filename: String,
    pub format: DataFormat,
    pub row_count: usize,
    pub column_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Rows produced by one executed statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub data: Vec<Row>,
    pub row_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub sql_query: String,
    pub columns: Vec<String>,
    pub data: Vec<Row>,
    pub row_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    pub fn success(sql_query: String, output: QueryOutput) -> Self {
        Self {
            sql_query,
            columns: output.columns,
            data: output.data,
            row_count: output.row_count,
            error: None,
        }
    }

    pub fn failure(sql_query: Option<String>, error: String) -> Self {
        Self {
            sql_query: sql_query.unwrap_or_default(),
            error: Some(error),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub dataset_id: String,
    pub filename: String,
    pub question: String,
    pub result: AnalysisResult,
    pub report: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub chat_count: usize,
    pub latest_question: Option<String>,
}

/// What a successful `analyze`/`ask` hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
    pub turn_id: Uuid,
    pub dataset_id: String,
    pub result: AnalysisResult,
    pub report: String,
}

use std::collections::HashSet;
use std::sync::Arc;

use datafusion::arrow::array::{
    Array, ArrayRef, AsArray, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder,
    TimestampMicrosecondBuilder,
};
use datafusion::arrow::datatypes::{
    DataType, Date32Type, Date64Type, Decimal128Type, Field, Float32Type, Float64Type, Int16Type,
    Int32Type, Int64Type, Int8Type, Schema, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use datafusion::arrow::error::ArrowError;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::arrow::util::display::{ArrayFormatter, FormatOptions};

use crate::domain::{Row, TypeTag, Value};

static NULL_VALUE: Value = Value::Null;

pub fn type_tag(data_type: &DataType) -> TypeTag {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => TypeTag::Integer,
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => TypeTag::Float,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => TypeTag::Text,
        DataType::Boolean => TypeTag::Boolean,
        DataType::Date32
        | DataType::Date64
        | DataType::Timestamp(_, _)
        | DataType::Time32(_)
        | DataType::Time64(_) => TypeTag::Temporal,
        _ => TypeTag::Other,
    }
}

pub fn type_name(data_type: &DataType) -> String {
    match data_type {
        DataType::Utf8 | DataType::Utf8View => "String".to_string(),
        DataType::LargeUtf8 => "LargeString".to_string(),
        DataType::Timestamp(unit, Some(tz)) => format!("Timestamp({:?}, {})", unit, tz),
        DataType::Timestamp(unit, None) => format!("Timestamp({:?})", unit),
        other => other.to_string(),
    }
}

/// Reads one cell of an Arrow array into a `Value`.
pub fn value_at(array: &dyn Array, index: usize) -> Value {
    if array.is_null(index) {
        return Value::Null;
    }

    match array.data_type() {
        DataType::Boolean => Value::Boolean(array.as_boolean().value(index)),
        DataType::Int8 => Value::Integer(array.as_primitive::<Int8Type>().value(index).into()),
        DataType::Int16 => Value::Integer(array.as_primitive::<Int16Type>().value(index).into()),
        DataType::Int32 => Value::Integer(array.as_primitive::<Int32Type>().value(index).into()),
        DataType::Int64 => Value::Integer(array.as_primitive::<Int64Type>().value(index)),
        DataType::UInt8 => Value::Integer(array.as_primitive::<UInt8Type>().value(index).into()),
        DataType::UInt16 => {
            Value::Integer(array.as_primitive::<UInt16Type>().value(index).into())
        }
        DataType::UInt32 => {
            Value::Integer(array.as_primitive::<UInt32Type>().value(index).into())
        }
        DataType::UInt64 => {
            let raw = array.as_primitive::<UInt64Type>().value(index);
            i64::try_from(raw)
                .map(Value::Integer)
                .unwrap_or(Value::Float(raw as f64))
        }
        DataType::Float32 => {
            Value::Float(array.as_primitive::<Float32Type>().value(index).into())
        }
        DataType::Float64 => Value::Float(array.as_primitive::<Float64Type>().value(index)),
        DataType::Decimal128(_, scale) => {
            let raw = array.as_primitive::<Decimal128Type>().value(index);
            Value::Float(raw as f64 / 10f64.powi(i32::from(*scale)))
        }
        DataType::Utf8 => Value::Text(array.as_string::<i32>().value(index).to_string()),
        DataType::LargeUtf8 => Value::Text(array.as_string::<i64>().value(index).to_string()),
        DataType::Utf8View => Value::Text(array.as_string_view().value(index).to_string()),
        DataType::Date32 => temporal(
            array
                .as_primitive::<Date32Type>()
                .value_as_datetime(index),
        ),
        DataType::Date64 => temporal(
            array
                .as_primitive::<Date64Type>()
                .value_as_datetime(index),
        ),
        DataType::Timestamp(TimeUnit::Second, _) => temporal(
            array
                .as_primitive::<TimestampSecondType>()
                .value_as_datetime(index),
        ),
        DataType::Timestamp(TimeUnit::Millisecond, _) => temporal(
            array
                .as_primitive::<TimestampMillisecondType>()
                .value_as_datetime(index),
        ),
        DataType::Timestamp(TimeUnit::Microsecond, _) => temporal(
            array
                .as_primitive::<TimestampMicrosecondType>()
                .value_as_datetime(index),
        ),
        DataType::Timestamp(TimeUnit::Nanosecond, _) => temporal(
            array
                .as_primitive::<TimestampNanosecondType>()
                .value_as_datetime(index),
        ),
        _ => display_value(array, index),
    }
}

fn temporal(value: Option<chrono::NaiveDateTime>) -> Value {
    value.map(Value::Temporal).unwrap_or(Value::Null)
}

fn display_value(array: &dyn Array, index: usize) -> Value {
    match ArrayFormatter::try_new(array, &FormatOptions::default()) {
        Ok(formatter) => Value::Text(formatter.value(index).to_string()),
        Err(_) => Value::Text(format!("{:?}", array.slice(index, 1))),
    }
}

/// Suffixes repeated names with `_1`, `_2`, ... so every name is distinct.
/// The first occurrence keeps its name; order is unchanged.
pub fn unique_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let names: Vec<&str> = names.into_iter().collect();
    let mut taken: HashSet<String> = HashSet::with_capacity(names.len());
    let mut unique = Vec::with_capacity(names.len());

    for name in names {
        let mut candidate = name.to_string();
        let mut suffix = 1;
        while taken.contains(&candidate) {
            candidate = format!("{}_{}", name, suffix);
            suffix += 1;
        }
        taken.insert(candidate.clone());
        unique.push(candidate);
    }
    unique
}

pub fn field_names(schema: &Schema) -> Vec<String> {
    unique_names(schema.fields().iter().map(|field| field.name().as_str()))
}

/// Converts record batches into ordered rows, stopping after `limit` rows when given.
/// Repeated field names are made distinct with `unique_names`.
pub fn batches_to_rows(batches: &[RecordBatch], limit: Option<usize>) -> Vec<Row> {
    let mut rows = Vec::new();
    let cap = limit.unwrap_or(usize::MAX);

    for batch in batches {
        let names = field_names(&batch.schema());
        for row_idx in 0..batch.num_rows() {
            if rows.len() >= cap {
                return rows;
            }
            let mut row = Row::with_capacity(batch.num_columns());
            for (col_idx, name) in names.iter().enumerate() {
                row.insert(
                    name.clone(),
                    value_at(batch.column(col_idx).as_ref(), row_idx),
                );
            }
            rows.push(row);
        }
    }

    rows
}

/// Narrowest Arrow type that holds every non-null value of a column.
fn infer_column_type<'a>(values: impl Iterator<Item = &'a Value>) -> DataType {
    let mut inferred: Option<DataType> = None;

    for value in values {
        let candidate = match value {
            Value::Null => continue,
            Value::Integer(_) => DataType::Int64,
            Value::Float(_) => DataType::Float64,
            Value::Boolean(_) => DataType::Boolean,
            Value::Temporal(_) => DataType::Timestamp(TimeUnit::Microsecond, None),
            Value::Text(_) => return DataType::Utf8,
        };
        inferred = Some(match (inferred, candidate) {
            (None, candidate) => candidate,
            (Some(current), candidate) if current == candidate => current,
            (Some(DataType::Int64), DataType::Float64)
            | (Some(DataType::Float64), DataType::Int64) => DataType::Float64,
            _ => return DataType::Utf8,
        });
    }

    inferred.unwrap_or(DataType::Utf8)
}

fn build_array(data_type: &DataType, rows: &[Vec<Value>], col_idx: usize) -> ArrayRef {
    let cells = rows
        .iter()
        .map(|row| row.get(col_idx).unwrap_or(&NULL_VALUE));

    match data_type {
        DataType::Int64 => {
            let mut builder = Int64Builder::with_capacity(rows.len());
            for cell in cells {
                match cell {
                    Value::Integer(v) => builder.append_value(*v),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::with_capacity(rows.len());
            for cell in cells {
                match cell {
                    Value::Float(v) => builder.append_value(*v),
                    Value::Integer(v) => builder.append_value(*v as f64),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(rows.len());
            for cell in cells {
                match cell {
                    Value::Boolean(v) => builder.append_value(*v),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Timestamp(_, _) => {
            let mut builder = TimestampMicrosecondBuilder::with_capacity(rows.len());
            for cell in cells {
                match cell {
                    Value::Temporal(v) => builder.append_value(v.and_utc().timestamp_micros()),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        _ => {
            let mut builder = StringBuilder::with_capacity(rows.len(), rows.len() * 8);
            for cell in cells {
                match cell {
                    Value::Null => builder.append_null(),
                    other => builder.append_value(other.to_string()),
                }
            }
            Arc::new(builder.finish())
        }
    }
}

/// Builds a single record batch from loosely-typed rows, inferring one type per column.
pub fn rows_to_batch(columns: &[String], rows: &[Vec<Value>]) -> Result<RecordBatch, ArrowError> {
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());

    for (col_idx, name) in columns.iter().enumerate() {
        let data_type = infer_column_type(
            rows.iter()
                .map(|row| row.get(col_idx).unwrap_or(&NULL_VALUE)),
        );
        arrays.push(build_array(&data_type, rows, col_idx));
        fields.push(Field::new(name, data_type, true));
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn infers_column_types_from_values() {
        let columns = vec![
            "id".to_string(),
            "score".to_string(),
            "name".to_string(),
            "flag".to_string(),
            "empty".to_string(),
        ];
        let rows = vec![
            vec![Value::Integer(1), Value::Integer(10), text("a"), Value::Boolean(true), Value::Null],
            vec![Value::Integer(2), Value::Float(2.5), Value::Integer(7), Value::Null, Value::Null],
        ];

        let batch = rows_to_batch(&columns, &rows).unwrap();
        let schema = batch.schema();

        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).data_type(), &DataType::Float64);
        assert_eq!(schema.field(2).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(3).data_type(), &DataType::Boolean);
        assert_eq!(schema.field(4).data_type(), &DataType::Utf8);
        assert_eq!(batch.num_rows(), 2);

        let back = batches_to_rows(&[batch], None);
        assert_eq!(back[1].get("score"), Some(&Value::Float(2.5)));
        assert_eq!(back[1].get("name"), Some(&text("7")));
        assert_eq!(back[1].get("flag"), Some(&Value::Null));
        assert_eq!(
            back[0].columns().collect::<Vec<_>>(),
            vec!["id", "score", "name", "flag", "empty"]
        );
    }

    #[test]
    fn limits_row_conversion() {
        let columns = vec!["n".to_string()];
        let rows: Vec<Vec<Value>> = (0..8).map(|i| vec![Value::Integer(i)]).collect();
        let batch = rows_to_batch(&columns, &rows).unwrap();

        let limited = batches_to_rows(&[batch.clone(), batch], Some(10));
        assert_eq!(limited.len(), 10);
        assert_eq!(limited[9].get("n"), Some(&Value::Integer(1)));
    }

    #[test]
    fn repeated_names_get_numeric_suffixes() {
        assert_eq!(
            unique_names(["a", "b", "a", "a_1", "a"]),
            vec!["a", "b", "a_1", "a_1_1", "a_2"]
        );
    }

    #[test]
    fn repeated_fields_keep_every_cell() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("a", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(datafusion::arrow::array::Int64Array::from(vec![1])),
                Arc::new(datafusion::arrow::array::Int64Array::from(vec![2])),
            ],
        )
        .unwrap();

        let rows = batches_to_rows(&[batch], None);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[0].get("a"), Some(&Value::Integer(1)));
        assert_eq!(rows[0].get("a_1"), Some(&Value::Integer(2)));
    }

    #[test]
    fn maps_arrow_types_to_tags() {
        assert_eq!(type_tag(&DataType::UInt32), TypeTag::Integer);
        assert_eq!(type_tag(&DataType::Decimal128(10, 2)), TypeTag::Float);
        assert_eq!(type_tag(&DataType::Date32), TypeTag::Temporal);
        assert_eq!(type_tag(&DataType::Utf8View), TypeTag::Text);
        assert_eq!(type_tag(&DataType::Binary), TypeTag::Other);
        assert_eq!(type_name(&DataType::Utf8), "String");
    }
}

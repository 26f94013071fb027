use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, DataType, Range, Reader};

use super::{unreadable, FormatLoader, LoadedTable};
use crate::catalog::DataFormat;
use crate::domain::Value;
use crate::error::FormatError;
use crate::rows::rows_to_batch;

/// First worksheet of an xlsx/xls workbook; the first row is the header.
#[derive(Debug, Default)]
pub struct ExcelLoader;

impl FormatLoader for ExcelLoader {
    fn format(&self) -> DataFormat {
        DataFormat::Excel
    }

    fn load(&self, bytes: &[u8]) -> Result<LoadedTable, FormatError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| unreadable(format!("Excel: {}", e)))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| unreadable("Excel file has no worksheets"))?
            .map_err(|e| unreadable(format!("Excel: {}", e)))?;

        table_from_range(&range)
    }
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Int(v) => Value::Integer(*v),
        Data::Float(v) => Value::Float(*v),
        Data::Bool(v) => Value::Boolean(*v),
        Data::String(s) if s.trim().is_empty() => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::DateTime(_) | Data::DateTimeIso(_) => cell
            .as_datetime()
            .map(Value::Temporal)
            .unwrap_or_else(|| Value::Text(cell.to_string())),
        Data::DurationIso(s) => Value::Text(s.clone()),
    }
}

fn header_name(cell: Option<&Data>, col_idx: usize) -> String {
    let name = cell
        .and_then(|c| c.as_string())
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    if name.is_empty() {
        format!("column_{}", col_idx + 1)
    } else {
        name
    }
}

/// Excel stores every number as a float; a column of whole floats is read back as integers.
fn narrow_whole_floats(rows: &mut [Vec<Value>], col_idx: usize) {
    let mut saw_float = false;
    for row in rows.iter() {
        match row.get(col_idx) {
            Some(Value::Float(v)) if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.0e15 => {
                saw_float = true
            }
            Some(Value::Integer(_)) | Some(Value::Null) | None => {}
            _ => return,
        }
    }
    if !saw_float {
        return;
    }
    for row in rows.iter_mut() {
        if let Some(Value::Float(v)) = row.get(col_idx) {
            let whole = *v as i64;
            row[col_idx] = Value::Integer(whole);
        }
    }
}

pub(crate) fn table_from_range(range: &Range<Data>) -> Result<LoadedTable, FormatError> {
    let mut sheet_rows = range.rows();
    let header = sheet_rows
        .next()
        .ok_or_else(|| unreadable("Excel worksheet is empty"))?;

    let columns: Vec<String> = (0..header.len())
        .map(|col_idx| header_name(header.get(col_idx), col_idx))
        .collect();

    let mut rows: Vec<Vec<Value>> = sheet_rows
        .map(|cells| {
            (0..columns.len())
                .map(|col_idx| cells.get(col_idx).map(cell_value).unwrap_or(Value::Null))
                .collect::<Vec<_>>()
        })
        .filter(|values| values.iter().any(|v| !v.is_null()))
        .collect();

    for col_idx in 0..columns.len() {
        narrow_whole_floats(&mut rows, col_idx);
    }

    let batch = rows_to_batch(&columns, &rows)
        .map_err(|e| unreadable(format!("Excel: {}", e)))?;
    Ok(LoadedTable::new(batch.schema(), vec![batch]))
}

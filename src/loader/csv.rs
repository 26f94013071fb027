use std::io::Cursor;
use std::sync::Arc;

use datafusion::arrow::csv::reader::Format;
use datafusion::arrow::csv::ReaderBuilder;
use datafusion::arrow::record_batch::RecordBatch;

use super::{unreadable, FormatLoader, LoadedTable};
use crate::catalog::DataFormat;
use crate::error::FormatError;

const BATCH_SIZE: usize = 8192;

/// Comma-separated text with a header row. Column types come from Arrow's schema inference.
#[derive(Debug, Default)]
pub struct CsvLoader;

fn csv_format() -> Format {
    Format::default().with_header(true).with_delimiter(b',')
}

impl FormatLoader for CsvLoader {
    fn format(&self) -> DataFormat {
        DataFormat::Csv
    }

    fn load(&self, bytes: &[u8]) -> Result<LoadedTable, FormatError> {
        let (schema, _) = csv_format()
            .infer_schema(Cursor::new(bytes), None)
            .map_err(|e| unreadable(format!("CSV schema inference failed: {}", e)))?;
        let schema = Arc::new(schema);

        let reader = ReaderBuilder::new(schema.clone())
            .with_format(csv_format())
            .with_batch_size(BATCH_SIZE)
            .build(Cursor::new(bytes))
            .map_err(|e| unreadable(format!("CSV reader failed: {}", e)))?;

        let batches = reader
            .collect::<Result<Vec<RecordBatch>, _>>()
            .map_err(|e| unreadable(format!("CSV decode failed: {}", e)))?;

        Ok(LoadedTable::new(schema, batches))
    }
}

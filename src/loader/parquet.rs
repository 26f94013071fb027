use bytes::Bytes;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::{unreadable, FormatLoader, LoadedTable};
use crate::catalog::DataFormat;
use crate::error::FormatError;

#[derive(Debug, Default)]
pub struct ParquetLoader;

impl FormatLoader for ParquetLoader {
    fn format(&self) -> DataFormat {
        DataFormat::Parquet
    }

    fn load(&self, bytes: &[u8]) -> Result<LoadedTable, FormatError> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::copy_from_slice(bytes))
            .map_err(|e| unreadable(format!("Parquet footer could not be read: {}", e)))?;
        let schema = builder.schema().clone();

        let reader = builder
            .build()
            .map_err(|e| unreadable(format!("Parquet reader failed: {}", e)))?;
        let batches = reader
            .collect::<Result<Vec<RecordBatch>, _>>()
            .map_err(|e| unreadable(format!("Parquet decode failed: {}", e)))?;

        Ok(LoadedTable::new(schema, batches))
    }
}

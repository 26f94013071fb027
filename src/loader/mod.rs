use std::collections::HashMap;
use std::sync::Arc;

use datafusion::arrow::datatypes::{Schema, SchemaRef};
use datafusion::arrow::record_batch::RecordBatch;
use tracing::{debug, info, warn};

use crate::catalog::DataFormat;
use crate::error::FormatError;
use crate::rows::field_names;

mod csv;
mod excel;
mod json;
mod parquet;

pub use self::csv::CsvLoader;
pub use self::excel::ExcelLoader;
pub use self::json::JsonLoader;
pub use self::parquet::ParquetLoader;

/// Typed tabular buffer produced by a loader.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl LoadedTable {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }
}

pub trait FormatLoader: Send + Sync {
    fn format(&self) -> DataFormat;

    fn load(&self, bytes: &[u8]) -> Result<LoadedTable, FormatError>;
}

pub(crate) fn unreadable(message: impl std::fmt::Display) -> FormatError {
    FormatError::EmptyOrUnreadable {
        message: message.to_string(),
    }
}

/// The set of loaders, one per supported format.
#[derive(Clone)]
pub struct FormatLoaders {
    loaders: HashMap<DataFormat, Arc<dyn FormatLoader>>,
}

impl Default for FormatLoaders {
    fn default() -> Self {
        Self::empty()
            .with_loader(Arc::new(CsvLoader))
            .with_loader(Arc::new(ExcelLoader))
            .with_loader(Arc::new(ParquetLoader))
            .with_loader(Arc::new(JsonLoader))
    }
}

impl FormatLoaders {
    pub fn empty() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    /// Registers `loader` for its format, replacing any previous one.
    pub fn with_loader(mut self, loader: Arc<dyn FormatLoader>) -> Self {
        self.loaders.insert(loader.format(), loader);
        self
    }

    pub fn load(&self, bytes: &[u8], format: DataFormat) -> Result<LoadedTable, FormatError> {
        let loader = self
            .loaders
            .get(&format)
            .ok_or_else(|| FormatError::UnsupportedFormat {
                extension: format.as_str().to_string(),
            })?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(unreadable("upload contains no data"));
        }

        debug!("Loading {} bytes as {}", bytes.len(), format);
        let table = with_unique_columns(loader.load(bytes)?)?;

        if table.num_columns() == 0 || table.num_rows() == 0 {
            return Err(unreadable(format!(
                "{} input produced {} rows and {} columns",
                format,
                table.num_rows(),
                table.num_columns()
            )));
        }

        info!(
            "Loaded {} table with {} rows and {} columns",
            format,
            table.num_rows(),
            table.num_columns()
        );
        Ok(table)
    }

    /// Resolves the format from the declared file name and loads the bytes.
    pub fn load_file(&self, bytes: &[u8], filename: &str) -> Result<LoadedTable, FormatError> {
        let format = DataFormat::from_filename(filename)?;
        self.load(bytes, format)
    }
}

/// Renames repeated headers (`a`, `a` becomes `a`, `a_1`) so the table can be registered.
fn with_unique_columns(table: LoadedTable) -> Result<LoadedTable, FormatError> {
    let names = field_names(&table.schema);
    let unchanged = names
        .iter()
        .zip(table.schema.fields().iter())
        .all(|(name, field)| name == field.name());
    if unchanged {
        return Ok(table);
    }

    warn!("Renamed repeated column names to {:?}", names);
    let fields: Vec<_> = table
        .schema
        .fields()
        .iter()
        .zip(names)
        .map(|(field, name)| field.as_ref().clone().with_name(name))
        .collect();
    let schema = Arc::new(Schema::new_with_metadata(
        fields,
        table.schema.metadata().clone(),
    ));

    let batches = table
        .batches
        .into_iter()
        .map(|batch| RecordBatch::try_new(schema.clone(), batch.columns().to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(unreadable)?;

    Ok(LoadedTable::new(schema, batches))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_byte_and_blank_uploads_are_unreadable() {
        let loaders = FormatLoaders::default();
        for format in [
            DataFormat::Csv,
            DataFormat::Excel,
            DataFormat::Parquet,
            DataFormat::Json,
        ] {
            assert!(matches!(
                loaders.load(b"", format),
                Err(FormatError::EmptyOrUnreadable { .. })
            ));
            assert!(matches!(
                loaders.load(b" \n\t\n", format),
                Err(FormatError::EmptyOrUnreadable { .. })
            ));
        }
    }

    #[test]
    fn header_only_csv_is_empty() {
        let loaders = FormatLoaders::default();
        assert!(matches!(
            loaders.load_file(b"a,b\n", "header.csv"),
            Err(FormatError::EmptyOrUnreadable { .. })
        ));
    }

    #[test]
    fn repeated_headers_are_renamed_in_order() {
        let loaders = FormatLoaders::default();
        let table = loaders
            .load_file(b"a,a,b,a\n1,2,x,3\n4,5,y,6\n", "dupes.csv")
            .unwrap();

        assert_eq!(table.column_names(), vec!["a", "a_1", "b", "a_2"]);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.batches[0].schema(), table.schema);
    }

    #[test]
    fn rejects_unsupported_extension_before_reading() {
        let loaders = FormatLoaders::default();
        assert!(matches!(
            loaders.load_file(b"a,b\n1,2\n", "data.tsv"),
            Err(FormatError::UnsupportedFormat { extension }) if extension == "tsv"
        ));
    }
}

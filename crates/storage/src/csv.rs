//! CSV files to typed Arrow batches.
//!
//! Files are comma-delimited with a header row and are resolved relative to
//! the loader's root directory.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use tracing::{debug, info};

use crate::backend::normalize_dataset_name;
use crate::error::StorageError;

const FIELD_DELIMITER: u8 = b',';
const INFER_MAX_RECORDS: usize = 1_000;
const BATCH_SIZE: usize = 8_192;

/// A CSV file read into memory.
pub struct CsvTable {
    pub name: String,
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

pub struct CsvLoader {
    root: PathBuf,
}

impl CsvLoader {
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read `rel_path` using a known schema. The header's column count must
    /// match the schema.
    pub fn read_with_schema(
        &self,
        rel_path: impl AsRef<Path>,
        schema: SchemaRef,
    ) -> Result<Vec<RecordBatch>, StorageError> {
        let path = self.root.join(rel_path.as_ref());
        let mut file = File::open(&path)?;

        let header_columns = count_header_columns(&mut file)?;
        if header_columns != schema.fields().len() {
            return Err(StorageError::Csv(format!(
                "{}: header has {} columns, schema has {}",
                path.display(),
                header_columns,
                schema.fields().len()
            )));
        }
        file.seek(SeekFrom::Start(0))?;

        let reader = ReaderBuilder::new(schema)
            .with_header(true)
            .with_delimiter(FIELD_DELIMITER)
            .with_batch_size(BATCH_SIZE)
            .build(file)?;
        let batches = reader.collect::<Result<Vec<_>, _>>()?;

        debug!(
            path = %path.display(),
            batches = batches.len(),
            "read CSV with known schema"
        );
        Ok(batches)
    }

    /// Read `rel_path`, inferring column types from the first rows.
    pub fn read_inferred(&self, rel_path: impl AsRef<Path>) -> Result<CsvTable, StorageError> {
        let rel_path = rel_path.as_ref();
        let path = self.root.join(rel_path);
        let file = File::open(&path)?;

        let (schema, _) = Format::default()
            .with_header(true)
            .with_delimiter(FIELD_DELIMITER)
            .infer_schema(file, Some(INFER_MAX_RECORDS))?;

        let schema = Arc::new(schema);
        let batches = self.read_with_schema(rel_path, schema.clone())?;

        Ok(CsvTable {
            name: dataset_name_for(rel_path),
            schema,
            batches,
        })
    }

    /// Every `*.csv` file under the root, sorted, as paths relative to the root.
    pub fn discover(&self) -> Vec<PathBuf> {
        if !self.root.exists() {
            return Vec::new();
        }

        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().map(|x| x == "csv").unwrap_or(false))
            .filter_map(|e| e.path().strip_prefix(&self.root).ok().map(Path::to_path_buf))
            .collect();
        files.sort();

        info!("Discovered {} CSV files under {}", files.len(), self.root.display());
        files
    }
}

fn count_header_columns(file: &mut File) -> Result<usize, StorageError> {
    let (header, _) = Format::default()
        .with_header(true)
        .with_delimiter(FIELD_DELIMITER)
        .infer_schema(file, Some(0))?;
    match header.fields().len() {
        0 => Err(StorageError::Csv("missing header row".to_string())),
        n => Ok(n),
    }
}

/// `nested/file.csv` becomes `nested_file`.
fn dataset_name_for(rel_path: &Path) -> String {
    let stem = rel_path.with_extension("");
    normalize_dataset_name(&stem.to_string_lossy())
}

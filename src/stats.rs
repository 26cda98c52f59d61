//! Output file inspection
//!
//! Summarizes a written Parquet or CSV file: location, size, creation time,
//! row and column counts, column names and the Parquet codec.

use crate::sink::OutputFormat;
use crate::{Error, Result};

use arrow::csv::reader::Format;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Summary of one output file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStats {
    pub location: PathBuf,
    pub format: String,
    pub size_bytes: u64,
    pub num_columns: usize,
    pub num_rows: usize,
    pub created: String,
    /// Codec of the first column chunk; `None` for CSV
    pub compression: Option<String>,
    pub column_names: Vec<String>,
}

impl FileStats {
    /// Inspect the file at `path`. The format is taken from its extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("{} does not exist: {}", path.display(), e),
            ))
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_string();
        let format: OutputFormat = extension.parse()?;

        let (num_rows, column_names, compression) = match format {
            OutputFormat::Parquet => inspect_parquet(path)?,
            OutputFormat::Csv => inspect_csv(path)?,
        };

        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map(|t| {
                DateTime::<Utc>::from(t)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(Self {
            location: std::fs::canonicalize(path)?,
            format: extension,
            size_bytes: metadata.len(),
            num_columns: column_names.len(),
            num_rows,
            created,
            compression,
            column_names,
        })
    }
}

impl fmt::Display for FileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File Location: {}", self.location.display())?;
        writeln!(f, "File Format: {}", self.format)?;
        writeln!(f, "Size (bytes): {}", self.size_bytes)?;
        writeln!(f, "Number of Columns: {}", self.num_columns)?;
        writeln!(f, "Number of Rows: {}", self.num_rows)?;
        writeln!(f, "Date Created: {}", self.created)?;
        writeln!(
            f,
            "Compression Type: {}",
            self.compression.as_deref().unwrap_or("N/A")
        )?;
        write!(f, "Column Names: {:?}", self.column_names)
    }
}

type Inspection = (usize, Vec<String>, Option<String>);

fn inspect_parquet(path: &Path) -> Result<Inspection> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
    let metadata = builder.metadata();

    let num_rows = metadata.file_metadata().num_rows().max(0) as usize;
    let columns = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let compression = metadata
        .row_groups()
        .first()
        .and_then(|rg| rg.columns().first())
        .map(|column| codec_name(column.compression()).to_string());

    Ok((num_rows, columns, compression))
}

fn inspect_csv(path: &Path) -> Result<Inspection> {
    let (schema, num_rows) = Format::default()
        .with_header(true)
        .infer_schema(File::open(path)?, None)?;
    let columns = schema.fields().iter().map(|f| f.name().clone()).collect();
    Ok((num_rows, columns, None))
}

fn codec_name(compression: Compression) -> &'static str {
    match compression {
        Compression::UNCOMPRESSED => "UNCOMPRESSED",
        Compression::SNAPPY => "SNAPPY",
        Compression::GZIP(_) => "GZIP",
        Compression::LZO => "LZO",
        Compression::BROTLI(_) => "BROTLI",
        Compression::LZ4 => "LZ4",
        Compression::ZSTD(_) => "ZSTD",
        Compression::LZ4_RAW => "LZ4_RAW",
    }
}

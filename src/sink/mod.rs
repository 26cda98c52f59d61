//! File sink for the accumulated table
//!
//! Every run writes to a single file named
//! `{output_path}/metrics_{label}_{timestamp}.{ext}`, where the timestamp is
//! taken once when the sink is created. Each cycle rewrites the file with the
//! whole table accumulated so far.

mod csv_writer;
mod parquet_writer;

pub use csv_writer::CsvWriter;
pub use parquet_writer::{parse_compression, ParquetWriter};

use crate::buffer::Table;
use crate::clock::Clock;
use crate::{Error, Result};
use parquet::basic::Compression;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, error, info, warn};

/// Serialization format of the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Parquet,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Parquet => "parquet",
            OutputFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "parquet" => Ok(OutputFormat::Parquet),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Sink settings
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Destination directory, created if missing
    pub output_path: PathBuf,
    /// `parquet` or `csv`; anything else is reported at write time
    pub output_format: String,
    /// Parquet codec name
    pub compression: String,
    /// File name label, e.g. `combined`
    pub label: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("data/collection"),
            output_format: "parquet".to_string(),
            compression: "snappy".to_string(),
            label: "combined".to_string(),
        }
    }
}

/// Writes the accumulated table to the run's output file
pub struct FileSink {
    config: SinkConfig,
    compression: Compression,
    file_stamp: String,
}

impl FileSink {
    /// Create a sink, fixing the file timestamp from `clock`.
    ///
    /// An unknown compression name fails here; an unknown format does not.
    pub fn new(config: SinkConfig, clock: &dyn Clock) -> Result<Self> {
        let compression = parse_compression(&config.compression)?;

        if let Ok(OutputFormat::Csv) = config.output_format.parse::<OutputFormat>() {
            if compression != Compression::UNCOMPRESSED {
                warn!(
                    compression = %config.compression,
                    "Compression is ignored for csv output"
                );
            }
        }

        Ok(Self {
            config,
            compression,
            file_stamp: clock.run_stamp(),
        })
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    /// Destination file for `format`.
    pub fn file_path(&self, format: OutputFormat) -> PathBuf {
        self.config.output_path.join(format!(
            "metrics_{}_{}.{}",
            self.config.label,
            self.file_stamp,
            format.extension()
        ))
    }

    /// Serialize `table` to the run's file.
    ///
    /// Returns the written path, or `None` when the format is unsupported or
    /// the table holds no rows.
    pub async fn write(&self, table: &Table) -> Result<Option<PathBuf>> {
        let format = match self.config.output_format.parse::<OutputFormat>() {
            Ok(format) => format,
            Err(e) => {
                error!(format = %self.config.output_format, error = %e, "Nothing written");
                return Ok(None);
            }
        };

        if table.is_empty() {
            debug!("Accumulated table is empty, nothing to write");
            return Ok(None);
        }

        create_dir(&self.config.output_path).await?;

        let batch = table.to_record_batch()?;
        let bytes = match format {
            OutputFormat::Parquet => ParquetWriter::new(self.compression).write_batch(&batch)?,
            OutputFormat::Csv => CsvWriter::new().write_batch(&batch)?,
        };

        let path = self.file_path(format);
        tokio::fs::write(&path, &bytes).await?;

        info!(
            path = %path.display(),
            rows = table.num_rows(),
            columns = table.num_columns(),
            bytes = bytes.len(),
            "Data saved"
        );
        Ok(Some(path))
    }
}

async fn create_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to create output directory {}: {}", path.display(), e),
        ))
    })
}

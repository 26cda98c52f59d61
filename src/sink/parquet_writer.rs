//! Parquet serialization with a configurable codec

use crate::{Error, Result};
use arrow_array::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::{BrotliLevel, Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::{EnabledStatistics, WriterProperties, WriterVersion};

/// Parse a compression name as accepted on the command line and in config.
///
/// Matching is case-insensitive; `""` and `none` mean uncompressed.
pub fn parse_compression(name: &str) -> Result<Compression> {
    match name.trim().to_ascii_lowercase().as_str() {
        "" | "none" | "uncompressed" => Ok(Compression::UNCOMPRESSED),
        "snappy" => Ok(Compression::SNAPPY),
        "gzip" => Ok(Compression::GZIP(GzipLevel::default())),
        "brotli" => Ok(Compression::BROTLI(BrotliLevel::default())),
        "lz4" => Ok(Compression::LZ4_RAW),
        "zstd" => Ok(Compression::ZSTD(ZstdLevel::default())),
        other => Err(Error::Config(format!(
            "unsupported compression '{}'; expected one of none, snappy, gzip, brotli, lz4, zstd",
            other
        ))),
    }
}

/// Parquet writer for flattened metric tables
pub struct ParquetWriter {
    props: WriterProperties,
    compression: Compression,
}

impl ParquetWriter {
    pub fn new(compression: Compression) -> Self {
        Self {
            props: Self::build_writer_properties(compression),
            compression,
        }
    }

    fn build_writer_properties(compression: Compression) -> WriterProperties {
        WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(compression)
            // Wide tables repeat run ids and node-level values heavily
            .set_dictionary_enabled(true)
            .set_statistics_enabled(EnabledStatistics::Chunk)
            .set_max_row_group_size(100_000)
            .build()
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Write a record batch to Parquet bytes
    pub fn write_batch(&self, batch: &RecordBatch) -> Result<Bytes> {
        let mut buffer = Vec::new();

        {
            let mut writer =
                ArrowWriter::try_new(&mut buffer, batch.schema(), Some(self.props.clone()))?;

            writer.write(batch)?;
            writer.close()?;
        }

        Ok(Bytes::from(buffer))
    }
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new(Compression::SNAPPY)
    }
}

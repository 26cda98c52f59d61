//! CSV serialization

use crate::Result;
use arrow::csv::WriterBuilder;
use arrow_array::RecordBatch;
use bytes::Bytes;

/// CSV writer emitting a header row; nulls become empty fields.
#[derive(Debug, Clone, Default)]
pub struct CsvWriter;

impl CsvWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn write_batch(&self, batch: &RecordBatch) -> Result<Bytes> {
        let mut buffer = Vec::new();

        {
            let mut writer = WriterBuilder::new().with_header(true).build(&mut buffer);
            writer.write(batch)?;
        }

        Ok(Bytes::from(buffer))
    }
}

//! Parquet serialization.
//!
//! Encodes an Arrow RecordBatch as one complete Parquet file, either into
//! memory or into any `Write` sink, with configurable compression.

use arrow::array::RecordBatch;
use bytes::{BufMut, Bytes, BytesMut};
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use snafu::prelude::*;
use std::io::Write;
use std::time::Instant;

use crate::config::{ParquetCompression, ParquetConfig};
use crate::emit;
use crate::error::{SerializeError, WriteSnafu, WriterCreateSnafu};
use crate::metrics::events::SerializationCompleted;

/// Counts bytes passed through to the inner writer.
struct CountingWriter<W> {
    inner: W,
    written: usize,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Serializes record batches to Parquet.
///
/// Output is deterministic for identical input and settings.
#[derive(Debug, Clone, Default)]
pub struct ParquetSerializer {
    compression: ParquetCompression,
    max_row_group_size: Option<usize>,
}

impl ParquetSerializer {
    /// Create a serializer with the given codec.
    pub fn new(compression: ParquetCompression) -> Self {
        Self {
            compression,
            max_row_group_size: None,
        }
    }

    /// Create a serializer from the `parquet` config section.
    pub fn from_config(config: &ParquetConfig) -> Self {
        Self::new(config.compression).with_max_row_group_size(config.max_row_group_size)
    }

    /// Cap the number of rows per row group.
    pub fn with_max_row_group_size(mut self, rows: Option<usize>) -> Self {
        self.max_row_group_size = rows.filter(|r| *r > 0);
        self
    }

    fn writer_properties(&self) -> WriterProperties {
        let mut builder = WriterProperties::builder().set_compression(match self.compression {
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ParquetCompression::Lz4 => Compression::LZ4,
        });

        if let Some(rows) = self.max_row_group_size {
            builder = builder.set_max_row_group_size(rows);
        }

        builder.build()
    }

    /// Serialize `batch` into an in-memory Parquet file.
    pub fn serialize(&self, batch: &RecordBatch) -> Result<Bytes, SerializeError> {
        let buffer = BytesMut::with_capacity(batch.get_array_memory_size() / 2).writer();
        let buffer = self.serialize_to(batch, buffer)?;
        Ok(buffer.into_inner().freeze())
    }

    /// Serialize `batch` as a complete Parquet file into `sink` and hand the
    /// sink back.
    pub fn serialize_to<W: Write + Send>(
        &self,
        batch: &RecordBatch,
        sink: W,
    ) -> Result<W, SerializeError> {
        let start = Instant::now();
        let sink = CountingWriter {
            inner: sink,
            written: 0,
        };

        let mut writer = ArrowWriter::try_new(sink, batch.schema(), Some(self.writer_properties()))
            .context(WriterCreateSnafu)?;
        writer.write(batch).context(WriteSnafu)?;
        let sink = writer.into_inner().context(WriteSnafu)?;

        emit!(SerializationCompleted {
            bytes: sink.written,
            duration: start.elapsed(),
        });
        tracing::debug!(
            "Serialized {} rows into {} bytes ({:?})",
            batch.num_rows(),
            sink.written,
            self.compression
        );

        Ok(sink.inner)
    }
}

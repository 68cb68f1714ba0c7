//! NDJSON reader.
//!
//! Decompresses newline-delimited JSON and decodes it into Arrow
//! RecordBatches using the configured schema, then assembles one `Dataset`.

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use arrow::json::ReaderBuilder;
use snafu::prelude::*;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::{CompressionFormat, InputConfig};
use crate::dataset::Dataset;
use crate::error::{
    AssembleDatasetSnafu, BatchFlushSnafu, DecoderBuildSnafu, GzipDecompressionSnafu,
    JsonDecodeSnafu, ReadInputSnafu, ReaderError, ZstdDecompressionSnafu,
};

/// Configuration for the NDJSON reader.
#[derive(Debug, Clone)]
pub struct NdjsonReaderConfig {
    /// Number of records per decoded batch.
    pub batch_size: usize,
    /// Compression format of the input.
    pub compression: CompressionFormat,
}

impl NdjsonReaderConfig {
    pub fn new(batch_size: usize, compression: CompressionFormat) -> Self {
        Self {
            batch_size,
            compression,
        }
    }
}

impl From<&InputConfig> for NdjsonReaderConfig {
    fn from(input: &InputConfig) -> Self {
        Self::new(input.batch_size.max(1), input.compression)
    }
}

/// A reader for NDJSON input that yields a `Dataset`.
pub struct NdjsonReader {
    schema: SchemaRef,
    config: NdjsonReaderConfig,
}

impl NdjsonReader {
    /// Create a new NDJSON reader with the given schema and configuration.
    pub fn new(schema: SchemaRef, config: NdjsonReaderConfig) -> Self {
        Self { schema, config }
    }

    /// Read and decode a local file.
    pub async fn read_file(&self, path: impl AsRef<Path>) -> Result<Dataset, ReaderError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = tokio::fs::read(path).await.context(ReadInputSnafu {
            path: display.clone(),
        })?;
        self.read(&raw, &display)
    }

    /// Decompress and decode `raw`. `path` is used for errors and logging.
    pub fn read(&self, raw: &[u8], path: &str) -> Result<Dataset, ReaderError> {
        let decompressed = self.decompress(raw, path)?;
        debug!(
            "Decompressed {} -> {} bytes for {}",
            raw.len(),
            decompressed.len(),
            path
        );

        let batches = self.decode(&decompressed, path)?;
        let dataset = Dataset::try_from_batches(Arc::clone(&self.schema), &batches).context(
            AssembleDatasetSnafu {
                path: path.to_string(),
            },
        )?;

        debug!(
            "Parsed {} batches ({} records) from {}",
            batches.len(),
            dataset.num_rows(),
            path
        );
        Ok(dataset)
    }

    fn decompress(&self, raw: &[u8], path: &str) -> Result<Vec<u8>, ReaderError> {
        match self.config.compression {
            CompressionFormat::Gzip => {
                let mut decoder = flate2::read::GzDecoder::new(raw);
                let mut buf = Vec::new();
                decoder
                    .read_to_end(&mut buf)
                    .context(GzipDecompressionSnafu {
                        path: path.to_string(),
                    })?;
                Ok(buf)
            }
            CompressionFormat::Zstd => zstd::decode_all(raw).context(ZstdDecompressionSnafu {
                path: path.to_string(),
            }),
            CompressionFormat::None => Ok(raw.to_vec()),
        }
    }

    fn decode(&self, data: &[u8], path: &str) -> Result<Vec<RecordBatch>, ReaderError> {
        let mut decoder = ReaderBuilder::new(Arc::clone(&self.schema))
            .with_batch_size(self.config.batch_size)
            .with_strict_mode(false)
            .build_decoder()
            .map_err(|e| {
                DecoderBuildSnafu {
                    message: e.to_string(),
                }
                .build()
            })?;

        // decode() stops after batch_size records, so flush after every call
        let mut offset = 0;
        let mut batches = Vec::new();

        loop {
            let consumed = decoder.decode(&data[offset..]).map_err(|e| {
                JsonDecodeSnafu {
                    path: path.to_string(),
                    message: e.to_string(),
                }
                .build()
            })?;

            if let Some(batch) = decoder.flush().map_err(|e| {
                BatchFlushSnafu {
                    path: path.to_string(),
                    message: e.to_string(),
                }
                .build()
            })? {
                batches.push(batch);
            }

            if consumed == 0 {
                break;
            }
            offset += consumed;
        }

        Ok(batches)
    }
}

//! Row-chunked upload: one object per fixed-size run of rows.
//!
//! Every chunk is attempted even when an earlier one fails; failures are
//! collected and reported together once the last chunk has been tried.

use object_store::path::Path;
use snafu::prelude::*;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{info, warn};

use super::cleanup::{DEFAULT_LIST_PAGE_SIZE, delete_prefix};
use crate::dataset::{Chunk, Dataset};
use crate::emit;
use crate::error::{
    ChunkFailure, ChunkFailureReason, CleanupSnafu, InvalidChunkSizeSnafu,
    PartialBatchFailureSnafu, StageTaskSnafu, UploadError,
};
use crate::metrics::events::{
    ChunkStage, ChunkUploadCompleted, ChunkUploadFailed, ChunkUploadStarted, PendingChunks,
};
use crate::sink::PartStager;
use crate::storage::{ObjectStoreClient, chunk_key};

/// Where and how to lay out the chunks of one upload.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    /// Prepended verbatim to every key.
    pub prefix: String,
    pub base_name: String,
    /// Rows per chunk.
    pub chunk_size: usize,
    /// Object extension without the dot.
    pub extension: String,
    /// Delete everything under `prefix` first.
    pub clean_prefix: bool,
    /// Keys per listing page during cleanup.
    pub list_page_size: usize,
}

impl ChunkRequest {
    pub fn new(prefix: impl Into<String>, base_name: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            prefix: prefix.into(),
            base_name: base_name.into(),
            chunk_size,
            extension: "parquet".to_string(),
            clean_prefix: false,
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_clean_prefix(mut self, clean_prefix: bool) -> Self {
        self.clean_prefix = clean_prefix;
        self
    }

    pub fn with_list_page_size(mut self, list_page_size: usize) -> Self {
        self.list_page_size = list_page_size;
        self
    }

    /// Key of chunk `index`.
    pub fn key(&self, index: usize) -> String {
        chunk_key(&self.prefix, &self.base_name, index, &self.extension)
    }
}

/// A chunk that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedChunk {
    pub index: usize,
    pub key: String,
    pub rows: usize,
    pub bytes: usize,
}

/// Summary of a fully successful chunked upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkedReport {
    /// Uploaded chunks in index order.
    pub chunks: Vec<UploadedChunk>,
    /// Objects removed by prefix cleanup.
    pub deleted: usize,
}

impl ChunkedReport {
    pub fn keys(&self) -> Vec<&str> {
        self.chunks.iter().map(|c| c.key.as_str()).collect()
    }

    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.bytes).sum()
    }
}

/// Uploads a dataset as one object per chunk of rows.
#[derive(Debug, Clone)]
pub struct ChunkedUploader {
    client: Arc<dyn ObjectStoreClient>,
    stager: Arc<dyn PartStager>,
}

impl ChunkedUploader {
    pub fn new(client: Arc<dyn ObjectStoreClient>, stager: Arc<dyn PartStager>) -> Self {
        Self { client, stager }
    }

    /// Upload every chunk of `dataset` as laid out by `request`.
    pub async fn upload(
        &self,
        dataset: &Dataset,
        request: &ChunkRequest,
    ) -> Result<ChunkedReport, UploadError> {
        let chunk_size = NonZeroUsize::new(request.chunk_size).context(InvalidChunkSizeSnafu)?;

        let deleted = if request.clean_prefix {
            delete_prefix(
                self.client.as_ref(),
                &request.prefix,
                request.list_page_size,
            )
            .await
            .context(CleanupSnafu)?
        } else {
            0
        };

        let total = dataset.chunk_count(chunk_size);
        info!(
            "Uploading {} rows as {} chunks of up to {} rows under '{}'",
            dataset.num_rows(),
            total,
            chunk_size,
            request.prefix
        );

        let mut chunks = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for chunk in dataset.chunks(chunk_size) {
            emit!(PendingChunks {
                count: total - chunk.index
            });
            let key = request.key(chunk.index);

            match self.upload_chunk(&chunk, &key).await {
                Ok(bytes) => chunks.push(UploadedChunk {
                    index: chunk.index,
                    key,
                    rows: chunk.num_rows(),
                    bytes,
                }),
                Err(reason) => {
                    warn!("Chunk {} ({}) failed: {}", chunk.index, key, reason);
                    failures.push(ChunkFailure {
                        index: chunk.index,
                        key,
                        reason,
                    });
                }
            }
        }
        emit!(PendingChunks { count: 0 });

        if !failures.is_empty() {
            return PartialBatchFailureSnafu { failures, total }.fail();
        }

        info!(
            "Uploaded {} chunks under '{}'",
            chunks.len(),
            request.prefix
        );
        Ok(ChunkedReport { chunks, deleted })
    }

    /// Stage and put one chunk, returning its serialized size.
    ///
    /// The staged part is dropped before returning, so any temporary file is
    /// gone on every path out of here.
    async fn upload_chunk(&self, chunk: &Chunk, key: &str) -> Result<usize, ChunkFailureReason> {
        emit!(ChunkUploadStarted { index: chunk.index });

        // Serialization and temp-file writes block
        let stager = Arc::clone(&self.stager);
        let batch = chunk.batch.clone();
        let staged = tokio::task::spawn_blocking(move || stager.stage(&batch))
            .await
            .context(StageTaskSnafu)
            .and_then(|staged| staged)
            .map_err(|e| {
                emit!(ChunkUploadFailed {
                    stage: ChunkStage::Stage
                });
                ChunkFailureReason::Stage(e)
            })?;
        let bytes = staged.len();

        let payload = staged.payload().await.map_err(|e| {
            emit!(ChunkUploadFailed {
                stage: ChunkStage::Stage
            });
            ChunkFailureReason::Stage(e)
        })?;

        self.client
            .put(&Path::from(key), payload)
            .await
            .map_err(|e| {
                emit!(ChunkUploadFailed {
                    stage: ChunkStage::Upload
                });
                ChunkFailureReason::Put(e)
            })?;
        drop(staged);

        emit!(ChunkUploadCompleted {
            bytes,
            rows: chunk.num_rows(),
        });
        Ok(bytes)
    }
}

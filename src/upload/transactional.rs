//! Single-object upload with all-or-nothing semantics.
//!
//! Small payloads go out as one put. Larger payloads are split into byte
//! ranges and uploaded through a multipart session that is either committed
//! as a whole or aborted; a reported error never leaves a session open.

use bytes::Bytes;
use object_store::PutPayload;
use object_store::path::Path;
use snafu::IntoError;
use snafu::prelude::*;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::parts::{part_count, split_parts};
use crate::dataset::Dataset;
use crate::emit;
use crate::error::{
    InvalidPartSizeSnafu, MultipartAbortFailedSnafu, MultipartAbortedSnafu, SerializationSnafu,
    StorageError, StoreConnectivitySnafu, TooManyPartsSnafu, UploadError,
};
use crate::metrics::events::{
    MultipartPartUploaded, MultipartSessionAborted, MultipartSessionCommitted,
    MultipartSessionStarted, RequestStatus,
};
use crate::sink::ParquetSerializer;
use crate::storage::{CompletedPart, MAX_PARTS, MIN_S3_PART_SIZE, MultipartId, ObjectStoreClient};

/// How a serialized payload of a given size will be uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPlan {
    SinglePut,
    Multipart { parts: usize },
}

/// What a successful transactional upload did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// One direct put; no session was created.
    SinglePut { bytes: usize },
    /// A committed multipart session.
    Multipart { bytes: usize, parts: usize },
}

impl UploadOutcome {
    /// Serialized size of the uploaded object.
    pub fn bytes(&self) -> usize {
        match self {
            UploadOutcome::SinglePut { bytes } | UploadOutcome::Multipart { bytes, .. } => *bytes,
        }
    }
}

/// Uploads a whole dataset as one object.
#[derive(Debug, Clone)]
pub struct TransactionalUploader {
    client: Arc<dyn ObjectStoreClient>,
    serializer: ParquetSerializer,
    /// Direct-put threshold (inclusive) and multipart part size, in bytes.
    min_part_size: NonZeroUsize,
}

impl TransactionalUploader {
    pub fn new(
        client: Arc<dyn ObjectStoreClient>,
        serializer: ParquetSerializer,
        min_part_size: usize,
    ) -> Result<Self, UploadError> {
        let min_part_size = NonZeroUsize::new(min_part_size).context(InvalidPartSizeSnafu)?;
        if min_part_size.get() < MIN_S3_PART_SIZE {
            warn!(
                "Part size of {} bytes is below the S3 minimum of {} bytes; S3 will reject multipart commits",
                min_part_size, MIN_S3_PART_SIZE
            );
        }

        Ok(Self {
            client,
            serializer,
            min_part_size,
        })
    }

    /// Decide how `serialized_len` bytes would be uploaded.
    ///
    /// Backends without multipart sessions always get a single put.
    pub fn plan(&self, serialized_len: usize) -> UploadPlan {
        if serialized_len <= self.min_part_size.get() || !self.client.supports_multipart() {
            UploadPlan::SinglePut
        } else {
            UploadPlan::Multipart {
                parts: part_count(serialized_len, self.min_part_size),
            }
        }
    }

    /// Serialize `dataset` once and upload it to `key`.
    pub async fn upload(&self, dataset: &Dataset, key: &str) -> Result<UploadOutcome, UploadError> {
        let bytes = self
            .serializer
            .serialize(dataset.batch())
            .context(SerializationSnafu)?;
        self.upload_bytes(bytes, key).await
    }

    /// Upload already-serialized bytes to `key`.
    pub async fn upload_bytes(&self, bytes: Bytes, key: &str) -> Result<UploadOutcome, UploadError> {
        let path = Path::from(key);
        let len = bytes.len();

        let parts = match self.plan(len) {
            UploadPlan::SinglePut => {
                if len > self.min_part_size.get() {
                    debug!(
                        "Store has no multipart sessions, uploading {} ({} bytes) with a single put",
                        key, len
                    );
                }
                self.client
                    .put(&path, PutPayload::from(bytes))
                    .await
                    .context(StoreConnectivitySnafu)?;
                info!("Uploaded {} ({} bytes) with a single put", key, len);
                return Ok(UploadOutcome::SinglePut { bytes: len });
            }
            UploadPlan::Multipart { parts } => parts,
        };

        ensure!(
            parts <= MAX_PARTS,
            TooManyPartsSnafu {
                parts,
                max: MAX_PARTS
            }
        );

        let upload_id = self
            .client
            .create_multipart(&path)
            .await
            .context(StoreConnectivitySnafu)?;
        emit!(MultipartSessionStarted);
        info!(
            "Started multipart upload {} for {} ({} bytes, {} parts)",
            upload_id, key, len, parts
        );

        match self.upload_parts(&path, &upload_id, &bytes).await {
            Ok(()) => {
                emit!(MultipartSessionCommitted { parts });
                info!("Committed multipart upload {} for {}", upload_id, key);
                Ok(UploadOutcome::Multipart { bytes: len, parts })
            }
            Err(cause) => Err(self.abort(&path, key, upload_id, cause).await),
        }
    }

    /// Upload every part in order, then commit.
    async fn upload_parts(
        &self,
        path: &Path,
        upload_id: &MultipartId,
        bytes: &Bytes,
    ) -> Result<(), StorageError> {
        let parts = split_parts(bytes, self.min_part_size);
        let total = parts.len();
        let mut completed = Vec::with_capacity(total);

        for (part_number, data) in parts {
            let size = data.len();
            let tag = self
                .client
                .upload_part(path, upload_id, part_number, PutPayload::from(data))
                .await?;
            emit!(MultipartPartUploaded { bytes: size });
            debug!("Uploaded part {}/{} ({} bytes)", part_number, total, size);
            completed.push(CompletedPart { part_number, tag });
        }

        self.client
            .complete_multipart(path, upload_id, completed)
            .await
    }

    /// Abort the session once and turn `cause` into the reported error.
    async fn abort(
        &self,
        path: &Path,
        key: &str,
        upload_id: MultipartId,
        cause: StorageError,
    ) -> UploadError {
        warn!(
            "Multipart upload {} for {} failed, aborting: {}",
            upload_id,
            key,
            snafu::Report::from_error(&cause)
        );

        let result = self.client.abort_multipart(path, &upload_id).await;
        emit!(MultipartSessionAborted {
            status: RequestStatus::from_result(&result),
        });

        match result {
            Ok(()) => MultipartAbortedSnafu { key, upload_id }.into_error(cause),
            Err(abort) => {
                error!(
                    "Abort of multipart upload {} for {} failed; parts may remain until the store expires them",
                    upload_id, key
                );
                MultipartAbortFailedSnafu {
                    key,
                    upload_id,
                    abort,
                }
                .into_error(cause)
            }
        }
    }
}

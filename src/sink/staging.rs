//! Staging of serialized chunks before upload.
//!
//! A `PartStager` turns a batch into a `StagedPart`, held either in memory
//! or in a scoped temporary file. Temporary files are removed when the
//! `StagedPart` is dropped, whether or not the upload succeeded.

use arrow::array::RecordBatch;
use bytes::Bytes;
use object_store::PutPayload;
use snafu::prelude::*;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

use super::parquet::ParquetSerializer;
use crate::config::StagingMode;
use crate::error::{ReadStagedSnafu, SerializeError, TempFileSnafu};

/// Serialized Parquet data waiting to be uploaded.
#[derive(Debug)]
pub enum StagedPart {
    /// Bytes held in memory.
    Memory(Bytes),
    /// Bytes written to a temporary file, deleted on drop.
    File { file: NamedTempFile, len: usize },
}

impl StagedPart {
    /// Serialized size in bytes.
    pub fn len(&self) -> usize {
        match self {
            StagedPart::Memory(bytes) => bytes.len(),
            StagedPart::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of the backing temporary file, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            StagedPart::Memory(_) => None,
            StagedPart::File { file, .. } => Some(file.path()),
        }
    }

    /// Load the staged bytes as an upload payload.
    pub async fn payload(&self) -> Result<PutPayload, SerializeError> {
        match self {
            StagedPart::Memory(bytes) => Ok(PutPayload::from(bytes.clone())),
            StagedPart::File { file, .. } => {
                let path = file.path();
                let data = tokio::fs::read(path).await.context(ReadStagedSnafu {
                    path: path.to_path_buf(),
                })?;
                Ok(PutPayload::from(data))
            }
        }
    }
}

/// Serializes a batch and stages the result for upload.
pub trait PartStager: Send + Sync + std::fmt::Debug {
    fn stage(&self, batch: &RecordBatch) -> Result<StagedPart, SerializeError>;
}

/// Stages parts as in-memory bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStager {
    serializer: ParquetSerializer,
}

impl MemoryStager {
    pub fn new(serializer: ParquetSerializer) -> Self {
        Self { serializer }
    }
}

impl PartStager for MemoryStager {
    fn stage(&self, batch: &RecordBatch) -> Result<StagedPart, SerializeError> {
        Ok(StagedPart::Memory(self.serializer.serialize(batch)?))
    }
}

/// Stages parts in scoped temporary files.
#[derive(Debug, Clone, Default)]
pub struct TempFileStager {
    serializer: ParquetSerializer,
    /// Directory for the temporary files; the system temp dir when `None`.
    dir: Option<PathBuf>,
}

impl TempFileStager {
    pub fn new(serializer: ParquetSerializer, dir: Option<PathBuf>) -> Self {
        Self { serializer, dir }
    }

    fn create_file(&self) -> std::io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("floe-chunk-").suffix(".parquet");
        match &self.dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }
}

impl PartStager for TempFileStager {
    fn stage(&self, batch: &RecordBatch) -> Result<StagedPart, SerializeError> {
        let file = self.create_file().context(TempFileSnafu)?;
        let writer = self
            .serializer
            .serialize_to(batch, BufWriter::new(file))?;
        let file = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .context(TempFileSnafu)?;

        let len = file.as_file().metadata().context(TempFileSnafu)?.len() as usize;
        tracing::debug!("Staged {} bytes in {}", len, file.path().display());

        Ok(StagedPart::File { file, len })
    }
}

/// Build the stager for a configured staging mode.
pub fn stager_for(
    mode: StagingMode,
    serializer: ParquetSerializer,
    dir: Option<PathBuf>,
) -> Arc<dyn PartStager> {
    match mode {
        StagingMode::Memory => Arc::new(MemoryStager::new(serializer)),
        StagingMode::TempFile => Arc::new(TempFileStager::new(serializer, dir)),
    }
}

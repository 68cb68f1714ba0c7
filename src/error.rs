//! Error types for floe using snafu.
//!
//! One enum per concern, each with context selectors. `UploadError` carries
//! the outcome kinds callers of the uploaders match on.

use snafu::prelude::*;
use std::fmt;
use std::path::PathBuf;

// ============ Storage Errors ============

/// Errors that can occur during object store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },

    /// GCS configuration error.
    #[snafu(display("GCS configuration error"))]
    GcsConfig { source: object_store::Error },

    /// Azure configuration error.
    #[snafu(display("Azure configuration error"))]
    AzureConfig { source: object_store::Error },

    /// The backend has no multipart upload support.
    #[snafu(display("Multipart uploads are not supported by {url}"))]
    MultipartUnsupported { url: String },

    /// Parts passed to a commit do not form the sequence 1..=N.
    #[snafu(display("Invalid part sequence: expected part {expected}, found part {found}"))]
    InvalidPartSequence { expected: usize, found: usize },
}

// ============ Serialization Errors ============

/// Errors that can occur while turning rows into Parquet bytes.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SerializeError {
    /// Failed to create the Parquet writer.
    #[snafu(display("Failed to create Parquet writer"))]
    WriterCreate {
        source: parquet::errors::ParquetError,
    },

    /// Parquet write error.
    #[snafu(display("Parquet write error"))]
    Write {
        source: parquet::errors::ParquetError,
    },

    /// Failed to create or write the scoped temporary file.
    #[snafu(display("Temporary file error"))]
    TempFile { source: std::io::Error },

    /// Failed to read back a staged temporary file for upload.
    #[snafu(display("Failed to read staged file {}", path.display()))]
    ReadStaged {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input batches could not be combined into one dataset.
    #[snafu(display("Malformed dataset"))]
    MalformedDataset {
        source: arrow::error::ArrowError,
    },

    /// The blocking staging task panicked or was cancelled.
    #[snafu(display("Staging task failed"))]
    StageTask { source: tokio::task::JoinError },
}

// ============ Cleanup Errors ============

/// Errors raised by prefix cleanup. Absence of matching objects is not an error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CleanupError {
    /// Listing objects under the prefix failed.
    #[snafu(display("Failed to list objects under '{prefix}'"))]
    List { prefix: String, source: StorageError },

    /// Batch delete failed after `deleted` objects were already removed.
    #[snafu(display("Failed to delete objects under '{prefix}' ({deleted} already deleted)"))]
    Delete {
        prefix: String,
        deleted: usize,
        source: StorageError,
    },
}

// ============ Upload Errors ============

/// Why a single chunk of a chunked upload failed.
#[derive(Debug)]
pub enum ChunkFailureReason {
    /// The chunk could not be serialized or staged.
    Stage(SerializeError),
    /// The put of the staged chunk failed.
    Put(StorageError),
}

impl fmt::Display for ChunkFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkFailureReason::Stage(e) => write!(f, "staging failed: {}", snafu::Report::from_error(e)),
            ChunkFailureReason::Put(e) => write!(f, "upload failed: {}", snafu::Report::from_error(e)),
        }
    }
}

/// A failed chunk in a chunked upload.
#[derive(Debug)]
pub struct ChunkFailure {
    /// Chunk index (0-based, in row order).
    pub index: usize,
    /// Key the chunk was destined for.
    pub key: String,
    /// What went wrong.
    pub reason: ChunkFailureReason,
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk {} ({}): {}", self.index, self.key, self.reason)
    }
}

fn failed_indices(failures: &[ChunkFailure]) -> Vec<usize> {
    failures.iter().map(|f| f.index).collect()
}

/// Errors returned by the transactional and chunked uploaders.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum UploadError {
    /// The dataset could not be serialized.
    #[snafu(display("Serialization failed"))]
    Serialization { source: SerializeError },

    /// A store call failed outside of an open multipart session.
    #[snafu(display("Object store request failed"))]
    StoreConnectivity { source: StorageError },

    /// One or more chunks failed; every chunk was attempted.
    #[snafu(display(
        "{} of {total} chunk uploads failed (indices {:?})",
        failures.len(),
        failed_indices(failures)
    ))]
    PartialBatchFailure {
        failures: Vec<ChunkFailure>,
        total: usize,
    },

    /// A part upload or commit failed and the session was aborted.
    #[snafu(display("Multipart upload of '{key}' aborted (upload id {upload_id})"))]
    MultipartAborted {
        key: String,
        upload_id: String,
        source: StorageError,
    },

    /// A part upload or commit failed and aborting the session failed too.
    #[snafu(display(
        "Multipart upload of '{key}' failed and abort of upload id {upload_id} also failed: {}",
        snafu::Report::from_error(abort)
    ))]
    MultipartAbortFailed {
        key: String,
        upload_id: String,
        #[snafu(source)]
        cause: StorageError,
        abort: StorageError,
    },

    /// Prefix cleanup before a chunked upload failed.
    #[snafu(display("Prefix cleanup failed"))]
    Cleanup { source: CleanupError },

    /// Chunk size of zero rows.
    #[snafu(display("Chunk size must be at least one row"))]
    InvalidChunkSize,

    /// Part size threshold of zero bytes.
    #[snafu(display("Minimum part size must be at least one byte"))]
    InvalidPartSize,

    /// The part plan exceeds what a multipart session accepts.
    #[snafu(display("Upload needs {parts} parts, more than the maximum of {max}"))]
    TooManyParts { parts: usize, max: usize },
}

impl UploadError {
    /// Indices of failed chunks, empty for anything but a partial batch failure.
    pub fn failed_chunks(&self) -> Vec<usize> {
        match self {
            UploadError::PartialBatchFailure { failures, .. } => failed_indices(failures),
            _ => Vec::new(),
        }
    }

    /// True when the error came from an aborted multipart session, whether or
    /// not the abort itself succeeded.
    pub fn is_aborted_session(&self) -> bool {
        matches!(
            self,
            UploadError::MultipartAborted { .. } | UploadError::MultipartAbortFailed { .. }
        )
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Storage URL is empty.
    #[snafu(display("Storage URL cannot be empty"))]
    EmptyStorageUrl,

    /// Input path is empty.
    #[snafu(display("Input path cannot be empty"))]
    EmptyInputPath,

    /// Schema has no fields.
    #[snafu(display("Schema must have at least one field"))]
    EmptySchema,

    /// Chunk size of zero rows.
    #[snafu(display("upload.chunk_size must be greater than zero"))]
    ZeroChunkSize,

    /// Part size of zero.
    #[snafu(display("upload.min_part_size_mb must be greater than zero"))]
    ZeroPartSize,

    /// Listing page larger than a store accepts.
    #[snafu(display("upload.list_page_size must be at most {max}"))]
    ListPageTooLarge { max: usize },

    /// Transactional key is empty.
    #[snafu(display("upload.key cannot be empty"))]
    EmptyTargetKey,

    /// A key or prefix contains an unknown strftime code.
    #[snafu(display("Invalid key template '{template}'"))]
    InvalidKeyTemplate { template: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Reader Errors ============

/// Errors that can occur while loading the input dataset.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReaderError {
    /// Failed to read the input file.
    #[snafu(display("Failed to read input {path}"))]
    ReadInput {
        path: String,
        source: std::io::Error,
    },

    /// Gzip decompression failed.
    #[snafu(display("Gzip decompression failed for {path}"))]
    GzipDecompression {
        path: String,
        source: std::io::Error,
    },

    /// Zstd decompression failed.
    #[snafu(display("Zstd decompression failed for {path}"))]
    ZstdDecompression {
        path: String,
        source: std::io::Error,
    },

    /// Failed to build JSON decoder.
    #[snafu(display("Failed to build JSON decoder: {message}"))]
    DecoderBuild { message: String },

    /// Failed to decode JSON.
    #[snafu(display("Failed to decode JSON for {path}: {message}"))]
    JsonDecode { path: String, message: String },

    /// Failed to flush decoded rows into a batch.
    #[snafu(display("Failed to flush batch for {path}: {message}"))]
    BatchFlush { path: String, message: String },

    /// Decoded batches could not be combined into one dataset.
    #[snafu(display("Failed to assemble dataset from {path}"))]
    AssembleDataset {
        path: String,
        source: SerializeError,
    },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization and export.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Failed to write the metrics textfile.
    #[snafu(display("Failed to write metrics textfile {}", path.display()))]
    WriteTextfile {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ============ Run Error (top-level) ============

/// Top-level errors for a CLI run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RunError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Input loading error.
    #[snafu(display("Failed to load input"))]
    Reader { source: ReaderError },

    /// Storage client construction error.
    #[snafu(display("Storage error"))]
    RunStorage { source: StorageError },

    /// Upload error.
    #[snafu(display("Upload failed"))]
    Upload { source: UploadError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },
}

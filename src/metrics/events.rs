//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence during an upload.
//! Events implement the `InternalEvent` trait which records the corresponding
//! metric and logs it at trace level.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

// ============================================================================
// Serialization events
// ============================================================================

/// Event emitted when a dataset or chunk has been serialized to Parquet.
pub struct SerializationCompleted {
    pub bytes: usize,
    pub duration: Duration,
}

impl InternalEvent for SerializationCompleted {
    fn emit(self) {
        trace!(
            bytes = self.bytes,
            duration_ms = self.duration.as_millis(),
            "Serialization completed"
        );
        counter!("floe_serialized_bytes_total").increment(self.bytes as u64);
        histogram!("floe_serialization_duration_seconds").record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Multipart session events
// ============================================================================

/// Event emitted when a multipart session is opened.
pub struct MultipartSessionStarted;

impl InternalEvent for MultipartSessionStarted {
    fn emit(self) {
        trace!("Multipart session started");
        counter!("floe_multipart_sessions_started_total").increment(1);
    }
}

/// Event emitted for every part accepted by the store.
pub struct MultipartPartUploaded {
    pub bytes: usize,
}

impl InternalEvent for MultipartPartUploaded {
    fn emit(self) {
        trace!(bytes = self.bytes, "Multipart part uploaded");
        counter!("floe_multipart_parts_total").increment(1);
        counter!("floe_multipart_bytes_total").increment(self.bytes as u64);
    }
}

/// Event emitted when a multipart session is committed.
pub struct MultipartSessionCommitted {
    pub parts: usize,
}

impl InternalEvent for MultipartSessionCommitted {
    fn emit(self) {
        trace!(parts = self.parts, "Multipart session committed");
        counter!("floe_multipart_sessions_committed_total").increment(1);
        histogram!("floe_multipart_parts_per_session").record(self.parts as f64);
    }
}

/// Event emitted when a multipart session is aborted.
pub struct MultipartSessionAborted {
    pub status: RequestStatus,
}

impl InternalEvent for MultipartSessionAborted {
    fn emit(self) {
        trace!(abort_status = self.status.as_str(), "Multipart session aborted");
        counter!(
            "floe_multipart_sessions_aborted_total",
            "abort_status" => self.status.as_str()
        )
        .increment(1);
    }
}

// ============================================================================
// Chunk events
// ============================================================================

/// Stage at which a chunk failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStage {
    Stage,
    Upload,
}

impl ChunkStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStage::Stage => "stage",
            ChunkStage::Upload => "upload",
        }
    }
}

/// Event emitted before a chunk is staged.
pub struct ChunkUploadStarted {
    pub index: usize,
}

impl InternalEvent for ChunkUploadStarted {
    fn emit(self) {
        trace!(index = self.index, "Chunk upload started");
        counter!("floe_chunk_uploads_started_total").increment(1);
    }
}

/// Event emitted when a chunk object has been written.
pub struct ChunkUploadCompleted {
    pub bytes: usize,
    pub rows: usize,
}

impl InternalEvent for ChunkUploadCompleted {
    fn emit(self) {
        trace!(bytes = self.bytes, rows = self.rows, "Chunk upload completed");
        counter!("floe_chunk_uploads_total", "status" => "success").increment(1);
        counter!("floe_chunk_rows_total").increment(self.rows as u64);
        counter!("floe_chunk_bytes_total").increment(self.bytes as u64);
    }
}

/// Event emitted when a chunk fails to stage or upload.
pub struct ChunkUploadFailed {
    pub stage: ChunkStage,
}

impl InternalEvent for ChunkUploadFailed {
    fn emit(self) {
        trace!(stage = self.stage.as_str(), "Chunk upload failed");
        counter!(
            "floe_chunk_uploads_total",
            "status" => "failed",
            "stage" => self.stage.as_str()
        )
        .increment(1);
    }
}

/// Event emitted with the number of chunks still to be attempted.
pub struct PendingChunks {
    pub count: usize,
}

impl InternalEvent for PendingChunks {
    fn emit(self) {
        trace!(count = self.count, "Pending chunks");
        gauge!("floe_pending_chunks").set(self.count as f64);
    }
}

// ============================================================================
// Cleanup events
// ============================================================================

/// Event emitted after a batch delete removed objects.
pub struct ObjectsDeleted {
    pub count: usize,
}

impl InternalEvent for ObjectsDeleted {
    fn emit(self) {
        trace!(count = self.count, "Objects deleted");
        counter!("floe_objects_deleted_total").increment(self.count as u64);
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Put,
    List,
    Delete,
    CreateMultipart,
    PutPart,
    CompleteMultipart,
    AbortMultipart,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Put => "put",
            StorageOperation::List => "list",
            StorageOperation::Delete => "delete",
            StorageOperation::CreateMultipart => "create_multipart",
            StorageOperation::PutPart => "put_part",
            StorageOperation::CompleteMultipart => "complete_multipart",
            StorageOperation::AbortMultipart => "abort_multipart",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn from_result<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "floe_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a storage request completes with duration.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request duration"
        );
        histogram!(
            "floe_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}

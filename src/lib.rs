//! floe: serialize tabular data to Parquet and upload it to object storage.
//!
//! A dataset is uploaded either as one object, with a multipart session that
//! is committed or aborted as a whole, or as one object per fixed-size run of
//! rows with every failed chunk reported.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use floe::{ChunkRequest, ChunkedUploader, MemoryStager, StorageProvider};
//!
//! let client = Arc::new(StorageProvider::for_url_with_options("s3://bucket", options).await?);
//! let uploader = ChunkedUploader::new(client, Arc::new(MemoryStager::default()));
//! let report = uploader
//!     .upload(&dataset, &ChunkRequest::new("data/", "files", 10))
//!     .await?;
//! println!("Uploaded {} chunks", report.chunks.len());
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod job;
pub mod metrics;
pub mod sink;
pub mod source;
pub mod storage;
pub mod upload;

// Re-export main types
pub use config::Config;
pub use dataset::{Chunk, Dataset};
pub use job::{JobPlan, JobReport, UploadJob};
pub use sink::{MemoryStager, ParquetSerializer, PartStager, StagedPart, TempFileStager};
pub use storage::{ObjectStoreClient, StorageProvider};
pub use upload::{
    ChunkRequest, ChunkedReport, ChunkedUploader, TransactionalUploader, UploadOutcome,
    delete_prefix,
};

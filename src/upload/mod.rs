//! Upload strategies.
//!
//! - `transactional`: one object, direct put or an all-or-nothing multipart session
//! - `chunked`: one object per fixed-size run of rows, partial failures reported
//! - `cleanup`: deletion of everything under a prefix

pub mod chunked;
pub mod cleanup;
pub mod parts;
pub mod transactional;

pub use chunked::{ChunkRequest, ChunkedReport, ChunkedUploader, UploadedChunk};
pub use cleanup::{DEFAULT_LIST_PAGE_SIZE, delete_prefix};
pub use parts::split_parts;
pub use transactional::{TransactionalUploader, UploadOutcome, UploadPlan};

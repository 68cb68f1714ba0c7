//! The object store interface the uploaders are written against.
//!
//! `StorageProvider` is the production implementation; tests inject their
//! own recording doubles.

use async_trait::async_trait;
use object_store::PutPayload;
use object_store::multipart::PartId;
use object_store::path::Path;
use std::fmt::Debug;

use crate::error::{InvalidPartSequenceSnafu, StorageError};

/// Identifier of an open multipart session, as issued by the store.
pub type MultipartId = String;

/// Most keys one listing page or batch delete may cover (S3 limit).
pub const MAX_LIST_PAGE_SIZE: usize = 1000;

/// Maximum number of parts in one multipart session (S3 limit).
pub const MAX_PARTS: usize = 10_000;

/// Smallest part size S3 accepts for every part but the last.
pub const MIN_S3_PART_SIZE: usize = 5 * 1024 * 1024;

/// A part accepted by the store, ready to be referenced by a commit.
#[derive(Debug, Clone)]
pub struct CompletedPart {
    /// 1-based part number.
    pub part_number: usize,
    /// Tag returned by the store for this part.
    pub tag: PartId,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Keys on this page, relative to the client's base key.
    pub keys: Vec<Path>,
    /// Pass back to fetch the next page; `None` on the last page.
    pub next_token: Option<String>,
}

/// Bucket-bound object store operations used by the uploaders.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync + Debug {
    /// Whether `create_multipart` can open sessions on this store.
    fn supports_multipart(&self) -> bool {
        true
    }

    /// Write a complete object.
    async fn put(&self, key: &Path, payload: PutPayload) -> Result<(), StorageError>;

    /// Open a multipart session for `key`.
    async fn create_multipart(&self, key: &Path) -> Result<MultipartId, StorageError>;

    /// Upload one part. `part_number` is 1-based.
    async fn upload_part(
        &self,
        key: &Path,
        id: &MultipartId,
        part_number: usize,
        payload: PutPayload,
    ) -> Result<PartId, StorageError>;

    /// Commit a session. `parts` must be numbered 1..=N in order.
    async fn complete_multipart(
        &self,
        key: &Path,
        id: &MultipartId,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError>;

    /// Discard a session and every part uploaded to it.
    async fn abort_multipart(&self, key: &Path, id: &MultipartId) -> Result<(), StorageError>;

    /// List up to `page_size` keys starting with `prefix`, in lexical order.
    ///
    /// `prefix` is a plain string match, not a directory boundary.
    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
        page_size: usize,
    ) -> Result<ListPage, StorageError>;

    /// Delete every key in `keys`. Keys that no longer exist are ignored.
    async fn delete_batch(&self, keys: &[Path]) -> Result<(), StorageError>;
}

/// Check that `parts` are numbered 1..=N in order and return their tags.
pub fn validate_part_sequence(parts: Vec<CompletedPart>) -> Result<Vec<PartId>, StorageError> {
    parts
        .into_iter()
        .enumerate()
        .map(|(i, part)| {
            let expected = i + 1;
            snafu::ensure!(
                part.part_number == expected,
                InvalidPartSequenceSnafu {
                    expected,
                    found: part.part_number,
                }
            );
            Ok(part.tag)
        })
        .collect()
}

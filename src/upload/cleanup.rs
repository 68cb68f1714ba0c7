//! Deletion of every object under a key prefix.

use snafu::prelude::*;
use tracing::{debug, info};

use crate::emit;
use crate::error::{CleanupError, DeleteSnafu, ListSnafu};
use crate::metrics::events::ObjectsDeleted;
use crate::storage::{MAX_LIST_PAGE_SIZE, ObjectStoreClient};

/// Page size used when the caller passes zero.
pub const DEFAULT_LIST_PAGE_SIZE: usize = MAX_LIST_PAGE_SIZE;

/// Delete every object whose key starts with `prefix`.
///
/// Pages through the full listing and deletes each page with one batch
/// call. Page sizes above `MAX_LIST_PAGE_SIZE` are clamped to it. Returns
/// the number of objects deleted; an empty prefix is `Ok(0)`.
pub async fn delete_prefix(
    client: &dyn ObjectStoreClient,
    prefix: &str,
    page_size: usize,
) -> Result<usize, CleanupError> {
    let page_size = match page_size {
        0 => DEFAULT_LIST_PAGE_SIZE,
        n => n.min(MAX_LIST_PAGE_SIZE),
    };

    let mut deleted = 0;
    let mut token: Option<String> = None;

    loop {
        let page = client
            .list_page(prefix, token.as_deref(), page_size)
            .await
            .context(ListSnafu { prefix })?;

        if !page.keys.is_empty() {
            client
                .delete_batch(&page.keys)
                .await
                .context(DeleteSnafu { prefix, deleted })?;
            deleted += page.keys.len();
            emit!(ObjectsDeleted {
                count: page.keys.len()
            });
            debug!("Deleted {} objects under '{}'", page.keys.len(), prefix);
        }

        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    info!("Removed {} objects under '{}'", deleted, prefix);
    Ok(deleted)
}

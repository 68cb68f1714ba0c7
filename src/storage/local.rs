//! Local filesystem backend.
//!
//! Objects are plain files under the configured root. There are no
//! multipart sessions here, so large uploads go out as one put.

use object_store::local::LocalFileSystem;
use object_store::path::Path;
use snafu::prelude::*;

use crate::error::{IoSnafu, ObjectStoreSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// Local filesystem configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub path: String,
    pub key: Option<Path>,
}

impl LocalConfig {
    pub(super) fn canonical_url(&self) -> String {
        format!("file://{}", self.path)
    }
}

impl StorageProvider {
    pub(super) async fn construct_local(config: LocalConfig) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(&config.path)
            .await
            .context(IoSnafu)?;

        // Prune directories emptied by prefix cleanup
        let store = LocalFileSystem::new_with_prefix(&config.path)
            .context(ObjectStoreSnafu)?
            .with_automatic_cleanup(true);

        Ok(Self::from_object_store(BackendConfig::Local(config), store))
    }
}

//! Google Cloud Storage backend.
//!
//! Credentials come from `GOOGLE_*` variables (including
//! `GOOGLE_SERVICE_ACCOUNT_KEY`) or `storage_options`.

use object_store::gcp::{GoogleCloudStorageBuilder, GoogleConfigKey};
use object_store::path::Path;
use snafu::prelude::*;
use std::collections::HashMap;

use crate::error::{GcsConfigSnafu, StorageError};

use super::{BackendConfig, StorageProvider, apply_options, default_retry_config};

/// Google Cloud Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsConfig {
    pub bucket: String,
    pub key: Option<Path>,
}

impl GcsConfig {
    pub(super) fn canonical_url(&self) -> String {
        let host = format!("https://{}.storage.googleapis.com", self.bucket);
        match &self.key {
            Some(key) => format!("{host}/{key}"),
            None => host,
        }
    }
}

impl StorageProvider {
    pub(super) fn construct_gcs(
        config: GcsConfig,
        options: &HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let base = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(&config.bucket)
            .with_retry(default_retry_config());
        let store = apply_options(base, options, |b, key: GoogleConfigKey, value| {
            b.with_config(key, value)
        })
        .and_then(GoogleCloudStorageBuilder::build)
        .context(GcsConfigSnafu)?;

        Ok(Self::from_multipart_store(BackendConfig::Gcs(config), store))
    }
}

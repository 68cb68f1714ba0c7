//! Azure Blob Storage backend.

use object_store::azure::{AzureConfigKey, MicrosoftAzureBuilder};
use object_store::path::Path;
use snafu::prelude::*;
use std::collections::HashMap;

use crate::error::{AzureConfigSnafu, StorageError};

use super::{BackendConfig, StorageProvider, apply_options, default_retry_config};

/// Azure Blob Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureConfig {
    pub account: String,
    pub container: String,
    pub key: Option<Path>,
}

impl AzureConfig {
    pub(super) fn canonical_url(&self) -> String {
        let mut url = format!(
            "https://{}.blob.core.windows.net/{}",
            self.account, self.container
        );
        if let Some(key) = &self.key {
            url.push('/');
            url.push_str(key.as_ref());
        }
        url
    }
}

impl StorageProvider {
    pub(super) fn construct_azure(
        config: AzureConfig,
        options: &HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let base = MicrosoftAzureBuilder::from_env()
            .with_account(&config.account)
            .with_container_name(&config.container)
            .with_retry(default_retry_config());
        let store = apply_options(base, options, |b, key: AzureConfigKey, value| {
            b.with_config(key, value)
        })
        .and_then(MicrosoftAzureBuilder::build)
        .context(AzureConfigSnafu)?;

        Ok(Self::from_multipart_store(BackendConfig::Azure(config), store))
    }
}

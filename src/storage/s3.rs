//! S3 and S3-compatible backends (MinIO, LocalStack).

use object_store::aws::{AmazonS3Builder, AmazonS3ConfigKey};
use object_store::path::Path;
use snafu::prelude::*;
use std::collections::HashMap;

use crate::error::{S3ConfigSnafu, StorageError};

use super::{BackendConfig, StorageProvider, apply_options, default_retry_config};

/// S3 storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub bucket: String,
    pub key: Option<Path>,
}

impl S3Config {
    pub(super) fn canonical_url(&self) -> String {
        let url = match (&self.region, &self.endpoint) {
            (_, Some(endpoint)) => format!("s3::{}/{}", endpoint, self.bucket),
            (Some(region), _) => format!("https://s3.{}.amazonaws.com/{}", region, self.bucket),
            _ => format!("https://s3.amazonaws.com/{}", self.bucket),
        };

        match &self.key {
            Some(key) => format!("{url}/{key}"),
            None => url,
        }
    }

    /// Environment first, then `options`, then what the URL pinned down.
    fn builder(&self, options: &HashMap<String, String>) -> Result<AmazonS3Builder, StorageError> {
        let base = AmazonS3Builder::from_env()
            .with_bucket_name(&self.bucket)
            .with_retry(default_retry_config());
        let builder = apply_options(base, options, |b, key: AmazonS3ConfigKey, value| {
            b.with_config(key, value)
        })
        .context(S3ConfigSnafu)?;

        let builder = match &self.region {
            Some(region) => builder.with_region(region),
            None => builder,
        };

        Ok(match &self.endpoint {
            // Compatible stores are addressed path-style
            Some(endpoint) => builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(endpoint.starts_with("http://")),
            None => builder,
        })
    }
}

impl StorageProvider {
    pub(super) fn construct_s3(
        config: S3Config,
        options: &HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let store = config.builder(options)?.build().context(S3ConfigSnafu)?;
        Ok(Self::from_multipart_store(BackendConfig::S3(config), store))
    }
}

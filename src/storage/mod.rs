//! Multi-cloud storage abstraction.
//!
//! Provides a unified interface for working with S3, GCS, Azure Blob Storage,
//! the local filesystem and an in-process store.

mod azure;
mod client;
mod gcs;
mod local;
mod memory;
mod prefix;
mod s3;

pub use client::{
    CompletedPart, ListPage, MAX_LIST_PAGE_SIZE, MAX_PARTS, MIN_S3_PART_SIZE, MultipartId,
    ObjectStoreClient,
    validate_part_sequence,
};
pub use prefix::{KeyTemplate, chunk_key};

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, future::ready};
use object_store::multipart::{MultipartStore, PartId};
use object_store::path::{DELIMITER, Path, PathPart};
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload, RetryConfig};
use regex::Regex;
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{InvalidUrlSnafu, MultipartUnsupportedSnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

// Re-export config types
pub use azure::AzureConfig;
pub use gcs::GcsConfig;
pub use local::LocalConfig;
pub use s3::S3Config;

/// Content type attached to uploaded Parquet objects.
pub const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";

/// Storage provider that abstracts over different cloud storage backends.
///
/// A provider is bound to one bucket (and optional base key); every key it
/// is handed is relative to that base.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    /// Multipart sessions with explicit part numbering.
    /// S3, GCS, Azure and memory support this; the local filesystem does not.
    pub(crate) multipart_store: Option<Arc<dyn MultipartStore>>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

// URL patterns for different storage backends
const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_URL: &str = r"^file:(?P<path>.*)$";
const FILE_PATH: &str = r"^/(?P<path>.*)$";

const GCS_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-_\.]+)\.storage\.googleapis\.com(/(?P<key>.+))?$";
const GCS_PATH: &str =
    r"^https://storage\.googleapis\.com/(?P<bucket>[a-z0-9\-_\.]+)(/(?P<key>.+))?$";
const GCS_URL: &str = r"^[gG][sS]://(?P<bucket>[a-z0-9\-\._]+)(/(?P<key>.+))?$";

const ABFS_URL: &str = r"^abfss?://(?P<container>[a-z0-9\-]+)@(?P<account>[a-z0-9]+)\.dfs\.core\.windows\.net(/(?P<key>.+))?$";
const AZURE_HTTPS: &str = r"^https://(?P<account>[a-z0-9]+)\.(blob|dfs)\.core\.windows\.net/(?P<container>[a-z0-9\-]+)(/(?P<key>.+))?$";

const MEMORY_URL: &str = r"^memory://$";

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
enum Backend {
    S3,
    Gcs,
    Azure,
    Local,
    Memory,
}

fn matchers() -> &'static HashMap<Backend, Vec<Regex>> {
    static MATCHERS: OnceLock<HashMap<Backend, Vec<Regex>>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("storage URL pattern must compile"))
                .collect()
        };

        HashMap::from([
            (
                Backend::S3,
                compile(&[S3_PATH, S3_VIRTUAL, S3_ENDPOINT_URL, S3_URL]),
            ),
            (Backend::Gcs, compile(&[GCS_PATH, GCS_VIRTUAL, GCS_URL])),
            (Backend::Azure, compile(&[ABFS_URL, AZURE_HTTPS])),
            (Backend::Local, compile(&[FILE_URI, FILE_URL, FILE_PATH])),
            (Backend::Memory, compile(&[MEMORY_URL])),
        ])
    })
}

/// Retry configuration shared by the cloud backends.
pub(crate) fn default_retry_config() -> RetryConfig {
    RetryConfig::default()
}

/// Fold `storage_options` into a builder, parsing each name as a backend key.
fn apply_options<B, K>(
    builder: B,
    options: &HashMap<String, String>,
    with_config: impl Fn(B, K, &str) -> B,
) -> Result<B, object_store::Error>
where
    K: FromStr<Err = object_store::Error>,
{
    options
        .iter()
        .try_fold(builder, |builder, (name, value)| {
            Ok(with_config(builder, name.parse()?, value.as_str()))
        })
}

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Gcs(GcsConfig),
    Azure(AzureConfig),
    Local(LocalConfig),
    Memory,
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        for (k, v) in matchers() {
            if let Some(matches) = v.iter().find_map(|r| r.captures(url)) {
                return match k {
                    Backend::S3 => Ok(Self::parse_s3(&matches)),
                    Backend::Gcs => Ok(Self::parse_gcs(&matches)),
                    Backend::Azure => Ok(Self::parse_azure(&matches)),
                    Backend::Local => Ok(Self::parse_local(&matches)),
                    Backend::Memory => Ok(BackendConfig::Memory),
                };
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn capture(matches: &regex::Captures, name: &str) -> String {
        matches
            .name(name)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }

    fn capture_key(matches: &regex::Captures) -> Option<Path> {
        matches.name("key").map(|m| Path::from(m.as_str()))
    }

    fn parse_s3(matches: &regex::Captures) -> Self {
        let region = std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .or_else(|| matches.name("region").map(|m| m.as_str().to_string()));

        let endpoint = std::env::var("AWS_ENDPOINT").ok().or_else(|| {
            matches.name("endpoint").map(|endpoint| {
                let port = matches
                    .name("port")
                    .and_then(|p| p.as_str().parse::<u16>().ok())
                    .unwrap_or(443);
                let protocol = matches
                    .name("protocol")
                    .map(|p| p.as_str())
                    .unwrap_or("https");
                format!("{}://{}:{}", protocol, endpoint.as_str(), port)
            })
        });

        BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket: Self::capture(matches, "bucket"),
            key: Self::capture_key(matches),
        })
    }

    fn parse_gcs(matches: &regex::Captures) -> Self {
        BackendConfig::Gcs(GcsConfig {
            bucket: Self::capture(matches, "bucket"),
            key: Self::capture_key(matches),
        })
    }

    fn parse_azure(matches: &regex::Captures) -> Self {
        BackendConfig::Azure(AzureConfig {
            account: Self::capture(matches, "account"),
            container: Self::capture(matches, "container"),
            key: Self::capture_key(matches),
        })
    }

    fn parse_local(matches: &regex::Captures) -> Self {
        let path = Self::capture(matches, "path");
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };

        BackendConfig::Local(LocalConfig { path, key: None })
    }

    fn canonical_url(&self) -> String {
        match self {
            BackendConfig::S3(s3) => s3.canonical_url(),
            BackendConfig::Gcs(gcs) => gcs.canonical_url(),
            BackendConfig::Azure(azure) => azure.canonical_url(),
            BackendConfig::Local(local) => local.canonical_url(),
            BackendConfig::Memory => "memory://".to_string(),
        }
    }

    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Gcs(gcs) => gcs.key.as_ref(),
            BackendConfig::Azure(azure) => azure.key.as_ref(),
            BackendConfig::Local(local) => local.key.as_ref(),
            BackendConfig::Memory => None,
        }
    }
}

/// Emit request count and latency for one store call.
fn record<T, E>(operation: StorageOperation, start: Instant, result: &Result<T, E>) {
    emit!(StorageRequest {
        operation,
        status: RequestStatus::from_result(result),
    });
    emit!(StorageRequestDuration {
        operation,
        duration: start.elapsed(),
    });
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        match BackendConfig::parse_url(url)? {
            BackendConfig::S3(config) => Self::construct_s3(config, &options),
            BackendConfig::Gcs(config) => Self::construct_gcs(config, &options),
            BackendConfig::Azure(config) => Self::construct_azure(config, &options),
            BackendConfig::Local(config) => Self::construct_local(config).await,
            BackendConfig::Memory => Ok(Self::in_memory()),
        }
    }

    /// Wrap a store that also runs multipart sessions.
    fn from_multipart_store<S>(config: BackendConfig, store: S) -> Self
    where
        S: ObjectStore + MultipartStore,
    {
        let store = Arc::new(store);
        Self {
            canonical_url: config.canonical_url(),
            config,
            multipart_store: Some(store.clone() as Arc<dyn MultipartStore>),
            object_store: store,
        }
    }

    /// Wrap a store that only takes whole-object puts.
    fn from_object_store(config: BackendConfig, store: impl ObjectStore) -> Self {
        Self {
            canonical_url: config.canonical_url(),
            config,
            multipart_store: None,
            object_store: Arc::new(store),
        }
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// The URL this provider is bound to.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// Strip the configured key prefix so callers get relative paths.
    fn relative_path(&self, path: &Path) -> Path {
        let key_part_count = self
            .config
            .key()
            .map(|key| key.parts().count())
            .unwrap_or_default();
        path.parts().skip(key_part_count).collect()
    }

    /// Qualify a raw string prefix, which need not end on a `/` boundary.
    ///
    /// Returns the directory to list (`None` for the store root) and the
    /// percent-encoded string every matching location starts with.
    fn qualify_prefix(&self, prefix: &str) -> (Option<Path>, String) {
        let (dir, fragment) = match prefix.rsplit_once(DELIMITER) {
            Some((dir, fragment)) => (Path::from(dir), fragment),
            None => (Path::default(), prefix),
        };
        let dir = self.qualify_path(&dir).into_owned();
        let fragment = PathPart::from(fragment);

        if dir.as_ref().is_empty() {
            (None, fragment.as_ref().to_string())
        } else {
            let qualified = format!("{dir}{DELIMITER}{}", fragment.as_ref());
            (Some(dir), qualified)
        }
    }

    /// Whether `list` yields keys in lexical order.
    fn lists_in_order(&self) -> bool {
        !matches!(self.config, BackendConfig::Local(_))
    }

    fn multipart_store(&self) -> Result<&Arc<dyn MultipartStore>, StorageError> {
        self.multipart_store.as_ref().context(MultipartUnsupportedSnafu {
            url: self.canonical_url.clone(),
        })
    }

    /// Get the contents of an object.
    pub async fn get(&self, path: &Path) -> Result<bytes::Bytes, StorageError> {
        let path = self.qualify_path(path);
        let result = self.object_store.get(&path).await;
        let bytes = result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    fn put_options(&self) -> PutOptions {
        match self.config {
            // The local filesystem rejects object attributes
            BackendConfig::Local(_) => PutOptions::default(),
            _ => PutOptions {
                attributes: Attributes::from_iter([(
                    Attribute::ContentType,
                    PARQUET_CONTENT_TYPE,
                )]),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl ObjectStoreClient for StorageProvider {
    fn supports_multipart(&self) -> bool {
        self.multipart_store.is_some()
    }

    async fn put(&self, key: &Path, payload: PutPayload) -> Result<(), StorageError> {
        let path = self.qualify_path(key);
        let start = Instant::now();
        let result = self
            .object_store
            .put_opts(&path, payload, self.put_options())
            .await;
        record(StorageOperation::Put, start, &result);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    async fn create_multipart(&self, key: &Path) -> Result<MultipartId, StorageError> {
        let multipart_store = self.multipart_store()?;
        let path = self.qualify_path(key);
        let start = Instant::now();
        let result = multipart_store.create_multipart(&path).await;
        record(StorageOperation::CreateMultipart, start, &result);

        result.context(ObjectStoreSnafu)
    }

    async fn upload_part(
        &self,
        key: &Path,
        id: &MultipartId,
        part_number: usize,
        payload: PutPayload,
    ) -> Result<PartId, StorageError> {
        let multipart_store = self.multipart_store()?;
        let path = self.qualify_path(key);
        let start = Instant::now();
        // MultipartStore numbers parts from zero
        let result = multipart_store
            .put_part(&path, id, part_number.saturating_sub(1), payload)
            .await;
        record(StorageOperation::PutPart, start, &result);

        result.context(ObjectStoreSnafu)
    }

    async fn complete_multipart(
        &self,
        key: &Path,
        id: &MultipartId,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError> {
        let multipart_store = self.multipart_store()?;
        let part_ids = validate_part_sequence(parts)?;
        let path = self.qualify_path(key);
        let start = Instant::now();
        let result = multipart_store.complete_multipart(&path, id, part_ids).await;
        record(StorageOperation::CompleteMultipart, start, &result);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    async fn abort_multipart(&self, key: &Path, id: &MultipartId) -> Result<(), StorageError> {
        let multipart_store = self.multipart_store()?;
        let path = self.qualify_path(key);
        let start = Instant::now();
        let result = multipart_store.abort_multipart(&path, id).await;
        record(StorageOperation::AbortMultipart, start, &result);

        result.context(ObjectStoreSnafu)
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
        page_size: usize,
    ) -> Result<ListPage, StorageError> {
        // object_store lists by directory; narrow to the string prefix below
        let (dir, qualified) = self.qualify_prefix(prefix);
        // Tokens are listed keys, already encoded
        let offset: Option<Path> = continuation_token
            .map(|token| {
                Path::parse(token)
                    .map(|token| self.qualify_path(&token).into_owned())
                    .map_err(object_store::Error::from)
            })
            .transpose()
            .context(ObjectStoreSnafu)?;
        let limit = page_size.saturating_add(1);

        let start = Instant::now();
        let stream = match &offset {
            Some(offset) => self.object_store.list_with_offset(dir.as_ref(), offset),
            None => self.object_store.list(dir.as_ref()),
        };

        let matching = stream
            .filter(|meta| ready(!matches!(meta, Err(object_store::Error::NotFound { .. }))))
            .map_ok(|meta| meta.location)
            .try_filter(|location| ready(location.as_ref().starts_with(qualified.as_str())));

        // One extra key tells whether another page exists
        let result: Result<Vec<Path>, object_store::Error> = if self.lists_in_order() {
            matching.take(limit).try_collect().await
        } else {
            matching.try_collect().await.map(|mut all: Vec<Path>| {
                all.sort();
                all.truncate(limit);
                all
            })
        };
        record(StorageOperation::List, start, &result);

        let mut keys: Vec<Path> = result
            .context(ObjectStoreSnafu)?
            .iter()
            .map(|location| self.relative_path(location))
            .collect();

        let next_token = if keys.len() > page_size {
            keys.truncate(page_size);
            keys.last().map(|key| key.to_string())
        } else {
            None
        };

        debug!(
            "Listed {} keys under '{}' (more: {})",
            keys.len(),
            qualified,
            next_token.is_some()
        );

        Ok(ListPage { keys, next_token })
    }

    async fn delete_batch(&self, keys: &[Path]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }

        let locations: Vec<Result<Path, object_store::Error>> = keys
            .iter()
            .map(|key| Ok(self.qualify_path(key).into_owned()))
            .collect();

        let start = Instant::now();
        let result: Result<Vec<Path>, object_store::Error> = self
            .object_store
            .delete_stream(futures::stream::iter(locations).boxed())
            .filter(|deleted| {
                ready(!matches!(deleted, Err(object_store::Error::NotFound { .. })))
            })
            .try_collect()
            .await;
        record(StorageOperation::Delete, start, &result);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }
}

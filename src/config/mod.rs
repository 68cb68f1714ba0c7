//! Configuration parsing and schema management.
//!
//! Handles loading the upload job from YAML files (with environment variable
//! interpolation) and converts the user-defined schema to an Arrow schema.

mod vars;

use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{
    ConfigError, EmptyInputPathSnafu, EmptySchemaSnafu, EmptyStorageUrlSnafu, EmptyTargetKeySnafu,
    EnvInterpolationSnafu, ListPageTooLargeSnafu, ReadFileSnafu, YamlParseSnafu,
    ZeroChunkSizeSnafu, ZeroPartSizeSnafu,
};
use crate::storage::{KeyTemplate, MAX_LIST_PAGE_SIZE};

/// Byte size constants (binary/IEC units).
pub const KB: usize = 1024;
pub const MB: usize = 1024 * KB;

/// Main configuration structure for an upload job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub input: InputConfig,
    pub schema: SchemaConfig,
    #[serde(default)]
    pub parquet: ParquetConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Where uploads go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bucket URL with an optional base key.
    /// Examples: "s3://bucket/exports", "gs://bucket", "/local/dir", "memory://"
    pub url: String,

    /// Storage options (credentials, region, endpoint, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// The NDJSON file holding the rows to upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Local path of the input file.
    pub path: PathBuf,

    /// Compression format of the input file.
    #[serde(default)]
    pub compression: CompressionFormat,

    /// Rows per decoded batch (default: 8192).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    8192
}

/// Parquet writer settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParquetConfig {
    /// Parquet compression codec.
    #[serde(default)]
    pub compression: ParquetCompression,

    /// Maximum rows per row group (writer default when unset).
    #[serde(default)]
    pub max_row_group_size: Option<usize>,
}

/// How the dataset is laid out in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UploadConfig {
    /// One object, multipart with atomic commit when large.
    Transactional(TransactionalConfig),
    /// One object per row chunk.
    Chunked(ChunkedConfig),
}

/// Settings for a transactional single-object upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionalConfig {
    /// Target key; may contain strftime codes.
    pub key: String,

    /// Serialized size in MB up to which a direct put is used; also the
    /// multipart part size (default: 5).
    #[serde(default = "default_min_part_size_mb")]
    pub min_part_size_mb: usize,
}

fn default_min_part_size_mb() -> usize {
    5
}

impl TransactionalConfig {
    /// The part size threshold in bytes.
    pub fn min_part_size_bytes(&self) -> usize {
        self.min_part_size_mb.saturating_mul(MB)
    }
}

/// Settings for a chunked upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkedConfig {
    /// Key prefix, prepended verbatim; may contain strftime codes.
    #[serde(default)]
    pub prefix: String,

    /// Base object name; may contain strftime codes.
    pub base_name: String,

    /// Rows per chunk (default: 10).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Object extension without the dot (default: "parquet").
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Where chunks are serialized before upload.
    #[serde(default)]
    pub staging: StagingMode,

    /// Directory for temp-file staging (system temp dir when unset).
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Delete everything under `prefix` before uploading.
    #[serde(default)]
    pub clean_prefix: bool,

    /// Keys per listing page during cleanup (default: 1000).
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
}

fn default_chunk_size() -> usize {
    10
}

fn default_extension() -> String {
    "parquet".to_string()
}

fn default_list_page_size() -> usize {
    1000
}

/// Serialization strategy for chunks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StagingMode {
    #[default]
    Memory,
    TempFile,
}

/// Metrics export configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// File to write Prometheus text exposition to when the run ends.
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}

/// Schema configuration defining the structure of input data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub fields: Vec<FieldConfig>,
}

/// Configuration for a single schema field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub nullable: bool,
}

/// Supported field types for the schema.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Int32,
    Int64,
    Float32,
    Float64,
    Boolean,
    Timestamp,
    Date,
}

impl FieldType {
    fn to_arrow(self) -> DataType {
        match self {
            FieldType::String => DataType::Utf8,
            FieldType::Int32 => DataType::Int32,
            FieldType::Int64 => DataType::Int64,
            FieldType::Float32 => DataType::Float32,
            FieldType::Float64 => DataType::Float64,
            FieldType::Boolean => DataType::Boolean,
            FieldType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            FieldType::Date => DataType::Date32,
        }
    }
}

/// Compression format of the input file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionFormat {
    #[default]
    None,
    Gzip,
    Zstd,
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Uncompressed,
    Snappy,
    #[default]
    Gzip,
    Zstd,
    Lz4,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_options(path, true)
    }

    /// Load configuration from a YAML file with optional environment variable interpolation.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        interpolate_env: bool,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;
        Self::from_yaml(&content, interpolate_env)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str, interpolate_env: bool) -> Result<Self, ConfigError> {
        let content = if interpolate_env {
            vars::interpolate(content).map_err(|errors| {
                EnvInterpolationSnafu {
                    message: errors.join("\n"),
                }
                .build()
            })?
        } else {
            content.to_string()
        };

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.storage.url.is_empty(), EmptyStorageUrlSnafu);
        ensure!(!self.input.path.as_os_str().is_empty(), EmptyInputPathSnafu);
        ensure!(!self.schema.fields.is_empty(), EmptySchemaSnafu);

        match &self.upload {
            UploadConfig::Transactional(t) => {
                ensure!(!t.key.is_empty(), EmptyTargetKeySnafu);
                ensure!(t.min_part_size_mb > 0, ZeroPartSizeSnafu);
                KeyTemplate::parse(&t.key)?;
            }
            UploadConfig::Chunked(c) => {
                ensure!(c.chunk_size > 0, ZeroChunkSizeSnafu);
                ensure!(
                    c.list_page_size <= MAX_LIST_PAGE_SIZE,
                    ListPageTooLargeSnafu {
                        max: MAX_LIST_PAGE_SIZE
                    }
                );
                KeyTemplate::parse(&c.prefix)?;
                KeyTemplate::parse(&c.base_name)?;
            }
        }
        Ok(())
    }

    /// Convert the schema configuration to an Arrow schema.
    pub fn to_arrow_schema(&self) -> Arc<Schema> {
        let fields: Vec<Field> = self
            .schema
            .fields
            .iter()
            .map(|f| Field::new(&f.name, f.field_type.to_arrow(), f.nullable))
            .collect();

        Arc::new(Schema::new(fields))
    }
}

//! A configured upload run: key rendering plus dispatch to the uploader
//! selected by `upload.mode`.

use chrono::{DateTime, Utc};
use snafu::prelude::*;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::config::{ChunkedConfig, Config, TransactionalConfig, UploadConfig};
use crate::dataset::Dataset;
use crate::error::{
    ConfigSnafu, InvalidChunkSizeSnafu, RunError, SerializationSnafu, UploadSnafu,
};
use crate::sink::{ParquetSerializer, stager_for};
use crate::storage::{KeyTemplate, ObjectStoreClient};
use crate::upload::{
    ChunkRequest, ChunkedReport, ChunkedUploader, TransactionalUploader, UploadOutcome, UploadPlan,
};

/// What a finished run uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobReport {
    Transactional { key: String, outcome: UploadOutcome },
    Chunked(ChunkedReport),
}

/// What a run would do, without touching the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPlan {
    Transactional {
        key: String,
        bytes: usize,
        plan: UploadPlan,
    },
    Chunked {
        prefix: String,
        clean_prefix: bool,
        keys: Vec<String>,
    },
}

/// Runs the upload described by a `Config`.
#[derive(Debug, Clone)]
pub struct UploadJob {
    client: Arc<dyn ObjectStoreClient>,
    serializer: ParquetSerializer,
    upload: UploadConfig,
}

fn render(template: &str, now: DateTime<Utc>) -> Result<String, RunError> {
    Ok(KeyTemplate::parse(template)
        .context(ConfigSnafu)?
        .render_at(now))
}

impl UploadJob {
    pub fn from_config(config: &Config, client: Arc<dyn ObjectStoreClient>) -> Self {
        Self {
            client,
            serializer: ParquetSerializer::from_config(&config.parquet),
            upload: config.upload.clone(),
        }
    }

    fn chunk_request(config: &ChunkedConfig, now: DateTime<Utc>) -> Result<ChunkRequest, RunError> {
        let prefix = render(&config.prefix, now)?;
        let base_name = render(&config.base_name, now)?;

        Ok(ChunkRequest::new(prefix, base_name, config.chunk_size)
            .with_extension(config.extension.clone())
            .with_clean_prefix(config.clean_prefix)
            .with_list_page_size(config.list_page_size))
    }

    fn transactional_uploader(
        &self,
        config: &TransactionalConfig,
    ) -> Result<TransactionalUploader, RunError> {
        TransactionalUploader::new(
            self.client.clone(),
            self.serializer.clone(),
            config.min_part_size_bytes(),
        )
        .context(UploadSnafu)
    }

    /// Upload `dataset`, rendering key templates against the current time.
    pub async fn run(&self, dataset: &Dataset) -> Result<JobReport, RunError> {
        self.run_at(dataset, Utc::now()).await
    }

    /// Upload `dataset`, rendering key templates against `now`.
    pub async fn run_at(&self, dataset: &Dataset, now: DateTime<Utc>) -> Result<JobReport, RunError> {
        match &self.upload {
            UploadConfig::Transactional(config) => {
                let key = render(&config.key, now)?;
                let outcome = self
                    .transactional_uploader(config)?
                    .upload(dataset, &key)
                    .await
                    .context(UploadSnafu)?;
                Ok(JobReport::Transactional { key, outcome })
            }
            UploadConfig::Chunked(config) => {
                let request = Self::chunk_request(config, now)?;
                let stager = stager_for(
                    config.staging,
                    self.serializer.clone(),
                    config.temp_dir.clone(),
                );
                let report = ChunkedUploader::new(self.client.clone(), stager)
                    .upload(dataset, &request)
                    .await
                    .context(UploadSnafu)?;
                Ok(JobReport::Chunked(report))
            }
        }
    }

    /// Work out keys and part counts without calling the store.
    pub fn plan_at(&self, dataset: &Dataset, now: DateTime<Utc>) -> Result<JobPlan, RunError> {
        match &self.upload {
            UploadConfig::Transactional(config) => {
                let key = render(&config.key, now)?;
                let bytes = self
                    .serializer
                    .serialize(dataset.batch())
                    .context(SerializationSnafu)
                    .context(UploadSnafu)?
                    .len();
                let plan = self.transactional_uploader(config)?.plan(bytes);
                Ok(JobPlan::Transactional { key, bytes, plan })
            }
            UploadConfig::Chunked(config) => {
                let request = Self::chunk_request(config, now)?;
                let chunk_size = NonZeroUsize::new(request.chunk_size)
                    .context(InvalidChunkSizeSnafu)
                    .context(UploadSnafu)?;
                let keys = (0..dataset.chunk_count(chunk_size))
                    .map(|index| request.key(index))
                    .collect();
                Ok(JobPlan::Chunked {
                    prefix: request.prefix,
                    clean_prefix: request.clean_prefix,
                    keys,
                })
            }
        }
    }
}

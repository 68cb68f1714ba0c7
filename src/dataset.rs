//! The in-memory table being uploaded.
//!
//! A `Dataset` is a single Arrow RecordBatch. Chunks are zero-copy slices
//! that partition it in row order.

use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use snafu::prelude::*;
use std::num::NonZeroUsize;
use std::ops::Range;

use crate::error::{MalformedDatasetSnafu, SerializeError};

/// An immutable table of rows with a fixed schema.
#[derive(Debug, Clone)]
pub struct Dataset {
    batch: RecordBatch,
}

/// A contiguous run of rows of a `Dataset`.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position in chunk order, from 0.
    pub index: usize,
    /// First row of the chunk within the dataset.
    pub offset: usize,
    /// The rows, sliced without copying.
    pub batch: RecordBatch,
}

impl Chunk {
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }
}

impl Dataset {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    /// Combine batches sharing `schema` into one dataset.
    pub fn try_from_batches(
        schema: SchemaRef,
        batches: &[RecordBatch],
    ) -> Result<Self, SerializeError> {
        let batch = concat_batches(&schema, batches).context(MalformedDatasetSnafu)?;
        Ok(Self { batch })
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    /// The whole dataset as one batch.
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Number of chunks of `chunk_size` rows needed to cover every row.
    pub fn chunk_count(&self, chunk_size: NonZeroUsize) -> usize {
        self.num_rows().div_ceil(chunk_size.get())
    }

    /// Split into chunks of `chunk_size` rows; the last may be smaller.
    pub fn chunks(&self, chunk_size: NonZeroUsize) -> impl Iterator<Item = Chunk> + '_ {
        chunk_ranges(self.num_rows(), chunk_size)
            .enumerate()
            .map(|(index, range)| Chunk {
                index,
                offset: range.start,
                batch: self.batch.slice(range.start, range.len()),
            })
    }
}

impl From<RecordBatch> for Dataset {
    fn from(batch: RecordBatch) -> Self {
        Self::new(batch)
    }
}

/// Row ranges of `ceil(rows / chunk_size)` chunks, in order.
pub fn chunk_ranges(rows: usize, chunk_size: NonZeroUsize) -> impl Iterator<Item = Range<usize>> {
    let size = chunk_size.get();
    (0..rows)
        .step_by(size)
        .map(move |start| start..(start + size).min(rows))
}
